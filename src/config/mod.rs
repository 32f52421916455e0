//! Configuration module for Bridge Runner.
//!
//! This module handles parsing, environment overrides, and validation of
//! the single configuration structure the bridge resolves at startup. It
//! supports loading a base configuration from a JSON or YAML file and then
//! layering the platform-supplied environment on top.
//!
//! # Examples
//!
//! Resolving configuration from the process environment:
//!
//! ```no_run
//! use bridge_runner::config::Config;
//!
//! let config = Config::load().unwrap();
//! println!("Public port {} -> backing port {}", config.listen.port, config.backing.port);
//! ```
//!
//! Creating a configuration programmatically:
//!
//! ```
//! use bridge_runner::config::{BackingConfig, Config, validate_config};
//!
//! let config = Config {
//!     backing: BackingConfig {
//!         command: "node".to_string(),
//!         args: vec!["server.js".to_string()],
//!         ..BackingConfig::default()
//!     },
//!     ..Config::default()
//! };
//! validate_config(&config).unwrap();
//! ```
mod env;
mod parser;
pub mod validator;

pub use env::vars;
pub use parser::{BackingConfig, Config, HealthConfig, ListenConfig, ProxySettings, RouteConfig};
pub use validator::validate_config;
