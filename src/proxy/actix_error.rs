//! Actix Web error adapter for bridge errors.
//!
//! Handlers return [`crate::error::Result`]; an error that escapes a handler
//! is rendered here. Nothing has been written to the client at that point,
//! so a well-formed status line is still possible.

use crate::error::Error;
use actix_web::{HttpResponse, ResponseError, http::StatusCode};

impl ResponseError for Error {
    fn error_response(&self) -> HttpResponse {
        let body = match self {
            Error::Upstream(_) | Error::Timeout(_) => "bad gateway",
            _ => "internal error",
        };

        HttpResponse::build(self.status_code())
            .content_type("text/plain; charset=utf-8")
            .body(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::Upstream(_) | Error::Timeout(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
