//! Shared fixtures: an in-process fake backing server and helpers for
//! building the public app against it.

use actix_web::body::MessageBody;
use actix_web::dev::{Server, ServerHandle};
use actix_web::web::{self, Bytes, Data};
use actix_web::{App, HttpRequest, HttpResponse, HttpServer};
use bridge_runner::SupervisorContext;
use bridge_runner::config::Config;
use bridge_runner::proxy::ProxyState;
use std::future::poll_fn;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the fake backing server observed
#[derive(Default)]
pub struct Observed {
    pub hits: AtomicUsize,
    pub methods: Mutex<Vec<String>>,
    pub stream_accept: Mutex<Option<String>>,
    pub stream_closed: AtomicBool,
}

pub struct Backend {
    pub addr: SocketAddr,
    pub observed: Arc<Observed>,
    handle: ServerHandle,
}

impl Backend {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub async fn stop(self) {
        self.handle.stop(false).await;
    }
}

/// Sets `stream_closed` when the event stream is dropped
struct CloseGuard(Arc<Observed>);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.stream_closed.store(true, Ordering::SeqCst);
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().content_type("text/plain").body("ok-child")
}

async fn echo(req: HttpRequest, body: Bytes) -> HttpResponse {
    let mut response = HttpResponse::Ok();
    response
        .insert_header(("x-backend", "yes"))
        .insert_header(("cache-control", "max-age=600"))
        .insert_header(("x-echo-method", req.method().as_str()))
        .insert_header(("x-echo-query", req.query_string()));

    for (name, echoed) in [
        ("x-forwarded-host", "x-echo-forwarded-host"),
        ("x-forwarded-for", "x-echo-forwarded-for"),
        ("x-forwarded-proto", "x-echo-forwarded-proto"),
        ("x-custom", "x-echo-custom"),
        ("connection", "x-echo-connection"),
        ("upgrade", "x-echo-upgrade"),
    ] {
        if let Some(value) = req.headers().get(name) {
            response.insert_header((echoed, value.clone()));
        }
    }

    if let Some(ct) = req.headers().get("content-type") {
        response.insert_header(("content-type", ct.clone()));
    }
    response.body(body)
}

async fn teapot() -> HttpResponse {
    HttpResponse::build(actix_web::http::StatusCode::IM_A_TEAPOT).body("short and stout")
}

async fn redirect() -> HttpResponse {
    HttpResponse::Found()
        .insert_header(("location", "/elsewhere"))
        .finish()
}

/// Three numbered events, then a comment every 50ms until the client leaves.
async fn events(req: HttpRequest, observed: Data<Arc<Observed>>) -> HttpResponse {
    let observed = observed.get_ref().clone();
    *observed.stream_accept.lock().unwrap() = req
        .headers()
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let guard = CloseGuard(observed);
    let query = req.query_string().to_string();
    let stream = async_stream::stream! {
        let _guard = guard;
        yield Ok::<_, actix_web::Error>(Bytes::from(format!("event: endpoint\ndata: q={}\n\n", query)));
        for i in 1..=3 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            yield Ok(Bytes::from(format!("data: {}\n\n", i)));
        }
        loop {
            tokio::time::sleep(Duration::from_millis(50)).await;
            yield Ok(Bytes::from_static(b": ping\n\n"));
        }
    };

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("cache-control", "no-store"))
        .streaming(stream)
}

/// Start the fake backing server on an ephemeral loopback port.
pub fn start_backend() -> Backend {
    let observed = Arc::new(Observed::default());
    let data = Data::new(observed.clone());

    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind backend");
    let addr = listener.local_addr().expect("backend address");

    let server: Server = HttpServer::new(move || {
        let counter = data.clone();
        App::new()
            .app_data(data.clone())
            .wrap_fn(move |req, srv| {
                counter.hits.fetch_add(1, Ordering::SeqCst);
                counter
                    .methods
                    .lock()
                    .unwrap()
                    .push(req.method().to_string());
                actix_web::dev::Service::call(srv, req)
            })
            .route("/health", web::get().to(health))
            .route("/events", web::get().to(events))
            .route("/status/teapot", web::to(teapot))
            .route("/redirect", web::to(redirect))
            .default_service(web::to(echo))
    })
    .workers(1)
    .disable_signals()
    .listen(listener)
    .expect("listen backend")
    .run();

    let handle = server.handle();
    actix_web::rt::spawn(server);

    Backend {
        addr,
        observed,
        handle,
    }
}

/// A loopback port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Config pointing the public app at `backing_port`.
pub fn config_for(backing_port: u16) -> Config {
    let mut config = Config::default();
    config.listen.address = "127.0.0.1".to_string();
    config.listen.port = 0;
    config.backing.command = "unused".to_string();
    config.backing.port = backing_port;
    config.backing.streaming_path = "/events".to_string();
    config
}

pub fn state_for(config: Config) -> Data<ProxyState> {
    let ctx = SupervisorContext::new(config);
    Data::new(ProxyState::new(ctx).expect("proxy state"))
}

/// Next chunk of a streaming body, or `None` at the end.
pub async fn next_chunk<B>(body: &mut Pin<Box<B>>) -> Option<Bytes>
where
    B: MessageBody,
{
    poll_fn(|cx| body.as_mut().poll_next(cx))
        .await
        .map(|chunk| {
            let chunk: Result<Bytes, Box<dyn std::error::Error>> = chunk.map_err(Into::into);
            chunk.expect("body chunk")
        })
}

/// Read chunks until the accumulated text contains `needle`.
pub async fn read_until<B>(body: &mut Pin<Box<B>>, needle: &str) -> String
where
    B: MessageBody,
{
    let mut text = String::new();
    let read = async {
        while !text.contains(needle) {
            match next_chunk(body).await {
                Some(chunk) => text.push_str(&String::from_utf8_lossy(&chunk)),
                None => break,
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("timed out reading stream");
    text
}

/// Poll `flag` until it is set or `within` elapses.
pub async fn eventually(flag: &AtomicBool, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if flag.load(Ordering::SeqCst) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    flag.load(Ordering::SeqCst)
}
