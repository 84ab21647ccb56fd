//! Serves a few in-memory requests through a router with a handler, a function handler and the
//! toolbox filters. Run with `cargo run -p micro-toolbox --example rest_demo`.

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderValue, Method, StatusCode};
use http_body_util::{BodyExt, Full};
use micro_dispatch::handler::{BoxError, FuncHandler, Handler, HandlerResult, handler_fn};
use micro_dispatch::pool::ServerPool;
use micro_dispatch::router::handle;
use micro_dispatch::server::ServerBuildError;
use micro_dispatch::{Request, Response, Router, Server};
use micro_toolbox::{AccessLogFilter, CompressFilter};
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

const SCRATCH: &str = "users.scratch";

/// Builds its responses in a pooled scratch string registered at init.
#[derive(Default)]
struct Users {
    pool: Option<Arc<ServerPool>>,
}

#[async_trait]
impl Handler for Users {
    fn init(&mut self, pool: &Arc<ServerPool>) -> Result<(), BoxError> {
        pool.register(SCRATCH, || String::with_capacity(256))?;
        self.pool = Some(Arc::clone(pool));
        Ok(())
    }

    async fn get(&self, req: &mut Request, resp: &mut Response) -> HandlerResult {
        let pool = self.pool.as_ref().ok_or("users handler is not initialized")?;
        let mut scratch = pool.acquire_from::<String>(SCRATCH)?;
        scratch.push_str("user ");
        scratch.push_str(req.var("id").unwrap_or("unknown"));
        resp.set_header(http::header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        resp.write(scratch.as_bytes());
        scratch.clear();
        pool.release_to(SCRATCH, scratch)?;
        Ok(())
    }

    async fn delete(&self, _req: &mut Request, resp: &mut Response) -> HandlerResult {
        resp.set_status(StatusCode::NO_CONTENT);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), ServerBuildError> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let status = FuncHandler::new()
        .on(
            &Method::GET,
            handler_fn(|_req, resp| {
                Box::pin(async move {
                    resp.write(b"ok");
                    Ok(())
                })
            }),
        )
        .expect("GET is a canonical method");

    let router = Router::builder()
        .filter(AccessLogFilter::new())
        .route("/users/{id}", handle(Users::default()).with(CompressFilter::new().with_min_size(0)))
        .route("/status", handle(status))
        .build()?;
    let server = Server::builder().router(router).build()?;

    for (method, uri) in [
        (Method::GET, "/users/42"),
        (Method::DELETE, "/users/42"),
        (Method::GET, "/status"),
        (Method::POST, "/status"),
        (Method::GET, "/missing"),
    ] {
        let request = http::Request::builder()
            .method(method.clone())
            .uri(uri)
            .header(http::header::ACCEPT_ENCODING, "gzip")
            .body(Full::new(Bytes::new()))
            .expect("demo request is valid");
        let response = server.call(request).await;
        let status = response.status();
        let encoding = response.headers().get(http::header::CONTENT_ENCODING).cloned();
        let body = match response.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };
        info!(%method, uri, %status, ?encoding, body_len = body.len(), "demo response");
    }

    server.shutdown();
    Ok(())
}
