//! The request-processing boundary.
//!
//! [`Server::call`] takes a request from the transport, routes it, resolves the entry point,
//! runs the filter chain and turns the outcome into a response. Every pooled object used on the
//! way is acquired through a [`Pooled`](crate::pool::Pooled) guard, so it is recycled and
//! released whatever the outcome: success, handler error, panic or cancellation.
//!
//! | outcome                           | status                        |
//! |-----------------------------------|-------------------------------|
//! | request body could not be read    | `400 Bad Request`             |
//! | no route matched                  | `404 Not Found`               |
//! | method resolved to no entry point | `405 Method Not Allowed`      |
//! | filter or handler error or panic  | `500 Internal Server Error`   |
//! | chain completed                   | whatever the chain wrote      |

use crate::handler::{BoxError, Handler, allowed_methods, resolve};
use crate::pool::{PoolConfig, Pooled, ServerPool};
use crate::router::{Router, RouterBuildError};
use bytes::Bytes;
use futures::FutureExt;
use http::request::Parts;
use http::{HeaderValue, StatusCode};
use http_body::Body;
use http_body_util::{BodyExt, Full};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct ServerBuilder {
    router: Option<Router>,
    pool: Option<Arc<ServerPool>>,
    pool_config: Option<PoolConfig>,
}

impl ServerBuilder {
    fn new() -> Self {
        Self { router: None, pool: None, pool_config: None }
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Serves with an existing pool, typically [`ServerPool::global`].
    pub fn pool(mut self, pool: Arc<ServerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Serves with a pool of its own, sized by `config`. Ignored when a pool is set.
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = Some(config);
        self
    }

    /// Builds the server, running [`Handler::init`](crate::handler::Handler::init) on every
    /// routed handler.
    ///
    /// The first failing `init` aborts the build; handlers initialized before it are destroyed.
    pub fn build(self) -> Result<Server, ServerBuildError> {
        let mut router = self.router.ok_or(ServerBuildError::MissingRouter)?;
        let pool = match (self.pool, self.pool_config) {
            (Some(pool), _) => pool,
            (None, config) => Arc::new(ServerPool::new(config.unwrap_or_default())),
        };

        let items = router.items_mut();
        for index in 0..items.len() {
            let item = &mut items[index];
            let result = match Arc::get_mut(item.handler_mut()) {
                Some(handler) => handler.init(&pool),
                None => Err(BoxError::from("handler is shared outside of its router")),
            };

            if let Err(source) = result {
                let pattern = item.pattern().to_string();
                error!(pattern = %pattern, cause = %source, "handler init failed");
                for initialized in &items[..index] {
                    initialized.handler().destroy();
                }
                return Err(ServerBuildError::HandlerInit { pattern, source });
            }
            debug!(pattern = %item.pattern(), "handler initialized");
        }

        info!(routes = router.items().len(), "server built");
        Ok(Server { router, pool })
    }
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("router must be set")]
    MissingRouter,
    #[error("handler for '{pattern}' failed to initialize: {source}")]
    HandlerInit { pattern: String, source: BoxError },
    #[error(transparent)]
    Router(#[from] RouterBuildError),
}

/// Dispatches requests to the handlers of a [`Router`].
///
/// Dropping the server destroys every handler once.
#[derive(Debug)]
pub struct Server {
    router: Router,
    pool: Arc<ServerPool>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn pool(&self) -> &Arc<ServerPool> {
        &self.pool
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Serves one request, collecting its body first.
    pub async fn call<B>(&self, req: http::Request<B>) -> http::Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                let cause: BoxError = e.into();
                warn!(cause = %cause, "failed to read request body");
                return status_response(StatusCode::BAD_REQUEST);
            }
        };

        self.dispatch(parts, body).await
    }

    /// Serves one request whose body is already collected.
    pub async fn dispatch(&self, parts: Parts, body: Bytes) -> http::Response<Full<Bytes>> {
        let (item, endpoint, vars) = {
            let Some(route) = self.router.at(parts.uri.path()) else {
                return status_response(StatusCode::NOT_FOUND);
            };
            let item = route.item();

            let Some(endpoint) = resolve(&parts.method, item.handler()) else {
                debug!(method = %parts.method, pattern = %item.pattern(), "method not allowed");
                return method_not_allowed(item.handler());
            };

            let mut vars = self.pool.var_indexer_guard();
            route.fill_vars(&mut vars);
            (item, endpoint, vars)
        };

        let mut env = self.pool.request_env_guard();
        env.request_mut().load(parts, body);
        env.request_mut().attach_vars(Pooled::into_inner(vars));

        let mut filters = self.pool.filters_guard();
        filters.extend(self.router.filters().iter().cloned());
        filters.extend(item.filters().iter().cloned());

        let mut chain = self.pool.filter_chain_guard();
        chain.assemble(Pooled::into_inner(filters), endpoint);

        let (req, resp) = env.split_mut();
        let outcome = AssertUnwindSafe(chain.run(req, resp)).catch_unwind().await;

        match outcome {
            Ok(Ok(())) => env.response_mut().take_http_response(),
            Ok(Err(e)) => {
                let req = env.request();
                error!(method = %req.method(), path = req.path(), cause = %e, "request failed");
                status_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Err(panic) => {
                let req = env.request();
                error!(method = %req.method(), path = req.path(), cause = panic_message(&*panic), "request panicked");
                status_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Destroys every handler and releases the router.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        for item in self.router.items() {
            item.handler().destroy();
        }
        info!("server shutdown, handlers destroyed");
    }
}

fn status_response(status: StatusCode) -> http::Response<Full<Bytes>> {
    let mut response = http::Response::new(Full::default());
    *response.status_mut() = status;
    response
}

fn method_not_allowed(handler: &Arc<dyn Handler>) -> http::Response<Full<Bytes>> {
    let mut response = status_response(StatusCode::METHOD_NOT_ALLOWED);
    let allowed = allowed_methods(handler).iter().map(|method| method.as_str()).collect::<Vec<_>>().join(", ");
    if let Ok(value) = HeaderValue::from_str(&allowed) {
        response.headers_mut().insert(http::header::ALLOW, value);
    }
    response
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
