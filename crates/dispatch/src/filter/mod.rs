//! Filters and the filter chain.
//!
//! A [`Filter`] wraps the rest of the request processing: it receives the request, the response
//! and a [`Next`] continuation, and decides whether, when and how many times to run it.
//! Code placed before `next.run(..)` runs in registration order, code placed after it runs in
//! reverse registration order. Returning without running `next` short-circuits the request:
//! later filters and the entry point never run.
//!
//! ```
//! use async_trait::async_trait;
//! use micro_dispatch::filter::{Filter, Next};
//! use micro_dispatch::handler::HandlerResult;
//! use micro_dispatch::{Request, Response};
//! use http::StatusCode;
//!
//! struct RequireToken;
//!
//! #[async_trait]
//! impl Filter for RequireToken {
//!     async fn filter(&self, req: &mut Request, resp: &mut Response, next: Next<'_>) -> HandlerResult {
//!         if req.header("x-token").is_none() {
//!             resp.report_status(StatusCode::UNAUTHORIZED);
//!             return Ok(());
//!         }
//!         next.run(req, resp).await
//!     }
//! }
//! ```

mod chain;

pub use chain::{ChainError, FilterChain, Next};

use crate::handler::HandlerResult;
use crate::{Request, Response};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// A cross-cutting step of request processing.
#[async_trait]
pub trait Filter: Send + Sync {
    async fn filter(&self, req: &mut Request, resp: &mut Response, next: Next<'_>) -> HandlerResult;
}

/// An ordered filter slice, as pooled by the [`ServerPool`](crate::pool::ServerPool).
pub type Filters = Vec<Arc<dyn Filter>>;

struct FnFilter<F>(F);

#[async_trait]
impl<F> Filter for FnFilter<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response, Next<'a>) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    async fn filter(&self, req: &mut Request, resp: &mut Response, next: Next<'_>) -> HandlerResult {
        (self.0)(req, resp, next).await
    }
}

/// Turns a closure returning a boxed future into a [`Filter`].
pub fn fn_filter<F>(f: F) -> impl Filter
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response, Next<'a>) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    FnFilter(f)
}

#[cfg(test)]
mod tests {
    use super::{Filter, FilterChain, fn_filter};
    use crate::handler::{EntryPoint, handler_fn};
    use crate::{Request, Response};
    use http::{HeaderValue, StatusCode};
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_fn_filter() {
        let tagger = fn_filter(|req, resp, next| {
            Box::pin(async move {
                let result = next.run(req, resp).await;
                resp.set_header("x-tag", HeaderValue::from_static("tagged"));
                result
            })
        });
        let gate = fn_filter(|req, resp, next| {
            Box::pin(async move {
                if req.path() == "/" {
                    resp.report_status(StatusCode::FORBIDDEN);
                    return Ok(());
                }
                next.run(req, resp).await
            })
        });
        let filters: Vec<Arc<dyn Filter>> = vec![Arc::new(tagger), Arc::new(gate)];
        let endpoint = EntryPoint::Function(Arc::new(handler_fn(|_req, resp| {
            Box::pin(async move {
                resp.write(b"unreachable");
                Ok(())
            })
        })));

        let chain = FilterChain::build(filters, endpoint);
        let mut resp = Response::new();
        chain.run(&mut Request::new(), &mut resp).await.unwrap();

        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert!(resp.body().is_empty());
        assert_eq!(resp.headers()["x-tag"], "tagged");
    }
}
