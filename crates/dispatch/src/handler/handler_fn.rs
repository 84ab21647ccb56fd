use crate::handler::HandlerResult;
use crate::{Request, Response};
use futures::future::BoxFuture;
use std::fmt;

/// An async function serving a request, usable as an entry point on its own.
pub trait HandlerFn: Send + Sync {
    fn call<'a>(&'a self, req: &'a mut Request, resp: &'a mut Response) -> BoxFuture<'a, HandlerResult>;
}

/// a closure holder which represents a [`HandlerFn`]
pub struct FnHandler<F> {
    f: F,
}

/// Turns a closure returning a boxed future into a [`HandlerFn`].
///
/// # Example
/// ```
/// use micro_dispatch::handler::handler_fn;
///
/// let hello = handler_fn(|_req, resp| {
///     Box::pin(async move {
///         resp.write(b"hello");
///         Ok(())
///     })
/// });
/// # let _ = hello;
/// ```
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    FnHandler { f }
}

impl<F> HandlerFn for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    fn call<'a>(&'a self, req: &'a mut Request, resp: &'a mut Response) -> BoxFuture<'a, HandlerResult> {
        (self.f)(req, resp)
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnHandler")
    }
}

#[cfg(test)]
mod tests {
    use super::{HandlerFn, handler_fn};
    use crate::handler::BoxError;
    use crate::{Request, Response};

    fn assert_is_handler_fn<H: HandlerFn>(_handler: &H) {
        // no op
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_closure_is_handler_fn() {
        let handler = handler_fn(|req, resp| {
            Box::pin(async move {
                let greeting = format!("{} {}", req.method(), req.path());
                resp.write(greeting.as_bytes());
                Ok(())
            })
        });
        assert_is_handler_fn(&handler);

        let mut req = Request::new();
        let mut resp = Response::new();
        handler.call(&mut req, &mut resp).await.unwrap();
        assert_eq!(resp.body(), b"GET /");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_error_is_returned() {
        let handler = handler_fn(|_req, _resp| Box::pin(async move { Err(BoxError::from("no luck")) }));

        let err = handler.call(&mut Request::new(), &mut Response::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "no luck");
    }
}
