use async_trait::async_trait;
use micro_dispatch::filter::{Filter, Next};
use micro_dispatch::handler::HandlerResult;
use micro_dispatch::{Request, Response};
use std::time::Instant;
use tracing::field::Empty;
use tracing::{Instrument, info, info_span, warn};

/// Logs one event per request once the rest of the chain returns.
///
/// The chain runs inside a `request` span carrying the method and path; the span records the
/// response status and the latency in milliseconds when the request completes.
#[derive(Debug, Default, Clone, Copy)]
pub struct AccessLogFilter;

impl AccessLogFilter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Filter for AccessLogFilter {
    async fn filter(&self, req: &mut Request, resp: &mut Response, next: Next<'_>) -> HandlerResult {
        let span = info_span!(
            "request",
            method = %req.method(),
            path = %req.path(),
            status = Empty,
            latency_ms = Empty,
        );

        let start = Instant::now();
        let result = next.run(req, resp).instrument(span.clone()).await;
        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        span.record("status", resp.status().as_u16());
        span.record("latency_ms", latency_ms);
        span.in_scope(|| match &result {
            Ok(()) => info!(status = resp.status().as_u16(), latency_ms, "request served"),
            Err(e) => warn!(cause = %e, latency_ms, "request failed"),
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::AccessLogFilter;
    use micro_dispatch::filter::{Filter, FilterChain};
    use micro_dispatch::handler::{BoxError, EntryPoint, handler_fn};
    use micro_dispatch::{Request, Response};
    use parking_lot::Mutex;
    use std::io;
    use std::sync::Arc;
    use tracing::Level;
    use tracing_subscriber::FmtSubscriber;
    use tracing_subscriber::fmt::MakeWriter;

    /// Collects formatted log output.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn chain(endpoint: EntryPoint) -> FilterChain {
        let filters: Vec<Arc<dyn Filter>> = vec![Arc::new(AccessLogFilter::new())];
        FilterChain::build(filters, endpoint)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_passes_through_and_logs_request() {
        let captured = Captured::default();
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::TRACE)
            .with_writer(captured.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let chain = chain(EntryPoint::Function(Arc::new(handler_fn(|_req, resp| {
            Box::pin(async move {
                resp.set_status(http::StatusCode::ACCEPTED);
                resp.write(b"logged");
                Ok(())
            })
        }))));

        let (parts, ()) = http::Request::delete("/orders/7").body(()).unwrap().into_parts();
        let mut req = Request::new();
        req.load(parts, bytes::Bytes::new());
        let mut resp = Response::new();
        chain.run(&mut req, &mut resp).await.unwrap();
        assert_eq!(resp.status(), http::StatusCode::ACCEPTED);
        assert_eq!(resp.body(), b"logged");

        let logs = captured.text();
        let line = logs.lines().find(|line| line.contains("request served")).unwrap();
        assert!(line.contains("method=DELETE"));
        assert!(line.contains("path=/orders/7"));
        assert!(line.contains("status=202"));
        assert!(line.contains("latency_ms="));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_error_is_returned_unchanged() {
        let chain = chain(EntryPoint::Function(Arc::new(handler_fn(|_req, _resp| {
            Box::pin(async move { Err(BoxError::from("denied")) })
        }))));

        let err = chain.run(&mut Request::new(), &mut Response::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "denied");
    }
}
