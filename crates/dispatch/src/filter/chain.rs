use crate::filter::{Filter, Filters};
use crate::handler::{EntryPoint, HandlerResult};
use crate::pool::Recycle;
use crate::{Request, Response};
use std::fmt;
use std::mem;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainError {
    #[error("filter chain has no entry point")]
    Unassembled,
}

/// An ordered filter sequence wrapping an entry point.
///
/// Chains are pooled: [`FilterChain::assemble`] fills a recycled chain for one request, and
/// recycling it drops the filters and the entry point so nothing request-scoped outlives the
/// request.
#[derive(Default)]
pub struct FilterChain {
    filters: Filters,
    endpoint: Option<EntryPoint>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(filters: Filters, endpoint: EntryPoint) -> Self {
        Self { filters, endpoint: Some(endpoint) }
    }

    pub fn assemble(&mut self, filters: Filters, endpoint: EntryPoint) {
        self.filters = filters;
        self.endpoint = Some(endpoint);
    }

    pub fn filters(&self) -> &[Arc<dyn Filter>] {
        &self.filters
    }

    pub fn is_assembled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// The continuation starting at the first filter.
    pub fn head(&self) -> Option<Next<'_>> {
        self.endpoint.as_ref().map(|endpoint| Next::new(&self.filters, endpoint))
    }

    /// Runs every filter in order, then the entry point.
    pub async fn run(&self, req: &mut Request, resp: &mut Response) -> HandlerResult {
        match self.head() {
            Some(next) => next.run(req, resp).await,
            None => Err(ChainError::Unassembled.into()),
        }
    }

    pub(crate) fn detach_filters(&mut self) -> Filters {
        mem::take(&mut self.filters)
    }
}

impl Recycle for FilterChain {
    fn recycle(&mut self) {
        self.filters.clear();
        self.endpoint = None;
    }
}

impl Recycle for Filters {
    fn recycle(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.filters.len())
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// The rest of a chain, as seen by one filter.
///
/// `Next` is `Copy`: running it zero times short-circuits the request, running it more than
/// once replays the remaining filters and the entry point.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    filters: &'a [Arc<dyn Filter>],
    endpoint: &'a EntryPoint,
}

impl<'a> Next<'a> {
    pub fn new(filters: &'a [Arc<dyn Filter>], endpoint: &'a EntryPoint) -> Self {
        Self { filters, endpoint }
    }

    /// Number of filters left before the entry point.
    pub fn remaining(&self) -> usize {
        self.filters.len()
    }

    pub async fn run(self, req: &mut Request, resp: &mut Response) -> HandlerResult {
        match self.filters.split_first() {
            Some((filter, rest)) => filter.filter(req, resp, Next::new(rest, self.endpoint)).await,
            None => self.endpoint.invoke(req, resp).await,
        }
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").field("remaining", &self.filters.len()).field("endpoint", self.endpoint).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{ChainError, FilterChain, Next};
    use crate::filter::{Filter, Filters};
    use crate::handler::{BoxError, EntryPoint, HandlerResult, handler_fn};
    use crate::pool::Recycle;
    use crate::{Request, Response};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
        pass: bool,
    }

    #[async_trait]
    impl Filter for Recorder {
        async fn filter(&self, req: &mut Request, resp: &mut Response, next: Next<'_>) -> HandlerResult {
            self.log.lock().push(format!("{}-before", self.name));
            if !self.pass {
                return Ok(());
            }
            next.run(req, resp).await?;
            self.log.lock().push(format!("{}-after", self.name));
            Ok(())
        }
    }

    struct Twice;

    #[async_trait]
    impl Filter for Twice {
        async fn filter(&self, req: &mut Request, resp: &mut Response, next: Next<'_>) -> HandlerResult {
            next.run(req, resp).await?;
            next.run(req, resp).await
        }
    }

    fn recorder(name: &'static str, log: &Log, pass: bool) -> Arc<dyn Filter> {
        Arc::new(Recorder { name, log: Arc::clone(log), pass })
    }

    fn terminal(log: &Log) -> EntryPoint {
        let log = Arc::clone(log);
        EntryPoint::Function(Arc::new(handler_fn(move |_req, resp| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().push("T".to_string());
                resp.write(b"T");
                Ok(())
            })
        })))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_execution_order() {
        let log = Log::default();
        let filters: Filters = vec![recorder("A", &log, true), recorder("B", &log, true)];
        let chain = FilterChain::build(filters, terminal(&log));

        chain.run(&mut Request::new(), &mut Response::new()).await.unwrap();

        assert_eq!(*log.lock(), ["A-before", "B-before", "T", "B-after", "A-after"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_short_circuit() {
        let log = Log::default();
        let filters: Filters = vec![recorder("A", &log, false), recorder("B", &log, true)];
        let chain = FilterChain::build(filters, terminal(&log));

        let mut resp = Response::new();
        chain.run(&mut Request::new(), &mut resp).await.unwrap();

        assert_eq!(*log.lock(), ["A-before"]);
        assert!(resp.body().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_next_runs_twice() {
        let log = Log::default();
        let filters: Filters = vec![Arc::new(Twice), recorder("B", &log, true)];
        let chain = FilterChain::build(filters, terminal(&log));

        let mut resp = Response::new();
        chain.run(&mut Request::new(), &mut resp).await.unwrap();

        assert_eq!(*log.lock(), ["B-before", "T", "B-after", "B-before", "T", "B-after"]);
        assert_eq!(resp.body(), b"TT");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_empty_chain_runs_endpoint() {
        let log = Log::default();
        let chain = FilterChain::build(Vec::new(), terminal(&log));
        assert_eq!(chain.head().unwrap().remaining(), 0);

        chain.run(&mut Request::new(), &mut Response::new()).await.unwrap();
        assert_eq!(*log.lock(), ["T"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_errors_propagate_outwards() {
        let log = Log::default();
        let failing = EntryPoint::Function(Arc::new(handler_fn(|_req, _resp| {
            Box::pin(async move { Err(BoxError::from("boom")) })
        })));
        let chain = FilterChain::build(vec![recorder("A", &log, true)], failing);

        let err = chain.run(&mut Request::new(), &mut Response::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(*log.lock(), ["A-before"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_recycled_chain_is_unassembled() {
        let log = Log::default();
        let mut chain = FilterChain::new();
        chain.assemble(vec![recorder("A", &log, true)], terminal(&log));
        assert!(chain.is_assembled());

        chain.recycle();
        assert!(!chain.is_assembled());
        assert!(chain.filters().is_empty());
        // the recorder is no longer retained by the chain
        assert_eq!(Arc::strong_count(&log), 1);

        let err = chain.run(&mut Request::new(), &mut Response::new()).await.unwrap_err();
        assert_eq!(err.downcast_ref::<ChainError>(), Some(&ChainError::Unassembled));
    }
}
