//! Object pools for the mutable state used while processing a request.
//!
//! Serving a request needs a handful of short-lived objects: the request environment, the
//! path variable indexer, the filter slice and the filter chain. Allocating them again for
//! every request is wasted work under load, so the [`ServerPool`] keeps a free list for each of
//! these fixed kinds, plus a registry of caller-defined named pools.
//!
//! # Ownership contract
//!
//! - A value handed out by the pool is exclusively owned by the request holding it; no two
//!   concurrent requests can observe the same instance.
//! - Fixed-kind values are reset (see [`Recycle`]) by the `release_*` methods before going
//!   back to the free list, so a later acquisition always sees creation-time defaults.
//! - Named pools store opaque values: the caller resets them before [`ServerPool::release_to`].
//! - [`Pooled`] guards release their value when dropped, including on panic and cancellation.
//!
//! # Registry usage
//!
//! Named pools are meant to be registered during initialization (typically from
//! [`Handler::init`](crate::handler::Handler::init)), before serving starts. Registering later
//! is memory safe but not a supported usage: requests racing with the registration may or may
//! not see the new pool.

mod error;
mod free_list;
mod pooled;

pub use error::PoolError;
pub use free_list::Pool;
pub use pooled::{Pooled, Reclaim};

use crate::env::RequestEnv;
use crate::filter::{FilterChain, Filters};
use crate::request::VarIndexer;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Restores a value to its creation-time state while keeping its allocations.
pub trait Recycle {
    fn recycle(&mut self);
}

impl<T: Recycle + ?Sized> Recycle for Box<T> {
    fn recycle(&mut self) {
        (**self).recycle();
    }
}

/// Sizing of the pooled objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    path_var_count: usize,
    filter_count: usize,
    max_idle: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { path_var_count: 4, filter_count: 4, max_idle: 1024 }
    }
}

impl PoolConfig {
    /// Expected number of path variables, used to pre-size new indexers.
    pub fn with_path_var_count(mut self, path_var_count: usize) -> Self {
        self.path_var_count = path_var_count;
        self
    }

    /// Expected number of filters per request, used to pre-size new filter slices.
    ///
    /// Clamped to at least 1: a slice with no capacity is never pooled, see
    /// [`ServerPool::release_filters`].
    pub fn with_filter_count(mut self, filter_count: usize) -> Self {
        self.filter_count = filter_count.max(1);
        self
    }

    /// Upper bound of idle values kept by each pool.
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn path_var_count(&self) -> usize {
        self.path_var_count
    }

    pub fn filter_count(&self) -> usize {
        self.filter_count
    }

    pub fn max_idle(&self) -> usize {
        self.max_idle
    }
}

/// Idle values currently held by each fixed-kind pool.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub request_envs: usize,
    pub var_indexers: usize,
    pub filters: usize,
    pub filter_chains: usize,
}

type AnyValue = Box<dyn Any + Send>;

struct NamedPool {
    type_id: TypeId,
    type_name: &'static str,
    pool: Arc<Pool<AnyValue>>,
}

static GLOBAL_POOL: OnceCell<Arc<ServerPool>> = OnceCell::new();

/// The pools of a server: four fixed kinds and a registry of named pools.
pub struct ServerPool {
    config: PoolConfig,
    request_envs: Pool<Box<RequestEnv>>,
    var_indexers: Pool<VarIndexer>,
    filters: Pool<Filters>,
    filter_chains: Pool<FilterChain>,
    named: RwLock<HashMap<String, NamedPool>>,
}

impl Default for ServerPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl ServerPool {
    pub fn new(config: PoolConfig) -> Self {
        let path_var_count = config.path_var_count;
        let filter_count = config.filter_count;
        Self {
            config,
            request_envs: Pool::new(|| Box::new(RequestEnv::new()), config.max_idle),
            var_indexers: Pool::new(move || VarIndexer::with_capacity(path_var_count), config.max_idle),
            filters: Pool::new(move || Vec::with_capacity(filter_count), config.max_idle),
            filter_chains: Pool::new(FilterChain::new, config.max_idle),
            named: RwLock::new(HashMap::new()),
        }
    }

    /// Installs the process-wide pool. It can be installed once, before the first
    /// [`ServerPool::global`] call.
    pub fn init_global(config: PoolConfig) -> Result<Arc<ServerPool>, PoolError> {
        let pool = Arc::new(ServerPool::new(config));
        if GLOBAL_POOL.set(Arc::clone(&pool)).is_err() {
            return Err(PoolError::GlobalAlreadyInitialized);
        }
        debug!(?config, "global server pool initialized");
        Ok(pool)
    }

    /// Returns the process-wide pool, creating it with the default configuration if
    /// [`ServerPool::init_global`] was never called.
    pub fn global() -> &'static Arc<ServerPool> {
        GLOBAL_POOL.get_or_init(|| Arc::new(ServerPool::default()))
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            request_envs: self.request_envs.idle(),
            var_indexers: self.var_indexers.idle(),
            filters: self.filters.idle(),
            filter_chains: self.filter_chains.idle(),
        }
    }

    pub fn acquire_request_env(&self) -> Box<RequestEnv> {
        self.request_envs.acquire()
    }

    /// Resets and releases an environment; a still attached var indexer goes back to its own pool.
    pub fn release_request_env(&self, mut env: Box<RequestEnv>) {
        if let Some(vars) = env.request_mut().detach_vars() {
            self.release_var_indexer(vars);
        }
        env.recycle();
        self.request_envs.release(env);
    }

    pub fn request_env_guard(&self) -> Pooled<'_, Box<RequestEnv>> {
        Pooled::new(self.acquire_request_env(), self)
    }

    pub fn acquire_var_indexer(&self) -> VarIndexer {
        self.var_indexers.acquire()
    }

    pub fn release_var_indexer(&self, mut vars: VarIndexer) {
        vars.recycle();
        self.var_indexers.release(vars);
    }

    pub fn var_indexer_guard(&self) -> Pooled<'_, VarIndexer> {
        Pooled::new(self.acquire_var_indexer(), self)
    }

    pub fn acquire_filters(&self) -> Filters {
        self.filters.acquire()
    }

    /// Truncates and releases a filter slice.
    ///
    /// A slice that never allocated (`Vec::new()`, or the empty slot left in a recycled chain)
    /// is the equivalent of no slice at all: it is dropped, not pooled.
    pub fn release_filters(&self, mut filters: Filters) {
        if filters.capacity() == 0 {
            return;
        }
        filters.recycle();
        self.filters.release(filters);
    }

    pub fn filters_guard(&self) -> Pooled<'_, Filters> {
        Pooled::new(self.acquire_filters(), self)
    }

    pub fn acquire_filter_chain(&self) -> FilterChain {
        self.filter_chains.acquire()
    }

    /// Releases a chain, handing its filter slice back to the filter slice pool.
    pub fn release_filter_chain(&self, mut chain: FilterChain) {
        self.release_filters(chain.detach_filters());
        chain.recycle();
        self.filter_chains.release(chain);
    }

    pub fn filter_chain_guard(&self) -> Pooled<'_, FilterChain> {
        Pooled::new(self.acquire_filter_chain(), self)
    }

    /// Registers a named pool whose values are built by `factory`.
    pub fn register<T, F>(&self, name: impl Into<String>, factory: F) -> Result<(), PoolError>
    where
        T: Any + Send,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let name = name.into();
        let mut named = self.named.write();
        if named.contains_key(&name) {
            return Err(PoolError::already_registered(name));
        }

        let pool = Pool::new(move || Box::new(factory()) as AnyValue, self.config.max_idle);
        debug!(name = %name, value_type = type_name::<T>(), "named pool registered");
        named.insert(name, NamedPool { type_id: TypeId::of::<T>(), type_name: type_name::<T>(), pool: Arc::new(pool) });
        Ok(())
    }

    /// Acquires a value from the named pool `name`.
    ///
    /// Fails if no pool was registered under `name` or if it holds values of another type.
    pub fn acquire_from<T: Any + Send>(&self, name: &str) -> Result<Box<T>, PoolError> {
        let pool = self.named_pool::<T>(name)?;
        pool.acquire()
            .downcast::<T>()
            .map_err(|_value| PoolError::type_mismatch(name, "a foreign type", type_name::<T>()))
    }

    /// Releases a value to the named pool `name`. The value must already be reset.
    pub fn release_to<T: Any + Send>(&self, name: &str, value: Box<T>) -> Result<(), PoolError> {
        let pool = self.named_pool::<T>(name)?;
        pool.release(value);
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.named.read().contains_key(name)
    }

    fn named_pool<T: Any>(&self, name: &str) -> Result<Arc<Pool<AnyValue>>, PoolError> {
        let named = self.named.read();
        let entry = named.get(name).ok_or_else(|| PoolError::not_registered(name))?;
        if entry.type_id != TypeId::of::<T>() {
            return Err(PoolError::type_mismatch(name, entry.type_name, type_name::<T>()));
        }
        Ok(Arc::clone(&entry.pool))
    }
}

impl Reclaim<Box<RequestEnv>> for ServerPool {
    fn reclaim(&self, value: Box<RequestEnv>) {
        self.release_request_env(value);
    }
}

impl Reclaim<VarIndexer> for ServerPool {
    fn reclaim(&self, value: VarIndexer) {
        self.release_var_indexer(value);
    }
}

impl Reclaim<Filters> for ServerPool {
    fn reclaim(&self, value: Filters) {
        self.release_filters(value);
    }
}

impl Reclaim<FilterChain> for ServerPool {
    fn reclaim(&self, value: FilterChain) {
        self.release_filter_chain(value);
    }
}

impl fmt::Debug for ServerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerPool")
            .field("config", &self.config)
            .field("request_envs", &self.request_envs)
            .field("var_indexers", &self.var_indexers)
            .field("filters", &self.filters)
            .field("filter_chains", &self.filter_chains)
            .field("named", &self.named.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{PoolConfig, PoolError, PoolStats, ServerPool};
    use crate::filter::{Filter, Next};
    use crate::handler::{EmptyHandler, EntryPoint, HandlerResult, Operation};
    use crate::request::VarNames;
    use crate::{Request, Response};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct NoopFilter;

    #[async_trait]
    impl Filter for NoopFilter {
        async fn filter(&self, req: &mut Request, resp: &mut Response, next: Next<'_>) -> HandlerResult {
            next.run(req, resp).await
        }
    }

    fn pool() -> ServerPool {
        ServerPool::new(PoolConfig::default().with_path_var_count(3).with_filter_count(5))
    }

    #[test]
    fn test_request_env_round_trip() {
        let pool = pool();
        let mut env = pool.acquire_request_env();
        let (parts, _) = http::Request::builder().uri("/dirty").header("x-test", "1").body(()).unwrap().into_parts();
        env.request_mut().load(parts, Bytes::from_static(b"body"));
        env.request_mut().attrs_mut().set("user", 1_u32);
        env.response_mut().write(b"written");
        env.response_mut().set_status(http::StatusCode::IM_A_TEAPOT);
        pool.release_request_env(env);

        let env = pool.acquire_request_env();
        assert_eq!(env.request().path(), "/");
        assert!(env.request().headers().is_empty());
        assert!(env.request().body().is_empty());
        assert!(env.request().attrs().is_empty());
        assert_eq!(env.response().status(), http::StatusCode::OK);
        assert!(env.response().body().is_empty());
    }

    #[test]
    fn test_var_indexer_round_trip() {
        let pool = pool();
        let mut vars = pool.acquire_var_indexer();
        assert!(vars.capacity() >= 3);

        let names: VarNames = vec!["a".to_string(), "b".to_string()].into();
        vars.bind(names);
        vars.push("1");
        vars.push("2");
        pool.release_var_indexer(vars);

        let vars = pool.acquire_var_indexer();
        assert!(vars.is_empty());
        assert!(vars.names().is_empty());
        assert!(vars.capacity() >= 3);
    }

    #[test]
    fn test_env_release_returns_attached_vars() {
        let pool = pool();
        let mut env = pool.acquire_request_env();
        env.request_mut().attach_vars(pool.acquire_var_indexer());

        pool.release_request_env(env);

        assert_eq!(pool.var_indexers.idle(), 1);
        assert_eq!(pool.request_envs.idle(), 1);
    }

    #[test]
    fn test_zero_filter_count_still_pools_slices() {
        let pool = ServerPool::new(PoolConfig::default().with_filter_count(0));
        assert_eq!(pool.config().filter_count(), 1);

        let filters = pool.acquire_filters();
        pool.release_filters(filters);

        assert_eq!(pool.stats().filters, 1);
    }

    #[test]
    fn test_filters_round_trip() {
        let pool = pool();
        let mut filters = pool.acquire_filters();
        assert!(filters.capacity() >= 5);
        for _ in 0..7 {
            filters.push(Arc::new(NoopFilter));
        }
        let capacity = filters.capacity();
        pool.release_filters(filters);

        let filters = pool.acquire_filters();
        assert!(filters.is_empty());
        assert!(filters.capacity() >= capacity);
    }

    #[test]
    fn test_release_unallocated_filters_is_noop() {
        let pool = pool();
        pool.release_filters(Vec::new());
        assert_eq!(pool.filters.idle(), 0);
    }

    #[test]
    fn test_filter_chain_round_trip() {
        let pool = pool();
        let mut filters = pool.acquire_filters();
        filters.push(Arc::new(NoopFilter));

        let mut chain = pool.acquire_filter_chain();
        let endpoint = EntryPoint::Operation { handler: Arc::new(EmptyHandler), operation: Operation::Query };
        chain.assemble(filters, endpoint);
        assert_eq!(chain.filters().len(), 1);
        pool.release_filter_chain(chain);

        // the chain's slice went back to the slice pool
        assert_eq!(pool.filters.idle(), 1);
        let chain = pool.acquire_filter_chain();
        assert!(chain.filters().is_empty());
        assert!(!chain.is_assembled());
    }

    #[test]
    fn test_guards_release_on_drop() {
        let pool = pool();
        {
            let mut env = pool.request_env_guard();
            env.response_mut().write(b"scoped");
            let _vars = pool.var_indexer_guard();
            let _filters = pool.filters_guard();
            let _chain = pool.filter_chain_guard();
        }
        assert_eq!(pool.stats(), PoolStats { request_envs: 1, var_indexers: 1, filters: 1, filter_chains: 1 });
        assert!(pool.acquire_request_env().response().body().is_empty());
    }

    #[test]
    fn test_register_twice_fails() {
        let pool = pool();
        assert!(pool.register("buffers", || Vec::<u8>::with_capacity(64)).is_ok());

        let err = pool.register("buffers", Vec::<u8>::new).unwrap_err();
        assert_eq!(err, PoolError::AlreadyRegistered { name: "buffers".into() });
        assert_eq!(err.to_string(), "pool for 'buffers' already exists");
    }

    #[test]
    fn test_acquire_from_uses_factory() {
        let pool = pool();
        pool.register("buffers", || Vec::<u8>::with_capacity(64)).unwrap();

        let mut buffer = pool.acquire_from::<Vec<u8>>("buffers").unwrap();
        assert!(buffer.capacity() >= 64);
        buffer.extend_from_slice(b"data");
        buffer.clear();
        pool.release_to("buffers", buffer).unwrap();

        let buffer = pool.acquire_from::<Vec<u8>>("buffers").unwrap();
        assert!(buffer.is_empty());
        assert!(buffer.capacity() >= 64);
    }

    #[test]
    fn test_unregistered_name_fails() {
        let pool = pool();
        assert_eq!(pool.acquire_from::<String>("nope").unwrap_err(), PoolError::not_registered("nope"));
        assert_eq!(
            pool.release_to("nope", Box::new(String::new())).unwrap_err(),
            PoolError::not_registered("nope")
        );
    }

    #[test]
    fn test_type_mismatch_fails() {
        let pool = pool();
        pool.register("names", String::new).unwrap();

        let err = pool.acquire_from::<Vec<u8>>("names").unwrap_err();
        assert!(matches!(err, PoolError::TypeMismatch { .. }));
        assert!(pool.release_to("names", Box::new(1_u8)).is_err());
        assert!(pool.is_registered("names"));
    }

    #[test]
    fn test_global_pool() {
        let first = ServerPool::global();
        let second = ServerPool::global();
        assert!(Arc::ptr_eq(first, second));
        assert_eq!(ServerPool::init_global(PoolConfig::default()).unwrap_err(), PoolError::GlobalAlreadyInitialized);
    }

    struct Probe {
        in_use: AtomicBool,
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_never_shares() {
        let pool = Arc::new(pool());
        pool.register("probes", || Probe { in_use: AtomicBool::new(false) }).unwrap();

        let tasks = (0..128)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move {
                    for _ in 0..16 {
                        let probe = pool.acquire_from::<Probe>("probes").unwrap();
                        assert!(!probe.in_use.swap(true, Ordering::SeqCst), "probe handed out twice");
                        tokio::task::yield_now().await;
                        probe.in_use.store(false, Ordering::SeqCst);
                        pool.release_to("probes", probe).unwrap();

                        let mut env = pool.request_env_guard();
                        assert!(env.request().attrs().is_empty());
                        env.request_mut().attrs_mut().set("owner", 1_u8);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect::<Vec<_>>();

        for task in tasks {
            task.await.unwrap();
        }
    }
}
