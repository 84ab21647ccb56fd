use parking_lot::Mutex;
use std::fmt;
use tracing::trace;

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// A free list of reusable values backed by a factory.
///
/// [`Pool::acquire`] hands out an idle value when one is available and builds a fresh one
/// otherwise, so the pool grows on demand and never waits for another caller to release.
/// [`Pool::release`] puts a value back as is: resetting it is the releasing caller's job.
///
/// At most `max_idle` values are retained; releases beyond that bound drop the value.
pub struct Pool<T> {
    idle: Mutex<Vec<T>>,
    factory: Factory<T>,
    max_idle: usize,
}

impl<T> Pool<T> {
    pub fn new<F>(factory: F, max_idle: usize) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self { idle: Mutex::new(Vec::new()), factory: Box::new(factory), max_idle }
    }

    pub fn acquire(&self) -> T {
        // the lock must be released before running the factory
        let reused = self.idle.lock().pop();
        reused.unwrap_or_else(|| (self.factory)())
    }

    pub fn release(&self, value: T) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(value);
            return;
        }
        drop(idle);
        trace!(max_idle = self.max_idle, "pool is full, dropping released value");
    }

    /// Number of values currently waiting to be reused.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn max_idle(&self) -> usize {
        self.max_idle
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool").field("idle", &self.idle()).field("max_idle", &self.max_idle).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Pool;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_acquire_builds_lazily() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let pool = Pool::new(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Vec::<u8>::with_capacity(8)
            },
            16,
        );
        assert_eq!(created.load(Ordering::SeqCst), 0);

        let first = pool.acquire();
        let second = pool.acquire();
        assert_eq!(created.load(Ordering::SeqCst), 2);

        pool.release(first);
        pool.release(second);
        assert_eq!(pool.idle(), 2);

        let _reused = pool.acquire();
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_release_returns_value_untouched() {
        let pool = Pool::new(Vec::<u8>::new, 4);
        let mut value = pool.acquire();
        value.extend_from_slice(b"dirty");
        pool.release(value);

        assert_eq!(pool.acquire(), b"dirty");
    }

    #[test]
    fn test_release_beyond_max_idle_drops() {
        let pool = Pool::new(String::new, 2);
        let values = [pool.acquire(), pool.acquire(), pool.acquire()];
        for value in values {
            pool.release(value);
        }
        assert_eq!(pool.idle(), 2);
        assert_eq!(pool.max_idle(), 2);
    }
}
