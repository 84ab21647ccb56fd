//! Ready-made filters for `micro-dispatch`
//!
//! - [`CompressFilter`]: compresses response bodies with `zstd`, `br`, `gzip` or `deflate`,
//!   following the request's `Accept-Encoding`
//! - [`AccessLogFilter`]: logs method, path, status and latency of every request with `tracing`
//!
//! Both are plain [`Filter`](micro_dispatch::filter::Filter)s and can be registered globally or
//! per route:
//!
//! ```
//! use micro_dispatch::Router;
//! use micro_dispatch::handler::EmptyHandler;
//! use micro_dispatch::router::handle;
//! use micro_toolbox::{AccessLogFilter, CompressFilter};
//!
//! let router = Router::builder()
//!     .filter(AccessLogFilter::new())
//!     .route("/", handle(EmptyHandler).with(CompressFilter::new()))
//!     .build()
//!     .unwrap();
//! # let _ = router;
//! ```

mod access_log;
mod compress;

pub use access_log::AccessLogFilter;
pub use compress::{CompressFilter, DEFAULT_MIN_SIZE};
