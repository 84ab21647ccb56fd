//! The request-dispatch core of a micro web framework
//!
//! This crate decides which user code runs for a request and runs it: it resolves the entry
//! point of a handler for the request method, wraps it in an ordered chain of filters and
//! serves it with per-request state taken from object pools, so a busy server reuses the same
//! allocations request after request.
//!
//! # Features
//!
//! - Method resolution with the five canonical operations, or a handler-defined
//!   [`MethodIndicator`](handler::MethodIndicator)
//! - Handlers assembled from plain async functions ([`FuncHandler`](handler::FuncHandler))
//! - Filter chains with short-circuiting and post-processing
//! - Pooled request state released on every exit path, including panics
//! - Named pools for handler-defined objects
//!
//! The transport is not part of this crate: anything producing an `http::Request` can call
//! [`Server::call`].
//!
//! # Example
//!
//! ```
//! use async_trait::async_trait;
//! use bytes::Bytes;
//! use http_body_util::{BodyExt, Full};
//! use micro_dispatch::handler::{Handler, HandlerResult};
//! use micro_dispatch::router::handle;
//! use micro_dispatch::{Request, Response, Router, Server};
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl Handler for Hello {
//!     async fn get(&self, req: &mut Request, resp: &mut Response) -> HandlerResult {
//!         let name = req.var("name").unwrap_or("world").to_string();
//!         resp.write(format!("hello {name}").as_bytes());
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let router = Router::builder().route("/hello/{name}", handle(Hello)).build()?;
//! let server = Server::builder().router(router).build()?;
//!
//! let request = http::Request::get("/hello/dispatch").body(Full::new(Bytes::new()))?;
//! let response = server.call(request).await;
//! assert_eq!(response.into_body().collect().await?.to_bytes(), "hello dispatch");
//! # Ok(())
//! # }
//! ```

mod attr;
mod env;
mod request;
mod response;

pub mod filter;
pub mod handler;
pub mod pool;
pub mod router;
pub mod server;

pub use attr::AttrContainer;
pub use env::RequestEnv;
pub use request::{Request, VarIndexer, VarNames};
pub use response::Response;
pub use router::Router;
pub use server::Server;
