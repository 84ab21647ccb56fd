//! Handlers and method resolution.
//!
//! A [`Handler`] is the per-resource unit of request logic. It exposes one entry point per
//! canonical HTTP method:
//!
//! | method   | operation                    | handler method      |
//! |----------|------------------------------|---------------------|
//! | `GET`    | [`Operation::Query`]         | [`Handler::get`]    |
//! | `POST`   | [`Operation::Create`]        | [`Handler::post`]   |
//! | `PUT`    | [`Operation::Replace`]       | [`Handler::put`]    |
//! | `PATCH`  | [`Operation::PartialUpdate`] | [`Handler::patch`]  |
//! | `DELETE` | [`Operation::Delete`]        | [`Handler::delete`] |
//!
//! A handler that wants to decide by itself which code runs for a method exposes the
//! [`MethodIndicator`] capability through [`Handler::method_indicator`]; [`resolve`] then
//! delegates to it and never looks at the canonical methods.
//!
//! [`FuncHandler`] is a ready-made indicator assembled from plain functions.

mod func_handler;
mod handler_fn;
mod resolve;

pub use func_handler::FuncHandler;
pub use handler_fn::{FnHandler, HandlerFn, handler_fn};
pub use resolve::{allowed_methods, resolve};

use crate::pool::ServerPool;
use crate::{Request, Response};
use async_trait::async_trait;
use http::Method;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub type BoxError = Box<dyn Error + Send + Sync>;

/// Outcome of a handler operation, a handler function or a filter.
pub type HandlerResult = Result<(), BoxError>;

/// The per-resource request logic.
///
/// Every method has a default: lifecycle hooks do nothing and canonical operations succeed
/// without touching the response. Implementors override what they serve.
///
/// `init` runs once when the server is built, before any request is served; an error aborts
/// the server build. It receives the pool the server serves with: a handler needing named
/// pools at request time registers them here and keeps a clone of the `Arc`.
/// `destroy` runs once when the server is dropped.
#[async_trait]
pub trait Handler: Send + Sync {
    fn init(&mut self, _pool: &Arc<ServerPool>) -> Result<(), BoxError> {
        Ok(())
    }

    fn destroy(&self) {}

    /// query
    async fn get(&self, _req: &mut Request, _resp: &mut Response) -> HandlerResult {
        Ok(())
    }

    /// create
    async fn post(&self, _req: &mut Request, _resp: &mut Response) -> HandlerResult {
        Ok(())
    }

    /// create or replace
    async fn put(&self, _req: &mut Request, _resp: &mut Response) -> HandlerResult {
        Ok(())
    }

    /// partial update
    async fn patch(&self, _req: &mut Request, _resp: &mut Response) -> HandlerResult {
        Ok(())
    }

    async fn delete(&self, _req: &mut Request, _resp: &mut Response) -> HandlerResult {
        Ok(())
    }

    /// Exposes the [`MethodIndicator`] capability, if this handler has it.
    fn method_indicator(&self) -> Option<&dyn MethodIndicator> {
        None
    }
}

/// A handler doing nothing, to delegate to or to use as a placeholder.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyHandler;

impl Handler for EmptyHandler {}

/// Lets a handler choose the entry point for a method by itself.
pub trait MethodIndicator: Send + Sync {
    /// Returns the entry point for `method`; `None` means the method is forbidden.
    fn indicate(&self, method: &Method) -> Option<EntryPoint>;
}

/// The canonical operations of a [`Handler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Query,
    Create,
    Replace,
    PartialUpdate,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 5] =
        [Operation::Query, Operation::Create, Operation::Replace, Operation::PartialUpdate, Operation::Delete];

    /// Maps a method to its operation; methods other than the five canonical ones have none.
    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(Operation::Query),
            Method::POST => Some(Operation::Create),
            Method::PUT => Some(Operation::Replace),
            Method::PATCH => Some(Operation::PartialUpdate),
            Method::DELETE => Some(Operation::Delete),
            _ => None,
        }
    }

    pub fn method(self) -> Method {
        match self {
            Operation::Query => Method::GET,
            Operation::Create => Method::POST,
            Operation::Replace => Method::PUT,
            Operation::PartialUpdate => Method::PATCH,
            Operation::Delete => Method::DELETE,
        }
    }
}

/// The code selected to serve a request: a handler operation or a handler function.
#[derive(Clone)]
pub enum EntryPoint {
    Operation { handler: Arc<dyn Handler>, operation: Operation },
    Function(Arc<dyn HandlerFn>),
}

impl EntryPoint {
    pub async fn invoke(&self, req: &mut Request, resp: &mut Response) -> HandlerResult {
        match self {
            EntryPoint::Operation { handler, operation } => match operation {
                Operation::Query => handler.get(req, resp).await,
                Operation::Create => handler.post(req, resp).await,
                Operation::Replace => handler.put(req, resp).await,
                Operation::PartialUpdate => handler.patch(req, resp).await,
                Operation::Delete => handler.delete(req, resp).await,
            },
            EntryPoint::Function(f) => f.call(req, resp).await,
        }
    }

    /// The canonical operation this entry point runs, `None` for handler functions.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            EntryPoint::Operation { operation, .. } => Some(*operation),
            EntryPoint::Function(_) => None,
        }
    }

    pub fn function(&self) -> Option<&Arc<dyn HandlerFn>> {
        match self {
            EntryPoint::Operation { .. } => None,
            EntryPoint::Function(f) => Some(f),
        }
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryPoint::Operation { operation, .. } => f.debug_tuple("Operation").field(operation).finish(),
            EntryPoint::Function(_) => f.write_str("Function"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MethodError {
    #[error("unsupported method: {0}")]
    Unsupported(Method),
}
