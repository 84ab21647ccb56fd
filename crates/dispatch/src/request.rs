//! Request-side state of the per-request environment.
//!
//! This module contains:
//! - `Request`: the request data handed to filters and handlers, together with its attributes
//! - `VarIndexer`: the path variables extracted by the router for the current request
//!
//! Both types are pooled. They are filled at the start of a request and recycled at the end,
//! so their accessors never hand out data that outlives the request.

use crate::attr::AttrContainer;
use crate::pool::Recycle;
use bytes::Bytes;
use http::header::AsHeaderName;
use http::request::Parts;
use http::{HeaderMap, HeaderValue, Method, Uri, Version};
use std::sync::Arc;

/// Ordered names of the variables of a route pattern, shared by every request matching it.
pub type VarNames = Arc<[String]>;

/// The request as seen by filters and handlers.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    vars: Option<VarIndexer>,
    attrs: AttrContainer,
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    pub fn new() -> Self {
        Self {
            method: Method::GET,
            uri: Uri::default(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            vars: None,
            attrs: AttrContainer::new(),
        }
    }

    /// Loads the head and body of an incoming request into this (recycled) instance.
    ///
    /// Headers are moved into the existing map so its allocation is reused across requests.
    pub fn load(&mut self, parts: Parts, body: Bytes) {
        self.method = parts.method;
        self.uri = parts.uri;
        self.version = parts.version;
        self.headers.clear();
        self.headers.extend(parts.headers);
        self.body = body;
    }

    /// Returns the HTTP method of the request
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the URI of the request
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Returns the HTTP version of the request
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the HTTP headers of the request
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    /// Returns the raw `Accept-Encoding` header, or an empty string when absent or not ASCII.
    pub fn accept_encodings(&self) -> &str {
        self.headers
            .get(http::header::ACCEPT_ENCODING)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the value of the path variable `name`, if the matched route declares it.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.as_ref().and_then(|vars| vars.get(name))
    }

    pub fn vars(&self) -> Option<&VarIndexer> {
        self.vars.as_ref()
    }

    pub fn attrs(&self) -> &AttrContainer {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut AttrContainer {
        &mut self.attrs
    }

    pub(crate) fn attach_vars(&mut self, vars: VarIndexer) {
        self.vars = Some(vars);
    }

    pub(crate) fn detach_vars(&mut self) -> Option<VarIndexer> {
        self.vars.take()
    }
}

impl Recycle for Request {
    fn recycle(&mut self) {
        self.method = Method::GET;
        self.uri = Uri::default();
        self.version = Version::HTTP_11;
        self.headers.clear();
        self.body = Bytes::new();
        // an indexer still attached here is dropped, the pool detaches it before recycling
        self.vars = None;
        self.attrs.recycle();
    }
}

/// Path variable values of the current request, indexed by the names of the matched route.
///
/// The indexer is created with room for an expected number of variables. Binding stores a
/// shared handle to the route's names; values are pushed in pattern order.
#[derive(Debug)]
pub struct VarIndexer {
    names: Option<VarNames>,
    values: Vec<String>,
}

impl VarIndexer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { names: None, values: Vec::with_capacity(capacity) }
    }

    /// Binds the indexer to the variable names of the matched route.
    pub fn bind(&mut self, names: VarNames) {
        self.names = Some(names);
    }

    pub fn push(&mut self, value: impl Into<String>) {
        self.values.push(value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let names = self.names.as_ref()?;
        let index = names.iter().position(|candidate| candidate == name)?;
        self.get_at(index)
    }

    pub fn get_at(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        self.names.as_deref().unwrap_or_default()
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.values.capacity()
    }
}

impl Recycle for VarIndexer {
    fn recycle(&mut self) {
        self.names = None;
        self.values.clear();
    }
}
