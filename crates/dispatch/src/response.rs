//! Response-side state of the per-request environment.
//!
//! Filters and handlers write into a [`Response`]: status, headers and a body buffer. The
//! server converts it into an `http::Response` once the filter chain has finished.

use crate::pool::Recycle;
use bytes::{Bytes, BytesMut};
use http::header::{AsHeaderName, CONTENT_ENCODING, CONTENT_TYPE, IntoHeaderName};
use http::{HeaderMap, HeaderValue, StatusCode};
use http_body_util::Full;
use std::mem;

/// The mutable response of the current request.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self { status: StatusCode::OK, headers: HeaderMap::new(), body: BytesMut::new() }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Reports `status` without a body, discarding anything written so far.
    pub fn report_status(&mut self, status: StatusCode) {
        self.status = status;
        self.body.clear();
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn set_header<K: IntoHeaderName>(&mut self, name: K, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn remove_header<K: AsHeaderName>(&mut self, name: K) -> Option<HeaderValue> {
        self.headers.remove(name)
    }

    pub fn set_content_type(&mut self, mime: &mime::Mime) {
        if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
            self.headers.insert(CONTENT_TYPE, value);
        }
    }

    pub fn set_content_encoding(&mut self, encoding: &'static str) {
        self.headers.insert(CONTENT_ENCODING, HeaderValue::from_static(encoding));
    }

    /// Appends `data` to the body.
    pub fn write(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Replaces the whole body, returning what was written before.
    pub fn replace_body(&mut self, data: &[u8]) -> Bytes {
        let previous = self.body.split().freeze();
        self.body.extend_from_slice(data);
        previous
    }

    /// Moves status, headers and body out into an `http::Response`, leaving `self` reset.
    ///
    /// Headers are drained, so the header table keeps its allocation for the next request. The
    /// written body is handed off without copying: the buffer goes with the response and
    /// `BytesMut::reserve` reclaims it on a later write once the response body is dropped.
    pub(crate) fn take_http_response(&mut self) -> http::Response<Full<Bytes>> {
        let body = self.body.split().freeze();
        let mut response = http::Response::new(Full::new(body));
        *response.status_mut() = mem::replace(&mut self.status, StatusCode::OK);
        response.headers_mut().extend(self.headers.drain());
        response
    }

    pub fn body_capacity(&self) -> usize {
        self.body.capacity()
    }
}

impl Recycle for Response {
    fn recycle(&mut self) {
        self.status = StatusCode::OK;
        self.headers.clear();
        self.body.clear();
    }
}
