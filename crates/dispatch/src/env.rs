use crate::pool::Recycle;
use crate::{Request, Response};

/// The pooled state of one request: the request and the response being built for it.
#[derive(Debug, Default)]
pub struct RequestEnv {
    request: Request,
    response: Response,
}

impl RequestEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Borrows the request and the response at the same time, as the filter chain needs them.
    pub fn split_mut(&mut self) -> (&mut Request, &mut Response) {
        (&mut self.request, &mut self.response)
    }
}

impl Recycle for RequestEnv {
    fn recycle(&mut self) {
        self.request.recycle();
        self.response.recycle();
    }
}
