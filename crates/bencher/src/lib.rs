use async_trait::async_trait;
use bytes::Bytes;
use http::request::Parts;
use micro_dispatch::filter::{Filter, Next};
use micro_dispatch::handler::{Handler, HandlerResult};
use micro_dispatch::router::{RouteBuilder, handle};
use micro_dispatch::{Request, Response, Router, Server};

#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    filters: usize,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup, filters: usize) -> Self {
        Self { name, group, filters }
    }

    pub fn small(name: &'static str, filters: usize) -> Self {
        Self::new(name, TestGroup::Small, filters)
    }

    pub fn normal(name: &'static str, filters: usize) -> Self {
        Self::new(name, TestGroup::Normal, filters)
    }

    pub fn large(name: &'static str, filters: usize) -> Self {
        Self::new(name, TestGroup::Large, filters)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn filters(&self) -> usize {
        self.filters
    }

    /// A server with one route, `/users/{id}`, wrapped in `filters` pass-through filters.
    pub fn server(&self) -> Server {
        let route = (0..self.filters).fold(handle(Echo), |route: RouteBuilder, _| route.with(PassThrough));
        let router = Router::builder().route("/users/{id}", route).build().expect("benchmark route is valid");
        Server::builder().router(router).build().expect("benchmark server builds")
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Small,
    Normal,
    Large,
}

impl TestGroup {
    pub fn name(self) -> &'static str {
        match self {
            TestGroup::Small => "small",
            TestGroup::Normal => "normal",
            TestGroup::Large => "large",
        }
    }
}

/// Head of a `GET /users/42` request.
pub fn get_parts() -> (Parts, Bytes) {
    let (parts, ()) = http::Request::get("/users/42").body(()).expect("benchmark request is valid").into_parts();
    (parts, Bytes::new())
}

#[derive(Debug)]
struct Echo;

#[async_trait]
impl Handler for Echo {
    async fn get(&self, req: &mut Request, resp: &mut Response) -> HandlerResult {
        if let Some(id) = req.var("id") {
            resp.write(id.as_bytes());
        }
        Ok(())
    }
}

#[derive(Debug)]
struct PassThrough;

#[async_trait]
impl Filter for PassThrough {
    async fn filter(&self, req: &mut Request, resp: &mut Response, next: Next<'_>) -> HandlerResult {
        next.run(req, resp).await
    }
}
