//! Maps request paths to handlers.
//!
//! Path matching is delegated to [`matchit`]; this module keeps, for every pattern, the handler,
//! its own filters and the names of the pattern's variables. Filters registered on the
//! [`RouterBuilder`] apply to every route and run before the route's filters.

use crate::filter::{Filter, Filters};
use crate::handler::Handler;
use crate::request::{VarIndexer, VarNames};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{trace, warn};

type InnerRouter = matchit::Router<usize>;

pub struct Router {
    inner: InnerRouter,
    items: Vec<RouterItem>,
    filters: Filters,
}

pub struct RouterItem {
    pattern: String,
    handler: Arc<dyn Handler>,
    filters: Filters,
    var_names: VarNames,
}

/// A matched route and the variable values captured from the path.
pub struct RouteMatch<'router, 'path> {
    item: &'router RouterItem,
    params: matchit::Params<'router, 'path>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    pub fn at<'router, 'path>(&'router self, path: &'path str) -> Option<RouteMatch<'router, 'path>> {
        match self.inner.at(path) {
            Ok(matched) => Some(RouteMatch { item: &self.items[*matched.value], params: matched.params }),
            Err(e) => {
                trace!(path, cause = %e, "no route matched");
                None
            }
        }
    }

    /// Filters applied to every route.
    pub fn filters(&self) -> &[Arc<dyn Filter>] {
        &self.filters
    }

    pub fn items(&self) -> &[RouterItem] {
        &self.items
    }

    pub(crate) fn items_mut(&mut self) -> &mut [RouterItem] {
        &mut self.items
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router").field("items", &self.items).field("filters", &self.filters.len()).finish()
    }
}

impl RouterItem {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    pub(crate) fn handler_mut(&mut self) -> &mut Arc<dyn Handler> {
        &mut self.handler
    }

    pub fn filters(&self) -> &[Arc<dyn Filter>] {
        &self.filters
    }

    pub fn var_names(&self) -> &[String] {
        &self.var_names
    }
}

impl fmt::Debug for RouterItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterItem")
            .field("pattern", &self.pattern)
            .field("filters", &self.filters.len())
            .field("var_names", &self.var_names)
            .finish()
    }
}

impl<'router> RouteMatch<'router, '_> {
    pub fn item(&self) -> &'router RouterItem {
        self.item
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Binds `vars` to the route's variable names and pushes the captured values in pattern order.
    pub fn fill_vars(&self, vars: &mut VarIndexer) {
        vars.bind(Arc::clone(&self.item.var_names));
        for (_, value) in self.params.iter() {
            vars.push(value);
        }
    }
}

#[derive(Error, Debug)]
pub enum RouterBuildError {
    #[error("invalid route '{pattern}': {source}")]
    Insert {
        pattern: String,
        #[source]
        source: matchit::InsertError,
    },
}

#[derive(Default)]
pub struct RouterBuilder {
    routes: Vec<(String, RouteBuilder)>,
    positions: HashMap<String, usize>,
    filters: Filters,
}

impl RouterBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Adds a filter running on every route, after the filters added before it.
    pub fn filter<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Registers the handler serving `pattern`.
    ///
    /// A pattern registered again replaces the earlier registration for every method.
    pub fn route(mut self, pattern: impl Into<String>, route: RouteBuilder) -> Self {
        let pattern = pattern.into();
        match self.positions.get(&pattern) {
            Some(&position) => {
                warn!(pattern = %pattern, "route registered twice, the earlier handler is replaced");
                self.routes[position].1 = route;
            }
            None => {
                self.positions.insert(pattern.clone(), self.routes.len());
                self.routes.push((pattern, route));
            }
        }
        self
    }

    pub fn build(self) -> Result<Router, RouterBuildError> {
        let mut inner = InnerRouter::new();
        let mut items = Vec::with_capacity(self.routes.len());

        for (pattern, route) in self.routes {
            inner
                .insert(pattern.as_str(), items.len())
                .map_err(|source| RouterBuildError::Insert { pattern: pattern.clone(), source })?;

            let var_names = parse_var_names(&pattern);
            items.push(RouterItem { pattern, handler: route.handler, filters: route.filters, var_names });
        }

        Ok(Router { inner, items, filters: self.filters })
    }
}

impl fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patterns = self.routes.iter().map(|(pattern, _)| pattern).collect::<Vec<_>>();
        f.debug_struct("RouterBuilder").field("patterns", &patterns).field("filters", &self.filters.len()).finish()
    }
}

/// Starts a route served by `handler`.
pub fn handle<H: Handler + 'static>(handler: H) -> RouteBuilder {
    RouteBuilder { handler: Arc::new(handler), filters: Vec::new() }
}

pub struct RouteBuilder {
    handler: Arc<dyn Handler>,
    filters: Filters,
}

impl fmt::Debug for RouteBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteBuilder").field("filters", &self.filters.len()).finish()
    }
}

impl RouteBuilder {
    /// Adds a filter running on this route only.
    pub fn with<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }
}

/// Variable names of a `matchit` pattern, `{name}` and `{*name}`, skipping `{{` escapes.
fn parse_var_names(pattern: &str) -> VarNames {
    let mut names = Vec::new();
    let mut rest = pattern;
    while let Some(start) = rest.find('{') {
        let tail = &rest[start + 1..];
        if let Some(escaped) = tail.strip_prefix('{') {
            rest = escaped;
            continue;
        }
        let Some(end) = tail.find('}') else {
            break;
        };
        names.push(tail[..end].trim_start_matches('*').to_string());
        rest = &tail[end + 1..];
    }
    names.into()
}
