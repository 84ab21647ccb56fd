use crate::handler::{EntryPoint, Handler, HandlerFn, MethodError, MethodIndicator, Operation};
use http::Method;
use std::fmt;
use std::sync::Arc;

/// A handler assembled from up to five handler functions, one per canonical method.
///
/// `FuncHandler` is a [`MethodIndicator`]: a method whose slot is unset is forbidden, it never
/// falls back to another handler. Registering a `FuncHandler` on a pattern that already has a
/// handler therefore hides that handler for *every* method, including the ones the
/// `FuncHandler` leaves unset.
///
/// # Example
/// ```
/// use http::Method;
/// use micro_dispatch::handler::{FuncHandler, handler_fn};
///
/// let mut handler = FuncHandler::new();
/// handler
///     .set_method(&Method::GET, handler_fn(|_req, resp| {
///         Box::pin(async move {
///             resp.write(b"pong");
///             Ok(())
///         })
///     }))
///     .unwrap();
///
/// assert!(handler.set_method(&Method::TRACE, handler_fn(|_req, _resp| Box::pin(async move { Ok(()) }))).is_err());
/// ```
#[derive(Default, Clone)]
pub struct FuncHandler {
    get: Option<Arc<dyn HandlerFn>>,
    post: Option<Arc<dyn HandlerFn>>,
    put: Option<Arc<dyn HandlerFn>>,
    patch: Option<Arc<dyn HandlerFn>>,
    delete: Option<Arc<dyn HandlerFn>>,
}

impl FuncHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the function serving `method`, replacing any previous one.
    ///
    /// Only `GET`, `POST`, `PUT`, `PATCH` and `DELETE` can be set.
    pub fn set_method<F: HandlerFn + 'static>(&mut self, method: &Method, f: F) -> Result<(), MethodError> {
        self.set_shared(method, Arc::new(f))
    }

    /// Like [`FuncHandler::set_method`], for a function shared with other handlers.
    pub fn set_shared(&mut self, method: &Method, f: Arc<dyn HandlerFn>) -> Result<(), MethodError> {
        let operation = Operation::from_method(method).ok_or_else(|| MethodError::Unsupported(method.clone()))?;
        *self.slot_mut(operation) = Some(f);
        Ok(())
    }

    /// Builder form of [`FuncHandler::set_method`].
    pub fn on<F: HandlerFn + 'static>(mut self, method: &Method, f: F) -> Result<Self, MethodError> {
        self.set_method(method, f)?;
        Ok(self)
    }

    fn slot(&self, operation: Operation) -> Option<&Arc<dyn HandlerFn>> {
        match operation {
            Operation::Query => self.get.as_ref(),
            Operation::Create => self.post.as_ref(),
            Operation::Replace => self.put.as_ref(),
            Operation::PartialUpdate => self.patch.as_ref(),
            Operation::Delete => self.delete.as_ref(),
        }
    }

    fn slot_mut(&mut self, operation: Operation) -> &mut Option<Arc<dyn HandlerFn>> {
        match operation {
            Operation::Query => &mut self.get,
            Operation::Create => &mut self.post,
            Operation::Replace => &mut self.put,
            Operation::PartialUpdate => &mut self.patch,
            Operation::Delete => &mut self.delete,
        }
    }
}

impl Handler for FuncHandler {
    fn method_indicator(&self) -> Option<&dyn MethodIndicator> {
        Some(self)
    }
}

impl MethodIndicator for FuncHandler {
    fn indicate(&self, method: &Method) -> Option<EntryPoint> {
        let operation = Operation::from_method(method)?;
        self.slot(operation).map(|f| EntryPoint::Function(Arc::clone(f)))
    }
}

impl fmt::Debug for FuncHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods = Operation::ALL
            .iter()
            .filter(|operation| self.slot(**operation).is_some())
            .map(|operation| operation.method())
            .collect::<Vec<_>>();
        f.debug_struct("FuncHandler").field("methods", &methods).finish()
    }
}
