use crate::handler::{EntryPoint, Handler, Operation};
use http::Method;
use std::sync::Arc;

/// Resolves the entry point serving `method` on `handler`.
///
/// A handler exposing a [`MethodIndicator`](crate::handler::MethodIndicator) decides alone;
/// otherwise the method maps to the canonical operation of the same name. `None` means the
/// method is not allowed on this handler, which callers answer with `405 Method Not Allowed`.
pub fn resolve(method: &Method, handler: &Arc<dyn Handler>) -> Option<EntryPoint> {
    match handler.method_indicator() {
        Some(indicator) => indicator.indicate(method),
        None => Operation::from_method(method)
            .map(|operation| EntryPoint::Operation { handler: Arc::clone(handler), operation }),
    }
}

/// The canonical methods resolving to an entry point on `handler`, in canonical order.
pub fn allowed_methods(handler: &Arc<dyn Handler>) -> Vec<Method> {
    Operation::ALL
        .iter()
        .map(|operation| operation.method())
        .filter(|method| resolve(method, handler).is_some())
        .collect()
}
