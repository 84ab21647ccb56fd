//! Per-request attribute storage.
//!
//! The [`AttrContainer`] is scratch space shared by the filters and the handler of a single
//! request. It lets a filter hand request-scoped data (an authenticated identity, a parsed
//! token, a timer...) to the code further down the chain without changing any signature.

use crate::pool::Recycle;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

type AttrValue = Box<dyn Any + Send + Sync>;

/// A mapping from string keys to opaque, typed values.
///
/// Values are stored type-erased and recovered with a typed lookup; asking for the wrong type
/// behaves like a missing key.
#[derive(Default)]
pub struct AttrContainer {
    attrs: HashMap<String, AttrValue>,
}

impl AttrContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, returning the previous value when it had the same type.
    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) -> Option<T> {
        self.attrs
            .insert(key.into(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.attrs.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.attrs.get_mut(key).and_then(|value| value.downcast_mut::<T>())
    }

    /// Removes the value under `key`.
    ///
    /// The entry is removed even when it does not hold a `T`, in which case `None` is returned.
    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        self.attrs.remove(key).and_then(|value| value.downcast::<T>().ok()).map(|value| *value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.attrs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Drops every attribute, keeping the allocated table.
    pub fn clear(&mut self) {
        self.attrs.clear();
    }

    pub fn capacity(&self) -> usize {
        self.attrs.capacity()
    }
}

impl Recycle for AttrContainer {
    fn recycle(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for AttrContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.attrs.keys()).finish()
    }
}
