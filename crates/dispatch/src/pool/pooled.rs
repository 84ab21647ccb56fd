use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};

/// Something that takes back ownership of pooled values, resetting them on the way in.
pub trait Reclaim<T>: Sync {
    fn reclaim(&self, value: T);
}

/// A scoped acquisition of a pooled value.
///
/// The guard dereferences to the value and hands it back to its owner when dropped. Because
/// drop also runs while unwinding and when a future is cancelled, a value acquired through a
/// `Pooled` guard is released on every exit path of the scope holding it.
pub struct Pooled<'p, T> {
    value: ManuallyDrop<T>,
    owner: &'p dyn Reclaim<T>,
}

impl<'p, T> Pooled<'p, T> {
    pub fn new(value: T, owner: &'p dyn Reclaim<T>) -> Self {
        Self { value: ManuallyDrop::new(value), owner }
    }

    /// Detaches the value from the guard: the caller becomes responsible for releasing it.
    pub fn into_inner(self) -> T {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the value is taken exactly once and the guard's
        // `Drop` can't observe the emptied slot.
        unsafe { ManuallyDrop::take(&mut this.value) }
    }
}

impl<T> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.value
    }
}

impl<T> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        // SAFETY: drop runs at most once and `into_inner` suppresses it, so the value is still
        // present and is not touched again after being taken.
        let value = unsafe { ManuallyDrop::take(&mut self.value) };
        self.owner.reclaim(value);
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&*self.value).finish()
    }
}
