//! Shared-by-reference cell.
//!
//! Routers and endpoints are built before the broker that owns them. They
//! keep a [`Pointer`] to the broker state instead of the state itself, and
//! the broker installs its state into the cell at mount time. Every clone of
//! the pointer observes the installed value.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// A cloneable handle to a replaceable shared value.
pub struct Pointer<T> {
    cell: Arc<RwLock<Arc<T>>>,
}

impl<T> Pointer<T> {
    pub fn new(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc(value: Arc<T>) -> Self {
        Self {
            cell: Arc::new(RwLock::new(value)),
        }
    }

    /// Current value. The lock is released before returning.
    pub fn get(&self) -> Arc<T> {
        self.cell.read().clone()
    }

    /// Replace the value seen by every clone of this pointer.
    pub fn set(&self, value: Arc<T>) {
        *self.cell.write() = value;
    }

    /// Whether both pointers hold the same value.
    pub fn holds_same(&self, other: &Pointer<T>) -> bool {
        Arc::ptr_eq(&self.get(), &other.get())
    }

    /// Whether both pointers share one cell.
    pub fn same_cell(&self, other: &Pointer<T>) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T> Clone for Pointer<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: Default> Default for Pointer<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Pointer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pointer").field(&self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_is_seen_by_clones() {
        let a = Pointer::new(1);
        let b = a.clone();

        a.set(Arc::new(2));

        assert_eq!(*b.get(), 2);
        assert!(a.same_cell(&b));
        assert!(a.holds_same(&b));
    }

    #[test]
    fn test_distinct_cells() {
        let shared = Arc::new("state");
        let a = Pointer::from_arc(shared.clone());
        let b = Pointer::from_arc(shared);

        assert!(!a.same_cell(&b));
        assert!(a.holds_same(&b));
    }
}
