//! Invalidatable assumptions
//!
//! An assumption is a named boolean flag that caches rely on. It starts
//! valid and is invalidated at most once, when the invariant it stands
//! for is broken by a structural mutation somewhere else in the object
//! graph. Holders check it on next use; invalidation is never pushed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// An invalidate-once validity flag shared by reference.
///
/// Relaxed ordering is sufficient: the VM is thread-confined, the
/// atomic only satisfies `Send + Sync`.
#[derive(Debug)]
pub struct Assumption {
    name: &'static str,
    valid: AtomicBool,
}

impl Assumption {
    /// Create a new, valid assumption.
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            valid: AtomicBool::new(true),
        })
    }

    /// The name this assumption was registered under.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Check whether the assumption still holds.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Relaxed)
    }

    /// Permanently invalidate the assumption.
    ///
    /// Idempotent; only the first call has any effect.
    pub fn invalidate(&self) {
        if self.valid.swap(false, Ordering::Relaxed) {
            tracing::debug!(name = self.name, "assumption invalidated");
        }
    }
}
