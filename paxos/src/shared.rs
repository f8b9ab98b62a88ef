//! # Summary
//!
//! This module wraps a role's state machine so that the receive loop and
//! the proposer's timer tasks can share it. One lock per process is the
//! only synchronization: every handler runs to completion while holding it.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

/// Thread-safe wrapper around a role.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub struct Shared<T>(Arc<Mutex<T>>);

impl<T> Shared<T> {
    pub fn new(inner: T) -> Self {
        Shared(Arc::new(Mutex::new(inner)))
    }

    /// Acquires the lock on the underlying role.
    pub fn lock(&self) -> MutexGuard<T> {
        self.0.lock()
    }
}
