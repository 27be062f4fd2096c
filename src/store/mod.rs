//! App-side stores: catalog cache, user preferences, persisted key-value storage.

pub mod data;
pub mod persist;
pub mod source;
pub mod user;

use std::sync::atomic::{AtomicBool, Ordering};

pub use data::{DataState, DataStore};
pub use persist::{FileStorage, KeyValueStorage, MemoryStorage};
pub use source::{CatalogSource, RemoteCatalogSource, StaticCatalogSource};
pub use user::{UserPreferences, UserSnapshot, UserState, UserStore};

/// Single-flight flag for a store operation.
#[derive(Debug, Default)]
pub struct InFlight(AtomicBool);

impl InFlight {
    /// `None` when another call of the same operation is still running.
    pub fn try_begin(&self) -> Option<InFlightGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(&self.0))
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs a closure when dropped, including on early return and unwinding.
pub struct OnExit<F: FnMut()>(F);

impl<F: FnMut()> OnExit<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F: FnMut()> Drop for OnExit<F> {
    fn drop(&mut self) {
        (self.0)()
    }
}
