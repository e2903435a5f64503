//! Change observers
//!
//! Observers carry no payload. They are told "something changed" and read
//! whatever state they care about themselves.

use std::sync::{Arc, Mutex, MutexGuard};

/// Callback invoked after the list or connectivity changes
pub trait Observer: Send + Sync {
    fn on_change(&self);
}

impl<F> Observer for F
where
    F: Fn() + Send + Sync,
{
    fn on_change(&self) {
        self()
    }
}

/// Token returned by [`Observers::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<(ObserverId, Arc<dyn Observer>)>,
}

/// Shared observer list
///
/// Cloning yields another handle on the same list.
#[derive(Clone, Default)]
pub struct Observers {
    inner: Arc<Mutex<Registry>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: impl Observer + 'static) -> ObserverId {
        let observer: Arc<dyn Observer> = Arc::new(observer);
        let mut registry = self.lock();
        let id = ObserverId(registry.next_id);
        registry.next_id += 1;
        registry.entries.push((id, observer));
        id
    }

    /// Returns whether the observer was registered
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut registry = self.lock();
        let before = registry.entries.len();
        registry.entries.retain(|(entry, _)| *entry != id);
        registry.entries.len() != before
    }

    /// Call every observer in registration order
    ///
    /// Runs over a copy of the list, so observers may register or unregister
    /// from inside the callback.
    pub fn notify(&self) {
        let observers: Vec<Arc<dyn Observer>> = self
            .lock()
            .entries
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in observers {
            observer.on_change();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.len())
            .finish()
    }
}
