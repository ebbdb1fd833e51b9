use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use tokio_util::sync::CancellationToken;

use crate::container::ContainerID;

/// Handle returned by [`CancellationRegistry::register`].
///
/// The generation identifies this registration among later ones for the same id.
#[derive(Debug, Clone)]
pub struct Registration {
    generation: u64,
    token: CancellationToken,
}

impl Registration {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Tracks the cancellation handle of every in-flight start handling, keyed by the id of the
/// monitored container.
///
/// Every operation takes the lock for the duration of a single map access. Operations on
/// unknown ids are no-ops.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    entries: RwLock<HashMap<ContainerID, Registration>>,
    generations: AtomicU64,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a cancellable token from `parent` and stores it under `id`.
    ///
    /// A previous entry for the same id is replaced without being cancelled. Cancelling
    /// `parent` also cancels the returned token.
    pub fn register(&self, id: ContainerID, parent: &CancellationToken) -> Registration {
        let registration = Registration {
            generation: self.generations.fetch_add(1, Ordering::Relaxed),
            token: parent.child_token(),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, registration.clone());
        registration
    }

    /// Cancels and drops the entry stored under `id`, if any.
    pub fn cancel(&self, id: &ContainerID) {
        let registration = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if let Some(registration) = registration {
            log::debug!("Cancelling in-flight start handling for `{}`", id);
            registration.token.cancel();
        }
    }

    /// Drops the entry stored under `id` without cancelling it.
    pub fn remove(&self, id: &ContainerID) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    /// Drops the entry stored under `id` only if it is still `registration`.
    ///
    /// A later registration for the same id is left in place.
    pub fn release(&self, id: &ContainerID, registration: &Registration) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries
            .get(id)
            .is_some_and(|current| current.generation == registration.generation)
        {
            entries.remove(id);
        }
    }

    pub fn contains(&self, id: &ContainerID) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
