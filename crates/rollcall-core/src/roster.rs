//! In-memory roster of enrolled identities.
//!
//! A [`Roster`] is an immutable snapshot. [`RosterHandle`] holds the
//! current snapshot behind a single `Arc` that reloads swap wholesale, so
//! readers always see a complete roster.

use crate::store::{AttendanceStore, StoreError};
use crate::types::Identity;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Default)]
pub struct Roster {
    identities: Vec<Identity>,
}

impl Roster {
    pub fn new(identities: Vec<Identity>) -> Self {
        Self { identities }
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

/// Shared, atomically replaceable roster snapshot.
#[derive(Debug, Default)]
pub struct RosterHandle {
    current: RwLock<Arc<Roster>>,
}

impl RosterHandle {
    pub fn new(roster: Roster) -> Self {
        Self {
            current: RwLock::new(Arc::new(roster)),
        }
    }

    /// Load the roster from the store. Used at startup, where failure is fatal.
    pub async fn load(store: &dyn AttendanceStore) -> Result<Self, StoreError> {
        let identities = store.list_identities().await?;
        tracing::info!(count = identities.len(), "roster loaded");
        Ok(Self::new(Roster::new(identities)))
    }

    /// The current snapshot. Cheap; holds the lock only to clone the `Arc`.
    pub fn snapshot(&self) -> Arc<Roster> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Swap in a new snapshot, returning its size.
    pub fn replace(&self, roster: Roster) -> usize {
        let count = roster.len();
        let next = Arc::new(roster);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = next;
        count
    }

    /// Re-read identities from the store and swap them in.
    ///
    /// On failure the previous snapshot stays in place.
    pub async fn reload(&self, store: &dyn AttendanceStore) -> Result<usize, StoreError> {
        let identities = store.list_identities().await?;
        let count = self.replace(Roster::new(identities));
        tracing::info!(count, "roster reloaded");
        Ok(count)
    }
}
