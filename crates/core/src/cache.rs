//! Shared resource cache.
//!
//! Expensive backend objects (a loaded inference model, for instance) are
//! constructed once per identity and shared by every live instance that
//! asks for the same identity. A fault on the shared object invalidates the
//! entry and hands back the other dependents so the caller can abort them.
//!
//! One async mutex guards the whole map and is held while a factory runs,
//! so construction happens at most once per identity and an acquire can
//! never observe an entry that is being invalidated.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::metrics::SHARED_RESOURCES;

struct CacheEntry<H> {
    handle: H,
    dependents: HashSet<String>,
}

/// Keyed cache of shared handles with dependent tracking.
pub struct SharedResourceCache<H> {
    entries: Mutex<HashMap<String, CacheEntry<H>>>,
}

impl<H> Default for SharedResourceCache<H> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<H: Clone> SharedResourceCache<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle for `identity`, constructing it with `factory` if absent,
    /// and records `instance_id` as a dependent.
    ///
    /// A failing factory leaves no entry behind.
    pub async fn acquire<F, Fut, E>(
        &self,
        identity: &str,
        instance_id: &str,
        factory: F,
    ) -> Result<H, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<H, E>>,
    {
        let mut entries = self.entries.lock().await;

        if let Some(entry) = entries.get_mut(identity) {
            entry.dependents.insert(instance_id.to_string());
            debug!(
                "Reusing shared resource {} for {} ({} dependents)",
                identity,
                instance_id,
                entry.dependents.len()
            );
            return Ok(entry.handle.clone());
        }

        let handle = factory().await?;
        entries.insert(
            identity.to_string(),
            CacheEntry {
                handle: handle.clone(),
                dependents: HashSet::from([instance_id.to_string()]),
            },
        );
        SHARED_RESOURCES.set(entries.len() as i64);
        debug!("Created shared resource {} for {}", identity, instance_id);
        Ok(handle)
    }

    /// Drops `instance_id` from the dependents; destroys the entry when none remain.
    ///
    /// Returns true if the entry was destroyed.
    pub async fn release(&self, identity: &str, instance_id: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(identity) else {
            return false;
        };
        entry.dependents.remove(instance_id);
        if !entry.dependents.is_empty() {
            return false;
        }
        entries.remove(identity);
        SHARED_RESOURCES.set(entries.len() as i64);
        debug!("Destroyed shared resource {}", identity);
        true
    }

    /// Removes the entry after `faulted` observed a fault on it.
    ///
    /// Returns every other dependent; they share a broken resource and must be aborted.
    pub async fn invalidate(&self, identity: &str, faulted: &str) -> Vec<String> {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.remove(identity) else {
            return Vec::new();
        };
        SHARED_RESOURCES.set(entries.len() as i64);

        let mut others: Vec<String> = entry
            .dependents
            .into_iter()
            .filter(|id| id != faulted)
            .collect();
        others.sort();
        if !others.is_empty() {
            warn!(
                "Shared resource {} invalidated by {}; aborting {} dependents",
                identity,
                faulted,
                others.len()
            );
        }
        others
    }

    pub async fn contains(&self, identity: &str) -> bool {
        self.entries.lock().await.contains_key(identity)
    }

    /// Sorted dependents of an entry.
    pub async fn dependents(&self, identity: &str) -> Option<Vec<String>> {
        let entries = self.entries.lock().await;
        entries.get(identity).map(|entry| {
            let mut ids: Vec<String> = entry.dependents.iter().cloned().collect();
            ids.sort();
            ids
        })
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
