//! Per-network mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per network id.
///
/// Entries are created on first use and dropped by [`NetworkLocks::prune`]
/// once nobody holds or waits on them.
#[derive(Debug, Default)]
pub struct NetworkLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl NetworkLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, network_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(network_id.to_string()).or_default())
    }

    /// Wait for exclusive access to a network
    pub async fn lock(&self, network_id: &str) -> OwnedMutexGuard<()> {
        self.entry(network_id).lock_owned().await
    }

    /// Drop locks that are neither held nor awaited
    pub fn prune(&self) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Number of networks with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
