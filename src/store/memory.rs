//! In-memory [`NetworkStore`].

use super::{NetworkInfo, NetworkStore};
use crate::error::Result;
use crate::identity::NodeCredentials;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryState {
    networks: BTreeMap<String, NetworkInfo>,
    credentials: HashMap<(String, String), NodeCredentials>,
    genesis: HashMap<String, serde_json::Value>,
}

/// Process-local store; paths are reported under a virtual root
#[derive(Debug)]
pub struct MemoryStore {
    root: PathBuf,
    state: Mutex<MemoryState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new("/besunet/networks")
    }
}

impl MemoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        MemoryStore {
            root: root.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock cannot leave the maps half-updated
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Genesis document written for a network, if any
    pub fn genesis(&self, network_id: &str) -> Option<serde_json::Value> {
        self.state().genesis.get(network_id).cloned()
    }
}

impl NetworkStore for MemoryStore {
    fn network_path(&self, network_id: &str) -> PathBuf {
        self.root.join(network_id)
    }

    fn put_network(&self, info: &NetworkInfo) -> Result<()> {
        self.state()
            .networks
            .insert(info.network_id.clone(), info.clone());
        Ok(())
    }

    fn get_network(&self, network_id: &str) -> Result<Option<NetworkInfo>> {
        Ok(self.state().networks.get(network_id).cloned())
    }

    fn list_networks(&self) -> Result<Vec<NetworkInfo>> {
        Ok(self.state().networks.values().cloned().collect())
    }

    fn purge_network(&self, network_id: &str) -> Result<()> {
        let mut state = self.state();
        state.networks.remove(network_id);
        state.genesis.remove(network_id);
        state.credentials.retain(|(net, _), _| net != network_id);
        Ok(())
    }

    fn save_credentials(
        &self,
        network_id: &str,
        node_id: &str,
        credentials: &NodeCredentials,
    ) -> Result<PathBuf> {
        self.state().credentials.insert(
            (network_id.to_string(), node_id.to_string()),
            credentials.clone(),
        );
        Ok(self.node_path(network_id, node_id))
    }

    fn load_credentials(&self, network_id: &str, node_id: &str) -> Result<Option<NodeCredentials>> {
        Ok(self
            .state()
            .credentials
            .get(&(network_id.to_string(), node_id.to_string()))
            .cloned())
    }

    fn remove_node_files(&self, network_id: &str, node_id: &str) -> Result<()> {
        self.state()
            .credentials
            .remove(&(network_id.to_string(), node_id.to_string()));
        Ok(())
    }

    fn write_genesis(&self, network_id: &str, genesis: &serde_json::Value) -> Result<PathBuf> {
        self.state()
            .genesis
            .insert(network_id.to_string(), genesis.clone());
        Ok(self.network_path(network_id).join("genesis.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BesuNodeConfig, NetworkConfig, NodeType};
    use crate::identity::generate_identity;

    #[test]
    fn test_bootnode_query_uses_record_types() {
        let store = MemoryStore::default();
        let config = NetworkConfig::new("net", 1)
            .with_node(BesuNodeConfig::new("boot", NodeType::Bootnode))
            .with_node(BesuNodeConfig::new("rpc", NodeType::Rpc));
        store
            .put_network(&NetworkInfo::reserved(config, store.network_path("net")))
            .unwrap();

        let boot = generate_identity("10.0.0.10");
        let rpc = generate_identity("10.0.0.11");
        store.save_credentials("net", "boot", &boot).unwrap();
        store.save_credentials("net", "rpc", &rpc).unwrap();

        assert_eq!(store.bootnode_enodes("net").unwrap(), vec![boot.enode]);
        assert!(store.bootnode_enodes("other").unwrap().is_empty());
    }

    #[test]
    fn test_purge_is_idempotent() {
        let store = MemoryStore::default();
        let config = NetworkConfig::new("net", 1);
        store
            .put_network(&NetworkInfo::reserved(config, store.network_path("net")))
            .unwrap();
        store.save_credentials("net", "a", &generate_identity("10.0.0.10")).unwrap();

        store.purge_network("net").unwrap();
        store.purge_network("net").unwrap();
        assert!(store.get_network("net").unwrap().is_none());
        assert!(store.load_credentials("net", "a").unwrap().is_none());
    }

    #[test]
    fn test_paths() {
        let store = MemoryStore::new("/tmp/ws/networks");
        assert_eq!(store.node_path("a", "b"), PathBuf::from("/tmp/ws/networks/a/b"));
        let genesis = store.write_genesis("a", &serde_json::json!({"config": {}})).unwrap();
        assert_eq!(genesis, PathBuf::from("/tmp/ws/networks/a/genesis.json"));
        assert!(store.genesis("a").is_some());
    }
}
