//! Filesystem [`NetworkStore`] rooted at `<workspace>/networks`.
//!
//! Key files are written exactly as Besu and other tooling read them: bare
//! hex without `0x` and without a trailing newline.

use super::{NetworkInfo, NetworkStore};
use crate::error::{OrchestratorError, Result};
use crate::identity::NodeCredentials;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};

const NETWORK_RECORD: &str = "network.json";
const GENESIS_FILE: &str = "genesis.json";
const KEY_FILE: &str = "key";
const PUBLIC_KEY_FILE: &str = "key.pub";
const ADDRESS_FILE: &str = "address";
const ENODE_FILE: &str = "enode";

#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Store rooted at `root` (the `networks` directory itself)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<networkId>`, refusing ids that would leave the root
    fn network_dir(&self, network_id: &str) -> Result<PathBuf> {
        self.check_component(network_id)?;
        Ok(self.root.join(network_id))
    }

    fn node_dir(&self, network_id: &str, node_id: &str) -> Result<PathBuf> {
        self.check_component(node_id)?;
        Ok(self.network_dir(network_id)?.join(node_id))
    }

    fn check_component(&self, id: &str) -> Result<()> {
        if is_plain_component(id) {
            return Ok(());
        }
        Err(OrchestratorError::storage(
            &self.root,
            io::Error::new(ErrorKind::InvalidInput, format!("'{}' is not a plain directory name", id)),
        ))
    }
}

/// Exactly one normal path component: no separators, no `.` or `..`
fn is_plain_component(id: &str) -> bool {
    let mut components = Path::new(id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| OrchestratorError::storage(path, e))
}

/// Write through a temporary sibling so readers never see a partial file
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    fs::write(&tmp, contents).map_err(|e| OrchestratorError::storage(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| OrchestratorError::storage(path, e))
}

/// Read a file, mapping "does not exist" to `None`
fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents.trim().to_string())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(OrchestratorError::storage(path, e)),
    }
}

fn remove_dir_if_present(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(OrchestratorError::storage(path, e)),
    }
}

fn restrict_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| OrchestratorError::storage(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

impl NetworkStore for FsStore {
    fn network_path(&self, network_id: &str) -> PathBuf {
        self.root.join(network_id)
    }

    fn put_network(&self, info: &NetworkInfo) -> Result<()> {
        let dir = self.network_dir(&info.network_id)?;
        create_dir(&dir)?;
        let json = serde_json::to_vec_pretty(info)
            .map_err(|e| OrchestratorError::serialization(format!("network {}", info.network_id), e))?;
        write_atomic(&dir.join(NETWORK_RECORD), &json)
    }

    fn get_network(&self, network_id: &str) -> Result<Option<NetworkInfo>> {
        let path = self.network_dir(network_id)?.join(NETWORK_RECORD);
        match read_optional(&path)? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| OrchestratorError::serialization(path.display().to_string(), e)),
            None => Ok(None),
        }
    }

    fn list_networks(&self) -> Result<Vec<NetworkInfo>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(OrchestratorError::storage(&self.root, e)),
        };

        let mut networks = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| OrchestratorError::storage(&self.root, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            let network_id = entry.file_name().to_string_lossy().into_owned();
            // An unreadable record still claims its resources
            match self.get_network(&network_id)? {
                Some(info) => networks.push(info),
                None => log::debug!("Skipping {} without a network record", network_id),
            }
        }
        networks.sort_by(|a, b| a.network_id.cmp(&b.network_id));
        Ok(networks)
    }

    fn purge_network(&self, network_id: &str) -> Result<()> {
        remove_dir_if_present(&self.network_dir(network_id)?)
    }

    fn save_credentials(
        &self,
        network_id: &str,
        node_id: &str,
        credentials: &NodeCredentials,
    ) -> Result<PathBuf> {
        let dir = self.node_dir(network_id, node_id)?;
        create_dir(&dir)?;

        let key_path = dir.join(KEY_FILE);
        write_atomic(&key_path, credentials.private_key.as_bytes())?;
        restrict_permissions(&key_path)?;
        write_atomic(&dir.join(PUBLIC_KEY_FILE), credentials.public_key.as_bytes())?;
        write_atomic(&dir.join(ADDRESS_FILE), credentials.address.as_bytes())?;
        write_atomic(&dir.join(ENODE_FILE), credentials.enode.as_bytes())?;

        log::debug!("Stored credentials of {}/{} in {}", network_id, node_id, dir.display());
        Ok(dir)
    }

    fn load_credentials(&self, network_id: &str, node_id: &str) -> Result<Option<NodeCredentials>> {
        let dir = self.node_dir(network_id, node_id)?;
        let private_key = match read_optional(&dir.join(KEY_FILE))? {
            Some(key) => key,
            None => return Ok(None),
        };
        let public_key = read_optional(&dir.join(PUBLIC_KEY_FILE))?.unwrap_or_default();
        let address = read_optional(&dir.join(ADDRESS_FILE))?.unwrap_or_default();
        let enode = read_optional(&dir.join(ENODE_FILE))?.unwrap_or_default();

        Ok(Some(NodeCredentials {
            private_key,
            public_key,
            address,
            enode,
        }))
    }

    fn remove_node_files(&self, network_id: &str, node_id: &str) -> Result<()> {
        remove_dir_if_present(&self.node_dir(network_id, node_id)?)
    }

    fn write_genesis(&self, network_id: &str, genesis: &serde_json::Value) -> Result<PathBuf> {
        let dir = self.network_dir(network_id)?;
        create_dir(&dir)?;
        let path = dir.join(GENESIS_FILE);
        let json = serde_json::to_vec_pretty(genesis)
            .map_err(|e| OrchestratorError::serialization(format!("genesis of {}", network_id), e))?;
        write_atomic(&path, &json)?;
        Ok(path)
    }
}
