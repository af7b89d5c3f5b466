//! Discovery cache and identity file persistence
//!
//! One JSON file per class per publisher: `nodes-<publisherID>.json` and
//! `publishers.json` hold arrays of the corresponding discovery messages,
//! `<publisherID>-identity.json` holds the publisher's full identity. Saves
//! write to a temporary file and rename it into place so a crash never
//! leaves a half-written cache behind.

use crate::error::{Result, StorageError};
use crate::identity::identity::{PublisherFullIdentity, PublisherIdentityMessage};
use crate::messaging::messages::NodeDiscoveryMessage;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Path of the node cache file for a publisher
pub fn nodes_file(folder: &Path, publisher_id: &str) -> PathBuf {
    folder.join(format!("nodes-{}.json", publisher_id))
}

/// Path of the domain publisher cache file
pub fn publishers_file(folder: &Path) -> PathBuf {
    folder.join("publishers.json")
}

/// Path of the identity file for a publisher
pub fn identity_file(folder: &Path, publisher_id: &str) -> PathBuf {
    folder.join(format!("{}-identity.json", publisher_id))
}

/// Write a file atomically via a temporary sibling and rename
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(StorageError::from)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, data).map_err(StorageError::from)?;
    std::fs::rename(&tmp_path, path).map_err(StorageError::from)?;
    Ok(())
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| StorageError::SerializationFailed {
        reason: format!("failed to serialize {}: {}", path.display(), e),
    })?;
    write_atomic(path, &json)
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(StorageError::FileNotFound {
            path: path.to_path_buf(),
        }
        .into());
    }
    let json = std::fs::read(path).map_err(StorageError::from)?;
    let value = serde_json::from_slice(&json).map_err(|e| StorageError::SerializationFailed {
        reason: format!("failed to parse {}: {}", path.display(), e),
    })?;
    Ok(value)
}

/// Save this publisher's registered nodes
pub fn save_nodes(folder: &Path, publisher_id: &str, nodes: &[NodeDiscoveryMessage]) -> Result<()> {
    save_json(&nodes_file(folder, publisher_id), &nodes)
}

/// Load this publisher's registered nodes
pub fn load_nodes(folder: &Path, publisher_id: &str) -> Result<Vec<NodeDiscoveryMessage>> {
    load_json(&nodes_file(folder, publisher_id))
}

/// Save the discovered domain publishers
pub fn save_publishers(folder: &Path, publishers: &[PublisherIdentityMessage]) -> Result<()> {
    save_json(&publishers_file(folder), &publishers)
}

/// Load the discovered domain publishers
pub fn load_publishers(folder: &Path) -> Result<Vec<PublisherIdentityMessage>> {
    load_json(&publishers_file(folder))
}

/// Save a publisher's full identity, restricting file permissions
pub fn save_identity(folder: &Path, publisher_id: &str, identity: &PublisherFullIdentity) -> Result<()> {
    let path = identity_file(folder, publisher_id);
    save_json(&path, identity)?;

    // The file carries private keys; keep it readable by the owner only.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&path)
            .map_err(StorageError::from)?
            .permissions();
        perms.set_mode(0o600);
        std::fs::set_permissions(&path, perms).map_err(StorageError::from)?;
    }

    Ok(())
}

/// Load a publisher's full identity
pub fn load_identity(folder: &Path, publisher_id: &str) -> Result<PublisherFullIdentity> {
    load_json(&identity_file(folder, publisher_id))
}
