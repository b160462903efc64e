//! Fleet registry: the set of configured TVs
//!
//! Loaded once from a JSON fleet file and read-only at request time. The only
//! mutation is an explicit [`TvRegistry::reload`], which re-reads the file and
//! swaps the whole table atomically so in-flight readers keep a consistent
//! snapshot.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::tokens::TokenStore;
use crate::{Error, Result};

/// A single configured TV
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TvDescriptor {
    /// Unique id used to address the TV in requests
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Hostname or IP address
    pub host: String,
    /// Remote-control service port
    pub port: u16,
    /// MAC address for Wake-on-LAN
    pub mac_address: String,
}

/// Fleet file schema: `{"tvs": [...]}`
#[derive(Debug, Deserialize)]
struct FleetFile {
    tvs: Vec<TvDescriptor>,
}

/// A TV descriptor joined with its pairing status
///
/// Pairing status is derived from the token store at query time, never stored
/// on the descriptor itself.
#[derive(Debug, Clone, Serialize)]
pub struct TvStatus {
    pub tv_id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub mac_address: String,
    pub is_paired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paired_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// In-memory index of the fleet configuration
pub struct TvRegistry {
    path: PathBuf,
    tvs: RwLock<Arc<Vec<TvDescriptor>>>,
}

impl TvRegistry {
    /// Load the registry from a fleet file
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file is missing, malformed, or contains
    /// duplicate ids.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tvs = read_fleet_file(&path)?;
        tracing::info!(count = tvs.len(), path = %path.display(), "loaded fleet configuration");
        Ok(Self {
            path,
            tvs: RwLock::new(Arc::new(tvs)),
        })
    }

    /// Build a registry directly from descriptors (tests, embedded use)
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` on duplicate ids.
    pub fn from_descriptors(tvs: Vec<TvDescriptor>) -> Result<Self> {
        check_unique_ids(&tvs)?;
        Ok(Self {
            path: PathBuf::new(),
            tvs: RwLock::new(Arc::new(tvs)),
        })
    }

    /// Look up a TV by id
    ///
    /// # Errors
    ///
    /// Returns `Error::TvNotFound` if the id is not configured.
    pub fn lookup(&self, tv_id: &str) -> Result<TvDescriptor> {
        self.snapshot()
            .iter()
            .find(|tv| tv.id == tv_id)
            .cloned()
            .ok_or_else(|| Error::TvNotFound(tv_id.to_string()))
    }

    /// Whether a TV id is configured
    #[must_use]
    pub fn contains(&self, tv_id: &str) -> bool {
        self.snapshot().iter().any(|tv| tv.id == tv_id)
    }

    /// All configured TVs, in fleet-file order
    #[must_use]
    pub fn list(&self) -> Vec<TvDescriptor> {
        self.snapshot().as_ref().clone()
    }

    /// All configured TVs with pairing status joined in from the token store
    pub async fn list_with_pairing(&self, tokens: &TokenStore) -> Vec<TvStatus> {
        let snapshot = self.snapshot();
        futures::future::join_all(snapshot.iter().map(|tv| async {
            let token = tokens.get(&tv.id).await;
            TvStatus {
                tv_id: tv.id.clone(),
                name: tv.name.clone(),
                host: tv.host.clone(),
                port: tv.port,
                mac_address: tv.mac_address.clone(),
                is_paired: token.is_some(),
                paired_at: token.map(|t| t.paired_at),
            }
        }))
        .await
    }

    /// Number of configured TVs
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether the fleet is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Re-read the fleet file and atomically swap the in-memory table
    ///
    /// In-flight lookups keep the snapshot they already hold; a failed reload
    /// leaves the current table untouched.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file cannot be re-read or re-validated.
    pub fn reload(&self) -> Result<usize> {
        let tvs = read_fleet_file(&self.path)?;
        let count = tvs.len();
        *self.tvs.write().expect("registry lock poisoned") = Arc::new(tvs);
        tracing::info!(count, "reloaded fleet configuration");
        Ok(count)
    }

    fn snapshot(&self) -> Arc<Vec<TvDescriptor>> {
        self.tvs.read().expect("registry lock poisoned").clone()
    }
}

fn read_fleet_file(path: &Path) -> Result<Vec<TvDescriptor>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read fleet file {}: {e}", path.display())))?;
    let fleet: FleetFile = serde_json::from_str(&raw)
        .map_err(|e| Error::Config(format!("invalid fleet file {}: {e}", path.display())))?;
    check_unique_ids(&fleet.tvs)?;
    Ok(fleet.tvs)
}

fn check_unique_ids(tvs: &[TvDescriptor]) -> Result<()> {
    let mut seen = HashSet::new();
    for tv in tvs {
        if !seen.insert(tv.id.as_str()) {
            return Err(Error::Config(format!("duplicate TV id in fleet: {}", tv.id)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str) -> TvDescriptor {
        TvDescriptor {
            id: id.to_string(),
            name: format!("TV {id}"),
            host: "192.168.1.50".to_string(),
            port: 8002,
            mac_address: "AA:BB:CC:DD:EE:FF".to_string(),
        }
    }

    #[test]
    fn lookup_finds_configured_tv() {
        let registry = TvRegistry::from_descriptors(vec![descriptor("m2_tv")]).unwrap();
        let tv = registry.lookup("m2_tv").unwrap();
        assert_eq!(tv.host, "192.168.1.50");
    }

    #[test]
    fn lookup_unknown_id_fails() {
        let registry = TvRegistry::from_descriptors(vec![descriptor("m2_tv")]).unwrap();
        assert!(matches!(
            registry.lookup("nope"),
            Err(Error::TvNotFound(id)) if id == "nope"
        ));
    }

    #[test]
    fn duplicate_ids_rejected_at_load() {
        let result = TvRegistry::from_descriptors(vec![descriptor("a"), descriptor("a")]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn list_preserves_file_order() {
        let registry =
            TvRegistry::from_descriptors(vec![descriptor("b"), descriptor("a"), descriptor("c")])
                .unwrap();
        let ids: Vec<_> = registry.list().into_iter().map(|tv| tv.id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn reload_swaps_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.json");
        std::fs::write(
            &path,
            r#"{"tvs":[{"id":"a","name":"A","host":"h","port":8002,"mac_address":"00:00:00:00:00:01"}]}"#,
        )
        .unwrap();

        let registry = TvRegistry::load(&path).unwrap();
        assert_eq!(registry.len(), 1);

        std::fs::write(
            &path,
            r#"{"tvs":[
                {"id":"a","name":"A","host":"h","port":8002,"mac_address":"00:00:00:00:00:01"},
                {"id":"b","name":"B","host":"h","port":8002,"mac_address":"00:00:00:00:00:02"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(registry.reload().unwrap(), 2);
        assert!(registry.contains("b"));
    }

    #[test]
    fn failed_reload_keeps_current_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.json");
        std::fs::write(
            &path,
            r#"{"tvs":[{"id":"a","name":"A","host":"h","port":8002,"mac_address":"00:00:00:00:00:01"}]}"#,
        )
        .unwrap();

        let registry = TvRegistry::load(&path).unwrap();
        std::fs::write(&path, "not json").unwrap();
        assert!(registry.reload().is_err());
        assert!(registry.contains("a"));
    }
}
