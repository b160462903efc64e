//! Persistent pairing-token store
//!
//! Tokens live in a flat JSON file mapping `tv_id` to the credential issued
//! by the TV during pairing. The file is shared by every worker in a
//! concurrent batch, so writes are staged to a temp file in the same
//! directory and atomically renamed over the canonical path: a reader never
//! sees a half-written file and racing writers never lose each other's
//! updates.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::{Error, Result};

/// A pairing credential for a single TV
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingToken {
    /// Token string issued by the TV
    pub token: String,
    /// When pairing completed
    pub paired_at: DateTime<Utc>,
}

struct Inner {
    path: PathBuf,
    tokens: RwLock<HashMap<String, PairingToken>>,
    /// Serializes the stage-and-rename sequence across concurrent writers
    write_lock: Mutex<()>,
}

/// Shared handle to the token store
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<Inner>,
}

impl TokenStore {
    /// Open the store, loading any existing token file
    ///
    /// A missing file is an empty store. An unreadable or corrupt file is a
    /// fatal error: pairing-dependent operations must not run against a store
    /// whose contents cannot be trusted.
    ///
    /// # Errors
    ///
    /// Returns `Error::TokenStore` if the file exists but cannot be parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tokens = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                Error::TokenStore(format!("corrupt token file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(Error::TokenStore(format!(
                    "cannot read token file {}: {e}",
                    path.display()
                )))
            }
        };
        tracing::debug!(count = tokens.len(), path = %path.display(), "opened token store");
        Ok(Self {
            inner: Arc::new(Inner {
                path,
                tokens: RwLock::new(tokens),
                write_lock: Mutex::new(()),
            }),
        })
    }

    /// Token for a TV, if one is stored
    pub async fn get(&self, tv_id: &str) -> Option<PairingToken> {
        self.inner.tokens.read().await.get(tv_id).cloned()
    }

    /// Whether a TV has a stored token
    pub async fn has(&self, tv_id: &str) -> bool {
        self.inner.tokens.read().await.contains_key(tv_id)
    }

    /// Store a token, persisting durably before returning
    ///
    /// Re-pairing overwrites the previous entry.
    ///
    /// # Errors
    ///
    /// Returns `Error::TokenStore` if the file cannot be written.
    pub async fn put(&self, tv_id: &str, token: &str) -> Result<()> {
        let _guard = self.inner.write_lock.lock().await;
        {
            let mut tokens = self.inner.tokens.write().await;
            tokens.insert(
                tv_id.to_string(),
                PairingToken {
                    token: token.to_string(),
                    paired_at: Utc::now(),
                },
            );
        }
        self.persist().await?;
        tracing::info!(tv_id, "stored pairing token");
        Ok(())
    }

    /// Remove a stored token
    ///
    /// # Errors
    ///
    /// Returns `Error::TokenStore` if the file cannot be written.
    pub async fn remove(&self, tv_id: &str) -> Result<bool> {
        let _guard = self.inner.write_lock.lock().await;
        let removed = self.inner.tokens.write().await.remove(tv_id).is_some();
        if removed {
            self.persist().await?;
            tracing::info!(tv_id, "removed pairing token");
        }
        Ok(removed)
    }

    /// Snapshot of every stored token
    pub async fn all(&self) -> HashMap<String, PairingToken> {
        self.inner.tokens.read().await.clone()
    }

    /// Write the full map to a temp file and rename it over the store
    ///
    /// Callers must hold `write_lock`.
    async fn persist(&self) -> Result<()> {
        let json = {
            let tokens = self.inner.tokens.read().await;
            serde_json::to_string_pretty(&*tokens)?
        };
        let path = self.inner.path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let mut staged = tempfile::NamedTempFile::new_in(dir)
                .map_err(|e| Error::TokenStore(format!("cannot stage token file: {e}")))?;
            use std::io::Write;
            staged
                .write_all(json.as_bytes())
                .map_err(|e| Error::TokenStore(format!("cannot write token file: {e}")))?;
            staged
                .persist(&path)
                .map_err(|e| Error::TokenStore(format!("cannot replace token file: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| Error::TokenStore(format!("token persist task failed: {e}")))?
    }
}
