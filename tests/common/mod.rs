//! Shared test utilities

use std::sync::Arc;

use tvfleet_gateway::{TokenStore, TvDescriptor, TvRegistry};

/// Descriptor with deterministic fields derived from the id
#[must_use]
pub fn descriptor(id: &str) -> TvDescriptor {
    TvDescriptor {
        id: id.to_string(),
        name: format!("TV {id}"),
        host: format!("{id}.local"),
        port: 8002,
        mac_address: "AA:BB:CC:DD:EE:FF".to_string(),
    }
}

/// Registry holding the given ids
#[must_use]
pub fn registry(ids: &[&str]) -> Arc<TvRegistry> {
    let tvs = ids.iter().map(|id| descriptor(id)).collect();
    Arc::new(TvRegistry::from_descriptors(tvs).expect("failed to build test registry"))
}

/// Token store backed by a fresh temp directory
///
/// Keep the returned dir alive for the duration of the test.
#[must_use]
pub fn token_store() -> (tempfile::TempDir, TokenStore) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = TokenStore::open(dir.path().join("tokens.json")).expect("failed to open store");
    (dir, store)
}
