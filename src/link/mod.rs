//! Boundary to the TV control protocol
//!
//! The Samsung wire protocol (WebSocket handshake, remote-key encoding) is
//! not implemented here. Operations talk to a [`TvLink`] collaborator and the
//! production implementation delegates the protocol work to an external
//! bridge command plus the TV's plain HTTP device-info endpoint.

mod samsung;

pub use samsung::{BridgeConfig, SamsungLink};

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::registry::TvDescriptor;

/// Result type for link calls
pub type LinkResult<T> = std::result::Result<T, LinkError>;

/// Why a link call failed
///
/// The power-state probe branches on these kinds: an unresolvable host is a
/// conclusive `unreachable`, a refused or timed-out connection sends the
/// probe down the fallback chain, and a protocol-level error still proves
/// the device answered.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Host name never resolved to an address
    #[error("host unresolvable: {0}")]
    Unresolvable(String),

    /// Connection refused or no answer within the link budget
    #[error("device unreachable: {0}")]
    Unreachable(String),

    /// Device answered but the exchange failed at the protocol level
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The call exceeded its own deadline
    #[error("link call timed out after {0:?}")]
    Timeout(Duration),
}

/// Device-info payload returned by a TV
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceInfo {
    /// Reported power state, when the model exposes one ("on", "standby")
    pub power_state: Option<String>,
    /// Full payload as returned by the device
    pub raw: serde_json::Value,
}

/// Control-channel collaborator for a single TV
///
/// One implementation per deployment; tests substitute mocks with call
/// counters to assert short-circuit behavior.
#[async_trait]
pub trait TvLink: Send + Sync {
    /// Query the device-info endpoint
    async fn device_info(&self, tv: &TvDescriptor, token: Option<&str>) -> LinkResult<DeviceInfo>;

    /// Run the pairing handshake, returning the issued token
    async fn pair(&self, tv: &TvDescriptor) -> LinkResult<String>;

    /// Send a single remote key press
    async fn send_key(&self, tv: &TvDescriptor, token: Option<&str>, key: &str) -> LinkResult<()>;
}
