//! TV Fleet Gateway - operation dispatch for Samsung Smart TV fleets
//!
//! This library provides the core of the gateway:
//! - Fleet registry and pairing-token persistence
//! - A catalog of named operations (power probe, pairing, key commands)
//! - A dispatcher running batches sequentially or through a bounded pool
//! - An HTTP API exposing the above
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                HTTP API / CLI                 │
//! └───────────────────┬──────────────────────────┘
//!                     │
//! ┌───────────────────▼──────────────────────────┐
//! │                 Dispatcher                    │
//! │  catalog resolve │ bounded pool │ timeouts    │
//! └──────┬───────────────┬───────────────┬───────┘
//!        │               │               │
//! ┌──────▼─────┐  ┌──────▼─────┐  ┌──────▼──────┐
//! │ TvRegistry │  │ TokenStore │  │ Operations  │
//! │ (fleet)    │  │ (atomic    │  │ power/pair/ │
//! │            │  │  replace)  │  │ key/wake    │
//! └────────────┘  └────────────┘  └──────┬──────┘
//!                                        │
//!                              ┌─────────▼─────────┐
//!                              │ TvLink (external  │
//!                              │ protocol bridge)  │
//!                              └───────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod link;
pub mod ops;
pub mod registry;
pub mod tokens;

pub use config::Config;
pub use dispatch::{BatchResult, Dispatcher, ExecStatus, ExecutionResult};
pub use error::{Error, Result};
pub use link::{BridgeConfig, DeviceInfo, LinkError, SamsungLink, TvLink};
pub use ops::{OpOutcome, Operation, OperationCatalog};
pub use registry::{TvDescriptor, TvRegistry, TvStatus};
pub use tokens::{PairingToken, TokenStore};
