//! Operations and the catalog that names them
//!
//! An operation is one unit of work runnable against a single TV. Operations
//! are registered by name in an explicit [`OperationCatalog`]; the dispatcher
//! resolves a name once per batch and never needs to know what the handler
//! does. Adding a capability means implementing [`Operation`] and registering
//! it, nothing in the dispatch path changes.

pub mod device_info;
pub mod pair;
pub mod power_status;
pub mod send_key;
pub mod wake;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::link::TvLink;
use crate::registry::TvDescriptor;
use crate::tokens::TokenStore;

/// Default per-invocation timeout enforced by the dispatcher
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one operation run against one TV
///
/// Timeouts and unknown ids are not represented here; the dispatcher records
/// those itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpOutcome {
    pub success: bool,
    pub output: String,
}

impl OpOutcome {
    /// Successful run with the given output payload
    #[must_use]
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    /// Failed run carrying the reason
    #[must_use]
    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// A named unit of work dispatchable against one TV
#[async_trait]
pub trait Operation: Send + Sync {
    /// Catalog name
    fn name(&self) -> &'static str;

    /// Per-invocation timeout enforced by the dispatcher
    fn timeout(&self) -> Duration {
        DEFAULT_OP_TIMEOUT
    }

    /// Run against a single resolved TV
    ///
    /// Handlers report failures through the outcome, never by panicking; the
    /// dispatcher treats everything returned here as per-target data.
    async fn run(&self, tv: &TvDescriptor, tokens: &TokenStore, args: &[String]) -> OpOutcome;
}

/// Name-to-handler registry
#[derive(Default)]
pub struct OperationCatalog {
    ops: HashMap<&'static str, Arc<dyn Operation>>,
}

impl OperationCatalog {
    /// Empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every built-in operation wired to the given link
    #[must_use]
    pub fn with_builtin(link: Arc<dyn TvLink>) -> Self {
        let mut catalog = Self::new();
        catalog.register(Arc::new(power_status::PowerStatusOp::new(link.clone())));
        catalog.register(Arc::new(pair::PairOp::new(link.clone())));
        catalog.register(Arc::new(send_key::SendKeyOp::new(link.clone())));
        catalog.register(Arc::new(device_info::DeviceInfoOp::new(link)));
        catalog.register(Arc::new(wake::WakeOp::new()));
        catalog
    }

    /// Register an operation, replacing any previous one with the same name
    pub fn register(&mut self, op: Arc<dyn Operation>) {
        self.ops.insert(op.name(), op);
    }

    /// Resolve an operation by name
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Operation>> {
        self.ops.get(name).cloned()
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.ops.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
