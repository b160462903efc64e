//! Batch dispatcher
//!
//! Runs one operation across N targets, sequentially or through a bounded
//! worker pool, and aggregates per-target results. Per-target problems
//! (unknown id, handler failure, timeout) become data in the batch; only an
//! unknown operation name aborts before any TV is contacted.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::ops::{Operation, OperationCatalog};
use crate::registry::TvRegistry;
use crate::tokens::TokenStore;
use crate::{Error, Result};

/// Worker-pool cap for concurrent mode, independent of batch size
pub const DEFAULT_MAX_WORKERS: usize = 10;

/// Per-target outcome classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    /// Handler completed and reported success
    Success,
    /// Handler completed and reported failure
    Failure,
    /// Handler exceeded the operation timeout and was cancelled
    Timeout,
    /// Target id not present in the fleet registry
    NotFound,
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Timeout => write!(f, "timeout"),
            Self::NotFound => write!(f, "not_found"),
        }
    }
}

/// Result of one operation invocation against one target
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub tv_id: String,
    pub status: ExecStatus,
    pub output: String,
    pub success: bool,
    #[serde(skip)]
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    fn new(tv_id: String, status: ExecStatus, output: String, started: Instant) -> Self {
        Self {
            tv_id,
            success: status == ExecStatus::Success,
            status,
            output,
            duration: started.elapsed(),
            timestamp: Utc::now(),
        }
    }
}

/// Aggregated result of one batch
#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub operation_name: String,
    pub total_requested: usize,
    pub results: Vec<ExecutionResult>,
    pub summary: String,
    pub execution_time_seconds: f64,
    pub concurrent: bool,
}

/// Dispatches operations across the fleet
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<TvRegistry>,
    tokens: TokenStore,
    catalog: Arc<OperationCatalog>,
    max_workers: usize,
}

impl Dispatcher {
    /// Create a dispatcher with the default worker cap
    #[must_use]
    pub fn new(registry: Arc<TvRegistry>, tokens: TokenStore, catalog: Arc<OperationCatalog>) -> Self {
        Self {
            registry,
            tokens,
            catalog,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }

    /// Override the concurrent-mode worker cap
    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Run one operation across the given targets
    ///
    /// Every requested id yields exactly one result, unknown ids included.
    /// Sequential mode preserves input order; concurrent mode orders results
    /// by `(tv_id, input position)` and callers must correlate by id.
    ///
    /// # Errors
    ///
    /// Returns `Error::OperationNotFound` if the name is not in the catalog.
    /// Per-target failures never surface here.
    pub async fn run(
        &self,
        operation_name: &str,
        tv_ids: &[String],
        args: &[String],
        concurrent: bool,
    ) -> Result<BatchResult> {
        let op = self
            .catalog
            .resolve(operation_name)
            .ok_or_else(|| Error::OperationNotFound(operation_name.to_string()))?;

        let started = Instant::now();
        tracing::info!(
            operation = operation_name,
            targets = tv_ids.len(),
            concurrent,
            "dispatching batch"
        );

        let results = if concurrent && tv_ids.len() > 1 {
            self.run_concurrent(op, tv_ids, args).await
        } else {
            self.run_sequential(op, tv_ids, args).await
        };
        debug_assert_eq!(results.len(), tv_ids.len());

        let elapsed = started.elapsed().as_secs_f64();
        let success_count = results
            .iter()
            .filter(|r| r.status == ExecStatus::Success)
            .count();
        let summary = format!(
            "Executed '{operation_name}' on {} TVs in {elapsed:.2}s: {success_count} successful",
            tv_ids.len()
        );

        Ok(BatchResult {
            operation_name: operation_name.to_string(),
            total_requested: tv_ids.len(),
            results,
            summary,
            execution_time_seconds: elapsed,
            concurrent,
        })
    }

    async fn run_sequential(
        &self,
        op: Arc<dyn Operation>,
        tv_ids: &[String],
        args: &[String],
    ) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(tv_ids.len());
        for tv_id in tv_ids {
            results.push(self.run_one(op.clone(), tv_id, args).await);
        }
        results
    }

    async fn run_concurrent(
        &self,
        op: Arc<dyn Operation>,
        tv_ids: &[String],
        args: &[String],
    ) -> Vec<ExecutionResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let args: Arc<[String]> = args.into();
        let mut set = JoinSet::new();

        for (index, tv_id) in tv_ids.iter().enumerate() {
            let dispatcher = self.clone();
            let op = op.clone();
            let tv_id = tv_id.clone();
            let args = args.clone();
            let semaphore = semaphore.clone();
            set.spawn(async move {
                // Closed only if the semaphore is dropped, which it never is
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("dispatch semaphore closed");
                (index, dispatcher.run_one(op, &tv_id, &args).await)
            });
        }

        let mut indexed = Vec::with_capacity(tv_ids.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(entry) => indexed.push(entry),
                Err(e) => {
                    tracing::error!(error = %e, "dispatch worker panicked");
                }
            }
        }
        // A panicking handler still owes the batch a result slot; backfill
        // any target whose worker never reported back
        if indexed.len() < tv_ids.len() {
            let reported: HashSet<usize> = indexed.iter().map(|(index, _)| *index).collect();
            for (index, tv_id) in tv_ids.iter().enumerate() {
                if !reported.contains(&index) {
                    indexed.push((
                        index,
                        ExecutionResult::new(
                            tv_id.clone(),
                            ExecStatus::Failure,
                            "operation aborted unexpectedly".to_string(),
                            Instant::now(),
                        ),
                    ));
                }
            }
        }
        // Deterministic output: sort by id, then input position for
        // duplicated ids
        indexed.sort_by(|a, b| a.1.tv_id.cmp(&b.1.tv_id).then(a.0.cmp(&b.0)));
        indexed.into_iter().map(|(_, result)| result).collect()
    }

    /// One invocation: resolve the target, then run under the op timeout
    async fn run_one(&self, op: Arc<dyn Operation>, tv_id: &str, args: &[String]) -> ExecutionResult {
        let started = Instant::now();

        let tv = match self.registry.lookup(tv_id) {
            Ok(tv) => tv,
            Err(_) => {
                return ExecutionResult::new(
                    tv_id.to_string(),
                    ExecStatus::NotFound,
                    format!("TV '{tv_id}' not found in fleet configuration"),
                    started,
                );
            }
        };

        let budget = op.timeout();
        match timeout(budget, op.run(&tv, &self.tokens, args)).await {
            Ok(outcome) => {
                let status = if outcome.success {
                    ExecStatus::Success
                } else {
                    ExecStatus::Failure
                };
                ExecutionResult::new(tv_id.to_string(), status, outcome.output, started)
            }
            // The handler future is dropped here; partial output from a
            // cancelled invocation is never merged
            Err(_) => {
                tracing::warn!(tv_id, operation = op.name(), ?budget, "invocation timed out");
                ExecutionResult::new(
                    tv_id.to_string(),
                    ExecStatus::Timeout,
                    format!("operation timed out after {}s", budget.as_secs()),
                    started,
                )
            }
        }
    }
}
