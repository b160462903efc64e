//! Pairing workflow
//!
//! Each target runs its own small state machine seeded from the token store.
//! An already-paired TV returns immediately; the handshake collaborator is
//! never re-invoked for it. A fresh handshake persists its token before the
//! result is reported, so a `success` always implies a durable credential.

use std::sync::Arc;

use async_trait::async_trait;

use super::{OpOutcome, Operation};
use crate::link::TvLink;
use crate::registry::TvDescriptor;
use crate::tokens::TokenStore;

/// Pairing state for a single target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    /// No token stored
    Unpaired,
    /// Handshake in flight
    Pairing,
    /// Token stored and durable
    Paired,
    /// Handshake failed; store untouched
    Failed,
}

/// The `pair` operation
pub struct PairOp {
    link: Arc<dyn TvLink>,
}

impl PairOp {
    #[must_use]
    pub fn new(link: Arc<dyn TvLink>) -> Self {
        Self { link }
    }
}

#[async_trait]
impl Operation for PairOp {
    fn name(&self) -> &'static str {
        "pair"
    }

    async fn run(&self, tv: &TvDescriptor, tokens: &TokenStore, _args: &[String]) -> OpOutcome {
        let mut state = if tokens.has(&tv.id).await {
            PairState::Paired
        } else {
            PairState::Unpaired
        };

        if state == PairState::Paired {
            return OpOutcome::success("already_paired");
        }

        state = PairState::Pairing;
        tracing::info!(tv_id = %tv.id, state = ?state, "starting pairing handshake");

        match self.link.pair(tv).await {
            Ok(token) => {
                // Persist before reporting success; a lost write must not
                // masquerade as a completed pairing
                if let Err(e) = tokens.put(&tv.id, &token).await {
                    state = PairState::Failed;
                    tracing::warn!(tv_id = %tv.id, error = %e, state = ?state, "token persist failed after handshake");
                    return OpOutcome::failure(format!("paired but token not persisted: {e}"));
                }
                state = PairState::Paired;
                tracing::info!(tv_id = %tv.id, state = ?state, "pairing complete");
                OpOutcome::success("paired")
            }
            Err(e) => {
                state = PairState::Failed;
                tracing::warn!(tv_id = %tv.id, error = %e, state = ?state, "pairing failed");
                OpOutcome::failure(format!("pairing failed: {e}"))
            }
        }
    }
}
