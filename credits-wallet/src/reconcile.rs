//! Proof Reconciliation
//!
//! Asks the issuer which held proofs are still redeemable. Only an explicit
//! `UNSPENT` answer keeps a proof valid. When the issuer cannot be reached
//! the check fails open: every proof is treated as valid, because dropping
//! spendable value is worse than keeping a dead proof one round longer.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::issuer::{CheckStateRequest, ProofState, StateCheck};
use crate::proof::Proof;
use crate::sink::{default_sink, DiagnosticSink};

/// Partition of a proof set by redeemability
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProofCheck {
    pub valid: Vec<Proof>,
    pub spent: Vec<Proof>,
}

impl ProofCheck {
    fn all_valid(proofs: &[Proof]) -> Self {
        Self {
            valid: proofs.to_vec(),
            spent: Vec::new(),
        }
    }
}

/// Validates proofs against the issuer's state endpoint
pub struct ReconciliationService {
    checker: Arc<dyn StateCheck>,
    sink: Arc<dyn DiagnosticSink>,
}

impl ReconciliationService {
    pub fn new(checker: Arc<dyn StateCheck>) -> Self {
        Self {
            checker,
            sink: default_sink(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Split `proofs` into valid and spent with one batched issuer query.
    ///
    /// Input order is preserved within each partition.
    pub async fn check_state(&self, proofs: &[Proof]) -> ProofCheck {
        if proofs.is_empty() {
            return ProofCheck::default();
        }

        let ys: Vec<String> = match proofs.iter().map(Proof::y).collect() {
            Ok(ys) => ys,
            Err(e) => {
                self.sink.warn(
                    "reconcile",
                    &format!("could not derive proof identifiers ({}); keeping all proofs", e),
                );
                return ProofCheck::all_valid(proofs);
            }
        };

        let request = CheckStateRequest { ys: ys.clone() };
        let response = match self.checker.check_state(&request).await {
            Ok(response) => response,
            Err(e) => {
                self.sink.warn(
                    "reconcile",
                    &format!("state check failed ({}); keeping all proofs", e),
                );
                return ProofCheck::all_valid(proofs);
            }
        };

        let states: HashMap<&str, ProofState> = response
            .states
            .iter()
            .map(|entry| (entry.y.as_str(), entry.state))
            .collect();

        let mut check = ProofCheck::default();
        for (proof, y) in proofs.iter().zip(&ys) {
            match states.get(y.as_str()) {
                Some(ProofState::Unspent) => check.valid.push(proof.clone()),
                _ => check.spent.push(proof.clone()),
            }
        }

        debug!(
            "State check: {} valid, {} spent",
            check.valid.len(),
            check.spent.len()
        );
        check
    }
}
