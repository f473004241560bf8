//! Wallet Errors and Diagnostics
//!
//! Every failure of a wallet operation maps to a machine-readable
//! [`ErrorCode`]. Token creation failures also carry a
//! [`CreationDiagnostics`] record with enough detail to render a precise
//! message without parsing error text.

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::proof::{denomination_histogram, total_amount, Proof};

/// Machine-readable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidAmount,
    NotLoaded,
    IssuerMismatch,
    UnitMismatch,
    InvalidToken,
    EmptyToken,
    DuplicateProofs,
    InvalidConfig,
    InsufficientBalance,
    SelectionFailed,
    SwapFailed,
    TransportError,
    StorageError,
    InvalidProof,
    EncryptionError,
}

/// Details attached to a failed token creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreationDiagnostics {
    pub code: ErrorCode,
    pub requested_amount: u64,
    pub available_balance: u64,
    /// Held proofs per denomination at the time of the failure
    pub denominations: BTreeMap<u64, usize>,
    /// Amounts of the proofs chosen before the operation gave up
    pub partial_selection: Vec<u64>,
    /// Human-readable next step
    pub suggestion: String,
}

impl CreationDiagnostics {
    fn base(code: ErrorCode, requested: u64, held: &[Proof], partial: &[Proof]) -> Self {
        Self {
            code,
            requested_amount: requested,
            available_balance: total_amount(held),
            denominations: denomination_histogram(held),
            partial_selection: partial.iter().map(|p| p.amount).collect(),
            suggestion: String::new(),
        }
    }

    /// Amount requested was zero
    pub fn invalid_amount(requested: u64, held: &[Proof]) -> Self {
        let mut diag = Self::base(ErrorCode::InvalidAmount, requested, held, &[]);
        diag.suggestion = "request a positive number of credits".to_string();
        diag
    }

    /// Held balance does not cover the request
    pub fn insufficient_balance(requested: u64, held: &[Proof]) -> Self {
        let mut diag = Self::base(ErrorCode::InsufficientBalance, requested, held, held);
        diag.suggestion = format!("add {} more credits", diag.shortfall());
        diag
    }

    /// Balance covers the request but no combination matches and no swap is possible
    pub fn selection_failed(requested: u64, held: &[Proof], selected: &[Proof]) -> Self {
        let mut diag = Self::base(ErrorCode::SelectionFailed, requested, held, selected);
        diag.suggestion = format!(
            "no combination of {} sums to exactly {}; configure a swap service or request {}",
            format_denominations(&diag.denominations),
            requested,
            total_amount(selected)
        );
        diag
    }

    /// The issuer rejected or botched the swap
    pub fn swap_failed(requested: u64, held: &[Proof], selected: &[Proof]) -> Self {
        let mut diag = Self::base(ErrorCode::SwapFailed, requested, held, selected);
        diag.suggestion = "retry later; the selected proofs are still in the wallet".to_string();
        diag
    }

    /// The issuer consumed the selection but returned the wrong send value.
    ///
    /// `held` is the set before the swap; everything the issuer returned has
    /// been added to the wallet in place of `selected`.
    pub fn swap_mismatched(
        requested: u64,
        held: &[Proof],
        selected: &[Proof],
        returned: u64,
    ) -> Self {
        let mut diag = Self::base(ErrorCode::SwapFailed, requested, held, selected);
        diag.suggestion = format!(
            "the issuer returned {} for a {} request; the selected proofs were exchanged and all {} returned credits are now in the wallet, so create the token again",
            returned, requested, returned
        );
        diag
    }

    /// Credits missing to satisfy the request
    pub fn shortfall(&self) -> u64 {
        self.requested_amount.saturating_sub(self.available_balance)
    }
}

fn format_denominations(histogram: &BTreeMap<u64, usize>) -> String {
    let parts: Vec<String> = histogram
        .iter()
        .map(|(amount, count)| format!("{}x{}", count, amount))
        .collect();
    if parts.is_empty() {
        "no proofs".to_string()
    } else {
        parts.join(", ")
    }
}

/// Input or state rejected before any work was done
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Wallet used before `load()`
    #[error("wallet is not loaded")]
    NotLoaded,

    #[error("token issuer {got} does not match wallet issuer {expected}")]
    IssuerMismatch { expected: String, got: String },

    #[error("token unit {got} does not match wallet unit {expected}")]
    UnitMismatch { expected: String, got: String },

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token carries no proofs")]
    EmptyToken,

    /// Every proof offered is already held
    #[error("all {0} proofs are already in the wallet")]
    DuplicateProofs(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ValidationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotLoaded => ErrorCode::NotLoaded,
            Self::IssuerMismatch { .. } => ErrorCode::IssuerMismatch,
            Self::UnitMismatch { .. } => ErrorCode::UnitMismatch,
            Self::InvalidToken(_) => ErrorCode::InvalidToken,
            Self::EmptyToken => ErrorCode::EmptyToken,
            Self::DuplicateProofs(_) => ErrorCode::DuplicateProofs,
            Self::InvalidConfig(_) => ErrorCode::InvalidConfig,
        }
    }
}

/// Proof-level failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofError {
    /// hash_to_curve ran out of counter values
    #[error("no curve point found for secret")]
    NoCurvePoint,
}

/// Sealing (authenticated encryption) failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SealError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed")]
    Encrypt,

    /// Wrong key or tampered ciphertext
    #[error("decryption failed - wrong password?")]
    Decrypt,

    #[error("malformed sealed value: {0}")]
    Malformed(String),
}

/// Persistence failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unsupported store version: {found} (expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error(transparent)]
    Seal(#[from] SealError),
}

/// Top-level error for wallet operations
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("invalid amount {}: must be a positive integer", .0.requested_amount)]
    InvalidAmount(Box<CreationDiagnostics>),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(
        "insufficient balance: requested {}, available {}",
        .0.requested_amount,
        .0.available_balance
    )]
    InsufficientBalance(Box<CreationDiagnostics>),

    #[error("no usable proof combination for {}", .0.requested_amount)]
    SelectionFailed(Box<CreationDiagnostics>),

    /// The selected proofs remain held unless the issuer consumed them
    #[error("swap failed: {reason}")]
    SwapFailed {
        reason: String,
        diagnostics: Box<CreationDiagnostics>,
    },

    /// Transient network failure, retried by the caller
    #[error("transport error: {0}")]
    Transport(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Proof(#[from] ProofError),

    #[error(transparent)]
    Seal(#[from] SealError),
}

impl WalletError {
    /// Machine-readable classification
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidAmount(_) => ErrorCode::InvalidAmount,
            Self::Validation(e) => e.code(),
            Self::InsufficientBalance(_) => ErrorCode::InsufficientBalance,
            Self::SelectionFailed(_) => ErrorCode::SelectionFailed,
            Self::SwapFailed { .. } => ErrorCode::SwapFailed,
            Self::Transport(_) => ErrorCode::TransportError,
            Self::Store(_) => ErrorCode::StorageError,
            Self::Proof(_) => ErrorCode::InvalidProof,
            Self::Seal(_) => ErrorCode::EncryptionError,
        }
    }

    /// Diagnostics for token creation failures
    pub fn diagnostics(&self) -> Option<&CreationDiagnostics> {
        match self {
            Self::InvalidAmount(d) | Self::InsufficientBalance(d) | Self::SelectionFailed(d) => {
                Some(d.as_ref())
            }
            Self::SwapFailed { diagnostics, .. } => Some(diagnostics.as_ref()),
            _ => None,
        }
    }

    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::SwapFailed { .. })
    }
}

impl From<reqwest::Error> for WalletError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

pub type WalletResult<T> = Result<T, WalletError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn proofs(amounts: &[u64]) -> Vec<Proof> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, a)| Proof::new("00", *a, format!("s{}", i), "02"))
            .collect()
    }

    #[test]
    fn test_insufficient_balance_suggestion() {
        let held = proofs(&[1, 2, 4]);
        let diag = CreationDiagnostics::insufficient_balance(10, &held);

        assert_eq!(diag.code, ErrorCode::InsufficientBalance);
        assert_eq!(diag.available_balance, 7);
        assert_eq!(diag.shortfall(), 3);
        assert_eq!(diag.suggestion, "add 3 more credits");
        assert_eq!(diag.partial_selection, vec![1, 2, 4]);
    }

    #[test]
    fn test_error_code_and_diagnostics() {
        let held = proofs(&[8]);
        let err = WalletError::SelectionFailed(Box::new(CreationDiagnostics::selection_failed(
            3, &held, &held,
        )));

        assert_eq!(err.code(), ErrorCode::SelectionFailed);
        let diag = err.diagnostics().unwrap();
        assert_eq!(diag.requested_amount, 3);
        assert!(diag.suggestion.contains("1x8"));
    }

    #[test]
    fn test_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::InsufficientBalance).unwrap();
        assert_eq!(json, "\"INSUFFICIENT_BALANCE\"");
    }

    #[test]
    fn test_validation_code_passthrough() {
        let err: WalletError = ValidationError::NotLoaded.into();
        assert_eq!(err.code(), ErrorCode::NotLoaded);
        assert!(err.diagnostics().is_none());
    }
}
