//! Issuer Interfaces
//!
//! The wallet talks to its issuer for two things: asking whether proofs are
//! still redeemable, and splitting proofs into exact denominations. Both sit
//! behind traits so hosts can supply their own transport. [`HttpIssuer`]
//! implements the state check over HTTP; swapping needs blinding and is left
//! to the host.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{WalletError, WalletResult};
use crate::proof::{normalize_issuer_url, Proof};

/// Default timeout for issuer requests
pub const DEFAULT_ISSUER_TIMEOUT: Duration = Duration::from_secs(30);

/// Redeemability of one proof as reported by the issuer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProofState {
    Unspent,
    Spent,
    Pending,
    /// Any state this client does not recognise
    #[serde(other)]
    Unknown,
}

/// Batched state query by public identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckStateRequest {
    #[serde(rename = "Ys")]
    pub ys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStateEntry {
    #[serde(rename = "Y")]
    pub y: String,
    pub state: ProofState,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CheckStateResponse {
    pub states: Vec<ProofStateEntry>,
}

/// Issuer endpoint answering state queries
#[async_trait]
pub trait StateCheck: Send + Sync {
    async fn check_state(&self, request: &CheckStateRequest) -> WalletResult<CheckStateResponse>;
}

/// Result of a swap: proofs worth exactly the requested amount, plus change
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SwapOutput {
    pub send: Vec<Proof>,
    pub keep: Vec<Proof>,
}

/// Issuer operation exchanging proofs for new ones of the requested split.
///
/// Once `swap` returns `Ok`, the input proofs are spent at the issuer.
#[async_trait]
pub trait SwapService: Send + Sync {
    async fn swap(&self, proofs: Vec<Proof>, amount: u64) -> WalletResult<SwapOutput>;
}

/// HTTP client for an issuer's state endpoint
#[derive(Debug, Clone)]
pub struct HttpIssuer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIssuer {
    /// Client with the default timeout
    pub fn new(issuer_url: &str) -> WalletResult<Self> {
        Self::with_timeout(issuer_url, DEFAULT_ISSUER_TIMEOUT)
    }

    pub fn with_timeout(issuer_url: &str, timeout: Duration) -> WalletResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: normalize_issuer_url(issuer_url).to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn checkstate_url(&self) -> String {
        format!("{}/v1/checkstate", self.base_url)
    }
}

#[async_trait]
impl StateCheck for HttpIssuer {
    async fn check_state(&self, request: &CheckStateRequest) -> WalletResult<CheckStateResponse> {
        let url = self.checkstate_url();
        debug!("Checking {} proof states at {}", request.ys.len(), url);

        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            return Err(WalletError::Transport(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkstate_wire_format() {
        let request = CheckStateRequest {
            ys: vec!["02ab".to_string()],
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"Ys":["02ab"]}"#
        );

        let response: CheckStateResponse = serde_json::from_str(
            r#"{"states":[
                {"Y":"02ab","state":"UNSPENT","witness":null},
                {"Y":"02cd","state":"SPENT"},
                {"Y":"02ef","state":"PENDING"},
                {"Y":"02ff","state":"RESERVED"}
            ]}"#,
        )
        .unwrap();

        let states: Vec<ProofState> = response.states.iter().map(|s| s.state).collect();
        assert_eq!(
            states,
            vec![
                ProofState::Unspent,
                ProofState::Spent,
                ProofState::Pending,
                ProofState::Unknown
            ]
        );
    }

    #[test]
    fn test_checkstate_url_ignores_trailing_slash() {
        let issuer = HttpIssuer::new("https://issuer.example/").unwrap();
        assert_eq!(issuer.checkstate_url(), "https://issuer.example/v1/checkstate");
    }

    #[tokio::test]
    async fn test_unreachable_issuer_is_transport_error() {
        let issuer =
            HttpIssuer::with_timeout("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let result = issuer
            .check_state(&CheckStateRequest { ys: vec![] })
            .await;
        assert!(matches!(result, Err(WalletError::Transport(_))));
    }
}
