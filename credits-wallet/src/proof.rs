//! Proofs and Tokens
//!
//! A proof is a single fixed-denomination bearer token signed by an issuer.
//! Possession implies spendability: there is no owner field, and a proof is
//! identified by its secret and signature.
//!
//! Tokens bundle proofs with the issuer URL and unit so they can be handed to
//! another party. The wire form is the Cashu V3 serialization:
//! `cashuA` followed by base64url-encoded JSON.

use base64::{
    alphabet,
    engine::{general_purpose::URL_SAFE, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::error::{ProofError, ValidationError};

/// Domain separator for hashing a secret onto secp256k1.
const HASH_TO_CURVE_DOMAIN: &[u8] = b"Secp256k1_HashToCurve_Cashu_";

/// Upper bound on counter iterations in [`hash_to_curve`].
const HASH_TO_CURVE_MAX_ITERATIONS: u32 = 1 << 16;

/// Prefix of a serialized V3 token.
pub const TOKEN_PREFIX: &str = "cashuA";

/// Unit used when a decoded token does not name one.
pub const DEFAULT_UNIT: &str = "sat";

/// Accepts both padded and unpadded base64url input.
const TOKEN_DECODER: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A single bearer token issued by an authority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Proof {
    /// Keyset that signed this proof
    #[serde(rename = "id")]
    pub keyset_id: String,
    /// Denomination
    pub amount: u64,
    /// Unguessable secret chosen by the original requester
    pub secret: String,
    /// Unblinded issuer signature
    #[serde(rename = "C")]
    pub signature: String,
}

impl Proof {
    /// Create a proof from its parts
    pub fn new(
        keyset_id: impl Into<String>,
        amount: u64,
        secret: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            keyset_id: keyset_id.into(),
            amount,
            secret: secret.into(),
            signature: signature.into(),
        }
    }

    /// Public identifier `Y` of this proof, hex-encoded compressed point.
    ///
    /// This is what the issuer's state endpoint and the merge logic use to
    /// refer to a proof without revealing its secret.
    pub fn y(&self) -> Result<String, ProofError> {
        let point = hash_to_curve(self.secret.as_bytes())?;
        Ok(hex::encode(point))
    }}

/// Map a message onto secp256k1, returning the 33-byte compressed point.
///
/// Follows the Cashu NUT-00 construction: hash the domain-separated message,
/// then append a little-endian counter until the hash is a valid x
/// coordinate with even y.
pub fn hash_to_curve(message: &[u8]) -> Result<[u8; 33], ProofError> {
    let msg_hash: [u8; 32] = Sha256::new()
        .chain_update(HASH_TO_CURVE_DOMAIN)
        .chain_update(message)
        .finalize()
        .into();

    for counter in 0..HASH_TO_CURVE_MAX_ITERATIONS {
        let candidate: [u8; 32] = Sha256::new()
            .chain_update(msg_hash)
            .chain_update(counter.to_le_bytes())
            .finalize()
            .into();

        let mut compressed = [0u8; 33];
        compressed[0] = 0x02;
        compressed[1..].copy_from_slice(&candidate);

        if let Ok(point) = k256::PublicKey::from_sec1_bytes(&compressed) {
            let encoded = point.to_encoded_point(true);
            let mut out = [0u8; 33];
            out.copy_from_slice(encoded.as_bytes());
            return Ok(out);
        }
    }

    Err(ProofError::NoCurvePoint)
}

/// Sum of proof amounts
pub fn total_amount(proofs: &[Proof]) -> u64 {
    proofs.iter().fold(0u64, |acc, p| acc.saturating_add(p.amount))
}

/// Count of proofs per denomination
pub fn denomination_histogram(proofs: &[Proof]) -> BTreeMap<u64, usize> {
    let mut histogram = BTreeMap::new();
    for proof in proofs {
        *histogram.entry(proof.amount).or_insert(0) += 1;
    }
    histogram
}

/// Remove proofs whose secret appears earlier in the list.
///
/// Returns the deduplicated set and the number of proofs dropped.
pub fn dedupe_by_secret(proofs: Vec<Proof>) -> (Vec<Proof>, usize) {
    let mut seen = std::collections::HashSet::new();
    let before = proofs.len();
    let unique: Vec<Proof> = proofs
        .into_iter()
        .filter(|p| seen.insert(p.secret.clone()))
        .collect();
    let dropped = before - unique.len();
    (unique, dropped)
}

/// A transmissible bundle of proofs from one issuer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Issuer the proofs are redeemable at
    pub issuer_url: String,
    /// Unit of the denominations (e.g. "sat")
    pub unit: String,
    /// The proofs themselves
    pub proofs: Vec<Proof>,
    /// Optional note for the recipient
    pub memo: Option<String>,
}

/// JSON body of a V3 token
#[derive(Serialize, Deserialize)]
struct TokenV3 {
    token: Vec<TokenV3Entry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    memo: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct TokenV3Entry {
    mint: String,
    proofs: Vec<Proof>,
}

impl Token {
    /// Create a token
    pub fn new(issuer_url: impl Into<String>, unit: impl Into<String>, proofs: Vec<Proof>) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            unit: unit.into(),
            proofs,
            memo: None,
        }
    }

    /// Attach a memo
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// Total value carried by the token
    pub fn amount(&self) -> u64 {
        total_amount(&self.proofs)
    }

    /// Serialize to the `cashuA...` string form
    pub fn encode(&self) -> Result<String, ValidationError> {
        let body = TokenV3 {
            token: vec![TokenV3Entry {
                mint: self.issuer_url.clone(),
                proofs: self.proofs.clone(),
            }],
            unit: Some(self.unit.clone()),
            memo: self.memo.clone(),
        };
        let json = serde_json::to_vec(&body)
            .map_err(|e| ValidationError::InvalidToken(e.to_string()))?;
        Ok(format!("{}{}", TOKEN_PREFIX, URL_SAFE.encode(json)))
    }

    /// Parse a `cashuA...` string
    pub fn decode(encoded: &str) -> Result<Self, ValidationError> {
        let payload = encoded
            .trim()
            .strip_prefix(TOKEN_PREFIX)
            .ok_or_else(|| ValidationError::InvalidToken("missing cashuA prefix".to_string()))?;

        let bytes = TOKEN_DECODER
            .decode(payload.as_bytes())
            .map_err(|e| ValidationError::InvalidToken(format!("base64 decode: {}", e)))?;

        let body: TokenV3 = serde_json::from_slice(&bytes)
            .map_err(|e| ValidationError::InvalidToken(format!("json: {}", e)))?;

        let mut entries = body.token.into_iter();
        let entry = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            (None, _) => return Err(ValidationError::EmptyToken),
            (Some(_), Some(_)) => {
                return Err(ValidationError::InvalidToken(
                    "tokens spanning several issuers are not supported".to_string(),
                ))
            }
        };

        Ok(Self {
            issuer_url: entry.mint,
            unit: body.unit.unwrap_or_else(|| DEFAULT_UNIT.to_string()),
            proofs: entry.proofs,
            memo: body.memo,
        })
    }
}

/// Normalize an issuer URL for comparison (trailing slashes ignored)
pub fn normalize_issuer_url(url: &str) -> &str {
    url.trim().trim_end_matches('/')
}
