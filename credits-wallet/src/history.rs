//! Spending History
//!
//! Append-only log of value moving in and out of the wallet. Each record is
//! encoded as a list of string tuples, sealed, and kept through the proof
//! store's history methods:
//!
//! ```text
//! [["direction","out"],["amount","3"],["unit","sat"],
//!  ["e","<record id>","","created"],["e","<record id>","","destroyed"],
//!  ["e","<event id>","","redeemed"],["timestamp","1700000000"]]
//! ```
//!
//! Readers skip entries they cannot open or parse; one damaged entry never
//! hides the rest of the log.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{SealError, StoreError};
use crate::proof::DEFAULT_UNIT;
use crate::seal::SealingKey;
use crate::sink::{default_sink, DiagnosticSink};
use crate::store::ProofStore;

const MARKER_CREATED: &str = "created";
const MARKER_DESTROYED: &str = "destroyed";
const MARKER_REDEEMED: &str = "redeemed";

/// Which way value moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One inbound or outbound value movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingRecord {
    pub direction: Direction,
    pub amount: u64,
    pub unit: String,
    /// Remote record published for the resulting proof set
    pub created_record: Option<String>,
    /// Remote records superseded by this movement
    pub destroyed_records: Vec<String>,
    /// Remote event that delivered incoming value
    pub redeemed_event: Option<String>,
    /// Unix timestamp (seconds)
    pub timestamp: u64,
}

impl SpendingRecord {
    /// Record stamped with the current time
    pub fn new(direction: Direction, amount: u64, unit: impl Into<String>) -> Self {
        Self {
            direction,
            amount,
            unit: unit.into(),
            created_record: None,
            destroyed_records: Vec::new(),
            redeemed_event: None,
            timestamp: chrono::Utc::now().timestamp().max(0) as u64,
        }
    }

    pub fn with_created(mut self, id: impl Into<String>) -> Self {
        self.created_record = Some(id.into());
        self
    }

    pub fn with_destroyed(mut self, ids: Vec<String>) -> Self {
        self.destroyed_records = ids;
        self
    }

    pub fn with_redeemed(mut self, id: impl Into<String>) -> Self {
        self.redeemed_event = Some(id.into());
        self
    }

    /// Encode as tag tuples
    pub fn to_tags(&self) -> Vec<Vec<String>> {
        let mut tags = vec![
            vec!["direction".to_string(), self.direction.to_string()],
            vec!["amount".to_string(), self.amount.to_string()],
            vec!["unit".to_string(), self.unit.clone()],
        ];
        if let Some(id) = &self.created_record {
            tags.push(event_tag(id, MARKER_CREATED));
        }
        for id in &self.destroyed_records {
            tags.push(event_tag(id, MARKER_DESTROYED));
        }
        if let Some(id) = &self.redeemed_event {
            tags.push(event_tag(id, MARKER_REDEEMED));
        }
        tags.push(vec!["timestamp".to_string(), self.timestamp.to_string()]);
        tags
    }

    /// Decode tag tuples; unknown tags are ignored
    pub fn from_tags(tags: &[Vec<String>]) -> Result<Self, String> {
        let mut direction = None;
        let mut amount = None;
        let mut unit = None;
        let mut timestamp = 0;
        let mut created_record = None;
        let mut destroyed_records = Vec::new();
        let mut redeemed_event = None;

        for tag in tags {
            let (name, value) = match (tag.first(), tag.get(1)) {
                (Some(name), Some(value)) => (name.as_str(), value),
                _ => continue,
            };
            match name {
                "direction" => {
                    direction = Some(match value.as_str() {
                        "in" => Direction::In,
                        "out" => Direction::Out,
                        other => return Err(format!("unknown direction '{}'", other)),
                    })
                }
                "amount" => {
                    amount = Some(
                        value
                            .parse::<u64>()
                            .map_err(|_| format!("invalid amount '{}'", value))?,
                    )
                }
                "unit" => unit = Some(value.clone()),
                "timestamp" => {
                    timestamp = value
                        .parse::<u64>()
                        .map_err(|_| format!("invalid timestamp '{}'", value))?
                }
                "e" => match tag.get(3).map(String::as_str) {
                    Some(MARKER_CREATED) => created_record = Some(value.clone()),
                    Some(MARKER_DESTROYED) => destroyed_records.push(value.clone()),
                    Some(MARKER_REDEEMED) => redeemed_event = Some(value.clone()),
                    _ => {}
                },
                _ => {}
            }
        }

        Ok(Self {
            direction: direction.ok_or("missing direction")?,
            amount: amount.ok_or("missing amount")?,
            unit: unit.unwrap_or_else(|| DEFAULT_UNIT.to_string()),
            created_record,
            destroyed_records,
            redeemed_event,
            timestamp,
        })
    }
}

fn event_tag(id: &str, marker: &str) -> Vec<String> {
    vec![
        "e".to_string(),
        id.to_string(),
        String::new(),
        marker.to_string(),
    ]
}

/// A stored entry that could not be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    /// Position in the stored log (oldest = 0)
    pub index: usize,
    pub reason: String,
}

/// Result of reading the ledger
#[derive(Debug, Clone, Default)]
pub struct HistoryReadout {
    /// Newest first
    pub records: Vec<SpendingRecord>,
    pub skipped: Vec<SkippedRecord>,
}

/// Encrypted, append-only spending history
pub struct HistoryLedger {
    store: Arc<dyn ProofStore>,
    key: SealingKey,
    sink: Arc<dyn DiagnosticSink>,
    /// Serializes read-modify-write of the stored log
    append_lock: Mutex<()>,
}

impl HistoryLedger {
    pub fn new(store: Arc<dyn ProofStore>, key: SealingKey) -> Self {
        Self {
            store,
            key,
            sink: default_sink(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Seal a record for storage or publication
    pub fn seal_record(&self, record: &SpendingRecord) -> Result<String, SealError> {
        let json = serde_json::to_vec(&record.to_tags())
            .map_err(|e| SealError::Malformed(e.to_string()))?;
        self.key.seal(&json)
    }

    /// Open a sealed record
    pub fn open_record(&self, sealed: &str) -> Result<SpendingRecord, String> {
        let plaintext = self.key.open(sealed).map_err(|e| e.to_string())?;
        let tags: Vec<Vec<String>> =
            serde_json::from_slice(&plaintext).map_err(|e| format!("invalid tag list: {}", e))?;
        SpendingRecord::from_tags(&tags)
    }

    /// Append a record to the log
    pub async fn append(&self, record: &SpendingRecord) -> Result<(), StoreError> {
        let sealed = self.seal_record(record)?;

        let _guard = self.append_lock.lock().await;
        let mut entries = self.store.load_history().await?;
        entries.push(sealed);
        self.store.save_history(&entries).await?;

        debug!(
            "Recorded {} {} {}",
            record.direction, record.amount, record.unit
        );
        Ok(())
    }

    /// All readable records, newest first, plus what was skipped
    pub async fn read(&self) -> Result<HistoryReadout, StoreError> {
        let entries = self.store.load_history().await?;
        let mut readout = HistoryReadout::default();

        for (index, sealed) in entries.iter().enumerate() {
            match self.open_record(sealed) {
                Ok(record) => readout.records.push(record),
                Err(reason) => {
                    self.sink.warn(
                        "history",
                        &format!("skipping history entry {}: {}", index, reason),
                    );
                    readout.skipped.push(SkippedRecord { index, reason });
                }
            }
        }

        readout.records.reverse();
        Ok(readout)
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.append_lock.lock().await;
        self.store.clear_history().await
    }
}
