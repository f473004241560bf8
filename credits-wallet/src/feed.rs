//! Remote Record Feed
//!
//! The owner's devices share proof state through an external, eventually
//! consistent log of sealed records. This module defines the contract the
//! sync engine consumes and an in-process implementation. A host bridges its
//! own relay client by implementing [`RemoteFeed`].

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{WalletError, WalletResult};
use crate::proof::normalize_issuer_url;

/// Which records a feed operation addresses
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedScope {
    /// Owner identity shared by all devices
    pub account: String,
    pub issuer: String,
    pub unit: String,
}

impl FeedScope {
    pub fn new(
        account: impl Into<String>,
        issuer: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            issuer: issuer.into(),
            unit: unit.into(),
        }
    }

    /// Whether `other` addresses the same records; issuer URLs compare
    /// without trailing slashes
    pub fn matches(&self, other: &FeedScope) -> bool {
        self.account == other.account
            && self.unit == other.unit
            && normalize_issuer_url(&self.issuer) == normalize_issuer_url(&other.issuer)
    }
}

/// A sealed record held by the feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    pub id: String,
    /// Unix timestamp (seconds)
    pub created_at: u64,
    /// Sealed payload
    pub content: String,
}

/// Notification that a record was published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEvent {
    pub id: String,
    pub created_at: u64,
}

/// Access to the owner's remote records
#[async_trait]
pub trait RemoteFeed: Send + Sync {
    /// Live stream of events published at or after `since`
    async fn subscribe(
        &self,
        scope: &FeedScope,
        since: u64,
    ) -> WalletResult<BoxStream<'static, RemoteEvent>>;

    /// Every proof record currently held for the scope
    async fn fetch_records(&self, scope: &FeedScope) -> WalletResult<Vec<RemoteRecord>>;

    /// Publish a sealed proof record, returning its id
    async fn publish(&self, scope: &FeedScope, content: String) -> WalletResult<String>;

    /// Publish a sealed history entry
    async fn publish_history(&self, _scope: &FeedScope, _content: String) -> WalletResult<()> {
        Ok(())
    }
}

pub(crate) fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

struct Subscriber {
    scope: FeedScope,
    since: u64,
    sender: mpsc::UnboundedSender<RemoteEvent>,
}

#[derive(Default)]
struct FeedInner {
    records: Vec<(FeedScope, RemoteRecord)>,
    history: Vec<(FeedScope, String)>,
    subscribers: Vec<Subscriber>,
    sequence: u64,
}

/// In-process feed shared by several engines in one process
#[derive(Default)]
pub struct MemoryFeed {
    inner: Mutex<FeedInner>,
    subscribe_calls: AtomicUsize,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `subscribe` was called
    pub fn subscription_count(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Subscribers whose stream is still open
    pub fn live_subscribers(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .subscribers
                    .iter()
                    .filter(|s| !s.sender.is_closed())
                    .count()
            })
            .unwrap_or(0)
    }

    /// Sealed history entries published for `account`
    pub fn history_entries(&self, account: &str) -> Vec<String> {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .history
                    .iter()
                    .filter(|(scope, _)| scope.account == account)
                    .map(|(_, content)| content.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lock(&self) -> WalletResult<std::sync::MutexGuard<'_, FeedInner>> {
        self.inner
            .lock()
            .map_err(|_| WalletError::Transport("feed lock poisoned".to_string()))
    }
}

#[async_trait]
impl RemoteFeed for MemoryFeed {
    async fn subscribe(
        &self,
        scope: &FeedScope,
        since: u64,
    ) -> WalletResult<BoxStream<'static, RemoteEvent>> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock()?.subscribers.push(Subscriber {
            scope: scope.clone(),
            since,
            sender,
        });

        let events = stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|event| (event, receiver))
        });
        Ok(events.boxed())
    }

    async fn fetch_records(&self, scope: &FeedScope) -> WalletResult<Vec<RemoteRecord>> {
        Ok(self
            .lock()?
            .records
            .iter()
            .filter(|(held, _)| held.matches(scope))
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn publish(&self, scope: &FeedScope, content: String) -> WalletResult<String> {
        let mut inner = self.lock()?;
        inner.sequence += 1;

        let mut hasher = Sha256::new();
        hasher.update(scope.account.as_bytes());
        hasher.update(scope.unit.as_bytes());
        hasher.update(inner.sequence.to_le_bytes());
        hasher.update(content.as_bytes());
        let id = hex::encode(hasher.finalize());

        let record = RemoteRecord {
            id: id.clone(),
            created_at: unix_now(),
            content,
        };
        let event = RemoteEvent {
            id: id.clone(),
            created_at: record.created_at,
        };
        inner.records.push((scope.clone(), record));

        inner.subscribers.retain(|s| !s.sender.is_closed());
        for subscriber in &inner.subscribers {
            if subscriber.scope.matches(scope) && event.created_at >= subscriber.since {
                let _ = subscriber.sender.send(event.clone());
            }
        }

        debug!("Published record {} for {}", &id[..16], scope.account);
        Ok(id)
    }

    async fn publish_history(&self, scope: &FeedScope, content: String) -> WalletResult<()> {
        self.lock()?.history.push((scope.clone(), content));
        Ok(())
    }
}
