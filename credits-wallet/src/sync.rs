//! Multi-Device Sync
//!
//! [`SyncEngine`] decorates a [`WalletCore`] with the owner's remote record
//! feed. Outgoing: every mutation made through the engine publishes the new
//! held set as one sealed record that supersedes the previous live records.
//! Incoming: each remote event triggers a fetch of the remote set, a
//! conflict test against local state, and a merge through the wallet's
//! whole-set replacement.
//!
//! ## Conflicts
//!
//! Local state conflicts with the remote set when it holds a proof whose
//! public identifier the remote set lacks. Listeners receive
//! `WalletEvent::Conflict` with both sets before the merge is applied. The
//! default resolution is [`RemoteWins`], which drops local-only proofs on the
//! premise that they may have been spent by another device. A proof created
//! locally but not yet published is lost under that policy;
//! [`KeepLocalUnion`] keeps it instead.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info};

use crate::error::{StoreError, WalletResult};
use crate::feed::{unix_now, FeedScope, RemoteEvent, RemoteFeed, RemoteRecord};
use crate::history::{Direction, SpendingRecord};
use crate::proof::{dedupe_by_secret, normalize_issuer_url, total_amount, Proof, Token};
use crate::seal::SealingKey;
use crate::sink::{default_sink, DiagnosticSink};
use crate::wallet::{CreatedToken, WalletCore};

/// Decides the held set after a conflicting remote update
pub trait MergePolicy: Send + Sync {
    fn resolve(&self, local: &[Proof], remote: &[Proof]) -> Vec<Proof>;
}

/// Adopt the remote set as-is
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoteWins;

impl MergePolicy for RemoteWins {
    fn resolve(&self, _local: &[Proof], remote: &[Proof]) -> Vec<Proof> {
        remote.to_vec()
    }
}

/// Remote set plus every local proof it does not contain
#[derive(Debug, Default, Clone, Copy)]
pub struct KeepLocalUnion;

impl MergePolicy for KeepLocalUnion {
    fn resolve(&self, local: &[Proof], remote: &[Proof]) -> Vec<Proof> {
        let mut merged = remote.to_vec();
        merged.extend(local.iter().cloned());
        dedupe_by_secret(merged).0
    }
}

impl<F> MergePolicy for F
where
    F: Fn(&[Proof], &[Proof]) -> Vec<Proof> + Send + Sync,
{
    fn resolve(&self, local: &[Proof], remote: &[Proof]) -> Vec<Proof> {
        self(local, remote)
    }
}

/// Lifecycle of the feed subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribing,
    Subscribed,
}

/// What handling a remote event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The event was published by this engine
    Ignored,
    /// The remote set was merged into the wallet
    Merged { conflict: bool },
    /// No live record exists for this scope yet, so the remote side says
    /// nothing about local proofs; local state was published instead
    Seeded,
}

/// Decrypted body of a proof record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordContent {
    mint: String,
    unit: String,
    proofs: Vec<Proof>,
    /// Record ids this record supersedes
    #[serde(default)]
    del: Vec<String>,
}

/// Live records for the scope and the union of their proofs
struct RemoteState {
    live: Vec<String>,
    proofs: Vec<Proof>,
}

struct Subscription {
    state: SubscriptionState,
    shutdown: Option<oneshot::Sender<()>>,
    /// Bumped on every subscribe so a finished task cannot reset a newer one
    generation: u64,
}

/// Wallet decorator that keeps the held set in step with other devices
pub struct SyncEngine {
    wallet: Arc<WalletCore>,
    feed: Arc<dyn RemoteFeed>,
    key: SealingKey,
    scope: FeedScope,
    policy: Option<Arc<dyn MergePolicy>>,
    sink: Arc<dyn DiagnosticSink>,
    /// Ids of records this engine published
    published: std::sync::Mutex<HashSet<String>>,
    subscription: Mutex<Subscription>,
}

impl SyncEngine {
    pub fn new(
        wallet: Arc<WalletCore>,
        feed: Arc<dyn RemoteFeed>,
        key: SealingKey,
        account: impl Into<String>,
    ) -> Self {
        let settings = wallet.settings();
        let scope = FeedScope::new(account, settings.issuer_url.clone(), settings.unit.clone());
        Self {
            wallet,
            feed,
            key,
            scope,
            policy: None,
            sink: default_sink(),
            published: std::sync::Mutex::new(HashSet::new()),
            subscription: Mutex::new(Subscription {
                state: SubscriptionState::Unsubscribed,
                shutdown: None,
                generation: 0,
            }),
        }
    }

    /// Resolve conflicts with `policy` instead of [`RemoteWins`]
    pub fn with_policy(mut self, policy: impl MergePolicy + 'static) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn wallet(&self) -> &Arc<WalletCore> {
        &self.wallet
    }

    pub fn scope(&self) -> &FeedScope {
        &self.scope
    }

    pub async fn state(&self) -> SubscriptionState {
        self.subscription.lock().await.state
    }

    /// Whether `id` names a record this engine published
    pub fn is_self_published(&self, id: &str) -> bool {
        self.published
            .lock()
            .map(|ids| ids.contains(id))
            .unwrap_or(false)
    }

    // ========================================================================
    // Subscription
    // ========================================================================

    /// Start processing remote events published from now on.
    ///
    /// Calling this while subscribed (or subscribing) does nothing.
    pub async fn subscribe(self: &Arc<Self>) -> WalletResult<()> {
        let mut subscription = self.subscription.lock().await;
        if subscription.state != SubscriptionState::Unsubscribed {
            return Ok(());
        }
        subscription.state = SubscriptionState::Subscribing;

        let mut events = match self.feed.subscribe(&self.scope, unix_now()).await {
            Ok(events) => events,
            Err(e) => {
                subscription.state = SubscriptionState::Unsubscribed;
                return Err(e);
            }
        };

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        subscription.generation += 1;
        subscription.shutdown = Some(shutdown_tx);
        subscription.state = SubscriptionState::Subscribed;
        let generation = subscription.generation;
        drop(subscription);

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = &mut shutdown_rx => break,

                    event = events.next() => match event {
                        Some(event) => {
                            if let Err(e) = engine.handle_remote_update(&event).await {
                                engine.sink.warn(
                                    "sync",
                                    &format!("failed to merge remote update {}: {}", event.id, e),
                                );
                            }
                        }
                        None => break,
                    },
                }
            }

            let mut subscription = engine.subscription.lock().await;
            if subscription.generation == generation {
                subscription.state = SubscriptionState::Unsubscribed;
                subscription.shutdown = None;
            }
            debug!("Sync task for {} stopped", engine.scope.account);
        });

        info!("Subscribed to remote records for {}", self.scope.account);
        Ok(())
    }

    /// Stop delivery of further events; an event being merged still completes
    pub async fn unsubscribe(&self) {
        let mut subscription = self.subscription.lock().await;
        if let Some(shutdown) = subscription.shutdown.take() {
            let _ = shutdown.send(());
        }
        subscription.state = SubscriptionState::Unsubscribed;
    }

    // ========================================================================
    // Incoming
    // ========================================================================

    /// Merge the remote set in response to `event`
    pub async fn handle_remote_update(&self, event: &RemoteEvent) -> WalletResult<SyncOutcome> {
        if self.is_self_published(&event.id) {
            debug!("Ignoring own record {}", event.id);
            return Ok(SyncOutcome::Ignored);
        }
        self.sync_now().await
    }

    /// Fetch the remote set and merge it into the wallet
    pub async fn sync_now(&self) -> WalletResult<SyncOutcome> {
        let remote = self.fetch_remote().await?;
        let local = self.wallet.proofs().await;

        if remote.live.is_empty() {
            // An empty remote set here means "unknown", not "everything spent"
            if !local.is_empty() {
                self.publish_state().await?;
            }
            debug!(
                "No live records for {} {}; kept {} local proofs",
                self.scope.account,
                self.scope.unit,
                local.len()
            );
            return Ok(SyncOutcome::Seeded);
        }
        let remote = remote.proofs;

        let conflict = has_conflict(&local, &remote)?;
        let resolved = if conflict {
            self.wallet.events().conflict(local.clone(), remote.clone());
            match &self.policy {
                Some(policy) => policy.resolve(&local, &remote),
                None => RemoteWins.resolve(&local, &remote),
            }
        } else {
            remote
        };

        self.wallet.replace_proofs(resolved).await?;
        let merged = self.wallet.proofs().await;
        self.wallet.events().synced(&merged);

        info!(
            "Synced {} proofs worth {} (conflict: {})",
            merged.len(),
            total_amount(&merged),
            conflict
        );
        Ok(SyncOutcome::Merged { conflict })
    }

    /// Open every record, drop superseded ones, and union the rest
    async fn fetch_remote(&self) -> WalletResult<RemoteState> {
        let records = self.feed.fetch_records(&self.scope).await?;

        let mut opened = Vec::with_capacity(records.len());
        let mut superseded = HashSet::new();
        for record in records {
            match self.open_record(&record) {
                Ok(content) => {
                    superseded.extend(content.del.iter().cloned());
                    opened.push((record.id, content));
                }
                Err(reason) => self.sink.warn(
                    "sync",
                    &format!("skipping remote record {}: {}", record.id, reason),
                ),
            }
        }

        let mut live_ids = Vec::new();
        let mut proofs = Vec::new();
        for (id, content) in opened {
            if superseded.contains(&id) {
                continue;
            }
            live_ids.push(id);
            proofs.extend(content.proofs);
        }

        Ok(RemoteState {
            live: live_ids,
            proofs: dedupe_by_secret(proofs).0,
        })
    }

    fn open_record(&self, record: &RemoteRecord) -> Result<RecordContent, String> {
        let plaintext = self.key.open(&record.content).map_err(|e| e.to_string())?;
        let content: RecordContent =
            serde_json::from_slice(&plaintext).map_err(|e| format!("invalid content: {}", e))?;

        if normalize_issuer_url(&content.mint) != normalize_issuer_url(&self.scope.issuer)
            || content.unit != self.scope.unit
        {
            return Err(format!(
                "record is for {} {}, not {} {}",
                content.mint, content.unit, self.scope.issuer, self.scope.unit
            ));
        }
        Ok(content)
    }

    // ========================================================================
    // Outgoing
    // ========================================================================

    /// Publish the current held set, superseding the live records.
    ///
    /// The live records are fetched right before publishing. A record another
    /// device publishes between that fetch and ours stays live, and its
    /// proofs rejoin the remote union until a later publish supersedes it.
    ///
    /// Returns the new record id and the ids it superseded.
    pub async fn publish_state(&self) -> WalletResult<(String, Vec<String>)> {
        let superseded = self.fetch_remote().await?.live;

        let content = RecordContent {
            mint: self.scope.issuer.clone(),
            unit: self.scope.unit.clone(),
            proofs: self.wallet.proofs().await,
            del: superseded.clone(),
        };
        let plaintext = serde_json::to_vec(&content).map_err(StoreError::Serialization)?;
        let sealed = self.key.seal(&plaintext)?;

        // An echo delivered before the id is recorded merges our own state
        // back, which changes nothing
        let id = self.feed.publish(&self.scope, sealed).await?;
        if let Ok(mut published) = self.published.lock() {
            published.insert(id.clone());
        }

        debug!("Published {} superseding {} records", id, superseded.len());
        Ok((id, superseded))
    }

    /// Publish after a local mutation and attach the record references.
    ///
    /// The mutation already happened, so a failed publish is only reported;
    /// the next successful publish carries the full set.
    async fn publish_for(&self, record: SpendingRecord) -> SpendingRecord {
        match self.publish_state().await {
            Ok((id, superseded)) => record.with_created(id).with_destroyed(superseded),
            Err(e) => {
                self.sink
                    .warn("sync", &format!("failed to publish proof record: {}", e));
                record
            }
        }
    }

    /// Append to the local ledger and mirror to the feed's history stream
    async fn record(&self, record: SpendingRecord) {
        match serde_json::to_vec(&record.to_tags()) {
            Ok(json) => match self.key.seal(&json) {
                Ok(sealed) => {
                    if let Err(e) = self.feed.publish_history(&self.scope, sealed).await {
                        self.sink
                            .warn("sync", &format!("failed to publish history entry: {}", e));
                    }
                }
                Err(e) => self.sink.warn("sync", &format!("failed to seal history entry: {}", e)),
            },
            Err(e) => self.sink.warn("sync", &format!("failed to encode history entry: {}", e)),
        }
        self.wallet.record(record).await;
    }

    /// [`WalletCore::create_token`], then publish
    pub async fn create_token(&self, amount: u64) -> WalletResult<CreatedToken> {
        let created = self.wallet.create_token_unrecorded(amount).await?;
        let record = SpendingRecord::new(Direction::Out, amount, &self.scope.unit);
        let record = self.publish_for(record).await;
        self.record(record).await;
        Ok(created)
    }

    /// [`WalletCore::receive_token`], then publish
    pub async fn receive_token(&self, token: &Token) -> WalletResult<u64> {
        let added = self.wallet.receive_token_unrecorded(token).await?;
        let amount = total_amount(&added);
        let record = SpendingRecord::new(Direction::In, amount, &self.scope.unit);
        let record = self.publish_for(record).await;
        self.record(record).await;
        Ok(amount)
    }

    /// [`WalletCore::receive_encoded`], then publish
    pub async fn receive_encoded(&self, encoded: &str) -> WalletResult<u64> {
        let token = Token::decode(encoded)?;
        self.receive_token(&token).await
    }

    /// [`WalletCore::add_minted`], then publish
    pub async fn add_minted(&self, proofs: Vec<Proof>) -> WalletResult<u64> {
        let added = self.wallet.add_minted_unrecorded(proofs).await?;
        let amount = total_amount(&added);
        let record = SpendingRecord::new(Direction::In, amount, &self.scope.unit);
        let record = self.publish_for(record).await;
        self.record(record).await;
        Ok(amount)
    }

    /// [`WalletCore::add_redeemed`], then publish
    pub async fn add_redeemed(
        &self,
        proofs: Vec<Proof>,
        event_id: impl Into<String>,
    ) -> WalletResult<u64> {
        let added = self.wallet.add_minted_unrecorded(proofs).await?;
        let amount = total_amount(&added);
        let record =
            SpendingRecord::new(Direction::In, amount, &self.scope.unit).with_redeemed(event_id);
        let record = self.publish_for(record).await;
        self.record(record).await;
        Ok(amount)
    }

    /// [`WalletCore::prune_spent`], then publish if anything was removed
    pub async fn prune_spent(&self) -> WalletResult<Vec<Proof>> {
        let removed = self.wallet.prune_spent().await?;
        if !removed.is_empty() {
            if let Err(e) = self.publish_state().await {
                self.sink
                    .warn("sync", &format!("failed to publish proof record: {}", e));
            }
        }
        Ok(removed)
    }
}

/// Whether `local` holds a proof whose identifier `remote` lacks
pub fn has_conflict(local: &[Proof], remote: &[Proof]) -> WalletResult<bool> {
    let remote_ys = remote
        .iter()
        .map(Proof::y)
        .collect::<Result<HashSet<String>, _>>()?;
    for proof in local {
        if !remote_ys.contains(&proof.y()?) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::WalletEvent;
    use crate::feed::MemoryFeed;
    use crate::store::MemoryStore;
    use crate::wallet::WalletSettings;

    const ISSUER: &str = "https://issuer.example";

    fn proof(amount: u64, secret: &str) -> Proof {
        Proof::new("00", amount, secret, "02")
    }

    fn key() -> SealingKey {
        SealingKey::from_bytes([3u8; 32])
    }

    async fn wallet(held: Vec<Proof>) -> Arc<WalletCore> {
        let wallet = WalletCore::new(
            WalletSettings::new(ISSUER, "sat"),
            Arc::new(MemoryStore::with_proofs(held)),
        );
        wallet.load().await.unwrap();
        Arc::new(wallet)
    }

    fn sealed_record(proofs: Vec<Proof>, del: Vec<String>) -> String {
        let content = RecordContent {
            mint: ISSUER.to_string(),
            unit: "sat".to_string(),
            proofs,
            del,
        };
        key().seal(&serde_json::to_vec(&content).unwrap()).unwrap()
    }

    #[test]
    fn test_conflict_detection() {
        let a = proof(1, "a");
        let b = proof(2, "b");

        assert!(has_conflict(&[a.clone(), b.clone()], &[a.clone()]).unwrap());
        assert!(!has_conflict(&[a.clone()], &[a.clone(), b.clone()]).unwrap());
        assert!(!has_conflict(&[], &[a]).unwrap());
    }

    #[test]
    fn test_policies() {
        let a = proof(1, "a");
        let b = proof(2, "b");
        let c = proof(4, "c");

        assert_eq!(
            RemoteWins.resolve(&[a.clone(), b.clone()], &[a.clone()]),
            vec![a.clone()]
        );
        assert_eq!(
            KeepLocalUnion.resolve(&[a.clone(), b.clone()], &[a.clone(), c.clone()]),
            vec![a.clone(), c.clone(), b.clone()]
        );

        let custom = |_: &[Proof], _: &[Proof]| vec![c.clone()];
        assert_eq!(custom.resolve(&[a], &[b]), vec![c]);
    }

    #[tokio::test]
    async fn test_conflict_defaults_to_remote_wins() {
        let a = proof(1, "a");
        let b = proof(2, "b");
        let feed = Arc::new(MemoryFeed::new());
        let engine = SyncEngine::new(wallet(vec![a.clone(), b]).await, feed.clone(), key(), "owner");
        let mut rx = engine.wallet().subscribe();

        let scope = engine.scope().clone();
        let id = feed
            .publish(&scope, sealed_record(vec![a.clone()], vec![]))
            .await
            .unwrap();

        let outcome = engine
            .handle_remote_update(&RemoteEvent { id, created_at: 0 })
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Merged { conflict: true });
        assert_eq!(engine.wallet().proofs().await, vec![a]);
        assert!(matches!(rx.recv().await.unwrap(), WalletEvent::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_superset_is_clean_sync_without_policy_call() {
        let a = proof(1, "a");
        let b = proof(2, "b");
        let feed = Arc::new(MemoryFeed::new());
        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = called.clone();
        let engine = SyncEngine::new(wallet(vec![a.clone()]).await, feed.clone(), key(), "owner")
            .with_policy(move |local: &[Proof], _: &[Proof]| {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                local.to_vec()
            });

        let scope = engine.scope().clone();
        let id = feed
            .publish(&scope, sealed_record(vec![a.clone(), b.clone()], vec![]))
            .await
            .unwrap();

        let outcome = engine
            .handle_remote_update(&RemoteEvent { id, created_at: 0 })
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Merged { conflict: false });
        assert_eq!(engine.wallet().proofs().await, vec![a, b]);
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_superseded_and_foreign_records_are_dropped() {
        let feed = Arc::new(MemoryFeed::new());
        let engine = SyncEngine::new(wallet(vec![]).await, feed.clone(), key(), "owner");
        let scope = engine.scope().clone();

        let old = feed
            .publish(&scope, sealed_record(vec![proof(8, "old")], vec![]))
            .await
            .unwrap();
        feed.publish(&scope, sealed_record(vec![proof(4, "new")], vec![old]))
            .await
            .unwrap();
        feed.publish(&scope, "not-a-sealed-record".to_string())
            .await
            .unwrap();
        let foreign = SealingKey::from_bytes([9u8; 32])
            .seal(b"{}")
            .unwrap();
        feed.publish(&scope, foreign).await.unwrap();

        engine.sync_now().await.unwrap();
        assert_eq!(engine.wallet().balance().await, 4);
    }

    #[tokio::test]
    async fn test_own_publications_are_ignored() {
        let feed = Arc::new(MemoryFeed::new());
        let engine = SyncEngine::new(wallet(vec![]).await, feed.clone(), key(), "owner");

        engine.add_minted(vec![proof(8, "m")]).await.unwrap();
        let records = feed.fetch_records(engine.scope()).await.unwrap();
        assert_eq!(records.len(), 1);

        let event = RemoteEvent {
            id: records[0].id.clone(),
            created_at: records[0].created_at,
        };
        assert_eq!(
            engine.handle_remote_update(&event).await.unwrap(),
            SyncOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn test_publish_supersedes_previous_record() {
        let feed = Arc::new(MemoryFeed::new());
        let engine = SyncEngine::new(
            wallet(vec![proof(1, "a"), proof(2, "b")]).await,
            feed.clone(),
            key(),
            "owner",
        );

        let (first, superseded) = engine.publish_state().await.unwrap();
        assert!(superseded.is_empty());

        engine.create_token(1).await.unwrap();
        let records = feed.fetch_records(engine.scope()).await.unwrap();
        assert_eq!(records.len(), 2);

        let latest = engine.open_record(&records[1]).unwrap();
        assert_eq!(latest.del, vec![first]);
        assert_eq!(total_amount(&latest.proofs), 2);
        assert_eq!(feed.history_entries("owner").len(), 1);
    }

    /// Feed whose live stream closes immediately
    struct ClosingFeed(MemoryFeed);

    #[async_trait::async_trait]
    impl RemoteFeed for ClosingFeed {
        async fn subscribe(
            &self,
            _scope: &FeedScope,
            _since: u64,
        ) -> WalletResult<futures::stream::BoxStream<'static, RemoteEvent>> {
            Ok(futures::stream::empty().boxed())
        }

        async fn fetch_records(&self, scope: &FeedScope) -> WalletResult<Vec<RemoteRecord>> {
            self.0.fetch_records(scope).await
        }

        async fn publish(&self, scope: &FeedScope, content: String) -> WalletResult<String> {
            self.0.publish(scope, content).await
        }
    }

    #[tokio::test]
    async fn test_state_resets_when_stream_ends() {
        let feed = Arc::new(ClosingFeed(MemoryFeed::new()));
        let engine = Arc::new(SyncEngine::new(wallet(vec![]).await, feed, key(), "owner"));

        engine.subscribe().await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while engine.state().await != SubscriptionState::Unsubscribed {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        // The ended subscription does not block a new one
        engine.subscribe().await.unwrap();
        engine.unsubscribe().await;
        assert_eq!(engine.state().await, SubscriptionState::Unsubscribed);
    }

    #[tokio::test]
    async fn test_redeemed_intake_links_event_and_record() {
        let feed = Arc::new(MemoryFeed::new());
        let engine = SyncEngine::new(wallet(vec![]).await, feed.clone(), key(), "owner");
        let mut rx = engine.wallet().subscribe();

        engine
            .add_redeemed(vec![proof(8, "zap")], "payment-event")
            .await
            .unwrap();

        let records = feed.fetch_records(engine.scope()).await.unwrap();
        loop {
            if let WalletEvent::Transaction(record) = rx.recv().await.unwrap() {
                assert_eq!(record.redeemed_event.as_deref(), Some("payment-event"));
                assert_eq!(record.created_record.as_deref(), Some(records[0].id.as_str()));
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_empty_remote_keeps_local_proofs() {
        let a = proof(1, "a");
        let feed = Arc::new(MemoryFeed::new());
        let engine = SyncEngine::new(wallet(vec![a.clone()]).await, feed.clone(), key(), "owner");

        assert_eq!(engine.sync_now().await.unwrap(), SyncOutcome::Seeded);
        assert_eq!(engine.wallet().proofs().await, vec![a]);
        assert_eq!(feed.fetch_records(engine.scope()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_tombstones_records_from_other_devices() {
        let feed = Arc::new(MemoryFeed::new());
        let phone = SyncEngine::new(wallet(vec![proof(1, "a")]).await, feed.clone(), key(), "owner");
        let laptop = SyncEngine::new(wallet(vec![proof(2, "b")]).await, feed.clone(), key(), "owner");

        let (first, _) = phone.publish_state().await.unwrap();
        // The laptop never fetched, yet its publish still supersedes the phone's record
        let (_, superseded) = laptop.publish_state().await.unwrap();
        assert_eq!(superseded, vec![first]);
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let feed = Arc::new(MemoryFeed::new());
        let engine = Arc::new(SyncEngine::new(wallet(vec![]).await, feed.clone(), key(), "owner"));

        engine.subscribe().await.unwrap();
        engine.subscribe().await.unwrap();
        assert_eq!(feed.subscription_count(), 1);
        assert_eq!(engine.state().await, SubscriptionState::Subscribed);

        engine.unsubscribe().await;
        assert_eq!(engine.state().await, SubscriptionState::Unsubscribed);

        engine.subscribe().await.unwrap();
        assert_eq!(feed.subscription_count(), 2);
        engine.unsubscribe().await;
    }
}
