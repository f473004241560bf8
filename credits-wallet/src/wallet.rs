//! Wallet Core
//!
//! Owns the held proof set and every transition on it: intake (mint, import,
//! swap change), token creation, pruning of spent proofs, and whole-set
//! replacement by a remote merge.
//!
//! Each mutation persists the complete new set before the in-memory copy is
//! swapped, then emits `BalanceChanged` and `ProofsChanged`. The wallet
//! assumes a single writer: concurrent mutating calls on one instance may
//! select overlapping proofs and must be serialized by the host.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use crate::error::{CreationDiagnostics, ValidationError, WalletError, WalletResult};
use crate::events::{EventBroadcaster, WalletEvent};
use crate::history::{Direction, HistoryLedger, SpendingRecord};
use crate::issuer::SwapService;
use crate::proof::{dedupe_by_secret, normalize_issuer_url, total_amount, Proof, Token};
use crate::reconcile::{ProofCheck, ReconciliationService};
use crate::selection::{ExactMatchLimits, ProofSelector, SelectionStrategy};
use crate::sink::{default_sink, DiagnosticSink};
use crate::store::ProofStore;

/// Fixed parameters of a wallet instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSettings {
    pub issuer_url: String,
    pub unit: String,
    pub strategy: SelectionStrategy,
    pub limits: ExactMatchLimits,
}

impl WalletSettings {
    pub fn new(issuer_url: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            unit: unit.into(),
            strategy: SelectionStrategy::default(),
            limits: ExactMatchLimits::default(),
        }
    }
}

/// A token ready to hand over, plus any change the swap produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedToken {
    pub token: Token,
    /// Proofs added to the wallet by the swap (empty for exact selections)
    pub change: Vec<Proof>,
}

impl CreatedToken {
    pub fn amount(&self) -> u64 {
        self.token.amount()
    }
}

/// The proof ledger of one wallet identity
pub struct WalletCore {
    settings: WalletSettings,
    store: Arc<dyn ProofStore>,
    swapper: Option<Arc<dyn SwapService>>,
    reconciler: Option<Arc<ReconciliationService>>,
    history: Option<Arc<HistoryLedger>>,
    sink: Arc<dyn DiagnosticSink>,
    events: EventBroadcaster,
    /// `None` until `load()` succeeds
    proofs: RwLock<Option<Vec<Proof>>>,
}

impl WalletCore {
    pub fn new(settings: WalletSettings, store: Arc<dyn ProofStore>) -> Self {
        Self {
            settings,
            store,
            swapper: None,
            reconciler: None,
            history: None,
            sink: default_sink(),
            events: EventBroadcaster::default(),
            proofs: RwLock::new(None),
        }
    }

    /// Enable exact change through an issuer swap
    pub fn with_swap_service(mut self, swapper: Arc<dyn SwapService>) -> Self {
        self.swapper = Some(swapper);
        self
    }

    /// Enable `prune_spent`
    pub fn with_reconciler(mut self, reconciler: Arc<ReconciliationService>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    /// Record value movements in `history`
    pub fn with_history(mut self, history: Arc<HistoryLedger>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn settings(&self) -> &WalletSettings {
        &self.settings
    }

    pub fn history(&self) -> Option<&Arc<HistoryLedger>> {
        self.history.as_ref()
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// Receive notifications sent from now on
    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }

    fn selector(&self) -> ProofSelector {
        ProofSelector::new(self.settings.strategy).with_limits(self.settings.limits)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Read the stored set into memory
    pub async fn load(&self) -> WalletResult<()> {
        let stored = self.store.load().await?;
        let (proofs, dropped) = dedupe_by_secret(stored);
        if dropped > 0 {
            self.sink.warn(
                "wallet",
                &format!("ignored {} stored proofs with duplicate secrets", dropped),
            );
        }

        info!(
            "Loaded {} proofs worth {} {}",
            proofs.len(),
            total_amount(&proofs),
            self.settings.unit
        );
        *self.proofs.write().await = Some(proofs);
        Ok(())
    }

    pub async fn is_loaded(&self) -> bool {
        self.proofs.read().await.is_some()
    }

    /// Held balance (0 before `load`)
    pub async fn balance(&self) -> u64 {
        self.proofs
            .read()
            .await
            .as_deref()
            .map(total_amount)
            .unwrap_or(0)
    }

    /// Owned copy of the held proofs
    pub async fn proofs(&self) -> Vec<Proof> {
        self.proofs.read().await.clone().unwrap_or_default()
    }

    async fn held(&self) -> WalletResult<Vec<Proof>> {
        self.proofs
            .read()
            .await
            .clone()
            .ok_or_else(|| ValidationError::NotLoaded.into())
    }

    // ========================================================================
    // Mutation plumbing
    // ========================================================================

    /// Persist `next` as the held set, install it in memory, then announce it
    async fn commit(&self, next: Vec<Proof>) -> WalletResult<()> {
        self.store.save(&next).await?;
        let mut held = self.proofs.write().await;
        *held = Some(next);
        let held = held.downgrade();
        self.events.proofs_changed(held.as_deref().unwrap_or_default());
        Ok(())
    }

    /// Append a record to the ledger and announce it.
    ///
    /// Value has already moved when this runs, so a ledger failure is only
    /// reported.
    pub(crate) async fn record(&self, record: SpendingRecord) {
        if let Some(history) = &self.history {
            if let Err(e) = history.append(&record).await {
                self.sink
                    .warn("wallet", &format!("failed to record history entry: {}", e));
            }
        }
        self.events.transaction(record);
    }

    // ========================================================================
    // Token creation
    // ========================================================================

    /// Take `amount` out of the wallet as a token
    pub async fn create_token(&self, amount: u64) -> WalletResult<CreatedToken> {
        let created = self.create_token_unrecorded(amount).await?;
        self.record(SpendingRecord::new(Direction::Out, amount, &self.settings.unit))
            .await;
        Ok(created)
    }

    pub(crate) async fn create_token_unrecorded(&self, amount: u64) -> WalletResult<CreatedToken> {
        if amount == 0 {
            let held = self.proofs().await;
            return Err(WalletError::InvalidAmount(Box::new(
                CreationDiagnostics::invalid_amount(amount, &held),
            )));
        }

        let held = self.held().await?;
        let selection = self.selector().select(&held, amount).ok_or_else(|| {
            WalletError::InsufficientBalance(Box::new(CreationDiagnostics::insufficient_balance(
                amount, &held,
            )))
        })?;

        let selected_total = selection.total();
        if selected_total == amount {
            let token = Token::new(&self.settings.issuer_url, &self.settings.unit, selection.selected);
            self.commit(selection.keep).await?;
            debug!("Created {} token from exact selection", amount);
            return Ok(CreatedToken {
                token,
                change: Vec::new(),
            });
        }

        let swapper = match &self.swapper {
            Some(swapper) => swapper,
            None => {
                return Err(WalletError::SelectionFailed(Box::new(
                    CreationDiagnostics::selection_failed(amount, &held, &selection.selected),
                )))
            }
        };

        debug!(
            "Swapping {} proofs worth {} for a {} send",
            selection.selected.len(),
            selected_total,
            amount
        );
        let output = swapper
            .swap(selection.selected.clone(), amount)
            .await
            .map_err(|e| WalletError::SwapFailed {
                reason: e.to_string(),
                diagnostics: Box::new(CreationDiagnostics::swap_failed(
                    amount,
                    &held,
                    &selection.selected,
                )),
            })?;

        let sent = total_amount(&output.send);
        if sent != amount {
            // The issuer already consumed the selection; keep whatever it returned
            let returned = sent + total_amount(&output.keep);
            let mut next = selection.keep.clone();
            next.extend(output.send);
            next.extend(output.keep);
            let (next, _) = dedupe_by_secret(next);
            self.commit(next).await?;
            return Err(WalletError::SwapFailed {
                reason: format!("issuer returned {} for a {} request", sent, amount),
                diagnostics: Box::new(CreationDiagnostics::swap_mismatched(
                    amount,
                    &held,
                    &selection.selected,
                    returned,
                )),
            });
        }

        let mut next = selection.keep;
        next.extend(output.keep.iter().cloned());
        let (next, _) = dedupe_by_secret(next);
        self.commit(next).await?;

        Ok(CreatedToken {
            token: Token::new(&self.settings.issuer_url, &self.settings.unit, output.send),
            change: output.keep,
        })
    }

    // ========================================================================
    // Intake
    // ========================================================================

    /// Add a received token's proofs, returning the value added
    pub async fn receive_token(&self, token: &Token) -> WalletResult<u64> {
        let added = self.receive_token_unrecorded(token).await?;
        let amount = total_amount(&added);
        self.record(SpendingRecord::new(Direction::In, amount, &self.settings.unit))
            .await;
        Ok(amount)
    }

    /// Decode a `cashuA...` string and receive it
    pub async fn receive_encoded(&self, encoded: &str) -> WalletResult<u64> {
        let token = Token::decode(encoded)?;
        self.receive_token(&token).await
    }

    pub(crate) async fn receive_token_unrecorded(&self, token: &Token) -> WalletResult<Vec<Proof>> {
        if normalize_issuer_url(&token.issuer_url) != normalize_issuer_url(&self.settings.issuer_url)
        {
            return Err(ValidationError::IssuerMismatch {
                expected: self.settings.issuer_url.clone(),
                got: token.issuer_url.clone(),
            }
            .into());
        }
        if token.unit != self.settings.unit {
            return Err(ValidationError::UnitMismatch {
                expected: self.settings.unit.clone(),
                got: token.unit.clone(),
            }
            .into());
        }
        self.absorb(token.proofs.clone()).await
    }

    /// Add proofs redeemed from a paid invoice, returning the value added
    pub async fn add_minted(&self, proofs: Vec<Proof>) -> WalletResult<u64> {
        let added = self.absorb(proofs).await?;
        let amount = total_amount(&added);
        self.record(SpendingRecord::new(Direction::In, amount, &self.settings.unit))
            .await;
        Ok(amount)
    }

    /// Add proofs redeemed in response to an external event (a paid invoice
    /// or an incoming payment notice); the ledger entry links `event_id`
    pub async fn add_redeemed(
        &self,
        proofs: Vec<Proof>,
        event_id: impl Into<String>,
    ) -> WalletResult<u64> {
        let added = self.absorb(proofs).await?;
        let amount = total_amount(&added);
        self.record(
            SpendingRecord::new(Direction::In, amount, &self.settings.unit).with_redeemed(event_id),
        )
        .await;
        Ok(amount)
    }

    pub(crate) async fn add_minted_unrecorded(&self, proofs: Vec<Proof>) -> WalletResult<Vec<Proof>> {
        self.absorb(proofs).await
    }

    /// Append proofs not already held; returns the ones actually added
    async fn absorb(&self, incoming: Vec<Proof>) -> WalletResult<Vec<Proof>> {
        let held = self.held().await?;
        if incoming.is_empty() {
            return Err(ValidationError::EmptyToken.into());
        }
        if incoming.iter().any(|p| p.amount == 0) {
            return Err(ValidationError::InvalidToken("proof with zero amount".to_string()).into());
        }

        let offered = incoming.len();
        let held_secrets: HashSet<&str> = held.iter().map(|p| p.secret.as_str()).collect();
        let (unique, _) = dedupe_by_secret(incoming);
        let fresh: Vec<Proof> = unique
            .into_iter()
            .filter(|p| !held_secrets.contains(p.secret.as_str()))
            .collect();

        if fresh.is_empty() {
            return Err(ValidationError::DuplicateProofs(offered).into());
        }
        if fresh.len() < offered {
            debug!("Skipped {} proofs already held", offered - fresh.len());
        }

        let mut next = held;
        next.extend(fresh.iter().cloned());
        self.commit(next).await?;

        info!("Added {} proofs worth {}", fresh.len(), total_amount(&fresh));
        Ok(fresh)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Replace the held set wholesale (remote merges)
    pub async fn replace_proofs(&self, proofs: Vec<Proof>) -> WalletResult<()> {
        self.held().await?;
        let (proofs, dropped) = dedupe_by_secret(proofs);
        if dropped > 0 {
            debug!("Dropped {} duplicate proofs from replacement set", dropped);
        }
        self.commit(proofs).await
    }

    /// Ask the issuer about the held proofs without changing anything
    pub async fn check_proofs(&self) -> WalletResult<ProofCheck> {
        let reconciler = self.reconciler.as_ref().ok_or_else(|| {
            ValidationError::InvalidConfig("no reconciliation service configured".to_string())
        })?;
        let held = self.held().await?;
        Ok(reconciler.check_state(&held).await)
    }

    /// Remove proofs the issuer reports as no longer redeemable.
    ///
    /// Returns the removed proofs. When the issuer is unreachable nothing is
    /// removed.
    pub async fn prune_spent(&self) -> WalletResult<Vec<Proof>> {
        let check = self.check_proofs().await?;
        if check.spent.is_empty() {
            return Ok(Vec::new());
        }

        let spent: HashSet<&str> = check.spent.iter().map(|p| p.secret.as_str()).collect();
        let next: Vec<Proof> = self
            .held()
            .await?
            .into_iter()
            .filter(|p| !spent.contains(p.secret.as_str()))
            .collect();
        self.commit(next).await?;

        info!(
            "Pruned {} spent proofs worth {}",
            check.spent.len(),
            total_amount(&check.spent)
        );
        Ok(check.spent)
    }

    /// Empty the wallet and its store
    pub async fn clear(&self) -> WalletResult<()> {
        self.store.clear().await?;
        *self.proofs.write().await = Some(Vec::new());
        self.events.proofs_changed(&[]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::store::MemoryStore;

    const ISSUER: &str = "https://issuer.example";

    fn proof(amount: u64, secret: &str) -> Proof {
        Proof::new("00", amount, secret, "02")
    }

    async fn loaded(amounts: &[u64]) -> WalletCore {
        let held = amounts
            .iter()
            .enumerate()
            .map(|(i, a)| proof(*a, &format!("held-{}", i)))
            .collect();
        let wallet = WalletCore::new(
            WalletSettings::new(ISSUER, "sat"),
            Arc::new(MemoryStore::with_proofs(held)),
        );
        wallet.load().await.unwrap();
        wallet
    }

    #[tokio::test]
    async fn test_not_loaded() {
        let wallet = WalletCore::new(
            WalletSettings::new(ISSUER, "sat"),
            Arc::new(MemoryStore::new()),
        );
        let err = wallet.create_token(1).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotLoaded);
        assert_eq!(wallet.balance().await, 0);
    }

    #[tokio::test]
    async fn test_zero_amount_rejected() {
        let wallet = loaded(&[1, 2]).await;
        let err = wallet.create_token(0).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidAmount);
        assert_eq!(wallet.balance().await, 3);
    }

    #[tokio::test]
    async fn test_exact_selection_removes_proofs() {
        let wallet = loaded(&[1, 2, 5, 10]).await;
        let created = wallet.create_token(8).await.unwrap();

        assert_eq!(created.amount(), 8);
        assert!(created.change.is_empty());
        assert_eq!(wallet.balance().await, 10);
    }

    #[tokio::test]
    async fn test_insufficient_balance_leaves_wallet_unchanged() {
        let wallet = loaded(&[1, 2, 4]).await;
        let before = wallet.proofs().await;

        let err = wallet.create_token(20).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientBalance);
        let diag = err.diagnostics().unwrap();
        assert_eq!(diag.shortfall(), 13);
        assert_eq!(diag.suggestion, "add 13 more credits");

        assert_eq!(wallet.proofs().await, before);
    }

    #[tokio::test]
    async fn test_overshoot_without_swap_is_selection_failure() {
        let wallet = loaded(&[8]).await;
        let err = wallet.create_token(3).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::SelectionFailed);
        assert_eq!(err.diagnostics().unwrap().partial_selection, vec![8]);
        assert_eq!(wallet.balance().await, 8);
    }

    #[tokio::test]
    async fn test_receive_validates_issuer_and_unit() {
        let wallet = loaded(&[]).await;

        let other_issuer = Token::new("https://other.example", "sat", vec![proof(1, "x")]);
        let err = wallet.receive_token(&other_issuer).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::IssuerMismatch);

        let other_unit = Token::new(ISSUER, "usd", vec![proof(1, "x")]);
        let err = wallet.receive_token(&other_unit).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnitMismatch);

        let trailing_slash = Token::new("https://issuer.example/", "sat", vec![proof(1, "x")]);
        assert_eq!(wallet.receive_token(&trailing_slash).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_receive_skips_held_secrets() {
        let wallet = loaded(&[4]).await;

        let token = Token::new(ISSUER, "sat", vec![proof(4, "held-0"), proof(2, "new")]);
        assert_eq!(wallet.receive_token(&token).await.unwrap(), 2);
        assert_eq!(wallet.balance().await, 6);

        let err = wallet.receive_token(&token).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateProofs);

        let empty = Token::new(ISSUER, "sat", vec![]);
        let err = wallet.receive_token(&empty).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::EmptyToken);
    }

    #[tokio::test]
    async fn test_mutations_emit_events() {
        let wallet = loaded(&[]).await;
        let mut rx = wallet.subscribe();

        wallet.add_minted(vec![proof(16, "m")]).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), WalletEvent::BalanceChanged { balance: 16 });
        assert_eq!(rx.recv().await.unwrap(), WalletEvent::ProofsChanged { count: 1 });
        match rx.recv().await.unwrap() {
            WalletEvent::Transaction(record) => {
                assert_eq!(record.direction, Direction::In);
                assert_eq!(record.amount, 16);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_listener_reads_committed_balance() {
        let wallet = Arc::new(loaded(&[]).await);
        let mut rx = wallet.subscribe();

        let reader = wallet.clone();
        let listener = tokio::spawn(async move {
            let mut stale = 0;
            loop {
                match rx.recv().await {
                    Ok(WalletEvent::BalanceChanged { balance }) => {
                        if reader.balance().await < balance {
                            stale += 1;
                        }
                        if balance == 500 {
                            return stale;
                        }
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return stale,
                }
            }
        });

        for i in 0..100 {
            wallet
                .add_minted(vec![proof(5, &format!("m-{}", i))])
                .await
                .unwrap();
        }
        assert_eq!(listener.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_redeemed_links_event() {
        let store = Arc::new(MemoryStore::new());
        let history = Arc::new(HistoryLedger::new(
            store.clone(),
            crate::seal::SealingKey::from_bytes([5u8; 32]),
        ));
        let wallet = WalletCore::new(WalletSettings::new(ISSUER, "sat"), store)
            .with_history(history.clone());
        wallet.load().await.unwrap();

        let added = wallet
            .add_redeemed(vec![proof(4, "r1"), proof(2, "r2")], "quote-17")
            .await
            .unwrap();
        assert_eq!(added, 6);

        let readout = history.read().await.unwrap();
        assert_eq!(readout.records.len(), 1);
        assert_eq!(readout.records[0].redeemed_event.as_deref(), Some("quote-17"));
        assert_eq!(readout.records[0].direction, Direction::In);
    }

    #[tokio::test]
    async fn test_proofs_returns_copy() {
        let wallet = loaded(&[1, 2]).await;
        let mut copy = wallet.proofs().await;
        copy.clear();
        assert_eq!(wallet.proofs().await.len(), 2);
    }

    #[tokio::test]
    async fn test_prune_requires_reconciler() {
        let wallet = loaded(&[1]).await;
        let err = wallet.prune_spent().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidConfig);
    }

    #[tokio::test]
    async fn test_clear() {
        let wallet = loaded(&[1, 2]).await;
        let mut rx = wallet.subscribe();
        wallet.clear().await.unwrap();
        assert_eq!(wallet.balance().await, 0);
        assert_eq!(rx.recv().await.unwrap(), WalletEvent::BalanceChanged { balance: 0 });
        assert!(wallet.is_loaded().await);
    }
}
