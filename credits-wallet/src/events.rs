//! Wallet Events
//!
//! Change notifications delivered over a tokio broadcast channel. Any number
//! of listeners may subscribe; a listener that falls behind loses the oldest
//! events and sees `RecvError::Lagged`.

use tokio::sync::broadcast;

use crate::history::SpendingRecord;
use crate::proof::Proof;

/// Default channel capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Notifications emitted by the wallet and the sync engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// Held balance after a mutation
    BalanceChanged { balance: u64 },

    /// Held proof count after a mutation
    ProofsChanged { count: usize },

    /// A value movement was recorded
    Transaction(SpendingRecord),

    /// A remote update was merged
    Synced { balance: u64, count: usize },

    /// Local proofs are missing from the remote set; emitted before resolution
    Conflict { local: Vec<Proof>, remote: Vec<Proof> },
}

/// Fan-out of wallet events
///
/// Clone this to share across the application.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<WalletEvent>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBroadcaster {
    /// Create a new broadcaster with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events sent from now on
    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.sender.subscribe()
    }

    pub fn send(&self, event: WalletEvent) {
        // No receivers is not an error
        let _ = self.sender.send(event);
    }

    /// Emit the pair of notifications that follows every mutation
    pub fn proofs_changed(&self, proofs: &[Proof]) {
        self.send(WalletEvent::BalanceChanged {
            balance: crate::proof::total_amount(proofs),
        });
        self.send(WalletEvent::ProofsChanged {
            count: proofs.len(),
        });
    }

    pub fn transaction(&self, record: SpendingRecord) {
        self.send(WalletEvent::Transaction(record));
    }

    pub fn synced(&self, proofs: &[Proof]) {
        self.send(WalletEvent::Synced {
            balance: crate::proof::total_amount(proofs),
            count: proofs.len(),
        });
    }

    pub fn conflict(&self, local: Vec<Proof>, remote: Vec<Proof>) {
        self.send(WalletEvent::Conflict { local, remote });
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
