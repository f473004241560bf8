//! Proof Selection
//!
//! Pure strategies mapping (held proofs, target amount) to a subset whose sum
//! covers the target, or `None` when the held total is too small. Inputs are
//! never mutated; both the selected and the kept sets preserve input order.
//!
//! # Exact matching
//!
//! [`SelectionStrategy::ExactMatch`] runs a 0/1 subset-sum over a table with
//! one slot per reachable sum `0..=amount`, so its cost is pseudo-polynomial
//! in (proof count x amount). It is only attempted inside
//! [`ExactMatchLimits`]; outside them, or when no exact subset exists, the
//! smallest-first result is returned instead. This is an approximation: a
//! zero-change combination may exist that is not searched for.

use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

use crate::proof::{total_amount, Proof};

/// Default largest proof count searched by exact matching
pub const DEFAULT_EXACT_MATCH_MAX_PROOFS: usize = 50;

/// Default largest target searched by exact matching
pub const DEFAULT_EXACT_MATCH_MAX_TARGET: u64 = 10_000;

/// Named selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Ascending by amount; uses up small denominations first
    SmallestFirst,
    /// Descending by amount; fewest proofs, typically more change
    LargestFirst,
    /// Zero-change subset when one can be found cheaply
    #[default]
    ExactMatch,
    /// Shuffled greedy; weakens linkage between payments
    Random,
}

/// Bounds on the exact-match search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactMatchLimits {
    #[serde(default = "default_max_proofs")]
    pub max_proofs: usize,
    #[serde(default = "default_max_target")]
    pub max_target: u64,
}

fn default_max_proofs() -> usize {
    DEFAULT_EXACT_MATCH_MAX_PROOFS
}

fn default_max_target() -> u64 {
    DEFAULT_EXACT_MATCH_MAX_TARGET
}

impl Default for ExactMatchLimits {
    fn default() -> Self {
        Self {
            max_proofs: DEFAULT_EXACT_MATCH_MAX_PROOFS,
            max_target: DEFAULT_EXACT_MATCH_MAX_TARGET,
        }
    }
}

impl ExactMatchLimits {
    fn permits(&self, proof_count: usize, amount: u64) -> bool {
        proof_count <= self.max_proofs && amount <= self.max_target
    }
}

/// Outcome of a successful selection
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    /// Proofs to spend
    pub selected: Vec<Proof>,
    /// Proofs left in the wallet
    pub keep: Vec<Proof>,
}

impl Selection {
    /// Sum of the selected proofs
    pub fn total(&self) -> u64 {
        total_amount(&self.selected)
    }

    /// Value selected beyond `amount`
    pub fn change(&self, amount: u64) -> u64 {
        self.total().saturating_sub(amount)
    }

    /// Split `proofs` by a per-index mask
    fn from_mask(proofs: &[Proof], chosen: &[bool]) -> Self {
        let mut selection = Selection::default();
        for (proof, &take) in proofs.iter().zip(chosen) {
            if take {
                selection.selected.push(proof.clone());
            } else {
                selection.keep.push(proof.clone());
            }
        }
        selection
    }
}

/// Runs a strategy over a proof set
#[derive(Debug, Clone, Copy, Default)]
pub struct ProofSelector {
    strategy: SelectionStrategy,
    limits: ExactMatchLimits,
}

impl ProofSelector {
    pub fn new(strategy: SelectionStrategy) -> Self {
        Self {
            strategy,
            limits: ExactMatchLimits::default(),
        }
    }

    /// Override the exact-match bounds
    pub fn with_limits(mut self, limits: ExactMatchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn strategy(&self) -> SelectionStrategy {
        self.strategy
    }

    /// Select proofs covering `amount`
    pub fn select(&self, proofs: &[Proof], amount: u64) -> Option<Selection> {
        self.select_with_rng(proofs, amount, &mut rand::thread_rng())
    }

    /// Select proofs covering `amount`, drawing randomness from `rng`
    pub fn select_with_rng<R: Rng + ?Sized>(
        &self,
        proofs: &[Proof],
        amount: u64,
        rng: &mut R,
    ) -> Option<Selection> {
        if amount == 0 {
            return Some(Selection {
                selected: Vec::new(),
                keep: proofs.to_vec(),
            });
        }
        if total_amount(proofs) < amount {
            return None;
        }

        let mut order: Vec<usize> = (0..proofs.len()).collect();
        match self.strategy {
            SelectionStrategy::SmallestFirst => {
                order.sort_by_key(|&i| proofs[i].amount);
            }
            SelectionStrategy::LargestFirst => {
                order.sort_by(|&a, &b| proofs[b].amount.cmp(&proofs[a].amount));
            }
            SelectionStrategy::Random => {
                order.shuffle(rng);
            }
            SelectionStrategy::ExactMatch => {
                if self.limits.permits(proofs.len(), amount) {
                    if let Some(chosen) = exact_subset(proofs, amount) {
                        return Some(Selection::from_mask(proofs, &chosen));
                    }
                }
                order.sort_by_key(|&i| proofs[i].amount);
            }
        }

        greedy(proofs, &order, amount)
    }
}

/// Take proofs in `order` until their sum reaches `amount`
fn greedy(proofs: &[Proof], order: &[usize], amount: u64) -> Option<Selection> {
    let mut chosen = vec![false; proofs.len()];
    let mut total = 0u64;

    for &i in order {
        if total >= amount {
            break;
        }
        total = total.saturating_add(proofs[i].amount);
        chosen[i] = true;
    }

    if total < amount {
        return None;
    }
    Some(Selection::from_mask(proofs, &chosen))
}

/// Find a subset summing exactly to `amount`.
///
/// `table[s]` holds the index of the proof that first made sum `s`
/// reachable; the previous sum is `s - proofs[table[s]].amount`. Sums are
/// updated downward so each proof is used at most once, which also makes the
/// back-pointer chain strictly decreasing in proof index.
fn exact_subset(proofs: &[Proof], amount: u64) -> Option<Vec<bool>> {
    let target = usize::try_from(amount).ok()?;
    let mut reachable = vec![false; target + 1];
    let mut table: Vec<Option<usize>> = vec![None; target + 1];
    reachable[0] = true;

    'scan: for (i, proof) in proofs.iter().enumerate() {
        let Ok(value) = usize::try_from(proof.amount) else {
            continue;
        };
        if value == 0 || value > target {
            continue;
        }
        for sum in (value..=target).rev() {
            if !reachable[sum] && reachable[sum - value] {
                reachable[sum] = true;
                table[sum] = Some(i);
                if sum == target {
                    break 'scan;
                }
            }
        }
    }

    if !reachable[target] {
        return None;
    }

    let mut chosen = vec![false; proofs.len()];
    let mut sum = target;
    while sum > 0 {
        let i = table[sum]?;
        chosen[i] = true;
        sum -= proofs[i].amount as usize;
    }
    Some(chosen)
}

/// Value left over after paying `amount` with all of `proofs`
pub fn calculate_change(proofs: &[Proof], amount: u64) -> u64 {
    total_amount(proofs).saturating_sub(amount)
}

/// Ascending-sorted minimal prefix covering `amount`, or `None` if the
/// proofs cannot cover it
pub fn find_optimal_proofs(proofs: &[Proof], amount: u64) -> Option<Vec<Proof>> {
    if total_amount(proofs) < amount {
        return None;
    }
    let mut sorted = proofs.to_vec();
    sorted.sort_by_key(|p| p.amount);

    let mut total = 0u64;
    let mut prefix = Vec::new();
    for proof in sorted {
        if total >= amount {
            break;
        }
        total = total.saturating_add(proof.amount);
        prefix.push(proof);
    }
    Some(prefix)
}
