//! Qubit pool: the single authority over qubit handle lifecycle.
//!
//! Every qubit handle the runtime ever issues lives in one registry here,
//! tagged with exactly one of three states:
//!
//! ```text
//!             alloc()                 borrow()
//!   Free ──────────────→ Allocated      │
//!    ↑ ←──────────────── release()      │
//!    │                                  ↓
//!    └←───── return ────────────── OnLoan
//! ```
//!
//! **Invariants:**
//! - The free/allocated/on-loan sets are disjoint — a handle has one state.
//! - `alloc(n)` returns `n` pairwise-distinct handles disjoint from every
//!   handle currently allocated or on loan.
//! - The pool starts empty and grows monotonically: handles are minted on
//!   demand and recycled, never retired.
//! - Recycling is last-freed-first, which bounds pool growth under
//!   alloc/release churn.
//!
//! Handles are opaque indices, never raw pointers; a stale handle fails a
//! state check instead of corrupting memory.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{RtResult, RuntimeError};

/// Opaque identifier for a unit of quantum resource.
///
/// Carries no classical payload visible to this runtime; its physical or
/// simulated state belongs to the execution target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QubitId(pub u64);

impl std::fmt::Display for QubitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// Lifecycle state of a qubit handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QubitState {
    /// In the pool, eligible for `alloc` or lending.
    Free,
    /// Exclusively held by a scope.
    Allocated,
    /// Held by the borrow broker's outstanding-loan set.
    OnLoan,
}

impl std::fmt::Display for QubitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QubitState::Free => write!(f, "free"),
            QubitState::Allocated => write!(f, "allocated"),
            QubitState::OnLoan => write!(f, "on-loan"),
        }
    }
}

/// Owner of the master qubit registry.
#[derive(Debug, Default)]
pub struct QubitPool {
    states: FxHashMap<QubitId, QubitState>,
    /// Free handles in release order; the back is the most recently freed.
    free: Vec<QubitId>,
    next: u64,
    ceiling: Option<usize>,
}

impl QubitPool {
    /// Create an empty pool with no ceiling: `alloc` always succeeds by
    /// minting new handles on demand.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty pool that refuses to let more than `ceiling` qubits
    /// be simultaneously live (allocated or on loan).
    pub fn with_ceiling(ceiling: usize) -> Self {
        Self {
            ceiling: Some(ceiling),
            ..Self::default()
        }
    }

    /// Allocate `n` qubits, transitioning them to *allocated*.
    ///
    /// Recycles free handles last-freed-first and mints the shortfall.
    /// Fails with `PoolExhausted` only under a configured ceiling.
    pub fn alloc(&mut self, n: usize) -> RtResult<Vec<QubitId>> {
        self.check_ceiling(n)?;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let q = match self.free.pop() {
                Some(q) => q,
                None => self.mint(),
            };
            self.states.insert(q, QubitState::Allocated);
            out.push(q);
        }
        Ok(out)
    }

    /// Release allocated qubits back to the free set.
    ///
    /// Every handle must be *allocated*; a handle in any other state (or a
    /// duplicate within `handles`) fails with `NotAllocated`. Integrity
    /// violations are fatal upstream, so handles processed before the
    /// offending one remain released.
    pub fn release(&mut self, handles: &[QubitId]) -> RtResult<()> {
        for &q in handles {
            self.transition(q, QubitState::Allocated, QubitState::Free, |q, state| {
                RuntimeError::NotAllocated { qubit: q, state }
            })?;
            self.free.push(q);
        }
        Ok(())
    }

    /// Put the free handle at `idx` of [`free_handles`] on loan.
    ///
    /// The index comes from the borrow broker's scan of the same slice, so
    /// the handle is free by construction.
    ///
    /// [`free_handles`]: QubitPool::free_handles
    pub(crate) fn lend_at(&mut self, idx: usize) -> QubitId {
        let q = self.free.remove(idx);
        self.states.insert(q, QubitState::OnLoan);
        q
    }

    /// Mint a fresh handle directly into the *on-loan* state.
    pub(crate) fn mint_on_loan(&mut self) -> QubitId {
        let q = self.mint();
        self.states.insert(q, QubitState::OnLoan);
        q
    }

    /// Move an on-loan handle back to the free set.
    pub(crate) fn restore(&mut self, q: QubitId) -> RtResult<()> {
        self.transition(q, QubitState::OnLoan, QubitState::Free, |q, state| {
            RuntimeError::NotOnLoan { qubit: q, state }
        })?;
        self.free.push(q);
        Ok(())
    }

    /// Fail if `extra` more live qubits would break the ceiling.
    pub(crate) fn check_ceiling(&self, extra: usize) -> RtResult<()> {
        if let Some(ceiling) = self.ceiling {
            let live = self.live_count();
            if live.saturating_add(extra) > ceiling {
                return Err(RuntimeError::PoolExhausted {
                    requested: extra,
                    live,
                    ceiling,
                });
            }
        }
        Ok(())
    }

    /// Free handles in release order (back = most recently freed).
    pub(crate) fn free_handles(&self) -> &[QubitId] {
        &self.free
    }

    /// The state of a handle, or `None` if the pool never issued it.
    pub fn state_of(&self, q: QubitId) -> Option<QubitState> {
        self.states.get(&q).copied()
    }

    /// Total handles ever minted. Also the id the next minted handle gets.
    pub fn total_created(&self) -> u64 {
        self.next
    }

    /// Handles currently free.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Handles currently allocated or on loan.
    pub fn live_count(&self) -> usize {
        self.states.len() - self.free.len()
    }

    /// Handles currently on loan.
    pub fn on_loan_count(&self) -> usize {
        self.states
            .values()
            .filter(|&&s| s == QubitState::OnLoan)
            .count()
    }

    /// A serializable snapshot of the pool's partition, sorted for
    /// deterministic output.
    pub fn snapshot(&self) -> PoolSnapshot {
        let mut snap = PoolSnapshot::default();
        for (&q, &state) in &self.states {
            match state {
                QubitState::Free => snap.free.push(q),
                QubitState::Allocated => snap.allocated.push(q),
                QubitState::OnLoan => snap.on_loan.push(q),
            }
        }
        snap.free.sort_unstable();
        snap.allocated.sort_unstable();
        snap.on_loan.sort_unstable();
        snap
    }

    fn mint(&mut self) -> QubitId {
        let q = QubitId(self.next);
        self.next += 1;
        q
    }

    fn transition(
        &mut self,
        q: QubitId,
        from: QubitState,
        to: QubitState,
        err: impl FnOnce(QubitId, QubitState) -> RuntimeError,
    ) -> RtResult<()> {
        match self.states.get_mut(&q) {
            Some(state) if *state == from => {
                *state = to;
                Ok(())
            }
            Some(state) => Err(err(q, *state)),
            None => Err(RuntimeError::UntrackedQubit(q)),
        }
    }
}

/// Point-in-time view of the free/allocated/on-loan partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// Handles in the free set.
    pub free: Vec<QubitId>,
    /// Handles exclusively held by scopes.
    pub allocated: Vec<QubitId>,
    /// Handles in the outstanding-loan set.
    pub on_loan: Vec<QubitId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_starts_empty_and_grows_on_demand() {
        let mut pool = QubitPool::new();
        assert_eq!(pool.total_created(), 0);

        let qs = pool.alloc(3).unwrap();
        assert_eq!(qs.len(), 3);
        assert_eq!(pool.total_created(), 3);
        assert_eq!(pool.live_count(), 3);
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn test_alloc_returns_distinct_handles_disjoint_from_live() {
        let mut pool = QubitPool::new();
        let first = pool.alloc(4).unwrap();
        let second = pool.alloc(4).unwrap();

        let mut all: Vec<_> = first.iter().chain(second.iter()).collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 8);
    }

    #[test]
    fn test_release_recycles_last_freed_first() {
        let mut pool = QubitPool::new();
        let qs = pool.alloc(2).unwrap();
        pool.release(&qs).unwrap();

        // qs[1] was freed last, so it comes back first.
        let again = pool.alloc(2).unwrap();
        assert_eq!(again[0], qs[1]);
        assert_eq!(again[1], qs[0]);
        assert_eq!(pool.total_created(), 2);
    }

    #[test]
    fn test_release_non_allocated_fails() {
        let mut pool = QubitPool::new();
        let qs = pool.alloc(1).unwrap();
        pool.release(&qs).unwrap();

        assert_eq!(
            pool.release(&qs),
            Err(RuntimeError::NotAllocated {
                qubit: qs[0],
                state: QubitState::Free,
            })
        );
    }

    #[test]
    fn test_release_duplicate_handle_in_one_call_fails() {
        let mut pool = QubitPool::new();
        let qs = pool.alloc(1).unwrap();
        let err = pool.release(&[qs[0], qs[0]]).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::NotAllocated {
                qubit: qs[0],
                state: QubitState::Free,
            }
        );
    }

    #[test]
    fn test_alloc_release_round_trip_restores_free_set() {
        let mut pool = QubitPool::new();
        let base = pool.alloc(3).unwrap();
        pool.release(&base).unwrap();
        let before = pool.snapshot();

        let qs = pool.alloc(3).unwrap();
        pool.release(&qs).unwrap();
        assert_eq!(pool.snapshot(), before);
    }

    #[test]
    fn test_ceiling_bounds_live_qubits() {
        let mut pool = QubitPool::with_ceiling(2);
        let qs = pool.alloc(2).unwrap();
        let err = pool.alloc(1).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::PoolExhausted {
                requested: 1,
                live: 2,
                ceiling: 2,
            }
        );

        // Releasing frees headroom: the ceiling bounds live, not total.
        pool.release(&qs[..1]).unwrap();
        pool.alloc(1).unwrap();
    }

    #[test]
    fn test_snapshot_partition_is_disjoint() {
        let mut pool = QubitPool::new();
        let qs = pool.alloc(4).unwrap();
        pool.release(&qs[2..]).unwrap();
        // Free list is [q2, q3]; lend q3.
        assert_eq!(pool.lend_at(1), qs[3]);

        let snap = pool.snapshot();
        assert_eq!(snap.allocated, vec![qs[0], qs[1]]);
        assert_eq!(snap.free, vec![qs[2]]);
        assert_eq!(snap.on_loan, vec![qs[3]]);
    }

    #[test]
    fn test_state_of_reports_lifecycle() {
        let mut pool = QubitPool::new();
        assert_eq!(pool.state_of(QubitId(0)), None);

        let qs = pool.alloc(1).unwrap();
        assert_eq!(pool.state_of(qs[0]), Some(QubitState::Allocated));
        pool.release(&qs).unwrap();
        assert_eq!(pool.state_of(qs[0]), Some(QubitState::Free));
    }
}
