//! Borrow broker: safe temporary lending of qubits.
//!
//! Borrowing hands out qubits that are guaranteed not to be accessed by the
//! program during the loan, so the borrower can use them and put them back
//! without anyone noticing. The broker selects from the pool's free set,
//! skipping everything the caller's [`ScopeSet`] reports as reachable; if
//! too few eligible handles exist it mints fresh ones through the pool —
//! fresh allocation is always an acceptable substitute for recycling, and
//! the caller cannot tell the difference.
//!
//! Selection among eligible free handles is last-freed-first (matching the
//! pool's recycling order, bounding growth); any other choice would be
//! equally correct as long as the disjointness guarantees hold.
//!
//! # State preservation
//!
//! A returned qubit's quantum state — including entanglement with qubits
//! outside the loan — must be identical to its state at the moment of the
//! loan. The broker's share of that contract is bookkeeping only: it never
//! performs an operation on a loaned handle, and never hands a loaned or
//! in-scope handle to any other consumer. The borrower's obligation to
//! restore state before returning belongs to the execution target (see
//! [`crate::target`]).

use serde::{Deserialize, Serialize};

use crate::error::RtResult;
use crate::qubit::{QubitId, QubitPool};
use crate::scope::ScopeSet;

/// Counters over broker operations, for diagnostics export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerStats {
    /// Handles lent out (recycled and minted).
    pub lent: u64,
    /// Handles minted because too few eligible free handles existed.
    pub minted_for_loan: u64,
    /// Handles returned from loans.
    pub returned: u64,
}

/// Selects lendable qubits and tracks loan traffic.
///
/// The pool remains the single authority on handle state; the broker only
/// decides *which* free handles to lend.
#[derive(Debug, Default)]
pub struct BorrowBroker {
    stats: BrokerStats,
}

impl BorrowBroker {
    /// Create a broker with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow `n` qubits that are not in `scope`.
    ///
    /// Returned handles are pairwise distinct, disjoint from `scope`, and
    /// disjoint from every handle currently allocated or on loan. Fails with
    /// `PoolExhausted` only if minting the shortfall would break the pool's
    /// ceiling.
    pub fn borrow(
        &mut self,
        pool: &mut QubitPool,
        n: usize,
        scope: &ScopeSet,
    ) -> RtResult<Vec<QubitId>> {
        pool.check_ceiling(n)?;

        // Scan the free list from the back (most recently freed first) and
        // record the indices of eligible handles. Indices are collected in
        // descending order, so removing them back-to-front keeps the
        // remaining ones valid.
        let free = pool.free_handles();
        let mut picks: Vec<usize> = Vec::with_capacity(n);
        for idx in (0..free.len()).rev() {
            if picks.len() == n {
                break;
            }
            if !scope.contains(free[idx]) {
                picks.push(idx);
            }
        }

        let mut out = Vec::with_capacity(n);
        for idx in picks {
            out.push(pool.lend_at(idx));
        }
        while out.len() < n {
            out.push(pool.mint_on_loan());
            self.stats.minted_for_loan += 1;
        }

        self.stats.lent += out.len() as u64;
        Ok(out)
    }

    /// Return loaned qubits to the free set.
    ///
    /// Every handle must be *on-loan*; anything else fails with `NotOnLoan`
    /// naming the offending handle.
    pub fn restore(&mut self, pool: &mut QubitPool, handles: &[QubitId]) -> RtResult<()> {
        for &q in handles {
            pool.restore(q)?;
            self.stats.returned += 1;
        }
        Ok(())
    }

    /// Loan traffic counters.
    pub fn stats(&self) -> BrokerStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeError;
    use crate::qubit::QubitState;

    #[test]
    fn test_borrow_prefers_recycled_free_handles() {
        let mut pool = QubitPool::new();
        let mut broker = BorrowBroker::new();

        let qs = pool.alloc(2).unwrap();
        pool.release(&qs).unwrap();

        let loan = broker.borrow(&mut pool, 2, &ScopeSet::new()).unwrap();
        let mut sorted = loan.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, {
            let mut v = qs.clone();
            v.sort_unstable();
            v
        });
        assert_eq!(pool.total_created(), 2);
        assert_eq!(broker.stats().minted_for_loan, 0);
    }

    #[test]
    fn test_borrow_never_returns_in_scope_handles() {
        let mut pool = QubitPool::new();
        let mut broker = BorrowBroker::new();

        let qs = pool.alloc(3).unwrap();
        pool.release(&qs).unwrap();

        let scope: ScopeSet = [qs[0], qs[2]].into_iter().collect();
        let loan = broker.borrow(&mut pool, 2, &scope).unwrap();
        assert_eq!(loan.len(), 2);
        for &q in &loan {
            assert!(!scope.contains(q), "{q} was in scope");
        }
        // qs[1] was the only eligible free handle; one fresh mint covers
        // the shortfall.
        assert!(loan.contains(&qs[1]));
        assert_eq!(broker.stats().minted_for_loan, 1);
    }

    #[test]
    fn test_borrow_from_empty_pool_mints_everything() {
        let mut pool = QubitPool::new();
        let mut broker = BorrowBroker::new();

        let loan = broker.borrow(&mut pool, 3, &ScopeSet::new()).unwrap();
        assert_eq!(loan.len(), 3);
        assert_eq!(broker.stats().minted_for_loan, 3);
        for &q in &loan {
            assert_eq!(pool.state_of(q), Some(QubitState::OnLoan));
        }
    }

    #[test]
    fn test_borrowed_handles_disjoint_from_live() {
        let mut pool = QubitPool::new();
        let mut broker = BorrowBroker::new();

        let allocated = pool.alloc(2).unwrap();
        let first_loan = broker.borrow(&mut pool, 2, &ScopeSet::new()).unwrap();
        let second_loan = broker.borrow(&mut pool, 2, &ScopeSet::new()).unwrap();

        let mut all: Vec<_> = allocated
            .iter()
            .chain(first_loan.iter())
            .chain(second_loan.iter())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 6);
    }

    #[test]
    fn test_restore_requires_on_loan_state() {
        let mut pool = QubitPool::new();
        let mut broker = BorrowBroker::new();

        let qs = pool.alloc(1).unwrap();
        assert_eq!(
            broker.restore(&mut pool, &qs),
            Err(RuntimeError::NotOnLoan {
                qubit: qs[0],
                state: QubitState::Allocated,
            })
        );

        let loan = broker.borrow(&mut pool, 1, &ScopeSet::new()).unwrap();
        broker.restore(&mut pool, &loan).unwrap();
        assert_eq!(pool.state_of(loan[0]), Some(QubitState::Free));

        // Returning twice is an error, not a no-op.
        assert_eq!(
            broker.restore(&mut pool, &loan),
            Err(RuntimeError::NotOnLoan {
                qubit: loan[0],
                state: QubitState::Free,
            })
        );
    }

    #[test]
    fn test_loan_respects_pool_ceiling() {
        let mut pool = QubitPool::with_ceiling(2);
        let mut broker = BorrowBroker::new();

        pool.alloc(2).unwrap();
        let err = broker.borrow(&mut pool, 1, &ScopeSet::new()).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::PoolExhausted {
                requested: 1,
                live: 2,
                ceiling: 2,
            }
        );
    }
}
