//! Thread-safe runtime handle.
//!
//! The core runtime is single-threaded by design: nothing in it suspends,
//! and the natural execution model is one classical thread of control per
//! program instance. When more than one thread can issue calls, every
//! mutation of a refcount and of the pool's free/allocated/on-loan
//! partition must be serialized. [`SharedRuntime`] is that discipline:
//! a cheaply cloneable handle that routes every call through one mutex.
//!
//! This wrapper is an extension point, not core semantics — a deployment
//! with one thread of control should use [`Runtime`] directly and pay
//! nothing.
//!
//! Lock poisoning is deliberately ignored: every runtime operation
//! validates before it commits, so a panicking thread cannot leave a
//! registry half-mutated, and the resource ledger stays trustworthy.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::RtResult;
use crate::heap::BlockId;
use crate::qubit::{PoolSnapshot, QubitId};
use crate::runtime::{Runtime, RuntimeConfig, RuntimeStats};
use crate::scope::ScopeSet;
use crate::value::{ReleaseOutcome, Slot, ValueId};

/// Cloneable, thread-safe handle to a [`Runtime`].
#[derive(Clone)]
pub struct SharedRuntime {
    inner: Arc<Mutex<Runtime>>,
}

impl SharedRuntime {
    /// Wrap an existing runtime.
    pub fn new(runtime: Runtime) -> Self {
        Self {
            inner: Arc::new(Mutex::new(runtime)),
        }
    }

    /// Create an unlimited shared runtime.
    pub fn unlimited() -> Self {
        Self::new(Runtime::new())
    }

    /// Create a shared runtime under the given platform limits.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::new(Runtime::with_config(config))
    }

    /// Allocate an untyped heap block.
    pub fn heap_alloc(&self, size: usize) -> RtResult<BlockId> {
        self.lock().heap_alloc(size)
    }

    /// Free an untyped heap block.
    pub fn heap_free(&self, block: BlockId) -> RtResult<()> {
        self.lock().heap_free(block)
    }

    /// Allocate an untyped reference-counted value.
    pub fn new_value(&self, size: usize) -> RtResult<ValueId> {
        self.lock().new_value(size)
    }

    /// Allocate an array value.
    pub fn new_array(&self, slots: Vec<Slot>) -> RtResult<ValueId> {
        self.lock().new_array(slots)
    }

    /// Allocate a tuple value.
    pub fn new_tuple(&self, slots: Vec<Slot>) -> RtResult<ValueId> {
        self.lock().new_tuple(slots)
    }

    /// Allocate a string value.
    pub fn new_string(&self, s: impl Into<String>) -> RtResult<ValueId> {
        self.lock().new_string(s)
    }

    /// Allocate a closure capture tuple.
    pub fn new_capture(&self, classical: Vec<Slot>, qubits: Vec<QubitId>) -> RtResult<ValueId> {
        self.lock().new_capture(classical, qubits)
    }

    /// Allocate a qubit register.
    pub fn new_qubit_register(&self, handles: Vec<QubitId>, owned: bool) -> RtResult<ValueId> {
        self.lock().new_qubit_register(handles, owned)
    }

    /// Increment a value's reference count.
    pub fn retain(&self, v: ValueId) -> RtResult<u64> {
        self.lock().retain(v)
    }

    /// Decrement a value's reference count, destroying it on zero.
    pub fn release(&self, v: ValueId) -> RtResult<ReleaseOutcome> {
        self.lock().release(v)
    }

    /// Allocate `n` qubits.
    pub fn qubit_alloc(&self, n: usize) -> RtResult<Vec<QubitId>> {
        self.lock().qubit_alloc(n)
    }

    /// Release allocated qubits.
    pub fn qubit_release(&self, handles: &[QubitId]) -> RtResult<()> {
        self.lock().qubit_release(handles)
    }

    /// Borrow `n` qubits disjoint from `scope`.
    pub fn qubit_borrow(&self, n: usize, scope: &ScopeSet) -> RtResult<Vec<QubitId>> {
        self.lock().qubit_borrow(n, scope)
    }

    /// Return borrowed qubits.
    pub fn qubit_return(&self, handles: &[QubitId]) -> RtResult<()> {
        self.lock().qubit_return(handles)
    }

    /// Build the scope set for a borrow site from the live roots.
    pub fn scope_of(&self, qubits: &[QubitId], values: &[ValueId]) -> RtResult<ScopeSet> {
        self.lock().scope_of(qubits, values)
    }

    /// Snapshot of the pool's partition.
    pub fn pool_snapshot(&self) -> PoolSnapshot {
        self.lock().pool_snapshot()
    }

    /// Counters across all components.
    pub fn stats(&self) -> RuntimeStats {
        self.lock().stats()
    }

    fn lock(&self) -> MutexGuard<'_, Runtime> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrent_alloc_release_keeps_partition_consistent() {
        let rt = SharedRuntime::unlimited();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let rt = rt.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let qs = rt.qubit_alloc(3).unwrap();
                        rt.qubit_release(&qs).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let stats = rt.stats();
        assert_eq!(stats.live_qubits, 0);
        // Recycling bounds growth: never more handles than the peak demand.
        assert!(stats.qubits_minted <= 12);
    }

    #[test]
    fn test_concurrent_borrowers_never_collide() {
        let rt = SharedRuntime::unlimited();
        let base = rt.qubit_alloc(2).unwrap();
        let scope: ScopeSet = base.iter().copied().collect();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let rt = rt.clone();
                let scope = scope.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let loan = rt.qubit_borrow(2, &scope).unwrap();
                        assert!(!scope.contains(loan[0]));
                        assert!(!scope.contains(loan[1]));
                        rt.qubit_return(&loan).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        rt.qubit_release(&base).unwrap();
        assert_eq!(rt.stats().loans_outstanding, 0);
        assert_eq!(rt.stats().live_qubits, 0);
    }

    #[test]
    fn test_shared_value_lifecycle() {
        let rt = SharedRuntime::unlimited();
        let v = rt.new_value(16).unwrap();
        rt.retain(v).unwrap();
        rt.release(v).unwrap();
        assert_eq!(rt.release(v).unwrap().count, 0);
        assert_eq!(rt.stats().heap_bytes_in_use, 0);
    }
}
