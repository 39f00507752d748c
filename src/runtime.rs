//! Runtime facade: the call surface exposed to generated code.
//!
//! One [`Runtime`] owns the whole resource core — the reference-counted
//! value manager (and through it the heap allocator), the qubit pool, and
//! the borrow broker — and wires them together:
//!
//! ```text
//!   generated code
//!        │ heap_alloc / heap_free
//!        │ new_value / retain / release ──→ ValueManager ──→ HeapAllocator
//!        │ qubit_alloc / qubit_release  ──→ QubitPool ──┐
//!        │ qubit_borrow / qubit_return  ──→ BorrowBroker┘──→ ExecutionTarget
//! ```
//!
//! The wiring matters in one place: when a `release` drops a capture tuple
//! or an owning qubit register to zero, the qubit handles it held go back
//! to the pool in the same call — generated code never sees them again.
//!
//! # Method table
//!
//! | Operation | Inputs | Output |
//! |-----------|--------|--------|
//! | `heap_alloc` | byte count | block handle |
//! | `heap_free` | block handle | — |
//! | `qubit_alloc` | qubit count | qubit handles |
//! | `qubit_borrow` | qubit count, scope set | qubit handles |
//! | `qubit_release` | qubit handles | — |
//! | `qubit_return` | qubit handles | — |
//!
//! plus the value-manager surface (`new_value`, `new_array`, `new_tuple`,
//! `new_string`, `new_capture`, `new_qubit_register`, `retain`, `release`).

use serde::{Deserialize, Serialize};

use crate::borrow::{BorrowBroker, BrokerStats};
use crate::error::RtResult;
use crate::heap::BlockId;
use crate::qubit::{PoolSnapshot, QubitId, QubitPool};
use crate::scope::ScopeSet;
use crate::target::{ExecutionTarget, NullTarget};
use crate::value::{ReleaseOutcome, Slot, ValueId, ValueManager, ValueStats};

/// Platform limits for a runtime instance.
///
/// The defaults impose no limits: the heap grows until the host runs out,
/// and the qubit pool mints handles on demand forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Ceiling on simultaneously live heap bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heap_limit_bytes: Option<usize>,
    /// Ceiling on simultaneously live (allocated or on-loan) qubits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qubit_ceiling: Option<usize>,
}

impl RuntimeConfig {
    /// No limits.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Set a heap byte limit.
    pub fn with_heap_limit(mut self, bytes: usize) -> Self {
        self.heap_limit_bytes = Some(bytes);
        self
    }

    /// Set a live-qubit ceiling.
    pub fn with_qubit_ceiling(mut self, qubits: usize) -> Self {
        self.qubit_ceiling = Some(qubits);
        self
    }
}

/// Point-in-time counters across the whole runtime, for diagnostics export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeStats {
    /// Value-manager counters.
    pub values: ValueStats,
    /// Borrow-broker counters.
    pub broker: BrokerStats,
    /// Heap bytes currently live.
    pub heap_bytes_in_use: usize,
    /// High-water mark of live heap bytes.
    pub heap_peak_bytes: usize,
    /// Qubit handles ever minted.
    pub qubits_minted: u64,
    /// Qubits currently allocated or on loan.
    pub live_qubits: usize,
    /// Qubits currently on loan.
    pub loans_outstanding: usize,
}

/// The memory-lifetime and qubit-resource management runtime.
pub struct Runtime {
    values: ValueManager,
    pool: QubitPool,
    broker: BorrowBroker,
    target: Box<dyn ExecutionTarget>,
}

impl Runtime {
    /// Create an unlimited runtime with no execution target attached.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::unlimited())
    }

    /// Create a runtime under the given platform limits.
    pub fn with_config(config: RuntimeConfig) -> Self {
        let values = match config.heap_limit_bytes {
            Some(limit) => ValueManager::with_heap_limit(limit),
            None => ValueManager::new(),
        };
        let pool = match config.qubit_ceiling {
            Some(ceiling) => QubitPool::with_ceiling(ceiling),
            None => QubitPool::new(),
        };
        Self {
            values,
            pool,
            broker: BorrowBroker::new(),
            target: Box::new(NullTarget),
        }
    }

    /// Attach an execution target to receive census notifications.
    pub fn with_target(mut self, target: Box<dyn ExecutionTarget>) -> Self {
        self.target = target;
        self
    }

    // ── Raw heap surface ──────────────────────────────────────────────

    /// Allocate an untyped heap block. Fatal `OutOfMemory` on exhaustion.
    pub fn heap_alloc(&mut self, size: usize) -> RtResult<BlockId> {
        self.values.heap_mut().allocate(size)
    }

    /// Free an untyped heap block. Double-free is a fatal integrity error.
    pub fn heap_free(&mut self, block: BlockId) -> RtResult<()> {
        self.values.heap_mut().free(block)
    }

    // ── Reference-counted value surface ───────────────────────────────

    /// Allocate an untyped reference-counted value. Count starts at 1.
    pub fn new_value(&mut self, size: usize) -> RtResult<ValueId> {
        self.values.new_value(size)
    }

    /// Allocate an array value. Count starts at 1.
    pub fn new_array(&mut self, slots: Vec<Slot>) -> RtResult<ValueId> {
        self.values.new_array(slots)
    }

    /// Allocate a tuple value. Count starts at 1.
    pub fn new_tuple(&mut self, slots: Vec<Slot>) -> RtResult<ValueId> {
        self.values.new_tuple(slots)
    }

    /// Allocate a string value. Count starts at 1.
    pub fn new_string(&mut self, s: impl Into<String>) -> RtResult<ValueId> {
        self.values.new_string(s)
    }

    /// Allocate a closure capture tuple. Count starts at 1.
    pub fn new_capture(&mut self, classical: Vec<Slot>, qubits: Vec<QubitId>) -> RtResult<ValueId> {
        self.values.new_capture(classical, qubits)
    }

    /// Allocate a qubit register. Count starts at 1.
    pub fn new_qubit_register(&mut self, handles: Vec<QubitId>, owned: bool) -> RtResult<ValueId> {
        self.values.new_qubit_register(handles, owned)
    }

    /// Increment a value's reference count. Returns the new count.
    pub fn retain(&mut self, v: ValueId) -> RtResult<u64> {
        self.values.retain(v)
    }

    /// Decrement a value's reference count, destroying it on zero.
    ///
    /// Qubit handles owned by destroyed payloads (capture tuples, owning
    /// registers) are released back to the pool before this returns.
    pub fn release(&mut self, v: ValueId) -> RtResult<ReleaseOutcome> {
        let outcome = self.values.release(v)?;
        if !outcome.freed_qubits.is_empty() {
            self.pool.release(&outcome.freed_qubits)?;
            for &q in &outcome.freed_qubits {
                self.target.qubit_reclaimed(q);
            }
        }
        Ok(outcome)
    }

    // ── Qubit surface ─────────────────────────────────────────────────

    /// Allocate `n` qubits, exclusively owned by the calling scope until
    /// `qubit_release`.
    pub fn qubit_alloc(&mut self, n: usize) -> RtResult<Vec<QubitId>> {
        let minted_from = self.pool.total_created();
        let handles = self.pool.alloc(n)?;
        self.notify_minted(minted_from);
        Ok(handles)
    }

    /// Release allocated qubits back to the pool's free set.
    pub fn qubit_release(&mut self, handles: &[QubitId]) -> RtResult<()> {
        self.pool.release(handles)?;
        for &q in handles {
            self.target.qubit_reclaimed(q);
        }
        Ok(())
    }

    /// Borrow `n` qubits guaranteed disjoint from `scope` and from every
    /// allocated or on-loan handle. See [`crate::borrow`] for the loan
    /// contract.
    pub fn qubit_borrow(&mut self, n: usize, scope: &ScopeSet) -> RtResult<Vec<QubitId>> {
        let minted_from = self.pool.total_created();
        let handles = self.broker.borrow(&mut self.pool, n, scope)?;
        self.notify_minted(minted_from);
        Ok(handles)
    }

    /// Return borrowed qubits to the pool's free set.
    pub fn qubit_return(&mut self, handles: &[QubitId]) -> RtResult<()> {
        self.broker.restore(&mut self.pool, handles)
    }

    /// Build the scope set for a borrow site from the live roots.
    ///
    /// `qubits` are handles held directly by live bindings; `values` are
    /// live heap values to walk for embedded handles.
    pub fn scope_of(&self, qubits: &[QubitId], values: &[ValueId]) -> RtResult<ScopeSet> {
        ScopeSet::collect(qubits, values, &self.values)
    }

    // ── Introspection ─────────────────────────────────────────────────

    /// The value manager.
    pub fn values(&self) -> &ValueManager {
        &self.values
    }

    /// The qubit pool.
    pub fn pool(&self) -> &QubitPool {
        &self.pool
    }

    /// Snapshot of the pool's free/allocated/on-loan partition.
    pub fn pool_snapshot(&self) -> PoolSnapshot {
        self.pool.snapshot()
    }

    /// Counters across all components.
    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            values: self.values.stats(),
            broker: self.broker.stats(),
            heap_bytes_in_use: self.values.heap().bytes_in_use(),
            heap_peak_bytes: self.values.heap().peak_bytes(),
            qubits_minted: self.pool.total_created(),
            live_qubits: self.pool.live_count(),
            loans_outstanding: self.pool.on_loan_count(),
        }
    }

    /// Report handles minted since `from` to the target, in id order.
    fn notify_minted(&mut self, from: u64) {
        for id in from..self.pool.total_created() {
            self.target.qubit_minted(QubitId(id));
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
