//! Runtime error types.
//!
//! Errors are categorized by recovery:
//!
//! | Category | Variants | Recovery |
//! |----------|----------|----------|
//! | **Exhaustion** | `OutOfMemory`, `PoolExhausted` | Fatal to the program; propagate to the host |
//! | **Integrity** | `DoubleFree`, `UntrackedBlock`, `UntrackedValue`, `UseAfterDestroy`, `UntrackedQubit`, `NotAllocated`, `NotOnLoan` | Compiler bug upstream; never retry |
//!
//! Integrity violations identify the offending handle so the diagnostic can
//! be traced back to the call site in generated code. Nothing in this crate
//! swallows or retries an error: a violation surfaces on the call that
//! committed it, not later.
//!
//! An under-reporting scope set (`ScopeComputationError` in the design
//! taxonomy) is not representable here — it cannot be detected at runtime.
//! See the [`crate::scope`] module docs for that external obligation.

use thiserror::Error;

use crate::heap::BlockId;
use crate::qubit::{QubitId, QubitState};
use crate::value::ValueId;

/// Errors that can occur in runtime resource operations.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RuntimeError {
    // ── Exhaustion (fatal, propagate to the host) ────────────────────
    /// The heap allocator cannot satisfy a request under its byte limit.
    #[error("out of memory: requested {requested} bytes with {in_use} in use (limit {limit})")]
    OutOfMemory {
        /// Bytes requested by the failing allocation.
        requested: usize,
        /// Bytes live at the time of the request.
        in_use: usize,
        /// Configured ceiling in bytes.
        limit: usize,
    },

    /// The qubit pool cannot grow further under a platform ceiling.
    #[error("qubit pool exhausted: requested {requested} with {live} live (ceiling {ceiling})")]
    PoolExhausted {
        /// Handles requested by the failing call.
        requested: usize,
        /// Handles currently allocated or on loan.
        live: usize,
        /// Configured ceiling on simultaneously live qubits.
        ceiling: usize,
    },

    // ── Integrity (programming errors, never retried) ────────────────
    /// A heap block was freed twice.
    #[error("double free of heap block {0}")]
    DoubleFree(BlockId),

    /// A heap operation named a block that was never allocated.
    #[error("heap block {0} is not tracked by this allocator")]
    UntrackedBlock(BlockId),

    /// A refcount operation named a value that was never created here.
    #[error("value {0} is not tracked by this manager")]
    UntrackedValue(ValueId),

    /// `retain` or `release` was called on a value already destroyed.
    #[error("value {0} was already destroyed")]
    UseAfterDestroy(ValueId),

    /// A qubit operation named a handle the pool never issued.
    #[error("qubit {0} is not tracked by this pool")]
    UntrackedQubit(QubitId),

    /// `qubit_release` was called on a handle that is not *allocated*.
    #[error("qubit {qubit} is {state}, expected allocated")]
    NotAllocated {
        /// The offending handle.
        qubit: QubitId,
        /// Its actual state at the time of the call.
        state: QubitState,
    },

    /// `qubit_return` was called on a handle that is not *on-loan*.
    #[error("qubit {qubit} is {state}, expected on loan")]
    NotOnLoan {
        /// The offending handle.
        qubit: QubitId,
        /// Its actual state at the time of the call.
        state: QubitState,
    },
}

impl RuntimeError {
    /// Returns `true` for resource-exhaustion errors.
    ///
    /// These are environmental limits, not bugs; the host decides whether a
    /// graceful shutdown path exists.
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. } | Self::PoolExhausted { .. })
    }

    /// Returns `true` for integrity violations.
    ///
    /// An integrity violation means the generated code broke an ownership or
    /// lifecycle rule — a compiler-correctness bug upstream. It must surface
    /// immediately and must never be retried.
    pub fn is_integrity_violation(&self) -> bool {
        !self.is_exhaustion()
    }
}

/// Result type for runtime operations.
pub type RtResult<T> = Result<T, RuntimeError>;
