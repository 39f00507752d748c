//! Execution-target boundary.
//!
//! The runtime manages *handles*; the physical or simulated quantum state
//! behind them belongs to an execution target — a simulator, a QPU driver,
//! or a test double. Gate application and measurement are translated by a
//! target-specific code generator and never pass through this crate; the
//! only coupling is the live-qubit census, which the runtime reports through
//! this trait so a simulator can size its state representation.
//!
//! # Contract
//!
//! - [`qubit_minted`] fires once per handle, when the pool grows. Handles
//!   are minted in id order.
//! - [`qubit_reclaimed`] fires when an allocated handle goes back to the
//!   free set. The target may reset the underlying state; a recycled handle
//!   is expected to start from |0⟩ at its next allocation.
//! - Loans are deliberately **not** reported: a loaned qubit's state,
//!   including entanglement with qubits outside the loan, must be preserved
//!   bit-for-bit across the loan. The target MUST NOT operate on a handle
//!   while it is on loan except as instructed by the borrower, and the
//!   borrower MUST restore the state it found. The broker's own share of
//!   this contract is never double-lending a handle.
//!
//! [`qubit_minted`]: ExecutionTarget::qubit_minted
//! [`qubit_reclaimed`]: ExecutionTarget::qubit_reclaimed

use crate::qubit::QubitId;

/// Hooks the runtime invokes as the live-qubit census changes.
///
/// All methods have no-op defaults; a target implements only what it needs.
pub trait ExecutionTarget: Send {
    /// A fresh handle was minted; the target's state should grow to cover it.
    fn qubit_minted(&mut self, qubit: QubitId) {
        let _ = qubit;
    }

    /// An allocated handle was released back to the free set; the target may
    /// reset it.
    fn qubit_reclaimed(&mut self, qubit: QubitId) {
        let _ = qubit;
    }
}

/// Target that ignores every notification.
///
/// The default for runtimes whose target tracks the census on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTarget;

impl ExecutionTarget for NullTarget {}
