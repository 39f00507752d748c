//! Runtime support for compiled quantum programs: manual reference counting
//! for heap values and a broker for the scarce, stateful qubit resource.
//!
//! Generated code runs without a garbage collector, so every heap value
//! (array, tuple, closure capture, string) carries an explicit reference
//! count driven by `retain`/`release` calls the compiler inserts. Qubits are
//! scarcer still: they cannot be duplicated, and a use-after-release is not
//! a leak but state corruption. Both resources are managed by one
//! [`Runtime`] with a single discipline — opaque handles into state-tagged
//! registries, where every misuse fails a state check loudly instead of
//! corrupting memory.
//!
//! # Overview
//!
//! - [`Runtime`] — the facade generated code calls into
//! - [`HeapAllocator`] / [`BlockId`] — untyped byte blocks, malloc/free
//! - [`ValueManager`] / [`ValueId`] — reference-counted values on top
//! - [`QubitPool`] / [`QubitId`] — the free/allocated/on-loan registry
//! - [`BorrowBroker`] — lends qubits guaranteed unreachable during the loan
//! - [`ScopeSet`] — which qubits a borrow site can still reach
//! - [`ExecutionTarget`] — the boundary to the simulator or QPU driver
//! - [`RuntimeError`] — exhaustion vs. integrity-violation taxonomy
//! - [`SharedRuntime`] — mutex-serialized handle for multi-threaded hosts
//!
//! # Qubit lifecycle
//!
//! ```text
//!             alloc()                 borrow()
//!   Free ──────────────→ Allocated      │
//!    ↑ ←──────────────── release()      │
//!    │                                  ↓
//!    └←───── return ────────────── OnLoan
//! ```
//!
//! Borrowed qubits are selected to be unreachable from the caller's live
//! bindings, so their state (including entanglement with qubits outside the
//! loan) survives the loan untouched.
//!
//! # Example
//!
//! ```
//! use qrt_core::{Runtime, ScopeSet, Slot};
//!
//! let mut rt = Runtime::new();
//!
//! // Two dedicated qubits for this scope.
//! let qs = rt.qubit_alloc(2)?;
//!
//! // A closure capturing one of them; the capture owns the handle now.
//! let cap = rt.new_capture(vec![Slot::Word(42)], vec![qs[1]])?;
//!
//! // Borrow a scratch qubit. Everything reachable is in scope, so the
//! // loan is served by growing the pool.
//! let scope = rt.scope_of(&[qs[0]], &[cap])?;
//! let scratch = rt.qubit_borrow(1, &scope)?;
//! assert!(!qs.contains(&scratch[0]));
//!
//! rt.qubit_return(&scratch)?;
//! rt.release(cap)?;            // frees the capture, releases qs[1]
//! rt.qubit_release(&qs[..1])?; // qs[0] still belonged to this scope
//! assert_eq!(rt.stats().live_qubits, 0);
//! # Ok::<(), qrt_core::RuntimeError>(())
//! ```

pub mod borrow;
pub mod error;
pub mod heap;
pub mod qubit;
pub mod runtime;
pub mod scope;
pub mod shared;
pub mod target;
pub mod value;

pub use borrow::{BorrowBroker, BrokerStats};
pub use error::{RtResult, RuntimeError};
pub use heap::{BlockId, HeapAllocator};
pub use qubit::{PoolSnapshot, QubitId, QubitPool, QubitState};
pub use runtime::{Runtime, RuntimeConfig, RuntimeStats};
pub use scope::ScopeSet;
pub use shared::SharedRuntime;
pub use target::{ExecutionTarget, NullTarget};
pub use value::{Payload, ReleaseOutcome, Slot, ValueId, ValueManager, ValueStats};
