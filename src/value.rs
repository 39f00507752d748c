//! Reference-counted value manager.
//!
//! Wraps heap blocks from [`crate::heap`] with an explicit reference count.
//! There is no garbage collector: generated code drives the count with
//! `retain`/`release` calls, and a count reaching zero destroys the value
//! exactly once — freeing the backing block and releasing everything the
//! payload embeds.
//!
//! # Ownership rules
//!
//! These are the insertion rules the compiler follows; the manager enforces
//! their observable consequences:
//!
//! - A new value starts at count 1, owned by its creator.
//! - `retain` is required only for references that may outlive the creating
//!   scope (stored in a longer-lived structure, or part of a return value).
//!   A purely local alias needs no retain/release pair — eliding the pair is
//!   an optimization with no observable effect.
//! - Passing a value as an argument never transfers ownership: a callee must
//!   not release values it did not create or explicitly retain.
//! - A returned value is never owned by the callee's locals; the caller
//!   inherits the obligation to eventually release it.
//!
//! # Destruction
//!
//! When a count reaches zero the manager walks the payload: embedded value
//! references are released in turn (one release per embedded occurrence, the
//! retain that stored them), and embedded qubit handles from owning payloads
//! are reported back to the caller in [`ReleaseOutcome::freed_qubits`] — the
//! manager has no access to the qubit pool by design, so the facade hands
//! them back. A register that merely describes an `alloc`/`borrow` result
//! does not own its handles and reports nothing.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::{RtResult, RuntimeError};
use crate::heap::{BlockId, HeapAllocator};
use crate::qubit::QubitId;

/// Unique identifier for a tracked heap value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueId(pub u64);

impl std::fmt::Display for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// One element of a structured payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// A classical machine word.
    Word(u64),
    /// A reference to another tracked value. Storing one implies a retain.
    Value(ValueId),
    /// A qubit handle held by this value.
    Qubit(QubitId),
}

/// Payload of a heap value.
///
/// The variants mirror what generated code allocates: raw byte blocks,
/// strings, arrays, tuples, closure capture tuples, and qubit registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Untyped bytes, stored in the backing block.
    Bytes,
    /// An immutable string.
    Str(String),
    /// Ordered, fixed-length sequence of slots.
    Array(Vec<Slot>),
    /// Fixed arity, heterogeneous slots.
    Tuple(Vec<Slot>),
    /// What a callable closes over: classical slots plus captured qubits.
    Capture {
        /// Captured classical values (words and value references).
        classical: Vec<Slot>,
        /// Captured qubit handles.
        qubits: Vec<QubitId>,
    },
    /// An ordered, fixed-length sequence of qubit handles.
    ///
    /// `owned` is false when the register merely describes an alloc/borrow
    /// result whose handles belong to the requesting scope; destroying such
    /// a register must not release them.
    QubitRegister {
        /// The handles in register order.
        handles: Vec<QubitId>,
        /// Whether destroying this register releases the handles.
        owned: bool,
    },
}

impl Payload {
    /// Bytes of backing storage this payload needs.
    fn storage_size(&self) -> usize {
        const WORD: usize = size_of::<u64>();
        match self {
            Payload::Bytes => 0, // size passed explicitly at creation
            Payload::Str(s) => s.len(),
            Payload::Array(slots) | Payload::Tuple(slots) => slots.len() * WORD,
            Payload::Capture { classical, qubits } => (classical.len() + qubits.len()) * WORD,
            Payload::QubitRegister { handles, .. } => handles.len() * WORD,
        }
    }
}

#[derive(Debug)]
struct HeapValue {
    count: u64,
    block: BlockId,
    payload: Payload,
}

/// What a `release` call freed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReleaseOutcome {
    /// The root value's count after the call; 0 means it was destroyed.
    pub count: u64,
    /// Qubit handles owned by destroyed payloads, to be released back to
    /// the pool by the caller.
    pub freed_qubits: Vec<QubitId>,
}

/// Counters over manager operations, for diagnostics export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueStats {
    /// Values created.
    pub allocs: u64,
    /// Retain calls.
    pub retains: u64,
    /// Release calls (on the external surface; recursive releases from
    /// destruction are counted too).
    pub releases: u64,
    /// Values destroyed (count reached zero).
    pub deallocs: u64,
}

/// Owner of every reference-counted value and its backing heap block.
#[derive(Debug, Default)]
pub struct ValueManager {
    heap: HeapAllocator,
    values: FxHashMap<ValueId, HeapValue>,
    /// Ids of values already destroyed, so a late retain/release reports
    /// `UseAfterDestroy` instead of the untracked-id error.
    destroyed: FxHashSet<ValueId>,
    next: u64,
    stats: ValueStats,
}

impl ValueManager {
    /// Create a manager over an unlimited heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager over a heap with a byte limit.
    pub fn with_heap_limit(limit_bytes: usize) -> Self {
        Self {
            heap: HeapAllocator::with_limit(limit_bytes),
            ..Self::default()
        }
    }

    /// Allocate an untyped value of `size` bytes. Count starts at 1.
    pub fn new_value(&mut self, size: usize) -> RtResult<ValueId> {
        self.create(size, Payload::Bytes)
    }

    /// Allocate an array value. Count starts at 1.
    ///
    /// Value references in `slots` must already carry the retain that storing
    /// them implies; the manager releases one per occurrence on destruction.
    pub fn new_array(&mut self, slots: Vec<Slot>) -> RtResult<ValueId> {
        let payload = Payload::Array(slots);
        self.create(payload.storage_size(), payload)
    }

    /// Allocate a tuple value. Count starts at 1.
    pub fn new_tuple(&mut self, slots: Vec<Slot>) -> RtResult<ValueId> {
        let payload = Payload::Tuple(slots);
        self.create(payload.storage_size(), payload)
    }

    /// Allocate a string value. Count starts at 1.
    pub fn new_string(&mut self, s: impl Into<String>) -> RtResult<ValueId> {
        let payload = Payload::Str(s.into());
        self.create(payload.storage_size(), payload)
    }

    /// Allocate a closure capture tuple. Count starts at 1.
    pub fn new_capture(&mut self, classical: Vec<Slot>, qubits: Vec<QubitId>) -> RtResult<ValueId> {
        let payload = Payload::Capture { classical, qubits };
        self.create(payload.storage_size(), payload)
    }

    /// Allocate a qubit register. Count starts at 1.
    ///
    /// Pass `owned = false` for registers describing an alloc/borrow result;
    /// their handles belong to the requesting scope, not the register.
    pub fn new_qubit_register(&mut self, handles: Vec<QubitId>, owned: bool) -> RtResult<ValueId> {
        let payload = Payload::QubitRegister { handles, owned };
        self.create(payload.storage_size(), payload)
    }

    /// Increment a value's count. Returns the new count.
    pub fn retain(&mut self, v: ValueId) -> RtResult<u64> {
        let value = self.get_mut(v)?;
        value.count += 1;
        let count = value.count;
        self.stats.retains += 1;
        Ok(count)
    }

    /// Decrement a value's count, destroying it on zero.
    ///
    /// Destruction frees the backing block exactly once and releases every
    /// value reference embedded in the payload, cascading through structures
    /// that reach zero themselves. Qubit handles owned by destroyed payloads
    /// are returned in the outcome for the caller to release.
    pub fn release(&mut self, v: ValueId) -> RtResult<ReleaseOutcome> {
        let count = self.release_one(v)?;
        let mut freed_qubits = Vec::new();

        // Cascade: destroying a structure releases what it embeds, which may
        // destroy further structures. A worklist keeps the depth bounded.
        let mut worklist = Vec::new();
        if count == 0 {
            self.destroy(v, &mut worklist, &mut freed_qubits)?;
        }
        while let Some(inner) = worklist.pop() {
            if self.release_one(inner)? == 0 {
                self.destroy(inner, &mut worklist, &mut freed_qubits)?;
            }
        }
        Ok(ReleaseOutcome { count, freed_qubits })
    }

    /// A value's current count.
    pub fn count(&self, v: ValueId) -> RtResult<u64> {
        self.get(v).map(|value| value.count)
    }

    /// A value's payload.
    pub fn payload(&self, v: ValueId) -> RtResult<&Payload> {
        self.get(v).map(|value| &value.payload)
    }

    /// Read access to an untyped value's bytes.
    pub fn bytes(&self, v: ValueId) -> RtResult<&[u8]> {
        let block = self.get(v)?.block;
        self.heap.bytes(block)
    }

    /// Write access to an untyped value's bytes.
    pub fn bytes_mut(&mut self, v: ValueId) -> RtResult<&mut [u8]> {
        let block = self.get(v)?.block;
        self.heap.bytes_mut(block)
    }

    /// Whether `v` is currently live.
    pub fn is_live(&self, v: ValueId) -> bool {
        self.values.contains_key(&v)
    }

    /// Number of live values.
    pub fn live_values(&self) -> usize {
        self.values.len()
    }

    /// Operation counters.
    pub fn stats(&self) -> ValueStats {
        self.stats
    }

    /// The underlying heap allocator, for byte accounting.
    pub fn heap(&self) -> &HeapAllocator {
        &self.heap
    }

    /// Direct access to the raw heap surface (`heap_alloc`/`heap_free` in
    /// the generated-code ABI).
    pub fn heap_mut(&mut self) -> &mut HeapAllocator {
        &mut self.heap
    }

    fn create(&mut self, size: usize, payload: Payload) -> RtResult<ValueId> {
        let block = self.heap.allocate(size)?;
        let id = ValueId(self.next);
        self.next += 1;
        self.values.insert(
            id,
            HeapValue {
                count: 1,
                block,
                payload,
            },
        );
        self.stats.allocs += 1;
        Ok(id)
    }

    /// Decrement without destroying. Returns the new count.
    fn release_one(&mut self, v: ValueId) -> RtResult<u64> {
        let value = self.get_mut(v)?;
        value.count -= 1;
        let count = value.count;
        self.stats.releases += 1;
        Ok(count)
    }

    /// Remove a zero-count value: free its block, queue embedded value
    /// references for release, and collect owned qubit handles.
    fn destroy(
        &mut self,
        v: ValueId,
        worklist: &mut Vec<ValueId>,
        freed_qubits: &mut Vec<QubitId>,
    ) -> RtResult<()> {
        let value = match self.values.remove(&v) {
            Some(value) => value,
            None => return Err(RuntimeError::UntrackedValue(v)),
        };
        self.destroyed.insert(v);
        self.heap.free(value.block)?;
        self.stats.deallocs += 1;

        match value.payload {
            Payload::Bytes | Payload::Str(_) => {}
            Payload::Array(slots) | Payload::Tuple(slots) => {
                collect_slots(&slots, worklist, freed_qubits);
            }
            Payload::Capture { classical, qubits } => {
                collect_slots(&classical, worklist, freed_qubits);
                freed_qubits.extend(qubits);
            }
            Payload::QubitRegister { handles, owned } => {
                if owned {
                    freed_qubits.extend(handles);
                }
            }
        }
        Ok(())
    }

    fn get(&self, v: ValueId) -> RtResult<&HeapValue> {
        match self.values.get(&v) {
            Some(value) => Ok(value),
            None if self.destroyed.contains(&v) => Err(RuntimeError::UseAfterDestroy(v)),
            None => Err(RuntimeError::UntrackedValue(v)),
        }
    }

    fn get_mut(&mut self, v: ValueId) -> RtResult<&mut HeapValue> {
        match self.values.get_mut(&v) {
            Some(value) => Ok(value),
            None if self.destroyed.contains(&v) => Err(RuntimeError::UseAfterDestroy(v)),
            None => Err(RuntimeError::UntrackedValue(v)),
        }
    }
}

fn collect_slots(slots: &[Slot], worklist: &mut Vec<ValueId>, freed_qubits: &mut Vec<QubitId>) {
    for slot in slots {
        match *slot {
            Slot::Word(_) => {}
            Slot::Value(inner) => worklist.push(inner),
            Slot::Qubit(q) => freed_qubits.push(q),
        }
    }
}
