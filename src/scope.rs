//! Scope tracking: which qubits are reachable at a borrow site.
//!
//! A [`ScopeSet`] is transient input assembled by the caller before each
//! borrow call — there is no state machine here. The compiler knows which
//! classical bindings are live at the call site; [`ScopeSet::collect`] walks
//! those values and gathers every qubit handle reachable through them,
//! including handles captured transitively by closures.
//!
//! The enumeration is deliberately conservative: every qubit a live value
//! can reach is reported, even if the program would never touch it during
//! the loan. Over-reporting only makes a qubit ineligible for lending.
//! **Under-reporting is a latent correctness bug this runtime cannot detect**
//! — a lent-out qubit that is still reachable can have its state (and any
//! entanglement) silently corrupted by the borrower. Supplying a complete
//! set of live roots is the caller's obligation.

use rustc_hash::FxHashSet;

use crate::error::RtResult;
use crate::qubit::QubitId;
use crate::value::{Payload, Slot, ValueId, ValueManager};

/// The set of qubit handles in scope at a program point.
///
/// Rebuilt by the caller before each borrow call; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet {
    qubits: FxHashSet<QubitId>,
}

impl ScopeSet {
    /// An empty scope: every free qubit is eligible for lending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a scope set from live roots.
    ///
    /// `qubits` are handles held directly by live bindings; `values` are the
    /// live heap values (arrays, tuples, captures, registers) to walk for
    /// embedded handles. The walk is exhaustive and cycle-safe.
    pub fn collect(
        qubits: &[QubitId],
        values: &[ValueId],
        manager: &ValueManager,
    ) -> RtResult<Self> {
        let mut scope = Self::new();
        scope.qubits.extend(qubits.iter().copied());

        let mut visited = FxHashSet::default();
        let mut worklist: Vec<ValueId> = values.to_vec();
        while let Some(v) = worklist.pop() {
            if !visited.insert(v) {
                continue;
            }
            match manager.payload(v)? {
                Payload::Bytes | Payload::Str(_) => {}
                Payload::Array(slots) | Payload::Tuple(slots) => {
                    scope.walk_slots(slots, &mut worklist);
                }
                Payload::Capture { classical, qubits } => {
                    scope.walk_slots(classical, &mut worklist);
                    scope.qubits.extend(qubits.iter().copied());
                }
                // Conservative: register handles count as reachable whether
                // or not the register owns them.
                Payload::QubitRegister { handles, .. } => {
                    scope.qubits.extend(handles.iter().copied());
                }
            }
        }
        Ok(scope)
    }

    /// Mark a single handle as in scope.
    pub fn insert(&mut self, q: QubitId) {
        self.qubits.insert(q);
    }

    /// Whether a handle is in scope.
    pub fn contains(&self, q: QubitId) -> bool {
        self.qubits.contains(&q)
    }

    /// Number of handles in scope.
    pub fn len(&self) -> usize {
        self.qubits.len()
    }

    /// Whether the scope is empty.
    pub fn is_empty(&self) -> bool {
        self.qubits.is_empty()
    }

    /// Iterate over the handles in scope.
    pub fn iter(&self) -> impl Iterator<Item = &QubitId> {
        self.qubits.iter()
    }

    fn walk_slots(&mut self, slots: &[Slot], worklist: &mut Vec<ValueId>) {
        for slot in slots {
            match *slot {
                Slot::Word(_) => {}
                Slot::Value(inner) => worklist.push(inner),
                Slot::Qubit(q) => {
                    self.qubits.insert(q);
                }
            }
        }
    }
}

impl Extend<QubitId> for ScopeSet {
    fn extend<I: IntoIterator<Item = QubitId>>(&mut self, iter: I) {
        self.qubits.extend(iter);
    }
}

impl FromIterator<QubitId> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = QubitId>>(iter: I) -> Self {
        Self {
            qubits: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_handles() {
        let vm = ValueManager::new();
        let scope = ScopeSet::collect(&[QubitId(1), QubitId(4)], &[], &vm).unwrap();
        assert!(scope.contains(QubitId(1)));
        assert!(scope.contains(QubitId(4)));
        assert!(!scope.contains(QubitId(2)));
        assert_eq!(scope.len(), 2);
    }

    #[test]
    fn test_qubits_through_capture_tuple() {
        let mut vm = ValueManager::new();
        let cap = vm
            .new_capture(vec![Slot::Word(0)], vec![QubitId(7)])
            .unwrap();

        let scope = ScopeSet::collect(&[], &[cap], &vm).unwrap();
        assert!(scope.contains(QubitId(7)));
    }

    #[test]
    fn test_qubits_through_nested_structures() {
        let mut vm = ValueManager::new();
        // A register inside a capture inside an array: all handles reachable.
        let reg = vm
            .new_qubit_register(vec![QubitId(2), QubitId(3)], true)
            .unwrap();
        vm.retain(reg).unwrap();
        let cap = vm
            .new_capture(vec![Slot::Value(reg)], vec![QubitId(5)])
            .unwrap();
        vm.retain(cap).unwrap();
        let arr = vm
            .new_array(vec![Slot::Value(cap), Slot::Qubit(QubitId(9))])
            .unwrap();

        let scope = ScopeSet::collect(&[], &[arr], &vm).unwrap();
        for q in [2, 3, 5, 9] {
            assert!(scope.contains(QubitId(q)), "q{q} should be in scope");
        }
        assert_eq!(scope.len(), 4);
    }

    #[test]
    fn test_shared_value_visited_once() {
        let mut vm = ValueManager::new();
        let shared = vm.new_qubit_register(vec![QubitId(0)], false).unwrap();
        vm.retain(shared).unwrap();
        vm.retain(shared).unwrap();
        let a = vm.new_tuple(vec![Slot::Value(shared)]).unwrap();
        let b = vm.new_tuple(vec![Slot::Value(shared)]).unwrap();

        let scope = ScopeSet::collect(&[], &[a, b], &vm).unwrap();
        assert_eq!(scope.len(), 1);
        assert!(scope.contains(QubitId(0)));
    }

    #[test]
    fn test_classical_only_values_report_nothing() {
        let mut vm = ValueManager::new();
        let s = vm.new_string("no qubits here").unwrap();
        let t = vm.new_tuple(vec![Slot::Word(1), Slot::Word(2)]).unwrap();

        let scope = ScopeSet::collect(&[], &[s, t], &vm).unwrap();
        assert!(scope.is_empty());
    }
}
