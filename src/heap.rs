//! Heap allocator for untyped byte blocks.
//!
//! The lowest layer of the runtime: malloc/free semantics over opaque block
//! handles, with no knowledge of reference counts or quantum state. Those
//! disciplines are layered on top by [`crate::value`].
//!
//! # Contract
//!
//! - [`HeapAllocator::allocate`] fails with `OutOfMemory` when a configured
//!   byte limit would be exceeded; otherwise it always succeeds.
//! - [`HeapAllocator::free`] releases a block exactly once. A second free of
//!   the same handle is `DoubleFree`; freeing a handle this allocator never
//!   issued is `UntrackedBlock`. Both are integrity violations — generated
//!   code that hits them has an ownership bug upstream.
//!
//! Handles are opaque indices into a registry, never raw pointers, so a
//! use-after-free is caught by a state check instead of a memory-safety
//! violation.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::{RtResult, RuntimeError};

/// Unique identifier for a live heap block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(pub u64);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Allocator of untyped byte blocks.
///
/// Tracks live blocks by handle and accounts for bytes in use. An optional
/// byte limit models a platform with bounded memory; with no limit every
/// allocation succeeds.
#[derive(Debug, Default)]
pub struct HeapAllocator {
    blocks: FxHashMap<BlockId, Vec<u8>>,
    /// Handles that were live once and have been freed. Distinguishes a
    /// double free from a free of a handle that never existed.
    freed: FxHashSet<BlockId>,
    next: u64,
    in_use: usize,
    peak: usize,
    limit_bytes: Option<usize>,
}

impl HeapAllocator {
    /// Create an allocator with no byte limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an allocator that fails with `OutOfMemory` once more than
    /// `limit_bytes` would be live at once.
    pub fn with_limit(limit_bytes: usize) -> Self {
        Self {
            limit_bytes: Some(limit_bytes),
            ..Self::default()
        }
    }

    /// Allocate a zero-initialized block of `size` bytes.
    pub fn allocate(&mut self, size: usize) -> RtResult<BlockId> {
        if let Some(limit) = self.limit_bytes {
            if self.in_use.saturating_add(size) > limit {
                return Err(RuntimeError::OutOfMemory {
                    requested: size,
                    in_use: self.in_use,
                    limit,
                });
            }
        }
        let id = BlockId(self.next);
        self.next += 1;
        self.blocks.insert(id, vec![0u8; size]);
        self.in_use += size;
        self.peak = self.peak.max(self.in_use);
        Ok(id)
    }

    /// Free a previously allocated block. Exactly once per block.
    pub fn free(&mut self, block: BlockId) -> RtResult<()> {
        match self.blocks.remove(&block) {
            Some(bytes) => {
                self.in_use -= bytes.len();
                self.freed.insert(block);
                Ok(())
            }
            None if self.freed.contains(&block) => Err(RuntimeError::DoubleFree(block)),
            None => Err(RuntimeError::UntrackedBlock(block)),
        }
    }

    /// Read access to a live block's bytes.
    pub fn bytes(&self, block: BlockId) -> RtResult<&[u8]> {
        self.blocks
            .get(&block)
            .map(Vec::as_slice)
            .ok_or(RuntimeError::UntrackedBlock(block))
    }

    /// Write access to a live block's bytes.
    pub fn bytes_mut(&mut self, block: BlockId) -> RtResult<&mut [u8]> {
        self.blocks
            .get_mut(&block)
            .map(Vec::as_mut_slice)
            .ok_or(RuntimeError::UntrackedBlock(block))
    }

    /// Number of live blocks.
    pub fn live_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Bytes currently live.
    pub fn bytes_in_use(&self) -> usize {
        self.in_use
    }

    /// High-water mark of live bytes.
    pub fn peak_bytes(&self) -> usize {
        self.peak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_free() {
        let mut heap = HeapAllocator::new();
        let a = heap.allocate(16).unwrap();
        let b = heap.allocate(32).unwrap();
        assert_ne!(a, b);
        assert_eq!(heap.live_blocks(), 2);
        assert_eq!(heap.bytes_in_use(), 48);

        heap.free(a).unwrap();
        assert_eq!(heap.live_blocks(), 1);
        assert_eq!(heap.bytes_in_use(), 32);
        heap.free(b).unwrap();
        assert_eq!(heap.bytes_in_use(), 0);
        assert_eq!(heap.peak_bytes(), 48);
    }

    #[test]
    fn test_double_free_is_distinguished_from_untracked() {
        let mut heap = HeapAllocator::new();
        let a = heap.allocate(8).unwrap();
        heap.free(a).unwrap();
        assert_eq!(heap.free(a), Err(RuntimeError::DoubleFree(a)));

        let ghost = BlockId(999);
        assert_eq!(heap.free(ghost), Err(RuntimeError::UntrackedBlock(ghost)));
    }

    #[test]
    fn test_out_of_memory_under_limit() {
        let mut heap = HeapAllocator::with_limit(64);
        let a = heap.allocate(48).unwrap();
        let err = heap.allocate(32).unwrap_err();
        assert!(matches!(err, RuntimeError::OutOfMemory { requested: 32, in_use: 48, limit: 64 }));

        // Freeing makes room again.
        heap.free(a).unwrap();
        heap.allocate(64).unwrap();
    }

    #[test]
    fn test_block_bytes_round_trip() {
        let mut heap = HeapAllocator::new();
        let a = heap.allocate(4).unwrap();
        heap.bytes_mut(a).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(heap.bytes(a).unwrap(), &[1, 2, 3, 4]);

        heap.free(a).unwrap();
        assert_eq!(heap.bytes(a), Err(RuntimeError::UntrackedBlock(a)));
    }

    #[test]
    fn test_zero_sized_blocks_are_distinct() {
        let mut heap = HeapAllocator::new();
        let a = heap.allocate(0).unwrap();
        let b = heap.allocate(0).unwrap();
        assert_ne!(a, b);
        heap.free(a).unwrap();
        heap.free(b).unwrap();
    }
}
