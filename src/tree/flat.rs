//! One-bit-per-node tree encoding.
//!
//! A set bit means the node is occupied (allocated or split); the two are
//! told apart by looking at the children, which is why occupying a non-leaf
//! clears both child bits. Cheap on memory (one bit per node), but the free
//! search is a full descent: O(2^D) worst case. Meant for trees that are
//! shallow or searched rarely.

use crate::bitmap::RawBitmap;
use crate::path::Path;
use crate::tree::{NodeState, Tree};

pub struct FlatTree<'a> {
    bits: RawBitmap<'a, u8>,
    depth: u32,
}

impl<'a> FlatTree<'a> {
    /// Build a tree of `depth` over `storage`. The storage does not need to
    /// be zeroed: bits are always written before they are consulted.
    pub fn new(depth: u32, storage: &'a mut [u8]) -> FlatTree<'a> {
        assert!((1..64).contains(&depth));
        assert!(storage.len() >= Self::storage_size(depth));
        let mut bits = RawBitmap::new(storage, ((1u64 << depth) - 1) as usize);
        bits.set(0, false);
        FlatTree { bits, depth }
    }

    fn search(&self, depth: u32, align: u32, path: Path) -> Option<Path> {
        match self.get(path) {
            NodeState::Free => return Some(path),
            NodeState::Allocated => return None,
            NodeState::Split => {}
        }
        if path.depth() == depth {
            return None;
        }
        if let Some(found) = self.search(depth, align, path.left()) {
            Some(found)
        } else if path.depth() < align {
            self.search(depth, align, path.right())
        } else {
            None
        }
    }
}

impl Tree for FlatTree<'_> {
    fn depth(&self) -> u32 {
        self.depth
    }

    fn get(&self, path: Path) -> NodeState {
        if !self.bits.get(path.tree_index() as usize) {
            return NodeState::Free;
        }
        if path.depth() == self.depth - 1 {
            // Leaves cannot be split
            return NodeState::Allocated;
        }
        let left = path.left().tree_index() as usize;
        if self.bits.get(left) || self.bits.get(left + 1) {
            NodeState::Split
        } else {
            NodeState::Allocated
        }
    }

    fn set(&mut self, path: Path, state: NodeState) {
        let index = path.tree_index() as usize;
        match state {
            NodeState::Free => self.bits.set(index, false),
            NodeState::Allocated | NodeState::Split => {
                self.bits.set(index, true);
                if path.depth() != self.depth - 1 {
                    let left = path.left().tree_index() as usize;
                    self.bits.set(left, false);
                    self.bits.set(left + 1, false);
                }
            }
        }
    }

    fn find_aligned(&self, depth: u32, align: u32) -> Option<Path> {
        self.search(depth, align, Path::ROOT)
    }

    fn storage_size(depth: u32) -> usize {
        if depth <= 3 {
            1
        } else {
            1 << (depth - 3)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FlatTree;
    use crate::path::Path;
    use crate::tree::{NodeState, Tree};

    #[test]
    fn test_storage_size() {
        assert_eq!(FlatTree::storage_size(1), 1);
        assert_eq!(FlatTree::storage_size(3), 1);
        assert_eq!(FlatTree::storage_size(4), 2);
        assert_eq!(FlatTree::storage_size(10), 128);
    }

    #[test]
    fn test_dirty_storage() {
        let mut storage = [0xffu8; 2];
        let mut tree = FlatTree::new(4, &mut storage);
        assert_eq!(tree.get(Path::ROOT), NodeState::Free);
        assert_eq!(tree.alloc(0), Some(Path::ROOT));
        assert_eq!(tree.alloc(3), None);
    }

    #[test]
    fn test_allocated_vs_split() {
        let mut storage = [0u8; 2];
        let mut tree = FlatTree::new(4, &mut storage);

        tree.set(Path::ROOT, NodeState::Split);
        tree.set(Path::new(1, 0), NodeState::Allocated);
        assert_eq!(tree.get(Path::ROOT), NodeState::Split);
        assert_eq!(tree.get(Path::new(1, 0)), NodeState::Allocated);
        assert_eq!(tree.get(Path::new(1, 1)), NodeState::Free);

        // Occupying a non-leaf resets its children
        tree.set(Path::new(1, 1), NodeState::Split);
        assert_eq!(tree.get(Path::new(2, 2)), NodeState::Free);
        assert_eq!(tree.get(Path::new(2, 3)), NodeState::Free);
    }
}
