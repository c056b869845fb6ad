//! Free-extent bookkeeping with O(log n) operations.
//!
//! The same contract as [`FreeList`](crate::free_list::FreeList), but the
//! extents are held in two AVL trees: one ordered by (address, size) for
//! neighbour lookups and ordered walks, one ordered by (size, address) for
//! best-fit allocation. Both trees store the extent by value, so they stay
//! consistent without shared nodes; updates are paired and rolled back on
//! partial failure.

use log::trace;

use crate::avl::{AvlNode, AvlTree};
use crate::num::UInt;
use crate::pool::Pool;
use crate::traits::{Aligner, Allocator, OffsetAligner};

/// A maximal run of free addresses.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Extent<A, S> {
    pub start: A,
    pub size: S,
}

/// An [`Extent`] ordered by (address, size).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ByAddress<A, S>(pub Extent<A, S>);

/// An [`Extent`] ordered by (size, address).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BySize<A, S>(pub Extent<A, S>);

impl<A: UInt, S: UInt> Ord for ByAddress<A, S> {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        (self.0.start, self.0.size).cmp(&(other.0.start, other.0.size))
    }
}

impl<A: UInt, S: UInt> PartialOrd for ByAddress<A, S> {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<A: UInt, S: UInt> Ord for BySize<A, S> {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        (self.0.size, self.0.start).cmp(&(other.0.size, other.0.start))
    }
}

impl<A: UInt, S: UInt> PartialOrd for BySize<A, S> {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Called when one of the node pools cannot furnish a node; both pools are
/// handed over so the handler can make room. Returning `true` retries.
pub type FailureHandler<PA, PS> = fn(&mut PA, &mut PS) -> bool;

pub struct FreeTree<A, S, PA, PS>
where
    PA: Pool<AvlNode<ByAddress<A, S>>>,
    PS: Pool<AvlNode<BySize<A, S>>>,
{
    by_address: AvlTree<ByAddress<A, S>, PA>,
    by_size: AvlTree<BySize<A, S>, PS>,
    on_alloc_fail: FailureHandler<PA, PS>,
}

impl<A: UInt, S: UInt, PA, PS> FreeTree<A, S, PA, PS>
where
    PA: Pool<AvlNode<ByAddress<A, S>>>,
    PS: Pool<AvlNode<BySize<A, S>>>,
{
    pub fn new(
        address_pool: PA,
        size_pool: PS,
        on_alloc_fail: FailureHandler<PA, PS>,
    ) -> FreeTree<A, S, PA, PS> {
        FreeTree {
            by_address: AvlTree::new(address_pool),
            by_size: AvlTree::new(size_pool),
            on_alloc_fail,
        }
    }

    /// Best-fit allocation: the smallest extent that fits, lowest address
    /// on ties. The leftover tail goes back into the trees.
    pub fn alloc(&mut self, size: S) -> Option<A> {
        if size == S::ZERO {
            return None;
        }
        let query = BySize(Extent {
            start: A::ZERO,
            size,
        });
        let found = *self.by_size.find_ge(&query)?;
        self.by_size.remove(&found);
        let removed = self.by_address.remove(&ByAddress(found.0));
        debug_assert!(removed);

        let extent = found.0;
        if size < extent.size {
            self.add_extent(Extent {
                start: extent.start + A::from_uint(size),
                size: extent.size - size,
            });
        }
        Some(extent.start)
    }

    /// Walk the extents in address order and take the first that can hold
    /// `size` units at `(addr + offset) % align == 0`.
    pub fn offset_align(&mut self, align: A, offset: A, size: S) -> Option<A> {
        if size == S::ZERO {
            return None;
        }

        let mut found: Option<(Extent<A, S>, S)> = None;
        for candidate in self.by_address.iter() {
            let extent = candidate.0;
            let misalignment = extent.start.wrapping_add(offset) % align;
            let mut skip = S::ZERO;
            if misalignment != A::ZERO {
                match S::try_from_uint(align - misalignment) {
                    Some(s) if s <= extent.size => skip = s,
                    _ => continue,
                }
            }
            if extent.size - skip >= size {
                found = Some((extent, skip));
                break;
            }
        }

        let (extent, skip) = found?;
        self.by_address.remove(&ByAddress(extent));
        self.by_size.remove(&BySize(extent));

        let out = extent.start + A::from_uint(skip);
        if skip > S::ZERO {
            self.add_extent(Extent {
                start: extent.start,
                size: skip,
            });
        }
        if skip + size < extent.size {
            self.add_extent(Extent {
                start: out + A::from_uint(size),
                size: extent.size - (skip + size),
            });
        }
        Some(out)
    }

    /// Record `[addr, addr + size)` as free, merging with any adjacent
    /// extent on either side. Freeing zero units is a no-op.
    pub fn dealloc(&mut self, addr: A, size: S) {
        if size == S::ZERO {
            return;
        }
        let query = ByAddress(Extent { start: addr, size });

        let before = self
            .by_address
            .find_lt(&query)
            .map(|b| b.0)
            .filter(|b| b.start.wrapping_add(A::from_uint(b.size)) == addr);
        let after = self
            .by_address
            .find_gt(&query)
            .map(|a| a.0)
            .filter(|a| addr.wrapping_add(A::from_uint(size)) == a.start);

        match (before, after) {
            (Some(b), Some(a)) => {
                self.remove_extent(b);
                self.remove_extent(a);
                self.add_extent(Extent {
                    start: b.start,
                    size: b.size + size + a.size,
                });
                trace!("merged both neighbours at {:?}", addr);
            }
            (Some(b), None) => {
                self.remove_extent(b);
                self.add_extent(Extent {
                    start: b.start,
                    size: b.size + size,
                });
            }
            (None, Some(a)) => {
                self.remove_extent(a);
                self.add_extent(Extent {
                    start: addr,
                    size: a.size + size,
                });
            }
            (None, None) => {
                self.add_extent(Extent { start: addr, size });
            }
        }
    }

    pub fn extent_count(&self) -> usize {
        debug_assert!(self.by_address.len() == self.by_size.len());
        self.by_address.len()
    }

    /// The stored extents in address order.
    pub fn extents(&self) -> impl Iterator<Item = Extent<A, S>> + '_ {
        self.by_address.iter().map(|wrapped| wrapped.0)
    }

    fn remove_extent(&mut self, extent: Extent<A, S>) {
        let removed_address = self.by_address.remove(&ByAddress(extent));
        let removed_size = self.by_size.remove(&BySize(extent));
        debug_assert!(removed_address && removed_size);
    }

    /// Insert into both trees, retrying through the failure handler. If
    /// the second insertion ultimately fails, the first is rolled back and
    /// the extent is dropped: consistency over completeness.
    fn add_extent(&mut self, extent: Extent<A, S>) -> bool {
        while !self.by_address.add(ByAddress(extent)) {
            if !(self.on_alloc_fail)(self.by_address.pool_mut(), self.by_size.pool_mut()) {
                return false;
            }
        }
        while !self.by_size.add(BySize(extent)) {
            if !(self.on_alloc_fail)(self.by_address.pool_mut(), self.by_size.pool_mut()) {
                self.by_address.remove(&ByAddress(extent));
                return false;
            }
        }
        true
    }
}

impl<A: UInt, S: UInt, PA, PS> Allocator<A, S> for FreeTree<A, S, PA, PS>
where
    PA: Pool<AvlNode<ByAddress<A, S>>>,
    PS: Pool<AvlNode<BySize<A, S>>>,
{
    fn alloc(&mut self, size: S) -> Option<A> {
        FreeTree::alloc(self, size)
    }

    fn dealloc(&mut self, addr: A, size: S) {
        FreeTree::dealloc(self, addr, size)
    }
}

impl<A: UInt, S: UInt, PA, PS> Aligner<A, S> for FreeTree<A, S, PA, PS>
where
    PA: Pool<AvlNode<ByAddress<A, S>>>,
    PS: Pool<AvlNode<BySize<A, S>>>,
{
    fn align(&mut self, align: A, size: S) -> Option<A> {
        self.offset_align(align, A::ZERO, size)
    }
}

impl<A: UInt, S: UInt, PA, PS> OffsetAligner<A, S> for FreeTree<A, S, PA, PS>
where
    PA: Pool<AvlNode<ByAddress<A, S>>>,
    PS: Pool<AvlNode<BySize<A, S>>>,
{
    fn offset_align(&mut self, align: A, offset: A, size: S) -> Option<A> {
        FreeTree::offset_align(self, align, offset, size)
    }
}
