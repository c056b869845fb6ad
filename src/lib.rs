//!
//! Address-space allocators over abstract integer ranges.
//!
//! Nothing in this crate owns or touches the memory it manages: engines
//! track free and allocated spans of an integer address space embedded in
//! caller-provided storage, and the caller interprets the returned
//! addresses. That makes the same engines usable for physical-frame
//! allocation during kernel bootstrap, virtual-address-range management,
//! and (through the adapter layer, which opts into real memory) a
//! self-hosted heap.
//!
//! The engines, roughly from coarse to fine:
//! * [`BuddyAllocator`] — power-of-two splitting over a [`tree`] in one
//!   of two encodings; [`Cluster`] stitches several over disjoint spans,
//!   and [`topology::Layout`] plans that stitching for real region maps.
//! * [`FreeList`] / [`FreeTree`] — extent bookkeeping with first-fit or
//!   best-fit policies, O(n) or O(log n), nodes in a caller [`pool`].
//! * [`BitmapAllocator`] — contiguous-run scanning at fixed granularity.
//! * [`adapters`] — scaling, size headers, chunk rounding, and in-place
//!   self-construction, stackable over any engine.
//!
//! Engines are single-threaded by design: every operation takes
//! `&mut self` and completes in bounded time, so callers serialize.
//! Allocation failure is an `Option`, misuse is an assertion.
#![no_std]

#[cfg(test)]
extern crate std;

pub mod adapters;
pub mod avl;
pub mod bitmap;
pub mod bitmap_alloc;
pub mod buddy;
pub mod cluster;
pub mod free_list;
pub mod free_tree;
pub mod num;
pub mod path;
pub mod pool;
pub mod stack;
pub mod topology;
pub mod traits;
pub mod tree;

pub use bitmap_alloc::BitmapAllocator;
pub use buddy::BuddyAllocator;
pub use cluster::{Cluster, ClusterBuilder};
pub use free_list::FreeList;
pub use free_tree::FreeTree;
pub use path::Path;
pub use pool::{Pool, Slab};
pub use stack::BufferedStack;
pub use traits::{Aligner, Allocator, OffsetAligner, VirtualAllocator};
pub use tree::{CountedTree, FlatTree, NodeState, Tree};
