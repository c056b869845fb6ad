//! Planning buddy-tree coverage of disjoint address regions.
//!
//! Given the usable regions of an address space, a page size, and an
//! alignment range, [`Layout`] greedily emits descriptors for the largest
//! tree that fits at the current alignment, halving the alignment when
//! nothing fits anymore. The result covers as much of the regions as a
//! bounded number of trees can, preferring big well-aligned trees. The
//! planner is pure arithmetic: building the trees is the cluster builder's
//! job.

use arrayvec::ArrayVec;
use log::debug;

use crate::num::UInt;

/// A disjoint slice of usable address space.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Region<A> {
    start: A,
    size: A,
}

impl<A: UInt> Region<A> {
    pub fn new(start: A, size: A) -> Region<A> {
        Region { start, size }
    }

    pub fn start(&self) -> A {
        self.start
    }

    pub fn size(&self) -> A {
        self.size
    }

    pub fn end(&self) -> A {
        self.start + self.size
    }

    pub fn contains(&self, addr: A) -> bool {
        addr >= self.start && addr < self.end()
    }
}

/// A planned buddy tree: where it starts and how deep it is. With page
/// size `2^k` it covers `2^(k + depth - 1)` addresses.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TreeSpec<A> {
    pub start: A,
    pub depth: u32,
}

impl<A: UInt> TreeSpec<A> {
    pub fn covered_size(&self, page_log: u32) -> A {
        A::ONE << (page_log + self.depth - 1)
    }

    pub fn end(&self, page_log: u32) -> A {
        self.start + self.covered_size(page_log)
    }

    fn contains(&self, addr: A, page_log: u32) -> bool {
        addr >= self.start && addr < self.end(page_log)
    }
}

/// The planner. `N` bounds the number of descriptors emitted.
pub struct Layout<A, const N: usize> {
    specs: ArrayVec<TreeSpec<A>, N>,
    page_log: u32,
    max_align: A,
    min_align: A,
    sorted: bool,
}

impl<A: UInt, const N: usize> Layout<A, N> {
    /// `max_align` and `min_align` must be powers of two no smaller than
    /// the page. `sorted` keeps the emitted descriptors in address order
    /// instead of emission (largest-first) order.
    pub fn new(page_log: u32, max_align: A, min_align: A, sorted: bool) -> Layout<A, N> {
        assert!(max_align.is_power_of_two() && min_align.is_power_of_two());
        assert!(min_align <= max_align);
        assert!(min_align >= A::ONE << page_log);
        Layout {
            specs: ArrayVec::new(),
            page_log,
            max_align,
            min_align,
            sorted,
        }
    }

    /// Plan coverage of `regions`, which must be pairwise disjoint.
    pub fn run(&mut self, regions: &[Region<A>]) {
        let mut alignment = self.max_align;
        while alignment >= self.min_align && !self.specs.is_full() {
            match self.find_largest_free(regions, alignment) {
                Some(spec) => self.insert(spec),
                None => {
                    if alignment == A::ONE {
                        break;
                    }
                    alignment = alignment >> 1;
                }
            }
        }
        debug!(
            "planned {} trees over {} regions",
            self.specs.len(),
            regions.len()
        );
    }

    pub fn specs(&self) -> &[TreeSpec<A>] {
        &self.specs
    }

    pub fn page_log(&self) -> u32 {
        self.page_log
    }

    /// Best descriptor over all regions at this alignment; ties keep the
    /// earliest region's find.
    fn find_largest_free(&self, regions: &[Region<A>], alignment: A) -> Option<TreeSpec<A>> {
        let mut best: Option<TreeSpec<A>> = None;
        for region in regions {
            if let Some(found) = self.largest_free_in(region, alignment) {
                if best.map_or(true, |b| found.depth > b.depth) {
                    best = Some(found);
                }
            }
        }
        best
    }

    /// Largest aligned free gap within one region, skipping already
    /// emitted descriptors.
    fn largest_free_in(&self, region: &Region<A>, alignment: A) -> Option<TreeSpec<A>> {
        let page = A::ONE << self.page_log;
        let mut best: Option<TreeSpec<A>> = None;

        let mut location = self.next_free_aligned(region, region.start(), alignment);
        while location < region.end() {
            let gap_end = self
                .next_spec_start_in(region, location)
                .unwrap_or_else(|| region.end());
            let gap = gap_end - location;

            if gap >= page {
                let depth = gap.log2_floor() - self.page_log + 1;
                if best.map_or(true, |b| depth > b.depth) {
                    best = Some(TreeSpec {
                        start: location,
                        depth,
                    });
                }
            }

            location = self.next_free_aligned(region, gap_end, alignment);
        }
        best
    }

    /// The next aligned location at or after `location` that is not inside
    /// an emitted descriptor, or the region end.
    fn next_free_aligned(&self, region: &Region<A>, mut location: A, alignment: A) -> A {
        while location < region.end() {
            match location.checked_align_up(alignment) {
                Some(aligned) => location = aligned,
                None => return region.end(),
            }
            if location >= region.end() {
                break;
            }
            let covering = self
                .specs
                .iter()
                .find(|spec| spec.contains(location, self.page_log));
            match covering {
                Some(spec) => location = spec.end(self.page_log),
                None => return location,
            }
        }
        region.end()
    }

    /// Start of the earliest emitted descriptor within `region` at or
    /// after `location`.
    fn next_spec_start_in(&self, region: &Region<A>, location: A) -> Option<A> {
        self.specs
            .iter()
            .filter(|spec| region.contains(spec.start) && spec.start >= location)
            .map(|spec| spec.start)
            .min()
    }

    fn insert(&mut self, spec: TreeSpec<A>) {
        if self.sorted {
            let at = self
                .specs
                .iter()
                .position(|s| s.start > spec.start)
                .unwrap_or(self.specs.len());
            self.specs.insert(at, spec);
        } else {
            self.specs.push(spec);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Layout, Region, TreeSpec};

    #[test]
    fn test_two_regions_three_trees() {
        let regions = [Region::new(0u64, 0x1000), Region::new(0x1000, 0x3000)];
        let mut layout: Layout<u64, 8> = Layout::new(4, 0x1000, 0x1000, false);
        layout.run(&regions);

        assert_eq!(
            layout.specs(),
            &[
                TreeSpec { start: 0x1000, depth: 10 },
                TreeSpec { start: 0, depth: 9 },
                TreeSpec { start: 0x3000, depth: 9 },
            ]
        );
    }

    #[test]
    fn test_sorted_insertion() {
        let regions = [Region::new(0u64, 0x1000), Region::new(0x1000, 0x3000)];
        let mut layout: Layout<u64, 8> = Layout::new(4, 0x1000, 0x1000, true);
        layout.run(&regions);

        assert_eq!(
            layout.specs(),
            &[
                TreeSpec { start: 0, depth: 9 },
                TreeSpec { start: 0x1000, depth: 10 },
                TreeSpec { start: 0x3000, depth: 9 },
            ]
        );
    }

    #[test]
    fn test_alignment_halving() {
        // One region starting off-alignment: nothing fits until the
        // alignment drops to 0x200, and the leftover front half is picked
        // up at 0x100.
        let regions = [Region::new(0x100u64, 0x200)];
        let mut layout: Layout<u64, 4> = Layout::new(4, 0x1000, 0x100, false);
        layout.run(&regions);

        assert_eq!(
            layout.specs(),
            &[
                TreeSpec { start: 0x200, depth: 5 },
                TreeSpec { start: 0x100, depth: 5 },
            ]
        );
    }

    #[test]
    fn test_capacity_bound() {
        let regions = [
            Region::new(0u64, 0x100),
            Region::new(0x1000, 0x100),
            Region::new(0x2000, 0x100),
        ];
        let mut layout: Layout<u64, 2> = Layout::new(4, 0x100, 0x100, false);
        layout.run(&regions);
        assert_eq!(layout.specs().len(), 2);
    }

    #[test]
    fn test_region_too_small() {
        let regions = [Region::new(0u64, 0x8)];
        let mut layout: Layout<u64, 4> = Layout::new(4, 0x10, 0x10, false);
        layout.run(&regions);
        assert!(layout.specs().is_empty());
    }
}
