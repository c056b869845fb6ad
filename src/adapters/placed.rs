//! A heap that builds itself inside a raw memory region.
//!
//! `place` splits the region into the engine struct, the tracking bitmap,
//! and the payload, sizing the bitmap so the payload is as large as
//! possible while everything stays aligned to both the bitmap unit and
//! the page. The result is a [`Virtualized`] [`Translated`]
//! [`BitmapAllocator`] living entirely inside the caller's region.

use core::mem;
use core::slice;

use bit_field::BitField;

use crate::adapters::{Translated, Virtualized};
use crate::bitmap_alloc::BitmapAllocator;
use crate::num::UInt;
use crate::traits::{Allocator, VirtualAllocator};

type Engine<U> = Virtualized<Translated<BitmapAllocator<'static, U, usize, usize>, usize, usize>>;

pub struct PlacedHeap<U: 'static> {
    inner: Engine<U>,
}

impl<U: UInt + BitField + 'static> PlacedHeap<U> {
    /// Construct a heap inside `[region, region + size)` with `page`-sized
    /// allocation units, returning a reference into the region itself.
    /// `None` if the region cannot hold the struct plus a useful bitmap.
    ///
    /// # Safety
    ///
    /// The region must be valid, writable, exclusive memory, aligned for
    /// this type, and must outlive every use of the returned reference.
    pub unsafe fn place(region: usize, size: usize, page: usize) -> Option<&'static mut PlacedHeap<U>> {
        assert!(page.is_power_of_two());
        debug_assert!(region % mem::align_of::<PlacedHeap<U>>() == 0);

        let unit_align = mem::size_of::<U>().align_up(page);
        let structure_size = mem::size_of::<PlacedHeap<U>>().align_up(unit_align);
        if structure_size > size {
            return None;
        }
        let usable = (size - structure_size) / page * page;
        let (bitmap_size, free_size) = Self::best_bitmap_split(usable, page);
        if free_size == 0 {
            return None;
        }

        let units = slice::from_raw_parts_mut(
            (region + structure_size) as *mut U,
            bitmap_size / mem::size_of::<U>(),
        );
        let payload = region + structure_size + bitmap_size;

        let tracker = BitmapAllocator::new(units, free_size / page);
        let translated = Translated::new(tracker, page, payload);
        let heap = PlacedHeap {
            inner: Virtualized::new(translated),
        };

        let slot = region as *mut PlacedHeap<U>;
        slot.write(heap);
        Some(&mut *slot)
    }

    /// Pick the bitmap size that maximizes the covered payload. Returns
    /// `(bitmap_bytes, payload_bytes)`; both are aligned to the unit and
    /// the page.
    fn best_bitmap_split(usable: usize, page: usize) -> (usize, usize) {
        let align = mem::size_of::<U>().align_up(page);
        if align >= usable {
            return (0, 0);
        }

        // A lower bound from the exact ratio, then try one step up in
        // case rounding left representable pages on the table.
        let base = (usable / (page * 8 + 1)).align_up(align);
        let mut best = (base, Self::payload_for(usable, page, base));
        if let Some(bigger) = base.checked_add(align) {
            if bigger < usable {
                let payload = Self::payload_for(usable, page, bigger);
                if payload > best.1 {
                    best = (bigger, payload);
                }
            }
        }
        best
    }

    /// Payload bytes a bitmap of `bitmap_bytes` can cover within `usable`.
    fn payload_for(usable: usize, page: usize, bitmap_bytes: usize) -> usize {
        let representable = page * bitmap_bytes * 8;
        let available = (usable - bitmap_bytes) / page * page;
        representable.min(available)
    }
}

impl<U: UInt + BitField + 'static> Allocator<usize, usize> for PlacedHeap<U> {
    fn alloc(&mut self, size: usize) -> Option<usize> {
        self.inner.alloc(size)
    }

    fn dealloc(&mut self, addr: usize, size: usize) {
        self.inner.dealloc(addr, size)
    }
}

impl<U: UInt + BitField + 'static> VirtualAllocator for PlacedHeap<U> {
    fn realloc(&mut self, addr: usize, size: usize) -> Option<usize> {
        self.inner.realloc(addr, size)
    }

    fn free(&mut self, addr: usize) {
        self.inner.free(addr)
    }
}
