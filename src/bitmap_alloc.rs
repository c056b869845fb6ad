//! Contiguous-run allocator over a fixed-granularity bit array.
//!
//! Bit `k` set means unit `k` is allocated. Allocation scans for a run of
//! clear bits in O(N), skipping whole backing units that are fully
//! allocated; freeing clears the run unconditionally. Good for small pools
//! with uniform granularity, and the engine the self-placing heap builds
//! on.

use bit_field::BitField;

use crate::bitmap::RawBitmap;
use crate::num::UInt;
use crate::traits::{Aligner, Allocator, OffsetAligner};

pub struct BitmapAllocator<'a, U, A, S> {
    bits: RawBitmap<'a, U>,
    _types: core::marker::PhantomData<(A, S)>,
}

impl<'a, U: UInt + BitField, A: UInt, S: UInt> BitmapAllocator<'a, U, A, S> {
    /// Track `bit_count` units over `units`. Only the owned bits are
    /// cleared; anything past `bit_count` in the final unit is preserved.
    pub fn new(units: &'a mut [U], bit_count: usize) -> BitmapAllocator<'a, U, A, S> {
        let full_units = bit_count / U::BITS as usize;
        for unit in units[..full_units].iter_mut() {
            *unit = U::ZERO;
        }
        let mut bits = RawBitmap::new(units, bit_count);
        for index in full_units * U::BITS as usize..bit_count {
            bits.set(index, false);
        }
        BitmapAllocator {
            bits,
            _types: core::marker::PhantomData,
        }
    }

    /// First run of `size` clear bits, lowest index first.
    pub fn alloc(&mut self, size: S) -> Option<A> {
        if size == S::ZERO {
            return None;
        }
        let size = usize::try_from_uint(size)?;
        let mut run_start = 0;
        let mut run_len = 0;
        let mut index = 0;
        while index < self.bits.bit_len() {
            if self.bits.get(index) {
                run_len = 0;
                // A fully allocated backing unit can be skipped whole
                if index % U::BITS as usize == 0
                    && index + U::BITS as usize <= self.bits.bit_len()
                    && self.bits.unit_for(index) == U::MAX
                {
                    index += U::BITS as usize;
                    continue;
                }
                index += 1;
                continue;
            }
            if run_len == 0 {
                run_start = index;
            }
            run_len += 1;
            if run_len == size {
                for bit in run_start..=index {
                    self.bits.set(bit, true);
                }
                return Some(A::from_u64(run_start as u64));
            }
            index += 1;
        }
        None
    }

    /// First run of `size` clear bits starting at an index with
    /// `(index + offset) % align == 0`. Offset arithmetic is checked: a
    /// request that would overflow fails instead of wrapping.
    pub fn offset_align(&mut self, align: A, offset: A, size: S) -> Option<A> {
        if align < A::from_u64(2) || size == S::ZERO {
            return self.alloc(size);
        }
        let size = usize::try_from_uint(size)?;
        let mut from = 0;
        while let Some(start) = self.next_free_aligned(from, offset, align, size - 1) {
            match self.claim(start, size) {
                Ok(()) => return Some(A::from_u64(start as u64)),
                Err(blocked) => from = blocked + 1,
            }
        }
        None
    }

    /// Clear `[addr, addr + size)`. The range must be within the pool.
    pub fn dealloc(&mut self, addr: A, size: S) {
        let start = addr.to_u64() as usize;
        let size = size.to_u64() as usize;
        assert!(start + size <= self.bits.bit_len());
        for bit in start..start + size {
            self.bits.set(bit, false);
        }
    }

    pub fn bit_len(&self) -> usize {
        self.bits.bit_len()
    }

    /// Next clear bit at or after `from` meeting the alignment and
    /// leaving room for `after` more bits.
    fn next_free_aligned(&self, from: usize, offset: A, align: A, after: usize) -> Option<usize> {
        if after >= self.bits.bit_len() {
            return None;
        }
        let mut index = from;
        while index < self.bits.bit_len() - after {
            let position = offset.checked_add(A::from_u64(index as u64))?;
            let misalignment = position % align;
            if misalignment != A::ZERO {
                let advance = usize::try_from_uint(align - misalignment)?;
                index = index.checked_add(advance)?;
                continue;
            }
            if !self.bits.get(index) {
                return Some(index);
            }
            if self.bits.unit_for(index) == U::MAX {
                index = (index / U::BITS as usize + 1) * U::BITS as usize;
            } else {
                index += 1;
            }
        }
        None
    }

    /// Claim `[start, start + size)` if every bit is clear; otherwise
    /// report the first allocated bit.
    fn claim(&mut self, start: usize, size: usize) -> Result<(), usize> {
        for bit in start..start + size {
            if self.bits.get(bit) {
                return Err(bit);
            }
        }
        for bit in start..start + size {
            self.bits.set(bit, true);
        }
        Ok(())
    }
}

impl<U: UInt + BitField, A: UInt, S: UInt> Allocator<A, S> for BitmapAllocator<'_, U, A, S> {
    fn alloc(&mut self, size: S) -> Option<A> {
        BitmapAllocator::alloc(self, size)
    }

    fn dealloc(&mut self, addr: A, size: S) {
        BitmapAllocator::dealloc(self, addr, size)
    }
}

impl<U: UInt + BitField, A: UInt, S: UInt> Aligner<A, S> for BitmapAllocator<'_, U, A, S> {
    fn align(&mut self, align: A, size: S) -> Option<A> {
        self.offset_align(align, A::ZERO, size)
    }
}

impl<U: UInt + BitField, A: UInt, S: UInt> OffsetAligner<A, S> for BitmapAllocator<'_, U, A, S> {
    fn offset_align(&mut self, align: A, offset: A, size: S) -> Option<A> {
        BitmapAllocator::offset_align(self, align, offset, size)
    }
}

#[cfg(test)]
mod tests {
    use super::BitmapAllocator;

    type TestAllocator<'a> = BitmapAllocator<'a, u32, u64, u64>;

    #[test]
    fn test_offset_alignment() {
        let mut storage = [0u32; 4];
        let mut pool: TestAllocator = BitmapAllocator::new(&mut storage, 128);

        assert_eq!(pool.alloc(0xf), Some(0));
        // (0xf + 1) % 0x10 == 0: the first free bit happens to qualify
        assert_eq!(pool.offset_align(0x10, 1, 1), Some(0xf));
    }

    #[test]
    fn test_sequential_fill() {
        let mut storage = [0u32; 2];
        let mut pool: TestAllocator = BitmapAllocator::new(&mut storage, 64);

        assert_eq!(pool.alloc(30), Some(0));
        assert_eq!(pool.alloc(30), Some(30));
        assert_eq!(pool.alloc(30), None);
        assert_eq!(pool.alloc(4), Some(60));
        assert_eq!(pool.alloc(1), None);
    }

    #[test]
    fn test_dealloc_and_reuse() {
        let mut storage = [0u32; 2];
        let mut pool: TestAllocator = BitmapAllocator::new(&mut storage, 64);

        assert_eq!(pool.alloc(16), Some(0));
        assert_eq!(pool.alloc(16), Some(16));
        pool.dealloc(4, 8);
        // The hole is first-fit for anything that fits it
        assert_eq!(pool.alloc(8), Some(4));
        assert_eq!(pool.alloc(8), Some(32));
    }

    #[test]
    fn test_exact_capacity() {
        let mut storage = [0u32; 1];
        let mut pool: TestAllocator = BitmapAllocator::new(&mut storage, 32);

        assert_eq!(pool.alloc(32), Some(0));
        assert_eq!(pool.alloc(1), None);
        pool.dealloc(0, 32);
        assert_eq!(pool.alloc(33), None);
        assert_eq!(pool.alloc(32), Some(0));
    }

    #[test]
    fn test_align_simple() {
        use crate::traits::Aligner;

        let mut storage = [0u32; 2];
        let mut pool: TestAllocator = BitmapAllocator::new(&mut storage, 64);

        assert_eq!(pool.alloc(3), Some(0));
        assert_eq!(pool.align(8, 4), Some(8));
        assert_eq!(pool.align(8, 4), Some(16));
        // Alignment 1 degrades to a plain allocation
        assert_eq!(pool.align(1, 1), Some(3));
    }

    #[test]
    fn test_preserves_foreign_bits() {
        let mut storage = [0xffff_ffffu32, 0xffff_ffff];
        {
            let mut pool: BitmapAllocator<u32, u64, u64> = BitmapAllocator::new(&mut storage, 40);
            assert_eq!(pool.alloc(40), Some(0));
            pool.dealloc(0, 40);
        }
        // Bits 40..64 were never owned and keep their values
        assert_eq!(storage[1] >> 8, 0xff_ffff);
    }

    #[test]
    fn test_offset_overflow_fails() {
        let mut storage = [0u32; 1];
        let mut pool: BitmapAllocator<u32, u8, u8> = BitmapAllocator::new(&mut storage, 32);

        // offset + index overflows the address type: fail, don't wrap
        assert_eq!(pool.offset_align(0x80, 0xff, 1), None);
    }

    #[test]
    fn test_zero_size() {
        let mut storage = [0u32; 1];
        let mut pool: TestAllocator = BitmapAllocator::new(&mut storage, 32);
        assert_eq!(pool.alloc(0), None);
        assert_eq!(pool.offset_align(8, 0, 0), None);
    }

    #[test]
    fn test_full_unit_skip() {
        let mut storage = [0u32; 4];
        let mut pool: TestAllocator = BitmapAllocator::new(&mut storage, 128);

        assert_eq!(pool.alloc(64), Some(0));
        // The first two units are solid ones; the scan skips them whole
        assert_eq!(pool.alloc(64), Some(64));
        assert_eq!(pool.alloc(1), None);
    }
}
