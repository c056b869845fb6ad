//! A bounded cache of fixed-size allocations.
//!
//! Popping and pushing the stack is O(1) and never touches the source
//! allocator; [`apply_buffer`](BufferedStack::apply_buffer) refills or
//! drains it back to its soft bounds between bursts. A dealloc that
//! arrives while the stack is full is handed to the overflow callback,
//! which decides the fate of the span.

use arrayvec::ArrayVec;

use crate::num::UInt;
use crate::traits::Allocator;

pub struct BufferedStack<A, S, E, F, const CAP: usize> {
    source: E,
    cache: ArrayVec<A, CAP>,
    soft_min: usize,
    soft_max: usize,
    object_size: S,
    on_overflow: F,
}

impl<A, S, E, F, const CAP: usize> BufferedStack<A, S, E, F, CAP>
where
    A: UInt,
    S: UInt,
    E: Allocator<A, S>,
    F: FnMut(A, S),
{
    /// Cache objects of exactly `object_size` units drawn from `source`,
    /// aiming to hold between `soft_min` and `soft_max` of them.
    pub fn new(
        source: E,
        soft_min: usize,
        soft_max: usize,
        object_size: S,
        on_overflow: F,
    ) -> BufferedStack<A, S, E, F, CAP> {
        assert!(soft_min <= soft_max && soft_max <= CAP);
        assert!(object_size > S::ZERO);
        BufferedStack {
            source,
            cache: ArrayVec::new(),
            soft_min,
            soft_max,
            object_size,
            on_overflow,
        }
    }

    /// Pop a cached object. Fails when the stack is empty or `size`
    /// exceeds the object size.
    pub fn alloc(&mut self, size: S) -> Option<A> {
        if size > self.object_size {
            return None;
        }
        self.cache.pop()
    }

    /// Push an object back. When the stack is full the overflow callback
    /// takes the span instead.
    pub fn dealloc(&mut self, addr: A, size: S) {
        assert!(size <= self.object_size);
        if self.cache.is_full() {
            (self.on_overflow)(addr, size);
        } else {
            self.cache.push(addr);
        }
    }

    /// Refill up to the soft minimum and drain down to the soft maximum.
    /// `false` if the source ran dry while refilling.
    pub fn apply_buffer(&mut self) -> bool {
        while self.cache.len() < self.soft_min {
            match self.source.alloc(self.object_size) {
                Some(addr) => self.cache.push(addr),
                None => return false,
            }
        }
        while self.cache.len() > self.soft_max {
            let addr = self.cache.pop().unwrap();
            self.source.dealloc(addr, self.object_size);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn object_size(&self) -> S {
        self.object_size
    }
}

impl<A, S, E, F, const CAP: usize> Allocator<A, S> for BufferedStack<A, S, E, F, CAP>
where
    A: UInt,
    S: UInt,
    E: Allocator<A, S>,
    F: FnMut(A, S),
{
    fn alloc(&mut self, size: S) -> Option<A> {
        BufferedStack::alloc(self, size)
    }

    fn dealloc(&mut self, addr: A, size: S) {
        BufferedStack::dealloc(self, addr, size)
    }
}

#[cfg(test)]
mod tests {
    use super::BufferedStack;
    use crate::bitmap_alloc::BitmapAllocator;

    #[test]
    fn test_refill_and_drain() {
        let mut storage = [0u32; 1];
        let source: BitmapAllocator<u32, u64, u64> = BitmapAllocator::new(&mut storage, 32);
        let mut stack: BufferedStack<u64, u64, _, _, 8> =
            BufferedStack::new(source, 2, 6, 4, |_, _| {});

        assert!(stack.is_empty());
        assert!(stack.apply_buffer());
        assert_eq!(stack.len(), 2);

        let a = stack.alloc(4).unwrap();
        let b = stack.alloc(4).unwrap();
        assert_ne!(a, b);
        assert_eq!(stack.alloc(4), None);

        // Oversize requests never pop
        stack.dealloc(a, 4);
        assert_eq!(stack.alloc(8), None);
        assert_eq!(stack.alloc(4), Some(a));

        stack.dealloc(a, 4);
        stack.dealloc(b, 4);
        assert!(stack.apply_buffer());
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_drain_to_soft_max() {
        let mut storage = [0u32; 1];
        let source: BitmapAllocator<u32, u64, u64> = BitmapAllocator::new(&mut storage, 32);
        let mut stack: BufferedStack<u64, u64, _, _, 8> =
            BufferedStack::new(source, 0, 1, 4, |_, _| {});

        for addr in [0u64, 4, 8, 12] {
            stack.dealloc(addr, 4);
        }
        assert_eq!(stack.len(), 4);
        assert!(stack.apply_buffer());
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_overflow_callback() {
        use core::sync::atomic::{AtomicU64, Ordering};
        static OVERFLOWED: AtomicU64 = AtomicU64::new(u64::MAX);

        let mut storage = [0u32; 1];
        let source: BitmapAllocator<u32, u64, u64> = BitmapAllocator::new(&mut storage, 32);
        let mut stack: BufferedStack<u64, u64, _, _, 2> =
            BufferedStack::new(source, 0, 2, 4, |addr, _| {
                OVERFLOWED.store(addr, Ordering::Relaxed);
            });

        stack.dealloc(0, 4);
        stack.dealloc(4, 4);
        assert_eq!(OVERFLOWED.load(Ordering::Relaxed), u64::MAX);
        stack.dealloc(8, 4);
        assert_eq!(OVERFLOWED.load(Ordering::Relaxed), 8);
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_source_exhaustion() {
        let mut storage = [0u32; 1];
        let source: BitmapAllocator<u32, u64, u64> = BitmapAllocator::new(&mut storage, 8);
        let mut stack: BufferedStack<u64, u64, _, _, 8> =
            BufferedStack::new(source, 4, 8, 4, |_, _| {});

        // Only two 4-unit objects exist in an 8-bit pool
        assert!(!stack.apply_buffer());
        assert_eq!(stack.len(), 2);
    }
}
