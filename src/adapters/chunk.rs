//! Natural-chunk rounding.
//!
//! Every size is rounded up to a fixed chunk before reaching the inner
//! engine, so everything the engine tracks stays chunk-granular. Stacked
//! under a size-header adapter this gives a malloc back end with natural
//! alignment.

use crate::num::UInt;
use crate::traits::{Aligner, Allocator, OffsetAligner};

pub struct Chunked<E, S> {
    inner: E,
    chunk: S,
}

impl<E, S: UInt> Chunked<E, S> {
    pub fn new(inner: E, chunk: S) -> Chunked<E, S> {
        assert!(chunk > S::ZERO);
        Chunked { inner, chunk }
    }

    pub fn chunk_size(&self) -> S {
        self.chunk
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    fn round(&self, size: S) -> Option<S> {
        size.checked_align_up(self.chunk)
    }
}

impl<E: Allocator<A, S>, A: UInt, S: UInt> Allocator<A, S> for Chunked<E, S> {
    fn alloc(&mut self, size: S) -> Option<A> {
        self.inner.alloc(self.round(size)?)
    }

    fn dealloc(&mut self, addr: A, size: S) {
        debug_assert!(addr % A::from_uint(self.chunk) == A::ZERO);
        let rounded = self.round(size).expect("size rounding overflowed");
        self.inner.dealloc(addr, rounded);
    }
}

impl<E: Aligner<A, S>, A: UInt, S: UInt> Aligner<A, S> for Chunked<E, S> {
    fn align(&mut self, align: A, size: S) -> Option<A> {
        if align <= A::from_uint(self.chunk) {
            self.alloc(size)
        } else {
            self.inner.align(align, self.round(size)?)
        }
    }
}

impl<E: OffsetAligner<A, S>, A: UInt, S: UInt> OffsetAligner<A, S> for Chunked<E, S> {
    fn offset_align(&mut self, align: A, offset: A, size: S) -> Option<A> {
        if offset % A::from_uint(self.chunk) != A::ZERO {
            // Such a phase can never land on a chunk boundary
            return None;
        }
        if align <= A::from_uint(self.chunk) {
            self.alloc(size)
        } else {
            self.inner.offset_align(align, offset, self.round(size)?)
        }
    }
}
