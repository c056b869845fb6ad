//! Unsigned integer plumbing for the address and size type parameters.
//!
//! Engines are generic over an address type `A` and a size type `S`, where
//! `S` is no wider than `A`. [`UInt`] is the arithmetic surface they need;
//! it is implemented for the unsigned primitives by macro, the same way
//! `bit_field` implements its trait.

use core::fmt::Debug;
use core::ops::{Add, BitAnd, BitOr, Div, Mul, Not, Rem, Shl, Shr, Sub};

pub trait UInt:
    Copy
    + Ord
    + Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Rem<Output = Self>
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + Not<Output = Self>
    + Shl<u32, Output = Self>
    + Shr<u32, Output = Self>
{
    const ZERO: Self;
    const ONE: Self;
    const MAX: Self;
    const BITS: u32;

    /// Convert from `u64`. Panics in debug builds if the value does not fit.
    fn from_u64(value: u64) -> Self;

    fn to_u64(self) -> u64;

    fn checked_add(self, rhs: Self) -> Option<Self>;

    fn wrapping_add(self, rhs: Self) -> Self;

    fn leading_zeros(self) -> u32;

    fn is_power_of_two(self) -> bool;

    /// Widen (or same-width convert) from another unsigned type. Only valid
    /// when the value fits, which holds for every `S -> A` conversion in
    /// this crate.
    fn from_uint<T: UInt>(value: T) -> Self {
        Self::from_u64(value.to_u64())
    }

    /// Narrowing conversion; `None` if the value does not fit.
    fn try_from_uint<T: UInt>(value: T) -> Option<Self> {
        let raw = value.to_u64();
        if raw <= Self::MAX.to_u64() {
            Some(Self::from_u64(raw))
        } else {
            None
        }
    }

    /// Largest `n` with `2^n <= self`. The argument must be nonzero.
    fn log2_floor(self) -> u32 {
        debug_assert!(self > Self::ZERO);
        Self::BITS - 1 - self.leading_zeros()
    }

    /// Smallest `n` with `2^n >= self`. The argument must be nonzero.
    fn log2_ceil(self) -> u32 {
        debug_assert!(self > Self::ZERO);
        let floor = self.log2_floor();
        if self == Self::ONE << floor {
            floor
        } else {
            floor + 1
        }
    }

    /// Round up to the next multiple of `align` (any nonzero `align`).
    fn align_up(self, align: Self) -> Self {
        debug_assert!(align > Self::ZERO);
        let rem = self % align;
        if rem == Self::ZERO {
            self
        } else {
            self + (align - rem)
        }
    }

    /// `align_up` that fails instead of wrapping.
    fn checked_align_up(self, align: Self) -> Option<Self> {
        debug_assert!(align > Self::ZERO);
        let rem = self % align;
        if rem == Self::ZERO {
            Some(self)
        } else {
            self.checked_add(align - rem)
        }
    }
}

macro_rules! uint_impl {
    ($($t:ty),*) => {$(
        impl UInt for $t {
            const ZERO: Self = 0;
            const ONE: Self = 1;
            const MAX: Self = <$t>::MAX;
            const BITS: u32 = <$t>::BITS;

            #[inline]
            fn from_u64(value: u64) -> Self {
                debug_assert!(value <= <$t>::MAX as u64);
                value as $t
            }

            #[inline]
            fn to_u64(self) -> u64 {
                self as u64
            }

            #[inline]
            fn checked_add(self, rhs: Self) -> Option<Self> {
                <$t>::checked_add(self, rhs)
            }

            #[inline]
            fn wrapping_add(self, rhs: Self) -> Self {
                <$t>::wrapping_add(self, rhs)
            }

            #[inline]
            fn leading_zeros(self) -> u32 {
                <$t>::leading_zeros(self)
            }

            #[inline]
            fn is_power_of_two(self) -> bool {
                <$t>::is_power_of_two(self)
            }
        }
    )*};
}

uint_impl!(u8, u16, u32, u64, usize);
