/*!
 * Interlocked Operations
 *
 * Indivisible read-modify-write primitives over machine words.
 *
 * Every operation uses `SeqCst` ordering so all interlocked operations are
 * observed in one total order by every thread. None of them block.
 */

use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering};

mod sealed {
    pub trait Sealed {}
}

/// Atomic machine word usable with the interlocked functions
///
/// Sealed: implemented for `AtomicU32`, `AtomicU64`, `AtomicUsize`,
/// `AtomicI32` and `AtomicI64`.
pub trait InterlockedWord: sealed::Sealed + Send + Sync {
    type Value: Copy + Eq + fmt::Debug;

    /// Width of the word in bits
    const BITS: u32;

    #[doc(hidden)]
    fn cas_word(&self, comparand: Self::Value, exchange: Self::Value) -> Self::Value;
    #[doc(hidden)]
    fn swap_word(&self, value: Self::Value) -> Self::Value;
    #[doc(hidden)]
    fn add_word(&self, value: Self::Value) -> Self::Value;
    #[doc(hidden)]
    fn sub_word(&self, value: Self::Value) -> Self::Value;
    #[doc(hidden)]
    fn and_word(&self, value: Self::Value) -> Self::Value;
    #[doc(hidden)]
    fn or_word(&self, value: Self::Value) -> Self::Value;
    #[doc(hidden)]
    fn xor_word(&self, value: Self::Value) -> Self::Value;
    #[doc(hidden)]
    fn one() -> Self::Value;
    #[doc(hidden)]
    fn wrapping_add(a: Self::Value, b: Self::Value) -> Self::Value;
    #[doc(hidden)]
    fn wrapping_sub(a: Self::Value, b: Self::Value) -> Self::Value;
    #[doc(hidden)]
    fn mask(bit: u32) -> Self::Value;
    #[doc(hidden)]
    fn not(value: Self::Value) -> Self::Value;
    #[doc(hidden)]
    fn has_bits(value: Self::Value, mask: Self::Value) -> bool;
}

macro_rules! impl_interlocked_word {
    ($atomic:ty, $value:ty) => {
        impl sealed::Sealed for $atomic {}

        impl InterlockedWord for $atomic {
            type Value = $value;
            const BITS: u32 = <$value>::BITS;

            #[inline(always)]
            fn cas_word(&self, comparand: $value, exchange: $value) -> $value {
                match self.compare_exchange(comparand, exchange, Ordering::SeqCst, Ordering::SeqCst) {
                    Ok(previous) | Err(previous) => previous,
                }
            }

            #[inline(always)]
            fn swap_word(&self, value: $value) -> $value {
                self.swap(value, Ordering::SeqCst)
            }

            #[inline(always)]
            fn add_word(&self, value: $value) -> $value {
                self.fetch_add(value, Ordering::SeqCst)
            }

            #[inline(always)]
            fn sub_word(&self, value: $value) -> $value {
                self.fetch_sub(value, Ordering::SeqCst)
            }

            #[inline(always)]
            fn and_word(&self, value: $value) -> $value {
                self.fetch_and(value, Ordering::SeqCst)
            }

            #[inline(always)]
            fn or_word(&self, value: $value) -> $value {
                self.fetch_or(value, Ordering::SeqCst)
            }

            #[inline(always)]
            fn xor_word(&self, value: $value) -> $value {
                self.fetch_xor(value, Ordering::SeqCst)
            }

            #[inline(always)]
            fn one() -> $value {
                1
            }

            #[inline(always)]
            fn wrapping_add(a: $value, b: $value) -> $value {
                a.wrapping_add(b)
            }

            #[inline(always)]
            fn wrapping_sub(a: $value, b: $value) -> $value {
                a.wrapping_sub(b)
            }

            #[inline(always)]
            fn mask(bit: u32) -> $value {
                (1 as $value) << bit
            }

            #[inline(always)]
            fn not(value: $value) -> $value {
                !value
            }

            #[inline(always)]
            fn has_bits(value: $value, mask: $value) -> bool {
                value & mask != 0
            }
        }
    };
}

impl_interlocked_word!(AtomicU32, u32);
impl_interlocked_word!(AtomicU64, u64);
impl_interlocked_word!(AtomicUsize, usize);
impl_interlocked_word!(AtomicI32, i32);
impl_interlocked_word!(AtomicI64, i64);

#[inline(always)]
fn checked_mask<W: InterlockedWord>(bit: u32) -> W::Value {
    assert!(
        bit < W::BITS,
        "bit index {} out of range for {}-bit word",
        bit,
        W::BITS
    );
    W::mask(bit)
}

/// Store `exchange` if the word equals `comparand`
///
/// Returns the value observed before the operation whether or not the
/// exchange happened; the exchange succeeded iff the result equals
/// `comparand`.
#[inline]
pub fn compare_exchange<W: InterlockedWord>(
    target: &W,
    exchange: W::Value,
    comparand: W::Value,
) -> W::Value {
    target.cas_word(comparand, exchange)
}

/// Atomically add one, returning the new value (wrapping)
#[inline]
pub fn increment<W: InterlockedWord>(target: &W) -> W::Value {
    W::wrapping_add(target.add_word(W::one()), W::one())
}

/// Atomically subtract one, returning the new value (wrapping)
#[inline]
pub fn decrement<W: InterlockedWord>(target: &W) -> W::Value {
    W::wrapping_sub(target.sub_word(W::one()), W::one())
}

/// Store `value`, returning the previous value
#[inline]
pub fn exchange<W: InterlockedWord>(target: &W, value: W::Value) -> W::Value {
    target.swap_word(value)
}

/// Add `value`, returning the previous value (wrapping)
#[inline]
pub fn exchange_add<W: InterlockedWord>(target: &W, value: W::Value) -> W::Value {
    target.add_word(value)
}

/// Bitwise AND, returning the previous value
#[inline]
pub fn and<W: InterlockedWord>(target: &W, value: W::Value) -> W::Value {
    target.and_word(value)
}

/// Bitwise OR, returning the previous value
#[inline]
pub fn or<W: InterlockedWord>(target: &W, value: W::Value) -> W::Value {
    target.or_word(value)
}

/// Set bit `bit`, returning whether it was already set
///
/// # Panics
///
/// If `bit` is not below the word width.
#[inline]
pub fn bit_test_and_set<W: InterlockedWord>(target: &W, bit: u32) -> bool {
    let mask = checked_mask::<W>(bit);
    W::has_bits(target.or_word(mask), mask)
}

/// Clear bit `bit`, returning whether it was set
#[inline]
pub fn bit_test_and_reset<W: InterlockedWord>(target: &W, bit: u32) -> bool {
    let mask = checked_mask::<W>(bit);
    W::has_bits(target.and_word(W::not(mask)), mask)
}

/// Flip bit `bit`, returning its previous value
#[inline]
pub fn bit_test_and_complement<W: InterlockedWord>(target: &W, bit: u32) -> bool {
    let mask = checked_mask::<W>(bit);
    W::has_bits(target.xor_word(mask), mask)
}
