// SPDX-License-Identifier: Apache-2.0

//! Bit masks for the supported float widths. All masks are built in
//! host order against the semantic IEEE layout; `storage_mask` applies
//! the byte-swap rule for arrays whose declared storage order is the
//! opposite of the host so that "bit i" always means the same bit of
//! the IEEE value.

use super::float_type::{ByteOrder, Sample, UintBits};

/// single 1 at the sign position
pub fn sign_mask<F: Sample>() -> F::Uint {
    F::Uint::ONE << (F::Uint::BITS - 1)
}

/// 1s across the exponent bits
pub fn exp_mask<F: Sample>() -> F::Uint {
    let (lo, hi) = F::FLOAT_TYPE.exp_bits();
    F::Uint::from_u64(((1u64 << (hi - lo)) - 1) << lo)
}

/// Mask of the sign bit and the whole exponent, mantissa zero. For the
/// three widths this is 0xFC00, 0xFF800000 and 0xFFF0000000000000.
/// Every quantiser keeps these bits.
pub fn sigexp_mask<F: Sample>() -> F::Uint {
    sign_mask::<F>() | exp_mask::<F>()
}

/// Mask of the top `nsb` mantissa bits, the `M - nsb` low bits clear.
/// `nsb` is clamped to the mantissa width.
pub fn man_mask<F: Sample>(nsb: u32) -> F::Uint {
    let (lo, hi) = F::FLOAT_TYPE.man_bits();
    let m = hi - lo;
    let nsb = nsb.min(m);
    if nsb == 0 {
        return F::Uint::ZERO;
    }
    F::Uint::from_u64(((1u64 << nsb) - 1) << (lo + m - nsb))
}

/// The bit-groom constant: alternating 1,0,1,0 from the most
/// significant bit of the uint (0xAAAA...). And-ed with the complement
/// of a keep mask it yields the groom fill for the discarded bits.
pub fn groom_mask<F: Sample>() -> F::Uint {
    F::Uint::from_u64(0xAAAA_AAAA_AAAA_AAAAu64 >> (64 - F::Uint::BITS))
}

/// Translate a semantic mask into the mask to apply to raw storage:
/// byte-swapped when the declared order is foreign to the host.
pub fn storage_mask<U: UintBits>(mask: U, order: ByteOrder) -> U {
    if order.is_foreign() {
        mask.swap_bytes()
    } else {
        mask
    }
}
