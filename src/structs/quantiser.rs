// SPDX-License-Identifier: Apache-2.0

use std::ops::Range;

use anyhow::Result;
use log::debug;

use crate::helpers::err_exit_code;
use crate::icompress_error::ExitCode;

use super::analysis::VariableAnalysis;
use super::bit_masks::{groom_mask, man_mask, sigexp_mask, sign_mask, storage_mask};
use super::float_type::{ByteOrder, Sample, UintBits};
use super::keep_bits::{binom_confidence, keepbits, ThresholdPolicy};
use super::masked_array::{for_each_flat_in_axis_range, MaskedArray};

/// The four mask transforms. A fixed closed set; dispatch is chosen
/// once per variable at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantiseMethod {
    /// zero the discarded low mantissa bits (round towards zero)
    BitShave,
    /// set the discarded low mantissa bits (round away from zero)
    BitSet,
    /// alternate the discarded bits 1010... to avoid directional bias
    BitGroom,
    /// keep only the mantissa bits individually judged informative
    BitMask,
}

impl QuantiseMethod {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "bitshave" => Ok(QuantiseMethod::BitShave),
            "bitset" => Ok(QuantiseMethod::BitSet),
            "bitgroom" => Ok(QuantiseMethod::BitGroom),
            "bitmask" => Ok(QuantiseMethod::BitMask),
            _ => err_exit_code(
                ExitCode::ConfigError,
                format!("unknown bit manipulation method: {}", name),
            ),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            QuantiseMethod::BitShave => "bitshave",
            QuantiseMethod::BitSet => "bitset",
            QuantiseMethod::BitGroom => "bitgroom",
            QuantiseMethod::BitMask => "bitmask",
        }
    }
}

/// An immutable mask transform for one variable. Built once from the
/// dtype and either an explicit bit count or an analysis record, then
/// applied to any number of equally-typed chunks.
#[derive(Debug)]
pub struct Quantiser<F: Sample> {
    method: QuantiseMethod,
    keep_mask: F::Uint,
    fill_mask: F::Uint,
    nsb: u32,
}

impl<F: Sample> Quantiser<F> {
    /// Build a shave/set/groom quantiser that keeps `nsb` mantissa
    /// bits. The mask method carries no meaningful NSB on its own and
    /// is refused here; it needs an analysis record.
    pub fn from_nsb(method: QuantiseMethod, nsb: u32) -> Result<Self> {
        if method == QuantiseMethod::BitMask {
            return err_exit_code(
                ExitCode::ConfigError,
                "bitmask requires an analysis record, not a bit count",
            );
        }
        let (mlo, mhi) = F::FLOAT_TYPE.man_bits();
        let nsb = nsb.min(mhi - mlo);
        let keep_mask = sigexp_mask::<F>() | man_mask::<F>(nsb);
        let fill_mask = match method {
            QuantiseMethod::BitGroom => groom_mask::<F>() & !keep_mask,
            _ => F::Uint::ZERO,
        };
        Ok(Quantiser {
            method,
            keep_mask,
            fill_mask,
            nsb,
        })
    }

    /// Build a quantiser from an analysis record: the retain-bits
    /// override wins, otherwise keep-bits decides from the information
    /// vector. The record must describe this dtype.
    pub fn from_analysis(
        method: QuantiseMethod,
        record: &VariableAnalysis,
        ci: f64,
        policy: ThresholdPolicy,
    ) -> Result<Self> {
        record.validate()?;
        let ft = record.float_type()?;
        if ft != F::FLOAT_TYPE {
            return err_exit_code(
                ExitCode::UnsupportedType,
                format!(
                    "analysis record is for {} but the data is {}",
                    ft.name(),
                    F::FLOAT_TYPE.name()
                ),
            );
        }

        if method == QuantiseMethod::BitMask {
            return Self::from_bit_information(record, ci);
        }

        let nsb = match record.retainbits {
            Some(n) => n,
            None => keepbits(&record.bitinfo, record.manbit, record.elements, ci, policy),
        };
        let q = Self::from_nsb(method, nsb)?;
        debug!(
            "{} quantiser: keepbits {}, mask {:#x}",
            method.name(),
            q.nsb,
            q.keep_mask.to_u64()
        );
        Ok(q)
    }

    /// The mask method: each mantissa bit is kept only if its
    /// information is significantly different from zero at the given
    /// confidence.
    fn from_bit_information(record: &VariableAnalysis, ci: f64) -> Result<Self> {
        let threshold = binom_confidence(record.elements, ci) - 0.5;
        let (mlo, mhi) = record.manbit;

        let mut mask = F::Uint::ZERO;
        let mut nsb = 0;
        for bit in mlo..mhi {
            if record.bitinfo[bit as usize] > threshold {
                mask = mask | (F::Uint::ONE << bit);
                nsb += 1;
            }
        }
        Ok(Quantiser {
            method: QuantiseMethod::BitMask,
            keep_mask: mask | sigexp_mask::<F>(),
            fill_mask: F::Uint::ZERO,
            nsb,
        })
    }

    pub fn method(&self) -> QuantiseMethod {
        self.method
    }

    /// number of retained mantissa bits
    pub fn nsb(&self) -> u32 {
        self.nsb
    }

    /// the semantic keep mask, for compression-history annotation
    pub fn mask(&self) -> F::Uint {
        self.keep_mask
    }

    pub fn groom_fill(&self) -> F::Uint {
        self.fill_mask
    }

    /// the mask as it applies to raw storage of the given byte order
    pub fn mask_for_storage(&self, order: ByteOrder) -> F::Uint {
        storage_mask(self.keep_mask, order)
    }

    #[inline(always)]
    fn apply(&self, v: F::Uint) -> F::Uint {
        match self.method {
            QuantiseMethod::BitShave | QuantiseMethod::BitMask => v & self.keep_mask,
            QuantiseMethod::BitSet => v | !self.keep_mask,
            QuantiseMethod::BitGroom => {
                // exact zero stays zero, grooming would turn it into
                // a small spurious value
                if v & !sign_mask::<F>() == F::Uint::ZERO {
                    v
                } else {
                    (v & self.keep_mask) | self.fill_mask
                }
            }
        }
    }

    /// Quantise the whole array in place on its unsigned view.
    pub fn process(&self, arr: &mut MaskedArray<F>) {
        let foreign = arr.byte_order().is_foreign();
        for v in arr.uint_view_mut() {
            *v = swap_apply(self, *v, foreign);
        }
    }

    /// Quantise only the elements whose coordinate along `axis` falls
    /// in `range`. This is the chunk granularity the compressor
    /// streams at.
    pub fn process_axis_range(&self, arr: &mut MaskedArray<F>, axis: usize, range: Range<usize>) {
        let foreign = arr.byte_order().is_foreign();
        let shape = arr.shape().to_vec();
        let view = arr.uint_view_mut();
        for_each_flat_in_axis_range(&shape, axis, range, |idx| {
            view[idx] = swap_apply(self, view[idx], foreign);
        });
    }
}

#[inline(always)]
fn swap_apply<F: Sample>(q: &Quantiser<F>, stored: F::Uint, foreign: bool) -> F::Uint {
    if foreign {
        q.apply(stored.swap_bytes()).swap_bytes()
    } else {
        q.apply(stored)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::structs::float_type::F16;

    fn f32_record(bitinfo: Vec<f64>, elements: u64, retainbits: Option<u32>) -> VariableAnalysis {
        VariableAnalysis {
            type_name: "float32".to_string(),
            itemsize: 4,
            byteorder: "=".to_string(),
            signbit: 31,
            manbit: (0, 23),
            expbit: (23, 31),
            elements,
            bitinfo,
            time_start: None,
            time_end: None,
            level: None,
            axis: Some(0),
            retainbits,
        }
    }

    fn quantise_one<F: Sample>(q: &Quantiser<F>, x: F) -> F::Uint {
        let mut arr = MaskedArray::new(vec![1], vec![x]).unwrap();
        q.process(&mut arr);
        arr.bits_at(0)
    }

    #[test]
    fn method_names_parse_both_ways() {
        for name in ["bitshave", "bitset", "bitgroom", "bitmask"] {
            assert_eq!(QuantiseMethod::parse(name).unwrap().name(), name);
        }
        assert!(QuantiseMethod::parse("bitchop").is_err());
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(11)]
    #[case(23)]
    fn shave_touches_only_discarded_bits(#[case] nsb: u32) {
        let q = Quantiser::<f32>::from_nsb(QuantiseMethod::BitShave, nsb).unwrap();
        let x = -456.789f32;
        let out = quantise_one(&q, x);
        let discard = !(sigexp_mask::<f32>() | man_mask::<f32>(nsb));
        assert_eq!(out & discard, 0);
        assert_eq!(out & !discard, x.to_bits() & !discard);
    }

    #[rstest]
    #[case(0)]
    #[case(7)]
    #[case(23)]
    fn set_fills_discarded_bits_with_ones(#[case] nsb: u32) {
        let q = Quantiser::<f32>::from_nsb(QuantiseMethod::BitSet, nsb).unwrap();
        let x = 456.789f32;
        let out = quantise_one(&q, x);
        let discard = !(sigexp_mask::<f32>() | man_mask::<f32>(nsb));
        assert_eq!(out & discard, discard);
        assert_eq!(out & !discard, x.to_bits() & !discard);
    }

    #[rstest]
    #[case(0)]
    #[case(6)]
    #[case(22)]
    fn groom_alternates_discarded_bits(#[case] nsb: u32) {
        let q = Quantiser::<f32>::from_nsb(QuantiseMethod::BitGroom, nsb).unwrap();
        let x = 456.789f32;
        let out = quantise_one(&q, x);
        let discard = !(sigexp_mask::<f32>() | man_mask::<f32>(nsb));
        assert_eq!(out & discard, 0xAAAA_AAAAu32 & discard);
        assert_eq!(out & !discard, x.to_bits() & !discard);
    }

    #[test]
    fn groom_leaves_exact_zero_alone() {
        let q = Quantiser::<f32>::from_nsb(QuantiseMethod::BitGroom, 4).unwrap();
        assert_eq!(quantise_one(&q, 0.0f32), 0.0f32.to_bits());
        assert_eq!(quantise_one(&q, -0.0f32), (-0.0f32).to_bits());
        // but a nonzero value is groomed
        assert_ne!(quantise_one(&q, 1.0f32), 1.0f32.to_bits());
    }

    #[test]
    fn shave_is_idempotent() {
        let q = Quantiser::<f64>::from_nsb(QuantiseMethod::BitShave, 13).unwrap();
        let once = quantise_one(&q, 987.654321f64);
        let mut arr = MaskedArray::new(vec![1], vec![f64::from_bits(once)]).unwrap();
        q.process(&mut arr);
        assert_eq!(arr.bits_at(0), once);
    }

    #[test]
    fn shave_error_shrinks_as_nsb_grows() {
        let x = 7.0f32 / 3.0;
        let mut last = f64::INFINITY;
        for nsb in 0..=23 {
            let q = Quantiser::<f32>::from_nsb(QuantiseMethod::BitShave, nsb).unwrap();
            let y = f32::from_bits(quantise_one(&q, x));
            let err = ((x - y).abs() / x.abs()) as f64;
            assert!(err <= last, "error grew at nsb {}", nsb);
            assert!(err <= (2.0f64).powi(-(nsb as i32)));
            last = err;
        }
    }

    #[test]
    fn half_precision_masks_are_width_correct() {
        let q = Quantiser::<F16>::from_nsb(QuantiseMethod::BitShave, 3).unwrap();
        // 0x3DFF: exponent 01111, mantissa 0111111111 -> low 7 cleared
        assert_eq!(quantise_one(&q, F16(0x3DFF)), 0x3D80);
        assert_eq!(q.mask(), 0xFC00u16 | 0b111_0000000u16);
    }

    #[test]
    fn nsb_from_analysis_obeys_retainbits_override() {
        let rec = f32_record(vec![0.0; 32], 1000, Some(9));
        let q = Quantiser::<f32>::from_analysis(
            QuantiseMethod::BitShave,
            &rec,
            0.99,
            ThresholdPolicy::FreeEntropy,
        )
        .unwrap();
        assert_eq!(q.nsb(), 9);
    }

    #[test]
    fn nsb_from_analysis_degenerates_to_zero_on_noise() {
        let rec = f32_record(vec![0.0; 32], 1000, None);
        let q = Quantiser::<f32>::from_analysis(
            QuantiseMethod::BitShave,
            &rec,
            0.99,
            ThresholdPolicy::FreeEntropy,
        )
        .unwrap();
        assert_eq!(q.nsb(), 0);
        assert_eq!(q.mask(), sigexp_mask::<f32>());
    }

    #[test]
    fn mask_method_keeps_individually_informative_bits() {
        let mut bitinfo = vec![0.0; 32];
        bitinfo[22] = 0.9;
        bitinfo[20] = 0.8;
        bitinfo[3] = 0.7; // informative but low in the mantissa
        let rec = f32_record(bitinfo, 100_000, None);
        let q = Quantiser::<f32>::from_analysis(
            QuantiseMethod::BitMask,
            &rec,
            0.99,
            ThresholdPolicy::FreeEntropy,
        )
        .unwrap();
        assert_eq!(q.nsb(), 3);
        let expect = sigexp_mask::<f32>() | (1 << 22) | (1 << 20) | (1 << 3);
        assert_eq!(q.mask(), expect);

        // only mantissa-range bits are eligible, sign/exponent always kept
        let x = -456.789f32;
        let out = quantise_one(&q, x);
        assert_eq!(out & sigexp_mask::<f32>(), x.to_bits() & sigexp_mask::<f32>());
    }

    #[test]
    fn mask_method_requires_analysis() {
        assert!(Quantiser::<f32>::from_nsb(QuantiseMethod::BitMask, 5).is_err());
    }

    #[test]
    fn record_for_wrong_dtype_is_rejected() {
        let rec = f32_record(vec![0.0; 32], 1000, None);
        let err = Quantiser::<f64>::from_analysis(
            QuantiseMethod::BitShave,
            &rec,
            0.99,
            ThresholdPolicy::FreeEntropy,
        )
        .unwrap_err();
        let ic = err
            .downcast_ref::<crate::icompress_error::ICompressError>()
            .unwrap();
        assert_eq!(ic.exit_code, ExitCode::UnsupportedType);
    }

    #[test]
    fn foreign_storage_is_quantised_by_semantic_bits() {
        let foreign_order = if cfg!(target_endian = "little") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        };
        let x = 456.789f32;
        let q = Quantiser::<f32>::from_nsb(QuantiseMethod::BitShave, 5).unwrap();

        let mut native = MaskedArray::new(vec![1], vec![x]).unwrap();
        q.process(&mut native);

        let mut swapped = MaskedArray::new(vec![1], vec![f32::from_bits(x.to_bits().swap_bytes())])
            .unwrap()
            .with_byte_order(foreign_order);
        q.process(&mut swapped);

        // identical semantic result, byte-swapped storage mask
        assert_eq!(swapped.bits_at(0), native.bits_at(0));
        assert_eq!(q.mask_for_storage(foreign_order), q.mask().swap_bytes());
    }

    #[test]
    fn chunked_processing_covers_exactly_the_range() {
        let data: Vec<f32> = (0..12).map(|i| 1.5 + i as f32).collect();
        let mut arr = MaskedArray::new(vec![4, 3], data.clone()).unwrap();
        let q = Quantiser::<f32>::from_nsb(QuantiseMethod::BitSet, 2).unwrap();

        q.process_axis_range(&mut arr, 0, 1..3);
        for row in 0..4 {
            for col in 0..3 {
                let idx = row * 3 + col;
                let original = data[idx].to_bits();
                if (1..3).contains(&row) {
                    assert_ne!(arr.bits_at(idx), original);
                } else {
                    assert_eq!(arr.bits_at(idx), original);
                }
            }
        }
    }
}
