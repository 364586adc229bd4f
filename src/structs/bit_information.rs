// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;

use crate::helpers::err_exit_code;
use crate::icompress_error::ExitCode;

use super::bit_count::bitpaircount;
use super::float_type::{Sample, UintBits};
use super::masked_array::MaskedArray;
use super::signed_exponent::signed_exponent;

/// Estimate the mutual information, in units of `log base`, between
/// each bit position of a sample and the same bit of its neighbour
/// along `axis`.
///
/// The two slices `[0, n-1)` and `[1, n)` along the axis are pair
/// counted into per-bit 2x2 tables; the tables become joint
/// probability masses and the usual `sum p*log(p/(pa*pb))` follows.
/// Cells or marginals of zero probability are skipped rather than fed
/// to the logarithm, and the final value is passed through `abs` to
/// damp tiny negative floating-point residue. Every entry of the
/// result lies in [0, 1] for base 2.
pub fn bitinformation<F: Sample>(
    x: &MaskedArray<F>,
    axis: usize,
    convert_exponent: bool,
    base: f64,
    workers: usize,
) -> Result<Vec<f64>> {
    if axis >= x.ndim() {
        return err_exit_code(
            ExitCode::ConfigError,
            format!("axis {} out of range for shape {:?}", axis, x.shape()),
        );
    }

    // biased exponents would fake information at the exponent bits,
    // so they are rewritten to sign-magnitude form exactly once here
    let converted;
    let xr = if convert_exponent {
        converted = signed_exponent(x);
        &converted
    } else {
        x
    };

    let w = F::Uint::BITS as usize;
    let n = xr.shape()[axis];
    if n < 2 {
        // no adjacent pairs to draw information from
        return Ok(vec![0.0; w]);
    }

    let a = xr.axis_slice(axis, 0, n - 1)?;
    let b = xr.axis_slice(axis, 1, n)?;
    let counts = bitpaircount(&a, &b, workers)?;

    let total = b.count() as f64;
    if total == 0.0 {
        return Ok(vec![0.0; w]);
    }

    let ln_base = base.ln();
    let mut info = Vec::with_capacity(w);

    for cells in &counts {
        let p: [[f64; 2]; 2] = [
            [cells[0][0] as f64 / total, cells[0][1] as f64 / total],
            [cells[1][0] as f64 / total, cells[1][1] as f64 / total],
        ];
        let pa = [p[0][0] + p[0][1], p[1][0] + p[1][1]];
        let pb = [p[0][0] + p[1][0], p[0][1] + p[1][1]];

        let mut mi = 0.0;
        for ai in 0..2 {
            for bi in 0..2 {
                let joint = p[ai][bi];
                if joint > 0.0 && pa[ai] > 0.0 && pb[bi] > 0.0 {
                    mi += joint * (joint / (pa[ai] * pb[bi])).ln();
                }
            }
        }
        info.push((mi / ln_base).abs());
    }

    return Ok(info);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::float_type::F16;

    fn constant_case<F: Sample>(value: F) {
        let arr = MaskedArray::new(vec![128], vec![value; 128]).unwrap();
        let bi = bitinformation(&arr, 0, true, 2.0, 1).unwrap();
        assert!(bi.iter().all(|&v| v == 0.0), "constant array leaked information");
    }

    #[test]
    fn constant_arrays_carry_no_information() {
        constant_case::<F16>(F16(0));
        constant_case::<f32>(1.0);
        constant_case::<f64>(std::f64::consts::PI);
    }

    #[test]
    fn information_is_bounded() {
        let data: Vec<f32> = (0..512u32)
            .map(|i| f32::from_bits(i.wrapping_mul(2654435761)))
            .collect();
        let arr = MaskedArray::new(vec![512], data).unwrap();
        let bi = bitinformation(&arr, 0, true, 2.0, 1).unwrap();
        assert!(bi.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn alternating_bit_is_fully_informative() {
        // patterns 0..256: the low bit of a sample determines the low
        // bit of its neighbour, so its mutual information is ~1 bit
        let data: Vec<f32> = (0..256u32).map(f32::from_bits).collect();
        let arr = MaskedArray::new(vec![256], data).unwrap();
        let bi = bitinformation(&arr, 0, false, 2.0, 1).unwrap();
        assert!(bi[0] > 0.9, "bit 0 information {} too low", bi[0]);
    }

    #[test]
    fn axis_out_of_range_is_rejected() {
        let arr = MaskedArray::new(vec![8], vec![0.0f32; 8]).unwrap();
        assert!(bitinformation(&arr, 1, true, 2.0, 1).is_err());
    }

    #[test]
    fn single_sample_axis_yields_zero_vector() {
        let arr = MaskedArray::new(vec![1], vec![5.0f32]).unwrap();
        let bi = bitinformation(&arr, 0, true, 2.0, 1).unwrap();
        assert_eq!(bi, vec![0.0; 32]);
    }

    #[test]
    fn second_axis_pairs_along_rows() {
        // 2x64 array, constant along axis 0, ramp along axis 1
        let mut data = Vec::new();
        for _ in 0..2 {
            data.extend((0..64u32).map(f32::from_bits));
        }
        let arr = MaskedArray::new(vec![2, 64], data).unwrap();
        let bi = bitinformation(&arr, 1, false, 2.0, 1).unwrap();
        assert!(bi[0] > 0.9);
    }
}
