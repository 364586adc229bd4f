// SPDX-License-Identifier: Apache-2.0

use super::float_type::{Sample, UintBits};
use super::masked_array::MaskedArray;

/// Shannon entropy `-sum p * log_b(p)` over the given probabilities.
/// Entries outside (0, 1) contribute nothing, so exact zeros and ones
/// never feed `log(0)` into the sum.
pub fn entropy(p: &[f64], base: f64) -> f64 {
    let mut h = 0.0;
    for &v in p {
        if v > 0.0 && v < 1.0 {
            h += v * v.ln();
        }
    }
    return -h / base.ln();
}

/// Entropy of the distribution of whole bit patterns in an array:
/// sort the valid patterns and accumulate run-length probabilities.
pub fn bitentropy<F: Sample>(a: &MaskedArray<F>, base: f64) -> f64 {
    let mut patterns: Vec<u64> = (0..a.len())
        .filter(|&i| a.is_valid(i))
        .map(|i| a.bits_at(i).to_u64())
        .collect();
    if patterns.is_empty() {
        return 0.0;
    }
    patterns.sort_unstable();

    let n = patterns.len() as f64;
    let mut e = 0.0;
    let mut run = 1.0;

    for x in 1..patterns.len() {
        if patterns[x] == patterns[x - 1] {
            run += 1.0;
        } else {
            let p = run / n;
            e -= p * p.ln();
            run = 1.0;
        }
    }
    // close out the final run
    let p = run / n;
    e -= p * p.ln();

    return e / base.ln();
}
