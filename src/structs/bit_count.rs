// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;

use crate::helpers::err_exit_code;
use crate::icompress_error::ExitCode;

use super::float_type::{Sample, UintBits};
use super::masked_array::{AxisSlice, MaskedArray};

/// entry i = number of valid elements whose bit i is 1
pub type BitCounts = Vec<u64>;

/// entry `[bit][a][b]` = number of valid adjacent pairs whose earlier
/// sample has bit value `a` and later sample `b` at that position
pub type PairCounts = Vec<[[u64; 2]; 2]>;

/// Count the 1-bits at each position across all valid elements.
pub fn bitcount<F: Sample>(a: &MaskedArray<F>) -> BitCounts {
    let w = F::Uint::BITS;
    let mut counts = vec![0u64; w as usize];

    for (b, slot) in counts.iter_mut().enumerate() {
        let mask = F::Uint::ONE << b as u32;
        let mut n = 0u64;
        for idx in 0..a.len() {
            if a.is_valid(idx) && (a.bits_at(idx) & mask) != F::Uint::ZERO {
                n += 1;
            }
        }
        *slot = n;
    }
    return counts;
}

/// Count the 2x2 contingency table of bit values between the two
/// equally-shaped views at every bit position. A pair contributes only
/// when both endpoints are valid, so the table total is the same for
/// every bit.
///
/// Each bit position is independent of all others, so the positions
/// are fanned out over `workers` scoped threads in fixed contiguous
/// ranges; the result is identical for any worker count.
pub fn bitpaircount<F: Sample>(
    a: &AxisSlice<'_, F>,
    b: &AxisSlice<'_, F>,
    workers: usize,
) -> Result<PairCounts> {
    if a.element_count() != b.element_count() {
        return err_exit_code(
            ExitCode::AssertionFailure,
            format!(
                "pair count views differ in size: {} vs {}",
                a.element_count(),
                b.element_count()
            ),
        );
    }

    let w = F::Uint::BITS as usize;
    let workers = workers.max(1).min(w);
    let mut table = vec![[[0u64; 2]; 2]; w];

    if workers == 1 {
        for (bit, cells) in table.iter_mut().enumerate() {
            *cells = count_bit(a, b, bit as u32);
        }
    } else {
        let per_worker = (w + workers - 1) / workers;
        std::thread::scope(|s| {
            for (wi, chunk) in table.chunks_mut(per_worker).enumerate() {
                let first_bit = wi * per_worker;
                s.spawn(move || {
                    for (j, cells) in chunk.iter_mut().enumerate() {
                        *cells = count_bit(a, b, (first_bit + j) as u32);
                    }
                });
            }
        });
    }

    return Ok(table);
}

fn count_bit<F: Sample>(a: &AxisSlice<'_, F>, b: &AxisSlice<'_, F>, bit: u32) -> [[u64; 2]; 2] {
    let mask = F::Uint::ONE << bit;
    let mut cells = [[0u64; 2]; 2];

    for ((abits, avalid), (bbits, bvalid)) in a.iter().zip(b.iter()) {
        if !(avalid && bvalid) {
            continue;
        }
        let ai = usize::from((abits & mask) != F::Uint::ZERO);
        let bi = usize::from((bbits & mask) != F::Uint::ZERO);
        cells[ai][bi] += 1;
    }
    return cells;
}
