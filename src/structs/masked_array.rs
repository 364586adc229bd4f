// SPDX-License-Identifier: Apache-2.0

use std::ops::Range;

use anyhow::Result;

use crate::helpers::err_exit_code;
use crate::icompress_error::ExitCode;

use super::float_type::{ByteOrder, Sample, UintBits};

/// An N-dimensional row-major array plus an optional parallel validity
/// map. Invalid elements are excluded from every count and entropy.
/// The declared byte order describes the storage of `data`; all bit
/// accessors report semantic (host order) IEEE bits regardless.
#[derive(Debug, Clone)]
pub struct MaskedArray<T> {
    shape: Vec<usize>,
    data: Vec<T>,
    valid: Option<Vec<bool>>,
    byteorder: ByteOrder,
}

impl<T: Copy> MaskedArray<T> {
    pub fn new(shape: Vec<usize>, data: Vec<T>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return err_exit_code(
                ExitCode::AssertionFailure,
                format!(
                    "shape {:?} needs {} elements, got {}",
                    shape,
                    expected,
                    data.len()
                ),
            );
        }
        Ok(MaskedArray {
            shape,
            data,
            valid: None,
            byteorder: ByteOrder::Native,
        })
    }

    pub fn with_validity(shape: Vec<usize>, data: Vec<T>, valid: Vec<bool>) -> Result<Self> {
        if valid.len() != data.len() {
            return err_exit_code(
                ExitCode::AssertionFailure,
                format!(
                    "validity map has {} entries for {} elements",
                    valid.len(),
                    data.len()
                ),
            );
        }
        let mut arr = Self::new(shape, data)?;
        arr.valid = Some(valid);
        Ok(arr)
    }

    pub fn with_byte_order(mut self, byteorder: ByteOrder) -> Self {
        self.byteorder = byteorder;
        self
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byteorder
    }

    pub fn values(&self) -> &[T] {
        &self.data
    }

    pub fn validity(&self) -> Option<&[bool]> {
        self.valid.as_deref()
    }

    #[inline(always)]
    pub fn is_valid(&self, idx: usize) -> bool {
        match &self.valid {
            Some(v) => v[idx],
            None => true,
        }
    }

    /// number of valid elements
    pub fn count(&self) -> u64 {
        match &self.valid {
            Some(v) => v.iter().filter(|x| **x).count() as u64,
            None => self.data.len() as u64,
        }
    }

    /// Copy out a rectangular sub-array. One range per dimension; the
    /// validity map travels with the elements.
    pub fn slice(&self, ranges: &[Range<usize>]) -> Result<MaskedArray<T>> {
        if ranges.len() != self.shape.len() {
            return err_exit_code(
                ExitCode::AssertionFailure,
                format!(
                    "{} slice ranges for a {}-dimensional array",
                    ranges.len(),
                    self.shape.len()
                ),
            );
        }
        for (d, r) in ranges.iter().enumerate() {
            if r.start > r.end || r.end > self.shape[d] {
                return err_exit_code(
                    ExitCode::ConfigError,
                    format!(
                        "slice {}..{} out of bounds for dimension {} of extent {}",
                        r.start, r.end, d, self.shape[d]
                    ),
                );
            }
        }

        let out_shape: Vec<usize> = ranges.iter().map(|r| r.end - r.start).collect();
        let out_len: usize = out_shape.iter().product();
        let mut out_data = Vec::with_capacity(out_len);
        let mut out_valid = self.valid.as_ref().map(|_| Vec::with_capacity(out_len));

        if out_len > 0 {
            let mut coord: Vec<usize> = ranges.iter().map(|r| r.start).collect();
            'odometer: loop {
                let mut flat = 0;
                for (d, c) in coord.iter().enumerate() {
                    flat = flat * self.shape[d] + c;
                }
                out_data.push(self.data[flat]);
                if let (Some(out), Some(valid)) = (&mut out_valid, &self.valid) {
                    out.push(valid[flat]);
                }

                let mut d = coord.len();
                loop {
                    if d == 0 {
                        break 'odometer;
                    }
                    d -= 1;
                    coord[d] += 1;
                    if coord[d] < ranges[d].end {
                        break;
                    }
                    coord[d] = ranges[d].start;
                }
            }
        }

        let mut out = MaskedArray::new(out_shape, out_data)?;
        out.valid = out_valid;
        out.byteorder = self.byteorder;
        Ok(out)
    }
}

impl<F: Sample> MaskedArray<F> {
    /// semantic (host order) IEEE bits of one element
    #[inline(always)]
    pub fn bits_at(&self, idx: usize) -> F::Uint {
        let bits = self.data[idx].to_bits();
        if self.byteorder.is_foreign() {
            bits.swap_bytes()
        } else {
            bits
        }
    }

    /// store semantic bits back through the byte-swap rule
    #[inline(always)]
    pub fn set_bits_at(&mut self, idx: usize, bits: F::Uint) {
        let stored = if self.byteorder.is_foreign() {
            bits.swap_bytes()
        } else {
            bits
        };
        self.data[idx] = F::from_bits(stored);
    }

    /// Reinterpretation of the storage as the width-matched unsigned
    /// integer. No copy; bit patterns are preserved exactly.
    pub fn uint_view(&self) -> &[F::Uint] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn uint_view_mut(&mut self) -> &mut [F::Uint] {
        bytemuck::cast_slice_mut(&mut self.data)
    }

    /// Borrow the half-open range `[start, end)` along `axis` as a
    /// view. Used to form the two adjacent slices that feed the pair
    /// counts; both views share this array's validity map so their
    /// mask alignment cannot drift.
    pub fn axis_slice(&self, axis: usize, start: usize, end: usize) -> Result<AxisSlice<'_, F>> {
        if axis >= self.shape.len() {
            return err_exit_code(
                ExitCode::ConfigError,
                format!("axis {} out of range for shape {:?}", axis, self.shape),
            );
        }
        if start > end || end > self.shape[axis] {
            return err_exit_code(
                ExitCode::ConfigError,
                format!(
                    "axis slice {}..{} out of bounds for extent {}",
                    start, end, self.shape[axis]
                ),
            );
        }
        Ok(AxisSlice {
            arr: self,
            axis,
            start,
            end,
        })
    }
}

/// Enumerate the flat indices of the elements whose coordinate along
/// `axis` falls in `range`, in row-major order. Shared by the slice
/// views and the chunked quantise loop.
pub fn for_each_flat_in_axis_range(
    shape: &[usize],
    axis: usize,
    range: Range<usize>,
    mut f: impl FnMut(usize),
) {
    let stride: usize = shape[axis + 1..].iter().product();
    let axis_len = shape[axis];
    let outer: usize = shape[..axis].iter().product();

    for o in 0..outer {
        let base = o * axis_len * stride;
        for a in range.clone() {
            let row = base + a * stride;
            for i in 0..stride {
                f(row + i);
            }
        }
    }
}

/// A borrowed slab of a `MaskedArray` along one axis.
#[derive(Clone, Copy)]
pub struct AxisSlice<'a, F: Sample> {
    arr: &'a MaskedArray<F>,
    axis: usize,
    start: usize,
    end: usize,
}

impl<'a, F: Sample> AxisSlice<'a, F> {
    fn stride(&self) -> usize {
        self.arr.shape[self.axis + 1..].iter().product()
    }

    fn outer(&self) -> usize {
        self.arr.shape[..self.axis].iter().product()
    }

    /// total elements in the view, valid or not
    pub fn element_count(&self) -> usize {
        self.outer() * (self.end - self.start) * self.stride()
    }

    /// valid elements in the view
    pub fn count(&self) -> u64 {
        self.iter().filter(|(_, valid)| *valid).count() as u64
    }

    /// iterate (semantic bits, validity) in row-major order
    pub fn iter(&self) -> AxisSliceIter<'a, F> {
        AxisSliceIter {
            arr: self.arr,
            stride: self.stride(),
            axis_len: self.arr.shape[self.axis],
            outer: self.outer(),
            start: self.start,
            end: self.end,
            o: 0,
            a: self.start,
            i: 0,
            done: self.element_count() == 0,
        }
    }
}

pub struct AxisSliceIter<'a, F: Sample> {
    arr: &'a MaskedArray<F>,
    stride: usize,
    axis_len: usize,
    outer: usize,
    start: usize,
    end: usize,
    o: usize,
    a: usize,
    i: usize,
    done: bool,
}

impl<'a, F: Sample> Iterator for AxisSliceIter<'a, F> {
    type Item = (F::Uint, bool);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let idx = (self.o * self.axis_len + self.a) * self.stride + self.i;
        let item = (self.arr.bits_at(idx), self.arr.is_valid(idx));

        self.i += 1;
        if self.i == self.stride {
            self.i = 0;
            self.a += 1;
            if self.a == self.end {
                self.a = self.start;
                self.o += 1;
                if self.o == self.outer {
                    self.done = true;
                }
            }
        }
        return Some(item);
    }
}
