// SPDX-License-Identifier: Apache-2.0

//! Information-theoretic lossy compression of scientific
//! floating-point arrays.
//!
//! The engine estimates, per bit position, how much real information
//! a bit carries using the mutual information between spatially
//! adjacent samples, derives the number of mantissa bits needed to
//! preserve a chosen fraction of that information, and quantises the
//! array by masking its low mantissa bits. The output keeps its
//! storage width and layout but becomes highly compressible by any
//! downstream lossless codec.

pub mod consts;
mod helpers;
pub mod icompress_error;
pub mod structs;

pub use crate::icompress_error::{ExitCode, ICompressError};

pub use crate::structs::analyser::Analyse;
pub use crate::structs::analysis::{AnalysisDocument, GroupAnalysis, VariableAnalysis};
pub use crate::structs::bit_count::{bitcount, bitpaircount, BitCounts, PairCounts};
pub use crate::structs::bit_information::bitinformation;
pub use crate::structs::compressor::Compress;
pub use crate::structs::dataset::{Dataset, Dimension, Group, VarData, Variable};
pub use crate::structs::entropy::{bitentropy, entropy};
pub use crate::structs::float_type::{ByteOrder, FloatType, Sample, UintBits, F16};
pub use crate::structs::keep_bits::{
    binom_confidence, free_entropy, keepbits, ThresholdPolicy,
};
pub use crate::structs::masked_array::MaskedArray;
pub use crate::structs::quantiser::{QuantiseMethod, Quantiser};
pub use crate::structs::signed_exponent::signed_exponent;
