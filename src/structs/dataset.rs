// SPDX-License-Identifier: Apache-2.0

//! In-memory stand-in for the dataset object tree the surrounding
//! tools traverse: named dimensions, nested groups, per-variable
//! attributes. The core prescribes no file format; anything that can
//! build this tree can be analysed and compressed.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::consts::{LEVEL_DIM_PATTERN, TIME_DIM_NAMES};
use crate::helpers::err_exit_code;
use crate::icompress_error::ExitCode;

use super::float_type::{ByteOrder, F16};
use super::masked_array::MaskedArray;

#[derive(Debug, Clone)]
pub struct Dimension {
    pub name: String,
    pub size: usize,
}

/// The closed set of element types a variable can carry. The float
/// members feed the bit engine; the integer members exist only so the
/// compressor can copy them through (optionally narrowed).
#[derive(Debug, Clone)]
pub enum VarData {
    Float16(MaskedArray<F16>),
    Float32(MaskedArray<f32>),
    Float64(MaskedArray<f64>),
    Int32(MaskedArray<i32>),
    Int64(MaskedArray<i64>),
}

impl VarData {
    pub fn shape(&self) -> &[usize] {
        match self {
            VarData::Float16(a) => a.shape(),
            VarData::Float32(a) => a.shape(),
            VarData::Float64(a) => a.shape(),
            VarData::Int32(a) => a.shape(),
            VarData::Int64(a) => a.shape(),
        }
    }

    pub fn dtype_name(&self) -> &'static str {
        match self {
            VarData::Float16(_) => "float16",
            VarData::Float32(_) => "float32",
            VarData::Float64(_) => "float64",
            VarData::Int32(_) => "int32",
            VarData::Int64(_) => "int64",
        }
    }

    pub fn byte_order(&self) -> ByteOrder {
        match self {
            VarData::Float16(a) => a.byte_order(),
            VarData::Float32(a) => a.byte_order(),
            VarData::Float64(a) => a.byte_order(),
            VarData::Int32(a) => a.byte_order(),
            VarData::Int64(a) => a.byte_order(),
        }
    }

    pub fn count(&self) -> u64 {
        match self {
            VarData::Float16(a) => a.count(),
            VarData::Float32(a) => a.count(),
            VarData::Float64(a) => a.count(),
            VarData::Int32(a) => a.count(),
            VarData::Int64(a) => a.count(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    /// dimension names, one per axis of the data
    pub dimensions: Vec<String>,
    pub data: VarData,
    pub attributes: BTreeMap<String, String>,
}

impl Variable {
    pub fn new(name: impl Into<String>, dimensions: Vec<String>, data: VarData) -> Result<Self> {
        let ndim = data.shape().len();
        if dimensions.len() != ndim {
            return err_exit_code(
                ExitCode::ConfigError,
                format!(
                    "{} dimension names for {}-dimensional data",
                    dimensions.len(),
                    ndim
                ),
            );
        }
        Ok(Variable {
            name: name.into(),
            dimensions,
            data,
            attributes: BTreeMap::new(),
        })
    }

    /// index of the record (time) axis, if the variable has one
    pub fn time_dim_index(&self) -> Option<usize> {
        self.dimensions
            .iter()
            .position(|d| TIME_DIM_NAMES.contains(&d.as_str()))
    }

    pub fn is_level_dim(name: &str) -> bool {
        name.contains(LEVEL_DIM_PATTERN)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Group {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub dimensions: Vec<Dimension>,
    pub variables: Vec<Variable>,
    pub groups: Vec<Group>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Group {
            name: name.into(),
            ..Group::default()
        }
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }
}

/// A dataset is its root group plus the path it was loaded from (the
/// analysis document records the path so the compressor can refuse a
/// mismatched input).
#[derive(Debug, Clone)]
pub struct Dataset {
    pub path: String,
    pub root: Group,
}

impl Dataset {
    pub fn new(path: impl Into<String>) -> Self {
        Dataset {
            path: path.into(),
            root: Group::new("/"),
        }
    }
}
