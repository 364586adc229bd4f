// SPDX-License-Identifier: Apache-2.0

use std::ops::Range;

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::helpers::{err_exit_code, here};
use crate::icompress_error::ExitCode;

use super::analysis::{AnalysisDocument, GroupAnalysis, VariableAnalysis};
use super::bit_information::bitinformation;
use super::dataset::{Dataset, Group, VarData, Variable};
use super::float_type::Sample;
use super::masked_array::MaskedArray;

/// Walks a dataset and produces the analysis document. A variable
/// that cannot be analysed is skipped with a diagnostic; its siblings
/// are unaffected.
pub struct Analyse {
    pub time_start: Option<usize>,
    pub time_end: Option<usize>,
    pub level: Option<usize>,
    pub axis: usize,
    pub workers: usize,
}

impl Default for Analyse {
    fn default() -> Self {
        Analyse {
            time_start: None,
            time_end: None,
            level: None,
            axis: 0,
            workers: 1,
        }
    }
}

impl Analyse {
    /// Analyse the whole dataset, or just the named subgroups and
    /// variables when selections are given. Asking for a name that
    /// does not exist is a configuration error; a variable failing
    /// analysis is not.
    pub fn from_dataset(
        &self,
        dataset: &Dataset,
        groups: Option<&[String]>,
        vars: Option<&[String]>,
    ) -> Result<AnalysisDocument> {
        let mut doc = AnalysisDocument::new(&dataset.path);

        let selected: Vec<&Group> = match groups {
            None => {
                let mut all: Vec<&Group> = dataset.root.groups.iter().collect();
                all.push(&dataset.root);
                all
            }
            Some(names) => {
                let mut picked = Vec::new();
                for name in names {
                    match dataset.root.groups.iter().find(|g| &g.name == name) {
                        Some(g) => picked.push(g),
                        None => {
                            return err_exit_code(
                                ExitCode::ConfigError,
                                format!("group not found: {}", name),
                            )
                        }
                    }
                }
                picked
            }
        };

        for group in selected {
            let grp = self.from_group(group, vars).context(here!())?;
            doc.groups.insert(group.name.clone(), grp);
        }

        return Ok(doc);
    }

    pub fn from_group(&self, group: &Group, vars: Option<&[String]>) -> Result<GroupAnalysis> {
        let selected: Vec<&Variable> = match vars {
            None => group.variables.iter().collect(),
            Some(names) => {
                let mut picked = Vec::new();
                for name in names {
                    match group.variable(name) {
                        Some(v) => picked.push(v),
                        None => {
                            return err_exit_code(
                                ExitCode::ConfigError,
                                format!("variable not found: {} in group: {}", name, group.name),
                            )
                        }
                    }
                }
                picked
            }
        };

        let mut grp = GroupAnalysis::default();
        for var in selected {
            match self.from_variable(var) {
                Ok(record) => {
                    grp.vars.insert(var.name.clone(), record);
                }
                Err(e) => {
                    warn!("skipping variable {}: {:#}", var.name, e);
                }
            }
        }
        return Ok(grp);
    }

    pub fn from_variable(&self, var: &Variable) -> Result<VariableAnalysis> {
        let ranges = self.slice_ranges(var)?;

        let (bitinfo, elements) = match &var.data {
            VarData::Float16(a) => self.from_array(&var.name, a, &ranges)?,
            VarData::Float32(a) => self.from_array(&var.name, a, &ranges)?,
            VarData::Float64(a) => self.from_array(&var.name, a, &ranges)?,
            VarData::Int32(_) | VarData::Int64(_) => {
                return err_exit_code(
                    ExitCode::UnsupportedType,
                    format!(
                        "variable {} is {} and bit information needs a float type",
                        var.name,
                        var.data.dtype_name()
                    ),
                );
            }
        };

        let ft = match &var.data {
            VarData::Float16(_) => super::float_type::FloatType::Float16,
            VarData::Float32(_) => super::float_type::FloatType::Float32,
            VarData::Float64(_) => super::float_type::FloatType::Float64,
            _ => unreachable!(),
        };

        return Ok(VariableAnalysis {
            type_name: ft.name().to_string(),
            itemsize: ft.itemsize(),
            byteorder: var.data.byte_order().as_char().to_string(),
            signbit: ft.sign_bit(),
            manbit: ft.man_bits(),
            expbit: ft.exp_bits(),
            elements,
            bitinfo,
            time_start: self.time_start,
            time_end: self.time_end,
            level: self.level,
            axis: Some(self.axis),
            retainbits: None,
        });
    }

    /// Bit information of one sliced array view.
    pub fn from_array<F: Sample>(
        &self,
        name: &str,
        arr: &MaskedArray<F>,
        ranges: &[Range<usize>],
    ) -> Result<(Vec<f64>, u64)> {
        let sub = arr.slice(ranges).context(here!())?;
        debug!(
            "analysing variable {} with shape {:?} ({} workers)",
            name,
            sub.shape(),
            self.workers
        );

        let bi = bitinformation(&sub, self.axis, true, 2.0, self.workers).context(here!())?;
        return Ok((bi, sub.count()));
    }

    /// The index built along each dimension: the time axis takes
    /// `[time_start, time_end)`, a level-like dimension takes the
    /// single requested level, everything else its full extent.
    fn slice_ranges(&self, var: &Variable) -> Result<Vec<Range<usize>>> {
        let shape = var.data.shape();
        if self.axis >= shape.len() {
            return err_exit_code(
                ExitCode::ConfigError,
                format!(
                    "axis {} out of range for variable {} with {} dimensions",
                    self.axis,
                    var.name,
                    shape.len()
                ),
            );
        }

        let mut ranges = Vec::with_capacity(shape.len());
        for (d, dim_name) in var.dimensions.iter().enumerate() {
            let extent = shape[d];
            let range = if var.time_dim_index() == Some(d) {
                let start = self.time_start.unwrap_or(0);
                let end = self.time_end.unwrap_or(extent);
                start..end
            } else if Variable::is_level_dim(dim_name) && self.level.is_some() {
                let l = self.level.unwrap();
                l..l + 1
            } else {
                0..extent
            };
            if range.start > range.end || range.end > extent {
                return err_exit_code(
                    ExitCode::ConfigError,
                    format!(
                        "slice {}..{} out of bounds for dimension {} of {}",
                        range.start, range.end, dim_name, var.name
                    ),
                );
            }
            ranges.push(range);
        }
        return Ok(ranges);
    }
}
