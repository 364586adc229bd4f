// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::consts::{DEFAULT_CI, DEFAULT_PCHUNK};
use crate::helpers::{err_exit_code, here};
use crate::icompress_error::ExitCode;

use super::analysis::{AnalysisDocument, VariableAnalysis};
use super::dataset::{Dataset, Group, VarData, Variable};
use super::float_type::{Sample, UintBits};
use super::keep_bits::ThresholdPolicy;
use super::masked_array::MaskedArray;
use super::quantiser::{QuantiseMethod, Quantiser};

/// Applies an analysis document to a dataset: variables with a record
/// are quantised with the configured method, everything else is
/// copied through (optionally narrowed). Configuration problems are
/// fatal before any variable is touched; a variable failure aborts
/// that variable only.
pub struct Compress {
    pub analysis: AnalysisDocument,
    pub ci: f64,
    pub method: QuantiseMethod,
    pub conv_int: bool,
    pub conv_float: bool,
    pub pchunk: usize,
    pub policy: ThresholdPolicy,
}

impl Compress {
    pub fn new(analysis: AnalysisDocument) -> Self {
        Compress {
            analysis,
            ci: DEFAULT_CI,
            method: QuantiseMethod::BitShave,
            conv_int: false,
            conv_float: false,
            pchunk: DEFAULT_PCHUNK,
            policy: ThresholdPolicy::default(),
        }
    }

    pub fn compress_dataset(&self, dataset: &Dataset) -> Result<Dataset> {
        if self.pchunk == 0 {
            return err_exit_code(ExitCode::ConfigError, "pchunk must be at least 1");
        }
        self.analysis.check_version().context(here!())?;

        Ok(Dataset {
            path: dataset.path.clone(),
            root: self.compress_group(&dataset.root)?,
        })
    }

    pub fn compress_group(&self, group: &Group) -> Result<Group> {
        let mut out = Group::new(group.name.clone());
        out.attributes = group.attributes.clone();
        out.dimensions = group.dimensions.clone();

        for var in &group.variables {
            let record = self.analysis.find_var(&group.name, &var.name);
            let processed = match record {
                Some(rec) => match self.compress_variable(var, rec) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("variable {} failed, copying verbatim: {:#}", var.name, e);
                        self.copy_variable(var)
                    }
                },
                None => self.copy_variable(var),
            };
            out.variables.push(processed);
        }

        for sub in &group.groups {
            out.groups.push(self.compress_group(sub)?);
        }
        return Ok(out);
    }

    /// Quantise one variable according to its analysis record, and
    /// annotate the result with what was done to it.
    pub fn compress_variable(&self, var: &Variable, record: &VariableAnalysis) -> Result<Variable> {
        let mut out = var.clone();
        let time_dim = var.time_dim_index();

        let (nsb, mask_bits, width) = match &mut out.data {
            VarData::Float16(arr) => self.quantise(&var.name, time_dim, arr, record)?,
            VarData::Float32(arr) => self.quantise(&var.name, time_dim, arr, record)?,
            VarData::Float64(arr) => self.quantise(&var.name, time_dim, arr, record)?,
            VarData::Int32(_) | VarData::Int64(_) => {
                return err_exit_code(
                    ExitCode::InconsistentAnalysis,
                    format!(
                        "analysis record given for {} variable {}",
                        var.data.dtype_name(),
                        var.name
                    ),
                );
            }
        };

        out.attributes.insert(
            "compression".to_string(),
            format!(
                "icompress: keepbits: {}, method: {}, bitmask: {:0width$b}.",
                nsb,
                self.method.name(),
                mask_bits,
                width = width
            ),
        );

        let nowtime = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S");
        let history_line = format!("{} altered by icompress: lossy compression.", nowtime);
        match out.attributes.get_mut("history") {
            Some(h) => {
                h.push(' ');
                h.push_str(&history_line);
            }
            None => {
                out.attributes.insert("history".to_string(), history_line);
            }
        }

        return Ok(out);
    }

    fn quantise<F: Sample>(
        &self,
        name: &str,
        time_dim: Option<usize>,
        arr: &mut MaskedArray<F>,
        record: &VariableAnalysis,
    ) -> Result<(u32, u64, usize)> {
        let quantiser = Quantiser::<F>::from_analysis(self.method, record, self.ci, self.policy)
            .context(here!())?;

        match time_dim {
            None => {
                // no record axis: the whole variable in one pass
                quantiser.process(arr);
            }
            Some(t) => {
                // stream pchunk timesteps at a time to bound the
                // working set
                let extent = arr.shape()[t];
                let mut start = 0;
                while start < extent {
                    let end = (start + self.pchunk).min(extent);
                    quantiser.process_axis_range(arr, t, start..end);
                    start = end;
                }
            }
        }

        let width = F::Uint::BITS as usize;
        let mask_bits = quantiser.mask().to_u64();
        debug!(
            "processed variable {}: keepbits {}, bitmask {:0width$b}",
            name,
            quantiser.nsb(),
            mask_bits,
            width = width
        );
        Ok((quantiser.nsb(), mask_bits, width))
    }

    /// Copy a variable without bit manipulation, narrowing 64-bit
    /// storage when asked and safe.
    pub fn copy_variable(&self, var: &Variable) -> Variable {
        let mut out = var.clone();

        match &var.data {
            VarData::Int64(arr) if self.conv_int => {
                let fits = arr
                    .values()
                    .iter()
                    .all(|&v| v >= i32::MIN as i64 && v <= i32::MAX as i64);
                if fits {
                    let narrowed: Vec<i32> = arr.values().iter().map(|&v| v as i32).collect();
                    out.data = VarData::Int32(rebuild(arr, narrowed));
                } else {
                    warn!(
                        "variable {} has values outside 32-bit range, not narrowing",
                        var.name
                    );
                }
            }
            VarData::Float64(arr) if self.conv_float => {
                // narrow the semantic values; the narrowed copy is
                // always native order
                let narrowed: Vec<f32> = (0..arr.len())
                    .map(|i| f64::from_bits(arr.bits_at(i).to_u64()) as f32)
                    .collect();
                out.data = VarData::Float32(rebuild(arr, narrowed));
            }
            _ => {}
        }
        return out;
    }
}

/// shape and validity travel with a narrowed copy
fn rebuild<T: Copy, U: Copy>(original: &MaskedArray<T>, data: Vec<U>) -> MaskedArray<U> {
    let shape = original.shape().to_vec();
    match original.validity() {
        Some(valid) => MaskedArray::with_validity(shape, data, valid.to_vec())
            .expect("narrowed copy keeps the original layout"),
        None => MaskedArray::new(shape, data).expect("narrowed copy keeps the original layout"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::ANALYSIS_FORMAT_VERSION;
    use crate::structs::analyser::Analyse;
    use crate::structs::bit_masks::{man_mask, sigexp_mask};

    fn smooth_variable(name: &str, n: usize) -> Variable {
        // slowly varying data so neighbouring samples share their top
        // mantissa bits and the analysis keeps a positive bit count
        let data: Vec<f32> = (0..n).map(|i| 10.0 + (i as f32) * 0.01).collect();
        Variable::new(
            name,
            vec!["time".to_string()],
            VarData::Float32(MaskedArray::new(vec![n], data).unwrap()),
        )
        .unwrap()
    }

    fn analysed_dataset() -> (Dataset, AnalysisDocument) {
        let mut ds = Dataset::new("/data/in.raw");
        ds.root.variables.push(smooth_variable("tas", 256));
        let doc = Analyse::default().from_dataset(&ds, None, None).unwrap();
        (ds, doc)
    }

    #[test]
    fn shave_output_matches_the_keep_mask() {
        let (ds, doc) = analysed_dataset();
        let rec = doc.find_var("/", "tas").unwrap().clone();
        let out = Compress::new(doc).compress_dataset(&ds).unwrap();

        let q = Quantiser::<f32>::from_analysis(
            QuantiseMethod::BitShave,
            &rec,
            DEFAULT_CI,
            ThresholdPolicy::default(),
        )
        .unwrap();
        let keep = sigexp_mask::<f32>() | man_mask::<f32>(q.nsb());

        let original = match &ds.root.variable("tas").unwrap().data {
            VarData::Float32(a) => a.clone(),
            _ => unreachable!(),
        };
        let processed = match &out.root.variable("tas").unwrap().data {
            VarData::Float32(a) => a.clone(),
            _ => unreachable!(),
        };
        for i in 0..original.len() {
            assert_eq!(processed.bits_at(i), original.bits_at(i) & keep);
        }
    }

    #[test]
    fn processed_variables_are_annotated() {
        let (ds, doc) = analysed_dataset();
        let out = Compress::new(doc).compress_dataset(&ds).unwrap();
        let var = out.root.variable("tas").unwrap();

        let compression = var.attributes.get("compression").unwrap();
        assert!(compression.starts_with("icompress: keepbits: "));
        assert!(compression.contains("method: bitshave"));
        assert!(compression.contains("bitmask: "));
        assert!(var
            .attributes
            .get("history")
            .unwrap()
            .contains("altered by icompress"));
    }

    #[test]
    fn history_lines_accumulate() {
        let (mut ds, doc) = analysed_dataset();
        ds.root.variables[0]
            .attributes
            .insert("history".to_string(), "created by a model".to_string());
        let out = Compress::new(doc).compress_dataset(&ds).unwrap();
        let history = out.root.variable("tas").unwrap().attributes["history"].clone();
        assert!(history.starts_with("created by a model "));
        assert!(history.contains("altered by icompress"));
    }

    #[test]
    fn unanalysed_variables_are_copied_verbatim() {
        let (mut ds, doc) = analysed_dataset();
        ds.root.variables.push(
            Variable::new(
                "lat",
                vec!["y".to_string()],
                VarData::Float64(MaskedArray::new(vec![3], vec![1.5f64, 2.5, 3.5]).unwrap()),
            )
            .unwrap(),
        );
        let out = Compress::new(doc).compress_dataset(&ds).unwrap();
        match &out.root.variable("lat").unwrap().data {
            VarData::Float64(a) => assert_eq!(a.values(), &[1.5, 2.5, 3.5]),
            other => panic!("unexpected narrowing to {}", other.dtype_name()),
        }
    }

    #[test]
    fn narrowing_applies_only_when_requested_and_safe() {
        let (mut ds, doc) = analysed_dataset();
        ds.root.variables.push(
            Variable::new(
                "height",
                vec!["z".to_string()],
                VarData::Float64(MaskedArray::new(vec![2], vec![1.5f64, 2.5]).unwrap()),
            )
            .unwrap(),
        );
        ds.root.variables.push(
            Variable::new(
                "big",
                vec!["z".to_string()],
                VarData::Int64(
                    MaskedArray::new(vec![2], vec![1i64, i64::from(i32::MAX) + 1]).unwrap(),
                ),
            )
            .unwrap(),
        );
        ds.root.variables.push(
            Variable::new(
                "small",
                vec!["z".to_string()],
                VarData::Int64(MaskedArray::new(vec![2], vec![7i64, -9]).unwrap()),
            )
            .unwrap(),
        );

        let mut compress = Compress::new(doc);
        compress.conv_float = true;
        compress.conv_int = true;
        let out = compress.compress_dataset(&ds).unwrap();

        assert_eq!(out.root.variable("height").unwrap().data.dtype_name(), "float32");
        // out-of-range values block the integer narrowing
        assert_eq!(out.root.variable("big").unwrap().data.dtype_name(), "int64");
        match &out.root.variable("small").unwrap().data {
            VarData::Int32(a) => assert_eq!(a.values(), &[7, -9]),
            other => panic!("expected int32, got {}", other.dtype_name()),
        }
    }

    #[test]
    fn stale_analysis_version_refuses_to_start() {
        let (ds, mut doc) = analysed_dataset();
        doc.version = format!("{}-old", ANALYSIS_FORMAT_VERSION);
        assert!(Compress::new(doc).compress_dataset(&ds).is_err());
    }

    #[test]
    fn zero_pchunk_is_a_config_error() {
        let (ds, doc) = analysed_dataset();
        let mut compress = Compress::new(doc);
        compress.pchunk = 0;
        assert!(compress.compress_dataset(&ds).is_err());
    }

    #[test]
    fn chunked_and_unchunked_processing_agree() {
        let (ds, doc) = analysed_dataset();
        let wide = Compress::new(doc.clone()).compress_dataset(&ds).unwrap();
        let mut narrow = Compress::new(doc);
        narrow.pchunk = 7;
        let chunked = narrow.compress_dataset(&ds).unwrap();

        let a = match &wide.root.variable("tas").unwrap().data {
            VarData::Float32(a) => a.clone(),
            _ => unreachable!(),
        };
        let b = match &chunked.root.variable("tas").unwrap().data {
            VarData::Float32(a) => a.clone(),
            _ => unreachable!(),
        };
        assert_eq!(a.uint_view(), b.uint_view());
    }
}

