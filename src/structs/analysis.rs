// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::consts::{ANALYSIS_FORMAT_VERSION, ANALYSIS_NAME};
use crate::helpers::err_exit_code;
use crate::icompress_error::ExitCode;

use super::float_type::{ByteOrder, FloatType};

/// The analysis document: one per analysed dataset, carrying a
/// variable record for every variable that was analysed. This is the
/// narrow contract between the analyser and the compressor; the
/// compressor never needs the source data to decide how many bits to
/// keep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisDocument {
    #[serde(rename = "Analysis")]
    pub analysis: String,
    pub date: String,
    pub file: String,
    pub version: String,
    pub groups: BTreeMap<String, GroupAnalysis>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupAnalysis {
    pub vars: BTreeMap<String, VariableAnalysis>,
}

/// Per-variable analysis record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableAnalysis {
    #[serde(rename = "type")]
    pub type_name: String,

    /// storage width in bytes
    pub itemsize: usize,

    /// '<', '>', '=' or '|'
    pub byteorder: String,

    pub signbit: u32,

    /// half-open mantissa bit range
    pub manbit: (u32, u32),

    /// half-open exponent bit range
    pub expbit: (u32, u32),

    /// number of valid elements the analysis saw
    pub elements: u64,

    /// mutual information per bit position, LSB first
    pub bitinfo: Vec<f64>,

    pub time_start: Option<usize>,
    pub time_end: Option<usize>,
    pub level: Option<usize>,
    pub axis: Option<usize>,

    /// user override that bypasses the keep-bits calculation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retainbits: Option<u32>,
}

impl AnalysisDocument {
    pub fn new(file: impl Into<String>) -> Self {
        AnalysisDocument {
            analysis: ANALYSIS_NAME.to_string(),
            date: chrono::Local::now().to_rfc3339(),
            file: file.into(),
            version: ANALYSIS_FORMAT_VERSION.to_string(),
            groups: BTreeMap::new(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        match serde_json::from_str::<AnalysisDocument>(text) {
            Ok(doc) => Ok(doc),
            Err(e) => err_exit_code(
                ExitCode::InconsistentAnalysis,
                format!("analysis document cannot be parsed: {}", e),
            ),
        }
    }

    /// Consumers require an exact version match; a stale analysis must
    /// be recalculated, never reinterpreted.
    pub fn check_version(&self) -> Result<()> {
        if self.version != ANALYSIS_FORMAT_VERSION {
            return err_exit_code(
                ExitCode::ConfigError,
                format!(
                    "analysis version {} does not match current version {}, please recalculate",
                    self.version, ANALYSIS_FORMAT_VERSION
                ),
            );
        }
        Ok(())
    }

    pub fn find_var(&self, group: &str, var: &str) -> Option<&VariableAnalysis> {
        self.groups.get(group).and_then(|g| g.vars.get(var))
    }
}

impl VariableAnalysis {
    pub fn float_type(&self) -> Result<FloatType> {
        FloatType::from_name(&self.type_name)
    }

    pub fn byte_order(&self) -> Result<ByteOrder> {
        let mut chars = self.byteorder.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => ByteOrder::from_char(c),
            _ => err_exit_code(
                ExitCode::InconsistentAnalysis,
                format!("bad byteorder field: {:?}", self.byteorder),
            ),
        }
    }

    /// Internal consistency of the record against its own declared
    /// layout. Anything off means the document was hand-edited or
    /// produced by a different tool.
    pub fn validate(&self) -> Result<()> {
        let ft = self.float_type()?;
        if self.itemsize != ft.itemsize() {
            return err_exit_code(
                ExitCode::InconsistentAnalysis,
                format!(
                    "itemsize {} does not match {} ({} bytes)",
                    self.itemsize,
                    ft.name(),
                    ft.itemsize()
                ),
            );
        }
        if self.bitinfo.len() != ft.bits() as usize {
            return err_exit_code(
                ExitCode::InconsistentAnalysis,
                format!(
                    "bitinfo has {} entries for a {}-bit type",
                    self.bitinfo.len(),
                    ft.bits()
                ),
            );
        }
        if self.manbit != ft.man_bits() || self.expbit != ft.exp_bits() || self.signbit != ft.sign_bit()
        {
            return err_exit_code(
                ExitCode::InconsistentAnalysis,
                format!("bit layout fields do not match {}", ft.name()),
            );
        }
        self.byte_order()?;
        Ok(())
    }
}
