// SPDX-License-Identifier: Apache-2.0

/// analysis kind tag written to every analysis document
pub const ANALYSIS_NAME: &str = "BitInformation";

/// format tag of the analysis document. Consumers require an exact
/// match, so any change to the document layout must bump this.
pub const ANALYSIS_FORMAT_VERSION: &str = "0.2";

/// fraction of the mutual information to retain by default
pub const DEFAULT_CI: f64 = 0.99;

/// number of timesteps processed per iteration when streaming a
/// variable through a quantiser
pub const DEFAULT_PCHUNK: usize = 10000;

pub const DEFAULT_DEFLATE_LEVEL: u32 = 1;

/// dimension names that identify the record (time) axis
pub const TIME_DIM_NAMES: [&str; 2] = ["time", "t"];

/// substring that identifies a level-like dimension
pub const LEVEL_DIM_PATTERN: &str = "lev";
