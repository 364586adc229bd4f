// SPDX-License-Identifier: Apache-2.0

use core::fmt;

/// Well-defined errors, also used as the process exit code of the
/// command line utility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    AssertionFailure = 1,

    /// array dtype is not IEEE f16/f32/f64
    UnsupportedType = 2,

    /// analysis record is missing required keys or refers to an
    /// unknown dtype
    InconsistentAnalysis = 3,

    /// unknown method name, bad slice bounds, version mismatch,
    /// identical input/output paths
    ConfigError = 4,

    FileNotFound = 5,
    OsError = 6,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error type with a well-defined exit code that can be translated
/// into a result for the command line caller.
#[derive(Debug, Clone)]
pub struct ICompressError {
    pub exit_code: ExitCode,
    pub message: String,
}

impl ICompressError {
    pub fn new(exit_code: ExitCode, message: impl Into<String>) -> Self {
        ICompressError {
            exit_code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ICompressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.exit_code, self.message)
    }
}

impl std::error::Error for ICompressError {}

impl From<std::io::Error> for ICompressError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => {
                ICompressError::new(ExitCode::FileNotFound, e.to_string())
            }
            _ => ICompressError::new(ExitCode::OsError, e.to_string()),
        }
    }
}
