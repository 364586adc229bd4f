// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;

use crate::icompress_error::{ExitCode, ICompressError};

/// location of the caller, appended as error context when propagating
/// failures up the stack
macro_rules! here {
    () => {
        concat!("at ", file!(), ":", line!())
    };
}

pub(crate) use here;

/// constructs an error result with the given exit code and message
#[cold]
pub fn err_exit_code<T>(error_code: ExitCode, message: impl Into<String>) -> Result<T> {
    return Err(ICompressError::new(error_code, message).into());
}
