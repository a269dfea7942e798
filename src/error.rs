/*
 * Copyright 2019 The Regents of the University of California
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
 */

//!
//! Error types shared by all pipeline stages
//!

use std::error;
use std::fmt;
use std::io;
use std::result;

/// A specialized result type for signal discovery operations
pub type Result<T> = result::Result<T, Error>;

/// An error from any stage of the discovery pipeline
///
/// All stages signal errors by value. Configuration errors are reported at
/// construction time; per-frame compute errors abort processing with the
/// partial event stream flushed.
#[derive(Debug)]
pub enum Error {
    /// A configuration value failed validation
    InvalidConfig(String),
    /// Source data were malformed or could not be interpreted
    InvalidInput(String),
    /// An FFT size was not a power of two, or was out of range
    InvalidSize(usize),
    /// The active cluster set is full and a new cluster would be required
    ///
    /// This error is recovered locally: the offending detection is dropped
    /// and processing continues.
    CapacityExhausted,
    /// A read or write on the source or a destination failed
    Io(io::Error),
    /// A non-finite intermediate value or a violated implementation invariant
    Internal(String),
}

impl Error {
    /// Returns the process exit status associated with this error kind
    ///
    /// Success is 0; configuration rejection, I/O failure, and internal
    /// errors are distinguished from other failures.
    pub fn exit_status(&self) -> i32 {
        match *self {
            Error::InvalidConfig(_) => 2,
            Error::Io(_) => 3,
            Error::Internal(_) => 4,
            _ => 1,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::InvalidConfig(ref message) => write!(f, "invalid configuration: {}", message),
            Error::InvalidInput(ref message) => write!(f, "invalid input: {}", message),
            Error::InvalidSize(size) => write!(
                f,
                "invalid FFT size {}: must be a power of two between 1 and 2^20",
                size
            ),
            Error::CapacityExhausted => write!(f, "active cluster set is full"),
            Error::Io(ref inner) => write!(f, "I/O error: {}", inner),
            Error::Internal(ref message) => write!(f, "internal error: {}", message),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(inner: io::Error) -> Self {
        Error::Io(inner)
    }
}
