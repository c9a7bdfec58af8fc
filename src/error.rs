/*
 *  error.rs
 *
 *  EcuMonS - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Error taxonomy for the datalog locator and tailer
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong between the log directory and a value.
///
/// None of these ever leave the polling loop; they are logged and the
/// display falls back to "N/A" or synthetic values.
#[derive(Debug, Error)]
pub enum TailError {
    #[error("log directory not found: {0}")]
    NoLogDirectory(PathBuf),

    #[error("no matching datalog in {0}")]
    NoMatchingFile(PathBuf),

    #[error("field '{0}' not present in header")]
    UnresolvedField(String),

    #[error("row has {columns} columns, field index {index} out of range")]
    MalformedRow { columns: usize, index: usize },

    #[error("line not yet terminated at offset {0}")]
    PartialWrite(u64),

    #[error("I/O error: {0}")]
    IoFailure(#[from] std::io::Error),
}

impl TailError {
    /// Short tag used in debug logging
    pub fn kind(&self) -> &'static str {
        match self {
            TailError::NoLogDirectory(_) => "no-log-directory",
            TailError::NoMatchingFile(_) => "no-matching-file",
            TailError::UnresolvedField(_) => "unresolved-field",
            TailError::MalformedRow { .. } => "malformed-row",
            TailError::PartialWrite(_) => "partial-write",
            TailError::IoFailure(_) => "io-failure",
        }
    }
}

/// Outcome of asking the tailer for a field.
#[derive(Debug)]
pub enum LookupResult {
    /// Latest value seen for the field
    Found(String),
    /// Field is not in the header, or no row has carried it yet
    NotFound,
    /// The read failed; the caller should re-adopt on the next tick
    Error(TailError),
}

impl LookupResult {
    pub fn value(&self) -> Option<&str> {
        match self {
            LookupResult::Found(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LookupResult::Error(_))
    }
}
