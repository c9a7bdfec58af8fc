/*
 *  locator.rs
 *
 *  EcuMonS - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Finds the datalog currently being written
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

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::TailError;

/// One datalog on disk. Identity is the path; the timestamp only ranks freshness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub path: PathBuf,
    pub modified_at: SystemTime,
}

impl LogFile {
    /// Same file as `other`, regardless of how much has been appended since
    pub fn same_file(&self, other: &LogFile) -> bool {
        self.path == other.path
    }

    // mtime first, path breaks ties so repeated scans agree
    fn outranks(&self, other: &LogFile) -> bool {
        (self.modified_at, &self.path) > (other.modified_at, &other.path)
    }
}

/// Case-insensitive suffix match against any of `extensions` ("msl", ".mlg", ...)
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .map(|e| e.trim_start_matches('.'))
        .any(|e| e.eq_ignore_ascii_case(ext))
}

/// Scan `dir` for the newest datalog, reporting why nothing was found.
pub fn scan(dir: &Path, extensions: &[String]) -> Result<LogFile, TailError> {
    let entries = fs::read_dir(dir).map_err(|_| TailError::NoLogDirectory(dir.to_path_buf()))?;

    let mut best: Option<LogFile> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        if !has_extension(&path, extensions) {
            continue;
        }
        // follow symlinks; a vanished entry is simply skipped
        let Ok(meta) = fs::metadata(&path) else { continue };
        if !meta.is_file() {
            continue;
        }
        let candidate = LogFile {
            path,
            modified_at: meta.modified().unwrap_or(UNIX_EPOCH),
        };
        match &best {
            Some(current) if !candidate.outranks(current) => {}
            _ => best = Some(candidate),
        }
    }

    best.ok_or_else(|| TailError::NoMatchingFile(dir.to_path_buf()))
}

/// Newest datalog in `dir`, or `None` when there is nothing to show.
pub fn find_latest(dir: &Path, extensions: &[String]) -> Option<LogFile> {
    match scan(dir, extensions) {
        Ok(log) => Some(log),
        Err(e) => {
            log::debug!("locator: {} ({})", e, e.kind());
            None
        }
    }
}
