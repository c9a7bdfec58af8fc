/*
 *  housekeeping.rs
 *
 *  EcuMonS - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Startup pruning of datalogs from previous days
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
use std::path::Path;

use chrono::{DateTime, Local, NaiveDate};
use log::{info, warn};

use crate::locator::has_extension;

/// Delete datalogs in `dir` last modified before `today` (local time).
/// Returns how many were removed; failures are logged and skipped.
pub fn prune_stale_logs(dir: &Path, extensions: &[String], today: NaiveDate) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("prune: cannot read {}: {}", dir.display(), e);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !has_extension(&path, extensions) {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        let Ok(modified) = meta.modified() else { continue };
        let day = DateTime::<Local>::from(modified).date_naive();
        if day >= today {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("pruned {} ({})", path.display(), day);
                removed += 1;
            }
            Err(e) => warn!("prune: cannot remove {}: {}", path.display(), e),
        }
    }
    removed
}
