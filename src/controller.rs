/*
 *  controller.rs
 *
 *  EcuMonS - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Per-tick dashboard state: which log, which field, live or test
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

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::button::ButtonEvent;
use crate::config::Config;
use crate::error::LookupResult;
use crate::locator::{scan, LogFile};
use crate::synthetic::synthetic_value;
use crate::tailer::{LogTailer, TailOptions};

/// Shown whenever a live value cannot be resolved
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayValue {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndicatorFlags {
    /// Values are synthetic, either forced or because no datalog is usable
    pub test_mode: bool,
    /// Phase of the blinking test marker
    pub blink_on: bool,
    /// Live mode, but the selected field has no value
    pub no_data: bool,
}

/// Everything a sink needs to draw one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub value: DisplayValue,
    pub flags: IndicatorFlags,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.value.label, self.value.value)?;
        if self.flags.test_mode {
            write!(f, " [T]")?;
        }
        if self.flags.no_data {
            write!(f, " [no data]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashMode {
    Live,
    Test,
}

/// The slice of configuration the controller works from
#[derive(Debug, Clone)]
pub struct DashSettings {
    pub log_dir: PathBuf,
    pub extensions: Vec<String>,
    /// Allow-list, in display order; empty shows every header field
    pub fields: Vec<String>,
    pub test_labels: Vec<String>,
    pub tail: TailOptions,
}

impl DashSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            log_dir: cfg.log_dir(),
            extensions: cfg.extensions(),
            fields: cfg.fields(),
            test_labels: cfg.test_labels(),
            tail: cfg.tail_options(),
        }
    }
}

pub struct DashController {
    settings: DashSettings,
    tailer: LogTailer,
    forced_test: bool,
    selection: usize,
    /// length of the field list shown on the last tick
    shown_len: usize,
    blink_on: bool,
    started: Option<Instant>,
    mode: Option<DashMode>,
    last_miss: Option<&'static str>,
}

impl DashController {
    pub fn new(settings: DashSettings) -> Self {
        let tailer = LogTailer::new(settings.tail.clone());
        Self {
            settings,
            tailer,
            forced_test: false,
            selection: 0,
            shown_len: 0,
            blink_on: false,
            started: None,
            mode: None,
            last_miss: None,
        }
    }

    pub fn settings(&self) -> &DashSettings {
        &self.settings
    }

    /// Mode of the most recent tick
    pub fn mode(&self) -> Option<DashMode> {
        self.mode
    }

    pub fn selection(&self) -> usize {
        self.selection
    }

    pub fn is_forced_test(&self) -> bool {
        self.forced_test
    }

    /// The datalog being followed, if any
    pub fn current_log(&self) -> Option<&LogFile> {
        self.tailer.current()
    }

    /// One poll: locate, (re)adopt, resolve the selected field.
    pub fn tick(&mut self, now: Instant) -> Frame {
        let elapsed = now.saturating_duration_since(*self.started.get_or_insert(now));

        if self.forced_test {
            return self.test_frame(elapsed, "forced");
        }

        let latest = match scan(&self.settings.log_dir, &self.settings.extensions) {
            Ok(latest) => latest,
            Err(e) => {
                if self.last_miss != Some(e.kind()) {
                    debug!("{}", e);
                    self.last_miss = Some(e.kind());
                }
                self.tailer.release();
                return self.test_frame(elapsed, "no datalog");
            }
        };
        self.last_miss = None;

        if !self.follow(latest) {
            return self.test_frame(elapsed, "datalog unreadable");
        }

        let fields = self.displayable_fields();
        if fields.is_empty() {
            return self.test_frame(elapsed, "no displayable fields");
        }
        let label = self.select(&fields).to_string();
        self.enter(DashMode::Live, "datalog");
        self.blink_on = false;

        let (value, no_data) = match self.tailer.next_value(&label) {
            LookupResult::Found(v) => (v, false),
            LookupResult::NotFound => {
                debug!("no value for {}", label);
                (NOT_AVAILABLE.to_string(), true)
            }
            LookupResult::Error(e) => {
                warn!("{} ({}), will re-adopt", e, e.kind());
                self.tailer.release();
                (NOT_AVAILABLE.to_string(), true)
            }
        };

        Frame {
            value: DisplayValue { label, value },
            flags: IndicatorFlags { test_mode: false, blink_on: false, no_data },
        }
    }

    pub fn on_button_event(&mut self, event: ButtonEvent) {
        match event {
            ButtonEvent::Advance => {
                self.selection = match self.shown_len {
                    0 => 0,
                    len => (self.selection + 1) % len,
                };
                debug!("selection -> {}", self.selection);
            }
            ButtonEvent::ToggleMode => {
                self.forced_test = !self.forced_test;
                self.selection = 0;
                info!("test mode {}", if self.forced_test { "forced on" } else { "off" });
            }
        }
    }

    /// Drop the datalog handle and cached values.
    pub fn shutdown(&mut self) {
        self.tailer.release();
    }

    /// Adopt `latest` unless it is already followed. False when it cannot be opened.
    fn follow(&mut self, latest: LogFile) -> bool {
        if let Some(current) = self.tailer.current() {
            if current.same_file(&latest) {
                return true;
            }
            info!("datalog rotated: {} -> {}", current.path.display(), latest.path.display());
        }
        let path = latest.path.clone();
        match self.tailer.adopt(latest) {
            Ok(_) => true,
            Err(e) => {
                warn!("cannot adopt {}: {}", path.display(), e);
                false
            }
        }
    }

    fn displayable_fields(&self) -> Vec<String> {
        let Some(headers) = self.tailer.headers() else {
            return Vec::new();
        };
        if self.settings.fields.is_empty() {
            return headers.names().to_vec();
        }
        self.settings
            .fields
            .iter()
            .filter(|f| headers.contains(f))
            .cloned()
            .collect()
    }

    fn select<'a>(&mut self, list: &'a [String]) -> &'a str {
        self.shown_len = list.len();
        self.selection = self.selection.min(list.len().saturating_sub(1));
        &list[self.selection]
    }

    fn test_frame(&mut self, elapsed: Duration, reason: &str) -> Frame {
        self.enter(DashMode::Test, reason);
        self.blink_on = !self.blink_on;

        let labels = self.settings.test_labels.clone();
        let label = if labels.is_empty() {
            String::new()
        } else {
            self.select(&labels).to_string()
        };
        let value = synthetic_value(&label, elapsed);
        Frame {
            value: DisplayValue { label, value },
            flags: IndicatorFlags { test_mode: true, blink_on: self.blink_on, no_data: false },
        }
    }

    fn enter(&mut self, mode: DashMode, reason: &str) {
        if self.mode != Some(mode) {
            info!("mode {:?} ({})", mode, reason);
            self.mode = Some(mode);
        }
    }
}
