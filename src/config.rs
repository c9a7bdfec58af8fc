/*
 *  config.rs
 *
 *  EcuMonS - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Layered configuration: defaults, YAML file, command line
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

use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}, time::Duration};
use thiserror::Error;

use crate::button::ButtonTiming;
use crate::header::{DelimiterChoice, HeaderKind};
use crate::synthetic::DEFAULT_TEST_LABELS;
use crate::tailer::{StartPolicy, TailOptions};

pub const DEFAULT_LOG_DIR: &str = "/home/pi/TunerStudioProjects/datalogs";
pub const DEFAULT_EXTENSIONS: [&str; 2] = ["msl", "mlg"];
pub const DEFAULT_POLL_MS: u64 = 200;
pub const DEFAULT_BUTTON_PIN: u8 = 17;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level app configuration. Every field is optional so files and
/// flags can be layered; accessors supply the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub log_level: Option<String>,     // e.g., "info" | "debug"
    /// Directory the datalogger writes into
    pub log_dir: Option<PathBuf>,
    /// Datalog suffixes, without the dot
    pub extensions: Option<Vec<String>>,
    pub delimiter: Option<DelimiterChoice>,
    pub header: Option<HeaderKind>,
    /// Line prefixes for the `keyword` header strategy
    pub header_keywords: Option<Vec<String>>,
    pub start_policy: Option<StartPolicy>,
    /// Fields the button cycles through, in order; empty = every column
    pub fields: Option<Vec<String>>,
    /// Labels shown in test mode
    pub test_labels: Option<Vec<String>>,
    pub poll_interval_ms: Option<u64>,
    /// Delete datalogs from previous days at startup
    pub prune_old_logs: Option<bool>,
    pub button: Option<ButtonConfig>,
    pub display: Option<DisplayConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ButtonConfig {
    pub pin: Option<u8>,            // BCM numbering
    pub active_low: Option<bool>,
    pub debounce_ms: Option<u64>,
    pub long_press_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DisplayConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub rotate_deg: Option<u16>,
    pub invert: Option<bool>,
    pub brightness: Option<u8>,     // 0-255
    pub driver: Option<DriverKind>, // <- strongly-typed driver selection
    pub bus: Option<BusConfig>,     // <- i2c wiring
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BusConfig {
    I2c {
        bus: String,        // e.g. "/dev/i2c-1"
        address: u8,        // e.g. 0x3C (I2C addresses are 7-bit, stored in u8)
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Ssd1306,
    /// No panel; frames are written to the log
    Log,
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone, Default)]
#[command(name = "ecumons", version, about = "TunerStudio datalog dashboard for small OLED panels")]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(short = 'c', long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    /// Enable debug log level
    #[arg(short = 'v', long, alias = "verbose", action = ArgAction::SetTrue)]
    pub debug: bool,
    #[arg(long)]
    pub log_level: Option<String>,
    /// Datalog directory to follow
    #[arg(short = 'd', long, value_hint = ValueHint::DirPath)]
    pub log_dir: Option<PathBuf>,
    /// Datalog extension (repeatable)
    #[arg(short = 'e', long = "ext")]
    pub extensions: Vec<String>,
    #[arg(long, value_enum)]
    pub delimiter: Option<DelimiterChoice>,
    #[arg(long, value_enum)]
    pub header: Option<HeaderKind>,
    #[arg(long, value_enum)]
    pub start_policy: Option<StartPolicy>,
    /// Field to cycle through (repeatable, in order)
    #[arg(short = 'f', long = "field")]
    pub fields: Vec<String>,
    #[arg(long)]
    pub poll_ms: Option<u64>,
    /// Delete datalogs from previous days at startup
    #[arg(long, action = ArgAction::SetTrue)]
    pub prune: bool,
    #[arg(long)]
    pub button_pin: Option<u8>,
    /// I2C bus device path for the OLED (e.g., /dev/i2c-1)
    #[arg(long)]
    pub i2c_bus: Option<String>,
    /// Log frames instead of driving a panel
    #[arg(long, action = ArgAction::SetTrue)]
    pub headless: bool,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: read YAML, merge CLI, validate.
pub fn load(cli: &Cli) -> Result<Config, ConfigError> {
    // 1) defaults (from `Default` impl)
    let mut cfg = Config::default();

    // 2) YAML file (explicit path or search)
    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        log::debug!("using config {}", p.display());
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, cli);

    // 4) Validate
    validate(&cfg)?;

    Ok(cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/ecumons/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/ecumons/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/ecumons.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["ecumons.yaml", "config.yaml", "config/ecumons.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

pub fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    parse_yaml(&s)
}

pub fn parse_yaml(s: &str) -> Result<Config, ConfigError> {
    Ok(serde_yaml::from_str(s)?)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
pub fn merge(dst: &mut Config, src: Config) {
    if src.log_level.is_some()        { dst.log_level = src.log_level; }
    if src.log_dir.is_some()          { dst.log_dir = src.log_dir; }
    if src.extensions.is_some()       { dst.extensions = src.extensions; }
    if src.delimiter.is_some()        { dst.delimiter = src.delimiter; }
    if src.header.is_some()           { dst.header = src.header; }
    if src.header_keywords.is_some()  { dst.header_keywords = src.header_keywords; }
    if src.start_policy.is_some()     { dst.start_policy = src.start_policy; }
    if src.fields.is_some()           { dst.fields = src.fields; }
    if src.test_labels.is_some()      { dst.test_labels = src.test_labels; }
    if src.poll_interval_ms.is_some() { dst.poll_interval_ms = src.poll_interval_ms; }
    if src.prune_old_logs.is_some()   { dst.prune_old_logs = src.prune_old_logs; }
    match (&mut dst.button, src.button) {
        (None, Some(c)) => dst.button = Some(c),
        (Some(d), Some(s)) => merge_button(d, s),
        _ => {}
    }
    match (&mut dst.display, src.display) {
        (None, Some(c)) => dst.display = Some(c),
        (Some(d), Some(s)) => merge_display(d, s),
        _ => {}
    }
}

fn merge_button(dst: &mut ButtonConfig, src: ButtonConfig) {
    if src.pin.is_some()           { dst.pin = src.pin; }
    if src.active_low.is_some()    { dst.active_low = src.active_low; }
    if src.debounce_ms.is_some()   { dst.debounce_ms = src.debounce_ms; }
    if src.long_press_ms.is_some() { dst.long_press_ms = src.long_press_ms; }
}

fn merge_display(dst: &mut DisplayConfig, src: DisplayConfig) {
    if src.width.is_some()       { dst.width = src.width; }
    if src.height.is_some()      { dst.height = src.height; }
    if src.rotate_deg.is_some()  { dst.rotate_deg = src.rotate_deg; }
    if src.invert.is_some()      { dst.invert = src.invert; }
    if src.brightness.is_some()  { dst.brightness = src.brightness; }
    if src.driver.is_some()      { dst.driver = src.driver; }
    if src.bus.is_some()         { dst.bus = src.bus; }
}

pub fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some()    { cfg.log_level = cli.log_level.clone(); }
    if cli.log_dir.is_some()      { cfg.log_dir = cli.log_dir.clone(); }
    if !cli.extensions.is_empty() { cfg.extensions = Some(cli.extensions.clone()); }
    if cli.delimiter.is_some()    { cfg.delimiter = cli.delimiter; }
    if cli.header.is_some()       { cfg.header = cli.header; }
    if cli.start_policy.is_some() { cfg.start_policy = cli.start_policy; }
    if !cli.fields.is_empty()     { cfg.fields = Some(cli.fields.clone()); }
    if cli.poll_ms.is_some()      { cfg.poll_interval_ms = cli.poll_ms; }
    if cli.prune                  { cfg.prune_old_logs = Some(true); }

    if let Some(pin) = cli.button_pin {
        cfg.button.get_or_insert_with(ButtonConfig::default).pin = Some(pin);
    }
    if cli.headless {
        cfg.display.get_or_insert_with(DisplayConfig::default).driver = Some(DriverKind::Log);
    }
    if let Some(bus) = cli.i2c_bus.as_ref() {
        let display = cfg.display.get_or_insert_with(DisplayConfig::default);
        let address = match display.bus.as_ref() {
            Some(BusConfig::I2c { address, .. }) => *address,
            None => 0x3C,
        };
        display.bus = Some(BusConfig::I2c { bus: bus.clone(), address });
    }
}

/// Put any invariants here (required fields, ranges, etc.)
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if let Some(exts) = cfg.extensions.as_ref() {
        if exts.iter().all(|e| e.trim_start_matches('.').is_empty()) {
            return Err(ConfigError::Validation("extensions must name at least one suffix".into()));
        }
    }
    if let Some(ms) = cfg.poll_interval_ms {
        if ms == 0 || ms > 10_000 {
            return Err(ConfigError::Validation("poll_interval_ms must be 1..=10000".into()));
        }
    }
    if let Some(labels) = cfg.test_labels.as_ref() {
        if labels.is_empty() {
            return Err(ConfigError::Validation("test_labels must not be empty".into()));
        }
    }
    if let Some(button) = cfg.button.as_ref() {
        let timing = cfg.button_timing();
        if timing.long_press <= timing.debounce {
            return Err(ConfigError::Validation("button long_press_ms must exceed debounce_ms".into()));
        }
        if let Some(pin) = button.pin {
            if pin > 27 {
                return Err(ConfigError::Validation("button pin must be a BCM GPIO 0..=27".into()));
            }
        }
    }
    if let Some(display) = cfg.display.as_ref() {
        if let (Some(w), Some(h)) = (display.width, display.height) {
            if w == 0 || h == 0 {
                return Err(ConfigError::Validation("display width/height must be > 0".into()));
            }
        }
        if let Some(rot) = display.rotate_deg {
            match rot {
                0 | 90 | 180 | 270 => {},
                _ => return Err(ConfigError::Validation("display rotate_deg must be 0|90|180|270".into()))
            }
        }
    }
    Ok(())
}

impl Config {
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR))
    }

    pub fn extensions(&self) -> Vec<String> {
        self.extensions
            .clone()
            .unwrap_or_else(|| DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect())
    }

    pub fn fields(&self) -> Vec<String> {
        self.fields.clone().unwrap_or_default()
    }

    pub fn test_labels(&self) -> Vec<String> {
        self.test_labels
            .clone()
            .unwrap_or_else(|| DEFAULT_TEST_LABELS.iter().map(|s| s.to_string()).collect())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(DEFAULT_POLL_MS))
    }

    pub fn prune_old_logs(&self) -> bool {
        self.prune_old_logs.unwrap_or(false)
    }

    pub fn tail_options(&self) -> TailOptions {
        let keywords = self
            .header_keywords
            .clone()
            .unwrap_or_else(HeaderKind::default_keywords);
        TailOptions {
            delimiter: self.delimiter.unwrap_or_default(),
            strategy: self.header.unwrap_or_default().strategy(&keywords),
            start: self.start_policy.unwrap_or_default(),
        }
    }

    pub fn button_pin(&self) -> u8 {
        self.button.as_ref().and_then(|b| b.pin).unwrap_or(DEFAULT_BUTTON_PIN)
    }

    pub fn button_active_low(&self) -> bool {
        self.button.as_ref().and_then(|b| b.active_low).unwrap_or(true)
    }

    pub fn button_timing(&self) -> ButtonTiming {
        let defaults = ButtonTiming::default();
        let b = self.button.clone().unwrap_or_default();
        ButtonTiming {
            debounce: b.debounce_ms.map(Duration::from_millis).unwrap_or(defaults.debounce),
            long_press: b.long_press_ms.map(Duration::from_millis).unwrap_or(defaults.long_press),
        }
    }

    pub fn driver(&self) -> DriverKind {
        self.display.as_ref().and_then(|d| d.driver).unwrap_or(DriverKind::Ssd1306)
    }

    /// (bus path, address) for the panel
    pub fn i2c(&self) -> (String, u8) {
        match self.display.as_ref().and_then(|d| d.bus.as_ref()) {
            Some(BusConfig::I2c { bus, address }) => (bus.clone(), *address),
            None => ("/dev/i2c-1".to_string(), 0x3C),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HeaderStrategy;

    const SAMPLE: &str = r#"
log_dir: /data/logs
extensions: [msl]
header: scan_numeric
start_policy: end_of_file
fields: [RPM, AFR, CLT]
button:
  pin: 22
  long_press_ms: 2000
display:
  driver: ssd1306
  rotate_deg: 180
  bus:
    type: i2c
    bus: /dev/i2c-3
    address: 61
"#;

    #[test]
    fn test_yaml_parse_and_accessors() {
        let cfg = parse_yaml(SAMPLE).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.log_dir(), PathBuf::from("/data/logs"));
        assert_eq!(cfg.extensions(), vec!["msl"]);
        assert_eq!(cfg.fields(), vec!["RPM", "AFR", "CLT"]);
        assert_eq!(cfg.button_pin(), 22);
        assert_eq!(cfg.button_timing().long_press, Duration::from_millis(2000));
        assert_eq!(cfg.button_timing().debounce, Duration::from_millis(50));
        assert_eq!(cfg.i2c(), ("/dev/i2c-3".to_string(), 61));
        let opts = cfg.tail_options();
        assert_eq!(opts.strategy, HeaderStrategy::ScanNumeric);
        assert_eq!(opts.start, StartPolicy::EndOfFile);
        assert_eq!(opts.delimiter, DelimiterChoice::Auto);
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.extensions(), vec!["msl", "mlg"]);
        assert_eq!(cfg.test_labels().len(), 5);
        assert_eq!(cfg.poll_interval(), Duration::from_millis(DEFAULT_POLL_MS));
        assert_eq!(cfg.driver(), DriverKind::Ssd1306);
        assert!(!cfg.prune_old_logs());
        assert_eq!(
            cfg.tail_options().strategy,
            HeaderStrategy::Keyword(vec!["Time".to_string(), "ts".to_string()])
        );
    }

    #[test]
    fn test_cli_overrides_yaml() {
        let mut cfg = parse_yaml(SAMPLE).unwrap();
        let cli = Cli {
            log_dir: Some(PathBuf::from("/tmp/x")),
            fields: vec!["MAP".to_string()],
            headless: true,
            i2c_bus: Some("/dev/i2c-0".to_string()),
            ..Default::default()
        };
        apply_cli_overrides(&mut cfg, &cli);
        assert_eq!(cfg.log_dir(), PathBuf::from("/tmp/x"));
        assert_eq!(cfg.fields(), vec!["MAP"]);
        assert_eq!(cfg.driver(), DriverKind::Log);
        assert_eq!(cfg.i2c(), ("/dev/i2c-0".to_string(), 61));
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let mut base = parse_yaml(SAMPLE).unwrap();
        let over = parse_yaml("button:\n  debounce_ms: 30\n").unwrap();
        merge(&mut base, over);
        assert_eq!(base.button_pin(), 22);
        assert_eq!(base.button_timing().debounce, Duration::from_millis(30));
    }

    #[test]
    fn test_validation() {
        assert!(validate(&parse_yaml("poll_interval_ms: 0").unwrap()).is_err());
        assert!(validate(&parse_yaml("display:\n  rotate_deg: 45").unwrap()).is_err());
        assert!(validate(&parse_yaml("button:\n  long_press_ms: 10").unwrap()).is_err());
        assert!(validate(&parse_yaml("extensions: ['.']").unwrap()).is_err());
        assert!(parse_yaml("bogus_key: 1").is_err());
    }
}
