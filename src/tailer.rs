/*
 *  tailer.rs
 *
 *  EcuMonS - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Incremental reader for a datalog that is still being written
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

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use clap::ValueEnum;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use crate::error::{LookupResult, TailError};
use crate::header::{
    complete_lines, is_numeric, Delimiter, DelimiterChoice, HeaderKind, HeaderMap, HeaderStrategy,
};
use crate::locator::LogFile;

/// Bytes read from the head of a file when looking for the header
const HEADER_WINDOW: u64 = 64 * 1024;

/// On adoption with `LastRow`, only this much of the existing body is read
const BACKLOG_WINDOW: u64 = 8 * 1024;

/// Unread backlog larger than this is skipped down to its newest rows
const PUMP_WINDOW: u64 = 64 * 1024;

/// Where the cursor lands when a new datalog is adopted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum StartPolicy {
    /// Surface the newest row already in the file, then follow appends
    #[default]
    LastRow,
    /// Only rows appended after adoption are surfaced
    EndOfFile,
}

/// Per-deployment knobs for reading datalogs
#[derive(Debug, Clone)]
pub struct TailOptions {
    pub delimiter: DelimiterChoice,
    pub strategy: HeaderStrategy,
    pub start: StartPolicy,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            delimiter: DelimiterChoice::Auto,
            strategy: HeaderKind::default().strategy(&HeaderKind::default_keywords()),
            start: StartPolicy::LastRow,
        }
    }
}

/// Read position within the adopted datalog. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TailCursor {
    offset: u64,
}

impl TailCursor {
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn advance_to(&mut self, offset: u64) {
        debug_assert!(offset >= self.offset);
        self.offset = self.offset.max(offset);
    }
}

/// Everything tied to one adopted datalog; dropped wholesale on rotation.
struct Adopted {
    log: LogFile,
    file: File,
    headers: HeaderMap,
    delimiter: Delimiter,
    cursor: TailCursor,
    /// latest non-empty value per column
    latest: Vec<Option<String>>,
    /// file length at the last unsuccessful header attempt
    header_probe_len: Option<u64>,
    /// (dev, inode) of the open handle
    identity: (u64, u64),
    /// bytes `[0, data_start)` as they were when the header was resolved
    header_bytes: Vec<u8>,
    /// file length at which `header_bytes` last matched the file
    verified_len: u64,
}

/// Follows one datalog at a time and answers "latest value of field X".
pub struct LogTailer {
    options: TailOptions,
    adopted: Option<Adopted>,
}

impl LogTailer {
    pub fn new(options: TailOptions) -> Self {
        Self { options, adopted: None }
    }

    pub fn options(&self) -> &TailOptions {
        &self.options
    }

    /// The datalog currently followed
    pub fn current(&self) -> Option<&LogFile> {
        self.adopted.as_ref().map(|a| &a.log)
    }

    /// Header of the current datalog
    pub fn headers(&self) -> Option<&HeaderMap> {
        self.adopted.as_ref().map(|a| &a.headers)
    }

    pub fn cursor(&self) -> Option<TailCursor> {
        self.adopted.as_ref().map(|a| a.cursor)
    }

    /// Close the handle and forget header, cursor and cached values.
    pub fn release(&mut self) {
        if let Some(old) = self.adopted.take() {
            debug!("released {}", old.log.path.display());
        }
    }

    /// Start following `log`, replacing whatever was followed before.
    ///
    /// A header that cannot be found yet yields an empty map, not an error;
    /// only failing to open or read the file is an error.
    pub fn adopt(&mut self, log: LogFile) -> Result<&HeaderMap, TailError> {
        self.release();

        let file = File::open(&log.path)?;
        let meta = file.metadata()?;
        let mut adopted = Adopted {
            log,
            file,
            headers: HeaderMap::default(),
            delimiter: Delimiter::Tab,
            cursor: TailCursor::default(),
            latest: Vec::new(),
            header_probe_len: None,
            identity: (meta.dev(), meta.ino()),
            header_bytes: Vec::new(),
            verified_len: 0,
        };
        adopted.resolve_header(&self.options)?;

        if adopted.headers.is_empty() {
            info!("adopted {} (header not found yet)", adopted.log.path.display());
        } else {
            info!(
                "adopted {} ({} fields, {:?} separated, data at byte {})",
                adopted.log.path.display(),
                adopted.headers.len(),
                adopted.delimiter,
                adopted.cursor.offset()
            );
        }

        Ok(&self.adopted.insert(adopted).headers)
    }

    /// Latest value for `field`, reading whatever complete rows have been
    /// appended since the previous call.
    pub fn next_value(&mut self, field: &str) -> LookupResult {
        let options = &self.options;
        let Some(adopted) = self.adopted.as_mut() else {
            return LookupResult::NotFound;
        };

        if adopted.headers.is_empty() {
            if let Err(e) = adopted.retry_header(options) {
                return LookupResult::Error(e);
            }
            if adopted.headers.is_empty() {
                return LookupResult::NotFound;
            }
        }

        let Some(index) = adopted.headers.index_of(field) else {
            trace!("{}", TailError::UnresolvedField(field.to_string()));
            return LookupResult::NotFound;
        };

        if let Err(e) = adopted.pump() {
            return LookupResult::Error(e);
        }

        match adopted.latest.get(index).cloned().flatten() {
            Some(value) => LookupResult::Found(value),
            None => LookupResult::NotFound,
        }
    }
}

impl Adopted {
    fn retry_header(&mut self, options: &TailOptions) -> Result<(), TailError> {
        let len = self.file.metadata()?.len();
        if self.header_probe_len == Some(len) {
            return Ok(());
        }
        self.resolve_header(options)
    }

    fn resolve_header(&mut self, options: &TailOptions) -> Result<(), TailError> {
        let len = self.file.metadata()?.len();
        let mut head = Vec::new();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.by_ref().take(HEADER_WINDOW).read_to_end(&mut head)?;

        let lines = complete_lines(&head, 0);
        let Some(res) = options.strategy.resolve(&lines, options.delimiter) else {
            self.header_probe_len = Some(len);
            return Ok(());
        };

        self.header_probe_len = None;
        self.header_bytes = head[..res.data_start as usize].to_vec();
        self.verified_len = len;
        self.delimiter = res.delimiter;
        self.latest = vec![None; res.headers.width()];
        self.headers = res.headers;
        self.cursor = TailCursor { offset: res.data_start };

        let start = match options.start {
            StartPolicy::LastRow => backlog_start(&mut self.file, res.data_start, len, BACKLOG_WINDOW)?,
            StartPolicy::EndOfFile => last_line_end(&mut self.file, res.data_start, len)?,
        };
        self.cursor.advance_to(start);
        Ok(())
    }

    /// Fail if the path now names another file, or if the bytes up to the
    /// first data row differ from those the header was resolved from.
    fn verify_identity(&mut self, len: u64) -> Result<(), TailError> {
        let on_disk = fs::metadata(&self.log.path)?;
        if (on_disk.dev(), on_disk.ino()) != self.identity {
            return Err(invalidated(&self.log.path, "replaced"));
        }
        if len == self.verified_len || self.header_bytes.is_empty() {
            return Ok(());
        }
        if len < self.header_bytes.len() as u64 {
            return Err(invalidated(&self.log.path, "truncated into its header"));
        }

        let mut head = Vec::with_capacity(self.header_bytes.len());
        self.file.seek(SeekFrom::Start(0))?;
        self.file.by_ref().take(self.header_bytes.len() as u64).read_to_end(&mut head)?;
        if head != self.header_bytes {
            return Err(invalidated(&self.log.path, "rewritten with a new header"));
        }
        self.verified_len = len;
        Ok(())
    }

    /// Consume every complete row between the cursor and end of file.
    fn pump(&mut self) -> Result<(), TailError> {
        let len = self.file.metadata()?.len();
        self.verify_identity(len)?;

        let mut offset = self.cursor.offset();
        if len < offset {
            return Err(invalidated(&self.log.path, &format!("truncated below byte {}", offset)));
        }
        if len == offset {
            return Ok(());
        }
        if len - offset > PUMP_WINDOW {
            let skip_to = backlog_start(&mut self.file, offset, len, PUMP_WINDOW)?;
            debug!("skipping {} bytes of unread backlog", skip_to - offset);
            self.cursor.advance_to(skip_to);
            offset = skip_to;
        }

        let mut buf = Vec::with_capacity((len - offset) as usize);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.by_ref().take(len - offset).read_to_end(&mut buf)?;

        let lines = complete_lines(&buf, offset);
        let consumed = lines.last().map_or(offset, |l| l.end);
        for line in &lines {
            self.take_row(&line.text);
        }
        if consumed < offset + buf.len() as u64 {
            trace!("{}", TailError::PartialWrite(consumed));
        }
        self.cursor.advance_to(consumed);
        Ok(())
    }

    fn take_row(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let columns = self.delimiter.split(text);
        // units rows, MARK lines and other annotations carry no numbers
        if !columns.iter().any(|c| is_numeric(c)) {
            trace!("skipping non-data row: {}", text);
            return;
        }
        if columns.len() < self.latest.len() {
            trace!(
                "{}",
                TailError::MalformedRow { columns: columns.len(), index: self.latest.len() - 1 }
            );
        }
        for (slot, value) in self.latest.iter_mut().zip(columns) {
            if !value.is_empty() {
                *slot = Some(value);
            }
        }
    }
}

fn invalidated(path: &Path, why: &str) -> TailError {
    TailError::IoFailure(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("{} {}", path.display(), why),
    ))
}

/// Offset of the first full line inside the last `window` bytes.
fn backlog_start(file: &mut File, data_start: u64, len: u64, window: u64) -> io::Result<u64> {
    if len <= data_start + window {
        return Ok(data_start);
    }
    let from = len - window;
    // start one byte early so a line beginning exactly at `from` is kept
    let probe = from - 1;
    let mut buf = Vec::new();
    file.seek(SeekFrom::Start(probe))?;
    file.by_ref().take(len - probe).read_to_end(&mut buf)?;
    Ok(match buf.iter().position(|b| *b == b'\n') {
        Some(i) => probe + i as u64 + 1,
        None => data_start,
    })
}

/// Offset just past the last terminated line, never before `data_start`.
fn last_line_end(file: &mut File, data_start: u64, len: u64) -> io::Result<u64> {
    if len <= data_start {
        return Ok(data_start);
    }
    let mut buf = Vec::new();
    file.seek(SeekFrom::Start(data_start))?;
    file.by_ref().take(len - data_start).read_to_end(&mut buf)?;
    Ok(match buf.iter().rposition(|b| *b == b'\n') {
        Some(i) => data_start + i as u64 + 1,
        None => data_start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::find_latest;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use std::time::{Duration, SystemTime};

    const HEADER: &str = "Time\tMAP\tAFR\tCLT\tMAT\n";

    fn write_log(dir: &Path, name: &str, body: &str) -> LogFile {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        LogFile { path: path.clone(), modified_at: std::fs::metadata(&path).unwrap().modified().unwrap() }
    }

    fn append(path: &PathBuf, text: &str) {
        let mut f = OpenOptions::new().append(true).open(path).unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    fn found(r: LookupResult) -> Option<String> {
        match r {
            LookupResult::Found(v) => Some(v),
            _ => None,
        }
    }

    #[test]
    fn test_reads_field_from_row() {
        let tmp = tempfile::tempdir().unwrap();
        let log = write_log(tmp.path(), "a.msl", &format!("{HEADER}0.1\t100\t14.7\t90\t25\n"));
        let mut tailer = LogTailer::new(TailOptions::default());
        let headers = tailer.adopt(log).unwrap();
        assert_eq!(headers.len(), 5);
        assert_eq!(found(tailer.next_value("AFR")).as_deref(), Some("14.7"));
        assert_eq!(found(tailer.next_value("MAT")).as_deref(), Some("25"));
    }

    #[test]
    fn test_repeat_call_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let log = write_log(tmp.path(), "a.msl", &format!("{HEADER}0.1\t100\t14.7\t90\t25\n"));
        let end = std::fs::metadata(&log.path).unwrap().len();
        let mut tailer = LogTailer::new(TailOptions::default());
        tailer.adopt(log).unwrap();

        assert_eq!(found(tailer.next_value("AFR")).as_deref(), Some("14.7"));
        let cursor = tailer.cursor().unwrap();
        assert_eq!(found(tailer.next_value("AFR")).as_deref(), Some("14.7"));
        assert_eq!(tailer.cursor().unwrap(), cursor);
        assert_eq!(cursor.offset(), end);
    }

    #[test]
    fn test_partial_line_is_held_back() {
        let tmp = tempfile::tempdir().unwrap();
        let log = write_log(tmp.path(), "a.msl", &format!("{HEADER}0.1\t100\t14.7\t90\t25\n"));
        let path = log.path.clone();
        let mut tailer = LogTailer::new(TailOptions::default());
        tailer.adopt(log).unwrap();
        assert_eq!(found(tailer.next_value("AFR")).as_deref(), Some("14.7"));
        let before = tailer.cursor().unwrap();

        append(&path, "0.2\t101\t13.");
        assert_eq!(found(tailer.next_value("AFR")).as_deref(), Some("14.7"));
        assert_eq!(tailer.cursor().unwrap(), before);

        append(&path, "9\t91\t26\n");
        assert_eq!(found(tailer.next_value("AFR")).as_deref(), Some("13.9"));
        assert_eq!(found(tailer.next_value("CLT")).as_deref(), Some("91"));
    }

    #[test]
    fn test_unknown_field_is_consistently_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let log = write_log(tmp.path(), "a.msl", &format!("{HEADER}0.1\t100\t14.7\t90\t25\n"));
        let mut tailer = LogTailer::new(TailOptions::default());
        tailer.adopt(log).unwrap();
        for _ in 0..3 {
            assert!(matches!(tailer.next_value("BOOST"), LookupResult::NotFound));
        }
    }

    #[test]
    fn test_end_of_file_policy_skips_existing_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let log = write_log(tmp.path(), "a.msl", &format!("{HEADER}0.1\t100\t14.7\t90\t25\n"));
        let path = log.path.clone();
        let mut tailer = LogTailer::new(TailOptions { start: StartPolicy::EndOfFile, ..Default::default() });
        tailer.adopt(log).unwrap();
        assert!(matches!(tailer.next_value("AFR"), LookupResult::NotFound));

        append(&path, "0.2\t98\t15.1\t90\t25\n");
        assert_eq!(found(tailer.next_value("AFR")).as_deref(), Some("15.1"));
    }

    #[test]
    fn test_last_row_policy_reads_tail_of_long_log() {
        let tmp = tempfile::tempdir().unwrap();
        let mut body = String::from(HEADER);
        for i in 0..2000 {
            body.push_str(&format!("{i}.0\t100\t14.{}\t90\t25\n", i % 10));
        }
        body.push_str("9999.0\t100\t12.3\t90\t25\n");
        let log = write_log(tmp.path(), "long.msl", &body);
        let mut tailer = LogTailer::new(TailOptions::default());
        tailer.adopt(log).unwrap();
        assert!(tailer.cursor().unwrap().offset() > HEADER.len() as u64);
        assert_eq!(found(tailer.next_value("AFR")).as_deref(), Some("12.3"));
        assert_eq!(found(tailer.next_value("Time")).as_deref(), Some("9999.0"));
    }

    #[test]
    fn test_noise_and_short_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let body = format!("{HEADER}s\tkPa\tAFR\tC\tC\n0.1\t100\t14.7\t90\t25\nMARK 001\n0.2\t99\n");
        let log = write_log(tmp.path(), "a.msl", &body);
        let mut tailer = LogTailer::new(TailOptions::default());
        tailer.adopt(log).unwrap();
        assert_eq!(found(tailer.next_value("MAP")).as_deref(), Some("99"));
        assert_eq!(found(tailer.next_value("AFR")).as_deref(), Some("14.7"));
    }

    #[test]
    fn test_comma_log() {
        let tmp = tempfile::tempdir().unwrap();
        let log = write_log(tmp.path(), "a.csv", "Time,RPM,AFR\n1.0,2500,13.2\n");
        let mut tailer = LogTailer::new(TailOptions::default());
        tailer.adopt(log).unwrap();
        assert_eq!(found(tailer.next_value("RPM")).as_deref(), Some("2500"));
    }

    #[test]
    fn test_scan_numeric_without_data_yields_empty_header() {
        let tmp = tempfile::tempdir().unwrap();
        let log = write_log(tmp.path(), "a.msl", "\"MS3 Format\"\nTime\tRPM\ns\trpm\n");
        let mut tailer = LogTailer::new(TailOptions { strategy: HeaderStrategy::ScanNumeric, ..Default::default() });
        assert!(tailer.adopt(log).unwrap().is_empty());
        for field in ["Time", "RPM", "AFR"] {
            assert!(matches!(tailer.next_value(field), LookupResult::NotFound));
        }
    }

    #[test]
    fn test_header_resolves_once_written() {
        let tmp = tempfile::tempdir().unwrap();
        let log = write_log(tmp.path(), "a.msl", "Time\tRP");
        let path = log.path.clone();
        let mut tailer = LogTailer::new(TailOptions::default());
        assert!(tailer.adopt(log).unwrap().is_empty());
        assert!(matches!(tailer.next_value("RPM"), LookupResult::NotFound));

        append(&path, "M\n0.5\t3100\n");
        assert_eq!(found(tailer.next_value("RPM")).as_deref(), Some("3100"));
    }

    #[test]
    fn test_truncation_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let log = write_log(tmp.path(), "a.msl", &format!("{HEADER}0.1\t100\t14.7\t90\t25\n"));
        let path = log.path.clone();
        let mut tailer = LogTailer::new(TailOptions::default());
        tailer.adopt(log).unwrap();
        assert!(found(tailer.next_value("AFR")).is_some());

        std::fs::write(&path, "Time\n").unwrap();
        assert!(tailer.next_value("AFR").is_error());
    }

    #[test]
    fn test_rewrite_in_place_with_new_layout_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let log = write_log(tmp.path(), "a.msl", "Time\tRPM\tAFR\n0.1\t900\t14.7\n");
        let path = log.path.clone();
        let mut tailer = LogTailer::new(TailOptions::default());
        tailer.adopt(log).unwrap();
        assert_eq!(found(tailer.next_value("RPM")).as_deref(), Some("900"));

        // truncated and refilled past the old cursor between two polls
        std::fs::write(&path, "Time\tAFR\tRPM\n0.0\t12.0\t3000\n0.1\t12.1\t3100\n").unwrap();
        assert!(tailer.next_value("RPM").is_error());

        let relocated = write_log(tmp.path(), "a.msl", "Time\tAFR\tRPM\n0.1\t12.1\t3100\n");
        tailer.adopt(relocated).unwrap();
        assert_eq!(found(tailer.next_value("RPM")).as_deref(), Some("3100"));
    }

    #[test]
    fn test_replaced_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let log = write_log(tmp.path(), "a.msl", &format!("{HEADER}0.1\t100\t14.7\t90\t25\n"));
        let path = log.path.clone();
        let mut tailer = LogTailer::new(TailOptions::default());
        tailer.adopt(log).unwrap();
        assert!(found(tailer.next_value("AFR")).is_some());

        let staged = tmp.path().join("staged.tmp");
        std::fs::write(&staged, format!("{HEADER}0.1\t100\t14.7\t90\t25\n0.2\t100\t11.0\t90\t25\n")).unwrap();
        std::fs::rename(&staged, &path).unwrap();
        assert!(tailer.next_value("AFR").is_error());
    }

    #[test]
    fn test_large_backlog_skips_to_newest_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let log = write_log(tmp.path(), "a.msl", &format!("{HEADER}0.1\t100\t14.7\t90\t25\n"));
        let path = log.path.clone();
        let mut tailer = LogTailer::new(TailOptions::default());
        tailer.adopt(log).unwrap();
        assert_eq!(found(tailer.next_value("AFR")).as_deref(), Some("14.7"));

        let mut backlog = String::new();
        for i in 0..10_000 {
            backlog.push_str(&format!("{i}.5\t100\t13.{}\t90\t25\n", i % 10));
        }
        backlog.push_str("9999.9\t100\t12.2\t90\t25\n");
        append(&path, &backlog);

        assert_eq!(found(tailer.next_value("AFR")).as_deref(), Some("12.2"));
        assert_eq!(tailer.cursor().unwrap().offset(), std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn test_rotation_discards_previous_state() {
        let tmp = tempfile::tempdir().unwrap();
        let exts = vec!["msl".to_string()];
        let a = write_log(tmp.path(), "a.msl", &format!("{HEADER}0.1\t100\t14.7\t90\t25\n"));
        std::fs::File::options()
            .write(true)
            .open(&a.path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(120))
            .unwrap();

        let mut tailer = LogTailer::new(TailOptions::default());
        tailer.adopt(find_latest(tmp.path(), &exts).unwrap()).unwrap();
        assert_eq!(found(tailer.next_value("AFR")).as_deref(), Some("14.7"));

        write_log(tmp.path(), "b.msl", "Time\tRPM\tAFR\n3.0\t4200\t12.5\n");
        let latest = find_latest(tmp.path(), &exts).unwrap();
        assert!(!latest.same_file(tailer.current().unwrap()));
        tailer.adopt(latest).unwrap();

        assert_eq!(found(tailer.next_value("AFR")).as_deref(), Some("12.5"));
        assert!(matches!(tailer.next_value("MAP"), LookupResult::NotFound));
        assert!(matches!(tailer.next_value("CLT"), LookupResult::NotFound));
    }
}
