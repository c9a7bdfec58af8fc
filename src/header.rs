/*
 *  header.rs
 *
 *  EcuMonS - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Header row detection and field name to column mapping
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

use std::collections::HashMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Column separator used by a datalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Tab,
    Comma,
}

impl Delimiter {
    pub fn as_char(self) -> char {
        match self {
            Delimiter::Tab => '\t',
            Delimiter::Comma => ',',
        }
    }

    /// Split a record into trimmed, unquoted columns
    pub fn split(self, line: &str) -> Vec<String> {
        line.split(self.as_char()).map(clean_column).collect()
    }

    /// Pick whichever separator dominates `lines`; tab wins ties and silence.
    pub fn detect<'a>(lines: impl IntoIterator<Item = &'a str>) -> Delimiter {
        let (tabs, commas) = lines.into_iter().fold((0usize, 0usize), |(t, c), l| {
            (t + l.matches('\t').count(), c + l.matches(',').count())
        });
        if commas > tabs { Delimiter::Comma } else { Delimiter::Tab }
    }
}

/// Delimiter as configured per deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum DelimiterChoice {
    #[default]
    Auto,
    Tab,
    Comma,
}

impl DelimiterChoice {
    pub fn fixed(self) -> Option<Delimiter> {
        match self {
            DelimiterChoice::Auto => None,
            DelimiterChoice::Tab => Some(Delimiter::Tab),
            DelimiterChoice::Comma => Some(Delimiter::Comma),
        }
    }
}

fn clean_column(raw: &str) -> String {
    let s = raw.trim();
    let s = s
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s);
    s.trim().to_string()
}

/// True when the column reads as a number ("14.7", "-3", "1e3")
pub fn is_numeric(column: &str) -> bool {
    let c = column.trim();
    !c.is_empty() && c.parse::<f64>().is_ok()
}

/// A record counts as data only if every column is numeric
pub fn is_numeric_row(columns: &[String]) -> bool {
    !columns.is_empty() && columns.iter().all(|c| is_numeric(c))
}

/// Field name to column index for one datalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    columns: HashMap<String, usize>,
    names: Vec<String>,
}

impl HeaderMap {
    /// Build from names in column order. Blank names keep their slot but
    /// are not addressable; on duplicates the first column wins.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut map = HeaderMap::default();
        for (idx, name) in names.into_iter().enumerate() {
            let name = name.into();
            if !name.is_empty() && !map.columns.contains_key(&name) {
                map.columns.insert(name.clone(), idx);
                map.names.push(name);
            }
        }
        map
    }

    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.columns.get(field).copied()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.columns.contains_key(field)
    }

    /// Addressable names in column order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Highest column index plus one
    pub fn width(&self) -> usize {
        self.columns.values().max().map_or(0, |m| m + 1)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One complete line from the head of a datalog, with the byte offset just past its terminator.
#[derive(Debug, Clone)]
pub struct Line {
    pub text: String,
    pub end: u64,
}

/// Split a byte buffer into complete lines; an unterminated tail is left out.
pub fn complete_lines(buf: &[u8], base: u64) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut start = 0usize;
    for (i, b) in buf.iter().enumerate() {
        if *b == b'\n' {
            let raw = &buf[start..i];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            lines.push(Line {
                text: String::from_utf8_lossy(raw).into_owned(),
                end: base + i as u64 + 1,
            });
            start = i + 1;
        }
    }
    lines
}

/// A resolved header plus where the data rows begin.
#[derive(Debug, Clone)]
pub struct HeaderResolution {
    pub headers: HeaderMap,
    pub delimiter: Delimiter,
    pub data_start: u64,
}

/// How a datalog producer lays out its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderStrategy {
    /// Line 1 is the header
    FirstLine,
    /// Header is the last non-empty line before the first all-numeric row
    ScanNumeric,
    /// Header is the first line starting with one of these tokens
    Keyword(Vec<String>),
}

impl HeaderStrategy {
    /// Resolve the header from the complete lines at the head of a datalog.
    ///
    /// `None` means the header cannot be located yet: nothing has been
    /// written, or (for `ScanNumeric`) no all-numeric row exists.
    pub fn resolve(&self, lines: &[Line], choice: DelimiterChoice) -> Option<HeaderResolution> {
        match self {
            HeaderStrategy::FirstLine => {
                let first = lines.first()?;
                let delimiter = choice.fixed().unwrap_or_else(|| Delimiter::detect([first.text.as_str()]));
                Some(HeaderResolution {
                    headers: HeaderMap::from_names(delimiter.split(&first.text)),
                    delimiter,
                    data_start: first.end,
                })
            }
            HeaderStrategy::Keyword(prefixes) => {
                let header = lines.iter().find(|l| {
                    let t = l.text.trim_start_matches('"');
                    prefixes.iter().any(|p| !p.is_empty() && t.starts_with(p.as_str()))
                })?;
                let delimiter = choice.fixed().unwrap_or_else(|| Delimiter::detect([header.text.as_str()]));
                Some(HeaderResolution {
                    headers: HeaderMap::from_names(delimiter.split(&header.text)),
                    delimiter,
                    data_start: header.end,
                })
            }
            HeaderStrategy::ScanNumeric => {
                let delimiter = choice
                    .fixed()
                    .unwrap_or_else(|| Delimiter::detect(lines.iter().map(|l| l.text.as_str())));
                let mut previous: Option<&Line> = None;
                for line in lines {
                    if line.text.trim().is_empty() {
                        continue;
                    }
                    if !is_numeric_row(&delimiter.split(&line.text)) {
                        previous = Some(line);
                        continue;
                    }
                    if let Some(header) = previous {
                        return Some(HeaderResolution {
                            headers: HeaderMap::from_names(delimiter.split(&header.text)),
                            delimiter,
                            data_start: header.end,
                        });
                    }
                }
                None
            }
        }
    }
}

/// Line prefixes that open a TunerStudio/MegaLog header
pub const DEFAULT_HEADER_KEYWORDS: [&str; 2] = ["Time", "ts"];

/// Header strategy as named in config and on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum HeaderKind {
    FirstLine,
    ScanNumeric,
    #[default]
    Keyword,
}

impl HeaderKind {
    pub fn default_keywords() -> Vec<String> {
        DEFAULT_HEADER_KEYWORDS.iter().map(|s| s.to_string()).collect()
    }

    pub fn strategy(self, keywords: &[String]) -> HeaderStrategy {
        match self {
            HeaderKind::FirstLine => HeaderStrategy::FirstLine,
            HeaderKind::ScanNumeric => HeaderStrategy::ScanNumeric,
            HeaderKind::Keyword => HeaderStrategy::Keyword(keywords.to_vec()),
        }
    }
}
