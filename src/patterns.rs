//! Ordered, named pattern matching against single log lines.
//!
//! A stream's pattern set is evaluated in its defined order and the first
//! pattern that matches wins. The first capture group of the winning pattern
//! is mandatory and must be the line's timestamp; a pattern that matches but
//! yields an unparseable timestamp is treated as non-matching so later
//! patterns still get a chance.

use crate::config::PatternDef;
use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::collections::BTreeMap;
use tracing::warn;

/// Timestamp format of the mandatory leading capture, e.g. `01-01-24 10:00:01.123`.
pub const LINE_TIMESTAMP_FORMAT: &str = "%d-%m-%y %H:%M:%S%.3f";

/// A successfully compiled pattern set, order preserved.
pub struct PatternSet {
    patterns: Vec<CompiledPattern>,
}

struct CompiledPattern {
    name: String,
    regex: Regex,
}

/// Outcome of matching one line against a pattern set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    /// Name of the winning pattern.
    pub pattern_name: String,
    /// Parsed value of the mandatory first capture group.
    pub timestamp: DateTime<Utc>,
    /// Named captures, excluding the timestamp group.
    pub fields: BTreeMap<String, String>,
}

impl PatternSet {
    /// Compile an ordered pattern list.
    ///
    /// A pattern that fails to compile is logged and skipped; the remaining
    /// patterns keep their relative order.
    pub fn compile(defs: &[PatternDef]) -> Self {
        let patterns = defs
            .iter()
            .filter_map(|def| match compile_one(def) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(error = %e, "Skipping invalid pattern");
                    None
                }
            })
            .collect();

        Self { patterns }
    }

    /// Number of usable patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Evaluate the set against one line, first match wins.
    ///
    /// Returns `None` when no pattern matched the line.
    pub fn match_line(&self, line: &str) -> Option<LineMatch> {
        for pattern in &self.patterns {
            let Some(captures) = pattern.regex.captures(line) else {
                continue;
            };

            let Some(raw_timestamp) = captures.get(1) else {
                warn!(
                    pattern = %pattern.name,
                    "Pattern matched but has no capture group for the timestamp"
                );
                continue;
            };

            let timestamp = match parse_line_timestamp(raw_timestamp.as_str()) {
                Ok(timestamp) => timestamp,
                Err(e) => {
                    warn!(
                        pattern = %pattern.name,
                        error = %e,
                        "Matched line has unparseable timestamp, trying next pattern"
                    );
                    continue;
                }
            };

            let fields = collect_named_fields(&pattern.regex, &captures);

            return Some(LineMatch {
                pattern_name: pattern.name.clone(),
                timestamp,
                fields,
            });
        }

        None
    }
}

fn compile_one(def: &PatternDef) -> Result<CompiledPattern> {
    let regex = Regex::new(&def.regex).map_err(|source| Error::PatternCompile {
        name: def.name.clone(),
        source,
    })?;

    Ok(CompiledPattern {
        name: def.name.clone(),
        regex,
    })
}

/// Parse the mandatory leading timestamp capture of a matched line.
fn parse_line_timestamp(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, LINE_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|source| Error::TimestampParse {
            value: value.to_string(),
            source,
        })
}

/// Collect named captures into a flat map, excluding the timestamp group.
fn collect_named_fields(regex: &Regex, captures: &regex::Captures<'_>) -> BTreeMap<String, String> {
    regex
        .capture_names()
        .enumerate()
        .skip(2) // group 0 is the whole match, group 1 the timestamp
        .filter_map(|(_, name)| name)
        .filter_map(|name| {
            captures
                .name(name)
                .map(|m| (name.to_string(), m.as_str().to_string()))
        })
        .collect()
}
