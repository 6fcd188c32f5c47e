//! Text form of a [`Table`].
//!
//! ```text
//! # comment
//! ; also a comment
//! [section]
//! key = value
//! url=http://host/?a=b        <- split at the first '=' only
//! ```
//!
//! Entries before the first header belong to the empty section. `[]` switches
//! back to the empty section, which `serialize` emits when empty-section entries
//! follow a named section.

use std::fmt::Write;

use log::{debug, warn};

use super::{Entry, OverflowPolicy, Table, DEFAULT_TABLE_CAPACITY};
use crate::error::{CoreError, Result};
use crate::logutil::escape_log;

/// Parse with the default capacity and the default (`Warn`) overflow policy.
pub fn parse(text: &str) -> Table {
    // Warn never fails; only Reject produces an error.
    parse_with(text, DEFAULT_TABLE_CAPACITY, OverflowPolicy::Warn)
        .unwrap_or_else(|_| Table::with_capacity(DEFAULT_TABLE_CAPACITY))
}

pub fn parse_with(text: &str, capacity: usize, policy: OverflowPolicy) -> Result<Table> {
    let mut table = Table::with_capacity(capacity);
    let mut section = String::new();
    let mut dropped = 0usize;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = section_header(line) {
            section = name.to_string();
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            debug!("line {}: ignoring '{}'", idx + 1, escape_log(line));
            continue;
        };

        if table.is_full() {
            if policy == OverflowPolicy::Reject {
                return Err(CoreError::Capacity {
                    what: "entry table",
                    capacity,
                });
            }
            dropped += 1;
            continue;
        }

        let entry = match Entry::new(&section, key.trim(), value.trim()) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("line {}: skipping entry: {}", idx + 1, e);
                continue;
            }
        };
        if !table.insert_parsed(entry)? {
            debug!(
                "line {}: duplicate [{}] {}, keeping first",
                idx + 1,
                escape_log(&section),
                escape_log(key.trim())
            );
        }
    }

    if dropped > 0 && policy == OverflowPolicy::Warn {
        warn!(
            "Entry table full at {} entries; {} further entries were not loaded",
            capacity, dropped
        );
    }
    Ok(table)
}

/// Render in table order, writing a header whenever the section changes.
pub fn serialize(table: &Table) -> String {
    let mut out = String::new();
    let mut current = "";
    let mut wrote_header = false;

    for entry in table {
        if entry.section() != current {
            if wrote_header {
                out.push('\n');
            }
            let _ = writeln!(out, "[{}]", entry.section());
            wrote_header = true;
            current = entry.section();
        }
        let _ = writeln!(out, "{}={}", entry.key(), entry.value());
    }
    out
}

fn section_header(line: &str) -> Option<&str> {
    line.strip_prefix('[')?.strip_suffix(']')
}
