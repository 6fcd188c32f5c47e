//! # Key/Value Store
//!
//! A small, capacity-bounded table of `(section, key, value)` entries with a
//! line-oriented text representation (see [`format`]).
//!
//! Lookups are linear scans over a flat `Vec`. Each `(section, key)` pair
//! appears at most once.
//!
//! ## Limits
//!
//! | Field   | Max chars | On overflow          |
//! |---------|-----------|----------------------|
//! | section | 63        | `InvalidArgument`    |
//! | key     | 63        | `InvalidArgument`    |
//! | value   | 127       | truncated            |
//!
//! Keys and values are stored trimmed of surrounding whitespace, which is how
//! the parser reads them.
//!
//! ## Usage
//!
//! ```rust
//! use nodecore::kvstore::Table;
//!
//! let mut table = Table::new();
//! table.set("mqtt", "broker_host", "10.0.0.2").unwrap();
//! table.set_int("mqtt", "broker_port", 1883).unwrap();
//!
//! assert_eq!(table.get("mqtt", "broker_host", "localhost"), "10.0.0.2");
//! assert_eq!(table.get_int("mqtt", "broker_port", 0), 1883);
//! assert_eq!(table.get("mqtt", "missing", "fallback"), "fallback");
//! ```

pub mod format;

pub use format::{parse, parse_with, serialize};

use crate::error::{CoreError, Result};
use log::debug;
use serde::{Deserialize, Serialize};

pub const MAX_SECTION_LEN: usize = 63;
pub const MAX_KEY_LEN: usize = 63;
pub const MAX_VALUE_LEN: usize = 127;
pub const DEFAULT_TABLE_CAPACITY: usize = 100;

/// What `parse` does when the input holds more entries than the table can.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Stop reading silently.
    Truncate,
    /// Stop reading and log how many lines were dropped.
    #[default]
    Warn,
    /// Fail the parse with a capacity error.
    Reject,
}

/// One configuration item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    section: String,
    key: String,
    value: String,
}

impl Entry {
    /// Build a validated entry. Key and value are stored trimmed, the way the
    /// parser reads them back, and the value is cut to [`MAX_VALUE_LEN`].
    pub fn new(section: &str, key: &str, value: &str) -> Result<Self> {
        validate_section(section)?;
        let key = key.trim();
        validate_key(key)?;
        Ok(Entry {
            section: section.to_string(),
            key: key.to_string(),
            value: stored_value(value)?,
        })
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    fn matches(&self, section: &str, key: &str) -> bool {
        self.section == section && self.key == key
    }
}

/// Ordered, capacity-bounded collection of entries, unique per `(section, key)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    entries: Vec<Entry>,
    capacity: usize,
}

impl Default for Table {
    fn default() -> Self {
        Table::new()
    }
}

impl Table {
    /// Empty table with the default capacity of 100 entries.
    pub fn new() -> Self {
        Table::with_capacity(DEFAULT_TABLE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Table {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    /// Drop every entry; capacity is unchanged.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Value stored under `(section, key)`, or `default` when absent.
    pub fn get<'a>(&'a self, section: &str, key: &str, default: &'a str) -> &'a str {
        self.position(section, key)
            .map(|idx| self.entries[idx].value.as_str())
            .unwrap_or(default)
    }

    /// Integer view of a value. Reads a leading decimal integer the way C's
    /// `atoi` does ("42ms" is 42), but yields `default` when no digits are present.
    pub fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        match self.position(section, key) {
            Some(idx) => parse_lenient_int(&self.entries[idx].value).unwrap_or(default),
            None => default,
        }
    }

    pub fn has(&self, section: &str, key: &str) -> bool {
        self.position(section, key).is_some()
    }

    /// Insert or overwrite. Fails with a capacity error, without touching the
    /// table, when the pair is new and the table is full.
    pub fn set(&mut self, section: &str, key: &str, value: &str) -> Result<()> {
        if let Some(idx) = self.position(section, key) {
            self.entries[idx].value = stored_value(value)?;
            return Ok(());
        }

        let entry = Entry::new(section, key, value)?;
        if self.is_full() {
            return Err(CoreError::Capacity {
                what: "entry table",
                capacity: self.capacity,
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn set_int(&mut self, section: &str, key: &str, value: impl Into<i64>) -> Result<()> {
        self.set(section, key, &value.into().to_string())
    }

    /// Append a parsed entry. Returns `Ok(false)` when the pair already exists;
    /// the first occurrence in a file wins, as it does for `get`.
    pub(crate) fn insert_parsed(&mut self, entry: Entry) -> Result<bool> {
        if self.has(&entry.section, &entry.key) {
            return Ok(false);
        }
        if self.is_full() {
            return Err(CoreError::Capacity {
                what: "entry table",
                capacity: self.capacity,
            });
        }
        self.entries.push(entry);
        Ok(true)
    }

    fn position(&self, section: &str, key: &str) -> Option<usize> {
        let key = key.trim();
        self.entries.iter().position(|e| e.matches(section, key))
    }
}

impl<'a> IntoIterator for &'a Table {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Parse the leading decimal integer of `s` (after optional whitespace and sign).
/// Returns `None` when there are no digits or the number overflows `i64`.
pub fn parse_lenient_int(s: &str) -> Option<i64> {
    let t = s.trim_start();
    let (negative, digits) = match t.as_bytes().first() {
        Some(b'-') => (true, &t[1..]),
        Some(b'+') => (false, &t[1..]),
        _ => (false, t),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

fn validate_section(section: &str) -> Result<()> {
    if section.chars().count() > MAX_SECTION_LEN {
        return Err(CoreError::invalid_arg(format!(
            "section name longer than {MAX_SECTION_LEN} chars"
        )));
    }
    if section.contains(&['\n', '\r', ']'][..]) {
        return Err(CoreError::invalid_arg("section name contains a reserved character"));
    }
    Ok(())
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CoreError::invalid_arg("key must not be empty"));
    }
    if key.chars().count() > MAX_KEY_LEN {
        return Err(CoreError::invalid_arg(format!(
            "key longer than {MAX_KEY_LEN} chars"
        )));
    }
    if key.contains(&['=', '\n', '\r'][..]) || key.starts_with(&['#', ';', '['][..]) {
        return Err(CoreError::invalid_arg("key contains a reserved character"));
    }
    Ok(())
}

fn validate_value(value: &str) -> Result<()> {
    if value.contains(&['\n', '\r'][..]) {
        return Err(CoreError::invalid_arg("value contains a line break"));
    }
    Ok(())
}

/// Trimmed, length-capped form of `value`. Trimming again after the cut keeps
/// a space at the boundary from becoming trailing whitespace.
fn stored_value(value: &str) -> Result<String> {
    validate_value(value)?;
    let trimmed = value.trim();
    let cut = truncate_chars(trimmed, MAX_VALUE_LEN);
    if cut.len() != trimmed.len() {
        debug!("Value truncated to {} chars", MAX_VALUE_LEN);
    }
    Ok(cut.trim_end().to_string())
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
