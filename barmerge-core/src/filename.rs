//! Series filename schema.
//!
//! Layout: `{TICKER} {BAR_SIZE} {yyyymmdd}-{yyyymmdd}{anything}`
//!
//! - ticker: 1..=N non-digit characters (N configurable, default 5 so that
//!   dual-class tickers like `BRK.B` fit)
//! - bar size: 1–2 digit count followed by a non-digit unit (`1d`, `5mins`)
//! - two 8-digit date stamps separated by a hyphen
//!
//! Everything after the second date stamp (typically `.csv`) is ignored.

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default upper bound on ticker length.
pub const DEFAULT_TICKER_MAX_LEN: usize = 5;

/// Largest ticker bound accepted by [`FilenamePattern::new`].
pub const MAX_TICKER_BOUND: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("'{name}' does not match the series filename pattern")]
    NoMatch { name: String },

    #[error("invalid date stamp '{0}': expected 8 digits")]
    InvalidDateStamp(String),

    #[error("invalid ticker length bound {0}: expected 1..={MAX_TICKER_BOUND}")]
    InvalidTickerBound(usize),

    #[error("failed to compile filename pattern: {0}")]
    Pattern(String),
}

/// An 8-digit `yyyymmdd` stamp, kept verbatim.
///
/// Fixed width means string order is chronological order, so no calendar
/// parsing is needed to compare stamps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DateStamp(String);

impl DateStamp {
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(s.to_string()))
        } else {
            Err(ParseError::InvalidDateStamp(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Calendar interpretation, if the stamp is a real date.
    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.0, "%Y%m%d").ok()
    }
}

impl fmt::Display for DateStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DateStamp {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DateStamp> for String {
    fn from(value: DateStamp) -> Self {
        value.0
    }
}

/// The (ticker, bar size) pair that identifies a series across files.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
    pub ticker: String,
    pub bar_size: String,
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ticker, self.bar_size)
    }
}

/// Everything a series filename encodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesName {
    pub ticker: String,
    pub bar_size: String,
    pub start: DateStamp,
    pub end: DateStamp,
}

impl SeriesName {
    pub fn key(&self) -> SeriesKey {
        SeriesKey {
            ticker: self.ticker.clone(),
            bar_size: self.bar_size.clone(),
        }
    }

    /// Same series and start, new end stamp.
    pub fn extended_to(&self, end: &DateStamp) -> Self {
        Self {
            end: end.clone(),
            ..self.clone()
        }
    }

    /// Canonical filename: `{ticker} {bar_size} {start}-{end}.{extension}`
    pub fn file_name(&self, extension: &str) -> String {
        format!(
            "{} {} {}-{}.{extension}",
            self.ticker, self.bar_size, self.start, self.end
        )
    }
}

/// Compiled filename pattern.
#[derive(Debug, Clone)]
pub struct FilenamePattern {
    regex: Regex,
}

impl FilenamePattern {
    /// Build a pattern with the given ticker bound.
    ///
    /// Anchored patterns must match from the first character of the name;
    /// unanchored ones take the leftmost match anywhere in it.
    pub fn new(ticker_max_len: usize, anchored: bool) -> Result<Self, ParseError> {
        if !(1..=MAX_TICKER_BOUND).contains(&ticker_max_len) {
            return Err(ParseError::InvalidTickerBound(ticker_max_len));
        }
        let anchor = if anchored { "^" } else { "" };
        let source = format!(
            r"{anchor}([^0-9]{{1,{ticker_max_len}}})\s([0-9]{{1,2}}[^0-9]+)\s([0-9]{{8}})-([0-9]{{8}})"
        );
        let regex = Regex::new(&source).map_err(|e| ParseError::Pattern(e.to_string()))?;
        Ok(Self { regex })
    }

    /// Extract the series fields from a filename.
    pub fn parse(&self, name: &str) -> Result<SeriesName, ParseError> {
        let no_match = || ParseError::NoMatch {
            name: name.to_string(),
        };
        let caps = self.regex.captures(name).ok_or_else(no_match)?;
        let group = |i: usize| caps.get(i).map(|m| m.as_str()).ok_or_else(no_match);

        Ok(SeriesName {
            ticker: group(1)?.to_string(),
            bar_size: group(2)?.to_string(),
            start: DateStamp::parse(group(3)?)?,
            end: DateStamp::parse(group(4)?)?,
        })
    }
}

impl Default for FilenamePattern {
    fn default() -> Self {
        // The default bound is always in range, so this cannot fail.
        Self::new(DEFAULT_TICKER_MAX_LEN, true)
            .unwrap_or_else(|e| unreachable!("default filename pattern is valid: {e}"))
    }
}
