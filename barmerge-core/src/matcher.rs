//! Destination lookup by series key.
//!
//! Candidates are compared on their parsed (ticker, bar size), never on a
//! textual prefix, so `AAPL 1d` does not pick up `AAPL 1day ...`.

use crate::filename::{FilenamePattern, SeriesKey, SeriesName};

/// The destination chosen for a series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationMatch {
    pub name: String,
    pub series: SeriesName,
    /// Other candidates that also matched and were passed over.
    pub ambiguous: Vec<String>,
}

/// Find the destination file holding `key`.
///
/// Returns `None` when nothing matches. With several matches the
/// lexicographically first filename wins and the rest are listed in
/// [`DestinationMatch::ambiguous`].
pub fn find_destination<'a>(
    key: &SeriesKey,
    candidates: impl IntoIterator<Item = &'a str>,
    pattern: &FilenamePattern,
) -> Option<DestinationMatch> {
    let mut hits: Vec<(&str, SeriesName)> = candidates
        .into_iter()
        .filter_map(|name| {
            let series = pattern.parse(name).ok()?;
            (series.ticker == key.ticker && series.bar_size == key.bar_size)
                .then_some((name, series))
        })
        .collect();

    hits.sort_by(|a, b| a.0.cmp(b.0));
    let mut hits = hits.into_iter();
    let (name, series) = hits.next()?;

    Some(DestinationMatch {
        name: name.to_string(),
        series,
        ambiguous: hits.map(|(n, _)| n.to_string()).collect(),
    })
}
