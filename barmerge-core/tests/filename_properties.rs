//! Property tests for the filename schema.
//!
//! Uses proptest to verify:
//! 1. Extraction: every well-formed name yields exactly its four fields
//! 2. Rendering: a parsed name renders back to the canonical form
//! 3. Matching: a source always finds the archive file of its own series

use barmerge_core::{find_destination, DateStamp, FilenamePattern};
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_ticker() -> impl Strategy<Value = String> {
    "[A-Z]{1,4}(\\.[A-Z])?".prop_filter("ticker fits bound", |t| t.len() <= 5)
}

fn arb_bar_size() -> impl Strategy<Value = String> {
    ("[1-9][0-9]?", prop::sample::select(vec!["d", "min", "mins", "hour", "hours", "W", "M"]))
        .prop_map(|(n, unit)| format!("{n}{unit}"))
}

fn arb_stamp() -> impl Strategy<Value = String> {
    "[0-9]{8}"
}

fn arb_suffix() -> impl Strategy<Value = String> {
    prop::sample::select(vec![".csv", " trades.csv", ".CSV", "", "_v2.csv"]).prop_map(String::from)
}

// ── 1. Extraction ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn parser_extracts_all_four_fields(
        ticker in arb_ticker(),
        bar_size in arb_bar_size(),
        start in arb_stamp(),
        end in arb_stamp(),
        suffix in arb_suffix(),
    ) {
        let name = format!("{ticker} {bar_size} {start}-{end}{suffix}");
        for anchored in [true, false] {
            let pattern = FilenamePattern::new(5, anchored).unwrap();
            let parsed = pattern.parse(&name).unwrap();
            prop_assert_eq!(&parsed.ticker, &ticker);
            prop_assert_eq!(&parsed.bar_size, &bar_size);
            prop_assert_eq!(parsed.start.as_str(), start.as_str());
            prop_assert_eq!(parsed.end.as_str(), end.as_str());
        }
    }

    /// Tickers longer than the bound never parse under an anchored pattern.
    #[test]
    fn anchored_pattern_enforces_ticker_bound(
        ticker in "[A-Z]{6,8}",
        bar_size in arb_bar_size(),
        start in arb_stamp(),
        end in arb_stamp(),
    ) {
        let name = format!("{ticker} {bar_size} {start}-{end}.csv");
        let pattern = FilenamePattern::new(5, true).unwrap();
        prop_assert!(pattern.parse(&name).is_err());
    }
}

// ── 2. Rendering ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn canonical_name_roundtrips(
        ticker in arb_ticker(),
        bar_size in arb_bar_size(),
        start in arb_stamp(),
        end in arb_stamp(),
        suffix in arb_suffix(),
    ) {
        let pattern = FilenamePattern::default();
        let parsed = pattern.parse(&format!("{ticker} {bar_size} {start}-{end}{suffix}")).unwrap();
        let canonical = parsed.file_name("csv");
        prop_assert_eq!(&canonical, &format!("{ticker} {bar_size} {start}-{end}.csv"));
        prop_assert_eq!(pattern.parse(&canonical).unwrap(), parsed);
    }

    #[test]
    fn extended_name_keeps_start_and_takes_new_end(
        ticker in arb_ticker(),
        bar_size in arb_bar_size(),
        start in arb_stamp(),
        end in arb_stamp(),
        new_end in arb_stamp(),
    ) {
        let pattern = FilenamePattern::default();
        let parsed = pattern.parse(&format!("{ticker} {bar_size} {start}-{end}.csv")).unwrap();
        let extended = parsed.extended_to(&DateStamp::parse(&new_end).unwrap());
        prop_assert_eq!(extended.start.as_str(), start.as_str());
        prop_assert_eq!(extended.end.as_str(), new_end.as_str());
        prop_assert_eq!(extended.key(), parsed.key());
    }
}

// ── 3. Matching ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn source_finds_its_own_series(
        ticker in arb_ticker(),
        bar_size in arb_bar_size(),
        other_ticker in arb_ticker(),
        stamps in prop::array::uniform4(arb_stamp()),
    ) {
        let pattern = FilenamePattern::default();
        let [a, b, c, d] = stamps;
        let archive = format!("{ticker} {bar_size} {a}-{b}.csv");
        let source = pattern.parse(&format!("{ticker} {bar_size} {c}-{d}.csv")).unwrap();

        let mut names = vec![archive.clone(), ".DS_Store".to_string()];
        if other_ticker != ticker {
            names.push(format!("{other_ticker} {bar_size} {a}-{b}.csv"));
        }

        let found = find_destination(&source.key(), names.iter().map(|s| s.as_str()), &pattern)
            .unwrap();
        prop_assert_eq!(found.name, archive);
        prop_assert!(found.ambiguous.is_empty());
    }
}
