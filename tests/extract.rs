#[path = "common/mod.rs"]
mod common;

use common::*;
use emoji_cooccur::{
    distinct_emojis, parse_line, process_line, EmojiScanner, LineOutcome, ParseStats, ParsedLine, SkipReason,
    UnicodeEmojiScanner,
};
use std::collections::BTreeSet;

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn parse_extracts_body_and_ignores_other_fields() {
    assert_eq!(parse_line(&comment("hi 🔥")), ParsedLine::Comment("hi 🔥".to_string()));
}

/// Bad JSON, body-less records and blank lines are skipped, never fatal.
#[test]
fn parse_skips_malformed_bodyless_and_blank() {
    assert_eq!(parse_line("{not json"), ParsedLine::Skip(SkipReason::Malformed));
    assert_eq!(parse_line("garbage 🔥"), ParsedLine::Skip(SkipReason::Malformed));
    assert_eq!(parse_line(r#"{"body": 42}"#), ParsedLine::Skip(SkipReason::Malformed));
    assert_eq!(parse_line(&bodyless()), ParsedLine::Skip(SkipReason::NoBody));
    assert_eq!(parse_line(r#"{"body": null}"#), ParsedLine::Skip(SkipReason::NoBody));
    assert_eq!(parse_line("   "), ParsedLine::Skip(SkipReason::Blank));
}

/// Scanner keeps text order and duplicates; the distinct set collapses them.
#[test]
fn scanner_keeps_duplicates_distinct_set_collapses() {
    let scanner = UnicodeEmojiScanner;
    let body = "great 😀😀 party 🎉";
    assert_eq!(scanner.scan(body), vec!["😀", "😀", "🎉"]);
    assert_eq!(distinct_emojis(&scanner, body), set(&["😀", "🎉"]));
}

#[test]
fn scanner_ignores_plain_text() {
    let scanner = UnicodeEmojiScanner;
    assert!(scanner.scan("plain ascii text 123 #1 *").is_empty());
    assert!(scanner.scan("accents café naïve — “quotes”").is_empty());
}

/// Keycaps are one cluster; variants fold onto the same id.
#[test]
fn keycap_and_variant_forms_fold_together() {
    let scanner = UnicodeEmojiScanner;
    let body = "pick 3\u{FE0F}\u{20E3} or ❤\u{FE0F} or ❤";
    let got = distinct_emojis(&scanner, body);
    assert_eq!(got, set(&["3\u{20E3}", "❤"]));
}

/// ZWJ sequences stay one opaque id.
#[test]
fn zwj_sequence_is_one_cluster() {
    let scanner = UnicodeEmojiScanner;
    let family = "👨\u{200D}👩\u{200D}👧";
    let body = format!("family {family} time");
    assert_eq!(scanner.scan(&body), vec![family]);
}

/// ZWJ joins outside the published sequence list are still one opaque id.
#[test]
fn unlisted_zwj_sequence_is_kept_whole() {
    let scanner = UnicodeEmojiScanner;
    let pair = "🔥\u{200D}🔥";
    let body = format!("so {pair} today 🔥");
    assert_eq!(scanner.scan(&body), vec![pair, "🔥"]);
    assert_eq!(distinct_emojis(&scanner, &body), set(&[pair, "🔥"]));
}

/// A stray combining mark after an emoji does not hide the emoji.
#[test]
fn leading_emoji_survives_trailing_marks() {
    let scanner = UnicodeEmojiScanner;
    assert_eq!(scanner.scan("wow 😀\u{301}!"), vec!["😀"]);
    assert_eq!(distinct_emojis(&scanner, "😀\u{301} 😀"), set(&["😀"]));
    // Marks on ordinary letters are still plain text.
    assert!(scanner.scan("e\u{301}t\u{E9} \u{915}\u{94D}\u{200D}\u{937}").is_empty());
}

/// A scripted collaborator: every 'x' is an "emoji". Dedup happens after normalize.
struct XScanner;
impl EmojiScanner for XScanner {
    fn scan<'a>(&self, text: &'a str) -> Vec<&'a str> {
        text.match_indices('x').map(|(i, _)| &text[i..i + 1]).collect()
    }
}

#[test]
fn distinct_set_uses_the_provided_scanner() {
    assert_eq!(distinct_emojis(&XScanner, "x y x z x"), set(&["x"]));
    assert!(distinct_emojis(&XScanner, "none here").is_empty());
}

#[test]
fn stats_account_for_every_line() {
    let scanner = UnicodeEmojiScanner;
    let lines = vec![
        comment("🔥 hot"),
        comment("no emoji"),
        "oops".to_string(),
        bodyless(),
        String::new(),
    ];
    let mut stats = ParseStats::default();
    for l in &lines {
        let outcome = process_line(&scanner, l);
        stats.record(&outcome);
        if l.contains("hot") {
            assert!(matches!(outcome, LineOutcome::Comment(ref s) if s.contains("🔥")));
        }
    }
    assert_eq!(
        stats,
        ParseStats { lines: 5, comments: 2, with_emoji: 1, malformed: 1, no_body: 1, blank: 1 }
    );

    let mut total = ParseStats::default();
    total.merge(stats);
    total.merge(stats);
    assert_eq!(total.lines, 10);
    assert_eq!(total.with_emoji, 2);
}
