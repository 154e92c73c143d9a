//! Line-level decoding: JSON line -> comment body -> distinct normalized emoji set.

use crate::error::PipelineError;
use crate::normalize::{normalize, EmojiId, VS16};
use serde::Deserialize;
use std::collections::BTreeSet;
use unicode_segmentation::UnicodeSegmentation;

const ZWJ: char = '\u{200D}';

/// Distinct normalized emojis of one comment. Order is irrelevant.
pub type DistinctEmojis = BTreeSet<EmojiId>;

/// Minimal line-level schema. Extra fields are ignored by serde.
#[derive(Debug, Deserialize)]
pub struct CommentRecord {
    pub body: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Blank,
    Malformed,
    NoBody,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParsedLine {
    Comment(String),
    Skip(SkipReason),
}

/// Decode one archive line. Never fails: bad lines become `Skip`.
pub fn parse_line(line: &str) -> ParsedLine {
    if line.trim().is_empty() {
        return ParsedLine::Skip(SkipReason::Blank);
    }
    match serde_json::from_str::<CommentRecord>(line) {
        Ok(CommentRecord { body: Some(body) }) => ParsedLine::Comment(body),
        Ok(CommentRecord { body: None }) => ParsedLine::Skip(SkipReason::NoBody),
        Err(e) => {
            let err = PipelineError::MalformedRecord(e.to_string());
            tracing::debug!(line = %preview(line), "skipping line: {err}");
            ParsedLine::Skip(SkipReason::Malformed)
        }
    }
}

fn preview(line: &str) -> &str {
    match line.char_indices().nth(120) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

/// Finds raw emoji clusters in free text.
///
/// Implementations return clusters in text order with duplicates retained;
/// deduplication happens after normalization.
pub trait EmojiScanner: Send + Sync {
    fn scan<'a>(&self, text: &'a str) -> Vec<&'a str>;
}

/// Grapheme-cluster scanner backed by the Unicode emoji tables of the `emojis` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnicodeEmojiScanner;

impl UnicodeEmojiScanner {
    fn is_emoji(cluster: &str) -> bool {
        if cluster.is_ascii() {
            return false;
        }
        if emojis::get(cluster).is_some() {
            return true;
        }
        // Text-presentation forms (e.g. bare "®") and over-qualified forms.
        let stripped: String = cluster.chars().filter(|c| *c != VS16).collect();
        if stripped != cluster && emojis::get(&stripped).is_some() {
            return true;
        }
        let mut qualified = String::with_capacity(cluster.len() + VS16.len_utf8());
        qualified.push_str(cluster);
        qualified.push(VS16);
        emojis::get(&qualified).is_some()
    }

    /// The emoji carried by one grapheme cluster, if any.
    ///
    /// A ZWJ sequence with at least one emoji component is kept whole, listed or not.
    /// Otherwise a cluster that is not an emoji as a whole (an emoji followed by stray
    /// combining marks) yields its longest leading emoji.
    fn match_cluster(cluster: &str) -> Option<&str> {
        if cluster.is_ascii() {
            return None;
        }
        if Self::is_emoji(cluster) {
            return Some(cluster);
        }
        if cluster.contains(ZWJ) && cluster.split(ZWJ).any(|part| !part.is_empty() && Self::is_emoji(part)) {
            return Some(cluster);
        }
        cluster
            .char_indices()
            .rev()
            .map(|(idx, _)| idx)
            .take_while(|idx| *idx > 0)
            .map(|idx| &cluster[..idx])
            .find(|prefix| Self::is_emoji(prefix))
    }
}

impl EmojiScanner for UnicodeEmojiScanner {
    fn scan<'a>(&self, text: &'a str) -> Vec<&'a str> {
        if text.is_ascii() {
            return Vec::new();
        }
        text.graphemes(true).filter_map(Self::match_cluster).collect()
    }
}

/// Scan `body`, normalize each occurrence and collapse duplicates.
pub fn distinct_emojis(scanner: &dyn EmojiScanner, body: &str) -> DistinctEmojis {
    scanner.scan(body).into_iter().map(normalize).collect()
}

/// Result of pushing one line through parse + scan + normalize.
#[derive(Debug)]
pub enum LineOutcome {
    Skipped(SkipReason),
    Comment(DistinctEmojis),
}

pub fn process_line(scanner: &dyn EmojiScanner, line: &str) -> LineOutcome {
    match parse_line(line) {
        ParsedLine::Comment(body) => LineOutcome::Comment(distinct_emojis(scanner, &body)),
        ParsedLine::Skip(reason) => LineOutcome::Skipped(reason),
    }
}

/// Per-period line accounting, reported in the period summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub lines: u64,
    pub comments: u64,
    pub with_emoji: u64,
    pub malformed: u64,
    pub no_body: u64,
    pub blank: u64,
}

impl ParseStats {
    pub fn record(&mut self, outcome: &LineOutcome) {
        self.lines += 1;
        match outcome {
            LineOutcome::Comment(set) => {
                self.comments += 1;
                if !set.is_empty() {
                    self.with_emoji += 1;
                }
            }
            LineOutcome::Skipped(SkipReason::Malformed) => self.malformed += 1,
            LineOutcome::Skipped(SkipReason::NoBody) => self.no_body += 1,
            LineOutcome::Skipped(SkipReason::Blank) => self.blank += 1,
        }
    }

    pub fn merge(&mut self, other: ParseStats) {
        self.lines += other.lines;
        self.comments += other.comments;
        self.with_emoji += other.with_emoji;
        self.malformed += other.malformed;
        self.no_body += other.no_body;
        self.blank += other.blank;
    }
}
