//! Sparse symmetric co-occurrence counts over an open-ended emoji universe.

use crate::extract::DistinctEmojis;
use crate::normalize::EmojiId;
use ahash::AHashMap;
use std::collections::BTreeMap;

/// Serialized/snapshot form of the table: `table[a][b]` = comments containing both.
/// The diagonal `table[a][a]` is the number of comments containing `a`.
pub type CooccurrenceTable = BTreeMap<EmojiId, BTreeMap<EmojiId, u64>>;

type Row = AHashMap<EmojiId, u64>;

/// Running co-occurrence counts. Rows and cells are created lazily; cells only grow.
#[derive(Clone, Debug, Default)]
pub struct Accumulator {
    rows: AHashMap<EmojiId, Row>,
    observations: u64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(table: CooccurrenceTable) -> Self {
        let mut acc = Self::new();
        acc.restore(table);
        acc
    }

    /// Fold one comment's distinct emoji set into the table: every ordered pair
    /// `(a, b)` of the set, including `a == b`, gets +1.
    pub fn observe(&mut self, set: &DistinctEmojis) {
        if set.is_empty() {
            return;
        }
        self.observations += 1;
        for a in set {
            if let Some(row) = self.rows.get_mut(a.as_str()) {
                bump_row(row, set);
            } else {
                let mut row = Row::with_capacity(set.len());
                bump_row(&mut row, set);
                self.rows.insert(a.clone(), row);
            }
        }
    }

    /// Cell-wise addition of `other` into `self`.
    pub fn absorb(&mut self, other: Accumulator) {
        self.observations += other.observations;
        for (a, other_row) in other.rows {
            let row = self.rows.entry(a).or_default();
            for (b, n) in other_row {
                *row.entry(b).or_insert(0) += n;
            }
        }
    }

    /// Deep, point-in-time copy with deterministic ordering.
    pub fn snapshot(&self) -> CooccurrenceTable {
        self.rows
            .iter()
            .map(|(a, row)| {
                let cols = row.iter().map(|(b, n)| (b.clone(), *n)).collect();
                (a.clone(), cols)
            })
            .collect()
    }

    /// Replace the whole state with a previously snapshotted table.
    pub fn restore(&mut self, table: CooccurrenceTable) {
        self.rows = table
            .into_iter()
            .map(|(a, row)| (a, row.into_iter().collect::<Row>()))
            .collect();
        // Observation count is not persisted; the diagonal carries the real signal.
        self.observations = 0;
    }

    pub fn count(&self, a: &str, b: &str) -> u64 {
        self.rows.get(a).and_then(|row| row.get(b)).copied().unwrap_or(0)
    }

    /// Number of observed comments containing `a`.
    pub fn frequency(&self, a: &str) -> u64 {
        self.count(a, a)
    }

    /// Number of distinct emoji ids seen so far.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Non-empty sets observed since creation or the last `restore`.
    pub fn observations(&self) -> u64 {
        self.observations
    }
}

// Lookups go through &str so the hot path only allocates for unseen cells.
#[inline]
fn bump_row(row: &mut Row, set: &DistinctEmojis) {
    for b in set {
        match row.get_mut(b.as_str()) {
            Some(cell) => *cell += 1,
            None => {
                row.insert(b.clone(), 1);
            }
        }
    }
}

/// Snapshot of `base + delta` without mutating either side.
pub fn merged_snapshot(base: &Accumulator, delta: &Accumulator) -> CooccurrenceTable {
    let mut table = base.snapshot();
    for (a, row) in &delta.rows {
        let out = table.entry(a.clone()).or_default();
        for (b, n) in row {
            *out.entry(b.clone()).or_insert(0) += n;
        }
    }
    table
}
