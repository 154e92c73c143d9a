//! Durable, cumulative snapshots of the co-occurrence table keyed by period.
//!
//! Layout inside the checkpoint directory:
//!   - `as_of_YYYY-MM.json`   all periods up to and including YYYY-MM are folded in
//!   - `partial_YYYY-MM.json` the first `lines_consumed` lines of YYYY-MM are folded in
//!
//! Files are published with write-to-temp + fsync + rename, so a reader never sees a
//! half-written snapshot. The newest file by `(period, complete > partial)` wins.

use crate::accumulator::CooccurrenceTable;
use crate::date::YearMonth;
use crate::error::{PipelineError, PipelineResult};
use crate::util::{open_with_backoff, remove_with_backoff, write_json_atomic};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use walkdir::WalkDir;

pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub period: YearMonth,
    /// `None` once `period` is fully processed.
    #[serde(default)]
    pub lines_consumed: Option<u64>,
    pub created_at: String,
    pub table: CooccurrenceTable,
}

impl Checkpoint {
    pub fn completed(period: YearMonth, table: CooccurrenceTable) -> Self {
        Self { version: CHECKPOINT_VERSION, period, lines_consumed: None, created_at: now_rfc3339(), table }
    }

    pub fn partial(period: YearMonth, lines_consumed: u64, table: CooccurrenceTable) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            period,
            lines_consumed: Some(lines_consumed),
            created_at: now_rfc3339(),
            table,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.lines_consumed.is_none()
    }

    pub fn kind(&self) -> CheckpointKind {
        if self.is_complete() { CheckpointKind::Completed } else { CheckpointKind::Partial }
    }

    /// Where processing continues: the next period after a completed checkpoint, or the
    /// same period (skipping already-counted lines) after a partial one.
    /// `None` when the completed period is the last representable month.
    pub fn resume_point(&self) -> Option<(YearMonth, u64)> {
        match self.lines_consumed {
            None => self.period.next().map(|p| (p, 0)),
            Some(n) => Some((self.period, n)),
        }
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

/// Ordering matters: for the same period a completed snapshot supersedes a partial one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CheckpointKind {
    Partial,
    Completed,
}

impl CheckpointKind {
    fn prefix(self) -> &'static str {
        match self {
            CheckpointKind::Partial => "partial",
            CheckpointKind::Completed => "as_of",
        }
    }
}

/// A checkpoint file found on disk (not yet loaded).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointFile {
    pub period: YearMonth,
    pub kind: CheckpointKind,
    pub path: PathBuf,
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(as_of|partial)_(\d{4})-(\d{2})\.json$").expect("static regex"))
}

fn parse_file_name(name: &str) -> Option<(CheckpointKind, YearMonth)> {
    let caps = name_re().captures(name)?;
    let kind = if &caps[1] == "as_of" { CheckpointKind::Completed } else { CheckpointKind::Partial };
    let period = format!("{}-{}", &caps[2], &caps[3]).parse().ok()?;
    Some((kind, period))
}

pub struct CheckpointManager {
    dir: PathBuf,
    retain: Option<usize>,
    write_buffer_bytes: usize,
}

impl CheckpointManager {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf(), retain: None, write_buffer_bytes: 256 * 1024 }
    }

    /// Keep only the newest `n` completed checkpoints (`None` keeps all).
    pub fn retain(mut self, n: Option<usize>) -> Self {
        self.retain = n.map(|n| n.max(1));
        self
    }

    pub fn write_buffer(mut self, bytes: usize) -> Self {
        self.write_buffer_bytes = bytes.max(8 * 1024);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, kind: CheckpointKind, period: YearMonth) -> PathBuf {
        self.dir.join(format!("{}_{}.json", kind.prefix(), period))
    }

    /// All checkpoint files, oldest first. A missing directory means no checkpoints;
    /// one that cannot be listed is an error.
    pub fn list(&self) -> PipelineResult<Vec<CheckpointFile>> {
        let mut files = Vec::new();
        let unreadable = |reason: String| PipelineError::CheckpointRead { path: self.dir.clone(), reason };
        match self.dir.metadata() {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(unreadable("not a directory".to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(unreadable(e.to_string())),
        }
        for ent in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let ent = ent.map_err(|e| unreadable(e.to_string()))?;
            if !ent.file_type().is_file() {
                continue;
            }
            if let Some((kind, period)) = parse_file_name(&ent.file_name().to_string_lossy()) {
                files.push(CheckpointFile { period, kind, path: ent.path().to_path_buf() });
            }
        }
        files.sort_by_key(|f| (f.period, f.kind));
        Ok(files)
    }

    /// Publish `cp` atomically. The previously published checkpoint stays valid if
    /// this fails.
    pub fn save(&self, cp: &Checkpoint) -> PipelineResult<PathBuf> {
        let path = self.path_for(cp.kind(), cp.period);
        write_json_atomic(&path, cp, self.write_buffer_bytes)
            .map_err(|source| PipelineError::CheckpointWrite { path: path.clone(), source })?;
        tracing::debug!(period = %cp.period, kind = ?cp.kind(), "checkpoint published: {}", path.display());
        self.prune(cp);
        Ok(path)
    }

    /// Record `period` as fully processed with the cumulative `table`.
    pub fn save_completed(&self, period: YearMonth, table: CooccurrenceTable) -> PipelineResult<PathBuf> {
        self.save(&Checkpoint::completed(period, table))
    }

    /// Load the newest checkpoint, `None` on a first run.
    ///
    /// A corrupt newest file is an error: falling back to an older snapshot (or to
    /// nothing) would silently re-count periods.
    pub fn load_latest(&self) -> PipelineResult<Option<Checkpoint>> {
        let Some(latest) = self.list()?.pop() else {
            return Ok(None);
        };
        let cp = read_checkpoint(&latest.path)?;
        let bad = |reason: String| PipelineError::CheckpointRead { path: latest.path.clone(), reason };
        if cp.version != CHECKPOINT_VERSION {
            return Err(bad(format!("unsupported version {}", cp.version)));
        }
        if cp.period != latest.period || cp.kind() != latest.kind {
            return Err(bad(format!(
                "file name says {} {:?} but content says {} {:?}",
                latest.period,
                latest.kind,
                cp.period,
                cp.kind()
            )));
        }
        Ok(Some(cp))
    }

    // Housekeeping after a successful publish. Failures here never invalidate the
    // checkpoint that was just written, so they are only logged.
    fn prune(&self, saved: &Checkpoint) {
        let files = match self.list() {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!("skipping checkpoint cleanup: {e}");
                return;
            }
        };
        let mut doomed: Vec<&CheckpointFile> = Vec::new();
        match saved.kind() {
            CheckpointKind::Completed => {
                doomed.extend(files.iter().filter(|f| f.kind == CheckpointKind::Partial && f.period <= saved.period));
                if let Some(keep) = self.retain {
                    let completed: Vec<&CheckpointFile> =
                        files.iter().filter(|f| f.kind == CheckpointKind::Completed).collect();
                    if completed.len() > keep {
                        doomed.extend(&completed[..completed.len() - keep]);
                    }
                }
            }
            CheckpointKind::Partial => {
                doomed.extend(files.iter().filter(|f| f.kind == CheckpointKind::Partial && f.period < saved.period));
            }
        }
        for f in doomed {
            if let Err(e) = remove_with_backoff(&f.path, 8, 25) {
                tracing::warn!("could not remove stale checkpoint {}: {}", f.path.display(), e);
            }
        }
    }
}

fn read_checkpoint(path: &Path) -> PipelineResult<Checkpoint> {
    let bad = |reason: String| PipelineError::CheckpointRead { path: path.to_path_buf(), reason };
    let f = open_with_backoff(path, 16, 50).map_err(|e: io::Error| bad(e.to_string()))?;
    let r = BufReader::with_capacity(256 * 1024, f);
    serde_json::from_reader(r).map_err(|e| bad(e.to_string()))
}
