//! The pipeline driver: resume from the newest checkpoint, then fold each month's
//! archive into the cumulative table, checkpointing as it goes.
//!
//! Periods are processed strictly in order by a single driver. Within a period, lines
//! are parsed and scanned in parallel batches (rayon) but counted sequentially in line
//! order into a per-period delta, which joins the cumulative table only once the
//! period's archive has been read to the end. A failed attempt therefore discards its
//! delta and the retry starts from a clean base.

use crate::accumulator::{merged_snapshot, Accumulator, CooccurrenceTable};
use crate::checkpoint::{Checkpoint, CheckpointManager};
use crate::config::{ArchiveLocation, PipelineOptions};
use crate::date::{iter_year_months, YearMonth};
use crate::error::{PipelineError, PipelineResult};
use crate::extract::{process_line, EmojiScanner, LineOutcome, ParseStats, UnicodeEmojiScanner};
use crate::mem::maybe_throttle_low_memory;
use crate::progress::PeriodProgress;
use crate::source::{ArchiveLines, ArchiveSource, HttpArchiveSource, LocalArchiveSource};
use crate::util::{init_tracing_once, write_json_atomic};
use rayon::prelude::*;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Driver lifecycle. `Done` and `Aborted` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Resuming,
    Fetching(YearMonth),
    Streaming(YearMonth),
    Checkpointing(YearMonth),
    Advancing,
    Done,
    Aborted(YearMonth),
}

impl DriverState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DriverState::Done | DriverState::Aborted(_))
    }
}

#[derive(Debug, Default)]
struct StateLog {
    current: Option<DriverState>,
    history: Vec<DriverState>,
}

impl StateLog {
    fn enter(&mut self, next: DriverState) {
        tracing::debug!(from = ?self.current, to = ?next, "driver state");
        self.current = Some(next);
        self.history.push(next);
    }
}

/// Outcome of one fully processed period.
#[derive(Clone, Debug)]
pub struct PeriodReport {
    pub period: YearMonth,
    pub stats: ParseStats,
    /// Lines skipped because a partial checkpoint already covered them.
    pub resumed_lines: u64,
    pub attempts: usize,
    pub elapsed: Duration,
}

#[derive(Clone, Debug)]
pub struct RunReport {
    /// Where the run started: `(period, lines already counted in it)`.
    /// `None` when a checkpoint showed there was nothing left to do.
    pub started_at: Option<(YearMonth, u64)>,
    /// Whether state was restored from a checkpoint.
    pub resumed: bool,
    pub periods: Vec<PeriodReport>,
    pub emoji_count: usize,
    pub output_path: PathBuf,
    pub states: Vec<DriverState>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn total_lines(&self) -> u64 {
        self.periods.iter().map(|p| p.stats.lines).sum()
    }
}

/// What one streaming attempt produced; only folded in if the whole archive was read.
struct AttemptOutput {
    delta: Accumulator,
    stats: ParseStats,
    resumed_lines: u64,
}

pub struct EmojiPipeline {
    opts: PipelineOptions,
    source: Box<dyn ArchiveSource>,
    scanner: Box<dyn EmojiScanner>,
    checkpoints: CheckpointManager,
    table: Accumulator,
    log: StateLog,
}

impl EmojiPipeline {
    /// Build the pipeline with the archive source named by `opts.location`.
    pub fn from_options(opts: PipelineOptions) -> PipelineResult<Self> {
        let src_opts = opts.source_options();
        let source: Box<dyn ArchiveSource> = match &opts.location {
            ArchiveLocation::Http(url) => Box::new(HttpArchiveSource::new(url.clone(), src_opts)?),
            ArchiveLocation::Local(dir) => Box::new(LocalArchiveSource::new(dir, src_opts)),
        };
        Ok(Self::with_source(opts, source))
    }

    /// Build the pipeline over a caller-provided archive source.
    pub fn with_source(opts: PipelineOptions, source: Box<dyn ArchiveSource>) -> Self {
        let checkpoints = CheckpointManager::new(&opts.checkpoint_dir)
            .retain(opts.checkpoint_retain)
            .write_buffer(opts.write_buffer_bytes);
        let mut log = StateLog::default();
        log.enter(DriverState::Idle);
        Self {
            opts,
            source,
            scanner: Box::new(UnicodeEmojiScanner),
            checkpoints,
            table: Accumulator::new(),
            log,
        }
    }

    /// Swap the emoji detection collaborator.
    pub fn scanner(mut self, scanner: Box<dyn EmojiScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.opts
    }

    pub fn accumulator(&self) -> &Accumulator {
        &self.table
    }

    pub fn table(&self) -> CooccurrenceTable {
        self.table.snapshot()
    }

    pub fn state(&self) -> DriverState {
        self.log.current.unwrap_or(DriverState::Idle)
    }

    pub fn history(&self) -> &[DriverState] {
        &self.log.history
    }

    /// Run to `Done`, or stop at the first unrecoverable error (`Aborted`).
    pub fn run(&mut self) -> PipelineResult<RunReport> {
        init_tracing_once();
        self.opts.validate()?;
        let started = Instant::now();

        let (started_at, resumed) = self.resume()?;
        let mut periods = Vec::new();

        if let Some((first, mut skip)) = started_at {
            for period in iter_year_months(first, self.opts.end) {
                let report = match self.process_period(period, skip) {
                    Ok(r) => r,
                    Err(e) => {
                        self.log.enter(DriverState::Aborted(period));
                        tracing::error!(period = %period, "aborting run: {e}");
                        return Err(e);
                    }
                };
                skip = 0;
                periods.push(report);
                self.log.enter(DriverState::Advancing);
            }
        }

        let output_path = self.opts.output_path();
        write_json_atomic(&output_path, &self.table.snapshot(), self.opts.write_buffer_bytes)
            .map_err(|source| PipelineError::Output { path: output_path.clone(), source })?;
        self.log.enter(DriverState::Done);
        tracing::info!(
            "Done: {} period(s), {} distinct emojis, wrote {} in {:?}",
            periods.len(),
            self.table.len(),
            output_path.display(),
            started.elapsed()
        );

        Ok(RunReport {
            started_at,
            resumed,
            periods,
            emoji_count: self.table.len(),
            output_path,
            states: self.log.history.clone(),
            elapsed: started.elapsed(),
        })
    }

    /// Restore from the newest checkpoint and decide where to start.
    fn resume(&mut self) -> PipelineResult<(Option<(YearMonth, u64)>, bool)> {
        self.log.enter(DriverState::Resuming);
        let start = self.opts.start;
        let Some(cp) = self.checkpoints.load_latest()? else {
            tracing::info!("No checkpoint in {}; starting at {}", self.checkpoints.dir().display(), start);
            return Ok((Some((start, 0)), false));
        };

        let point = cp.resume_point();
        tracing::info!(
            "Loaded checkpoint {} ({}), {} distinct emojis",
            cp.period,
            match cp.lines_consumed {
                None => "complete".to_string(),
                Some(n) => format!("{n} lines"),
            },
            cp.table.len()
        );
        self.table.restore(cp.table);

        let point = match point {
            None => None,
            Some((p, _)) if p > self.opts.end => None,
            Some((p, n)) if p >= start => Some((p, n)),
            Some((p, _)) => {
                tracing::warn!("checkpoint resumes at {p}, before configured start {start}; starting at {start}");
                Some((start, 0))
            }
        };
        match point {
            Some((p, 0)) => tracing::info!("Resuming at {p}"),
            Some((p, n)) => tracing::info!("Resuming inside {p} after {n} lines"),
            None => tracing::info!("Checkpoint already covers the configured range"),
        }
        Ok((point, true))
    }

    /// Process one period with the bounded whole-period retry policy, then commit it.
    fn process_period(&mut self, period: YearMonth, skip: u64) -> PipelineResult<PeriodReport> {
        let max_attempts = self.opts.max_period_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let started = Instant::now();
            match self.stream_period(period, skip) {
                Ok(out) => {
                    self.log.enter(DriverState::Checkpointing(period));
                    self.table.absorb(out.delta);
                    self.checkpoints.save_completed(period, self.table.snapshot())?;
                    let elapsed = started.elapsed();
                    tracing::info!(
                        "Finished {} in {:?}: {} lines, {} comments, {} with emojis, {} malformed, {} distinct emojis so far",
                        period,
                        elapsed,
                        out.stats.lines,
                        out.stats.comments,
                        out.stats.with_emoji,
                        out.stats.malformed,
                        self.table.len()
                    );
                    return Ok(PeriodReport {
                        period,
                        stats: out.stats,
                        resumed_lines: out.resumed_lines,
                        attempts: attempt,
                        elapsed,
                    });
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        period = %period,
                        "attempt {attempt}/{max_attempts} failed, retrying period from the beginning: {e}"
                    );
                    std::thread::sleep(self.opts.retry_backoff);
                }
                Err(e) if e.is_retryable() => {
                    return Err(PipelineError::PeriodFailed { period, attempts: attempt, source: Box::new(e) });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One pass over a period's archive. Returns the period's delta; never touches the
    /// cumulative table.
    fn stream_period(&mut self, period: YearMonth, skip: u64) -> PipelineResult<AttemptOutput> {
        self.log.enter(DriverState::Fetching(period));
        tracing::info!("Fetching {}", self.source.locate(period));
        let mut lines = self.source.open(period)?;
        self.log.enter(DriverState::Streaming(period));

        let progress = PeriodProgress::new(self.opts.progress, period, lines.compressed_total());
        let res = self.fold_lines(skip, &mut lines, &progress);
        match &res {
            Ok(_) => progress.finish(format!("RC_{period} done")),
            Err(_) => progress.abandon(format!("RC_{period} failed")),
        }
        res
    }

    fn fold_lines(
        &mut self,
        skip: u64,
        lines: &mut ArchiveLines,
        progress: &PeriodProgress,
    ) -> PipelineResult<AttemptOutput> {
        let period = lines.period();
        let resumed_lines = if skip > 0 {
            let n = lines.skip_lines(skip)?;
            if n < skip {
                tracing::warn!("{period}: checkpoint covered {skip} lines but archive has only {n}");
            }
            n
        } else {
            0
        };

        let scanner: &dyn EmojiScanner = self.scanner.as_ref();
        let batch_lines = self.opts.batch_lines.max(1);
        let report_every = self.opts.progress_every_lines.max(1);
        let started = Instant::now();

        let mut delta = Accumulator::new();
        let mut stats = ParseStats::default();
        let mut consumed = resumed_lines;
        let mut since_checkpoint = 0u64;
        let mut batch: Vec<String> = Vec::with_capacity(batch_lines);

        loop {
            batch.clear();
            while batch.len() < batch_lines {
                match lines.next() {
                    Some(line) => batch.push(line?),
                    None => break,
                }
            }
            if batch.is_empty() {
                break;
            }

            let outcomes: Vec<LineOutcome> = batch.par_iter().map(|l| process_line(scanner, l)).collect();
            let before = stats.lines;
            for outcome in &outcomes {
                stats.record(outcome);
                if let LineOutcome::Comment(set) = outcome {
                    delta.observe(set);
                }
            }
            consumed += batch.len() as u64;
            since_checkpoint += batch.len() as u64;

            if stats.lines / report_every > before / report_every {
                tracing::info!("{} lines processed in {:?}", stats.lines, started.elapsed());
            }
            progress.set_bytes(lines.compressed_bytes_read());

            if let Some(every) = self.opts.checkpoint_every_lines {
                if since_checkpoint >= every {
                    self.log.enter(DriverState::Checkpointing(period));
                    let cp = Checkpoint::partial(period, consumed, merged_snapshot(&self.table, &delta));
                    self.checkpoints.save(&cp)?;
                    tracing::debug!("{period}: partial checkpoint after {consumed} lines");
                    since_checkpoint = 0;
                    self.log.enter(DriverState::Streaming(period));
                }
            }

            maybe_throttle_low_memory(self.opts.low_memory_fraction);
        }

        Ok(AttemptOutput { delta, stats, resumed_lines })
    }
}
