use crate::date::YearMonth;
use crate::error::{PipelineError, PipelineResult};
use crate::source::SourceOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the monthly archives come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArchiveLocation {
    /// `<base_url>/RC_YYYY-MM.zst`
    Http(String),
    /// `<dir>/RC_YYYY-MM.zst`
    Local(PathBuf),
}

/// Job options, fixed at start. Builder chaining with sensible defaults.
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub start: YearMonth,                  // inclusive
    pub end: YearMonth,                    // inclusive
    pub location: ArchiveLocation,
    pub output_dir: PathBuf,               // emoji_final.json lands here
    pub checkpoint_dir: PathBuf,
    pub checkpoint_every_lines: Option<u64>, // intra-period checkpoints; None = end of period only
    pub checkpoint_retain: Option<usize>,  // completed checkpoints to keep; None = all

    // retry policy for CorruptStream / Unavailable
    pub max_period_attempts: usize,
    pub retry_backoff: Duration,

    // throughput
    pub batch_lines: usize,                // lines parsed in parallel per batch
    pub low_memory_fraction: f64,          // throttle below this available/total ratio

    // reporting
    pub progress: bool,                    // show progress bar
    pub progress_every_lines: u64,         // periodic "N lines processed" log line

    // IO tuning
    pub read_buffer_bytes: usize,          // BufReader capacity over the decoder
    pub write_buffer_bytes: usize,         // BufWriter capacity for snapshots
    pub window_log_max: u32,               // zstd large-window mode
    pub connect_timeout: Duration,
    pub stall_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        let src = SourceOptions::default();
        Self {
            start: YearMonth::new(2005, 12),
            end: YearMonth::new(2022, 8),
            location: ArchiveLocation::Http(crate::source::DEFAULT_BASE_URL.to_string()),
            output_dir: PathBuf::from("./out"),
            checkpoint_dir: PathBuf::from("./out"),
            checkpoint_every_lines: None,
            checkpoint_retain: None,

            max_period_attempts: 2, // one retry from the beginning of the period
            retry_backoff: Duration::from_secs(5),

            batch_lines: 8192,
            low_memory_fraction: 0.10,

            progress: true,
            progress_every_lines: 1_000_000,

            read_buffer_bytes: src.read_buffer_bytes,
            write_buffer_bytes: 256 * 1024,
            window_log_max: src.window_log_max,
            connect_timeout: src.connect_timeout,
            stall_timeout: src.stall_timeout,
        }
    }
}

impl PipelineOptions {
    pub fn with_date_range(mut self, start: YearMonth, end: YearMonth) -> Self {
        self.start = start;
        self.end = end;
        self
    }
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.location = ArchiveLocation::Http(url.into());
        self
    }
    pub fn with_local_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.location = ArchiveLocation::Local(dir.as_ref().to_path_buf());
        self
    }
    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_checkpoint_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.checkpoint_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_checkpoint_every_lines(mut self, lines: Option<u64>) -> Self {
        self.checkpoint_every_lines = lines.filter(|n| *n > 0);
        self
    }
    pub fn with_checkpoint_retain(mut self, keep: Option<usize>) -> Self {
        self.checkpoint_retain = keep;
        self
    }
    pub fn with_max_period_attempts(mut self, n: usize) -> Self {
        self.max_period_attempts = n.max(1);
        self
    }
    pub fn with_retry_backoff(mut self, d: Duration) -> Self {
        self.retry_backoff = d;
        self
    }
    pub fn with_batch_lines(mut self, n: usize) -> Self {
        self.batch_lines = n.max(1);
        self
    }
    pub fn with_low_memory_fraction(mut self, frac: f64) -> Self {
        self.low_memory_fraction = frac.clamp(0.0, 1.0);
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_progress_every_lines(mut self, n: u64) -> Self {
        self.progress_every_lines = n.max(1);
        self
    }

    // IO tuning
    pub fn with_io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self {
        self.read_buffer_bytes = read_bytes.max(8 * 1024);
        self.write_buffer_bytes = write_bytes.max(8 * 1024);
        self
    }
    pub fn with_window_log_max(mut self, log: u32) -> Self {
        self.window_log_max = log;
        self
    }
    pub fn with_timeouts(mut self, connect: Duration, stall: Duration) -> Self {
        self.connect_timeout = connect;
        self.stall_timeout = stall;
        self
    }

    pub fn source_options(&self) -> SourceOptions {
        SourceOptions {
            window_log_max: self.window_log_max,
            read_buffer_bytes: self.read_buffer_bytes,
            connect_timeout: self.connect_timeout,
            stall_timeout: self.stall_timeout,
        }
    }

    /// Final table location.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join("emoji_final.json")
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.start > self.end {
            return Err(PipelineError::InvalidConfig(format!(
                "start {} is after end {}",
                self.start, self.end
            )));
        }
        if !(10..=31).contains(&self.window_log_max) {
            return Err(PipelineError::InvalidConfig(format!(
                "window_log_max {} outside 10..=31",
                self.window_log_max
            )));
        }
        Ok(())
    }
}
