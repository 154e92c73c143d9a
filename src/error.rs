//! Error taxonomy for the co-occurrence pipeline.
//!
//! Line-level problems never leave the parser; stream-level problems are retried per
//! period; checkpoint problems are fatal because silently losing (or double counting)
//! progress is worse than stopping.

use crate::date::YearMonth;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// One input line failed to decode. Logged and skipped by the parser.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// The zstd stream failed mid-archive.
    #[error("corrupt stream for {period}: {source}")]
    CorruptStream {
        period: YearMonth,
        #[source]
        source: io::Error,
    },

    /// The archive does not exist, or the transport failed/stalled.
    #[error("archive for {period} unavailable: {reason}")]
    Unavailable { period: YearMonth, reason: String },

    #[error("failed to write checkpoint {}: {source}", path.display())]
    CheckpointWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read checkpoint {}: {reason}", path.display())]
    CheckpointRead { path: PathBuf, reason: String },

    /// Retries for a period are exhausted; the run is aborted at `period`.
    #[error("period {period} failed after {attempts} attempt(s): {source}")]
    PeriodFailed {
        period: YearMonth,
        attempts: usize,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("failed to write output {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// Stream-level failures re-run the whole period; everything else stops the job.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::CorruptStream { .. } | PipelineError::Unavailable { .. })
    }

    /// Period the error is attributed to, if any.
    pub fn period(&self) -> Option<YearMonth> {
        match self {
            PipelineError::CorruptStream { period, .. }
            | PipelineError::Unavailable { period, .. }
            | PipelineError::PeriodFailed { period, .. } => Some(*period),
            _ => None,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
