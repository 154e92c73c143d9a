mod config;
mod date;
mod error;
mod source;
mod progress;
mod util;
mod mem;

mod normalize;
mod extract;
mod accumulator;
mod checkpoint;
mod pipeline;

pub use crate::config::{ArchiveLocation, PipelineOptions};
pub use crate::date::{iter_year_months, YearMonth};
pub use crate::error::{PipelineError, PipelineResult};

// Emoji normalization + per-line extraction.
pub use crate::normalize::{normalize, EmojiId, KEYCAP, VS16};
pub use crate::extract::{
    distinct_emojis, parse_line, process_line, CommentRecord, DistinctEmojis, EmojiScanner, LineOutcome,
    ParseStats, ParsedLine, SkipReason, UnicodeEmojiScanner,
};

// Counting + persistence.
pub use crate::accumulator::{merged_snapshot, Accumulator, CooccurrenceTable};
pub use crate::checkpoint::{Checkpoint, CheckpointFile, CheckpointKind, CheckpointManager, CHECKPOINT_VERSION};

// Archive acquisition.
pub use crate::source::{ArchiveLines, ArchiveSource, HttpArchiveSource, LocalArchiveSource, SourceOptions, DEFAULT_BASE_URL};

// Driver.
pub use crate::pipeline::{DriverState, EmojiPipeline, PeriodReport, RunReport};

// Expose the memory probe and file helpers so binaries can import from crate root.
pub use crate::mem::{available_memory_fraction, maybe_throttle_low_memory};
pub use crate::util::{init_tracing_once, write_json_atomic};
pub use crate::progress::{make_period_bar, PeriodProgress};
