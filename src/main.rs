use anyhow::{Context, Result};
use clap::Parser;
use emoji_cooccur::{init_tracing_once, EmojiPipeline, PipelineOptions, YearMonth, DEFAULT_BASE_URL};
use std::path::PathBuf;
use std::time::Duration;

/// Count emoji co-occurrences across the monthly Reddit comment archives.
///
/// Progress is checkpointed per month; re-running the same command resumes after the
/// last completed month.
#[derive(Parser, Debug)]
#[command(name = "emoji-cooccur", version, about)]
struct Cli {
    /// First month to process (YYYY-MM, inclusive).
    #[arg(long, default_value = "2005-12")]
    start: YearMonth,

    /// Last month to process (YYYY-MM, inclusive).
    #[arg(long, default_value = "2022-08")]
    end: YearMonth,

    /// Remote archive root holding RC_YYYY-MM.zst files.
    #[arg(long, default_value = DEFAULT_BASE_URL, conflicts_with = "local_dir")]
    base_url: String,

    /// Read RC_YYYY-MM.zst files from a local mirror instead of downloading.
    #[arg(long)]
    local_dir: Option<PathBuf>,

    /// Directory receiving emoji_final.json.
    #[arg(long, default_value = "./out")]
    output_dir: PathBuf,

    /// Checkpoint directory (defaults to the output directory).
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// Also checkpoint every N lines inside a month.
    #[arg(long)]
    checkpoint_every: Option<u64>,

    /// Keep only the newest N completed monthly checkpoints.
    #[arg(long)]
    keep_checkpoints: Option<usize>,

    /// Attempts per month before aborting (CorruptStream / Unavailable).
    #[arg(long, default_value_t = 2)]
    attempts: usize,

    /// Seconds to wait before retrying a month.
    #[arg(long, default_value_t = 5)]
    retry_backoff_secs: u64,

    /// Lines parsed in parallel per batch.
    #[arg(long, default_value_t = 8192)]
    batch_lines: usize,

    /// Read buffer over the decoder, in KiB.
    #[arg(long, default_value_t = 256)]
    read_buffer_kib: usize,

    /// Pause between batches while available memory is below this fraction (0 disables).
    #[arg(long, default_value_t = 0.10)]
    low_memory: f64,

    /// zstd window_log_max (31 = large-window mode).
    #[arg(long, default_value_t = 31)]
    window_log_max: u32,

    /// Connect timeout in seconds.
    #[arg(long, default_value_t = 30)]
    connect_timeout_secs: u64,

    /// Seconds a single read may stall before the month is treated as unavailable.
    #[arg(long, default_value_t = 120)]
    stall_timeout_secs: u64,

    /// Log a progress line every N lines.
    #[arg(long, default_value_t = 1_000_000)]
    progress_every: u64,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,
}

fn main() -> Result<()> {
    init_tracing_once();
    let cli = Cli::parse();

    let checkpoint_dir = cli.checkpoint_dir.clone().unwrap_or_else(|| cli.output_dir.clone());
    let mut opts = PipelineOptions::default()
        .with_date_range(cli.start, cli.end)
        .with_output_dir(&cli.output_dir)
        .with_checkpoint_dir(&checkpoint_dir)
        .with_checkpoint_every_lines(cli.checkpoint_every)
        .with_checkpoint_retain(cli.keep_checkpoints)
        .with_max_period_attempts(cli.attempts)
        .with_retry_backoff(Duration::from_secs(cli.retry_backoff_secs))
        .with_batch_lines(cli.batch_lines)
        .with_low_memory_fraction(cli.low_memory)
        .with_io_buffers(cli.read_buffer_kib * 1024, 256 * 1024)
        .with_window_log_max(cli.window_log_max)
        .with_timeouts(
            Duration::from_secs(cli.connect_timeout_secs),
            Duration::from_secs(cli.stall_timeout_secs),
        )
        .with_progress_every_lines(cli.progress_every)
        .with_progress(!cli.no_progress);
    opts = match &cli.local_dir {
        Some(dir) => opts.with_local_dir(dir),
        None => opts.with_base_url(&cli.base_url),
    };

    let mut pipeline = EmojiPipeline::from_options(opts).context("building pipeline")?;
    let report = pipeline
        .run()
        .with_context(|| format!("emoji co-occurrence run {}..{}", cli.start, cli.end))?;

    println!(
        "Processed {} month(s), {} lines, {} distinct emojis -> {}",
        report.periods.len(),
        report.total_lines(),
        report.emoji_count,
        report.output_path.display()
    );
    Ok(())
}
