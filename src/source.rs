//! Monthly archive acquisition: resolve a period to `RC_YYYY-MM.zst`, stream the
//! compressed bytes (HTTP or a local mirror) and decode them lazily into lines.
//!
//! Nothing here materializes an archive: bytes flow transport -> counting reader ->
//! zstd decoder -> line buffer. Transport failures and decoder failures are told
//! apart so the driver can report `Unavailable` vs `CorruptStream`.

use crate::date::YearMonth;
use crate::error::{PipelineError, PipelineResult};
use crate::util::open_with_backoff;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use zstd::stream::read::Decoder;

/// Pushshift-style comment archive root.
pub const DEFAULT_BASE_URL: &str = "https://files.pushshift.io/reddit/comments/";

/// Decoder and transport tuning shared by all sources.
#[derive(Clone, Debug)]
pub struct SourceOptions {
    /// zstd `window_log_max`; 31 admits the 2 GiB windows used by recent archives.
    pub window_log_max: u32,
    pub read_buffer_bytes: usize,
    pub connect_timeout: Duration,
    /// Maximum time a single read may block before the transfer counts as stalled.
    pub stall_timeout: Duration,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            window_log_max: 31,
            read_buffer_bytes: 256 * 1024,
            connect_timeout: Duration::from_secs(30),
            stall_timeout: Duration::from_secs(120),
        }
    }
}

/// Produces the decoded line stream of one period's archive.
pub trait ArchiveSource: Send + Sync {
    fn open(&self, period: YearMonth) -> PipelineResult<ArchiveLines>;

    /// Human readable locator for logs.
    fn locate(&self, period: YearMonth) -> String;
}

// ----------------------------- Transport probe ------------------------------------

/// A `Read` wrapper that counts compressed bytes and remembers transport failures.
struct CountingReader<R: Read> {
    inner: R,
    counter: Arc<AtomicU64>,
    failed: Arc<AtomicBool>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => {
                self.counter.fetch_add(n as u64, Ordering::Relaxed);
                Ok(n)
            }
            Err(e) => {
                self.failed.store(true, Ordering::Relaxed);
                Err(e)
            }
        }
    }
}

/// Compressed byte stream as handed over by a transport.
pub type RawStream = Box<dyn Read + Send>;

// ----------------------------- Line stream ----------------------------------

/// Lazy, single-pass sequence of decoded lines for one period.
///
/// Dropping it releases the decoder window and transport. Re-reading a period
/// requires a new `ArchiveSource::open`.
pub struct ArchiveLines {
    period: YearMonth,
    reader: BufReader<Decoder<'static, BufReader<CountingReader<RawStream>>>>,
    compressed_read: Arc<AtomicU64>,
    transport_failed: Arc<AtomicBool>,
    compressed_total: Option<u64>,
    buf: Vec<u8>,
    finished: bool,
}

impl ArchiveLines {
    pub fn from_reader(
        period: YearMonth,
        raw: RawStream,
        compressed_total: Option<u64>,
        opts: &SourceOptions,
    ) -> PipelineResult<Self> {
        let compressed_read = Arc::new(AtomicU64::new(0));
        let transport_failed = Arc::new(AtomicBool::new(false));
        let counting = CountingReader {
            inner: raw,
            counter: compressed_read.clone(),
            failed: transport_failed.clone(),
        };
        let corrupt = |source| PipelineError::CorruptStream { period, source };
        let mut decoder = Decoder::new(counting).map_err(corrupt)?;
        decoder.window_log_max(opts.window_log_max).map_err(corrupt)?;
        let reader = BufReader::with_capacity(opts.read_buffer_bytes.max(8 * 1024), decoder);
        Ok(Self {
            period,
            reader,
            compressed_read,
            transport_failed,
            compressed_total,
            buf: Vec::with_capacity(16 * 1024),
            finished: false,
        })
    }

    pub fn period(&self) -> YearMonth {
        self.period
    }

    /// Compressed bytes pulled from the transport so far.
    pub fn compressed_bytes_read(&self) -> u64 {
        self.compressed_read.load(Ordering::Relaxed)
    }

    /// Compressed size when the transport advertises it.
    pub fn compressed_total(&self) -> Option<u64> {
        self.compressed_total
    }

    /// Consume up to `n` lines without yielding them. Returns how many were skipped.
    pub fn skip_lines(&mut self, n: u64) -> PipelineResult<u64> {
        let mut skipped = 0;
        while skipped < n {
            match self.next() {
                Some(Ok(_)) => skipped += 1,
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
        Ok(skipped)
    }

    fn classify(&self, e: io::Error) -> PipelineError {
        if self.transport_failed.load(Ordering::Relaxed) {
            PipelineError::Unavailable {
                period: self.period,
                reason: format!("transfer interrupted after {} bytes: {}", self.compressed_bytes_read(), e),
            }
        } else {
            PipelineError::CorruptStream { period: self.period, source: e }
        }
    }
}

impl Iterator for ArchiveLines {
    type Item = PipelineResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => {
                self.finished = true;
                None
            }
            Ok(_) => {
                if self.buf.ends_with(b"\n") {
                    self.buf.pop();
                    if self.buf.ends_with(b"\r") {
                        self.buf.pop();
                    }
                }
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            }
            Err(e) => {
                self.finished = true;
                Some(Err(self.classify(e)))
            }
        }
    }
}

// ----------------------------- HTTP ------------------------------------

/// Streams archives from `<base_url>/RC_YYYY-MM.zst` with a blocking client.
pub struct HttpArchiveSource {
    base_url: String,
    client: reqwest::blocking::Client,
    opts: SourceOptions,
}

impl HttpArchiveSource {
    pub fn new(base_url: impl Into<String>, opts: SourceOptions) -> PipelineResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(opts.connect_timeout)
            // Blocking reads are bounded individually, so a stalled transfer errors out
            // instead of wedging the run.
            .timeout(opts.stall_timeout)
            .build()
            .map_err(|e| PipelineError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self { base_url: base_url.into(), client, opts })
    }

    pub fn url_for(&self, period: YearMonth) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), period.archive_name())
    }
}

impl ArchiveSource for HttpArchiveSource {
    fn open(&self, period: YearMonth) -> PipelineResult<ArchiveLines> {
        let url = self.url_for(period);
        let unavailable = |reason: String| PipelineError::Unavailable { period, reason };
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| unavailable(format!("GET {url}: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(unavailable(format!("GET {url}: HTTP {status}")));
        }
        let total = resp.content_length();
        tracing::info!("Downloading from {url}");
        ArchiveLines::from_reader(period, Box::new(resp), total, &self.opts)
    }

    fn locate(&self, period: YearMonth) -> String {
        self.url_for(period)
    }
}

// ----------------------------- Local mirror ------------------------------------

/// Reads archives from a directory holding `RC_YYYY-MM.zst` files.
pub struct LocalArchiveSource {
    dir: PathBuf,
    opts: SourceOptions,
}

impl LocalArchiveSource {
    pub fn new(dir: impl AsRef<Path>, opts: SourceOptions) -> Self {
        Self { dir: dir.as_ref().to_path_buf(), opts }
    }

    pub fn path_for(&self, period: YearMonth) -> PathBuf {
        self.dir.join(period.archive_name())
    }
}

impl ArchiveSource for LocalArchiveSource {
    fn open(&self, period: YearMonth) -> PipelineResult<ArchiveLines> {
        let path = self.path_for(period);
        let file = open_with_backoff(&path, 16, 50).map_err(|e| PipelineError::Unavailable {
            period,
            reason: format!("{}: {}", path.display(), e),
        })?;
        let total = file.metadata().ok().map(|m| m.len());
        ArchiveLines::from_reader(period, Box::new(file), total, &self.opts)
    }

    fn locate(&self, period: YearMonth) -> String {
        self.path_for(period).display().to_string()
    }
}
