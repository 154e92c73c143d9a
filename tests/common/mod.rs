#![allow(dead_code)]

use emoji_cooccur::{
    ArchiveLines, ArchiveSource, LocalArchiveSource, PipelineOptions, PipelineResult, SourceOptions, YearMonth,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Write a compressed `.zst` file containing the provided JSONL lines (single frame).
pub fn write_zst_lines(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let f = File::create(path).unwrap();
    let mut enc = zstd::stream::write::Encoder::new(f, 3).unwrap();
    for l in lines {
        writeln!(&mut enc, "{}", l).unwrap();
    }
    enc.finish().unwrap();
}

/// One zstd frame per line, so a truncated transfer still yields the leading lines.
pub fn zst_frames(lines: &[String]) -> Vec<Vec<u8>> {
    lines
        .iter()
        .map(|l| zstd::encode_all(format!("{l}\n").as_bytes(), 3).unwrap())
        .collect()
}

/// Same as `write_zst_lines` but one zstd frame per line.
pub fn write_zst_frames(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut f = File::create(path).unwrap();
    for frame in zst_frames(lines) {
        f.write_all(&frame).unwrap();
    }
}

/// A Reddit-shaped comment record.
pub fn comment(body: &str) -> String {
    json!({
        "author": "alice", "body": body, "created_utc": 1656633600,
        "id": "c1", "parent_id": "t3_s1", "subreddit": "emojis", "score": 1
    })
    .to_string()
}

/// A record without a body (e.g. a submission mixed into the stream).
pub fn bodyless() -> String {
    json!({ "author": "bob", "title": "no body here 🔥", "id": "s1" }).to_string()
}

pub fn archive_path(dir: &Path, ym: YearMonth) -> PathBuf {
    dir.join(ym.archive_name())
}

/// Write `RC_YYYY-MM.zst` holding one comment per body.
pub fn write_month(dir: &Path, ym: YearMonth, bodies: &[&str]) -> PathBuf {
    let path = archive_path(dir, ym);
    let lines: Vec<String> = bodies.iter().map(|b| comment(b)).collect();
    write_zst_lines(&path, &lines);
    path
}

/// A month whose name is right but whose content is not zstd.
pub fn write_corrupt_month(dir: &Path, ym: YearMonth) -> PathBuf {
    let path = archive_path(dir, ym);
    fs::create_dir_all(dir).unwrap();
    let mut f = File::create(&path).unwrap();
    writeln!(&mut f, "{}", comment("not compressed 🔥")).unwrap();
    path
}

/// Scratch directories for archives, checkpoints and output.
pub struct Workspace {
    _root: tempfile::TempDir,
    pub archives: PathBuf,
    pub checkpoints: PathBuf,
    pub out: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let archives = root.path().join("archives");
        let checkpoints = root.path().join("checkpoints");
        let out = root.path().join("out");
        fs::create_dir_all(&archives).unwrap();
        Self { _root: root, archives, checkpoints, out }
    }

    /// Quiet, fast options over the local archive directory.
    pub fn options(&self, start: YearMonth, end: YearMonth) -> PipelineOptions {
        PipelineOptions::default()
            .with_date_range(start, end)
            .with_local_dir(&self.archives)
            .with_checkpoint_dir(&self.checkpoints)
            .with_output_dir(&self.out)
            .with_progress(false)
            .with_retry_backoff(Duration::ZERO)
            .with_batch_lines(4)
            .with_low_memory_fraction(0.0)
    }

    pub fn local_source(&self) -> LocalArchiveSource {
        LocalArchiveSource::new(&self.archives, SourceOptions::default())
    }
}

pub fn ym(s: &str) -> YearMonth {
    s.parse().unwrap()
}

// ----------------------------- Test sources ------------------------------------

/// Transport that delivers `limit` bytes and then fails like a dropped connection.
pub struct FailAfter<R: Read> {
    pub inner: R,
    pub remaining: usize,
}

impl<R: Read> Read for FailAfter<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer"));
        }
        let cap = buf.len().min(self.remaining);
        let n = self.inner.read(&mut buf[..cap])?;
        self.remaining -= n;
        Ok(n)
    }
}

/// How a `ScriptedSource` should serve one open of a period.
#[derive(Clone, Copy, Debug)]
pub enum Serve {
    /// Serve the real local archive.
    Real,
    /// Serve a non-zstd payload (decoder fails).
    Corrupt,
    /// Report the archive as missing.
    Missing,
    /// Serve this fraction of the archive bytes, then drop the connection.
    Truncate(f64),
}

/// Local source with scripted misbehaviour per (period, attempt). Records opens.
pub struct ScriptedSource {
    pub local: LocalArchiveSource,
    pub script: Mutex<HashMap<YearMonth, Vec<Serve>>>,
    pub opened: Mutex<Vec<YearMonth>>,
    pub opens: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(local: LocalArchiveSource) -> Self {
        Self { local, script: Mutex::new(HashMap::new()), opened: Mutex::new(Vec::new()), opens: AtomicUsize::new(0) }
    }

    /// Serve `period` according to `plan`, one entry per open; afterwards `Real`.
    pub fn plan(self, period: YearMonth, plan: Vec<Serve>) -> Self {
        self.script.lock().insert(period, plan);
        self
    }

    pub fn opened(&self) -> Vec<YearMonth> {
        self.opened.lock().clone()
    }
}

impl ArchiveSource for ScriptedSource {
    fn open(&self, period: YearMonth) -> PipelineResult<ArchiveLines> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.opened.lock().push(period);
        let serve = {
            let mut script = self.script.lock();
            match script.get_mut(&period) {
                Some(plan) if !plan.is_empty() => plan.remove(0),
                _ => Serve::Real,
            }
        };
        let opts = SourceOptions::default();
        match serve {
            Serve::Real => self.local.open(period),
            Serve::Corrupt => {
                let payload = comment("plain text, not zstd").into_bytes();
                ArchiveLines::from_reader(period, Box::new(io::Cursor::new(payload)), None, &opts)
            }
            Serve::Missing => Err(emoji_cooccur::PipelineError::Unavailable {
                period,
                reason: "HTTP 404 Not Found".into(),
            }),
            Serve::Truncate(frac) => {
                let bytes = fs::read(self.local.path_for(period)).unwrap();
                let limit = ((bytes.len() as f64) * frac) as usize;
                let raw = FailAfter { inner: io::Cursor::new(bytes), remaining: limit };
                ArchiveLines::from_reader(period, Box::new(raw), None, &opts)
            }
        }
    }

    fn locate(&self, period: YearMonth) -> String {
        format!("scripted:{}", self.local.locate(period))
    }
}

/// Hands a `ScriptedSource` to the pipeline while the test keeps a handle on it.
pub struct Shared(pub Arc<ScriptedSource>);

impl ArchiveSource for Shared {
    fn open(&self, period: YearMonth) -> PipelineResult<ArchiveLines> {
        self.0.open(period)
    }

    fn locate(&self, period: YearMonth) -> String {
        self.0.locate(period)
    }
}

// ----------------------------- HTTP fixture ------------------------------------

/// Serve a single HTTP connection on localhost. `reply` gets the request line and the
/// socket once the request head has been read. Returns the base URL.
pub fn http_once<F>(reply: F) -> String
where
    F: FnOnce(String, TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        let mut header = String::new();
        while reader.read_line(&mut header).unwrap() > 0 && header != "\r\n" {
            header.clear();
        }
        reply(request_line.trim_end().to_string(), stream);
    });
    format!("http://{addr}/")
}

/// Status-only response with an empty body.
pub fn reply_status(mut stream: TcpStream, status: &str) {
    let _ = write!(stream, "HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
    let _ = stream.flush();
}

/// Chunked response, one chunk per piece with `pause` between chunks.
pub fn reply_chunked(mut stream: TcpStream, pieces: &[Vec<u8>], pause: Duration) {
    let _ = write!(stream, "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n");
    for piece in pieces {
        let _ = write!(stream, "{:x}\r\n", piece.len());
        let _ = stream.write_all(piece);
        let _ = stream.write_all(b"\r\n");
        let _ = stream.flush();
        thread::sleep(pause);
    }
    let _ = stream.write_all(b"0\r\n\r\n");
    let _ = stream.flush();
}

/// Announce `total` bytes, send `sent`, then hold the connection open for `hang`.
pub fn reply_then_hang(mut stream: TcpStream, total: usize, sent: &[u8], hang: Duration) {
    let _ = write!(stream, "HTTP/1.1 200 OK\r\nContent-Length: {total}\r\nConnection: close\r\n\r\n");
    let _ = stream.write_all(sent);
    let _ = stream.flush();
    thread::sleep(hang);
}
