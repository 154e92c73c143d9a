//! Progress reporting: per-period byte bar over the compressed archive.

use crate::date::YearMonth;
use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str = "{spinner:.green} {msg} {bytes:>10}/{total_bytes:<10} [{bar:.cyan/blue}] {percent:>3}%  \
     {bytes_per_sec}  elapsed: {elapsed_precise}  eta: {eta_precise}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg} {bytes:>10}  {bytes_per_sec}  elapsed: {elapsed_precise}";

/// Byte-based bar for one period. Falls back to a spinner when the size is unknown
/// (e.g. chunked HTTP responses).
pub fn make_period_bar(period: YearMonth, total_bytes: Option<u64>) -> ProgressBar {
    let (pb, template) = match total_bytes {
        Some(total) => (ProgressBar::new(total), BAR_TEMPLATE),
        None => (ProgressBar::new_spinner(), SPINNER_TEMPLATE),
    };
    if let Ok(style) = ProgressStyle::with_template(template) {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb.set_message(format!("RC_{period}"));
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Optional bar that tracks an absolute byte position.
pub struct PeriodProgress {
    pb: Option<ProgressBar>,
}

impl PeriodProgress {
    pub fn new(enabled: bool, period: YearMonth, total_bytes: Option<u64>) -> Self {
        Self { pb: enabled.then(|| make_period_bar(period, total_bytes)) }
    }

    #[inline]
    pub fn set_bytes(&self, pos: u64) {
        if let Some(pb) = &self.pb {
            pb.set_position(pos);
        }
    }

    pub fn finish(&self, msg: impl Into<String>) {
        if let Some(pb) = &self.pb {
            pb.finish_with_message(msg.into());
        }
    }

    pub fn abandon(&self, msg: impl Into<String>) {
        if let Some(pb) = &self.pb {
            pb.abandon_with_message(msg.into());
        }
    }
}
