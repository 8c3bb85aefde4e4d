//! Import progress reporting for `zcr import` and `zcr resume`.
//!
//! Progress goes to **stderr** so stdout stays parseable for scripts. The
//! estimate of time remaining is derived from the average rate since the
//! reporter was created.

use std::io::Write;
use std::time::{Duration, Instant};

/// A single progress event, emitted after each batch.
#[derive(Clone, Debug)]
pub enum ImportProgressEvent {
    /// Archive accepted; `total` entries to go.
    Started { total: u64 },
    /// `processed` of `total` entries done.
    Batch { processed: u64, total: u64 },
    /// The run finished.
    Finished { total: u64 },
}

/// Reports import progress. Implementations write to stderr (human or JSON).
pub trait ImportProgressReporter: Send + Sync {
    fn report(&self, event: ImportProgressEvent);
}

/// Tracks elapsed time for percentage and ETA.
#[derive(Clone, Copy, Debug)]
pub struct ProgressClock {
    started: Instant,
    first_processed: u64,
}

impl ProgressClock {
    pub fn new(first_processed: u64) -> Self {
        Self {
            started: Instant::now(),
            first_processed,
        }
    }

    pub fn eta(&self, processed: u64, total: u64) -> Option<Duration> {
        estimate_remaining(
            self.started.elapsed(),
            processed.saturating_sub(self.first_processed),
            total.saturating_sub(processed),
        )
    }
}

/// Remaining time at the observed rate, `None` until there is a rate.
pub fn estimate_remaining(elapsed: Duration, done: u64, left: u64) -> Option<Duration> {
    if done == 0 {
        return None;
    }
    let per_item = elapsed.as_secs_f64() / done as f64;
    Some(Duration::from_secs_f64(per_item * left as f64))
}

pub fn percent(processed: u64, total: u64) -> u64 {
    if total == 0 {
        return 100;
    }
    (processed.min(total) * 100) / total
}

/// Human-friendly progress on stderr: "import  40%  10 / 25 entries  ~3s left".
pub struct StderrProgress {
    clock: ProgressClock,
}

impl StderrProgress {
    pub fn new(first_processed: u64) -> Self {
        Self {
            clock: ProgressClock::new(first_processed),
        }
    }
}

impl ImportProgressReporter for StderrProgress {
    fn report(&self, event: ImportProgressEvent) {
        let line = match &event {
            ImportProgressEvent::Started { total } => {
                format!("import  {} entries in archive\n", format_number(*total))
            }
            ImportProgressEvent::Batch { processed, total } => {
                let eta = match self.clock.eta(*processed, *total) {
                    Some(d) => format!("  ~{} left", format_duration(d)),
                    None => String::new(),
                };
                format!(
                    "import  {:>3}%  {} / {} entries{}\n",
                    percent(*processed, *total),
                    format_number(*processed),
                    format_number(*total),
                    eta
                )
            }
            ImportProgressEvent::Finished { total } => {
                format!("import  done  {} entries\n", format_number(*total))
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress {
    clock: ProgressClock,
}

impl JsonProgress {
    pub fn new(first_processed: u64) -> Self {
        Self {
            clock: ProgressClock::new(first_processed),
        }
    }
}

impl ImportProgressReporter for JsonProgress {
    fn report(&self, event: ImportProgressEvent) {
        let obj = match &event {
            ImportProgressEvent::Started { total } => serde_json::json!({
                "event": "progress",
                "phase": "started",
                "total": total
            }),
            ImportProgressEvent::Batch { processed, total } => serde_json::json!({
                "event": "progress",
                "phase": "batch",
                "n": processed,
                "total": total,
                "percent": percent(*processed, *total),
                "eta_secs": self.clock.eta(*processed, *total).map(|d| d.as_secs())
            }),
            ImportProgressEvent::Finished { total } => serde_json::json!({
                "event": "progress",
                "phase": "finished",
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ImportProgressReporter for NoProgress {
    fn report(&self, _event: ImportProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for a run already `first_processed` entries in.
    pub fn reporter(&self, first_processed: u64) -> Box<dyn ImportProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress::new(first_processed)),
            ProgressMode::Json => Box::new(JsonProgress::new(first_processed)),
        }
    }
}
