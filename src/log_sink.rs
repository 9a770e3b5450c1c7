use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io;
use std::sync::Arc;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::LogSettings;

const DEFAULT_MAX_LINES: usize = 1000;

/// Destination for human-readable status lines (a log panel, a console).
pub trait LogSink: Send + Sync {
    fn add_log(&self, message: &str);
}

/// In-memory sink holding the most recent lines, newest first.
#[derive(Clone)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
    max_lines: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINES)
    }
}

impl LogBuffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::new())),
            max_lines: max_lines.max(1),
        }
    }

    pub fn add_log_at(&self, at: DateTime<Utc>, message: &str) -> String {
        let line = format_line(at, message);
        let mut lines = self.lines.lock();
        lines.push_front(line.clone());
        lines.truncate(self.max_lines);
        line
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

impl LogSink for LogBuffer {
    fn add_log(&self, message: &str) {
        self.add_log_at(Utc::now(), message);
    }
}

pub fn format_line(at: DateTime<Utc>, message: &str) -> String {
    format!("{} :: {}", at.format("%a %H:%M:%S"), message)
}

/// JSON lines appended to the configured log file, filtered on their own.
/// `None` when the file is disabled.
pub fn file_layer<S>(settings: &LogSettings) -> io::Result<Option<Box<dyn Layer<S> + Send + Sync>>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let Some(path) = settings.file_path() else {
        return Ok(None);
    };
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(Arc::new(file))
        .with_filter(EnvFilter::new(&settings.file_level));
    Ok(Some(layer.boxed()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::Value;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_line_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 15, 9, 5, 7).unwrap();
        assert_eq!(format_line(at, "Connected"), "Fri 09:05:07 :: Connected");
    }

    #[test]
    fn test_newest_first() {
        let buffer = LogBuffer::default();
        let at = Utc.with_ymd_and_hms(2024, 3, 15, 9, 5, 7).unwrap();
        buffer.add_log_at(at, "first");
        buffer.add_log_at(at, "second");

        let lines = buffer.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(":: second"));
        assert!(lines[1].ends_with(":: first"));
    }

    #[test]
    fn test_oldest_lines_are_dropped() {
        let buffer = LogBuffer::new(2);
        buffer.add_log("a");
        buffer.add_log("b");
        buffer.add_log("c");

        let lines = buffer.lines();
        assert_eq!(buffer.len(), 2);
        assert!(lines[0].ends_with(":: c"));
        assert!(lines[1].ends_with(":: b"));
    }

    #[test]
    fn test_file_layer_writes_json_at_its_own_level() {
        let path = std::env::temp_dir().join(format!("perp-connector-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let settings = LogSettings {
            file: Some(path.to_string_lossy().into_owned()),
            file_level: "debug".into(),
        };

        let subscriber = tracing_subscriber::registry().with(file_layer(&settings).unwrap());
        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(venue = "BitMEX", "Subscribed");
            tracing::trace!("Frame received");
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        let lines: Vec<Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["level"], "DEBUG");
        assert_eq!(lines[0]["fields"]["message"], "Subscribed");
        assert_eq!(lines[0]["fields"]["venue"], "BitMEX");
    }

    #[test]
    fn test_file_layer_disabled() {
        let settings = LogSettings {
            file: Some(" ".into()),
            ..Default::default()
        };
        let layer = file_layer::<tracing_subscriber::Registry>(&settings).unwrap();
        assert!(layer.is_none());
    }
}
