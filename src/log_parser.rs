//! Session log parsing: session boundaries and backend availability

use crate::errors::Result;
use crate::tailer::LogTailer;
use crate::telemetry::MetricEvent;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

/// Free-text phrases the parser looks for. Matching is by substring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMarkers {
    pub session_start: String,
    pub session_end: String,
    /// Availability line reporting the backend as down.
    pub unavailable: String,
    /// Other phrases that mark a line as an availability sample.
    pub availability: Vec<String>,
}

impl Default for LogMarkers {
    fn default() -> Self {
        Self {
            session_start: "Started fine-tune session".to_string(),
            session_end: "session ended".to_string(),
            unavailable: "Backend not available".to_string(),
            availability: vec![
                "Backend available".to_string(),
                "Backend health checked".to_string(),
            ],
        }
    }
}

/// Open-session bookkeeping. No nesting: the last start wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    started_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }
}

/// Stateful line parser turning log text into [`MetricEvent`]s.
#[derive(Debug, Clone)]
pub struct SessionLogParser {
    markers: LogMarkers,
    state: SessionState,
}

impl Default for SessionLogParser {
    fn default() -> Self {
        Self::new(LogMarkers::default())
    }
}

impl SessionLogParser {
    pub fn new(markers: LogMarkers) -> Self {
        Self {
            markers,
            state: SessionState::default(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Forget any open session.
    pub fn reset(&mut self) {
        self.state = SessionState::default();
    }

    /// Parse a complete sequence of lines with fresh session state.
    pub fn parse_lines<I, S>(&self, lines: I) -> Vec<MetricEvent>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parser = Self::new(self.markers.clone());
        parser.process_lines(lines)
    }

    /// Re-scan a whole file from the beginning. A missing file yields no events.
    pub async fn parse_file(&self, path: impl AsRef<Path>) -> Result<Vec<MetricEvent>> {
        let mut tailer = LogTailer::new(path.as_ref());
        let batch = tailer.read_all_lines().await?;
        Ok(self.parse_lines(batch.lines))
    }

    /// Feed lines through the parser, keeping session state between calls.
    pub fn process_lines<I, S>(&mut self, lines: I) -> Vec<MetricEvent>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut events = Vec::new();
        for line in lines {
            events.extend(self.process_line(line.as_ref()));
        }
        events
    }

    /// Process a single line. Unrecognized lines produce no events.
    pub fn process_line(&mut self, line: &str) -> Vec<MetricEvent> {
        let mut events = Vec::new();

        if line.contains(&self.markers.session_start) {
            let started_at = extract_timestamp(line).unwrap_or_else(Utc::now);
            self.state.started_at = Some(started_at);
            events.push(MetricEvent::SessionStarted);
        }

        if line.contains(&self.markers.session_end) {
            // An end without an open session is a no-op.
            if let Some(started_at) = self.state.started_at.take() {
                let ended_at = extract_timestamp(line).unwrap_or_else(Utc::now);
                let duration_secs = duration_seconds(started_at, ended_at);
                events.push(MetricEvent::SessionEnded { duration_secs });
            }
        }

        if let Some(value) = self.availability(line) {
            events.push(MetricEvent::AvailabilitySample { value });
        }

        events
    }

    fn availability(&self, line: &str) -> Option<f64> {
        if line.contains(&self.markers.unavailable) {
            return Some(0.0);
        }

        self.markers
            .availability
            .iter()
            .any(|marker| line.contains(marker.as_str()))
            .then_some(1.0)
    }
}

fn duration_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let millis = end.signed_duration_since(start).num_milliseconds();
    (millis as f64 / 1000.0).max(0.0)
}

fn timestamp_regex() -> &'static Regex {
    static TIMESTAMP: OnceLock<Regex> = OnceLock::new();
    TIMESTAMP.get_or_init(|| {
        Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?")
            .unwrap()
    })
}

/// Find the first timestamp embedded in a log line.
pub fn extract_timestamp(line: &str) -> Option<DateTime<Utc>> {
    timestamp_regex()
        .find_iter(line)
        .find_map(|m| parse_timestamp(m.as_str()))
}

/// Parse the timestamp formats the backends write. Zone-less values are UTC.
fn parse_timestamp(ts_str: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts_str) {
        return Some(dt.with_timezone(&Utc));
    }

    let zoned_formats = [
        "%Y-%m-%dT%H:%M:%S%.f%z",      // ISO 8601 with compact offset
        "%Y-%m-%d %H:%M:%S%.f%z",      // SQL timestamp with offset
    ];

    for format in &zoned_formats {
        if let Ok(dt) = DateTime::parse_from_str(ts_str, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    let naive_formats = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];

    for format in &naive_formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(ts_str, format) {
            return Some(dt.and_utc());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ended(events: &[MetricEvent]) -> Vec<f64> {
        events
            .iter()
            .filter_map(|e| match e {
                MetricEvent::SessionEnded { duration_secs } => Some(*duration_secs),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_reference_scenario() {
        let parser = SessionLogParser::default();
        let events = parser.parse_lines([
            "Started fine-tune session at 2024-01-01T00:00:00Z",
            "Backend not available",
            "session ended at 2024-01-01T00:05:00Z",
        ]);

        assert_eq!(
            events,
            vec![
                MetricEvent::SessionStarted,
                MetricEvent::AvailabilitySample { value: 0.0 },
                MetricEvent::SessionEnded { duration_secs: 300.0 },
            ]
        );
    }

    #[test]
    fn test_end_without_start_is_ignored() {
        let parser = SessionLogParser::default();
        let events = parser.parse_lines([
            "session ended at 2024-01-01T00:05:00Z",
            "Started fine-tune session at 2024-01-01T00:06:00Z",
            "session ended at 2024-01-01T00:07:00Z",
            "session ended at 2024-01-01T00:08:00Z",
        ]);

        assert_eq!(ended(&events), vec![60.0]);
    }

    #[test]
    fn test_last_start_wins() {
        let parser = SessionLogParser::default();
        let events = parser.parse_lines([
            "Started fine-tune session at 2024-01-01T00:00:00Z",
            "Started fine-tune session at 2024-01-01T00:04:00Z",
            "Fine-tune session ended at 2024-01-01T00:05:00Z",
        ]);

        let started = events
            .iter()
            .filter(|e| **e == MetricEvent::SessionStarted)
            .count();
        assert_eq!(started, 2);
        assert_eq!(ended(&events), vec![60.0]);
    }

    #[test]
    fn test_backwards_timestamps_clamp_to_zero() {
        let parser = SessionLogParser::default();
        let events = parser.parse_lines([
            "Started fine-tune session at 2024-01-01T00:05:00Z",
            "session ended at 2024-01-01T00:00:00Z",
        ]);

        assert_eq!(ended(&events), vec![0.0]);
    }

    #[test]
    fn test_malformed_timestamp_falls_back_to_now() {
        let mut parser = SessionLogParser::default();
        let before = Utc::now();
        let events = parser.process_line("Started fine-tune session at yesterday-ish");

        assert_eq!(events, vec![MetricEvent::SessionStarted]);
        let started_at = parser.state().started_at().unwrap();
        assert!(started_at >= before);

        let events = parser.process_line("session ended at 2024-13-45T99:00:00Z");
        assert_eq!(ended(&events).len(), 1);
        assert!(ended(&events)[0] >= 0.0);
        assert!(!parser.state().is_active());
    }

    #[test]
    fn test_availability_samples() {
        let parser = SessionLogParser::default();
        let events = parser.parse_lines([
            "[INFO] Backend health checked: available=true",
            "Backend not available",
            "Backend available again",
            "[INFO] Loading dataset: imdb",
        ]);

        assert_eq!(
            events,
            vec![
                MetricEvent::AvailabilitySample { value: 1.0 },
                MetricEvent::AvailabilitySample { value: 0.0 },
                MetricEvent::AvailabilitySample { value: 1.0 },
            ]
        );
    }

    #[test]
    fn test_custom_markers() {
        let markers = LogMarkers {
            session_start: "TRAIN BEGIN".to_string(),
            session_end: "TRAIN END".to_string(),
            unavailable: "DOWN".to_string(),
            availability: vec!["UP".to_string()],
        };
        let parser = SessionLogParser::new(markers);
        let events = parser.parse_lines([
            "2024-01-01 00:00:00 TRAIN BEGIN",
            "2024-01-01 00:00:30 TRAIN END",
        ]);

        assert_eq!(ended(&events), vec![30.0]);
    }

    #[test]
    fn test_state_carries_across_process_calls() {
        let mut parser = SessionLogParser::default();
        parser.process_lines(["Started fine-tune session at 2024-01-01T00:00:00Z"]);
        assert!(parser.state().is_active());

        let events = parser.process_lines(["session ended at 2024-01-01T00:00:10Z"]);
        assert_eq!(ended(&events), vec![10.0]);

        parser.process_line("Started fine-tune session at 2024-01-01T00:00:20Z");
        parser.reset();
        assert!(parser.process_line("session ended at 2024-01-01T00:00:30Z").is_empty());
    }

    #[test]
    fn test_timestamp_parsing() {
        assert!(extract_timestamp("at 2025-01-01T10:30:45Z").is_some());
        assert!(extract_timestamp("[2025-01-01 10:30:45] INFO").is_some());
        assert!(extract_timestamp("2025-01-01T10:30:45.123+02:00 done").is_some());
        assert!(extract_timestamp("2025-01-01T10:30:45+0200 done").is_some());
        assert!(extract_timestamp("invalid").is_none());
        assert!(extract_timestamp("2025-02-30 10:30:45").is_none());

        let offset = extract_timestamp("2024-01-01T02:00:00+02:00").unwrap();
        assert_eq!(offset, extract_timestamp("2024-01-01T00:00:00Z").unwrap());
    }

    #[tokio::test]
    async fn test_parse_file_is_repeatable() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "Started fine-tune session at 2024-01-01T00:00:00Z\r\nBackend not available\nsession ended at 2024-01-01T00:05:00Z"
        )
        .unwrap();

        let parser = SessionLogParser::default();
        let first = parser.parse_file(file.path()).await.unwrap();
        let second = parser.parse_file(file.path()).await.unwrap();

        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_parse_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let parser = SessionLogParser::default();

        let missing = parser.parse_file(dir.path().join("Tune.log")).await.unwrap();
        assert!(missing.is_empty());

        let empty = tempfile::NamedTempFile::new().unwrap();
        let events = parser.parse_file(empty.path()).await.unwrap();
        assert!(events.is_empty());
    }
}
