//! Decoding of `go test -json` lines.
//!
//! Every line produced by `go test -json` is a complete JSON object
//! describing one action. Lines that fail to decode are diagnostics
//! (compiler errors, package download noise) and are passed through
//! verbatim. A diagnostic containing [`BUILD_FAILED_MARKER`] is fatal for
//! the stream.
//!
//! ```
//! use bolt::event::{Action, Decoded, decode_line};
//!
//! let line = r#"{"Time":"2023-10-26T21:41:41Z","Action":"run","Package":"example.com/pkg","Test":"TestSum"}"#;
//!
//! match decode_line(line) {
//!     Decoded::Event(event) => {
//!         assert_eq!(event.action, Action::Run);
//!         assert_eq!(event.test, "TestSum");
//!     }
//!     other => panic!("unexpected: {:?}", other),
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Substring `go test` prints when a package fails to compile.
pub const BUILD_FAILED_MARKER: &str = "[build failed]";

/// Name prefix `go test` uses for benchmark functions.
pub const BENCHMARK_PREFIX: &str = "Benchmark";

/// The kind of a stream event.
///
/// Actions this crate does not know about (`pause`, `cont`, `bench`, and
/// anything a newer toolchain adds) decode as [`Action::Unknown`] and are
/// ignored by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Start,
    Run,
    Output,
    Pass,
    Fail,
    Skip,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Action {
    /// Returns `true` for `pass`, `fail` and `skip`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Action::Pass | Action::Fail | Action::Skip)
    }
}

/// One decoded line of the event stream.
///
/// Only `action` is interpreted strictly. Missing fields take their empty
/// values, so package-level events simply have an empty `test`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Event {
    #[serde(default)]
    pub action: Action,

    #[serde(default)]
    pub package: String,

    #[serde(default)]
    pub test: String,

    /// Present only for `output` events.
    #[serde(default)]
    pub output: Option<String>,

    /// Seconds, present only on terminal events.
    #[serde(default)]
    pub elapsed: Option<f64>,

    /// RFC 3339 timestamp as emitted by the producer.
    #[serde(default)]
    pub time: Option<String>,
}

impl Event {
    /// Composite identity of the test or benchmark this event refers to.
    pub fn key(&self) -> String {
        format!("{}:{}", self.package, self.test)
    }

    /// Whether the event refers to a package rather than a single test.
    pub fn is_package_level(&self) -> bool {
        self.test.is_empty()
    }

    pub fn is_benchmark(&self) -> bool {
        self.test.starts_with(BENCHMARK_PREFIX)
    }

    /// Parsed event time. `None` when absent or not RFC 3339.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let time = self.time.as_deref()?;

        DateTime::parse_from_rfc3339(time)
            .map(|t| t.with_timezone(&Utc))
            .ok()
    }

    /// The `output` payload, or an empty string.
    pub fn output_text(&self) -> &str {
        self.output.as_deref().unwrap_or_default()
    }
}

/// Outcome of decoding a single raw line.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A well-formed JSON event.
    Event(Event),

    /// Unstructured text, passed through to reporters.
    Diagnostic(String),

    /// Unstructured text carrying the build-failed marker.
    BuildFailed(String),
}

/// Decodes one raw line of `go test -json` output.
pub fn decode_line(line: &str) -> Decoded {
    match serde_json::from_str::<Event>(line) {
        Ok(event) => Decoded::Event(event),
        Err(_) if line.contains(BUILD_FAILED_MARKER) => Decoded::BuildFailed(line.to_string()),
        Err(_) => Decoded::Diagnostic(line.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_output_event() {
        let line = r#"{"Time":"2023-10-27T01:26:18.123Z","Action":"output","Package":"example.com/pkg","Test":"TestA","Output":"=== RUN   TestA\n"}"#;

        let Decoded::Event(event) = decode_line(line) else {
            panic!("expected event");
        };

        assert_eq!(event.action, Action::Output);
        assert_eq!(event.package, "example.com/pkg");
        assert_eq!(event.key(), "example.com/pkg:TestA");
        assert_eq!(event.output_text(), "=== RUN   TestA\n");
        assert!(event.elapsed.is_none());
        assert_eq!(
            event.timestamp().unwrap().to_rfc3339(),
            "2023-10-27T01:26:18.123+00:00"
        );
    }

    #[test]
    fn test_decode_package_level_terminal() {
        let line = r#"{"Action":"pass","Package":"example.com/pkg","Elapsed":0.42}"#;

        let Decoded::Event(event) = decode_line(line) else {
            panic!("expected event");
        };

        assert!(event.action.is_terminal());
        assert!(event.is_package_level());
        assert_eq!(event.elapsed, Some(0.42));
    }

    #[test]
    fn test_unknown_action_is_not_an_error() {
        let line = r#"{"Action":"pause","Package":"p","Test":"TestA"}"#;

        let Decoded::Event(event) = decode_line(line) else {
            panic!("expected event");
        };

        assert_eq!(event.action, Action::Unknown);
    }

    #[test]
    fn test_non_json_is_diagnostic() {
        assert_eq!(
            decode_line("# example.com/pkg"),
            Decoded::Diagnostic("# example.com/pkg".to_string())
        );
    }

    #[test]
    fn test_build_failed_marker() {
        let line = "FAIL\texample.com/pkg [build failed]";
        assert_eq!(decode_line(line), Decoded::BuildFailed(line.to_string()));
    }

    #[test]
    fn test_bad_timestamp_is_none() {
        let event = Event {
            time: Some("yesterday".to_string()),
            ..Default::default()
        };

        assert!(event.timestamp().is_none());
    }

    #[test]
    fn test_benchmark_detection() {
        let event = Event {
            test: "BenchmarkFib10".to_string(),
            ..Default::default()
        };

        assert!(event.is_benchmark());
        assert!(!event.is_package_level());
    }
}
