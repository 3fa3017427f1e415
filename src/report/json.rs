//! Machine-readable run summary.
//!
//! Prints one pretty-printed JSON document when the stream finishes:
//!
//! ```json
//! {
//!   "coverage": [{ "package": "example.com/pkg", "coverage": 83.5 }],
//!   "tests": [{ "name": "TestSum", "package": "example.com/pkg", "status": "pass", ... }],
//!   "benchmarks": [],
//!   "elapsed": 1.25
//! }
//! ```
//!
//! Diagnostic lines go to stderr so stdout stays valid JSON.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;

use super::{Reporter, StreamLine, StreamReport};
use crate::aggregation::Aggregation;
use crate::model::{BenchmarkRecord, CoverageRecord, TestRecord};

#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    /// Packages below the coverage threshold.
    pub coverage: Vec<&'a CoverageRecord>,

    /// Tests sorted by package, then name.
    pub tests: Vec<&'a TestRecord>,

    pub benchmarks: Vec<&'a BenchmarkRecord>,

    /// Seconds.
    pub elapsed: f64,
}

impl<'a> JsonReport<'a> {
    pub fn new(aggregation: &'a Aggregation) -> Self {
        Self {
            coverage: aggregation.coverages(),
            tests: aggregation.tests(),
            benchmarks: aggregation.benchmarks(),
            elapsed: aggregation.elapsed().as_secs_f64(),
        }
    }
}

pub struct JsonReporter<W = io::Stdout> {
    out: Mutex<W>,
}

impl JsonReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<W: Write + Send> Reporter for JsonReporter<W> {
    async fn on_line(&self, line: StreamLine<'_>) {
        if let StreamLine::Diagnostic(text) = line {
            eprintln!("{}", text);
        }
    }

    async fn on_test_finished(&self, _test: &TestRecord) {}

    async fn on_stream_finished(&self, report: &StreamReport<'_>) {
        let document = JsonReport::new(report.aggregation);
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);

        let written = serde_json::to_writer_pretty(&mut *out, &document)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(out))
            .and_then(|()| out.flush());

        if let Err(e) = written {
            tracing::error!("Failed to write JSON report: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestStatus;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    #[tokio::test]
    async fn test_json_document() {
        let mut agg = Aggregation::default();
        agg.started_at = Utc.timestamp_opt(1_700_000_000, 0).single();
        agg.ended_at = Utc.timestamp_opt(1_700_000_002, 500_000_000).single();

        let mut test = TestRecord::new("example.com/pkg", "TestSum", None);
        test.status = TestStatus::Fail;
        test.elapsed = Duration::from_millis(250);
        test.error_trace = Some("sum_test.go:12".to_string());
        agg.tests.insert(test.key.clone(), test);
        agg.coverage.insert(
            "example.com/pkg".to_string(),
            CoverageRecord {
                package: "example.com/pkg".to_string(),
                coverage: 83.5,
            },
        );

        let reporter = JsonReporter::new(Vec::new());
        reporter.on_stream_finished(&StreamReport::new(&agg)).await;

        let text = String::from_utf8(reporter.into_inner()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(json["elapsed"], 2.5);
        assert_eq!(json["coverage"][0]["coverage"], 83.5);
        assert_eq!(json["tests"][0]["name"], "TestSum");
        assert_eq!(json["tests"][0]["readable_name"], "Sum");
        assert_eq!(json["tests"][0]["status"], "fail");
        assert_eq!(json["tests"][0]["elapsed"], 0.25);
        assert_eq!(json["tests"][0]["error_trace"], "sum_test.go:12");
        assert_eq!(json["benchmarks"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_fully_covered_packages_are_omitted() {
        let mut agg = Aggregation::default();
        agg.coverage.insert(
            "p".to_string(),
            CoverageRecord {
                package: "p".to_string(),
                coverage: 100.0,
            },
        );

        let reporter = JsonReporter::new(Vec::new());
        reporter.on_stream_finished(&StreamReport::new(&agg)).await;

        let json: serde_json::Value = serde_json::from_slice(&reporter.into_inner()).unwrap();
        assert_eq!(json["coverage"], serde_json::json!([]));
        assert_eq!(json["elapsed"], 0.0);
    }
}
