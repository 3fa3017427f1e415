//! Reporting of stream progress and run results.
//!
//! The [`StreamConsumer`](crate::consumer::StreamConsumer) drives a single
//! [`Reporter`]. Several reporters are combined with [`MultiReporter`],
//! which forwards every callback to each of them in registration order.
//!
//! Available reporters:
//!
//! - [`ProgressReporter`]: one symbol per finished test, then failures,
//!   benchmarks, a summary line, coverage and the slowest tests
//! - [`JsonReporter`]: a single JSON document once the stream finishes
//! - [`StandardReporter`]: echoes `go test -v` style output with highlights
//! - [`JUnitReporter`]: writes a JUnit XML file
//! - [`PostRunReporter`]: runs a shell command with the run summary in its
//!   environment

pub mod format;
pub mod json;
pub mod junit;
pub mod post_run;
pub mod progress;
pub mod standard;

use async_trait::async_trait;

use crate::aggregation::Aggregation;
use crate::consumer::StreamError;
use crate::event::Event;
use crate::model::{BenchmarkRecord, CoverageRecord, TestRecord};

pub use format::{Palette, format_duration};
pub use json::JsonReporter;
pub use junit::JUnitReporter;
pub use post_run::PostRunReporter;
pub use progress::ProgressReporter;
pub use standard::StandardReporter;

/// A raw line of the stream as seen by reporters.
#[derive(Debug, Clone, Copy)]
pub enum StreamLine<'a> {
    /// A decoded JSON event.
    Event(&'a Event),

    /// Text that was not a JSON event.
    Diagnostic(&'a str),
}

/// Everything known once the stream has ended.
#[derive(Debug, Clone)]
pub struct StreamReport<'a> {
    /// Tests ordered by start time.
    pub tests: Vec<&'a TestRecord>,

    /// Coverage of every package, ordered by package.
    pub coverage: Vec<&'a CoverageRecord>,

    /// Benchmarks ordered by key.
    pub benchmarks: Vec<&'a BenchmarkRecord>,

    /// The full store, for derived views.
    pub aggregation: &'a Aggregation,
}

impl<'a> StreamReport<'a> {
    pub fn new(aggregation: &'a Aggregation) -> Self {
        Self {
            tests: aggregation.tests_by_start(),
            coverage: aggregation.all_coverage(),
            benchmarks: aggregation.benchmarks(),
            aggregation,
        }
    }
}

/// Receives callbacks while the stream is consumed.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Called for every raw line, before it is applied to the aggregation.
    async fn on_line(&self, _line: StreamLine<'_>) {}

    /// Called once per test when it reaches a terminal status, after its
    /// output has been post-processed.
    async fn on_test_finished(&self, test: &TestRecord);

    /// Called once when the stream ends normally.
    async fn on_stream_finished(&self, report: &StreamReport<'_>);

    /// Called instead of [`Reporter::on_stream_finished`] when the stream
    /// is aborted.
    async fn on_fatal_error(&self, _error: &StreamError) {}
}

/// A reporter that does nothing.
pub struct NullReporter;

#[async_trait]
impl Reporter for NullReporter {
    async fn on_test_finished(&self, _test: &TestRecord) {}
    async fn on_stream_finished(&self, _report: &StreamReport<'_>) {}
}

/// A reporter that combines multiple reporters.
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    /// Add a reporter to the multi-reporter.
    pub fn with_reporter<R: Reporter + 'static>(mut self, reporter: R) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl Default for MultiReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reporter for MultiReporter {
    async fn on_line(&self, line: StreamLine<'_>) {
        for reporter in &self.reporters {
            reporter.on_line(line).await;
        }
    }

    async fn on_test_finished(&self, test: &TestRecord) {
        for reporter in &self.reporters {
            reporter.on_test_finished(test).await;
        }
    }

    async fn on_stream_finished(&self, report: &StreamReport<'_>) {
        for reporter in &self.reporters {
            reporter.on_stream_finished(report).await;
        }
    }

    async fn on_fatal_error(&self, error: &StreamError) {
        for reporter in &self.reporters {
            reporter.on_fatal_error(error).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        name: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Reporter for Recorder {
        async fn on_test_finished(&self, test: &TestRecord) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, test.name));
        }

        async fn on_stream_finished(&self, report: &StreamReport<'_>) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:done:{}", self.name, report.tests.len()));
        }

        async fn on_fatal_error(&self, error: &StreamError) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:fatal:{}", self.name, error));
        }
    }

    #[tokio::test]
    async fn test_multi_reporter_forwards_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let multi = MultiReporter::new()
            .with_reporter(Recorder {
                name: "a",
                calls: calls.clone(),
            })
            .with_reporter(Recorder {
                name: "b",
                calls: calls.clone(),
            });
        assert_eq!(multi.len(), 2);

        let test = TestRecord::new("p", "TestA", None);
        multi.on_test_finished(&test).await;

        let aggregation = Aggregation::default();
        multi
            .on_stream_finished(&StreamReport::new(&aggregation))
            .await;

        multi
            .on_fatal_error(&StreamError::BuildFailed("FAIL p [build failed]".into()))
            .await;

        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                "a:TestA",
                "b:TestA",
                "a:done:0",
                "b:done:0",
                "a:fatal:build failed: FAIL p [build failed]",
                "b:fatal:build failed: FAIL p [build failed]",
            ]
        );
    }

    #[tokio::test]
    async fn test_null_reporter() {
        let reporter = NullReporter;
        let aggregation = Aggregation::default();

        reporter.on_line(StreamLine::Diagnostic("noise")).await;
        reporter
            .on_stream_finished(&StreamReport::new(&aggregation))
            .await;
    }
}
