//! Consumption of a `go test -json` line stream.
//!
//! [`StreamConsumer`] reads lines until the stream ends, applying each
//! decoded event to an [`Aggregation`] and notifying a [`Reporter`] as it
//! goes:
//!
//! | action   | subject         | effect                                         |
//! |----------|-----------------|------------------------------------------------|
//! | `start`  | package         | moves the stream start earlier                 |
//! | `run`    | test            | creates a running test and a 0% coverage entry |
//! | `run`    | benchmark       | creates a benchmark                            |
//! | `output` | package         | records coverage                               |
//! | `output` | benchmark       | appends output, records the result line        |
//! | `output` | running test    | appends normalized output                      |
//! | terminal | running test    | sets status and timing, post-processes output  |
//!
//! Events that refer to unknown records or try to re-terminate a test are
//! logged and dropped. A non-JSON line carrying the build-failed marker
//! aborts the stream with [`StreamError::BuildFailed`].

use std::io;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::aggregation::{Aggregation, ViewSettings};
use crate::event::{Action, Decoded, Event, decode_line};
use crate::model::{BenchmarkRecord, CoverageRecord, TestRecord, TestStatus};
use crate::patterns::{BenchmarkResult, parse_benchmark_result, parse_coverage};
use crate::postprocess::{OutputProcessor, PathNormalizer};
use crate::report::{Reporter, StreamLine, StreamReport};

/// Errors that abort stream consumption.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("build failed: {0}")]
    BuildFailed(String),
}

/// Stateful consumer of one event stream.
pub struct StreamConsumer<'r, R: Reporter + ?Sized> {
    aggregation: Aggregation,
    normalizer: PathNormalizer,
    processor: OutputProcessor,
    reporter: &'r R,
    clock: fn() -> DateTime<Utc>,
    latest_event_at: Option<DateTime<Utc>>,
}

impl<'r, R: Reporter + ?Sized> StreamConsumer<'r, R> {
    /// Creates a consumer that reports to `reporter`.
    ///
    /// Paths are not normalized and the default `.go` patterns are used
    /// until overridden with the builder methods.
    pub fn new(reporter: &'r R, settings: ViewSettings) -> Self {
        Self {
            aggregation: Aggregation::new(settings),
            normalizer: PathNormalizer::default(),
            processor: OutputProcessor::default(),
            reporter,
            clock: Utc::now,
            latest_event_at: None,
        }
    }

    pub fn with_normalizer(mut self, normalizer: PathNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_processor(mut self, processor: OutputProcessor) -> Self {
        self.processor = processor;
        self
    }

    /// Replaces the wall clock used for the stream start and end times.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn aggregation(&self) -> &Aggregation {
        &self.aggregation
    }

    /// Consumes `lines` to the end and returns the final aggregation.
    ///
    /// A read error ends the stream early but is not fatal: whatever was
    /// collected so far is still reported.
    pub async fn run<S>(mut self, lines: S) -> Result<Aggregation, StreamError>
    where
        S: Stream<Item = io::Result<String>>,
    {
        let mut lines = std::pin::pin!(lines);

        self.aggregation.started_at = Some((self.clock)());

        let mut outcome = Ok(());
        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("Failed to read test output: {}", e);
                    break;
                }
            };

            if let Err(e) = self.ingest(&line).await {
                outcome = Err(e);
                break;
            }
        }

        self.aggregation.ended_at = Some(self.end_time());

        match outcome {
            Ok(()) => {
                {
                    let report = StreamReport::new(&self.aggregation);
                    self.reporter.on_stream_finished(&report).await;
                }
                Ok(self.aggregation)
            }
            Err(e) => {
                self.reporter.on_fatal_error(&e).await;
                Err(e)
            }
        }
    }

    /// The latest event time, so replays report the duration of the
    /// recorded run. Falls back to the wall clock without usable timestamps.
    fn end_time(&self) -> DateTime<Utc> {
        match (self.latest_event_at, self.aggregation.started_at) {
            (Some(latest), Some(started)) if latest >= started => latest,
            _ => (self.clock)(),
        }
    }

    /// Decodes and applies a single raw line.
    pub async fn ingest(&mut self, line: &str) -> Result<(), StreamError> {
        match decode_line(line) {
            Decoded::Event(event) => {
                self.reporter.on_line(StreamLine::Event(&event)).await;
                self.apply(&event).await;
                Ok(())
            }
            Decoded::Diagnostic(text) => {
                debug!("Diagnostic: {}", text);
                self.reporter.on_line(StreamLine::Diagnostic(&text)).await;
                Ok(())
            }
            Decoded::BuildFailed(text) => {
                self.reporter.on_line(StreamLine::Diagnostic(&text)).await;
                Err(StreamError::BuildFailed(text))
            }
        }
    }

    /// Applies one decoded event to the aggregation.
    pub async fn apply(&mut self, event: &Event) {
        if let Some(time) = event.timestamp()
            && self.latest_event_at.is_none_or(|latest| latest < time)
        {
            self.latest_event_at = Some(time);
        }

        match event.action {
            Action::Start => self.record_start(event),
            Action::Run if event.is_package_level() => {}
            Action::Run if event.is_benchmark() => self.start_benchmark(event),
            Action::Run => self.start_test(event),
            Action::Output if event.is_package_level() => self.package_output(event),
            Action::Output if event.is_benchmark() => self.benchmark_output(event),
            Action::Output => self.test_output(event),
            action if action.is_terminal() => {
                if !event.is_package_level() && !event.is_benchmark() {
                    self.finish_test(event).await;
                }
            }
            _ => {}
        }
    }

    fn record_start(&mut self, event: &Event) {
        let Some(time) = event.timestamp() else {
            return;
        };

        match self.aggregation.started_at {
            Some(current) if current <= time => {}
            _ => self.aggregation.started_at = Some(time),
        }
    }

    fn start_test(&mut self, event: &Event) {
        let test = TestRecord::new(&event.package, &event.test, event.timestamp());

        if let Some(previous) = self.aggregation.tests.insert(test.key.clone(), test)
            && previous.is_running()
        {
            debug!("Test {} restarted before finishing", previous.key);
        }

        self.aggregation
            .coverage
            .entry(event.package.clone())
            .or_insert_with(|| CoverageRecord {
                package: event.package.clone(),
                coverage: 0.0,
            });
    }

    fn start_benchmark(&mut self, event: &Event) {
        let benchmark = BenchmarkRecord::new(&event.package, &event.test, event.timestamp());
        self.aggregation
            .benchmarks
            .insert(benchmark.key.clone(), benchmark);
    }

    fn package_output(&mut self, event: &Event) {
        let output = event.output_text();

        if let Some(coverage) = parse_coverage(output) {
            self.aggregation.coverage.insert(
                event.package.clone(),
                CoverageRecord {
                    package: event.package.clone(),
                    coverage,
                },
            );
            return;
        }

        // Older toolchains print benchmark results without a test name.
        if let Some(result) = parse_benchmark_result(output) {
            let key = crate::model::record_key(&event.package, &result.name);
            self.record_benchmark_result(&key, result, event.timestamp());
        }
    }

    fn benchmark_output(&mut self, event: &Event) {
        let key = event.key();
        let line = self.normalizer.normalize(event.output_text());

        let Some(benchmark) = self.aggregation.benchmarks.get_mut(&key) else {
            debug!("Output for unknown benchmark {}", key);
            return;
        };
        benchmark.output.push(line);

        if let Some(result) = parse_benchmark_result(event.output_text()) {
            self.record_benchmark_result(&key, result, event.timestamp());
        }
    }

    fn record_benchmark_result(
        &mut self,
        key: &str,
        result: BenchmarkResult,
        time: Option<DateTime<Utc>>,
    ) {
        let Some(benchmark) = self.aggregation.benchmarks.get_mut(key) else {
            debug!("Result for unknown benchmark {}", key);
            return;
        };

        benchmark.processors = result.processors;
        benchmark.iterations = result.iterations;
        benchmark.duration_per_op = result.duration_per_op;
        benchmark.ended_at = time;
    }

    fn test_output(&mut self, event: &Event) {
        let key = event.key();

        let Some(test) = self.aggregation.tests.get_mut(&key) else {
            debug!("Output for unknown test {}", key);
            return;
        };

        if !test.is_running() {
            debug!("Ignoring output for finished test {}", key);
            return;
        }

        test.output.push(self.normalizer.normalize(event.output_text()));
    }

    async fn finish_test(&mut self, event: &Event) {
        let key = event.key();

        let Some(test) = self.aggregation.tests.get_mut(&key) else {
            debug!("Terminal event for unknown test {}", key);
            return;
        };

        if !test.is_running() {
            debug!("Ignoring repeated terminal event for {}", key);
            return;
        }

        test.status = match event.action {
            Action::Pass => TestStatus::Pass,
            Action::Fail => TestStatus::Fail,
            _ => TestStatus::Skip,
        };
        test.ended_at = event.timestamp();
        test.elapsed = event
            .elapsed
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or_default();

        self.processor.process(test);

        self.reporter.on_test_finished(test).await;
    }
}
