//! Plain `go test -v` style output.
//!
//! Echoes the output text of every event as it arrives, coloring the
//! `=== RUN` and `--- PASS/FAIL/SKIP` markers, followed by the summary line.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::format::{Palette, format_duration};
use super::{Reporter, StreamLine, StreamReport};
use crate::model::{TestRecord, TestStatus};

pub struct StandardReporter<W = io::Stdout> {
    out: Mutex<W>,
    palette: Palette,
}

impl StandardReporter<io::Stdout> {
    pub fn stdout(palette: Palette) -> Self {
        Self::new(io::stdout(), palette)
    }
}

impl<W: Write + Send> StandardReporter<W> {
    pub fn new(out: W, palette: Palette) -> Self {
        Self {
            out: Mutex::new(out),
            palette,
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);

        if let Err(e) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
            tracing::warn!("Failed to write test output: {}", e);
        }
    }

    /// Colors the first status marker of `text`.
    fn highlight(&self, text: &str) -> String {
        let markers = [
            ("=== RUN", TestStatus::Running),
            ("--- PASS:", TestStatus::Pass),
            ("--- FAIL:", TestStatus::Fail),
            ("--- SKIP:", TestStatus::Skip),
        ];

        for (marker, status) in markers {
            if let Some(index) = text.find(marker) {
                let (before, rest) = text.split_at(index);
                let after = &rest[marker.len()..];
                return format!(
                    "{}{}{}",
                    before,
                    self.palette.status(status, marker),
                    after
                );
            }
        }

        text.to_string()
    }
}

#[async_trait]
impl<W: Write + Send> Reporter for StandardReporter<W> {
    async fn on_line(&self, line: StreamLine<'_>) {
        match line {
            StreamLine::Event(event) => {
                if let Some(output) = &event.output {
                    self.write(&self.highlight(output));
                }
            }
            StreamLine::Diagnostic(text) => self.write(&format!("{}\n", text)),
        }
    }

    async fn on_test_finished(&self, _test: &TestRecord) {}

    async fn on_stream_finished(&self, report: &StreamReport<'_>) {
        let aggregation = report.aggregation;
        let summary = format!(
            "Finished in {}, {} tests, {} failures, {} skips, {} benchmarks",
            format_duration(aggregation.elapsed(), 2),
            aggregation.tests_count(),
            aggregation.count_by(TestStatus::Fail),
            aggregation.count_by(TestStatus::Skip),
            aggregation.benchmarks_count(),
        );

        self.write(&format!(
            "\n{}\n",
            self.palette.status(aggregation.overall_status(), &summary)
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::Aggregation;
    use crate::event::{Action, Event};

    fn output_event(text: &str) -> Event {
        Event {
            action: Action::Output,
            package: "p".to_string(),
            test: "TestA".to_string(),
            output: Some(text.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_echoes_output() {
        let reporter = StandardReporter::new(Vec::new(), Palette::plain());

        reporter
            .on_line(StreamLine::Event(&output_event("=== RUN   TestA\n")))
            .await;
        reporter
            .on_line(StreamLine::Event(&Event {
                action: Action::Run,
                ..Default::default()
            }))
            .await;
        reporter
            .on_line(StreamLine::Event(&output_event("--- PASS: TestA (0.00s)\n")))
            .await;
        reporter.on_line(StreamLine::Diagnostic("# noise")).await;

        let text = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(text, "=== RUN   TestA\n--- PASS: TestA (0.00s)\n# noise\n");
    }

    #[test]
    fn test_highlight_marker() {
        let reporter = StandardReporter::new(Vec::new(), Palette::new(true));

        let line = reporter.highlight("    --- FAIL: TestA/sub (0.01s)\n");

        assert!(line.starts_with("    \u{1b}["));
        assert_eq!(
            console::strip_ansi_codes(&line),
            "    --- FAIL: TestA/sub (0.01s)\n"
        );
        assert_eq!(reporter.highlight("plain\n"), "plain\n");
    }

    #[tokio::test]
    async fn test_summary() {
        let reporter = StandardReporter::new(Vec::new(), Palette::plain());
        let aggregation = Aggregation::default();

        reporter
            .on_stream_finished(&StreamReport::new(&aggregation))
            .await;

        let text = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(
            text,
            "\nFinished in 0s, 0 tests, 0 failures, 0 skips, 0 benchmarks\n"
        );
    }
}
