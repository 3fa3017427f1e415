//! Compact progress output.
//!
//! While the stream runs, one symbol is printed per finished test. Once it
//! ends, the reporter prints, in order:
//!
//! 1. a numbered list of failed, skipped and unfinished tests
//! 2. a benchmark table
//! 3. the summary line
//! 4. packages below the coverage threshold and the slowest tests, when
//!    nothing failed

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use indicatif::HumanCount;

use super::format::{Palette, format_duration};
use super::{Reporter, StreamLine, StreamReport};
use crate::aggregation::Aggregation;
use crate::config::ProgressConfig;
use crate::model::{TestRecord, TestStatus};
use crate::postprocess::DEFAULT_SKIP_MESSAGE;

/// `go test -v` framing lines that carry no information once grouped.
const FRAMING_PREFIXES: &[&str] = &[
    "=== RUN",
    "=== PAUSE",
    "=== CONT",
    "=== NAME",
    "--- PASS:",
    "--- FAIL:",
    "--- SKIP:",
];

pub struct ProgressReporter<W = io::Stdout> {
    out: Mutex<W>,
    palette: Palette,
    symbols: ProgressConfig,
    hide_coverage: bool,
    hide_slowest: bool,
}

impl ProgressReporter<io::Stdout> {
    pub fn stdout(palette: Palette, symbols: ProgressConfig) -> Self {
        Self::new(io::stdout(), palette, symbols)
    }
}

impl<W: Write + Send> ProgressReporter<W> {
    pub fn new(out: W, palette: Palette, symbols: ProgressConfig) -> Self {
        Self {
            out: Mutex::new(out),
            palette,
            symbols,
            hide_coverage: false,
            hide_slowest: false,
        }
    }

    pub fn hide_coverage(mut self, hide: bool) -> Self {
        self.hide_coverage = hide;
        self
    }

    pub fn hide_slowest(mut self, hide: bool) -> Self {
        self.hide_slowest = hide;
        self
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_with<F>(&self, f: F)
    where
        F: FnOnce(&mut W) -> io::Result<()>,
    {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);

        if let Err(e) = f(&mut *out).and_then(|()| out.flush()) {
            tracing::warn!("Failed to write progress output: {}", e);
        }
    }

    fn symbol(&self, status: TestStatus) -> String {
        match status {
            TestStatus::Pass => self.palette.pass(&self.symbols.pass_symbol),
            TestStatus::Fail => self.palette.fail(&self.symbols.fail_symbol),
            TestStatus::Skip => self.palette.skip(&self.symbols.skip_symbol),
            TestStatus::Running => String::new(),
        }
    }

    fn render(&self, out: &mut W, aggregation: &Aggregation) -> io::Result<()> {
        writeln!(out)?;

        self.render_tests(out, aggregation)?;
        self.render_benchmarks(out, aggregation)?;
        self.render_summary(out, aggregation)?;

        if aggregation.count_by(TestStatus::Fail) == 0 {
            if !self.hide_coverage {
                self.render_coverage(out, aggregation)?;
            }
            if !self.hide_slowest {
                self.render_slowest(out, aggregation)?;
            }
        }

        Ok(())
    }

    fn render_tests(&self, out: &mut W, aggregation: &Aggregation) -> io::Result<()> {
        let tests: Vec<&TestRecord> = aggregation
            .tests()
            .into_iter()
            .filter(|t| t.status != TestStatus::Pass)
            .collect();

        for (position, test) in tests.iter().enumerate() {
            let prefix = format!("{}) ", position + 1);
            let indent = " ".repeat(prefix.len());
            let title = if test.readable_name.is_empty() {
                &test.name
            } else {
                &test.readable_name
            };

            writeln!(out)?;
            writeln!(
                out,
                "{}",
                self.palette.status(test.status, &format!("{}{}", prefix, title))
            )?;

            match test.status {
                TestStatus::Fail => {
                    if let Some(trace) = &test.error_trace {
                        writeln!(out, "{}{}", indent, self.palette.detail(trace))?;
                    }
                }
                TestStatus::Skip => {
                    if let Some(source) = &test.test_source {
                        writeln!(out, "{}{}", indent, self.palette.detail(source))?;
                    }
                    let message = test.skip_message.as_deref().unwrap_or(DEFAULT_SKIP_MESSAGE);
                    writeln!(out, "{}{}", indent, self.palette.text(message))?;
                }
                TestStatus::Running => {
                    writeln!(out, "{}{}", indent, self.palette.detail("did not finish"))?;
                }
                TestStatus::Pass => {}
            }

            let lines: Vec<String> = test
                .output
                .iter()
                .filter_map(|line| self.format_output_line(line))
                .collect();

            if !lines.is_empty() {
                writeln!(out)?;
                for line in lines {
                    if line.is_empty() {
                        writeln!(out)?;
                    } else {
                        writeln!(out, "{}{}", indent, line)?;
                    }
                }
            }

            if test.status == TestStatus::Fail
                && let Some(source) = &test.test_source
            {
                writeln!(out)?;
                writeln!(out, "{}{}", indent, self.palette.fail(source))?;
            }
        }

        Ok(())
    }

    /// Colors expected values and removed diff lines with the pass color,
    /// actual values and added lines with the fail color.
    fn format_output_line(&self, line: &str) -> Option<String> {
        let trimmed = line.trim_start();

        if FRAMING_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
            return None;
        }

        if trimmed.is_empty() {
            Some(String::new())
        } else if trimmed.starts_with("expected") || trimmed.starts_with('-') {
            Some(self.palette.pass(line))
        } else if trimmed.starts_with("actual") || trimmed.starts_with('+') {
            Some(self.palette.fail(line))
        } else {
            Some(self.palette.text(line))
        }
    }

    fn render_benchmarks(&self, out: &mut W, aggregation: &Aggregation) -> io::Result<()> {
        let benchmarks = aggregation.benchmarks();
        if benchmarks.is_empty() {
            return Ok(());
        }

        let header = [
            "Benchmark".to_string(),
            "Iterations".to_string(),
            "Time/op".to_string(),
        ];
        let rows: Vec<[String; 3]> = benchmarks
            .iter()
            .map(|b| {
                if b.has_result() {
                    [
                        format!("{}-{}", b.name, b.processors),
                        HumanCount(b.iterations).to_string(),
                        format!("{}/op", format_duration(b.duration_per_op, 2)),
                    ]
                } else {
                    [b.name.clone(), "-".to_string(), "-".to_string()]
                }
            })
            .collect();

        let mut widths = [0usize; 3];
        for row in std::iter::once(&header).chain(rows.iter()) {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        writeln!(out, "\nBenchmarks:\n")?;
        writeln!(
            out,
            "  {}",
            self.palette.detail(&format!(
                "{:<w0$}  {:>w1$}  {:>w2$}",
                header[0],
                header[1],
                header[2],
                w0 = widths[0],
                w1 = widths[1],
                w2 = widths[2],
            ))
        )?;
        for row in &rows {
            writeln!(
                out,
                "  {}  {:>w1$}  {:>w2$}",
                self.palette.text(&format!("{:<w0$}", row[0], w0 = widths[0])),
                row[1],
                row[2],
                w1 = widths[1],
                w2 = widths[2],
            )?;
        }

        Ok(())
    }

    fn render_summary(&self, out: &mut W, aggregation: &Aggregation) -> io::Result<()> {
        let summary = format!(
            "Finished in {}, {} tests, {} failures, {} skips, {} benchmarks",
            format_duration(aggregation.elapsed(), 2),
            aggregation.tests_count(),
            aggregation.count_by(TestStatus::Fail),
            aggregation.count_by(TestStatus::Skip),
            aggregation.benchmarks_count(),
        );

        writeln!(out)?;
        writeln!(
            out,
            "{}",
            self.palette.status(aggregation.overall_status(), &summary)
        )
    }

    fn render_coverage(&self, out: &mut W, aggregation: &Aggregation) -> io::Result<()> {
        let coverage = aggregation.coverages();
        if coverage.is_empty() {
            return Ok(());
        }

        writeln!(out, "\nCoverage:\n")?;
        for record in coverage {
            let percent = format!("{:>8}", format!("[{:.1}%]", record.coverage));
            writeln!(
                out,
                "{} {}",
                self.palette.coverage(record.coverage, &percent),
                self.palette.text(&record.package)
            )?;
        }

        Ok(())
    }

    fn render_slowest(&self, out: &mut W, aggregation: &Aggregation) -> io::Result<()> {
        let slowest = aggregation.slowest_tests();
        if slowest.is_empty() {
            return Ok(());
        }

        let total: std::time::Duration = slowest.iter().map(|t| t.elapsed).sum();
        let elapsed = aggregation.elapsed();
        let share = if elapsed.is_zero() {
            0.0
        } else {
            total.as_secs_f64() / elapsed.as_secs_f64() * 100.0
        };

        writeln!(
            out,
            "\nTop {} slowest tests ({}, {:.2}% of total time):\n",
            slowest.len(),
            format_duration(total, 2),
            share
        )?;

        let times: Vec<String> = slowest
            .iter()
            .map(|t| format_duration(t.elapsed, 2))
            .collect();
        let width = times.iter().map(|t| t.chars().count()).max().unwrap_or(0);

        for (test, time) in slowest.iter().zip(&times) {
            writeln!(
                out,
                "{}  {} {}",
                self.palette.detail(&format!("{:>width$}", time)),
                self.palette.text(&test.name),
                self.palette.detail(&format!("({})", test.package)),
            )?;
        }

        Ok(())
    }
}

#[async_trait]
impl<W: Write + Send> Reporter for ProgressReporter<W> {
    async fn on_line(&self, line: StreamLine<'_>) {
        if let StreamLine::Diagnostic(text) = line {
            self.write_with(|out| writeln!(out, "{}", text));
        }
    }

    async fn on_test_finished(&self, test: &TestRecord) {
        let symbol = self.symbol(test.status);
        self.write_with(|out| write!(out, "{}", symbol));
    }

    async fn on_stream_finished(&self, report: &StreamReport<'_>) {
        self.write_with(|out| self.render(out, report.aggregation));
    }
}
