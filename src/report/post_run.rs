//! Post-run hook.
//!
//! Runs a user command through `sh -c` once the stream finishes, with the
//! run summary exported as environment variables:
//!
//! | Variable | Value |
//! |----------|-------|
//! | `BOLT_SUMMARY` | the summary line |
//! | `BOLT_TITLE` | `✅ Tests passed`, `❌ Tests failed` or `⚠️ Tests passed with skips` |
//! | `BOLT_TEST_COUNT` | number of tests |
//! | `BOLT_PASS_COUNT` / `BOLT_FAIL_COUNT` / `BOLT_SKIP_COUNT` | per status |
//! | `BOLT_BENCHMARK_COUNT` | number of benchmarks |
//! | `BOLT_ELAPSED` | formatted elapsed time |
//! | `BOLT_ELAPSED_NANOSECONDS` | elapsed time in nanoseconds |

use std::process::Stdio;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::format::format_duration;
use super::{Reporter, StreamReport};
use crate::aggregation::Aggregation;
use crate::model::{TestRecord, TestStatus};

pub struct PostRunReporter {
    command: String,
}

impl PostRunReporter {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

/// Environment exported to the post-run command.
pub fn summary_env(aggregation: &Aggregation) -> Vec<(&'static str, String)> {
    let elapsed = aggregation.elapsed();
    let tests = aggregation.tests_count();
    let failed = aggregation.count_by(TestStatus::Fail);
    let skipped = aggregation.count_by(TestStatus::Skip);

    let summary = format!(
        "{} tests, {} failures, {} skips, {} benchmarks in {}",
        tests,
        failed,
        skipped,
        aggregation.benchmarks_count(),
        format_duration(elapsed, 2),
    );
    let title = match aggregation.overall_status() {
        TestStatus::Fail => "❌ Tests failed",
        TestStatus::Skip => "⚠️ Tests passed with skips",
        _ => "✅ Tests passed",
    };

    vec![
        ("BOLT_SUMMARY", summary),
        ("BOLT_TITLE", title.to_string()),
        ("BOLT_TEST_COUNT", tests.to_string()),
        (
            "BOLT_PASS_COUNT",
            aggregation.count_by(TestStatus::Pass).to_string(),
        ),
        ("BOLT_FAIL_COUNT", failed.to_string()),
        ("BOLT_SKIP_COUNT", skipped.to_string()),
        (
            "BOLT_BENCHMARK_COUNT",
            aggregation.benchmarks_count().to_string(),
        ),
        ("BOLT_ELAPSED", format_duration(elapsed, 2)),
        ("BOLT_ELAPSED_NANOSECONDS", elapsed.as_nanos().to_string()),
    ]
}

#[async_trait]
impl Reporter for PostRunReporter {
    async fn on_test_finished(&self, _test: &TestRecord) {}

    async fn on_stream_finished(&self, report: &StreamReport<'_>) {
        if self.command.trim().is_empty() {
            return;
        }

        debug!("Running post-run command: {}", self.command);

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .envs(summary_env(report.aggregation))
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                debug!("Post-run command finished");
            }
            Ok(output) => {
                warn!(
                    "Post-run command exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => {
                warn!("Failed to run post-run command: {}", e);
            }
        }
    }
}
