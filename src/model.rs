//! Per-entity records built up from the event stream.
//!
//! - [`TestRecord`]: one test function (or subtest), keyed by `package:name`
//! - [`BenchmarkRecord`]: one benchmark, completed when its result line shows up
//! - [`CoverageRecord`]: one coverage percentage per package

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Lifecycle status of a test.
///
/// A test starts out [`Running`](TestStatus::Running) and moves to exactly
/// one terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Running,
    Pass,
    Fail,
    Skip,
}

impl TestStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TestStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Running => "running",
            TestStatus::Pass => "pass",
            TestStatus::Fail => "fail",
            TestStatus::Skip => "skip",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated state of a single test.
#[derive(Debug, Clone, Serialize)]
pub struct TestRecord {
    #[serde(skip)]
    pub key: String,

    pub name: String,
    pub package: String,

    /// `TestEqualNumberPass` becomes `Equal Number Pass`.
    pub readable_name: String,

    pub status: TestStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,

    /// Producer-reported duration.
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,

    /// Captured output, post-processed once the test finishes.
    pub output: Vec<String>,

    /// Location of the failing assertion.
    pub error_trace: Option<String>,

    /// Call site inside the test function when the assertion ran in a helper,
    /// or the location of a `t.Skip` call.
    pub test_source: Option<String>,

    pub skip_message: Option<String>,
}

impl TestRecord {
    /// Creates a running test record.
    pub fn new(
        package: impl Into<String>,
        name: impl Into<String>,
        started_at: Option<DateTime<Utc>>,
    ) -> Self {
        let package = package.into();
        let name = name.into();

        Self {
            key: record_key(&package, &name),
            readable_name: readable_name(&name),
            name,
            package,
            status: TestStatus::Running,
            started_at,
            ended_at: None,
            elapsed: Duration::ZERO,
            output: Vec::new(),
            error_trace: None,
            test_source: None,
            skip_message: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == TestStatus::Running
    }
}

/// Aggregated state of a single benchmark.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkRecord {
    #[serde(skip)]
    pub key: String,

    pub name: String,
    pub package: String,
    pub started_at: Option<DateTime<Utc>>,

    /// Set when the result line is recognized.
    pub ended_at: Option<DateTime<Utc>>,

    pub processors: u32,
    pub iterations: u64,

    #[serde(serialize_with = "serialize_nanos")]
    pub duration_per_op: Duration,

    pub output: Vec<String>,
}

impl BenchmarkRecord {
    pub fn new(
        package: impl Into<String>,
        name: impl Into<String>,
        started_at: Option<DateTime<Utc>>,
    ) -> Self {
        let package = package.into();
        let name = name.into();

        Self {
            key: record_key(&package, &name),
            name,
            package,
            started_at,
            ended_at: None,
            processors: 0,
            iterations: 0,
            duration_per_op: Duration::ZERO,
            output: Vec::new(),
        }
    }

    /// Whether a result line has been seen for this benchmark.
    pub fn has_result(&self) -> bool {
        self.iterations > 0
    }
}

/// Coverage percentage of one package.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageRecord {
    pub package: String,
    pub coverage: f64,
}

/// Builds the `package:name` identity shared by tests and benchmarks.
pub fn record_key(package: &str, name: &str) -> String {
    format!("{}:{}", package, name)
}

/// Turns a Go test identifier into words, dropping the leading token.
///
/// Words break on case changes, digit runs and punctuation, the way
/// camel-case splitting does (`HTTPServer` is `HTTP Server`). Underscores
/// are dropped.
///
/// ```
/// use bolt::model::readable_name;
///
/// assert_eq!(readable_name("TestEqualNumberPass"), "Equal Number Pass");
/// assert_eq!(readable_name("TestHTTPServer2"), "HTTP Server 2");
/// assert_eq!(readable_name("Test_with_underscores"), "with underscores");
/// ```
pub fn readable_name(name: &str) -> String {
    split_words(name)
        .into_iter()
        .skip(1)
        .filter(|word| word != "_")
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Lower,
    Upper,
    Digit,
    Other,
}

impl CharClass {
    fn of(c: char) -> Self {
        if c.is_lowercase() {
            CharClass::Lower
        } else if c.is_uppercase() {
            CharClass::Upper
        } else if c.is_numeric() {
            CharClass::Digit
        } else {
            CharClass::Other
        }
    }
}

fn split_words(name: &str) -> Vec<String> {
    let mut runs: Vec<(CharClass, String)> = Vec::new();

    for c in name.chars() {
        let class = CharClass::of(c);

        match runs.last_mut() {
            Some((last, run)) if *last == class => run.push(c),
            _ => runs.push((class, c.to_string())),
        }
    }

    // "HTTPServer" splits into "HTTPS" + "erver"; move the last upper-case
    // letter over so the lower-case run keeps its capital.
    for i in 0..runs.len().saturating_sub(1) {
        if runs[i].0 == CharClass::Upper
            && runs[i + 1].0 == CharClass::Lower
            && runs[i].1.chars().count() > 1
            && let Some(last) = runs[i].1.pop()
        {
            runs[i + 1].1.insert(0, last);
        }
    }

    let mut words: Vec<String> = Vec::new();
    let mut pending_capital: Option<String> = None;

    for (class, run) in runs {
        match class {
            CharClass::Upper if run.chars().count() == 1 => {
                if let Some(capital) = pending_capital.take() {
                    words.push(capital);
                }
                pending_capital = Some(run);
            }
            CharClass::Lower => match pending_capital.take() {
                Some(capital) => words.push(capital + &run),
                None => words.push(run),
            },
            _ => {
                if let Some(capital) = pending_capital.take() {
                    words.push(capital);
                }
                words.push(run);
            }
        }
    }

    if let Some(capital) = pending_capital {
        words.push(capital);
    }

    words
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

fn serialize_nanos<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readable_name() {
        assert_eq!(readable_name("TestEqualNumberPass"), "Equal Number Pass");
        assert_eq!(
            readable_name("TestSkipTestWithoutMessage"),
            "Skip Test Without Message"
        );
        assert_eq!(readable_name("TestFailedThroughHelper"), "Failed Through Helper");
    }

    #[test]
    fn test_readable_name_acronyms_and_digits() {
        assert_eq!(readable_name("TestHTTPServer"), "HTTP Server");
        assert_eq!(readable_name("TestParseJSON"), "Parse JSON");
        assert_eq!(readable_name("TestFib10"), "Fib 10");
    }

    #[test]
    fn test_readable_name_underscores() {
        assert_eq!(readable_name("TestSum_negative"), "Sum negative");
    }

    #[test]
    fn test_readable_name_single_token() {
        assert_eq!(readable_name("Test"), "");
    }

    #[test]
    fn test_new_record_is_running() {
        let record = TestRecord::new("example.com/pkg", "TestA", None);

        assert_eq!(record.key, "example.com/pkg:TestA");
        assert_eq!(record.readable_name, "A");
        assert!(record.is_running());
        assert!(!record.status.is_terminal());
    }

    #[test]
    fn test_benchmark_has_result() {
        let mut bench = BenchmarkRecord::new("p", "BenchmarkA", None);
        assert!(!bench.has_result());

        bench.iterations = 10;
        assert!(bench.has_result());
    }

    #[test]
    fn test_serialized_record_uses_seconds() {
        let mut record = TestRecord::new("p", "TestA", None);
        record.elapsed = Duration::from_millis(1500);
        record.status = TestStatus::Pass;

        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["elapsed"], 1.5);
        assert_eq!(json["status"], "pass");
        assert!(json.get("key").is_none());
    }
}
