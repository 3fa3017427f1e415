//! Text patterns recovered from unstructured `go test` output.
//!
//! Each pattern is a small named parser returning an `Option` of a
//! structured match, so every post-processing pass can be tested on its
//! own. Patterns that embed a `file:line` reference live on
//! [`SourcePatterns`], which is built for a configurable source file
//! extension (`go` by default).

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

static COVERAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"coverage: ([\d.]+)% of statements").expect("valid regex"));

static BENCHMARK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\S+?)-(\d+)\s+(\d+)\s+([\d.]+)\s*([a-zA-Zµμ]+)/op\b").expect("valid regex")
});

static ERROR_ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s+)Error:(\s+)(.+)$").expect("valid regex"));

/// A parsed benchmark result line: `<name>-<procs> <iterations> <value> <unit>/op`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkResult {
    /// Benchmark name without the `-<procs>` suffix.
    pub name: String,
    pub processors: u32,
    pub iterations: u64,
    pub duration_per_op: Duration,
}

/// A skip location line: `<indent><file:line>:( <message>)?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipLocation<'a> {
    pub source: &'a str,
    pub message: Option<&'a str>,
}

/// The `Error:` line testify prints at the top of a failure message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorAnchor<'a> {
    /// Leading whitespace before `Error:`.
    pub indent: &'a str,
    /// Whitespace between `Error:` and the message.
    pub spacing: &'a str,
    pub message: &'a str,
}

impl ErrorAnchor<'_> {
    /// Byte width of the indent, label and spacing together.
    pub fn width(&self) -> usize {
        self.indent.len() + "Error:".len() + self.spacing.len()
    }
}

/// Extracts the coverage percentage from a package output line.
///
/// A malformed percentage yields `0.0`.
pub fn parse_coverage(line: &str) -> Option<f64> {
    let caps = COVERAGE_RE.captures(line)?;

    Some(caps[1].parse().unwrap_or_default())
}

/// Parses a benchmark result line.
///
/// Numbers that match the pattern but don't fit their type degrade to
/// zero instead of rejecting the line.
pub fn parse_benchmark_result(line: &str) -> Option<BenchmarkResult> {
    let caps = BENCHMARK_RE.captures(line.trim())?;

    Some(BenchmarkResult {
        name: caps[1].to_string(),
        processors: caps[2].parse().unwrap_or_default(),
        iterations: caps[3].parse().unwrap_or_default(),
        duration_per_op: parse_go_duration(&caps[4], &caps[5]).unwrap_or_default(),
    })
}

/// Converts a numeric value and a Go duration unit into a [`Duration`].
pub fn parse_go_duration(value: &str, unit: &str) -> Option<Duration> {
    let value: f64 = value.parse().ok()?;

    let nanos_per_unit = match unit {
        "ns" => 1.0,
        "us" | "µs" | "μs" => 1e3,
        "ms" => 1e6,
        "s" => 1e9,
        "m" => 60e9,
        "h" => 3600e9,
        _ => return None,
    };

    let nanos = value * nanos_per_unit;

    if !nanos.is_finite() || nanos < 0.0 {
        return None;
    }

    Some(Duration::from_nanos(nanos.round() as u64))
}

/// Finds the testify `Error:` anchor line.
pub fn parse_error_anchor(line: &str) -> Option<ErrorAnchor<'_>> {
    let caps = ERROR_ANCHOR_RE.captures(line)?;

    Some(ErrorAnchor {
        indent: caps.get(1)?.as_str(),
        spacing: caps.get(2)?.as_str(),
        message: caps.get(3)?.as_str(),
    })
}

/// Patterns that recognize `file:line` references.
#[derive(Debug, Clone)]
pub struct SourcePatterns {
    error_trace: Regex,
    location: Regex,
    skip_location: Regex,
}

impl SourcePatterns {
    /// Builds the patterns for source files with the given extension.
    pub fn new(extension: &str) -> Result<Self, regex::Error> {
        let path = format!(r"(.*?\.{}:\d+)", regex::escape(extension));

        Ok(Self {
            error_trace: Regex::new(&format!(r"^Error Trace:\s*{path}$"))?,
            location: Regex::new(&format!(r"^{path}:?$"))?,
            skip_location: Regex::new(&format!(r"^\s*{path}:(?:\s+(.*?))?\s*$"))?,
        })
    }

    /// Returns the path of an `Error Trace:` line.
    pub fn error_trace<'a>(&self, line: &'a str) -> Option<&'a str> {
        let caps = self.error_trace.captures(line.trim())?;

        caps.get(1).map(|m| m.as_str())
    }

    /// Returns the path when the whole line is a bare `file:line` reference.
    pub fn location<'a>(&self, line: &'a str) -> Option<&'a str> {
        let caps = self.location.captures(line.trim())?;

        caps.get(1).map(|m| m.as_str())
    }

    /// Parses the location line printed by `t.Skip`.
    pub fn skip_location<'a>(&self, line: &'a str) -> Option<SkipLocation<'a>> {
        let caps = self.skip_location.captures(line)?;

        Some(SkipLocation {
            source: caps.get(1)?.as_str(),
            message: caps
                .get(2)
                .map(|m| m.as_str())
                .filter(|m| !m.is_empty()),
        })
    }
}

impl Default for SourcePatterns {
    fn default() -> Self {
        Self::new("go").expect("valid default source patterns")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coverage() {
        assert_eq!(parse_coverage("coverage: 83.5% of statements"), Some(83.5));
        assert_eq!(
            parse_coverage("ok  \texample.com/pkg\t0.1s\tcoverage: 100.0% of statements\n"),
            Some(100.0)
        );
        assert_eq!(parse_coverage("coverage: [no statements]"), None);
        assert_eq!(parse_coverage("coverage: 1.2.3% of statements"), Some(0.0));
    }

    #[test]
    fn test_parse_benchmark_result() {
        let result = parse_benchmark_result("BenchmarkFib10-8   1000000   152 ns/op").unwrap();

        assert_eq!(result.name, "BenchmarkFib10");
        assert_eq!(result.processors, 8);
        assert_eq!(result.iterations, 1_000_000);
        assert_eq!(result.duration_per_op, Duration::from_nanos(152));
    }

    #[test]
    fn test_parse_benchmark_result_with_memory_stats() {
        let line = "BenchmarkSize/large-10-4 \t    2000\t    612345 ns/op\t  1024 B/op\t 3 allocs/op\n";
        let result = parse_benchmark_result(line).unwrap();

        assert_eq!(result.name, "BenchmarkSize/large-10");
        assert_eq!(result.processors, 4);
        assert_eq!(result.iterations, 2000);
        assert_eq!(result.duration_per_op, Duration::from_nanos(612_345));
    }

    #[test]
    fn test_parse_benchmark_fractional_duration() {
        let result = parse_benchmark_result("BenchmarkTiny-2  1000000000  0.2513 ns/op").unwrap();
        assert_eq!(result.duration_per_op, Duration::from_nanos(0));

        let result = parse_benchmark_result("BenchmarkSlow-2  3  1.5 ms/op").unwrap();
        assert_eq!(result.duration_per_op, Duration::from_micros(1500));
    }

    #[test]
    fn test_parse_benchmark_overflow_degrades_to_zero() {
        let result =
            parse_benchmark_result("BenchmarkBig-8  99999999999999999999999  10 ns/op").unwrap();

        assert_eq!(result.processors, 8);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.duration_per_op, Duration::from_nanos(10));
    }

    #[test]
    fn test_parse_benchmark_unknown_unit() {
        let result = parse_benchmark_result("BenchmarkOdd-8  10  3 parsecs/op").unwrap();
        assert_eq!(result.duration_per_op, Duration::ZERO);
    }

    #[test]
    fn test_parse_benchmark_result_after_other_text() {
        let result =
            parse_benchmark_result("goos: linux BenchmarkFib10-8   1000000   152 ns/op").unwrap();

        assert_eq!(result.name, "BenchmarkFib10");
        assert_eq!(result.processors, 8);
        assert_eq!(result.iterations, 1_000_000);
    }

    #[test]
    fn test_non_benchmark_line() {
        assert!(parse_benchmark_result("BenchmarkFib10").is_none());
        assert!(parse_benchmark_result("PASS").is_none());
    }

    #[test]
    fn test_error_trace() {
        let patterns = SourcePatterns::default();

        assert_eq!(
            patterns.error_trace("        \tError Trace:\tpkg/file.go:42"),
            Some("pkg/file.go:42")
        );
        assert_eq!(
            patterns.error_trace("Error Trace:   pkg/file.go:42"),
            Some("pkg/file.go:42")
        );
        assert_eq!(patterns.error_trace("Error: Not equal"), None);
    }

    #[test]
    fn test_location() {
        let patterns = SourcePatterns::default();

        assert_eq!(
            patterns.location("        \t            \tpkg/file.go:99"),
            Some("pkg/file.go:99")
        );
        assert_eq!(patterns.location("file.go:12:"), Some("file.go:12"));
        assert_eq!(patterns.location("file.go:12: message"), None);
    }

    #[test]
    fn test_skip_location() {
        let patterns = SourcePatterns::default();

        assert_eq!(
            patterns.skip_location("    pkg/file.go:10:   custom message"),
            Some(SkipLocation {
                source: "pkg/file.go:10",
                message: Some("custom message"),
            })
        );
        assert_eq!(
            patterns.skip_location("    pkg/file.go:15:"),
            Some(SkipLocation {
                source: "pkg/file.go:15",
                message: None,
            })
        );
        assert!(patterns.skip_location("--- SKIP: TestA (0.00s)").is_none());
    }

    #[test]
    fn test_custom_extension() {
        let patterns = SourcePatterns::new("rs").unwrap();

        assert_eq!(patterns.location("src/lib.rs:7"), Some("src/lib.rs:7"));
        assert_eq!(patterns.location("pkg/file.go:7"), None);
    }

    #[test]
    fn test_error_anchor() {
        let anchor = parse_error_anchor("        \tError:      \tNot equal:").unwrap();

        assert_eq!(anchor.indent, "        \t");
        assert_eq!(anchor.spacing, "      \t");
        assert_eq!(anchor.message, "Not equal:");
        assert_eq!(anchor.width(), 22);
        assert!(parse_error_anchor("Error: no indent").is_none());
    }
}
