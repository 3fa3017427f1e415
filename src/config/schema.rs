//! Configuration schema for `bolt.toml`.
//!
//! Every section and field is optional; an empty file is a valid
//! configuration equal to [`Config::default`].
//!
//! ```text
//! Config (root)
//! ├── RunConfig        - Which reporter, how to invoke go test
//! ├── ReportConfig     - Coverage and slowest-test views, JUnit, post-run hook
//! ├── ProgressConfig   - Symbols printed per finished test
//! └── PatternsConfig   - Source file extension in file:line references
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aggregation::ViewSettings;

/// Root configuration structure.
///
/// # Example
///
/// ```
/// use bolt::config::{Config, ReporterKind};
///
/// let config: Config = toml::from_str(r#"
///     [run]
///     reporter = "json"
///
///     [report]
///     slowest_count = 3
/// "#).unwrap();
///
/// assert_eq!(config.run.reporter, ReporterKind::Json);
/// assert_eq!(config.report.slowest_count, 3);
/// assert_eq!(config.report.coverage_count, 10);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub progress: ProgressConfig,

    #[serde(default)]
    pub patterns: PatternsConfig,
}

/// Output style selected with `run.reporter` or `--reporter`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReporterKind {
    #[default]
    Progress,
    Json,
    Standard,
    Junit,
}

impl FromStr for ReporterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "progress" => Ok(ReporterKind::Progress),
            "json" => Ok(ReporterKind::Json),
            "standard" => Ok(ReporterKind::Standard),
            "junit" => Ok(ReporterKind::Junit),
            other => Err(format!(
                "unknown reporter '{}' (expected progress, json, standard or junit)",
                other
            )),
        }
    }
}

/// How `go test` is invoked.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `reporter` | `"progress"` |
/// | `compat` | `false` |
/// | `raw` | `false` |
/// | `go_test_args` | `[]` |
/// | `go_binary` | `"go"` |
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub reporter: ReporterKind,

    /// Don't pass `-fullpath` (Go older than 1.21).
    #[serde(default)]
    pub compat: bool,

    /// Don't add `-cover` and `-fullpath`; `-json` is always passed.
    #[serde(default)]
    pub raw: bool,

    /// Arguments appended to every `go test` invocation.
    ///
    /// Either a list or a single shell-quoted string.
    #[serde(default)]
    pub go_test_args: GoTestArgs,

    #[serde(default = "default_go_binary")]
    pub go_binary: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            reporter: ReporterKind::default(),
            compat: false,
            raw: false,
            go_test_args: GoTestArgs::default(),
            go_binary: default_go_binary(),
        }
    }
}

fn default_go_binary() -> String {
    "go".to_string()
}

/// `go_test_args` as written in the file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum GoTestArgs {
    List(Vec<String>),
    Line(String),
}

impl Default for GoTestArgs {
    fn default() -> Self {
        GoTestArgs::List(Vec::new())
    }
}

impl GoTestArgs {
    /// Splits the arguments the way a POSIX shell would.
    pub fn to_vec(&self) -> Result<Vec<String>, shell_words::ParseError> {
        match self {
            GoTestArgs::List(args) => Ok(args.clone()),
            GoTestArgs::Line(line) => shell_words::split(line),
        }
    }
}

/// Views shown once the run finishes.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `coverage_threshold` | `100.0` |
/// | `coverage_count` | `10` |
/// | `slowest_threshold_ms` | `1000` |
/// | `slowest_count` | `10` |
/// | `hide_coverage` | `false` |
/// | `hide_slowest` | `false` |
/// | `junit_file` | none |
/// | `post_run_command` | none |
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    /// Packages with coverage strictly below this are listed.
    #[serde(default = "default_coverage_threshold")]
    pub coverage_threshold: f64,

    #[serde(default = "default_count")]
    pub coverage_count: usize,

    /// Tests strictly slower than this many milliseconds are listed.
    #[serde(default = "default_slowest_threshold_ms")]
    pub slowest_threshold_ms: u64,

    #[serde(default = "default_count")]
    pub slowest_count: usize,

    #[serde(default)]
    pub hide_coverage: bool,

    #[serde(default)]
    pub hide_slowest: bool,

    /// Also write a JUnit XML report here.
    pub junit_file: Option<PathBuf>,

    /// Shell command run after the stream finishes.
    pub post_run_command: Option<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            coverage_threshold: default_coverage_threshold(),
            coverage_count: default_count(),
            slowest_threshold_ms: default_slowest_threshold_ms(),
            slowest_count: default_count(),
            hide_coverage: false,
            hide_slowest: false,
            junit_file: None,
            post_run_command: None,
        }
    }
}

impl ReportConfig {
    pub fn slowest_threshold(&self) -> Duration {
        Duration::from_millis(self.slowest_threshold_ms)
    }

    pub fn view_settings(&self) -> ViewSettings {
        ViewSettings {
            coverage_threshold: self.coverage_threshold,
            coverage_count: self.coverage_count,
            slowest_threshold: self.slowest_threshold(),
            slowest_count: self.slowest_count,
        }
    }
}

fn default_coverage_threshold() -> f64 {
    100.0
}

fn default_count() -> usize {
    10
}

fn default_slowest_threshold_ms() -> u64 {
    1000
}

/// Symbols the progress reporter prints per finished test.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProgressConfig {
    #[serde(default = "default_pass_symbol")]
    pub pass_symbol: String,

    #[serde(default = "default_fail_symbol")]
    pub fail_symbol: String,

    #[serde(default = "default_skip_symbol")]
    pub skip_symbol: String,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            pass_symbol: default_pass_symbol(),
            fail_symbol: default_fail_symbol(),
            skip_symbol: default_skip_symbol(),
        }
    }
}

fn default_pass_symbol() -> String {
    ".".to_string()
}

fn default_fail_symbol() -> String {
    "F".to_string()
}

fn default_skip_symbol() -> String {
    "S".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PatternsConfig {
    /// Extension of source files in `file:line` references.
    #[serde(default = "default_source_extension")]
    pub source_extension: String,
}

impl Default for PatternsConfig {
    fn default() -> Self {
        Self {
            source_extension: default_source_extension(),
        }
    }
}

fn default_source_extension() -> String {
    "go".to_string()
}
