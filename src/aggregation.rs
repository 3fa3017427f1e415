//! In-memory model of a test run.
//!
//! [`Aggregation`] owns every test, benchmark and coverage record seen so
//! far, keyed by identity. Views such as [`Aggregation::tests`] or
//! [`Aggregation::slowest_tests`] are recomputed from the maps on every
//! call and never mutate the store.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::model::{BenchmarkRecord, CoverageRecord, TestRecord, TestStatus};

/// Limits applied by the derived coverage and slowest-test views.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSettings {
    /// Packages with coverage strictly below this are listed.
    pub coverage_threshold: f64,

    /// Maximum number of coverage entries.
    pub coverage_count: usize,

    /// Tests strictly slower than this are listed.
    pub slowest_threshold: Duration,

    /// Maximum number of slow tests.
    pub slowest_count: usize,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            coverage_threshold: 100.0,
            coverage_count: 10,
            slowest_threshold: Duration::from_secs(1),
            slowest_count: 10,
        }
    }
}

/// Store of all records discovered during one run.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub tests: HashMap<String, TestRecord>,
    pub benchmarks: HashMap<String, BenchmarkRecord>,
    pub coverage: HashMap<String, CoverageRecord>,
    pub settings: ViewSettings,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Aggregation {
    /// Creates an empty store with the given view settings.
    pub fn new(settings: ViewSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    /// Wall-clock duration between stream start and end.
    pub fn elapsed(&self) -> Duration {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }

    pub fn tests_count(&self) -> usize {
        self.tests.len()
    }

    pub fn benchmarks_count(&self) -> usize {
        self.benchmarks.len()
    }

    /// Tests sorted by package, then name.
    pub fn tests(&self) -> Vec<&TestRecord> {
        let mut tests: Vec<&TestRecord> = self.tests.values().collect();

        tests.sort_by(|a, b| a.package.cmp(&b.package).then_with(|| a.name.cmp(&b.name)));

        tests
    }

    /// Tests sorted by start time (whole seconds), then name.
    ///
    /// Tests without a start time sort first.
    pub fn tests_by_start(&self) -> Vec<&TestRecord> {
        let mut tests: Vec<&TestRecord> = self.tests.values().collect();

        tests.sort_by(|a, b| {
            let a_start = a.started_at.map(|t| t.timestamp());
            let b_start = b.started_at.map(|t| t.timestamp());

            a_start
                .cmp(&b_start)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.package.cmp(&b.package))
        });

        tests
    }

    /// Benchmarks sorted by key.
    pub fn benchmarks(&self) -> Vec<&BenchmarkRecord> {
        let mut benchmarks: Vec<&BenchmarkRecord> = self.benchmarks.values().collect();

        benchmarks.sort_by(|a, b| a.key.cmp(&b.key));

        benchmarks
    }

    /// Every coverage record, sorted by package.
    pub fn all_coverage(&self) -> Vec<&CoverageRecord> {
        let mut coverage: Vec<&CoverageRecord> = self.coverage.values().collect();

        coverage.sort_by(|a, b| a.package.cmp(&b.package));

        coverage
    }

    /// Packages below the coverage threshold, lowest coverage first.
    pub fn coverages(&self) -> Vec<&CoverageRecord> {
        let mut coverage: Vec<&CoverageRecord> = self
            .coverage
            .values()
            .filter(|c| c.coverage < self.settings.coverage_threshold)
            .collect();

        coverage.sort_by(|a, b| {
            a.coverage
                .partial_cmp(&b.coverage)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.package.cmp(&b.package))
        });
        coverage.truncate(self.settings.coverage_count);

        coverage
    }

    /// Tests slower than the threshold, slowest first.
    pub fn slowest_tests(&self) -> Vec<&TestRecord> {
        let mut tests: Vec<&TestRecord> = self
            .tests
            .values()
            .filter(|t| t.elapsed > self.settings.slowest_threshold)
            .collect();

        tests.sort_by(|a, b| {
            b.elapsed
                .cmp(&a.elapsed)
                .then_with(|| a.package.cmp(&b.package))
                .then_with(|| a.name.cmp(&b.name))
        });
        tests.truncate(self.settings.slowest_count);

        tests
    }

    pub fn count_by(&self, status: TestStatus) -> usize {
        self.tests.values().filter(|t| t.status == status).count()
    }

    /// `Fail` if anything failed, else `Skip` if anything was skipped, else `Pass`.
    pub fn overall_status(&self) -> TestStatus {
        if self.count_by(TestStatus::Fail) > 0 {
            TestStatus::Fail
        } else if self.count_by(TestStatus::Skip) > 0 {
            TestStatus::Skip
        } else {
            TestStatus::Pass
        }
    }

    /// Process exit code for the finished run.
    pub fn exit_code(&self) -> i32 {
        if self.count_by(TestStatus::Fail) > 0 {
            1
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single()
    }

    fn test_record(package: &str, name: &str, status: TestStatus, millis: u64) -> TestRecord {
        let mut record = TestRecord::new(package, name, at(0));
        record.status = status;
        record.elapsed = Duration::from_millis(millis);
        record
    }

    fn insert(agg: &mut Aggregation, record: TestRecord) {
        agg.tests.insert(record.key.clone(), record);
    }

    fn insert_coverage(agg: &mut Aggregation, package: &str, coverage: f64) {
        agg.coverage.insert(
            package.to_string(),
            CoverageRecord {
                package: package.to_string(),
                coverage,
            },
        );
    }

    #[test]
    fn test_tests_sorted_by_package_then_name() {
        let mut agg = Aggregation::default();
        insert(&mut agg, test_record("b", "TestA", TestStatus::Pass, 0));
        insert(&mut agg, test_record("a", "TestZ", TestStatus::Pass, 0));
        insert(&mut agg, test_record("a", "TestB", TestStatus::Pass, 0));

        let keys: Vec<&str> = agg.tests().iter().map(|t| t.key.as_str()).collect();

        assert_eq!(keys, vec!["a:TestB", "a:TestZ", "b:TestA"]);
    }

    #[test]
    fn test_tests_by_start() {
        let mut agg = Aggregation::default();

        let mut late = test_record("a", "TestA", TestStatus::Pass, 0);
        late.started_at = at(5);
        insert(&mut agg, late);
        insert(&mut agg, test_record("a", "TestC", TestStatus::Pass, 0));
        insert(&mut agg, test_record("b", "TestB", TestStatus::Pass, 0));

        let names: Vec<&str> = agg.tests_by_start().iter().map(|t| t.name.as_str()).collect();

        assert_eq!(names, vec!["TestB", "TestC", "TestA"]);
    }

    #[test]
    fn test_coverages_filtered_sorted_truncated() {
        let mut agg = Aggregation::new(ViewSettings {
            coverage_threshold: 90.0,
            coverage_count: 2,
            ..Default::default()
        });
        insert_coverage(&mut agg, "full", 100.0);
        insert_coverage(&mut agg, "high", 89.9);
        insert_coverage(&mut agg, "low-b", 10.0);
        insert_coverage(&mut agg, "low-a", 10.0);

        let packages: Vec<&str> = agg.coverages().iter().map(|c| c.package.as_str()).collect();

        assert_eq!(packages, vec!["low-a", "low-b"]);
    }

    #[test]
    fn test_slowest_tests() {
        let mut agg = Aggregation::new(ViewSettings {
            slowest_threshold: Duration::from_millis(100),
            slowest_count: 2,
            ..Default::default()
        });
        insert(&mut agg, test_record("p", "TestFast", TestStatus::Pass, 100));
        insert(&mut agg, test_record("p", "TestSlow", TestStatus::Pass, 300));
        insert(&mut agg, test_record("p", "TestSlower", TestStatus::Fail, 900));
        insert(&mut agg, test_record("p", "TestMedium", TestStatus::Pass, 200));

        let names: Vec<&str> = agg.slowest_tests().iter().map(|t| t.name.as_str()).collect();

        assert_eq!(names, vec!["TestSlower", "TestSlow"]);
    }

    #[test]
    fn test_views_are_idempotent() {
        let mut agg = Aggregation::default();
        insert(&mut agg, test_record("p", "TestA", TestStatus::Pass, 2000));
        insert(&mut agg, test_record("p", "TestB", TestStatus::Fail, 3000));
        insert_coverage(&mut agg, "p", 50.0);

        let first: Vec<String> = agg.slowest_tests().iter().map(|t| t.key.clone()).collect();
        let second: Vec<String> = agg.slowest_tests().iter().map(|t| t.key.clone()).collect();
        assert_eq!(first, second);

        let first: Vec<String> = agg.tests_by_start().iter().map(|t| t.key.clone()).collect();
        let second: Vec<String> = agg.tests_by_start().iter().map(|t| t.key.clone()).collect();
        assert_eq!(first, second);

        assert_eq!(agg.coverages(), agg.coverages());
    }

    #[test]
    fn test_counts_and_status() {
        let mut agg = Aggregation::default();
        assert_eq!(agg.overall_status(), TestStatus::Pass);

        insert(&mut agg, test_record("p", "TestA", TestStatus::Pass, 0));
        insert(&mut agg, test_record("p", "TestB", TestStatus::Skip, 0));
        assert_eq!(agg.overall_status(), TestStatus::Skip);
        assert_eq!(agg.exit_code(), 0);

        insert(&mut agg, test_record("p", "TestC", TestStatus::Fail, 0));
        assert_eq!(agg.overall_status(), TestStatus::Fail);
        assert_eq!(agg.count_by(TestStatus::Pass), 1);
        assert_eq!(agg.tests_count(), 3);
        assert_eq!(agg.exit_code(), 1);
    }

    #[test]
    fn test_elapsed() {
        let mut agg = Aggregation::default();
        assert_eq!(agg.elapsed(), Duration::ZERO);

        agg.started_at = at(0);
        agg.ended_at = at(3);
        assert_eq!(agg.elapsed(), Duration::from_secs(3));
    }
}
