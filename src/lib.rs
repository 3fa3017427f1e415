//! bolt: a `go test` wrapper with friendlier output.
//!
//! bolt consumes the event stream printed by `go test -json`, aggregates it
//! into per-test, per-benchmark and per-package records, cleans up the
//! captured output of failed and skipped tests, and hands the results to
//! one or more reporters.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Source**: produces raw lines from a `go test` child process or a
//!   replay file ([`source`])
//! - **Decoder**: turns each line into an event or a diagnostic ([`event`])
//! - **Consumer**: applies events to the store in arrival order
//!   ([`consumer`], [`aggregation`], [`model`])
//! - **Post-processor**: recovers error traces and skip messages from test
//!   output ([`postprocess`], [`patterns`])
//! - **Report**: progress, JSON, standard, JUnit and post-run reporters
//!   ([`report`])
//!
//! # Example
//!
//! ```no_run
//! use bolt::aggregation::ViewSettings;
//! use bolt::consumer::StreamConsumer;
//! use bolt::report::NullReporter;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let lines = bolt::source::replay(std::path::Path::new("run.jsonl")).await?;
//!     let reporter = NullReporter;
//!
//!     let aggregation = StreamConsumer::new(&reporter, ViewSettings::default())
//!         .run(lines)
//!         .await?;
//!
//!     println!("{} tests", aggregation.tests_count());
//!     Ok(())
//! }
//! ```

pub mod aggregation;
pub mod config;
pub mod consumer;
pub mod event;
pub mod model;
pub mod patterns;
pub mod postprocess;
pub mod report;
pub mod source;

// Re-export commonly used types
pub use aggregation::{Aggregation, ViewSettings};
pub use config::{Config, load_config};
pub use consumer::{StreamConsumer, StreamError};
pub use model::{BenchmarkRecord, CoverageRecord, TestRecord, TestStatus};
pub use report::Reporter;
