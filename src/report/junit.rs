//! JUnit XML report generation.
//!
//! Writes one `<testsuite>` per Go package once the stream finishes, which
//! CI systems (Jenkins, GitLab CI, GitHub Actions) pick up directly.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <testsuites tests="3" failures="1" skipped="1" time="1.234">
//!   <testsuite name="example.com/pkg" tests="3" failures="1" errors="0" skipped="1" time="0.350">
//!     <testcase classname="example.com/pkg" name="TestSum" time="0.100"/>
//!     <testcase classname="example.com/pkg" name="TestDiff" time="0.250">
//!       <failure message="diff_test.go:12" type="failure">Error:  Not equal:</failure>
//!     </testcase>
//!     <testcase classname="example.com/pkg" name="TestSlow" time="0.000">
//!       <skipped message="Skipped"/>
//!     </testcase>
//!   </testsuite>
//! </testsuites>
//! ```
//!
//! Tests that never finished are reported as `<error>` elements.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use super::{Reporter, StreamReport};
use crate::aggregation::Aggregation;
use crate::model::{TestRecord, TestStatus};
use crate::postprocess::DEFAULT_SKIP_MESSAGE;

/// Reporter that writes a JUnit XML file, or stdout without a path.
///
/// Parent directories are created automatically if they don't exist.
pub struct JUnitReporter {
    output_path: Option<PathBuf>,
}

impl JUnitReporter {
    pub fn new(output_path: Option<PathBuf>) -> Self {
        Self { output_path }
    }

    fn write(&self, xml: &str) -> anyhow::Result<()> {
        let Some(path) = &self.output_path else {
            println!("{}", xml);
            return Ok(());
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }

        std::fs::write(path, xml)
            .with_context(|| format!("Failed to write JUnit XML: {}", path.display()))?;
        tracing::info!("JUnit XML written to: {}", path.display());

        Ok(())
    }
}

#[async_trait]
impl Reporter for JUnitReporter {
    async fn on_test_finished(&self, _test: &TestRecord) {}

    async fn on_stream_finished(&self, report: &StreamReport<'_>) {
        let written = generate_xml(report.aggregation).and_then(|xml| self.write(&xml));

        if let Err(e) = written {
            tracing::error!("{:#}", e);
        }
    }
}

/// Renders the finished aggregation as JUnit XML.
pub fn generate_xml(aggregation: &Aggregation) -> anyhow::Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut packages: BTreeMap<&str, Vec<&TestRecord>> = BTreeMap::new();
    for test in aggregation.tests() {
        packages.entry(test.package.as_str()).or_default().push(test);
    }

    let mut testsuites = BytesStart::new("testsuites");
    testsuites.push_attribute(("tests", aggregation.tests_count().to_string().as_str()));
    testsuites.push_attribute((
        "failures",
        aggregation.count_by(TestStatus::Fail).to_string().as_str(),
    ));
    testsuites.push_attribute((
        "skipped",
        aggregation.count_by(TestStatus::Skip).to_string().as_str(),
    ));
    testsuites.push_attribute((
        "time",
        format!("{:.3}", aggregation.elapsed().as_secs_f64()).as_str(),
    ));
    writer.write_event(Event::Start(testsuites))?;

    for (package, tests) in packages {
        write_testsuite(&mut writer, package, &tests)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    let xml = String::from_utf8(writer.into_inner())?;
    Ok(xml)
}

fn write_testsuite<W: std::io::Write>(
    writer: &mut Writer<W>,
    package: &str,
    tests: &[&TestRecord],
) -> anyhow::Result<()> {
    let count = |status: TestStatus| tests.iter().filter(|t| t.status == status).count();
    let time: f64 = tests.iter().map(|t| t.elapsed.as_secs_f64()).sum();

    let mut testsuite = BytesStart::new("testsuite");
    testsuite.push_attribute(("name", package));
    testsuite.push_attribute(("tests", tests.len().to_string().as_str()));
    testsuite.push_attribute(("failures", count(TestStatus::Fail).to_string().as_str()));
    testsuite.push_attribute(("errors", count(TestStatus::Running).to_string().as_str()));
    testsuite.push_attribute(("skipped", count(TestStatus::Skip).to_string().as_str()));
    testsuite.push_attribute(("time", format!("{:.3}", time).as_str()));
    writer.write_event(Event::Start(testsuite))?;

    for test in tests {
        write_testcase(writer, test)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;

    Ok(())
}

fn write_testcase<W: std::io::Write>(
    writer: &mut Writer<W>,
    test: &TestRecord,
) -> anyhow::Result<()> {
    let mut testcase = BytesStart::new("testcase");
    testcase.push_attribute(("classname", test.package.as_str()));
    testcase.push_attribute(("name", test.name.as_str()));
    testcase.push_attribute((
        "time",
        format!("{:.3}", test.elapsed.as_secs_f64()).as_str(),
    ));

    match test.status {
        TestStatus::Pass => {
            writer.write_event(Event::Empty(testcase))?;
        }
        TestStatus::Fail | TestStatus::Running => {
            writer.write_event(Event::Start(testcase))?;

            let (tag, message) = if test.status == TestStatus::Fail {
                ("failure", test.error_trace.as_deref().unwrap_or("failed"))
            } else {
                ("error", "test did not finish")
            };

            let mut element = BytesStart::new(tag);
            element.push_attribute(("message", sanitize_xml(message).as_str()));
            element.push_attribute(("type", tag));
            writer.write_event(Event::Start(element))?;

            let mut body = test.output.join("\n");
            if let Some(source) = &test.test_source {
                body.push('\n');
                body.push_str(source);
            }
            writer.write_event(Event::Text(BytesText::new(&sanitize_xml(&body))))?;

            writer.write_event(Event::End(BytesEnd::new(tag)))?;
            writer.write_event(Event::End(BytesEnd::new("testcase")))?;
        }
        TestStatus::Skip => {
            writer.write_event(Event::Start(testcase))?;

            let message = test.skip_message.as_deref().unwrap_or(DEFAULT_SKIP_MESSAGE);
            let mut skipped = BytesStart::new("skipped");
            skipped.push_attribute(("message", sanitize_xml(message).as_str()));
            writer.write_event(Event::Empty(skipped))?;

            writer.write_event(Event::End(BytesEnd::new("testcase")))?;
        }
    }

    Ok(())
}

/// Removes characters that are not allowed in XML 1.0 documents.
///
/// Escaping is left to the writer.
fn sanitize_xml(s: &str) -> String {
    s.chars()
        .filter(|c| {
            matches!(
                c,
                '\t' | '\n' | '\r' | ' '..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..
            )
        })
        .collect()
}
