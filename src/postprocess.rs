//! Cleanup of a finished test's captured output.
//!
//! When a test reaches a terminal status its output lines go through five
//! passes, in order:
//!
//! 1. **Error trace**: the first `Error Trace: <file:line>` line.
//! 2. **Test source**: a bare `<file:line>` right after the trace line, which
//!    is the call site in the test when the assertion ran inside a helper.
//! 3. **Skip reason** (skipped tests only): the last `<file:line>: <message>`
//!    line is promoted to the test source and skip message, then removed.
//! 4. **Noise filter**: drops the trace block, bare copies of the recovered
//!    locations, lines naming the test itself and `coverage:` lines.
//! 5. **De-indent**: aligns the message under a fixed-width `Error:` label.
//!
//! Only already-collected lines are touched; nothing here keeps streaming
//! state.

use crate::model::{TestRecord, TestStatus};
use crate::patterns::{SourcePatterns, parse_error_anchor};

/// Label the de-indented error line starts with.
pub const ERROR_LABEL: &str = "Error:  ";

/// Skip message used when `t.Skip` was called without one.
pub const DEFAULT_SKIP_MESSAGE: &str = "Skipped";

/// Rewrites absolute paths in output lines.
///
/// Paths under the working directory become relative, paths under the
/// home directory start with `~/`.
#[derive(Debug, Clone, Default)]
pub struct PathNormalizer {
    working_dir: Option<String>,
    home_dir: Option<String>,
}

impl PathNormalizer {
    pub fn new(working_dir: Option<String>, home_dir: Option<String>) -> Self {
        let prefix = |dir: Option<String>| {
            dir.map(|d| d.trim_end_matches('/').to_string())
                .filter(|d| !d.is_empty())
                .map(|d| d + "/")
        };

        Self {
            working_dir: prefix(working_dir),
            home_dir: prefix(home_dir),
        }
    }

    /// Strips trailing whitespace and shortens known directory prefixes.
    pub fn normalize(&self, line: &str) -> String {
        let mut output = line.trim_end_matches(['\r', '\n', '\t', ' ']).to_string();

        if let Some(dir) = &self.working_dir {
            output = output.replace(dir.as_str(), "");
        }

        if let Some(dir) = &self.home_dir {
            output = output.replace(dir.as_str(), "~/");
        }

        output
    }
}

/// The `Error Trace:` line and the bare locations that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TraceBlock {
    start: usize,
    end: usize,
    error_trace: String,
    test_source: Option<String>,
}

/// Applies the post-processing passes to finished tests.
#[derive(Debug, Clone, Default)]
pub struct OutputProcessor {
    patterns: SourcePatterns,
}

impl OutputProcessor {
    pub fn new(patterns: SourcePatterns) -> Self {
        Self { patterns }
    }

    /// Runs every pass over the test's output, in place.
    pub fn process(&self, test: &mut TestRecord) {
        let block = self.find_trace_block(&test.output);

        if let Some(block) = &block {
            test.error_trace = Some(block.error_trace.clone());
            test.test_source = block.test_source.clone();
        }

        let mut output = std::mem::take(&mut test.output);

        if let Some(block) = block {
            output.drain(block.start..block.end);
        }

        if test.status == TestStatus::Skip {
            self.extract_skip(test, &mut output);
        }

        let output = filter_noise(test, output);
        test.output = deindent(output);
    }

    fn find_trace_block(&self, lines: &[String]) -> Option<TraceBlock> {
        let (start, error_trace) = lines
            .iter()
            .enumerate()
            .find_map(|(i, line)| self.patterns.error_trace(line).map(|trace| (i, trace)))?;

        let test_source = lines
            .get(start + 1)
            .and_then(|line| self.patterns.location(line))
            .map(str::to_string);

        let mut end = start + 1;
        while end < lines.len() && self.patterns.location(&lines[end]).is_some() {
            end += 1;
        }

        Some(TraceBlock {
            start,
            end,
            error_trace: error_trace.to_string(),
            test_source,
        })
    }

    /// Promotes the last `file:line: message` line to structured fields.
    fn extract_skip(&self, test: &mut TestRecord, output: &mut Vec<String>) {
        let found = output.iter().enumerate().rev().find_map(|(i, line)| {
            self.patterns.skip_location(line).map(|location| {
                (
                    i,
                    location.source.to_string(),
                    location.message.map(str::to_string),
                )
            })
        });

        match found {
            Some((index, source, message)) => {
                test.test_source = Some(source);
                test.skip_message =
                    Some(message.unwrap_or_else(|| DEFAULT_SKIP_MESSAGE.to_string()));
                output.remove(index);
            }
            None => test.skip_message = Some(DEFAULT_SKIP_MESSAGE.to_string()),
        }
    }
}

fn filter_noise(test: &TestRecord, lines: Vec<String>) -> Vec<String> {
    let mut locations: Vec<String> = Vec::new();

    for location in [&test.error_trace, &test.test_source].into_iter().flatten() {
        locations.push(location.clone());
        locations.push(format!("{}:", location));

        if let Some(base) = location.rsplit('/').next() {
            locations.push(format!("{}:", base));
        }
    }

    lines
        .into_iter()
        .filter(|line| {
            let trimmed = line.trim();

            let ignore = locations.iter().any(|l| l == trimmed)
                || line.contains("Error Trace:")
                || (!test.name.is_empty() && line.contains(&test.name))
                || trimmed.starts_with("coverage:");

            !ignore
        })
        .collect()
}

/// Aligns output under the `Error:` label.
///
/// The anchor's indent, label and spacing width is stripped from every
/// other line (never more than its leading whitespace) and replaced by the
/// width of [`ERROR_LABEL`]. Output without an anchor passes through.
pub fn deindent(lines: Vec<String>) -> Vec<String> {
    let Some((anchor_index, width, message)) = lines.iter().enumerate().find_map(|(i, line)| {
        parse_error_anchor(line).map(|anchor| (i, anchor.width(), anchor.message.to_string()))
    }) else {
        return lines;
    };

    let spacing = " ".repeat(ERROR_LABEL.len());

    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            if i == anchor_index {
                return format!("{}{}", ERROR_LABEL, message);
            }

            let stripped = strip_indent(&line, width);

            if stripped.trim().is_empty() {
                String::new()
            } else {
                format!("{}{}", spacing, stripped)
            }
        })
        .collect()
}

fn strip_indent(line: &str, width: usize) -> &str {
    let mut cut = 0;

    for (i, c) in line.char_indices() {
        if i >= width || !c.is_whitespace() {
            break;
        }
        cut = i + c.len_utf8();
    }

    &line[cut..]
}
