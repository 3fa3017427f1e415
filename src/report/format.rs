//! Shared formatting helpers for terminal reporters.

use std::time::Duration;

use console::{Color, Style};

use crate::model::TestStatus;

/// Terminal colors used by reporters.
///
/// Styling is forced on or off explicitly so output does not depend on
/// whether stdout happens to be a terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    enabled: bool,
    text: Option<Color>,
    fail: Color,
    pass: Color,
    skip: Color,
    detail: Color,
}

impl Palette {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            text: None,
            fail: Color::Red,
            pass: Color::Green,
            skip: Color::Yellow,
            detail: Color::Blue,
        }
    }

    /// A palette that never emits escape codes.
    pub fn plain() -> Self {
        Self::new(false)
    }

    /// Applies `BOLT_TEXT_COLOR`, `BOLT_FAIL_COLOR`, `BOLT_PASS_COLOR`,
    /// `BOLT_SKIP_COLOR` and `BOLT_DETAIL_COLOR` overrides.
    ///
    /// Values are ANSI SGR foreground codes such as `31`. Unparseable
    /// values are ignored.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let color = |name: &str| lookup(name).as_deref().and_then(parse_sgr_color);

        if let Some(c) = color("BOLT_TEXT_COLOR") {
            self.text = Some(c);
        }
        if let Some(c) = color("BOLT_FAIL_COLOR") {
            self.fail = c;
        }
        if let Some(c) = color("BOLT_PASS_COLOR") {
            self.pass = c;
        }
        if let Some(c) = color("BOLT_SKIP_COLOR") {
            self.skip = c;
        }
        if let Some(c) = color("BOLT_DETAIL_COLOR") {
            self.detail = c;
        }

        self
    }

    fn paint(&self, color: Option<Color>, text: &str) -> String {
        let mut style = Style::new().force_styling(self.enabled);
        if let Some(color) = color {
            style = style.fg(color);
        }

        style.apply_to(text).to_string()
    }

    pub fn text(&self, text: &str) -> String {
        self.paint(self.text, text)
    }

    pub fn fail(&self, text: &str) -> String {
        self.paint(Some(self.fail), text)
    }

    pub fn pass(&self, text: &str) -> String {
        self.paint(Some(self.pass), text)
    }

    pub fn skip(&self, text: &str) -> String {
        self.paint(Some(self.skip), text)
    }

    pub fn detail(&self, text: &str) -> String {
        self.paint(Some(self.detail), text)
    }

    /// Colors `text` by test status. Running tests use the detail color.
    pub fn status(&self, status: TestStatus, text: &str) -> String {
        match status {
            TestStatus::Pass => self.pass(text),
            TestStatus::Fail => self.fail(text),
            TestStatus::Skip => self.skip(text),
            TestStatus::Running => self.detail(text),
        }
    }

    /// Colors a coverage percentage: red below 50, yellow below 70.
    pub fn coverage(&self, coverage: f64, text: &str) -> String {
        if coverage < 50.0 {
            self.fail(text)
        } else if coverage < 70.0 {
            self.skip(text)
        } else {
            self.pass(text)
        }
    }
}

fn parse_sgr_color(value: &str) -> Option<Color> {
    let code: u8 = value.trim().parse().ok()?;

    match code {
        30..=37 => Some(Color::Color256(code - 30)),
        90..=97 => Some(Color::Color256(code - 90 + 8)),
        _ => None,
    }
}

/// Formats a duration with `places` decimals in the largest fitting unit.
///
/// ```
/// use bolt::report::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_millis(1500), 2), "1.50s");
/// assert_eq!(format_duration(Duration::from_secs(125), 1), "2m5.0s");
/// ```
pub fn format_duration(duration: Duration, places: usize) -> String {
    let nanos = duration.as_nanos();

    if nanos == 0 {
        "0s".to_string()
    } else if nanos < 1_000 {
        format!("{}ns", nanos)
    } else if nanos < 1_000_000 {
        format!("{:.*}µs", places, nanos as f64 / 1e3)
    } else if nanos < 1_000_000_000 {
        format!("{:.*}ms", places, nanos as f64 / 1e6)
    } else if duration.as_secs() < 60 {
        format!("{:.*}s", places, duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        let rest = duration.as_secs_f64() - (secs - secs % 60) as f64;
        let minutes = secs / 60;

        if minutes < 60 {
            format!("{}m{:.*}s", minutes, places, rest)
        } else {
            format!("{}h{}m{:.*}s", minutes / 60, minutes % 60, places, rest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO, 2), "0s");
        assert_eq!(format_duration(Duration::from_nanos(152), 2), "152ns");
        assert_eq!(format_duration(Duration::from_nanos(1_500), 1), "1.5µs");
        assert_eq!(format_duration(Duration::from_micros(2_250), 2), "2.25ms");
        assert_eq!(format_duration(Duration::from_millis(60_000), 0), "1m0s");
        assert_eq!(
            format_duration(Duration::from_secs(3_725), 0),
            "1h2m5s"
        );
    }

    #[test]
    fn test_plain_palette() {
        let palette = Palette::plain();

        assert_eq!(palette.fail("boom"), "boom");
        assert_eq!(palette.status(TestStatus::Pass, "ok"), "ok");
    }

    #[test]
    fn test_enabled_palette_emits_escapes() {
        let palette = Palette::new(true);

        let painted = palette.fail("boom");
        assert!(painted.contains("\u{1b}["));
        assert!(painted.contains("boom"));
        assert_eq!(console::strip_ansi_codes(&painted), "boom");
    }

    #[test]
    fn test_env_overrides() {
        let palette = Palette::new(true).with_env_overrides(|name| match name {
            "BOLT_FAIL_COLOR" => Some("35".to_string()),
            "BOLT_PASS_COLOR" => Some("not a color".to_string()),
            "BOLT_DETAIL_COLOR" => Some("94".to_string()),
            _ => None,
        });

        assert_eq!(palette.fail, Color::Color256(5));
        assert_eq!(palette.pass, Color::Green);
        assert_eq!(palette.detail, Color::Color256(12));
        assert_eq!(palette.text, None);
    }

    #[test]
    fn test_coverage_colors() {
        let palette = Palette::new(true);

        assert_eq!(palette.coverage(10.0, "x"), palette.fail("x"));
        assert_eq!(palette.coverage(60.0, "x"), palette.skip("x"));
        assert_eq!(palette.coverage(90.0, "x"), palette.pass("x"));
    }
}
