//! bolt CLI - friendlier `go test` output.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use bolt::aggregation::Aggregation;
use bolt::config::{self, Config, ReporterKind};
use bolt::consumer::{StreamConsumer, StreamError};
use bolt::patterns::SourcePatterns;
use bolt::postprocess::{OutputProcessor, PathNormalizer};
use bolt::report::{
    JUnitReporter, JsonReporter, MultiReporter, Palette, PostRunReporter, ProgressReporter,
    StandardReporter,
};
use bolt::source::{self, GoTestOptions, TestCommand};

#[derive(Parser)]
#[command(name = "bolt")]
#[command(about = "Run go test with progress, failure and coverage summaries", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path [default: ./bolt.toml when present]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run tests (or replay a captured `go test -json` output)
    Run(RunArgs),

    /// Print the version
    Version,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Read `go test -json` output from FILE instead of running go test
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Output style: progress, json, standard or junit
    #[arg(long)]
    reporter: Option<ReporterKind>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Only pass -json and your own arguments to go test
    #[arg(long)]
    raw: bool,

    /// Don't pass -fullpath (Go older than 1.21)
    #[arg(long)]
    compat: bool,

    /// Don't list packages below the coverage threshold
    #[arg(long)]
    hide_coverage: bool,

    /// Don't list the slowest tests
    #[arg(long)]
    hide_slowest: bool,

    /// Maximum number of coverage entries
    #[arg(long, value_name = "N")]
    coverage_count: Option<usize>,

    /// List packages with coverage below this percentage
    #[arg(long, value_name = "PERCENT")]
    coverage_threshold: Option<f64>,

    /// List tests slower than this (e.g. 500ms, 2s)
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    slowest_threshold: Option<Duration>,

    /// Maximum number of slow tests
    #[arg(long, value_name = "N")]
    slowest_count: Option<usize>,

    /// Also write a JUnit XML report to FILE
    #[arg(long, value_name = "FILE")]
    junit: Option<PathBuf>,

    /// Shell command to run after the tests, with BOLT_* summary variables
    #[arg(long, value_name = "CMD")]
    post_run_command: Option<String>,

    /// Packages to test [default: ./...]
    packages: Vec<String>,

    /// Extra arguments for go test, after `--`
    #[arg(last = true)]
    go_test_args: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            1
        }
    };

    std::process::exit(code);
}

async fn execute(cli: Cli) -> Result<i32> {
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Version => {
            println!("bolt {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
        Commands::Run(args) => run_tests(cli.config.as_deref(), args).await,
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

async fn run_tests(config_path: Option<&Path>, args: RunArgs) -> Result<i32> {
    let cwd = std::env::current_dir().context("Failed to determine working directory")?;

    let mut config = config::resolve_config(config_path, &cwd)?;
    config::apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    apply_overrides(&mut config, &args);

    let palette = Palette::new(colors_enabled(args.no_color))
        .with_env_overrides(|name| std::env::var(name).ok());
    let reporter = build_reporter(&config, palette);

    let patterns = SourcePatterns::new(&config.patterns.source_extension).with_context(|| {
        format!(
            "Invalid patterns.source_extension: {}",
            config.patterns.source_extension
        )
    })?;
    let normalizer = PathNormalizer::new(Some(cwd.display().to_string()), home_dir());

    let consumer = StreamConsumer::new(&reporter, config.report.view_settings())
        .with_normalizer(normalizer)
        .with_processor(OutputProcessor::new(patterns));

    if let Some(path) = &args.replay {
        let lines = source::replay(path)
            .await
            .with_context(|| format!("Failed to replay {}", path.display()))?;

        return Ok(exit_code(&consumer.run(lines).await, None));
    }

    let command = build_command(&config, &args, &cwd)?;
    info!("Running: {}", command.to_shell_string());

    let (mut child, lines) = command
        .spawn()
        .with_context(|| format!("Failed to run {}", command.to_shell_string()))?;

    let outcome = consumer.run(lines).await;

    let status = match &outcome {
        Ok(_) => Some(child.wait().await.context("Failed to wait for go test")?),
        Err(_) => {
            if let Err(e) = child.kill().await {
                debug!("Failed to stop go test: {}", e);
            }
            None
        }
    };

    Ok(exit_code(&outcome, status.map(|s| s.success())))
}

/// 1 when the stream aborted, a test failed, or `go test` itself failed.
fn exit_code(outcome: &Result<Aggregation, StreamError>, go_succeeded: Option<bool>) -> i32 {
    match outcome {
        Ok(aggregation) => {
            let code = aggregation.exit_code();

            if code == 0 && go_succeeded == Some(false) {
                warn!("go test failed without a failing test");
                1
            } else {
                code
            }
        }
        Err(e) => {
            eprintln!("ERROR: {}", e);
            1
        }
    }
}

fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(reporter) = args.reporter {
        config.run.reporter = reporter;
    }
    config.run.raw |= args.raw;
    config.run.compat |= args.compat;

    let report = &mut config.report;
    report.hide_coverage |= args.hide_coverage;
    report.hide_slowest |= args.hide_slowest;

    if let Some(count) = args.coverage_count {
        report.coverage_count = count;
    }
    if let Some(threshold) = args.coverage_threshold {
        report.coverage_threshold = threshold;
    }
    if let Some(threshold) = args.slowest_threshold {
        report.slowest_threshold_ms = u64::try_from(threshold.as_millis()).unwrap_or(u64::MAX);
    }
    if let Some(count) = args.slowest_count {
        report.slowest_count = count;
    }
    if let Some(path) = &args.junit {
        report.junit_file = Some(path.clone());
    }
    if let Some(command) = &args.post_run_command {
        report.post_run_command = Some(command.clone());
    }
}

fn colors_enabled(no_color: bool) -> bool {
    let no_color_env = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());

    !no_color && !no_color_env && console::colors_enabled()
}

fn home_dir() -> Option<String> {
    let home = shellexpand::tilde("~");

    (home != "~").then(|| home.into_owned())
}

fn build_reporter(config: &Config, palette: Palette) -> MultiReporter {
    let report = &config.report;

    let mut reporter = match config.run.reporter {
        ReporterKind::Progress => MultiReporter::new().with_reporter(
            ProgressReporter::stdout(palette, config.progress.clone())
                .hide_coverage(report.hide_coverage)
                .hide_slowest(report.hide_slowest),
        ),
        ReporterKind::Json => MultiReporter::new().with_reporter(JsonReporter::stdout()),
        ReporterKind::Standard => {
            MultiReporter::new().with_reporter(StandardReporter::stdout(palette))
        }
        ReporterKind::Junit => {
            MultiReporter::new().with_reporter(JUnitReporter::new(report.junit_file.clone()))
        }
    };

    if config.run.reporter != ReporterKind::Junit
        && let Some(path) = &report.junit_file
    {
        reporter = reporter.with_reporter(JUnitReporter::new(Some(path.clone())));
    }

    if let Some(command) = &report.post_run_command {
        reporter = reporter.with_reporter(PostRunReporter::new(command.clone()));
    }

    reporter
}

fn build_command(config: &Config, args: &RunArgs, cwd: &Path) -> Result<TestCommand> {
    let mut extra_args = config
        .run
        .go_test_args
        .to_vec()
        .context("Failed to parse run.go_test_args")?;
    extra_args.extend(args.go_test_args.iter().cloned());

    Ok(source::go_test_command(&GoTestOptions {
        go_binary: Some(config.run.go_binary.clone()),
        packages: args.packages.clone(),
        extra_args,
        compat: config.run.compat,
        raw: config.run.raw,
        working_dir: Some(cwd.to_path_buf()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_options() {
        let cli = Cli::try_parse_from([
            "bolt",
            "--verbose",
            "run",
            "--reporter",
            "json",
            "--slowest-threshold",
            "250ms",
            "--coverage-threshold",
            "80",
            "./pkg/...",
            "--",
            "-run",
            "TestSum",
        ])
        .unwrap();

        assert!(cli.verbose);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.reporter, Some(ReporterKind::Json));
        assert_eq!(args.slowest_threshold, Some(Duration::from_millis(250)));
        assert_eq!(args.packages, vec!["./pkg/..."]);
        assert_eq!(args.go_test_args, vec!["-run", "TestSum"]);
    }

    #[test]
    fn test_overrides_win_over_config() {
        let mut config = Config::default();
        let args = RunArgs {
            compat: true,
            slowest_threshold: Some(Duration::from_secs(2)),
            coverage_count: Some(3),
            junit: Some(PathBuf::from("out.xml")),
            ..Default::default()
        };

        apply_overrides(&mut config, &args);

        assert!(config.run.compat);
        assert_eq!(config.report.slowest_threshold_ms, 2000);
        assert_eq!(config.report.coverage_count, 3);
        assert_eq!(config.report.junit_file, Some(PathBuf::from("out.xml")));
    }

    #[test]
    fn test_build_command() {
        let mut config = Config::default();
        config.run.go_test_args = config::GoTestArgs::Line("-count 1".to_string());
        let args = RunArgs {
            go_test_args: vec!["-v".to_string()],
            ..Default::default()
        };

        let command = build_command(&config, &args, Path::new("/src")).unwrap();

        assert_eq!(
            command.args,
            vec!["test", "-json", "-cover", "-fullpath", "-count", "1", "-v", "./..."]
        );
    }

    #[test]
    fn test_build_reporter() {
        let mut config = Config::default();
        assert_eq!(build_reporter(&config, Palette::plain()).len(), 1);

        config.report.junit_file = Some(PathBuf::from("junit.xml"));
        config.report.post_run_command = Some("true".to_string());
        assert_eq!(build_reporter(&config, Palette::plain()).len(), 3);

        config.run.reporter = ReporterKind::Junit;
        assert_eq!(build_reporter(&config, Palette::plain()).len(), 2);
    }

    #[test]
    fn test_exit_code() {
        let aggregation = Aggregation::default();

        assert_eq!(exit_code(&Ok(aggregation.clone()), Some(true)), 0);
        assert_eq!(exit_code(&Ok(aggregation), Some(false)), 1);
        assert_eq!(
            exit_code(&Err(StreamError::BuildFailed("x".to_string())), None),
            1
        );
    }
}
