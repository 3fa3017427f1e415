//! Line sources feeding the stream consumer.
//!
//! Lines come either from a live `go test -json` child process, with its
//! standard output and standard error merged into one stream, or from a
//! replay file captured earlier. Either way the consumer sees a
//! [`LineStream`] of raw lines without their terminators.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use futures::{Stream, StreamExt, stream};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio_stream::wrappers::SplitStream;
use tracing::debug;

/// Stream of raw lines.
pub type LineStream = Pin<Box<dyn Stream<Item = io::Result<String>> + Send>>;

/// Errors from opening a line source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("replay file doesn't exist: {0}")]
    ReplayNotFound(PathBuf),

    #[error("replay path is a directory: {0}")]
    ReplayIsDirectory(PathBuf),

    #[error("failed to start {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{0} not captured")]
    PipeMissing(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Splits a reader into lines.
///
/// Invalid UTF-8 is replaced rather than rejected and a trailing `\r` is
/// dropped, so Windows line endings replay cleanly.
pub fn lines<R>(reader: R) -> LineStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let split = BufReader::new(reader).split(b'\n');

    Box::pin(SplitStream::new(split).map(|chunk| chunk.map(|bytes| decode_bytes(&bytes))))
}

fn decode_bytes(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);

    text.strip_suffix('\r').unwrap_or(&text).to_string()
}

/// Opens a previously captured `go test -json` output file.
pub async fn replay(path: &Path) -> Result<LineStream, SourceError> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            SourceError::ReplayNotFound(path.to_path_buf())
        } else {
            SourceError::Io(e)
        }
    })?;

    if metadata.is_dir() {
        return Err(SourceError::ReplayIsDirectory(path.to_path_buf()));
    }

    let file = tokio::fs::File::open(path).await?;
    debug!("Replaying {}", path.display());

    Ok(lines(file))
}

/// A command to spawn, built up the same way as a shell command line.
///
/// ```
/// use bolt::source::TestCommand;
///
/// let cmd = TestCommand::new("go").arg("test").args(["-run", "Test A"]);
/// assert_eq!(cmd.to_shell_string(), "go test -run 'Test A'");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl TestCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Shell-quoted rendering, for logs.
    pub fn to_shell_string(&self) -> String {
        let parts = std::iter::once(&self.program).chain(self.args.iter());

        shell_words::join(parts)
    }

    /// Spawns the command with stdout and stderr merged into one line stream.
    ///
    /// The child is killed if the returned handle is dropped before it exits.
    pub fn spawn(&self) -> Result<(Child, LineStream), SourceError> {
        let mut process = tokio::process::Command::new(&self.program);
        process.args(&self.args);

        if let Some(dir) = &self.working_dir {
            process.current_dir(dir);
        }

        process.stdin(Stdio::null());
        process.stdout(Stdio::piped());
        process.stderr(Stdio::piped());
        process.kill_on_drop(true);

        debug!("Spawning: {}", self.to_shell_string());

        let mut child = process.spawn().map_err(|source| SourceError::SpawnFailed {
            program: self.program.clone(),
            source,
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or(SourceError::PipeMissing("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(SourceError::PipeMissing("stderr"))?;

        let combined = stream::select(lines(stdout), lines(stderr));

        Ok((child, Box::pin(combined)))
    }
}

/// Options for building a `go test` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoTestOptions {
    /// Path or name of the Go toolchain binary. Defaults to `go`.
    pub go_binary: Option<String>,

    /// Package patterns. Defaults to `./...`.
    pub packages: Vec<String>,

    /// Extra arguments passed through to `go test`.
    pub extra_args: Vec<String>,

    /// Omit `-fullpath`, for toolchains older than Go 1.21.
    pub compat: bool,

    /// Pass only `-json` and the caller's arguments.
    pub raw: bool,

    pub working_dir: Option<PathBuf>,
}

/// Builds the `go test -json -cover` command for `options`.
pub fn go_test_command(options: &GoTestOptions) -> TestCommand {
    let mut cmd = TestCommand::new(options.go_binary.as_deref().unwrap_or("go"))
        .args(["test", "-json"]);

    if !options.raw {
        cmd = cmd.arg("-cover");

        if !options.compat {
            cmd = cmd.arg("-fullpath");
        }
    }

    cmd = cmd.args(options.extra_args.iter().cloned());

    if options.packages.is_empty() {
        cmd = cmd.arg("./...");
    } else {
        cmd = cmd.args(options.packages.iter().cloned());
    }

    if let Some(dir) = &options.working_dir {
        cmd = cmd.working_dir(dir);
    }

    cmd
}
