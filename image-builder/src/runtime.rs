//! Container runtime detection and the process-invocation seam.
//!
//! Every interaction with the container runtime goes through a [`CommandRunner`],
//! so the deployment steps can be exercised without a real docker or podman.

use std::cell::RefCell;
use std::fmt;
use std::io::{self, Write};
use std::process::{Command, Stdio};
use tracing::debug;

/// Container runtime types supported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRuntime {
    /// Docker container runtime
    Docker,
    /// Podman container runtime
    Podman,
    /// No container runtime available
    None,
}

impl ContainerRuntime {
    /// Get the command name for this runtime
    pub fn command(&self) -> &'static str {
        match self {
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::Podman => "podman",
            ContainerRuntime::None => "",
        }
    }

    /// Check if this runtime is available
    pub fn is_available(&self) -> bool {
        matches!(self, ContainerRuntime::Docker | ContainerRuntime::Podman)
    }

    /// Start an invocation of this runtime's CLI
    pub fn invocation<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation::new(self.command()).args(args)
    }
}

impl fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerRuntime::None => write!(f, "none"),
            other => write!(f, "{}", other.command()),
        }
    }
}

fn probe(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

/// Detect available container runtime in order of preference.
///
/// Docker is tried first because the deployment relies on the
/// `host-gateway` alias, which docker has supported the longest.
pub fn detect_runtime() -> ContainerRuntime {
    if probe("docker") {
        return ContainerRuntime::Docker;
    }

    if probe("podman") {
        return ContainerRuntime::Podman;
    }

    ContainerRuntime::None
}

/// How the child's stdout/stderr are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Stream straight to the terminal
    #[default]
    Inherit,
    /// Collect, so expected noise never reaches the terminal
    Capture,
}

/// A single external command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub output: OutputMode,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            output: OutputMode::Inherit,
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

    pub fn captured(mut self) -> Self {
        self.output = OutputMode::Capture;
        self
    }

    /// Position of the first occurrence of `arg`, if any
    pub fn position(&self, arg: &str) -> Option<usize> {
        self.args.iter().position(|a| a == arg)
    }

    /// Render as a shell command line with the values of `-e KEY=VALUE`
    /// pairs masked. Safe to log.
    pub fn redacted(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.clone());

        let mut mask_next = false;
        for arg in &self.args {
            if mask_next {
                match arg.split_once('=') {
                    Some((key, value)) if !value.is_empty() => words.push(format!("{key}=***")),
                    _ => words.push(arg.clone()),
                }
                mask_next = false;
                continue;
            }
            mask_next = arg == "-e" || arg == "--env";
            words.push(arg.clone());
        }

        shell_words::join(words)
    }
}

/// Result of a finished child process
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandStatus {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    /// Captured stderr; empty when the output was inherited
    pub stderr: String,
}

impl CommandStatus {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Human-readable reason for a failure
    pub fn describe(&self) -> String {
        let stderr = self.stderr.trim();
        match (self.code, stderr.is_empty()) {
            (Some(code), true) => format!("exit status {code}"),
            (Some(code), false) => format!("exit status {code}: {stderr}"),
            (None, true) => "terminated by signal".to_string(),
            (None, false) => format!("terminated by signal: {stderr}"),
        }
    }
}

/// Executes invocations. Blocks until the child has exited.
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> io::Result<CommandStatus>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, invocation: &Invocation) -> io::Result<CommandStatus> {
        (**self).run(invocation)
    }
}

/// Runs invocations as real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner {
    stdout_to_stderr: bool,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send the stdout of inherited children to our stderr, keeping our
    /// own stdout free for machine-readable output.
    pub fn with_stdout_to_stderr(mut self, enabled: bool) -> Self {
        self.stdout_to_stderr = enabled;
        self
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> io::Result<CommandStatus> {
        debug!(command = %invocation.redacted(), "spawning");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);

        match invocation.output {
            OutputMode::Inherit => {
                if self.stdout_to_stderr {
                    cmd.stdout(Stdio::from(io::stderr()));
                }
                let status = cmd.status()?;
                Ok(CommandStatus {
                    code: status.code(),
                    stderr: String::new(),
                })
            }
            OutputMode::Capture => {
                let output = cmd.stdin(Stdio::null()).output()?;
                Ok(CommandStatus {
                    code: output.status.code(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
        }
    }
}

/// Writes each invocation to `out` instead of running it and reports success
#[derive(Debug)]
pub struct DryRunRunner<W: Write> {
    out: RefCell<W>,
}

impl<W: Write> DryRunRunner<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: RefCell::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write> CommandRunner for DryRunRunner<W> {
    fn run(&self, invocation: &Invocation) -> io::Result<CommandStatus> {
        writeln!(self.out.borrow_mut(), "{}", invocation.redacted())?;
        Ok(CommandStatus::success())
    }
}
