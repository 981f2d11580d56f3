//! Command driver for scenario tests.
//!
//! A [`Session`] runs command lines as one catalog user and checks their
//! exit status and output against an [`Expectation`].

pub mod fixture;
mod matcher;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::catalog::path::home_collection;
use crate::config::{CATALOG_ENV, LOG_ENV, USER_ENV};
use crate::error::StoreError;

pub use matcher::{Expectation, MatchMode};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("empty command line")]
    EmptyCommand,

    #[error("cannot split command line {command:?}: {source}")]
    Split {
        command: String,
        source: shell_words::ParseError,
    },

    #[error("cannot run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("unknown match mode {0:?}")]
    UnknownMode(String),

    #[error("{0}")]
    AssertionFailed(Box<AssertionFailure>),

    #[error("fixture setup failed: {0}")]
    Setup(#[from] StoreError),

    #[error("fixture io at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Everything needed to diagnose a failed assertion.
#[derive(Debug)]
pub struct AssertionFailure {
    pub user: String,
    pub command: Vec<String>,
    pub expected: String,
    pub outcome: CommandOutcome,
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "assertion failed for {} as {}", self.command.join(" "), self.user)?;
        writeln!(f, "  expected: {}", self.expected)?;
        writeln!(f, "  exit code: {}", self.outcome.exit_code)?;
        writeln!(f, "  stdout:\n{}", indent(&self.outcome.stdout))?;
        write!(f, "  stderr:\n{}", indent(&self.outcome.stderr))
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("    | {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// A command either as one shell-style string or as a ready argv.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    Text(String),
    Argv(Vec<String>),
}

impl CommandLine {
    /// Split into argv. Text follows POSIX shell quoting rules.
    pub fn argv(&self) -> Result<Vec<String>, DriverError> {
        let argv = match self {
            Self::Text(text) => {
                shell_words::split(text).map_err(|source| DriverError::Split {
                    command: text.clone(),
                    source,
                })?
            }
            Self::Argv(argv) => argv.clone(),
        };
        if argv.is_empty() {
            return Err(DriverError::EmptyCommand);
        }
        Ok(argv)
    }
}

impl From<&str> for CommandLine {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for CommandLine {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<String>> for CommandLine {
    fn from(argv: Vec<String>) -> Self {
        Self::Argv(argv)
    }
}

impl From<Vec<&str>> for CommandLine {
    fn from(argv: Vec<&str>) -> Self {
        Self::Argv(argv.into_iter().map(str::to_owned).collect())
    }
}

impl<const N: usize> From<[&str; N]> for CommandLine {
    fn from(argv: [&str; N]) -> Self {
        Self::Argv(argv.into_iter().map(str::to_owned).collect())
    }
}

/// Exit status and captured output of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// `-1` when the process ended without an exit code.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Program name to executable path. Names not registered are looked up on
/// `PATH`.
#[derive(Debug, Clone, Default)]
pub struct Programs {
    paths: BTreeMap<String, PathBuf>,
}

impl Programs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(name.into(), path.into());
        self
    }

    pub fn resolve(&self, name: &str) -> PathBuf {
        self.paths
            .get(name)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(name))
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Runs commands as one user against one catalog.
#[derive(Debug, Clone)]
pub struct Session {
    username: String,
    zone: String,
    catalog: PathBuf,
    workdir: PathBuf,
    programs: Arc<Programs>,
}

impl Session {
    pub fn new(
        username: impl Into<String>,
        zone: impl Into<String>,
        catalog: impl Into<PathBuf>,
        workdir: impl Into<PathBuf>,
        programs: Arc<Programs>,
    ) -> Self {
        Self {
            username: username.into(),
            zone: zone.into(),
            catalog: catalog.into(),
            workdir: workdir.into(),
            programs,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// `name#zone`, as `qu -u` prints it.
    pub fn qualified_name(&self) -> String {
        format!("{}#{}", self.username, self.zone)
    }

    pub fn home_collection(&self) -> String {
        home_collection(&self.zone, &self.username)
    }

    pub fn catalog_path(&self) -> &Path {
        &self.catalog
    }

    /// Local directory commands run in.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Run a command and capture its outcome. Never checks the result.
    pub fn run_icommand(&self, command: impl Into<CommandLine>) -> Result<CommandOutcome, DriverError> {
        let argv = command.into().argv()?;
        self.spawn(&argv)
    }

    fn spawn(&self, argv: &[String]) -> Result<CommandOutcome, DriverError> {
        let program = self.programs.resolve(&argv[0]);
        debug!(user = %self.username, argv = ?argv, "run");
        let output = Command::new(&program)
            .args(&argv[1..])
            .env(USER_ENV, &self.username)
            .env(CATALOG_ENV, &self.catalog)
            .env_remove(LOG_ENV)
            .current_dir(&self.workdir)
            .output()
            .map_err(|source| DriverError::Spawn {
                program: program.display().to_string(),
                source,
            })?;

        let outcome = CommandOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(exit_code = outcome.exit_code, "finished");
        Ok(outcome)
    }

    /// Run a command and require that it behaves as expected.
    ///
    /// - no pattern: exit 0 and nothing on stderr
    /// - stdout modes: exit 0 and the patterns match stdout
    /// - stderr modes: the patterns match stderr, whatever the exit code
    pub fn assert_icommand(
        &self,
        command: impl Into<CommandLine>,
        expectation: Expectation,
    ) -> Result<CommandOutcome, DriverError> {
        let argv = command.into().argv()?;
        let outcome = self.spawn(&argv)?;

        let passed = match expectation.mode {
            None => outcome.success() && outcome.stderr.is_empty(),
            Some(mode) if mode.is_stderr() => expectation.matches(&outcome)?,
            Some(_) => outcome.success() && expectation.matches(&outcome)?,
        };
        self.verdict(passed, argv, expectation.to_string(), outcome)
    }

    /// Run a command and require that it does not behave as described.
    ///
    /// Without a pattern the command must exit nonzero. With one, the
    /// selected stream must not match.
    pub fn assert_icommand_fail(
        &self,
        command: impl Into<CommandLine>,
        expectation: Expectation,
    ) -> Result<CommandOutcome, DriverError> {
        let argv = command.into().argv()?;
        let outcome = self.spawn(&argv)?;

        let passed = if expectation.has_pattern() {
            !expectation.matches(&outcome)?
        } else {
            !outcome.success()
        };
        let expected = if expectation.has_pattern() {
            format!("no match for {expectation}")
        } else {
            "nonzero exit status".to_owned()
        };
        self.verdict(passed, argv, expected, outcome)
    }

    fn verdict(
        &self,
        passed: bool,
        command: Vec<String>,
        expected: String,
        outcome: CommandOutcome,
    ) -> Result<CommandOutcome, DriverError> {
        if passed {
            return Ok(outcome);
        }
        Err(DriverError::AssertionFailed(Box::new(AssertionFailure {
            user: self.username.clone(),
            command,
            expected,
            outcome,
        })))
    }
}
