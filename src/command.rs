//! Command results and the knobs used when running commands on a device.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Outcome of one command executed on a device.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandResult {
    /// Exit code reported by the command.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandResult {
    /// Creates a result from its parts.
    #[must_use]
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Exit code a caller expects from a command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitCode {
    /// The command must exit with exactly this code.
    Exact(i32),
    /// Any code except zero is accepted.
    NonZero,
    /// The exit code is not checked.
    Any,
}

impl ExitCode {
    /// Returns `true` when `actual` satisfies the expectation.
    #[must_use]
    pub const fn matches(self, actual: i32) -> bool {
        match self {
            Self::Exact(expected) => expected == actual,
            Self::NonZero => actual != 0,
            Self::Any => true,
        }
    }
}

impl Default for ExitCode {
    fn default() -> Self {
        Self::Exact(0)
    }
}

impl From<i32> for ExitCode {
    fn from(value: i32) -> Self {
        Self::Exact(value)
    }
}

impl From<Option<i32>> for ExitCode {
    fn from(value: Option<i32>) -> Self {
        value.map_or(Self::Any, Self::Exact)
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(code) => write!(f, "{code}"),
            Self::NonZero => f.write_str("!0"),
            Self::Any => f.write_str("any"),
        }
    }
}

/// Raised when an exit code expectation cannot be parsed.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("invalid exit code expectation '{0}': use an integer or '!0'")]
pub struct ExitCodeParseError(String);

impl FromStr for ExitCode {
    type Err = ExitCodeParseError;

    /// Parses `"!0"` as [`ExitCode::NonZero`] and integers as exact codes.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed == "!0" {
            return Ok(Self::NonZero);
        }
        trimmed
            .parse::<i32>()
            .map(Self::Exact)
            .map_err(|_| ExitCodeParseError(value.to_owned()))
    }
}

/// Options forwarded to a device when executing a command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExecOptions {
    /// Emit the command and its output to the log stream.
    pub log_output: bool,
    /// Run through `sudo`; `None` leaves the backend default in place.
    pub sudo: Option<bool>,
    /// Run through a shell; `None` leaves the backend default in place.
    pub shell: Option<bool>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            log_output: true,
            sudo: None,
            shell: None,
        }
    }
}

impl ExecOptions {
    /// Sets whether the command and its output are logged.
    #[must_use]
    pub const fn log_output(mut self, value: bool) -> Self {
        self.log_output = value;
        self
    }

    /// Forces `sudo` on or off.
    #[must_use]
    pub const fn sudo(mut self, value: Option<bool>) -> Self {
        self.sudo = value;
        self
    }

    /// Forces shell interpretation on or off.
    #[must_use]
    pub const fn shell(mut self, value: Option<bool>) -> Self {
        self.shell = value;
        self
    }
}
