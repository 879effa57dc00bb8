//! Device adapter contract shared by every backend.
//!
//! A device is one provisioned test target: a container, a host reached over
//! a remote shell, or the local machine. Backends implement [`Device`]; the
//! rest of the crate only talks to that trait.

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::command::{CommandResult, ExecOptions, ExitCode};

mod managed;

pub use managed::ManagedDevice;

/// Lower bound used when fetching device logs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Since {
    /// Absolute point in time.
    Time(DateTime<Utc>),
    /// Seconds since the Unix epoch, with fractional precision.
    Epoch(f64),
}

impl Since {
    /// Converts the bound to an absolute UTC timestamp.
    ///
    /// Returns `None` when an epoch offset is out of the representable range.
    #[must_use]
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        match self {
            Self::Time(time) => Some(time),
            Self::Epoch(seconds) => epoch_to_datetime(seconds),
        }
    }
}

impl From<DateTime<Utc>> for Since {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Time(value)
    }
}

impl From<f64> for Since {
    fn from(value: f64) -> Self {
        Self::Epoch(value)
    }
}

/// Converts fractional epoch seconds to a UTC timestamp with microsecond
/// precision.
#[must_use]
#[expect(
    clippy::float_arithmetic,
    clippy::cast_possible_truncation,
    reason = "epoch seconds arrive as floats from device clocks; microsecond precision is sufficient"
)]
pub fn epoch_to_datetime(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    DateTime::from_timestamp_micros((seconds * 1_000_000.0).round() as i64)
}

/// Observed permissions of a path on the device.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PathPermissions {
    /// Octal mode, for example `644`.
    pub mode: String,
    /// Owner and group in `owner:group` form.
    pub owner_group: String,
}

/// Errors raised by device adapters.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DeviceError {
    /// Raised when a command exits with an unexpected code.
    #[error("command `{command}` exited with {exit_code}, expected {expected}: {stderr}")]
    CommandFailed {
        /// Command that was executed.
        command: String,
        /// Expected exit code.
        expected: ExitCode,
        /// Exit code reported by the device.
        exit_code: i32,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },
    /// Raised when files cannot be transferred to the device.
    #[error("failed to copy {local_path} to {destination}: {message}")]
    TransferFailed {
        /// Local source file, directory, or glob.
        local_path: String,
        /// Destination path on the device.
        destination: String,
        /// Backend description of the failure.
        message: String,
    },
    /// Raised when a filesystem or content assertion does not hold.
    #[error("assertion failed: {0}")]
    Assertion(String),
    /// Raised when the backend itself fails (connection lost, timeout, and
    /// so on).
    #[error("backend error: {0}")]
    Backend(String),
}

/// Capabilities every backend variant provides.
///
/// Execution is synchronous: each call blocks until the backend has the exit
/// code and captured output, or gives up with its own timeout.
pub trait Device {
    /// Identifier the device was created with.
    fn id(&self) -> &str;

    /// Runs `command` on the device.
    ///
    /// A non-zero exit code is not an error; callers interpret the result.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Backend`] when the command cannot be run at all.
    fn execute(&self, command: &str, options: ExecOptions) -> Result<CommandResult, DeviceError>;

    /// Runs `command` and checks its exit code against `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::CommandFailed`] when the exit code does not
    /// match, or any error raised by [`Device::execute`].
    fn assert_command(
        &self,
        command: &str,
        expected: ExitCode,
        options: ExecOptions,
    ) -> Result<CommandResult, DeviceError> {
        let result = self.execute(command, options)?;
        check_exit_code(command, expected, options, result)
    }

    /// Copies a local file, directory, or glob pattern to `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::TransferFailed`] when the source is missing or
    /// the destination cannot be written.
    fn copy_to(&self, source: &Utf8Path, destination: &str) -> Result<(), DeviceError>;

    /// Returns the device log lines, optionally only those produced at or
    /// after `since`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Backend`] when the logs cannot be read.
    fn get_logs(&self, since: Option<Since>) -> Result<Vec<String>, DeviceError>;

    /// Returns the device IP address, or an empty string when the backend
    /// has no network identity.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Backend`] when the address lookup fails.
    fn get_ipaddress(&self) -> Result<String, DeviceError> {
        Ok(String::new())
    }

    /// Disconnects the device from the network. A no-op for backends
    /// without network isolation.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Backend`] when a supported disconnect fails.
    fn disconnect_network(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Reconnects the device to the network. A no-op for backends without
    /// network isolation.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Backend`] when a supported reconnect fails.
    fn connect_network(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Releases backend resources. Calling it more than once must be safe.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Backend`] when release fails; callers log and
    /// continue.
    fn cleanup(&self) -> Result<(), DeviceError>;

    /// Checks the mode and ownership of `path`, returning what was observed.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Assertion`] when either value differs from the
    /// expectation, or any error raised while reading them.
    fn assert_linux_permissions(
        &self,
        path: &str,
        mode: Option<&str>,
        owner_group: Option<&str>,
    ) -> Result<PathPermissions, DeviceError> {
        let command = format!("stat -c '%a %U:%G' {}", shell_quote(path));
        let result = self.assert_command(&command, ExitCode::Exact(0), ExecOptions::default())?;
        let observed = parse_permissions(&result.stdout).ok_or_else(|| {
            DeviceError::Assertion(format!(
                "could not read permissions of {path}: {}",
                result.stdout.trim()
            ))
        })?;
        if let Some(expected_mode) = mode
            && observed.mode != expected_mode
        {
            return Err(DeviceError::Assertion(format!(
                "mode of {path} is {}, expected {expected_mode}",
                observed.mode
            )));
        }
        if let Some(expected_owner) = owner_group
            && observed.owner_group != expected_owner
        {
            return Err(DeviceError::Assertion(format!(
                "owner of {path} is {}, expected {expected_owner}",
                observed.owner_group
            )));
        }
        Ok(observed)
    }

    /// Checks that `file` on the device has the same checksum as the local
    /// `reference_file`, returning the device checksum.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Assertion`] when the checksums differ.
    fn assert_file_checksum(
        &self,
        file: &str,
        reference_file: &Utf8Path,
    ) -> Result<String, DeviceError>;
}

/// Compares an executed command's exit code with `expected`, logging the
/// output first when requested.
///
/// # Errors
///
/// Returns [`DeviceError::CommandFailed`] on mismatch.
pub fn check_exit_code(
    command: &str,
    expected: ExitCode,
    options: ExecOptions,
    result: CommandResult,
) -> Result<CommandResult, DeviceError> {
    if options.log_output {
        info!(
            command,
            exit_code = result.exit_code,
            stdout = %result.stdout,
            stderr = %result.stderr,
            "executed command"
        );
    }
    if expected.matches(result.exit_code) {
        return Ok(result);
    }
    Err(DeviceError::CommandFailed {
        command: command.to_owned(),
        expected,
        exit_code: result.exit_code,
        stdout: result.stdout,
        stderr: result.stderr,
    })
}

pub(crate) fn shell_quote(value: &str) -> String {
    shell_escape::unix::escape(value.into()).into_owned()
}

fn parse_permissions(stdout: &str) -> Option<PathPermissions> {
    let mut parts = stdout.split_whitespace();
    let mode = parts.next()?;
    let owner_group = parts.next()?;
    Some(PathPermissions {
        mode: mode.to_owned(),
        owner_group: owner_group.to_owned(),
    })
}
