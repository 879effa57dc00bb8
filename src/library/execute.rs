//! Command execution, device clocks, transfers, and network toggles.

use camino::Utf8Path;
use chrono::{DateTime, SubsecRound, Utc};
use tracing::debug;

use super::{DeviceLibrary, LibraryError};
use crate::command::{ExecOptions, ExitCode};
use crate::device::Device;

const PRECISE_CLOCK_COMMAND: &str = "date +%s%N";
const CLOCK_COMMAND: &str = "date +%s";
/// Digits in a nanosecond timestamp for any date after September 2001.
const NANOS_DIGITS: usize = 19;

/// Arguments accepted by [`DeviceLibrary::execute_command`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "each flag mirrors an independent caller-facing toggle"
)]
pub struct ExecuteOptions {
    expected: ExitCode,
    ignore_exit_code: bool,
    log_output: bool,
    strip: bool,
    sudo: Option<bool>,
    stdout: bool,
    stderr: bool,
    device_name: Option<String>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            expected: ExitCode::Exact(0),
            ignore_exit_code: false,
            log_output: true,
            strip: false,
            sudo: None,
            stdout: true,
            stderr: false,
            device_name: None,
        }
    }
}

impl ExecuteOptions {
    /// Expects exit code zero, logs output, and returns stdout only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the expected exit code.
    #[must_use]
    pub fn exp_exit_code(mut self, value: impl Into<ExitCode>) -> Self {
        self.expected = value.into();
        self
    }

    /// Skips the exit code check entirely.
    #[must_use]
    pub const fn ignore_exit_code(mut self, value: bool) -> Self {
        self.ignore_exit_code = value;
        self
    }

    /// Logs the command and its output.
    #[must_use]
    pub const fn log_output(mut self, value: bool) -> Self {
        self.log_output = value;
        self
    }

    /// Trims surrounding whitespace from the returned output.
    #[must_use]
    pub const fn strip(mut self, value: bool) -> Self {
        self.strip = value;
        self
    }

    /// Forces `sudo` on or off; unset leaves the backend default.
    #[must_use]
    pub const fn sudo(mut self, value: bool) -> Self {
        self.sudo = Some(value);
        self
    }

    /// Includes stdout in the result.
    #[must_use]
    pub const fn stdout(mut self, value: bool) -> Self {
        self.stdout = value;
        self
    }

    /// Includes stderr in the result.
    #[must_use]
    pub const fn stderr(mut self, value: bool) -> Self {
        self.stderr = value;
        self
    }

    /// Targets the named device instead of the current one.
    #[must_use]
    pub fn device_name(mut self, value: impl Into<String>) -> Self {
        self.device_name = Some(value.into());
        self
    }

    const fn effective_exit_code(&self) -> ExitCode {
        if self.ignore_exit_code {
            ExitCode::Any
        } else {
            self.expected
        }
    }
}

/// Output selected by [`ExecuteOptions::stdout`] and
/// [`ExecuteOptions::stderr`]. Unrequested streams are `None`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandOutputs {
    /// Standard output, when requested.
    pub stdout: Option<String>,
    /// Standard error, when requested.
    pub stderr: Option<String>,
}

impl CommandOutputs {
    /// Returns `true` when neither stream was requested.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.stdout.is_none() && self.stderr.is_none()
    }

    /// Standard output, or an empty string when it was not requested.
    #[must_use]
    pub fn stdout_or_default(&self) -> &str {
        self.stdout.as_deref().unwrap_or_default()
    }
}

fn shape(text: String, requested: bool, strip: bool) -> Option<String> {
    if !requested {
        return None;
    }
    Some(if strip { text.trim().to_owned() } else { text })
}

impl DeviceLibrary {
    /// Runs `command` on the selected device and shapes its output.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Device`] wrapping
    /// [`crate::device::DeviceError::CommandFailed`] when the exit code does
    /// not match, or the device lookup errors.
    pub fn execute_command(
        &self,
        command: &str,
        options: &ExecuteOptions,
    ) -> Result<CommandOutputs, LibraryError> {
        let device = self.get_device(options.device_name.as_deref())?;
        let exec = ExecOptions::default()
            .log_output(options.log_output)
            .sudo(options.sudo);
        let result = device.assert_command(command, options.effective_exit_code(), exec)?;
        Ok(CommandOutputs {
            stdout: shape(result.stdout, options.stdout, options.strip),
            stderr: shape(result.stderr, options.stderr, options.strip),
        })
    }

    /// Reads the current device's clock.
    ///
    /// With `precise` set the clock is read with nanosecond resolution; when
    /// the device's `date` cannot expand `%N` the call falls back to whole
    /// seconds.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Assertion`] when the clock output is not a
    /// timestamp, or the command errors of [`DeviceLibrary::execute_command`].
    pub fn get_unix_timestamp(&self, precise: bool) -> Result<DateTime<Utc>, LibraryError> {
        self.device_timestamp(None, precise)
    }

    /// Reads the host clock, truncated to whole seconds unless `precise`.
    #[must_use]
    pub fn get_unix_timestamp_from_host(precise: bool) -> DateTime<Utc> {
        let now = Utc::now();
        if precise { now } else { now.trunc_subsecs(0) }
    }

    /// Copies a local file, directory, or glob pattern to the device.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Device`] wrapping
    /// [`crate::device::DeviceError::TransferFailed`] when the copy fails.
    pub fn transfer_to_device(
        &self,
        source: &Utf8Path,
        destination: &str,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        self.get_device(device_name)?.copy_to(source, destination)?;
        Ok(())
    }

    /// IP address of the device; empty when the backend has none.
    ///
    /// # Errors
    ///
    /// Returns the device lookup errors or a backend failure.
    pub fn get_ipaddress(&self, device_name: Option<&str>) -> Result<String, LibraryError> {
        Ok(self.get_device(device_name)?.get_ipaddress()?)
    }

    /// Disconnects the device from the network where the backend supports it.
    ///
    /// # Errors
    ///
    /// Returns the device lookup errors or a backend failure.
    pub fn disconnect_network(&self, device_name: Option<&str>) -> Result<(), LibraryError> {
        self.get_device(device_name)?.disconnect_network()?;
        Ok(())
    }

    /// Reconnects the device to the network where the backend supports it.
    ///
    /// # Errors
    ///
    /// Returns the device lookup errors or a backend failure.
    pub fn connect_network(&self, device_name: Option<&str>) -> Result<(), LibraryError> {
        self.get_device(device_name)?.connect_network()?;
        Ok(())
    }

    /// Reads a device clock, falling back to the host clock when the device
    /// cannot be reached.
    pub(super) fn device_time_or_host(&self, name: Option<&str>) -> DateTime<Utc> {
        self.device_timestamp(name, true).unwrap_or_else(|err| {
            debug!(error = %err, "device clock unavailable; using host clock");
            Self::get_unix_timestamp_from_host(true)
        })
    }

    fn device_timestamp(
        &self,
        name: Option<&str>,
        precise: bool,
    ) -> Result<DateTime<Utc>, LibraryError> {
        let device = self.get_device(name)?;
        let quiet = ExecOptions::default().log_output(false);
        if precise {
            let output = device.assert_command(PRECISE_CLOCK_COMMAND, ExitCode::Exact(0), quiet)?;
            let nanos = output.stdout.trim();
            if is_nanos(nanos) {
                return nanos
                    .parse::<i64>()
                    .map(DateTime::from_timestamp_nanos)
                    .map_err(|err| clock_error(nanos, &err.to_string()));
            }
            debug!(output = nanos, "device clock lacks nanosecond support");
        }
        let output = device.assert_command(CLOCK_COMMAND, ExitCode::Exact(0), quiet)?;
        let seconds = output.stdout.trim();
        seconds
            .parse::<i64>()
            .ok()
            .and_then(|value| DateTime::from_timestamp(value, 0))
            .ok_or_else(|| clock_error(seconds, "not a unix timestamp"))
    }
}

/// A `date` without `%N` support prints either a literal `N` or plain
/// seconds, neither of which reaches nanosecond width.
fn is_nanos(text: &str) -> bool {
    text.len() >= NANOS_DIGITS && text.bytes().all(|byte| byte.is_ascii_digit())
}

fn clock_error(output: &str, reason: &str) -> LibraryError {
    LibraryError::Assertion(format!("unexpected device clock output '{output}': {reason}"))
}
