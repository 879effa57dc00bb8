//! Registry-owned wrapper around a backend device.

use std::cell::Cell;
use std::fmt;

use camino::Utf8Path;
use tracing::info;

use super::{Device, DeviceError, Since};
use crate::command::{CommandResult, ExecOptions, ExitCode};
use crate::factory::AdapterVariant;
use crate::retry::{RetryPolicy, Retryable};

impl Retryable for DeviceError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::CommandFailed { .. } | Self::Assertion(_))
    }
}

/// A provisioned device as held by the registry.
///
/// Adds three things to the backend device: `assert_command` runs under the
/// retry policy, cleanup honours the per-device `should_cleanup` flag, and a
/// successful cleanup is remembered so repeated calls are no-ops.
pub struct ManagedDevice {
    inner: Box<dyn Device>,
    variant: AdapterVariant,
    should_cleanup: bool,
    retry: RetryPolicy,
    cleaned_up: Cell<bool>,
}

impl ManagedDevice {
    /// Wraps `inner`; cleanup is enabled by default.
    #[must_use]
    pub fn new(inner: Box<dyn Device>, variant: AdapterVariant, retry: RetryPolicy) -> Self {
        Self {
            inner,
            variant,
            should_cleanup: true,
            retry,
            cleaned_up: Cell::new(false),
        }
    }

    /// Sets whether backend resources are released on cleanup.
    #[must_use]
    pub const fn with_should_cleanup(mut self, should_cleanup: bool) -> Self {
        self.should_cleanup = should_cleanup;
        self
    }

    /// Backend variant the device was created with.
    #[must_use]
    pub const fn variant(&self) -> AdapterVariant {
        self.variant
    }

    /// Whether cleanup releases backend resources.
    #[must_use]
    pub const fn should_cleanup(&self) -> bool {
        self.should_cleanup
    }

    /// Whether cleanup has already completed.
    #[must_use]
    pub fn is_cleaned_up(&self) -> bool {
        self.cleaned_up.get()
    }
}

impl fmt::Debug for ManagedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedDevice")
            .field("id", &self.inner.id())
            .field("variant", &self.variant)
            .field("should_cleanup", &self.should_cleanup)
            .field("retry", &self.retry)
            .field("cleaned_up", &self.cleaned_up.get())
            .finish_non_exhaustive()
    }
}

impl Device for ManagedDevice {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn execute(&self, command: &str, options: ExecOptions) -> Result<CommandResult, DeviceError> {
        self.inner.execute(command, options)
    }

    fn assert_command(
        &self,
        command: &str,
        expected: ExitCode,
        options: ExecOptions,
    ) -> Result<CommandResult, DeviceError> {
        self.retry.run("assert_command", || {
            self.inner.assert_command(command, expected, options)
        })
    }

    fn copy_to(&self, source: &Utf8Path, destination: &str) -> Result<(), DeviceError> {
        self.inner.copy_to(source, destination)
    }

    fn get_logs(&self, since: Option<Since>) -> Result<Vec<String>, DeviceError> {
        self.inner.get_logs(since)
    }

    fn get_ipaddress(&self) -> Result<String, DeviceError> {
        self.inner.get_ipaddress()
    }

    fn disconnect_network(&self) -> Result<(), DeviceError> {
        self.inner.disconnect_network()
    }

    fn connect_network(&self) -> Result<(), DeviceError> {
        self.inner.connect_network()
    }

    fn cleanup(&self) -> Result<(), DeviceError> {
        if self.cleaned_up.get() {
            return Ok(());
        }
        if !self.should_cleanup {
            info!(device = self.id(), "skipping cleanup as requested");
            self.cleaned_up.set(true);
            return Ok(());
        }
        self.inner.cleanup()?;
        self.cleaned_up.set(true);
        Ok(())
    }

    fn assert_file_checksum(
        &self,
        file: &str,
        reference_file: &Utf8Path,
    ) -> Result<String, DeviceError> {
        self.inner.assert_file_checksum(file, reference_file)
    }
}
