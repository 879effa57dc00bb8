//! Test support utilities shared across unit and integration tests.
//!
//! [`ScriptedDevice`] replays queued command results in FIFO order and
//! records everything the library asks of it. Clones share state, so a test
//! can keep one handle while the library owns another.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};

use crate::command::{CommandResult, ExecOptions, ExitCode};
use crate::device::{Device, DeviceError, Since, shell_quote};
use crate::factory::{AdapterVariant, DeviceFactory, DeviceRequest, FactoryError};

/// Records a single command executed through [`ScriptedDevice`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordedCommand {
    /// Command text as received by the device.
    pub command: String,
    /// Options the command was executed with.
    pub options: ExecOptions,
}

/// Records a single file transfer made through [`ScriptedDevice`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordedTransfer {
    /// Local source path.
    pub source: Utf8PathBuf,
    /// Destination on the device.
    pub destination: String,
}

#[derive(Clone, Debug)]
struct LogEntry {
    at: Option<DateTime<Utc>>,
    line: String,
}

/// Scripted device that returns pre-seeded outputs in FIFO order.
///
/// Running a command with an empty queue fails with
/// [`DeviceError::Backend`], which also makes clock reads fall back to the
/// host.
#[derive(Clone, Debug, Default)]
pub struct ScriptedDevice {
    id: String,
    responses: Rc<RefCell<VecDeque<Result<CommandResult, DeviceError>>>>,
    commands: Rc<RefCell<Vec<RecordedCommand>>>,
    transfers: Rc<RefCell<Vec<RecordedTransfer>>>,
    logs: Rc<RefCell<Vec<LogEntry>>>,
    log_queries: Rc<RefCell<Vec<Option<Since>>>>,
    checksums: Rc<RefCell<HashMap<Utf8PathBuf, String>>>,
    ipaddress: Rc<RefCell<String>>,
    connected: Rc<Cell<bool>>,
    cleanups: Rc<Cell<usize>>,
    cleanup_error: Rc<RefCell<Option<String>>>,
    transfer_error: Rc<RefCell<Option<String>>>,
}

impl ScriptedDevice {
    /// Creates a connected device with no queued responses.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let device = Self {
            id: id.into(),
            ..Self::default()
        };
        device.connected.set(true);
        device
    }

    /// Returns a handle with a different identifier that shares this
    /// device's state.
    #[must_use]
    pub fn renamed(&self, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..self.clone()
        }
    }

    /// Pushes a successful exit status with empty output.
    pub fn push_success(&self) {
        self.push_output(0, "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(code, "", "simulated failure");
    }

    /// Pushes an explicit command result.
    pub fn push_output(&self, code: i32, stdout: impl Into<String>, stderr: impl Into<String>) {
        self.responses
            .borrow_mut()
            .push_back(Ok(CommandResult::new(code, stdout, stderr)));
    }

    /// Pushes a backend error, as if the command could not be run.
    pub fn push_error(&self, error: DeviceError) {
        self.responses.borrow_mut().push_back(Err(error));
    }

    /// Appends an untimed log line; it survives every `since` filter.
    pub fn push_log(&self, line: impl Into<String>) {
        self.logs.borrow_mut().push(LogEntry {
            at: None,
            line: line.into(),
        });
    }

    /// Appends a log line produced at `at`.
    pub fn push_log_at(&self, at: DateTime<Utc>, line: impl Into<String>) {
        self.logs.borrow_mut().push(LogEntry {
            at: Some(at),
            line: line.into(),
        });
    }

    /// Registers the checksum the device reports for a local reference file.
    pub fn set_reference_checksum(&self, reference: impl Into<Utf8PathBuf>, checksum: &str) {
        self.checksums
            .borrow_mut()
            .insert(reference.into(), checksum.to_owned());
    }

    /// Sets the address returned by `get_ipaddress`.
    pub fn set_ipaddress(&self, address: &str) {
        *self.ipaddress.borrow_mut() = address.to_owned();
    }

    /// Makes every later cleanup fail with `message`.
    pub fn fail_cleanup(&self, message: &str) {
        *self.cleanup_error.borrow_mut() = Some(message.to_owned());
    }

    /// Makes every later transfer fail with `message`.
    pub fn fail_transfers(&self, message: &str) {
        *self.transfer_error.borrow_mut() = Some(message.to_owned());
    }

    /// Returns a snapshot of all commands recorded so far.
    #[must_use]
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.commands.borrow().clone()
    }

    /// Returns the command strings recorded so far.
    #[must_use]
    pub fn command_strings(&self) -> Vec<String> {
        self.commands
            .borrow()
            .iter()
            .map(|recorded| recorded.command.clone())
            .collect()
    }

    /// Returns a snapshot of all transfers recorded so far.
    #[must_use]
    pub fn transfers(&self) -> Vec<RecordedTransfer> {
        self.transfers.borrow().clone()
    }

    /// Returns the `since` bound of every log query, in order.
    #[must_use]
    pub fn log_queries(&self) -> Vec<Option<Since>> {
        self.log_queries.borrow().clone()
    }

    /// Returns how many times cleanup reached the device.
    #[must_use]
    pub fn cleanup_count(&self) -> usize {
        self.cleanups.get()
    }

    /// Returns whether the device is attached to the network.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.get()
    }

    /// Returns how many responses are still queued.
    #[must_use]
    pub fn pending_responses(&self) -> usize {
        self.responses.borrow().len()
    }
}

impl Device for ScriptedDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn execute(&self, command: &str, options: ExecOptions) -> Result<CommandResult, DeviceError> {
        self.commands.borrow_mut().push(RecordedCommand {
            command: command.to_owned(),
            options,
        });
        self.responses.borrow_mut().pop_front().unwrap_or_else(|| {
            Err(DeviceError::Backend(String::from(
                "no scripted response available",
            )))
        })
    }

    fn copy_to(&self, source: &Utf8Path, destination: &str) -> Result<(), DeviceError> {
        if let Some(message) = self.transfer_error.borrow().clone() {
            return Err(DeviceError::TransferFailed {
                local_path: source.to_string(),
                destination: destination.to_owned(),
                message,
            });
        }
        self.transfers.borrow_mut().push(RecordedTransfer {
            source: source.to_path_buf(),
            destination: destination.to_owned(),
        });
        Ok(())
    }

    fn get_logs(&self, since: Option<Since>) -> Result<Vec<String>, DeviceError> {
        self.log_queries.borrow_mut().push(since);
        let lower_bound = since.and_then(Since::to_datetime);
        Ok(self
            .logs
            .borrow()
            .iter()
            .filter(|entry| match (lower_bound, entry.at) {
                (Some(bound), Some(at)) => at >= bound,
                _ => true,
            })
            .map(|entry| entry.line.clone())
            .collect())
    }

    fn get_ipaddress(&self) -> Result<String, DeviceError> {
        Ok(self.ipaddress.borrow().clone())
    }

    fn disconnect_network(&self) -> Result<(), DeviceError> {
        self.connected.set(false);
        Ok(())
    }

    fn connect_network(&self) -> Result<(), DeviceError> {
        self.connected.set(true);
        Ok(())
    }

    fn cleanup(&self) -> Result<(), DeviceError> {
        self.cleanups.set(self.cleanups.get().saturating_add(1));
        self.cleanup_error
            .borrow()
            .clone()
            .map_or(Ok(()), |message| Err(DeviceError::Backend(message)))
    }

    fn assert_file_checksum(
        &self,
        file: &str,
        reference_file: &Utf8Path,
    ) -> Result<String, DeviceError> {
        let expected = self
            .checksums
            .borrow()
            .get(reference_file)
            .cloned()
            .ok_or_else(|| {
                DeviceError::Assertion(format!("no reference checksum for {reference_file}"))
            })?;
        let command = format!("md5sum {} | cut -d' ' -f1", shell_quote(file));
        let result = self.assert_command(&command, ExitCode::Exact(0), ExecOptions::default())?;
        let actual = result.stdout.trim().to_owned();
        if actual != expected {
            return Err(DeviceError::Assertion(format!(
                "checksum of {file} is {actual}, expected {expected}"
            )));
        }
        Ok(actual)
    }
}

/// Scripted factory that hands out [`ScriptedDevice`] handles and records
/// every request it receives.
///
/// Queued devices are handed out first; once the queue is empty a fresh
/// device is created per request.
#[derive(Clone, Debug, Default)]
pub struct ScriptedFactory {
    variant: Option<AdapterVariant>,
    devices: Rc<RefCell<VecDeque<ScriptedDevice>>>,
    requests: Rc<RefCell<Vec<DeviceRequest>>>,
    failure: Rc<RefCell<Option<String>>>,
}

impl ScriptedFactory {
    /// Creates a factory reporting construction errors for `variant`.
    #[must_use]
    pub fn new(variant: AdapterVariant) -> Self {
        Self {
            variant: Some(variant),
            ..Self::default()
        }
    }

    /// Queues a device for the next request; the device is renamed to the
    /// requested identifier when handed out.
    pub fn push_device(&self, device: ScriptedDevice) {
        self.devices.borrow_mut().push_back(device);
    }

    /// Makes every later request fail with `message`.
    pub fn fail_with(&self, message: &str) {
        *self.failure.borrow_mut() = Some(message.to_owned());
    }

    /// Returns a snapshot of all requests recorded so far.
    #[must_use]
    pub fn requests(&self) -> Vec<DeviceRequest> {
        self.requests.borrow().clone()
    }
}

impl DeviceFactory for ScriptedFactory {
    fn create_device(&self, request: DeviceRequest) -> Result<Box<dyn Device>, FactoryError> {
        self.requests.borrow_mut().push(request.clone());
        if let Some(message) = self.failure.borrow().clone() {
            return Err(FactoryError::Construction {
                variant: self.variant.unwrap_or(AdapterVariant::Docker),
                message,
            });
        }
        let device = self
            .devices
            .borrow_mut()
            .pop_front()
            .map_or_else(
                || ScriptedDevice::new(request.identifier.clone()),
                |queued| queued.renamed(request.identifier.clone()),
            );
        Ok(Box::new(device))
    }
}
