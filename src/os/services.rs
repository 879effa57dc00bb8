//! Service control through the device's init system.

use super::InitSystem;
use crate::command::{ExecOptions, ExitCode};
use crate::device::{Device, shell_quote};
use crate::library::{DeviceLibrary, LibraryError};

impl DeviceLibrary {
    /// Starts a service.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::NotImplemented`] for init systems other than
    /// systemd and [`LibraryError::Device`] when the action fails.
    pub fn start_service(
        &self,
        name: &str,
        init_system: InitSystem,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        self.control_service("start", name, ExitCode::Exact(0), init_system, device_name)
    }

    /// Stops a service.
    ///
    /// # Errors
    ///
    /// Same as [`DeviceLibrary::start_service`].
    pub fn stop_service(
        &self,
        name: &str,
        init_system: InitSystem,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        self.control_service("stop", name, ExitCode::Exact(0), init_system, device_name)
    }

    /// Restarts a service.
    ///
    /// # Errors
    ///
    /// Same as [`DeviceLibrary::start_service`].
    pub fn restart_service(
        &self,
        name: &str,
        init_system: InitSystem,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        self.control_service("restart", name, ExitCode::Exact(0), init_system, device_name)
    }

    /// Enables a service at boot.
    ///
    /// # Errors
    ///
    /// Same as [`DeviceLibrary::start_service`].
    pub fn enable_service(
        &self,
        name: &str,
        init_system: InitSystem,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        self.control_service("enable", name, ExitCode::Exact(0), init_system, device_name)
    }

    /// Disables a service at boot.
    ///
    /// # Errors
    ///
    /// Same as [`DeviceLibrary::start_service`].
    pub fn disable_service(
        &self,
        name: &str,
        init_system: InitSystem,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        self.control_service("disable", name, ExitCode::Exact(0), init_system, device_name)
    }

    /// Asserts that a service is enabled at boot.
    ///
    /// # Errors
    ///
    /// Same as [`DeviceLibrary::start_service`].
    pub fn service_enabled(
        &self,
        name: &str,
        init_system: InitSystem,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        self.control_service("is-enabled", name, ExitCode::Exact(0), init_system, device_name)
    }

    /// Asserts that a service is disabled at boot.
    ///
    /// # Errors
    ///
    /// Same as [`DeviceLibrary::start_service`].
    pub fn service_disabled(
        &self,
        name: &str,
        init_system: InitSystem,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        self.control_service("is-enabled", name, ExitCode::NonZero, init_system, device_name)
    }

    /// Asserts that a service is active and returns its main PID.
    ///
    /// # Errors
    ///
    /// Same as [`DeviceLibrary::get_service_main_pid`].
    pub fn service_running(
        &self,
        name: &str,
        init_system: InitSystem,
        device_name: Option<&str>,
    ) -> Result<u32, LibraryError> {
        self.control_service("is-active", name, ExitCode::Exact(0), init_system, device_name)?;
        self.get_service_main_pid(name, init_system, device_name)
    }

    /// Asserts that a service is not active.
    ///
    /// # Errors
    ///
    /// Same as [`DeviceLibrary::start_service`].
    pub fn service_stopped(
        &self,
        name: &str,
        init_system: InitSystem,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        self.control_service("is-active", name, ExitCode::NonZero, init_system, device_name)
    }

    /// Reloads the service manager configuration, returning its output.
    ///
    /// # Errors
    ///
    /// Same as [`DeviceLibrary::start_service`].
    pub fn reload_services_manager(
        &self,
        init_system: InitSystem,
        device_name: Option<&str>,
    ) -> Result<String, LibraryError> {
        init_system.require_systemd()?;
        let device = self.get_device(device_name)?;
        Ok(device
            .execute("systemctl daemon-reload", ExecOptions::default())?
            .stdout)
    }

    /// Main PID of a service; `0` when the service is not running.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Assertion`] when the output is not a PID, and
    /// the errors of [`DeviceLibrary::start_service`].
    pub fn get_service_main_pid(
        &self,
        name: &str,
        init_system: InitSystem,
        device_name: Option<&str>,
    ) -> Result<u32, LibraryError> {
        init_system.require_systemd()?;
        let command = format!(
            "systemctl show --property MainPID --value {}",
            shell_quote(name)
        );
        let result = self.run_checked(device_name, &command, ExitCode::Exact(0))?;
        let pid = result.stdout.trim();
        pid.parse::<u32>().map_err(|err| {
            LibraryError::Assertion(format!("unexpected main PID '{pid}' for {name}: {err}"))
        })
    }

    fn control_service(
        &self,
        action: &str,
        name: &str,
        expected: ExitCode,
        init_system: InitSystem,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        init_system.require_systemd()?;
        let command = format!("systemctl {action} {}", shell_quote(name));
        self.run_checked(device_name, &command, expected)?;
        Ok(())
    }
}
