//! Operating-system helpers composed from device commands.
//!
//! Every helper is an inherent method on [`DeviceLibrary`] taking an optional
//! device name, so they share the current-device routing of the facade.

use std::fmt;
use std::str::FromStr;

use crate::command::{CommandResult, ExecOptions, ExitCode};
use crate::device::Device;
use crate::library::{DeviceLibrary, LibraryError};

mod apt;
mod files;
mod processes;
mod services;

/// Service managers a device may run.
///
/// Only [`InitSystem::Systemd`] is implemented; requests for the others fail
/// with [`LibraryError::NotImplemented`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum InitSystem {
    /// `systemd`, driven through `systemctl`.
    #[default]
    Systemd,
    /// SysV init scripts.
    SysV,
    /// OpenRC.
    OpenRc,
}

impl InitSystem {
    /// Lower-case name of the init system.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Systemd => "systemd",
            Self::SysV => "sysv",
            Self::OpenRc => "openrc",
        }
    }

    fn require_systemd(self) -> Result<(), LibraryError> {
        if self == Self::Systemd {
            return Ok(());
        }
        Err(unsupported(self.as_str()))
    }
}

impl fmt::Display for InitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InitSystem {
    type Err = LibraryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "systemd" => Ok(Self::Systemd),
            "sysv" => Ok(Self::SysV),
            "openrc" => Ok(Self::OpenRc),
            _ => Err(unsupported(value)),
        }
    }
}

fn unsupported(name: &str) -> LibraryError {
    LibraryError::NotImplemented(format!(
        "init system '{name}' is not supported; only systemd is"
    ))
}

impl DeviceLibrary {
    fn run_checked(
        &self,
        device_name: Option<&str>,
        command: &str,
        expected: ExitCode,
    ) -> Result<CommandResult, LibraryError> {
        let device = self.get_device(device_name)?;
        Ok(device.assert_command(command, expected, ExecOptions::default())?)
    }
}
