//! Debian package management through `apt-get`.

use crate::command::ExitCode;
use crate::device::shell_quote;
use crate::library::{DeviceLibrary, LibraryError};

fn package_command(action: &str, packages: &[&str]) -> Result<String, LibraryError> {
    if packages.is_empty() {
        return Err(LibraryError::InvalidArguments(format!(
            "apt-get {action} needs at least one package"
        )));
    }
    let quoted = packages
        .iter()
        .map(|package| shell_quote(package))
        .collect::<Vec<_>>()
        .join(" ");
    Ok(format!("apt-get -y {action} {quoted}"))
}

impl DeviceLibrary {
    /// Refreshes the package index, returning the command output.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Device`] when `apt-get update` fails.
    pub fn apt_update(&self, device_name: Option<&str>) -> Result<String, LibraryError> {
        Ok(self
            .run_checked(device_name, "apt-get update", ExitCode::Exact(0))?
            .stdout)
    }

    /// Installs packages; entries may pin a version as `name=1.0.0`.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::InvalidArguments`] for an empty package list
    /// and [`LibraryError::Device`] when the install fails.
    pub fn apt_install(
        &self,
        packages: &[&str],
        device_name: Option<&str>,
    ) -> Result<String, LibraryError> {
        let command = package_command("install", packages)?;
        Ok(self
            .run_checked(device_name, &command, ExitCode::Exact(0))?
            .stdout)
    }

    /// Removes packages, keeping their configuration.
    ///
    /// # Errors
    ///
    /// Same as [`DeviceLibrary::apt_install`].
    pub fn apt_remove(
        &self,
        packages: &[&str],
        device_name: Option<&str>,
    ) -> Result<String, LibraryError> {
        let command = package_command("remove", packages)?;
        Ok(self
            .run_checked(device_name, &command, ExitCode::Exact(0))?
            .stdout)
    }

    /// Removes packages together with their configuration.
    ///
    /// # Errors
    ///
    /// Same as [`DeviceLibrary::apt_install`].
    pub fn apt_purge(
        &self,
        packages: &[&str],
        device_name: Option<&str>,
    ) -> Result<String, LibraryError> {
        let command = package_command("purge", packages)?;
        Ok(self
            .run_checked(device_name, &command, ExitCode::Exact(0))?
            .stdout)
    }
}
