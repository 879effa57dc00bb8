//! Filesystem assertions run through `test`, `ls`, `find`, and `stat`.

use camino::Utf8Path;

use crate::command::ExitCode;
use crate::device::{Device, PathPermissions, shell_quote};
use crate::library::{DeviceLibrary, LibraryError};

impl DeviceLibrary {
    /// Asserts that a directory has no entries.
    ///
    /// Without `must_exist` a missing directory counts as empty.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Device`] when the directory has entries, or
    /// is missing while `must_exist` is set.
    pub fn assert_directory_empty(
        &self,
        path: &str,
        must_exist: bool,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        let quoted = shell_quote(path);
        let command = if must_exist {
            format!("[ -d {quoted} ] && [ -z \"$(ls -A {quoted})\" ]")
        } else {
            format!("[ -z \"$(ls -A {quoted} 2>/dev/null || true)\" ]")
        };
        self.run_checked(device_name, &command, ExitCode::Exact(0))?;
        Ok(())
    }

    /// Lists the immediate subdirectories of `path`.
    ///
    /// Without `must_exist` a missing directory yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Device`] when `path` is missing and
    /// `must_exist` is set.
    pub fn get_directories_in_directory(
        &self,
        path: &str,
        must_exist: bool,
        device_name: Option<&str>,
    ) -> Result<Vec<String>, LibraryError> {
        let find = format!("find {} -maxdepth 1 -mindepth 1 -type d", shell_quote(path));
        let command = if must_exist {
            find
        } else {
            format!("{find} 2>/dev/null || true")
        };
        let result = self.run_checked(device_name, &command, ExitCode::Exact(0))?;
        Ok(result
            .stdout
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect())
    }

    /// Asserts that `path` has no subdirectories.
    ///
    /// A missing directory passes unless `must_exist` is set.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Assertion`] naming the subdirectories found,
    /// or the errors of [`DeviceLibrary::get_directories_in_directory`].
    pub fn assert_directories_count(
        &self,
        path: &str,
        must_exist: bool,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        let directories = self.get_directories_in_directory(path, must_exist, device_name)?;
        if directories.is_empty() {
            return Ok(());
        }
        Err(LibraryError::Assertion(format!(
            "{path} should not have subdirectories, found {}: {directories:?}",
            directories.len()
        )))
    }

    /// Asserts that a directory exists and has at least one entry.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Device`] when the check fails.
    pub fn assert_directory_not_empty(
        &self,
        path: &str,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        let quoted = shell_quote(path);
        let command = format!("[ -d {quoted} ] && [ -n \"$(ls -A {quoted})\" ]");
        self.run_checked(device_name, &command, ExitCode::Exact(0))?;
        Ok(())
    }

    /// Asserts that a directory exists.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Device`] when the check fails.
    pub fn assert_directory(&self, path: &str, device_name: Option<&str>) -> Result<(), LibraryError> {
        self.test_path("test -d", path, device_name)
    }

    /// Asserts that no directory exists at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Device`] when the check fails.
    pub fn assert_not_directory(
        &self,
        path: &str,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        self.test_path("! test -d", path, device_name)
    }

    /// Asserts that a regular file exists.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Device`] when the check fails.
    pub fn assert_file_exists(
        &self,
        path: &str,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        self.test_path("test -f", path, device_name)
    }

    /// Asserts that no regular file exists at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Device`] when the check fails.
    pub fn assert_not_file_exists(
        &self,
        path: &str,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        self.test_path("! test -f", path, device_name)
    }

    /// Asserts that `path` is a symlink and, with `target_exists`, that its
    /// target resolves.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Device`] when either check fails.
    pub fn assert_symlink_exists(
        &self,
        path: &str,
        target_exists: bool,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        self.test_path("test -L", path, device_name)?;
        if target_exists {
            self.test_path("test -e", path, device_name)?;
        }
        Ok(())
    }

    /// Asserts that `path` is not a symlink.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Device`] when the check fails.
    pub fn assert_not_symlink_exists(
        &self,
        path: &str,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        self.test_path("! test -L", path, device_name)
    }

    /// Asserts the octal mode and `owner:group` of `path`; `None` skips a
    /// check. Returns the observed values.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Device`] wrapping an assertion failure when a
    /// value differs.
    pub fn assert_linux_permissions(
        &self,
        path: &str,
        mode: Option<&str>,
        owner_group: Option<&str>,
        device_name: Option<&str>,
    ) -> Result<PathPermissions, LibraryError> {
        Ok(self
            .get_device(device_name)?
            .assert_linux_permissions(path, mode, owner_group)?)
    }

    /// Asserts that `file` on the device matches the checksum of the local
    /// `reference_file`, returning the device checksum.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Device`] wrapping an assertion failure when
    /// the checksums differ.
    pub fn assert_file_checksum(
        &self,
        file: &str,
        reference_file: &Utf8Path,
        device_name: Option<&str>,
    ) -> Result<String, LibraryError> {
        Ok(self
            .get_device(device_name)?
            .assert_file_checksum(file, reference_file)?)
    }

    fn test_path(
        &self,
        test: &str,
        path: &str,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        let command = format!("{test} {}", shell_quote(path));
        self.run_checked(device_name, &command, ExitCode::Exact(0))?;
        Ok(())
    }
}
