//! Process signalling and `pgrep`-based presence checks.

use crate::command::{ExecOptions, ExitCode};
use crate::device::{Device, shell_quote};
use crate::library::{DeviceLibrary, LibraryError};

fn find_command(pattern: &str) -> String {
    format!("pgrep -fa {} | grep -v \"pgrep -fa\"", shell_quote(pattern))
}

impl DeviceLibrary {
    /// Sends `signal` (for example `KILL` or `TERM`) to `pid`.
    ///
    /// The exit code of `kill` is ignored. With `wait` set the call then
    /// asserts that the process is gone, relying on the device retry policy
    /// to give it time to exit.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Device`] when the process is still alive after
    /// the last attempt.
    pub fn kill_process(
        &self,
        pid: u32,
        signal: &str,
        wait: bool,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        let kill = format!("kill -{} {pid}", shell_quote(signal));
        self.run_checked(device_name, &kill, ExitCode::Any)?;
        if wait {
            self.run_checked(device_name, &format!("kill -0 {pid}"), ExitCode::NonZero)?;
        }
        Ok(())
    }

    /// Asserts that at least one process command line matches `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Device`] when nothing matches.
    pub fn assert_process_exists(
        &self,
        pattern: &str,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        self.run_checked(device_name, &find_command(pattern), ExitCode::Exact(0))?;
        Ok(())
    }

    /// Asserts that no process command line matches `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Assertion`] listing the matching processes.
    pub fn assert_process_not_exists(
        &self,
        pattern: &str,
        device_name: Option<&str>,
    ) -> Result<(), LibraryError> {
        let processes = self.find_processes(pattern, device_name)?;
        if processes.is_empty() {
            return Ok(());
        }
        Err(LibraryError::Assertion(format!(
            "no processes should have matched, got {}\n\n{}",
            processes.len(),
            processes.join("\n")
        )))
    }

    /// Counts processes matching `pattern` and checks the count against the
    /// inclusive bounds.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Assertion`] when the count is out of bounds.
    pub fn assert_process_count(
        &self,
        pattern: &str,
        min: Option<usize>,
        max: Option<usize>,
        device_name: Option<&str>,
    ) -> Result<usize, LibraryError> {
        let processes = self.find_processes(pattern, device_name)?;
        let count = processes.len();
        if let Some(minimum) = min
            && count < minimum
        {
            return Err(LibraryError::Assertion(format!(
                "expected process count to be greater than or equal to {minimum}, got {count}\n\n{}",
                processes.join("\n")
            )));
        }
        if let Some(maximum) = max
            && count > maximum
        {
            return Err(LibraryError::Assertion(format!(
                "expected process count to be less than or equal to {maximum}, got {count}\n\n{}",
                processes.join("\n")
            )));
        }
        Ok(count)
    }

    fn find_processes(
        &self,
        pattern: &str,
        device_name: Option<&str>,
    ) -> Result<Vec<String>, LibraryError> {
        let device = self.get_device(device_name)?;
        let result = device.execute(&find_command(pattern), ExecOptions::default())?;
        Ok(result
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect())
    }
}
