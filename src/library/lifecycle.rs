//! Suite and test bookkeeping for whichever runner drives the library.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::DeviceLibrary;

impl DeviceLibrary {
    /// Records the suite start time from the host clock.
    pub fn start_suite(&mut self) {
        self.suite_start_time = Some(Self::get_unix_timestamp_from_host(true));
    }

    /// Records the test start time from the current device's clock, or the
    /// host clock when no device answers.
    pub fn start_test(&mut self) {
        let started = self.get_unix_timestamp(true).map_or_else(
            |err| {
                debug!(error = %err, "could not read start time from device");
                info!("set test start time from host");
                Self::get_unix_timestamp_from_host(false)
            },
            |time| {
                info!("set test start time from device");
                time
            },
        );
        self.test_start_time = Some(started);
    }

    /// Logs the outcome of a finished test.
    pub fn end_test(&self, test_name: &str, passed: bool, message: &str) {
        info!(
            test = test_name,
            device = ?self.registry.current_name(),
            "detected end of test"
        );
        if !passed {
            info!(test = test_name, message, "test failed");
        }
    }

    /// Tears down every device at the end of a suite.
    pub fn end_suite(&mut self, suite_name: &str, message: &str) {
        info!(suite = suite_name, message, "suite ending");
        self.teardown();
    }

    /// Time the current test started, if recorded.
    #[must_use]
    pub const fn get_test_start_time(&self) -> Option<DateTime<Utc>> {
        self.test_start_time
    }

    /// Time the current suite started, if recorded.
    #[must_use]
    pub const fn get_suite_start_time(&self) -> Option<DateTime<Utc>> {
        self.suite_start_time
    }
}
