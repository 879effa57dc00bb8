//! Ownership of provisioned devices and the current-device pointer.
//!
//! The registry is plain state owned by [`crate::DeviceLibrary`]; it defines
//! no locking. Callers driving it from several threads must wrap it in their
//! own mutex.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::device::{Device, ManagedDevice};
use crate::library::LibraryError;

/// Provisioned devices keyed by identifier.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, ManagedDevice>,
    current: Option<String>,
    setup_times: HashMap<String, DateTime<Utc>>,
}

impl DeviceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `device` under `name` and makes it current.
    ///
    /// The key is the identifier the library generated, not whatever the
    /// backend reports from [`Device::id`]. A device already held under the
    /// same name is cleaned up before it is displaced.
    pub fn insert(&mut self, name: &str, device: ManagedDevice) {
        if let Some(displaced) = self.devices.insert(name.to_owned(), device) {
            warn!(device = name, "replacing a registered device");
            if let Err(err) = displaced.cleanup() {
                warn!(device = name, error = %err, "error during device cleanup");
            }
        }
        self.setup_times.remove(name);
        self.current = Some(name.to_owned());
    }

    /// Returns the named device, or the current one when `name` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::NotFound`] for an unknown name and
    /// [`LibraryError::NoCurrentDevice`] when nothing has been set up.
    pub fn get(&self, name: Option<&str>) -> Result<&ManagedDevice, LibraryError> {
        name.map_or_else(
            || {
                self.current
                    .as_deref()
                    .and_then(|current| self.devices.get(current))
                    .ok_or(LibraryError::NoCurrentDevice)
            },
            |wanted| {
                self.devices.get(wanted).ok_or_else(|| LibraryError::NotFound {
                    name: wanted.to_owned(),
                    available: self.names(),
                })
            },
        )
    }

    /// Makes the named device current.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::NotFound`] when `name` is not registered; the
    /// current device is left unchanged.
    pub fn set_current(&mut self, name: &str) -> Result<(), LibraryError> {
        if !self.devices.contains_key(name) {
            return Err(LibraryError::NotFound {
                name: name.to_owned(),
                available: self.names(),
            });
        }
        self.current = Some(name.to_owned());
        Ok(())
    }

    /// Identifier of the current device.
    #[must_use]
    pub fn current_name(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Registered identifiers in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names = self.devices.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Number of registered devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns `true` when no device is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Records when `name` finished provisioning.
    pub fn record_setup_time(&mut self, name: &str, time: DateTime<Utc>) {
        self.setup_times.insert(name.to_owned(), time);
    }

    /// Provisioning timestamp of `name`, if recorded.
    #[must_use]
    pub fn setup_time(&self, name: &str) -> Option<DateTime<Utc>> {
        self.setup_times.get(name).copied()
    }

    /// Cleans up every device, then clears the registry.
    ///
    /// A failing cleanup is logged and does not stop the remaining devices
    /// from being cleaned up.
    pub fn teardown(&mut self) {
        for name in self.names() {
            let Some(device) = self.devices.get(&name) else {
                continue;
            };
            info!(device = %name, "cleaning up device");
            if let Err(err) = device.cleanup() {
                warn!(device = %name, error = %err, "error during device cleanup");
            }
        }
        self.devices.clear();
        self.setup_times.clear();
        self.current = None;
    }
}
