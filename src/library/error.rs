//! Error type for the device library facade.

use thiserror::Error;

use crate::config::ConfigError;
use crate::device::DeviceError;
use crate::factory::{AdapterVariant, FactoryError};
use crate::retry::Retryable;

/// Errors raised by [`super::DeviceLibrary`] operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LibraryError {
    /// Raised when no factory is registered for the requested variant.
    #[error(
        "missing device adapter '{variant}': install the {variant} backend integration and register its factory"
    )]
    MissingAdapter {
        /// Variant that has no factory.
        variant: AdapterVariant,
    },
    /// Raised for an unknown variant or an unsatisfiable argument
    /// combination.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Raised when a named device is not registered.
    #[error("device '{name}' not found; existing devices: {available:?}")]
    NotFound {
        /// Requested device name.
        name: String,
        /// Names currently registered.
        available: Vec<String>,
    },
    /// Raised when an operation needs the current device before any device
    /// was set up.
    #[error("no device has been set up")]
    NoCurrentDevice,
    /// Raised when mutually exclusive arguments are combined or required
    /// ones are missing.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// Raised when a log, filesystem, or process assertion does not hold.
    #[error("assertion failed: {0}")]
    Assertion(String),
    /// Raised for init systems other than systemd.
    #[error("not implemented: {0}")]
    NotImplemented(String),
    /// Errors raised by the device adapter.
    #[error(transparent)]
    Device(#[from] DeviceError),
    /// Errors raised while constructing a device.
    #[error(transparent)]
    Factory(#[from] FactoryError),
    /// Errors raised while loading configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Retryable for LibraryError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Assertion(_) => true,
            Self::Device(err) => err.is_retryable(),
            _ => false,
        }
    }
}
