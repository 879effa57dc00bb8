//! Provision ephemeral test devices and assert on their state.
//!
//! A device is a container, a host reached over a remote shell, or the local
//! machine. Backends plug in through [`DeviceFactory`]; the
//! [`DeviceLibrary`] facade selects a factory from configuration, keeps the
//! provisioned devices in a [`DeviceRegistry`], and routes command execution,
//! log assertions, and OS checks to the current (or a named) device.

pub mod command;
pub mod config;
pub mod device;
pub mod factory;
pub mod library;
pub mod name;
pub mod os;
pub mod registry;
pub mod retry;
pub mod test_support;

pub use command::{CommandResult, ExecOptions, ExitCode};
pub use config::{AdapterSettings, ConfigError, ConfigMap, LibraryConfig};
pub use device::{Device, DeviceError, ManagedDevice, PathPermissions, Since};
pub use factory::{AdapterVariant, DeviceFactory, DeviceRequest, FactoryError, FactoryRegistry};
pub use library::{
    CommandOutputs, DEVICE_ID_ENV, DeviceLibrary, ExecuteOptions, LibraryError, LogQuery,
    SetupOptions,
};
pub use os::InitSystem;
pub use registry::DeviceRegistry;
pub use retry::{RetryPolicy, Retryable};
