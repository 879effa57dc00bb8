//! Backend factories and the variant registry.
//!
//! Each backend integration registers a [`DeviceFactory`] for its
//! [`AdapterVariant`]. Requesting a variant nobody registered is reported as a
//! missing adapter rather than a construction failure.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::config::ConfigMap;
use crate::device::Device;

/// Backend kinds a device can be provisioned with.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum AdapterVariant {
    /// Container runtime backend.
    Docker,
    /// Remote host reached over SSH.
    Ssh,
    /// The local machine.
    Local,
}

impl AdapterVariant {
    /// Every supported variant, in display order.
    pub const ALL: [Self; 3] = [Self::Docker, Self::Ssh, Self::Local];

    /// Lowercase name used in configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Ssh => "ssh",
            Self::Local => "local",
        }
    }

    /// Name of the variant-scoped configuration block, for example
    /// `DOCKER_CONFIG`.
    #[must_use]
    pub fn config_block(self) -> String {
        format!("{}_CONFIG", self.as_str().to_uppercase())
    }

    fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|variant| format!("'{}'", variant.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for AdapterVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a variant name is not recognised.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("invalid adapter type '{name}'; supported values are {supported}")]
pub struct UnknownVariant {
    /// Name that was requested.
    pub name: String,
    /// Comma separated list of supported variants.
    pub supported: String,
}

impl FromStr for AdapterVariant {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|variant| variant.as_str() == wanted)
            .ok_or_else(|| UnknownVariant {
                name: value.to_owned(),
                supported: Self::supported_list(),
            })
    }
}

/// Everything a backend factory needs to construct a device.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceRequest {
    /// Identifier assigned to the new device.
    pub identifier: String,
    /// Environment source file forwarded to the backend.
    pub env_file: Utf8PathBuf,
    /// Environment variables injected into the device.
    pub env: BTreeMap<String, String>,
    /// Static hostname to address overrides (container variant).
    pub extra_hosts: BTreeMap<String, String>,
    /// Image to start (container variant).
    pub image: Option<String>,
    /// Remaining configuration, passed through verbatim.
    pub config: ConfigMap,
}

/// Errors raised while constructing a device.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FactoryError {
    /// Raised when backend resources cannot be obtained.
    #[error("failed to create {variant} device: {message}")]
    Construction {
        /// Variant being constructed.
        variant: AdapterVariant,
        /// Backend description of the failure.
        message: String,
    },
}

/// Turns a [`DeviceRequest`] into a live device.
pub trait DeviceFactory {
    /// Creates a device.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::Construction`] when the backend cannot
    /// provide the device.
    fn create_device(&self, request: DeviceRequest) -> Result<Box<dyn Device>, FactoryError>;
}

impl<F> DeviceFactory for F
where
    F: Fn(DeviceRequest) -> Result<Box<dyn Device>, FactoryError>,
{
    fn create_device(&self, request: DeviceRequest) -> Result<Box<dyn Device>, FactoryError> {
        self(request)
    }
}

/// Factories available to the library, keyed by variant.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: HashMap<AdapterVariant, Box<dyn DeviceFactory>>,
}

impl FactoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` for `variant`, replacing any earlier one.
    pub fn register(&mut self, variant: AdapterVariant, factory: impl DeviceFactory + 'static) {
        self.factories.insert(variant, Box::new(factory));
    }

    /// Builder-style variant of [`FactoryRegistry::register`].
    #[must_use]
    pub fn with_factory(
        mut self,
        variant: AdapterVariant,
        factory: impl DeviceFactory + 'static,
    ) -> Self {
        self.register(variant, factory);
        self
    }

    /// Returns the factory registered for `variant`.
    #[must_use]
    pub fn get(&self, variant: AdapterVariant) -> Option<&dyn DeviceFactory> {
        self.factories.get(&variant).map(|factory| &**factory)
    }

    /// Returns the registered variants in a stable order.
    #[must_use]
    pub fn variants(&self) -> Vec<AdapterVariant> {
        let mut variants = self.factories.keys().copied().collect::<Vec<_>>();
        variants.sort();
        variants
    }
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("variants", &self.variants())
            .finish()
    }
}
