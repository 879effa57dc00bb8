//! Device library facade.
//!
//! [`DeviceLibrary`] ties the pieces together: it resolves the adapter
//! variant and its configuration, asks the registered factory for a device,
//! keeps the device in its [`DeviceRegistry`], and routes every later
//! operation to the current (or a named) device.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

use crate::command::{ExecOptions, ExitCode};
use crate::config::{
    AdapterSettings, ConfigMap, DEFAULT_ADAPTER, LibraryConfig, ReservedSettings, extra_hosts,
    merge, path_exists, read_env_file,
};
use crate::device::{Device, ManagedDevice};
use crate::factory::{AdapterVariant, DeviceRequest, FactoryRegistry};
use crate::name::{DEFAULT_NAME_PREFIX, generate_name, normalize_container_name};
use crate::registry::DeviceRegistry;
use crate::retry::RetryPolicy;

mod error;
mod execute;
mod lifecycle;
mod logs;

pub use error::LibraryError;
pub use execute::{CommandOutputs, ExecuteOptions};
pub use logs::LogQuery;

/// Environment key carrying the device identifier for remote and local
/// variants.
pub const DEVICE_ID_ENV: &str = "DEVICE_ID";

/// Arguments accepted by [`DeviceLibrary::setup`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SetupOptions {
    skip_bootstrap: Option<bool>,
    cleanup: Option<bool>,
    adapter: Option<String>,
    env_file: Option<Utf8PathBuf>,
    overrides: ConfigMap,
}

impl SetupOptions {
    /// Creates options that defer every decision to configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips or forces the bootstrap script, overriding the variant block.
    #[must_use]
    pub const fn skip_bootstrap(mut self, value: bool) -> Self {
        self.skip_bootstrap = Some(value);
        self
    }

    /// Enables or disables cleanup at teardown, overriding `skip_cleanup`.
    #[must_use]
    pub const fn cleanup(mut self, value: bool) -> Self {
        self.cleanup = Some(value);
        self
    }

    /// Selects the adapter variant by name.
    #[must_use]
    pub fn adapter(mut self, value: impl Into<String>) -> Self {
        self.adapter = Some(value.into());
        self
    }

    /// Uses a different environment source file.
    #[must_use]
    pub fn env_file(mut self, value: impl Into<Utf8PathBuf>) -> Self {
        self.env_file = Some(value.into());
        self
    }

    /// Sets a configuration key; call-site values win over the variant
    /// block.
    #[must_use]
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }
}

/// Entry point for provisioning devices and running checks against them.
#[derive(Debug)]
pub struct DeviceLibrary {
    config: LibraryConfig,
    settings: AdapterSettings,
    factories: FactoryRegistry,
    registry: DeviceRegistry,
    retry: RetryPolicy,
    suite_start_time: Option<DateTime<Utc>>,
    test_start_time: Option<DateTime<Utc>>,
}

impl DeviceLibrary {
    /// Creates a library from explicit configuration and factories.
    #[must_use]
    pub fn new(config: LibraryConfig, factories: FactoryRegistry) -> Self {
        let retry = config.retry_policy();
        Self {
            config,
            settings: AdapterSettings::default(),
            factories,
            registry: DeviceRegistry::new(),
            retry,
            suite_start_time: None,
            test_start_time: None,
        }
    }

    /// Loads configuration files and `DEVICE_*` environment variables, then
    /// creates the library.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Config`] when configuration cannot be loaded
    /// or fails validation.
    pub fn from_environment(factories: FactoryRegistry) -> Result<Self, LibraryError> {
        let config = LibraryConfig::load_without_cli_args()?;
        config.validate()?;
        let settings = AdapterSettings::discover()?;
        Ok(Self::new(config, factories).with_adapter_settings(settings))
    }

    /// Replaces the variant-scoped configuration blocks.
    #[must_use]
    pub fn with_adapter_settings(mut self, settings: AdapterSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replaces the retry schedule used for devices and log assertions.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &LibraryConfig {
        &self.config
    }

    /// Provisioned devices.
    #[must_use]
    pub const fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Returns the named device, or the current one when `name` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::NotFound`] for an unknown name and
    /// [`LibraryError::NoCurrentDevice`] before any setup.
    pub fn get_device(&self, name: Option<&str>) -> Result<&ManagedDevice, LibraryError> {
        self.registry.get(name)
    }

    /// Makes the named device the implicit target of later operations.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::NotFound`] when `name` is not registered.
    pub fn set_current(&mut self, name: &str) -> Result<(), LibraryError> {
        self.registry.set_current(name)
    }

    /// Provisioning timestamp of the named or current device, read from the
    /// device clock when it was set up.
    ///
    /// # Errors
    ///
    /// Returns the lookup errors of [`DeviceLibrary::get_device`].
    pub fn get_setup_time(
        &self,
        name: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>, LibraryError> {
        self.get_device(name)?;
        let key = name
            .or_else(|| self.registry.current_name())
            .ok_or(LibraryError::NoCurrentDevice)?;
        Ok(self.registry.setup_time(key))
    }

    /// Generates a random name with the given prefix.
    #[must_use]
    pub fn get_random_name(prefix: &str) -> String {
        generate_name(prefix)
    }

    /// Provisions a device, makes it current, and bootstraps it.
    ///
    /// # Errors
    ///
    /// - [`LibraryError::InvalidConfiguration`] for an unknown variant.
    /// - [`LibraryError::MissingAdapter`] when no factory is registered for
    ///   the variant; nothing is registered in that case.
    /// - [`LibraryError::Factory`] when the backend cannot create the device.
    /// - [`LibraryError::Device`] when the bootstrap transfer or script fails.
    pub fn setup(&mut self, options: SetupOptions) -> Result<String, LibraryError> {
        let variant = self.resolve_variant(options.adapter.as_deref())?;
        let Some(factory) = self.factories.get(variant) else {
            return Err(LibraryError::MissingAdapter { variant });
        };

        let mut config = merge(&self.settings.block(variant), &options.overrides);
        let reserved = ReservedSettings::take(&mut config);
        let should_cleanup = options.cleanup.unwrap_or(!reserved.skip_cleanup);
        let mut skip_bootstrap = options.skip_bootstrap.unwrap_or(reserved.skip_bootstrap);
        let mut bootstrap_script = reserved
            .bootstrap_script
            .unwrap_or_else(|| self.config.bootstrap_script.clone());
        let env_file = options
            .env_file
            .unwrap_or_else(|| Utf8PathBuf::from(&self.config.env_file));

        let request = match variant {
            AdapterVariant::Docker => DeviceRequest {
                identifier: normalize_container_name(&generate_name(DEFAULT_NAME_PREFIX)),
                extra_hosts: load_extra_hosts(&env_file),
                image: Some(reserved.image.unwrap_or_else(|| self.config.image.clone())),
                env_file,
                env: BTreeMap::new(),
                config,
            },
            AdapterVariant::Ssh | AdapterVariant::Local => {
                let identifier = generate_name(DEFAULT_NAME_PREFIX);
                DeviceRequest {
                    env: BTreeMap::from([(DEVICE_ID_ENV.to_owned(), identifier.clone())]),
                    identifier,
                    env_file,
                    extra_hosts: BTreeMap::new(),
                    image: None,
                    config,
                }
            }
        };

        let name = request.identifier.clone();
        let created = factory.create_device(request)?;
        let managed = ManagedDevice::new(created, variant, self.retry)
            .with_should_cleanup(should_cleanup);
        self.registry.insert(&name, managed);

        if variant != AdapterVariant::Docker {
            let transferred =
                self.transfer_bootstrap_script(&name, Utf8Path::new(&bootstrap_script))?;
            skip_bootstrap |= transferred.is_none();
            if let Some(remote_path) = transferred {
                bootstrap_script = remote_path;
            }
        }

        let setup_time = self.device_time_or_host(Some(&name));
        self.registry.record_setup_time(&name, setup_time);

        if !skip_bootstrap && !bootstrap_script.is_empty() {
            self.get_device(Some(&name))?.assert_command(
                &bootstrap_script,
                ExitCode::Exact(0),
                ExecOptions::default().log_output(true).shell(Some(true)),
            )?;
        }

        Ok(name)
    }

    /// Cleans up every device and clears the registry. Cleanup failures are
    /// logged, never raised.
    pub fn teardown(&mut self) {
        self.registry.teardown();
    }

    fn resolve_variant(&self, explicit: Option<&str>) -> Result<AdapterVariant, LibraryError> {
        let name = explicit
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| {
                if self.config.adapter.trim().is_empty() {
                    DEFAULT_ADAPTER
                } else {
                    self.config.adapter.as_str()
                }
            });
        name.parse::<AdapterVariant>()
            .map_err(|err| LibraryError::InvalidConfiguration(err.to_string()))
    }

    /// Copies the bootstrap script when it exists locally, returning its
    /// path on the device.
    fn transfer_bootstrap_script(
        &self,
        name: &str,
        script: &Utf8Path,
    ) -> Result<Option<String>, LibraryError> {
        let Some(file_name) = script.file_name() else {
            return Ok(None);
        };
        if !path_exists(script)? {
            return Ok(None);
        }
        info!(device = name, script = %script, "transferring bootstrap script to device");
        self.get_device(Some(name))?.copy_to(script, ".")?;
        Ok(Some(format!("./{file_name}")))
    }
}

fn load_extra_hosts(env_file: &Utf8Path) -> BTreeMap<String, String> {
    read_env_file(env_file).map_or_else(
        |err| {
            warn!(error = %err, "ignoring unreadable environment file");
            BTreeMap::new()
        },
        |entries| extra_hosts(&entries),
    )
}

#[cfg(test)]
mod tests;
