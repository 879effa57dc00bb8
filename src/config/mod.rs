//! Configuration loading via `ortho-config`.
//!
//! [`LibraryConfig`] carries the process-wide defaults: which adapter variant
//! to provision, the container image, the bootstrap script, and the retry
//! schedule. Variant-scoped blocks such as `DOCKER_CONFIG` live in
//! [`AdapterSettings`], and the dotenv-style environment source is read by
//! [`read_env_file`].

use std::ffi::OsString;
use std::io;
use std::time::Duration;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::retry::{DEFAULT_RETRY_ATTEMPTS, RetryPolicy};

mod adapter;
mod hosts;

pub use adapter::{AdapterSettings, ConfigMap, ReservedSettings, is_truthy, merge};
pub use hosts::{HOST_KEY_PREFIX, extra_hosts, parse_host_entry, read_env_file};

/// Variant used when neither the caller nor the configuration names one.
pub const DEFAULT_ADAPTER: &str = "docker";

/// Image started by the container variant unless overridden.
pub const DEFAULT_IMAGE: &str = "debian-systemd";

/// Bootstrap script run after provisioning unless skipped.
pub const DEFAULT_BOOTSTRAP_SCRIPT: &str = "./bootstrap.sh";

/// Environment source forwarded to backends.
pub const DEFAULT_ENV_FILE: &str = ".env";

pub(crate) const APP_NAME: &str = "devicelibrary";
pub(crate) const CONFIG_ENV_VAR: &str = "DEVICELIBRARY_CONFIG_PATH";
pub(crate) const CONFIG_FILE_NAME: &str = "devicelibrary.toml";
pub(crate) const DOTFILE_NAME: &str = ".devicelibrary.toml";

/// Library defaults derived from configuration files and environment
/// variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "DEVICE",
    discovery(
        app_name = "devicelibrary",
        env_var = "DEVICELIBRARY_CONFIG_PATH",
        config_file_name = "devicelibrary.toml",
        dotfile_name = ".devicelibrary.toml",
        project_file_name = "devicelibrary.toml"
    )
)]
pub struct LibraryConfig {
    /// Default adapter variant (`docker`, `ssh`, or `local`).
    #[ortho_config(default = DEFAULT_ADAPTER.to_owned())]
    pub adapter: String,
    /// Container image used by the docker variant.
    #[ortho_config(default = DEFAULT_IMAGE.to_owned())]
    pub image: String,
    /// Local path of the bootstrap script.
    #[ortho_config(default = DEFAULT_BOOTSTRAP_SCRIPT.to_owned())]
    pub bootstrap_script: String,
    /// Dotenv-style environment source.
    #[ortho_config(default = DEFAULT_ENV_FILE.to_owned())]
    pub env_file: String,
    /// Attempt ceiling for retried assertions, including the first call.
    #[ortho_config(default = 5)]
    pub retry_attempts: u32,
    /// Wait before the second attempt, in milliseconds.
    #[ortho_config(default = 1000)]
    pub retry_backoff_ms: u64,
    /// Upper bound for a single wait, in milliseconds.
    #[ortho_config(default = 10000)]
    pub retry_max_backoff_ms: u64,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            adapter: DEFAULT_ADAPTER.to_owned(),
            image: DEFAULT_IMAGE.to_owned(),
            bootstrap_script: DEFAULT_BOOTSTRAP_SCRIPT.to_owned(),
            env_file: DEFAULT_ENV_FILE.to_owned(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff_ms: 1000,
            retry_max_backoff_ms: 10_000,
        }
    }
}

/// Directory holding `path`; bare file names resolve to the working
/// directory.
pub(crate) fn parent_dir(path: &Utf8Path) -> &Utf8Path {
    path.parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."))
}

/// Checks whether `path` names an existing entry, treating a missing parent
/// directory as absence.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the parent directory cannot be opened.
pub(crate) fn path_exists(path: &Utf8Path) -> Result<bool, ConfigError> {
    let parent = parent_dir(path);
    let Some(file_name) = path.file_name() else {
        return Ok(false);
    };
    match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir.try_exists(file_name).map_err(|err| ConfigError::Io {
            path: path.to_string(),
            message: err.to_string(),
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(ConfigError::Io {
            path: parent.to_string(),
            message: err.to_string(),
        }),
    }
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl LibraryConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to {CONFIG_FILE_NAME}",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from(APP_NAME)])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages include guidance on how
    /// to provide missing values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required string is blank
    /// and [`ConfigError::InvalidRetryAttempts`] when the attempt ceiling is
    /// zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.adapter,
            &FieldMetadata::new("adapter variant", "DEVICE_ADAPTER", "adapter"),
        )?;
        Self::require_field(
            &self.image,
            &FieldMetadata::new("container image", "DEVICE_IMAGE", "image"),
        )?;
        Self::require_field(
            &self.bootstrap_script,
            &FieldMetadata::new(
                "bootstrap script path",
                "DEVICE_BOOTSTRAP_SCRIPT",
                "bootstrap_script",
            ),
        )?;
        Self::require_field(
            &self.env_file,
            &FieldMetadata::new("environment file", "DEVICE_ENV_FILE", "env_file"),
        )?;
        if self.retry_attempts == 0 {
            return Err(ConfigError::InvalidRetryAttempts);
        }
        Ok(())
    }

    /// Builds the retry schedule described by this configuration.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_backoff_ms),
        )
        .with_max_backoff(Duration::from_millis(self.retry_max_backoff_ms))
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates the retry ceiling would never run the call.
    #[error("retry_attempts must be at least 1: set DEVICE_RETRY_ATTEMPTS or add retry_attempts to {CONFIG_FILE_NAME}")]
    InvalidRetryAttempts,
    /// Surfaces errors from the `ortho-config` loader or the settings file.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Raised when the environment source cannot be read or parsed.
    #[error("failed to read environment file {path}: {message}")]
    EnvFile {
        /// Path of the environment source.
        path: String,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when a configuration file cannot be accessed.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: String,
        /// Human-readable error message.
        message: String,
    },
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
