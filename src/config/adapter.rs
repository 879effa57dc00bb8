//! Variant-scoped configuration blocks and reserved setup keys.

use std::collections::BTreeMap;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use ortho_config::ConfigDiscovery;
use ortho_config::toml;
use serde::Deserialize;
use serde_json::Value;

use super::{
    APP_NAME, CONFIG_ENV_VAR, CONFIG_FILE_NAME, ConfigError, DOTFILE_NAME, parent_dir,
    path_exists,
};
use crate::factory::AdapterVariant;

/// Free-form configuration forwarded to backend factories.
pub type ConfigMap = serde_json::Map<String, Value>;

const BLOCK_SUFFIX: &str = "_CONFIG";
const FALSY: [&str; 6] = ["", "false", "no", "off", "0", "none"];

/// Configuration blocks keyed by name, for example `DOCKER_CONFIG`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct AdapterSettings {
    blocks: BTreeMap<String, ConfigMap>,
}

impl AdapterSettings {
    /// Creates an empty settings table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `block` under `name`; names are matched case-insensitively.
    pub fn insert(&mut self, name: &str, block: ConfigMap) {
        self.blocks.insert(name.to_uppercase(), block);
    }

    /// Builder-style variant of [`AdapterSettings::insert`].
    #[must_use]
    pub fn with_block(mut self, name: &str, block: ConfigMap) -> Self {
        self.insert(name, block);
        self
    }

    /// Returns a copy of the block for `variant`, or an empty map.
    #[must_use]
    pub fn block(&self, variant: AdapterVariant) -> ConfigMap {
        self.blocks
            .get(&variant.config_block())
            .cloned()
            .unwrap_or_default()
    }

    /// Reads every `*_CONFIG` table from a TOML file. Other keys belong to
    /// [`super::LibraryConfig`] and are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read and
    /// [`ConfigError::Parse`] when it is not valid TOML.
    pub fn load_from_path(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = read_file(path)?;
        Self::from_toml(&contents)
            .map_err(|message| ConfigError::Parse(format!("{path}: {message}")))
    }

    /// Loads blocks from the first configuration file found by the standard
    /// discovery order; no file yields empty settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a discovered file cannot be read or
    /// parsed.
    pub fn discover() -> Result<Self, ConfigError> {
        let discovery = ConfigDiscovery::builder(APP_NAME)
            .env_var(CONFIG_ENV_VAR)
            .config_file_name(CONFIG_FILE_NAME)
            .dotfile_name(DOTFILE_NAME)
            .project_file_name(CONFIG_FILE_NAME)
            .build();
        for candidate in discovery.utf8_candidates() {
            if path_exists(&candidate)? {
                return Self::load_from_path(&candidate);
            }
        }
        Ok(Self::default())
    }

    fn from_toml(contents: &str) -> Result<Self, String> {
        let mut settings = Self::default();
        if contents.trim().is_empty() {
            return Ok(settings);
        }
        let value: toml::Value = toml::from_str(contents).map_err(|err| err.to_string())?;
        let Some(table) = value.as_table() else {
            return Err(String::from("configuration root is not a table"));
        };
        for (name, block) in table {
            if !name.to_uppercase().ends_with(BLOCK_SUFFIX) {
                continue;
            }
            let converted = serde_json::to_value(block).map_err(|err| err.to_string())?;
            let Value::Object(map) = converted else {
                return Err(format!("{name} must be a table"));
            };
            settings.insert(name, map);
        }
        Ok(settings)
    }
}

/// Reserved keys consumed by setup before the remaining configuration is
/// forwarded to the backend factory.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReservedSettings {
    /// Leave backend resources in place at teardown.
    pub skip_cleanup: bool,
    /// Do not run the bootstrap script after provisioning.
    pub skip_bootstrap: bool,
    /// Bootstrap script overriding the library default.
    pub bootstrap_script: Option<String>,
    /// Image overriding the library default (container variant).
    pub image: Option<String>,
}

impl ReservedSettings {
    /// Removes the reserved keys from `config` and interprets them.
    #[must_use]
    pub fn take(config: &mut ConfigMap) -> Self {
        Self {
            skip_cleanup: config
                .remove("skip_cleanup")
                .is_some_and(|value| is_truthy(&value)),
            skip_bootstrap: config
                .remove("skip_bootstrap")
                .is_some_and(|value| is_truthy(&value)),
            bootstrap_script: config.remove("bootstrap_script").and_then(value_to_string),
            image: config.remove("image").and_then(value_to_string),
        }
    }
}

/// Shallow-merges `overrides` on top of `base`; override values win.
#[must_use]
pub fn merge(base: &ConfigMap, overrides: &ConfigMap) -> ConfigMap {
    let mut merged = base.clone();
    merged.extend(overrides.iter().map(|(key, value)| (key.clone(), value.clone())));
    merged
}

/// Interprets a configuration value as a boolean.
///
/// Strings `""`, `false`, `no`, `off`, `0`, and `none` are false regardless
/// of case; numbers are true when non-zero; `null` is false.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_i64().map_or_else(
            || number.as_f64().is_some_and(|float| float.abs() > 0.0),
            |int| int != 0,
        ),
        Value::String(text) => !FALSY.contains(&text.trim().to_lowercase().as_str()),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

fn read_file(path: &Utf8Path) -> Result<String, ConfigError> {
    let parent = parent_dir(path);
    let file_name = path.file_name().ok_or_else(|| ConfigError::Io {
        path: path.to_string(),
        message: String::from("configuration file path is missing a filename"),
    })?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| ConfigError::Io {
        path: parent.to_string(),
        message: err.to_string(),
    })?;
    dir.read_to_string(file_name).map_err(|err| ConfigError::Io {
        path: path.to_string(),
        message: err.to_string(),
    })
}
