//! Environment source parsing and static host overlays.

use std::collections::BTreeMap;
use std::io;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use tracing::debug;

use super::{ConfigError, parent_dir};

/// Environment keys with this prefix describe `hostname=ip` overlays.
pub const HOST_KEY_PREFIX: &str = "DEVICELIBRARY_HOST_";

/// Reads a dotenv-style file into ordered key/value pairs.
///
/// A missing file yields no entries.
///
/// # Errors
///
/// Returns [`ConfigError::EnvFile`] when the file exists but cannot be read
/// or parsed.
pub fn read_env_file(path: &Utf8Path) -> Result<Vec<(String, String)>, ConfigError> {
    let env_error = |message: String| ConfigError::EnvFile {
        path: path.to_string(),
        message,
    };
    let Some(file_name) = path.file_name() else {
        return Ok(Vec::new());
    };
    let dir = match Dir::open_ambient_dir(parent_dir(path), ambient_authority()) {
        Ok(dir) => dir,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(env_error(err.to_string())),
    };
    let contents = match dir.read_to_string(file_name) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(env_error(err.to_string())),
    };
    dotenvy::from_read_iter(contents.as_bytes())
        .map(|entry| entry.map_err(|err| env_error(err.to_string())))
        .collect()
}

/// Collects the hostname to address overlays from environment entries.
///
/// Only keys starting with [`HOST_KEY_PREFIX`] are considered; malformed
/// values are skipped.
#[must_use]
pub fn extra_hosts<'a, I>(entries: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = &'a (String, String)>,
{
    entries
        .into_iter()
        .filter(|(key, _)| key.starts_with(HOST_KEY_PREFIX))
        .filter_map(|(key, value)| {
            let parsed = parse_host_entry(value);
            if parsed.is_none() {
                debug!(key = %key, "skipping incomplete host entry");
            }
            parsed
        })
        .collect()
}

/// Parses `hostname=ip`, dropping any `scheme://` prefix from the hostname.
///
/// Returns `None` when either side is empty.
#[must_use]
pub fn parse_host_entry(value: &str) -> Option<(String, String)> {
    let (raw_hostname, raw_address) = value.split_once('=')?;
    let hostname = strip_scheme(raw_hostname.trim());
    let address = raw_address.trim();
    if hostname.is_empty() || address.is_empty() {
        return None;
    }
    Some((hostname.to_owned(), address.to_owned()))
}

fn strip_scheme(hostname: &str) -> &str {
    hostname
        .split_once("://")
        .filter(|(scheme, _)| {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|character| character.is_alphanumeric() || character == '_')
        })
        .map_or(hostname, |(_, rest)| rest)
}
