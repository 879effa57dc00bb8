//! Device identifier generation.
//!
//! Identifiers double as container names and hostnames, so they are kept to
//! `[A-Za-z0-9_.-]` once normalised.

use deunicode::deunicode;
use uuid::Uuid;

/// Prefix applied to generated device names when none is supplied.
pub const DEFAULT_NAME_PREFIX: &str = "TST";

const RANDOM_SUFFIX_LEN: usize = 20;

/// Generates a random, human-readable device name such as
/// `TST_3f9c0d7e21b84a6f9d02`.
///
/// The suffix is taken from a v4 UUID, so names are never reused within a
/// process in practice.
#[must_use]
pub fn generate_name(prefix: &str) -> String {
    let suffix = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(RANDOM_SUFFIX_LEN)
        .collect::<String>();
    if prefix.is_empty() {
        return suffix;
    }
    format!("{prefix}_{suffix}")
}

/// Normalises a name so it is accepted as a container name.
///
/// Accented and other non-ASCII characters are transliterated to their closest
/// ASCII spelling first, then anything outside `[A-Za-z0-9_.-]` is removed.
///
/// # Examples
///
/// ```
/// # use devicelibrary::name::normalize_container_name;
/// assert_eq!(normalize_container_name("Café déjà-vu!"), "Cafedeja-vu");
/// ```
#[must_use]
pub fn normalize_container_name(name: &str) -> String {
    deunicode(name)
        .chars()
        .filter(|ch| is_allowed(*ch))
        .collect()
}

const fn is_allowed(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-')
}
