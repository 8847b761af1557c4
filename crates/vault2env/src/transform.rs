//! Key transformation
//!
//! Vault field names rarely match the environment variable names a program
//! expects. A transform entry `old=new` renames field `old` to variable `new`.
//! Transform sets bundle entries under a name, e.g. `STS` for the fields of
//! an AWS STS credential.

use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Vault field name -> environment variable name
pub type TransformMap = HashMap<String, String>;

/// Named lists of `old=new` entries
pub type TransformSets = BTreeMap<String, Vec<String>>;

/// Sets shipped with vault2env
pub fn builtin_sets() -> TransformSets {
    let mut sets = TransformSets::new();

    sets.insert(
        "STS".to_string(),
        vec![
            "access_key=AWS_ACCESS_KEY_ID".to_string(),
            "secret_key=AWS_SECRET_ACCESS_KEY".to_string(),
            "security_token=AWS_SESSION_TOKEN".to_string(),
        ],
    );

    sets
}

/// Parse `old=new` entries; later entries win
pub fn parse_entries<S: AsRef<str>>(entries: &[S]) -> TransformMap {
    let mut map = TransformMap::new();

    for entry in entries {
        let entry = entry.as_ref().trim();
        if entry.is_empty() {
            continue;
        }

        match entry.split_once('=') {
            Some((old, new)) if !old.is_empty() && !new.is_empty() => {
                map.insert(old.to_string(), new.to_string());
            }
            _ => warn!("transform {:?} is not of the form oldkey=newkey, ignoring", entry),
        }
    }

    map
}

/// Build the effective transform map
///
/// Entries from the selected sets are applied first, explicit `--transform`
/// entries override them.
pub fn resolve(transforms: &[String], set_names: &[String], sets: &TransformSets) -> TransformMap {
    let mut entries: Vec<&str> = Vec::new();

    for name in set_names {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }

        match sets.get(name) {
            Some(set) => entries.extend(set.iter().map(String::as_str)),
            None => warn!("transform set {:?} was not found, ignoring", name),
        }
    }

    entries.extend(transforms.iter().map(String::as_str));

    parse_entries(&entries)
}

/// Environment variable name for a Vault field
pub fn apply<'a>(map: &'a TransformMap, key: &'a str) -> &'a str {
    map.get(key).map(String::as_str).unwrap_or(key)
}
