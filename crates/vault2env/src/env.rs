//! Secret extraction
//!
//! Turns Vault secrets into the flat name -> value map handed to the child
//! process and to the redaction layer.
//!
//! Fields that can't be represented as an environment value are skipped with
//! an error log instead of failing the run: strings are used verbatim,
//! numbers are rendered as text, booleans, nulls, arrays and objects are
//! dropped.

use anyhow::{bail, Result};
use serde_json::{Map, Value};
use tracing::{debug, error};

use vault2env_core::SecretMap;

use crate::transform::{self, TransformMap};
use crate::vault::VaultClient;

/// Read every key from Vault and collect its fields
pub async fn collect(
    client: &VaultClient,
    keys: &[&str],
    transforms: &TransformMap,
) -> Result<SecretMap> {
    let mut env = SecretMap::new();

    for key in keys {
        let secret = match client.read(key).await {
            Ok(Some(secret)) => secret,
            Ok(None) => {
                error!("vault key {:?} does not exist", key);
                continue;
            }
            Err(e) => {
                error!("fetching data for key {:?}: {}", key, e);
                continue;
            }
        };

        match secret.data {
            Some(data) => merge_fields(key, &data, transforms, &mut env),
            None => error!("vault key {:?} did not contain data", key),
        }
    }

    if env.is_empty() {
        bail!("no environment data could be extracted");
    }

    Ok(env)
}

/// Add the fields of one secret to `env`, renaming them through `transforms`
pub fn merge_fields(
    key: &str,
    data: &Map<String, Value>,
    transforms: &TransformMap,
    env: &mut SecretMap,
) {
    for (field, value) in data {
        let Some(value) = env_value(value) else {
            error!(
                "vault key {:?}.{:?} contained unexpected data type {}",
                key,
                field,
                type_name(value)
            );
            continue;
        };

        let name = transform::apply(transforms, field);
        debug!("using {}.{} as {}", key, field, name);
        env.insert(name.to_string(), value);
    }
}

fn env_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Shell `export` statements for every secret, sorted by name
pub fn export_statements(env: &SecretMap) -> Vec<String> {
    env.iter()
        .map(|(name, value)| {
            // Escape single quotes in the value
            let escaped = value.replace('\'', "'\\''");
            format!("export {}='{}'", name, escaped)
        })
        .collect()
}
