//! Configuration loading for vault2env
//!
//! Precedence: command line flags (and their environment variables), then the
//! config file, then built-in defaults.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use vault2env_core::RedactionMode;

use crate::cli::Cli;
use crate::transform::{builtin_sets, TransformSets};

pub const DEFAULT_VAULT_ADDR: &str = "https://127.0.0.1:8200";

/// Contents of `config.toml`
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Vault API address used when neither --vault-addr nor VAULT_ADDR is set
    pub vault_addr: Option<String>,

    /// Default obfuscation mode
    pub obfuscate: Option<String>,

    /// Additional transform sets, may shadow built-in ones
    #[serde(default)]
    pub transform_sets: TransformSets,
}

impl Config {
    /// Load the config file, or use defaults if it doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_file(path)
    }

    /// Load a config file that must exist
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        toml::from_str(&content).with_context(|| format!("Failed to parse config from {:?}", path))
    }

    /// Built-in transform sets merged with the configured ones
    pub fn transform_sets(&self) -> TransformSets {
        let mut sets = builtin_sets();
        for (name, entries) in &self.transform_sets {
            sets.insert(name.clone(), entries.clone());
        }
        sets
    }
}

/// Effective settings for one run
#[derive(Debug, Clone)]
pub struct Settings {
    pub vault_addr: String,
    pub mode: RedactionMode,
}

impl Settings {
    pub fn resolve(cli: &Cli, config: &Config) -> Result<Self> {
        let vault_addr = cli
            .vault_addr
            .clone()
            .or_else(|| config.vault_addr.clone())
            .unwrap_or_else(|| DEFAULT_VAULT_ADDR.to_string());

        if vault_addr.trim().is_empty() {
            bail!("Vault address is empty");
        }

        let obfuscate = cli
            .obfuscate
            .as_deref()
            .or(config.obfuscate.as_deref())
            .unwrap_or(RedactionMode::default().as_str());

        let mode = match RedactionMode::parse_strict(obfuscate) {
            Some(mode) => mode,
            None => {
                tracing::warn!(
                    "unknown obfuscation {:?}, secrets will NOT be redacted from output",
                    obfuscate
                );
                RedactionMode::parse_lossy(obfuscate)
            }
        };

        Ok(Self { vault_addr, mode })
    }
}
