//! Standard paths used by vault2env

use std::path::PathBuf;

/// Standard vault2env paths
pub struct Paths {
    /// Config directory (~/.config/vault2env)
    pub config: PathBuf,
    /// Home directory, where the Vault CLI keeps its token
    pub home: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("vault2env");

        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));

        Self { config, home }
    }

    /// Default config file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Token file written by `vault login`
    pub fn vault_token_file(&self) -> PathBuf {
        self.home.join(".vault-token")
    }
}
