//! vault2env - Vault secrets as environment variables
//!
//! "A secret in the environment is one echo away from the logs."
//!
//! Reads secrets from Vault, hands them to a command as environment
//! variables and redacts them from everything that command prints.
//! Redaction itself lives in `vault2env-core`.

pub mod cli;
pub mod config;
pub mod env;
pub mod transform;
pub mod vault;

pub use config::{Config, Settings};
pub use vault::{Secret, VaultClient, VaultError};
