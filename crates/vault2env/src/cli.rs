//! CLI definition and flag validation

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use std::path::PathBuf;

/// vault2env - run a command with secrets from Vault in its environment
#[derive(Parser, Debug)]
#[command(name = "vault2env")]
#[command(version)]
#[command(about = "Run a command with secrets from Vault in its environment")]
#[command(long_about = "Run a command with secrets from Vault in its environment.\n\n\
    Every key given with --key is read from Vault and its fields are exported\n\
    to the command as environment variables. Anything the command prints on\n\
    stdout or stderr is scanned for those values and redacted before it\n\
    reaches the terminal.")]
#[command(after_help = "EXAMPLES:\n\
    vault2env -k secret/myapp -- ./server --port 8080\n\
    vault2env -k secret/aws -t access_key=AWS_KEY -o hash -- aws s3 ls\n\
    vault2env -k aws/sts/deploy --transform-set STS -- terraform apply\n\
    vault2env -k secret/myapp --export\n\n\
OBFUSCATION:\n\
    asterisk   replace secrets with ****\n\
    hash       replace secrets with sha256:<hex digest>\n\
    name       replace secrets with their variable name\n\
    none       disable redaction (unknown values behave like none)")]
pub struct Cli {
    /// Vault API address
    #[arg(long = "vault-addr", env = "VAULT_ADDR")]
    pub vault_addr: Option<String>,

    /// Token to authenticate with (defaults to ~/.vault-token)
    #[arg(long = "vault-token", env = "VAULT_TOKEN", hide_env_values = true)]
    pub vault_token: Option<String>,

    /// AppRole role ID to log in with
    #[arg(long = "vault-role-id", env = "VAULT_ROLE_ID")]
    pub role_id: Option<String>,

    /// Secret ID belonging to the AppRole
    #[arg(long = "vault-secret-id", env = "VAULT_SECRET_ID", hide_env_values = true)]
    pub secret_id: Option<String>,

    /// Keys to read and use for environment variables
    #[arg(short = 'k', long = "key", value_delimiter = ',')]
    pub keys: Vec<String>,

    /// Translate keys to different names (oldkey=newkey)
    #[arg(short = 't', long = "transform", value_delimiter = ',')]
    pub transforms: Vec<String>,

    /// Apply predefined transform sets (built-in: STS)
    #[arg(long = "transform-set", value_delimiter = ',')]
    pub transform_sets: Vec<String>,

    /// Type of obfuscation (none, asterisk, hash, name)
    #[arg(short = 'o', long = "obfuscate")]
    pub obfuscate: Option<String>,

    /// Print export statements instead of running a command
    #[arg(short = 'e', long = "export", default_value = "false")]
    pub export: bool,

    /// Verbosity of logs (trace, debug, info, warning, error); RUST_LOG wins when set
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,

    /// Config file (default: ~/.config/vault2env/config.toml)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Command to run with secrets in its environment
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl Cli {
    /// Check flag combinations that clap can't express
    pub fn validate(&self) -> Result<()> {
        if self.keys.iter().all(|k| k.trim().is_empty()) {
            bail!("no --key parameters specified");
        }

        if !self.export && self.command.is_empty() {
            bail!("no command specified");
        }

        Ok(())
    }

    /// Requested keys with blanks removed
    pub fn keys(&self) -> Vec<&str> {
        self.keys
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect()
    }
}

/// Turn a `--log-level` value into a tracing filter directive
pub fn parse_log_level(level: &str) -> Result<tracing::Level> {
    let normalized = match level.trim().to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "fatal" | "panic" => "error".to_string(),
        other => other.to_string(),
    };

    normalized
        .parse::<tracing::Level>()
        .map_err(|_| anyhow!("parsing log-level: unknown level {:?}", level))
}
