//! vault2env - run a command with secrets from Vault in its environment
//!
//! Flow:
//! - authenticate (token flag, AppRole, or ~/.vault-token)
//! - read every --key and rename its fields through the transforms
//! - either print export statements, or run the command with the secrets in
//!   its environment and its output redacted

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs;
use std::path::Path;
use std::process::{ExitCode, Stdio};
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use vault2env::cli::{parse_log_level, Cli};
use vault2env::config::{Config, Settings};
use vault2env::vault::VaultClient;
use vault2env::{env, transform};
use vault2env_core::{exit_code, run_redacted, Paths, Redactor};

/// How the client got its token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    Token,
    AppRole,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;
    cli.validate()?;

    let paths = Paths::new();
    let config = match &cli.config {
        Some(path) => Config::load_file(path)?,
        None => Config::load(&paths.config_file())?,
    };
    let settings = Settings::resolve(&cli, &config)?;

    let mut client = VaultClient::new(&settings.vault_addr).context("creating vault client")?;
    let auth = authenticate(&mut client, &cli, &paths).await?;

    let result = run(&cli, &config, &settings, &client).await;

    if auth == Auth::AppRole {
        if let Err(e) = client.revoke_self().await {
            error!("revoking approle-token: {}", e);
        }
    }

    result
}

/// Log to stderr; RUST_LOG takes precedence over --log-level
fn init_logging(log_level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(parse_log_level(log_level)?.to_string()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

async fn authenticate(client: &mut VaultClient, cli: &Cli, paths: &Paths) -> Result<Auth> {
    if let Some(token) = non_empty(cli.vault_token.as_deref()) {
        client.set_token(token);
        return Ok(Auth::Token);
    }

    if let Some(role_id) = non_empty(cli.role_id.as_deref()) {
        client
            .login_approle(role_id, non_empty(cli.secret_id.as_deref()))
            .await
            .context("fetching authentication token")?;
        return Ok(Auth::AppRole);
    }

    if let Some(token) = read_token_file(&paths.vault_token_file()) {
        debug!("using token from {:?}", paths.vault_token_file());
        client.set_token(&token);
        return Ok(Auth::Token);
    }

    bail!(
        "Did not find any authentication method. Try one of these:\n\
         - Specify `--vault-token` for token based authentication\n\
         - Specify `--vault-role-id` and optionally `--vault-secret-id` for AppRole authentication"
    );
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Token left behind by `vault login`, if any
fn read_token_file(path: &Path) -> Option<String> {
    let token = fs::read_to_string(path).ok()?;
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

async fn run(
    cli: &Cli,
    config: &Config,
    settings: &Settings,
    client: &VaultClient,
) -> Result<ExitCode> {
    let transforms = transform::resolve(
        &cli.transforms,
        &cli.transform_sets,
        &config.transform_sets(),
    );

    let secrets = env::collect(client, &cli.keys(), &transforms).await?;
    info!("loaded {} variables from vault", secrets.len());

    if cli.export {
        for line in env::export_statements(&secrets) {
            println!("{}", line);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let Some((program, args)) = cli.command.split_first() else {
        bail!("no command specified");
    };

    let mut command = tokio::process::Command::new(program);
    command.args(args).envs(&secrets).stdin(Stdio::inherit());

    debug!("running {:?} with {} redaction", program, settings.mode);
    let redactor = Arc::new(Redactor::new(&secrets, settings.mode));
    let outcome = run_redacted(command, redactor, tokio::io::stdout(), tokio::io::stderr())
        .await
        .with_context(|| format!("running command {:?}", program))?;

    let code = exit_code(&outcome.status);
    if !outcome.status.success() {
        info!("command exited with {}", outcome.status);
    }

    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}
