//! container-secrets - Encrypted secrets driver for container runtimes
//!
//! Usage:
//!   container-secrets <COMMAND> [STORE_ROOT]
//!
//! Commands:
//! - store: Encrypt stdin and store it as $SECRET_ID
//! - lookup: Write the decrypted $SECRET_ID to stdout
//! - delete: Remove $SECRET_ID
//! - list: Write every decrypted secret to stdout, one per line

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use secrets::{Command, CryptoOracle, DeleteOutcome, SecretId, SecretsVault, SystemdCreds, VaultError};
use secrets_core::Config;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "container-secrets")]
#[command(about = "Encrypted-at-rest secrets store for container runtimes")]
#[command(version)]
#[command(after_help = r#"COMMANDS:
    store     Encrypt stdin and save it under $SECRET_ID
    lookup    Print the decrypted value of $SECRET_ID
    delete    Remove $SECRET_ID from the store
    list      Print every decrypted secret, one per line

ENVIRONMENT:
    SECRET_ID                   Secret name (store, lookup, delete)
    CONTAINER_SECRETS_CONFIG    Config file location
    RUST_LOG                    Log filter for stderr diagnostics

SECURITY:
    - Values are encrypted with systemd-creds, bound to the secret name
    - Store lives in /var/lib/containers/storage/secrets/encrypted (0700)
    - 'list' prints every plaintext: treat its output as sensitive"#)]
struct Cli {
    /// Config file (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// One of: store, lookup, delete, list
    #[arg(value_name = "COMMAND")]
    command: Option<String>,

    /// Store directory (overrides the config file)
    #[arg(value_name = "STORE_ROOT")]
    store_root: Option<PathBuf>,
}

fn main() -> ExitCode {
    // stdout carries secret payloads; all diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let Some(command) = cli.command.as_deref() else {
        eprintln!("{}", Cli::command().render_usage());
        return ExitCode::FAILURE;
    };

    match run(&cli, command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, command: &str) -> Result<()> {
    let command: Command = command.parse()?;

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;
    let paths = config.store_paths(cli.store_root.as_deref());
    tracing::debug!(command = %command, root = %paths.root.display(), "starting");

    let oracle = SystemdCreds::new(config.oracle_program.as_str());
    let vault = SecretsVault::new(paths, config.lock_timeout(), oracle);
    vault.bootstrap().context("Failed to initialize secrets store")?;

    match command {
        Command::Store => cmd_store(&vault),
        Command::Lookup => cmd_lookup(&vault),
        Command::Delete => cmd_delete(&vault),
        Command::List => cmd_list(&vault),
    }
}

/// Encrypt stdin and store it
fn cmd_store<O: CryptoOracle>(vault: &SecretsVault<O>) -> Result<()> {
    let id = SecretId::from_env()?;

    let mut plaintext = Vec::new();
    io::stdin()
        .lock()
        .read_to_end(&mut plaintext)
        .context("Failed to read secret value from stdin")?;

    vault.store(&id, &plaintext)?;
    println!("Secret '{}' created successfully", id);

    Ok(())
}

/// Print a decrypted secret, byte for byte
fn cmd_lookup<O: CryptoOracle>(vault: &SecretsVault<O>) -> Result<()> {
    let id = SecretId::from_env()?;
    let value = vault.lookup(&id)?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(&value)?;
    stdout.flush()?;

    Ok(())
}

/// Delete a secret; a missing one is reported but not an error
fn cmd_delete<O: CryptoOracle>(vault: &SecretsVault<O>) -> Result<()> {
    let id = SecretId::from_env()?;

    match vault.delete(&id)? {
        DeleteOutcome::Deleted => println!("Secret '{}' deleted successfully", id),
        DeleteOutcome::NotFound => eprintln!("Secret '{}' not found", id),
    }

    Ok(())
}

/// Print every decrypted secret
fn cmd_list<O: CryptoOracle>(vault: &SecretsVault<O>) -> Result<()> {
    let values = vault.list()?;

    let mut stdout = io::stdout().lock();
    for value in values {
        stdout.write_all(&value)?;
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;

    Ok(())
}

/// Print an error the way every failure is surfaced: `<argv0> error: ...`
fn report(err: &anyhow::Error) {
    if let Some(VaultError::CryptoFailure { diagnostics, .. }) = err.downcast_ref::<VaultError>() {
        if !diagnostics.is_empty() {
            eprintln!("{}", diagnostics.trim_end());
        }
    }

    let program = std::env::args().next().unwrap_or_else(|| "container-secrets".to_string());
    eprintln!("{} error: {:#}", program, err);
}
