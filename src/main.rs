use std::ffi::OsString;
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lockbox::config::{default_config_path, ResolvedConfig};
use lockbox::crypto::CryptoGateway;
use lockbox::duration::{format_duration, parse_duration};
use lockbox::exposure::{
    Clipboard, CommandClipboard, DetachedProcessScheduler, ExposureSink, FileLedger,
};
use lockbox::{CredentialRecord, Retriever, Vault};
use secrecy::{ExposeSecret, SecretString};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "lockbox")]
#[command(about = "Encrypted local credential store")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Use this store file instead of the configured one
    #[arg(long, global = true, value_name = "PATH")]
    store: Option<PathBuf>,

    /// How long a retrieved secret stays on the clipboard (e.g. "45s", "2m")
    #[arg(long, global = true, value_name = "DURATION", value_parser = parse_duration_arg)]
    ttl: Option<Duration>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a credential; the secret is read from the terminal
    Add { service: String, username: String },

    /// Copy a credential's secret to the clipboard and print its username
    Get { service: String },

    /// List stored services
    #[command(alias = "ls")]
    List,

    /// Remove every credential for a service
    #[command(alias = "rm")]
    Delete { service: String },

    /// Show current configuration
    Config,

    /// Clear the clipboard after a delay if no newer secret was copied
    #[command(hide = true)]
    Revoke {
        #[arg(long)]
        generation: u64,

        #[arg(long, value_parser = parse_duration_arg)]
        after: Duration,
    },
}

fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn open_vault(config: &ResolvedConfig) -> Result<Vault> {
    let gateway: Arc<dyn CryptoGateway> = Arc::from(config.crypto.build(&config.config_dir));
    gateway.check_dependencies()?;
    Ok(Vault::new(&config.store_path, gateway))
}

fn clipboard(config: &ResolvedConfig) -> Result<Arc<dyn Clipboard>> {
    let clipboard = match &config.exposure.clipboard_command {
        Some(command) => CommandClipboard::from_command_line(command)?,
        None => CommandClipboard::detect()?,
    };
    clipboard.check_available()?;
    Ok(Arc::new(clipboard))
}

fn exposure_sink(config: &ResolvedConfig) -> Result<ExposureSink> {
    let ledger = FileLedger::new(FileLedger::default_path()?);
    Ok(ExposureSink::new(clipboard(config)?, Arc::new(ledger)))
}

fn read_secret(service: &str) -> Result<SecretString> {
    if std::io::stdin().is_terminal() {
        let secret = dialoguer::Password::new()
            .with_prompt(format!("Secret for {service}"))
            .with_confirmation("Confirm secret", "Secrets do not match")
            .interact()
            .context("Failed to read secret")?;
        return Ok(SecretString::from(secret));
    }

    // Non-interactive: first line of stdin.
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read secret from stdin")?;
    let secret = SecretString::from(line.trim_end_matches(['\n', '\r']).to_string());
    zeroize::Zeroize::zeroize(&mut line);

    if secret.expose_secret().is_empty() {
        anyhow::bail!("Secret must not be empty");
    }
    Ok(secret)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let mut config = ResolvedConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load lockbox config: {}", cli.config.display()))?;

    if let Some(store) = cli.store {
        config.store_path = store;
    }
    if let Some(ttl) = cli.ttl {
        if ttl.is_zero() {
            anyhow::bail!("--ttl must be greater than zero");
        }
        config.exposure.ttl = ttl;
    }

    match cli.command {
        Command::Add { service, username } => {
            CredentialRecord::check_fields(&service, &username)?;
            let vault = open_vault(&config)?;
            let secret = read_secret(&service)?;
            vault.add(CredentialRecord::new(service.clone(), username, secret)?)?;
            println!("Stored credential for {service}");
        }
        Command::Get { service } => {
            let vault = open_vault(&config)?;
            let sink = exposure_sink(&config)?;
            let scheduler = DetachedProcessScheduler::current_exe(vec![
                OsString::from("--config"),
                config.config_path.clone().into_os_string(),
            ])?;
            let retriever = Retriever::new(vault, sink, Arc::new(scheduler), config.exposure.ttl);

            let (username, handle) = retriever.retrieve(&service)?;
            println!("{username}");
            eprintln!(
                "Copied secret for {service} to clipboard; clears in {}.",
                format_duration(handle.ttl)
            );
        }
        Command::List => {
            let vault = open_vault(&config)?;
            for service in vault.list_services()? {
                println!("{service}");
            }
        }
        Command::Delete { service } => {
            let vault = open_vault(&config)?;
            let removed = vault.delete(&service)?;
            println!("Removed {removed} credential(s) for {service}");
        }
        Command::Config => {
            println!("Config file: {}", config.config_path.display());
            println!("Store file: {}", config.store_path.display());
            println!("Crypto backend: {}", config.crypto.backend_name());
            println!("Clipboard TTL: {}", format_duration(config.exposure.ttl));
            println!(
                "Clipboard command: {}",
                config
                    .exposure
                    .clipboard_command
                    .as_deref()
                    .unwrap_or("auto-detect")
            );
        }
        Command::Revoke { generation, after } => {
            let sink = exposure_sink(&config)?;
            tokio::time::sleep(after).await;
            sink.revoke_if_current(generation)?;
        }
    }

    Ok(())
}
