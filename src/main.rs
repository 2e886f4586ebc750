//! TPA Remote - interactive shell for SIBS payment terminals.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use directories::ProjectDirs;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;
use tpa_remote as app;
use uuid::Uuid;

use app::config::{AppConfig, ConfigLoadResult, LoggingConfig};
use app::models::{OperationResult, PurchaseResult};
use app::terminal::{Generation, TerminalClient};

/// Interactive client for SIBS payment terminals.
#[derive(Parser)]
#[command(name = "tpa-remote", version)]
struct Cli {
    /// Use config.toml from current directory (dev mode)
    #[arg(long)]
    dev: bool,

    /// Config file to load
    #[arg(long, conflicts_with = "dev")]
    config: Option<PathBuf>,

    /// Terminal host, overrides the config file
    #[arg(long)]
    host: Option<String>,

    /// Terminal port, overrides the config file
    #[arg(long)]
    port: Option<u16>,

    /// Protocol generation (legacy or current), overrides the config file
    #[arg(long)]
    generation: Option<Generation>,
}

const MENU: &str = "\
 1 - Terminal status
 2 - Open period
 3 - Close period
 4 - Purchase
 5 - Refund last purchase
 6 - Parse purchase response
 9998 - List commands
 9999 - Exit";

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Determine config path based on mode
    let config_path = match (&cli.config, cli.dev) {
        (Some(path), _) => path.clone(),
        (None, true) => PathBuf::from("config.toml"),
        (None, false) => AppConfig::default_path(),
    };

    let load_result = AppConfig::try_load(&config_path);
    let mut config = match &load_result {
        ConfigLoadResult::Loaded(config) => config.clone(),
        ConfigLoadResult::Missing => AppConfig::default(),
        ConfigLoadResult::Invalid(e) => {
            return Err(app::AppError::config(e.to_string()))
                .with_context(|| format!("Cannot use {}", config_path.display()));
        }
    };

    init_logging(&config.logging)?;
    tracing::info!("TPA Remote v{} starting...", env!("CARGO_PKG_VERSION"));
    tracing::info!("Config path: {:?}", config_path);

    if let ConfigLoadResult::Missing = load_result {
        tracing::info!("Config missing, writing defaults");
        if let Err(e) = config.save(&config_path) {
            tracing::warn!("Could not write default config: {}", e);
        }
    }

    if let Some(host) = cli.host {
        config.terminal.host = host;
    }
    if let Some(port) = cli.port {
        config.terminal.port = port;
    }
    if let Some(generation) = cli.generation {
        config.terminal.generation = generation;
    }
    if let Err(e) = config.validate() {
        bail!("Invalid settings: {e}");
    }

    let client = TerminalClient::from_config(&config.terminal)
        .with_observer(|command| tracing::info!("Message sent: {command}"));

    tracing::info!(
        "Terminal {}:{} ({:?} protocol)",
        config.terminal.host,
        config.terminal.port,
        client.generation()
    );

    Shell::new(client, config.terminal.print_receipt_on_pos).run()
}

/// Console plus daily rolling file output.
fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    let log_dir = logging
        .directory
        .clone()
        .or_else(|| ProjectDirs::from("pt", "sibs", "tpa-remote").map(|dirs| dirs.data_local_dir().join("logs")))
        .unwrap_or_else(|| PathBuf::from("logs"));
    std::fs::create_dir_all(&log_dir).with_context(|| format!("Cannot create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "tpa-remote.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialise logging")?;

    // The writer flushes on drop; the shell runs until process exit.
    std::mem::forget(guard);
    Ok(())
}

/// Operator menu loop.
struct Shell {
    client: TerminalClient,
    print_receipt_on_pos: bool,
    last_purchase: Option<PurchaseResult>,
}

impl Shell {
    fn new(client: TerminalClient, print_receipt_on_pos: bool) -> Self {
        Self {
            client,
            print_receipt_on_pos,
            last_purchase: None,
        }
    }

    fn run(mut self) -> anyhow::Result<()> {
        println!("{MENU}");

        loop {
            let Some(choice) = prompt("Command")? else {
                return Ok(());
            };

            match choice.as_str() {
                "1" => report(self.client.terminal_status()),
                "2" => report(self.client.open_period()),
                "3" => self.close_period()?,
                "4" => self.purchase()?,
                "5" => self.refund(),
                "6" => self.parse_response()?,
                "9998" => println!("{MENU}"),
                "9999" => return Ok(()),
                "" => {}
                other => println!("Unknown command '{other}'. Type 9998 for the list."),
            }
        }
    }

    fn close_period(&self) -> anyhow::Result<()> {
        // Only the legacy command carries a transaction id
        let transaction_id = match self.client.generation() {
            Generation::Legacy => {
                let (default_id, _) = suggested_purchase();
                let Some(transaction_id) = prompt(&format!("Transaction id [{default_id}]"))? else {
                    return Ok(());
                };
                if transaction_id.is_empty() { default_id } else { transaction_id }
            }
            Generation::Current => String::new(),
        };

        report(self.client.close_period(&transaction_id));
        Ok(())
    }

    fn purchase(&mut self) -> anyhow::Result<()> {
        let (default_id, default_amount) = suggested_purchase();
        let Some(transaction_id) = prompt(&format!("Transaction id [{default_id}]"))? else {
            return Ok(());
        };
        let Some(amount) = prompt(&format!("Amount in cents [{default_amount}]"))? else {
            return Ok(());
        };

        let transaction_id = if transaction_id.is_empty() { default_id } else { transaction_id };
        let amount = if amount.is_empty() { default_amount } else { amount };

        let result = self.client.purchase(&transaction_id, &amount, self.print_receipt_on_pos);
        if let Some(purchase) = result.as_ref().ok().and_then(OperationResult::purchase) {
            self.last_purchase = Some(purchase.clone());
        }
        report(result);
        Ok(())
    }

    fn refund(&mut self) {
        let Some(purchase) = &self.last_purchase else {
            println!("No successful purchase to refund.");
            return;
        };

        let result = self.client.refund(purchase, self.print_receipt_on_pos);
        if result.as_ref().is_ok_and(|outcome| outcome.success) {
            self.last_purchase = None;
        }
        report(result);
    }

    fn parse_response(&self) -> anyhow::Result<()> {
        let Some(message) = prompt("Purchase response")? else {
            return Ok(());
        };
        print_json(&self.client.parse_purchase_response(self.print_receipt_on_pos, &message));
        Ok(())
    }
}

/// Random transaction id (1000-9999) and amount (1-199 cents) proposed for a test purchase.
fn suggested_purchase() -> (String, String) {
    let random = Uuid::new_v4().as_u128();
    let transaction_id = 1000 + random % 9000;
    let amount = 1 + (random >> 64) % 199;
    (transaction_id.to_string(), format!("{amount:08}"))
}

/// Read one trimmed line. `None` at end of input.
fn prompt(label: &str) -> anyhow::Result<Option<String>> {
    print!("{label}: ");
    io::stdout().flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn report(result: app::Result<OperationResult>) {
    match result {
        Ok(outcome) => print_json(&outcome),
        Err(e) => println!("{}: {}", e.kind(), e),
    }
}

fn print_json(outcome: &OperationResult) {
    match serde_json::to_string_pretty(outcome) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!("Cannot render result: {}", e),
    }
}
