use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

mod config;

use brokergate_api::state::AppState;
use brokergate_brokers_rest::RestBrokerFactory;
use brokergate_core::{BrokerFactory, ReportRequest};
use brokergate_credentials::FileCredentialStore;
use brokergate_reports::{ReportCache, ReportPollerConfig, ReportService};
use config::AppConfig;

#[derive(Parser)]
#[command(name = "brokergate")]
#[command(about = "Broker-integration backend: reports, credentials, order-book tooling")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// TOML configuration file
    #[arg(short, long, default_value = "brokergate.toml", env = "BROKERGATE_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Server {
        /// Bind address (overrides the config file)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Fetch the broker report for the selected credential and print it
    Report,

    /// Compact an order-book tick log into per-minute buckets
    Compact {
        /// Tick log to read
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Destination for the compacted map
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage broker tokens
    Tokens {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// List stored tokens
    List,

    /// Store a new token
    Add {
        #[arg(short, long)]
        token: String,

        /// The token targets the sandbox environment
        #[arg(long)]
        sandbox: bool,
    },

    /// Delete a token
    Remove {
        #[arg(short, long)]
        token: String,
    },

    /// Make a token the selected one
    Select {
        #[arg(short, long)]
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    fmt().with_env_filter(filter).with_target(false).init();

    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Server { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let state = build_state(&config)?;
            brokergate_api::start_server(Arc::new(state), &bind).await?;
        }
        Commands::Report => {
            run_report(&config).await?;
        }
        Commands::Compact { input, output } => {
            let input = input.unwrap_or_else(|| config.files.order_book_log.clone());
            let output = output.unwrap_or_else(|| config.files.compacted_order_book.clone());
            let buckets = brokergate_data::compact_order_book_file(&input, &output)?;
            println!(
                "Compacted {} -> {} ({} buckets)",
                input.display(),
                output.display(),
                buckets
            );
        }
        Commands::Tokens { command } => {
            run_tokens(command, &config)?;
        }
    }

    Ok(())
}

fn build_state(config: &AppConfig) -> Result<AppState> {
    let credentials = FileCredentialStore::new(&config.files.tokens);
    let reports = ReportService::new(
        ReportCache::new(&config.files.broker_report_dir),
        ReportPollerConfig::default(),
    );
    let brokers = Arc::new(RestBrokerFactory::new(config.broker.clone())?);
    Ok(AppState::new(credentials, reports, brokers))
}

/// One-shot report fetch over the same path the endpoint uses.
async fn run_report(config: &AppConfig) -> Result<()> {
    let credentials = FileCredentialStore::new(&config.files.tokens);
    let Some(credential) = credentials.selected()? else {
        anyhow::bail!("No credential selected; add one with `brokergate tokens add`");
    };
    let Some(account_id) = credential.account_id.clone() else {
        anyhow::bail!("Selected credential has no account id");
    };

    let factory = RestBrokerFactory::new(config.broker.clone())?;
    let broker = factory.for_credential(&credential);
    let service = ReportService::new(
        ReportCache::new(&config.files.broker_report_dir),
        ReportPollerConfig::default(),
    );

    tracing::info!(is_sandbox = credential.is_sandbox, "Fetching broker report");
    let request = ReportRequest::last_30_days(account_id, credential.is_sandbox);
    match service.fetch(broker, request).await? {
        Some(body) => println!("{}", body),
        None => eprintln!("The broker abandoned the report task; nothing to print"),
    }
    Ok(())
}

fn run_tokens(command: TokenCommands, config: &AppConfig) -> Result<()> {
    let store = FileCredentialStore::new(&config.files.tokens);

    match command {
        TokenCommands::List => {
            let credentials = store.list()?;
            if credentials.is_empty() {
                println!("No tokens stored");
            }
            for credential in credentials {
                println!(
                    "{}{} ({}){}",
                    if credential.selected { "* " } else { "  " },
                    mask(&credential.token),
                    if credential.is_sandbox {
                        "sandbox"
                    } else {
                        "production"
                    },
                    credential
                        .account_id
                        .map(|id| format!(", account {}", id))
                        .unwrap_or_default()
                );
            }
        }
        TokenCommands::Add { token, sandbox } => {
            store.add(&token, sandbox)?;
            println!("Token stored");
        }
        TokenCommands::Remove { token } => {
            store.remove(&token)?;
            println!("Token removed");
        }
        TokenCommands::Select { token } => {
            store.select(&token)?;
            println!("Token selected");
        }
    }
    Ok(())
}

/// Tokens are secrets; only a short prefix ever reaches the terminal.
fn mask(token: &str) -> String {
    let head: String = token.chars().take(4).collect();
    format!("{}...", head)
}
