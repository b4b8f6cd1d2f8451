use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use rmcp::ServiceExt;
use tokio_util::sync::CancellationToken;

use mnemo_core::chatbot::Chatbot;
use mnemo_core::config::{Config, API_KEY_ENV};
use mnemo_core::llm::OpenAiClient;
use mnemo_core::mcp::MnemoServer;
use mnemo_core::readiness;
use mnemo_core::repl;
use mnemo_core::server::{self, AppState};
use mnemo_core::setup;

#[derive(Parser)]
#[command(name = "mnemo", about = "Chat assistant with long-term memory")]
struct Cli {
    /// Config file (default: ~/.mnemo/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat in the terminal
    Chat,
    /// Serve the web chat UI
    Serve {
        /// Bind host (overrides server.host)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create the database schema and seed the user row
    Setup,
    /// Expose the assistant's memory tools over MCP (stdio)
    Mcp,
    /// Production-readiness smoke test
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Keep the terminal REPL quiet unless RUST_LOG asks for more.
    let level = match cli.command {
        Command::Chat | Command::Check => "warn",
        _ => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("mnemo={level}").parse()?)
                .add_directive(format!("mnemo_core={level}").parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };

    match cli.command {
        Command::Check => {
            let api_key = Config::api_key();
            let report = readiness::run_checks(&config_path, api_key.as_deref());
            print!("{}", report.render());
            if !report.passed() {
                std::process::exit(1);
            }
            println!("\nYour chatbot is ready for production!");
            Ok(())
        }
        Command::Setup => {
            let cfg = Config::load_or_default(&config_path)?;
            setup::prepare_database(&cfg.directories.db_path)?;
            println!("Database tables created successfully at {}", cfg.directories.db_path.display());
            println!("The database is now ready for use with your chatbot.");
            Ok(())
        }
        Command::Chat => {
            let cfg = Config::load_or_default(&config_path)?;
            tokio::task::spawn_blocking(move || run_repl(&cfg))
                .await
                .context("chat loop panicked")?
        }
        Command::Serve { host, port } => {
            let cfg = Config::load_or_default(&config_path)?;
            let host = host.unwrap_or_else(|| cfg.server.host.clone());
            let port = port.unwrap_or(cfg.server.port);
            let db_path = cfg.directories.db_path.clone();
            let chatbot = build_chatbot(&cfg)?;

            let state = AppState {
                chatbot: Arc::new(Mutex::new(chatbot)),
                db_path,
            };
            let ct = CancellationToken::new();
            {
                let ct = ct.clone();
                tokio::spawn(async move {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!(error = %e, "failed to install CTRL+C handler");
                    }
                    ct.cancel();
                });
            }
            server::serve(state, &format!("{host}:{port}"), ct).await
        }
        Command::Mcp => {
            let cfg = Config::load_or_default(&config_path)?;
            let chatbot = build_chatbot(&cfg)?;
            tracing::info!("serving MCP over stdio");
            let server = MnemoServer::new(Arc::new(Mutex::new(chatbot)));
            let running = server.serve(rmcp::transport::stdio()).await?;
            running.waiting().await?;
            Ok(())
        }
    }
}

fn build_chatbot(cfg: &Config) -> anyhow::Result<Chatbot> {
    let api_key = Config::api_key().ok_or_else(|| anyhow!("{API_KEY_ENV} is not set"))?;
    let timeout = Duration::from_secs(cfg.llm.request_timeout_secs);
    let client = OpenAiClient::new(api_key, &cfg.api_base(), timeout)?;
    let db = setup::prepare_database(&cfg.directories.db_path)?;
    Chatbot::new(cfg.clone(), db, Box::new(client))
}

fn run_repl(cfg: &Config) -> anyhow::Result<()> {
    let mut chatbot = build_chatbot(cfg)?;
    let stdin = io::stdin();
    repl::run_repl(&mut chatbot, stdin.lock(), io::stdout())
}
