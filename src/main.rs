use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use gatekeeper::{chat, constants, web_server, InferenceClient, Locale, OllamaClient};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Game locale: "en" or "jp". Anything else falls back to "en".
    #[arg(long, global = true, env = "GATEKEEPER_LOCALE", default_value = "en")]
    locale: String,

    /// Ollama model to play against (defaults to qwen2:1.5b).
    #[arg(long, global = true, env = "GATEKEEPER_MODEL")]
    model: Option<String>,

    /// Base URL of the Ollama server (defaults to http://127.0.0.1:11434).
    #[arg(long, global = true, env = "OLLAMA_URL")]
    ollama_url: Option<String>,

    /// Sampling temperature for Gatekeeper replies.
    #[arg(long, global = true, env = "GATEKEEPER_TEMPERATURE", default_value_t = constants::DEFAULT_TEMPERATURE)]
    temperature: f32,
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the Gatekeeper chat widget over HTTP.
    Serve {
        #[arg(long, env = "GATEKEEPER_PORT", default_value_t = constants::DEFAULT_PORT, help = "Port for the web server.")]
        port: u16,
    },
    /// Play Gatekeeper in the terminal.
    Chat,
}

// The main entry point of the application, using tokio's async runtime
#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (OLLAMA_URL, GATEKEEPER_MODEL, ...)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g., RUST_LOG=info,gatekeeper=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("Gatekeeper starting with command: {:?}", cli.command);

    let locale = Locale::resolve(Some(cli.locale.as_str()));
    let client: Arc<dyn InferenceClient> = Arc::new(OllamaClient::new(
        cli.ollama_url
            .unwrap_or_else(|| constants::OLLAMA_URL.clone()),
        cli.model
            .unwrap_or_else(|| constants::GATEKEEPER_MODEL.clone()),
    ));

    match cli.command {
        Commands::Serve { port } => {
            info!(%locale, "Starting Gatekeeper web widget on port {}...", port);

            let server = web_server::start_web_server(port, client, cli.temperature, locale);
            tokio::pin!(server);

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, shutting down...");
                }
                res = &mut server => {
                    res.context("Web server stopped")?;
                }
            }
            info!("Shutdown complete.");
        }
        Commands::Chat => {
            info!(%locale, "Starting terminal session...");
            chat::run_terminal_chat(client, locale, cli.temperature)
                .await
                .context("Chat session failed")?;
            info!("Chat session finished.");
        }
    }

    Ok(())
}
