use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use voicelive_assistant::core::audio::CpalBackend;
use voicelive_assistant::tools::{
    SyntheticBilling, ToolContext, builtin_implementations, knowledge_search,
};
use voicelive_assistant::{
    AssistantConfig, SessionClient, SessionState, ToolRegistry, ToolsConfig, TranscriptRole,
};

/// Voice call-center assistant over Azure Voice Live
#[derive(Parser, Debug)]
#[command(name = "voicelive-assistant")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to tool configuration file (YAML)
    #[arg(short = 't', long = "tools-config", value_name = "FILE")]
    tools_config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let config = if let Some(config_path) = cli.config {
        println!("Loading configuration from {}", config_path.display());
        AssistantConfig::from_file(&config_path)?
    } else {
        AssistantConfig::from_env()?
    };

    let tools_config = match cli.tools_config.or_else(|| config.tools_config_path.clone()) {
        Some(path) => ToolsConfig::from_file(&path)?,
        None => {
            warn!("No tool configuration given, starting without function tools");
            ToolsConfig::default()
        }
    };
    info!("Tool environment: {:?}", tools_config.environment_info());

    let context = Arc::new(ToolContext {
        knowledge: knowledge_search(config.search.as_ref()),
        billing: Arc::new(SyntheticBilling::new()),
    });
    let registry = ToolRegistry::from_config(&tools_config, &builtin_implementations(context));

    let mut client = SessionClient::new(config, registry, Arc::new(CpalBackend::new()));

    client.on_transcript(Arc::new(|transcript| {
        Box::pin(async move {
            match transcript.role {
                TranscriptRole::User => println!("You: {}", transcript.text),
                TranscriptRole::Assistant => println!("Assistant: {}", transcript.text),
            }
        })
    }));

    let mut states = client.state_watch();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            match state {
                SessionState::Ready => {
                    println!("Voice assistant ready! Start speaking...");
                    println!("Press Ctrl+C to exit");
                }
                SessionState::Interrupted => println!("Listening..."),
                SessionState::Streaming => println!("Processing..."),
                _ => {}
            }
        }
    });

    let shutdown = client.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            shutdown.cancel();
        }
    });

    client.run().await?;

    println!("Voice assistant shut down. Goodbye!");
    Ok(())
}
