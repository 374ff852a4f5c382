//! `sse-tail`: follow a Server-Sent-Events stream from the command line.
//!
//! Events are printed to stdout as JSON lines (or as decoded generation
//! output with `--content`); logs and the final metrics go to stderr.

use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;

use resilient_sse::config::{load_config, validate_config, ConfigError, TailConfig};
use resilient_sse::observability::{logging, metrics};
use resilient_sse::{GenerationEvent, SseClient};

#[derive(Parser, Debug)]
#[command(name = "sse-tail")]
#[command(
    about = "Follow a Server-Sent-Events stream with automatic reconnection",
    long_about = None
)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stream URL, overriding the configuration file
    #[arg(short, long)]
    url: Option<String>,

    /// API key sent as a bearer token
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// Decode payloads as content-generation chunks
    #[arg(long)]
    content: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => TailConfig::default(),
    };
    if let Some(url) = cli.url {
        config.stream.url = url;
    }
    if let Some(key) = &cli.api_key {
        config
            .stream
            .headers
            .insert("Authorization".to_string(), format!("Bearer {}", key));
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability)?;
    tracing::info!("sse-tail v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    tracing::info!(
        url = %config.stream.url,
        max_reconnect_attempts = config.stream.max_reconnect_attempts,
        buffer_size = config.stream.buffer_size,
        "Configuration loaded"
    );

    let client = SseClient::with_http(config.stream.clone())?;
    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();

    let decode = cli.content;
    client.on_message(move |message| async move {
        if decode {
            print_generation_event(&GenerationEvent::from_message(&message));
        } else {
            match serde_json::to_string(&message) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::error!(error = %e, "Failed to encode message"),
            }
        }
        Ok(())
    });
    client.on_error(move |err| {
        if err.is_fatal() {
            let _ = fatal_tx.send(err.to_string());
        }
    });
    client.on_state_change(|state| tracing::info!(state = %state, "Connection state changed"));

    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
            Ok(())
        }
        result = follow(&client, &mut fatal_rx) => result,
    };

    client.disconnect();
    eprintln!("{}", serde_json::to_string_pretty(&client.metrics())?);

    if let Err(reason) = outcome {
        tracing::error!(reason = %reason, "Stream failed");
        return Err(reason.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Connect, then wait until the client reports a fatal error.
async fn follow(
    client: &SseClient,
    fatal: &mut mpsc::UnboundedReceiver<String>,
) -> Result<(), String> {
    client.connect().await.map_err(|e| e.to_string())?;

    match fatal.recv().await {
        Some(reason) => Err(reason),
        None => Ok(()),
    }
}

fn print_generation_event(event: &GenerationEvent) {
    match event {
        GenerationEvent::Token(chunk) => {
            if let Some(content) = &chunk.content {
                print!("{}", content);
                let _ = std::io::stdout().flush();
            }
        }
        GenerationEvent::Progress(chunk) => {
            if let Some(progress) = chunk.progress {
                eprintln!("[progress {}]", progress);
            }
        }
        GenerationEvent::Complete(_) => {
            println!();
            eprintln!("[complete]");
        }
        GenerationEvent::Error(chunk) => {
            eprintln!("[error] {}", chunk.error.as_deref().unwrap_or("unknown error"));
        }
        GenerationEvent::Other { event, chunk } => {
            eprintln!("[{}] {}", event, chunk.content.as_deref().unwrap_or_default());
        }
    }
}
