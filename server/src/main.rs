use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::{NetworkEvent, Server};
use server::persistence::{JsonLinesRecorder, LogRecorder, MatchRecorder};
use std::path::PathBuf;
use std::time::Duration;

/// Command line arguments for the match relay
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "9000")]
    port: u16,
    /// Maximum number of concurrent connections
    #[clap(short, long, default_value = "256")]
    max_clients: usize,
    /// Seconds between a match ending and its players returning to the lobby
    #[clap(short, long, default_value = "5")]
    grace_secs: u64,
    /// Start a match as soon as two players wait in the lobby
    #[clap(long)]
    auto_start: bool,
    /// Append finished matches to this file as JSON lines
    #[clap(long)]
    record_file: Option<PathBuf>,
    /// Board width for matches started from the lobby
    #[clap(long, default_value = "12")]
    arena_width: usize,
    /// Board height for matches started from the lobby
    #[clap(long, default_value = "20")]
    arena_height: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        max_clients: args.max_clients,
        grace_delay: Duration::from_secs(args.grace_secs),
        auto_start: args.auto_start,
        arena_width: args.arena_width,
        arena_height: args.arena_height,
        record_file: args.record_file,
    };

    let recorder: Box<dyn MatchRecorder> = match &config.record_file {
        Some(path) => {
            info!("Recording matches to {}", path.display());
            Box::new(JsonLinesRecorder::new(path))
        }
        None => Box::new(LogRecorder),
    };

    let server = Server::new(config, recorder).await?;
    let shutdown = server.event_sender();
    let server_handle = tokio::spawn(server.run());

    // Handle shutdown gracefully
    tokio::select! {
        result = server_handle => {
            match result {
                Ok(Err(e)) => error!("Server stopped with error: {}", e),
                Err(e) => error!("Server task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            let _ = shutdown.send(NetworkEvent::Shutdown);
        }
    }

    Ok(())
}
