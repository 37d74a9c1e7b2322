use clap::Parser;
use client::network;
use log::info;
use shared::AccountId;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:9000")]
    server: String,

    /// Join this session instead of creating a new one
    #[arg(long)]
    session: Option<String>,

    /// Display name sent to the relay
    #[arg(short = 'u', long, default_value = "autopilot")]
    username: String,

    /// Account id reported with match results
    #[arg(long)]
    user_id: Option<u64>,

    /// Milliseconds between autopilot steps
    #[arg(short = 't', long, default_value = "100")]
    tick_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let server_url = if args.server.starts_with("ws://") || args.server.starts_with("wss://") {
        args.server
    } else {
        format!("ws://{}", args.server)
    };

    let config = network::ClientConfig {
        server_url,
        session: args.session,
        username: Some(args.username),
        user_id: args.user_id.map(AccountId::Number),
        tick: Duration::from_millis(args.tick_ms),
        seed: rand::random(),
    };

    info!("Starting client...");
    let mut client = network::Client::new(config);
    match client.run().await? {
        Some(outcome) => info!(
            "Match over: {} ({}) beat {} ({})",
            outcome.winner.username.as_deref().unwrap_or(&outcome.winner.id),
            outcome.winner.score,
            outcome.loser.username.as_deref().unwrap_or(&outcome.loser.id),
            outcome.loser.score
        ),
        None => info!("Disconnected before the match was decided"),
    }

    Ok(())
}
