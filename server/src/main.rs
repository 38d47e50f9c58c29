use clap::Parser;
use log::info;
use server::game::{GameConfig, GameState};
use server::level::Level;
use server::lobby::RoleMode;
use server::network::Server;
use shared::{MATCH_DURATION_SECS, MIN_PLAYERS};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value = "30")]
    tick_rate: u32,

    /// Maximum concurrent connections
    #[arg(long, default_value = "8")]
    max_clients: usize,

    /// Match length in seconds
    #[arg(short = 'd', long, default_value_t = MATCH_DURATION_SECS)]
    match_duration: f32,

    /// Players needed before a ready lobby starts the match
    #[arg(long, default_value_t = MIN_PLAYERS)]
    min_players: usize,

    /// How the Guardian is chosen
    #[arg(short, long, value_enum, default_value = "host-is-guardian")]
    role_mode: RoleMode,

    /// JSON level layout; the built-in house is used when omitted
    #[arg(short, long)]
    level: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let level = match &args.level {
        Some(path) => {
            info!("Loading level from {}", path.display());
            Level::load(path)?
        }
        None => Level::default_house(),
    };

    let config = GameConfig {
        match_duration: args.match_duration,
        min_players: args.min_players.max(1),
        role_mode: args.role_mode,
    };
    info!(
        "Match: {}s, {} players minimum, roles {:?}",
        config.match_duration, config.min_players, config.role_mode
    );

    let tick_duration = Duration::from_secs_f64(1.0 / args.tick_rate.max(1) as f64);
    let address = format!("{}:{}", args.host, args.port);

    let mut server = Server::new(
        &address,
        tick_duration,
        args.max_clients,
        GameState::new(config, level),
    )
    .await?;

    server.run().await?;

    Ok(())
}
