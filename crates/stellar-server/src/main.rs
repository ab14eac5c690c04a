//! Server binary: HTTP surface plus the tick driver.
//!
//! ```text
//! stellar-server --bind 127.0.0.1:8787 --demo-game
//! ```
//!
//! `--demo-game` seeds a two-bot galaxy and starts it immediately, which is
//! the quickest way to watch the engine run end to end.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;

use stellar_engine::prelude::*;
use stellar_server::{api, driver};
use stellar_store::prelude::*;

#[derive(Debug, Parser)]
#[command(name = "stellar-server", about = "Authoritative tick server")]
struct Args {
    /// Address to bind the HTTP server on.
    #[arg(long, default_value = "127.0.0.1:8787")]
    bind: SocketAddr,

    /// Seed and start a two-bot demo game at boot.
    #[arg(long)]
    demo_game: bool,

    /// Disable the built-in tick driver (ticks only via POST /tick).
    #[arg(long)]
    no_driver: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let store = Arc::new(MemoryStore::new());

    if args.demo_game {
        let game_id = seed_demo_game(&store)?;
        tracing::info!(game_id = %game_id, "demo game seeded and started");
    }

    if !args.no_driver {
        tokio::spawn(driver::run(Arc::clone(&store)));
    }

    let app = api::router(Arc::clone(&store));
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(addr = %args.bind, "stellar server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Two hard bots on a default galaxy, started immediately.
fn seed_demo_game(store: &MemoryStore) -> anyhow::Result<GameId> {
    let now = Utc::now();
    let game = Game::new(2);
    let game_id = game.id;
    store.insert_game(game)?;

    let mut bot_ids = Vec::new();
    for (i, color) in ["#bf616a", "#5e81ac"].iter().enumerate() {
        let mut bot = Player::bot(format!("demo-bot-{i}"), BotDifficulty::Hard);
        bot.credits = 60_000;
        let bot_id = bot.id;
        store.insert_player(bot)?;
        store.insert_game_player(GamePlayer::new(game_id, bot_id, *color, i as u32 + 1, now))?;
        bot_ids.push(bot_id);
    }

    generate_galaxy(store, game_id, &bot_ids, &GalaxyConfig::default())?;
    store.init_game_tick(game_id)?;
    store.start_game(game_id, now)?;
    Ok(game_id)
}
