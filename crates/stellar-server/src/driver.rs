//! The tick driver: fire-and-forget periodic invocation of the tick per
//! active game.
//!
//! A scan loop discovers newly active games and spawns one driving task
//! each, ticking at the game's own `tick_rate_ms`. Missed intervals are
//! skipped rather than bursted; an overlap with an external `/tick` call is
//! harmless because the engine serializes through the store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;

use stellar_engine::prelude::*;
use stellar_store::prelude::*;

/// How often the scan loop looks for newly active games.
const SCAN_INTERVAL_MS: u64 = 500;

/// Run the driver forever. Spawn this on the runtime next to the HTTP
/// server.
pub async fn run(store: Arc<MemoryStore>) {
    let mut driven: HashSet<GameId> = HashSet::new();
    let mut scan = tokio::time::interval(Duration::from_millis(SCAN_INTERVAL_MS));
    scan.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        scan.tick().await;
        for game_id in store.active_game_ids() {
            if driven.insert(game_id) {
                tracing::info!(game_id = %game_id, "driver picked up active game");
                tokio::spawn(drive_game(Arc::clone(&store), game_id));
            }
        }
    }
}

/// Tick one game at its configured rate until it reaches a terminal state.
pub async fn drive_game(store: Arc<MemoryStore>, game_id: GameId) {
    let tick_rate_ms = match store.game(game_id) {
        Ok(game) => game.tick_rate_ms.max(1) as u64,
        Err(e) => {
            tracing::error!(error = %e, game_id = %game_id, "driver cannot read game");
            return;
        }
    };

    let mut interval = tokio::time::interval(Duration::from_millis(tick_rate_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        match process_tick(&store, game_id, Utc::now()) {
            Ok(TickOutcome::Advanced { .. }) => {}
            Ok(TickOutcome::Completed { winner_id, .. }) => {
                tracing::info!(game_id = %game_id, winner_id = %winner_id, "driver: game completed");
                break;
            }
            Ok(TickOutcome::Skipped(SkipReason::AlreadyCompleted))
            | Ok(TickOutcome::Skipped(SkipReason::Abandoned)) => {
                tracing::info!(game_id = %game_id, "driver: game reached a terminal state");
                break;
            }
            Ok(TickOutcome::Skipped(SkipReason::NotActive)) => {
                // Reverted to waiting is not expected, but not fatal; the
                // scan loop will not re-add us, so stop driving.
                break;
            }
            Err(e) => {
                // Transient failures retry on the next interval; each phase
                // re-reads, so no state was corrupted.
                tracing::error!(error = %e, game_id = %game_id, "tick failed, retrying next interval");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
