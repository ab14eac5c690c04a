//! Presence gating: abandonment detection and host promotion.
//!
//! Runs at the top of every tick, for waiting games as well as active ones.
//! A game whose participants have all been silent for five minutes is
//! abandoned outright. An active game whose host has gone quiet promotes the
//! next active participant, reshuffling placement orders deterministically.

use chrono::{DateTime, Duration, Utc};
use stellar_store::prelude::*;

use crate::TickResult;

/// A participant counts as present within this window.
const ACTIVE_WINDOW_SECS: i64 = 60;
/// Universal silence for this long abandons the game.
const ABANDONMENT_WINDOW_SECS: i64 = 5 * 60;

/// What the presence check decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceOutcome {
    /// Proceed with the tick.
    Continue,
    /// The game was just abandoned; the tick stops here.
    Abandoned,
}

/// Phase 0 presence check. May transition the game to
/// `completed/abandoned`, and may rewrite placement orders for a host
/// promotion.
pub fn check(store: &MemoryStore, game: &Game, now: DateTime<Utc>) -> TickResult<PresenceOutcome> {
    let participants = store.participants(game.id);
    if participants.is_empty() {
        return Ok(PresenceOutcome::Continue);
    }

    let silence_cutoff = now - Duration::seconds(ABANDONMENT_WINDOW_SECS);
    if participants.iter().all(|p| p.last_seen < silence_cutoff) {
        if store.abandon_game_if_open(game.id, now)? {
            tracing::info!(game_id = %game.id, "game abandoned after universal inactivity");
            return Ok(PresenceOutcome::Abandoned);
        }
        return Ok(PresenceOutcome::Continue);
    }

    if game.status == GameStatus::Active {
        promote_host_if_idle(store, game, &participants, now)?;
    }
    Ok(PresenceOutcome::Continue)
}

fn is_present(gp: &GamePlayer, now: DateTime<Utc>) -> bool {
    gp.is_active && gp.last_seen >= now - Duration::seconds(ACTIVE_WINDOW_SECS)
}

/// If the host (lowest placement order) is idle, the next present
/// participant becomes host: they move to order 1 and everyone else shifts
/// up behind them, relative order preserved.
fn promote_host_if_idle(
    store: &MemoryStore,
    game: &Game,
    participants: &[GamePlayer],
    now: DateTime<Utc>,
) -> TickResult<()> {
    let host = &participants[0];
    if is_present(host, now) {
        return Ok(());
    }
    let Some(new_host) = participants.iter().find(|p| is_present(p, now)) else {
        return Ok(());
    };

    let mut order: Vec<PlayerId> = vec![new_host.player_id];
    order.extend(
        participants
            .iter()
            .filter(|p| p.player_id != new_host.player_id)
            .map(|p| p.player_id),
    );
    let assignments: Vec<(PlayerId, u32)> = order
        .into_iter()
        .enumerate()
        .map(|(i, id)| (id, i as u32 + 1))
        .collect();

    store.set_placement_orders(game.id, &assignments)?;
    tracing::info!(
        game_id = %game.id,
        new_host = %new_host.player_id,
        "promoted new host after host inactivity"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
