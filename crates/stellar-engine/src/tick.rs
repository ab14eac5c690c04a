//! The tick orchestrator: one invocation advances one game by one tick.
//!
//! Phase order is fixed: gate and presence, atomic tick increment, garrison
//! growth, attack resolution, territory expansion, elimination, victory
//! evaluation, finalization, resource generation, bot planners. Phases are
//! not transactional across each other -- every phase re-reads what it
//! needs, and invariants are re-established at phase boundaries. Wall-clock
//! time is sampled once per invocation and passed down, so every phase of
//! one tick agrees on `now`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use stellar_store::prelude::*;

use crate::finalize::{self, FinalizeOutcome};
use crate::presence::{self, PresenceOutcome};
use crate::standings;
use crate::{bots, combat, economy, growth, territory, TickResult};

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Work counters for one advanced tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickStats {
    pub planets_processed: u64,
    pub attacks_processed: u64,
    pub sectors_created: u64,
}

/// Why a tick invocation was a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The game is already `completed` (or this invocation lost the
    /// completion race).
    AlreadyCompleted,
    /// The game is not `active` (still waiting).
    NotActive,
    /// The presence check abandoned the game this invocation.
    Abandoned,
}

impl SkipReason {
    /// The wire message reported for this skip.
    pub fn message(self) -> &'static str {
        match self {
            SkipReason::AlreadyCompleted => "Game already completed",
            SkipReason::NotActive => "Game not active",
            SkipReason::Abandoned => "Game abandoned due to inactivity",
        }
    }
}

/// Result of one tick invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The game advanced by one tick.
    Advanced { tick: u64, stats: TickStats },
    /// This invocation completed the game.
    Completed {
        tick: u64,
        winner_id: PlayerId,
        winning_percentage: f64,
    },
    /// Nothing to do.
    Skipped(SkipReason),
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// Advance `game_id` by one tick.
///
/// Safe to call concurrently for the same game: the tick counter hands every
/// invocation a distinct number, attack settlements apply at most once, and
/// the completion update is guarded. Callers pass `now` so a whole
/// invocation shares one clock reading.
pub fn process_tick(
    store: &MemoryStore,
    game_id: GameId,
    now: DateTime<Utc>,
) -> TickResult<TickOutcome> {
    // Phase 0: gate on status, then presence.
    let game = store.game(game_id)?;
    if game.status == GameStatus::Completed {
        return Ok(TickOutcome::Skipped(SkipReason::AlreadyCompleted));
    }
    if presence::check(store, &game, now)? == PresenceOutcome::Abandoned {
        return Ok(TickOutcome::Skipped(SkipReason::Abandoned));
    }
    // Presence may have completed the game or reshuffled hosts; re-read.
    let game = store.game(game_id)?;
    match game.status {
        GameStatus::Active => {}
        GameStatus::Completed => return Ok(TickOutcome::Skipped(SkipReason::AlreadyCompleted)),
        GameStatus::Waiting => return Ok(TickOutcome::Skipped(SkipReason::NotActive)),
    }

    // Phase 1: the atomic increment that orders this invocation.
    let tick = next_tick(store, game_id, now)?;

    // Phase 2: garrison growth.
    let planets_processed = growth::grow_garrisons(store, game_id)?;

    // Phase 3: attack resolution.
    let attacks_processed = combat::resolve_due_attacks(store, &game, now)?;

    // Phase 4: territory expansion.
    let sectors_created = territory::expand_territory(store, &game, now, tick)?;

    // Phase 5: elimination.
    standings::eliminate_defeated(store, &game, now)?;

    // Phases 6 and 7: victory evaluation and guarded finalization. A
    // completed game is immutable, so a won completion ends the invocation
    // before income or bots can touch it.
    if let Some(decision) = standings::evaluate_victory(store, &game)? {
        return match finalize::complete_game(store, &game, &decision, now)? {
            FinalizeOutcome::Completed => Ok(TickOutcome::Completed {
                tick,
                winner_id: decision.winner_id,
                winning_percentage: decision.winning_percentage,
            }),
            FinalizeOutcome::RaceLost => Ok(TickOutcome::Skipped(SkipReason::AlreadyCompleted)),
        };
    }

    // Phase 8: resource generation.
    economy::generate_resources(store, &game, now)?;

    // Phase 9: bot planners.
    bots::run_planners(store, &game, now, tick)?;

    let stats = TickStats {
        planets_processed,
        attacks_processed,
        sectors_created,
    };
    tracing::debug!(
        game_id = %game_id,
        tick,
        planets = stats.planets_processed,
        attacks = stats.attacks_processed,
        sectors = stats.sectors_created,
        "tick advanced"
    );
    Ok(TickOutcome::Advanced { tick, stats })
}

/// The atomic increment, with the documented recovery: a missing counter row
/// is inserted once and the increment retried.
fn next_tick(store: &MemoryStore, game_id: GameId, now: DateTime<Utc>) -> TickResult<u64> {
    match store.increment_game_tick(game_id, now) {
        Ok(tick) => Ok(tick),
        Err(StoreError::TickCounterNotInitialized(_)) => {
            store.init_game_tick(game_id)?;
            Ok(store.increment_game_tick(game_id, now)?)
        }
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
