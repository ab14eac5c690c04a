//! Game finalization: the guarded completion update, final statistics, and
//! placements.
//!
//! Completion is won or lost atomically on the `status = 'active'` guard;
//! the loser of that race writes nothing. Stats insertion is an idempotent
//! upsert per `(game_id, player_id)`, so a failed or repeated finalization
//! pass converges instead of duplicating. A stats failure never rolls back
//! the completion -- the game is already over, and a later completion
//! re-entry fills the gap.

use chrono::{DateTime, Utc};
use stellar_store::prelude::*;

use crate::standings::{control_shares, VictoryDecision};
use crate::TickResult;

/// Result of a finalization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// This invocation completed the game and wrote the stats.
    Completed,
    /// A concurrent tick completed the game first; nothing was written.
    RaceLost,
}

/// Phase 7: complete the game for `decision.winner_id`.
pub fn complete_game(
    store: &MemoryStore,
    game: &Game,
    decision: &VictoryDecision,
    now: DateTime<Utc>,
) -> TickResult<FinalizeOutcome> {
    if !store.complete_game_if_active(
        game.id,
        Some(decision.winner_id),
        decision.victory_type,
        now,
    )? {
        return Ok(FinalizeOutcome::RaceLost);
    }
    tracing::info!(
        game_id = %game.id,
        winner_id = %decision.winner_id,
        victory_type = ?decision.victory_type,
        winning_percentage = decision.winning_percentage,
        "game completed"
    );

    // The completion stands even if the stats pass fails; the upsert makes a
    // later re-entry converge.
    if let Err(e) = write_final_stats(store, game.id) {
        tracing::error!(
            error = %e,
            game_id = %game.id,
            "stats finalization failed, leaving game completed"
        );
    }
    Ok(FinalizeOutcome::Completed)
}

/// Compute and upsert per-participant stats, then assign final placements by
/// territory share.
pub fn write_final_stats(store: &MemoryStore, game_id: GameId) -> TickResult<()> {
    let participants = store.participants(game_id);
    let planets = store.planets(game_id);
    let sectors = store.sectors(game_id);
    let logs = store.combat_logs(game_id);
    let attacks = store.attacks(game_id);
    let structures = store.structures(game_id);

    let mut ranked: Vec<(PlayerId, f64)> = Vec::with_capacity(participants.len());
    for gp in &participants {
        let id = gp.player_id;
        let (_, territory_pct) = control_shares(id, &planets, &sectors);

        let planets_controlled = planets.iter().filter(|p| p.owner_id == Some(id)).count() as u64;
        let troops_sent: i64 = attacks
            .iter()
            .filter(|a| a.attacker_id == id)
            .map(|a| a.troops)
            .sum();
        let planets_captured = logs
            .iter()
            .filter(|l| l.combat_result == CombatResult::AttackerVictory && l.attacker_id == id)
            .count() as u64;
        let combat_wins = logs
            .iter()
            .filter(|l| match l.combat_result {
                CombatResult::AttackerVictory => l.attacker_id == id,
                CombatResult::DefenderVictory => l.defender_id == Some(id),
                CombatResult::Retreat => false,
            })
            .count() as u64;
        let combat_losses = logs
            .iter()
            .filter(|l| match l.combat_result {
                CombatResult::AttackerVictory => l.defender_id == Some(id),
                CombatResult::DefenderVictory => l.attacker_id == id,
                CombatResult::Retreat => l.attacker_id == id,
            })
            .count() as u64;
        let structures_built = structures.iter().filter(|s| s.owner_id == id).count() as u64;

        store.upsert_game_stats(GameStats {
            game_id,
            player_id: id,
            planets_controlled,
            territory_percentage: territory_pct,
            troops_sent,
            planets_captured,
            combat_wins,
            combat_losses,
            structures_built,
            peak_territory_percentage: gp.peak_territory_percentage.max(territory_pct),
        })?;
        ranked.push((id, territory_pct));
    }

    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    for (place, (player_id, territory_pct)) in ranked.into_iter().enumerate() {
        store.set_final_result(game_id, player_id, place as u32 + 1, territory_pct)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
