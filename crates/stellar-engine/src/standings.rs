//! Elimination and victory evaluation.
//!
//! Elimination is planet-count based and waits out a 30-second grace period
//! after game start. Victory qualification checks both planet share and
//! territory share against the game's victory condition; among qualifiers
//! the highest share wins, with placement order as the deterministic
//! tiebreak.

use chrono::{DateTime, Duration, Utc};
use stellar_store::prelude::*;

use crate::TickResult;

/// No eliminations inside this window after game start.
const ELIMINATION_GRACE_SECS: i64 = 30;

/// A victory threshold crossing, ready for finalization.
#[derive(Debug, Clone)]
pub struct VictoryDecision {
    pub winner_id: PlayerId,
    pub victory_type: VictoryType,
    /// The winner's strongest share, in percent.
    pub winning_percentage: f64,
}

/// Phase 5: eliminate participants with zero planets. Returns how many were
/// eliminated this tick.
pub fn eliminate_defeated(
    store: &MemoryStore,
    game: &Game,
    now: DateTime<Utc>,
) -> TickResult<u64> {
    let Some(started_at) = game.started_at else {
        return Ok(0);
    };
    if now - started_at <= Duration::seconds(ELIMINATION_GRACE_SECS) {
        return Ok(0);
    }

    let planets = store.planets(game.id);
    let mut eliminated = 0;
    for gp in store.participants(game.id) {
        if !gp.is_alive || gp.is_eliminated {
            continue;
        }
        let holds_any = planets.iter().any(|p| p.owner_id == Some(gp.player_id));
        if !holds_any && store.eliminate_participant(game.id, gp.player_id, now)? {
            tracing::info!(
                game_id = %game.id,
                player_id = %gp.player_id,
                "participant eliminated"
            );
            eliminated += 1;
        }
    }
    Ok(eliminated)
}

/// Share of planets and territory held by one participant, in percent.
pub fn control_shares(
    player_id: PlayerId,
    planets: &[Planet],
    sectors: &[TerritorySector],
) -> (f64, f64) {
    let planet_pct = if planets.is_empty() {
        0.0
    } else {
        let owned = planets
            .iter()
            .filter(|p| p.owner_id == Some(player_id))
            .count();
        owned as f64 / planets.len() as f64 * 100.0
    };
    let territory_pct = if sectors.is_empty() {
        0.0
    } else {
        let owned = sectors
            .iter()
            .filter(|s| s.owner_id == Some(player_id))
            .count();
        owned as f64 / sectors.len() as f64 * 100.0
    };
    (planet_pct, territory_pct)
}

/// Phase 6: find the winner, if any participant crossed the victory
/// condition on either measure.
pub fn evaluate_victory(store: &MemoryStore, game: &Game) -> TickResult<Option<VictoryDecision>> {
    let planets = store.planets(game.id);
    let sectors = store.sectors(game.id);

    let mut best: Option<(f64, u32, VictoryDecision)> = None;
    for gp in store.participants(game.id) {
        let (planet_pct, territory_pct) = control_shares(gp.player_id, &planets, &sectors);
        if planet_pct < game.victory_condition && territory_pct < game.victory_condition {
            continue;
        }
        let score = planet_pct.max(territory_pct);
        let victory_type = if planet_pct >= territory_pct {
            VictoryType::PlanetControl
        } else {
            VictoryType::TerritoryControl
        };
        let candidate = VictoryDecision {
            winner_id: gp.player_id,
            victory_type,
            winning_percentage: score,
        };
        let better = match &best {
            None => true,
            // Highest share wins; placement order breaks ties.
            Some((best_score, best_order, _)) => {
                score > *best_score || (score == *best_score && gp.placement_order < *best_order)
            }
        };
        if better {
            best = Some((score, gp.placement_order, candidate));
        }
    }
    Ok(best.map(|(_, _, decision)| decision))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
