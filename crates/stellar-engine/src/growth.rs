//! Garrison growth: the S-curve that fills every owned planet toward its
//! effective cap.
//!
//! Growth is front-loaded for small garrisons (a bare planet gains 10 troops
//! per tick) and tapers linearly to zero as the garrison approaches
//! `effective_max = 500 + 100 per colony-station level`. The clamp, not the
//! raw formula, is what guarantees the cap.

use stellar_store::prelude::*;
use stellar_store::rows::{BASE_TROOP_CAP, TROOP_CAP_PER_COLONY_LEVEL};

use crate::TickResult;

/// Garrison cap of a planet given the structures sitting on it: 500 plus
/// 100 per active colony-station level.
pub fn effective_max_troops(structures: &[Structure]) -> i64 {
    let colony_levels: i64 = structures
        .iter()
        .filter(|s| s.is_active && s.structure_type == StructureType::ColonyStation)
        .map(|s| s.level as i64)
        .sum();
    BASE_TROOP_CAP + colony_levels * TROOP_CAP_PER_COLONY_LEVEL
}

/// Troops gained this tick by a garrison of `troops` with cap `max`.
///
/// `(10 + troops^0.73 / 4) * max(0, 1 - troops/max)` -- 10 at zero, 0 at the
/// cap, saturating in between.
pub fn growth_amount(troops: i64, max: i64) -> f64 {
    let t = troops as f64;
    let base = 10.0 + t.powf(0.73) / 4.0;
    let headroom = (1.0 - t / max as f64).max(0.0);
    base * headroom
}

/// Phase 2: grow every owned planet of the game. Returns the number of
/// owned planets processed.
pub fn grow_garrisons(store: &MemoryStore, game_id: GameId) -> TickResult<u64> {
    let mut processed = 0;
    for planet in store.planets(game_id) {
        if planet.owner_id.is_none() {
            continue;
        }
        processed += 1;

        let max = effective_max_troops(&store.structures_on_planet(planet.id));
        if planet.troop_count >= max {
            continue;
        }
        let grown = (planet.troop_count as f64 + growth_amount(planet.troop_count, max)).floor()
            as i64;
        store.set_planet_troops(planet.id, grown.min(max))?;
    }
    Ok(processed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
