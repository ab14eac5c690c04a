//! Territory expansion: breadth-first sector painting around owned planets.
//!
//! Each eligible planet grows its painted region one wave at a time. The
//! frontier is the outermost wave; every edge sector emits candidates on an
//! 8-azimuth ring, filtered by radius, density and collision caps. Cadence
//! and tier scale with how long the planet's territory has been held, so
//! consolidated planets paint wider and faster.

use chrono::{DateTime, Utc};
use stellar_store::prelude::*;

use crate::TickResult;

/// No expansion within this window after a (re)capture.
const CAPTURE_GUARD_MS: i64 = 1000;
/// Sector lattice unit; candidates step 1.5 units out from an edge.
const SECTOR_UNIT: f64 = 10.0;
const CANDIDATE_STEP: f64 = 1.5 * SECTOR_UNIT;
/// Density cap: fewer than this many sectors within [`DENSITY_RADIUS`].
const DENSITY_LIMIT: usize = 16;
const DENSITY_RADIUS: f64 = 30.0;
/// Collision cap: no sector within this range of a candidate.
const COLLISION_RADIUS: f64 = 10.0;
/// Hard ceiling on painted-region growth.
const MAX_PAINT_RADIUS: f64 = 200.0;

/// Tier parameters: `(tier, radius, sectors_per_wave)` by ownership age.
fn tier_for(ownership_age_ticks: i64) -> (u8, f64, usize) {
    if ownership_age_ticks <= 50 {
        (1, 20.0, 8)
    } else if ownership_age_ticks <= 150 {
        (2, 35.0, 16)
    } else {
        (3, 50.0, 24)
    }
}

/// Expansion interval in ticks for a planet. Later conditions override
/// earlier ones.
fn expansion_interval(planet: &Planet) -> u64 {
    let mut interval = 10;
    if planet.troop_count > 300 {
        interval = 8;
    }
    if planet.in_nebula {
        interval = 15;
    }
    if planet.has_minerals {
        interval = 7;
    }
    interval
}

/// Phase 4: expand territory around every owned planet. Returns the number
/// of sectors created.
pub fn expand_territory(
    store: &MemoryStore,
    game: &Game,
    now: DateTime<Utc>,
    tick: u64,
) -> TickResult<u64> {
    let mut created = 0;
    for planet in store.planets(game.id) {
        let Some(owner_id) = planet.owner_id else {
            continue;
        };
        match expand_planet(store, game, &planet, owner_id, now, tick) {
            Ok(n) => created += n,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    planet_id = %planet.id,
                    "territory expansion failed, retrying next tick"
                );
            }
        }
    }
    Ok(created)
}

fn expand_planet(
    store: &MemoryStore,
    game: &Game,
    planet: &Planet,
    owner_id: PlayerId,
    now: DateTime<Utc>,
    tick: u64,
) -> TickResult<u64> {
    let owned = store.sectors_controlled_by(planet.id);

    let ownership_age_ticks = match owned.iter().map(|s| s.captured_at).min() {
        Some(oldest) => {
            let held_ms = (now - oldest).num_milliseconds();
            // Freshly (re)captured territory settles before it spreads.
            if held_ms < CAPTURE_GUARD_MS {
                return Ok(0);
            }
            held_ms / game.tick_rate_ms.max(1)
        }
        None => 0,
    };

    let (tier, radius, sectors_per_wave) = tier_for(ownership_age_ticks);

    if ((owned.len() + 1) as f64).sqrt() * SECTOR_UNIT > MAX_PAINT_RADIUS {
        return Ok(0);
    }
    if tick % expansion_interval(planet) != 0 {
        return Ok(0);
    }

    let wave_max = owned.iter().map(|s| s.expansion_wave).max().unwrap_or(0);
    let edges: Vec<Position> = if owned.is_empty() {
        vec![planet.position]
    } else {
        owned
            .iter()
            .filter(|s| s.expansion_wave == wave_max)
            .map(|s| s.position)
            .collect()
    };
    let new_wave = wave_max + 1;

    let existing = store.sectors(game.id);
    let mut queued: Vec<(Position, f64)> = Vec::with_capacity(sectors_per_wave);

    'edges: for edge in &edges {
        for k in 0..8u32 {
            let theta = k as f64 * std::f64::consts::FRAC_PI_4;
            let candidate = Position::new(
                edge.x + CANDIDATE_STEP * theta.cos(),
                edge.y,
                edge.z + CANDIDATE_STEP * theta.sin(),
            );
            let distance = planet.position.distance_to(&candidate);
            if distance > radius {
                continue;
            }
            let density = existing
                .iter()
                .filter(|s| s.position.distance_to(&candidate) <= DENSITY_RADIUS)
                .count();
            if density >= DENSITY_LIMIT {
                continue;
            }
            let collides = existing
                .iter()
                .any(|s| s.position.distance_to(&candidate) <= COLLISION_RADIUS)
                || queued
                    .iter()
                    .any(|(q, _)| q.distance_to(&candidate) <= COLLISION_RADIUS);
            if collides {
                continue;
            }
            queued.push((candidate, distance));
            if queued.len() == sectors_per_wave {
                break 'edges;
            }
        }
    }

    let mut created = 0;
    for (position, distance_from_planet) in queued {
        store.insert_sector(TerritorySector {
            id: SectorId::new(),
            game_id: game.id,
            position,
            owner_id: Some(owner_id),
            controlled_by_planet_id: planet.id,
            captured_at: now,
            expansion_tier: tier,
            expansion_wave: new_wave,
            distance_from_planet,
        })?;
        created += 1;
    }
    Ok(created)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
