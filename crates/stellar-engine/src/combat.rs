//! Attack resolution: friendly arrivals, retreats, encirclement, combat
//! modifiers, and outcome application.
//!
//! Attacks are resolved in `(arrival_at, id)` order, so an earlier capture
//! within the same tick makes a later attack on the same planet face the new
//! owner. Each resolution is computed from fresh reads and applied through
//! [`MemoryStore::apply_attack_settlement`], which transitions the attack out
//! of `in_transit` exactly once and rejects the write if the defender changed
//! under us -- the attack then simply stays queued for the next tick.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use stellar_store::geom::subtends_obtuse_angle;
use stellar_store::prelude::*;

use crate::growth::effective_max_troops;
use crate::TickResult;

/// Radius of the encirclement check and of defense-platform coverage.
const SUPPORT_RADIUS: f64 = 50.0;
/// An attack outnumbered worse than this against the garrison retreats.
const RETREAT_RATIO: f64 = 0.3;
/// Fraction of retreating troops that survive the trip home.
const RETREAT_RETURN_FRACTION: f64 = 0.8;
/// Attack multiplier for a flanking arrival.
const FLANKING_MULT: f64 = 1.2;
/// Attack multiplier for attacking downhill.
const ELEVATION_MULT: f64 = 1.1;
/// Minimum height advantage of the source over the target.
const ELEVATION_DELTA: f64 = 10.0;
/// Defense multiplier granted by a defense platform in range.
const DEFENSE_STATION_MULT: f64 = 5.0;
const ATTACKER_LOSS_RATE: f64 = 0.3;
const DEFENDER_LOSS_RATE: f64 = 0.4;

/// Phase 3: resolve every due attack of the game. Returns the number of
/// attacks settled this invocation. A failure on one attack never aborts the
/// phase.
pub fn resolve_due_attacks(
    store: &MemoryStore,
    game: &Game,
    now: DateTime<Utc>,
) -> TickResult<u64> {
    let mut settled = 0;
    for attack in store.due_attacks(game.id, now) {
        match resolve_attack(store, game, &attack, now) {
            Ok(true) => settled += 1,
            Ok(false) => {
                tracing::debug!(attack_id = %attack.id, "attack resolution deferred");
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    attack_id = %attack.id,
                    "attack resolution failed, retrying next tick"
                );
            }
        }
    }
    Ok(settled)
}

/// Resolve a single due attack. Returns `Ok(true)` when the attack was
/// settled (arrived or retreating), `Ok(false)` when another invocation got
/// there first or the defender changed mid-resolution.
fn resolve_attack(
    store: &MemoryStore,
    game: &Game,
    attack: &Attack,
    now: DateTime<Utc>,
) -> TickResult<bool> {
    let target = store.planet(attack.target_planet_id)?;
    let source = store.planet(attack.source_planet_id)?;
    let terrain = TerrainType::for_planet(&target);

    // Friendly arrival: reinforce and be done.
    if target.owner_id == Some(attack.attacker_id) {
        let cap = effective_max_troops(&store.structures_on_planet(target.id));
        let settlement = AttackSettlement {
            attack_id: attack.id,
            new_status: AttackStatus::Arrived,
            owner_guard: OwnerGuard::Expect(Some(attack.attacker_id)),
            target_write: TargetWrite::Reinforce {
                amount: attack.troops,
                cap,
            },
            source_return: None,
            log: None,
        };
        return apply(store, settlement, now);
    }

    // Retreat: too outnumbered to commit.
    if (attack.troops as f64) < target.troop_count as f64 * RETREAT_RATIO {
        let returned = (attack.troops as f64 * RETREAT_RETURN_FRACTION).floor() as i64;
        let settlement = AttackSettlement {
            attack_id: attack.id,
            new_status: AttackStatus::Retreating,
            owner_guard: OwnerGuard::Any,
            target_write: TargetWrite::Unchanged,
            source_return: Some((attack.source_planet_id, returned)),
            log: Some(CombatLog {
                game_id: game.id,
                attacker_id: attack.attacker_id,
                defender_id: target.owner_id,
                system_id: target.id,
                attacker_troops: attack.troops,
                defender_troops: target.troop_count,
                attacker_losses: attack.troops - returned,
                defender_losses: 0,
                survivors: returned,
                terrain_type: terrain,
                had_flanking: false,
                was_encircled: false,
                had_defense_station: false,
                had_elevation: false,
                combat_result: CombatResult::Retreat,
                occurred_at: now,
            }),
        };
        return apply(store, settlement, now);
    }

    let planets = store.planets(game.id);

    // Encirclement: all six directions held by attacker planets in range.
    if is_encircled(&target, attack.attacker_id, &planets) {
        let settlement = AttackSettlement {
            attack_id: attack.id,
            new_status: AttackStatus::Arrived,
            owner_guard: OwnerGuard::Expect(target.owner_id),
            target_write: TargetWrite::Capture {
                new_owner: attack.attacker_id,
                troops: attack.troops,
            },
            source_return: None,
            log: Some(CombatLog {
                game_id: game.id,
                attacker_id: attack.attacker_id,
                defender_id: target.owner_id,
                system_id: target.id,
                attacker_troops: attack.troops,
                defender_troops: target.troop_count,
                attacker_losses: 0,
                defender_losses: target.troop_count,
                survivors: attack.troops,
                terrain_type: terrain,
                had_flanking: false,
                was_encircled: true,
                had_defense_station: false,
                had_elevation: false,
                combat_result: CombatResult::AttackerVictory,
                occurred_at: now,
            }),
        };
        return apply(store, settlement, now);
    }

    let had_defense_station = defense_station_in_range(store, game, &target, &planets);
    let had_flanking = has_flanking(store, game, attack, &source, &target, now)?;
    let had_elevation = source.position.y - target.position.y > ELEVATION_DELTA;

    let mut attack_mult = 1.0;
    if had_flanking {
        attack_mult *= FLANKING_MULT;
    }
    if had_elevation {
        attack_mult *= ELEVATION_MULT;
    }
    let mut defense_mult = terrain.defense_multiplier();
    if had_defense_station {
        defense_mult *= DEFENSE_STATION_MULT;
    }

    let effective_attack = attack.troops as f64 * attack_mult;
    let effective_defense = target.troop_count as f64 * defense_mult;
    let attacker_losses = (effective_defense * ATTACKER_LOSS_RATE).floor() as i64;
    let defender_losses = (effective_attack * DEFENDER_LOSS_RATE).floor() as i64;
    let attacker_wins = effective_attack > effective_defense;

    let (target_write, combat_result, survivors) = if attacker_wins {
        let survivors = (attack.troops - attacker_losses).max(0);
        (
            TargetWrite::Capture {
                new_owner: attack.attacker_id,
                troops: survivors,
            },
            CombatResult::AttackerVictory,
            survivors,
        )
    } else {
        let remaining = (target.troop_count - defender_losses).max(0);
        (
            TargetWrite::SetTroops { troops: remaining },
            CombatResult::DefenderVictory,
            remaining,
        )
    };

    let settlement = AttackSettlement {
        attack_id: attack.id,
        new_status: AttackStatus::Arrived,
        owner_guard: OwnerGuard::Expect(target.owner_id),
        target_write,
        source_return: None,
        log: Some(CombatLog {
            game_id: game.id,
            attacker_id: attack.attacker_id,
            defender_id: target.owner_id,
            system_id: target.id,
            attacker_troops: attack.troops,
            defender_troops: target.troop_count,
            attacker_losses,
            defender_losses,
            survivors,
            terrain_type: terrain,
            had_flanking,
            was_encircled: false,
            had_defense_station,
            had_elevation,
            combat_result,
            occurred_at: now,
        }),
    };
    apply(store, settlement, now)
}

fn apply(
    store: &MemoryStore,
    settlement: AttackSettlement,
    now: DateTime<Utc>,
) -> TickResult<bool> {
    Ok(matches!(
        store.apply_attack_settlement(settlement, now)?,
        SettlementApplied::Applied { .. }
    ))
}

/// All six axis directions covered by distinct attacker planets within
/// [`SUPPORT_RADIUS`]. The bounding-box test prefilters before the exact
/// Euclidean check.
pub fn is_encircled(target: &Planet, attacker_id: PlayerId, planets: &[Planet]) -> bool {
    let covered: HashSet<AxisDirection> = planets
        .iter()
        .filter(|p| p.owner_id == Some(attacker_id) && p.id != target.id)
        .filter(|p| target.position.chebyshev_distance_to(&p.position) <= SUPPORT_RADIUS)
        .filter(|p| target.position.distance_to(&p.position) <= SUPPORT_RADIUS)
        .map(|p| target.position.dominant_direction_to(&p.position))
        .collect();
    covered.len() == AxisDirection::ALL.len()
}

/// A live defense platform of the defender on any planet within range of the
/// target.
fn defense_station_in_range(
    store: &MemoryStore,
    game: &Game,
    target: &Planet,
    planets: &[Planet],
) -> bool {
    let Some(defender_id) = target.owner_id else {
        return false;
    };
    let positions: HashMap<PlanetId, _> = planets.iter().map(|p| (p.id, p.position)).collect();
    store.structures(game.id).iter().any(|s| {
        s.is_active
            && s.structure_type == StructureType::DefensePlatform
            && s.owner_id == defender_id
            && positions
                .get(&s.system_id)
                .is_some_and(|pos| target.position.distance_to(pos) <= SUPPORT_RADIUS)
    })
}

/// Two simultaneous arrivals from the same attacker whose source positions
/// subtend more than 90 degrees at the target.
fn has_flanking(
    store: &MemoryStore,
    game: &Game,
    attack: &Attack,
    source: &Planet,
    target: &Planet,
    now: DateTime<Utc>,
) -> TickResult<bool> {
    let mut sources = vec![source.position];
    for other in store.in_transit_attacks_on_target(game.id, attack.attacker_id, target.id) {
        if other.id != attack.id && other.arrival_at <= now {
            sources.push(store.planet(other.source_planet_id)?.position);
        }
    }
    for (i, a) in sources.iter().enumerate() {
        for b in &sources[i + 1..] {
            if subtends_obtuse_angle(a, b, &target.position) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
