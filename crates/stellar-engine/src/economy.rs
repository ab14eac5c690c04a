//! Per-participant resource generation.
//!
//! Energy income follows an efficiency curve that peaks when stockpiles sit
//! at 42% of the cap and halves at either extreme, so hoarding and running
//! dry are both penalized. Credits scale with planets
//! and trade-station coverage, minerals with working mining stations. All
//! income lands through the store's clamped-apply operation.

use chrono::{DateTime, Utc};
use stellar_store::prelude::*;
use stellar_store::rows::ENERGY_CAP;

use crate::TickResult;

/// Stockpile ratio at which energy production peaks.
const PEAK_EFFICIENCY_RATIO: f64 = 0.42;
/// Trade stations pair with owned planets within this range.
const TRADE_RANGE: f64 = 100.0;
const CREDITS_PER_PLANET: i64 = 10;
const CREDITS_PER_TRADE_PAIR: i64 = 10;
const MINERALS_PER_MINE: i64 = 50;

/// Energy production efficiency in `[0, 1]` for a stockpile level.
///
/// Rises linearly from 0.5 at empty to 1.0 at 42% of cap, then falls
/// linearly back to 0.5 at the cap.
pub fn energy_efficiency(energy: i64) -> f64 {
    let ratio = energy as f64 / ENERGY_CAP as f64;
    let eff = if ratio <= PEAK_EFFICIENCY_RATIO {
        0.5 + (ratio / PEAK_EFFICIENCY_RATIO) * 0.5
    } else {
        1.0 - ((ratio - PEAK_EFFICIENCY_RATIO) / (1.0 - PEAK_EFFICIENCY_RATIO)) * 0.5
    };
    eff.clamp(0.0, 1.0)
}

/// Phase 8: generate income for every participant and ratchet their peak
/// territory share.
pub fn generate_resources(
    store: &MemoryStore,
    game: &Game,
    _now: DateTime<Utc>,
) -> TickResult<()> {
    let planets = store.planets(game.id);
    let structures = store.structures(game.id);
    let sectors = store.sectors(game.id);
    let total_sectors = sectors.len();

    for gp in store.participants(game.id) {
        let player = store.player(gp.player_id)?;
        let owned: Vec<&Planet> = planets
            .iter()
            .filter(|p| p.owner_id == Some(gp.player_id))
            .collect();
        let planet_count = owned.len() as f64;

        let efficiency = energy_efficiency(player.energy);
        let energy = ((100.0 + (planet_count.powf(0.6) * 100.0).floor()) * efficiency).floor()
            as i64;

        let trade_pairs = structures
            .iter()
            .filter(|s| {
                s.is_active
                    && s.structure_type == StructureType::TradeStation
                    && s.owner_id == gp.player_id
            })
            .map(|station| {
                let Some(at) = planets.iter().find(|p| p.id == station.system_id) else {
                    return 0;
                };
                owned
                    .iter()
                    .filter(|q| {
                        q.id != station.system_id
                            && at.position.distance_to(&q.position) <= TRADE_RANGE
                    })
                    .count() as i64
            })
            .sum::<i64>();
        let credits = CREDITS_PER_PLANET * owned.len() as i64 + CREDITS_PER_TRADE_PAIR * trade_pairs;

        let mines = structures
            .iter()
            .filter(|s| {
                s.is_active
                    && s.structure_type == StructureType::MiningStation
                    && s.owner_id == gp.player_id
                    && planets
                        .iter()
                        .any(|p| p.id == s.system_id && p.has_minerals)
            })
            .count() as i64;
        let minerals = MINERALS_PER_MINE * mines;

        store.apply_income(
            gp.player_id,
            ResourceIncome {
                credits,
                energy,
                minerals,
                research: 0,
            },
        )?;

        let territory_pct = if total_sectors == 0 {
            0.0
        } else {
            let mine = sectors
                .iter()
                .filter(|s| s.owner_id == Some(gp.player_id))
                .count();
            mine as f64 / total_sectors as f64 * 100.0
        };
        store.record_peak_territory(game.id, gp.player_id, territory_pct)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn efficiency_curve_boundaries() {
        assert_eq!(energy_efficiency(0), 0.5);
        assert_eq!(energy_efficiency((0.42 * ENERGY_CAP as f64) as i64), 1.0);
        assert_eq!(energy_efficiency(ENERGY_CAP), 0.5);
    }

    #[test]
    fn efficiency_is_monotone_up_then_down() {
        let peak = (0.42 * ENERGY_CAP as f64) as i64;
        assert!(energy_efficiency(peak / 2) > energy_efficiency(0));
        assert!(energy_efficiency(peak / 2) < 1.0);
        assert!(energy_efficiency(ENERGY_CAP / 2) > energy_efficiency(ENERGY_CAP));
    }

    fn seeded(store: &MemoryStore) -> (Game, PlayerId) {
        let game = Game::new(2);
        store.insert_game(game.clone()).unwrap();
        let player = Player::human("ada");
        let player_id = player.id;
        store.insert_player(player).unwrap();
        store
            .insert_game_player(GamePlayer::new(game.id, player_id, "#ff8800", 1, Utc::now()))
            .unwrap();
        (game, player_id)
    }

    fn planet_at(
        store: &MemoryStore,
        game_id: GameId,
        position: Position,
        owner: Option<PlayerId>,
        has_minerals: bool,
    ) -> PlanetId {
        let planet = Planet {
            id: PlanetId::new(),
            game_id,
            name: "P".to_owned(),
            position,
            owner_id: owner,
            troop_count: 50,
            energy_generation: 10,
            has_minerals,
            in_nebula: false,
        };
        let id = planet.id;
        store.insert_planet(planet).unwrap();
        id
    }

    #[test]
    fn base_income_for_a_single_planet() {
        let store = MemoryStore::new();
        let (game, player_id) = seeded(&store);
        planet_at(&store, game.id, Position::default(), Some(player_id), false);

        generate_resources(&store, &game, Utc::now()).unwrap();

        let player = store.player(player_id).unwrap();
        // Empty stockpile: efficiency 0.5, so floor((100 + 100) * 0.5) = 100.
        assert_eq!(player.energy, 100);
        assert_eq!(player.credits, 10);
        assert_eq!(player.minerals, 0);
    }

    #[test]
    fn trade_stations_pay_per_covered_planet() {
        let store = MemoryStore::new();
        let (game, player_id) = seeded(&store);
        let hub = planet_at(&store, game.id, Position::default(), Some(player_id), false);
        planet_at(
            &store,
            game.id,
            Position::new(80.0, 0.0, 0.0),
            Some(player_id),
            false,
        );
        planet_at(
            &store,
            game.id,
            Position::new(300.0, 0.0, 0.0),
            Some(player_id),
            false,
        );
        store
            .insert_structure(Structure::build(
                game.id,
                hub,
                player_id,
                StructureType::TradeStation,
            ))
            .unwrap();

        generate_resources(&store, &game, Utc::now()).unwrap();

        // 3 planets * 10 + 1 pair (hub <-> near planet) * 10.
        assert_eq!(store.player(player_id).unwrap().credits, 40);
    }

    #[test]
    fn mines_only_pay_on_mineral_planets() {
        let store = MemoryStore::new();
        let (game, player_id) = seeded(&store);
        let rich = planet_at(&store, game.id, Position::default(), Some(player_id), true);
        let barren = planet_at(
            &store,
            game.id,
            Position::new(100.0, 0.0, 0.0),
            Some(player_id),
            false,
        );
        store
            .insert_structure(Structure::build(
                game.id,
                rich,
                player_id,
                StructureType::MiningStation,
            ))
            .unwrap();
        store
            .insert_structure(Structure::build(
                game.id,
                barren,
                player_id,
                StructureType::MiningStation,
            ))
            .unwrap();

        generate_resources(&store, &game, Utc::now()).unwrap();
        assert_eq!(store.player(player_id).unwrap().minerals, 50);
    }

    #[test]
    fn peak_territory_ratchets_during_income() {
        let store = MemoryStore::new();
        let (game, player_id) = seeded(&store);
        let planet = planet_at(&store, game.id, Position::default(), Some(player_id), false);
        store
            .insert_sector(TerritorySector {
                id: SectorId::new(),
                game_id: game.id,
                position: Position::new(15.0, 0.0, 0.0),
                owner_id: Some(player_id),
                controlled_by_planet_id: planet,
                captured_at: Utc::now(),
                expansion_tier: 1,
                expansion_wave: 1,
                distance_from_planet: 15.0,
            })
            .unwrap();

        generate_resources(&store, &game, Utc::now()).unwrap();
        let gp = store.participant(game.id, player_id).unwrap();
        assert_eq!(gp.peak_territory_percentage, 100.0);
    }

    #[test]
    fn income_respects_resource_caps() {
        let store = MemoryStore::new();
        let (game, player_id) = seeded(&store);
        planet_at(&store, game.id, Position::default(), Some(player_id), false);
        store
            .apply_income(
                player_id,
                ResourceIncome {
                    credits: 999_999,
                    energy: 0,
                    minerals: 0,
                    research: 0,
                },
            )
            .unwrap();

        generate_resources(&store, &game, Utc::now()).unwrap();
        assert_eq!(store.player(player_id).unwrap().credits, 1_000_000);
    }
}
