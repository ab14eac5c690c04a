//! Bot planners: a five-priority decision routine per bot, difficulty
//! scaled, seeded per `(game, bot, tick)` so replaying a tick replays the
//! same decisions.
//!
//! The first priority that produces an action consumes the bot's turn:
//! build stations, finish an encirclement, swallow weak neutrals, strike an
//! attractive enemy planet, or shuffle troops from the strongest garrison to
//! the weakest.

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::collections::HashSet;

use stellar_store::prelude::*;

use crate::TickResult;

/// Bots think every this many ticks, offset by a per-bot stagger.
const PLANNER_PERIOD: u64 = 5;
/// Cost of a bot-built station.
const BUILD_COST: i64 = 50_000;
/// Range within which enemies are considered for encirclement finishing and
/// opportunistic strikes.
const STRIKE_RANGE: f64 = 150.0;
/// Range within which neutral planets are considered for expansion.
const EXPANSION_RANGE: f64 = 100.0;
/// Radius of encirclement support, matching the combat rule.
const NEIGHBOR_RADIUS: f64 = 50.0;
/// Directions that must be covered before the bot tries to finish an
/// encirclement.
const FINISHER_DIRECTIONS: usize = 4;
/// Travel time: 100 ms per `ceil(distance / 2)`.
const TRAVEL_TICK_MS: i64 = 100;

/// Stable per-bot stagger so bot turns spread across ticks.
fn stagger(player_id: PlayerId) -> u64 {
    (player_id.0.as_u128() % PLANNER_PERIOD as u128) as u64
}

/// Deterministic per-(game, bot, tick) seed for the planner's RNG.
fn planner_seed(game_id: GameId, player_id: PlayerId, tick: u64) -> u64 {
    let g = game_id.0.as_u128();
    let p = player_id.0.as_u128();
    let mixed = g ^ p.rotate_left(64);
    (mixed as u64) ^ ((mixed >> 64) as u64) ^ tick
}

/// Phase 9: run every due bot's planner. Returns how many bots acted.
pub fn run_planners(
    store: &MemoryStore,
    game: &Game,
    now: DateTime<Utc>,
    tick: u64,
) -> TickResult<u64> {
    let mut acted = 0;
    for gp in store.participants(game.id) {
        if !gp.is_alive || gp.is_eliminated {
            continue;
        }
        let player = store.player(gp.player_id)?;
        if !player.is_bot {
            continue;
        }
        if (tick + stagger(gp.player_id)) % PLANNER_PERIOD != 0 {
            continue;
        }
        let mut rng = Pcg64::seed_from_u64(planner_seed(game.id, gp.player_id, tick));
        match plan_turn(store, game, &player, now, &mut rng) {
            Ok(true) => acted += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    bot_id = %gp.player_id,
                    "bot planner failed, skipping turn"
                );
            }
        }
    }
    Ok(acted)
}

/// One bot turn: the first successful priority wins.
fn plan_turn(
    store: &MemoryStore,
    game: &Game,
    player: &Player,
    now: DateTime<Utc>,
    rng: &mut Pcg64,
) -> TickResult<bool> {
    let planets = store.planets(game.id);
    let mine: Vec<&Planet> = planets
        .iter()
        .filter(|p| p.owner_id == Some(player.id))
        .collect();
    if mine.is_empty() {
        return Ok(false);
    }
    let scaling = player.bot_difficulty.scaling();
    let structures = store.structures(game.id);

    if try_build(store, game, player, &mine, &structures, scaling, rng)? {
        return Ok(true);
    }
    if try_finish_encirclement(store, game, player.id, &planets, &mine, scaling, now)? {
        return Ok(true);
    }
    if try_expand_to_neutrals(store, game, player.id, &planets, &mine, scaling, now)? {
        return Ok(true);
    }
    if try_opportunistic_strike(store, game, player.id, &planets, &mine, scaling, now)? {
        return Ok(true);
    }
    try_reinforce(store, game, player.id, &mine, scaling, now)
}

fn has_active_structure(
    structures: &[Structure],
    planet_id: PlanetId,
    kind: StructureType,
) -> bool {
    structures
        .iter()
        .any(|s| s.system_id == planet_id && s.structure_type == kind && s.is_active)
}

/// Priority 1: build a mining station on an unexploited mineral planet, or a
/// colony station on a random planet.
fn try_build(
    store: &MemoryStore,
    game: &Game,
    player: &Player,
    mine: &[&Planet],
    structures: &[Structure],
    scaling: f64,
    rng: &mut Pcg64,
) -> TickResult<bool> {
    if player.credits < (BUILD_COST as f64 * scaling) as i64 {
        return Ok(false);
    }
    if !rng.gen_bool(scaling) {
        return Ok(false);
    }

    let unexploited = mine.iter().find(|p| {
        p.has_minerals && !has_active_structure(structures, p.id, StructureType::MiningStation)
    });
    let (planet_id, kind) = match unexploited {
        Some(p) => (p.id, StructureType::MiningStation),
        None => {
            let candidates: Vec<&&Planet> = mine
                .iter()
                .filter(|p| !has_active_structure(structures, p.id, StructureType::ColonyStation))
                .collect();
            let Some(p) = candidates.choose(rng) else {
                return Ok(false);
            };
            (p.id, StructureType::ColonyStation)
        }
    };

    if !store.try_spend_credits(player.id, BUILD_COST)? {
        return Ok(false);
    }
    store.insert_structure(Structure::build(game.id, planet_id, player.id, kind))?;
    tracing::debug!(bot_id = %player.id, planet_id = %planet_id, kind = ?kind, "bot built station");
    Ok(true)
}

/// Priority 2: if an enemy planet is nearly surrounded (4 of 6 directions),
/// throw the nearest garrison at it.
fn try_finish_encirclement(
    store: &MemoryStore,
    game: &Game,
    bot_id: PlayerId,
    planets: &[Planet],
    mine: &[&Planet],
    scaling: f64,
    now: DateTime<Utc>,
) -> TickResult<bool> {
    for target in enemy_planets_in_range(planets, mine, bot_id, STRIKE_RANGE) {
        let covered: HashSet<AxisDirection> = mine
            .iter()
            .filter(|p| target.position.distance_to(&p.position) <= NEIGHBOR_RADIUS)
            .map(|p| target.position.dominant_direction_to(&p.position))
            .collect();
        if covered.len() < FINISHER_DIRECTIONS {
            continue;
        }
        let Some(source) = nearest(mine.iter().copied(), target) else {
            continue;
        };
        if source.troop_count <= 50 {
            continue;
        }
        let troops = (source.troop_count as f64 * 0.7 * scaling).floor() as i64;
        if launch(store, game, bot_id, source, target, troops, now)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Priority 3: take the weakest neutral planet in range with comfortable
/// superiority.
fn try_expand_to_neutrals(
    store: &MemoryStore,
    game: &Game,
    bot_id: PlayerId,
    planets: &[Planet],
    mine: &[&Planet],
    scaling: f64,
    now: DateTime<Utc>,
) -> TickResult<bool> {
    let mut neutrals: Vec<&Planet> = planets
        .iter()
        .filter(|p| p.owner_id.is_none())
        .filter(|p| within_range_of_any(p, mine, EXPANSION_RANGE))
        .collect();
    neutrals.sort_by_key(|p| (p.troop_count, p.id));

    for target in neutrals {
        let source = nearest(
            mine.iter()
                .copied()
                .filter(|s| s.troop_count as f64 > target.troop_count as f64 * 1.5),
            target,
        );
        let Some(source) = source else {
            continue;
        };
        let troops = (source.troop_count as f64 * 0.6 * scaling).floor() as i64;
        if launch(store, game, bot_id, source, target, troops, now)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Priority 4: strike the most valuable enemy planet the bot can overmatch.
fn try_opportunistic_strike(
    store: &MemoryStore,
    game: &Game,
    bot_id: PlayerId,
    planets: &[Planet],
    mine: &[&Planet],
    scaling: f64,
    now: DateTime<Utc>,
) -> TickResult<bool> {
    let mut targets = enemy_planets_in_range(planets, mine, bot_id, STRIKE_RANGE);
    // Mineral worlds first, nebulae last.
    targets.sort_by_key(|p| (-(p.has_minerals as i64 - p.in_nebula as i64), p.id));

    for target in targets {
        let required_ratio = 1.5 / scaling;
        let source = nearest(
            mine.iter().copied().filter(|s| {
                s.troop_count > 50
                    && s.troop_count as f64 / target.troop_count.max(1) as f64 > required_ratio
            }),
            target,
        );
        let Some(source) = source else {
            continue;
        };
        let troops = (source.troop_count as f64 * 0.5 * scaling).floor() as i64;
        if launch(store, game, bot_id, source, target, troops, now)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Priority 5: move 30% of the strongest garrison to the weakest.
fn try_reinforce(
    store: &MemoryStore,
    game: &Game,
    bot_id: PlayerId,
    mine: &[&Planet],
    scaling: f64,
    now: DateTime<Utc>,
) -> TickResult<bool> {
    if mine.len() < 2 {
        return Ok(false);
    }
    let strongest = mine
        .iter()
        .max_by_key(|p| (p.troop_count, p.id))
        .copied()
        .unwrap_or(mine[0]);
    let weakest = mine
        .iter()
        .min_by_key(|p| (p.troop_count, p.id))
        .copied()
        .unwrap_or(mine[0]);
    if strongest.id == weakest.id {
        return Ok(false);
    }
    let troops = (strongest.troop_count as f64 * 0.3 * scaling).floor() as i64;
    launch(store, game, bot_id, strongest, weakest, troops, now)
}

fn enemy_planets_in_range<'a>(
    planets: &'a [Planet],
    mine: &[&Planet],
    bot_id: PlayerId,
    range: f64,
) -> Vec<&'a Planet> {
    planets
        .iter()
        .filter(|p| p.owner_id.is_some() && p.owner_id != Some(bot_id))
        .filter(|p| within_range_of_any(p, mine, range))
        .collect()
}

fn within_range_of_any(planet: &Planet, mine: &[&Planet], range: f64) -> bool {
    mine.iter()
        .any(|m| m.position.distance_to(&planet.position) <= range)
}

fn nearest<'a>(
    candidates: impl Iterator<Item = &'a Planet>,
    target: &Planet,
) -> Option<&'a Planet> {
    candidates.min_by(|a, b| {
        let da = a.position.distance_to(&target.position);
        let db = b.position.distance_to(&target.position);
        da.partial_cmp(&db)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.id.cmp(&b.id))
    })
}

/// Create the attack row and debit the source. Travel time is
/// `ceil(distance / 2)` ticks of 100 ms. Zero-troop launches are skipped.
fn launch(
    store: &MemoryStore,
    game: &Game,
    bot_id: PlayerId,
    source: &Planet,
    target: &Planet,
    troops: i64,
    now: DateTime<Utc>,
) -> TickResult<bool> {
    if troops <= 0 {
        return Ok(false);
    }
    let distance = source.position.distance_to(&target.position);
    let travel_ticks = (distance / 2.0).ceil() as i64;
    let arrival_at = now + Duration::milliseconds(travel_ticks * TRAVEL_TICK_MS);
    let attack = Attack::launch(game.id, bot_id, source.id, target.id, troops, arrival_at);
    let launched = store.launch_attack(attack)?;
    if launched {
        tracing::debug!(
            bot_id = %bot_id,
            source = %source.id,
            target = %target.id,
            troops,
            "bot launched attack"
        );
    }
    Ok(launched)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        game: Game,
        bot_id: PlayerId,
    }

    fn seeded_bot_game(store: &MemoryStore, credits: i64) -> Fixture {
        let game = Game::new(4);
        store.insert_game(game.clone()).unwrap();
        let now = Utc::now();
        store.start_game(game.id, now).unwrap();
        let mut bot = Player::bot("unit-7", BotDifficulty::Hard);
        bot.credits = credits;
        let bot_id = bot.id;
        store.insert_player(bot).unwrap();
        store
            .insert_game_player(GamePlayer::new(game.id, bot_id, "#aa2200", 1, now))
            .unwrap();
        Fixture {
            game: store.game(game.id).unwrap(),
            bot_id,
        }
    }

    fn planet_at(
        store: &MemoryStore,
        game_id: GameId,
        position: Position,
        owner: Option<PlayerId>,
        troops: i64,
        has_minerals: bool,
    ) -> PlanetId {
        let planet = Planet {
            id: PlanetId::new(),
            game_id,
            name: "B".to_owned(),
            position,
            owner_id: owner,
            troop_count: troops,
            energy_generation: 10,
            has_minerals,
            in_nebula: false,
        };
        let id = planet.id;
        store.insert_planet(planet).unwrap();
        id
    }

    /// The first tick on which this bot's planner runs.
    fn due_tick(bot_id: PlayerId) -> u64 {
        (1..=PLANNER_PERIOD)
            .find(|t| (t + stagger(bot_id)) % PLANNER_PERIOD == 0)
            .unwrap()
    }

    #[test]
    fn planner_respects_stagger_cadence() {
        let store = MemoryStore::new();
        let fx = seeded_bot_game(&store, 0);
        planet_at(
            &store,
            fx.game.id,
            Position::default(),
            Some(fx.bot_id),
            200,
            false,
        );
        planet_at(
            &store,
            fx.game.id,
            Position::new(40.0, 0.0, 0.0),
            Some(fx.bot_id),
            50,
            false,
        );
        let now = Utc::now();

        let due = due_tick(fx.bot_id);
        for tick in 1..=PLANNER_PERIOD {
            let acted = run_planners(&store, &fx.game, now, tick).unwrap();
            assert_eq!(acted, u64::from(tick == due), "tick {tick}");
        }
    }

    #[test]
    fn humans_never_plan() {
        let store = MemoryStore::new();
        let game = Game::new(2);
        store.insert_game(game.clone()).unwrap();
        let now = Utc::now();
        let human = Player::human("ada");
        let human_id = human.id;
        store.insert_player(human).unwrap();
        store
            .insert_game_player(GamePlayer::new(game.id, human_id, "#0000ff", 1, now))
            .unwrap();
        planet_at(&store, game.id, Position::default(), Some(human_id), 500, false);

        for tick in 1..=10 {
            assert_eq!(run_planners(&store, &game, now, tick).unwrap(), 0);
        }
    }

    #[test]
    fn rich_bot_builds_mining_station_first() {
        let store = MemoryStore::new();
        let fx = seeded_bot_game(&store, 80_000);
        let rich = planet_at(
            &store,
            fx.game.id,
            Position::default(),
            Some(fx.bot_id),
            200,
            true,
        );
        let now = Utc::now();

        let acted = run_planners(&store, &fx.game, now, due_tick(fx.bot_id)).unwrap();
        assert_eq!(acted, 1);

        let structures = store.structures_on_planet(rich);
        assert_eq!(structures.len(), 1);
        assert_eq!(structures[0].structure_type, StructureType::MiningStation);
        assert_eq!(structures[0].owner_id, fx.bot_id);
        assert_eq!(store.player(fx.bot_id).unwrap().credits, 30_000);
    }

    #[test]
    fn poor_bot_skips_building() {
        let store = MemoryStore::new();
        let fx = seeded_bot_game(&store, 10_000);
        planet_at(
            &store,
            fx.game.id,
            Position::default(),
            Some(fx.bot_id),
            200,
            true,
        );
        planet_at(
            &store,
            fx.game.id,
            Position::new(40.0, 0.0, 0.0),
            Some(fx.bot_id),
            50,
            false,
        );
        let now = Utc::now();

        run_planners(&store, &fx.game, now, due_tick(fx.bot_id)).unwrap();
        // No station: falls through to reinforcement instead.
        assert!(store.structures(fx.game.id).is_empty());
        assert_eq!(store.attacks(fx.game.id).len(), 1);
    }

    #[test]
    fn weak_neutral_is_expanded_into() {
        let store = MemoryStore::new();
        let fx = seeded_bot_game(&store, 0);
        let home = planet_at(
            &store,
            fx.game.id,
            Position::default(),
            Some(fx.bot_id),
            200,
            false,
        );
        let weak = planet_at(
            &store,
            fx.game.id,
            Position::new(80.0, 0.0, 0.0),
            None,
            30,
            false,
        );
        let strong = planet_at(
            &store,
            fx.game.id,
            Position::new(0.0, 0.0, 80.0),
            None,
            500,
            false,
        );
        let now = Utc::now();

        run_planners(&store, &fx.game, now, due_tick(fx.bot_id)).unwrap();

        let attacks = store.attacks(fx.game.id);
        assert_eq!(attacks.len(), 1);
        assert_eq!(attacks[0].target_planet_id, weak);
        assert_eq!(attacks[0].source_planet_id, home);
        // 60% of 200 at Hard scaling.
        assert_eq!(attacks[0].troops, 120);
        assert_eq!(store.planet(home).unwrap().troop_count, 80);
        assert_eq!(store.planet(strong).unwrap().owner_id, None);
        // Travel: distance 80 -> ceil(40) ticks of 100 ms.
        assert_eq!(attacks[0].arrival_at, now + Duration::milliseconds(4000));
    }

    #[test]
    fn finisher_fires_on_surrounded_enemy() {
        let store = MemoryStore::new();
        let fx = seeded_bot_game(&store, 0);
        let enemy = PlayerId::new();
        let target = planet_at(
            &store,
            fx.game.id,
            Position::default(),
            Some(enemy),
            300,
            false,
        );
        // Four covered directions within 50.
        planet_at(&store, fx.game.id, Position::new(40.0, 0.0, 0.0), Some(fx.bot_id), 400, false);
        planet_at(&store, fx.game.id, Position::new(-40.0, 0.0, 0.0), Some(fx.bot_id), 100, false);
        planet_at(&store, fx.game.id, Position::new(0.0, 40.0, 0.0), Some(fx.bot_id), 100, false);
        planet_at(&store, fx.game.id, Position::new(0.0, -40.0, 0.0), Some(fx.bot_id), 100, false);
        let now = Utc::now();

        run_planners(&store, &fx.game, now, due_tick(fx.bot_id)).unwrap();

        let attacks = store.attacks(fx.game.id);
        assert_eq!(attacks.len(), 1);
        assert_eq!(attacks[0].target_planet_id, target);
        // Nearest garrison sends 70% at Hard scaling: all four are 40 away,
        // the tie resolves deterministically, and 70% of that garrison goes.
        assert!(attacks[0].troops == 280 || attacks[0].troops == 70);
    }

    #[test]
    fn opportunistic_strike_prefers_mineral_worlds() {
        let store = MemoryStore::new();
        let fx = seeded_bot_game(&store, 0);
        let enemy = PlayerId::new();
        planet_at(
            &store,
            fx.game.id,
            Position::default(),
            Some(fx.bot_id),
            400,
            false,
        );
        let plain = planet_at(
            &store,
            fx.game.id,
            Position::new(100.0, 0.0, 0.0),
            Some(enemy),
            20,
            false,
        );
        let rich = planet_at(
            &store,
            fx.game.id,
            Position::new(0.0, 0.0, 100.0),
            Some(enemy),
            20,
            true,
        );
        let now = Utc::now();

        run_planners(&store, &fx.game, now, due_tick(fx.bot_id)).unwrap();

        let attacks = store.attacks(fx.game.id);
        assert_eq!(attacks.len(), 1);
        assert_eq!(attacks[0].target_planet_id, rich);
        assert_ne!(attacks[0].target_planet_id, plain);
        // 50% of 400 at Hard scaling.
        assert_eq!(attacks[0].troops, 200);
    }

    #[test]
    fn reinforce_moves_troops_to_the_weakest() {
        let store = MemoryStore::new();
        let fx = seeded_bot_game(&store, 0);
        let strong = planet_at(
            &store,
            fx.game.id,
            Position::default(),
            Some(fx.bot_id),
            200,
            false,
        );
        let weak = planet_at(
            &store,
            fx.game.id,
            Position::new(60.0, 0.0, 0.0),
            Some(fx.bot_id),
            40,
            false,
        );
        let now = Utc::now();

        run_planners(&store, &fx.game, now, due_tick(fx.bot_id)).unwrap();

        let attacks = store.attacks(fx.game.id);
        assert_eq!(attacks.len(), 1);
        assert_eq!(attacks[0].source_planet_id, strong);
        assert_eq!(attacks[0].target_planet_id, weak);
        assert_eq!(attacks[0].troops, 60);
        assert_eq!(store.planet(strong).unwrap().troop_count, 140);
    }

    #[test]
    fn landless_bot_does_nothing() {
        let store = MemoryStore::new();
        let fx = seeded_bot_game(&store, 100_000);
        let now = Utc::now();
        assert_eq!(
            run_planners(&store, &fx.game, now, due_tick(fx.bot_id)).unwrap(),
            0
        );
    }

    #[test]
    fn same_seed_replays_the_same_decision() {
        type Decision = (
            Vec<(PlanetId, StructureType)>,
            Vec<(PlanetId, PlanetId, i64)>,
        );
        let run = || -> Decision {
            let store = MemoryStore::new();
            // Fixed ids so the planner seed matches across runs.
            let mut game = Game::new(2);
            game.id = GameId(uuid::Uuid::from_u128(42));
            store.insert_game(game.clone()).unwrap();
            store.start_game(game.id, Utc::now()).unwrap();
            let mut bot = Player::bot("unit-7", BotDifficulty::Easy);
            bot.credits = 100_000;
            bot.id = PlayerId(uuid::Uuid::from_u128(7));
            store.insert_player(bot.clone()).unwrap();
            store
                .insert_game_player(GamePlayer::new(game.id, bot.id, "#aa2200", 1, Utc::now()))
                .unwrap();
            for i in 0..4u128 {
                store
                    .insert_planet(Planet {
                        id: PlanetId(uuid::Uuid::from_u128(100 + i)),
                        game_id: game.id,
                        name: format!("B{i}"),
                        position: Position::new(i as f64 * 40.0, 0.0, 0.0),
                        owner_id: Some(bot.id),
                        troop_count: 100 + i as i64,
                        energy_generation: 10,
                        has_minerals: false,
                        in_nebula: false,
                    })
                    .unwrap();
            }
            let tick = due_tick(bot.id);
            run_planners(&store, &store.game(game.id).unwrap(), Utc::now(), tick).unwrap();
            (
                store
                    .structures(game.id)
                    .iter()
                    .map(|s| (s.system_id, s.structure_type))
                    .collect(),
                store
                    .attacks(game.id)
                    .iter()
                    .map(|a| (a.source_planet_id, a.target_planet_id, a.troops))
                    .collect(),
            )
        };
        // Easy difficulty flips a coin on building; the seed makes the flip
        // and the fallback planet pick identical across runs.
        assert_eq!(run(), run());
    }
}
