//! Galaxy generation: a jittered 3D grid of planets with random attributes,
//! seeded for reproducibility.
//!
//! Home planets are assigned greedily so participants start as far apart as
//! the grid allows. The generator only populates the `systems` table; it
//! carries no gameplay logic of its own.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use stellar_store::prelude::*;

use crate::TickResult;

/// Star names cycled through when labelling planets.
const STAR_NAMES: [&str; 12] = [
    "Altair", "Vega", "Rigel", "Deneb", "Sirius", "Procyon", "Antares", "Castor", "Pollux",
    "Mimosa", "Alphard", "Spica",
];

/// Starting garrison on a home planet.
const HOME_GARRISON: i64 = 150;

/// Parameters for one galaxy.
#[derive(Debug, Clone)]
pub struct GalaxyConfig {
    /// Planets per axis; the galaxy holds `grid_size^3` planets.
    pub grid_size: u32,
    /// Grid pitch between neighboring planets.
    pub spacing: f64,
    /// Maximum random offset applied per axis.
    pub jitter: f64,
    /// RNG seed; the same seed reproduces the same galaxy.
    pub seed: u64,
}

impl Default for GalaxyConfig {
    fn default() -> Self {
        Self {
            grid_size: 4,
            spacing: 70.0,
            jitter: 10.0,
            seed: 0,
        }
    }
}

/// Populate the `systems` table for a game and hand one home planet to each
/// participant (as many as the grid can seat). Returns the ids of all
/// planets created, homes first.
pub fn generate_galaxy(
    store: &MemoryStore,
    game_id: GameId,
    home_owners: &[PlayerId],
    config: &GalaxyConfig,
) -> TickResult<Vec<PlanetId>> {
    let mut rng = Pcg64::seed_from_u64(config.seed);
    let n = config.grid_size;
    let center = (n as f64 - 1.0) / 2.0;

    let mut planets = Vec::with_capacity((n * n * n) as usize);
    let mut index = 0usize;
    for gx in 0..n {
        for gy in 0..n {
            for gz in 0..n {
                let jitter = |rng: &mut Pcg64| rng.gen_range(-1.0..1.0) * config.jitter;
                let position = Position::new(
                    (gx as f64 - center) * config.spacing + jitter(&mut rng),
                    (gy as f64 - center) * config.spacing + jitter(&mut rng),
                    (gz as f64 - center) * config.spacing + jitter(&mut rng),
                );
                planets.push(Planet {
                    id: PlanetId::new(),
                    game_id,
                    name: format!("{}-{:03}", STAR_NAMES[index % STAR_NAMES.len()], index),
                    position,
                    owner_id: None,
                    troop_count: rng.gen_range(20..=120),
                    energy_generation: rng.gen_range(5..=25),
                    has_minerals: rng.gen_bool(0.3),
                    in_nebula: rng.gen_bool(0.15),
                });
                index += 1;
            }
        }
    }

    let homes = pick_home_indices(&planets, home_owners.len());
    for (&planet_index, &owner) in homes.iter().zip(home_owners) {
        let home = &mut planets[planet_index];
        home.owner_id = Some(owner);
        home.troop_count = HOME_GARRISON;
    }

    // Homes first so callers can find them without rescanning.
    let mut ids = Vec::with_capacity(planets.len());
    for &i in &homes {
        ids.push(planets[i].id);
    }
    for (i, planet) in planets.iter().enumerate() {
        if !homes.contains(&i) {
            ids.push(planet.id);
        }
    }
    for planet in planets {
        store.insert_planet(planet)?;
    }
    Ok(ids)
}

/// Greedy max-min placement: the first home is the planet farthest from the
/// origin, each following home maximizes its distance to the nearest home
/// already chosen.
fn pick_home_indices(planets: &[Planet], count: usize) -> Vec<usize> {
    let mut homes: Vec<usize> = Vec::with_capacity(count);
    if planets.is_empty() {
        return homes;
    }
    for _ in 0..count.min(planets.len()) {
        let best = (0..planets.len())
            .filter(|i| !homes.contains(i))
            .max_by(|&a, &b| {
                let score = |i: usize| {
                    if homes.is_empty() {
                        let p = &planets[i].position;
                        (p.x * p.x + p.y * p.y + p.z * p.z).sqrt()
                    } else {
                        homes
                            .iter()
                            .map(|&h| planets[i].position.distance_to(&planets[h].position))
                            .fold(f64::INFINITY, f64::min)
                    }
                };
                score(a)
                    .partial_cmp(&score(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        match best {
            Some(i) => homes.push(i),
            None => break,
        }
    }
    homes
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_game(store: &MemoryStore) -> GameId {
        let game = Game::new(4);
        let id = game.id;
        store.insert_game(game).unwrap();
        id
    }

    #[test]
    fn generates_a_full_grid() {
        let store = MemoryStore::new();
        let game_id = seeded_game(&store);
        let ids = generate_galaxy(&store, game_id, &[], &GalaxyConfig::default()).unwrap();
        assert_eq!(ids.len(), 64);
        assert_eq!(store.planets(game_id).len(), 64);
    }

    #[test]
    fn homes_are_owned_and_garrisoned() {
        let store = MemoryStore::new();
        let game_id = seeded_game(&store);
        let players = [PlayerId::new(), PlayerId::new(), PlayerId::new()];
        let ids = generate_galaxy(&store, game_id, &players, &GalaxyConfig::default()).unwrap();

        for (home_id, owner) in ids.iter().take(3).zip(&players) {
            let planet = store.planet(*home_id).unwrap();
            assert_eq!(planet.owner_id, Some(*owner));
            assert_eq!(planet.troop_count, HOME_GARRISON);
        }
        let owned = store
            .planets(game_id)
            .iter()
            .filter(|p| p.owner_id.is_some())
            .count();
        assert_eq!(owned, 3);
    }

    #[test]
    fn homes_are_spread_apart() {
        let store = MemoryStore::new();
        let game_id = seeded_game(&store);
        let players = [PlayerId::new(), PlayerId::new()];
        let config = GalaxyConfig::default();
        let ids = generate_galaxy(&store, game_id, &players, &config).unwrap();

        let a = store.planet(ids[0]).unwrap();
        let b = store.planet(ids[1]).unwrap();
        // Two homes on a 4x4x4 grid should sit at least a grid pitch apart.
        assert!(a.position.distance_to(&b.position) > config.spacing);
    }

    #[test]
    fn same_seed_reproduces_the_same_galaxy() {
        let snapshot = |seed: u64| {
            let store = MemoryStore::new();
            let game_id = seeded_game(&store);
            let config = GalaxyConfig {
                seed,
                ..GalaxyConfig::default()
            };
            generate_galaxy(&store, game_id, &[], &config).unwrap();
            store
                .planets(game_id)
                .iter()
                .map(|p| {
                    (
                        p.name.clone(),
                        p.troop_count,
                        p.has_minerals,
                        p.in_nebula,
                        p.energy_generation,
                    )
                })
                .collect::<std::collections::HashSet<_>>()
        };
        assert_eq!(snapshot(11), snapshot(11));
        assert_ne!(snapshot(11), snapshot(12));
    }

    #[test]
    fn neutral_attributes_stay_in_range() {
        let store = MemoryStore::new();
        let game_id = seeded_game(&store);
        generate_galaxy(&store, game_id, &[], &GalaxyConfig::default()).unwrap();
        for planet in store.planets(game_id) {
            assert!((20..=120).contains(&planet.troop_count));
            assert!((5..=25).contains(&planet.energy_generation));
        }
    }
}
