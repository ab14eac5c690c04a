//! Row types for the ten tables, with the check-constraint constants the
//! store enforces on insert.
//!
//! Rows are plain serde structs; lifecycle columns are snake_case enums so
//! the wire representation matches the persisted column values. Cross-table
//! references are typed ids, never embedded rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geom::Position;
use crate::ids::{AttackId, GameId, PlanetId, PlayerId, SectorId, StructureId};

// ---------------------------------------------------------------------------
// Caps and check constraints
// ---------------------------------------------------------------------------

/// Garrison cap of a planet with no colony stations.
pub const BASE_TROOP_CAP: i64 = 500;
/// Additional garrison cap per colony-station level.
pub const TROOP_CAP_PER_COLONY_LEVEL: i64 = 100;

/// Resource caps (invariant: resources stay in `[0, cap]`).
pub const CREDITS_CAP: i64 = 1_000_000;
pub const ENERGY_CAP: i64 = 100_000;
pub const MINERALS_CAP: i64 = 100_000;
pub const RESEARCH_CAP: i64 = 1_000;

/// Allowed range of `games.victory_condition` (percent).
pub const VICTORY_CONDITION_RANGE: std::ops::RangeInclusive<f64> = 30.0..=100.0;
/// Allowed range of `games.tick_rate_ms`.
pub const TICK_RATE_RANGE: std::ops::RangeInclusive<i64> = 50..=1000;

/// Clamp a resource value into `[0, cap]`.
pub fn clamp_resource(value: i64, cap: i64) -> i64 {
    value.clamp(0, cap)
}

// ---------------------------------------------------------------------------
// Games
// ---------------------------------------------------------------------------

/// Lifecycle state of a game. Terminal states are sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Waiting,
    Active,
    Completed,
}

/// How a completed game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VictoryType {
    PlanetControl,
    TerritoryControl,
    Abandoned,
}

/// A `games` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub status: GameStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub winner_id: Option<PlayerId>,
    pub victory_type: Option<VictoryType>,
    /// Percentage of planets or territory required to win.
    pub victory_condition: f64,
    pub tick_rate_ms: i64,
    pub max_players: u32,
    pub game_duration_seconds: Option<i64>,
}

impl Game {
    /// A fresh `waiting` game with default victory condition and tick rate.
    pub fn new(max_players: u32) -> Self {
        Self {
            id: GameId::new(),
            status: GameStatus::Waiting,
            started_at: None,
            ended_at: None,
            winner_id: None,
            victory_type: None,
            victory_condition: 80.0,
            tick_rate_ms: 100,
            max_players,
            game_duration_seconds: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Players and participants
// ---------------------------------------------------------------------------

/// Difficulty tier of a bot. Scales offensive and build behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotDifficulty {
    Easy,
    Normal,
    Hard,
}

impl BotDifficulty {
    /// The multiplier applied to all offensive and build
    /// probabilities/strengths.
    pub fn scaling(self) -> f64 {
        match self {
            BotDifficulty::Easy => 0.5,
            BotDifficulty::Normal => 0.75,
            BotDifficulty::Hard => 1.0,
        }
    }
}

/// A `players` row. Players are independent of any single game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub username: String,
    pub credits: i64,
    pub energy: i64,
    pub minerals: i64,
    pub research_points: i64,
    pub is_bot: bool,
    pub bot_difficulty: BotDifficulty,
}

impl Player {
    pub fn human(username: impl Into<String>) -> Self {
        Self {
            id: PlayerId::new(),
            username: username.into(),
            credits: 0,
            energy: 0,
            minerals: 0,
            research_points: 0,
            is_bot: false,
            bot_difficulty: BotDifficulty::Normal,
        }
    }

    pub fn bot(username: impl Into<String>, difficulty: BotDifficulty) -> Self {
        Self {
            is_bot: true,
            bot_difficulty: difficulty,
            ..Self::human(username)
        }
    }
}

/// A `game_players` row: one participant of one game.
///
/// The host is the participant with the lowest `placement_order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamePlayer {
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub empire_color: String,
    pub placement_order: u32,
    pub is_ready: bool,
    pub is_alive: bool,
    pub is_eliminated: bool,
    pub eliminated_at: Option<DateTime<Utc>>,
    /// Presence flag, cleared by the mark-inactive endpoint.
    pub is_active: bool,
    pub last_seen: DateTime<Utc>,
    pub final_placement: Option<u32>,
    pub final_territory_percentage: Option<f64>,
    /// Running maximum territory percentage, updated every tick.
    pub peak_territory_percentage: f64,
}

impl GamePlayer {
    pub fn new(
        game_id: GameId,
        player_id: PlayerId,
        empire_color: impl Into<String>,
        placement_order: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            game_id,
            player_id,
            empire_color: empire_color.into(),
            placement_order,
            is_ready: false,
            is_alive: true,
            is_eliminated: false,
            eliminated_at: None,
            is_active: true,
            last_seen: now,
            final_placement: None,
            final_territory_percentage: None,
            peak_territory_percentage: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Planets
// ---------------------------------------------------------------------------

/// A `systems` row: a positioned garrison-producing planet, the unit of
/// ownership. Never deleted while its game lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Planet {
    pub id: PlanetId,
    pub game_id: GameId,
    pub name: String,
    pub position: Position,
    pub owner_id: Option<PlayerId>,
    pub troop_count: i64,
    pub energy_generation: i64,
    pub has_minerals: bool,
    pub in_nebula: bool,
}

/// Terrain class a battle is fought in, derived from the target planet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerrainType {
    Space,
    Nebula,
    Asteroid,
}

impl TerrainType {
    /// Nebulae shelter defenders the most, asteroid fields somewhat.
    pub fn for_planet(planet: &Planet) -> Self {
        if planet.in_nebula {
            TerrainType::Nebula
        } else if planet.has_minerals {
            TerrainType::Asteroid
        } else {
            TerrainType::Space
        }
    }

    pub fn defense_multiplier(self) -> f64 {
        match self {
            TerrainType::Space => 1.0,
            TerrainType::Asteroid => 1.25,
            TerrainType::Nebula => 1.5,
        }
    }
}

// ---------------------------------------------------------------------------
// Attacks
// ---------------------------------------------------------------------------

/// Transit state of a troop movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackStatus {
    InTransit,
    Retreating,
    Arrived,
}

/// A `planet_attacks` row: troops in flight between two planets.
///
/// The tick processor resolves an attack once `arrival_at <= now` while the
/// status is still `in_transit`; the status transition happens exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attack {
    pub id: AttackId,
    pub game_id: GameId,
    pub attacker_id: PlayerId,
    pub source_planet_id: PlanetId,
    pub target_planet_id: PlanetId,
    pub troops: i64,
    pub arrival_at: DateTime<Utc>,
    pub status: AttackStatus,
}

impl Attack {
    pub fn launch(
        game_id: GameId,
        attacker_id: PlayerId,
        source_planet_id: PlanetId,
        target_planet_id: PlanetId,
        troops: i64,
        arrival_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AttackId::new(),
            game_id,
            attacker_id,
            source_planet_id,
            target_planet_id,
            troops,
            arrival_at,
            status: AttackStatus::InTransit,
        }
    }
}

// ---------------------------------------------------------------------------
// Territory sectors
// ---------------------------------------------------------------------------

/// A `territory_sectors` row: one painted cubelet of territory, owned by the
/// planet that painted it. Append-only; owner flips on planet capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerritorySector {
    pub id: SectorId,
    pub game_id: GameId,
    pub position: Position,
    pub owner_id: Option<PlayerId>,
    pub controlled_by_planet_id: PlanetId,
    pub captured_at: DateTime<Utc>,
    /// 1, 2 or 3; set by the expansion tier active at insert time.
    pub expansion_tier: u8,
    pub expansion_wave: u32,
    pub distance_from_planet: f64,
}

// ---------------------------------------------------------------------------
// Structures
// ---------------------------------------------------------------------------

/// Kind of station built on a planet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureType {
    TradeStation,
    MiningStation,
    ColonyStation,
    DefensePlatform,
    MissileBattery,
    PointDefense,
}

/// A `structures` row. Inactive structures are ignored by every phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Structure {
    pub id: StructureId,
    pub game_id: GameId,
    pub system_id: PlanetId,
    pub owner_id: PlayerId,
    pub structure_type: StructureType,
    pub level: u32,
    pub health: u32,
    pub is_active: bool,
}

impl Structure {
    pub fn build(
        game_id: GameId,
        system_id: PlanetId,
        owner_id: PlayerId,
        structure_type: StructureType,
    ) -> Self {
        Self {
            id: StructureId::new(),
            game_id,
            system_id,
            owner_id,
            structure_type,
            level: 1,
            health: 100,
            is_active: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Combat logs
// ---------------------------------------------------------------------------

/// How a resolved attack ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatResult {
    AttackerVictory,
    DefenderVictory,
    Retreat,
}

/// A `combat_logs` row. Append-only; read back by the stats computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatLog {
    pub game_id: GameId,
    pub attacker_id: PlayerId,
    pub defender_id: Option<PlayerId>,
    pub system_id: PlanetId,
    pub attacker_troops: i64,
    pub defender_troops: i64,
    pub attacker_losses: i64,
    pub defender_losses: i64,
    pub survivors: i64,
    pub terrain_type: TerrainType,
    pub had_flanking: bool,
    pub was_encircled: bool,
    pub had_defense_station: bool,
    pub had_elevation: bool,
    pub combat_result: CombatResult,
    pub occurred_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tick counter and final stats
// ---------------------------------------------------------------------------

/// A `game_ticks` row: the per-game serialized tick counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameTick {
    pub game_id: GameId,
    pub tick_number: u64,
    pub last_tick_at: DateTime<Utc>,
}

/// A `game_stats` row: one participant's final summary, written once at game
/// completion via idempotent upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStats {
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub planets_controlled: u64,
    pub territory_percentage: f64,
    pub troops_sent: i64,
    pub planets_captured: u64,
    pub combat_wins: u64,
    pub combat_losses: u64,
    pub structures_built: u64,
    pub peak_territory_percentage: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
