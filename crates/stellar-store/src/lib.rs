//! Stellar Store -- durable data model and in-process relational store.
//!
//! This crate stands in for the persistent middleware of the stellar tick
//! engine: ten relational tables (`games`, `game_players`, `players`,
//! `systems`, `territory_sectors`, `planet_attacks`, `combat_logs`,
//! `structures`, `game_ticks`, `game_stats`), stored-procedure-shaped
//! operations with conditional updates, an atomic per-game tick counter, and
//! row-change notifications.
//!
//! Every [`MemoryStore`] operation takes the table lock once, mutates, emits
//! row-change events, and releases -- one operation is one database
//! round-trip. Callers must assume other writers interleave between any two
//! operations and re-check state before writing, exactly as they would
//! against a remote database.
//!
//! # Quick Start
//!
//! ```
//! use stellar_store::prelude::*;
//! use chrono::Utc;
//!
//! let store = MemoryStore::new();
//! let game = Game::new(8);
//! let game_id = game.id;
//! store.insert_game(game).unwrap();
//!
//! let tick = store.increment_game_tick(game_id, Utc::now());
//! assert!(tick.is_err()); // counter row not initialized yet
//!
//! store.init_game_tick(game_id).unwrap();
//! assert_eq!(store.increment_game_tick(game_id, Utc::now()).unwrap(), 1);
//! ```

#![deny(unsafe_code)]

pub mod changes;
pub mod geom;
pub mod ids;
pub mod rows;
pub mod store;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

use ids::{AttackId, GameId, PlanetId, PlayerId, StructureId};

/// Errors produced by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No `games` row with this id.
    #[error("unknown game {0}")]
    UnknownGame(GameId),

    /// No `players` row with this id.
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    /// No `systems` row with this id.
    #[error("unknown planet {0}")]
    UnknownPlanet(PlanetId),

    /// No `planet_attacks` row with this id.
    #[error("unknown attack {0}")]
    UnknownAttack(AttackId),

    /// No `structures` row with this id.
    #[error("unknown structure {0}")]
    UnknownStructure(StructureId),

    /// No `game_players` row for this `(game_id, player_id)` pair.
    #[error("player {player_id} is not a participant of game {game_id}")]
    UnknownParticipant {
        game_id: GameId,
        player_id: PlayerId,
    },

    /// The `game_ticks` row for this game has not been created yet.
    /// Recoverable: insert the initial row and retry.
    #[error("tick counter for game {0} is not initialized")]
    TickCounterNotInitialized(GameId),

    /// A unique constraint was violated on insert.
    #[error("duplicate row: {0}")]
    DuplicateRow(&'static str),

    /// A check constraint was violated.
    #[error("check constraint violated: {0}")]
    CheckViolation(String),
}

/// Shorthand result alias used throughout the store.
pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::changes::{ChangeOp, RowChange, Table};
    pub use crate::geom::{AxisDirection, Position};
    pub use crate::ids::{AttackId, GameId, PlanetId, PlayerId, SectorId, StructureId};
    pub use crate::rows::{
        Attack, AttackStatus, BotDifficulty, CombatLog, CombatResult, Game, GamePlayer,
        GameStats, GameStatus, GameTick, Planet, Player, Structure, StructureType,
        TerrainType, TerritorySector, VictoryType,
    };
    pub use crate::store::{
        AttackSettlement, MemoryStore, OwnerGuard, ResourceIncome, SettlementApplied,
        TargetWrite,
    };
    pub use crate::{StoreError, StoreResult};
}
