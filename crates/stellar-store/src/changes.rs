//! Row-change notifications.
//!
//! Every store write emits a [`RowChange`] on a broadcast channel. Clients
//! (and tests) subscribe and filter by `game_id`; the tick processor never
//! publishes explicitly -- the store does it as part of each write, the same
//! way the real middleware fans out row changes.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::ids::GameId;

/// Capacity of the broadcast ring. Laggy subscribers miss old events, which
/// mirrors the at-most-once delivery of the realtime middleware.
const CHANNEL_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// RowChange
// ---------------------------------------------------------------------------

/// The table a change happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Games,
    GamePlayers,
    Players,
    Systems,
    TerritorySectors,
    PlanetAttacks,
    CombatLogs,
    Structures,
    GameTicks,
    GameStats,
}

/// The kind of write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
}

/// One row-level change event. `game_id` is `None` only for `players` rows,
/// which are shared across games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowChange {
    pub table: Table,
    pub game_id: Option<GameId>,
    pub op: ChangeOp,
}

// ---------------------------------------------------------------------------
// ChangeHub
// ---------------------------------------------------------------------------

/// Fan-out point for row changes. Sends never block; with no subscribers the
/// event is dropped.
#[derive(Debug)]
pub struct ChangeHub {
    tx: broadcast::Sender<RowChange>,
}

impl ChangeHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to all subsequent row changes.
    pub fn subscribe(&self) -> broadcast::Receiver<RowChange> {
        self.tx.subscribe()
    }

    /// Publish a change. Dropped silently when nobody listens.
    pub fn publish(&self, change: RowChange) {
        let _ = self.tx.send(change);
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
