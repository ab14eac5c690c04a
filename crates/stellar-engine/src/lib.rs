//! Stellar Engine -- the authoritative tick processor.
//!
//! One call to [`tick::process_tick`] advances a game by a single tick:
//! presence gating, the atomic tick increment, garrison growth, attack
//! resolution with combat modifiers, frontier territory expansion,
//! elimination, victory detection with guarded finalization, resource
//! income, and the bot planners -- in that fixed order.
//!
//! The processor owns no state of its own. Every read and write goes through
//! the [`stellar_store::store::MemoryStore`], each store call is a
//! suspension point, and the only serialization points are the atomic tick
//! counter and the guarded completion update. Two invocations for the same
//! game may overlap; the conditional store operations make the overlap
//! harmless.
//!
//! # Quick Start
//!
//! ```
//! use chrono::Utc;
//! use stellar_engine::prelude::*;
//! use stellar_store::prelude::*;
//!
//! let store = MemoryStore::new();
//! let game = Game::new(2);
//! let game_id = game.id;
//! store.insert_game(game).unwrap();
//!
//! // A waiting game ticks to a no-op.
//! let outcome = process_tick(&store, game_id, Utc::now()).unwrap();
//! assert!(matches!(outcome, TickOutcome::Skipped(SkipReason::NotActive)));
//! ```

#![deny(unsafe_code)]

pub mod bots;
pub mod combat;
pub mod economy;
pub mod finalize;
pub mod galaxy;
pub mod growth;
pub mod presence;
pub mod standings;
pub mod territory;
pub mod tick;

use stellar_store::StoreError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors surfaced by a tick invocation.
///
/// Per-attack and per-planet failures never reach this level; they are
/// logged and retried on the next tick. What does reach it: a missing game,
/// a store failure outside the retryable paths, and a tick counter that
/// stayed uninitialized after the insert-and-retry recovery.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Shorthand result alias for tick processing.
pub type TickResult<T> = Result<T, TickError>;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for driving the engine.
pub mod prelude {
    pub use crate::galaxy::{generate_galaxy, GalaxyConfig};
    pub use crate::tick::{process_tick, SkipReason, TickOutcome, TickStats};
    pub use crate::{TickError, TickResult};
}
