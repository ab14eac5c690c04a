//! Stellar Server -- the HTTP surface and tick driver around the engine.
//!
//! Two endpoints: `POST /tick` advances a game by one tick and reports the
//! outcome in the wire format clients expect; `POST /mark-inactive` clears a
//! participant's presence flag (called from a browser beacon on unload).
//! Both are CORS-permissive so any client origin can reach them.
//!
//! The driver scans for active games and invokes the tick per game at its
//! configured `tick_rate_ms`. Correctness never depends on the driver: ticks
//! may overlap or be missed, and the engine's conditional store operations
//! absorb both.

#![deny(unsafe_code)]

pub mod api;
pub mod driver;
