//! The in-process relational store.
//!
//! [`MemoryStore`] holds all ten tables behind one `parking_lot::RwLock`.
//! Each public method acquires the lock exactly once, so a method call is
//! the unit of atomicity -- the analogue of a single statement or stored
//! procedure against the real database. Nothing is atomic *across* calls:
//! callers re-read and use the conditional operations
//! ([`MemoryStore::complete_game_if_active`],
//! [`MemoryStore::apply_attack_settlement`], ...) when exactly-once
//! semantics matter.
//!
//! Writes publish [`RowChange`] events through the [`ChangeHub`]; see
//! [`crate::changes`].

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::broadcast;

use crate::changes::{ChangeHub, ChangeOp, RowChange, Table};
use crate::ids::{AttackId, GameId, PlanetId, PlayerId, StructureId};
use crate::rows::{
    clamp_resource, Attack, AttackStatus, CombatLog, Game, GamePlayer, GameStats, GameStatus,
    GameTick, Planet, Player, Structure, TerritorySector, VictoryType, BASE_TROOP_CAP,
    CREDITS_CAP, ENERGY_CAP, MINERALS_CAP, RESEARCH_CAP, TICK_RATE_RANGE,
    VICTORY_CONDITION_RANGE,
};
use crate::{StoreError, StoreResult};

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Tables {
    games: HashMap<GameId, Game>,
    game_players: HashMap<(GameId, PlayerId), GamePlayer>,
    players: HashMap<PlayerId, Player>,
    planets: HashMap<PlanetId, Planet>,
    attacks: HashMap<AttackId, Attack>,
    sectors: Vec<TerritorySector>,
    structures: HashMap<StructureId, Structure>,
    combat_logs: Vec<CombatLog>,
    game_ticks: HashMap<GameId, GameTick>,
    game_stats: HashMap<(GameId, PlayerId), GameStats>,
}

impl Tables {
    fn game_mut(&mut self, id: GameId) -> StoreResult<&mut Game> {
        self.games.get_mut(&id).ok_or(StoreError::UnknownGame(id))
    }

    fn planet_mut(&mut self, id: PlanetId) -> StoreResult<&mut Planet> {
        self.planets
            .get_mut(&id)
            .ok_or(StoreError::UnknownPlanet(id))
    }

    fn participant_mut(
        &mut self,
        game_id: GameId,
        player_id: PlayerId,
    ) -> StoreResult<&mut GamePlayer> {
        self.game_players
            .get_mut(&(game_id, player_id))
            .ok_or(StoreError::UnknownParticipant { game_id, player_id })
    }

    /// Flip every sector controlled by `planet_id` to `new_owner` and stamp
    /// the capture time. Returns the number of rows touched.
    fn reassign_planet_sectors(
        &mut self,
        planet_id: PlanetId,
        new_owner: Option<PlayerId>,
        now: DateTime<Utc>,
    ) -> usize {
        let mut touched = 0;
        for sector in self
            .sectors
            .iter_mut()
            .filter(|s| s.controlled_by_planet_id == planet_id)
        {
            sector.owner_id = new_owner;
            sector.captured_at = now;
            touched += 1;
        }
        touched
    }
}

// ---------------------------------------------------------------------------
// Attack settlement
// ---------------------------------------------------------------------------

/// What the resolved attack does to the target planet.
#[derive(Debug, Clone, Copy)]
pub enum TargetWrite {
    /// Attacker victory: flip ownership, set the surviving garrison, and
    /// reassign every sector the planet controls.
    Capture { new_owner: PlayerId, troops: i64 },
    /// Defender victory: set the remaining garrison, ownership unchanged.
    SetTroops { troops: i64 },
    /// Friendly arrival: add troops, clamped to the planet's effective max.
    Reinforce { amount: i64, cap: i64 },
    /// Retreat: the target is untouched.
    Unchanged,
}

/// Guard on the target's owner at apply time. The settlement was computed
/// from a read several round-trips ago; the guard rejects it if a concurrent
/// tick changed the defender in between.
#[derive(Debug, Clone, Copy)]
pub enum OwnerGuard {
    Any,
    Expect(Option<PlayerId>),
}

/// A fully computed attack resolution, applied in one atomic store call.
///
/// The target write, the optional troop return to the source, the combat log
/// append, and the `in_transit -> arrived/retreating` transition all happen
/// under one lock acquisition, so the planet is never observable in the new
/// state while the attack still claims to be in transit, and a second
/// processor applying the same settlement is a no-op.
#[derive(Debug, Clone)]
pub struct AttackSettlement {
    pub attack_id: AttackId,
    /// `Arrived` or `Retreating`.
    pub new_status: AttackStatus,
    pub owner_guard: OwnerGuard,
    pub target_write: TargetWrite,
    /// Retreat path: `(source_planet, troops_returned)`. The return tops the
    /// source up toward the base 500 cap and never drains it.
    pub source_return: Option<(PlanetId, i64)>,
    pub log: Option<CombatLog>,
}

/// Outcome of [`MemoryStore::apply_attack_settlement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementApplied {
    Applied { sectors_reassigned: usize },
    /// The attack had already left `in_transit` -- another invocation won.
    AlreadySettled,
    /// The target's owner no longer matches the guard; nothing was written
    /// and the attack remains `in_transit` for the next tick.
    StaleOwner,
}

/// Per-participant resource income, applied with clamps in one call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceIncome {
    pub credits: i64,
    pub energy: i64,
    pub minerals: i64,
    pub research: i64,
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// The shared store. Cheap to share behind an `Arc`; every method takes
/// `&self`.
#[derive(Debug)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
    hub: ChangeHub,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Tables::default()),
            hub: ChangeHub::new(),
        }
    }

    /// Subscribe to row-change events for all tables.
    pub fn subscribe(&self) -> broadcast::Receiver<RowChange> {
        self.hub.subscribe()
    }

    fn emit(&self, table: Table, game_id: Option<GameId>, op: ChangeOp) {
        self.hub.publish(RowChange { table, game_id, op });
    }

    // -- games --------------------------------------------------------------

    /// Insert a `games` row, enforcing the check constraints.
    pub fn insert_game(&self, game: Game) -> StoreResult<()> {
        if !VICTORY_CONDITION_RANGE.contains(&game.victory_condition) {
            return Err(StoreError::CheckViolation(format!(
                "victory_condition {} outside [30, 100]",
                game.victory_condition
            )));
        }
        if !TICK_RATE_RANGE.contains(&game.tick_rate_ms) {
            return Err(StoreError::CheckViolation(format!(
                "tick_rate_ms {} outside [50, 1000]",
                game.tick_rate_ms
            )));
        }
        let id = game.id;
        let mut tables = self.inner.write();
        if tables.games.contains_key(&id) {
            return Err(StoreError::DuplicateRow("games"));
        }
        tables.games.insert(id, game);
        drop(tables);
        self.emit(Table::Games, Some(id), ChangeOp::Insert);
        Ok(())
    }

    pub fn game(&self, id: GameId) -> StoreResult<Game> {
        self.inner
            .read()
            .games
            .get(&id)
            .cloned()
            .ok_or(StoreError::UnknownGame(id))
    }

    /// Conditional `waiting -> active` transition. Returns `false` when the
    /// game was not in `waiting`.
    pub fn start_game(&self, id: GameId, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut tables = self.inner.write();
        let game = tables.game_mut(id)?;
        if game.status != GameStatus::Waiting {
            return Ok(false);
        }
        game.status = GameStatus::Active;
        game.started_at = Some(now);
        drop(tables);
        self.emit(Table::Games, Some(id), ChangeOp::Update);
        Ok(true)
    }

    /// The guarded completion update: `WHERE status = 'active'`. Returns
    /// `true` iff this call performed the transition; a concurrent completer
    /// makes this return `false` with nothing written.
    pub fn complete_game_if_active(
        &self,
        id: GameId,
        winner_id: Option<PlayerId>,
        victory_type: VictoryType,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tables = self.inner.write();
        let game = tables.game_mut(id)?;
        if game.status != GameStatus::Active {
            return Ok(false);
        }
        game.status = GameStatus::Completed;
        game.winner_id = winner_id;
        game.victory_type = Some(victory_type);
        game.ended_at = Some(now);
        game.game_duration_seconds = game
            .started_at
            .map(|started| (now - started).num_seconds().max(0));
        drop(tables);
        tracing::debug!(game_id = %id, victory_type = ?victory_type, "game row completed");
        self.emit(Table::Games, Some(id), ChangeOp::Update);
        Ok(true)
    }

    /// Abandonment transition: `waiting|active -> completed` with
    /// `victory_type = abandoned` and no winner. Returns `false` when the
    /// game was already terminal.
    pub fn abandon_game_if_open(&self, id: GameId, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut tables = self.inner.write();
        let game = tables.game_mut(id)?;
        if game.status == GameStatus::Completed {
            return Ok(false);
        }
        game.status = GameStatus::Completed;
        game.winner_id = None;
        game.victory_type = Some(VictoryType::Abandoned);
        game.ended_at = Some(now);
        game.game_duration_seconds = game
            .started_at
            .map(|started| (now - started).num_seconds().max(0));
        drop(tables);
        tracing::debug!(game_id = %id, "game row abandoned");
        self.emit(Table::Games, Some(id), ChangeOp::Update);
        Ok(true)
    }

    /// Ids of all games currently in `active`. Used by the tick driver.
    pub fn active_game_ids(&self) -> Vec<GameId> {
        let tables = self.inner.read();
        let mut ids: Vec<GameId> = tables
            .games
            .values()
            .filter(|g| g.status == GameStatus::Active)
            .map(|g| g.id)
            .collect();
        ids.sort();
        ids
    }

    // -- players ------------------------------------------------------------

    pub fn insert_player(&self, player: Player) -> StoreResult<()> {
        let id = player.id;
        let mut tables = self.inner.write();
        if tables.players.contains_key(&id) {
            return Err(StoreError::DuplicateRow("players"));
        }
        tables.players.insert(id, player);
        drop(tables);
        self.emit(Table::Players, None, ChangeOp::Insert);
        Ok(())
    }

    pub fn player(&self, id: PlayerId) -> StoreResult<Player> {
        self.inner
            .read()
            .players
            .get(&id)
            .cloned()
            .ok_or(StoreError::UnknownPlayer(id))
    }

    /// Add income to a player's resources, clamping each to `[0, cap]`.
    /// Returns the updated row.
    pub fn apply_income(&self, id: PlayerId, income: ResourceIncome) -> StoreResult<Player> {
        let mut tables = self.inner.write();
        let player = tables
            .players
            .get_mut(&id)
            .ok_or(StoreError::UnknownPlayer(id))?;
        player.credits = clamp_resource(player.credits.saturating_add(income.credits), CREDITS_CAP);
        player.energy = clamp_resource(player.energy.saturating_add(income.energy), ENERGY_CAP);
        player.minerals =
            clamp_resource(player.minerals.saturating_add(income.minerals), MINERALS_CAP);
        player.research_points = clamp_resource(
            player.research_points.saturating_add(income.research),
            RESEARCH_CAP,
        );
        let updated = player.clone();
        drop(tables);
        self.emit(Table::Players, None, ChangeOp::Update);
        Ok(updated)
    }

    /// Conditional spend: debits `amount` iff the balance covers it.
    pub fn try_spend_credits(&self, id: PlayerId, amount: i64) -> StoreResult<bool> {
        let mut tables = self.inner.write();
        let player = tables
            .players
            .get_mut(&id)
            .ok_or(StoreError::UnknownPlayer(id))?;
        if player.credits < amount {
            return Ok(false);
        }
        player.credits -= amount;
        drop(tables);
        self.emit(Table::Players, None, ChangeOp::Update);
        Ok(true)
    }

    // -- game_players -------------------------------------------------------

    pub fn insert_game_player(&self, gp: GamePlayer) -> StoreResult<()> {
        let key = (gp.game_id, gp.player_id);
        let mut tables = self.inner.write();
        if !tables.games.contains_key(&gp.game_id) {
            return Err(StoreError::UnknownGame(gp.game_id));
        }
        if tables.game_players.contains_key(&key) {
            return Err(StoreError::DuplicateRow("game_players"));
        }
        tables.game_players.insert(key, gp);
        drop(tables);
        self.emit(Table::GamePlayers, Some(key.0), ChangeOp::Insert);
        Ok(())
    }

    /// Every participant of a game, host first (`placement_order` ascending,
    /// player id as tiebreak).
    pub fn participants(&self, game_id: GameId) -> Vec<GamePlayer> {
        let tables = self.inner.read();
        let mut rows: Vec<GamePlayer> = tables
            .game_players
            .values()
            .filter(|gp| gp.game_id == game_id)
            .cloned()
            .collect();
        rows.sort_by_key(|gp| (gp.placement_order, gp.player_id));
        rows
    }

    pub fn participant(&self, game_id: GameId, player_id: PlayerId) -> StoreResult<GamePlayer> {
        self.inner
            .read()
            .game_players
            .get(&(game_id, player_id))
            .cloned()
            .ok_or(StoreError::UnknownParticipant { game_id, player_id })
    }

    /// Heartbeat: refresh presence for a participant.
    pub fn touch_presence(
        &self,
        game_id: GameId,
        player_id: PlayerId,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tables = self.inner.write();
        let gp = tables.participant_mut(game_id, player_id)?;
        gp.is_active = true;
        gp.last_seen = now;
        drop(tables);
        self.emit(Table::GamePlayers, Some(game_id), ChangeOp::Update);
        Ok(())
    }

    /// The mark-inactive endpoint's write. Returns `false` when the flag was
    /// already clear.
    pub fn set_participant_inactive(
        &self,
        game_id: GameId,
        player_id: PlayerId,
    ) -> StoreResult<bool> {
        let mut tables = self.inner.write();
        let gp = tables.participant_mut(game_id, player_id)?;
        if !gp.is_active {
            return Ok(false);
        }
        gp.is_active = false;
        drop(tables);
        self.emit(Table::GamePlayers, Some(game_id), ChangeOp::Update);
        Ok(true)
    }

    /// Conditional elimination: only fires for a living, not-yet-eliminated
    /// participant.
    pub fn eliminate_participant(
        &self,
        game_id: GameId,
        player_id: PlayerId,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tables = self.inner.write();
        let gp = tables.participant_mut(game_id, player_id)?;
        if gp.is_eliminated || !gp.is_alive {
            return Ok(false);
        }
        gp.is_eliminated = true;
        gp.is_alive = false;
        gp.eliminated_at = Some(now);
        drop(tables);
        self.emit(Table::GamePlayers, Some(game_id), ChangeOp::Update);
        Ok(true)
    }

    /// Rewrite placement orders after a host promotion. Unlisted
    /// participants keep their order.
    pub fn set_placement_orders(
        &self,
        game_id: GameId,
        assignments: &[(PlayerId, u32)],
    ) -> StoreResult<usize> {
        let mut tables = self.inner.write();
        let mut touched = 0;
        for (player_id, order) in assignments {
            let gp = tables.participant_mut(game_id, *player_id)?;
            gp.placement_order = *order;
            touched += 1;
        }
        drop(tables);
        if touched > 0 {
            self.emit(Table::GamePlayers, Some(game_id), ChangeOp::Update);
        }
        Ok(touched)
    }

    /// Ratchet the running peak territory percentage upward.
    pub fn record_peak_territory(
        &self,
        game_id: GameId,
        player_id: PlayerId,
        territory_pct: f64,
    ) -> StoreResult<()> {
        let mut tables = self.inner.write();
        let gp = tables.participant_mut(game_id, player_id)?;
        if territory_pct > gp.peak_territory_percentage {
            gp.peak_territory_percentage = territory_pct;
            drop(tables);
            self.emit(Table::GamePlayers, Some(game_id), ChangeOp::Update);
        }
        Ok(())
    }

    /// Write the final placement and territory share at game completion.
    pub fn set_final_result(
        &self,
        game_id: GameId,
        player_id: PlayerId,
        placement: u32,
        territory_pct: f64,
    ) -> StoreResult<()> {
        let mut tables = self.inner.write();
        let gp = tables.participant_mut(game_id, player_id)?;
        gp.final_placement = Some(placement);
        gp.final_territory_percentage = Some(territory_pct);
        drop(tables);
        self.emit(Table::GamePlayers, Some(game_id), ChangeOp::Update);
        Ok(())
    }

    // -- planets ------------------------------------------------------------

    pub fn insert_planet(&self, planet: Planet) -> StoreResult<()> {
        let (id, game_id) = (planet.id, planet.game_id);
        let mut tables = self.inner.write();
        if tables.planets.contains_key(&id) {
            return Err(StoreError::DuplicateRow("systems"));
        }
        tables.planets.insert(id, planet);
        drop(tables);
        self.emit(Table::Systems, Some(game_id), ChangeOp::Insert);
        Ok(())
    }

    pub fn planet(&self, id: PlanetId) -> StoreResult<Planet> {
        self.inner
            .read()
            .planets
            .get(&id)
            .cloned()
            .ok_or(StoreError::UnknownPlanet(id))
    }

    /// All planets of a game in stable scan order (id ascending).
    pub fn planets(&self, game_id: GameId) -> Vec<Planet> {
        let tables = self.inner.read();
        let mut rows: Vec<Planet> = tables
            .planets
            .values()
            .filter(|p| p.game_id == game_id)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.id);
        rows
    }

    /// Overwrite a planet's garrison (floored at zero).
    pub fn set_planet_troops(&self, id: PlanetId, troops: i64) -> StoreResult<()> {
        let mut tables = self.inner.write();
        let planet = tables.planet_mut(id)?;
        let game_id = planet.game_id;
        planet.troop_count = troops.max(0);
        drop(tables);
        self.emit(Table::Systems, Some(game_id), ChangeOp::Update);
        Ok(())
    }

    /// Add troops, clamping the result to `cap`. Returns the new garrison.
    pub fn add_planet_troops_clamped(
        &self,
        id: PlanetId,
        amount: i64,
        cap: i64,
    ) -> StoreResult<i64> {
        let mut tables = self.inner.write();
        let planet = tables.planet_mut(id)?;
        let game_id = planet.game_id;
        planet.troop_count = (planet.troop_count + amount).clamp(0, cap);
        let new_count = planet.troop_count;
        drop(tables);
        self.emit(Table::Systems, Some(game_id), ChangeOp::Update);
        Ok(new_count)
    }

    // -- attacks ------------------------------------------------------------

    /// Create an attack and debit its troops from the source planet in one
    /// call. Returns `false` (inserting nothing) if the source no longer has
    /// the troops or belongs to someone else.
    pub fn launch_attack(&self, attack: Attack) -> StoreResult<bool> {
        let mut tables = self.inner.write();
        let source = tables.planet_mut(attack.source_planet_id)?;
        if source.owner_id != Some(attack.attacker_id) || source.troop_count < attack.troops {
            return Ok(false);
        }
        source.troop_count -= attack.troops;
        let game_id = attack.game_id;
        tables.attacks.insert(attack.id, attack);
        drop(tables);
        self.emit(Table::Systems, Some(game_id), ChangeOp::Update);
        self.emit(Table::PlanetAttacks, Some(game_id), ChangeOp::Insert);
        Ok(true)
    }

    pub fn attack(&self, id: AttackId) -> StoreResult<Attack> {
        self.inner
            .read()
            .attacks
            .get(&id)
            .cloned()
            .ok_or(StoreError::UnknownAttack(id))
    }

    /// In-transit attacks due for resolution, in the stable resolution order
    /// (`arrival_at` ascending, then id ascending).
    pub fn due_attacks(&self, game_id: GameId, now: DateTime<Utc>) -> Vec<Attack> {
        let tables = self.inner.read();
        let mut rows: Vec<Attack> = tables
            .attacks
            .values()
            .filter(|a| {
                a.game_id == game_id && a.status == AttackStatus::InTransit && a.arrival_at <= now
            })
            .cloned()
            .collect();
        rows.sort_by_key(|a| (a.arrival_at, a.id));
        rows
    }

    /// Every attack of a game, in `(arrival_at, id)` order. Read by the
    /// final stats computation.
    pub fn attacks(&self, game_id: GameId) -> Vec<Attack> {
        let tables = self.inner.read();
        let mut rows: Vec<Attack> = tables
            .attacks
            .values()
            .filter(|a| a.game_id == game_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| (a.arrival_at, a.id));
        rows
    }

    /// In-transit attacks by `attacker_id` against `target` (flanking query).
    pub fn in_transit_attacks_on_target(
        &self,
        game_id: GameId,
        attacker_id: PlayerId,
        target: PlanetId,
    ) -> Vec<Attack> {
        let tables = self.inner.read();
        let mut rows: Vec<Attack> = tables
            .attacks
            .values()
            .filter(|a| {
                a.game_id == game_id
                    && a.status == AttackStatus::InTransit
                    && a.attacker_id == attacker_id
                    && a.target_planet_id == target
            })
            .cloned()
            .collect();
        rows.sort_by_key(|a| (a.arrival_at, a.id));
        rows
    }

    /// Apply a fully computed attack resolution atomically; see
    /// [`AttackSettlement`].
    pub fn apply_attack_settlement(
        &self,
        settlement: AttackSettlement,
        now: DateTime<Utc>,
    ) -> StoreResult<SettlementApplied> {
        let mut tables = self.inner.write();
        let attack = tables
            .attacks
            .get(&settlement.attack_id)
            .ok_or(StoreError::UnknownAttack(settlement.attack_id))?;
        if attack.status != AttackStatus::InTransit {
            return Ok(SettlementApplied::AlreadySettled);
        }
        let (game_id, target_id) = (attack.game_id, attack.target_planet_id);

        {
            let target = tables.planet_mut(target_id)?;
            if let OwnerGuard::Expect(expected) = settlement.owner_guard {
                if target.owner_id != expected {
                    return Ok(SettlementApplied::StaleOwner);
                }
            }
            match settlement.target_write {
                TargetWrite::Capture { new_owner, troops } => {
                    target.owner_id = Some(new_owner);
                    target.troop_count = troops.max(0);
                }
                TargetWrite::SetTroops { troops } => {
                    target.troop_count = troops.max(0);
                }
                TargetWrite::Reinforce { amount, cap } => {
                    target.troop_count = (target.troop_count + amount).clamp(0, cap);
                }
                TargetWrite::Unchanged => {}
            }
        }

        let mut planet_written = !matches!(settlement.target_write, TargetWrite::Unchanged);
        let mut sectors_reassigned = 0;
        if let TargetWrite::Capture { new_owner, .. } = settlement.target_write {
            sectors_reassigned = tables.reassign_planet_sectors(target_id, Some(new_owner), now);
        }

        if let Some((source_id, returned)) = settlement.source_return {
            let source = tables.planet_mut(source_id)?;
            // Tops up toward the base cap only; an over-cap garrison
            // (colony-boosted) is left as is.
            if source.troop_count < BASE_TROOP_CAP {
                source.troop_count = (source.troop_count + returned).min(BASE_TROOP_CAP);
            }
            planet_written = true;
        }

        let logged = settlement.log.is_some();
        if let Some(log) = settlement.log {
            tables.combat_logs.push(log);
        }

        let attack = tables
            .attacks
            .get_mut(&settlement.attack_id)
            .ok_or(StoreError::UnknownAttack(settlement.attack_id))?;
        attack.status = settlement.new_status;
        drop(tables);

        if planet_written {
            self.emit(Table::Systems, Some(game_id), ChangeOp::Update);
        }
        if sectors_reassigned > 0 {
            self.emit(Table::TerritorySectors, Some(game_id), ChangeOp::Update);
        }
        if logged {
            self.emit(Table::CombatLogs, Some(game_id), ChangeOp::Insert);
        }
        self.emit(Table::PlanetAttacks, Some(game_id), ChangeOp::Update);
        Ok(SettlementApplied::Applied { sectors_reassigned })
    }

    // -- territory sectors --------------------------------------------------

    pub fn insert_sector(&self, sector: TerritorySector) -> StoreResult<()> {
        let game_id = sector.game_id;
        let mut tables = self.inner.write();
        tables.sectors.push(sector);
        drop(tables);
        self.emit(Table::TerritorySectors, Some(game_id), ChangeOp::Insert);
        Ok(())
    }

    /// Sectors painted by one planet.
    pub fn sectors_controlled_by(&self, planet_id: PlanetId) -> Vec<TerritorySector> {
        self.inner
            .read()
            .sectors
            .iter()
            .filter(|s| s.controlled_by_planet_id == planet_id)
            .cloned()
            .collect()
    }

    /// Every sector of a game, in insertion order.
    pub fn sectors(&self, game_id: GameId) -> Vec<TerritorySector> {
        self.inner
            .read()
            .sectors
            .iter()
            .filter(|s| s.game_id == game_id)
            .cloned()
            .collect()
    }

    pub fn sector_count(&self, game_id: GameId) -> usize {
        self.inner
            .read()
            .sectors
            .iter()
            .filter(|s| s.game_id == game_id)
            .count()
    }

    /// Flip all sectors of a planet to a new owner (capture propagation).
    pub fn reassign_planet_sectors(
        &self,
        planet_id: PlanetId,
        new_owner: Option<PlayerId>,
        now: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let mut tables = self.inner.write();
        let game_id = tables.planet_mut(planet_id)?.game_id;
        let touched = tables.reassign_planet_sectors(planet_id, new_owner, now);
        drop(tables);
        if touched > 0 {
            self.emit(Table::TerritorySectors, Some(game_id), ChangeOp::Update);
        }
        Ok(touched)
    }

    // -- structures ---------------------------------------------------------

    pub fn insert_structure(&self, structure: Structure) -> StoreResult<()> {
        if structure.level == 0 {
            return Err(StoreError::CheckViolation("structures.level must be > 0".into()));
        }
        if structure.health > 100 {
            return Err(StoreError::CheckViolation(format!(
                "structures.health {} outside [0, 100]",
                structure.health
            )));
        }
        let (id, game_id) = (structure.id, structure.game_id);
        let mut tables = self.inner.write();
        if tables.structures.contains_key(&id) {
            return Err(StoreError::DuplicateRow("structures"));
        }
        tables.structures.insert(id, structure);
        drop(tables);
        self.emit(Table::Structures, Some(game_id), ChangeOp::Insert);
        Ok(())
    }

    /// Structures sitting on one planet, in id order.
    pub fn structures_on_planet(&self, planet_id: PlanetId) -> Vec<Structure> {
        let tables = self.inner.read();
        let mut rows: Vec<Structure> = tables
            .structures
            .values()
            .filter(|s| s.system_id == planet_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.id);
        rows
    }

    /// Every structure of a game, in id order.
    pub fn structures(&self, game_id: GameId) -> Vec<Structure> {
        let tables = self.inner.read();
        let mut rows: Vec<Structure> = tables
            .structures
            .values()
            .filter(|s| s.game_id == game_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.id);
        rows
    }

    // -- combat logs --------------------------------------------------------

    pub fn append_combat_log(&self, log: CombatLog) -> StoreResult<()> {
        let game_id = log.game_id;
        self.inner.write().combat_logs.push(log);
        self.emit(Table::CombatLogs, Some(game_id), ChangeOp::Insert);
        Ok(())
    }

    pub fn combat_logs(&self, game_id: GameId) -> Vec<CombatLog> {
        self.inner
            .read()
            .combat_logs
            .iter()
            .filter(|l| l.game_id == game_id)
            .cloned()
            .collect()
    }

    // -- tick counter -------------------------------------------------------

    /// Create the tick-counter row at 0 if it does not exist. Idempotent.
    pub fn init_game_tick(&self, game_id: GameId) -> StoreResult<()> {
        let mut tables = self.inner.write();
        if !tables.games.contains_key(&game_id) {
            return Err(StoreError::UnknownGame(game_id));
        }
        let inserted = !tables.game_ticks.contains_key(&game_id);
        tables.game_ticks.entry(game_id).or_insert(GameTick {
            game_id,
            tick_number: 0,
            last_tick_at: DateTime::<Utc>::MIN_UTC,
        });
        drop(tables);
        if inserted {
            self.emit(Table::GameTicks, Some(game_id), ChangeOp::Insert);
        }
        Ok(())
    }

    /// Atomically increment the tick counter and return the new value.
    ///
    /// Fails with [`StoreError::TickCounterNotInitialized`] if the row does
    /// not exist yet; callers insert via [`init_game_tick`](Self::init_game_tick)
    /// and retry once.
    pub fn increment_game_tick(&self, game_id: GameId, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.inner.write();
        let tick = tables
            .game_ticks
            .get_mut(&game_id)
            .ok_or(StoreError::TickCounterNotInitialized(game_id))?;
        tick.tick_number += 1;
        tick.last_tick_at = now;
        let number = tick.tick_number;
        drop(tables);
        self.emit(Table::GameTicks, Some(game_id), ChangeOp::Update);
        Ok(number)
    }

    pub fn game_tick(&self, game_id: GameId) -> Option<GameTick> {
        self.inner.read().game_ticks.get(&game_id).cloned()
    }

    // -- game stats ---------------------------------------------------------

    /// Upsert on `(game_id, player_id)`, ignoring duplicates. Returns `true`
    /// iff this call inserted the row.
    pub fn upsert_game_stats(&self, stats: GameStats) -> StoreResult<bool> {
        let key = (stats.game_id, stats.player_id);
        let mut tables = self.inner.write();
        if tables.game_stats.contains_key(&key) {
            return Ok(false);
        }
        tables.game_stats.insert(key, stats);
        drop(tables);
        self.emit(Table::GameStats, Some(key.0), ChangeOp::Insert);
        Ok(true)
    }

    pub fn game_stats(&self, game_id: GameId) -> Vec<GameStats> {
        let tables = self.inner.read();
        let mut rows: Vec<GameStats> = tables
            .game_stats
            .values()
            .filter(|s| s.game_id == game_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.player_id);
        rows
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Position;
    use crate::rows::{CombatResult, StructureType, TerrainType};
    use std::sync::Arc;

    fn seeded_game(store: &MemoryStore) -> GameId {
        let game = Game::new(4);
        let id = game.id;
        store.insert_game(game).unwrap();
        id
    }

    fn seeded_planet(store: &MemoryStore, game_id: GameId, owner: Option<PlayerId>) -> PlanetId {
        let planet = Planet {
            id: PlanetId::new(),
            game_id,
            name: "Kepler".to_owned(),
            position: Position::default(),
            owner_id: owner,
            troop_count: 100,
            energy_generation: 10,
            has_minerals: false,
            in_nebula: false,
        };
        let id = planet.id;
        store.insert_planet(planet).unwrap();
        id
    }

    // -- constraints ---------------------------------------------------------

    #[test]
    fn game_check_constraints_rejected() {
        let store = MemoryStore::new();
        let mut game = Game::new(4);
        game.victory_condition = 20.0;
        assert!(matches!(
            store.insert_game(game),
            Err(StoreError::CheckViolation(_))
        ));

        let mut game = Game::new(4);
        game.tick_rate_ms = 10;
        assert!(matches!(
            store.insert_game(game),
            Err(StoreError::CheckViolation(_))
        ));
    }

    #[test]
    fn duplicate_game_player_rejected() {
        let store = MemoryStore::new();
        let game_id = seeded_game(&store);
        let player_id = PlayerId::new();
        let now = Utc::now();
        store
            .insert_game_player(GamePlayer::new(game_id, player_id, "#ff0000", 1, now))
            .unwrap();
        let err = store
            .insert_game_player(GamePlayer::new(game_id, player_id, "#00ff00", 2, now))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateRow("game_players")));
    }

    #[test]
    fn structure_check_constraints() {
        let store = MemoryStore::new();
        let game_id = seeded_game(&store);
        let planet_id = seeded_planet(&store, game_id, None);
        let mut s = Structure::build(game_id, planet_id, PlayerId::new(), StructureType::ColonyStation);
        s.level = 0;
        assert!(store.insert_structure(s).is_err());
    }

    // -- tick counter --------------------------------------------------------

    #[test]
    fn counter_requires_initialization() {
        let store = MemoryStore::new();
        let game_id = seeded_game(&store);
        let err = store.increment_game_tick(game_id, Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::TickCounterNotInitialized(_)));

        store.init_game_tick(game_id).unwrap();
        assert_eq!(store.increment_game_tick(game_id, Utc::now()).unwrap(), 1);
        assert_eq!(store.increment_game_tick(game_id, Utc::now()).unwrap(), 2);
    }

    #[test]
    fn init_game_tick_is_idempotent() {
        let store = MemoryStore::new();
        let game_id = seeded_game(&store);
        store.init_game_tick(game_id).unwrap();
        store.increment_game_tick(game_id, Utc::now()).unwrap();
        store.init_game_tick(game_id).unwrap();
        // Re-init never resets the counter.
        assert_eq!(store.increment_game_tick(game_id, Utc::now()).unwrap(), 2);
    }

    #[test]
    fn concurrent_increments_return_distinct_values() {
        let store = Arc::new(MemoryStore::new());
        let game_id = seeded_game(&store);
        store.init_game_tick(game_id).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                let mut mine = Vec::new();
                for _ in 0..50 {
                    mine.push(store.increment_game_tick(game_id, Utc::now()).unwrap());
                }
                mine
            }));
        }
        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        let before = all.len();
        all.dedup();
        assert_eq!(all.len(), before, "two increments returned the same tick");
        assert_eq!(all.len(), 400);
        assert_eq!(*all.last().unwrap(), 400);
    }

    // -- guarded completion --------------------------------------------------

    #[test]
    fn completion_is_exactly_once() {
        let store = MemoryStore::new();
        let game_id = seeded_game(&store);
        let winner = PlayerId::new();
        let now = Utc::now();
        store.start_game(game_id, now).unwrap();

        assert!(store
            .complete_game_if_active(game_id, Some(winner), VictoryType::PlanetControl, now)
            .unwrap());
        // Second completion loses the race.
        assert!(!store
            .complete_game_if_active(game_id, Some(PlayerId::new()), VictoryType::TerritoryControl, now)
            .unwrap());

        let game = store.game(game_id).unwrap();
        assert_eq!(game.status, GameStatus::Completed);
        assert_eq!(game.winner_id, Some(winner));
        assert_eq!(game.victory_type, Some(VictoryType::PlanetControl));
    }

    #[test]
    fn completion_requires_active() {
        let store = MemoryStore::new();
        let game_id = seeded_game(&store);
        assert!(!store
            .complete_game_if_active(game_id, None, VictoryType::Abandoned, Utc::now())
            .unwrap());
    }

    // -- attacks -------------------------------------------------------------

    #[test]
    fn launch_attack_debits_source() {
        let store = MemoryStore::new();
        let game_id = seeded_game(&store);
        let attacker = PlayerId::new();
        let source = seeded_planet(&store, game_id, Some(attacker));
        let target = seeded_planet(&store, game_id, None);

        let attack = Attack::launch(game_id, attacker, source, target, 60, Utc::now());
        assert!(store.launch_attack(attack).unwrap());
        assert_eq!(store.planet(source).unwrap().troop_count, 40);
    }

    #[test]
    fn launch_attack_rejects_overdraw_and_stolen_source() {
        let store = MemoryStore::new();
        let game_id = seeded_game(&store);
        let attacker = PlayerId::new();
        let source = seeded_planet(&store, game_id, Some(attacker));
        let target = seeded_planet(&store, game_id, None);

        let too_many = Attack::launch(game_id, attacker, source, target, 500, Utc::now());
        assert!(!store.launch_attack(too_many).unwrap());

        let wrong_owner = Attack::launch(game_id, PlayerId::new(), source, target, 10, Utc::now());
        assert!(!store.launch_attack(wrong_owner).unwrap());
        assert_eq!(store.planet(source).unwrap().troop_count, 100);
    }

    #[test]
    fn due_attacks_sorted_and_filtered() {
        let store = MemoryStore::new();
        let game_id = seeded_game(&store);
        let attacker = PlayerId::new();
        let source = seeded_planet(&store, game_id, Some(attacker));
        store.set_planet_troops(source, 1000).unwrap();
        let target = seeded_planet(&store, game_id, None);

        let now = Utc::now();
        let later = now + chrono::Duration::seconds(60);
        let a1 = Attack::launch(game_id, attacker, source, target, 10, now);
        let a2 = Attack::launch(game_id, attacker, source, target, 10, later);
        let a1_id = a1.id;
        store.launch_attack(a1).unwrap();
        store.launch_attack(a2).unwrap();

        let due = store.due_attacks(game_id, now);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, a1_id);
    }

    fn retreat_log(game_id: GameId, attacker: PlayerId, system_id: PlanetId) -> CombatLog {
        CombatLog {
            game_id,
            attacker_id: attacker,
            defender_id: None,
            system_id,
            attacker_troops: 10,
            defender_troops: 50,
            attacker_losses: 2,
            defender_losses: 0,
            survivors: 8,
            terrain_type: TerrainType::Space,
            had_flanking: false,
            was_encircled: false,
            had_defense_station: false,
            had_elevation: false,
            combat_result: CombatResult::Retreat,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn settlement_applies_exactly_once() {
        let store = MemoryStore::new();
        let game_id = seeded_game(&store);
        let attacker = PlayerId::new();
        let source = seeded_planet(&store, game_id, Some(attacker));
        let target = seeded_planet(&store, game_id, None);

        let attack = Attack::launch(game_id, attacker, source, target, 60, Utc::now());
        let attack_id = attack.id;
        store.launch_attack(attack).unwrap();

        let settlement = AttackSettlement {
            attack_id,
            new_status: AttackStatus::Arrived,
            owner_guard: OwnerGuard::Expect(None),
            target_write: TargetWrite::Capture {
                new_owner: attacker,
                troops: 48,
            },
            source_return: None,
            log: None,
        };
        let now = Utc::now();
        assert!(matches!(
            store.apply_attack_settlement(settlement.clone(), now).unwrap(),
            SettlementApplied::Applied { .. }
        ));
        // Re-applying the same settlement is a no-op.
        assert_eq!(
            store.apply_attack_settlement(settlement, now).unwrap(),
            SettlementApplied::AlreadySettled
        );

        let planet = store.planet(target).unwrap();
        assert_eq!(planet.owner_id, Some(attacker));
        assert_eq!(planet.troop_count, 48);
        assert_eq!(store.attack(attack_id).unwrap().status, AttackStatus::Arrived);
    }

    #[test]
    fn settlement_rejects_stale_owner() {
        let store = MemoryStore::new();
        let game_id = seeded_game(&store);
        let attacker = PlayerId::new();
        let usurper = PlayerId::new();
        let source = seeded_planet(&store, game_id, Some(attacker));
        let target = seeded_planet(&store, game_id, Some(usurper));

        let attack = Attack::launch(game_id, attacker, source, target, 60, Utc::now());
        let attack_id = attack.id;
        store.launch_attack(attack).unwrap();

        let settlement = AttackSettlement {
            attack_id,
            new_status: AttackStatus::Arrived,
            owner_guard: OwnerGuard::Expect(None), // computed against a neutral read
            target_write: TargetWrite::Capture {
                new_owner: attacker,
                troops: 48,
            },
            source_return: None,
            log: None,
        };
        assert_eq!(
            store.apply_attack_settlement(settlement, Utc::now()).unwrap(),
            SettlementApplied::StaleOwner
        );
        // The attack is left in transit for the next tick.
        assert_eq!(
            store.attack(attack_id).unwrap().status,
            AttackStatus::InTransit
        );
        assert_eq!(store.planet(target).unwrap().owner_id, Some(usurper));
    }

    #[test]
    fn retreat_return_tops_up_to_base_cap_only() {
        let store = MemoryStore::new();
        let game_id = seeded_game(&store);
        let attacker = PlayerId::new();
        let source = seeded_planet(&store, game_id, Some(attacker));
        let target = seeded_planet(&store, game_id, None);
        store.set_planet_troops(source, 495).unwrap();

        let attack = Attack::launch(game_id, attacker, source, target, 10, Utc::now());
        let attack_id = attack.id;
        store.launch_attack(attack).unwrap();
        assert_eq!(store.planet(source).unwrap().troop_count, 485);

        let settlement = AttackSettlement {
            attack_id,
            new_status: AttackStatus::Retreating,
            owner_guard: OwnerGuard::Any,
            target_write: TargetWrite::Unchanged,
            source_return: Some((source, 8)),
            log: Some(retreat_log(game_id, attacker, target)),
        };
        store.apply_attack_settlement(settlement, Utc::now()).unwrap();
        assert_eq!(store.planet(source).unwrap().troop_count, 493);
        assert_eq!(store.combat_logs(game_id).len(), 1);

        // A colony-boosted garrison above 500 is never drained by a return.
        store.set_planet_troops(source, 700).unwrap();
        let attack = Attack::launch(game_id, attacker, source, target, 10, Utc::now());
        let attack_id = attack.id;
        store.launch_attack(attack).unwrap();
        let settlement = AttackSettlement {
            attack_id,
            new_status: AttackStatus::Retreating,
            owner_guard: OwnerGuard::Any,
            target_write: TargetWrite::Unchanged,
            source_return: Some((source, 8)),
            log: None,
        };
        store.apply_attack_settlement(settlement, Utc::now()).unwrap();
        assert_eq!(store.planet(source).unwrap().troop_count, 690);
    }

    // -- resources -----------------------------------------------------------

    #[test]
    fn income_is_clamped() {
        let store = MemoryStore::new();
        let player = Player::human("ada");
        let id = player.id;
        store.insert_player(player).unwrap();

        let updated = store
            .apply_income(
                id,
                ResourceIncome {
                    credits: 2 * CREDITS_CAP,
                    energy: -10,
                    minerals: 7,
                    research: RESEARCH_CAP + 500,
                },
            )
            .unwrap();
        assert_eq!(updated.credits, CREDITS_CAP);
        assert_eq!(updated.energy, 0);
        assert_eq!(updated.minerals, 7);
        assert_eq!(updated.research_points, RESEARCH_CAP);
    }

    #[test]
    fn try_spend_credits_is_conditional() {
        let store = MemoryStore::new();
        let mut player = Player::bot("hal", crate::rows::BotDifficulty::Hard);
        player.credits = 100;
        let id = player.id;
        store.insert_player(player).unwrap();

        assert!(!store.try_spend_credits(id, 101).unwrap());
        assert!(store.try_spend_credits(id, 100).unwrap());
        assert_eq!(store.player(id).unwrap().credits, 0);
    }

    // -- stats ---------------------------------------------------------------

    #[test]
    fn stats_upsert_is_idempotent() {
        let store = MemoryStore::new();
        let game_id = seeded_game(&store);
        let player_id = PlayerId::new();
        let stats = GameStats {
            game_id,
            player_id,
            planets_controlled: 5,
            territory_percentage: 81.0,
            troops_sent: 1234,
            planets_captured: 4,
            combat_wins: 4,
            combat_losses: 1,
            structures_built: 2,
            peak_territory_percentage: 83.5,
        };
        assert!(store.upsert_game_stats(stats.clone()).unwrap());
        assert!(!store.upsert_game_stats(stats).unwrap());
        assert_eq!(store.game_stats(game_id).len(), 1);
    }

    // -- change notifications ------------------------------------------------

    #[test]
    fn writes_emit_row_changes() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();
        let game_id = seeded_game(&store);

        let change = rx.try_recv().unwrap();
        assert_eq!(change.table, Table::Games);
        assert_eq!(change.game_id, Some(game_id));
        assert_eq!(change.op, ChangeOp::Insert);

        store.start_game(game_id, Utc::now()).unwrap();
        let change = rx.try_recv().unwrap();
        assert_eq!(change.op, ChangeOp::Update);
    }

    #[test]
    fn peak_territory_only_ratchets_up() {
        let store = MemoryStore::new();
        let game_id = seeded_game(&store);
        let player_id = PlayerId::new();
        store
            .insert_game_player(GamePlayer::new(game_id, player_id, "#123456", 1, Utc::now()))
            .unwrap();

        store.record_peak_territory(game_id, player_id, 40.0).unwrap();
        store.record_peak_territory(game_id, player_id, 25.0).unwrap();
        let gp = store.participant(game_id, player_id).unwrap();
        assert_eq!(gp.peak_territory_percentage, 40.0);
    }
}
