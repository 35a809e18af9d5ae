//! Race state machine, roster and ranking
//!
//! A `Race` is owned by exactly one tick loop. Every mutation happens through
//! `&mut self`, with outbound traffic pushed to a `PlayerSessions` sink.

use std::collections::HashMap;
use std::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ws::protocol::{FinishedPlayer, ServerMsg};

use super::checkpoints::{detect, is_colliding};
use super::physics::{Hovercraft, RaceConfig};
use super::vector::Vec2;
use super::{PlayerIntent, PlayerSessions};

/// Players needed before a countdown can begin
pub const MIN_PLAYERS: usize = 2;

/// Checkpoints and finish line are placed in [-extent, extent] on both axes
pub const MAP_HALF_EXTENT: f64 = 50.0;

/// Gap between neighbouring spawn slots
pub const SPAWN_SPACING: f64 = 1.5;

const FINISH_LINE_ATTEMPTS: usize = 32;

/// Race life-cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceState {
    /// Lobby, accepting joins
    Waiting,
    /// Course generated, counting down to the start
    Countdown,
    /// Race in progress
    Running,
    /// Race over; behaves as a lobby until the next start
    Finished,
}

impl fmt::Display for RaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RaceState::Waiting => "waiting",
            RaceState::Countdown => "counting down",
            RaceState::Running => "running",
            RaceState::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Protocol errors. Reported to the offending connection, never fatal to the race.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RaceError {
    #[error("A race is already in progress")]
    RaceInProgress,

    #[error("The game is full ({0} players)")]
    GameFull(usize),

    #[error("Player {0} has already joined")]
    AlreadyJoined(Uuid),

    #[error("Unknown player {0}")]
    UnknownPlayer(Uuid),

    #[error("Spectators cannot send `{0}`")]
    Spectator(&'static str),

    #[error("`{command}` is not allowed while the race is {state}")]
    NotAllowed {
        command: &'static str,
        state: RaceState,
    },
}

impl RaceError {
    /// Stable identifier for the wire
    pub fn code(&self) -> &'static str {
        match self {
            RaceError::RaceInProgress => "race_in_progress",
            RaceError::GameFull(_) => "game_full",
            RaceError::AlreadyJoined(_) => "already_joined",
            RaceError::UnknownPlayer(_) => "unknown_player",
            RaceError::Spectator(_) => "spectator",
            RaceError::NotAllowed { .. } => "not_allowed",
        }
    }
}

/// A participant in the race (authoritative)
#[derive(Debug, Clone)]
pub struct Player {
    pub id: Uuid,
    pub username: String,
    /// Join order, used wherever iteration must be deterministic
    pub join_seq: u64,
    pub ready: bool,
    pub finished: bool,
    /// Left during a race; kept as an unfinished record until the race ends
    pub departed: bool,
    pub place: Option<u32>,
    pub duration_ms: Option<u64>,
    pub remaining_checkpoints: Vec<Vec2>,
    pub hovercraft: Hovercraft,
}

impl Player {
    fn new(id: Uuid, username: String, join_seq: u64) -> Self {
        Self {
            id,
            username,
            join_seq,
            ready: false,
            finished: false,
            departed: false,
            place: None,
            duration_ms: None,
            remaining_checkpoints: Vec::new(),
            hovercraft: Hovercraft::default(),
        }
    }

    /// Fresh state for a new race on the given course
    fn reset_for_race(&mut self, checkpoints: &[Vec2]) {
        self.ready = false;
        self.finished = false;
        self.place = None;
        self.duration_ms = None;
        self.remaining_checkpoints = checkpoints.to_vec();
        self.hovercraft = Hovercraft::default();
    }
}

/// One race instance
pub struct Race {
    pub id: Uuid,
    pub state: RaceState,
    pub players: HashMap<Uuid, Player>,
    /// Shared checkpoint pool for the current race
    pub checkpoints: Vec<Vec2>,
    pub finish_line: Vec2,
    pub ranking: Vec<FinishedPlayer>,
    pub start_time: Option<Instant>,
    pub config: RaceConfig,
    pub max_players: usize,
    rng: ChaCha8Rng,
    next_join_seq: u64,
}

impl Race {
    pub fn new(id: Uuid, config: RaceConfig, max_players: usize, seed: u64) -> Self {
        let config = config.sanitized();
        Self {
            id,
            state: RaceState::Waiting,
            players: HashMap::new(),
            checkpoints: Vec::with_capacity(config.checkpoint_count),
            finish_line: Vec2::ZERO,
            ranking: Vec::new(),
            start_time: None,
            config,
            max_players: max_players.max(MIN_PLAYERS),
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_join_seq: 0,
        }
    }

    /// Player ids in join order
    pub fn roster_order(&self) -> Vec<Uuid> {
        let mut players: Vec<&Player> = self.players.values().collect();
        players.sort_by_key(|p| p.join_seq);
        players.into_iter().map(|p| p.id).collect()
    }

    /// Players still in the race (not departed)
    pub fn active_players(&self) -> impl Iterator<Item = &Player> {
        self.players.values().filter(|p| !p.departed)
    }

    pub fn ready_player_ids(&self) -> Vec<Uuid> {
        self.roster_order()
            .into_iter()
            .filter(|id| self.players.get(id).is_some_and(|p| p.ready))
            .collect()
    }

    /// Every connected player is ready, and there is at least one of them
    fn connected_ready(&self, sessions: &dyn PlayerSessions) -> bool {
        let mut connected = self
            .players
            .values()
            .filter(|p| sessions.connection_count(p.id) > 0)
            .peekable();
        connected.peek().is_some() && connected.all(|p| p.ready)
    }

    fn all_remaining_finished(&self) -> bool {
        self.active_players().all(|p| p.finished)
    }

    /// Add a player. Only possible between races.
    pub fn join(
        &mut self,
        player_id: Uuid,
        username: String,
        sessions: &dyn PlayerSessions,
    ) -> Result<(), RaceError> {
        if self.state == RaceState::Finished {
            self.reset_to_waiting();
        }
        if self.state != RaceState::Waiting {
            return Err(RaceError::RaceInProgress);
        }
        if self.players.contains_key(&player_id) {
            return Err(RaceError::AlreadyJoined(player_id));
        }
        if self.players.len() >= self.max_players {
            return Err(RaceError::GameFull(self.max_players));
        }

        let seq = self.next_join_seq;
        self.next_join_seq += 1;
        self.players
            .insert(player_id, Player::new(player_id, username, seq));
        self.position_hovercrafts();

        info!(
            game_id = %self.id,
            player_id = %player_id,
            player_count = self.players.len(),
            "Player joined race"
        );

        if !self.ready_player_ids().is_empty() {
            sessions.send_to_player(player_id, &self.ready_players_msg());
        }
        Ok(())
    }

    /// Remove a player. Once a race has begun the player stays as a departed
    /// record until the race resets.
    pub fn leave(&mut self, player_id: Uuid, sessions: &dyn PlayerSessions) -> Result<(), RaceError> {
        match self.state {
            RaceState::Waiting => {
                let player = self
                    .players
                    .remove(&player_id)
                    .ok_or(RaceError::UnknownPlayer(player_id))?;

                info!(game_id = %self.id, player_id = %player_id, "Player left lobby");

                self.position_hovercrafts();
                if player.ready || !self.ready_player_ids().is_empty() {
                    sessions.broadcast(&self.ready_players_msg());
                }
                self.try_begin_countdown(sessions);
            }
            RaceState::Countdown | RaceState::Running | RaceState::Finished => {
                let player = self
                    .players
                    .get_mut(&player_id)
                    .filter(|p| !p.departed)
                    .ok_or(RaceError::UnknownPlayer(player_id))?;
                player.departed = true;
                player.ready = false;
                player.hovercraft.set_targets(0.0, player.hovercraft.angle);

                info!(
                    game_id = %self.id,
                    player_id = %player_id,
                    finished = player.finished,
                    state = %self.state,
                    "Player left after the race began"
                );

                if self.state == RaceState::Running && self.all_remaining_finished() {
                    self.finish(sessions);
                }
            }
        }
        Ok(())
    }

    /// A player's socket closed. Their readiness no longer counts if it was the last one.
    pub fn disconnect(&mut self, player_id: Uuid, sessions: &dyn PlayerSessions) {
        if sessions.connection_count(player_id) > 0 {
            return;
        }
        debug!(game_id = %self.id, player_id = %player_id, "Player went offline");
        self.try_begin_countdown(sessions);
    }

    /// Send the catch-up state to a freshly connected socket
    pub fn connect(&self, socket_id: Uuid, player_id: Option<Uuid>, sessions: &dyn PlayerSessions) {
        for msg in self.catch_up(player_id) {
            sessions.send_to_socket(socket_id, &msg);
        }
    }

    /// Apply a decoded client message
    pub fn handle_client(
        &mut self,
        socket_id: Uuid,
        player_id: Option<Uuid>,
        intent: PlayerIntent,
        sessions: &dyn PlayerSessions,
    ) -> Result<(), RaceError> {
        match intent {
            PlayerIntent::Ready => {
                let player_id = player_id.ok_or(RaceError::Spectator("ready"))?;
                self.ready(player_id, sessions)
            }
            PlayerIntent::Control { thrust, angle } => {
                let player_id = player_id.ok_or(RaceError::Spectator("control"))?;
                self.control(player_id, thrust, angle)
            }
            PlayerIntent::RequestSummary => {
                sessions.send_to_socket(socket_id, &self.summary_msg());
                Ok(())
            }
        }
    }

    /// Mark a player ready; starts the countdown once everyone is
    pub fn ready(&mut self, player_id: Uuid, sessions: &dyn PlayerSessions) -> Result<(), RaceError> {
        if self.state == RaceState::Finished {
            self.reset_to_waiting();
        }
        if self.state != RaceState::Waiting {
            return Err(RaceError::NotAllowed {
                command: "ready",
                state: self.state,
            });
        }

        let player = self
            .players
            .get_mut(&player_id)
            .ok_or(RaceError::UnknownPlayer(player_id))?;
        player.ready = true;

        sessions.broadcast(&self.ready_players_msg());
        self.try_begin_countdown(sessions);
        Ok(())
    }

    /// Store a steering intent; consumed by the next physics pass
    pub fn control(&mut self, player_id: Uuid, thrust: f64, angle: f64) -> Result<(), RaceError> {
        if self.state != RaceState::Running {
            return Err(RaceError::NotAllowed {
                command: "control",
                state: self.state,
            });
        }

        let player = self
            .players
            .get_mut(&player_id)
            .filter(|p| !p.departed)
            .ok_or(RaceError::UnknownPlayer(player_id))?;
        player.hovercraft.set_targets(thrust, angle);
        Ok(())
    }

    fn try_begin_countdown(&mut self, sessions: &dyn PlayerSessions) {
        if self.state == RaceState::Waiting
            && self.players.len() >= MIN_PLAYERS
            && self.connected_ready(sessions)
        {
            self.begin_countdown(sessions);
        }
    }

    /// Generate a fresh course and reset every player onto it
    fn begin_countdown(&mut self, sessions: &dyn PlayerSessions) {
        self.ranking.clear();
        self.players.retain(|_, p| !p.departed);
        self.start_time = None;
        self.generate_course();

        for player in self.players.values_mut() {
            player.reset_for_race(&self.checkpoints);
        }
        self.position_hovercrafts();
        self.state = RaceState::Countdown;

        info!(
            game_id = %self.id,
            player_count = self.players.len(),
            checkpoints = self.checkpoints.len(),
            "All players ready, counting down"
        );

        sessions.broadcast(&self.hovercrafts_msg());
        sessions.broadcast(&ServerMsg::Checkpoints {
            checkpoints: self.checkpoints.clone(),
            finish_line: self.finish_line,
        });
    }

    /// Countdown is over: the race is live
    pub fn start(&mut self, sessions: &dyn PlayerSessions) {
        self.start_at(Instant::now(), sessions);
    }

    pub(crate) fn start_at(&mut self, now: Instant, sessions: &dyn PlayerSessions) {
        if self.state != RaceState::Countdown {
            return;
        }
        self.state = RaceState::Running;
        self.start_time = Some(now);

        info!(game_id = %self.id, "Race started");
        sessions.broadcast(&ServerMsg::Start);
    }

    /// End the race and report the summary
    pub fn finish(&mut self, sessions: &dyn PlayerSessions) {
        if self.state == RaceState::Finished {
            return;
        }
        self.state = RaceState::Finished;
        self.checkpoints.clear();

        for player in self.players.values_mut() {
            player.ready = false;
        }

        info!(
            game_id = %self.id,
            finished = self.ranking.len(),
            player_count = self.active_players().count(),
            "Race finished"
        );
        sessions.broadcast(&self.summary_msg());
    }

    /// Forget the last race: departed players and the ranking go together
    fn reset_to_waiting(&mut self) {
        self.state = RaceState::Waiting;
        self.ranking.clear();
        self.players.retain(|_, p| !p.departed);
        for player in self.players.values_mut() {
            player.ready = false;
        }
        self.position_hovercrafts();
        debug!(game_id = %self.id, "Race back to waiting");
    }

    /// One simulation pass over every hovercraft
    pub fn update(&mut self, dt: f64, sessions: &dyn PlayerSessions) {
        self.update_at(dt, Instant::now(), sessions);
    }

    pub(crate) fn update_at(&mut self, dt: f64, now: Instant, sessions: &dyn PlayerSessions) {
        if self.timed_out(now) {
            info!(game_id = %self.id, "Race timed out");
            self.finish(sessions);
        }

        let running = self.state == RaceState::Running;
        let config = self.config;
        let finish_line = self.finish_line;
        let mut ranking_changed = false;
        let mut any_moving = false;

        for id in self.roster_order() {
            let Some(player) = self.players.get_mut(&id) else {
                continue;
            };
            if player.departed || sessions.connection_count(id) == 0 {
                continue;
            }

            let powered = running && !player.finished;
            player.hovercraft.update(dt, powered, &config);
            any_moving |= player.hovercraft.is_moving();

            if !powered {
                continue;
            }

            let detection = detect(
                player.hovercraft.pos,
                &mut player.remaining_checkpoints,
                finish_line,
            );

            if detection.consumed > 0 {
                sessions.send_to_player(
                    id,
                    &ServerMsg::Checkpoints {
                        checkpoints: player.remaining_checkpoints.clone(),
                        finish_line,
                    },
                );
            }

            if detection.reached_finish {
                let place = self.ranking.len() as u32 + 1;
                let duration_ms = self
                    .start_time
                    .map(|start| now.saturating_duration_since(start).as_millis() as u64)
                    .unwrap_or(0);

                player.finished = true;
                player.place = Some(place);
                player.duration_ms = Some(duration_ms);
                self.ranking.push(FinishedPlayer {
                    id,
                    place,
                    duration_ms,
                });
                ranking_changed = true;

                info!(
                    game_id = %self.id,
                    player_id = %id,
                    place,
                    duration_ms,
                    "Player crossed the finish line"
                );
            }
        }

        if running || any_moving {
            sessions.broadcast(&self.hovercrafts_msg());
        }

        if ranking_changed {
            sessions.broadcast(&self.ranking_msg());
        }
        // also covers everyone having left during the countdown
        if running && self.all_remaining_finished() {
            self.finish(sessions);
        }
    }

    fn timed_out(&self, now: Instant) -> bool {
        match (self.state, self.start_time, self.config.timeout_ms) {
            (RaceState::Running, Some(start), Some(timeout_ms)) => {
                now.saturating_duration_since(start).as_millis() >= u128::from(timeout_ms)
            }
            _ => false,
        }
    }

    /// Staggered line: 0, -1, +1, -2, +2 ... slots along the Y axis, in join order
    fn position_hovercrafts(&mut self) {
        let mut offset = 0.0;
        for (i, id) in self.roster_order().into_iter().enumerate() {
            let y = if i % 2 == 0 {
                let y = offset;
                offset += SPAWN_SPACING;
                y
            } else {
                -offset
            };
            if let Some(player) = self.players.get_mut(&id) {
                player.hovercraft = Hovercraft::at(Vec2::new(0.0, y));
            }
        }
    }

    fn generate_course(&mut self) {
        self.checkpoints.clear();
        for _ in 0..self.config.checkpoint_count {
            let point = self.random_point();
            self.checkpoints.push(point);
        }

        // keep the finish line clear of every checkpoint when we can
        let mut finish_line = self.random_point();
        for _ in 0..FINISH_LINE_ATTEMPTS {
            if !self.checkpoints.iter().any(|c| is_colliding(*c, finish_line)) {
                break;
            }
            finish_line = self.random_point();
        }
        self.finish_line = finish_line;
    }

    fn random_point(&mut self) -> Vec2 {
        Vec2::new(
            self.rng.gen_range(-MAP_HALF_EXTENT..MAP_HALF_EXTENT),
            self.rng.gen_range(-MAP_HALF_EXTENT..MAP_HALF_EXTENT),
        )
    }
}
