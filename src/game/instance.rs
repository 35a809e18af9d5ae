//! Race instance task and authoritative tick loop

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::lobby::sessions::SessionRegistry;
use crate::util::time::{unix_millis, COUNTDOWN_SECONDS, TARGET_FRAME_TIME};
use crate::ws::protocol::ServerMsg;

use super::race::{Race, RaceError, RaceState};
use super::{PlayerSessions, RaceCommand, RaceConfig};

/// Capacity of each instance's inbound command queue
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Published by the instance after every tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceStatus {
    pub state: RaceState,
    pub players: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    #[error("Race instance {0} has stopped")]
    Stopped(Uuid),

    #[error(transparent)]
    Race(#[from] RaceError),
}

/// Handle to a running race instance
#[derive(Clone)]
pub struct GameHandle {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub commands: mpsc::Sender<RaceCommand>,
    pub sessions: Arc<SessionRegistry>,
    status: watch::Receiver<InstanceStatus>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl GameHandle {
    pub fn status(&self) -> InstanceStatus {
        *self.status.borrow()
    }

    /// Wait until the published status satisfies `pred`
    pub async fn wait_for_status(
        &self,
        pred: impl FnMut(&InstanceStatus) -> bool,
    ) -> Result<InstanceStatus, InstanceError> {
        let mut status = self.status.clone();
        let result = status
            .wait_for(pred)
            .await
            .map(|s| *s)
            .map_err(|_| InstanceError::Stopped(self.id));
        result
    }

    /// Ask the race to add a player and wait for its verdict
    pub async fn join(&self, player_id: Uuid, username: String) -> Result<(), InstanceError> {
        let (reply, verdict) = oneshot::channel();
        self.send(RaceCommand::Join {
            player_id,
            username,
            reply,
        })
        .await?;
        verdict.await.map_err(|_| InstanceError::Stopped(self.id))??;
        Ok(())
    }

    pub async fn send(&self, command: RaceCommand) -> Result<(), InstanceError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| InstanceError::Stopped(self.id))
    }

    /// Stop the tick loop, interrupting a countdown in progress
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn is_stopped(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Registry of all race instances
pub struct GameRegistry {
    games: DashMap<Uuid, GameHandle>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self {
            games: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<GameHandle> {
        self.games.get(id).map(|g| g.value().clone())
    }

    pub fn insert(&self, handle: GameHandle) {
        self.games.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<GameHandle> {
        self.games.remove(id).map(|(_, h)| h)
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn handles(&self) -> Vec<GameHandle> {
        self.games.iter().map(|g| g.value().clone()).collect()
    }

    pub fn total_players(&self) -> usize {
        self.games.iter().map(|g| g.value().status().players).sum()
    }
}

impl Default for GameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative race task. Sole owner of its `Race`.
pub struct RaceInstance {
    race: Race,
    commands: mpsc::Receiver<RaceCommand>,
    sessions: Arc<SessionRegistry>,
    status: watch::Sender<InstanceStatus>,
    shutdown: watch::Receiver<bool>,
    frame_time: Duration,
    countdown_step: Duration,
}

impl RaceInstance {
    pub fn new(id: Uuid, config: RaceConfig, max_players: usize, seed: u64) -> (Self, GameHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (status_tx, status_rx) = watch::channel(InstanceStatus {
            state: RaceState::Waiting,
            players: 0,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sessions = Arc::new(SessionRegistry::new(id));

        let handle = GameHandle {
            id,
            created_at: Utc::now(),
            commands: command_tx,
            sessions: sessions.clone(),
            status: status_rx,
            shutdown: Arc::new(shutdown_tx),
        };

        let instance = Self {
            race: Race::new(id, config, max_players, seed),
            commands: command_rx,
            sessions,
            status: status_tx,
            shutdown: shutdown_rx,
            frame_time: TARGET_FRAME_TIME,
            countdown_step: Duration::from_secs(1),
        };

        (instance, handle)
    }

    /// Run the tick loop until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        let id = self.race.id;
        info!(game_id = %id, "Race instance started");

        let mut last_tick = Instant::now();
        let mut resync = false;

        loop {
            let mut frame_start = Instant::now();

            if !self.process_commands() {
                debug!(game_id = %id, "Command queue closed");
                break;
            }

            if self.race.state == RaceState::Countdown {
                if !self.countdown().await {
                    break;
                }
                // commands queued during the countdown land on the first running tick
                if !self.process_commands() {
                    break;
                }
                frame_start = Instant::now();
                resync = true;
            }

            // measured delta, except right after the countdown pause
            let now = Instant::now();
            let dt = if resync {
                resync = false;
                self.frame_time.as_secs_f64()
            } else {
                now.duration_since(last_tick).as_secs_f64()
            };
            last_tick = now;

            self.race.update(dt, self.sessions.as_ref());
            self.publish_status();

            if self.wait_or_shutdown(frame_start + self.frame_time).await {
                break;
            }
        }

        info!(game_id = %id, "Race instance stopped");
    }

    /// Drain every queued command without blocking. False once the queue is closed.
    fn process_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.apply(command),
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn apply(&mut self, command: RaceCommand) {
        let sessions = self.sessions.as_ref();
        match command {
            RaceCommand::Join {
                player_id,
                username,
                reply,
            } => {
                let result = self.race.join(player_id, username, sessions);
                if let Err(e) = &result {
                    warn!(game_id = %self.race.id, player_id = %player_id, error = %e, "Join rejected");
                }
                let _ = reply.send(result);
            }
            RaceCommand::Leave { player_id } => {
                if let Err(e) = self.race.leave(player_id, sessions) {
                    debug!(game_id = %self.race.id, player_id = %player_id, error = %e, "Leave ignored");
                }
            }
            RaceCommand::Connect {
                socket_id,
                player_id,
            } => {
                self.race.connect(socket_id, player_id, sessions);
            }
            RaceCommand::Disconnect { player_id } => {
                self.race.disconnect(player_id, sessions);
            }
            RaceCommand::Client {
                socket_id,
                player_id,
                msg,
                received_at,
            } => {
                debug!(
                    game_id = %self.race.id,
                    socket_id = %socket_id,
                    queued_ms = unix_millis().saturating_sub(received_at),
                    "Client message"
                );
                if let Err(e) = self.race.handle_client(socket_id, player_id, msg, sessions) {
                    warn!(
                        game_id = %self.race.id,
                        socket_id = %socket_id,
                        code = e.code(),
                        error = %e,
                        "Protocol error"
                    );
                    sessions.send_to_socket(
                        socket_id,
                        &ServerMsg::Error {
                            code: e.code().to_string(),
                            message: e.to_string(),
                        },
                    );
                }
            }
        }
    }

    /// Broadcast the descending counter then start the race.
    /// Commands keep queueing meanwhile. False if shutdown interrupted it.
    async fn countdown(&mut self) -> bool {
        self.publish_status();
        let mut deadline = Instant::now();
        for value in (1..=COUNTDOWN_SECONDS).rev() {
            self.sessions.broadcast(&ServerMsg::Countdown { value });
            deadline += self.countdown_step;
            if self.wait_or_shutdown(deadline).await {
                info!(game_id = %self.race.id, "Countdown interrupted");
                return false;
            }
        }
        self.race.start(self.sessions.as_ref());
        self.publish_status();
        true
    }

    /// Sleep until `deadline`. True if shutdown was requested first.
    async fn wait_or_shutdown(&mut self, deadline: Instant) -> bool {
        tokio::select! {
            _ = sleep_until(deadline) => false,
            _ = shutdown_requested(&mut self.shutdown) => true,
        }
    }

    fn publish_status(&self) {
        let next = InstanceStatus {
            state: self.race.state,
            players: self.race.active_players().count(),
        };
        self.status.send_if_modified(|status| {
            if *status == next {
                false
            } else {
                *status = next;
                true
            }
        });
    }
}

/// Resolves once the flag is set or every handle is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
