//! Lobby service - game creation, roster changes and idle reaping

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::game::instance::InstanceError;
use crate::game::{GameHandle, GameRegistry, RaceCommand, RaceConfig, RaceInstance, RaceState};

/// How often idle players and games are swept
pub const REAP_INTERVAL: Duration = Duration::from_secs(60);

pub const MAX_USERNAME_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error("Game {0} not found")]
    GameNotFound(Uuid),

    #[error("Player {0} is not in this game")]
    UnknownPlayer(Uuid),

    #[error("Username must be between 1 and 32 characters")]
    InvalidUsername,

    #[error(transparent)]
    Instance(#[from] InstanceError),
}

/// Listing entry for `GET /games`
#[derive(Debug, Clone, Serialize)]
pub struct GameSummary {
    pub id: Uuid,
    pub players: usize,
    pub state: RaceState,
    pub created_at: DateTime<Utc>,
}

pub struct LobbyService {
    registry: Arc<GameRegistry>,
    max_players: usize,
    delete_inactive_game_after: Duration,
    kick_inactive_player_after: Duration,
}

impl LobbyService {
    pub fn new(config: &Config, registry: Arc<GameRegistry>) -> Self {
        Self {
            registry,
            max_players: config.max_players_per_game,
            delete_inactive_game_after: config.delete_inactive_game_after,
            kick_inactive_player_after: config.kick_inactive_player_after,
        }
    }

    /// Spawn a new race instance and register it
    pub fn create_game(&self, config: RaceConfig) -> GameHandle {
        let id = Uuid::new_v4();
        let seed = rand::random::<u64>();
        let (instance, handle) = RaceInstance::new(id, config, self.max_players, seed);

        self.registry.insert(handle.clone());
        info!(game_id = %id, max_players = self.max_players, "Created new game");

        let registry = self.registry.clone();
        tokio::spawn(async move {
            instance.run().await;
            registry.remove(&id);
            info!(game_id = %id, "Game removed from registry");
        });

        handle
    }

    pub fn game(&self, game_id: Uuid) -> Result<GameHandle, LobbyError> {
        self.registry
            .get(&game_id)
            .ok_or(LobbyError::GameNotFound(game_id))
    }

    pub fn list(&self) -> Vec<GameSummary> {
        let mut games: Vec<GameSummary> = self
            .registry
            .handles()
            .into_iter()
            .map(|handle| {
                let status = handle.status();
                GameSummary {
                    id: handle.id,
                    players: status.players,
                    state: status.state,
                    created_at: handle.created_at,
                }
            })
            .collect();
        games.sort_by_key(|g| g.created_at);
        games
    }

    /// Add a new player to a game. The race decides whether it accepts them.
    pub async fn join(&self, game_id: Uuid, username: &str) -> Result<Uuid, LobbyError> {
        let username = username.trim();
        if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
            return Err(LobbyError::InvalidUsername);
        }

        let handle = self.game(game_id)?;
        let player_id = Uuid::new_v4();
        handle.join(player_id, username.to_string()).await?;
        handle.sessions.register_player(player_id, username.to_string());

        info!(game_id = %game_id, player_id = %player_id, username, "Player joined game");
        Ok(player_id)
    }

    /// Remove a player and close their connections
    pub async fn leave(&self, game_id: Uuid, player_id: Uuid) -> Result<(), LobbyError> {
        let handle = self.game(game_id)?;
        handle
            .sessions
            .unregister_player(player_id)
            .ok_or(LobbyError::UnknownPlayer(player_id))?;
        handle.send(RaceCommand::Leave { player_id }).await?;

        info!(game_id = %game_id, player_id = %player_id, "Player left game");
        Ok(())
    }

    /// Periodic sweep of idle players and games
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(REAP_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.reap(Utc::now()).await;
        }
    }

    pub async fn reap(&self, now: DateTime<Utc>) {
        let kick_cutoff = now - chrono_duration(self.kick_inactive_player_after);
        let delete_cutoff = now - chrono_duration(self.delete_inactive_game_after);

        for handle in self.registry.handles() {
            if handle.is_stopped() {
                self.registry.remove(&handle.id);
                continue;
            }

            for player_id in handle.sessions.idle_players(kick_cutoff) {
                info!(game_id = %handle.id, player_id = %player_id, "Kicking inactive player");
                if let Err(e) = self.leave(handle.id, player_id).await {
                    warn!(game_id = %handle.id, player_id = %player_id, error = %e, "Failed to kick player");
                }
            }

            if handle.sessions.socket_count() == 0 && handle.sessions.last_activity() < delete_cutoff {
                info!(game_id = %handle.id, "Deleting inactive game");
                handle.shutdown();
                self.registry.remove(&handle.id);
            }
        }
    }
}

fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36_500))
}
