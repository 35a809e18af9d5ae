//! Per-game connection registry
//!
//! Tracks every open socket of one game instance and the presence of each
//! player. The race reaches connections only through `PlayerSessions`.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::game::PlayerSessions;
use crate::ws::protocol::ServerMsg;

/// Outbound messages buffered per socket before new ones are dropped
pub const OUTBOUND_BUFFER: usize = 256;

/// One open socket
struct Connection {
    /// `None` for spectators
    player_id: Option<Uuid>,
    tx: mpsc::Sender<ServerMsg>,
}

/// A player registered through the lobby
#[derive(Debug, Clone)]
pub struct Presence {
    pub username: String,
    pub connections: usize,
    pub last_seen: DateTime<Utc>,
}

pub struct SessionRegistry {
    game_id: Uuid,
    sockets: DashMap<Uuid, Connection>,
    players: DashMap<Uuid, Presence>,
    /// Unix millis of the last connect, disconnect or inbound message
    last_activity: AtomicI64,
}

impl SessionRegistry {
    pub fn new(game_id: Uuid) -> Self {
        Self {
            game_id,
            sockets: DashMap::new(),
            players: DashMap::new(),
            last_activity: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    pub fn register_player(&self, player_id: Uuid, username: String) {
        self.players.insert(
            player_id,
            Presence {
                username,
                connections: 0,
                last_seen: Utc::now(),
            },
        );
        self.touch();
    }

    /// Forget a player and close all of their sockets
    pub fn unregister_player(&self, player_id: Uuid) -> Option<Presence> {
        self.sockets
            .retain(|_, conn| conn.player_id != Some(player_id));
        self.players.remove(&player_id).map(|(_, presence)| presence)
    }

    pub fn is_registered(&self, player_id: Uuid) -> bool {
        self.players.contains_key(&player_id)
    }

    pub fn presence(&self, player_id: Uuid) -> Option<Presence> {
        self.players.get(&player_id).map(|p| p.value().clone())
    }

    /// Open a socket for a player or a spectator (`None`)
    pub fn attach(&self, player_id: Option<Uuid>) -> (Uuid, mpsc::Receiver<ServerMsg>) {
        let socket_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        self.sockets.insert(socket_id, Connection { player_id, tx });

        if let Some(player_id) = player_id {
            if let Some(mut presence) = self.players.get_mut(&player_id) {
                presence.connections += 1;
                presence.last_seen = Utc::now();
            }
        }
        self.touch();

        (socket_id, rx)
    }

    pub fn detach(&self, socket_id: Uuid) {
        let Some((_, conn)) = self.sockets.remove(&socket_id) else {
            return;
        };
        if let Some(player_id) = conn.player_id {
            if let Some(mut presence) = self.players.get_mut(&player_id) {
                presence.connections = presence.connections.saturating_sub(1);
                presence.last_seen = Utc::now();
            }
        }
        self.touch();
    }

    /// Record activity on this game; refreshes `last_seen` for a player
    pub fn seen(&self, player_id: Option<Uuid>) {
        if let Some(player_id) = player_id {
            if let Some(mut presence) = self.players.get_mut(&player_id) {
                presence.last_seen = Utc::now();
            }
        }
        self.touch();
    }

    fn touch(&self) {
        self.last_activity
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        let millis = self.last_activity.load(Ordering::Relaxed);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or_else(Utc::now)
    }

    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }

    /// Players without an open socket that were last seen before `cutoff`
    pub fn idle_players(&self, cutoff: DateTime<Utc>) -> Vec<Uuid> {
        self.players
            .iter()
            .filter(|p| p.connections == 0 && p.last_seen < cutoff)
            .map(|p| *p.key())
            .collect()
    }

    fn deliver(&self, socket_id: Uuid, tx: &mpsc::Sender<ServerMsg>, msg: &ServerMsg) {
        if let Err(e) = tx.try_send(msg.clone()) {
            debug!(game_id = %self.game_id, socket_id = %socket_id, error = %e, "Dropped outbound message");
        }
    }
}

impl PlayerSessions for SessionRegistry {
    fn broadcast(&self, msg: &ServerMsg) {
        for conn in self.sockets.iter() {
            self.deliver(*conn.key(), &conn.tx, msg);
        }
    }

    fn send_to_player(&self, player_id: Uuid, msg: &ServerMsg) {
        for conn in self.sockets.iter().filter(|c| c.player_id == Some(player_id)) {
            self.deliver(*conn.key(), &conn.tx, msg);
        }
    }

    fn send_to_socket(&self, socket_id: Uuid, msg: &ServerMsg) {
        if let Some(conn) = self.sockets.get(&socket_id) {
            self.deliver(socket_id, &conn.tx, msg);
        }
    }

    fn connection_count(&self, player_id: Uuid) -> usize {
        self.players
            .get(&player_id)
            .map(|p| p.connections)
            .unwrap_or(0)
    }
}
