//! Race simulation modules

pub mod checkpoints;
pub mod instance;
pub mod physics;
pub mod race;
pub mod snapshot;
pub mod vector;

pub use instance::{GameHandle, GameRegistry, RaceInstance};
pub use physics::RaceConfig;
pub use race::{Race, RaceError, RaceState};

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

/// Entry on a race's inbound queue. Only the tick loop consumes these.
#[derive(Debug)]
pub enum RaceCommand {
    /// Add a player to the roster; the race answers on `reply`
    Join {
        player_id: Uuid,
        username: String,
        reply: oneshot::Sender<Result<(), RaceError>>,
    },
    /// Remove a player from the roster
    Leave { player_id: Uuid },
    /// A socket connected and needs to catch up on current state
    Connect {
        socket_id: Uuid,
        player_id: Option<Uuid>,
    },
    /// One of a player's sockets closed
    Disconnect { player_id: Uuid },
    /// Decoded message from a connected socket
    Client {
        socket_id: Uuid,
        player_id: Option<Uuid>,
        msg: PlayerIntent,
        received_at: u64,
    },
}

/// What a socket can ask of the race. Transport-level messages such as
/// pings never get this far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerIntent {
    Ready,
    Control { thrust: f64, angle: f64 },
    RequestSummary,
}

/// Outbound side of the session layer, as seen by the race.
///
/// Sends are fire-and-forget: a dead connection must never fail the tick.
pub trait PlayerSessions {
    fn broadcast(&self, msg: &ServerMsg);
    fn send_to_player(&self, player_id: Uuid, msg: &ServerMsg);
    fn send_to_socket(&self, socket_id: Uuid, msg: &ServerMsg);
    /// Open connections held by a player; zero pauses their hovercraft
    fn connection_count(&self, player_id: Uuid) -> usize;
}
