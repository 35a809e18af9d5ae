//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::vector::Vec2;

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Signal that the race may begin
    Ready,

    /// Steering intent. The hovercraft ramps toward these values.
    Control {
        /// Throttle between -1.0 (full reverse) and 1.0 (full forward)
        thrust: f64,
        /// Heading in degrees (0 = +X, counter-clockwise)
        angle: f64,
    },

    /// Ask for the race-over summary
    RequestSummary,

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        game_id: Uuid,
        /// `None` for spectators
        player_id: Option<Uuid>,
        server_time: u64,
    },

    /// Seconds left before the race starts (5..1)
    Countdown {
        value: u8,
    },

    /// The race has started
    Start,

    /// Checkpoints still to visit and the finish line.
    /// Spectators get the shared pool, players their own remaining set.
    Checkpoints {
        checkpoints: Vec<Vec2>,
        finish_line: Vec2,
    },

    /// Players that have signalled ready
    ReadyPlayers {
        players: Vec<Uuid>,
        /// Every player in the roster is ready
        everyone: bool,
    },

    /// Positions and motion of all hovercrafts
    Hovercrafts {
        hovercrafts: HashMap<Uuid, HovercraftSnapshot>,
        /// Unix milliseconds when this snapshot was taken
        time: u64,
    },

    /// Current ranking
    FinishedPlayers {
        players: Vec<FinishedPlayer>,
    },

    /// Sent to late connections while a race is running
    InProgress,

    /// Race-over summary
    GameOver {
        finished: Vec<FinishedPlayer>,
        unfinished: Vec<Uuid>,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// One hovercraft in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HovercraftSnapshot {
    pub pos: Vec2,
    pub velocity: Vec2,
    pub thrust: f64,
    /// Heading in degrees
    pub angle: f64,
    pub checkpoints_left: usize,
}

/// Ranking entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishedPlayer {
    pub id: Uuid,
    /// 1-based finishing place
    pub place: u32,
    /// Milliseconds from race start to crossing the finish line
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_decode_from_tagged_json() {
        let ready: ClientMsg = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert_eq!(ready, ClientMsg::Ready);

        let control: ClientMsg =
            serde_json::from_str(r#"{"type":"control","thrust":0.5,"angle":-90}"#).unwrap();
        assert_eq!(
            control,
            ClientMsg::Control {
                thrust: 0.5,
                angle: -90.0
            }
        );
    }

    #[test]
    fn unknown_command_is_a_decode_error() {
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"teleport"}"#).is_err());
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"control","thrust":1}"#).is_err());
    }

    #[test]
    fn server_messages_use_snake_case_tags() {
        let json = serde_json::to_value(ServerMsg::ReadyPlayers {
            players: vec![],
            everyone: false,
        })
        .unwrap();
        assert_eq!(json["type"], "ready_players");

        let json = serde_json::to_value(ServerMsg::Countdown { value: 3 }).unwrap();
        assert_eq!(json["type"], "countdown");
        assert_eq!(json["value"], 3);
    }
}
