//! Game lobby: per-game connection registry and the service that creates,
//! joins and reaps race instances

pub mod service;
pub mod sessions;

pub use service::{GameSummary, LobbyError, LobbyService};
pub use sessions::SessionRegistry;
