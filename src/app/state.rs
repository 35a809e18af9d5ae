//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::GameRegistry;
use crate::http::auth::SecretSigner;
use crate::lobby::LobbyService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub signer: SecretSigner,
    pub lobby: Arc<LobbyService>,
    pub registry: Arc<GameRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let signer = SecretSigner::new(config.session_secret.clone());

        let registry = Arc::new(GameRegistry::new());
        let lobby = Arc::new(LobbyService::new(&config, registry.clone()));

        Self {
            config,
            signer,
            lobby,
            registry,
        }
    }
}
