//! Player secrets
//!
//! A secret is `base64url(HMAC-SHA256(key, "game_id:player_id"))`. Holding it
//! proves the bearer joined as that player; nothing is stored server side.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid player secret")]
    InvalidSecret,

    #[error("Missing player secret")]
    MissingSecret,
}

#[derive(Clone)]
pub struct SecretSigner {
    key: Vec<u8>,
}

impl SecretSigner {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    fn mac(&self, game_id: Uuid, player_id: Uuid) -> HmacSha256 {
        // HMAC accepts keys of any length
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .unwrap_or_else(|_| unreachable!("HMAC key length is unrestricted"));
        mac.update(format!("{}:{}", game_id, player_id).as_bytes());
        mac
    }

    pub fn sign(&self, game_id: Uuid, player_id: Uuid) -> String {
        URL_SAFE_NO_PAD.encode(self.mac(game_id, player_id).finalize().into_bytes())
    }

    /// Constant-time check of a presented secret
    pub fn verify(&self, game_id: Uuid, player_id: Uuid, secret: &str) -> Result<(), AuthError> {
        let provided = URL_SAFE_NO_PAD
            .decode(secret)
            .map_err(|_| AuthError::InvalidSecret)?;

        self.mac(game_id, player_id)
            .verify_slice(&provided)
            .map_err(|_| AuthError::InvalidSecret)
    }
}
