//! HTTP route definitions

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;
use uuid::Uuid;

use crate::app::AppState;
use crate::game::instance::InstanceError;
use crate::game::{RaceConfig, RaceError};
use crate::http::auth::AuthError;
use crate::lobby::{GameSummary, LobbyError};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CLIENT_ORIGIN may list several origins, comma-separated
    let cors = match &state.config.client_origin {
        Some(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
                .collect();
            CorsLayer::new().allow_origin(allowed)
        }
        None => CorsLayer::new().allow_origin(Any),
    }
    .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
    .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/games", get(list_games_handler).post(create_game_handler))
        .route("/games/:game_id/players", post(join_handler))
        .route("/games/:game_id/players/:player_id", delete(leave_handler))
        .route("/games/:game_id/ws", get(ws_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_games: usize,
    active_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_games: state.registry.len(),
        active_players: state.registry.total_players(),
    })
}

// ============================================================================
// Game endpoints
// ============================================================================

#[derive(Serialize, Deserialize)]
struct CreateGameResponse {
    game_id: Uuid,
}

/// The body is an optional `RaceConfig`; anything unreadable means defaults
async fn create_game_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<CreateGameResponse>) {
    let config = if body.iter().all(u8::is_ascii_whitespace) {
        RaceConfig::default()
    } else {
        serde_json::from_slice::<RaceConfig>(&body).unwrap_or_else(|e| {
            warn!(error = %e, "Unreadable race config, using defaults");
            RaceConfig::default()
        })
    };

    let handle = state.lobby.create_game(config);
    (
        StatusCode::CREATED,
        Json(CreateGameResponse { game_id: handle.id }),
    )
}

async fn list_games_handler(State(state): State<AppState>) -> Json<Vec<GameSummary>> {
    Json(state.lobby.list())
}

#[derive(Deserialize)]
struct JoinRequest {
    username: String,
}

#[derive(Serialize, Deserialize)]
struct JoinResponse {
    player_id: Uuid,
    secret: String,
}

async fn join_handler(
    State(state): State<AppState>,
    Path(game_id): Path<Uuid>,
    Json(req): Json<JoinRequest>,
) -> Result<(StatusCode, Json<JoinResponse>), AppError> {
    let player_id = state.lobby.join(game_id, &req.username).await?;
    let secret = state.signer.sign(game_id, player_id);

    Ok((
        StatusCode::CREATED,
        Json(JoinResponse { player_id, secret }),
    ))
}

#[derive(Deserialize)]
struct SecretQuery {
    secret: Option<String>,
}

async fn leave_handler(
    State(state): State<AppState>,
    Path((game_id, player_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<SecretQuery>,
) -> Result<StatusCode, AppError> {
    let secret = query.secret.ok_or(AuthError::MissingSecret)?;
    state.signer.verify(game_id, player_id, &secret)?;
    state.lobby.leave(game_id, player_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    #[error("Rejected by race: {0}")]
    Race(RaceError),
}

impl From<LobbyError> for AppError {
    fn from(err: LobbyError) -> Self {
        match err {
            LobbyError::GameNotFound(_) | LobbyError::UnknownPlayer(_) => {
                AppError::NotFound(err.to_string())
            }
            LobbyError::InvalidUsername => AppError::BadRequest(err.to_string()),
            LobbyError::Instance(InstanceError::Stopped(_)) => AppError::NotFound(err.to_string()),
            LobbyError::Instance(InstanceError::Race(race)) => AppError::Race(race),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::Unauthorized(e) => (StatusCode::UNAUTHORIZED, "unauthorized", e.to_string()),
            AppError::Race(e) => {
                let status = match e {
                    RaceError::RaceInProgress
                    | RaceError::GameFull(_)
                    | RaceError::AlreadyJoined(_) => StatusCode::CONFLICT,
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, e.code(), e.to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::game::RaceState;

    fn app() -> (AppState, Router) {
        let state = AppState::new(Config::for_tests());
        (state.clone(), build_router(state))
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, json: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn health_reports_ok() {
        let (_, router) = app();
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["active_games"], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn create_game_with_and_without_config() {
        let (state, router) = app();

        let response = router
            .clone()
            .oneshot(Request::post("/games").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created: CreateGameResponse = body_json(response).await;
        assert!(state.lobby.game(created.game_id).is_ok());

        let response = router
            .clone()
            .oneshot(post_json("/games", r#"{"checkpoint_count": 3}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        // unreadable config falls back to defaults instead of failing
        let response = router
            .oneshot(post_json("/games", "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(state.registry.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn join_returns_a_verifiable_secret() {
        let (state, router) = app();
        let game = state.lobby.create_game(RaceConfig::default());

        let response = router
            .oneshot(post_json(
                &format!("/games/{}/players", game.id),
                r#"{"username":"ana"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let joined: JoinResponse = body_json(response).await;
        assert!(state
            .signer
            .verify(game.id, joined.player_id, &joined.secret)
            .is_ok());
        assert!(game.sessions.is_registered(joined.player_id));
    }

    #[tokio::test(start_paused = true)]
    async fn join_unknown_game_is_404() {
        let (_, router) = app();
        let response = router
            .oneshot(post_json(
                &format!("/games/{}/players", Uuid::new_v4()),
                r#"{"username":"ana"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn join_full_game_is_conflict() {
        let config = Config {
            max_players_per_game: 2,
            ..Config::for_tests()
        };
        let state = AppState::new(config);
        let router = build_router(state.clone());
        let game = state.lobby.create_game(RaceConfig::default());
        state.lobby.join(game.id, "a").await.unwrap();
        state.lobby.join(game.id, "b").await.unwrap();

        let response = router
            .oneshot(post_json(
                &format!("/games/{}/players", game.id),
                r#"{"username":"c"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json: serde_json::Value = body_json(response).await;
        assert_eq!(json["code"], "game_full");
    }

    #[tokio::test(start_paused = true)]
    async fn leave_requires_the_secret() {
        let (state, router) = app();
        let game = state.lobby.create_game(RaceConfig::default());
        let player_id = state.lobby.join(game.id, "ana").await.unwrap();
        let uri = format!("/games/{}/players/{}", game.id, player_id);

        let response = router
            .clone()
            .oneshot(Request::delete(uri.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let forged = state.signer.sign(Uuid::new_v4(), player_id);
        let response = router
            .clone()
            .oneshot(
                Request::delete(format!("{uri}?secret={forged}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let secret = state.signer.sign(game.id, player_id);
        let response = router
            .oneshot(
                Request::delete(format!("{uri}?secret={secret}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(!game.sessions.is_registered(player_id));
    }

    #[tokio::test(start_paused = true)]
    async fn list_shows_created_games() {
        let (state, router) = app();
        let game = state.lobby.create_game(RaceConfig::default());

        let response = router
            .oneshot(Request::get("/games").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let games: serde_json::Value = body_json(response).await;
        assert_eq!(games[0]["id"], game.id.to_string());
        assert_eq!(games[0]["state"], serde_json::to_value(RaceState::Waiting).unwrap());
        assert_eq!(games[0]["players"], 0);
    }
}
