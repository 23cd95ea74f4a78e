use std::sync::Arc;

use axum::{extract::Path, Extension, Json};
use serde_json::{json, Value as JsonValue};

use crate::error::AppError;
use crate::relay::{ConnectionManager, SessionSnapshot};

/// GET /api/live-games
pub async fn list_live_games(
    Extension(relay): Extension<Arc<ConnectionManager>>,
) -> Json<JsonValue> {
    let games = relay.store().list_active().await;
    Json(json!({ "type": "live_games_list", "games": games }))
}

/// GET /api/live-games/{game_id}
pub async fn get_live_game(
    Extension(relay): Extension<Arc<ConnectionManager>>,
    Path(game_id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let handle = relay.store().get(&game_id)?;
    let snapshot = handle.lock().await.snapshot(true);
    Ok(Json(snapshot))
}
