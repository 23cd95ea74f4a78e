use std::sync::Arc;

use axum::{Extension, Json};
use serde_json::{json, Value as JsonValue};

use crate::clients::hardware::PortDirectory;
use crate::error::AppError;

/// GET /api/hardware/ports
pub async fn list_ports(
    Extension(ports): Extension<Arc<dyn PortDirectory>>,
) -> Result<Json<JsonValue>, AppError> {
    let ports = tokio::task::spawn_blocking(move || ports.list_ports())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(json!({ "status": "success", "ports": ports })))
}
