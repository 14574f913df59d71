use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and config summary. Credentials are reported
/// only as presence flags.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "notion2api is running",
        "config": {
            "default_model": config.models.default_model,
            "model_alias_count": config.models.aliases.len(),
            "client_keys_count": config.client_authentication.allowed_keys.len(),
            "notion": {
                "base_url": config.notion.base_url,
                "has_token_v2": !config.notion.token_v2.is_empty(),
                "has_space_id": !config.notion.space_id.is_empty(),
                "has_user_id": !config.notion.user_id.is_empty(),
            },
            "features": {
                "log_level": config.features.log_level,
            }
        }
    }))
}
