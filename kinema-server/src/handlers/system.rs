use axum::Json;
use serde_json::{Value, json};

pub async fn ping_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Kinema is running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
