use axum::Json;
use serde_json::{json, Value};

pub async fn home() -> &'static str {
    "Hello, Creo Certificate Backend!"
}

pub async fn ping() -> Json<Value> {
    Json(json!({ "ok": true }))
}
