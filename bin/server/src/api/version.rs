use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ServerVersion {
    pub version: &'static str,
}

/// `GET /version`
pub async fn version() -> Json<ServerVersion> {
    Json(ServerVersion {
        version: env!("CARGO_PKG_VERSION"),
    })
}
