pub mod connection;
pub mod engine;
pub mod registry;

use std::path::Path;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::services::ServeDir;

pub use engine::Engine;
pub use registry::{ConnId, Registry};

/// WebSocket gateway at `/ws`; every other path is served from `static_dir`.
pub fn router(engine: Engine, static_dir: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(engine)
        .fallback_service(ServeDir::new(static_dir))
}

async fn ws_upgrade(State(engine): State<Engine>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, engine))
}
