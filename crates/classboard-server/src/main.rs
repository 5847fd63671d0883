//! Classboard Canvas Relay Server
//!
//! Holds one canvas document per classroom and sends the full document to
//! every connected client whenever it changes.
//!
//! ## Protocol
//!
//! Messages are JSON tagged by `type`:
//! ```json
//! { "type": "join", "classroom": "math-101", "user_id": "u1", "user_name": "Ada" }
//! { "type": "push_drawing", "entry": { "id": "draw_...", "tool": "pen", ... } }
//! { "type": "clear", "user_id": "u1" }
//! ```
//! The server answers with `joined`, `canvas`, `roster` and `error` messages.

mod config;
mod error;
mod state;
mod ws;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use classboard_core::canvas::CanvasDocument;
use classboard_core::presence::Collaborator;
use config::Config;
use error::AppError;
use state::AppState;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "classboard_server=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    let state = Arc::new(AppState::new(config.channel_capacity));
    let app = router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Classboard relay listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health))
        .route("/classrooms/{id}/canvas", get(canvas))
        .route("/classrooms/{id}/roster", get(roster))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Index page
async fn index() -> &'static str {
    "Classboard Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// Current canvas document of a classroom
async fn canvas(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<CanvasDocument>, AppError> {
    state.canvas(&id).map(Json)
}

/// Participants currently attached to a classroom
async fn roster(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> Json<Vec<Collaborator>> {
    Json(state.roster(&id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use classboard_core::drawing::DrawingEntry;
    use classboard_core::sync::{CanvasUpdate, RelayGateway, RosterFeed, SyncGateway};
    use pollster::block_on;
    use std::sync::Mutex;
    use std::time::Duration;

    fn entry(id: &str, author: &str) -> DrawingEntry {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "tool": "pen",
            "color": "#000000",
            "size": 3,
            "points": [{"x": 1.0, "y": 2.0}, {"x": 3.0, "y": 4.0}],
            "authorId": author,
            "createdAtMillis": 0
        }))
        .unwrap()
    }

    /// Poll every gateway until `done` holds or two seconds pass.
    fn wait_until(gateways: &[&RelayGateway], mut done: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            for gateway in gateways {
                gateway.poll();
            }
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[tokio::test]
    async fn test_relay_gateway_through_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(AppState::new(16));
        let app = router(state.clone());
        tokio::spawn(async move { axum::serve(listener, app).await });
        let url = format!("ws://{}/ws", addr);

        tokio::task::spawn_blocking(move || {
            let ada = RelayGateway::connect(&url, "room", &Collaborator::new("u1", "Ada Lovelacé")).unwrap();
            let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
            let sink = seen.clone();
            let _sub = ada.subscribe(Box::new(move |update: &CanvasUpdate| {
                sink.lock().unwrap().push(update.drawings.len());
            }));
            assert!(wait_until(&[&ada], || !seen.lock().unwrap().is_empty()));

            block_on(ada.push_drawing(&entry("d1", "u1"))).unwrap();
            assert!(wait_until(&[&ada], || seen.lock().unwrap().last() == Some(&1)));
            assert_eq!(*seen.lock().unwrap(), vec![0, 1]);

            let grace = RelayGateway::connect(&url, "room", &Collaborator::new("u2", "Grace")).unwrap();
            let roster: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
            let sink = roster.clone();
            let _roster_sub = grace.subscribe_roster(Box::new(move |collaborators: &[Collaborator]| {
                *sink.lock().unwrap() = collaborators.iter().map(|c| c.user_name.clone()).collect();
            }));
            let grace_canvas: Arc<Mutex<Option<usize>>> = Arc::new(Mutex::new(None));
            let sink = grace_canvas.clone();
            let _canvas_sub = grace.subscribe(Box::new(move |update: &CanvasUpdate| {
                *sink.lock().unwrap() = Some(update.drawings.len());
            }));

            assert!(wait_until(&[&ada, &grace], || roster.lock().unwrap().len() == 2));
            assert_eq!(*roster.lock().unwrap(), vec!["Ada Lovelacé".to_string(), "Grace".to_string()]);
            assert!(wait_until(&[&grace], || *grace_canvas.lock().unwrap() == Some(1)));

            ada.disconnect();
            grace.disconnect();
        })
        .await
        .unwrap();

        assert_eq!(state.canvas("room").unwrap().len(), 1);
    }
}
