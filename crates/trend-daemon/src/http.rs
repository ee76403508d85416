use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::rails::{Outcome, RailRegistry, RailView};
use crate::source::DaemonSource;

type Registry = Arc<RailRegistry<DaemonSource>>;

#[derive(Serialize)]
struct RailSummary {
    name: String,
    state: &'static str,
    error: Option<String>,
    items: usize,
}

impl From<RailView> for RailSummary {
    fn from(v: RailView) -> Self {
        Self {
            name: v.name,
            state: v.state,
            error: v.error,
            items: v.items.len(),
        }
    }
}

pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/api/rails", get(list_rails))
        .route("/api/rails/:name", get(get_rail))
        .route("/api/rails/:name/refresh", post(refresh_rail))
        .route("/api/rails/:name/more", post(load_more))
        .with_state(registry)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    registry: Registry,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(registry);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn list_rails(State(registry): State<Registry>) -> Json<Vec<RailSummary>> {
    let views = registry.views().await;
    Json(views.into_iter().map(RailSummary::from).collect())
}

async fn get_rail(State(registry): State<Registry>, Path(name): Path<String>) -> Response {
    match registry.view(&name).await {
        Some(view) => Json(view).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn refresh_rail(State(registry): State<Registry>, Path(name): Path<String>) -> Response {
    info!("HTTP API: refresh {}", name);
    outcome_response(registry.refresh(&name).await)
}

async fn load_more(State(registry): State<Registry>, Path(name): Path<String>) -> Response {
    info!("HTTP API: load more {}", name);
    outcome_response(registry.load_more(&name).await)
}

fn outcome_response(outcome: Option<Outcome>) -> Response {
    match outcome {
        Some(Outcome::Done(view)) => Json(view).into_response(),
        Some(Outcome::Busy(view)) => (StatusCode::ACCEPTED, Json(view)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
