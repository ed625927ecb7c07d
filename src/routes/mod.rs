// HTTP routes

mod http;

use axum::{
    Router,
    routing::{delete, get},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::charts::ChartDef;
use crate::config::AppConfig;
use crate::scheduler::Scheduler;
use crate::series::SeriesReconstructor;
use crate::snapshot_repo::SnapshotRepo;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) repo: Arc<SnapshotRepo>,
    pub(crate) scheduler: Arc<Scheduler>,
    pub(crate) reconstructor: Arc<SeriesReconstructor>,
    pub(crate) charts: Arc<Vec<ChartDef>>,
    pub(crate) config: AppConfig,
}

pub fn app(
    repo: Arc<SnapshotRepo>,
    scheduler: Arc<Scheduler>,
    reconstructor: Arc<SeriesReconstructor>,
    charts: Arc<Vec<ChartDef>>,
    config: AppConfig,
) -> Router {
    let state = AppState {
        repo,
        scheduler,
        reconstructor,
        charts,
        config,
    };
    Router::new()
        .route("/", get(|| async { "statdash" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/sources", get(http::sources_handler)) // GET /sources
        .route("/charts", get(http::charts_handler)) // GET /charts
        .route("/stats/{source}", get(http::stats_handler)) // GET /stats/:source
        .route("/stats/{source}", delete(http::delete_stats_handler)) // DELETE /stats/:source
        .route(
            "/refresh",
            get(http::refresh_handler).post(http::refresh_handler),
        ) // manual refresh-all trigger
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
