use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::{handlers, instances, middleware::metrics_middleware, pipelines};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health and metrics
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        // Templates
        .route("/pipelines", get(pipelines::list_pipelines))
        .route(
            "/pipelines/{name}/{version}",
            get(pipelines::get_pipeline).post(pipelines::create_instance),
        )
        .route("/pipelines/status", get(pipelines::pool_status))
        // Instances
        .route("/instances", get(instances::list_instances))
        .route(
            "/instances/{id}",
            get(instances::get_instance).delete(instances::stop_instance),
        )
        .route("/instances/{id}/status", get(instances::get_status))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
