pub mod error;
pub mod handlers;

pub use error::ApiError;
pub use handlers::*;

use crate::db::RecordStore;
use crate::service::{ImportService, RecognitionService};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceBuilder;

/// 共享状态: 各路由组各自持有所需的服务
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub store: Arc<dyn RecordStore>,
    pub imports: Arc<ImportService>,
    pub recognition: Arc<RecognitionService>,
    pub max_upload_bytes: usize,
}

/// 构建全部路由
pub fn router(state: AppState) -> Router {
    let pricing_routes = Router::new()
        .route("/api/pricing/reconcile", post(reconcile_pricing))
        .route("/api/products/:id/pricing", put(update_product_pricing))
        .with_state(state.store.clone());

    let import_routes = Router::new()
        .route("/api/import/:target", post(open_import_session))
        .route(
            "/api/import/sessions/:id",
            get(get_import_session).delete(cancel_import),
        )
        .route("/api/import/sessions/:id/mapping", put(update_import_mapping))
        .route("/api/import/sessions/:id/commit", post(commit_import))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .with_state(state.imports.clone());

    let export_routes = Router::new()
        .route("/api/export/:target/template", get(download_template))
        .route("/api/export/customers", get(export_known_customers))
        .with_state(state.pool.clone());

    let recognition_routes = Router::new()
        .route("/api/recognition", post(recognize_product))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .with_state(state.recognition.clone());

    Router::new()
        .route("/health", get(health_check))
        .merge(pricing_routes)
        .merge(import_routes)
        .merge(export_routes)
        .merge(recognition_routes)
        .layer(ServiceBuilder::new())
}
