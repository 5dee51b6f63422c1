use axum::{
    Router,
    http::Method,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    create_category, create_client, delete_category, delete_client, email_clients, get_category,
    get_client, healthcheck, import_exercises, list_categories, list_clients, membership_report,
    membership_summary, update_category, update_client,
};
use super::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/api/clients", get(list_clients).post(create_client))
        .route("/api/clients/email", post(email_clients))
        .route("/api/clients/membership-summary", get(membership_summary))
        .route("/api/clients/membership-report", get(membership_report))
        .route(
            "/api/clients/:id",
            get(get_client).put(update_client).delete(delete_client),
        )
        .route(
            "/api/fitness-categories",
            get(list_categories).post(create_category),
        )
        .route("/api/fitness-categories/import", post(import_exercises))
        .route(
            "/api/fitness-categories/:id",
            get(get_category).put(update_category).delete(delete_category),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
