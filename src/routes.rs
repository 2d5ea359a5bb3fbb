//! HTTP router (C12): binds the handlers to `/api`, layering the admin-key
//! middleware over every route except `GET /api/file`.

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::auth::require_admin_key;
use crate::handlers::object_handlers::{delete_object, get_file, list_buckets, list_files, route_not_found, upload};
use crate::state::AppState;

pub fn build(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/buckets", get(list_buckets))
        .route("/files", get(list_files))
        .route("/upload", post(upload))
        .route("/delete", delete(delete_object))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin_key));

    let public_routes = Router::new().route("/file", get(get_file));

    Router::new()
        .nest("/api", admin_routes.merge(public_routes))
        .fallback(route_not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
