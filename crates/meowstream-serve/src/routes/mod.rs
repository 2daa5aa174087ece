//! API route definitions.

mod health;
mod meows;

use axum::Router;
use axum::routing::get;

use crate::state::AppState;

/// Build the complete API router.
///
/// # Route Structure
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Meows
/// - `GET /api/v1/meows` - Recent meows; filter with `did` or `subject`,
///   bound with `limit`
/// - `GET /api/v1/meows/{rkey}` - Single meow by record key, optionally
///   scoped to an actor with `did`
pub fn router(state: AppState) -> Router {
    let public = Router::new().route("/health", get(health::health_check));

    let api_v1 = Router::new()
        .route("/meows", get(meows::list_meows))
        .route("/meows/{rkey}", get(meows::get_meow));

    Router::new()
        .merge(public)
        .nest("/api/v1", api_v1)
        .with_state(state)
}
