use axum::{Router, routing::get};
use state::AppState;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod auth_flow;
pub mod entity;
pub mod error;
pub mod extraction;
pub mod inference;
pub mod mail;
pub mod middleware;
pub mod otp;
mod routes;
pub mod state;
pub mod store;
pub mod token;

#[cfg(test)]
pub(crate) mod testing;

pub use axum;
pub use sea_orm;

pub fn construct_router(state: AppState) -> Router {
    Router::new()
        .nest("/health", routes::health::routes())
        .nest("/auth", routes::auth::routes(&state))
        .nest("/pdf_process", routes::pdf_process::routes())
        .nest("/conversation", routes::conversation::routes(&state))
        .route("/version", get(|| async { env!("CARGO_PKG_VERSION") }))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
