use axum::{routing::get, Router};

use crate::state::AppState;

pub mod assets;
pub mod auth;
pub mod contracts;
pub mod dashboard;
pub mod financial_records;
pub mod geocode;
pub mod health;
pub mod maintenance;
pub mod notifications;
pub mod payments;
pub mod users;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(auth::router())
        .merge(users::router())
        .merge(assets::router())
        .merge(contracts::router())
        .merge(payments::router())
        .merge(maintenance::router())
        .merge(financial_records::router())
        .merge(notifications::router())
        .merge(dashboard::router())
        .merge(geocode::router())
}
