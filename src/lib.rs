// Library exports for the server binary, seed tooling and tests
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod reconciler;
pub mod routes;
pub mod services;

use std::sync::Arc;

use sqlx::PgPool;

use config::Config;
use services::events::EventBroadcaster;
use services::locks::GroupLocks;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub redis_client: redis::Client,
    pub events: EventBroadcaster,
    pub locks: Arc<GroupLocks>,
    pub config: Arc<Config>,
}
