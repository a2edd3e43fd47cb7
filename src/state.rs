use std::{sync::Arc, time::Duration};

use moka::future::Cache;
use sqlx::PgPool;

use crate::{auth::AuthUser, config::AppConfig, db::build_pool, error::AppError};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: Option<PgPool>,
    pub http_client: reqwest::Client,
    /// Users resolved from bearer tokens, keyed by user id.
    pub user_cache: Cache<String, AuthUser>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db_pool = build_pool(&config)?;
        if db_pool.is_none() {
            tracing::warn!("DATABASE_URL is not set; data endpoints will return 502");
        }

        let http_client = reqwest::Client::builder()
            .user_agent(config.geocoder_user_agent.clone())
            .timeout(Duration::from_secs(10))
            .build()?;

        let user_cache = Cache::builder()
            .max_capacity(config.user_cache_max_entries)
            .time_to_live(Duration::from_secs(config.user_cache_ttl_seconds.max(1)))
            .build();

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            http_client,
            user_cache,
        })
    }
}

pub fn db_pool(state: &AppState) -> Result<&PgPool, AppError> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
