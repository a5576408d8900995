use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: Option<PgPool>,
    pub http: reqwest::Client,
    pub report_cache: Cache<String, Value>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db_pool = match &config.database_url {
            Some(url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.db_pool_max_connections)
                    .min_connections(config.db_pool_min_connections)
                    .acquire_timeout(Duration::from_secs(config.db_pool_acquire_timeout_seconds))
                    .connect_lazy(url)?;
                Some(pool)
            }
            None => None,
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        let report_cache = Cache::builder()
            .max_capacity(config.report_response_cache_max_entries)
            .time_to_live(Duration::from_secs(config.report_response_cache_ttl_seconds))
            .build();

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            http,
            report_cache,
        })
    }

    pub fn require_db(&self) -> Result<&PgPool, crate::error::AppError> {
        self.db_pool.as_ref().ok_or_else(|| {
            crate::error::AppError::Dependency(
                "Database is not configured. Set DATABASE_URL.".to_string(),
            )
        })
    }
}
