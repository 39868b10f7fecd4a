use std::sync::Arc;

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::external::analysis_engine::AnalysisEngine;
use crate::services::analysis_trigger_service::AnalysisJobRunner;
use crate::services::rate_limiter::RateLimiter;
use crate::store::AnalysisStore;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub store: Arc<dyn AnalysisStore>,
    pub job_runner: AnalysisJobRunner,
    pub rate_limiter: Arc<RateLimiter>,
    pub analysis_rate_limiter: Arc<RateLimiter>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        store: Arc<dyn AnalysisStore>,
        engine: Arc<dyn AnalysisEngine>,
        config: AppConfig,
    ) -> Self {
        let job_runner = AnalysisJobRunner::new(store.clone(), engine, config.engine.period.clone());
        Self {
            pool,
            store,
            job_runner,
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit)),
            analysis_rate_limiter: Arc::new(RateLimiter::new(config.analysis_rate_limit)),
            config: Arc::new(config),
        }
    }
}
