pub mod analysis_job_service;
pub mod analysis_service;
pub mod analysis_trigger_service;
pub mod job_scheduler_service;
pub mod portfolio_service;
pub mod rate_limiter;
pub mod stock_service;
