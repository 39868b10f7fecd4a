pub mod analysis_job_queries;
pub mod analysis_queries;
pub mod portfolio_queries;
pub mod stock_queries;
