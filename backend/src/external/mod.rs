pub mod analysis_engine;
pub mod python_engine;
