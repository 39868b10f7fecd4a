use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub db_max_connections: u32,
    pub run_migrations: bool,
    pub environment: String,
    pub cors_origins: Vec<String>,
    pub engine: EngineSettings,
    /// Jobs still running after this long are failed by the sweep. `None` disables it.
    pub job_max_runtime: Option<Duration>,
    pub rate_limit: RateLimitSettings,
    pub analysis_rate_limit: RateLimitSettings,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub base_url: String,
    pub period: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitSettings {
    pub window: Duration,
    pub max_requests: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let host = parse_or(&lookup, "API_HOST", IpAddr::from([0, 0, 0, 0]))?;
        let port = parse_or(&lookup, "API_PORT", 3000u16)?;
        let db_max_connections = positive(parse_or(&lookup, "DB_MAX_CONNECTIONS", 10u32)?, "DB_MAX_CONNECTIONS")?;
        let run_migrations = parse_or(&lookup, "RUN_MIGRATIONS", true)?;

        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());
        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let timeout_secs = positive(parse_or(&lookup, "ANALYSIS_TIMEOUT_SECS", 300u64)?, "ANALYSIS_TIMEOUT_SECS")?;
        let engine = EngineSettings {
            base_url: lookup("PYTHON_SERVICE_URL")
                .unwrap_or_else(|| "http://localhost:5000".to_string())
                .trim_end_matches('/')
                .to_string(),
            period: lookup("ANALYSIS_PERIOD").unwrap_or_else(|| "1y".to_string()),
            timeout: Duration::from_secs(timeout_secs),
        };

        let max_runtime_minutes = parse_or(&lookup, "ANALYSIS_JOB_MAX_RUNTIME_MINUTES", 30u64)?;
        let job_max_runtime = (max_runtime_minutes > 0)
            .then(|| Duration::from_secs(max_runtime_minutes * 60));

        let rate_limit = RateLimitSettings {
            window: Duration::from_secs(positive(
                parse_or(&lookup, "RATE_LIMIT_WINDOW_SECS", 900u64)?,
                "RATE_LIMIT_WINDOW_SECS",
            )?),
            max_requests: positive(
                parse_or(&lookup, "RATE_LIMIT_MAX_REQUESTS", 100u32)?,
                "RATE_LIMIT_MAX_REQUESTS",
            )?,
        };
        let analysis_rate_limit = RateLimitSettings {
            window: Duration::from_secs(positive(
                parse_or(&lookup, "ANALYSIS_RATE_LIMIT_WINDOW_SECS", 3600u64)?,
                "ANALYSIS_RATE_LIMIT_WINDOW_SECS",
            )?),
            max_requests: positive(
                parse_or(&lookup, "ANALYSIS_RATE_LIMIT_MAX_REQUESTS", 20u32)?,
                "ANALYSIS_RATE_LIMIT_MAX_REQUESTS",
            )?,
        };

        Ok(Self {
            database_url,
            host,
            port,
            db_max_connections,
            run_migrations,
            environment,
            cors_origins,
            engine,
            job_max_runtime,
            rate_limit,
            analysis_rate_limit,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        _ => Ok(default),
    }
}

fn positive<T>(value: T, name: &'static str) -> Result<T, ConfigError>
where
    T: PartialOrd + Default + ToString,
{
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::Invalid { name, value: value.to_string() })
    }
}
