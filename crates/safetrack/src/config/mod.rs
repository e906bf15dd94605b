use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::compliance::gaps::CriticalityCoverageMethod;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            engine: EngineConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Tuning shared by the assignment and gap analysis engines.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub coverage_threshold: f64,
    pub expiring_window_days: i64,
    pub parallel_recompute: bool,
    pub recompute_threads: usize,
    pub criticality_coverage: CriticalityCoverageMethod,
    /// JSON role table replacing the built-in one.
    pub role_map_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            coverage_threshold: 0.80,
            expiring_window_days: 30,
            parallel_recompute: false,
            recompute_threads: 4,
            criticality_coverage: CriticalityCoverageMethod::Exact,
            role_map_path: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let coverage_threshold = match env_value("SAFETRACK_COVERAGE_THRESHOLD") {
            Some(raw) => raw
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite() && *value > 0.0 && *value <= 1.0)
                .ok_or(ConfigError::InvalidCoverageThreshold { value: raw })?,
            None => defaults.coverage_threshold,
        };

        let expiring_window_days = match env_value("SAFETRACK_EXPIRING_WINDOW_DAYS") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|days| (0..=3650).contains(days))
                .ok_or(ConfigError::InvalidExpiringWindow { value: raw })?,
            None => defaults.expiring_window_days,
        };

        let parallel_recompute = match env_value("SAFETRACK_PARALLEL_RECOMPUTE") {
            Some(raw) => parse_flag(&raw).ok_or(ConfigError::InvalidParallelRecompute { value: raw })?,
            None => defaults.parallel_recompute,
        };

        let recompute_threads = match env_value("SAFETRACK_RECOMPUTE_THREADS") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|threads| *threads >= 1)
                .ok_or(ConfigError::InvalidRecomputeThreads { value: raw })?,
            None => defaults.recompute_threads,
        };

        let criticality_coverage = match env_value("SAFETRACK_CRITICALITY_COVERAGE") {
            Some(raw) => CriticalityCoverageMethod::parse(&raw)
                .ok_or(ConfigError::InvalidCriticalityCoverage { value: raw })?,
            None => defaults.criticality_coverage,
        };

        Ok(Self {
            coverage_threshold,
            expiring_window_days,
            parallel_recompute,
            recompute_threads,
            criticality_coverage,
            role_map_path: env_value("SAFETRACK_ROLE_MAP").map(PathBuf::from),
        })
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidCoverageThreshold { value: String },
    InvalidExpiringWindow { value: String },
    InvalidParallelRecompute { value: String },
    InvalidRecomputeThreads { value: String },
    InvalidCriticalityCoverage { value: String },
    RoleMap {
        path: PathBuf,
        source: crate::compliance::mapping::RoleMapLoadError,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidCoverageThreshold { value } => write!(
                f,
                "SAFETRACK_COVERAGE_THRESHOLD must be a number in (0, 1], got '{}'",
                value
            ),
            ConfigError::InvalidExpiringWindow { value } => write!(
                f,
                "SAFETRACK_EXPIRING_WINDOW_DAYS must be a whole number of days, got '{}'",
                value
            ),
            ConfigError::InvalidParallelRecompute { value } => write!(
                f,
                "SAFETRACK_PARALLEL_RECOMPUTE must be true or false, got '{}'",
                value
            ),
            ConfigError::InvalidRecomputeThreads { value } => write!(
                f,
                "SAFETRACK_RECOMPUTE_THREADS must be at least 1, got '{}'",
                value
            ),
            ConfigError::InvalidCriticalityCoverage { value } => write!(
                f,
                "SAFETRACK_CRITICALITY_COVERAGE must be 'exact' or 'estimated', got '{}'",
                value
            ),
            ConfigError::RoleMap { path, source } => write!(
                f,
                "SAFETRACK_ROLE_MAP '{}' could not be loaded: {}",
                path.display(),
                source
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::RoleMap { source, .. } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidCoverageThreshold { .. }
            | ConfigError::InvalidExpiringWindow { .. }
            | ConfigError::InvalidParallelRecompute { .. }
            | ConfigError::InvalidRecomputeThreads { .. }
            | ConfigError::InvalidCriticalityCoverage { .. } => None,
        }
    }
}
