use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

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
    pub geo: GeoConfig,
    pub directory: DirectoryConfig,
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

        let geo = GeoConfig {
            api_key: env::var("GEO_API_KEY").unwrap_or_default(),
            geocode_url: env::var("GEO_GEOCODE_URL")
                .unwrap_or_else(|_| "https://maps.googleapis.com/maps/api/geocode/json".to_string()),
            directions_url: env::var("GEO_DIRECTIONS_URL").unwrap_or_else(|_| {
                "https://maps.googleapis.com/maps/api/directions/json".to_string()
            }),
            timeout_secs: env::var("GEO_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidGeoTimeout)?,
        };

        let directory = DirectoryConfig {
            base_url: env::var("DIRECTORY_BASE_URL").ok().filter(|v| !v.is_empty()),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            geo,
            directory,
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Settings for the road-distance and geocoding provider.
///
/// The timeout bounds how long an assignment holds its driver/date lock while
/// a distance lookup is in flight, so it should stay in single-digit seconds.
#[derive(Debug, Clone)]
pub struct GeoConfig {
    pub api_key: String,
    pub geocode_url: String,
    pub directions_url: String,
    pub timeout_secs: u64,
}

/// Base URL for the external driver/user/vendor directory service. When unset
/// the service falls back to a seeded in-memory directory.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub base_url: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidGeoTimeout,
    InvalidHost { source: std::net::AddrParseError },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidGeoTimeout => write!(f, "GEO_TIMEOUT_SECS must be a valid u64"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidGeoTimeout => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
