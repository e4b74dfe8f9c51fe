use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::workflows::enrollment::RenewalPolicy;

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

/// Top-level configuration for the eligibility service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub renewal: RenewalConfig,
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
            telemetry: TelemetryConfig {
                log_level,
                include_targets: environment == AppEnvironment::Development,
            },
            renewal: RenewalConfig::from_env()?,
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
    pub include_targets: bool,
}

/// Renewal reminder cadence and the background sweep schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalConfig {
    pub notification_buffer_months: u32,
    pub sweep_interval: Duration,
    pub calendar_year_renewal: bool,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            notification_buffer_months: 1,
            sweep_interval: Duration::from_secs(86_400),
            calendar_year_renewal: true,
        }
    }
}

impl RenewalConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let notification_buffer_months = match env::var("RENEWAL_NOTIFICATION_BUFFER_MONTHS") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidRenewalSetting {
                    name: "RENEWAL_NOTIFICATION_BUFFER_MONTHS",
                    value: raw,
                })?,
            Err(_) => defaults.notification_buffer_months,
        };

        let sweep_interval = match env::var("RENEWAL_SWEEP_INTERVAL_SECS") {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidRenewalSetting {
                        name: "RENEWAL_SWEEP_INTERVAL_SECS",
                        value: raw,
                    })
                }
            },
            Err(_) => defaults.sweep_interval,
        };

        let calendar_year_renewal = match env::var("RENEWAL_CALENDAR_YEAR") {
            Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => true,
                "false" | "0" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidRenewalSetting {
                        name: "RENEWAL_CALENDAR_YEAR",
                        value: raw,
                    })
                }
            },
            Err(_) => defaults.calendar_year_renewal,
        };

        Ok(Self {
            notification_buffer_months,
            sweep_interval,
            calendar_year_renewal,
        })
    }

    pub fn policy(&self) -> RenewalPolicy {
        RenewalPolicy {
            notification_buffer_months: self.notification_buffer_months,
            calendar_year_renewal: self.calendar_year_renewal,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidRenewalSetting { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidRenewalSetting { name, value } => {
                write!(f, "{name} has an invalid value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidRenewalSetting { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
