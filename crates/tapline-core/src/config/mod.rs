//! Application configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from
//! TOML files and `TAPLINE__*` environment variables. Each sub-module
//! represents a logical configuration section.

pub mod api;
pub mod logging;
pub mod polling;
pub mod realtime;
pub mod session;
pub mod store;
pub mod supervisor;

use serde::{Deserialize, Serialize};

pub use self::api::ApiConfig;
pub use self::logging::LoggingConfig;
pub use self::polling::PollingConfig;
pub use self::realtime::RealtimeConfig;
pub use self::session::SessionConfig;
pub use self::store::StoreConfig;
pub use self::supervisor::SupervisorConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// Top-level deserialization target for the merged configuration
/// (default file + environment overlay + environment variables).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Realtime websocket settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Polling fallback settings.
    #[serde(default)]
    pub polling: PollingConfig,
    /// Transport supervisor settings.
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// REST API settings.
    #[serde(default)]
    pub api: ApiConfig,
    /// Last-seen store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Session credential and conversations to open.
    #[serde(default)]
    pub session: SessionConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration.
    ///
    /// Merges `config/default`, an environment-specific overlay
    /// `config/{env}` and environment variables prefixed with `TAPLINE`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("TAPLINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let parsed: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        parsed.validate()?;
        Ok(parsed)
    }

    /// Rejects settings that would break the transport contracts.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.realtime.max_attempts == 0 {
            return Err(AppError::configuration(
                "realtime.max_attempts must be at least 1",
            ));
        }
        if self.polling.interval_seconds == 0 {
            return Err(AppError::configuration(
                "polling.interval_seconds must be at least 1",
            ));
        }
        if self.supervisor.watchdog_seconds == 0 {
            return Err(AppError::configuration(
                "supervisor.watchdog_seconds must be at least 1",
            ));
        }
        Ok(())
    }
}
