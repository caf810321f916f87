use loggate_core::{BackendParams, BackendProvider, GateError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Every section is optional; a missing section or field keeps its default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub cloud: CloudConfig,
    pub aws: BackendParams,
    pub db: DbConfig,
    #[serde(alias = "cert")]
    pub tls: TlsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
    pub bind_host: String,
    pub max_body_bytes: usize,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            bind_host: "0.0.0.0".to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            request_timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub provider: BackendProvider,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            provider: BackendProvider::Debug,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub connection: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            connection: PathBuf::from("loggers.db"),
        }
    }
}

/// With `enabled = false` the server speaks plain HTTP, for local testing only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cert_file: PathBuf::from("./certs/server.crt"),
            key_file: PathBuf::from("./certs/server.key"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Defaults, then the file at `path` (format from its extension), then
    /// `LOGGATE_<SECTION>__<FIELD>` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::load_with_env(path, environment())
    }

    fn load_with_env(path: Option<&str>, env: ::config::Environment) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path));
        }

        let settings = builder
            .add_source(env)
            .build()
            .map_err(|e| GateError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| GateError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.api.max_body_bytes == 0 {
            return Err(GateError::Config(
                "api.max_body_bytes must be greater than zero".to_string(),
            ));
        }
        if self.api.request_timeout_secs == 0 {
            return Err(GateError::Config(
                "api.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn environment() -> ::config::Environment {
    ::config::Environment::with_prefix("LOGGATE")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
