//! Configuration for the DynamoDB error log.
//!
//! Supports YAML file and environment variable overrides. Every constructor
//! of [`crate::TableErrorLog`] runs [`ErrorLogConfig::validate`] before any
//! store call is made.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::utils::retry::RetryPolicy;

/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "ELMAH_CONFIG";
/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "elmah.yaml";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "ELMAH_LOG";

/// Default table name.
pub const DEFAULT_TABLE_NAME: &str = "Elmah_Error";
/// Default provisioned read capacity for the table and its index.
pub const DEFAULT_READ_CAPACITY_UNITS: i64 = 8;
/// Default provisioned write capacity for the table and its index.
pub const DEFAULT_WRITE_CAPACITY_UNITS: i64 = 6;

/// Error log configuration.
///
/// Keys are camelCase in YAML (`applicationName`, `tableName`, ...).
/// Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ErrorLogConfig {
    /// Application whose errors this log writes and lists. Required.
    pub application_name: String,
    /// DynamoDB table name.
    pub table_name: String,
    /// Provisioned read capacity units (table and index).
    pub read_capacity_units: i64,
    /// Provisioned write capacity units (table and index).
    pub write_capacity_units: i64,
    /// Enable a NEW_IMAGE change stream when creating the table.
    pub stream_enabled: bool,
    /// Create the table on first use if it does not exist.
    pub create_table: bool,
    /// Named AWS credentials profile.
    pub profile: Option<String>,
    /// AWS region. Uses the default provider chain if not set.
    pub region: Option<String>,
    /// Custom endpoint URL (DynamoDB Local, LocalStack).
    pub endpoint_url: Option<String>,
    /// Status polling while a newly created table becomes active.
    pub creation_poll: CreationPollConfig,
}

impl Default for ErrorLogConfig {
    fn default() -> Self {
        Self {
            application_name: String::new(),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            read_capacity_units: DEFAULT_READ_CAPACITY_UNITS,
            write_capacity_units: DEFAULT_WRITE_CAPACITY_UNITS,
            stream_enabled: true,
            create_table: true,
            profile: None,
            region: None,
            endpoint_url: None,
            creation_poll: CreationPollConfig::default(),
        }
    }
}

/// Table creation polling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct CreationPollConfig {
    /// Status checks after the first one before giving up.
    pub max_attempts: usize,
    /// Delay between status checks, in milliseconds.
    pub interval_ms: u64,
}

impl Default for CreationPollConfig {
    fn default() -> Self {
        let policy = RetryPolicy::table_creation();
        Self {
            max_attempts: policy.max_attempts,
            interval_ms: policy.interval.as_millis() as u64,
        }
    }
}

impl CreationPollConfig {
    /// Retry policy for the creation poll.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.interval_ms))
    }
}

impl ErrorLogConfig {
    /// Create a configuration for an application with all other settings defaulted.
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            ..Self::default()
        }
    }

    /// Load configuration from file and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. `ELMAH_*` environment variables
    /// 2. File given by `path`, else `ELMAH_CONFIG`, else `elmah.yaml` if present
    /// 3. Defaults
    ///
    /// The result is validated.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => Some(p.to_string()),
            None => std::env::var(CONFIG_ENV_VAR).ok(),
        };

        let mut config = match config_path {
            Some(p) => Self::from_file(&p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file. Not validated.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text. Not validated.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `ELMAH_*` overrides read through `lookup`.
    ///
    /// Malformed numeric or boolean values are rejected rather than ignored.
    fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ELMAH_APPLICATION_NAME") {
            self.application_name = v;
        }
        if let Some(v) = lookup("ELMAH_TABLE_NAME") {
            self.table_name = v;
        }
        if let Some(v) = lookup("ELMAH_READ_CAPACITY_UNITS") {
            self.read_capacity_units = parse_value("readCapacityUnits", &v)?;
        }
        if let Some(v) = lookup("ELMAH_WRITE_CAPACITY_UNITS") {
            self.write_capacity_units = parse_value("writeCapacityUnits", &v)?;
        }
        if let Some(v) = lookup("ELMAH_STREAM_ENABLED") {
            self.stream_enabled = parse_value("streamEnabled", &v)?;
        }
        if let Some(v) = lookup("ELMAH_CREATE_TABLE") {
            self.create_table = parse_value("createTable", &v)?;
        }
        if let Some(v) = lookup("ELMAH_PROFILE") {
            self.profile = Some(v);
        }
        if let Some(v) = lookup("ELMAH_REGION") {
            self.region = Some(v);
        }
        if let Some(v) = lookup("ELMAH_ENDPOINT_URL") {
            self.endpoint_url = Some(v);
        }
        Ok(())
    }

    /// Check required settings and value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.trim().is_empty() {
            return Err(ConfigError::MissingApplicationName);
        }
        if self.table_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "tableName",
                reason: "must not be empty".to_string(),
            });
        }
        if self.read_capacity_units <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "readCapacityUnits",
                reason: format!("must be positive, got {}", self.read_capacity_units),
            });
        }
        if self.write_capacity_units <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "writeCapacityUnits",
                reason: format!("must be positive, got {}", self.write_capacity_units),
            });
        }
        Ok(())
    }
}

fn parse_value<T>(field: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            field,
            reason: format!("'{}': {}", raw, e),
        })
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required 'applicationName' in configuration")]
    MissingApplicationName,

    #[error("invalid '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Failed to read config file '{0}': {1}")]
    FileRead(String, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),
}
