//! Error table schema.
//!
//! Key and descriptive attribute names follow the ELMAH DynamoDB layout. The
//! body is not ELMAH's `AllXml` XML: it is the codec output (JSON by default)
//! in `ErrorBody`, so items written by ELMAH itself do not decode.
//!
//! | Attribute     | Type | Role                                 |
//! |---------------|------|--------------------------------------|
//! | `ErrorId`     | S    | table hash key (uuid)                |
//! | `Application` | S    | index hash key                       |
//! | `TimeUtc`     | S    | index range key (RFC 3339, UTC)      |
//! | `Host`        | S    |                                      |
//! | `Type`        | S    |                                      |
//! | `Source`      | S    |                                      |
//! | `Message`     | S    |                                      |
//! | `User`        | S    |                                      |
//! | `StatusCode`  | N    |                                      |
//! | `ErrorBody`   | S    | full error, encoded by the codec     |

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use super::{Result, StoreError};
use crate::config::ErrorLogConfig;

pub const ATTR_ERROR_ID: &str = "ErrorId";
pub const ATTR_APPLICATION: &str = "Application";
pub const ATTR_TIME_UTC: &str = "TimeUtc";
pub const ATTR_HOST: &str = "Host";
pub const ATTR_TYPE: &str = "Type";
pub const ATTR_SOURCE: &str = "Source";
pub const ATTR_MESSAGE: &str = "Message";
pub const ATTR_USER: &str = "User";
pub const ATTR_STATUS_CODE: &str = "StatusCode";
pub const ATTR_ERROR_BODY: &str = "ErrorBody";

/// Global secondary index over (`Application`, `TimeUtc`).
pub const APPLICATION_TIME_INDEX: &str = "Application-TimeUtc-index";

/// One persisted error.
///
/// Written once by the log path and never updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub id: Uuid,
    pub application_name: String,
    pub time_utc: DateTime<Utc>,
    pub host: String,
    pub type_name: String,
    pub source: String,
    pub message: String,
    pub user: String,
    pub status_code: i32,
    pub serialized_body: String,
}

/// Index key schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: String,
    pub hash_key: &'static str,
    pub range_key: &'static str,
}

/// Everything needed to create the error table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub table_name: String,
    pub hash_key: &'static str,
    pub index: IndexDefinition,
    /// Applied to both the table and the index.
    pub read_capacity_units: i64,
    pub write_capacity_units: i64,
    /// NEW_IMAGE change stream.
    pub stream_enabled: bool,
}

impl TableDefinition {
    /// Error table definition for a configuration.
    pub fn for_config(config: &ErrorLogConfig) -> Self {
        Self {
            table_name: config.table_name.clone(),
            hash_key: ATTR_ERROR_ID,
            index: IndexDefinition {
                name: APPLICATION_TIME_INDEX.to_string(),
                hash_key: ATTR_APPLICATION,
                range_key: ATTR_TIME_UTC,
            },
            read_capacity_units: config.read_capacity_units,
            write_capacity_units: config.write_capacity_units,
            stream_enabled: config.stream_enabled,
        }
    }

    /// String-typed attributes that must be declared: the table and index keys.
    pub fn key_attributes(&self) -> [&'static str; 3] {
        [self.index.hash_key, self.hash_key, self.index.range_key]
    }
}

/// Format a timestamp for the `TimeUtc` range key.
///
/// Fixed-width microseconds with a `Z` suffix, so lexical order of the
/// stored strings matches chronological order.
pub fn format_time_utc(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a `TimeUtc` value written by [`format_time_utc`] (or any RFC 3339 time).
pub fn parse_time_utc(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidRecord(format!("invalid {} '{}': {}", ATTR_TIME_UTC, value, e)))
}

/// Parse an `ErrorId` value.
pub fn parse_error_id(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| StoreError::InvalidRecord(format!("invalid {} '{}': {}", ATTR_ERROR_ID, value, e)))
}
