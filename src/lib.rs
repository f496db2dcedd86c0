//! elmah-dynamodb - DynamoDB error log
//!
//! Persists application error events into a DynamoDB table and reads them
//! back, one at a time or as time-descending pages scoped to an application.
//!
//! ## Layout
//! - [`error_log`]: the `ErrorLog` provider trait, the error event model,
//!   the table-backed implementation and its blocking facade.
//! - [`storage`]: the `TableClient` seam, record schema, table provisioning,
//!   and the DynamoDB / in-memory clients.
//! - [`config`]: typed, validated configuration.
//! - [`utils`]: tracing bootstrap and retry policies.

pub mod config;
pub mod error_log;
pub mod storage;
pub mod utils;

pub use config::{ConfigError, ErrorLogConfig};
pub use error_log::{
    BlockingErrorLog, ErrorEvent, ErrorLog, ErrorLogEntry, ErrorLogError, TableErrorLog,
};
