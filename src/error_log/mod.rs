//! Error log providers.
//!
//! An [`ErrorLog`] persists [`ErrorEvent`]s and reads them back. The store
//! assigns every logged error a uuid and scopes listings to the
//! application name it was configured with.
//!
//! ## Implementations
//!
//! - [`TableErrorLog`] - table-backed log (DynamoDB or the in-memory mock)
//! - [`BlockingErrorLog`] - synchronous facade over any async log

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::storage::StoreError;

pub mod blocking;
pub mod codec;
pub mod table;

pub use blocking::BlockingErrorLog;
pub use codec::{CodecError, ErrorCodec, JsonErrorCodec};
pub use table::TableErrorLog;

/// Name/value pairs captured from a request. Names may repeat.
pub type NameValues = Vec<(String, String)>;

/// One application error, with the request context it was raised in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ErrorEvent {
    pub application_name: String,
    pub host_name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub source: String,
    pub message: String,
    /// Full diagnostic text: the error and its causes.
    pub detail: String,
    pub user: String,
    pub time: DateTime<Utc>,
    pub status_code: i32,
    /// Error page rendered by the web host, if any.
    pub web_host_html_message: String,
    pub server_variables: NameValues,
    pub query_string: NameValues,
    pub form: NameValues,
    pub cookies: NameValues,
}

impl ErrorEvent {
    /// Event with a message, stamped with the current time.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            time: Utc::now(),
            host_name: hostname(),
            ..Self::default()
        }
    }

    /// Capture a Rust error: its message, its type, and its `source()` chain.
    ///
    /// `type_name` is the static type of `E`. A trait object has none, so for
    /// `&dyn Error` (or `boxed.as_ref()`) it is left empty; set it with
    /// [`with_type`](Self::with_type).
    pub fn from_error<E>(error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut detail = error.to_string();
        let mut cause = error.source();
        while let Some(inner) = cause {
            detail.push_str("\n  caused by: ");
            detail.push_str(&inner.to_string());
            cause = inner.source();
        }

        let type_name = std::any::type_name::<E>();
        Self {
            type_name: if type_name.starts_with("dyn ") {
                String::new()
            } else {
                type_name.to_string()
            },
            detail,
            ..Self::new(error.to_string())
        }
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_status_code(mut self, status_code: i32) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    /// Look up the first server variable with this name.
    pub fn server_variable(&self, name: &str) -> Option<&str> {
        self.server_variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_default()
}

/// A logged error together with its id and the log it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLogEntry {
    pub id: String,
    pub error: ErrorEvent,
    /// `name()` of the owning log.
    pub log_name: String,
}

/// Errors surfaced by error log operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorLogError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid error id '{0}'")]
    InvalidId(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ErrorLogError {
    /// The table is missing or never became active.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ErrorLogError::Store(e) if e.is_not_found())
    }
}

/// Result type for error log operations.
pub type Result<T> = std::result::Result<T, ErrorLogError>;

/// Interface for error log providers.
#[async_trait]
pub trait ErrorLog: Send + Sync {
    /// Display name of the provider.
    fn name(&self) -> &str;

    /// Application whose errors this log writes and lists.
    fn application_name(&self) -> &str;

    /// Persist an error and return its newly assigned id.
    async fn log(&self, error: &ErrorEvent) -> Result<String>;

    /// Load one error by id. `Ok(None)` if no error has that id.
    async fn get_error(&self, id: &str) -> Result<Option<ErrorLogEntry>>;

    /// Append one page of errors, newest first, to `sink`.
    ///
    /// Returns the approximate number of errors in the log. It is never
    /// less than the number of entries appended.
    async fn get_errors(
        &self,
        page_index: usize,
        page_size: usize,
        sink: &mut Vec<ErrorLogEntry>,
    ) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use std::fmt;

    use super::*;

    #[derive(Debug)]
    struct Outer(Inner);

    #[derive(Debug)]
    struct Inner;

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "checkout failed")
        }
    }

    impl fmt::Display for Inner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "connection reset")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    impl std::error::Error for Inner {}

    #[test]
    fn test_from_error_captures_chain() {
        let before = Utc::now();
        let event = ErrorEvent::from_error(&Outer(Inner));

        assert_eq!(event.message, "checkout failed");
        assert!(event.type_name.ends_with("Outer"));
        assert_eq!(
            event.detail,
            "checkout failed\n  caused by: connection reset"
        );
        assert!(event.time >= before);
    }

    #[test]
    fn test_from_error_trait_object_has_no_type() {
        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(Outer(Inner));

        let event = ErrorEvent::from_error(boxed.as_ref());
        assert_eq!(event.type_name, "");
        assert_eq!(event.message, "checkout failed");
        assert_eq!(
            event.detail,
            "checkout failed\n  caused by: connection reset"
        );

        let dynamic: &dyn std::error::Error = &Inner;
        let event = ErrorEvent::from_error(dynamic).with_type("Inner");
        assert_eq!(event.type_name, "Inner");
    }

    #[test]
    fn test_builder_methods() {
        let event = ErrorEvent::new("boom")
            .with_type("System.Exception")
            .with_source("Orders")
            .with_user("alice")
            .with_status_code(404);

        assert_eq!(event.message, "boom");
        assert_eq!(event.type_name, "System.Exception");
        assert_eq!(event.source, "Orders");
        assert_eq!(event.user, "alice");
        assert_eq!(event.status_code, 404);
    }

    #[test]
    fn test_server_variable_lookup() {
        let mut event = ErrorEvent::new("boom");
        event.server_variables = vec![
            ("REMOTE_ADDR".to_string(), "10.0.0.1".to_string()),
            ("REMOTE_ADDR".to_string(), "10.0.0.2".to_string()),
        ];

        assert_eq!(event.server_variable("REMOTE_ADDR"), Some("10.0.0.1"));
        assert_eq!(event.server_variable("HTTP_HOST"), None);
    }

    #[test]
    fn test_is_not_found() {
        let missing = ErrorLogError::from(StoreError::TableNotFound("t".to_string()));
        let throttled = ErrorLogError::from(StoreError::Request("slow down".to_string()));

        assert!(missing.is_not_found());
        assert!(!throttled.is_not_found());
        assert!(!ErrorLogError::InvalidId("x".to_string()).is_not_found());
    }
}
