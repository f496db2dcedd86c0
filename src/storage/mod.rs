//! Table storage for error records.
//!
//! The error log talks to its backing store only through [`TableClient`].
//!
//! ## Implementations
//!
//! - `DynamoTableClient` (feature: dynamo) - Amazon DynamoDB
//! - `MockTableClient` - in-memory table with call counters and failure
//!   injection, for tests and local runs
//!
//! ## Table Layout
//!
//! One table keyed by `ErrorId`, plus the `Application-TimeUtc-index` global
//! secondary index so an application's errors can be read newest-first
//! without a scan. See [`schema`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub mod mock;
pub mod provision;
pub mod schema;

#[cfg(feature = "dynamo")]
pub mod dynamo;

#[cfg(feature = "dynamo")]
pub use dynamo::DynamoTableClient;
pub use mock::MockTableClient;
pub use provision::{ProvisioningState, TableProvisioner};
pub use schema::{ErrorRecord, IndexDefinition, TableDefinition};

/// Errors that can occur during table operations.
///
/// Variants carry rendered messages rather than SDK errors so a single
/// provisioning failure can be cloned to every caller that waited on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Could not find table {0}")]
    TableNotFound(String),

    #[error("Could not create table {0}")]
    TableNotReady(String),

    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("Store request failed: {0}")]
    Request(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl StoreError {
    /// Table missing, or never became active after creation.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::TableNotFound(_) | StoreError::TableNotReady(_))
    }
}

/// Result type for table operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Lifecycle status of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableStatus {
    Creating,
    Active,
    /// Capacity or index change in progress. Reads and writes still succeed.
    Updating,
    /// Any other status reported by the store (deleting, archiving, ...).
    Other(String),
}

impl TableStatus {
    /// Whether items can be read and written in this status.
    pub fn is_usable(&self) -> bool {
        matches!(self, TableStatus::Active | TableStatus::Updating)
    }
}

/// Table metadata returned by [`TableClient::describe_table`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescription {
    pub status: TableStatus,
    /// Store-maintained item count. Refreshed periodically by the store,
    /// so it may lag recent writes.
    pub item_count: u64,
}

/// Opaque position in an index query, returned with a page when more
/// results may follow.
///
/// Holds the key attributes of the last evaluated item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContinuationKey(BTreeMap<String, String>);

impl ContinuationKey {
    pub fn new<I, K, V>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.0.get(attribute).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Query against the application/time index, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexQuery {
    pub table_name: String,
    pub index_name: String,
    /// Partition value; only records of this application are returned.
    pub application_name: String,
    /// Upper bound on items returned by this call. The store may return fewer.
    pub limit: usize,
    /// Resume after this key, as returned by the previous page.
    pub exclusive_start_key: Option<ContinuationKey>,
}

/// One page of an index query.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    /// Records in descending `TimeUtc` order.
    pub records: Vec<ErrorRecord>,
    /// Present when the store may have more results.
    pub last_evaluated_key: Option<ContinuationKey>,
}

/// Backing store operations needed by the error log.
///
/// All failures are returned unchanged to the caller except a missing
/// table on `describe_table`, which is `Ok(None)`.
#[async_trait]
pub trait TableClient: Send + Sync {
    /// Load table metadata, or `None` if the table does not exist.
    async fn describe_table(&self, table_name: &str) -> Result<Option<TableDescription>>;

    /// Issue a create-table request and return the status reported with it.
    ///
    /// Returns `StoreError::TableAlreadyExists` if the table already exists.
    async fn create_table(&self, definition: &TableDefinition) -> Result<TableStatus>;

    /// Write one record as a single atomic put.
    async fn put_item(&self, table_name: &str, record: &ErrorRecord) -> Result<()>;

    /// Read one record by id.
    async fn get_item(&self, table_name: &str, id: Uuid) -> Result<Option<ErrorRecord>>;

    /// Read one page of the application/time index.
    async fn query_index(&self, query: &IndexQuery) -> Result<QueryPage>;
}
