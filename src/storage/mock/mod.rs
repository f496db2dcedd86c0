//! In-memory table client for testing.
//!
//! Behaves like a single-region DynamoDB endpoint for the operations the
//! error log uses: tables are created on request, the application/time
//! index is queried newest-first with continuation keys, and the item count
//! is reported from `describe_table`. Knobs simulate creation latency,
//! transitional table statuses, a stale item count, a store-side page size smaller than the requested
//! limit, and failures.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::schema::{self, ATTR_APPLICATION, ATTR_ERROR_ID, ATTR_TIME_UTC};
use super::{
    ContinuationKey, ErrorRecord, IndexQuery, QueryPage, Result, StoreError, TableClient,
    TableDefinition, TableDescription, TableStatus,
};
use crate::config::ErrorLogConfig;


/// Default store-side page size (items per query call).
pub const DEFAULT_PAGE_SIZE: usize = 1000;

struct MockTable {
    definition: TableDefinition,
    records: HashMap<Uuid, ErrorRecord>,
}

impl MockTable {
    fn new(definition: TableDefinition) -> Self {
        Self {
            definition,
            records: HashMap::new(),
        }
    }
}

#[derive(Default)]
struct Behavior {
    /// Describes that report CREATING after a create.
    creating_polls: usize,
    /// Describes that report the table missing after a create.
    invisible_polls: usize,
    /// Statuses reported, one per describe, before the table's own.
    pending_statuses: VecDeque<TableStatus>,
    /// Create the table but answer as if another process already had.
    create_conflict: bool,
    /// Reported item count, instead of the real one.
    item_count: Option<u64>,
    fail_on_describe: Option<StoreError>,
    fail_on_create: Option<StoreError>,
    fail_on_put: Option<StoreError>,
    fail_on_get: Option<StoreError>,
    fail_on_query: Option<StoreError>,
}

/// Mock table client that stores records in memory.
pub struct MockTableClient {
    tables: RwLock<HashMap<String, MockTable>>,
    behavior: RwLock<Behavior>,
    page_size: usize,
    describe_calls: AtomicUsize,
    create_calls: AtomicUsize,
    put_calls: AtomicUsize,
    get_calls: AtomicUsize,
    query_calls: AtomicUsize,
}

impl Default for MockTableClient {
    fn default() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            behavior: RwLock::new(Behavior::default()),
            page_size: DEFAULT_PAGE_SIZE,
            describe_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            put_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
        }
    }
}

impl MockTableClient {
    /// Client with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Client with an existing, active, empty error table.
    pub fn with_table(table_name: &str) -> Self {
        let mut tables = HashMap::new();
        tables.insert(
            table_name.to_string(),
            MockTable::new(default_definition(table_name)),
        );
        Self {
            tables: RwLock::new(tables),
            ..Self::default()
        }
    }

    /// Cap the number of items any single query returns.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub async fn set_creating_polls(&self, polls: usize) {
        self.behavior.write().await.creating_polls = polls;
    }

    pub async fn set_invisible_polls(&self, polls: usize) {
        self.behavior.write().await.invisible_polls = polls;
    }

    /// Report these statuses from the next describes of an existing table.
    pub async fn set_pending_statuses(&self, statuses: impl IntoIterator<Item = TableStatus>) {
        self.behavior.write().await.pending_statuses = statuses.into_iter().collect();
    }

    pub async fn set_create_conflict(&self, conflict: bool) {
        self.behavior.write().await.create_conflict = conflict;
    }

    /// Report this item count from `describe_table` regardless of contents.
    pub async fn set_item_count(&self, count: Option<u64>) {
        self.behavior.write().await.item_count = count;
    }

    pub async fn set_fail_on_describe(&self, err: Option<StoreError>) {
        self.behavior.write().await.fail_on_describe = err;
    }

    pub async fn set_fail_on_create(&self, err: Option<StoreError>) {
        self.behavior.write().await.fail_on_create = err;
    }

    pub async fn set_fail_on_put(&self, err: Option<StoreError>) {
        self.behavior.write().await.fail_on_put = err;
    }

    pub async fn set_fail_on_get(&self, err: Option<StoreError>) {
        self.behavior.write().await.fail_on_get = err;
    }

    pub async fn set_fail_on_query(&self, err: Option<StoreError>) {
        self.behavior.write().await.fail_on_query = err;
    }

    /// Store a record directly, bypassing counters and failure injection.
    ///
    /// Creates the table if it does not exist.
    pub async fn insert_record(&self, table_name: &str, record: ErrorRecord) {
        self.tables
            .write()
            .await
            .entry(table_name.to_string())
            .or_insert_with(|| MockTable::new(default_definition(table_name)))
            .records
            .insert(record.id, record);
    }

    /// All records of a table, in no particular order.
    pub async fn records(&self, table_name: &str) -> Vec<ErrorRecord> {
        self.tables
            .read()
            .await
            .get(table_name)
            .map(|t| t.records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Definition the table was created with.
    pub async fn table_definition(&self, table_name: &str) -> Option<TableDefinition> {
        self.tables
            .read()
            .await
            .get(table_name)
            .map(|t| t.definition.clone())
    }

    pub fn describe_table_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    pub fn create_table_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn put_item_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn get_item_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn query_index_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    /// Calls of any kind.
    pub fn total_calls(&self) -> usize {
        self.describe_table_calls()
            + self.create_table_calls()
            + self.put_item_calls()
            + self.get_item_calls()
            + self.query_index_calls()
    }
}

fn default_definition(table_name: &str) -> TableDefinition {
    TableDefinition::for_config(&ErrorLogConfig {
        table_name: table_name.to_string(),
        ..ErrorLogConfig::new("mock")
    })
}

/// Key of the last evaluated item, as DynamoDB reports it for a GSI query:
/// the table key plus the index keys.
fn continuation_key(record: &ErrorRecord) -> ContinuationKey {
    ContinuationKey::new([
        (ATTR_ERROR_ID, record.id.to_string()),
        (ATTR_APPLICATION, record.application_name.clone()),
        (ATTR_TIME_UTC, schema::format_time_utc(&record.time_utc)),
    ])
}

fn missing_table(table_name: &str) -> StoreError {
    StoreError::TableNotFound(table_name.to_string())
}

#[async_trait]
impl TableClient for MockTableClient {
    async fn describe_table(&self, table_name: &str) -> Result<Option<TableDescription>> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);

        let mut behavior = self.behavior.write().await;
        if let Some(err) = behavior.fail_on_describe.clone() {
            return Err(err);
        }

        let tables = self.tables.read().await;
        let Some(table) = tables.get(table_name) else {
            return Ok(None);
        };

        if behavior.invisible_polls > 0 {
            behavior.invisible_polls -= 1;
            return Ok(None);
        }

        let status = if let Some(status) = behavior.pending_statuses.pop_front() {
            status
        } else if behavior.creating_polls > 0 {
            behavior.creating_polls -= 1;
            TableStatus::Creating
        } else {
            TableStatus::Active
        };

        Ok(Some(TableDescription {
            status,
            item_count: behavior
                .item_count
                .unwrap_or(table.records.len() as u64),
        }))
    }

    async fn create_table(&self, definition: &TableDefinition) -> Result<TableStatus> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        // Let concurrent callers run while the request is "in flight".
        tokio::task::yield_now().await;

        let behavior = self.behavior.read().await;
        if let Some(err) = behavior.fail_on_create.clone() {
            return Err(err);
        }

        let mut tables = self.tables.write().await;
        if tables.contains_key(&definition.table_name) {
            return Err(StoreError::TableAlreadyExists(definition.table_name.clone()));
        }
        tables.insert(
            definition.table_name.clone(),
            MockTable::new(definition.clone()),
        );

        if behavior.create_conflict {
            return Err(StoreError::TableAlreadyExists(definition.table_name.clone()));
        }

        if behavior.creating_polls == 0 && behavior.invisible_polls == 0 {
            Ok(TableStatus::Active)
        } else {
            Ok(TableStatus::Creating)
        }
    }

    async fn put_item(&self, table_name: &str, record: &ErrorRecord) -> Result<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.behavior.read().await.fail_on_put.clone() {
            return Err(err);
        }

        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(table_name)
            .ok_or_else(|| missing_table(table_name))?;
        table.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_item(&self, table_name: &str, id: Uuid) -> Result<Option<ErrorRecord>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.behavior.read().await.fail_on_get.clone() {
            return Err(err);
        }

        let tables = self.tables.read().await;
        let table = tables
            .get(table_name)
            .ok_or_else(|| missing_table(table_name))?;
        Ok(table.records.get(&id).cloned())
    }

    async fn query_index(&self, query: &IndexQuery) -> Result<QueryPage> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.behavior.read().await.fail_on_query.clone() {
            return Err(err);
        }
        if query.limit == 0 {
            return Err(StoreError::Request(
                "Limit must be greater than or equal to 1".to_string(),
            ));
        }

        let tables = self.tables.read().await;
        let table = tables
            .get(&query.table_name)
            .ok_or_else(|| missing_table(&query.table_name))?;
        if table.definition.index.name != query.index_name {
            return Err(StoreError::Request(format!(
                "The table does not have the specified index: {}",
                query.index_name
            )));
        }

        // Ordered by the stored TimeUtc string, newest first, ErrorId breaking ties.
        let mut matching: Vec<(String, &ErrorRecord)> = table
            .records
            .values()
            .filter(|r| r.application_name == query.application_name)
            .map(|r| (schema::format_time_utc(&r.time_utc), r))
            .collect();
        matching.sort_by(|(a_time, a), (b_time, b)| (b_time, b.id).cmp(&(a_time, a.id)));

        let start = match &query.exclusive_start_key {
            Some(key) => {
                let time = schema::format_time_utc(&schema::parse_time_utc(
                    key.get(ATTR_TIME_UTC).unwrap_or_default(),
                )?);
                let id = schema::parse_error_id(key.get(ATTR_ERROR_ID).unwrap_or_default())?;
                matching
                    .iter()
                    .position(|(t, r)| (t.as_str(), r.id) < (time.as_str(), id))
                    .unwrap_or(matching.len())
            }
            None => 0,
        };

        let limit = query.limit.min(self.page_size);
        let remaining = &matching[start..];
        let records: Vec<ErrorRecord> = remaining
            .iter()
            .take(limit)
            .map(|(_, r)| (*r).clone())
            .collect();

        let last_evaluated_key = if remaining.len() > records.len() {
            records.last().map(continuation_key)
        } else {
            None
        };

        Ok(QueryPage {
            records,
            last_evaluated_key,
        })
    }
}
