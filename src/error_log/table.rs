//! Table-backed error log.
//!
//! Errors are written one item per error. Listings read the
//! application/time index newest-first and page in memory: to serve page
//! `n` of size `s` the log reads the newest `s * (n + 1)` errors of the
//! application and returns the last `s` of them. Nothing is kept between
//! calls.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::{
    ErrorCodec, ErrorEvent, ErrorLog, ErrorLogEntry, ErrorLogError, JsonErrorCodec, Result,
};
use crate::config::ErrorLogConfig;
use crate::storage::schema::APPLICATION_TIME_INDEX;
use crate::storage::{
    ErrorRecord, IndexQuery, ProvisioningState, TableClient, TableDefinition, TableProvisioner,
};
use crate::utils::retry::RetryPolicy;

/// Display name of the table-backed log.
pub const LOG_NAME: &str = "Amazon DynamoDB Error Log";

/// Error log stored in a single table, scoped to one application.
pub struct TableErrorLog {
    client: Arc<dyn TableClient>,
    codec: Arc<dyn ErrorCodec>,
    application_name: String,
    table_name: String,
    provisioner: TableProvisioner,
}

impl TableErrorLog {
    /// Log for `application_name` with default table settings.
    pub fn new(client: Arc<dyn TableClient>, application_name: impl Into<String>) -> Result<Self> {
        Self::from_config(client, &ErrorLogConfig::new(application_name))
    }

    /// Log configured from an [`ErrorLogConfig`], using the given client.
    pub fn from_config(client: Arc<dyn TableClient>, config: &ErrorLogConfig) -> Result<Self> {
        config.validate()?;

        let provisioner = TableProvisioner::new(
            client.clone(),
            TableDefinition::for_config(config),
            config.create_table,
        )
        .with_retry_policy(config.creation_poll.retry_policy());

        Ok(Self {
            client,
            codec: Arc::new(JsonErrorCodec),
            application_name: config.application_name.clone(),
            table_name: config.table_name.clone(),
            provisioner,
        })
    }

    /// Log backed by DynamoDB, with the client built from the configuration.
    #[cfg(feature = "dynamo")]
    pub async fn connect(config: &ErrorLogConfig) -> Result<Self> {
        config.validate()?;
        let client = crate::storage::DynamoTableClient::connect(config).await;
        Self::from_config(Arc::new(client), config)
    }

    pub fn with_codec(mut self, codec: Arc<dyn ErrorCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Share the "table exists" state with other logs on the same table.
    pub fn with_provisioning_state(mut self, state: Arc<ProvisioningState>) -> Self {
        self.provisioner = self.provisioner.with_state(state);
        self
    }

    /// Replace the status poll used while a new table becomes active.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.provisioner = self.provisioner.with_retry_policy(retry);
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn provisioning_state(&self) -> &Arc<ProvisioningState> {
        self.provisioner.state()
    }

    async fn ensure_ready(&self) -> Result<()> {
        Ok(self.provisioner.ensure_ready().await?)
    }

    fn to_entry(&self, record: &ErrorRecord) -> Result<ErrorLogEntry> {
        let error = self.codec.decode(&record.serialized_body)?;
        Ok(ErrorLogEntry {
            id: record.id.to_string(),
            error,
            log_name: LOG_NAME.to_string(),
        })
    }

    /// Newest `window` records of the application, or a few more if the
    /// last store page overshoots.
    async fn read_window(&self, window: usize) -> Result<Vec<ErrorRecord>> {
        let mut records = Vec::new();
        let mut start = None;

        loop {
            let page = self
                .client
                .query_index(&IndexQuery {
                    table_name: self.table_name.clone(),
                    index_name: APPLICATION_TIME_INDEX.to_string(),
                    application_name: self.application_name.clone(),
                    limit: window,
                    exclusive_start_key: start.take(),
                })
                .await?;
            records.extend(page.records);

            match page.last_evaluated_key {
                Some(key) if records.len() < window => start = Some(key),
                _ => break,
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl ErrorLog for TableErrorLog {
    fn name(&self) -> &str {
        LOG_NAME
    }

    fn application_name(&self) -> &str {
        &self.application_name
    }

    async fn log(&self, error: &ErrorEvent) -> Result<String> {
        self.ensure_ready().await?;

        let record = ErrorRecord {
            id: Uuid::new_v4(),
            application_name: self.application_name.clone(),
            time_utc: error.time,
            host: error.host_name.clone(),
            type_name: error.type_name.clone(),
            source: error.source.clone(),
            message: error.message.clone(),
            user: error.user.clone(),
            status_code: error.status_code,
            serialized_body: self.codec.encode(error)?,
        };
        self.client.put_item(&self.table_name, &record).await?;

        debug!(
            table = %self.table_name,
            application = %self.application_name,
            id = %record.id,
            "Logged error"
        );
        Ok(record.id.to_string())
    }

    async fn get_error(&self, id: &str) -> Result<Option<ErrorLogEntry>> {
        let id = Uuid::parse_str(id).map_err(|_| ErrorLogError::InvalidId(id.to_string()))?;
        self.ensure_ready().await?;

        match self.client.get_item(&self.table_name, id).await? {
            Some(record) => self.to_entry(&record).map(Some),
            None => {
                debug!(table = %self.table_name, id = %id, "Error not found");
                Ok(None)
            }
        }
    }

    async fn get_errors(
        &self,
        page_index: usize,
        page_size: usize,
        sink: &mut Vec<ErrorLogEntry>,
    ) -> Result<usize> {
        let window = page_index
            .checked_add(1)
            .and_then(|pages| pages.checked_mul(page_size))
            .ok_or_else(|| {
                ErrorLogError::InvalidArgument(format!(
                    "page {} of size {} is out of range",
                    page_index, page_size
                ))
            })?;
        self.ensure_ready().await?;

        let mut added = 0;
        if window > 0 {
            let records = self.read_window(window).await?;
            let entries = records
                .iter()
                .map(|r| self.to_entry(r))
                .collect::<Result<Vec<_>>>()?;

            let skip = window - page_size;
            for entry in entries.into_iter().skip(skip).take(page_size) {
                sink.push(entry);
                added += 1;
            }
        }

        let item_count = self
            .client
            .describe_table(&self.table_name)
            .await?
            .map(|d| usize::try_from(d.item_count).unwrap_or(usize::MAX))
            .unwrap_or(0);

        debug!(
            table = %self.table_name,
            application = %self.application_name,
            page_index,
            page_size,
            added,
            item_count,
            "Listed errors"
        );
        Ok(added.max(item_count))
    }
}
