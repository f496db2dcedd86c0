//! Lazy, idempotent provisioning of the error table.
//!
//! Every error log operation calls [`TableProvisioner::ensure_ready`] first.
//! Once the table is known to exist the call is a single atomic load. Until
//! then, callers serialize on a lock and the first one through loads the
//! table metadata, creating the table if configured to.
//!
//! The ready flag lives in a [`ProvisioningState`] that can be shared by
//! several logs writing to the same physical table, so the table is checked
//! (and created) once per state rather than once per log.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Result, StoreError, TableClient, TableDefinition, TableStatus};
use crate::utils::retry::RetryPolicy;

/// Shared "table confirmed to exist" flag and the lock guarding its first
/// transition.
///
/// The flag only ever goes from false to true.
#[derive(Debug, Default)]
pub struct ProvisioningState {
    ready: AtomicBool,
    /// Completed provisioning attempts.
    attempts: AtomicU64,
    /// Held for the duration of an attempt. Stores the last attempt's failure.
    gate: Mutex<Option<StoreError>>,
}

impl ProvisioningState {
    pub fn new() -> Self {
        Self::default()
    }

    /// New state behind an `Arc`, ready to hand to several logs.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Mark the table as existing. Returns true if this call flipped the flag.
    pub fn mark_ready(&self) -> bool {
        !self.ready.swap(true, Ordering::AcqRel)
    }

    /// Run `provision` unless the table is already known to exist.
    ///
    /// Double-checked: the flag is tested before and after taking the lock.
    /// A caller that waited on the lock while another caller's attempt failed
    /// gets a clone of that failure instead of starting a new attempt. Callers
    /// that arrive after a failure start over.
    pub async fn get_or_provision<F, Fut>(&self, provision: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if self.is_ready() {
            return Ok(());
        }

        let observed = self.attempts.load(Ordering::Acquire);
        let mut last_failure = self.gate.lock().await;

        if self.is_ready() {
            return Ok(());
        }
        if self.attempts.load(Ordering::Acquire) != observed {
            if let Some(err) = last_failure.as_ref() {
                return Err(err.clone());
            }
        }

        let outcome = provision().await;
        self.attempts.fetch_add(1, Ordering::AcqRel);

        match outcome {
            Ok(()) => {
                *last_failure = None;
                self.mark_ready();
                Ok(())
            }
            Err(e) => {
                *last_failure = Some(e.clone());
                Err(e)
            }
        }
    }
}

/// Outcome of one status check while waiting for a table to become active.
#[derive(Debug)]
enum StatusCheck {
    NotActive(TableStatus),
    Missing,
    Failed(StoreError),
}

impl StatusCheck {
    /// Not usable yet, or not yet visible. Worth checking again.
    fn is_transient(&self) -> bool {
        matches!(self, StatusCheck::NotActive(_) | StatusCheck::Missing)
    }
}

/// Ensures the error table exists before the log touches it.
pub struct TableProvisioner {
    client: Arc<dyn TableClient>,
    definition: TableDefinition,
    create_table: bool,
    retry: RetryPolicy,
    state: Arc<ProvisioningState>,
}

impl TableProvisioner {
    /// Create a provisioner with its own state and the standard creation poll.
    pub fn new(client: Arc<dyn TableClient>, definition: TableDefinition, create_table: bool) -> Self {
        Self {
            client,
            definition,
            create_table,
            retry: RetryPolicy::table_creation(),
            state: ProvisioningState::shared(),
        }
    }

    /// Replace the status poll policy used while a new table becomes active.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Share provisioning state with other provisioners of the same table.
    pub fn with_state(mut self, state: Arc<ProvisioningState>) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> &Arc<ProvisioningState> {
        &self.state
    }

    pub fn definition(&self) -> &TableDefinition {
        &self.definition
    }

    /// Return once the table exists, creating it first if allowed.
    pub async fn ensure_ready(&self) -> Result<()> {
        if self.state.is_ready() {
            return Ok(());
        }
        self.state.get_or_provision(|| self.provision()).await
    }

    async fn provision(&self) -> Result<()> {
        let table = &self.definition.table_name;

        match self.client.describe_table(table).await? {
            Some(description) if description.status == TableStatus::Creating => {
                debug!(table = %table, "Table is being created elsewhere, waiting");
                self.wait_until_active().await
            }
            Some(description) if description.status.is_usable() => {
                debug!(table = %table, status = ?description.status, "Table exists");
                Ok(())
            }
            Some(description) => {
                warn!(
                    table = %table,
                    status = ?description.status,
                    "Table exists but is not usable, waiting for it to become active"
                );
                self.wait_until_active().await
            }
            None if !self.create_table => {
                warn!(table = %table, "Table missing and table creation is disabled");
                Err(StoreError::TableNotFound(table.clone()))
            }
            None => self.create().await,
        }
    }

    async fn create(&self) -> Result<()> {
        let table = &self.definition.table_name;
        info!(
            table = %table,
            index = %self.definition.index.name,
            read_capacity_units = self.definition.read_capacity_units,
            write_capacity_units = self.definition.write_capacity_units,
            stream_enabled = self.definition.stream_enabled,
            "Creating error table"
        );

        let status = match self.client.create_table(&self.definition).await {
            Ok(status) => status,
            Err(StoreError::TableAlreadyExists(_)) => {
                debug!(table = %table, "Table created concurrently by another process");
                TableStatus::Creating
            }
            Err(e) => return Err(e),
        };

        if !status.is_usable() {
            self.wait_until_active().await?;
        }

        info!(table = %table, "Error table active");
        Ok(())
    }

    /// Poll the table status under the retry policy until it is usable.
    ///
    /// Unusable statuses and a missing table are retried until the policy is
    /// exhausted, which ends the wait with `TableNotReady`. Store failures are
    /// returned as is.
    async fn wait_until_active(&self) -> Result<()> {
        let table = &self.definition.table_name;
        let client = &self.client;

        let check = || async move {
            match client.describe_table(table).await {
                Ok(Some(d)) if d.status.is_usable() => Ok(()),
                Ok(Some(d)) => Err(StatusCheck::NotActive(d.status)),
                Ok(None) => Err(StatusCheck::Missing),
                Err(e) => Err(StatusCheck::Failed(e)),
            }
        };

        let result = check
            .retry(self.retry.backoff())
            .sleep(tokio::time::sleep)
            .when(StatusCheck::is_transient)
            .notify(|check: &StatusCheck, delay: Duration| {
                debug!(table = %table, state = ?check, delay = ?delay, "Table not active yet");
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(StatusCheck::Failed(e)) => Err(e),
            Err(last) => {
                warn!(table = %table, state = ?last, "Table did not become active");
                Err(StoreError::TableNotReady(table.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::config::ErrorLogConfig;
    use crate::storage::MockTableClient;

    fn definition() -> TableDefinition {
        TableDefinition::for_config(&ErrorLogConfig::new("sample"))
    }

    fn provisioner(client: &Arc<MockTableClient>, create_table: bool) -> TableProvisioner {
        TableProvisioner::new(client.clone(), definition(), create_table)
            .with_retry_policy(RetryPolicy::immediate(3))
    }

    #[test]
    fn test_mark_ready_flips_once() {
        let state = ProvisioningState::new();
        assert!(!state.is_ready());
        assert!(state.mark_ready());
        assert!(!state.mark_ready());
        assert!(state.is_ready());
    }

    #[tokio::test]
    async fn test_get_or_provision_skips_when_ready() {
        let state = ProvisioningState::new();
        state.mark_ready();

        let calls = AtomicUsize::new(0);
        state
            .get_or_provision(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_get_or_provision_failure_leaves_flag_false() {
        let state = ProvisioningState::new();

        let result = state
            .get_or_provision(|| async { Err(StoreError::Request("boom".to_string())) })
            .await;
        assert_eq!(result, Err(StoreError::Request("boom".to_string())));
        assert!(!state.is_ready());

        // A later caller starts a fresh attempt.
        state.get_or_provision(|| async { Ok(()) }).await.unwrap();
        assert!(state.is_ready());
    }

    #[tokio::test]
    async fn test_existing_table_is_not_created() {
        let client = Arc::new(MockTableClient::with_table("Elmah_Error"));
        let provisioner = provisioner(&client, true);

        provisioner.ensure_ready().await.unwrap();

        assert!(provisioner.state().is_ready());
        assert_eq!(client.create_table_calls(), 0);
        assert_eq!(client.describe_table_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_table_is_created_once() {
        let client = Arc::new(MockTableClient::new());
        let provisioner = provisioner(&client, true);

        provisioner.ensure_ready().await.unwrap();
        provisioner.ensure_ready().await.unwrap();

        assert_eq!(client.create_table_calls(), 1);
        assert_eq!(client.table_definition("Elmah_Error").await, Some(definition()));
    }

    #[tokio::test]
    async fn test_ready_state_skips_store() {
        let client = Arc::new(MockTableClient::new());
        let provisioner = provisioner(&client, true);

        provisioner.ensure_ready().await.unwrap();
        let describes = client.describe_table_calls();

        provisioner.ensure_ready().await.unwrap();
        assert_eq!(client.describe_table_calls(), describes);
    }

    #[tokio::test]
    async fn test_missing_table_without_create_fails() {
        let client = Arc::new(MockTableClient::new());
        let provisioner = provisioner(&client, false);

        let err = provisioner.ensure_ready().await.unwrap_err();

        assert_eq!(err, StoreError::TableNotFound("Elmah_Error".to_string()));
        assert!(err.is_not_found());
        assert!(!provisioner.state().is_ready());
        assert_eq!(client.create_table_calls(), 0);
    }

    #[tokio::test]
    async fn test_waits_while_table_creating() {
        let client = Arc::new(MockTableClient::new());
        client.set_creating_polls(2).await;
        let provisioner = provisioner(&client, true);

        provisioner.ensure_ready().await.unwrap();

        // describe (missing) + two CREATING polls + the ACTIVE one
        assert_eq!(client.describe_table_calls(), 4);
        assert!(provisioner.state().is_ready());
    }

    #[tokio::test]
    async fn test_updating_table_is_ready_immediately() {
        let client = Arc::new(MockTableClient::with_table("Elmah_Error"));
        client.set_pending_statuses([TableStatus::Updating]).await;
        let provisioner = provisioner(&client, true);

        provisioner.ensure_ready().await.unwrap();

        assert!(provisioner.state().is_ready());
        assert_eq!(client.describe_table_calls(), 1);
    }

    #[tokio::test]
    async fn test_waits_on_unusable_status() {
        let client = Arc::new(MockTableClient::with_table("Elmah_Error"));
        client
            .set_pending_statuses([
                TableStatus::Other("INACCESSIBLE_ENCRYPTION_CREDENTIALS".to_string()),
                TableStatus::Other("INACCESSIBLE_ENCRYPTION_CREDENTIALS".to_string()),
            ])
            .await;
        let provisioner = provisioner(&client, true);

        provisioner.ensure_ready().await.unwrap();

        // two unusable describes, then ACTIVE
        assert_eq!(client.describe_table_calls(), 3);
        assert_eq!(client.create_table_calls(), 0);
        assert!(provisioner.state().is_ready());
    }

    #[tokio::test]
    async fn test_deleting_table_is_not_ready() {
        let client = Arc::new(MockTableClient::with_table("Elmah_Error"));
        client
            .set_pending_statuses(vec![TableStatus::Other("DELETING".to_string()); 10])
            .await;
        let provisioner = provisioner(&client, true);

        let err = provisioner.ensure_ready().await.unwrap_err();

        assert_eq!(err, StoreError::TableNotReady("Elmah_Error".to_string()));
        assert!(!provisioner.state().is_ready());
        assert_eq!(client.create_table_calls(), 0);
    }

    #[tokio::test]
    async fn test_transient_missing_during_creation_is_retried() {
        let client = Arc::new(MockTableClient::new());
        client.set_invisible_polls(2).await;
        let provisioner = provisioner(&client, true);

        provisioner.ensure_ready().await.unwrap();
        assert!(provisioner.state().is_ready());
    }

    #[tokio::test]
    async fn test_creation_poll_exhausted() {
        let client = Arc::new(MockTableClient::new());
        client.set_creating_polls(10).await;
        let provisioner = provisioner(&client, true);

        let err = provisioner.ensure_ready().await.unwrap_err();

        assert_eq!(err, StoreError::TableNotReady("Elmah_Error".to_string()));
        assert!(err.is_not_found());
        assert!(!provisioner.state().is_ready());
        // initial describe + first poll + three retries
        assert_eq!(client.describe_table_calls(), 5);
    }

    #[tokio::test]
    async fn test_create_failure_propagates_and_retries_later() {
        let client = Arc::new(MockTableClient::new());
        client
            .set_fail_on_create(Some(StoreError::Request("throttled".to_string())))
            .await;
        let provisioner = provisioner(&client, true);

        let err = provisioner.ensure_ready().await.unwrap_err();
        assert_eq!(err, StoreError::Request("throttled".to_string()));
        assert!(!provisioner.state().is_ready());

        client.set_fail_on_create(None).await;
        provisioner.ensure_ready().await.unwrap();
        assert_eq!(client.create_table_calls(), 2);
    }

    #[tokio::test]
    async fn test_table_already_exists_is_success() {
        let client = Arc::new(MockTableClient::new());
        client.set_create_conflict(true).await;
        let provisioner = provisioner(&client, true);

        provisioner.ensure_ready().await.unwrap();

        assert!(provisioner.state().is_ready());
        assert_eq!(client.create_table_calls(), 1);
    }

    #[tokio::test]
    async fn test_shared_state_across_provisioners() {
        let client = Arc::new(MockTableClient::new());
        let state = ProvisioningState::shared();
        let first = provisioner(&client, true).with_state(state.clone());
        let second = provisioner(&client, true).with_state(state.clone());

        first.ensure_ready().await.unwrap();
        second.ensure_ready().await.unwrap();

        assert_eq!(client.create_table_calls(), 1);
        assert_eq!(client.describe_table_calls(), 1);
    }
}
