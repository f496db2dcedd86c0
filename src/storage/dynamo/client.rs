//! DynamoDB implementation of [`TableClient`].

use async_trait::async_trait;
use aws_sdk_dynamodb::error::{BuildError, DisplayErrorContext};
use aws_sdk_dynamodb::types::{
    self as sdk, AttributeDefinition, AttributeValue, GlobalSecondaryIndex, KeySchemaElement,
    KeyType, Projection, ProjectionType, ProvisionedThroughput, ScalarAttributeType, Select,
    StreamSpecification, StreamViewType,
};
use aws_sdk_dynamodb::Client;
use tracing::{debug, info};
use uuid::Uuid;

use super::item::{key_from_item, key_to_item, record_from_item, record_to_item};
use crate::config::ErrorLogConfig;
use crate::storage::schema::{ATTR_APPLICATION, ATTR_ERROR_ID};
use crate::storage::{
    ErrorRecord, IndexQuery, QueryPage, Result, StoreError, TableClient, TableDefinition,
    TableDescription, TableStatus,
};

/// Table client backed by the AWS SDK.
#[derive(Clone)]
pub struct DynamoTableClient {
    client: Client,
}

impl DynamoTableClient {
    /// Wrap an already configured SDK client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build an SDK client from the default credential chain.
    ///
    /// `profile`, `region` and `endpoint_url` from the configuration override
    /// the environment when set.
    pub async fn connect(config: &ErrorLogConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let client = if let Some(endpoint) = &config.endpoint_url {
            let dynamo_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config)
                .endpoint_url(endpoint)
                .build();
            Client::from_conf(dynamo_config)
        } else {
            Client::new(&sdk_config)
        };

        info!(
            table = %config.table_name,
            region = ?sdk_config.region().map(|r| r.to_string()),
            endpoint = ?config.endpoint_url,
            "Connected to DynamoDB"
        );

        Self { client }
    }

    /// The underlying SDK client.
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

fn request_failed(operation: &str, err: impl std::error::Error) -> StoreError {
    StoreError::Request(format!(
        "DynamoDB {} failed: {}",
        operation,
        DisplayErrorContext(err)
    ))
}

fn build_failed(err: BuildError) -> StoreError {
    StoreError::Request(format!("invalid create_table request: {}", err))
}

fn status_from_sdk(status: &sdk::TableStatus) -> TableStatus {
    match status {
        sdk::TableStatus::Creating => TableStatus::Creating,
        sdk::TableStatus::Active => TableStatus::Active,
        sdk::TableStatus::Updating => TableStatus::Updating,
        other => TableStatus::Other(other.as_str().to_string()),
    }
}

fn key_element(name: &str, key_type: KeyType) -> Result<KeySchemaElement> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
        .map_err(build_failed)
}

#[async_trait]
impl TableClient for DynamoTableClient {
    async fn describe_table(&self, table_name: &str) -> Result<Option<TableDescription>> {
        match self.client.describe_table().table_name(table_name).send().await {
            Ok(output) => Ok(output.table().map(|table| TableDescription {
                status: table
                    .table_status()
                    .map(status_from_sdk)
                    .unwrap_or_else(|| TableStatus::Other("UNKNOWN".to_string())),
                item_count: table.item_count().unwrap_or(0).max(0) as u64,
            })),
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_resource_not_found_exception())
                    .unwrap_or(false) =>
            {
                Ok(None)
            }
            Err(e) => Err(request_failed("describe_table", e)),
        }
    }

    async fn create_table(&self, definition: &TableDefinition) -> Result<TableStatus> {
        let throughput = ProvisionedThroughput::builder()
            .read_capacity_units(definition.read_capacity_units)
            .write_capacity_units(definition.write_capacity_units)
            .build()
            .map_err(build_failed)?;

        let attribute_definitions = definition
            .key_attributes()
            .iter()
            .map(|name| {
                AttributeDefinition::builder()
                    .attribute_name(*name)
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .map_err(build_failed)
            })
            .collect::<Result<Vec<_>>>()?;

        let index = GlobalSecondaryIndex::builder()
            .index_name(&definition.index.name)
            .key_schema(key_element(definition.index.hash_key, KeyType::Hash)?)
            .key_schema(key_element(definition.index.range_key, KeyType::Range)?)
            .projection(
                Projection::builder()
                    .projection_type(ProjectionType::All)
                    .build(),
            )
            .provisioned_throughput(throughput.clone())
            .build()
            .map_err(build_failed)?;

        let mut stream = StreamSpecification::builder().stream_enabled(definition.stream_enabled);
        if definition.stream_enabled {
            stream = stream.stream_view_type(StreamViewType::NewImage);
        }
        let stream = stream.build().map_err(build_failed)?;

        let result = self
            .client
            .create_table()
            .table_name(&definition.table_name)
            .key_schema(key_element(definition.hash_key, KeyType::Hash)?)
            .set_attribute_definitions(Some(attribute_definitions))
            .global_secondary_indexes(index)
            .provisioned_throughput(throughput)
            .stream_specification(stream)
            .send()
            .await;

        match result {
            Ok(output) => {
                let status = output
                    .table_description()
                    .and_then(|t| t.table_status())
                    .map(status_from_sdk)
                    .unwrap_or(TableStatus::Creating);
                debug!(table = %definition.table_name, ?status, "create_table accepted");
                Ok(status)
            }
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_resource_in_use_exception())
                    .unwrap_or(false) =>
            {
                Err(StoreError::TableAlreadyExists(definition.table_name.clone()))
            }
            Err(e) => Err(request_failed("create_table", e)),
        }
    }

    async fn put_item(&self, table_name: &str, record: &ErrorRecord) -> Result<()> {
        self.client
            .put_item()
            .table_name(table_name)
            .set_item(Some(record_to_item(record)))
            .send()
            .await
            .map_err(|e| request_failed("put_item", e))?;

        debug!(table = %table_name, id = %record.id, "Stored error record");
        Ok(())
    }

    async fn get_item(&self, table_name: &str, id: Uuid) -> Result<Option<ErrorRecord>> {
        let result = self
            .client
            .get_item()
            .table_name(table_name)
            .key(ATTR_ERROR_ID, AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| request_failed("get_item", e))?;

        result.item.as_ref().map(record_from_item).transpose()
    }

    async fn query_index(&self, query: &IndexQuery) -> Result<QueryPage> {
        let limit = i32::try_from(query.limit).unwrap_or(i32::MAX);

        let output = self
            .client
            .query()
            .table_name(&query.table_name)
            .index_name(&query.index_name)
            .key_condition_expression("#application = :application")
            .expression_attribute_names("#application", ATTR_APPLICATION)
            .expression_attribute_values(
                ":application",
                AttributeValue::S(query.application_name.clone()),
            )
            .scan_index_forward(false)
            .select(Select::AllProjectedAttributes)
            .limit(limit)
            .set_exclusive_start_key(query.exclusive_start_key.as_ref().map(key_to_item))
            .send()
            .await
            .map_err(|e| request_failed("query", e))?;

        let records = output
            .items
            .unwrap_or_default()
            .iter()
            .map(record_from_item)
            .collect::<Result<Vec<_>>>()?;
        let last_evaluated_key = match output.last_evaluated_key {
            Some(key) => key_from_item(key)?,
            None => None,
        };

        debug!(
            table = %query.table_name,
            application = %query.application_name,
            count = records.len(),
            more = last_evaluated_key.is_some(),
            "Queried error index"
        );

        Ok(QueryPage {
            records,
            last_evaluated_key,
        })
    }
}
