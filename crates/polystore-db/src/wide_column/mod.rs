//! Wide-column store backed by DynamoDB, in the cloud or on a local emulator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::{
    config::{Credentials, Region},
    error::{DisplayErrorContext, SdkError},
    types::{
        AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ReturnValue,
        ScalarAttributeType,
    },
    Client,
};
use futures::stream::{self, StreamExt};
use log::{debug, info};
use tokio::sync::RwLock;

use polystore_domain::{
    collect_records, Close, Connect, CreateSchema, FieldKind, Insert, InsertResult, Mutation,
    Projection, Query, Record, RecordStream, Result, SchemaDescriptor, SchemaOutcome,
    StoreError, Update, UpdateResult,
};

pub mod attributes;
use attributes::{attribute_from_value, item_from_record, key_from_record, record_from_item};

mod filter;
pub use filter::ScanFilter;

pub const DEFAULT_REGION: &str = "us-west-2";

/// Cloud endpoint with the default credential chain, or a local emulator
/// with static dummy credentials when `endpoint` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamoTarget {
    pub region: String,
    pub endpoint: Option<String>,
}

impl DynamoTarget {
    pub fn cloud(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            endpoint: None,
        }
    }

    pub fn local(port: u16) -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            endpoint: Some(format!("http://localhost:{}", port)),
        }
    }
}

pub struct DynamoClient {
    client: Client,
    schema: RwLock<Option<SchemaDescriptor>>,
    closed: AtomicBool,
}

/// Transport failures become connection errors
fn classify<E, R>(err: SdkError<E, R>, fallback: fn(String) -> StoreError) -> StoreError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => StoreError::Connection(message),
        _ => fallback(message),
    }
}

fn scalar_type(kind: FieldKind) -> ScalarAttributeType {
    match kind {
        FieldKind::Text { .. } => ScalarAttributeType::S,
        FieldKind::Integer => ScalarAttributeType::N,
    }
}

/// `SET #u0 = :u0, ...` with its names and values
fn update_expression(
    mutation: &Mutation,
) -> (
    String,
    HashMap<String, String>,
    HashMap<String, aws_sdk_dynamodb::types::AttributeValue>,
) {
    let mut names = HashMap::new();
    let mut values = HashMap::new();
    let mut assignments = Vec::new();
    for (i, (name, value)) in mutation.fields().enumerate() {
        names.insert(format!("#u{}", i), name.clone());
        values.insert(format!(":u{}", i), attribute_from_value(value));
        assignments.push(format!("#u{} = :u{}", i, i));
    }
    (format!("SET {}", assignments.join(", ")), names, values)
}

impl DynamoClient {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::closed());
        }
        Ok(())
    }

    async fn schema(&self) -> Result<SchemaDescriptor> {
        self.ensure_open()?;
        self.schema
            .read()
            .await
            .clone()
            .ok_or_else(StoreError::no_schema)
    }

    /// All table names, following pagination
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        self.client
            .list_tables()
            .into_paginator()
            .items()
            .send()
            .collect::<std::result::Result<Vec<_>, _>>()
            .await
            .map_err(|e| classify(e, StoreError::Read))
    }

    /// Fetch one item by its full primary key.
    /// Fields of `key` outside the key schema are ignored.
    pub async fn get_item(&self, key: &Record) -> Result<Option<Record>> {
        let schema = self.schema().await?;
        let key = key_from_record(&schema, key)?;
        let output = self
            .client
            .get_item()
            .table_name(&schema.name)
            .set_key(Some(key))
            .send()
            .await
            .map_err(|e| classify(e, StoreError::Read))?;
        Ok(output.item.as_ref().map(record_from_item))
    }
}

#[async_trait]
impl Connect for DynamoClient {
    type Target = DynamoTarget;

    /// The SDK connects lazily, so an unreachable endpoint surfaces as a
    /// connection error on the first request.
    async fn connect(target: &DynamoTarget) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(target.region.clone()));
        if let Some(endpoint) = &target.endpoint {
            loader = loader.endpoint_url(endpoint).credentials_provider(Credentials::new(
                "dummy",
                "dummy",
                Some("dummy".to_string()),
                None,
                "polystore-local",
            ));
        }
        let config = loader.load().await;
        info!(
            "dynamodb client for {} ({})",
            target.endpoint.as_deref().unwrap_or("aws"),
            target.region
        );

        Ok(Self {
            client: Client::new(&config),
            schema: RwLock::new(None),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl CreateSchema for DynamoClient {
    /// Create the table with on-demand billing. An existing table is
    /// reported as `AlreadyExists`.
    async fn create_schema(&self, schema: &SchemaDescriptor) -> Result<SchemaOutcome> {
        self.ensure_open()?;
        schema.validate()?;
        if schema.key.is_empty() || schema.key.len() > 2 {
            return Err(StoreError::schema(format!(
                "table `{}` needs a hash key and at most one range key",
                schema.name
            )));
        }

        let mut definitions = Vec::new();
        let mut key_schema = Vec::new();
        for (i, name) in schema.key.iter().enumerate() {
            let field = schema
                .get_field(name)
                .ok_or_else(|| StoreError::schema(format!("key `{}` is not declared", name)))?;
            definitions.push(
                AttributeDefinition::builder()
                    .attribute_name(name)
                    .attribute_type(scalar_type(field.kind))
                    .build()
                    .map_err(StoreError::schema)?,
            );
            let key_type = if i == 0 { KeyType::Hash } else { KeyType::Range };
            key_schema.push(
                KeySchemaElement::builder()
                    .attribute_name(name)
                    .key_type(key_type)
                    .build()
                    .map_err(StoreError::schema)?,
            );
        }

        let result = self
            .client
            .create_table()
            .table_name(&schema.name)
            .set_attribute_definitions(Some(definitions))
            .set_key_schema(Some(key_schema))
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await;

        let outcome = match result {
            Ok(output) => {
                debug!("created table {:?}", output.table_description);
                SchemaOutcome::Created
            }
            Err(err)
                if err
                    .as_service_error()
                    .map_or(false, |e| e.is_resource_in_use_exception()) =>
            {
                SchemaOutcome::AlreadyExists
            }
            Err(err) => return Err(classify(err, StoreError::Schema)),
        };
        *self.schema.write().await = Some(schema.clone());
        Ok(outcome)
    }
}

#[async_trait]
impl Insert for DynamoClient {
    /// One `PutItem` per record, an existing item with the same key is replaced
    async fn insert(&self, records: Vec<Record>) -> Result<InsertResult> {
        let schema = self.schema().await?;
        for record in &records {
            schema.check_record(record)?;
        }

        let mut inserted = 0;
        for record in &records {
            self.client
                .put_item()
                .table_name(&schema.name)
                .set_item(Some(item_from_record(record)))
                .send()
                .await
                .map_err(|e| classify(e, StoreError::Write))?;
            inserted += 1;
        }
        Ok(InsertResult {
            inserted,
            ids: Vec::new(),
        })
    }
}

#[async_trait]
impl Query for DynamoClient {
    type Filter = ScanFilter;

    /// Paginated scan, pages are fetched as the stream is polled
    async fn find<'a>(
        &'a self,
        filter: &ScanFilter,
        projection: Option<&Projection>,
    ) -> Result<RecordStream<'a>> {
        let (names, projection_expression) = filter.attribute_names(projection)?;
        let schema = self.schema().await?;

        let pages = self
            .client
            .scan()
            .table_name(&schema.name)
            .set_filter_expression(filter.expression().map(str::to_string))
            .set_expression_attribute_names(names)
            .set_expression_attribute_values(filter.attribute_values())
            .set_projection_expression(projection_expression)
            .into_paginator()
            .items()
            .send();

        let items = stream::unfold(pages, |mut pages| async move {
            pages.next().await.map(|item| (item, pages))
        });
        Ok(items
            .map(|item| {
                item.map(|item| record_from_item(&item))
                    .map_err(|e| classify(e, StoreError::Read))
            })
            .boxed())
    }
}

#[async_trait]
impl Update for DynamoClient {
    /// Scan for the matching keys, then `UpdateItem` each of them.
    /// Key attributes cannot be mutated.
    async fn update(&self, filter: &ScanFilter, mutation: &Mutation) -> Result<UpdateResult> {
        let schema = self.schema().await?;
        if mutation.is_empty() {
            return Err(StoreError::write("empty mutation"));
        }
        if let Some(key) = mutation.names().find(|name| schema.is_key(name)) {
            return Err(StoreError::write(format!(
                "key attribute `{}` cannot be updated",
                key
            )));
        }

        let key_projection = Projection::new(schema.key.iter().cloned());
        let matches = collect_records(self.find(filter, Some(&key_projection)).await?).await?;
        let (expression, names, values) = update_expression(mutation);

        let mut result = UpdateResult::default();
        for record in &matches {
            let key = key_from_record(&schema, record)?;
            let output = self
                .client
                .update_item()
                .table_name(&schema.name)
                .set_key(Some(key))
                .update_expression(&expression)
                .set_expression_attribute_names(Some(names.clone()))
                .set_expression_attribute_values(Some(values.clone()))
                .return_values(ReturnValue::UpdatedOld)
                .send()
                .await
                .map_err(|e| classify(e, StoreError::Write))?;

            result.matched += 1;
            let old = output.attributes.map(|item| record_from_item(&item));
            let changed = match old {
                Some(old) => mutation
                    .fields()
                    .any(|(name, value)| old.get(name) != Some(value)),
                None => true,
            };
            if changed {
                result.modified += 1;
            }
        }
        Ok(result)
    }
}

#[async_trait]
impl Close for DynamoClient {
    /// The SDK holds no session, closing only refuses further requests
    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("dynamodb client closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_dynamodb::types::AttributeValue;
    use polystore_domain::ErrorKind;

    use super::*;

    fn dummy_table() -> SchemaDescriptor {
        SchemaDescriptor::new("dummy-table")
            .text("id", 50)
            .text("name", 50)
            .key(["id", "name"])
    }

    #[test]
    fn test_targets() {
        assert_eq!(
            DynamoTarget::local(8003).endpoint.as_deref(),
            Some("http://localhost:8003")
        );
        assert_eq!(DynamoTarget::local(8003).region, "us-west-2");
        assert_eq!(DynamoTarget::cloud("eu-west-1").endpoint, None);
    }

    #[test]
    fn test_update_expression() {
        let mutation = Record::new().with("nickname", "Rach").with("age", 30);
        let (expression, names, values) = update_expression(&mutation);

        assert_eq!(expression, "SET #u0 = :u0, #u1 = :u1");
        assert_eq!(names.get("#u0"), Some(&"age".to_string()));
        assert_eq!(names.get("#u1"), Some(&"nickname".to_string()));
        assert_eq!(values.get(":u0"), Some(&AttributeValue::N("30".into())));
    }

    #[tokio::test]
    async fn test_operations_need_schema_and_open_client() {
        let client = DynamoClient::connect(&DynamoTarget::local(8003))
            .await
            .unwrap();

        let err = client.insert(vec![Record::new()]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);

        client.close().await;
        client.close().await;
        let err = client.list_tables().await.unwrap_err();
        assert_eq!(err, StoreError::closed());
        let err = client.create_schema(&dummy_table()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_find_rejects_empty_projection() {
        let client = DynamoClient::connect(&DynamoTarget::local(8003))
            .await
            .unwrap();
        let empty = Projection::new(Vec::<String>::new());
        let err = client
            .find(&ScanFilter::all(), Some(&empty))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Read);
    }

    #[tokio::test]
    async fn test_create_schema_rejects_bad_key() {
        let client = DynamoClient::connect(&DynamoTarget::local(8003))
            .await
            .unwrap();
        let no_key = SchemaDescriptor::new("dummy-table").text("id", 50);
        let err = client.create_schema(&no_key).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);

        let three = dummy_table().text("extra", 5).key(["id", "name", "extra"]);
        assert!(client.create_schema(&three).await.is_err());
    }
}
