//! Document store backed by MongoDB.
//!
//! Filters are plain query documents (`{ "maths": { "$gt": 70 } }`), mutations
//! are wrapped in `$set`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::StreamExt;
use log::{debug, info};
use mongodb::{
    bson::{doc, Bson, Document},
    error::ErrorKind,
    options::{ClientOptions, FindOptions},
    Client, Collection,
};
use tokio::sync::RwLock;

use polystore_domain::{
    Close, Connect, CreateSchema, Insert, InsertResult, Mutation, Projection, Query, Record,
    RecordStream, Result, SchemaDescriptor, SchemaOutcome, StoreError, Update, UpdateResult,
    Value,
};

pub use mongodb::bson;

/// Applies to establishing the connection only
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Server error code for `NamespaceExists`
const NAMESPACE_EXISTS: i32 = 48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MongoTarget {
    pub uri: String,
    pub database: String,
}

impl MongoTarget {
    pub fn new(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
        }
    }
}

impl Default for MongoTarget {
    fn default() -> Self {
        Self::new("mongodb://localhost:27017", "test")
    }
}

pub struct MongoClient {
    client: Client,
    database: String,
    schema: RwLock<Option<SchemaDescriptor>>,
    closed: AtomicBool,
}

/// Map a driver error, network and auth failures become connection errors
fn classify(err: mongodb::error::Error, fallback: fn(String) -> StoreError) -> StoreError {
    match *err.kind {
        ErrorKind::Authentication { .. } | ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } => {
            StoreError::Connection(err.to_string())
        }
        _ => fallback(err.to_string()),
    }
}

fn is_namespace_exists(err: &mongodb::error::Error) -> bool {
    matches!(*err.kind, ErrorKind::Command(ref cmd) if cmd.code == NAMESPACE_EXISTS)
}

pub fn document_from_record(record: &Record) -> Document {
    let mut document = Document::new();
    for (name, value) in record.fields() {
        let value = match value {
            Value::Str(s) => Bson::String(s.clone()),
            Value::Int(i) => Bson::Int64(*i),
        };
        document.insert(name.clone(), value);
    }
    document
}

fn value_from_bson(value: &Bson) -> Option<Value> {
    let value = match value {
        Bson::Null | Bson::Undefined => return None,
        Bson::Int32(i) => Value::Int((*i).into()),
        Bson::Int64(i) => Value::Int(*i),
        Bson::Double(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Value::Int(*f as i64),
        Bson::String(s) => Value::Str(s.clone()),
        Bson::ObjectId(oid) => Value::Str(oid.to_hex()),
        other => Value::Str(other.to_string()),
    };
    Some(value)
}

pub fn record_from_document(document: &Document) -> Record {
    document
        .iter()
        .filter_map(|(name, value)| value_from_bson(value).map(|v| (name.clone(), v)))
        .collect()
}

/// Inclusion projection; `_id` is dropped unless asked for
pub fn projection_document(projection: &Projection) -> Document {
    let mut document = Document::new();
    for field in projection.iter() {
        document.insert(field, 1);
    }
    if !projection.contains("_id") {
        document.insert("_id", 0);
    }
    document
}

fn id_to_string(id: Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s,
        other => other.to_string(),
    }
}

impl MongoClient {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::closed());
        }
        Ok(())
    }

    async fn collection(&self) -> Result<(SchemaDescriptor, Collection<Document>)> {
        self.ensure_open()?;
        let schema = self
            .schema
            .read()
            .await
            .clone()
            .ok_or_else(StoreError::no_schema)?;
        let collection = self
            .client
            .database(&self.database)
            .collection::<Document>(&schema.name);
        Ok((schema, collection))
    }
}

#[async_trait]
impl Connect for MongoClient {
    type Target = MongoTarget;

    /// Connect and ping, giving up after [`CONNECT_TIMEOUT`]
    async fn connect(target: &MongoTarget) -> Result<Self> {
        let mut options = ClientOptions::parse(&target.uri)
            .await
            .map_err(StoreError::connection)?;
        options.connect_timeout = Some(CONNECT_TIMEOUT);
        options.server_selection_timeout = Some(CONNECT_TIMEOUT);
        let client = Client::with_options(options).map_err(StoreError::connection)?;

        tokio::time::timeout(
            CONNECT_TIMEOUT,
            client.database("admin").run_command(doc! { "ping": 1 }),
        )
        .await
        .map_err(|_| {
            StoreError::connection(format!(
                "no answer from {} within {:?}",
                target.uri, CONNECT_TIMEOUT
            ))
        })?
        .map_err(StoreError::connection)?;
        info!("connected to {}", target.uri);

        Ok(Self {
            client,
            database: target.database.clone(),
            schema: RwLock::new(None),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl CreateSchema for MongoClient {
    /// Create the collection. Collections are schemaless, only the name is
    /// used; an existing collection is reported as `AlreadyExists`.
    async fn create_schema(&self, schema: &SchemaDescriptor) -> Result<SchemaOutcome> {
        self.ensure_open()?;
        schema.validate()?;

        let outcome = match self
            .client
            .database(&self.database)
            .create_collection(&schema.name)
            .await
        {
            Ok(()) => SchemaOutcome::Created,
            Err(err) if is_namespace_exists(&err) => SchemaOutcome::AlreadyExists,
            Err(err) => return Err(classify(err, StoreError::Schema)),
        };
        debug!("collection {}.{}: {:?}", self.database, schema.name, outcome);
        *self.schema.write().await = Some(schema.clone());
        Ok(outcome)
    }
}

#[async_trait]
impl Insert for MongoClient {
    /// A single record goes through `insert_one`, several through `insert_many`
    async fn insert(&self, records: Vec<Record>) -> Result<InsertResult> {
        let (schema, collection) = self.collection().await?;
        for record in &records {
            schema.check_record(record)?;
        }

        let mut documents: Vec<Document> = records.iter().map(document_from_record).collect();
        let ids = match documents.len() {
            0 => Vec::new(),
            1 => {
                let document = documents.remove(0);
                let result = collection
                    .insert_one(document)
                    .await
                    .map_err(|e| classify(e, StoreError::Write))?;
                vec![id_to_string(result.inserted_id)]
            }
            _ => {
                let result = collection
                    .insert_many(documents)
                    .await
                    .map_err(|e| classify(e, StoreError::Write))?;
                let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
                ids.sort_by_key(|(index, _)| *index);
                ids.into_iter().map(|(_, id)| id_to_string(id)).collect()
            }
        };

        Ok(InsertResult {
            inserted: ids.len() as u64,
            ids,
        })
    }
}

#[async_trait]
impl Query for MongoClient {
    type Filter = Document;

    async fn find<'a>(
        &'a self,
        filter: &Document,
        projection: Option<&Projection>,
    ) -> Result<RecordStream<'a>> {
        let (_, collection) = self.collection().await?;

        let mut options = FindOptions::default();
        options.projection = projection.map(projection_document);

        let cursor = collection
            .find(filter.clone())
            .with_options(options)
            .await
            .map_err(|e| classify(e, StoreError::Read))?;

        Ok(cursor
            .map(|document| {
                document
                    .map(|d| record_from_document(&d))
                    .map_err(|e| classify(e, StoreError::Read))
            })
            .boxed())
    }
}

#[async_trait]
impl Update for MongoClient {
    async fn update(&self, filter: &Document, mutation: &Mutation) -> Result<UpdateResult> {
        let (_, collection) = self.collection().await?;
        if mutation.is_empty() {
            return Err(StoreError::write("empty mutation"));
        }
        if mutation.contains("_id") {
            return Err(StoreError::write("`_id` cannot be modified"));
        }

        let update = doc! { "$set": document_from_record(mutation) };
        let result = collection
            .update_many(filter.clone(), update)
            .await
            .map_err(|e| classify(e, StoreError::Write))?;
        Ok(UpdateResult {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }
}

#[async_trait]
impl Close for MongoClient {
    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.client.clone().shutdown().await;
            debug!("mongodb client shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_round_trip_types() {
        let record = Record::new()
            .with("rollNo", 175)
            .with("name", "Rachit");
        let document = document_from_record(&record);
        assert_eq!(document.get("rollNo"), Some(&Bson::Int64(175)));
        assert_eq!(
            document.get("name"),
            Some(&Bson::String("Rachit".to_string()))
        );
    }

    #[test]
    fn test_record_from_document_converts_driver_types() {
        let oid = bson::oid::ObjectId::new();
        let document = doc! {
            "_id": oid,
            "rollNo": 153_i32,
            "maths": 65.0,
            "ratio": 0.5,
            "deletedAt": Bson::Null,
        };
        let record = record_from_document(&document);

        assert_eq!(record.get("_id"), Some(&Value::Str(oid.to_hex())));
        assert_eq!(record.get("rollNo"), Some(&Value::Int(153)));
        assert_eq!(record.get("maths"), Some(&Value::Int(65)));
        assert!(matches!(record.get("ratio"), Some(Value::Str(_))));
        assert!(!record.contains("deletedAt"));
    }

    #[test]
    fn test_projection_document_hides_id() {
        let projection = Projection::new(["maths", "rollNo"]);
        assert_eq!(
            projection_document(&projection),
            doc! { "maths": 1, "rollNo": 1, "_id": 0 }
        );

        let with_id = Projection::new(["_id", "maths"]);
        assert_eq!(projection_document(&with_id), doc! { "_id": 1, "maths": 1 });
    }

    #[test]
    fn test_id_to_string() {
        assert_eq!(id_to_string(Bson::String("abc".into())), "abc");
        assert_eq!(id_to_string(Bson::Int32(7)), "7");
    }

    #[test]
    fn test_default_target() {
        let target = MongoTarget::default();
        assert_eq!(target.uri, "mongodb://localhost:27017");
        assert_eq!(target.database, "test");
    }

    #[tokio::test]
    async fn test_connect_unparseable_uri() {
        let err = MongoClient::connect(&MongoTarget::new("not-a-uri", "test"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), polystore_domain::ErrorKind::Connection);
    }
}
