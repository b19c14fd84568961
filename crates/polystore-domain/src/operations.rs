use async_trait::async_trait;
use futures::stream::{BoxStream, TryStreamExt};

use crate::{
    DeleteResult, InsertResult, Mutation, Projection, Record, Result, SchemaDescriptor,
    SchemaOutcome, UpdateResult,
};

/// Lazy, finite sequence of records. Call `find` again to restart.
pub type RecordStream<'a> = BoxStream<'a, Result<Record>>;

#[async_trait]
pub trait Connect: Sized {
    type Target: Send + Sync;
    async fn connect(target: &Self::Target) -> Result<Self>;
}

#[async_trait]
pub trait CreateSchema {
    async fn create_schema(&self, schema: &SchemaDescriptor) -> Result<SchemaOutcome>;
}

#[async_trait]
pub trait Insert {
    async fn insert(&self, records: Vec<Record>) -> Result<InsertResult>;
}

#[async_trait]
pub trait Query {
    /// Backend native predicate
    type Filter: Send + Sync;
    async fn find<'a>(
        &'a self,
        filter: &Self::Filter,
        projection: Option<&Projection>,
    ) -> Result<RecordStream<'a>>;
}

#[async_trait]
pub trait Update: Query {
    async fn update(&self, filter: &Self::Filter, mutation: &Mutation) -> Result<UpdateResult>;
}

#[async_trait]
pub trait Delete: Query {
    async fn delete_matching(&self, filter: &Self::Filter) -> Result<DeleteResult>;
}

#[async_trait]
pub trait Close {
    /// Release the session. Calling it again does nothing.
    async fn close(&self);
}

/// The operations every backend supports
pub trait StoreClient: Connect + CreateSchema + Insert + Update + Close + Send + Sync {}

impl<T> StoreClient for T where T: Connect + CreateSchema + Insert + Update + Close + Send + Sync {}

/// Drain a record stream
pub async fn collect_records(stream: RecordStream<'_>) -> Result<Vec<Record>> {
    stream.try_collect().await
}
