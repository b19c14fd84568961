//! Relational store on top of `sqlx::AnyConnection`.
//!
//! MySQL in production, SQLite files in tests. Statements are parameterized,
//! identifiers only ever come from a validated [`SchemaDescriptor`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, warn};
use sqlx::{
    any::{Any, AnyArguments, AnyRow},
    Connection as SqlConnection, Row,
};
use tokio::sync::RwLock;

use polystore_domain::{
    collect_records, Close, Connect, CreateSchema, Delete, DeleteResult, FieldDef, FieldKind,
    Insert, InsertResult, Mutation, Projection, Query, Record, RecordStream, Result,
    SchemaDescriptor, SchemaOutcome, StoreError, Update, UpdateResult, Value,
};

use crate::results::QueryError;

mod connection;
pub use connection::{open, open_test, Connection, SqlTarget, TestHandle};

mod filter;
pub use filter::{quote_ident, SqlFilter};

type SqlQuery<'q> = sqlx::query::Query<'q, Any, AnyArguments<'q>>;

/// MySQL error code for "table already exists"
const TABLE_EXISTS_SQLSTATE: &str = "42S01";

pub struct SqlClient {
    conn: Connection,
    schema: RwLock<Option<SchemaDescriptor>>,
}

impl SqlClient {
    async fn schema(&self) -> Result<SchemaDescriptor> {
        self.schema
            .read()
            .await
            .clone()
            .ok_or_else(StoreError::no_schema)
    }

    /// Fetch exactly one record
    pub async fn get(&self, filter: &SqlFilter) -> Result<Record> {
        let mut records = collect_records(self.find(filter, None).await?).await?;
        match records.len() {
            0 => Err(QueryError::NotFound.into()),
            1 => Ok(records.remove(0)),
            n => Err(QueryError::Ambiguous(n).into()),
        }
    }
}

fn bind_value<'q>(query: SqlQuery<'q>, value: &Value) -> SqlQuery<'q> {
    match value {
        Value::Str(s) => query.bind(s.clone()),
        Value::Int(i) => query.bind(*i),
    }
}

fn column_list<'f>(fields: impl Iterator<Item = &'f FieldDef>) -> String {
    fields
        .map(|f| quote_ident(&f.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn create_table_sql(schema: &SchemaDescriptor) -> String {
    let mut columns: Vec<String> = schema
        .fields
        .iter()
        .map(|field| {
            let ty = match field.kind {
                FieldKind::Text { max_len } => format!("VARCHAR({})", max_len),
                FieldKind::Integer => "BIGINT".to_string(),
            };
            let not_null = if schema.is_key(&field.name) {
                " NOT NULL"
            } else {
                ""
            };
            format!("{} {}{}", quote_ident(&field.name), ty, not_null)
        })
        .collect();

    if !schema.key.is_empty() {
        let key = schema
            .key
            .iter()
            .map(|k| quote_ident(k))
            .collect::<Vec<_>>()
            .join(", ");
        columns.push(format!("PRIMARY KEY ({})", key));
    }

    format!(
        "CREATE TABLE {} ({})",
        quote_ident(&schema.name),
        columns.join(", ")
    )
}

fn is_already_exists(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code().map_or(false, |code| code == TABLE_EXISTS_SQLSTATE)
                || db.message().contains("already exists")
        }
        _ => false,
    }
}

fn read_record(row: &AnyRow, columns: &[FieldDef]) -> Result<Record> {
    let mut record = Record::new();
    for field in columns {
        let name = field.name.as_str();
        match field.kind {
            FieldKind::Text { .. } => {
                let value: Option<String> = row.try_get(name).map_err(StoreError::read)?;
                if let Some(value) = value {
                    record.set(name, value);
                }
            }
            FieldKind::Integer => {
                let value: Option<i64> = row.try_get(name).map_err(StoreError::read)?;
                if let Some(value) = value {
                    record.set(name, value);
                }
            }
        }
    }
    Ok(record)
}

/// Every mutated column must exist and accept its value
fn check_mutation(schema: &SchemaDescriptor, mutation: &Mutation) -> Result<()> {
    if mutation.is_empty() {
        return Err(StoreError::write("empty mutation"));
    }
    for (name, value) in mutation.fields() {
        let field = schema.get_field(name).ok_or_else(|| {
            StoreError::write(format!("table `{}` has no column `{}`", schema.name, name))
        })?;
        if !field.kind.accepts(value) {
            return Err(StoreError::write(format!(
                "value {} does not fit column `{}`",
                value, name
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl Connect for SqlClient {
    type Target = SqlTarget;

    async fn connect(target: &SqlTarget) -> Result<Self> {
        let conn = open(target).await?;
        Ok(Self {
            conn,
            schema: RwLock::new(None),
        })
    }
}

#[async_trait]
impl CreateSchema for SqlClient {
    /// Create the table. An existing table is left alone and reported
    /// as `AlreadyExists`.
    async fn create_schema(&self, schema: &SchemaDescriptor) -> Result<SchemaOutcome> {
        schema.validate()?;
        let sql = create_table_sql(schema);
        debug!("{}", sql);

        let outcome = {
            let mut guard = self.conn.lock().await;
            let conn = guard.as_mut().ok_or_else(StoreError::closed)?;
            match sqlx::query::<Any>(&sql).execute(&mut *conn).await {
                Ok(_) => SchemaOutcome::Created,
                Err(err) if is_already_exists(&err) => SchemaOutcome::AlreadyExists,
                Err(err) => return Err(StoreError::schema(err)),
            }
        };
        *self.schema.write().await = Some(schema.clone());
        Ok(outcome)
    }
}

#[async_trait]
impl Insert for SqlClient {
    /// All or nothing, the batch runs in one transaction
    async fn insert(&self, records: Vec<Record>) -> Result<InsertResult> {
        let schema = self.schema().await?;
        for record in &records {
            if record.is_empty() {
                return Err(StoreError::write("cannot insert an empty record"));
            }
            schema.check_record(record)?;
            if let Some(name) = schema.undeclared_field(record) {
                return Err(StoreError::write(format!(
                    "table `{}` has no column `{}`",
                    schema.name, name
                )));
            }
        }

        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(StoreError::closed)?;
        // Dropping the transaction on an error rolls the batch back
        let mut tx = conn.begin().await.map_err(StoreError::write)?;
        let mut inserted = 0;
        for record in &records {
            let columns: Vec<&FieldDef> = schema
                .fields
                .iter()
                .filter(|f| record.contains(&f.name))
                .collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(&schema.name),
                column_list(columns.iter().copied()),
                vec!["?"; columns.len()].join(", ")
            );
            debug!("{}", sql);

            let mut query = sqlx::query::<Any>(&sql);
            for field in &columns {
                if let Some(value) = record.get(&field.name) {
                    query = bind_value(query, value);
                }
            }
            let result = query
                .execute(&mut *tx)
                .await
                .map_err(StoreError::write)?;
            inserted += result.rows_affected();
        }
        tx.commit().await.map_err(StoreError::write)?;

        Ok(InsertResult {
            inserted,
            ids: Vec::new(),
        })
    }
}

#[async_trait]
impl Query for SqlClient {
    type Filter = SqlFilter;

    /// The statement runs when the stream is first polled
    async fn find<'a>(
        &'a self,
        filter: &SqlFilter,
        projection: Option<&Projection>,
    ) -> Result<RecordStream<'a>> {
        filter.check()?;
        let schema = self.schema().await?;

        let columns: Vec<FieldDef> = match projection {
            None => schema.fields.clone(),
            Some(projection) => {
                if let Some(name) = projection.iter().find(|n| schema.get_field(n).is_none()) {
                    return Err(StoreError::read(format!(
                        "table `{}` has no column `{}`",
                        schema.name, name
                    )));
                }
                schema
                    .fields
                    .iter()
                    .filter(|f| projection.contains(&f.name))
                    .cloned()
                    .collect()
            }
        };
        if columns.is_empty() {
            return Err(StoreError::read("projection selects no columns"));
        }

        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            column_list(columns.iter()),
            quote_ident(&schema.name),
            filter.clause()
        );
        let binds = filter.binds().to_vec();
        let shared = Arc::clone(&self.conn);

        let rows = stream::once(async move {
            debug!("{}", sql);
            let mut guard = shared.lock().await;
            let conn = guard.as_mut().ok_or_else(StoreError::closed)?;
            let mut query = sqlx::query::<Any>(&sql);
            for value in &binds {
                query = bind_value(query, value);
            }
            let rows = query
                .fetch_all(&mut *conn)
                .await
                .map_err(StoreError::read)?;
            rows.iter()
                .map(|row| read_record(row, &columns))
                .collect::<Result<Vec<_>>>()
        });

        Ok(rows
            .map_ok(|records| stream::iter(records.into_iter().map(Ok)))
            .try_flatten()
            .boxed())
    }
}

#[async_trait]
impl Update for SqlClient {
    /// `matched` and `modified` both carry the driver's affected row count
    async fn update(&self, filter: &SqlFilter, mutation: &Mutation) -> Result<UpdateResult> {
        filter.check()?;
        let schema = self.schema().await?;
        check_mutation(&schema, mutation)?;

        let assignments = mutation
            .names()
            .map(|name| format!("{} = ?", quote_ident(name)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            quote_ident(&schema.name),
            assignments,
            filter.clause()
        );
        debug!("{}", sql);

        let mut query = sqlx::query::<Any>(&sql);
        for (_, value) in mutation.fields() {
            query = bind_value(query, value);
        }
        for value in filter.binds() {
            query = bind_value(query, value);
        }

        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(StoreError::closed)?;
        let affected = query
            .execute(&mut *conn)
            .await
            .map_err(StoreError::write)?
            .rows_affected();

        Ok(UpdateResult {
            matched: affected,
            modified: affected,
        })
    }
}

#[async_trait]
impl Delete for SqlClient {
    async fn delete_matching(&self, filter: &SqlFilter) -> Result<DeleteResult> {
        filter.check()?;
        let schema = self.schema().await?;
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            quote_ident(&schema.name),
            filter.clause()
        );
        debug!("{}", sql);

        let mut query = sqlx::query::<Any>(&sql);
        for value in filter.binds() {
            query = bind_value(query, value);
        }

        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(StoreError::closed)?;
        let deleted = query
            .execute(&mut *conn)
            .await
            .map_err(StoreError::write)?
            .rows_affected();
        Ok(DeleteResult { deleted })
    }
}

#[async_trait]
impl Close for SqlClient {
    async fn close(&self) {
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            match conn.close().await {
                Ok(()) => debug!("connection closed"),
                Err(err) => warn!("closing connection failed: {}", err),
            }
        }
    }
}
