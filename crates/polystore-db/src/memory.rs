//! In-process store. Implements the whole contract, used as the fake
//! backend in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use log::debug;
use tokio::sync::Mutex;

use polystore_domain::{
    Close, Connect, CreateSchema, Delete, DeleteResult, FieldKind, Insert, InsertResult, Mutation,
    Projection, Query, Record, RecordStream, Result, SchemaDescriptor, SchemaOutcome,
    StoreError, Update, UpdateResult, Value,
};

/// Predicate over a single record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    All,
    Eq(String, Value),
    /// Substring match, false on integers
    Contains(String, String),
    Gt(String, i64),
    Lt(String, i64),
    Exists(String),
    NotExists(String),
    And(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Eq(field.to_string(), value.into())
    }

    pub fn contains(field: &str, needle: &str) -> Self {
        Predicate::Contains(field.to_string(), needle.to_string())
    }

    pub fn gt(field: &str, bound: i64) -> Self {
        Predicate::Gt(field.to_string(), bound)
    }

    pub fn lt(field: &str, bound: i64) -> Self {
        Predicate::Lt(field.to_string(), bound)
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut all) => {
                all.push(other);
                Predicate::And(all)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Eq(field, value) => record.get(field) == Some(value),
            Predicate::Contains(field, needle) => record
                .get(field)
                .and_then(Value::as_str)
                .map_or(false, |s| s.contains(needle.as_str())),
            Predicate::Gt(field, bound) => record
                .get(field)
                .and_then(Value::as_int)
                .map_or(false, |i| i > *bound),
            Predicate::Lt(field, bound) => record
                .get(field)
                .and_then(Value::as_int)
                .map_or(false, |i| i < *bound),
            Predicate::Exists(field) => record.contains(field),
            Predicate::NotExists(field) => !record.contains(field),
            Predicate::And(all) => all.iter().all(|p| p.matches(record)),
            Predicate::Not(inner) => !inner.matches(record),
        }
    }
}

/// Names the store in logs; tables live only as long as the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryTarget {
    pub name: String,
}

#[derive(Default)]
struct State {
    closed: bool,
    schema: Option<SchemaDescriptor>,
    tables: HashMap<String, Vec<Record>>,
}

impl State {
    fn bound(&mut self) -> Result<(SchemaDescriptor, &mut Vec<Record>)> {
        if self.closed {
            return Err(StoreError::closed());
        }
        let schema = self.schema.clone().ok_or_else(StoreError::no_schema)?;
        let rows = self.tables.entry(schema.name.clone()).or_default();
        Ok((schema, rows))
    }
}

pub struct MemoryStore {
    name: String,
    state: Mutex<State>,
}

#[async_trait]
impl Connect for MemoryStore {
    type Target = MemoryTarget;

    async fn connect(target: &MemoryTarget) -> Result<Self> {
        debug!("memory store {:?} opened", target.name);
        Ok(Self {
            name: target.name.clone(),
            state: Mutex::new(State::default()),
        })
    }
}

#[async_trait]
impl CreateSchema for MemoryStore {
    async fn create_schema(&self, schema: &SchemaDescriptor) -> Result<SchemaOutcome> {
        schema.validate()?;
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(StoreError::closed());
        }

        let outcome = if state.tables.contains_key(&schema.name) {
            SchemaOutcome::AlreadyExists
        } else {
            state.tables.insert(schema.name.clone(), Vec::new());
            SchemaOutcome::Created
        };
        state.schema = Some(schema.clone());
        Ok(outcome)
    }
}

#[async_trait]
impl Insert for MemoryStore {
    /// All or nothing, a duplicate key rejects the whole batch
    async fn insert(&self, records: Vec<Record>) -> Result<InsertResult> {
        let mut state = self.state.lock().await;
        let (schema, rows) = state.bound()?;

        let mut keys: Vec<Record> = rows.iter().filter_map(|r| schema.key_of(r)).collect();
        for record in &records {
            schema.check_record(record)?;
            if let Some(name) = schema.undeclared_field(record) {
                return Err(StoreError::write(format!(
                    "`{}` has no field `{}`",
                    schema.name, name
                )));
            }
            if let Some(key) = schema.key_of(record) {
                if keys.contains(&key) {
                    return Err(StoreError::write(format!("duplicate key {}", key)));
                }
                keys.push(key);
            }
        }

        let inserted = records.len() as u64;
        rows.extend(records);
        Ok(InsertResult {
            inserted,
            ids: Vec::new(),
        })
    }
}

#[async_trait]
impl Query for MemoryStore {
    type Filter = Predicate;

    /// Snapshot of the matches at call time
    async fn find<'a>(
        &'a self,
        filter: &Predicate,
        projection: Option<&Projection>,
    ) -> Result<RecordStream<'a>> {
        let mut state = self.state.lock().await;
        let (_, rows) = state.bound()?;
        let matches: Vec<Record> = rows
            .iter()
            .filter(|r| filter.matches(r))
            .map(|r| match projection {
                Some(projection) => r.project(projection),
                None => r.clone(),
            })
            .collect();
        Ok(stream::iter(matches.into_iter().map(Ok)).boxed())
    }
}

#[async_trait]
impl Update for MemoryStore {
    async fn update(&self, filter: &Predicate, mutation: &Mutation) -> Result<UpdateResult> {
        let mut state = self.state.lock().await;
        let (schema, rows) = state.bound()?;
        if mutation.is_empty() {
            return Err(StoreError::write("empty mutation"));
        }
        if let Some(name) = mutation.names().find(|name| schema.is_key(name)) {
            return Err(StoreError::write(format!(
                "key field `{}` cannot be updated",
                name
            )));
        }
        if let Some(name) = schema.undeclared_field(mutation) {
            return Err(StoreError::write(format!(
                "`{}` has no field `{}`",
                schema.name, name
            )));
        }
        schema.check_record(&mutation_with_key(&schema, mutation))?;

        let mut result = UpdateResult::default();
        for row in rows.iter_mut().filter(|r| filter.matches(r)) {
            result.matched += 1;
            if row.apply(mutation) {
                result.modified += 1;
            }
        }
        Ok(result)
    }
}

/// Pads the mutation with placeholder key values so kind checks apply
fn mutation_with_key(schema: &SchemaDescriptor, mutation: &Mutation) -> Record {
    let mut record = mutation.clone();
    for key in &schema.key {
        let placeholder = match schema.get_field(key).map(|f| f.kind) {
            Some(FieldKind::Integer) => Value::Int(0),
            _ => Value::Str(String::new()),
        };
        record.set(key.clone(), placeholder);
    }
    record
}

#[async_trait]
impl Delete for MemoryStore {
    async fn delete_matching(&self, filter: &Predicate) -> Result<DeleteResult> {
        let mut state = self.state.lock().await;
        let (_, rows) = state.bound()?;
        let before = rows.len();
        rows.retain(|r| !filter.matches(r));
        Ok(DeleteResult {
            deleted: (before - rows.len()) as u64,
        })
    }
}

#[async_trait]
impl Close for MemoryStore {
    async fn close(&self) {
        let mut state = self.state.lock().await;
        if !state.closed {
            state.closed = true;
            debug!("memory store {:?} closed", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use polystore_domain::{collect_records, ErrorKind};

    use super::*;

    fn scores() -> SchemaDescriptor {
        SchemaDescriptor::new("dummyCollection")
            .integer("rollNo")
            .integer("maths")
            .integer("science")
            .integer("computer")
            .key(["rollNo"])
    }

    fn score(roll: i64, maths: i64, science: i64, computer: i64) -> Record {
        Record::new()
            .with("rollNo", roll)
            .with("maths", maths)
            .with("science", science)
            .with("computer", computer)
    }

    async fn open() -> MemoryStore {
        let store = MemoryStore::connect(&MemoryTarget::default()).await.unwrap();
        store.create_schema(&scores()).await.unwrap();
        store
            .insert(vec![
                score(175, 80, 90, 95),
                score(153, 65, 59, 55),
                score(162, 86, 80, 69),
            ])
            .await
            .unwrap();
        store
    }

    #[test]
    fn test_predicates() {
        let record = Record::new().with("id", "123").with("name", "Rachit");
        assert!(Predicate::NotExists("deletedAt".into())
            .and(Predicate::contains("name", "Rach"))
            .matches(&record));
        assert!(!Predicate::contains("id", "Rach").matches(&record));
        assert!(!Predicate::gt("name", 1).matches(&record));
        assert!(Predicate::Not(Box::new(Predicate::eq("id", "124"))).matches(&record));
    }

    #[tokio::test]
    async fn test_find_with_projection() {
        let store = open().await;
        let found = collect_records(
            store
                .find(
                    &Predicate::gt("maths", 70),
                    Some(&Projection::new(["rollNo", "maths"])),
                )
                .await
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(
            found,
            vec![
                Record::new().with("rollNo", 175).with("maths", 80),
                Record::new().with("rollNo", 162).with("maths", 86),
            ]
        );
    }

    #[tokio::test]
    async fn test_update_many_counts() {
        let store = open().await;
        let mutation = Record::new().with("maths", 100);

        let first = store
            .update(&Predicate::lt("maths", 100), &mutation)
            .await
            .unwrap();
        assert_eq!(first, UpdateResult { matched: 3, modified: 3 });

        let again = store
            .update(&Predicate::gt("maths", 0), &mutation)
            .await
            .unwrap();
        assert_eq!(again, UpdateResult { matched: 3, modified: 0 });
    }

    #[tokio::test]
    async fn test_update_rejects_key_and_kind() {
        let store = open().await;
        let key = store
            .update(&Predicate::All, &Record::new().with("rollNo", 1))
            .await;
        assert_eq!(key.unwrap_err().kind(), ErrorKind::Write);

        let kind = store
            .update(&Predicate::All, &Record::new().with("maths", "lots"))
            .await;
        assert_eq!(kind.unwrap_err().kind(), ErrorKind::Write);
    }

    #[tokio::test]
    async fn test_duplicate_key_rejects_batch() {
        let store = open().await;
        let err = store
            .insert(vec![score(1, 1, 1, 1), score(175, 1, 1, 1)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Write);

        let all = collect_records(store.find(&Predicate::All, None).await.unwrap())
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_closed_store() {
        let store = open().await;
        store.close().await;
        store.close().await;
        let err = store.find(&Predicate::All, None).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
}
