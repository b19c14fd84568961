use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;

use polystore_db::{DynamoClient, DynamoTarget, ScanFilter};
use polystore_domain::{
    collect_records, Close, Connect, CreateSchema, Insert, Query, Record, SchemaDescriptor,
    Update,
};

use crate::formatting::WriteFormatted;

/// Primary key of `dummy-table`
#[derive(Debug, Serialize)]
pub struct TagKey {
    pub id: String,
    pub name: String,
}

pub fn dummy_table() -> SchemaDescriptor {
    SchemaDescriptor::new("dummy-table")
        .text("id", 50)
        .text("name", 50)
        .key(["id", "name"])
}

/// Live items whose name contains `needle`
pub fn live_names_containing(needle: &str) -> ScanFilter {
    ScanFilter::new("attribute_not_exists(deletedAt) AND contains(#name, :name)")
        .name("#name", "name")
        .value(":name", needle)
}

pub async fn run(target: &DynamoTarget, out: &mut (dyn Write + Send)) -> Result<()> {
    let db = DynamoClient::connect(target).await?;
    let result = walkthrough(&db, out).await;
    db.close().await;
    result
}

async fn walkthrough(db: &DynamoClient, out: &mut (dyn Write + Send)) -> Result<()> {
    let outcome = db
        .create_schema(&dummy_table())
        .await
        .context("creating dummy-table")?;
    outcome.write_formatted(out)?;

    let item = Record::new().with("id", "123").with("name", "Rachit");
    let inserted = db
        .insert(vec![item.clone()])
        .await
        .context("putting item 123")?;
    inserted.write_formatted(out)?;

    let fetched = db.get_item(&item).await.context("getting item 123")?;
    write_item(fetched, out)?;

    let tables = db.list_tables().await.context("listing tables")?;
    tables.write_formatted(out)?;

    let key = Record::from_serialize(&TagKey {
        id: "123".to_string(),
        name: "Rachit".to_string(),
    })?;
    let fetched = db.get_item(&key).await.context("getting item by key")?;
    write_item(fetched, out)?;

    let found = collect_records(db.find(&live_names_containing("Rach"), None).await?)
        .await
        .context("scanning for Rach")?;
    found.write_formatted(out)?;

    let updated = db
        .update(
            &ScanFilter::equals("id", "123"),
            &Record::new().with("nickname", "Rach"),
        )
        .await
        .context("setting nickname")?;
    updated.write_formatted(out)?;

    Ok(())
}

fn write_item(item: Option<Record>, out: &mut (dyn Write + Send)) -> Result<()> {
    match item {
        Some(item) => item.write_formatted(out)?,
        None => writeln!(out, "(no item)")?,
    }
    Ok(())
}
