use std::io::Write;

use anyhow::{Context, Result};
use log::info;

use polystore_db::{SqlClient, SqlFilter, SqlTarget};
use polystore_domain::{
    collect_records, Close, Connect, CreateSchema, Delete, Insert, Query, Record,
    SchemaDescriptor, Update,
};

use crate::formatting::WriteFormatted;

pub fn tags() -> SchemaDescriptor {
    SchemaDescriptor::new("tags")
        .text("id", 50)
        .text("name", 50)
        .key(["id"])
}

/// Connect, walk through the tags table and close again
pub async fn run(dsn: &str, out: &mut (dyn Write + Send)) -> Result<()> {
    let target = SqlTarget::from_dsn(dsn)?;
    info!("connecting to {}", target.redacted());
    let db = SqlClient::connect(&target).await?;

    let result = walkthrough(&db, out).await;
    db.close().await;
    result
}

pub async fn walkthrough(db: &SqlClient, out: &mut (dyn Write + Send)) -> Result<()> {
    let outcome = db.create_schema(&tags()).await.context("creating tags")?;
    outcome.write_formatted(out)?;

    let inserted = db
        .insert(vec![Record::new().with("id", "4").with("name", "TEST4")])
        .await
        .context("inserting tag 4")?;
    inserted.write_formatted(out)?;
    let tag = db.get(&SqlFilter::eq("id", "4")).await.context("reading tag 4")?;
    tag.write_formatted(out)?;

    let all = collect_records(db.find(&SqlFilter::all(), None).await?)
        .await
        .context("listing tags")?;
    all.write_formatted(out)?;

    let updated = db
        .update(
            &SqlFilter::eq("id", "1"),
            &Record::new().with("name", "dummy"),
        )
        .await
        .context("renaming tag 1")?;
    updated.write_formatted(out)?;

    // Tag 2 only exists if someone put it there
    let by_id = collect_records(db.find(&SqlFilter::eq("id", "2"), None).await?)
        .await
        .context("reading tag 2")?;
    by_id.write_formatted(out)?;

    let deleted = db
        .delete_matching(&SqlFilter::eq("id", "4"))
        .await
        .context("deleting tag 4")?;
    deleted.write_formatted(out)?;

    Ok(())
}
