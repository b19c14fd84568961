use std::io::Write;

use anyhow::{Context, Result};

use polystore_db::document::bson::{doc, Document};
use polystore_db::{MongoClient, MongoTarget};
use polystore_domain::{
    collect_records, Close, Connect, CreateSchema, Insert, Projection, Query, Record,
    SchemaDescriptor, Update,
};

use crate::formatting::WriteFormatted;

pub fn scores() -> SchemaDescriptor {
    SchemaDescriptor::new("dummyCollection")
        .integer("rollNo")
        .integer("maths")
        .integer("science")
        .integer("computer")
}

pub fn score(roll_no: i64, maths: i64, science: i64, computer: i64) -> Record {
    Record::new()
        .with("rollNo", roll_no)
        .with("maths", maths)
        .with("science", science)
        .with("computer", computer)
}

/// Students doing well in maths
pub fn good_at_maths() -> Document {
    doc! { "maths": { "$gt": 70 } }
}

pub fn below_full_marks() -> Document {
    doc! { "maths": { "$lt": 100 } }
}

pub async fn run(target: &MongoTarget, out: &mut (dyn Write + Send)) -> Result<()> {
    let db = MongoClient::connect(target).await?;
    let result = walkthrough(&db, out).await;
    db.close().await;
    result
}

async fn walkthrough(db: &MongoClient, out: &mut (dyn Write + Send)) -> Result<()> {
    let outcome = db
        .create_schema(&scores())
        .await
        .context("creating dummyCollection")?;
    outcome.write_formatted(out)?;

    let one = db
        .insert(vec![score(175, 80, 90, 95)])
        .await
        .context("inserting one score")?;
    one.write_formatted(out)?;

    let many = db
        .insert(vec![score(153, 65, 59, 55), score(162, 86, 80, 69)])
        .await
        .context("inserting scores")?;
    many.write_formatted(out)?;

    let projection = Projection::new(["rollNo", "maths", "science", "computer"]);
    let found = collect_records(db.find(&good_at_maths(), Some(&projection)).await?)
        .await
        .context("finding maths > 70")?;
    found.write_formatted(out)?;

    let updated = db
        .update(&below_full_marks(), &Record::new().with("maths", 100))
        .await
        .context("raising maths to 100")?;
    updated.write_formatted(out)?;

    Ok(())
}
