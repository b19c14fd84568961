use std::collections::BTreeSet;
use std::io::{self, Write};

use polystore_domain::{DeleteResult, InsertResult, Record, SchemaOutcome, UpdateResult};

pub trait WriteFormatted {
    fn write_formatted<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()>;
}

impl WriteFormatted for SchemaOutcome {
    fn write_formatted<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let outcome = match self {
            SchemaOutcome::Created => "created",
            SchemaOutcome::AlreadyExists => "already exists",
        };
        writeln!(out, "Schema:\t\t\t{}", outcome)
    }
}

impl WriteFormatted for InsertResult {
    fn write_formatted<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Inserted:\t\t{}", self.inserted)?;
        for id in &self.ids {
            writeln!(out, "ID:\t\t\t{}", id)?;
        }
        Ok(())
    }
}

impl WriteFormatted for UpdateResult {
    fn write_formatted<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Matched:\t\t{}", self.matched)?;
        writeln!(out, "Modified:\t\t{}", self.modified)
    }
}

impl WriteFormatted for DeleteResult {
    fn write_formatted<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Deleted:\t\t{}", self.deleted)
    }
}

impl WriteFormatted for Record {
    fn write_formatted<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        for (name, value) in self.fields() {
            writeln!(out, "{}:\t\t\t{}", name, value)?;
        }
        Ok(())
    }
}

/// One column per field seen in any record, missing values left blank
impl WriteFormatted for Vec<Record> {
    fn write_formatted<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let columns: BTreeSet<&str> = self.iter().flat_map(|r| r.names()).collect();
        if columns.is_empty() {
            return writeln!(out, "(no records)");
        }

        let header: Vec<String> = columns.iter().map(|c| format!("{:<16}", c)).collect();
        writeln!(out, "{}", header.join("\t").trim_end())?;
        writeln!(out, "{:-<80}", "-")?;
        for record in self {
            let row: Vec<String> = columns
                .iter()
                .map(|c| {
                    let value = record.get(c).map(|v| v.to_string()).unwrap_or_default();
                    format!("{:<16}", value)
                })
                .collect();
            writeln!(out, "{}", row.join("\t").trim_end())?;
        }
        Ok(())
    }
}

/// Table names
impl WriteFormatted for Vec<String> {
    fn write_formatted<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Tables:\t\t\t{}", self.join(", "))
    }
}
