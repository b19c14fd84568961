use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{Record, Result, StoreError, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Text { max_len: u32 },
    Integer,
}

impl FieldKind {
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldKind::Text { max_len }, Value::Str(s)) => s.chars().count() <= *max_len as usize,
            (FieldKind::Integer, Value::Int(_)) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

/// Static declaration of a table or collection.
///
/// The first key field is the partition (hash) key, the optional second one
/// the sort (range) key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub key: Vec<String>,
}

/// What `create_schema` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaOutcome {
    Created,
    AlreadyExists,
}

impl SchemaDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            key: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn text(self, name: impl Into<String>, max_len: u32) -> Self {
        self.field(name, FieldKind::Text { max_len })
    }

    pub fn integer(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Integer)
    }

    pub fn key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn partition_key(&self) -> Option<&str> {
        self.key.first().map(String::as_str)
    }

    pub fn sort_key(&self) -> Option<&str> {
        self.key.get(1).map(String::as_str)
    }

    pub fn is_key(&self, name: &str) -> bool {
        self.key.iter().any(|k| k == name)
    }

    /// Check the descriptor is well formed
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::schema("schema name is empty"));
        }
        if self.fields.is_empty() {
            return Err(StoreError::schema(format!(
                "schema `{}` declares no fields",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if !is_identifier(&field.name) {
                return Err(StoreError::schema(format!(
                    "invalid field name `{}`",
                    field.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(StoreError::schema(format!(
                    "field `{}` declared twice",
                    field.name
                )));
            }
            if let FieldKind::Text { max_len: 0 } = field.kind {
                return Err(StoreError::schema(format!(
                    "text field `{}` has zero length",
                    field.name
                )));
            }
        }

        let mut seen_key = HashSet::new();
        for key in &self.key {
            if self.get_field(key).is_none() {
                return Err(StoreError::schema(format!(
                    "key field `{}` is not declared",
                    key
                )));
            }
            if !seen_key.insert(key.as_str()) {
                return Err(StoreError::schema(format!("key field `{}` repeated", key)));
            }
        }
        Ok(())
    }

    /// Key fields must be present, declared fields must hold values of
    /// their declared kind.
    pub fn check_record(&self, record: &Record) -> Result<()> {
        for key in &self.key {
            if !record.contains(key) {
                return Err(StoreError::write(format!(
                    "record {} is missing key field `{}`",
                    record, key
                )));
            }
        }
        for (name, value) in record.fields() {
            if let Some(field) = self.get_field(name) {
                if !field.kind.accepts(value) {
                    return Err(StoreError::write(format!(
                        "value {} does not fit field `{}` ({:?})",
                        value, name, field.kind
                    )));
                }
            }
        }
        Ok(())
    }

    /// First field of `record` the descriptor does not declare
    pub fn undeclared_field<'r>(&self, record: &'r Record) -> Option<&'r str> {
        record.names().find(|name| self.get_field(name).is_none())
    }

    /// The key fields of `record`, in key order
    pub fn key_of(&self, record: &Record) -> Option<Record> {
        self.key
            .iter()
            .map(|k| record.get(k).map(|v| (k.clone(), v.clone())))
            .collect()
    }
}

/// ASCII letters, digits and underscores, not starting with a digit
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn tags() -> SchemaDescriptor {
        SchemaDescriptor::new("tags")
            .text("id", 50)
            .text("name", 50)
            .key(["id"])
    }

    #[test]
    fn test_validate_accepts_tags() {
        tags().validate().unwrap();
        assert_eq!(tags().partition_key(), Some("id"));
        assert_eq!(tags().sort_key(), None);
    }

    #[test]
    fn test_validate_rejects_malformed() {
        let undeclared_key = tags().key(["id", "missing"]);
        assert_eq!(undeclared_key.validate().unwrap_err().kind(), ErrorKind::Schema);

        let duplicate = tags().text("id", 10);
        assert!(duplicate.validate().is_err());

        let bad_name = SchemaDescriptor::new("t").text("drop table;", 5);
        assert!(bad_name.validate().is_err());

        assert!(SchemaDescriptor::new("").text("id", 5).validate().is_err());
        assert!(SchemaDescriptor::new("empty").validate().is_err());
    }

    #[test]
    fn test_check_record() {
        let schema = tags();
        schema
            .check_record(&Record::new().with("id", "123").with("name", "Rachit"))
            .unwrap();

        let missing = schema.check_record(&Record::new().with("name", "Rachit"));
        assert_eq!(missing.unwrap_err().kind(), ErrorKind::Write);

        let wrong_kind = schema.check_record(&Record::new().with("id", 123));
        assert_eq!(wrong_kind.unwrap_err().kind(), ErrorKind::Write);

        let too_long = schema.check_record(&Record::new().with("id", "x".repeat(51)));
        assert!(too_long.is_err());
    }

    #[test]
    fn test_key_of_and_undeclared() {
        let schema = SchemaDescriptor::new("dummy-table")
            .text("id", 50)
            .text("name", 50)
            .key(["id", "name"]);
        let record = Record::new()
            .with("id", "123")
            .with("name", "Rachit")
            .with("nickname", "Rach");

        assert_eq!(
            schema.key_of(&record),
            Some(Record::new().with("id", "123").with("name", "Rachit"))
        );
        assert_eq!(schema.key_of(&Record::new().with("id", "123")), None);
        assert_eq!(schema.undeclared_field(&record), Some("nickname"));
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("rollNo"));
        assert!(is_identifier("_id"));
        assert!(!is_identifier("1st"));
        assert!(!is_identifier("dummy-table"));
        assert!(!is_identifier(""));
    }
}
