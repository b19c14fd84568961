use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;

use polystore_domain::{Record, Result, SchemaDescriptor, StoreError, Value};

pub type Item = HashMap<String, AttributeValue>;

pub fn attribute_from_value(value: &Value) -> AttributeValue {
    match value {
        Value::Str(s) => AttributeValue::S(s.clone()),
        Value::Int(i) => AttributeValue::N(i.to_string()),
    }
}

/// Scalars convert, `NULL` is dropped, anything else is rendered as text
pub fn value_from_attribute(attribute: &AttributeValue) -> Option<Value> {
    let value = match attribute {
        AttributeValue::Null(_) => return None,
        AttributeValue::S(s) => Value::Str(s.clone()),
        AttributeValue::N(n) => match n.parse::<i64>() {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Str(n.clone()),
        },
        AttributeValue::Bool(b) => Value::Str(b.to_string()),
        other => Value::Str(format!("{:?}", other)),
    };
    Some(value)
}

pub fn item_from_record(record: &Record) -> Item {
    record
        .fields()
        .map(|(name, value)| (name.clone(), attribute_from_value(value)))
        .collect()
}

pub fn record_from_item(item: &Item) -> Record {
    item.iter()
        .filter_map(|(name, attribute)| value_from_attribute(attribute).map(|v| (name.clone(), v)))
        .collect()
}

/// The primary key attributes of `record`. Every key field is required.
pub fn key_from_record(schema: &SchemaDescriptor, record: &Record) -> Result<Item> {
    let key = schema.key_of(record).ok_or_else(|| {
        StoreError::read(format!(
            "key {} does not cover the key fields {:?} of `{}`",
            record, schema.key, schema.name
        ))
    })?;
    Ok(item_from_record(&key))
}
