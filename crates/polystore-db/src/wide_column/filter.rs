use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;

use polystore_domain::{Projection, Result, StoreError, Value};

use super::attributes::attribute_from_value;

/// A DynamoDB filter expression with its attribute names and values.
///
/// Names are `#placeholders`, values `:placeholders`; the empty filter
/// scans everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanFilter {
    expression: Option<String>,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl ScanFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: Some(expression.into()),
            ..Self::default()
        }
    }

    pub fn name(mut self, placeholder: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.names.insert(placeholder.into(), attribute.into());
        self
    }

    pub fn value(mut self, placeholder: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values
            .insert(placeholder.into(), attribute_from_value(&value.into()));
        self
    }

    pub fn equals(attribute: &str, value: impl Into<Value>) -> Self {
        Self::new("#f = :f").name("#f", attribute).value(":f", value)
    }

    /// `contains(attribute, needle)`, substring match on strings
    pub fn contains(attribute: &str, needle: &str) -> Self {
        Self::new("contains(#f, :f)")
            .name("#f", attribute)
            .value(":f", needle)
    }

    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    /// Names for the request, including the projection's `#pN` placeholders.
    /// `None` when empty, DynamoDB rejects empty maps. An empty projection
    /// is a read error.
    pub(crate) fn attribute_names(
        &self,
        projection: Option<&Projection>,
    ) -> Result<(Option<HashMap<String, String>>, Option<String>)> {
        if projection.map_or(false, Projection::is_empty) {
            return Err(StoreError::read("projection selects no attributes"));
        }
        let mut names = self.names.clone();
        let projection_expression = projection.map(|projection| {
            projection
                .iter()
                .enumerate()
                .map(|(i, field)| {
                    let placeholder = format!("#p{}", i);
                    names.insert(placeholder.clone(), field.to_string());
                    placeholder
                })
                .collect::<Vec<_>>()
                .join(", ")
        });
        let names = if names.is_empty() { None } else { Some(names) };
        Ok((names, projection_expression))
    }

    pub(crate) fn attribute_values(&self) -> Option<HashMap<String, AttributeValue>> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.values.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_filter() {
        let filter = ScanFilter::contains("name", "Rach");
        assert_eq!(filter.expression(), Some("contains(#f, :f)"));
        let (names, projection) = filter.attribute_names(None).unwrap();
        assert_eq!(names.unwrap().get("#f"), Some(&"name".to_string()));
        assert_eq!(projection, None);
        assert_eq!(
            filter.attribute_values().unwrap().get(":f"),
            Some(&AttributeValue::S("Rach".into()))
        );
    }

    #[test]
    fn test_empty_filter_sends_no_maps() {
        let filter = ScanFilter::all();
        assert_eq!(filter.expression(), None);
        assert_eq!(filter.attribute_names(None).unwrap(), (None, None));
        assert_eq!(filter.attribute_values(), None);
    }

    #[test]
    fn test_projection_placeholders() {
        let projection = Projection::new(["id", "name"]);
        let (names, expression) = ScanFilter::all()
            .attribute_names(Some(&projection))
            .unwrap();
        let names = names.unwrap();
        assert_eq!(expression.as_deref(), Some("#p0, #p1"));
        assert_eq!(names.get("#p0"), Some(&"id".to_string()));
        assert_eq!(names.get("#p1"), Some(&"name".to_string()));
    }

    #[test]
    fn test_empty_projection_is_rejected() {
        let projection = Projection::new(Vec::<String>::new());
        let err = ScanFilter::contains("name", "Rach")
            .attribute_names(Some(&projection))
            .unwrap_err();
        assert_eq!(err.kind(), polystore_domain::ErrorKind::Read);
    }
}
