//! Raw records exchanged with storage adapters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One persistent object as an adapter stores it.
///
/// Attribute values are JSON; conversion to typed values goes through the
/// attribute's type contract.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    /// Stable object id.
    pub id: String,
    /// Object type name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Attribute name to JSON value.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Belongs-to relationship name to foreign id.
    #[serde(default)]
    pub belongs_to: BTreeMap<String, Option<String>>,
}

impl Record {
    /// Create an empty record.
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            attributes: BTreeMap::new(),
            belongs_to: BTreeMap::new(),
        }
    }

    /// Set an attribute value.
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set a belongs-to foreign id.
    pub fn with_relation(mut self, name: impl Into<String>, id: Option<&str>) -> Self {
        self.belongs_to.insert(name.into(), id.map(str::to_string));
        self
    }

    /// Get the foreign id for a belongs-to relationship.
    pub fn relation_id(&self, name: &str) -> Option<&str> {
        self.belongs_to.get(name).and_then(|id| id.as_deref())
    }

    /// Merge a partial record over this one.
    pub fn merge(&mut self, patch: &Record) {
        for (name, value) in &patch.attributes {
            self.attributes.insert(name.clone(), value.clone());
        }
        for (name, id) in &patch.belongs_to {
            self.belongs_to.insert(name.clone(), id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_record_json_shape() {
        let record = Record::new("Phone", "p1")
            .with_attribute("model", "5230")
            .with_relation("room", Some("r1"));

        let encoded = serde_json::to_value(&record).unwrap();
        assert_eq!(
            encoded,
            json!({
                "id": "p1",
                "type": "Phone",
                "attributes": {"model": "5230"},
                "belongs_to": {"room": "r1"}
            })
        );

        let decoded: Record = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_merge() {
        let mut base = Record::new("Phone", "p1")
            .with_attribute("model", "5230")
            .with_attribute("make", "Nokia");
        base.merge(&Record::new("Phone", "p1").with_attribute("make", "Samsung"));

        assert_eq!(base.attributes["make"], json!("Samsung"));
        assert_eq!(base.attributes["model"], json!("5230"));
        assert_eq!(base.relation_id("room"), None);
    }
}
