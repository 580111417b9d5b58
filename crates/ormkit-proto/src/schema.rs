//! Schema metadata: object types, attributes and relationships.
//!
//! Schema metadata is produced by an external schema loader (or by hand in
//! tests) and is immutable once handed to a store.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::error::CastError;
use crate::value::Value;

/// The type contract of an attribute. Every type is nullable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    /// UTF-8 text.
    Text,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit floating point.
    Number,
    /// Boolean flag.
    Boolean,
    /// Calendar day (`YYYY-MM-DD` in JSON).
    Day,
    /// UTC timestamp (RFC 3339 in JSON).
    DateTime,
    /// List of untyped values.
    List,
    /// Opaque JSON document.
    Json,
}

impl AttributeType {
    /// Type name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            AttributeType::Text => "text",
            AttributeType::Integer => "integer",
            AttributeType::Number => "number",
            AttributeType::Boolean => "boolean",
            AttributeType::Day => "day",
            AttributeType::DateTime => "datetime",
            AttributeType::List => "list",
            AttributeType::Json => "json",
        }
    }

    /// Cast an arbitrary value into this type.
    pub fn cast(&self, value: &Value) -> Result<Value, CastError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let fail = || CastError::new(self.name(), value);

        match self {
            AttributeType::Text => match value {
                Value::String(_) => Ok(value.clone()),
                Value::Int(i) => Ok(Value::String(i.to_string())),
                Value::Float(f) => Ok(Value::String(f.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                Value::Day(_) | Value::DateTime(_) => match value.to_json() {
                    serde_json::Value::String(s) => Ok(Value::String(s)),
                    _ => Err(fail()),
                },
                _ => Err(fail()),
            },
            AttributeType::Integer => match value {
                Value::Int(_) => Ok(value.clone()),
                Value::Float(f) if is_whole_i64(*f) => Ok(Value::Int(*f as i64)),
                Value::String(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| fail()),
                _ => Err(fail()),
            },
            AttributeType::Number => match value {
                Value::Int(i) => Ok(Value::Float(*i as f64)),
                Value::Float(f) if f.is_finite() => Ok(value.clone()),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(Value::Float)
                    .ok_or_else(fail),
                _ => Err(fail()),
            },
            AttributeType::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                Value::Int(0) => Ok(Value::Bool(false)),
                Value::Int(1) => Ok(Value::Bool(true)),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
                _ => Err(fail()),
            },
            AttributeType::Day => match value {
                Value::Day(_) => Ok(value.clone()),
                Value::DateTime(t) => Ok(Value::Day(t.date_naive())),
                Value::String(s) => parse_day(s).map(Value::Day).ok_or_else(fail),
                _ => Err(fail()),
            },
            AttributeType::DateTime => match value {
                Value::DateTime(_) => Ok(value.clone()),
                Value::Day(d) => Ok(Value::DateTime(d.and_time(NaiveTime::MIN).and_utc())),
                Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                    .map(|t| Value::DateTime(t.with_timezone(&Utc)))
                    .map_err(|_| fail()),
                _ => Err(fail()),
            },
            AttributeType::List => match value {
                Value::Array(_) => Ok(value.clone()),
                Value::Json(json @ serde_json::Value::Array(_)) => Ok(Value::from_json(json)),
                _ => Err(fail()),
            },
            AttributeType::Json => match value {
                Value::Json(_) => Ok(value.clone()),
                other => Ok(Value::Json(other.to_json())),
            },
        }
    }

    /// Decode a stored JSON value.
    pub fn value_from_json(&self, json: &serde_json::Value) -> Result<Value, CastError> {
        match self {
            AttributeType::Json if !json.is_null() => Ok(Value::Json(json.clone())),
            _ => self.cast(&Value::from_json(json)),
        }
    }

    /// Encode a value for storage.
    pub fn value_to_json(&self, value: &Value) -> serde_json::Value {
        value.to_json()
    }
}

/// Parse a day from `YYYY-MM-DD` or from the date part of an RFC 3339 timestamp.
pub fn parse_day(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|t| t.date_naive()))
}

/// An attribute definition.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDef {
    /// Attribute name.
    pub name: String,
    /// Type contract.
    pub ty: AttributeType,
    /// Value of a freshly created entity.
    pub default: Value,
}

impl AttributeDef {
    /// Create an attribute with a null default.
    pub fn new(name: impl Into<String>, ty: AttributeType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: Value::Null,
        }
    }

    /// Set the default value.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }
}

/// Which side of a relationship a definition describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The local type stores the foreign id.
    BelongsTo,
    /// The foreign type stores the local id.
    HasMany,
}

/// A relationship between two object types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Side of the relationship.
    pub direction: Direction,
    /// Type declaring this relationship.
    pub local_type: String,
    /// Type on the other end.
    pub foreign_type: String,
    /// Name on the local type.
    pub local_name: String,
    /// Name on the foreign type. For has-many this is the foreign belongs-to
    /// relationship that points back; for belongs-to it is the plural name.
    pub foreign_name: String,
}

/// A human-readable display template such as `"{model} in {room.name}"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayFormat {
    template: String,
}

impl DisplayFormat {
    /// Create a display template.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// The raw template.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Placeholder paths in template order, e.g. `["model", "room.name"]`.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut paths = Vec::new();
        let mut rest = self.template.as_str();
        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else { break };
            let path = after[..close].trim();
            if !path.is_empty() {
                paths.push(path);
            }
            rest = &after[close + 1..];
        }
        paths
    }

    /// Relationship paths the template traverses: every placeholder path
    /// without its final attribute segment.
    pub fn relationship_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .placeholders()
            .into_iter()
            .filter_map(|p| p.rsplit_once('.').map(|(rel, _)| rel.to_string()))
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }
}

/// An object type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectType {
    /// Type name (unique within a schema).
    pub name: String,
    /// Attribute definitions.
    pub attributes: BTreeMap<String, AttributeDef>,
    /// Belongs-to relationships.
    pub belongs_to: BTreeMap<String, Relationship>,
    /// Has-many relationships.
    pub has_many: BTreeMap<String, Relationship>,
    /// Default display template.
    pub display_format: Option<DisplayFormat>,
}

impl ObjectType {
    /// Create an empty object type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
            belongs_to: BTreeMap::new(),
            has_many: BTreeMap::new(),
            display_format: None,
        }
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, ty: AttributeType) -> Self {
        let def = AttributeDef::new(name, ty);
        self.attributes.insert(def.name.clone(), def);
        self
    }

    /// Add a fully specified attribute.
    pub fn with_attribute_def(mut self, def: AttributeDef) -> Self {
        self.attributes.insert(def.name.clone(), def);
        self
    }

    /// Add a belongs-to relationship `name` pointing at `foreign_type`,
    /// reachable back from the foreign type as `foreign_name`.
    pub fn belongs_to(
        mut self,
        name: impl Into<String>,
        foreign_type: impl Into<String>,
        foreign_name: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.belongs_to.insert(
            name.clone(),
            Relationship {
                direction: Direction::BelongsTo,
                local_type: self.name.clone(),
                foreign_type: foreign_type.into(),
                local_name: name,
                foreign_name: foreign_name.into(),
            },
        );
        self
    }

    /// Add a has-many relationship `name` over `foreign_type`, whose
    /// belongs-to relationship `foreign_name` points back at this type.
    pub fn has_many(
        mut self,
        name: impl Into<String>,
        foreign_type: impl Into<String>,
        foreign_name: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.has_many.insert(
            name.clone(),
            Relationship {
                direction: Direction::HasMany,
                local_type: self.name.clone(),
                foreign_type: foreign_type.into(),
                local_name: name,
                foreign_name: foreign_name.into(),
            },
        );
        self
    }

    /// Set the default display template.
    pub fn with_display_format(mut self, template: impl Into<String>) -> Self {
        self.display_format = Some(DisplayFormat::new(template));
        self
    }

    /// Get an attribute definition.
    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.get(name)
    }

    /// Get a belongs-to relationship.
    pub fn belongs_to_relationship(&self, name: &str) -> Option<&Relationship> {
        self.belongs_to.get(name)
    }

    /// Get a has-many relationship.
    pub fn has_many_relationship(&self, name: &str) -> Option<&Relationship> {
        self.has_many.get(name)
    }
}

/// A set of object types.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: BTreeMap<String, Arc<ObjectType>>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object type.
    pub fn with_type(mut self, object_type: ObjectType) -> Self {
        self.types
            .insert(object_type.name.clone(), Arc::new(object_type));
        self
    }

    /// Look up an object type by name.
    pub fn object_type(&self, name: &str) -> Option<&Arc<ObjectType>> {
        self.types.get(name)
    }

    /// Iterate over all object types.
    pub fn types(&self) -> impl Iterator<Item = &Arc<ObjectType>> {
        self.types.values()
    }
}

/// Whole floats inside the `i64` range; `as` would saturate anything else.
fn is_whole_i64(f: f64) -> bool {
    f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
}
