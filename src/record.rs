// Record type: fixed identity fields plus an open attribute bag

use crate::models::{self, BASE_MODEL};
use chrono::NaiveDateTime;
use eyre::{Result, eyre};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Key carrying the concrete class name in a record's mapping
pub const CLASS_KEY: &str = "__class__";

/// Attribute names owned by the record itself; never part of the extension bag
pub const RESERVED_ATTRIBUTES: [&str; 4] = ["id", "created_at", "updated_at", CLASS_KEY];

/// A stored record
///
/// `id`, `created_at` and `updated_at` are typed fields. Everything else a
/// record carries lives in `attributes`, which keeps insertion order and is
/// merged into the mapping form at the serialization boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    class_name: String,
    id: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
    attributes: Map<String, Value>,
}

impl Record {
    /// Create a fresh record with a new random id and both timestamps set to now
    ///
    /// The record is not stored anywhere until it is registered with a `Store`.
    pub fn new(class_name: impl Into<String>) -> Self {
        let now = models::now();
        Self {
            class_name: class_name.into(),
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            attributes: Map::new(),
        }
    }

    /// Reconstruct a record from its mapping form
    ///
    /// The class comes from `__class__` (defaulting to `BaseModel`), the id and
    /// timestamps are taken as stored, and every other key is adopted verbatim.
    pub fn from_mapping(mut mapping: Map<String, Value>) -> Result<Self> {
        let class_name = match mapping.remove(CLASS_KEY) {
            Some(Value::String(name)) => name,
            Some(other) => return Err(eyre!("Invalid {} value: {}", CLASS_KEY, other)),
            None => BASE_MODEL.to_string(),
        };

        let id = match mapping.remove("id") {
            Some(Value::String(id)) => id,
            Some(other) => return Err(eyre!("Invalid id value: {}", other)),
            None => return Err(eyre!("Record mapping has no id")),
        };

        let created_at = take_timestamp(&mut mapping, "created_at")?;
        let updated_at = take_timestamp(&mut mapping, "updated_at")?;

        Ok(Self {
            class_name,
            id,
            created_at,
            updated_at,
            attributes: mapping,
        })
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }

    pub fn updated_at(&self) -> NaiveDateTime {
        self.updated_at
    }

    /// Composite store key: `<class_name>.<id>`
    pub fn key(&self) -> String {
        format!("{}.{}", self.class_name, self.id)
    }

    /// Set `updated_at` to now
    pub fn touch(&mut self) {
        self.updated_at = models::now();
    }

    /// Extension attribute by name
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Add or replace an extension attribute
    ///
    /// Reserved names are rejected so the identity fields cannot be overwritten.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) -> Result<()> {
        let name = name.into();
        if is_reserved(&name) {
            return Err(eyre!("Attribute {} is read-only", name));
        }
        self.attributes.insert(name, value);
        Ok(())
    }

    /// All attributes with timestamps rendered as text, without the class key
    pub fn fields(&self) -> Map<String, Value> {
        let mut fields = Map::with_capacity(self.attributes.len() + 3);
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        fields.insert(
            "created_at".to_string(),
            Value::String(models::format_timestamp(&self.created_at)),
        );
        fields.insert(
            "updated_at".to_string(),
            Value::String(models::format_timestamp(&self.updated_at)),
        );
        for (name, value) in &self.attributes {
            fields.insert(name.clone(), value.clone());
        }
        fields
    }

    /// Mapping form used for persistence
    pub fn to_mapping(&self) -> Map<String, Value> {
        let mut mapping = self.fields();
        mapping.insert(CLASS_KEY.to_string(), Value::String(self.class_name.clone()));
        mapping
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] ({}) {}", self.class_name, self.id, Value::Object(self.fields()))
    }
}

pub fn is_reserved(name: &str) -> bool {
    RESERVED_ATTRIBUTES.contains(&name)
}

fn take_timestamp(mapping: &mut Map<String, Value>, field: &str) -> Result<NaiveDateTime> {
    match mapping.remove(field) {
        Some(Value::String(text)) => {
            models::parse_timestamp(&text).ok_or_else(|| eyre!("Invalid {} timestamp: {}", field, text))
        }
        Some(other) => Err(eyre!("Invalid {} value: {}", field, other)),
        None => Err(eyre!("Record mapping has no {}", field)),
    }
}
