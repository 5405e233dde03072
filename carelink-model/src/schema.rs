use crate::entity::EntityType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which top-level fields of an entity type get compressed and which get encrypted.
///
/// The two lists may overlap; a field in both is compressed first and the
/// compressed form is then encrypted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Large free-text fields worth deflating once they pass the size threshold.
    #[serde(default)]
    pub compressed_fields: Vec<String>,
    /// Fields that must never reach the local store in plaintext.
    #[serde(default)]
    pub sensitive_fields: Vec<String>,
}

impl FieldSchema {
    pub fn new<C, S>(compressed: C, sensitive: S) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        Self {
            compressed_fields: compressed.into_iter().map(Into::into).collect(),
            sensitive_fields: sensitive.into_iter().map(Into::into).collect(),
        }
    }
}

/// Per-entity-type field schemas.
///
/// Types without an entry get an empty schema (nothing compressed or encrypted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSchemaTable {
    schemas: BTreeMap<EntityType, FieldSchema>,
}

impl FieldSchemaTable {
    /// An empty table.
    pub fn empty() -> Self {
        Self {
            schemas: BTreeMap::new(),
        }
    }

    /// Sets the schema for an entity type, replacing any previous entry.
    #[must_use]
    pub fn with(mut self, entity_type: EntityType, schema: FieldSchema) -> Self {
        self.schemas.insert(entity_type, schema);
        self
    }

    /// Returns the schema for a type, or an empty one.
    pub fn schema_for(&self, entity_type: EntityType) -> FieldSchema {
        self.schemas.get(&entity_type).cloned().unwrap_or_default()
    }

    pub fn compressed_fields(&self, entity_type: EntityType) -> &[String] {
        self.schemas
            .get(&entity_type)
            .map(|s| s.compressed_fields.as_slice())
            .unwrap_or(&[])
    }

    pub fn sensitive_fields(&self, entity_type: EntityType) -> &[String] {
        self.schemas
            .get(&entity_type)
            .map(|s| s.sensitive_fields.as_slice())
            .unwrap_or(&[])
    }
}

impl Default for FieldSchemaTable {
    fn default() -> Self {
        Self::empty()
            .with(
                EntityType::Assessment,
                FieldSchema::new(
                    ["responses", "notes"],
                    ["medicalHistory", "nhsNumber", "notes"],
                ),
            )
            .with(
                EntityType::Visit,
                FieldSchema::new(["notes", "observations"], ["residentDetails", "notes"]),
            )
    }
}
