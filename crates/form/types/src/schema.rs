//! Form schemas: sections, fields, and duplication markers
//!
//! A FormSchema is an ordered list of sections; a section is an ordered
//! list of fields. Schemas are versioned by replacement — once a request
//! references a schema, that schema is never mutated in place.

use crate::{FormError, FormResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ── Identifiers ──────────────────────────────────────────────────────

/// Unique identifier for a form schema
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormSchemaId(pub String);

impl FormSchemaId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for FormSchemaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a section within a schema
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectionId(pub String);

impl SectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for SectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a field within a section
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldId(pub String);

impl FieldId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for FieldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for one duplicate instance of a duplicatable section.
///
/// Generated fresh each time a user duplicates a section. The original
/// (first) instance of a section carries no group id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DuplicateGroupId(pub String);

impl DuplicateGroupId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for DuplicateGroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Field Model ──────────────────────────────────────────────────────

/// The input type of a form field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// Single-line text input
    ShortText,
    /// Multi-line text input
    LongText,
    /// Numeric input, stored as a serialized string
    Number,
    /// Calendar date, stored as a serialized string
    Date,
    /// Boolean toggle
    Switch,
    /// Single choice from an option list
    Dropdown,
    /// Multiple choice from an option list
    Checkbox,
    /// File attachment reference
    File,
}

impl FieldType {
    /// Check if this field type carries an option list
    pub fn has_options(&self) -> bool {
        matches!(self, Self::Dropdown | Self::Checkbox)
    }
}

/// One selectable option of a choice-typed field
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    /// The stored value
    pub value: String,
    /// The label shown to the user
    pub label: String,
}

impl FieldOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// A field within a form section
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Field {
    /// Unique identifier within the schema
    pub id: FieldId,
    /// Label shown to the user
    pub label: String,
    /// Input type
    pub field_type: FieldType,
    /// Display order within the section
    pub order: u32,
    /// Options for choice types; empty otherwise
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    /// Whether a response is mandatory
    #[serde(default)]
    pub required: bool,
}

impl Field {
    /// Create a new field
    pub fn new(id: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: FieldId::new(id),
            label: label.into(),
            field_type,
            order: 0,
            options: Vec::new(),
            required: false,
        }
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    pub fn with_option(mut self, value: impl Into<String>, label: impl Into<String>) -> Self {
        self.options.push(FieldOption::new(value, label));
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Position of an option value in this field's defined option order
    pub fn option_position(&self, value: &str) -> Option<usize> {
        self.options.iter().position(|o| o.value == value)
    }
}

// ── Section Model ────────────────────────────────────────────────────

/// A section of a form: an ordered group of fields
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Section {
    /// Stable identifier within the schema
    pub id: SectionId,
    /// Label shown to the user
    pub name: String,
    /// Display order within the schema
    pub order: u32,
    /// Whether the user may instantiate this section multiple times
    #[serde(default)]
    pub duplicatable: bool,
    /// The fields of this section, in display order
    pub fields: Vec<Field>,
}

impl Section {
    /// Create a new section
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: SectionId::new(id),
            name: name.into(),
            order: 0,
            duplicatable: false,
            fields: Vec::new(),
        }
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    /// Mark this section as duplicatable (repeatable line items)
    pub fn duplicatable(mut self) -> Self {
        self.duplicatable = true;
        self
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Get a field by id
    pub fn get_field(&self, id: &FieldId) -> Option<&Field> {
        self.fields.iter().find(|f| &f.id == id)
    }

    /// Check if a field belongs to this section
    pub fn contains_field(&self, id: &FieldId) -> bool {
        self.fields.iter().any(|f| &f.id == id)
    }
}

// ── Section Instance ─────────────────────────────────────────────────

/// A runtime instance of a section.
///
/// Identity is `(section_id, group)`: the original instance carries
/// `group = None`, every duplicate a freshly generated group id. All
/// fields of one instance share the instance's group id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SectionInstance {
    /// The template section this instance was created from
    pub section_id: SectionId,
    /// `None` for the original instance, a fresh id for each duplicate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<DuplicateGroupId>,
    /// Deep copies of the template fields, with option lists filtered
    /// against the shared pool at duplication time
    pub fields: Vec<Field>,
}

impl SectionInstance {
    /// Create the original instance of a section
    pub fn original(template: &Section) -> Self {
        Self {
            section_id: template.id.clone(),
            group: None,
            fields: template.fields.clone(),
        }
    }

    /// Check if this is the original (first) instance
    pub fn is_original(&self) -> bool {
        self.group.is_none()
    }

    /// Get a field by id
    pub fn get_field(&self, id: &FieldId) -> Option<&Field> {
        self.fields.iter().find(|f| &f.id == id)
    }

    /// Get a field by id, mutably (used by the instance manager to
    /// maintain filtered option lists)
    pub fn get_field_mut(&mut self, id: &FieldId) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| &f.id == id)
    }
}

// ── Form Schema ──────────────────────────────────────────────────────

/// A form schema: the ordered sections a request is filled against.
///
/// Versioned by replacement — a new version is a new schema value with
/// `version` bumped; the old value stays frozen for the requests that
/// reference it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FormSchema {
    /// Unique identifier
    pub id: FormSchemaId,
    /// Human-readable name
    pub name: String,
    /// Version, bumped on replacement
    pub version: u32,
    /// The sections, in display order
    pub sections: Vec<Section>,
    /// When this schema version was created
    pub created_at: DateTime<Utc>,
}

impl FormSchema {
    /// Create a new schema, version 1
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: FormSchemaId::generate(),
            name: name.into(),
            version: 1,
            sections: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    /// Produce the next version of this schema: a fresh value with the
    /// same id and `version + 1`. The receiver stays untouched.
    pub fn next_version(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            version: self.version + 1,
            sections: self.sections.clone(),
            created_at: Utc::now(),
        }
    }

    /// Get a section by id
    pub fn get_section(&self, id: &SectionId) -> Option<&Section> {
        self.sections.iter().find(|s| &s.id == id)
    }

    /// Get a section by id, or fail
    pub fn section(&self, id: &SectionId) -> FormResult<&Section> {
        self.get_section(id)
            .ok_or_else(|| FormError::UnknownSection(id.clone()))
    }

    /// Find the section a field belongs to
    pub fn section_of(&self, field_id: &FieldId) -> Option<&Section> {
        self.sections.iter().find(|s| s.contains_field(field_id))
    }

    /// Get a field by id, searching all sections
    pub fn get_field(&self, field_id: &FieldId) -> Option<&Field> {
        self.sections.iter().find_map(|s| s.get_field(field_id))
    }

    /// Total number of fields across all sections
    pub fn field_count(&self) -> usize {
        self.sections.iter().map(|s| s.fields.len()).sum()
    }

    /// Validate the schema for structural correctness.
    ///
    /// Section ids and field ids must be unique across the schema, and
    /// option lists may only appear on choice-typed fields.
    pub fn validate(&self) -> FormResult<()> {
        let mut section_ids = HashSet::new();
        let mut field_ids = HashSet::new();

        for section in &self.sections {
            if !section_ids.insert(&section.id) {
                return Err(FormError::InvariantViolation(format!(
                    "duplicate section id '{}'",
                    section.id
                )));
            }
            for field in &section.fields {
                if !field_ids.insert(&field.id) {
                    return Err(FormError::InvariantViolation(format!(
                        "duplicate field id '{}'",
                        field.id
                    )));
                }
                if !field.options.is_empty() && !field.field_type.has_options() {
                    return Err(FormError::InvariantViolation(format!(
                        "field '{}' carries options but is not a choice type",
                        field.id
                    )));
                }
            }
        }

        Ok(())
    }
}
