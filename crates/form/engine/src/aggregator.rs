//! Response aggregator: flat responses back into structured sections
//!
//! Storage is flat `(field, group, value)` triples; display and
//! processing need sections. Aggregation groups responses by section
//! instance, matches each response to its template field, and decodes
//! values tolerantly. Grouping contradictions are surfaced as data
//! integrity errors, never merged.

use form_types::{
    DuplicateGroupId, FieldId, FieldType, FieldValue, FormError, FormResult, FormSchema, Response,
    SectionId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

// ── Aggregated Output ────────────────────────────────────────────────

/// One reconstructed field slot: the template field plus its current
/// value, if any. Fields without a response render as empty.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AggregatedField {
    /// The template field
    pub field_id: FieldId,
    /// Label from the template
    pub label: String,
    /// Input type from the template
    pub field_type: FieldType,
    /// The stored serialized value, if answered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    /// Tolerantly decoded view of `raw`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,
}

impl AggregatedField {
    /// Check if this field slot was answered
    pub fn is_answered(&self) -> bool {
        self.raw.is_some()
    }
}

/// One reconstructed section instance with its fields' current values
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AggregatedSection {
    /// The template section
    pub section_id: SectionId,
    /// Name from the template
    pub name: String,
    /// `None` for the original instance, the group id for duplicates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<DuplicateGroupId>,
    /// Field slots in template order
    pub fields: Vec<AggregatedField>,
}

// ── Aggregation ──────────────────────────────────────────────────────

/// Reconstruct structured section instances from a flat response list.
///
/// Sections come back in schema order; within a section the original
/// instance leads and duplicates follow in first-appearance order of
/// their group id in the response stream. Every template section yields
/// at least its original instance, even with no responses recorded.
///
/// Fails with [`FormError::DataIntegrity`] when the responses contradict
/// the schema: an unknown field, a group id claimed by two different
/// sections, or a group id on a non-duplicatable section.
pub fn aggregate(
    schema: &FormSchema,
    responses: &[Response],
) -> FormResult<Vec<AggregatedSection>> {
    // group id -> owning section, for collision detection
    let mut group_owner: HashMap<&DuplicateGroupId, &SectionId> = HashMap::new();
    // (section, group) -> field -> raw value; later responses overwrite
    let mut values: HashMap<(&SectionId, Option<&DuplicateGroupId>), HashMap<&FieldId, &str>> =
        HashMap::new();
    // first-appearance order of duplicate groups, per section
    let mut group_order: HashMap<&SectionId, Vec<&DuplicateGroupId>> = HashMap::new();

    for response in responses {
        let section = schema.section_of(&response.field_id).ok_or_else(|| {
            FormError::DataIntegrity(format!(
                "response references field '{}' absent from schema '{}' v{}",
                response.field_id, schema.id, schema.version
            ))
        })?;

        if let Some(group) = &response.group {
            if !section.duplicatable {
                warn!(section = %section.id, group = %group, "group id on non-duplicatable section");
                return Err(FormError::DataIntegrity(format!(
                    "section '{}' is not duplicatable but response for field '{}' carries group '{}'",
                    section.id, response.field_id, group
                )));
            }
            match group_owner.get(group) {
                Some(owner) if *owner != &section.id => {
                    warn!(group = %group, a = %owner, b = %section.id, "duplicate group claimed by two sections");
                    return Err(FormError::DataIntegrity(format!(
                        "duplicate group '{}' is claimed by sections '{}' and '{}'",
                        group, owner, section.id
                    )));
                }
                Some(_) => {}
                None => {
                    group_owner.insert(group, &section.id);
                    group_order.entry(&section.id).or_default().push(group);
                }
            }
        }

        values
            .entry((&section.id, response.group.as_ref()))
            .or_default()
            .insert(&response.field_id, response.value.as_str());
    }

    let mut out = Vec::new();
    for section in &schema.sections {
        let mut groups: Vec<Option<&DuplicateGroupId>> = vec![None];
        if let Some(order) = group_order.get(&section.id) {
            groups.extend(order.iter().map(|g| Some(*g)));
        }

        for group in groups {
            let instance_values = values.get(&(&section.id, group));
            let fields = section
                .fields
                .iter()
                .map(|field| {
                    let raw = instance_values
                        .and_then(|m| m.get(&field.id))
                        .map(|v| v.to_string());
                    let value = raw
                        .as_deref()
                        .map(|r| FieldValue::decode(field.field_type, r));
                    AggregatedField {
                        field_id: field.id.clone(),
                        label: field.label.clone(),
                        field_type: field.field_type,
                        raw,
                        value,
                    }
                })
                .collect();

            out.push(AggregatedSection {
                section_id: section.id.clone(),
                name: section.name.clone(),
                group: group.cloned(),
                fields,
            });
        }
    }

    Ok(out)
}

/// Flatten aggregated sections back to the flat response list.
///
/// Unanswered field slots produce no response; answered slots emit the
/// stored raw value unchanged, so `flatten(aggregate(r)) == r` as a set.
pub fn flatten(sections: &[AggregatedSection]) -> Vec<Response> {
    let mut out = Vec::new();
    for section in sections {
        for field in &section.fields {
            if let Some(raw) = &field.raw {
                out.push(Response {
                    field_id: field.field_id.clone(),
                    group: section.group.clone(),
                    value: raw.clone(),
                });
            }
        }
    }
    out
}
