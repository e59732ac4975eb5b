//! Duplicatable section instances and the shared option pool
//!
//! A duplicatable section behaves like a repeatable line-item row. Its
//! choice fields may draw from a shared pool of options: once a row has
//! taken an option, sibling rows no longer offer it, and removing a row
//! releases its options back to the pool.

use form_types::{
    DuplicateGroupId, FieldId, FieldOption, FormError, FormResult, FormSchema, Section,
    SectionId, SectionInstance,
};
use std::collections::HashMap;
use tracing::debug;

/// The live set of instances of one section while a request is edited.
///
/// Holds the original instance plus any duplicates, and tracks which
/// shared options each instance has consumed. All mutations are
/// all-or-nothing: a rejected operation leaves the set untouched.
#[derive(Clone, Debug)]
pub struct SectionInstances {
    template: Section,
    instances: Vec<SectionInstance>,
    /// field -> option value -> the instance holding it
    consumed: HashMap<FieldId, HashMap<String, Option<DuplicateGroupId>>>,
}

impl SectionInstances {
    /// Create the instance set for a section template, containing the
    /// original instance.
    pub fn new(template: Section) -> Self {
        let original = SectionInstance::original(&template);
        Self {
            template,
            instances: vec![original],
            consumed: HashMap::new(),
        }
    }

    /// Create the instance set for a section looked up in a schema
    pub fn for_section(schema: &FormSchema, section_id: &SectionId) -> FormResult<Self> {
        Ok(Self::new(schema.section(section_id)?.clone()))
    }

    /// The section template
    pub fn template(&self) -> &Section {
        &self.template
    }

    /// All live instances, original first, duplicates in creation order
    pub fn instances(&self) -> &[SectionInstance] {
        &self.instances
    }

    /// Number of live instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Get an instance by group id (`None` for the original)
    pub fn get(&self, group: Option<&DuplicateGroupId>) -> Option<&SectionInstance> {
        self.instances
            .iter()
            .find(|i| i.group.as_ref() == group)
    }

    /// Duplicate the section: a new instance under a fresh group id.
    ///
    /// Fields are deep copies of the template; choice fields are
    /// filtered to exclude options already consumed by sibling
    /// instances. Rejected for non-duplicatable sections.
    pub fn duplicate(&mut self) -> FormResult<DuplicateGroupId> {
        if !self.template.duplicatable {
            return Err(FormError::InvariantViolation(format!(
                "section '{}' is not duplicatable",
                self.template.id
            )));
        }

        let group = DuplicateGroupId::generate();
        let mut fields = self.template.fields.clone();
        for field in &mut fields {
            if field.field_type.has_options() {
                if let Some(taken) = self.consumed.get(&field.id) {
                    field.options.retain(|o| !taken.contains_key(&o.value));
                }
            }
        }

        debug!(section = %self.template.id, group = %group, "section duplicated");
        self.instances.push(SectionInstance {
            section_id: self.template.id.clone(),
            group: Some(group.clone()),
            fields,
        });
        Ok(group)
    }

    /// Consume a shared option for one instance's choice field.
    ///
    /// The option disappears from every sibling instance's list. An
    /// instance re-selecting releases its previous option first, so a
    /// row can change its pick without leaking pool entries.
    pub fn select_option(
        &mut self,
        group: Option<&DuplicateGroupId>,
        field_id: &FieldId,
        value: &str,
    ) -> FormResult<()> {
        if self.get(group).is_none() {
            return Err(match group {
                Some(g) => FormError::UnknownGroup(g.clone()),
                None => FormError::InvariantViolation("no original instance".into()),
            });
        }
        let field = self
            .template
            .get_field(field_id)
            .ok_or_else(|| FormError::UnknownField(field_id.clone()))?;
        if !field.field_type.has_options() {
            return Err(FormError::InvariantViolation(format!(
                "field '{}' has no option pool",
                field_id
            )));
        }
        if field.option_position(value).is_none() {
            return Err(FormError::InvariantViolation(format!(
                "option '{}' is not defined on field '{}'",
                value, field_id
            )));
        }
        let holders = self.consumed.entry(field_id.clone()).or_default();
        if let Some(holder) = holders.get(value) {
            if holder.as_ref() != group {
                return Err(FormError::InvariantViolation(format!(
                    "option '{}' on field '{}' is already taken by another instance",
                    value, field_id
                )));
            }
            return Ok(()); // already held by this instance
        }

        // Release this instance's previous pick for the field, if any
        let previous = holders
            .iter()
            .find(|(_, h)| h.as_ref() == group)
            .map(|(v, _)| v.clone());
        if let Some(prev) = previous {
            if let Some(holders) = self.consumed.get_mut(field_id) {
                holders.remove(&prev);
            }
            self.restore_option(field_id, &prev);
        }

        self.consumed
            .entry(field_id.clone())
            .or_default()
            .insert(value.to_string(), group.cloned());

        // Hide the option from every other instance
        let owner = group.cloned();
        for instance in &mut self.instances {
            if instance.group != owner {
                if let Some(f) = instance.get_field_mut(field_id) {
                    f.options.retain(|o| o.value != value);
                }
            }
        }
        Ok(())
    }

    /// Remove a section instance.
    ///
    /// Only duplicates are removable: the original instance (and with it
    /// a non-duplicatable section's only instance) is rejected. Options
    /// the removed instance held return to the pool and reappear in
    /// every remaining instance's list, re-sorted by template order.
    pub fn remove(&mut self, group: Option<&DuplicateGroupId>) -> FormResult<()> {
        let group = match group {
            Some(g) => g,
            None => {
                return Err(FormError::InvariantViolation(format!(
                    "the original instance of section '{}' cannot be removed",
                    self.template.id
                )))
            }
        };
        let index = self
            .instances
            .iter()
            .position(|i| i.group.as_ref() == Some(group))
            .ok_or_else(|| FormError::UnknownGroup(group.clone()))?;
        self.instances.remove(index);

        // Release everything the removed instance held
        let mut released: Vec<(FieldId, String)> = Vec::new();
        for (field_id, holders) in &mut self.consumed {
            holders.retain(|value, holder| {
                if holder.as_ref() == Some(group) {
                    released.push((field_id.clone(), value.clone()));
                    false
                } else {
                    true
                }
            });
        }
        for (field_id, value) in released {
            self.restore_option(&field_id, &value);
        }

        debug!(section = %self.template.id, group = %group, "section instance removed");
        Ok(())
    }

    /// Re-insert a released option into every live instance's list,
    /// keeping the template's defined option order.
    fn restore_option(&mut self, field_id: &FieldId, value: &str) {
        let template_field = match self.template.get_field(field_id) {
            Some(f) => f,
            None => return,
        };
        let option = match template_field.options.iter().find(|o| o.value == value) {
            Some(o) => o.clone(),
            None => return,
        };
        let order: Vec<&FieldOption> = template_field.options.iter().collect();

        for instance in &mut self.instances {
            if let Some(f) = instance.get_field_mut(field_id) {
                if f.options.iter().any(|o| o.value == value) {
                    continue;
                }
                f.options.push(option.clone());
                f.options.sort_by_key(|o| {
                    order
                        .iter()
                        .position(|t| t.value == o.value)
                        .unwrap_or(usize::MAX)
                });
            }
        }
    }

    /// Option values of a field still unconsumed by any instance
    pub fn available_options(&self, field_id: &FieldId) -> Vec<&FieldOption> {
        let taken = self.consumed.get(field_id);
        self.template
            .get_field(field_id)
            .map(|f| {
                f.options
                    .iter()
                    .filter(|o| taken.map_or(true, |t| !t.contains_key(&o.value)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use form_types::{Field, FieldType};

    fn make_items_template() -> Section {
        Section::new("items", "Line Items")
            .duplicatable()
            .with_field(Field::new("name", "Item Name", FieldType::ShortText))
            .with_field(
                Field::new("asset", "Asset", FieldType::Dropdown)
                    .with_option("a-1", "Laptop")
                    .with_option("a-2", "Monitor")
                    .with_option("a-3", "Dock"),
            )
    }

    fn asset() -> FieldId {
        FieldId::new("asset")
    }

    #[test]
    fn test_duplicate_assigns_fresh_groups() {
        let mut set = SectionInstances::new(make_items_template());
        let g1 = set.duplicate().unwrap();
        let g2 = set.duplicate().unwrap();

        assert_eq!(set.len(), 3);
        assert_ne!(g1, g2);
        assert!(set.instances()[0].is_original());
    }

    #[test]
    fn test_duplicate_non_duplicatable_rejected() {
        let template = Section::new("general", "General")
            .with_field(Field::new("title", "Title", FieldType::ShortText));
        let mut set = SectionInstances::new(template);

        assert!(matches!(
            set.duplicate(),
            Err(FormError::InvariantViolation(_))
        ));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_consumed_option_filtered_from_new_duplicates() {
        let mut set = SectionInstances::new(make_items_template());
        set.select_option(None, &asset(), "a-1").unwrap();

        let group = set.duplicate().unwrap();
        let dup = set.get(Some(&group)).unwrap();
        let options = &dup.get_field(&asset()).unwrap().options;
        assert_eq!(options.len(), 2);
        assert!(options.iter().all(|o| o.value != "a-1"));
    }

    #[test]
    fn test_select_hides_option_from_siblings() {
        let mut set = SectionInstances::new(make_items_template());
        let g1 = set.duplicate().unwrap();

        set.select_option(Some(&g1), &asset(), "a-2").unwrap();

        let original = set.get(None).unwrap();
        let options = &original.get_field(&asset()).unwrap().options;
        assert!(options.iter().all(|o| o.value != "a-2"));

        // The holder still sees its own pick
        let row = set.get(Some(&g1)).unwrap();
        assert!(row
            .get_field(&asset())
            .unwrap()
            .options
            .iter()
            .any(|o| o.value == "a-2"));
    }

    #[test]
    fn test_double_consumption_rejected() {
        let mut set = SectionInstances::new(make_items_template());
        let g1 = set.duplicate().unwrap();

        set.select_option(None, &asset(), "a-1").unwrap();
        let result = set.select_option(Some(&g1), &asset(), "a-1");
        assert!(matches!(result, Err(FormError::InvariantViolation(_))));

        // Re-selecting one's own pick is a no-op
        set.select_option(None, &asset(), "a-1").unwrap();
    }

    #[test]
    fn test_reselect_releases_previous_pick() {
        let mut set = SectionInstances::new(make_items_template());
        let g1 = set.duplicate().unwrap();

        set.select_option(Some(&g1), &asset(), "a-1").unwrap();
        set.select_option(Some(&g1), &asset(), "a-2").unwrap();

        // a-1 is back in the pool and visible to the original
        assert!(set
            .available_options(&asset())
            .iter()
            .any(|o| o.value == "a-1"));
        let original = set.get(None).unwrap();
        assert!(original
            .get_field(&asset())
            .unwrap()
            .options
            .iter()
            .any(|o| o.value == "a-1"));
    }

    #[test]
    fn test_remove_releases_option_in_template_order() {
        let mut set = SectionInstances::new(make_items_template());
        let g1 = set.duplicate().unwrap();
        let g2 = set.duplicate().unwrap();

        set.select_option(Some(&g1), &asset(), "a-1").unwrap();
        set.select_option(Some(&g2), &asset(), "a-3").unwrap();

        set.remove(Some(&g1)).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.get(Some(&g1)).is_none());

        // a-1 restored to the remaining rows, sorted by template order
        let g2_options: Vec<&str> = set
            .get(Some(&g2))
            .unwrap()
            .get_field(&asset())
            .unwrap()
            .options
            .iter()
            .map(|o| o.value.as_str())
            .collect();
        assert_eq!(g2_options, vec!["a-1", "a-2", "a-3"]);

        // Only one consumer can take the released option
        set.select_option(Some(&g2), &asset(), "a-1").unwrap();
        let result = set.select_option(None, &asset(), "a-1");
        assert!(result.is_err());
    }

    #[test]
    fn test_remove_original_rejected() {
        let mut set = SectionInstances::new(make_items_template());
        assert!(matches!(
            set.remove(None),
            Err(FormError::InvariantViolation(_))
        ));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_remove_unknown_group() {
        let mut set = SectionInstances::new(make_items_template());
        let ghost = DuplicateGroupId::new("ghost");
        assert!(matches!(
            set.remove(Some(&ghost)),
            Err(FormError::UnknownGroup(_))
        ));
    }

    #[test]
    fn test_for_section_lookup() {
        let schema = FormSchema::new("F").with_section(make_items_template());
        let set =
            SectionInstances::for_section(&schema, &SectionId::new("items")).unwrap();
        assert_eq!(set.template().id, SectionId::new("items"));

        let missing = SectionInstances::for_section(&schema, &SectionId::new("ghost"));
        assert!(matches!(missing, Err(FormError::UnknownSection(_))));
    }

    #[test]
    fn test_available_options_tracks_pool() {
        let mut set = SectionInstances::new(make_items_template());
        assert_eq!(set.available_options(&asset()).len(), 3);

        set.select_option(None, &asset(), "a-2").unwrap();
        let available: Vec<&str> = set
            .available_options(&asset())
            .iter()
            .map(|o| o.value.as_str())
            .collect();
        assert_eq!(available, vec!["a-1", "a-3"]);
    }
}
