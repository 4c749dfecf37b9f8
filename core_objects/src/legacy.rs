//! One-time migration of the legacy flat appearance list.
//!
//! Records are folded into a (primary, secondary) keyed template multimap,
//! then turned into configuration fragments shaped like regular content so
//! the rest of the load pipeline never sees the legacy format.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map as JsonMap, Value};
use tracing::{debug, warn};

use object_schema::{LegacyDefInfo, ObjectKey, ObjectTemplate, ObjectTypeId, TerrainMask};

use crate::config_tree::inherit;

/// Names shipped alongside the legacy records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LegacyNames {
    /// Human name per primary id.
    pub object_names: Vec<String>,
    /// Custom subtype names, indexed by secondary id.
    pub custom_names: BTreeMap<ObjectTypeId, Vec<String>>,
}

impl LegacyNames {
    pub fn object_name(&self, id: ObjectTypeId) -> Option<&str> {
        self.object_names
            .get(id.0 as usize)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    pub fn custom_name(&self, key: ObjectKey) -> Option<&str> {
        self.custom_names
            .get(&key.id)
            .and_then(|names| names.get(key.subid.0 as usize))
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }
}

/// Builds the modern template for one legacy record; `None` for records with
/// negative ids. Masks are kept bit-exact.
pub fn template_from_legacy(record: &LegacyDefInfo) -> Option<ObjectTemplate> {
    let key = record.key()?;
    Some(ObjectTemplate {
        key,
        name: None,
        animation: record.name.clone(),
        editor_animation: None,
        allowed_terrains: TerrainMask::from_bits_retain(record.terrain_allowed as u32),
        menu_terrains: TerrainMask::from_bits_retain(record.terrain_menu as u32),
        visit_dir: record.visit_dir,
        visit_map: record.visit_map,
        block_map: record.block_map,
        print_priority: record.print_priority.clamp(0, i32::from(u8::MAX)) as u8,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LegacyInsert {
    Added,
    Merged,
    Duplicate,
}

/// Migration state kept by the registry until finalization.
#[derive(Debug, Clone, Default)]
pub(crate) struct LegacyState {
    templates: BTreeMap<ObjectKey, Vec<ObjectTemplate>>,
    names: LegacyNames,
    fragments: Vec<Value>,
}

impl LegacyState {
    /// Folds a template into the multimap. Equal appearances under one key
    /// collapse, with their terrain masks united; a record adding no terrain
    /// is a duplicate.
    pub(crate) fn insert_template(&mut self, template: ObjectTemplate) -> LegacyInsert {
        let entries = self.templates.entry(template.key).or_default();
        match entries
            .iter_mut()
            .find(|existing| existing.same_appearance(&template))
        {
            Some(existing)
                if existing.allowed_terrains.contains(template.allowed_terrains)
                    && existing.menu_terrains.contains(template.menu_terrains) =>
            {
                LegacyInsert::Duplicate
            }
            Some(existing) => {
                existing.allowed_terrains |= template.allowed_terrains;
                existing.menu_terrains |= template.menu_terrains;
                LegacyInsert::Merged
            }
            None => {
                entries.push(template);
                LegacyInsert::Added
            }
        }
    }

    pub(crate) fn set_names(&mut self, names: LegacyNames) {
        self.names = names;
    }

    pub(crate) fn custom_name(&self, key: ObjectKey) -> Option<&str> {
        self.names.custom_name(key)
    }

    pub(crate) fn take_templates(&mut self, key: ObjectKey) -> Vec<ObjectTemplate> {
        self.templates.remove(&key).unwrap_or_default()
    }

    pub(crate) fn template_count(&self) -> usize {
        self.templates.values().map(Vec::len).sum()
    }

    /// Moves every template of primary `id` out of the multimap.
    fn drain_primary(&mut self, id: ObjectTypeId) -> Vec<(ObjectKey, Vec<ObjectTemplate>)> {
        let keys: Vec<ObjectKey> = self
            .templates
            .range(ObjectKey::new(id.0, 0)..=ObjectKey::new(id.0, u32::MAX))
            .map(|(key, _)| *key)
            .collect();
        keys.into_iter()
            .filter_map(|key| self.templates.remove(&key).map(|list| (key, list)))
            .collect()
    }

    /// Emits one fragment per primary slot below `data_size`, consuming the
    /// templates of those slots.
    pub(crate) fn build_fragments(&mut self, data_size: usize) -> Vec<Value> {
        let mut fragments = Vec::with_capacity(data_size);
        for slot in 0..data_size {
            let id = ObjectTypeId(slot as u32);
            let mut subtypes = JsonMap::new();
            for (key, templates) in self.drain_primary(id) {
                let mut entry = JsonMap::new();
                entry.insert("index".to_string(), json!(key.subid.0));
                entry.insert(
                    "templates".to_string(),
                    serde_json::to_value(&templates).unwrap_or(Value::Array(Vec::new())),
                );
                if let Some(name) = self.names.custom_name(key) {
                    entry.insert("name".to_string(), json!(name));
                }
                subtypes.insert(legacy_sub_identifier(key), Value::Object(entry));
            }
            fragments.push(json!({
                "name": self.names.object_name(id).unwrap_or_default(),
                "subtypes": subtypes,
            }));
        }
        self.fragments = fragments.clone();
        fragments
    }

    /// Hands out the fragment for `index` once; later calls get `None`.
    pub(crate) fn take_fragment(&mut self, index: usize) -> Option<Value> {
        let slot = self.fragments.get_mut(index)?;
        if slot.is_null() {
            return None;
        }
        Some(slot.take())
    }

    /// Puts back a fragment whose entry failed to load.
    pub(crate) fn restore_fragment(&mut self, index: usize, fragment: Value) {
        if let Some(slot) = self.fragments.get_mut(index) {
            *slot = fragment;
        }
    }

    pub(crate) fn clear(&mut self) {
        let leftover = self.template_count();
        if leftover > 0 {
            debug!(
                target: "objects::legacy",
                leftover,
                "legacy.templates_discarded"
            );
        }
        *self = Self::default();
    }
}

pub(crate) fn legacy_sub_identifier(key: ObjectKey) -> String {
    format!("object{}", key.subid)
}

/// Lays a content entry over the legacy fragment of the same slot. A content
/// subtype that pins the same `index` as a fragment subtype absorbs it, so
/// the slot is configured once.
pub(crate) fn overlay_fragment(mut fragment: Value, entry: &Value) -> Value {
    let mut entry = entry.clone();
    if let (Some(legacy_subtypes), Some(content_subtypes)) = (
        fragment.get_mut("subtypes").and_then(Value::as_object_mut),
        entry.get_mut("subtypes").and_then(Value::as_object_mut),
    ) {
        for content in content_subtypes.values_mut() {
            let Some(index) = content.get("index").and_then(Value::as_u64) else {
                continue;
            };
            let claimed = legacy_subtypes
                .iter()
                .find(|(_, legacy)| legacy.get("index").and_then(Value::as_u64) == Some(index))
                .map(|(name, _)| name.clone());
            if let Some(name) = claimed {
                if let Some(legacy) = legacy_subtypes.remove(&name) {
                    inherit(content, &legacy);
                }
            }
        }
    }
    inherit(&mut entry, &fragment);
    entry
}

pub(crate) fn fold_records(state: &mut LegacyState, records: &[LegacyDefInfo]) -> FoldSummary {
    let mut summary = FoldSummary::default();
    for (index, record) in records.iter().enumerate() {
        let Some(template) = template_from_legacy(record) else {
            warn!(
                target: "objects::legacy",
                index,
                id = record.id,
                subid = record.subid,
                "legacy.record_skipped"
            );
            summary.skipped += 1;
            continue;
        };
        match state.insert_template(template) {
            LegacyInsert::Added => summary.added += 1,
            LegacyInsert::Merged => summary.merged += 1,
            LegacyInsert::Duplicate => summary.duplicates += 1,
        }
    }
    summary
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FoldSummary {
    pub added: usize,
    pub merged: usize,
    pub duplicates: usize,
    pub skipped: usize,
}
