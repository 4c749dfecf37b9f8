//! Helpers over the JSON configuration tree used by object content.

use serde_json::{Map as JsonMap, Value};
use tracing::warn;

use object_schema::TerrainType;

/// Deep merge where `overlay` wins; objects merge key by key, everything else
/// is replaced.
pub fn merge(target: &mut Value, overlay: &Value) {
    match (target, overlay) {
        (Value::Object(target_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match target_map.get_mut(key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        target_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, Value::Null) if !target.is_null() => {}
        (target, overlay) => *target = overlay.clone(),
    }
}

/// Fills in whatever `descendant` leaves unset from `base`.
pub fn inherit(descendant: &mut Value, base: &Value) {
    if base.is_null() {
        return;
    }
    let mut merged = base.clone();
    merge(&mut merged, descendant);
    *descendant = merged;
}

/// Content loaded into the core scope keeps its bare name; every other scope
/// is prefixed (`scope:name`).
pub fn normalize_identifier(core_scope: &str, scope: &str, name: &str) -> String {
    if let Some((prefix, bare)) = name.split_once(':') {
        if prefix == core_scope {
            return bare.to_string();
        }
        return name.to_string();
    }
    if scope.is_empty() || scope == core_scope {
        name.to_string()
    } else {
        format!("{scope}:{name}")
    }
}

/// Splits `scope:name`; bare names belong to the core scope.
pub fn split_identifier<'a>(core_scope: &'a str, identifier: &'a str) -> (&'a str, &'a str) {
    match identifier.split_once(':') {
        Some((scope, name)) => (scope, name),
        None => (core_scope, identifier),
    }
}

/// Rewrites shorthand forms of one primary-type entry in place.
///
/// Every subtype inherits the entry `base`, every template inherits the
/// subtype `base`, string templates become `{ "animation": .. }` and terrain
/// name arrays become flag strings.
pub fn normalize_object_entry(entry: &mut Value) {
    let base = entry.get("base").cloned().unwrap_or(Value::Null);
    let Some(subtypes) = entry.get_mut("subtypes").and_then(Value::as_object_mut) else {
        return;
    };
    for (identifier, subtype) in subtypes.iter_mut() {
        if subtype.is_null() {
            *subtype = Value::Object(JsonMap::new());
        }
        inherit(subtype, &base);
        let template_base = subtype.get("base").cloned().unwrap_or(Value::Null);
        let Some(templates) = subtype.get_mut("templates").and_then(Value::as_array_mut) else {
            continue;
        };
        for template in templates.iter_mut() {
            normalize_template(identifier, template);
            inherit(template, &template_base);
        }
    }
}

pub(crate) fn normalize_template(owner: &str, template: &mut Value) {
    if let Value::String(animation) = template {
        let mut map = JsonMap::new();
        map.insert("animation".to_string(), Value::String(animation.clone()));
        *template = Value::Object(map);
    }
    if let Some(map) = template.as_object_mut() {
        for field in ["allowedTerrains", "menuTerrains"] {
            if let Some(value) = map.get_mut(field) {
                if let Some(flags) = terrain_names_to_flags(owner, value) {
                    *value = Value::String(flags);
                }
            }
        }
    }
}

fn terrain_names_to_flags(owner: &str, value: &Value) -> Option<String> {
    let names = value.as_array()?;
    let mut flags = Vec::with_capacity(names.len());
    for name in names.iter().filter_map(Value::as_str) {
        match TerrainType::from_name(name) {
            Some(terrain) => flags.push(terrain.name().to_ascii_uppercase()),
            None => warn!(
                target: "objects::config",
                owner,
                terrain = name,
                "template.unknown_terrain"
            ),
        }
    }
    Some(flags.join(" | "))
}
