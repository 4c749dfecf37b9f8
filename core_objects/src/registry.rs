//! Registry of every placeable object kind, keyed by (primary, secondary) id.
//!
//! Content flows in through [`TypeRegistry::load_object`] and friends during
//! a load cycle, legacy data is migrated through
//! [`TypeRegistry::load_legacy_data`], and
//! [`TypeRegistry::after_load_finalization`] closes the cycle. Afterwards the
//! registry is read-mostly.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use bevy::prelude::Resource;
use serde::Deserialize;
use serde_json::{Map as JsonMap, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use object_schema::{LegacyDefInfo, ObjectKey, ObjectTypeId, SubtypeId};

use crate::config_tree::{inherit, merge, normalize_identifier, normalize_object_entry};
use crate::container::ObjectContainer;
use crate::content_config::RegistryConfig;
use crate::handler::{FinalizationContext, HandlerError, HandlerPhase, TypeHandler};
use crate::kinds;
use crate::legacy::{fold_records, overlay_fragment, LegacyNames, LegacyState};

/// Factory producing a fresh, unbound handler of one kind.
pub type HandlerConstructor = Box<dyn Fn() -> Box<dyn TypeHandler> + Send + Sync>;

/// Highest primary id content or a payload may pin.
pub const MAX_OBJECT_TYPE_ID: u32 = u16::MAX as u32;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("object `{scope}:{name}` uses unknown handler `{handler}`")]
    UnknownHandler {
        scope: String,
        name: String,
        handler: String,
    },
    #[error("malformed object entry `{identifier}` in scope `{scope}`: {reason}")]
    MalformedEntry {
        scope: String,
        identifier: String,
        reason: String,
    },
    #[error("no object type registered under id {id}")]
    UnknownObject { id: ObjectTypeId },
    #[error("object `{identifier}` rejected its configuration: {source}")]
    Handler {
        identifier: String,
        #[source]
        source: HandlerError,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RegistryPhase {
    #[default]
    Loading,
    Finalized,
}

/// Outcome of [`TypeRegistry::load_content`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentLoadReport {
    pub loaded: usize,
    pub skipped: usize,
}

/// Typed view of one primary-type entry.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ContainerEntry {
    name: Option<String>,
    handler_name: Option<String>,
    base: Option<Value>,
    allowed_by_default: Option<bool>,
    subtypes: JsonMap<String, Value>,
}

#[derive(Resource)]
pub struct TypeRegistry {
    objects: BTreeMap<ObjectTypeId, ObjectContainer>,
    handler_constructors: BTreeMap<String, HandlerConstructor>,
    legacy: LegacyState,
    phase: RegistryPhase,
    config: RegistryConfig,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("objects", &self.objects)
            .field(
                "handler_constructors",
                &self.handler_constructors.keys().collect::<Vec<_>>(),
            )
            .field("phase", &self.phase)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Registry with the built-in handler kinds.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        let mut registry = Self::empty(config);
        for (name, constructor) in kinds::builtin_handlers() {
            registry
                .handler_constructors
                .insert(name.to_string(), constructor);
        }
        registry
    }

    /// Registry with an empty factory table.
    pub fn empty(config: RegistryConfig) -> Self {
        Self {
            objects: BTreeMap::new(),
            handler_constructors: BTreeMap::new(),
            legacy: LegacyState::default(),
            phase: RegistryPhase::Loading,
            config,
        }
    }

    pub fn with_handler<H, F>(mut self, name: &str, constructor: F) -> Self
    where
        H: TypeHandler + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.register_handler(name, constructor);
        self
    }

    /// Adds a handler kind to the factory table. Must happen before content
    /// naming it is loaded.
    pub fn register_handler<H, F>(&mut self, name: &str, constructor: F)
    where
        H: TypeHandler + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let replaced = self
            .handler_constructors
            .insert(name.to_string(), kinds::boxed(constructor))
            .is_some();
        debug!(
            target: "objects::registry",
            handler = name,
            replaced,
            "handler_kind.registered"
        );
    }

    pub fn has_handler_kind(&self, name: &str) -> bool {
        self.handler_constructors.contains_key(name)
    }

    pub fn handler_kinds(&self) -> impl Iterator<Item = &str> + '_ {
        self.handler_constructors.keys().map(String::as_str)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn phase(&self) -> RegistryPhase {
        self.phase
    }

    /// Creates or extends a primary type; its id is the existing one or the
    /// lowest free id.
    pub fn load_object(
        &mut self,
        scope: &str,
        name: &str,
        data: &Value,
    ) -> Result<ObjectTypeId, RegistryError> {
        self.load_container(scope, name, data, None)
    }

    /// Same as [`load_object`](Self::load_object) with the primary id pinned
    /// to `index`.
    pub fn load_object_at(
        &mut self,
        scope: &str,
        name: &str,
        data: &Value,
        index: u32,
    ) -> Result<ObjectTypeId, RegistryError> {
        self.load_container(scope, name, data, Some(ObjectTypeId(index)))
    }

    fn load_container(
        &mut self,
        scope: &str,
        name: &str,
        data: &Value,
        pinned: Option<ObjectTypeId>,
    ) -> Result<ObjectTypeId, RegistryError> {
        self.note_mutation("load_object");
        let identifier = normalize_identifier(&self.config.core_scope, scope, name);
        let entry: ContainerEntry = serde_json::from_value(data.clone()).map_err(|err| {
            RegistryError::MalformedEntry {
                scope: scope.to_string(),
                identifier: identifier.clone(),
                reason: err.to_string(),
            }
        })?;

        let registered = self.object_id(&identifier);
        if let Some(pin) = pinned {
            if pin.0 > MAX_OBJECT_TYPE_ID {
                return Err(RegistryError::MalformedEntry {
                    scope: scope.to_string(),
                    identifier,
                    reason: format!("index {pin} exceeds {MAX_OBJECT_TYPE_ID}"),
                });
            }
            if let Some(existing) = registered.filter(|existing| *existing != pin) {
                return Err(RegistryError::MalformedEntry {
                    scope: scope.to_string(),
                    identifier,
                    reason: format!("index {pin} conflicts with registered id {existing}"),
                });
            }
        }
        let id = pinned
            .or(registered)
            .unwrap_or_else(|| self.next_free_object_id());

        let extends = self
            .objects
            .get(&id)
            .is_some_and(|existing| existing.identifier == identifier);
        let mut displaced = None;
        if extends {
            let existing = &self.objects[&id];
            if let Some(handler) = entry.handler_name.as_deref() {
                if handler != existing.handler_name {
                    return Err(RegistryError::MalformedEntry {
                        scope: scope.to_string(),
                        identifier,
                        reason: format!(
                            "handlerName `{handler}` conflicts with `{}`",
                            existing.handler_name
                        ),
                    });
                }
            }
        } else {
            let handler = entry.handler_name.as_deref().ok_or_else(|| {
                RegistryError::MalformedEntry {
                    scope: scope.to_string(),
                    identifier: identifier.clone(),
                    reason: "missing handlerName".to_string(),
                }
            })?;
            if !self.handler_constructors.contains_key(handler) {
                return Err(RegistryError::UnknownHandler {
                    scope: scope.to_string(),
                    name: name.to_string(),
                    handler: handler.to_string(),
                });
            }
            let container = ObjectContainer::new(id, &identifier, handler);
            displaced = self.objects.insert(id, container);
        }

        let ContainerEntry {
            name: display_name,
            base,
            allowed_by_default,
            subtypes,
            ..
        } = entry;
        if let Some(container) = self.objects.get_mut(&id) {
            if let Some(display_name) = display_name {
                container.name = display_name;
            }
            if let Some(base) = base {
                merge(&mut container.base, &base);
            }
            if let Some(allowed) = allowed_by_default {
                container.allowed_by_default = allowed;
            }
        }

        let (pinned_subtypes, free_subtypes): (Vec<_>, Vec<_>) = subtypes
            .iter()
            .partition(|(_, config)| config.get("index").is_some());
        for (sub_name, config) in pinned_subtypes.into_iter().chain(free_subtypes) {
            if let Err(err) = self.load_entry(scope, sub_name, config, id, None) {
                if !extends {
                    self.objects.remove(&id);
                    if let Some(previous) = displaced {
                        self.objects.insert(id, previous);
                    }
                }
                return Err(err);
            }
        }

        if let Some(previous) = displaced {
            warn!(
                target: "objects::registry",
                id = %id,
                previous = %previous.identifier,
                identifier = %identifier,
                "object_container.overwritten"
            );
        }

        info!(
            target: "objects::registry",
            scope,
            identifier = %identifier,
            id = %id,
            extended = extends,
            subtypes = self.objects.get(&id).map_or(0, ObjectContainer::len),
            "object_container.loaded"
        );
        Ok(id)
    }

    /// Adds or overwrites one subtype of an existing primary type. Without
    /// `subid` the subtype's `index` field pins the id, otherwise the lowest
    /// free id is used.
    pub fn load_sub_object(
        &mut self,
        identifier: &str,
        config: &Value,
        id: ObjectTypeId,
        subid: Option<SubtypeId>,
    ) -> Result<SubtypeId, RegistryError> {
        self.note_mutation("load_sub_object");
        let scope = self.config.core_scope.clone();
        self.load_entry(&scope, identifier, config, id, subid)
    }

    fn load_entry(
        &mut self,
        scope: &str,
        name: &str,
        config: &Value,
        id: ObjectTypeId,
        subid: Option<SubtypeId>,
    ) -> Result<SubtypeId, RegistryError> {
        let container = self
            .objects
            .get(&id)
            .ok_or(RegistryError::UnknownObject { id })?;
        let sub_identifier = normalize_identifier(&self.config.core_scope, scope, name);
        let qualified = format!("{}.{}", container.identifier, sub_identifier);

        let mut config = if config.is_null() {
            Value::Object(JsonMap::new())
        } else {
            config.clone()
        };
        inherit(&mut config, &container.base);

        let pinned = match subid {
            Some(subid) => Some(subid),
            None => match config.get("index") {
                None | Some(Value::Null) => None,
                Some(index) => Some(
                    index
                        .as_u64()
                        .and_then(|raw| u32::try_from(raw).ok())
                        .map(SubtypeId)
                        .ok_or_else(|| RegistryError::MalformedEntry {
                            scope: scope.to_string(),
                            identifier: qualified.clone(),
                            reason: format!("invalid index {index}"),
                        })?,
                ),
            },
        };

        if let Some(existing) = container.subtype_id(&sub_identifier) {
            if pinned.map_or(true, |pinned| pinned == existing) {
                return self.extend_entry(id, existing, &config, qualified);
            }
        }

        let subid = pinned.unwrap_or_else(|| container.next_free_subtype_id());
        let key = ObjectKey { id, subid };
        let type_identifier = container.identifier.clone();
        let handler_name = container.handler_name.clone();
        let constructor = self.handler_constructors.get(&handler_name).ok_or_else(|| {
            RegistryError::UnknownHandler {
                scope: scope.to_string(),
                name: type_identifier.clone(),
                handler: handler_name.clone(),
            }
        })?;

        let mut handler = constructor();
        let handler_error = |source| RegistryError::Handler {
            identifier: qualified.clone(),
            source,
        };
        handler.set_type(key).map_err(handler_error)?;
        handler.set_type_name(&type_identifier, &sub_identifier);
        let custom_name = self.legacy.custom_name(key).map(str::to_string);
        handler
            .init(&config, custom_name.as_deref())
            .map_err(handler_error)?;
        if handler.templates().is_empty() {
            for template in self.legacy.take_templates(key) {
                handler.add_template(template);
            }
        }

        let templates = handler.templates().len();
        if let Some(container) = self.objects.get_mut(&id) {
            if container
                .insert_handler(subid, Some(&sub_identifier), handler)
                .is_some()
            {
                warn!(
                    target: "objects::registry",
                    key = %key,
                    identifier = %qualified,
                    "object_handler.overwritten"
                );
            }
        }
        debug!(
            target: "objects::registry",
            key = %key,
            identifier = %qualified,
            templates,
            "object_handler.loaded"
        );
        Ok(subid)
    }

    fn extend_entry(
        &mut self,
        id: ObjectTypeId,
        subid: SubtypeId,
        config: &Value,
        qualified: String,
    ) -> Result<SubtypeId, RegistryError> {
        let Some(handler) = self
            .objects
            .get_mut(&id)
            .and_then(|container| container.handler_mut(subid))
        else {
            return Err(RegistryError::UnknownObject { id });
        };
        handler
            .init(config, None)
            .map_err(|source| RegistryError::Handler {
                identifier: qualified.clone(),
                source,
            })?;
        debug!(
            target: "objects::registry",
            key = %ObjectKey { id, subid },
            identifier = %qualified,
            "object_handler.extended"
        );
        Ok(subid)
    }

    /// Deletes a subtype and its name entry. Returns whether anything was
    /// removed.
    pub fn remove_sub_object(&mut self, id: ObjectTypeId, subid: SubtypeId) -> bool {
        self.note_mutation("remove_sub_object");
        let removed = self
            .objects
            .get_mut(&id)
            .and_then(|container| container.remove(subid))
            .is_some();
        if removed {
            debug!(
                target: "objects::registry",
                key = %ObjectKey { id, subid },
                "object_handler.removed"
            );
        }
        removed
    }

    /// Rewrites shorthand forms of a raw entry before it is validated.
    pub fn before_validate(&self, config: &mut Value) {
        normalize_object_entry(config);
    }

    /// Runs every pending handler's finalization hook once, with the whole
    /// load cycle visible. Returns how many handlers were finalized.
    pub fn after_load_finalization(&mut self) -> usize {
        let mut context = FinalizationContext::default();
        for container in self.objects.values() {
            for subid in container.subtype_ids() {
                context.insert("", "", ObjectKey::new(container.id.0, subid.0));
            }
            for (sub_identifier, subid) in container.sub_identifiers() {
                context.insert(
                    &container.identifier,
                    sub_identifier,
                    ObjectKey {
                        id: container.id,
                        subid: *subid,
                    },
                );
            }
        }

        let mut finalized = 0;
        for container in self.objects.values_mut() {
            for (_, handler) in container.handlers_mut() {
                if handler.core().phase() == HandlerPhase::Finalized {
                    continue;
                }
                handler.after_load_finalization(&context);
                handler.core_mut().mark_finalized();
                finalized += 1;
            }
        }

        self.phase = RegistryPhase::Finalized;
        if self.config.discard_legacy_on_finalize {
            self.legacy.clear();
        }
        info!(
            target: "objects::registry",
            containers = self.objects.len(),
            handlers = context.len(),
            finalized,
            "registry.finalized"
        );
        finalized
    }

    /// Whether each primary id is enabled by default, indexed by id. Ids
    /// without a container report `false`.
    pub fn default_allowed(&self) -> Vec<bool> {
        let Some(last) = self.objects.keys().next_back() else {
            return Vec::new();
        };
        let mut allowed = vec![false; last.0 as usize + 1];
        for container in self.objects.values() {
            allowed[container.id.0 as usize] = container.allowed_by_default;
        }
        allowed
    }

    pub fn known_objects(&self) -> BTreeSet<ObjectTypeId> {
        self.objects.keys().copied().collect()
    }

    /// Subtype ids of `id`; empty for unknown ids.
    pub fn known_sub_objects(&self, id: ObjectTypeId) -> BTreeSet<SubtypeId> {
        self.objects
            .get(&id)
            .map(ObjectContainer::subtype_ids)
            .unwrap_or_default()
    }

    pub fn handler_for(&self, id: ObjectTypeId, subid: SubtypeId) -> Option<&dyn TypeHandler> {
        self.objects
            .get(&id)
            .and_then(|container| container.handler(subid))
    }

    pub fn handler_for_key(&self, key: ObjectKey) -> Option<&dyn TypeHandler> {
        self.handler_for(key.id, key.subid)
    }

    /// Lookup by string identifiers; core content answers to both `name` and
    /// `core:name`.
    pub fn handler_for_name(&self, type_name: &str, sub_type_name: &str) -> Option<&dyn TypeHandler> {
        let core = &self.config.core_scope;
        let container = self.container(self.object_id(&normalize_identifier(core, "", type_name))?)?;
        container.handler_by_name(&normalize_identifier(core, "", sub_type_name))
    }

    pub fn object_id(&self, identifier: &str) -> Option<ObjectTypeId> {
        let identifier = normalize_identifier(&self.config.core_scope, "", identifier);
        self.objects
            .values()
            .find(|container| container.identifier == identifier)
            .map(ObjectContainer::id)
    }

    pub fn object_name(&self, id: ObjectTypeId) -> Option<&str> {
        self.objects.get(&id).map(ObjectContainer::name)
    }

    /// Custom name of the subtype, falling back to the primary type's name.
    pub fn sub_object_name(&self, id: ObjectTypeId, subid: SubtypeId) -> Option<&str> {
        let container = self.objects.get(&id)?;
        let handler = container.handler(subid)?;
        Some(handler.custom_name().unwrap_or(container.name()))
    }

    pub fn object_handler_name(&self, id: ObjectTypeId) -> Option<&str> {
        self.objects.get(&id).map(ObjectContainer::handler_name)
    }

    pub fn container(&self, id: ObjectTypeId) -> Option<&ObjectContainer> {
        self.objects.get(&id)
    }

    pub fn containers(&self) -> impl Iterator<Item = &ObjectContainer> + '_ {
        self.objects.values()
    }

    /// Folds legacy appearance records into the migration multimap and
    /// returns one configuration fragment per primary slot below
    /// `data_size`. Fragments are also kept for [`load_content`] entries that
    /// pin a slot with `index`.
    ///
    /// [`load_content`]: Self::load_content
    pub fn load_legacy_data(
        &mut self,
        records: &[LegacyDefInfo],
        names: LegacyNames,
        data_size: usize,
    ) -> Vec<Value> {
        self.note_mutation("load_legacy_data");
        let summary = fold_records(&mut self.legacy, records);
        info!(
            target: "objects::legacy",
            records = records.len(),
            added = summary.added,
            merged = summary.merged,
            duplicates = summary.duplicates,
            skipped = summary.skipped,
            "legacy.templates_merged"
        );
        self.legacy.set_names(names);
        let fragments = self.legacy.build_fragments(data_size);
        debug!(
            target: "objects::legacy",
            fragments = fragments.len(),
            fallback_templates = self.legacy.template_count(),
            "legacy.fragments_built"
        );
        fragments
    }

    /// Loads every `{ name: entry }` of a content document. Entries with an
    /// `index` are loaded first at that id, on top of the matching legacy
    /// fragment. An unknown handler aborts the document; other bad entries
    /// are skipped and counted.
    pub fn load_content(
        &mut self,
        scope: &str,
        document: &Value,
    ) -> Result<ContentLoadReport, RegistryError> {
        let entries = document
            .as_object()
            .ok_or_else(|| RegistryError::MalformedEntry {
                scope: scope.to_string(),
                identifier: String::new(),
                reason: "content document must be an object".to_string(),
            })?;

        let (pinned, free): (Vec<_>, Vec<_>) = entries
            .iter()
            .partition(|(_, entry)| entry.get("index").is_some());

        let mut report = ContentLoadReport::default();
        for (name, entry) in pinned.into_iter().chain(free) {
            let result = match entry.get("index") {
                Some(index) => match index.as_u64().and_then(|raw| u32::try_from(raw).ok()) {
                    Some(index) => {
                        let fragment = self.legacy.take_fragment(index as usize);
                        let mut merged = match &fragment {
                            Some(fragment) => overlay_fragment(fragment.clone(), entry),
                            None => entry.clone(),
                        };
                        self.before_validate(&mut merged);
                        let loaded = self.load_object_at(scope, name, &merged, index);
                        if let (Err(_), Some(fragment)) = (&loaded, fragment) {
                            self.legacy.restore_fragment(index as usize, fragment);
                        }
                        loaded
                    }
                    None => Err(RegistryError::MalformedEntry {
                        scope: scope.to_string(),
                        identifier: name.clone(),
                        reason: format!("invalid index {index}"),
                    }),
                },
                None => {
                    let mut entry = entry.clone();
                    self.before_validate(&mut entry);
                    self.load_object(scope, name, &entry)
                }
            };
            match result {
                Ok(_) => report.loaded += 1,
                Err(err @ RegistryError::UnknownHandler { .. }) => return Err(err),
                Err(err) => {
                    warn!(
                        target: "objects::registry",
                        scope,
                        entry = %name,
                        error = %err,
                        "object_container.skipped"
                    );
                    report.skipped += 1;
                }
            }
        }
        Ok(report)
    }

    /// Drops every container and all migration state; the factory table
    /// stays.
    pub fn reset(&mut self) {
        self.objects.clear();
        self.legacy.clear();
        self.phase = RegistryPhase::Loading;
        debug!(target: "objects::registry", "registry.reset");
    }

    pub(crate) fn constructor(&self, handler_name: &str) -> Option<&HandlerConstructor> {
        self.handler_constructors.get(handler_name)
    }

    pub(crate) fn insert_container(&mut self, container: ObjectContainer) {
        self.note_mutation("decode");
        self.objects.insert(container.id, container);
    }

    fn next_free_object_id(&self) -> ObjectTypeId {
        let mut candidate = 0;
        for used in self.objects.keys() {
            if used.0 != candidate {
                break;
            }
            candidate += 1;
        }
        ObjectTypeId(candidate)
    }

    fn note_mutation(&mut self, operation: &'static str) {
        if self.phase == RegistryPhase::Finalized {
            warn!(
                target: "objects::registry",
                operation,
                "registry.mutated_after_finalization"
            );
            self.phase = RegistryPhase::Loading;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn creature_entry() -> Value {
        json!({
            "name": "Creature",
            "handlerName": "generic",
            "subtypes": {
                "peasant": { "templates": [ "AVWpeas0" ] },
                "archer": { "index": 3, "templates": [ "AVWarch0" ] }
            }
        })
    }

    #[test]
    fn pinned_subtypes_are_placed_before_auto_assignment() {
        let mut registry = TypeRegistry::new();
        let id = registry
            .load_object_at("core", "creature", &creature_entry(), 10)
            .unwrap();
        assert_eq!(id, ObjectTypeId(10));
        assert_eq!(
            registry.known_sub_objects(id),
            BTreeSet::from([SubtypeId(0), SubtypeId(3)])
        );
        let archer = registry.handler_for(id, SubtypeId(3)).unwrap();
        assert_eq!(archer.core().sub_type_name(), "archer");
        assert_eq!(archer.core().type_name(), "creature");
        assert_eq!(archer.key(), Some(ObjectKey::new(10, 3)));
    }

    #[test]
    fn unindexed_objects_take_lowest_free_id() {
        let mut registry = TypeRegistry::new();
        registry
            .load_object_at("core", "creature", &creature_entry(), 1)
            .unwrap();
        let entry = json!({ "handlerName": "static", "subtypes": { "oak": {} } });
        assert_eq!(
            registry.load_object("core", "tree", &entry).unwrap(),
            ObjectTypeId(0)
        );
        assert_eq!(
            registry.load_object("core", "rock", &entry).unwrap(),
            ObjectTypeId(2)
        );
    }

    #[test]
    fn unknown_handler_names_the_entry() {
        let mut registry = TypeRegistry::new();
        let err = registry
            .load_object("wog", "portal", &json!({ "handlerName": "teleport" }))
            .unwrap_err();
        match err {
            RegistryError::UnknownHandler {
                scope,
                name,
                handler,
            } => {
                assert_eq!(scope, "wog");
                assert_eq!(name, "portal");
                assert_eq!(handler, "teleport");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(registry.known_objects().is_empty());
    }

    #[test]
    fn extending_keeps_id_and_rejects_other_handler() {
        let mut registry = TypeRegistry::new();
        let id = registry
            .load_object("core", "creature", &creature_entry())
            .unwrap();
        let extension = json!({ "subtypes": { "pikeman": {} } });
        assert_eq!(
            registry.load_object("core", "core:creature", &extension).unwrap(),
            id
        );
        assert_eq!(registry.known_sub_objects(id).len(), 3);
        assert!(registry.handler_for_name("creature", "pikeman").is_some());

        let conflicting = json!({ "handlerName": "town" });
        assert!(matches!(
            registry.load_object("core", "creature", &conflicting),
            Err(RegistryError::MalformedEntry { .. })
        ));
    }

    #[test]
    fn mod_scope_prefixes_identifiers() {
        let mut registry = TypeRegistry::new();
        let id = registry
            .load_object("wog", "creature", &creature_entry())
            .unwrap();
        assert_eq!(registry.container(id).unwrap().identifier(), "wog:creature");
        assert!(registry.handler_for_name("wog:creature", "wog:archer").is_some());
        assert!(registry.handler_for_name("creature", "archer").is_none());
    }

    #[test]
    fn rejected_new_container_is_rolled_back() {
        let mut registry = TypeRegistry::new();
        let entry = json!({ "handlerName": "resource", "subtypes": { "nothing": {} } });
        assert!(matches!(
            registry.load_object("core", "broken", &entry),
            Err(RegistryError::Handler { .. })
        ));
        assert!(registry.known_objects().is_empty());
    }

    #[test]
    fn failed_overwrite_restores_displaced_container() {
        let mut registry = TypeRegistry::new();
        let well = json!({ "handlerName": "generic", "subtypes": { "well": {} } });
        registry.load_object_at("core", "well", &well, 5).unwrap();

        let broken = json!({ "handlerName": "resource", "subtypes": { "nothing": {} } });
        assert!(matches!(
            registry.load_object_at("core", "broken", &broken, 5),
            Err(RegistryError::Handler { .. })
        ));
        assert_eq!(registry.object_id("well"), Some(ObjectTypeId(5)));
        assert!(registry.object_id("broken").is_none());
        let handler = registry.handler_for(ObjectTypeId(5), SubtypeId(0)).unwrap();
        assert_eq!(handler.core().type_name(), "well");
    }

    #[test]
    fn pinning_a_registered_identifier_elsewhere_is_rejected() {
        let mut registry = TypeRegistry::new();
        let first = registry
            .load_object("core", "creature", &creature_entry())
            .unwrap();
        let err = registry
            .load_object_at("core", "creature", &creature_entry(), 10)
            .unwrap_err();
        match err {
            RegistryError::MalformedEntry { identifier, reason, .. } => {
                assert_eq!(identifier, "creature");
                assert!(reason.contains("conflicts"), "{reason}");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(registry.known_objects(), BTreeSet::from([first]));

        // pinning the id it already holds still extends it
        let extra = json!({ "subtypes": { "zombie": {} } });
        let extended = registry
            .load_object_at("core", "creature", &extra, first.0)
            .unwrap();
        assert_eq!(extended, first);
        assert_eq!(registry.known_sub_objects(first).len(), 3);
    }

    #[test]
    fn pinned_ids_are_bounded() {
        let mut registry = TypeRegistry::new();
        assert!(matches!(
            registry.load_object_at("core", "far", &creature_entry(), u32::MAX),
            Err(RegistryError::MalformedEntry { .. })
        ));
        let document = json!({
            "far": { "index": MAX_OBJECT_TYPE_ID + 1, "handlerName": "generic" }
        });
        let report = registry.load_content("core", &document).unwrap();
        assert_eq!(report.skipped, 1);
        assert!(registry.default_allowed().is_empty());

        registry
            .load_object_at("core", "edge", &creature_entry(), MAX_OBJECT_TYPE_ID)
            .unwrap();
        assert_eq!(registry.default_allowed().len(), MAX_OBJECT_TYPE_ID as usize + 1);
    }

    #[test]
    fn load_sub_object_requires_container() {
        let mut registry = TypeRegistry::new();
        assert!(matches!(
            registry.load_sub_object("ghost", &json!({}), ObjectTypeId(4), None),
            Err(RegistryError::UnknownObject { id: ObjectTypeId(4) })
        ));
    }

    #[test]
    fn mutation_after_finalization_reopens_loading() {
        let mut registry = TypeRegistry::new();
        let id = registry
            .load_object("core", "creature", &creature_entry())
            .unwrap();
        assert_eq!(registry.after_load_finalization(), 2);
        assert_eq!(registry.phase(), RegistryPhase::Finalized);

        registry
            .load_sub_object("zombie", &json!({}), id, None)
            .unwrap();
        assert_eq!(registry.phase(), RegistryPhase::Loading);
        assert_eq!(registry.after_load_finalization(), 1);
    }

    #[test]
    fn default_allowed_covers_gaps() {
        let mut registry = TypeRegistry::new();
        let mut hidden = creature_entry();
        hidden["allowedByDefault"] = json!(false);
        registry
            .load_object_at("core", "creature", &creature_entry(), 0)
            .unwrap();
        registry.load_object_at("core", "hidden", &hidden, 2).unwrap();
        assert_eq!(registry.default_allowed(), vec![true, false, false]);
    }

    #[test]
    fn reset_keeps_factory_table() {
        let mut registry = TypeRegistry::new();
        registry
            .load_object("core", "creature", &creature_entry())
            .unwrap();
        registry.reset();
        assert!(registry.known_objects().is_empty());
        assert!(registry.has_handler_kind("generic"));
    }
}
