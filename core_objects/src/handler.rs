//! The per-kind handler contract.
//!
//! Every object kind implements [`TypeHandler`]. Shared state (identity,
//! templates, random map weights, custom name) lives in [`HandlerCore`] so
//! kinds only add their own data and hooks.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use bitflags::bitflags;
use rand::RngCore;
use serde_json::Value;
use thiserror::Error;

use object_schema::{ObjectKey, ObjectTemplate, RandomMapInfo, TerrainType};

use crate::{
    config_tree::merge,
    instance::{MapObject, ObjectState},
    template::{parse_template, TemplateCatalog},
};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler must be bound to an object type before {operation}")]
    Unbound { operation: &'static str },
    #[error("handler already bound to {existing}, cannot rebind to {requested}")]
    AlreadyBound {
        existing: ObjectKey,
        requested: ObjectKey,
    },
    #[error("missing field `{field}`")]
    MissingField { field: &'static str },
    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("malformed handler configuration: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HandlerPhase {
    #[default]
    Unbound,
    Bound,
    Initialized,
    Finalized,
}

/// State every handler carries regardless of kind.
#[derive(Debug, Clone, Default)]
pub struct HandlerCore {
    key: Option<ObjectKey>,
    type_name: String,
    sub_type_name: String,
    templates: TemplateCatalog,
    rmg_info: RandomMapInfo,
    custom_name: Option<String>,
    template_base: Value,
    phase: HandlerPhase,
}

impl HandlerCore {
    pub fn key(&self) -> Option<ObjectKey> {
        self.key
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn sub_type_name(&self) -> &str {
        &self.sub_type_name
    }

    pub fn templates(&self) -> &TemplateCatalog {
        &self.templates
    }

    pub fn rmg_info(&self) -> &RandomMapInfo {
        &self.rmg_info
    }

    pub fn custom_name(&self) -> Option<&str> {
        self.custom_name.as_deref()
    }

    pub fn phase(&self) -> HandlerPhase {
        self.phase
    }

    pub fn bind(&mut self, key: ObjectKey) -> Result<(), HandlerError> {
        match self.key {
            Some(existing) if existing != key => Err(HandlerError::AlreadyBound {
                existing,
                requested: key,
            }),
            Some(_) => Ok(()),
            None => {
                self.key = Some(key);
                self.phase = HandlerPhase::Bound;
                Ok(())
            }
        }
    }

    pub fn set_names(&mut self, type_name: &str, sub_type_name: &str) {
        self.type_name = type_name.to_string();
        self.sub_type_name = sub_type_name.to_string();
    }

    /// Stamps the handler's key onto the template before storing it.
    pub fn add_template(&mut self, mut template: ObjectTemplate) {
        if let Some(key) = self.key {
            template.key = key;
        }
        self.templates.add(template);
    }

    pub fn add_template_config(&mut self, config: &Value) -> Result<(), HandlerError> {
        let template = parse_template(&self.sub_type_name, config, &self.template_base)?;
        self.add_template(template);
        Ok(())
    }

    /// Applies the fields every kind understands. Repeated calls merge.
    pub(crate) fn apply_generic(
        &mut self,
        input: &Value,
        name: Option<&str>,
    ) -> Result<(), HandlerError> {
        if self.key.is_none() {
            return Err(HandlerError::Unbound { operation: "init" });
        }
        if let Some(base) = input.get("base") {
            merge(&mut self.template_base, base);
        }
        if let Some(rmg) = input.get("rmg") {
            let mut merged = serde_json::to_value(self.rmg_info)?;
            merge(&mut merged, rmg);
            self.rmg_info = serde_json::from_value(merged)?;
        }
        if let Some(templates) = input.get("templates") {
            let entries = templates
                .as_array()
                .ok_or_else(|| HandlerError::InvalidField {
                    field: "templates",
                    reason: "expected an array".to_string(),
                })?;
            for entry in entries {
                self.add_template_config(entry)?;
            }
        }
        if let Some(type_name) = input.get("typeName").and_then(Value::as_str) {
            self.type_name = type_name.to_string();
        }
        if let Some(sub_type_name) = input.get("subTypeName").and_then(Value::as_str) {
            self.sub_type_name = sub_type_name.to_string();
        }
        match input.get("name").and_then(Value::as_str) {
            Some(custom) => self.custom_name = Some(custom.to_string()),
            None => {
                if let Some(custom) = name {
                    self.custom_name = Some(custom.to_string());
                }
            }
        }
        Ok(())
    }

    pub(crate) fn mark_initialized(&mut self) {
        self.phase = HandlerPhase::Initialized;
    }

    pub(crate) fn mark_finalized(&mut self) {
        self.phase = HandlerPhase::Finalized;
    }

    pub(crate) fn restore(&mut self, record: HandlerRecord) {
        self.key = Some(record.key);
        self.type_name = record.type_name;
        self.sub_type_name = record.sub_type_name;
        self.templates.replace_all(record.templates);
        self.rmg_info = record.rmg_info;
        self.custom_name = record.custom_name;
        self.phase = HandlerPhase::Initialized;
    }

    /// Builds an instance carrying identity and appearance, nothing else.
    pub fn new_instance(&self, template: &ObjectTemplate) -> MapObject {
        let mut appearance = template.clone();
        if let Some(key) = self.key {
            appearance.key = key;
        }
        MapObject {
            key: appearance.key,
            type_name: self.type_name.clone(),
            sub_type_name: self.sub_type_name.clone(),
            appearance,
            instance_name: self.custom_name.clone(),
            state: ObjectState::Unconfigured,
        }
    }
}

/// Persisted form of [`HandlerCore`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HandlerRecord {
    pub key: ObjectKey,
    pub templates: Vec<ObjectTemplate>,
    pub rmg_info: RandomMapInfo,
    pub custom_name: Option<String>,
    pub type_name: String,
    pub sub_type_name: String,
}

/// Strength of a guarding army, ordered by total strength first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArmyStructure {
    pub total_strength: u32,
    pub shooters_strength: u32,
    pub flyers_strength: u32,
    pub walkers_strength: u32,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObjectRewards: u16 {
        const RESOURCES = 1 << 0;
        const EXPERIENCE = 1 << 1;
        const MANA = 1 << 2;
        const MOVEMENT = 1 << 3;
        const PRIMARY_SKILLS = 1 << 4;
        const SECONDARY_SKILLS = 1 << 5;
        const ARTIFACTS = 1 << 6;
        const CREATURES = 1 << 7;
        const SPELLS = 1 << 8;
        const BONUSES = 1 << 9;
    }
}

impl Default for ObjectRewards {
    fn default() -> Self {
        ObjectRewards::empty()
    }
}

/// What an object kind may guard with and hand out, independent of any
/// placed instance. Used for content balancing only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectInfo {
    pub min_guards: ArmyStructure,
    pub max_guards: ArmyStructure,
    pub rewards: ObjectRewards,
}

impl ObjectInfo {
    pub fn gives(&self, reward: ObjectRewards) -> bool {
        self.rewards.contains(reward)
    }

    pub fn is_guarded(&self) -> bool {
        self.max_guards.total_strength > 0
    }
}

/// Read-only view of everything loaded in the current cycle, handed to
/// [`TypeHandler::after_load_finalization`].
#[derive(Debug, Clone, Default)]
pub struct FinalizationContext {
    keys: BTreeSet<ObjectKey>,
    identifiers: BTreeMap<(String, String), ObjectKey>,
}

impl FinalizationContext {
    pub(crate) fn insert(&mut self, type_identifier: &str, sub_identifier: &str, key: ObjectKey) {
        self.keys.insert(key);
        if !type_identifier.is_empty() && !sub_identifier.is_empty() {
            self.identifiers.insert(
                (type_identifier.to_string(), sub_identifier.to_string()),
                key,
            );
        }
    }

    pub fn contains(&self, key: ObjectKey) -> bool {
        self.keys.contains(&key)
    }

    pub fn resolve(&self, type_identifier: &str, sub_identifier: &str) -> Option<ObjectKey> {
        self.identifiers
            .get(&(type_identifier.to_string(), sub_identifier.to_string()))
            .copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = ObjectKey> + '_ {
        self.keys.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Behaviour of one object kind.
///
/// Lifecycle: bound with [`set_type`](TypeHandler::set_type), configured by
/// one or more [`init`](TypeHandler::init) calls, finalized once by the
/// registry, then used to create and configure map objects.
pub trait TypeHandler: fmt::Debug + Send + Sync {
    fn core(&self) -> &HandlerCore;

    fn core_mut(&mut self) -> &mut HandlerCore;

    /// Creates an object and stamps identity and appearance only. No random
    /// or map-dependent setup happens here so objects can exist before a map
    /// or seed does.
    fn create(&self, template: &ObjectTemplate) -> MapObject;

    /// Performs the remaining setup, randomized parts included. Calling it on
    /// an already configured object replaces the previous state.
    fn configure_object(&self, object: &mut MapObject, rng: &mut dyn RngCore);

    /// Capability descriptor, `None` when the kind exposes no metadata.
    fn object_info(&self, template: &ObjectTemplate) -> Option<ObjectInfo>;

    /// Kind-specific part of [`init`](TypeHandler::init).
    fn init_type_data(&mut self, _input: &Value) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Whether `template` is the preferred appearance for `object`.
    fn object_filter(&self, _object: &MapObject, _template: &ObjectTemplate) -> bool {
        false
    }

    /// Occupies map space without being interactive.
    fn is_static_object(&self) -> bool {
        false
    }

    /// Runs once after every handler of the load cycle finished `init`.
    fn after_load_finalization(&mut self, _context: &FinalizationContext) {}

    fn encode_kind_data(&self) -> Value {
        Value::Null
    }

    fn decode_kind_data(&mut self, _data: &Value) -> Result<(), HandlerError> {
        Ok(())
    }

    fn set_type(&mut self, key: ObjectKey) -> Result<(), HandlerError> {
        self.core_mut().bind(key)
    }

    fn set_type_name(&mut self, type_name: &str, sub_type_name: &str) {
        self.core_mut().set_names(type_name, sub_type_name);
    }

    /// Loads generic fields, then hands the same input to
    /// [`init_type_data`](TypeHandler::init_type_data). `name` is used when
    /// the input carries no `name` of its own.
    fn init(&mut self, input: &Value, name: Option<&str>) -> Result<(), HandlerError> {
        self.core_mut().apply_generic(input, name)?;
        self.init_type_data(input)?;
        self.core_mut().mark_initialized();
        Ok(())
    }

    fn add_template(&mut self, template: ObjectTemplate) {
        self.core_mut().add_template(template);
    }

    fn templates(&self) -> &[ObjectTemplate] {
        self.core().templates().all()
    }

    fn templates_for(&self, terrain: TerrainType) -> Vec<ObjectTemplate> {
        self.core().templates().for_terrain(terrain)
    }

    /// Preferred template for `object` on `terrain`. Advisory only: the
    /// object's appearance is left untouched.
    fn override_for(&self, terrain: TerrainType, object: &MapObject) -> Option<ObjectTemplate> {
        self.core()
            .templates()
            .preferred(terrain, |template| self.object_filter(object, template))
    }

    fn rmg_info(&self) -> &RandomMapInfo {
        self.core().rmg_info()
    }

    fn custom_name(&self) -> Option<&str> {
        self.core().custom_name()
    }

    fn key(&self) -> Option<ObjectKey> {
        self.core().key()
    }
}
