use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use object_schema::{ObjectTypeId, SubtypeId};

use crate::handler::TypeHandler;

/// All handlers sharing one primary type id.
#[derive(Debug)]
pub struct ObjectContainer {
    pub(crate) id: ObjectTypeId,
    pub(crate) identifier: String,
    pub(crate) name: String,
    pub(crate) handler_name: String,
    pub(crate) base: Value,
    pub(crate) allowed_by_default: bool,
    sub_objects: BTreeMap<SubtypeId, Box<dyn TypeHandler>>,
    sub_ids: BTreeMap<String, SubtypeId>,
}

impl ObjectContainer {
    pub(crate) fn new(id: ObjectTypeId, identifier: &str, handler_name: &str) -> Self {
        Self {
            id,
            identifier: identifier.to_string(),
            name: String::new(),
            handler_name: handler_name.to_string(),
            base: Value::Null,
            allowed_by_default: true,
            sub_objects: BTreeMap::new(),
            sub_ids: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> ObjectTypeId {
        self.id
    }

    /// Normalized string identifier; empty for payloads older than 759.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    pub fn base(&self) -> &Value {
        &self.base
    }

    pub fn allowed_by_default(&self) -> bool {
        self.allowed_by_default
    }

    pub fn handler(&self, subid: SubtypeId) -> Option<&dyn TypeHandler> {
        self.sub_objects.get(&subid).map(|handler| handler.as_ref())
    }

    pub(crate) fn handler_mut(&mut self, subid: SubtypeId) -> Option<&mut Box<dyn TypeHandler>> {
        self.sub_objects.get_mut(&subid)
    }

    pub fn subtype_id(&self, identifier: &str) -> Option<SubtypeId> {
        self.sub_ids.get(identifier).copied()
    }

    pub fn handler_by_name(&self, identifier: &str) -> Option<&dyn TypeHandler> {
        self.subtype_id(identifier)
            .and_then(|subid| self.handler(subid))
    }

    pub fn subtype_ids(&self) -> BTreeSet<SubtypeId> {
        self.sub_objects.keys().copied().collect()
    }

    pub fn sub_identifiers(&self) -> &BTreeMap<String, SubtypeId> {
        &self.sub_ids
    }

    pub fn handlers(&self) -> impl Iterator<Item = (SubtypeId, &dyn TypeHandler)> + '_ {
        self.sub_objects
            .iter()
            .map(|(subid, handler)| (*subid, handler.as_ref()))
    }

    pub(crate) fn handlers_mut(
        &mut self,
    ) -> impl Iterator<Item = (SubtypeId, &mut Box<dyn TypeHandler>)> + '_ {
        self.sub_objects
            .iter_mut()
            .map(|(subid, handler)| (*subid, handler))
    }

    pub fn len(&self) -> usize {
        self.sub_objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sub_objects.is_empty()
    }

    pub fn contains(&self, subid: SubtypeId) -> bool {
        self.sub_objects.contains_key(&subid)
    }

    /// Lowest subtype id with no handler.
    pub fn next_free_subtype_id(&self) -> SubtypeId {
        let mut candidate = 0;
        for used in self.sub_objects.keys() {
            if used.0 != candidate {
                break;
            }
            candidate += 1;
        }
        SubtypeId(candidate)
    }

    /// Stores `handler` at `subid`, returning the handler it replaced. Name
    /// entries still pointing at `subid` are dropped before `identifier` is
    /// recorded.
    pub(crate) fn insert_handler(
        &mut self,
        subid: SubtypeId,
        identifier: Option<&str>,
        handler: Box<dyn TypeHandler>,
    ) -> Option<Box<dyn TypeHandler>> {
        self.sub_ids.retain(|_, mapped| *mapped != subid);
        if let Some(identifier) = identifier {
            self.sub_ids.insert(identifier.to_string(), subid);
        }
        self.sub_objects.insert(subid, handler)
    }

    pub(crate) fn bind_identifier(&mut self, identifier: &str, subid: SubtypeId) {
        self.sub_ids.insert(identifier.to_string(), subid);
    }

    pub(crate) fn remove(&mut self, subid: SubtypeId) -> Option<Box<dyn TypeHandler>> {
        self.sub_ids.retain(|_, mapped| *mapped != subid);
        self.sub_objects.remove(&subid)
    }
}
