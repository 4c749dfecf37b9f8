use std::sync::{Arc, Mutex};

use core_objects::{
    FinalizationContext, HandlerCore, MapObject, ObjectInfo, ObjectKey, ObjectState,
    ObjectTemplate, RegistryPhase, TypeHandler, TypeRegistry,
};
use rand::RngCore;
use serde_json::json;

type Journal = Arc<Mutex<Vec<(ObjectKey, usize, bool)>>>;

/// Records every finalization call together with what it could see.
#[derive(Debug)]
struct RecordingHandler {
    core: HandlerCore,
    journal: Journal,
}

impl TypeHandler for RecordingHandler {
    fn core(&self) -> &HandlerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut HandlerCore {
        &mut self.core
    }

    fn create(&self, template: &ObjectTemplate) -> MapObject {
        self.core.new_instance(template)
    }

    fn configure_object(&self, object: &mut MapObject, _rng: &mut dyn RngCore) {
        object.state = ObjectState::Plain;
    }

    fn object_info(&self, _template: &ObjectTemplate) -> Option<ObjectInfo> {
        None
    }

    fn after_load_finalization(&mut self, context: &FinalizationContext) {
        let sees_partner = context.resolve("shrine", "dusk").is_some();
        let key = self.key().unwrap_or_default();
        self.journal
            .lock()
            .unwrap()
            .push((key, context.len(), sees_partner));
    }
}

fn recording_registry(journal: &Journal) -> TypeRegistry {
    let journal = journal.clone();
    TypeRegistry::new().with_handler("recording", move || RecordingHandler {
        core: HandlerCore::default(),
        journal: journal.clone(),
    })
}

#[test]
fn every_handler_is_finalized_once_with_full_context() {
    let journal = Journal::default();
    let mut registry = recording_registry(&journal);
    registry
        .load_object(
            "core",
            "shrine",
            &json!({
                "handlerName": "recording",
                "subtypes": { "dawn": {}, "noon": {}, "dusk": {} }
            }),
        )
        .unwrap();
    registry
        .load_object(
            "core",
            "altar",
            &json!({ "handlerName": "recording", "subtypes": { "stone": {} } }),
        )
        .unwrap();

    assert_eq!(registry.after_load_finalization(), 4);
    assert_eq!(registry.phase(), RegistryPhase::Finalized);

    let calls = journal.lock().unwrap().clone();
    assert_eq!(calls.len(), 4);
    for (key, visible, sees_partner) in &calls {
        assert_eq!(*visible, 4, "{key} saw a partial load cycle");
        assert!(sees_partner, "{key} could not resolve its sibling");
    }

    assert_eq!(registry.after_load_finalization(), 0);
    assert_eq!(journal.lock().unwrap().len(), 4);
}

#[test]
fn late_additions_are_finalized_in_the_next_cycle() {
    let journal = Journal::default();
    let mut registry = recording_registry(&journal);
    let id = registry
        .load_object(
            "core",
            "shrine",
            &json!({ "handlerName": "recording", "subtypes": { "dawn": {} } }),
        )
        .unwrap();
    registry.after_load_finalization();

    registry.load_sub_object("dusk", &json!({}), id, None).unwrap();
    assert_eq!(registry.phase(), RegistryPhase::Loading);
    assert_eq!(registry.after_load_finalization(), 1);

    let calls = journal.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1], (ObjectKey::new(id.0, 1), 2, true));
}
