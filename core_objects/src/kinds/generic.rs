use rand::RngCore;

use object_schema::ObjectTemplate;

use crate::handler::{HandlerCore, ObjectInfo, TypeHandler};
use crate::instance::{MapObject, ObjectState};

/// Interactive object without kind data (signs, boats, event markers).
#[derive(Debug, Default)]
pub struct GenericHandler {
    core: HandlerCore,
}

impl TypeHandler for GenericHandler {
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
}

/// Decoration and obstacles: takes up map space, never visited.
#[derive(Debug, Default)]
pub struct StaticHandler {
    core: HandlerCore,
}

impl TypeHandler for StaticHandler {
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

    fn is_static_object(&self) -> bool {
        true
    }
}
