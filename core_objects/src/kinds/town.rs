use std::collections::BTreeMap;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use object_schema::ObjectTemplate;

use crate::handler::{FinalizationContext, HandlerCore, HandlerError, ObjectInfo, TypeHandler};
use crate::instance::{MapObject, ObjectState};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TownData {
    filters: Option<BTreeMap<String, u8>>,
    starting_fort_level: Option<u8>,
}

/// Towns pick their appearance from the fort level: `filters` maps a
/// template name to the fort level it depicts.
#[derive(Debug, Default)]
pub struct TownHandler {
    core: HandlerCore,
    filters: BTreeMap<String, u8>,
    starting_fort_level: Option<u8>,
}

impl TownHandler {
    pub fn filters(&self) -> &BTreeMap<String, u8> {
        &self.filters
    }

    fn highest_level(&self) -> u8 {
        self.filters.values().copied().max().unwrap_or(0)
    }

    fn apply(&mut self, data: TownData) {
        if let Some(filters) = data.filters {
            self.filters.extend(filters);
        }
        if let Some(level) = data.starting_fort_level {
            self.starting_fort_level = Some(level);
        }
    }
}

impl TypeHandler for TownHandler {
    fn core(&self) -> &HandlerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut HandlerCore {
        &mut self.core
    }

    fn init_type_data(&mut self, input: &Value) -> Result<(), HandlerError> {
        self.apply(serde_json::from_value(input.clone())?);
        Ok(())
    }

    fn create(&self, template: &ObjectTemplate) -> MapObject {
        self.core.new_instance(template)
    }

    fn configure_object(&self, object: &mut MapObject, rng: &mut dyn RngCore) {
        let fort_level = match self.starting_fort_level {
            Some(level) => level,
            None => rng.gen_range(0..=self.highest_level()),
        };
        object.state = ObjectState::Town { fort_level };
    }

    fn object_info(&self, _template: &ObjectTemplate) -> Option<ObjectInfo> {
        None
    }

    fn object_filter(&self, object: &MapObject, template: &ObjectTemplate) -> bool {
        let required = template
            .name
            .as_ref()
            .and_then(|name| self.filters.get(name));
        match (object.fort_level(), required) {
            (Some(level), Some(required)) => level == *required,
            _ => false,
        }
    }

    /// Drops filters naming templates this handler never received.
    fn after_load_finalization(&mut self, _context: &FinalizationContext) {
        let known: Vec<String> = self
            .core
            .templates()
            .all()
            .iter()
            .filter_map(|template| template.name.clone())
            .collect();
        let sub_type = self.core.sub_type_name().to_string();
        self.filters.retain(|name, _| {
            let present = known.contains(name);
            if !present {
                warn!(
                    target: "objects::registry",
                    sub_type = %sub_type,
                    filter = %name,
                    "town.filter_without_template"
                );
            }
            present
        });
    }

    fn encode_kind_data(&self) -> Value {
        serde_json::to_value(TownData {
            filters: Some(self.filters.clone()),
            starting_fort_level: self.starting_fort_level,
        })
        .unwrap_or(Value::Null)
    }

    fn decode_kind_data(&mut self, data: &Value) -> Result<(), HandlerError> {
        self.apply(serde_json::from_value(data.clone())?);
        Ok(())
    }
}
