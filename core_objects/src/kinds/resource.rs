use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use object_schema::ObjectTemplate;

use super::AmountRange;
use crate::handler::{HandlerCore, HandlerError, ObjectInfo, ObjectRewards, TypeHandler};
use crate::instance::{MapObject, ObjectState};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ResourceData {
    resource: Option<String>,
    amount: Option<AmountRange>,
}

/// Pick-up resource piles. The amount is rolled at configuration time.
#[derive(Debug, Default)]
pub struct ResourceHandler {
    core: HandlerCore,
    resource: String,
    amount: Option<AmountRange>,
}

impl ResourceHandler {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn amount(&self) -> Option<AmountRange> {
        self.amount
    }

    fn apply(&mut self, data: ResourceData) -> Result<(), HandlerError> {
        if let Some(resource) = data.resource {
            self.resource = resource;
        }
        if let Some(amount) = data.amount {
            amount.validate("amount")?;
            self.amount = Some(amount);
        }
        Ok(())
    }
}

impl TypeHandler for ResourceHandler {
    fn core(&self) -> &HandlerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut HandlerCore {
        &mut self.core
    }

    fn init_type_data(&mut self, input: &Value) -> Result<(), HandlerError> {
        self.apply(serde_json::from_value(input.clone())?)?;
        if self.resource.is_empty() {
            self.resource = self.core.sub_type_name().to_string();
        }
        if self.amount.is_none() {
            return Err(HandlerError::MissingField { field: "amount" });
        }
        Ok(())
    }

    fn create(&self, template: &ObjectTemplate) -> MapObject {
        self.core.new_instance(template)
    }

    fn configure_object(&self, object: &mut MapObject, rng: &mut dyn RngCore) {
        let amount = self.amount.map(|range| range.roll(rng)).unwrap_or(0);
        object.state = ObjectState::Resource { amount };
    }

    fn object_info(&self, _template: &ObjectTemplate) -> Option<ObjectInfo> {
        Some(ObjectInfo {
            rewards: ObjectRewards::RESOURCES,
            ..Default::default()
        })
    }

    fn encode_kind_data(&self) -> Value {
        serde_json::to_value(ResourceData {
            resource: Some(self.resource.clone()),
            amount: self.amount,
        })
        .unwrap_or(Value::Null)
    }

    fn decode_kind_data(&mut self, data: &Value) -> Result<(), HandlerError> {
        self.apply(serde_json::from_value(data.clone())?)
    }
}
