use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use object_schema::ObjectTemplate;

use super::AmountRange;
use crate::handler::{
    ArmyStructure, HandlerCore, HandlerError, ObjectInfo, ObjectRewards, TypeHandler,
};
use crate::instance::{MapObject, ObjectState};

const DEFAULT_STACK: AmountRange = AmountRange::fixed(1);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct MonsterData {
    strength: Option<u32>,
    count: Option<AmountRange>,
    shooter: Option<bool>,
    flyer: Option<bool>,
}

/// Wandering creature stacks. Guard strength is `strength * count`.
#[derive(Debug)]
pub struct MonsterHandler {
    core: HandlerCore,
    strength: u32,
    count: AmountRange,
    shooter: bool,
    flyer: bool,
}

impl Default for MonsterHandler {
    fn default() -> Self {
        Self {
            core: HandlerCore::default(),
            strength: 0,
            count: DEFAULT_STACK,
            shooter: false,
            flyer: false,
        }
    }
}

impl MonsterHandler {
    pub fn strength(&self) -> u32 {
        self.strength
    }

    pub fn count(&self) -> AmountRange {
        self.count
    }

    fn apply(&mut self, data: MonsterData) -> Result<(), HandlerError> {
        if let Some(count) = data.count {
            count.validate("count")?;
            self.count = count;
        }
        if let Some(strength) = data.strength {
            self.strength = strength;
        }
        if let Some(shooter) = data.shooter {
            self.shooter = shooter;
        }
        if let Some(flyer) = data.flyer {
            self.flyer = flyer;
        }
        Ok(())
    }

    fn army(&self, units: u32) -> ArmyStructure {
        let total = self.strength.saturating_mul(units);
        let mut army = ArmyStructure {
            total_strength: total,
            ..Default::default()
        };
        if self.shooter {
            army.shooters_strength = total;
        } else if self.flyer {
            army.flyers_strength = total;
        } else {
            army.walkers_strength = total;
        }
        army
    }
}

impl TypeHandler for MonsterHandler {
    fn core(&self) -> &HandlerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut HandlerCore {
        &mut self.core
    }

    fn init_type_data(&mut self, input: &Value) -> Result<(), HandlerError> {
        self.apply(serde_json::from_value(input.clone())?)?;
        if self.strength == 0 {
            return Err(HandlerError::MissingField { field: "strength" });
        }
        Ok(())
    }

    fn create(&self, template: &ObjectTemplate) -> MapObject {
        self.core.new_instance(template)
    }

    fn configure_object(&self, object: &mut MapObject, rng: &mut dyn RngCore) {
        object.state = ObjectState::Monster {
            count: self.count.roll(rng),
        };
    }

    fn object_info(&self, _template: &ObjectTemplate) -> Option<ObjectInfo> {
        Some(ObjectInfo {
            min_guards: self.army(self.count.min),
            max_guards: self.army(self.count.max),
            rewards: ObjectRewards::EXPERIENCE,
        })
    }

    fn encode_kind_data(&self) -> Value {
        serde_json::to_value(MonsterData {
            strength: Some(self.strength),
            count: Some(self.count),
            shooter: Some(self.shooter),
            flyer: Some(self.flyer),
        })
        .unwrap_or(Value::Null)
    }

    fn decode_kind_data(&mut self, data: &Value) -> Result<(), HandlerError> {
        self.apply(serde_json::from_value(data.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_schema::ObjectKey;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde_json::json;

    fn archers() -> MonsterHandler {
        let mut handler = MonsterHandler::default();
        handler.set_type(ObjectKey::new(54, 3)).unwrap();
        handler.set_type_name("monster", "archer");
        handler
            .init(
                &json!({ "strength": 126, "count": { "min": 4, "max": 12 }, "shooter": true }),
                None,
            )
            .unwrap();
        handler
    }

    #[test]
    fn guard_bounds_follow_stack_size() {
        let handler = archers();
        let template = ObjectTemplate::new(ObjectKey::new(54, 3), "AvWArch");
        let info = handler.object_info(&template).unwrap();
        assert_eq!(info.min_guards.total_strength, 126 * 4);
        assert_eq!(info.max_guards.shooters_strength, 126 * 12);
        assert_eq!(info.max_guards.walkers_strength, 0);
        assert!(info.min_guards < info.max_guards);
        assert!(info.is_guarded());
        assert!(info.gives(ObjectRewards::EXPERIENCE));
    }

    #[test]
    fn configured_count_stays_in_range() {
        let handler = archers();
        let template = ObjectTemplate::new(ObjectKey::new(54, 3), "AvWArch");
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        for _ in 0..32 {
            let mut object = handler.create(&template);
            handler.configure_object(&mut object, &mut rng);
            match object.state {
                ObjectState::Monster { count } => assert!((4..=12).contains(&count)),
                ref other => panic!("unexpected state {other:?}"),
            }
        }
    }

    #[test]
    fn strength_is_required() {
        let mut handler = MonsterHandler::default();
        handler.set_type(ObjectKey::new(54, 0)).unwrap();
        let err = handler.init(&json!({ "flyer": true }), None).unwrap_err();
        assert!(matches!(err, HandlerError::MissingField { field: "strength" }));
    }
}
