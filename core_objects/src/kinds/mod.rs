//! Handler kinds registered in every [`TypeRegistry`](crate::TypeRegistry)
//! by default.

mod generic;
mod monster;
mod resource;
mod town;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

pub use generic::{GenericHandler, StaticHandler};
pub use monster::MonsterHandler;
pub use resource::ResourceHandler;
pub use town::TownHandler;

use crate::handler::{HandlerError, TypeHandler};
use crate::registry::HandlerConstructor;

pub const GENERIC_HANDLER: &str = "generic";
pub const STATIC_HANDLER: &str = "static";
pub const RESOURCE_HANDLER: &str = "resource";
pub const MONSTER_HANDLER: &str = "monster";
pub const TOWN_HANDLER: &str = "town";

pub(crate) fn builtin_handlers() -> Vec<(&'static str, HandlerConstructor)> {
    vec![
        (GENERIC_HANDLER, boxed(GenericHandler::default)),
        (STATIC_HANDLER, boxed(StaticHandler::default)),
        (RESOURCE_HANDLER, boxed(ResourceHandler::default)),
        (MONSTER_HANDLER, boxed(MonsterHandler::default)),
        (TOWN_HANDLER, boxed(TownHandler::default)),
    ]
}

pub(crate) fn boxed<H, F>(constructor: F) -> HandlerConstructor
where
    H: TypeHandler + 'static,
    F: Fn() -> H + Send + Sync + 'static,
{
    Box::new(move || Box::new(constructor()) as Box<dyn TypeHandler>)
}

/// Inclusive `min..=max` range read from content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRange {
    pub min: u32,
    pub max: u32,
}

impl AmountRange {
    pub const fn fixed(amount: u32) -> Self {
        Self {
            min: amount,
            max: amount,
        }
    }

    pub fn validate(&self, field: &'static str) -> Result<(), HandlerError> {
        if self.min > self.max {
            return Err(HandlerError::InvalidField {
                field,
                reason: format!("min {} exceeds max {}", self.min, self.max),
            });
        }
        Ok(())
    }

    pub fn roll(&self, rng: &mut dyn RngCore) -> u32 {
        rng.gen_range(self.min..=self.max)
    }
}
