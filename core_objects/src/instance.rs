use serde::{Deserialize, Serialize};
use serde_json::Value;

use object_schema::{ObjectKey, ObjectTemplate};

/// Kind-specific state written by `configure_object`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectState {
    /// Created but not configured yet.
    Unconfigured,
    /// Configured kind without extra state.
    Plain,
    Resource { amount: u32 },
    Monster { count: u32 },
    Town { fort_level: u8 },
    Custom(Value),
}

/// A placed object on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapObject {
    pub key: ObjectKey,
    pub type_name: String,
    pub sub_type_name: String,
    pub appearance: ObjectTemplate,
    pub instance_name: Option<String>,
    pub state: ObjectState,
}

impl MapObject {
    pub fn is_configured(&self) -> bool {
        !matches!(self.state, ObjectState::Unconfigured)
    }

    pub fn fort_level(&self) -> Option<u8> {
        match self.state {
            ObjectState::Town { fort_level } => Some(fort_level),
            _ => None,
        }
    }
}
