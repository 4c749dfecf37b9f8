use serde_json::Value;

use object_schema::{ObjectTemplate, TerrainType};

use crate::config_tree::{inherit, normalize_template};

/// Ordered template storage of one handler.
///
/// Duplicates are kept; two equal templates are both offered for selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateCatalog {
    templates: Vec<ObjectTemplate>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, template: ObjectTemplate) {
        self.templates.push(template);
    }

    pub fn all(&self) -> &[ObjectTemplate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Templates placeable on `terrain`, in insertion order.
    pub fn for_terrain(&self, terrain: TerrainType) -> Vec<ObjectTemplate> {
        self.templates
            .iter()
            .filter(|template| template.can_be_placed_at(terrain))
            .cloned()
            .collect()
    }

    /// First template on `terrain` accepted by `filter`.
    pub fn preferred<F>(&self, terrain: TerrainType, mut filter: F) -> Option<ObjectTemplate>
    where
        F: FnMut(&ObjectTemplate) -> bool,
    {
        self.templates
            .iter()
            .filter(|template| template.can_be_placed_at(terrain))
            .find(|template| filter(template))
            .cloned()
    }

    pub(crate) fn replace_all(&mut self, templates: Vec<ObjectTemplate>) {
        self.templates = templates;
    }
}

/// Reads one template entry on top of `base`, accepting the bare-animation
/// string shorthand.
pub fn parse_template(
    owner: &str,
    config: &Value,
    base: &Value,
) -> Result<ObjectTemplate, serde_json::Error> {
    let mut config = config.clone();
    normalize_template(owner, &mut config);
    inherit(&mut config, base);
    serde_json::from_value(config)
}
