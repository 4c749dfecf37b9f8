//! Registry of placeable map object kinds.
//!
//! Maps a (primary, secondary) object key to the handler that knows how to
//! build, configure and describe objects of that kind. Content is loaded
//! from JSON during a load cycle, legacy appearance data is migrated once,
//! and [`TypeRegistry::after_load_finalization`] closes the cycle.

pub mod config_tree;
mod container;
pub mod content_config;
mod handler;
mod instance;
pub mod kinds;
pub mod legacy;
pub mod persistence;
mod registry;
mod template;

use std::sync::Arc;

use bevy::prelude::World;

pub use container::ObjectContainer;
pub use content_config::{
    load_object_content_from_env, ContentConfigError, ObjectContent, ObjectContentMetadata,
    ObjectRegistryHandle, RegistryConfig, BUILTIN_OBJECT_CONTENT,
};
pub use handler::{
    ArmyStructure, FinalizationContext, HandlerCore, HandlerError, HandlerPhase, ObjectInfo,
    ObjectRewards, TypeHandler,
};
pub use instance::{MapObject, ObjectState};
pub use legacy::LegacyNames;
pub use persistence::{PersistenceError, CURRENT_FORMAT_VERSION, IDENTIFIER_FORMAT_VERSION};
pub use registry::{
    ContentLoadReport, HandlerConstructor, RegistryError, RegistryPhase, TypeRegistry,
    MAX_OBJECT_TYPE_ID,
};
pub use template::{parse_template, TemplateCatalog};

pub use object_schema::{
    ObjectKey, ObjectTemplate, ObjectTypeId, RandomMapInfo, SubtypeId, TerrainMask, TerrainType,
};

/// Registry with the built-in kinds and builtin content, finalized.
pub fn build_default_registry() -> Result<TypeRegistry, ContentConfigError> {
    let config = RegistryConfig::default();
    let scope = config.core_scope.clone();
    let mut registry = TypeRegistry::with_config(config);
    ObjectContent::builtin().apply(&mut registry, &scope)?;
    registry.after_load_finalization();
    Ok(registry)
}

/// Loads content (honouring `OBJECT_CONTENT_PATH`), finalizes, and publishes
/// the registry as an [`ObjectRegistryHandle`] resource.
pub fn insert_object_registry(world: &mut World) -> Result<ContentLoadReport, ContentConfigError> {
    let config = world
        .get_resource::<RegistryConfig>()
        .cloned()
        .unwrap_or_default();
    let (content, metadata) = load_object_content_from_env();

    let scope = config.core_scope.clone();
    let mut registry = TypeRegistry::with_config(config.clone());
    let report = content.apply(&mut registry, &scope)?;
    registry.after_load_finalization();

    world.insert_resource(config);
    world.insert_resource(metadata);
    world.insert_resource(ObjectRegistryHandle::new(Arc::new(registry)));
    Ok(report)
}
