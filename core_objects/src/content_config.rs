//! Object content definitions and registry-level settings.
//!
//! Content is loaded from `objects.json` with support for an environment
//! variable override.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};
use thiserror::Error;

use crate::persistence::CURRENT_FORMAT_VERSION;
use crate::registry::{ContentLoadReport, RegistryError, TypeRegistry};

pub const BUILTIN_OBJECT_CONTENT: &str = include_str!("data/objects.json");
pub const OBJECT_CONTENT_PATH_ENV: &str = "OBJECT_CONTENT_PATH";

/// Knobs of a [`TypeRegistry`].
#[derive(Resource, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryConfig {
    /// Version written by [`persistence::encode`](crate::persistence::encode).
    pub format_version: u32,
    /// Scope whose identifiers are registered without a prefix.
    pub core_scope: String,
    pub discard_legacy_on_finalize: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            format_version: CURRENT_FORMAT_VERSION,
            core_scope: "core".to_string(),
            discard_legacy_on_finalize: true,
        }
    }
}

/// One content document: `{ name: entry }` for a single scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectContent {
    document: Value,
}

impl ObjectContent {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            ObjectContent::from_json_str(BUILTIN_OBJECT_CONTENT)
                .expect("builtin object content should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let entries: JsonMap<String, Value> = serde_json::from_str(json)?;
        Ok(Self {
            document: Value::Object(entries),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ContentConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ContentConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let content = ObjectContent::from_json_str(&contents)?;
        Ok(content)
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn entry_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.document
            .as_object()
            .into_iter()
            .flat_map(|entries| entries.keys().map(String::as_str))
    }

    pub fn apply(
        &self,
        registry: &mut TypeRegistry,
        scope: &str,
    ) -> Result<ContentLoadReport, ContentConfigError> {
        Ok(registry.load_content(scope, &self.document)?)
    }
}

#[derive(Debug, Error)]
pub enum ContentConfigError {
    #[error("failed to parse object content: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read object content from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to register object content: {0}")]
    Registry(#[from] RegistryError),
}

/// Where the active object content came from; `None` for the builtin file.
#[derive(Resource, Debug, Clone, Default)]
pub struct ObjectContentMetadata {
    path: Option<PathBuf>,
}

impl ObjectContentMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

/// Loads object content from `OBJECT_CONTENT_PATH`, falling back to the
/// builtin content when the variable is unset or the file is unusable.
pub fn load_object_content_from_env() -> (Arc<ObjectContent>, ObjectContentMetadata) {
    if let Some(path) = env::var(OBJECT_CONTENT_PATH_ENV).ok().map(PathBuf::from) {
        match ObjectContent::from_file(&path) {
            Ok(content) => {
                tracing::info!(
                    target: "objects::config",
                    path = %path.display(),
                    "object_content.loaded=file"
                );
                return (Arc::new(content), ObjectContentMetadata::new(Some(path)));
            }
            Err(err) => {
                tracing::warn!(
                    target: "objects::config",
                    path = %path.display(),
                    error = %err,
                    "object_content.load_failed"
                );
            }
        }
    }

    let content = ObjectContent::builtin();
    tracing::info!(target: "objects::config", "object_content.loaded=builtin");
    (content, ObjectContentMetadata::new(None))
}

/// Finalized registry shared with readers once a load cycle is over.
#[derive(Resource, Debug, Clone)]
pub struct ObjectRegistryHandle(pub Arc<TypeRegistry>);

impl ObjectRegistryHandle {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self(registry)
    }

    pub fn get(&self) -> Arc<TypeRegistry> {
        Arc::clone(&self.0)
    }

    pub fn replace(&mut self, registry: Arc<TypeRegistry>) {
        self.0 = registry;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_content_parses() {
        let content = ObjectContent::builtin();
        let names: Vec<_> = content.entry_names().collect();
        assert!(names.contains(&"resource"));
        assert!(names.contains(&"town"));
    }

    #[test]
    fn non_object_document_is_rejected() {
        assert!(ObjectContent::from_json_str("[1, 2, 3]").is_err());
    }

    #[test]
    fn registry_config_fills_defaults() {
        let config: RegistryConfig =
            serde_json::from_str(r#"{ "formatVersion": 758 }"#).unwrap();
        assert_eq!(config.format_version, 758);
        assert_eq!(config.core_scope, "core");
        assert!(config.discard_legacy_on_finalize);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ObjectContent::from_file(Path::new("/nonexistent/objects.json")).unwrap_err();
        assert!(matches!(err, ContentConfigError::Read { .. }));
    }
}
