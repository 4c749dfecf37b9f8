//! Versioned binary form of a [`TypeRegistry`].
//!
//! Layout: magic, `u32` format version, container count, then per container
//! its primary id and record. Field order is part of the compatibility
//! surface; fields introduced at [`IDENTIFIER_FORMAT_VERSION`] are only
//! present when the payload version is at least that.

use std::collections::BTreeMap;
use std::hash::Hasher;

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use object_schema::{ObjectKey, ObjectTemplate, ObjectTypeId, RandomMapInfo, SubtypeId};

use crate::container::ObjectContainer;
use crate::handler::{HandlerError, HandlerRecord, TypeHandler};
use crate::registry::{TypeRegistry, MAX_OBJECT_TYPE_ID};

pub const FORMAT_MAGIC: [u8; 4] = *b"OBJR";
/// First version carrying string identifiers and handler type names.
pub const IDENTIFIER_FORMAT_VERSION: u32 = 759;
pub const CURRENT_FORMAT_VERSION: u32 = 759;
pub const MIN_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to encode object registry: {0}")]
    Encode(#[source] bincode::Error),
    #[error("failed to decode object registry: {0}")]
    Decode(#[source] bincode::Error),
    #[error("payload is not an object registry")]
    BadMagic,
    #[error("unsupported format version {version}")]
    UnsupportedVersion { version: u32 },
    #[error("object type {id} uses unknown handler `{handler}`")]
    UnknownHandler { id: ObjectTypeId, handler: String },
    #[error("invalid embedded configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("kind data of {key} rejected: {source}")]
    KindData {
        key: ObjectKey,
        #[source]
        source: HandlerError,
    },
    #[error("object type id {id} is out of range")]
    IdOutOfRange { id: ObjectTypeId },
    #[error("handler stored under {expected} carries key {found}")]
    KeyMismatch { expected: ObjectKey, found: ObjectKey },
    #[error("identifier `{identifier}` of object type {id} names missing subtype {subid}")]
    DanglingIdentifier {
        id: ObjectTypeId,
        identifier: String,
        subid: SubtypeId,
    },
    #[error("{remaining} trailing bytes after object registry payload")]
    TrailingBytes { remaining: usize },
}

fn check_version(version: u32) -> Result<(), PersistenceError> {
    if (MIN_FORMAT_VERSION..=CURRENT_FORMAT_VERSION).contains(&version) {
        Ok(())
    } else {
        Err(PersistenceError::UnsupportedVersion { version })
    }
}

/// Fixed-width little-endian bincode, the layout `bincode::serialize` writes.
fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

struct Writer {
    out: Vec<u8>,
    version: u32,
}

impl Writer {
    fn put<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), PersistenceError> {
        codec()
            .serialize_into(&mut self.out, value)
            .map_err(PersistenceError::Encode)
    }

    fn put_json(&mut self, value: &Value) -> Result<(), PersistenceError> {
        let text = serde_json::to_string(value)?;
        self.put(&text)
    }

    fn has_identifiers(&self) -> bool {
        self.version >= IDENTIFIER_FORMAT_VERSION
    }
}

struct Reader<'a> {
    input: &'a [u8],
    version: u32,
}

impl Reader<'_> {
    fn get<T: DeserializeOwned>(&mut self) -> Result<T, PersistenceError> {
        // no length prefix may claim more than the bytes left
        let limit = self.input.len() as u64;
        codec()
            .with_limit(limit)
            .deserialize_from(&mut self.input)
            .map_err(PersistenceError::Decode)
    }

    fn get_json(&mut self) -> Result<Value, PersistenceError> {
        let text: String = self.get()?;
        Ok(serde_json::from_str(&text)?)
    }

    fn has_identifiers(&self) -> bool {
        self.version >= IDENTIFIER_FORMAT_VERSION
    }
}

/// Encodes at the version named by the registry's configuration.
pub fn encode(registry: &TypeRegistry) -> Result<Vec<u8>, PersistenceError> {
    encode_with_version(registry, registry.config().format_version)
}

pub fn encode_with_version(
    registry: &TypeRegistry,
    version: u32,
) -> Result<Vec<u8>, PersistenceError> {
    check_version(version)?;
    let mut writer = Writer {
        out: FORMAT_MAGIC.to_vec(),
        version,
    };
    writer.put(&version)?;

    let containers: Vec<&ObjectContainer> = registry.containers().collect();
    writer.put(&(containers.len() as u64))?;
    for container in containers {
        writer.put(&container.id())?;
        write_container(&mut writer, container)?;
    }

    debug!(
        target: "objects::persistence",
        version,
        bytes = writer.out.len(),
        "registry.encoded"
    );
    Ok(writer.out)
}

fn write_container(writer: &mut Writer, container: &ObjectContainer) -> Result<(), PersistenceError> {
    writer.put(container.name())?;
    writer.put(container.handler_name())?;
    writer.put_json(container.base())?;

    writer.put(&(container.len() as u64))?;
    for (subid, handler) in container.handlers() {
        writer.put(&subid)?;
        write_handler(writer, handler)?;
    }

    if writer.has_identifiers() {
        writer.put(container.identifier())?;
        writer.put(container.sub_identifiers())?;
    }
    Ok(())
}

fn write_handler(writer: &mut Writer, handler: &dyn TypeHandler) -> Result<(), PersistenceError> {
    let core = handler.core();
    let key = core.key().unwrap_or_default();
    writer.put(&key.id)?;
    writer.put(&key.subid)?;
    writer.put(core.templates().all())?;
    writer.put(core.rmg_info())?;
    writer.put(&core.custom_name())?;
    if writer.has_identifiers() {
        writer.put(core.type_name())?;
        writer.put(core.sub_type_name())?;
    }
    writer.put_json(&handler.encode_kind_data())
}

/// Replaces the registry's containers with the payload's. Legacy state is
/// dropped; the factory table must know every handler the payload names.
/// Decoded handlers are initialized but not finalized.
pub fn decode_into(registry: &mut TypeRegistry, bytes: &[u8]) -> Result<u32, PersistenceError> {
    let input = bytes
        .strip_prefix(&FORMAT_MAGIC[..])
        .ok_or(PersistenceError::BadMagic)?;
    let mut reader = Reader { input, version: 0 };
    let version: u32 = reader.get()?;
    check_version(version)?;
    reader.version = version;

    let count: u64 = reader.get()?;
    let mut containers = Vec::new();
    for _ in 0..count {
        let id: ObjectTypeId = reader.get()?;
        if id.0 > MAX_OBJECT_TYPE_ID {
            return Err(PersistenceError::IdOutOfRange { id });
        }
        containers.push(read_container(&mut reader, registry, id)?);
    }
    if !reader.input.is_empty() {
        return Err(PersistenceError::TrailingBytes {
            remaining: reader.input.len(),
        });
    }

    registry.reset();
    let loaded = containers.len();
    for container in containers {
        registry.insert_container(container);
    }
    info!(
        target: "objects::persistence",
        version,
        containers = loaded,
        "registry.decoded"
    );
    Ok(version)
}

fn read_container(
    reader: &mut Reader<'_>,
    registry: &TypeRegistry,
    id: ObjectTypeId,
) -> Result<ObjectContainer, PersistenceError> {
    let name: String = reader.get()?;
    let handler_name: String = reader.get()?;
    let base = reader.get_json()?;
    let constructor =
        registry
            .constructor(&handler_name)
            .ok_or_else(|| PersistenceError::UnknownHandler {
                id,
                handler: handler_name.clone(),
            })?;

    let mut container = ObjectContainer::new(id, "", &handler_name);
    container.name = name;
    container.base = base;

    let count: u64 = reader.get()?;
    for _ in 0..count {
        let subid: SubtypeId = reader.get()?;
        let record = read_handler(reader)?;
        let key = ObjectKey { id, subid };
        if record.key != key {
            return Err(PersistenceError::KeyMismatch {
                expected: key,
                found: record.key,
            });
        }
        let mut handler = constructor();
        handler.core_mut().restore(record);
        let kind_data = reader.get_json()?;
        handler
            .decode_kind_data(&kind_data)
            .map_err(|source| PersistenceError::KindData { key, source })?;
        container.insert_handler(subid, None, handler);
    }

    if reader.has_identifiers() {
        container.identifier = reader.get()?;
        let sub_ids: BTreeMap<String, SubtypeId> = reader.get()?;
        for (identifier, subid) in sub_ids {
            if !container.contains(subid) {
                return Err(PersistenceError::DanglingIdentifier {
                    id,
                    identifier,
                    subid,
                });
            }
            container.bind_identifier(&identifier, subid);
        }
    }
    Ok(container)
}

fn read_handler(reader: &mut Reader<'_>) -> Result<HandlerRecord, PersistenceError> {
    let id: ObjectTypeId = reader.get()?;
    let subid: SubtypeId = reader.get()?;
    let templates: Vec<ObjectTemplate> = reader.get()?;
    let rmg_info: RandomMapInfo = reader.get()?;
    let custom_name: Option<String> = reader.get()?;
    let (type_name, sub_type_name) = if reader.has_identifiers() {
        (reader.get()?, reader.get()?)
    } else {
        (String::new(), String::new())
    };
    Ok(HandlerRecord {
        key: ObjectKey { id, subid },
        templates,
        rmg_info,
        custom_name,
        type_name,
        sub_type_name,
    })
}

/// Deterministic FNV-1a, stable across runs and platforms.
#[derive(Debug)]
struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    fn new() -> Self {
        Self {
            state: Self::OFFSET_BASIS,
        }
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= byte as u64;
            self.state = self.state.wrapping_mul(Self::PRIME);
        }
    }
}

impl TypeRegistry {
    /// Hash of the current-version payload, for change detection.
    pub fn content_digest(&self) -> Result<u64, PersistenceError> {
        let encoded = encode_with_version(self, CURRENT_FORMAT_VERSION)?;
        let mut hasher = FnvHasher::new();
        hasher.write(&encoded);
        Ok(hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry
            .load_object_at(
                "core",
                "resource",
                &json!({
                    "name": "Resource",
                    "handlerName": "resource",
                    "base": { "rmg": { "rarity": 100 } },
                    "subtypes": {
                        "gold": {
                            "index": 6,
                            "amount": { "min": 500, "max": 1000 },
                            "templates": [ "AVTgold0" ]
                        }
                    }
                }),
                79,
            )
            .unwrap();
        registry.after_load_finalization();
        registry
    }

    #[test]
    fn header_is_checked() {
        let mut target = TypeRegistry::new();
        assert!(matches!(
            decode_into(&mut target, b"NOPE\0\0\0\0"),
            Err(PersistenceError::BadMagic)
        ));

        let mut bytes = FORMAT_MAGIC.to_vec();
        bytes.extend_from_slice(&760u32.to_le_bytes());
        assert!(matches!(
            decode_into(&mut target, &bytes),
            Err(PersistenceError::UnsupportedVersion { version: 760 })
        ));
        assert!(matches!(
            encode_with_version(&registry(), 0),
            Err(PersistenceError::UnsupportedVersion { version: 0 })
        ));
    }

    #[test]
    fn truncated_payload_fails_without_touching_target() {
        let bytes = encode(&registry()).unwrap();
        let mut target = registry();
        let err = decode_into(&mut target, &bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, PersistenceError::Decode(_)));
        assert!(target.handler_for(ObjectTypeId(79), SubtypeId(6)).is_some());
    }

    /// Registry holding one hand-built container, bypassing content loading.
    fn crafted(id: u32, bound: ObjectKey, ghost: Option<SubtypeId>) -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        let mut handler = registry.constructor("generic").unwrap()();
        handler.core_mut().bind(bound).unwrap();
        let mut container = ObjectContainer::new(ObjectTypeId(id), "crafted", "generic");
        container.insert_handler(SubtypeId(0), Some("plain"), handler);
        if let Some(subid) = ghost {
            container.bind_identifier("ghost", subid);
        }
        registry.insert_container(container);
        registry
    }

    #[test]
    fn corrupt_length_prefix_is_a_decode_error() {
        let mut bytes = FORMAT_MAGIC.to_vec();
        bytes.extend_from_slice(&CURRENT_FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&1u64.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&(1u64 << 62).to_le_bytes());

        let mut target = registry();
        let err = decode_into(&mut target, &bytes).unwrap_err();
        assert!(matches!(err, PersistenceError::Decode(_)), "{err:?}");
        assert!(target.handler_for(ObjectTypeId(79), SubtypeId(6)).is_some());
    }

    #[test]
    fn handler_keys_must_match_their_slot() {
        let bytes = encode(&crafted(3, ObjectKey::new(3, 1), None)).unwrap();
        let mut target = registry();
        assert!(matches!(
            decode_into(&mut target, &bytes),
            Err(PersistenceError::KeyMismatch { expected, found })
                if expected == ObjectKey::new(3, 0) && found == ObjectKey::new(3, 1)
        ));
        assert!(target.container(ObjectTypeId(3)).is_none());

        let bytes = encode(&crafted(3, ObjectKey::new(3, 0), None)).unwrap();
        decode_into(&mut target, &bytes).unwrap();
        assert!(target.handler_for_name("crafted", "plain").is_some());
    }

    #[test]
    fn identifiers_must_name_stored_subtypes() {
        let bytes = encode(&crafted(4, ObjectKey::new(4, 0), Some(SubtypeId(7)))).unwrap();
        let mut target = registry();
        assert!(matches!(
            decode_into(&mut target, &bytes),
            Err(PersistenceError::DanglingIdentifier { subid: SubtypeId(7), .. })
        ));
        assert!(target.container(ObjectTypeId(79)).is_some());
    }

    #[test]
    fn out_of_range_ids_are_rejected() {
        let id = MAX_OBJECT_TYPE_ID + 1;
        let bytes = encode(&crafted(id, ObjectKey::new(id, 0), None)).unwrap();
        let mut target = TypeRegistry::new();
        assert!(matches!(
            decode_into(&mut target, &bytes),
            Err(PersistenceError::IdOutOfRange { id: ObjectTypeId(found) }) if found == id
        ));
    }

    #[test]
    fn unknown_handler_in_payload_is_reported() {
        let bytes = encode(&registry()).unwrap();
        let mut target = TypeRegistry::empty(Default::default());
        assert!(matches!(
            decode_into(&mut target, &bytes),
            Err(PersistenceError::UnknownHandler { id: ObjectTypeId(79), .. })
        ));
    }

    #[test]
    fn digest_tracks_content() {
        let mut source = registry();
        let before = source.content_digest().unwrap();
        assert_eq!(before, registry().content_digest().unwrap());
        source.remove_sub_object(ObjectTypeId(79), SubtypeId(6));
        assert_ne!(before, source.content_digest().unwrap());
    }
}
