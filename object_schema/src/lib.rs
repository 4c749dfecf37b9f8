//! Data contracts for placeable map object kinds.
//!
//! These types are shared by the object registry, the map editor and the
//! random map generator. Nothing here knows how objects are registered.

use std::fmt;

use bincode::Options;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Primary object type identifier ("creature", "town", ...).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ObjectTypeId(pub u32);

impl fmt::Display for ObjectTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Secondary identifier of an object kind within its primary type.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SubtypeId(pub u32);

impl fmt::Display for SubtypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite (primary, secondary) key of one object kind.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ObjectKey {
    pub id: ObjectTypeId,
    pub subid: SubtypeId,
}

impl ObjectKey {
    pub const fn new(id: u32, subid: u32) -> Self {
        Self {
            id: ObjectTypeId(id),
            subid: SubtypeId(subid),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.subid)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum TerrainType {
    Dirt = 0,
    Sand = 1,
    Grass = 2,
    Snow = 3,
    Swamp = 4,
    Rough = 5,
    Subterranean = 6,
    Lava = 7,
    Water = 8,
    Rock = 9,
}

impl TerrainType {
    pub const ALL: [TerrainType; 10] = [
        TerrainType::Dirt,
        TerrainType::Sand,
        TerrainType::Grass,
        TerrainType::Snow,
        TerrainType::Swamp,
        TerrainType::Rough,
        TerrainType::Subterranean,
        TerrainType::Lava,
        TerrainType::Water,
        TerrainType::Rock,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            TerrainType::Dirt => "dirt",
            TerrainType::Sand => "sand",
            TerrainType::Grass => "grass",
            TerrainType::Snow => "snow",
            TerrainType::Swamp => "swamp",
            TerrainType::Rough => "rough",
            TerrainType::Subterranean => "subterra",
            TerrainType::Lava => "lava",
            TerrainType::Water => "water",
            TerrainType::Rock => "rock",
        }
    }

    /// Case-insensitive lookup; accepts both `subterra` and `subterranean`.
    pub fn from_name(name: &str) -> Option<Self> {
        let lowered = name.trim().to_ascii_lowercase();
        if lowered == "subterranean" {
            return Some(TerrainType::Subterranean);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|terrain| terrain.name() == lowered)
    }

    pub fn mask(self) -> TerrainMask {
        TerrainMask::from_bits_retain(1 << self.index())
    }
}

bitflags! {
    /// Set of terrains, one bit per [`TerrainType`] index.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct TerrainMask: u32 {
        const DIRT = 1 << 0;
        const SAND = 1 << 1;
        const GRASS = 1 << 2;
        const SNOW = 1 << 3;
        const SWAMP = 1 << 4;
        const ROUGH = 1 << 5;
        const SUBTERRA = 1 << 6;
        const LAVA = 1 << 7;
        const WATER = 1 << 8;
        const ROCK = 1 << 9;
        const LAND = Self::DIRT.bits()
            | Self::SAND.bits()
            | Self::GRASS.bits()
            | Self::SNOW.bits()
            | Self::SWAMP.bits()
            | Self::ROUGH.bits()
            | Self::SUBTERRA.bits()
            | Self::LAVA.bits();
    }
}

impl Default for TerrainMask {
    fn default() -> Self {
        TerrainMask::empty()
    }
}

impl TerrainMask {
    pub fn allows(&self, terrain: TerrainType) -> bool {
        self.contains(terrain.mask())
    }

    pub fn terrains(&self) -> impl Iterator<Item = TerrainType> + '_ {
        TerrainType::ALL
            .into_iter()
            .filter(move |terrain| self.allows(*terrain))
    }
}

/// Placement rules consumed by the random map generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RandomMapInfo {
    /// How valuable this object is, 1k = worthless, 10k = game-changing.
    pub value: u32,
    /// Objects of this kind allowed per map; 0 keeps the generator away from it.
    pub map_limit: u32,
    /// Objects of this kind allowed per zone; 0 keeps it out of every zone.
    pub zone_limit: u32,
    /// 5 = extremely rare, 100 = common.
    pub rarity: u32,
}

impl RandomMapInfo {
    pub fn placeable_on_map(&self) -> bool {
        self.map_limit > 0
    }

    pub fn placeable_in_zone(&self) -> bool {
        self.zone_limit > 0
    }
}

fn default_allowed_terrains() -> TerrainMask {
    TerrainMask::LAND
}

/// Terrain-filtered appearance of one object kind.
///
/// Tile masks use six rows of eight columns, bottom-right anchored; a set bit
/// marks a tile the object blocks (`block_map`) or can be entered from
/// (`visit_map`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectTemplate {
    #[serde(default)]
    pub key: ObjectKey,
    #[serde(default)]
    pub name: Option<String>,
    pub animation: String,
    #[serde(default)]
    pub editor_animation: Option<String>,
    #[serde(default = "default_allowed_terrains")]
    pub allowed_terrains: TerrainMask,
    #[serde(default)]
    pub menu_terrains: TerrainMask,
    #[serde(default)]
    pub visit_dir: u8,
    #[serde(default)]
    pub visit_map: [u8; 6],
    #[serde(default)]
    pub block_map: [u8; 6],
    #[serde(default)]
    pub print_priority: u8,
}

impl ObjectTemplate {
    pub fn new(key: ObjectKey, animation: impl Into<String>) -> Self {
        Self {
            key,
            name: None,
            animation: animation.into(),
            editor_animation: None,
            allowed_terrains: default_allowed_terrains(),
            menu_terrains: TerrainMask::empty(),
            visit_dir: 0,
            visit_map: [0; 6],
            block_map: [0; 6],
            print_priority: 0,
        }
    }

    pub fn with_terrains(mut self, terrains: TerrainMask) -> Self {
        self.allowed_terrains = terrains;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_visitable(&self) -> bool {
        self.visit_map.iter().any(|row| *row != 0)
    }

    /// A template with no allowed terrain can never be picked for placement.
    pub fn is_selectable(&self) -> bool {
        !self.allowed_terrains.is_empty()
    }

    pub fn can_be_placed_at(&self, terrain: TerrainType) -> bool {
        self.allowed_terrains.allows(terrain)
    }

    /// Footprint width in tiles, counted from the anchored right edge.
    pub fn width(&self) -> u32 {
        self.used_rows()
            .map(|row| u8::BITS - row.leading_zeros())
            .max()
            .unwrap_or(0)
    }

    /// Footprint height in tiles, counted from the anchored bottom row.
    pub fn height(&self) -> u32 {
        self.used_rows()
            .position(|row| row != 0)
            .map(|first| (6 - first) as u32)
            .unwrap_or(0)
    }

    fn used_rows(&self) -> impl Iterator<Item = u8> + '_ {
        self.visit_map
            .iter()
            .zip(self.block_map.iter())
            .map(|(visit, block)| visit | block)
    }

    /// Identity used when collapsing legacy records: everything except the
    /// owner key and terrain masks.
    pub fn same_appearance(&self, other: &ObjectTemplate) -> bool {
        self.animation.eq_ignore_ascii_case(&other.animation)
            && self.visit_dir == other.visit_dir
            && self.visit_map == other.visit_map
            && self.block_map == other.block_map
            && self.print_priority == other.print_priority
    }
}

/// Object category carried by legacy appearance records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegacyCategory {
    Ground,
    Town,
    Creature,
    Hero,
    Artifact,
    Resource,
}

impl LegacyCategory {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(LegacyCategory::Ground),
            1 => Some(LegacyCategory::Town),
            2 => Some(LegacyCategory::Creature),
            3 => Some(LegacyCategory::Hero),
            4 => Some(LegacyCategory::Artifact),
            5 => Some(LegacyCategory::Resource),
            _ => None,
        }
    }
}

/// One appearance record of the legacy flat object list.
///
/// Field order is the binary layout; it is not versioned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyDefInfo {
    pub name: String,
    pub visit_map: [u8; 6],
    pub block_map: [u8; 6],
    pub visit_dir: u8,
    pub id: i32,
    pub subid: i32,
    pub terrain_allowed: i32,
    pub terrain_menu: i32,
    pub width: i32,
    pub height: i32,
    pub category: i32,
    pub print_priority: i32,
    pub coverage_map: [u8; 6],
    pub shadow_coverage: [u8; 6],
}

impl LegacyDefInfo {
    pub fn is_visitable(&self) -> bool {
        self.visit_map.iter().any(|row| *row != 0)
    }

    pub fn category(&self) -> Option<LegacyCategory> {
        LegacyCategory::from_raw(self.category)
    }

    /// `None` when either id is negative.
    pub fn key(&self) -> Option<ObjectKey> {
        let id = u32::try_from(self.id).ok()?;
        let subid = u32::try_from(self.subid).ok()?;
        Some(ObjectKey::new(id, subid))
    }
}

#[derive(Debug, Error)]
pub enum LegacyDecodeError {
    #[error("legacy record {index} of {expected} could not be decoded: {source}")]
    Record {
        index: usize,
        expected: usize,
        #[source]
        source: bincode::Error,
    },
}

/// Fixed-width little-endian bincode, the layout `bincode::serialize` writes.
fn record_codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

pub fn encode_legacy_records(records: &[LegacyDefInfo]) -> bincode::Result<Vec<u8>> {
    let mut out = Vec::new();
    for record in records {
        record_codec().serialize_into(&mut out, record)?;
    }
    Ok(out)
}

/// Decodes exactly `count` back-to-back records. Length prefixes are bounded
/// by the bytes left in `data`.
pub fn decode_legacy_records(
    mut data: &[u8],
    count: usize,
) -> Result<Vec<LegacyDefInfo>, LegacyDecodeError> {
    let mut records = Vec::with_capacity(count.min(data.len()));
    for index in 0..count {
        let remaining = data.len() as u64;
        let record: LegacyDefInfo = record_codec()
            .with_limit(remaining)
            .deserialize_from(&mut data)
            .map_err(|source| LegacyDecodeError::Record {
                index,
                expected: count,
                source,
            })?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(id: i32, subid: i32) -> LegacyDefInfo {
        LegacyDefInfo {
            name: "AVWmrnd0.def".to_string(),
            visit_map: [0, 0, 0, 0, 0, 1],
            block_map: [0, 0, 0, 0, 0, 1],
            visit_dir: 0xff,
            id,
            subid,
            terrain_allowed: 0b0000_0111,
            terrain_menu: 0b0000_0001,
            width: 1,
            height: 1,
            category: 2,
            print_priority: 0,
            ..Default::default()
        }
    }

    #[test]
    fn terrain_mask_parses_from_flag_names() {
        let mask: TerrainMask = serde_json::from_str("\"GRASS | DIRT\"").unwrap();
        assert!(mask.allows(TerrainType::Grass));
        assert!(mask.allows(TerrainType::Dirt));
        assert!(!mask.allows(TerrainType::Water));
    }

    #[test]
    fn terrain_lookup_by_name() {
        assert_eq!(TerrainType::from_name("Lava"), Some(TerrainType::Lava));
        assert_eq!(
            TerrainType::from_name("subterranean"),
            Some(TerrainType::Subterranean)
        );
        assert_eq!(TerrainType::from_name("void"), None);
        assert_eq!(TerrainType::Water.mask(), TerrainMask::WATER);
    }

    #[test]
    fn template_defaults_apply_to_sparse_json() {
        let template: ObjectTemplate =
            serde_json::from_str(r#"{ "animation": "AVXboat0" }"#).unwrap();
        assert_eq!(template.allowed_terrains, TerrainMask::LAND);
        assert_eq!(template.key, ObjectKey::default());
        assert!(template.is_selectable());
        assert!(!template.is_visitable());
        assert_eq!(template.height(), 0);
    }

    #[test]
    fn template_footprint_counts_used_tiles() {
        let mut template = ObjectTemplate::new(ObjectKey::new(98, 0), "AVCcasx0");
        template.block_map = [0, 0, 0, 0b0110, 0b1111, 0b0111];
        template.visit_map = [0, 0, 0, 0, 0, 0b0100];
        assert_eq!(template.height(), 3);
        assert_eq!(template.width(), 4);
        assert!(template.is_visitable());
    }

    #[test]
    fn legacy_records_decode_in_field_order() {
        let records = vec![sample_record(54, 0), sample_record(54, 1)];
        let bytes = encode_legacy_records(&records).unwrap();
        let decoded = decode_legacy_records(&bytes, 2).unwrap();
        assert_eq!(decoded, records);
        assert_eq!(decoded[1].key(), Some(ObjectKey::new(54, 1)));
        assert_eq!(decoded[0].category(), Some(LegacyCategory::Creature));
    }

    #[test]
    fn truncated_legacy_payload_reports_record_index() {
        let bytes = encode_legacy_records(&[sample_record(1, 0)]).unwrap();
        let err = decode_legacy_records(&bytes, 2).unwrap_err();
        match err {
            LegacyDecodeError::Record {
                index, expected, ..
            } => {
                assert_eq!(index, 1);
                assert_eq!(expected, 2);
            }
        }
    }

    #[test]
    fn oversized_name_prefix_is_an_error() {
        let mut bytes = (1u64 << 62).to_le_bytes().to_vec();
        bytes.extend_from_slice(b"AVW");
        let err = decode_legacy_records(&bytes, usize::MAX).unwrap_err();
        assert!(matches!(err, LegacyDecodeError::Record { index: 0, .. }));
    }

    #[test]
    fn negative_legacy_ids_have_no_key() {
        assert_eq!(sample_record(-1, 0).key(), None);
    }
}
