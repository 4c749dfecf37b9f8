#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Once;

use core_objects::{LegacyNames, ObjectTypeId, TerrainMask};
use object_schema::LegacyDefInfo;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::Value;

static INIT: Once = Once::new();

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn load_fixture(name: &str) -> Value {
    let path = fixture_path(name);
    let raw = fs::read_to_string(&path)
        .unwrap_or_else(|err| panic!("missing fixture {}: {err}", path.display()));
    serde_json::from_str(&raw).unwrap_or_else(|err| panic!("bad fixture {}: {err}", path.display()))
}

/// Points `OBJECT_CONTENT_PATH` at the mod content fixture once per test binary.
pub fn ensure_test_content() {
    INIT.call_once(|| {
        let content_path = fixture_path("mod_content.json");
        debug_assert!(
            content_path.exists(),
            "missing test content at {}",
            content_path.display()
        );
        std::env::set_var("OBJECT_CONTENT_PATH", &content_path);
    });
}

pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

pub fn legacy_record(name: &str, id: i32, subid: i32, terrains: TerrainMask) -> LegacyDefInfo {
    LegacyDefInfo {
        name: name.to_string(),
        visit_map: [0, 0, 0, 0, 0, 1],
        block_map: [0, 0, 0, 0, 1, 1],
        visit_dir: 0x38,
        id,
        subid,
        terrain_allowed: terrains.bits() as i32,
        terrain_menu: terrains.bits() as i32,
        width: 2,
        height: 2,
        category: 0,
        print_priority: 0,
        coverage_map: [0; 6],
        shadow_coverage: [0; 6],
    }
}

/// Creature generators (17) in three appearances plus a gate (200) that lies
/// beyond the migrated slots.
pub fn legacy_records() -> Vec<LegacyDefInfo> {
    vec![
        legacy_record("AVGcrBl0", 17, 0, TerrainMask::GRASS),
        legacy_record("AVGcrBl0", 17, 0, TerrainMask::SNOW),
        legacy_record("AVGcrBl0", 17, 0, TerrainMask::GRASS),
        legacy_record("AVGcrSw0", 17, 0, TerrainMask::SWAMP),
        legacy_record("AVGbarr0", 17, 2, TerrainMask::LAND),
        legacy_record("AVXgate0", 200, 0, TerrainMask::LAND),
        legacy_record("AVXjunk0", -1, 0, TerrainMask::LAND),
    ]
}

pub fn legacy_names() -> LegacyNames {
    let mut object_names = vec![String::new(); 128];
    object_names[17] = "Creature Generator".to_string();
    let mut custom_names = BTreeMap::new();
    custom_names.insert(
        ObjectTypeId(17),
        vec![
            "Guardhouse".to_string(),
            String::new(),
            "Barracks".to_string(),
        ],
    );
    LegacyNames {
        object_names,
        custom_names,
    }
}
