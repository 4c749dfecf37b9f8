use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use core_objects::{
    legacy::LegacyNames, persistence, ObjectContent, RegistryConfig, TypeRegistry,
    CURRENT_FORMAT_VERSION,
};
use object_schema::decode_legacy_records;
use serde_json::{json, Value as JsonValue};

#[derive(Parser, Debug)]
#[command(author, version, about = "Load object content and inspect the resulting registry", long_about = None)]
struct Args {
    /// Content JSON to load (defaults to the builtin content)
    #[arg(long)]
    content: Option<PathBuf>,

    /// Scope the content is loaded into
    #[arg(long, default_value = "core")]
    scope: String,

    /// Binary legacy appearance records to migrate before loading content
    #[arg(long)]
    legacy: Option<PathBuf>,

    /// Number of records in the legacy payload
    #[arg(long, default_value_t = 0)]
    legacy_count: usize,

    /// Legacy object and custom subtype names (JSON)
    #[arg(long)]
    legacy_names: Option<PathBuf>,

    /// Primary slots produced by legacy migration
    #[arg(long, default_value_t = 256)]
    data_size: usize,

    /// Write the encoded registry to this path
    #[arg(long)]
    output: Option<PathBuf>,

    /// Format version used for --output
    #[arg(long, default_value_t = CURRENT_FORMAT_VERSION)]
    format_version: u32,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = RegistryConfig {
        format_version: args.format_version,
        ..RegistryConfig::default()
    };
    let mut registry = TypeRegistry::with_config(config);

    if let Some(path) = &args.legacy {
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read legacy records at {}", path.display()))?;
        let records = decode_legacy_records(&bytes, args.legacy_count)
            .with_context(|| format!("Failed to decode legacy records at {}", path.display()))?;
        let names = match &args.legacy_names {
            Some(names_path) => {
                let raw = fs::read_to_string(names_path).with_context(|| {
                    format!("Failed to read legacy names at {}", names_path.display())
                })?;
                serde_json::from_str::<LegacyNames>(&raw).with_context(|| {
                    format!("Failed to parse legacy names at {}", names_path.display())
                })?
            }
            None => LegacyNames::default(),
        };
        let fragments = registry.load_legacy_data(&records, names, args.data_size);
        tracing::info!(
            records = records.len(),
            fragments = fragments.len(),
            "legacy data migrated"
        );
    }

    let content = match &args.content {
        Some(path) => ObjectContent::from_file(path)
            .with_context(|| format!("Failed to load content at {}", path.display()))?,
        None => ObjectContent::builtin().as_ref().clone(),
    };
    let report = content
        .apply(&mut registry, &args.scope)
        .with_context(|| format!("Failed to register content in scope '{}'", args.scope))?;
    registry.after_load_finalization();

    let summary = summarize(&registry, report.loaded, report.skipped);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&registry);
        println!("loaded={} skipped={}", report.loaded, report.skipped);
    }

    if let Some(path) = &args.output {
        let bytes = persistence::encode(&registry).with_context(|| "Failed to encode registry")?;
        fs::write(path, &bytes)
            .with_context(|| format!("Failed to write registry to {}", path.display()))?;
        println!(
            "wrote {} bytes (format {}, digest {:016x})",
            bytes.len(),
            args.format_version,
            registry.content_digest()?
        );
    }

    Ok(())
}

fn summarize(registry: &TypeRegistry, loaded: usize, skipped: usize) -> JsonValue {
    let containers: Vec<JsonValue> = registry
        .containers()
        .map(|container| {
            let handlers: Vec<JsonValue> = container
                .handlers()
                .map(|(subid, handler)| {
                    json!({
                        "subid": subid.0,
                        "subTypeName": handler.core().sub_type_name(),
                        "customName": handler.custom_name(),
                        "templates": handler.templates().len(),
                        "static": handler.is_static_object(),
                        "rmg": handler.rmg_info(),
                    })
                })
                .collect();
            json!({
                "id": container.id().0,
                "identifier": container.identifier(),
                "name": container.name(),
                "handlerName": container.handler_name(),
                "allowedByDefault": container.allowed_by_default(),
                "subtypes": handlers,
            })
        })
        .collect();
    json!({
        "loaded": loaded,
        "skipped": skipped,
        "containers": containers,
    })
}

fn print_summary(registry: &TypeRegistry) {
    for container in registry.containers() {
        println!(
            "{:>4} {} \"{}\" [{}]",
            container.id().0,
            container.identifier(),
            container.name(),
            container.handler_name()
        );
        for (subid, handler) in container.handlers() {
            let rmg = handler.rmg_info();
            println!(
                "     {:>3} {:<16} templates={} value={} rarity={} limits={}/{}",
                subid.0,
                handler.core().sub_type_name(),
                handler.templates().len(),
                rmg.value,
                rmg.rarity,
                rmg.map_limit,
                rmg.zone_limit
            );
        }
    }
}
