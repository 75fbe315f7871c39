use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use muse_contracts::events::{BatchEventWriter, EventPayload};
use muse_contracts::{GeneratedRecord, GenerationMode, ImageReference};
use muse_engine::{
    reconcile, BatchOrchestrator, BatchProvenance, BatchRequest, ClientRegistry, DryrunClient,
    GeminiClient, DEFAULT_GEMINI_MODEL,
};
use serde_json::{json, Map, Value};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "muse-rs", version, about = "Muse character studio batch CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate scene variations of one reference character.
    Creative(CreativeArgs),
    /// Fuse two or more reference images under a shared theme.
    Fusion(FusionArgs),
}

#[derive(Debug, Parser)]
struct CreativeArgs {
    #[arg(long)]
    reference: PathBuf,
    #[arg(long)]
    name: String,
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value = "")]
    overlay: String,
    #[arg(long, default_value_t = 1)]
    count: usize,
    #[arg(long)]
    variations: bool,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value = "dryrun")]
    client: String,
    #[arg(long)]
    model: Option<String>,
}

#[derive(Debug, Parser)]
struct FusionArgs {
    #[arg(long = "image", required = true)]
    images: Vec<PathBuf>,
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value_t = 1)]
    count: usize,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value = "dryrun")]
    client: String,
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Creative(args) => run_creative(args).await,
        Command::Fusion(args) => run_fusion(args).await,
    }
}

async fn run_creative(args: CreativeArgs) -> Result<()> {
    let reference = load_image_reference(&args.reference)?;
    let request = BatchRequest {
        mode: GenerationMode::Creative,
        character_name: args.name,
        images: vec![reference],
        base_prompt: args.prompt,
        text_overlay: args.overlay,
        count: args.count,
        use_variations: args.variations,
    };
    run_batch(
        request,
        &args.out,
        args.events.as_deref(),
        &args.client,
        args.model,
    )
    .await
}

async fn run_fusion(args: FusionArgs) -> Result<()> {
    let images = args
        .images
        .iter()
        .map(|path| load_image_reference(path))
        .collect::<Result<Vec<_>>>()?;
    let request = BatchRequest {
        mode: GenerationMode::Fusion,
        character_name: String::new(),
        images,
        base_prompt: args.prompt,
        text_overlay: String::new(),
        count: args.count,
        use_variations: false,
    };
    run_batch(
        request,
        &args.out,
        args.events.as_deref(),
        &args.client,
        args.model,
    )
    .await
}

async fn run_batch(
    request: BatchRequest,
    out_dir: &Path,
    events: Option<&Path>,
    client_name: &str,
    model: Option<String>,
) -> Result<()> {
    let registry = default_client_registry(model);
    let Some(client) = registry.get(client_name) else {
        bail!(
            "unknown or unavailable client '{client_name}' (available: {})",
            registry.names().join(", ")
        );
    };
    let orchestrator = BatchOrchestrator::new(client);
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let batch_id = BatchOrchestrator::new_batch_id();
    let event_writer = events.map(|path| BatchEventWriter::new(path, batch_id.clone()));
    if let Some(writer) = &event_writer {
        let mut payload = EventPayload::new();
        payload.insert("mode".to_string(), json!(request.mode.as_str()));
        payload.insert("total".to_string(), json!(request.count));
        writer.emit("batch_started", payload)?;
    }

    let progress_writer = event_writer.clone();
    let outcome = orchestrator
        .dispatch_with_id(&request, batch_id.clone(), move |completed, total| {
            eprintln!("[{completed}/{total}] settled");
            if let Some(writer) = &progress_writer {
                let mut payload = EventPayload::new();
                payload.insert("completed".to_string(), json!(completed));
                payload.insert("total".to_string(), json!(total));
                if let Err(err) = writer.emit("item_settled", payload) {
                    tracing::warn!(%err, "failed to append progress event");
                }
            }
        })
        .await?;

    let provenance = BatchProvenance::from_request(&request, batch_id.clone());
    let records = reconcile(&provenance, &outcome.prompts, outcome.settlements);

    let mut ok = 0usize;
    for record in &records {
        if record.image.is_empty() {
            continue;
        }
        let path = out_dir.join(format!("{}.png", record.id));
        fs::write(&path, &record.image)
            .with_context(|| format!("failed to write {}", path.display()))?;
        ok += 1;
    }
    let failed = records.len() - ok;

    let manifest_path = out_dir.join(format!("batch-{batch_id}.json"));
    write_manifest(&manifest_path, &provenance, &records)?;

    if let Some(writer) = &event_writer {
        let mut payload = EventPayload::new();
        payload.insert("ok".to_string(), json!(ok));
        payload.insert("failed".to_string(), json!(failed));
        writer.emit("batch_finished", payload)?;
    }

    println!("{ok} ok, {failed} failed -> {}", out_dir.display());
    Ok(())
}

fn default_client_registry(model: Option<String>) -> ClientRegistry {
    let mut registry = ClientRegistry::new();
    registry.register(Arc::new(DryrunClient));
    let model = model.unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
    match GeminiClient::from_env(model) {
        Ok(client) => registry.register(Arc::new(client)),
        Err(err) => tracing::debug!(%err, "gemini client unavailable"),
    }
    registry
}

fn load_image_reference(path: &Path) -> Result<ImageReference> {
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    image::load_from_memory(&bytes)
        .with_context(|| format!("{} is not a decodable image", path.display()))?;
    Ok(ImageReference::new(BASE64.encode(&bytes), mime_for_path(path)))
}

fn mime_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| extension.to_ascii_lowercase());
    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/png",
    }
}

fn write_manifest(
    path: &Path,
    provenance: &BatchProvenance,
    records: &[GeneratedRecord],
) -> Result<()> {
    let entries: Vec<Value> = records
        .iter()
        .map(|record| sanitize_payload(&serde_json::to_value(record).unwrap_or(Value::Null)))
        .collect();
    let manifest = json!({
        "schema_version": 1,
        "batch_id": provenance.batch_id,
        "mode": provenance.mode.as_str(),
        "base_prompt": provenance.base_prompt,
        "text_overlay": provenance.text_overlay,
        "records": entries,
    });
    fs::write(path, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Drops bulky inline payloads from manifest output; the image artifacts
/// live next to the manifest as files.
fn sanitize_payload(value: &Value) -> Value {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        Value::Array(rows) => Value::Array(rows.iter().map(sanitize_payload).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, row) in map {
                if matches!(key.as_str(), "image" | "source_previews" | "payload" | "data") {
                    out.insert(key.clone(), Value::String("<omitted>".to_string()));
                    continue;
                }
                out.insert(key.clone(), sanitize_payload(row));
            }
            Value::Object(out)
        }
    }
}
