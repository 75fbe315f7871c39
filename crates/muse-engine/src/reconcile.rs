use muse_contracts::{GeneratedRecord, GenerationMode, GenerationOutput, Settlement};

use crate::orchestrator::{text_overlay_clause, BatchRequest};

/// Provenance shared by every record of one batch: where the prompts came
/// from and which source images fed the calls.
#[derive(Debug, Clone)]
pub struct BatchProvenance {
    pub batch_id: String,
    pub mode: GenerationMode,
    pub character_name: String,
    pub base_prompt: String,
    pub text_overlay: String,
    pub source_previews: Vec<String>,
}

impl BatchProvenance {
    pub fn from_request(request: &BatchRequest, batch_id: impl Into<String>) -> Self {
        let source_previews = match request.mode {
            GenerationMode::Creative => request
                .images
                .first()
                .map(|image| vec![image.data_uri()])
                .unwrap_or_default(),
            GenerationMode::Fusion => {
                request.images.iter().map(|image| image.data_uri()).collect()
            }
        };
        Self {
            batch_id: batch_id.into(),
            mode: request.mode,
            character_name: request.character_name.clone(),
            base_prompt: request.base_prompt.clone(),
            text_overlay: request.text_overlay.clone(),
            source_previews,
        }
    }
}

/// Folds position-aligned settlements into display-ready records. Failed
/// entries keep the full provenance of successful ones so a result grid can
/// render them uniformly; only the image/error pair differs.
pub fn reconcile(
    provenance: &BatchProvenance,
    prompts: &[String],
    settlements: Vec<Settlement<GenerationOutput>>,
) -> Vec<GeneratedRecord> {
    settlements
        .into_iter()
        .enumerate()
        .map(|(index, settlement)| {
            let scene = prompts
                .get(index)
                .map(String::as_str)
                .unwrap_or(provenance.base_prompt.as_str());
            let full_prompt = match provenance.mode {
                GenerationMode::Creative => format!(
                    "{} {}{}",
                    provenance.character_name,
                    scene,
                    text_overlay_clause(&provenance.text_overlay)
                ),
                GenerationMode::Fusion => format!(
                    "{}. Fused from {} images.",
                    provenance.base_prompt,
                    provenance.source_previews.len()
                ),
            };
            let base = GeneratedRecord {
                id: format!("{}-{}", provenance.batch_id, index),
                batch_id: provenance.batch_id.clone(),
                image: Vec::new(),
                base_prompt: provenance.base_prompt.clone(),
                text_overlay: provenance.text_overlay.clone(),
                full_prompt,
                caption: None,
                source_previews: provenance.source_previews.clone(),
                error: None,
            };
            match settlement {
                Settlement::Fulfilled(output) => GeneratedRecord {
                    image: output.image,
                    caption: output.caption,
                    ..base
                },
                Settlement::Rejected(reason) => GeneratedRecord {
                    error: Some(reason.display_message()),
                    ..base
                },
            }
        })
        .collect()
}
