use std::sync::Arc;

use muse_contracts::{
    BatchJob, EngineError, GenerationMode, GenerationOutput, ImageReference, Settlement,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::GenerationClient;
use crate::limiter::run_chunked;
use crate::variation::generate_diverse_prompts;

/// Fixed per-batch concurrency window for calls to the generation service.
pub const DISPATCH_WINDOW: usize = 2;

/// One user-triggered batch, before dispatch.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub mode: GenerationMode,
    pub character_name: String,
    pub images: Vec<ImageReference>,
    pub base_prompt: String,
    pub text_overlay: String,
    pub count: usize,
    pub use_variations: bool,
}

/// Everything a dispatch produced: the finished job bookkeeping, the scene
/// prompts, and the settlements aligned position-for-position with them.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub job: BatchJob,
    pub prompts: Vec<String>,
    pub settlements: Vec<Settlement<GenerationOutput>>,
}

pub struct BatchOrchestrator {
    client: Arc<dyn GenerationClient>,
}

impl BatchOrchestrator {
    pub fn new(client: Arc<dyn GenerationClient>) -> Self {
        Self { client }
    }

    pub fn new_batch_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Dispatches a batch under a fresh batch id.
    pub async fn dispatch(
        &self,
        request: &BatchRequest,
        on_progress: impl FnMut(usize, usize),
    ) -> Result<DispatchOutcome, EngineError> {
        self.dispatch_with_id(request, Self::new_batch_id(), on_progress)
            .await
    }

    /// Dispatches a batch under a caller-supplied batch id, so callers that
    /// stream progress elsewhere can key their output before the first
    /// settlement arrives.
    pub async fn dispatch_with_id(
        &self,
        request: &BatchRequest,
        batch_id: impl Into<String>,
        mut on_progress: impl FnMut(usize, usize),
    ) -> Result<DispatchOutcome, EngineError> {
        validate_images(request)?;

        let batch_id = batch_id.into();
        let prompts = build_prompt_list(request);
        let task_prompts: Vec<String> = match request.mode {
            GenerationMode::Creative => prompts
                .iter()
                .map(|scene| {
                    creative_task_prompt(&request.character_name, scene, &request.text_overlay)
                })
                .collect(),
            GenerationMode::Fusion => prompts
                .iter()
                .map(|_| fusion_task_prompt(&request.base_prompt))
                .collect(),
        };
        let task_images: Arc<Vec<ImageReference>> = Arc::new(match request.mode {
            GenerationMode::Creative => vec![request.images[0].clone()],
            GenerationMode::Fusion => request.images.clone(),
        });

        info!(
            batch_id = %batch_id,
            mode = request.mode.as_str(),
            total = prompts.len(),
            client = self.client.name(),
            "dispatching batch"
        );

        let mut job = BatchJob::new(batch_id.clone(), prompts.len(), request.mode);
        let tasks: Vec<_> = task_prompts
            .into_iter()
            .map(|prompt| {
                let client = Arc::clone(&self.client);
                let images = Arc::clone(&task_images);
                move || async move { client.generate(&images, &prompt).await }
            })
            .collect();

        let settlements = run_chunked(tasks, DISPATCH_WINDOW, |completed, total| {
            job.note_settled();
            on_progress(completed, total);
        })
        .await?;

        for (index, settlement) in settlements.iter().enumerate() {
            if let Some(reason) = settlement.rejection() {
                warn!(batch_id = %batch_id, index, %reason, "task rejected");
            }
        }
        info!(batch_id = %batch_id, completed = job.completed, "batch settled");

        Ok(DispatchOutcome {
            job,
            prompts,
            settlements,
        })
    }
}

fn validate_images(request: &BatchRequest) -> Result<(), EngineError> {
    match request.mode {
        GenerationMode::Creative if request.images.is_empty() => Err(EngineError::InvalidInput(
            "creative mode requires a subject reference image".to_string(),
        )),
        GenerationMode::Fusion if request.images.len() < 2 => Err(EngineError::InvalidInput(
            "fusion mode requires at least 2 reference images".to_string(),
        )),
        _ => Ok(()),
    }
}

fn build_prompt_list(request: &BatchRequest) -> Vec<String> {
    if request.mode == GenerationMode::Creative && request.use_variations {
        generate_diverse_prompts(&request.base_prompt, request.count)
    } else {
        vec![request.base_prompt.clone(); request.count]
    }
}

pub(crate) fn creative_task_prompt(name: &str, scene: &str, overlay: &str) -> String {
    format!(
        "Place the character \"{name}\" from the reference image into a new scene described \
         as: {scene}.{}",
        text_overlay_clause(overlay)
    )
}

pub(crate) fn fusion_task_prompt(theme: &str) -> String {
    format!(
        "Take the character from the first image. Fuse them into a new scene with the \
         following theme: \"{theme}\". Use the other images provided as strong references \
         for the background, style, and lighting."
    )
}

pub(crate) fn text_overlay_clause(overlay: &str) -> String {
    if overlay.is_empty() {
        String::new()
    } else {
        format!(" with the text \"{overlay}\" written on it")
    }
}
