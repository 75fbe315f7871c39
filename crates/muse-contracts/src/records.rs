use serde::{Deserialize, Serialize};

/// Which shape of batch the orchestrator is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Single-subject generation; each task gets an independently varied
    /// scene prompt.
    Creative,
    /// Multi-image fusion; all tasks share identical images and prompt.
    Fusion,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::Creative => "creative",
            GenerationMode::Fusion => "fusion",
        }
    }
}

/// Decoded success payload of one external generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutput {
    pub image: Vec<u8>,
    pub caption: Option<String>,
}

/// Live bookkeeping for one dispatch. Created when the batch launches,
/// advanced once per settlement, discarded with the dispatch outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJob {
    pub batch_id: String,
    pub total: usize,
    pub completed: usize,
    pub mode: GenerationMode,
}

impl BatchJob {
    pub fn new(batch_id: impl Into<String>, total: usize, mode: GenerationMode) -> Self {
        Self {
            batch_id: batch_id.into(),
            total,
            completed: 0,
            mode,
        }
    }

    /// Records one settled task. `completed` never passes `total`.
    pub fn note_settled(&mut self) {
        debug_assert!(self.completed < self.total);
        self.completed = (self.completed + 1).min(self.total);
    }

    pub fn is_finished(&self) -> bool {
        self.completed == self.total
    }
}

/// Display-ready result of one task, success or failure, with full
/// provenance. Exactly one of (`image` non-empty, `error` present) holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedRecord {
    pub id: String,
    pub batch_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub image: Vec<u8>,
    pub base_prompt: String,
    pub text_overlay: String,
    pub full_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub source_previews: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GeneratedRecord {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}
