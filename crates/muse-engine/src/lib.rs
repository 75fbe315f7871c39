pub mod client;
pub mod limiter;
pub mod orchestrator;
pub mod reconcile;
pub mod variation;

pub use client::{
    ClientRegistry, DryrunClient, GeminiClient, GenerationClient, DEFAULT_GEMINI_MODEL,
};
pub use limiter::run_chunked;
pub use orchestrator::{BatchOrchestrator, BatchRequest, DispatchOutcome, DISPATCH_WINDOW};
pub use reconcile::{reconcile, BatchProvenance};
pub use variation::{generate_diverse_prompts, VariationDimension};
