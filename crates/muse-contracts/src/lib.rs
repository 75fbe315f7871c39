pub mod errors;
pub mod events;
pub mod images;
pub mod records;
pub mod settlement;

pub use errors::EngineError;
pub use images::ImageReference;
pub use records::{BatchJob, GeneratedRecord, GenerationMode, GenerationOutput};
pub use settlement::Settlement;
