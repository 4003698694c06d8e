pub mod orchestrator;
pub mod store;
pub mod synthesize;

pub use orchestrator::{normalize_query, SearchOrchestrator, SearchOutcome, SearchStats};
pub use store::{MemoryReferenceStore, PgReferenceStore, ReferenceStore};
pub use synthesize::{AnswerOrigin, AnswerSynthesizer, SynthesizedAnswer, MEDICAL_DISCLAIMER};
