// Scan pipeline: engine, state, built-in stages, document processing and orchestration

pub mod engine;
pub mod orchestrator;
pub mod processing;
pub mod stages;
pub mod state;

pub use engine::{Pipeline, PipelineStatus, Stage, StageContext};
pub use orchestrator::{ScanOrchestrator, ScanOutcome, ScanStatus};
pub use state::PipelineState;
