pub mod source_loader;
pub mod stage_registry;

pub use source_loader::SourceCatalog;
pub use stage_registry::{StageKind, StageRegistry};
