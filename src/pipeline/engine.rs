use crate::error::{Result, ScraperError};
use crate::metrics;
use crate::pipeline::state::PipelineState;
use crate::registry::stage_registry::StageRegistry;
use crate::types::{SourceConfig, StageSpec};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

/// What a stage sees besides the state: which source it runs for and its own spec.
pub struct StageContext<'a> {
    pub source: &'a SourceConfig,
    pub spec: &'a StageSpec,
    pub index: usize,
}

/// One step of a scan pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    async fn process(&self, state: PipelineState, ctx: &StageContext<'_>) -> Result<PipelineState>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

/// An ordered, fully resolved list of stages.
pub struct Pipeline {
    stages: Vec<(StageSpec, Arc<dyn Stage>)>,
    status: PipelineStatus,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            status: PipelineStatus::Idle,
        }
    }

    pub fn with_stage(mut self, spec: StageSpec, stage: Arc<dyn Stage>) -> Self {
        self.stages.push((spec, stage));
        self
    }

    /// Resolves every stage of the source's effective pipeline; unknown keys fail before anything runs.
    pub fn from_source(source: &SourceConfig, registry: &StageRegistry) -> Result<Self> {
        let mut pipeline = Self::new();
        for spec in source.effective_pipeline() {
            let stage = registry.get(&spec.stage)?;
            pipeline = pipeline.with_stage(spec, stage);
        }
        Ok(pipeline)
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|(spec, _)| spec.stage.as_str()).collect()
    }

    /// Runs the stages in order. The first failure halts the run and is returned wrapped in
    /// `ScraperError::Pipeline` with the failing stage's index and key.
    pub async fn execute(&mut self, initial: PipelineState, source: &SourceConfig) -> Result<PipelineState> {
        if self.stages.is_empty() {
            warn!("Pipeline for '{}' has no stages; returning input unchanged", source.id);
            self.status = PipelineStatus::Completed;
            return Ok(initial);
        }

        self.status = PipelineStatus::Running;
        let total = self.stages.len();
        let mut state = initial;

        for (index, (spec, stage)) in self.stages.iter().enumerate() {
            let ctx = StageContext { source, spec, index };
            let span = info_span!("stage", source = %source.id, index = index + 1, stage = %spec.stage);
            info!("🔄 Stage {}/{}: {}", index + 1, total, spec.stage);

            let started = Instant::now();
            match stage.process(state, &ctx).instrument(span).await {
                Ok(next) => {
                    let elapsed = started.elapsed().as_secs_f64();
                    metrics::stage::completed(&spec.stage, elapsed);
                    info!(
                        "✅ Stage {} finished in {:.2}s ({} documents)",
                        spec.stage,
                        elapsed,
                        next.documents.len()
                    );
                    state = next;
                }
                Err(e) => {
                    metrics::stage::failed(&spec.stage, e.kind());
                    error!("❌ Stage {} ({}) failed: {}", index + 1, spec.stage, e);
                    self.status = PipelineStatus::Failed;
                    return Err(ScraperError::Pipeline {
                        stage_index: index,
                        stage_name: spec.stage.clone(),
                        source: Box::new(e),
                    });
                }
            }
        }

        self.status = PipelineStatus::Completed;
        Ok(state)
    }
}
