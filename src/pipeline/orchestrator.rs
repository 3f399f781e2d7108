use crate::app::ports::{JobTracker, StartJob};
use crate::error::ScraperError;
use crate::metrics;
use crate::pipeline::engine::Pipeline;
use crate::pipeline::state::PipelineState;
use crate::registry::stage_registry::StageRegistry;
use crate::types::{Document, SourceConfig};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    Completed,
    Failed,
}

/// Result of scanning one source. Failures are captured here rather than returned as errors.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    pub source_id: String,
    pub run_id: Option<i64>,
    pub status: ScanStatus,
    pub documents: Vec<Document>,
    pub error: Option<String>,
}

impl ScanOutcome {
    fn failed(source_id: &str, run_id: Option<i64>, error: String) -> Self {
        Self {
            source_id: source_id.to_string(),
            run_id,
            status: ScanStatus::Failed,
            documents: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ScanStatus::Completed
    }
}

/// Runs source pipelines and reports each run to the job tracker.
pub struct ScanOrchestrator {
    registry: Arc<StageRegistry>,
    tracker: Arc<dyn JobTracker>,
    max_concurrent: usize,
}

impl ScanOrchestrator {
    pub fn new(registry: Arc<StageRegistry>, tracker: Arc<dyn JobTracker>) -> Self {
        Self {
            registry,
            tracker,
            max_concurrent: 1,
        }
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    /// start → pipeline → complete | fail for one source.
    pub async fn run_source(&self, source: &SourceConfig, correlation_id: Option<&str>) -> ScanOutcome {
        let span = info_span!("scan", source = %source.id, correlation_id = correlation_id.unwrap_or(""));
        self.run_source_inner(source, correlation_id).instrument(span).await
    }

    async fn run_source_inner(&self, source: &SourceConfig, correlation_id: Option<&str>) -> ScanOutcome {
        let started = Instant::now();
        info!("🚀 Starting scan of {} ({})", source.name, source.url);

        let request = StartJob {
            job_id: source.id.clone(),
            correlation_id: correlation_id.map(str::to_string),
            job_name: Some(source.name.clone()),
            source: Some(source.reporting_source()),
        };
        let run_id = match self.tracker.start(request).await {
            Ok(started) => started.run_id,
            Err(e) => {
                error!("❌ Could not start run for {}: {}", source.id, e);
                metrics::scan::failed(&source.id);
                return ScanOutcome::failed(&source.id, None, format!("start failed: {}", e));
            }
        };

        let result = match Pipeline::from_source(source, &self.registry) {
            Ok(mut pipeline) => {
                let state = PipelineState::for_run(Some(run_id), correlation_id.map(str::to_string));
                pipeline.execute(state, source).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(state) => match self.tracker.complete(run_id, &state.documents).await {
                Ok(affected) => {
                    if affected == 0 {
                        warn!("⚠️ Run {} was no longer RUNNING when completing", run_id);
                    }
                    let elapsed = started.elapsed().as_secs_f64();
                    metrics::scan::completed(&source.id, state.documents.len(), elapsed);
                    info!(
                        "🎉 Scan of {} completed: {} document(s) in {:.2}s",
                        source.id,
                        state.documents.len(),
                        elapsed
                    );
                    ScanOutcome {
                        source_id: source.id.clone(),
                        run_id: Some(run_id),
                        status: ScanStatus::Completed,
                        documents: state.documents,
                        error: None,
                    }
                }
                Err(e) => {
                    error!("❌ Could not record completion of run {}: {}", run_id, e);
                    self.mark_failed(source, run_id, &e).await
                }
            },
            Err(e) => {
                error!("💥 Scan of {} failed: {}", source.id, e);
                self.mark_failed(source, run_id, &e).await
            }
        }
    }

    async fn mark_failed(&self, source: &SourceConfig, run_id: i64, cause: &ScraperError) -> ScanOutcome {
        let message = cause.to_string();
        if let Err(e) = self.tracker.fail(run_id, Some(&message)).await {
            warn!("Could not mark run {} as failed: {}", run_id, e);
        }
        metrics::scan::failed(&source.id);
        ScanOutcome::failed(&source.id, Some(run_id), message)
    }

    /// Runs every enabled source with bounded concurrency; outcomes keep the input order.
    pub async fn run_all(&self, sources: &[SourceConfig], correlation_id: Option<&str>) -> Vec<ScanOutcome> {
        let enabled: Vec<&SourceConfig> = sources
            .iter()
            .filter(|s| {
                if !s.enabled {
                    info!("⏭️ Skipping disabled source {}", s.id);
                }
                s.enabled
            })
            .collect();
        info!(
            "📋 Scanning {} source(s), up to {} at a time",
            enabled.len(),
            self.max_concurrent
        );

        let outcomes: Vec<ScanOutcome> = stream::iter(enabled)
            .map(|source| self.run_source(source, correlation_id))
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        info!(
            "🏁 Finished {} scan(s): {} completed, {} failed",
            outcomes.len(),
            outcomes.len() - failed,
            failed
        );
        outcomes
    }
}
