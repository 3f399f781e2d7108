use async_trait::async_trait;
use regchange_scraper::app::ports::{JobStatus, JobTracker};
use regchange_scraper::error::{Result, ScraperError};
use regchange_scraper::pipeline::{PipelineState, ScanOrchestrator, ScanStatus, Stage, StageContext};
use regchange_scraper::registry::StageRegistry;
use regchange_scraper::storage::InMemoryJobTracker;
use regchange_scraper::types::{Document, SourceConfig, StageSpec};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Emits one document titled after the source it runs for.
struct Emit;

#[async_trait]
impl Stage for Emit {
    async fn process(&self, mut state: PipelineState, ctx: &StageContext<'_>) -> Result<PipelineState> {
        state.documents.push(Document {
            title: Some(format!("from {}", ctx.source.id)),
            ..Default::default()
        });
        Ok(state)
    }
}

struct Explode;

#[async_trait]
impl Stage for Explode {
    async fn process(&self, _state: PipelineState, ctx: &StageContext<'_>) -> Result<PipelineState> {
        Err(ScraperError::download(&ctx.source.url, "connection refused"))
    }
}

struct Counter(Arc<AtomicUsize>);

#[async_trait]
impl Stage for Counter {
    async fn process(&self, state: PipelineState, _ctx: &StageContext<'_>) -> Result<PipelineState> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(state)
    }
}

fn registry(counter: Arc<AtomicUsize>) -> Arc<StageRegistry> {
    let mut registry = StageRegistry::new();
    registry.register("EMIT", Arc::new(Emit)).unwrap();
    registry.register("EXPLODE", Arc::new(Explode)).unwrap();
    registry.register("COUNT", Arc::new(Counter(counter))).unwrap();
    Arc::new(registry)
}

fn source(id: &str, stages: &[&str]) -> SourceConfig {
    let mut source = SourceConfig::new(id, format!("Source {}", id), format!("https://{}.test/", id));
    source.pipeline = stages.iter().map(|s| StageSpec::new(*s)).collect();
    source
}

#[tokio::test]
async fn successful_run_is_completed_with_documents() {
    let tracker = InMemoryJobTracker::new();
    let orchestrator = ScanOrchestrator::new(registry(Arc::default()), Arc::new(tracker.clone()));

    let outcome = orchestrator.run_source(&source("ok", &["EMIT"]), Some("corr-1")).await;

    assert_eq!(outcome.status, ScanStatus::Completed);
    assert_eq!(outcome.documents.len(), 1);
    let run = tracker.job(outcome.run_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(run.status, JobStatus::Completed);
    assert_eq!(run.correlation_id.as_deref(), Some("corr-1"));
    assert_eq!(run.result_data.unwrap()[0].title.as_deref(), Some("from ok"));
}

#[tokio::test]
async fn failing_source_is_marked_failed_and_later_stages_do_not_run() {
    let counter = Arc::new(AtomicUsize::new(0));
    let tracker = InMemoryJobTracker::new();
    let orchestrator = ScanOrchestrator::new(registry(counter.clone()), Arc::new(tracker.clone()));

    let outcome = orchestrator
        .run_source(&source("bad", &["EMIT", "EXPLODE", "COUNT"]), None)
        .await;

    assert_eq!(outcome.status, ScanStatus::Failed);
    assert!(outcome.documents.is_empty());
    let message = outcome.error.unwrap();
    assert!(message.contains("EXPLODE"));
    assert!(message.contains("connection refused"));
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    let run = tracker.job(outcome.run_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(run.status, JobStatus::Failed);
    assert!(run.error_message.unwrap().contains("connection refused"));
}

#[tokio::test]
async fn one_failing_source_does_not_affect_its_siblings() {
    let counter = Arc::new(AtomicUsize::new(0));
    let tracker = InMemoryJobTracker::new();
    let orchestrator = ScanOrchestrator::new(registry(counter.clone()), Arc::new(tracker.clone()))
        .with_max_concurrent(2);

    let sources = vec![
        source("first", &["EMIT", "COUNT"]),
        source("broken", &["EXPLODE", "COUNT"]),
        source("third", &["EMIT", "COUNT"]),
    ];
    let outcomes = orchestrator.run_all(&sources, Some("batch")).await;

    let ids: Vec<_> = outcomes.iter().map(|o| o.source_id.as_str()).collect();
    assert_eq!(ids, vec!["first", "broken", "third"]);
    let statuses: Vec<_> = outcomes.iter().map(|o| o.status).collect();
    assert_eq!(
        statuses,
        vec![ScanStatus::Completed, ScanStatus::Failed, ScanStatus::Completed]
    );
    assert_eq!(counter.load(Ordering::SeqCst), 2);

    let runs = tracker.all_runs();
    assert_eq!(runs.len(), 3);
    assert_eq!(runs.iter().filter(|r| r.status == JobStatus::Failed).count(), 1);
}

#[tokio::test]
async fn disabled_sources_are_skipped() {
    let tracker = InMemoryJobTracker::new();
    let orchestrator = ScanOrchestrator::new(registry(Arc::default()), Arc::new(tracker.clone()));

    let mut off = source("off", &["EMIT"]);
    off.enabled = false;
    let outcomes = orchestrator.run_all(&[off, source("on", &["EMIT"])], None).await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].source_id, "on");
    assert_eq!(tracker.all_runs().len(), 1);
}

#[tokio::test]
async fn unknown_stage_fails_the_run_instead_of_propagating() {
    let tracker = InMemoryJobTracker::new();
    let orchestrator = ScanOrchestrator::new(registry(Arc::default()), Arc::new(tracker.clone()));

    let outcome = orchestrator.run_source(&source("typo", &["EMITT"]), None).await;

    assert_eq!(outcome.status, ScanStatus::Failed);
    assert!(outcome.error.unwrap().contains("EMITT"));
    assert_eq!(tracker.all_runs()[0].status, JobStatus::Failed);
}

#[tokio::test]
async fn run_reports_default_source_label_or_name() {
    let tracker = InMemoryJobTracker::new();
    let orchestrator = ScanOrchestrator::new(registry(Arc::default()), Arc::new(tracker.clone()));

    let mut labelled = source("labelled", &["EMIT"]);
    labelled.defaults.insert("source".into(), serde_json::json!("Federal Register"));
    orchestrator.run_source(&labelled, None).await;
    orchestrator.run_source(&source("plain", &["EMIT"]), None).await;

    let runs = tracker.all_runs();
    assert_eq!(runs[0].source.as_deref(), Some("Federal Register"));
    assert_eq!(runs[1].source.as_deref(), Some("Source plain"));
}
