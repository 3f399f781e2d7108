use crate::error::Result;
use crate::pipeline::engine::{Stage, StageContext};
use crate::pipeline::processing::expression::{has_placeholder, render};
use crate::pipeline::state::PipelineState;
use crate::types::Document;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, warn};

/// EXPRESSION-EVAL-ENRICHER: renders `${...}` placeholders in every string field.
///
/// Each field sees the document's other fields as they were before evaluation. A failed
/// evaluation keeps the original text.
pub struct ExpressionEnricher;

pub fn evaluate_document(doc: &mut Document) {
    let snapshot = doc.string_fields();
    let mut failures = 0usize;
    doc.map_strings(|field, value| {
        if !has_placeholder(value) {
            return value.to_string();
        }
        let vars: HashMap<String, String> = snapshot
            .iter()
            .filter(|(name, _)| name != field)
            .cloned()
            .collect();
        match render(value, &vars) {
            Ok(rendered) => rendered,
            Err(e) => {
                failures += 1;
                warn!("Keeping '{}' for field {}: {}", value, field, e);
                value.to_string()
            }
        }
    });
    if failures > 0 {
        debug!("{} field(s) left unevaluated", failures);
    }
}

#[async_trait]
impl Stage for ExpressionEnricher {
    async fn process(&self, mut state: PipelineState, _ctx: &StageContext<'_>) -> Result<PipelineState> {
        state.documents.iter_mut().for_each(evaluate_document);
        Ok(state)
    }
}

/// TEXT-CLEANUP-ENRICHER: trims every string field of every document.
pub struct TextCleanupEnricher;

pub fn trim_document(doc: &mut Document) {
    doc.map_strings(|_, value| value.trim().to_string());
}

#[async_trait]
impl Stage for TextCleanupEnricher {
    async fn process(&self, mut state: PipelineState, _ctx: &StageContext<'_>) -> Result<PipelineState> {
        state.documents.iter_mut().for_each(trim_document);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(pairs: &[(&str, &str)]) -> Document {
        let mut d = Document::default();
        for (k, v) in pairs {
            d.set_field(k, *v);
        }
        d
    }

    #[test]
    fn expression_uses_other_fields() {
        let mut d = doc(&[("a", "1"), ("b", "${a}+1")]);
        evaluate_document(&mut d);
        assert_eq!(d.field("b"), Some("2"));
        assert_eq!(d.field("a"), Some("1"));
    }

    #[test]
    fn failing_expression_keeps_literal() {
        let mut d = doc(&[("b", "${a}+1")]);
        evaluate_document(&mut d);
        assert_eq!(d.field("b"), Some("${a}+1"));
    }

    #[test]
    fn typed_fields_are_visible_as_variables() {
        let mut d = doc(&[
            ("identifier", "R-9"),
            ("linkToRegChangeText", "https://x.test/${identifier}"),
        ]);
        evaluate_document(&mut d);
        assert_eq!(d.link_to_reg_change_text.as_deref(), Some("https://x.test/R-9"));
    }

    #[test]
    fn trim_is_idempotent() {
        let mut d = doc(&[("title", "  T  "), ("note", "\n n\t")]);
        trim_document(&mut d);
        let once = d.clone();
        trim_document(&mut d);
        assert_eq!(d, once);
        assert_eq!(d.title.as_deref(), Some("T"));
        assert_eq!(d.field("note"), Some("n"));
    }
}
