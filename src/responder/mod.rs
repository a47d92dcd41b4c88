//! Final answer synthesis over the gathered context.

use std::sync::Arc;

use crate::oracle::prompts::{self, EXCERPT_CHARS};
use crate::oracle::{parse_free_text, JudgmentOracle, PromptKind};
use crate::reasoner::GatheredContextRecord;

/// Shown by callers when `synthesize` has nothing to answer with.
pub const INSUFFICIENT_INFORMATION: &str = "Insufficient information to answer the query.";

/// Turns gathered facts into an answer string.
#[derive(Default)]
pub struct Responder {
    oracle: Option<Arc<dyn JudgmentOracle>>,
}

impl Responder {
    pub fn heuristic() -> Self {
        Self { oracle: None }
    }

    pub fn with_oracle(oracle: Arc<dyn JudgmentOracle>) -> Self {
        Self {
            oracle: Some(oracle),
        }
    }

    /// `None` when `context` is empty; the oracle is not consulted then.
    pub async fn synthesize(&self, query: &str, context: &[GatheredContextRecord]) -> Option<String> {
        if context.is_empty() {
            return None;
        }
        let Some(oracle) = &self.oracle else {
            return Self::best_tail(context);
        };

        let materials: Vec<String> = context
            .iter()
            .map(|r| prompts::format_material(&r.fact.relation, &r.tail.label))
            .collect();
        let mut excerpts: Vec<String> = Vec::new();
        for record in context {
            for chunk in &record.supporting_chunks {
                let line = format!("[{}] {}", chunk.id, chunk.excerpt(EXCERPT_CHARS));
                if !excerpts.contains(&line) {
                    excerpts.push(line);
                }
            }
        }
        let payload = prompts::synthesis_prompt(query, &materials, &excerpts);

        match oracle.judge(PromptKind::Synthesize, &payload).await {
            Ok(reply) => {
                let answer = parse_free_text(&reply);
                if answer.is_empty() {
                    log::warn!("Empty synthesis reply, using top-scored fact");
                    Self::best_tail(context)
                } else {
                    Some(answer)
                }
            }
            Err(e) => {
                log::warn!("Synthesis via {} failed ({}), using top-scored fact", oracle.name(), e);
                Self::best_tail(context)
            }
        }
    }

    /// Tail label of the highest-scored record; the earliest wins a tie.
    pub fn best_tail(context: &[GatheredContextRecord]) -> Option<String> {
        let mut best: Option<&GatheredContextRecord> = None;
        for record in context {
            if best.map_or(true, |b| record.score > b.score) {
                best = Some(record);
            }
        }
        best.map(|r| r.tail.label.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Chunk, Entity, Fact, RelationContext};
    use crate::CtxgraphError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn record(relation: &str, tail: &str, label: &str, score: f32) -> GatheredContextRecord {
        GatheredContextRecord {
            hop: 1,
            fact: Fact::new("H", relation, tail, RelationContext::default()).unwrap(),
            head_label: "H".to_string(),
            tail: Entity::new(tail, label),
            supporting_chunks: vec![Chunk::new("C1", "x".repeat(300))],
            supporting_communities: Vec::new(),
            score,
        }
    }

    struct RecordingOracle {
        reply: crate::Result<String>,
        payloads: Mutex<Vec<String>>,
    }

    impl RecordingOracle {
        fn new(reply: crate::Result<String>) -> Self {
            Self {
                reply,
                payloads: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl JudgmentOracle for RecordingOracle {
        async fn judge(&self, _: PromptKind, payload: &str) -> crate::Result<String> {
            self.payloads.lock().unwrap().push(payload.to_string());
            match &self.reply {
                Ok(r) => Ok(r.clone()),
                Err(e) => Err(CtxgraphError::OracleUnavailable(e.to_string())),
            }
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_empty_context_skips_oracle() {
        let oracle = Arc::new(RecordingOracle::new(Ok("anything".into())));
        let responder = Responder::with_oracle(oracle.clone());
        assert_eq!(responder.synthesize("q", &[]).await, None);
        assert!(oracle.payloads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_heuristic_returns_top_scored_tail() {
        let context = vec![
            record("A", "T1", "First", 0.2),
            record("B", "T2", "Second", 0.6),
            record("C", "T3", "Third", 0.6),
        ];
        let answer = Responder::heuristic().synthesize("q", &context).await;
        assert_eq!(answer.as_deref(), Some("Second"));
    }

    #[tokio::test]
    async fn test_oracle_prompt_lists_facts_and_excerpts() {
        let oracle = Arc::new(RecordingOracle::new(Ok(
            "The possible answers: [Nobel Prize in Physics]".into(),
        )));
        let responder = Responder::with_oracle(oracle.clone());
        let context = vec![record("WON", "Q38104", "Nobel Prize in Physics", 0.2)];

        let answer = responder.synthesize("Einstein Nobel prize", &context).await;
        assert_eq!(answer.as_deref(), Some("Nobel Prize in Physics"));

        let payloads = oracle.payloads.lock().unwrap();
        assert!(payloads[0].contains("- WON -> Nobel Prize in Physics"));
        assert!(payloads[0].contains(&format!("[C1] {}...", "x".repeat(EXCERPT_CHARS))));
    }

    #[tokio::test]
    async fn test_oracle_failure_uses_heuristic() {
        let oracle = Arc::new(RecordingOracle::new(Err(CtxgraphError::OracleUnavailable(
            "down".into(),
        ))));
        let responder = Responder::with_oracle(oracle);
        let context = vec![record("WON", "Q38104", "Nobel Prize in Physics", 0.2)];
        let answer = responder.synthesize("q", &context).await;
        assert_eq!(answer.as_deref(), Some("Nobel Prize in Physics"));
    }
}
