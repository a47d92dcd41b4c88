use async_trait::async_trait;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ctxgraph::graph::{Entity, InMemoryGraphStore, RelationContext};
use ctxgraph::oracle::{JudgmentOracle, PromptKind};
use ctxgraph::ranker::{order_by_score, RankedCandidate};
use ctxgraph::retriever::CandidateFact;
use ctxgraph::sample::{load_sample, SAMPLE_QUERY};
use ctxgraph::{MacerReasoner, ReasoningConfig, Result};

/// Replays a fixed list of replies, whatever the question.
struct ScriptedOracle {
    replies: Vec<String>,
    next: AtomicUsize,
}

#[async_trait]
impl JudgmentOracle for ScriptedOracle {
    async fn judge(&self, _: PromptKind, _: &str) -> Result<String> {
        let i = self.next.fetch_add(1, Ordering::Relaxed);
        Ok(self.replies[i % self.replies.len()].clone())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn reply() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Y".to_string()),
        Just("N".to_string()),
        Just("maybe".to_string()),
        Just(String::new()),
        Just("The final order: [2, 1]".to_string()),
        Just("The possible answers: [Ulm]".to_string()),
        "[a-zA-Z ]{0,12}",
    ]
}

fn candidate(i: usize) -> CandidateFact {
    CandidateFact {
        head_id: "H".to_string(),
        relation: "R".to_string(),
        tail: Entity::new(format!("T{}", i), format!("tail {}", i)),
        context: RelationContext::default(),
        supporting_chunks: Vec::new(),
        supporting_communities: Vec::new(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn reasoning_terminates_under_any_oracle(
        replies in prop::collection::vec(reply(), 1..8),
        max_iterations in 1usize..6,
        beam_width in 1usize..4,
        oracle_rerank in any::<bool>(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let outcome = runtime.block_on(async {
            let store = Arc::new(InMemoryGraphStore::new());
            load_sample(store.as_ref()).await.unwrap();
            let oracle = ScriptedOracle { replies, next: AtomicUsize::new(0) };
            let config = ReasoningConfig {
                oracle_rerank,
                ..ReasoningConfig::new(max_iterations, beam_width, true)
            };
            MacerReasoner::new(store)
                .with_oracle(Arc::new(oracle))
                .reason(SAMPLE_QUERY, &config)
                .await
                .unwrap()
        });

        prop_assert!(outcome.iterations_used >= 1);
        prop_assert!(outcome.iterations_used <= max_iterations);
        prop_assert!(outcome.final_state.is_terminal());

        // Append-only: hops never go backwards and no triple repeats.
        let hops: Vec<usize> = outcome.gathered_context.iter().map(|r| r.hop).collect();
        prop_assert!(hops.windows(2).all(|w| w[0] <= w[1]));
        prop_assert!(hops.iter().all(|h| *h >= 1 && *h <= outcome.iterations_used));
        let keys: HashSet<_> = outcome.gathered_context.iter().map(|r| r.fact.key()).collect();
        prop_assert_eq!(keys.len(), outcome.gathered_context.len());

        if !outcome.gathered_context.is_empty() {
            prop_assert!(outcome.answer.is_some());
        }
    }

    #[test]
    fn ordering_by_score_is_repeatable_and_stable(
        scores in prop::collection::vec(prop_oneof![Just(0.0f32), Just(0.5), Just(1.0), 0.0f32..2.0], 0..24),
    ) {
        let ranked: Vec<RankedCandidate> = scores
            .iter()
            .enumerate()
            .map(|(i, s)| RankedCandidate { candidate: candidate(i), score: *s })
            .collect();

        let first = order_by_score(ranked.clone());
        let second = order_by_score(ranked);
        prop_assert_eq!(&first, &second);

        for pair in first.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
            if pair[0].score == pair[1].score {
                let a: usize = pair[0].candidate.tail.id[1..].parse().unwrap();
                let b: usize = pair[1].candidate.tail.id[1..].parse().unwrap();
                prop_assert!(a < b);
            }
        }
    }
}
