use async_trait::async_trait;
use std::sync::Arc;

use super::HeadContext;
use crate::oracle::prompts;
use crate::oracle::{parse_yes_no, JudgmentOracle, PromptKind};
use crate::retriever::CandidateFact;
use crate::Result;

const RELATION_WEIGHT: f32 = 0.5;
const TAIL_WEIGHT: f32 = 0.3;
const TEMPORAL_WEIGHT: f32 = 0.1;
const PROVENANCE_WEIGHT: f32 = 0.1;

const CHECK_PASSED: f32 = 1.0;
const CHECK_FAILED: f32 = 0.5;

/// Scores one candidate fact against a query and its head's context.
#[async_trait]
pub trait CandidateScorer: Send + Sync {
    async fn score(&self, query: &str, head: &HeadContext, candidate: &CandidateFact) -> Result<f32>;

    fn name(&self) -> &'static str;
}

/// Weighted keyword score. Never fails.
///
/// | signal                                     | weight |
/// |--------------------------------------------|--------|
/// | relation name in the query                 | 0.5    |
/// | tail label or tail id in the query         | 0.3    |
/// | temporal context present                   | 0.1    |
/// | at least one provenance source             | 0.1    |
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScorer;

impl HeuristicScorer {
    pub fn score_sync(&self, query: &str, candidate: &CandidateFact) -> f32 {
        let query = query.to_lowercase();
        let mut score = 0.0;

        let relation = candidate.relation.to_lowercase();
        if !relation.is_empty()
            && (query.contains(&relation) || query.contains(&relation.replace('_', " ")))
        {
            score += RELATION_WEIGHT;
        }

        let label = candidate.tail.label.to_lowercase();
        let id = candidate.tail.id.to_lowercase();
        if (!label.is_empty() && query.contains(&label)) || (!id.is_empty() && query.contains(&id)) {
            score += TAIL_WEIGHT;
        }

        if candidate.context.has_temporal() {
            score += TEMPORAL_WEIGHT;
        }
        if !candidate.context.provenance.is_empty() {
            score += PROVENANCE_WEIGHT;
        }
        score
    }
}

#[async_trait]
impl CandidateScorer for HeuristicScorer {
    async fn score(&self, query: &str, _head: &HeadContext, candidate: &CandidateFact) -> Result<f32> {
        Ok(self.score_sync(query, candidate))
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

/// Two oracle checks, each worth 1.0 when passed and 0.5 otherwise:
/// entity-type consistency against the head's other triples, and support
/// for the relation from the gathered paths.
pub struct OracleScorer {
    oracle: Arc<dyn JudgmentOracle>,
}

impl OracleScorer {
    pub fn new(oracle: Arc<dyn JudgmentOracle>) -> Self {
        Self { oracle }
    }

    async fn check(&self, kind: PromptKind, payload: &str) -> Result<f32> {
        let reply = self.oracle.judge(kind, payload).await?;
        Ok(match parse_yes_no(&reply) {
            Some(true) => CHECK_PASSED,
            Some(false) => CHECK_FAILED,
            None => {
                log::debug!("Unrecognised {} reply: {}", kind.as_str(), reply);
                CHECK_FAILED
            }
        })
    }
}

#[async_trait]
impl CandidateScorer for OracleScorer {
    async fn score(&self, _query: &str, head: &HeadContext, candidate: &CandidateFact) -> Result<f32> {
        let test = prompts::format_triple(&head.entity.label, &candidate.relation, &candidate.tail.label);
        let known: Vec<String> = head
            .neighbor_triples
            .iter()
            .filter(|t| **t != test)
            .cloned()
            .collect();

        let type_score = self
            .check(
                PromptKind::TypeConsistency,
                &prompts::type_consistency_prompt(&test, &known),
            )
            .await?;
        let support_score = self
            .check(
                PromptKind::SubgraphSupport,
                &prompts::subgraph_support_prompt(&test, &known, &head.paths),
            )
            .await?;
        Ok(type_score + support_score)
    }

    fn name(&self) -> &'static str {
        "oracle"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Entity, RelationContext};
    use crate::oracle::HeuristicJudge;
    use serde_json::json;

    fn nobel_candidate() -> CandidateFact {
        CandidateFact {
            head_id: "Q937".to_string(),
            relation: "WON".to_string(),
            tail: Entity::new("Q38104", "Nobel Prize in Physics"),
            context: RelationContext::default()
                .temporal("year", json!(1921))
                .provenance("Nobel Foundation"),
            supporting_chunks: Vec::new(),
            supporting_communities: Vec::new(),
        }
    }

    fn head() -> HeadContext {
        HeadContext::new(Entity::new("Q937", "Albert Einstein"))
    }

    #[tokio::test]
    async fn test_full_heuristic_score() {
        let score = HeuristicScorer
            .score("Q937 WON Q38104", &head(), &nobel_candidate())
            .await
            .unwrap();
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_partial_heuristic_scores() {
        let candidate = nobel_candidate();
        let context_only = HeuristicScorer.score_sync("Einstein Nobel prize", &candidate);
        assert!((context_only - 0.2).abs() < 1e-6);

        let label_match = HeuristicScorer.score_sync("nobel prize in physics", &candidate);
        assert!((label_match - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_underscore_relation_matches_spaced_words() {
        let mut candidate = nobel_candidate();
        candidate.relation = "AWARDED_BY".to_string();
        candidate.context = RelationContext::default();
        let score = HeuristicScorer.score_sync("who is it awarded by", &candidate);
        assert!((score - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_oracle_scorer_sums_checks() {
        let scorer = OracleScorer::new(Arc::new(HeuristicJudge::new(3)));
        let candidate = nobel_candidate();

        // No sibling triples and no paths: type passes, support fails.
        let head = head().with_neighbors(std::slice::from_ref(&candidate));
        let score = scorer.score("q", &head, &candidate).await.unwrap();
        assert!((score - 1.5).abs() < 1e-6);

        let head = head.with_paths(vec!["(Q1, KNOWS, Albert Einstein)".to_string()]);
        let score = scorer.score("q", &head, &candidate).await.unwrap();
        assert!((score - 2.0).abs() < 1e-6);
    }
}
