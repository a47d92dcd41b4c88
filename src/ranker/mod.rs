//! Candidate scoring and ordering.

mod scorer;

pub use scorer::{CandidateScorer, HeuristicScorer, OracleScorer};

use std::sync::Arc;

use crate::graph::Entity;
use crate::oracle::prompts::{self, RankingEntry};
use crate::oracle::{parse_order, JudgmentOracle, PromptKind};
use crate::retriever::CandidateFact;

/// What the ranker knows about the head a candidate hangs off.
#[derive(Debug, Clone)]
pub struct HeadContext {
    pub entity: Entity,
    /// Metadata description, or the label when there is none
    pub description: String,
    /// Triples sharing this head, quoted as known triples in oracle prompts
    pub neighbor_triples: Vec<String>,
    /// Gathered paths that end at this head
    pub paths: Vec<String>,
}

impl HeadContext {
    pub fn new(entity: Entity) -> Self {
        let description = entity.description().to_string();
        Self {
            entity,
            description,
            neighbor_triples: Vec::new(),
            paths: Vec::new(),
        }
    }

    /// Quote every candidate as `(head, relation, tail)`.
    pub fn with_neighbors(mut self, candidates: &[CandidateFact]) -> Self {
        self.neighbor_triples = candidates
            .iter()
            .map(|c| prompts::format_triple(&self.entity.label, &c.relation, &c.tail.label))
            .collect();
        self
    }

    pub fn with_paths(mut self, paths: Vec<String>) -> Self {
        self.paths = paths;
        self
    }
}

/// A candidate with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub candidate: CandidateFact,
    pub score: f32,
}

/// Stable sort by score, highest first. Equal scores keep input order.
pub fn order_by_score(mut ranked: Vec<RankedCandidate>) -> Vec<RankedCandidate> {
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}

/// Scores candidates with the configured strategy and orders them.
///
/// A failing scorer call is retried once with [`HeuristicScorer`].
pub struct Ranker {
    scorer: Arc<dyn CandidateScorer>,
    fallback: HeuristicScorer,
    rerank_oracle: Option<Arc<dyn JudgmentOracle>>,
}

impl Ranker {
    pub fn new(scorer: Arc<dyn CandidateScorer>) -> Self {
        Self {
            scorer,
            fallback: HeuristicScorer,
            rerank_oracle: None,
        }
    }

    pub fn heuristic() -> Self {
        Self::new(Arc::new(HeuristicScorer))
    }

    /// Let `oracle` reorder the scored list with a RANK prompt.
    pub fn with_rerank(mut self, oracle: Arc<dyn JudgmentOracle>) -> Self {
        self.rerank_oracle = Some(oracle);
        self
    }

    pub async fn score(&self, query: &str, head: &HeadContext, candidate: &CandidateFact) -> f32 {
        match self.scorer.score(query, head, candidate).await {
            Ok(score) => score,
            Err(e) => {
                log::warn!(
                    "{} scorer failed on {} ({}), retrying with heuristic",
                    self.scorer.name(),
                    candidate.key().fact_id(),
                    e
                );
                self.fallback.score_sync(query, candidate)
            }
        }
    }

    pub async fn rank(
        &self,
        query: &str,
        head: &HeadContext,
        candidates: Vec<CandidateFact>,
    ) -> Vec<RankedCandidate> {
        let mut ranked = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let score = self.score(query, head, &candidate).await;
            ranked.push(RankedCandidate { candidate, score });
        }
        let ranked = order_by_score(ranked);

        match &self.rerank_oracle {
            Some(oracle) if ranked.len() > 1 => {
                self.rerank_with_oracle(oracle.as_ref(), query, head, ranked).await
            }
            _ => ranked,
        }
    }

    /// Apply `The final order: [..]` from the oracle. Candidates the reply
    /// leaves out follow in their scored order; an unusable reply changes nothing.
    pub async fn rerank_with_oracle(
        &self,
        oracle: &dyn JudgmentOracle,
        query: &str,
        head: &HeadContext,
        ranked: Vec<RankedCandidate>,
    ) -> Vec<RankedCandidate> {
        let entries: Vec<RankingEntry> = ranked
            .iter()
            .map(|r| RankingEntry {
                name: r.candidate.tail.label.clone(),
                description: r.candidate.tail.description().to_string(),
            })
            .collect();
        let payload = prompts::ranking_prompt(query, &head.description, &entries);

        let reply = match oracle.judge(PromptKind::Rank, &payload).await {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("Re-ranking skipped: {}", e);
                return ranked;
            }
        };
        let Some(order) = parse_order(&reply, ranked.len()) else {
            log::debug!("Unparseable ranking reply: {}", reply);
            return ranked;
        };

        let mut slots: Vec<Option<RankedCandidate>> = ranked.into_iter().map(Some).collect();
        let mut reordered: Vec<RankedCandidate> = order
            .into_iter()
            .filter_map(|i| slots.get_mut(i).and_then(Option::take))
            .collect();
        reordered.extend(slots.into_iter().flatten());
        reordered
    }
}
