//! MACER loop: retrieve, rank, reflect and evolve the query until the
//! gathered context is judged sufficient or the iteration budget runs out.

mod frontier;
mod session;

pub use frontier::{Frontier, FrontierItem};

use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::graph::{Chunk, Community, Entity, Fact, FactKey, GraphStore};
use crate::oracle::prompts::format_triple;
use crate::oracle::{HeuristicJudge, JudgmentOracle};
use crate::ranker::{HeadContext, OracleScorer, RankedCandidate, Ranker};
use crate::reflector::{GateState, SufficiencyGate};
use crate::responder::Responder;
use crate::retriever::{CandidateFact, EntityResolver, Retriever};
use crate::{CtxgraphError, Result};
use session::{GuardedOracle, GuardedStore, Session, StopSignal};

/// Settings for one `reason()` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningConfig {
    pub max_iterations: usize,
    /// Candidates kept per head per hop, and frontier entities carried forward
    pub beam_width: usize,
    pub use_oracle: bool,
    /// Wall-clock budget; expiry behaves like cancellation
    pub timeout: Option<Duration>,
    /// Distinct facts the counting gate needs before declaring sufficiency
    pub sufficiency_min_facts: usize,
    pub oracle_rerank: bool,
    pub chunk_search_limit: usize,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            beam_width: 1,
            use_oracle: false,
            timeout: None,
            sufficiency_min_facts: 3,
            oracle_rerank: false,
            chunk_search_limit: 5,
        }
    }
}

impl ReasoningConfig {
    pub fn new(max_iterations: usize, beam_width: usize, use_oracle: bool) -> Self {
        Self {
            max_iterations,
            beam_width,
            use_oracle,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(CtxgraphError::InvalidConfig(
                "max_iterations must be greater than 0".to_string(),
            ));
        }
        if self.beam_width == 0 {
            return Err(CtxgraphError::InvalidConfig(
                "beam_width must be greater than 0".to_string(),
            ));
        }
        if self.sufficiency_min_facts == 0 {
            return Err(CtxgraphError::InvalidConfig(
                "sufficiency_min_facts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// One selected fact, in the order it was found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatheredContextRecord {
    /// 1-based iteration that found the fact
    pub hop: usize,
    pub fact: Fact,
    pub head_label: String,
    pub tail: Entity,
    pub supporting_chunks: Vec<Chunk>,
    pub supporting_communities: Vec<Community>,
    pub score: f32,
}

/// Result of a reasoning session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasoningOutcome {
    pub query: String,
    /// `None` when nothing was gathered
    pub answer: Option<String>,
    pub gathered_context: Vec<GatheredContextRecord>,
    pub iterations_used: usize,
    pub final_state: GateState,
    /// Rewritten queries, in the order they were used
    pub evolution_queries: Vec<String>,
    pub cancelled: bool,
}

/// Per-call wiring of retriever, ranker, gate and responder.
struct Components {
    retriever: Retriever,
    ranker: Ranker,
    gate: SufficiencyGate,
    responder: Responder,
}

/// Multi-hop reasoner over a [`GraphStore`].
///
/// Holds no per-query state; concurrent `reason()` calls share only the store.
#[derive(Clone)]
pub struct MacerReasoner {
    retriever: Retriever,
    oracle: Option<Arc<dyn JudgmentOracle>>,
}

impl MacerReasoner {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            retriever: Retriever::new(store),
            oracle: None,
        }
    }

    /// Oracle used when `use_oracle` is set. Without one, a [`HeuristicJudge`] stands in.
    pub fn with_oracle(mut self, oracle: Arc<dyn JudgmentOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn EntityResolver>) -> Self {
        self.retriever = self.retriever.with_resolver(resolver);
        self
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    fn components(&self, config: &ReasoningConfig, stop: &StopSignal) -> Components {
        let store: Arc<dyn GraphStore> =
            Arc::new(GuardedStore::new(self.retriever.store().clone(), stop.clone()));
        let retriever = self.retriever.clone().with_store(store);

        if !config.use_oracle {
            return Components {
                retriever,
                ranker: Ranker::heuristic(),
                gate: SufficiencyGate::heuristic(config.sufficiency_min_facts),
                responder: Responder::heuristic(),
            };
        }

        let inner: Arc<dyn JudgmentOracle> = match &self.oracle {
            Some(oracle) => oracle.clone(),
            None => Arc::new(HeuristicJudge::new(config.sufficiency_min_facts)),
        };
        let oracle: Arc<dyn JudgmentOracle> = Arc::new(GuardedOracle::new(inner, stop.clone()));

        let mut ranker = Ranker::new(Arc::new(OracleScorer::new(oracle.clone())));
        if config.oracle_rerank {
            ranker = ranker.with_rerank(oracle.clone());
        }
        Components {
            retriever,
            ranker,
            gate: SufficiencyGate::with_oracle(oracle.clone(), config.sufficiency_min_facts),
            responder: Responder::with_oracle(oracle),
        }
    }

    pub async fn reason(&self, query: &str, config: &ReasoningConfig) -> Result<ReasoningOutcome> {
        self.reason_with_cancel(query, config, CancellationToken::new())
            .await
    }

    /// Like [`reason`](Self::reason), stopping early once `cancel` fires or
    /// the configured timeout passes. A stopped session still answers from
    /// what it gathered, without consulting the oracle.
    pub async fn reason_with_cancel(
        &self,
        query: &str,
        config: &ReasoningConfig,
        cancel: CancellationToken,
    ) -> Result<ReasoningOutcome> {
        config.validate()?;

        let start = Instant::now();
        let stop = StopSignal::new(cancel, config.timeout.map(|t| start + t));
        let components = self.components(config, &stop);
        let mut session = Session::new(query);
        let mut evolution_queries = Vec::new();
        let mut final_state = GateState::Gathering;
        let mut iterations_used = 0;
        let mut cancelled = false;

        log::info!(
            "Reasoning over '{}' (max {} iterations, beam {}, oracle {})",
            query,
            config.max_iterations,
            config.beam_width,
            config.use_oracle
        );

        for iteration in 0..config.max_iterations {
            if stop.triggered() {
                cancelled = true;
                break;
            }
            iterations_used = iteration + 1;
            let hop = iteration + 1;

            let resolved = match components
                .retriever
                .resolve(&session.current_query, config.chunk_search_limit)
                .await
            {
                Ok(resolution) => {
                    log::debug!(
                        "Hop {}: {:?} pathway, {} head(s)",
                        hop,
                        resolution.pathway,
                        resolution.heads.len()
                    );
                    resolution.heads
                }
                Err(e) => {
                    log::warn!("Hop {} resolution failed, treating as empty: {}", hop, e);
                    Vec::new()
                }
            };
            let heads = session.select_heads(resolved);

            let selections = {
                let current_query = session.current_query.as_str();
                let gathered = session.gathered.as_slice();
                join_all(heads.iter().map(|head| {
                    Self::expand_head(
                        head,
                        current_query,
                        gathered,
                        &components,
                        config.beam_width,
                        &stop,
                    )
                }))
                .await
            };

            let before = session.gathered.len();
            for (head, selection) in heads.iter().zip(selections) {
                session.visited.insert(head.clone());
                if let Some((head_label, picked)) = selection {
                    for ranked in picked {
                        session.admit(ranked, &head_label, hop);
                    }
                }
            }
            session.frontier.retain_best(config.beam_width);
            log::debug!(
                "Hop {}: expanded {} head(s), +{} fact(s), frontier {}",
                hop,
                heads.len(),
                session.gathered.len() - before,
                session.frontier.len()
            );

            if stop.triggered() {
                cancelled = true;
                break;
            }

            let decision = components
                .gate
                .evaluate(query, &session.gathered, iteration, config.max_iterations)
                .await;
            final_state = decision.state;
            if final_state.is_terminal() {
                break;
            }
            if let Some(next) = decision.evolution_query {
                log::debug!("Evolved query: {}", next);
                evolution_queries.push(next.clone());
                session.current_query = next;
            }
        }

        let answer = if cancelled {
            final_state = GateState::Exhausted;
            log::warn!("Reasoning stopped early after {} iteration(s)", iterations_used);
            Responder::best_tail(&session.gathered)
        } else {
            components.responder.synthesize(query, &session.gathered).await
        };

        log::info!(
            "Reasoning finished in {:?}: {} after {} iteration(s), {} fact(s)",
            start.elapsed(),
            final_state.as_str(),
            iterations_used,
            session.gathered.len()
        );

        Ok(ReasoningOutcome {
            query: query.to_string(),
            answer,
            gathered_context: session.gathered,
            iterations_used,
            final_state,
            evolution_queries,
            cancelled,
        })
    }

    /// Expand one head and return its label with its best `width` candidates
    /// not gathered yet. Failures yield `None` so sibling heads still contribute.
    async fn expand_head(
        head_id: &str,
        query: &str,
        gathered: &[GatheredContextRecord],
        components: &Components,
        width: usize,
        stop: &StopSignal,
    ) -> Option<(String, Vec<RankedCandidate>)> {
        if stop.triggered() {
            return None;
        }
        let retriever = &components.retriever;
        let candidates = match retriever.expand_neighborhood(head_id, 1).await {
            Ok(candidates) => candidates,
            Err(_) if stop.triggered() => return None,
            Err(e) => {
                let kind = if e.is_transient() { "transient" } else { "permanent" };
                log::warn!("Skipping head {} ({} failure): {}", head_id, kind, e);
                return None;
            }
        };
        if candidates.is_empty() || stop.triggered() {
            return None;
        }

        let entity = match retriever.store().get_entity_context(head_id).await {
            Ok(entity) => entity,
            Err(_) if stop.triggered() => return None,
            Err(e) => {
                log::warn!("No context for head {} ({}), using its id", head_id, e);
                Entity::new(head_id, head_id)
            }
        };
        let paths: Vec<String> = gathered
            .iter()
            .filter(|r| r.fact.tail == head_id)
            .map(|r| format_triple(&r.head_label, &r.fact.relation, &r.tail.label))
            .collect();
        let head = HeadContext::new(entity)
            .with_neighbors(&candidates)
            .with_paths(paths);

        let known: HashSet<FactKey> = gathered.iter().map(|r| r.fact.key()).collect();
        let fresh: Vec<CandidateFact> = candidates
            .into_iter()
            .filter(|c| !known.contains(&c.key()))
            .collect();

        let ranked = components.ranker.rank(query, &head, fresh).await;
        Some((head.entity.label.clone(), ranked.into_iter().take(width).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{InMemoryGraphStore, RelationContext};
    use serde_json::json;

    async fn chain_store() -> Arc<InMemoryGraphStore> {
        let store = Arc::new(InMemoryGraphStore::new());
        for (id, label) in [("N1", "Alpha"), ("N2", "Bravo"), ("N3", "Charlie"), ("N4", "Delta")] {
            store.upsert_entity(&Entity::new(id, label)).await.unwrap();
        }
        for (h, t) in [("N1", "N2"), ("N2", "N3"), ("N3", "N4")] {
            let ctx = RelationContext::default().temporal("step", json!(h));
            store
                .upsert_fact(&Fact::new(h, "NEXT", t, ctx).unwrap(), &[])
                .await
                .unwrap();
        }
        store
    }

    #[test]
    fn test_config_validation() {
        assert!(ReasoningConfig::default().validate().is_ok());
        assert!(matches!(
            ReasoningConfig::new(0, 1, false).validate(),
            Err(CtxgraphError::InvalidConfig(_))
        ));
        assert!(matches!(
            ReasoningConfig::new(3, 0, false).validate(),
            Err(CtxgraphError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_loop() {
        let reasoner = MacerReasoner::new(chain_store().await);
        let err = reasoner
            .reason("Alpha", &ReasoningConfig::new(0, 1, false))
            .await
            .unwrap_err();
        assert!(matches!(err, CtxgraphError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_chain_walks_one_hop_per_iteration() {
        let reasoner = MacerReasoner::new(chain_store().await);
        let config = ReasoningConfig {
            sufficiency_min_facts: 10,
            ..ReasoningConfig::new(3, 1, false)
        };
        let outcome = reasoner.reason("Alpha", &config).await.unwrap();

        let facts: Vec<String> = outcome
            .gathered_context
            .iter()
            .map(|r| r.fact.key().fact_id())
            .collect();
        assert_eq!(facts, vec!["N1_NEXT_N2", "N2_NEXT_N3", "N3_NEXT_N4"]);
        let hops: Vec<usize> = outcome.gathered_context.iter().map(|r| r.hop).collect();
        assert_eq!(hops, vec![1, 2, 3]);
        assert_eq!(outcome.iterations_used, 3);
        assert_eq!(outcome.final_state, GateState::Exhausted);
        assert_eq!(
            outcome.evolution_queries,
            vec![
                "tell me more about Bravo in the context of Alpha",
                "tell me more about Charlie in the context of Alpha",
            ]
        );
    }

    #[tokio::test]
    async fn test_sufficient_stops_early() {
        let reasoner = MacerReasoner::new(chain_store().await);
        let config = ReasoningConfig {
            sufficiency_min_facts: 2,
            ..ReasoningConfig::new(5, 1, false)
        };
        let outcome = reasoner.reason("Alpha", &config).await.unwrap();
        assert_eq!(outcome.final_state, GateState::Sufficient);
        assert_eq!(outcome.iterations_used, 2);
        assert_eq!(outcome.answer.as_deref(), Some("Bravo"));
    }
}
