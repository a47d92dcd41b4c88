//! Sufficiency gate: decides whether the gathered context answers the query
//! and, when it does not, rewrites the query for the next hop.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use crate::graph::{EntityId, FactKey};
use crate::oracle::prompts;
use crate::oracle::{parse_yes_no, JudgmentOracle, PromptKind};
use crate::reasoner::GatheredContextRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GateState {
    Gathering,
    Sufficient,
    Exhausted,
}

impl GateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateState::Gathering => "GATHERING",
            GateState::Sufficient => "SUFFICIENT",
            GateState::Exhausted => "EXHAUSTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, GateState::Gathering)
    }
}

/// Outcome of one gate evaluation. `evolution_query` is set only while gathering.
#[derive(Debug, Clone, PartialEq)]
pub struct GateDecision {
    pub state: GateState,
    pub evolution_query: Option<String>,
}

/// Number of distinct `(head, relation, tail)` triples in `context`.
pub fn distinct_facts(context: &[GatheredContextRecord]) -> usize {
    context
        .iter()
        .map(|r| r.fact.key())
        .collect::<HashSet<FactKey>>()
        .len()
}

/// Rewritten query aimed at the least-explored tail of the latest hop.
///
/// Among the records of the highest hop, the tail used least often as a head
/// by records of earlier hops is chosen; ties go to the first listed.
pub fn evolution_query(query: &str, context: &[GatheredContextRecord]) -> String {
    let Some(last_hop) = context.iter().map(|r| r.hop).max() else {
        return format!("tell me more about the entities related to '{}'", query);
    };

    let mut expanded: HashMap<&EntityId, usize> = HashMap::new();
    for record in context.iter().filter(|r| r.hop < last_hop) {
        *expanded.entry(&record.fact.head).or_default() += 1;
    }

    let mut target: Option<(&GatheredContextRecord, usize)> = None;
    for record in context.iter().filter(|r| r.hop == last_hop) {
        let uses = expanded.get(&record.fact.tail).copied().unwrap_or(0);
        if target.map_or(true, |(_, best)| uses < best) {
            target = Some((record, uses));
        }
    }

    match target {
        Some((record, _)) => format!(
            "tell me more about {} in the context of {}",
            record.tail.label, query
        ),
        None => format!("tell me more about the entities related to '{}'", query),
    }
}

/// Gathering / sufficient / exhausted state machine around one judgment.
pub struct SufficiencyGate {
    oracle: Option<Arc<dyn JudgmentOracle>>,
    min_facts: usize,
}

impl SufficiencyGate {
    /// Gate that counts facts: sufficient at `min_facts` distinct facts.
    pub fn heuristic(min_facts: usize) -> Self {
        Self {
            oracle: None,
            min_facts: min_facts.max(1),
        }
    }

    /// Gate that asks `oracle`, counting facts only when the oracle fails.
    pub fn with_oracle(oracle: Arc<dyn JudgmentOracle>, min_facts: usize) -> Self {
        Self {
            oracle: Some(oracle),
            min_facts: min_facts.max(1),
        }
    }

    fn heuristic_sufficient(&self, context: &[GatheredContextRecord]) -> bool {
        distinct_facts(context) >= self.min_facts
    }

    async fn is_sufficient(&self, query: &str, context: &[GatheredContextRecord]) -> bool {
        let Some(oracle) = &self.oracle else {
            return self.heuristic_sufficient(context);
        };

        let materials: Vec<String> = context
            .iter()
            .map(|r| prompts::format_material(&r.fact.relation, &r.tail.label))
            .collect();
        let payload = prompts::sufficiency_prompt(query, &materials);

        match oracle.judge(PromptKind::Sufficiency, &payload).await {
            Ok(reply) => match parse_yes_no(&reply) {
                Some(answer) => answer,
                None => {
                    log::warn!("Unrecognised sufficiency reply '{}', counting facts", reply);
                    self.heuristic_sufficient(context)
                }
            },
            Err(e) => {
                log::warn!("Sufficiency check via {} failed ({}), counting facts", oracle.name(), e);
                self.heuristic_sufficient(context)
            }
        }
    }

    /// Judge `context` against the original `query` after zero-based
    /// `iteration` of at most `max_iterations`.
    pub async fn evaluate(
        &self,
        query: &str,
        context: &[GatheredContextRecord],
        iteration: usize,
        max_iterations: usize,
    ) -> GateDecision {
        let state = if !context.is_empty() && self.is_sufficient(query, context).await {
            GateState::Sufficient
        } else if iteration + 1 >= max_iterations {
            GateState::Exhausted
        } else {
            GateState::Gathering
        };

        let evolution_query = match state {
            GateState::Gathering => Some(evolution_query(query, context)),
            _ => None,
        };

        log::debug!(
            "Gate after iteration {}: {} ({} facts)",
            iteration + 1,
            state.as_str(),
            distinct_facts(context)
        );
        GateDecision {
            state,
            evolution_query,
        }
    }
}
