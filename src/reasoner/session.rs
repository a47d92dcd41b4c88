use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::frontier::Frontier;
use super::GatheredContextRecord;
use crate::graph::{Chunk, Community, Entity, EntityId, Fact, FactKey, FactRecord, GraphStore};
use crate::oracle::{JudgmentOracle, PromptKind};
use crate::ranker::RankedCandidate;
use crate::{CtxgraphError, Result};

/// External cancellation plus an optional wall-clock deadline.
#[derive(Clone)]
pub(crate) struct StopSignal {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl StopSignal {
    pub(crate) fn new(token: CancellationToken, deadline: Option<Instant>) -> Self {
        Self { token, deadline }
    }

    pub(crate) fn triggered(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Refuses to call the wrapped oracle once the session is stopped, so every
/// caller drops to its heuristic path instead.
pub(crate) struct GuardedOracle {
    inner: Arc<dyn JudgmentOracle>,
    stop: StopSignal,
}

impl GuardedOracle {
    pub(crate) fn new(inner: Arc<dyn JudgmentOracle>, stop: StopSignal) -> Self {
        Self { inner, stop }
    }
}

#[async_trait]
impl JudgmentOracle for GuardedOracle {
    async fn judge(&self, kind: PromptKind, payload: &str) -> Result<String> {
        if self.stop.triggered() {
            return Err(CtxgraphError::OracleUnavailable(format!(
                "reasoning stopped before {} judgment",
                kind.as_str()
            )));
        }
        self.inner.judge(kind, payload).await
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Store view for one session: every call made after the stop fails fast
/// without reaching the wrapped store, so a retrieval in flight ends at its
/// next store access.
pub(crate) struct GuardedStore {
    inner: Arc<dyn GraphStore>,
    stop: StopSignal,
}

impl GuardedStore {
    pub(crate) fn new(inner: Arc<dyn GraphStore>, stop: StopSignal) -> Self {
        Self { inner, stop }
    }

    fn check(&self, call: &str) -> Result<()> {
        if self.stop.triggered() {
            return Err(CtxgraphError::StoreUnavailable(format!(
                "reasoning stopped before {}",
                call
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for GuardedStore {
    async fn find_entities_by_label_substring(&self, text: &str) -> Result<Vec<EntityId>> {
        self.check("label lookup")?;
        self.inner.find_entities_by_label_substring(text).await
    }

    async fn get_entity_context(&self, id: &str) -> Result<Entity> {
        self.check("entity lookup")?;
        self.inner.get_entity_context(id).await
    }

    async fn get_outgoing_facts(&self, id: &str) -> Result<Vec<FactRecord>> {
        self.check("fact expansion")?;
        self.inner.get_outgoing_facts(id).await
    }

    async fn search_chunks(&self, text: &str, limit: usize) -> Result<Vec<Chunk>> {
        self.check("chunk search")?;
        self.inner.search_chunks(text, limit).await
    }

    async fn list_entity_labels(&self) -> Result<Vec<(EntityId, String)>> {
        self.check("label listing")?;
        self.inner.list_entity_labels().await
    }

    async fn upsert_entity(&self, entity: &Entity) -> Result<()> {
        self.check("entity upsert")?;
        self.inner.upsert_entity(entity).await
    }

    async fn upsert_chunk(&self, chunk: &Chunk) -> Result<()> {
        self.check("chunk upsert")?;
        self.inner.upsert_chunk(chunk).await
    }

    async fn upsert_community(&self, community: &Community) -> Result<()> {
        self.check("community upsert")?;
        self.inner.upsert_community(community).await
    }

    async fn upsert_fact(&self, fact: &Fact, evidence_chunk_ids: &[String]) -> Result<()> {
        self.check("fact upsert")?;
        self.inner.upsert_fact(fact, evidence_chunk_ids).await
    }
}

/// Session-local state of one `reason()` call.
pub(crate) struct Session {
    pub(crate) current_query: String,
    pub(crate) gathered: Vec<GatheredContextRecord>,
    pub(crate) visited: HashSet<EntityId>,
    pub(crate) frontier: Frontier,
    seen_facts: HashSet<FactKey>,
}

impl Session {
    pub(crate) fn new(query: &str) -> Self {
        Self {
            current_query: query.to_string(),
            gathered: Vec::new(),
            visited: HashSet::new(),
            frontier: Frontier::new(),
            seen_facts: HashSet::new(),
        }
    }

    /// Heads to expand this hop: unvisited resolved heads, or the queued
    /// frontier when every resolved head was already expanded.
    pub(crate) fn select_heads(&mut self, resolved: Vec<EntityId>) -> Vec<EntityId> {
        let mut fresh: Vec<EntityId> = Vec::new();
        for id in resolved {
            if !self.visited.contains(&id) && !fresh.contains(&id) {
                fresh.push(id);
            }
        }
        if !fresh.is_empty() {
            for id in &fresh {
                self.frontier.mark_admitted(id);
            }
            return fresh;
        }

        self.frontier
            .take()
            .into_iter()
            .map(|item| item.entity_id)
            .filter(|id| !self.visited.contains(id))
            .collect()
    }

    /// Append a selected candidate unless its triple was gathered before.
    pub(crate) fn admit(&mut self, ranked: RankedCandidate, head_label: &str, hop: usize) -> bool {
        if !self.seen_facts.insert(ranked.candidate.key()) {
            return false;
        }
        let candidate = ranked.candidate;
        self.frontier.admit(&candidate.tail.id, hop, ranked.score);
        self.gathered.push(GatheredContextRecord {
            hop,
            fact: candidate.to_fact(),
            head_label: head_label.to_string(),
            tail: candidate.tail,
            supporting_chunks: candidate.supporting_chunks,
            supporting_communities: candidate.supporting_communities,
            score: ranked.score,
        });
        true
    }
}
