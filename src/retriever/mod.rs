//! Retrieval: query text to head entities, head entities to candidate facts.
//!
//! Two pathways feed the reasoner. The structural one resolves entity labels
//! directly; the textual one searches chunk content and lifts the entities
//! mentioned there. The textual pathway only runs when the structural one
//! comes back empty.

mod resolver;

pub use resolver::{significant_tokens, EntityResolver, SubstringResolver};

use std::collections::HashSet;
use std::sync::Arc;

use crate::graph::{Chunk, Community, Entity, EntityId, Fact, FactKey, GraphStore, RelationContext};
use crate::{CtxgraphError, Result};

/// One outgoing fact with everything the ranker and responder need.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFact {
    pub head_id: EntityId,
    pub relation: String,
    pub tail: Entity,
    pub context: RelationContext,
    pub supporting_chunks: Vec<Chunk>,
    pub supporting_communities: Vec<Community>,
}

impl CandidateFact {
    pub fn key(&self) -> FactKey {
        FactKey {
            head: self.head_id.clone(),
            relation: self.relation.clone(),
            tail: self.tail.id.clone(),
        }
    }

    pub fn to_fact(&self) -> Fact {
        Fact {
            head: self.head_id.clone(),
            relation: self.relation.clone(),
            tail: self.tail.id.clone(),
            context: self.context.clone(),
        }
    }
}

/// Which pathway produced a set of heads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalPathway {
    /// Entity labels matched the query
    Structural,
    /// Entities were lifted from matching chunk text
    Textual,
    /// Neither pathway found anything
    Empty,
}

/// Heads resolved for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub heads: Vec<EntityId>,
    pub pathway: RetrievalPathway,
}

fn retrieval_failed(action: &str, target: &str, err: CtxgraphError) -> CtxgraphError {
    CtxgraphError::RetrievalFailed(format!("{} '{}': {}", action, target, err))
}

/// Read-only access to the graph on behalf of the reasoner.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn GraphStore>,
    resolver: Arc<dyn EntityResolver>,
}

impl Retriever {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            resolver: Arc::new(SubstringResolver),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn EntityResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Same resolver over a different store.
    pub fn with_store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Entity ids the query refers to, via the configured resolver.
    pub async fn resolve_entities(&self, query: &str) -> Result<Vec<EntityId>> {
        self.resolver
            .resolve(self.store.as_ref(), query)
            .await
            .map_err(|e| retrieval_failed("resolving", query, e))
    }

    /// Outgoing facts up to `k` hops away from `entity_id`, each joined with
    /// its tail entity, evidence chunks and the head's communities.
    ///
    /// The reasoner always asks for `k = 1` and reaches further hops by
    /// iterating. `k = 0` yields nothing.
    pub async fn expand_neighborhood(&self, entity_id: &str, k: usize) -> Result<Vec<CandidateFact>> {
        let mut candidates = Vec::new();
        let mut seen: HashSet<EntityId> = HashSet::from([entity_id.to_string()]);
        let mut layer = vec![entity_id.to_string()];

        for _ in 0..k {
            let mut next = Vec::new();
            for head in &layer {
                let records = self
                    .store
                    .get_outgoing_facts(head)
                    .await
                    .map_err(|e| retrieval_failed("expanding", head, e))?;

                for record in records {
                    let tail = self
                        .store
                        .get_entity_context(&record.fact.tail)
                        .await
                        .map_err(|e| retrieval_failed("loading tail", &record.fact.tail, e))?;
                    if seen.insert(tail.id.clone()) {
                        next.push(tail.id.clone());
                    }
                    candidates.push(CandidateFact {
                        head_id: record.fact.head,
                        relation: record.fact.relation,
                        tail,
                        context: record.fact.context,
                        supporting_chunks: record.chunks,
                        supporting_communities: record.communities,
                    });
                }
            }
            if next.is_empty() {
                break;
            }
            layer = next;
        }

        log::debug!(
            "Expanded {} ({} hop(s)): {} candidate(s)",
            entity_id,
            k,
            candidates.len()
        );
        Ok(candidates)
    }

    /// Chunks whose content contains `text`.
    pub async fn search_chunks(&self, text: &str, limit: usize) -> Result<Vec<Chunk>> {
        self.store
            .search_chunks(text, limit)
            .await
            .map_err(|e| retrieval_failed("searching chunks for", text, e))
    }

    /// Dual-pathway resolution: entity labels first, chunk text otherwise.
    pub async fn resolve(&self, query: &str, chunk_limit: usize) -> Result<Resolution> {
        let heads = self.resolve_entities(query).await?;
        if !heads.is_empty() {
            return Ok(Resolution {
                heads,
                pathway: RetrievalPathway::Structural,
            });
        }

        let chunks = self.chunks_for_query(query, chunk_limit).await?;
        if chunks.is_empty() {
            return Ok(Resolution {
                heads: Vec::new(),
                pathway: RetrievalPathway::Empty,
            });
        }

        let labels = self
            .store
            .list_entity_labels()
            .await
            .map_err(|e| retrieval_failed("listing labels for", query, e))?;

        let mut heads = Vec::new();
        for chunk in &chunks {
            let content = chunk.content.to_lowercase();
            for (id, label) in &labels {
                if !label.is_empty() && content.contains(&label.to_lowercase()) && !heads.contains(id) {
                    heads.push(id.clone());
                }
            }
        }

        log::debug!(
            "Textual pathway for '{}': {} chunk(s), {} head(s)",
            query,
            chunks.len(),
            heads.len()
        );
        let pathway = if heads.is_empty() {
            RetrievalPathway::Empty
        } else {
            RetrievalPathway::Textual
        };
        Ok(Resolution { heads, pathway })
    }

    async fn chunks_for_query(&self, query: &str, limit: usize) -> Result<Vec<Chunk>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let chunks = self.search_chunks(query.trim(), limit).await?;
        if !chunks.is_empty() {
            return Ok(chunks);
        }

        let mut found: Vec<Chunk> = Vec::new();
        for token in significant_tokens(query) {
            for chunk in self.search_chunks(&token, limit).await? {
                if !found.iter().any(|c| c.id == chunk.id) {
                    found.push(chunk);
                }
                if found.len() >= limit {
                    return Ok(found);
                }
            }
        }
        Ok(found)
    }
}
