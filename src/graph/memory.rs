//! In-process graph store backed by hash maps.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Chunk, Community, Entity, EntityId, Fact, FactKey, FactRecord, GraphStore};
use crate::{CtxgraphError, Result};

#[derive(Default)]
struct GraphState {
    entities: HashMap<EntityId, Entity>,
    entity_order: Vec<EntityId>,
    chunks: HashMap<String, Chunk>,
    chunk_order: Vec<String>,
    communities: HashMap<String, Community>,
    /// entity id -> community ids, in link order
    memberships: HashMap<EntityId, Vec<String>>,
    facts: HashMap<FactKey, Fact>,
    /// head id -> fact keys, in insertion order
    adjacency: HashMap<EntityId, Vec<FactKey>>,
    /// fact key -> evidence chunk ids
    evidence: HashMap<FactKey, Vec<String>>,
}

/// Graph store kept entirely in memory. Used by tests and the sample CLI.
#[derive(Default)]
pub struct InMemoryGraphStore {
    state: RwLock<GraphState>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, GraphState>> {
        self.state
            .read()
            .map_err(|_| CtxgraphError::StoreUnavailable("graph state lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, GraphState>> {
        self.state
            .write()
            .map_err(|_| CtxgraphError::StoreUnavailable("graph state lock poisoned".to_string()))
    }

    pub fn entity_count(&self) -> usize {
        self.read().map(|s| s.entities.len()).unwrap_or(0)
    }

    pub fn fact_count(&self) -> usize {
        self.read().map(|s| s.facts.len()).unwrap_or(0)
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn find_entities_by_label_substring(&self, text: &str) -> Result<Vec<EntityId>> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.read()?;
        Ok(state
            .entity_order
            .iter()
            .filter(|id| {
                state
                    .entities
                    .get(*id)
                    .is_some_and(|e| e.label.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect())
    }

    async fn get_entity_context(&self, id: &str) -> Result<Entity> {
        let state = self.read()?;
        state
            .entities
            .get(id)
            .cloned()
            .ok_or_else(|| CtxgraphError::NotFound(format!("entity {}", id)))
    }

    async fn get_outgoing_facts(&self, id: &str) -> Result<Vec<FactRecord>> {
        let state = self.read()?;
        let communities: Vec<Community> = state
            .memberships
            .get(id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|cid| state.communities.get(cid).cloned())
                    .collect()
            })
            .unwrap_or_default();

        let keys = match state.adjacency.get(id) {
            Some(keys) => keys,
            None => return Ok(Vec::new()),
        };

        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(fact) = state.facts.get(key) else {
                continue;
            };
            let chunks = state
                .evidence
                .get(key)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|cid| state.chunks.get(cid).cloned())
                        .collect()
                })
                .unwrap_or_default();
            out.push(FactRecord {
                fact: fact.clone(),
                chunks,
                communities: communities.clone(),
            });
        }
        Ok(out)
    }

    async fn search_chunks(&self, text: &str, limit: usize) -> Result<Vec<Chunk>> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let state = self.read()?;
        Ok(state
            .chunk_order
            .iter()
            .filter_map(|id| state.chunks.get(id))
            .filter(|c| c.content.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_entity_labels(&self) -> Result<Vec<(EntityId, String)>> {
        let state = self.read()?;
        Ok(state
            .entity_order
            .iter()
            .filter_map(|id| state.entities.get(id))
            .map(|e| (e.id.clone(), e.label.clone()))
            .collect())
    }

    async fn upsert_entity(&self, entity: &Entity) -> Result<()> {
        entity.validate()?;
        let mut state = self.write()?;
        if !state.entities.contains_key(&entity.id) {
            state.entity_order.push(entity.id.clone());
        }
        state.entities.insert(entity.id.clone(), entity.clone());
        log::debug!("Entity upserted: {}", entity.id);
        Ok(())
    }

    async fn upsert_chunk(&self, chunk: &Chunk) -> Result<()> {
        if chunk.id.trim().is_empty() {
            return Err(CtxgraphError::Validation("Chunk id must not be empty".to_string()));
        }
        let mut state = self.write()?;
        if !state.chunks.contains_key(&chunk.id) {
            state.chunk_order.push(chunk.id.clone());
        }
        state.chunks.insert(chunk.id.clone(), chunk.clone());
        Ok(())
    }

    async fn upsert_community(&self, community: &Community) -> Result<()> {
        let mut state = self.write()?;
        if let Some(missing) = community
            .member_entity_ids
            .iter()
            .find(|id| !state.entities.contains_key(*id))
        {
            return Err(CtxgraphError::Validation(format!(
                "Community {} references unknown entity {}",
                community.id, missing
            )));
        }
        for member in &community.member_entity_ids {
            let links = state.memberships.entry(member.clone()).or_default();
            if !links.contains(&community.id) {
                links.push(community.id.clone());
            }
        }
        match state.communities.get_mut(&community.id) {
            Some(existing) => {
                existing.label = community.label.clone();
                existing.summary = community.summary.clone();
                for member in &community.member_entity_ids {
                    if !existing.member_entity_ids.contains(member) {
                        existing.member_entity_ids.push(member.clone());
                    }
                }
            }
            None => {
                state.communities.insert(community.id.clone(), community.clone());
            }
        }
        Ok(())
    }

    async fn upsert_fact(&self, fact: &Fact, evidence_chunk_ids: &[String]) -> Result<()> {
        fact.validate()?;
        let mut state = self.write()?;
        for endpoint in [&fact.head, &fact.tail] {
            if !state.entities.contains_key(endpoint) {
                return Err(CtxgraphError::Validation(format!(
                    "Fact {} -[{}]-> {} references unknown entity {}",
                    fact.head, fact.relation, fact.tail, endpoint
                )));
            }
        }
        if let Some(missing) = evidence_chunk_ids
            .iter()
            .find(|id| !state.chunks.contains_key(*id))
        {
            return Err(CtxgraphError::Validation(format!(
                "Evidence chunk {} does not exist",
                missing
            )));
        }

        let key = fact.key();
        match state.facts.get_mut(&key) {
            Some(existing) => existing.context.merge(fact.context.clone()),
            None => {
                state.facts.insert(key.clone(), fact.clone());
                state
                    .adjacency
                    .entry(fact.head.clone())
                    .or_default()
                    .push(key.clone());
            }
        }

        let links = state.evidence.entry(key.clone()).or_default();
        for chunk_id in evidence_chunk_ids {
            if !links.contains(chunk_id) {
                links.push(chunk_id.clone());
            }
        }
        log::debug!("Fact upserted: {}", key.fact_id());
        Ok(())
    }
}
