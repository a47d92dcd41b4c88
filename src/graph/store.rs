//! Storage contract the reasoning engine depends on.

use async_trait::async_trait;

use super::{Chunk, Community, Entity, EntityId, Fact, FactRecord};
use crate::Result;

/// Read/write interface over a context graph backend.
///
/// The reasoner only calls the read half. Writes belong to ingestion and must
/// reject facts whose endpoints are unknown.
#[async_trait]
pub trait GraphStore: Send + Sync {
    // ========== Read Operations ==========

    /// Ids of entities whose label contains `text` (case-insensitive), in insertion order.
    async fn find_entities_by_label_substring(&self, text: &str) -> Result<Vec<EntityId>>;

    /// Full entity record; `NotFound` when the id is unknown.
    async fn get_entity_context(&self, id: &str) -> Result<Entity>;

    /// Outgoing facts of `id`, joined with evidence chunks and the head's communities.
    async fn get_outgoing_facts(&self, id: &str) -> Result<Vec<FactRecord>>;

    /// Chunks whose content contains `text` (case-insensitive), at most `limit`.
    async fn search_chunks(&self, text: &str, limit: usize) -> Result<Vec<Chunk>>;

    /// All entity labels, used when scanning chunk text for mentions.
    async fn list_entity_labels(&self) -> Result<Vec<(EntityId, String)>>;

    // ========== Write Operations ==========

    async fn upsert_entity(&self, entity: &Entity) -> Result<()>;

    async fn upsert_chunk(&self, chunk: &Chunk) -> Result<()>;

    /// Stores the community and links every member; members must exist.
    async fn upsert_community(&self, community: &Community) -> Result<()>;

    /// Stores a fact, merging into an existing record with the same triple.
    async fn upsert_fact(&self, fact: &Fact, evidence_chunk_ids: &[String]) -> Result<()>;
}
