//! SQLite-backed graph store.
//!
//! Facts are reified as rows unique on `(head, relation, tail)`; evidence
//! and community membership are link tables. Every call runs on a blocking task.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use super::{
    Chunk, Community, ContextMap, Entity, EntityId, Fact, FactKey, FactRecord, GraphStore,
    NodeKind, RelationContext,
};
use crate::db::{migrate, Db};
use crate::{CtxgraphError, Result};

/// Graph store persisted in a SQLite file.
#[derive(Clone)]
pub struct SqliteGraphStore {
    db: Db,
}

impl SqliteGraphStore {
    /// Open (or create) the store at `path` and apply pending migrations.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Db::new(path);
        db.with_connection(migrate::run_migrations).await?;
        log::info!("Graph store ready at {}", db.path().display());
        Ok(Self { db })
    }
}

fn entity_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<[String; 6]> {
    Ok([
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ])
}

fn decode_entity(cols: [String; 6]) -> Result<Entity> {
    let [id, label, kind, attributes, metadata, links] = cols;
    Ok(Entity {
        id,
        label,
        kind: NodeKind::parse(&kind)?,
        attributes: serde_json::from_str(&attributes)?,
        metadata: serde_json::from_str(&metadata)?,
        external_links: serde_json::from_str(&links)?,
    })
}

fn load_context(conn: &Connection, key: &FactKey) -> Result<Option<RelationContext>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT context_json FROM facts WHERE head = ?1 AND relation = ?2 AND tail = ?3",
            params![key.head, key.relation, key.tail],
            |row| row.get(0),
        )
        .optional()?;
    match json {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

fn entity_exists(conn: &Connection, id: &str) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT 1 FROM entities WHERE id = ?1")?;
    Ok(stmt.exists([id])?)
}

fn communities_of(conn: &Connection, entity_id: &str) -> Result<Vec<Community>> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.label, m.summary \
         FROM community_members cm JOIN communities m ON m.id = cm.community_id \
         WHERE cm.entity_id = ?1 ORDER BY cm.rowid",
    )?;
    let rows = stmt
        .query_map([entity_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    let mut members_stmt = conn.prepare(
        "SELECT entity_id FROM community_members WHERE community_id = ?1 ORDER BY rowid",
    )?;
    let mut out = Vec::with_capacity(rows.len());
    for (id, label, summary) in rows {
        let members = members_stmt
            .query_map([&id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        out.push(Community::new(id, label, summary, members));
    }
    Ok(out)
}

fn evidence_of(conn: &Connection, fact_seq: i64) -> Result<Vec<Chunk>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.content, c.metadata_json \
         FROM fact_evidence fe JOIN chunks c ON c.id = fe.chunk_id \
         WHERE fe.fact_seq = ?1 ORDER BY fe.rowid",
    )?;
    let rows = stmt
        .query_map([fact_seq], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    rows.into_iter()
        .map(|(id, content, metadata)| -> Result<Chunk> {
            Ok(Chunk {
                id,
                content,
                metadata: serde_json::from_str::<ContextMap>(&metadata)?,
            })
        })
        .collect()
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn find_entities_by_label_substring(&self, text: &str) -> Result<Vec<EntityId>> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        self.db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id FROM entities WHERE instr(lower(label), ?1) > 0 ORDER BY seq",
                )?;
                let ids = stmt
                    .query_map([&needle], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(ids)
            })
            .await
    }

    async fn get_entity_context(&self, id: &str) -> Result<Entity> {
        let id = id.to_string();
        self.db
            .with_connection(move |conn| {
                let cols = conn
                    .query_row(
                        "SELECT id, label, kind, attributes_json, metadata_json, external_links_json \
                         FROM entities WHERE id = ?1",
                        [&id],
                        entity_from_row,
                    )
                    .optional()?
                    .ok_or_else(|| CtxgraphError::NotFound(format!("entity {}", id)))?;
                decode_entity(cols)
            })
            .await
    }

    async fn get_outgoing_facts(&self, id: &str) -> Result<Vec<FactRecord>> {
        let id = id.to_string();
        self.db
            .with_connection(move |conn| {
                let communities = communities_of(conn, &id)?;
                let mut stmt = conn.prepare(
                    "SELECT seq, head, relation, tail, context_json \
                     FROM facts WHERE head = ?1 ORDER BY seq",
                )?;
                let rows = stmt
                    .query_map([&id], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    })?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

                let mut out = Vec::with_capacity(rows.len());
                for (fact_seq, head, relation, tail, context_json) in rows {
                    let context: RelationContext = serde_json::from_str(&context_json)?;
                    out.push(FactRecord {
                        fact: Fact {
                            head,
                            relation,
                            tail,
                            context,
                        },
                        chunks: evidence_of(conn, fact_seq)?,
                        communities: communities.clone(),
                    });
                }
                Ok(out)
            })
            .await
    }

    async fn search_chunks(&self, text: &str, limit: usize) -> Result<Vec<Chunk>> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        self.db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, content, metadata_json FROM chunks \
                     WHERE instr(lower(content), ?1) > 0 ORDER BY seq LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(params![needle, limit as i64], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    })?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                rows.into_iter()
                    .map(|(id, content, metadata)| -> Result<Chunk> {
                        Ok(Chunk {
                            id,
                            content,
                            metadata: serde_json::from_str(&metadata)?,
                        })
                    })
                    .collect()
            })
            .await
    }

    async fn list_entity_labels(&self) -> Result<Vec<(EntityId, String)>> {
        self.db
            .with_connection(|conn| {
                let mut stmt = conn.prepare("SELECT id, label FROM entities ORDER BY seq")?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await
    }

    async fn upsert_entity(&self, entity: &Entity) -> Result<()> {
        entity.validate()?;
        let id = entity.id.clone();
        let label = entity.label.clone();
        let kind = entity.kind.as_str();
        let attributes = serde_json::to_string(&entity.attributes)?;
        let metadata = serde_json::to_string(&entity.metadata)?;
        let links = serde_json::to_string(&entity.external_links)?;

        self.db
            .with_connection(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO entities (id, label, kind, attributes_json, metadata_json, external_links_json)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT(id) DO UPDATE SET
                        label = excluded.label,
                        kind = excluded.kind,
                        attributes_json = excluded.attributes_json,
                        metadata_json = excluded.metadata_json,
                        external_links_json = excluded.external_links_json
                    "#,
                    params![id, label, kind, attributes, metadata, links],
                )?;
                log::debug!("Entity upserted: {}", id);
                Ok(())
            })
            .await
    }

    async fn upsert_chunk(&self, chunk: &Chunk) -> Result<()> {
        if chunk.id.trim().is_empty() {
            return Err(CtxgraphError::Validation("Chunk id must not be empty".to_string()));
        }
        let id = chunk.id.clone();
        let content = chunk.content.clone();
        let metadata = serde_json::to_string(&chunk.metadata)?;

        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT INTO chunks (id, content, metadata_json) VALUES (?1, ?2, ?3) \
                     ON CONFLICT(id) DO UPDATE SET \
                        content = excluded.content, metadata_json = excluded.metadata_json",
                    params![id, content, metadata],
                )?;
                Ok(())
            })
            .await
    }

    async fn upsert_community(&self, community: &Community) -> Result<()> {
        let community = community.clone();
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                for member in &community.member_entity_ids {
                    if !entity_exists(&tx, member)? {
                        return Err(CtxgraphError::Validation(format!(
                            "Community {} references unknown entity {}",
                            community.id, member
                        )));
                    }
                }
                tx.execute(
                    "INSERT INTO communities (id, label, summary) VALUES (?1, ?2, ?3) \
                     ON CONFLICT(id) DO UPDATE SET label = excluded.label, summary = excluded.summary",
                    params![community.id, community.label, community.summary],
                )?;
                for member in &community.member_entity_ids {
                    tx.execute(
                        "INSERT OR IGNORE INTO community_members (community_id, entity_id) VALUES (?1, ?2)",
                        params![community.id, member],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
    }

    async fn upsert_fact(&self, fact: &Fact, evidence_chunk_ids: &[String]) -> Result<()> {
        fact.validate()?;
        let fact = fact.clone();
        let evidence = evidence_chunk_ids.to_vec();

        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                for endpoint in [&fact.head, &fact.tail] {
                    if !entity_exists(&tx, endpoint)? {
                        return Err(CtxgraphError::Validation(format!(
                            "Fact {} -[{}]-> {} references unknown entity {}",
                            fact.head, fact.relation, fact.tail, endpoint
                        )));
                    }
                }
                for chunk_id in &evidence {
                    let mut stmt = tx.prepare("SELECT 1 FROM chunks WHERE id = ?1")?;
                    if !stmt.exists([chunk_id])? {
                        return Err(CtxgraphError::Validation(format!(
                            "Evidence chunk {} does not exist",
                            chunk_id
                        )));
                    }
                }

                let key: FactKey = fact.key();
                let fact_id = key.fact_id();
                let context = match load_context(&tx, &key)? {
                    Some(mut existing) => {
                        existing.merge(fact.context.clone());
                        existing
                    }
                    None => fact.context.clone(),
                };
                let context_json = serde_json::to_string(&context)?;

                tx.execute(
                    r#"
                    INSERT INTO facts (fact_id, head, relation, tail, confidence, context_json)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT(head, relation, tail) DO UPDATE SET
                        confidence = excluded.confidence,
                        context_json = excluded.context_json
                    "#,
                    params![
                        fact_id,
                        fact.head,
                        fact.relation,
                        fact.tail,
                        context.confidence as f64,
                        context_json
                    ],
                )?;
                let fact_seq: i64 = tx.query_row(
                    "SELECT seq FROM facts WHERE head = ?1 AND relation = ?2 AND tail = ?3",
                    params![key.head, key.relation, key.tail],
                    |row| row.get(0),
                )?;
                for chunk_id in &evidence {
                    tx.execute(
                        "INSERT OR IGNORE INTO fact_evidence (fact_seq, chunk_id) VALUES (?1, ?2)",
                        params![fact_seq, chunk_id],
                    )?;
                }
                tx.commit()?;
                log::debug!("Fact upserted: {}", fact_id);
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup_store() -> (SqliteGraphStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteGraphStore::open(temp_dir.path().join("graph.db"))
            .await
            .unwrap();
        store
            .upsert_entity(&Entity::new("Q937", "Albert Einstein").with_description("Physicist"))
            .await
            .unwrap();
        store
            .upsert_entity(&Entity::new("Q38104", "Nobel Prize in Physics"))
            .await
            .unwrap();
        store
            .upsert_chunk(&Chunk::new(
                "C1",
                "Albert Einstein was awarded the 1921 Nobel Prize in Physics.",
            ))
            .await
            .unwrap();
        let won = Fact::new(
            "Q937",
            "WON",
            "Q38104",
            RelationContext::default()
                .temporal("year", json!(1921))
                .provenance("Nobel Foundation"),
        )
        .unwrap();
        store.upsert_fact(&won, &["C1".to_string()]).await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_entity_roundtrip() {
        let (store, _temp) = setup_store().await;
        let entity = store.get_entity_context("Q937").await.unwrap();
        assert_eq!(entity.label, "Albert Einstein");
        assert_eq!(entity.description(), "Physicist");
        assert_eq!(entity.kind, NodeKind::Entity);
    }

    #[tokio::test]
    async fn test_missing_entity() {
        let (store, _temp) = setup_store().await;
        let err = store.get_entity_context("Q0").await.unwrap_err();
        assert!(matches!(err, CtxgraphError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_outgoing_facts_joined() {
        let (store, _temp) = setup_store().await;
        let facts = store.get_outgoing_facts("Q937").await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].fact.relation, "WON");
        assert_eq!(facts[0].fact.tail, "Q38104");
        assert!(facts[0].fact.context.has_temporal());
        assert_eq!(facts[0].chunks.len(), 1);
        assert_eq!(facts[0].chunks[0].id, "C1");
    }

    #[tokio::test]
    async fn test_dangling_fact_rejected() {
        let (store, _temp) = setup_store().await;
        let dangling = Fact::new("Q937", "WON", "Q404", RelationContext::default()).unwrap();
        let err = store.upsert_fact(&dangling, &[]).await.unwrap_err();
        assert!(matches!(err, CtxgraphError::Validation(_)));
        assert_eq!(store.get_outgoing_facts("Q937").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_triple_merges_context() {
        let (store, _temp) = setup_store().await;
        let again = Fact::new(
            "Q937",
            "WON",
            "Q38104",
            RelationContext::default().provenance("Wikipedia"),
        )
        .unwrap();
        store.upsert_fact(&again, &[]).await.unwrap();

        let facts = store.get_outgoing_facts("Q937").await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(
            facts[0].fact.context.provenance,
            vec!["Nobel Foundation".to_string(), "Wikipedia".to_string()]
        );
        assert_eq!(facts[0].chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_triples_with_same_readable_id_stay_distinct() {
        let (store, _temp) = setup_store().await;
        for (id, label) in [("Q1", "First"), ("Q1_A", "First A"), ("Q2", "Second")] {
            store.upsert_entity(&Entity::new(id, label)).await.unwrap();
        }
        // Both render as "Q1_A_B_Q2".
        let left = Fact::new("Q1", "A_B", "Q2", RelationContext::default().provenance("left"))
            .unwrap();
        let right = Fact::new("Q1_A", "B", "Q2", RelationContext::default().provenance("right"))
            .unwrap();
        assert_eq!(left.key().fact_id(), right.key().fact_id());
        store.upsert_fact(&left, &["C1".to_string()]).await.unwrap();
        store.upsert_fact(&right, &[]).await.unwrap();

        let from_q1 = store.get_outgoing_facts("Q1").await.unwrap();
        assert_eq!(from_q1.len(), 1);
        assert_eq!(from_q1[0].fact.context.provenance, vec!["left".to_string()]);
        assert_eq!(from_q1[0].chunks.len(), 1);

        let from_q1_a = store.get_outgoing_facts("Q1_A").await.unwrap();
        assert_eq!(from_q1_a.len(), 1);
        assert_eq!(from_q1_a[0].fact.relation, "B");
        assert_eq!(from_q1_a[0].fact.context.provenance, vec!["right".to_string()]);
        assert!(from_q1_a[0].chunks.is_empty());
    }

    #[tokio::test]
    async fn test_label_and_chunk_search() {
        let (store, _temp) = setup_store().await;
        let ids = store.find_entities_by_label_substring("EINSTEIN").await.unwrap();
        assert_eq!(ids, vec!["Q937".to_string()]);

        let chunks = store.search_chunks("nobel prize", 5).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(store.search_chunks("photoelectric", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_community_links() {
        let (store, _temp) = setup_store().await;
        store
            .upsert_community(&Community::new(
                "M1",
                "Physics laureates",
                "Winners of the physics prize",
                vec!["Q937".to_string()],
            ))
            .await
            .unwrap();
        let facts = store.get_outgoing_facts("Q937").await.unwrap();
        assert_eq!(facts[0].communities.len(), 1);
        assert_eq!(facts[0].communities[0].member_entity_ids, vec!["Q937".to_string()]);

        let ghost = Community::new("M2", "Ghosts", "", vec!["Q404".to_string()]);
        assert!(store.upsert_community(&ghost).await.is_err());
    }

    #[tokio::test]
    async fn test_community_reupsert_unions_members() {
        let (store, _temp) = setup_store().await;
        let both = vec!["Q937".to_string(), "Q38104".to_string()];
        store
            .upsert_community(&Community::new("M1", "Laureates", "", both.clone()))
            .await
            .unwrap();
        store
            .upsert_community(&Community::new("M1", "Renamed", "", vec!["Q38104".to_string()]))
            .await
            .unwrap();

        let facts = store.get_outgoing_facts("Q937").await.unwrap();
        assert_eq!(facts[0].communities.len(), 1);
        assert_eq!(facts[0].communities[0].label, "Renamed");
        assert_eq!(facts[0].communities[0].member_entity_ids, both);
    }

    #[tokio::test]
    async fn test_labels_listed_in_insertion_order() {
        let (store, _temp) = setup_store().await;
        let labels = store.list_entity_labels().await.unwrap();
        assert_eq!(labels[0].0, "Q937");
        assert_eq!(labels[1].1, "Nobel Prize in Physics");
    }
}
