//! Context graph module: typed entities, reified facts, chunks and communities.
//!
//! Facts are quadruples `(head, relation, tail, context)`. Their identity is the
//! `(head, relation, tail)` triple; repeated contexts for the same triple are
//! merged into one record instead of producing parallel edges.

mod memory;
mod sqlite;
mod store;

pub use memory::InMemoryGraphStore;
pub use sqlite::SqliteGraphStore;
pub use store::GraphStore;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::hash::{Hash, Hasher};

use crate::{CtxgraphError, Result};

/// Identifier of an entity node.
pub type EntityId = String;

/// Free-form key/value payload attached to entities and facts.
pub type ContextMap = serde_json::Map<String, Value>;

/// Kind of node stored under an entity id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    #[default]
    Entity,
    Chunk,
    Community,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Entity => "Entity",
            NodeKind::Chunk => "Chunk",
            NodeKind::Community => "Community",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Entity" => Ok(NodeKind::Entity),
            "Chunk" => Ok(NodeKind::Chunk),
            "Community" => Ok(NodeKind::Community),
            other => Err(CtxgraphError::Validation(format!("Unknown node kind: {}", other))),
        }
    }
}

/// An entity `E = (e, ec)`: identity plus descriptive context.
///
/// Equality and hashing use `id` only, so a relabelled entity is still the same node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub label: String,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub attributes: ContextMap,
    #[serde(default)]
    pub metadata: ContextMap,
    #[serde(default)]
    pub external_links: Vec<String>,
}

impl Entity {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: NodeKind::Entity,
            attributes: ContextMap::new(),
            metadata: ContextMap::new(),
            external_links: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata
            .insert("description".to_string(), Value::String(description.into()));
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Descriptive text used as head-entity context; falls back to the label.
    pub fn description(&self) -> &str {
        self.metadata
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or(&self.label)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(CtxgraphError::Validation("Entity id must not be empty".to_string()));
        }
        if self.label.trim().is_empty() {
            return Err(CtxgraphError::Validation(format!(
                "Entity {} must have a label",
                self.id
            )));
        }
        Ok(())
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Relation context `rc` attached to a fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationContext {
    #[serde(default)]
    pub temporal: Option<ContextMap>,
    #[serde(default)]
    pub geographic: Option<String>,
    #[serde(default)]
    pub quantitative: Option<ContextMap>,
    /// Supporting sources, in the order they were first recorded.
    #[serde(default)]
    pub provenance: Vec<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub details: ContextMap,
}

fn default_confidence() -> f32 {
    1.0
}

impl Default for RelationContext {
    fn default() -> Self {
        Self {
            temporal: None,
            geographic: None,
            quantitative: None,
            provenance: Vec::new(),
            confidence: default_confidence(),
            details: ContextMap::new(),
        }
    }
}

impl RelationContext {
    /// Context with the given confidence; fails outside `[0, 1]`.
    pub fn with_confidence(confidence: f32) -> Result<Self> {
        let ctx = Self {
            confidence,
            ..Self::default()
        };
        ctx.validate()?;
        Ok(ctx)
    }

    pub fn temporal(mut self, key: impl Into<String>, value: Value) -> Self {
        self.temporal
            .get_or_insert_with(ContextMap::new)
            .insert(key.into(), value);
        self
    }

    pub fn quantitative(mut self, key: impl Into<String>, value: Value) -> Self {
        self.quantitative
            .get_or_insert_with(ContextMap::new)
            .insert(key.into(), value);
        self
    }

    pub fn geographic(mut self, place: impl Into<String>) -> Self {
        self.geographic = Some(place.into());
        self
    }

    pub fn provenance(mut self, source: impl Into<String>) -> Self {
        self.provenance.push(source.into());
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    pub fn has_temporal(&self) -> bool {
        self.temporal.as_ref().is_some_and(|t| !t.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(CtxgraphError::Validation(format!(
                "confidence must be within [0, 1], got {}",
                self.confidence
            )));
        }
        Ok(())
    }

    /// Fold a newer context for the same triple into this one.
    pub fn merge(&mut self, newer: RelationContext) {
        if newer.temporal.is_some() {
            self.temporal = newer.temporal;
        }
        if newer.geographic.is_some() {
            self.geographic = newer.geographic;
        }
        if newer.quantitative.is_some() {
            self.quantitative = newer.quantitative;
        }
        for source in newer.provenance {
            if !self.provenance.contains(&source) {
                self.provenance.push(source);
            }
        }
        self.details.extend(newer.details);
        self.confidence = newer.confidence;
    }
}

/// Derived identity of a fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactKey {
    pub head: EntityId,
    pub relation: String,
    pub tail: EntityId,
}

impl FactKey {
    /// Storage id of the reified fact record.
    pub fn fact_id(&self) -> String {
        format!("{}_{}_{}", self.head, self.relation, self.tail)
    }
}

/// A directed fact `(h, r, t, rc)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub head: EntityId,
    pub relation: String,
    pub tail: EntityId,
    #[serde(default)]
    pub context: RelationContext,
}

impl Fact {
    pub fn new(
        head: impl Into<String>,
        relation: impl Into<String>,
        tail: impl Into<String>,
        context: RelationContext,
    ) -> Result<Self> {
        let fact = Self {
            head: head.into(),
            relation: relation.into(),
            tail: tail.into(),
            context,
        };
        fact.validate()?;
        Ok(fact)
    }

    pub fn validate(&self) -> Result<()> {
        if self.head.is_empty() || self.tail.is_empty() {
            return Err(CtxgraphError::Validation(
                "Fact head and tail must not be empty".to_string(),
            ));
        }
        if self.relation.trim().is_empty() {
            return Err(CtxgraphError::Validation(format!(
                "Fact {} -> {} has an empty relation",
                self.head, self.tail
            )));
        }
        self.context.validate()
    }

    pub fn key(&self) -> FactKey {
        FactKey {
            head: self.head.clone(),
            relation: self.relation.clone(),
            tail: self.tail.clone(),
        }
    }
}

/// Text passage used as supporting evidence for facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: ContextMap,
}

impl Chunk {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: ContextMap::new(),
        }
    }

    /// First `max_chars` characters of the content, with an ellipsis when cut.
    pub fn excerpt(&self, max_chars: usize) -> String {
        if self.content.chars().count() <= max_chars {
            return self.content.clone();
        }
        let cut: String = self.content.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

/// Named summary of an entity cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Community {
    pub id: String,
    pub label: String,
    pub summary: String,
    #[serde(default)]
    pub member_entity_ids: Vec<EntityId>,
}

impl Community {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        summary: impl Into<String>,
        members: Vec<EntityId>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            summary: summary.into(),
            member_entity_ids: members,
        }
    }
}

/// Outgoing fact joined with its evidence chunks and the head's communities.
#[derive(Debug, Clone, PartialEq)]
pub struct FactRecord {
    pub fact: Fact,
    pub chunks: Vec<Chunk>,
    pub communities: Vec<Community>,
}
