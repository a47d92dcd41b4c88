use std::collections::HashSet;

use crate::graph::EntityId;

/// An entity waiting to be expanded, with the hop that reached it.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontierItem {
    pub entity_id: EntityId,
    pub hop: usize,
    /// Score of the candidate that led here
    pub score: f32,
}

/// Beam of entities to expand when the current query resolves nothing new.
///
/// An entity id is admitted at most once per session, whether it arrived as
/// a resolved head or as the tail of a selected fact.
#[derive(Debug, Default)]
pub struct Frontier {
    items: Vec<FrontierItem>,
    admitted: HashSet<EntityId>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `entity_id` as seen without queueing it.
    pub fn mark_admitted(&mut self, entity_id: &str) {
        self.admitted.insert(entity_id.to_string());
    }

    pub fn is_admitted(&self, entity_id: &str) -> bool {
        self.admitted.contains(entity_id)
    }

    /// Queue `entity_id`. Returns false if it was admitted before.
    pub fn admit(&mut self, entity_id: &str, hop: usize, score: f32) -> bool {
        if !self.admitted.insert(entity_id.to_string()) {
            return false;
        }
        self.items.push(FrontierItem {
            entity_id: entity_id.to_string(),
            hop,
            score,
        });
        true
    }

    /// Keep the `width` best items; equal scores keep admission order.
    pub fn retain_best(&mut self, width: usize) {
        self.items.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        self.items.truncate(width);
    }

    /// Remove and return every queued item.
    pub fn take(&mut self) -> Vec<FrontierItem> {
        std::mem::take(&mut self.items)
    }

    pub fn items(&self) -> &[FrontierItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
