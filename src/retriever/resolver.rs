use async_trait::async_trait;

use crate::graph::{EntityId, GraphStore};
use crate::Result;

/// Words never used on their own to look up labels, including the words the
/// reasoner puts into rewritten queries.
const STOPWORDS: &[&str] = &[
    "about", "and", "are", "context", "did", "does", "entities", "for", "from", "has", "have",
    "her", "his", "how", "into", "its", "more", "related", "tell", "than", "that", "the",
    "their", "this", "was", "were", "what", "when", "where", "which", "who", "whom", "why",
    "with",
];

/// Lowercased alphanumeric tokens of at least three characters, minus stopwords.
pub fn significant_tokens(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric()) {
        let token = raw.to_lowercase();
        if token.chars().count() < 3 || STOPWORDS.contains(&token.as_str()) {
            continue;
        }
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}

/// Maps query text to entity ids.
#[async_trait]
pub trait EntityResolver: Send + Sync {
    async fn resolve(&self, store: &dyn GraphStore, query: &str) -> Result<Vec<EntityId>>;
}

/// Case-insensitive label matching.
///
/// Whole labels found inside the query win. Only when none is found are the
/// query's significant tokens looked up as label substrings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringResolver;

#[async_trait]
impl EntityResolver for SubstringResolver {
    async fn resolve(&self, store: &dyn GraphStore, query: &str) -> Result<Vec<EntityId>> {
        let lowered = query.to_lowercase();
        let mut ids: Vec<EntityId> = store
            .list_entity_labels()
            .await?
            .into_iter()
            .filter(|(_, label)| !label.trim().is_empty() && lowered.contains(&label.to_lowercase()))
            .map(|(id, _)| id)
            .collect();
        if !ids.is_empty() {
            return Ok(ids);
        }

        for token in significant_tokens(query) {
            for id in store.find_entities_by_label_substring(&token).await? {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Entity, InMemoryGraphStore};

    #[test]
    fn test_significant_tokens() {
        assert_eq!(
            significant_tokens("Tell me more about Nobel Prize in the context of Einstein"),
            vec!["nobel", "prize", "einstein"]
        );
        assert_eq!(significant_tokens("Q937 WON Q38104"), vec!["q937", "won", "q38104"]);
        assert!(significant_tokens("a an of").is_empty());
    }

    async fn store() -> InMemoryGraphStore {
        let store = InMemoryGraphStore::new();
        store.upsert_entity(&Entity::new("Q937", "Albert Einstein")).await.unwrap();
        store
            .upsert_entity(&Entity::new("Q38104", "Nobel Prize in Physics"))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_whole_label_wins() {
        let store = store().await;
        let ids = SubstringResolver
            .resolve(&store, "tell me more about Nobel Prize in Physics in the context of Einstein")
            .await
            .unwrap();
        assert_eq!(ids, vec!["Q38104".to_string()]);
    }

    #[tokio::test]
    async fn test_token_fallback_keeps_first_seen_order() {
        let store = store().await;
        let ids = SubstringResolver
            .resolve(&store, "Einstein Nobel prize")
            .await
            .unwrap();
        assert_eq!(ids, vec!["Q937".to_string(), "Q38104".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_query_resolves_nothing() {
        let store = store().await;
        let ids = SubstringResolver.resolve(&store, "unknown entity").await.unwrap();
        assert!(ids.is_empty());
    }
}
