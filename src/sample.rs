//! Small Einstein / Nobel Prize graph used by the CLI and the tests.

use serde_json::json;

use crate::graph::{Chunk, Community, Entity, Fact, GraphStore, RelationContext};
use crate::Result;

pub const SAMPLE_QUERY: &str = "Einstein Nobel prize";

/// Write the sample graph into `store`. Safe to call repeatedly.
pub async fn load_sample(store: &dyn GraphStore) -> Result<()> {
    let entities = [
        Entity::new("Q937", "Albert Einstein")
            .with_description("Theoretical physicist who developed the theory of relativity")
            .with_attribute("birth_year", json!(1879)),
        Entity::new("Q38104", "Nobel Prize in Physics")
            .with_description("Annual award for outstanding contributions to physics"),
        Entity::new("Q191459", "Royal Swedish Academy of Sciences")
            .with_description("Swedish academy that selects the Nobel laureates in physics"),
        Entity::new("Q3012", "Ulm").with_description("City on the Danube in southern Germany"),
    ];
    for mut entity in entities {
        entity
            .external_links
            .push(format!("https://www.wikidata.org/wiki/{}", entity.id));
        store.upsert_entity(&entity).await?;
    }

    store
        .upsert_chunk(&Chunk::new(
            "C1",
            "Albert Einstein received the 1921 Nobel Prize in Physics for his services to \
             theoretical physics, and especially for his discovery of the law of the \
             photoelectric effect.",
        ))
        .await?;
    store
        .upsert_chunk(&Chunk::new(
            "C2",
            "The Nobel Prize in Physics is awarded each year by the Royal Swedish Academy \
             of Sciences in Stockholm.",
        ))
        .await?;

    store
        .upsert_community(&Community::new(
            "COMM1",
            "Nobel laureates in physics",
            "Physicists honoured with the Nobel Prize in Physics",
            vec!["Q937".to_string()],
        ))
        .await?;

    let won = RelationContext::with_confidence(1.0)?
        .temporal("year", json!(1921))
        .geographic("Stockholm")
        .provenance("Nobel Foundation")
        .detail("motivation", json!("for his services to Theoretical Physics"));
    store
        .upsert_fact(&Fact::new("Q937", "WON", "Q38104", won)?, &["C1".to_string()])
        .await?;

    let awarded_by = RelationContext::default().provenance("Nobel Foundation");
    store
        .upsert_fact(
            &Fact::new("Q38104", "AWARDED_BY", "Q191459", awarded_by)?,
            &["C2".to_string()],
        )
        .await?;

    let born_in = RelationContext::default().temporal("year", json!(1879));
    store
        .upsert_fact(&Fact::new("Q937", "BORN_IN", "Q3012", born_in)?, &[])
        .await?;

    log::info!("Sample graph loaded");
    Ok(())
}
