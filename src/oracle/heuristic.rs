//! Offline, deterministic judge that answers from the payload alone.

use async_trait::async_trait;

use super::prompts::{
    self, EVIDENCE, KNOWN_TRIPLES, MATERIALS, NEIGHBOR_TRIPLES, RANK_CANDIDATES,
    REASONING_PATHS, RELATION_TO_INFER, TRIPLE_TO_CHECK,
};
use super::{JudgmentOracle, PromptKind};
use crate::Result;

/// Answers every prompt kind without a model.
///
/// - type consistency: `Y` when no known triple contradicts, i.e. there are none
///   or one shares the relation or tail with the triple under test
/// - subgraph support: `Y` when at least one reasoning path exists
/// - sufficiency: `Y` when at least `sufficiency_min_facts` materials are listed
/// - rank: the order given
/// - synthesize: the listed tails
#[derive(Debug, Clone)]
pub struct HeuristicJudge {
    sufficiency_min_facts: usize,
}

impl HeuristicJudge {
    pub fn new(sufficiency_min_facts: usize) -> Self {
        Self {
            sufficiency_min_facts: sufficiency_min_facts.max(1),
        }
    }

    fn rank(payload: &str) -> String {
        let count = prompts::section(payload, RANK_CANDIDATES, &[])
            .iter()
            .filter(|l| l.starts_with('['))
            .count();
        let order: Vec<String> = (1..=count).map(|i| i.to_string()).collect();
        format!("The final order: [{}]", order.join(", "))
    }

    fn type_consistency(payload: &str) -> String {
        let known = prompts::section(payload, KNOWN_TRIPLES, &[TRIPLE_TO_CHECK]);
        let tested = prompts::section(payload, TRIPLE_TO_CHECK, &["Please return"]);
        let Some((_, relation, tail)) = tested.first().and_then(|l| prompts::parse_triple(l))
        else {
            return "N".to_string();
        };
        let consistent = known.is_empty()
            || known
                .iter()
                .filter_map(|l| prompts::parse_triple(l))
                .any(|(_, r, t)| r == relation || t == tail);
        yes_no(consistent)
    }

    fn subgraph_support(payload: &str) -> String {
        let paths = prompts::section(payload, REASONING_PATHS, &[RELATION_TO_INFER]);
        let neighbors = prompts::section(payload, NEIGHBOR_TRIPLES, &[REASONING_PATHS]);
        let tested = prompts::section(payload, RELATION_TO_INFER, &["Please return"]);
        let restated = tested
            .first()
            .is_some_and(|t| neighbors.iter().any(|n| n == t));
        yes_no(!paths.is_empty() || restated)
    }

    fn sufficiency(&self, payload: &str) -> String {
        let materials = prompts::section(payload, MATERIALS, &["Please return"]);
        let count = materials.iter().filter(|l| l.starts_with("- ")).count();
        yes_no(count >= self.sufficiency_min_facts)
    }

    fn synthesize(payload: &str) -> String {
        let mut answers: Vec<&str> = Vec::new();
        for line in prompts::section(payload, MATERIALS, &[EVIDENCE]) {
            if let Some((_, tail)) = line.split_once(" -> ") {
                let tail = tail.trim();
                if !tail.is_empty() && !answers.contains(&tail) {
                    answers.push(tail);
                }
            }
        }
        format!("The possible answers: [{}]", answers.join(", "))
    }
}

fn yes_no(value: bool) -> String {
    let token = if value { "Y" } else { "N" };
    token.to_string()
}

#[async_trait]
impl JudgmentOracle for HeuristicJudge {
    async fn judge(&self, kind: PromptKind, payload: &str) -> Result<String> {
        let reply = match kind {
            PromptKind::Rank => Self::rank(payload),
            PromptKind::TypeConsistency => Self::type_consistency(payload),
            PromptKind::SubgraphSupport => Self::subgraph_support(payload),
            PromptKind::Sufficiency => self.sufficiency(payload),
            PromptKind::Synthesize => Self::synthesize(payload),
        };
        log::debug!("Heuristic judge {} -> {}", kind.as_str(), reply);
        Ok(reply)
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::prompts::{
        format_material, format_triple, ranking_prompt, subgraph_support_prompt,
        sufficiency_prompt, synthesis_prompt, type_consistency_prompt, RankingEntry,
    };
    use crate::oracle::{parse_free_text, parse_order, parse_yes_no};

    #[tokio::test]
    async fn test_rank_keeps_given_order() {
        let judge = HeuristicJudge::new(3);
        let entries: Vec<RankingEntry> = ["a", "b", "c"]
            .iter()
            .map(|n| RankingEntry {
                name: n.to_string(),
                description: String::new(),
            })
            .collect();
        let reply = judge
            .judge(PromptKind::Rank, &ranking_prompt("q", "ctx", &entries))
            .await
            .unwrap();
        assert_eq!(parse_order(&reply, 3), Some(vec![0, 1, 2]));
    }

    #[tokio::test]
    async fn test_type_consistency() {
        let judge = HeuristicJudge::new(3);
        let test = format_triple("Einstein", "WON", "Nobel Prize");

        let no_known = type_consistency_prompt(&test, &[]);
        let reply = judge.judge(PromptKind::TypeConsistency, &no_known).await.unwrap();
        assert_eq!(parse_yes_no(&reply), Some(true));

        let unrelated = type_consistency_prompt(&test, &[format_triple("Einstein", "BORN_IN", "Ulm")]);
        let reply = judge.judge(PromptKind::TypeConsistency, &unrelated).await.unwrap();
        assert_eq!(parse_yes_no(&reply), Some(false));

        let shared = type_consistency_prompt(&test, &[format_triple("Curie", "WON", "Nobel Prize")]);
        let reply = judge.judge(PromptKind::TypeConsistency, &shared).await.unwrap();
        assert_eq!(parse_yes_no(&reply), Some(true));
    }

    #[tokio::test]
    async fn test_type_consistency_reads_labels_with_commas() {
        let judge = HeuristicJudge::new(3);
        let test = format_triple("Paris", "LOCATED_IN", "France");
        let known = vec![format_triple("Washington, D.C.", "LOCATED_IN", "United States")];
        let prompt = type_consistency_prompt(&test, &known);
        let reply = judge.judge(PromptKind::TypeConsistency, &prompt).await.unwrap();
        assert_eq!(parse_yes_no(&reply), Some(true));
    }

    #[tokio::test]
    async fn test_subgraph_support_needs_paths() {
        let judge = HeuristicJudge::new(3);
        let test = format_triple("Nobel Prize", "AWARDED_BY", "Academy");

        let bare = subgraph_support_prompt(&test, &[], &[]);
        let reply = judge.judge(PromptKind::SubgraphSupport, &bare).await.unwrap();
        assert_eq!(parse_yes_no(&reply), Some(false));

        let with_path = subgraph_support_prompt(
            &test,
            &[],
            &["Einstein -WON-> Nobel Prize".to_string()],
        );
        let reply = judge.judge(PromptKind::SubgraphSupport, &with_path).await.unwrap();
        assert_eq!(parse_yes_no(&reply), Some(true));
    }

    #[tokio::test]
    async fn test_sufficiency_threshold() {
        let judge = HeuristicJudge::new(2);
        let one = sufficiency_prompt("q", &[format_material("WON", "Nobel Prize")]);
        let reply = judge.judge(PromptKind::Sufficiency, &one).await.unwrap();
        assert_eq!(parse_yes_no(&reply), Some(false));

        let two = sufficiency_prompt(
            "q",
            &[
                format_material("WON", "Nobel Prize"),
                format_material("AWARDED_BY", "Academy"),
            ],
        );
        let reply = judge.judge(PromptKind::Sufficiency, &two).await.unwrap();
        assert_eq!(parse_yes_no(&reply), Some(true));
    }

    #[tokio::test]
    async fn test_synthesize_lists_tails() {
        let judge = HeuristicJudge::new(3);
        let payload = synthesis_prompt(
            "q",
            &[
                format_material("WON", "Nobel Prize in Physics"),
                format_material("AWARDED_BY", "Royal Swedish Academy"),
                format_material("WON", "Nobel Prize in Physics"),
            ],
            &[],
        );
        let reply = judge.judge(PromptKind::Synthesize, &payload).await.unwrap();
        assert_eq!(
            parse_free_text(&reply),
            "Nobel Prize in Physics, Royal Swedish Academy"
        );
    }
}
