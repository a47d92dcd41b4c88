//! Deterministic prompt payloads for each judgment kind.
//!
//! Section headers are shared constants so the offline judge can read the
//! same payloads the remote model receives.

pub(crate) const RANK_CANDIDATES: &str = "The list of candidate answers is:";
pub(crate) const RANK_INSTRUCTION: &str = "Instruction: Sort the list";
pub(crate) const KNOWN_TRIPLES: &str = "A set of known triples are:";
pub(crate) const TRIPLE_TO_CHECK: &str = "The triple to be determined is:";
pub(crate) const NEIGHBOR_TRIPLES: &str = "A set of neighbor triples from the knowledge graph are:";
pub(crate) const REASONING_PATHS: &str = "A set of reasoning paths from the knowledge graph are:";
pub(crate) const RELATION_TO_INFER: &str = "The relation to be inferred is:";
pub(crate) const MATERIALS: &str = "Materials:";
pub(crate) const EVIDENCE: &str = "Supporting Evidence:";
pub(crate) const NONE_MARKER: &str = "(none)";

/// Maximum characters of a chunk quoted in a synthesis prompt.
pub const EXCERPT_CHARS: usize = 200;

/// One candidate line in a ranking prompt.
#[derive(Debug, Clone)]
pub struct RankingEntry {
    pub name: String,
    pub description: String,
}

/// `(head, relation, tail)` rendered the way every prompt quotes triples.
/// Parts containing a comma or a double quote are written as JSON strings.
pub fn format_triple(head: &str, relation: &str, tail: &str) -> String {
    format!("({}, {}, {})", quote_part(head), quote_part(relation), quote_part(tail))
}

fn quote_part(part: &str) -> String {
    if part.contains(',') || part.contains('"') {
        serde_json::Value::String(part.to_string()).to_string()
    } else {
        part.to_string()
    }
}

/// `relation -> tail` material line.
pub fn format_material(relation: &str, tail_label: &str) -> String {
    format!("- {} -> {}", relation, tail_label)
}

fn push_lines(prompt: &mut String, lines: &[String]) {
    if lines.is_empty() {
        prompt.push_str(NONE_MARKER);
        prompt.push('\n');
        return;
    }
    for line in lines {
        prompt.push_str(line);
        prompt.push('\n');
    }
}

/// Context-aware re-ranking of a head entity's candidates.
pub fn ranking_prompt(query: &str, head_context: &str, candidates: &[RankingEntry]) -> String {
    let mut prompt = String::from("Context-aware Re-Ranking:\n");
    prompt.push_str(&format!(
        "The question is to predict the missing entity for the query: {}\n",
        query
    ));
    prompt.push_str(&format!("Head Entity Context: {}\n", head_context));
    prompt.push_str(RANK_CANDIDATES);
    prompt.push('\n');
    for (i, c) in candidates.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}: {}\n", i + 1, c.name, c.description));
    }
    prompt.push('\n');
    prompt.push_str(RANK_INSTRUCTION);
    prompt.push_str(
        " to let the candidate answers which are more possible to be the true answer to the question be prior. \
         Output the sorted order using the format '[most possible, second possible...]' \
         and please start your response with 'The final order:'.",
    );
    prompt
}

/// Entity-type consistency of one triple against known triples.
pub fn type_consistency_prompt(test_triple: &str, known_triples: &[String]) -> String {
    let mut prompt = String::from(
        "Please determine whether the entities in the input triple are consistent in entity type \
         with a set of known triples in the knowledge graph provided.\n",
    );
    prompt.push_str(KNOWN_TRIPLES);
    prompt.push('\n');
    push_lines(&mut prompt, known_triples);
    prompt.push_str(TRIPLE_TO_CHECK);
    prompt.push('\n');
    prompt.push_str(test_triple);
    prompt.push('\n');
    prompt.push_str(
        "Please return 'Y' if the input triple is consistent in entity type, otherwise return 'N'. \
         Do not say anything else except your determination.",
    );
    prompt
}

/// Whether neighbour triples and paths support inferring the relation.
pub fn subgraph_support_prompt(
    test_triple: &str,
    neighbor_triples: &[String],
    reasoning_paths: &[String],
) -> String {
    let mut prompt = String::from(
        "Please determine whether the relation in the input can be reliably inferred between the head \
         and tail entities, based on a set of neighbor triples and reasoning paths from the knowledge graph.\n",
    );
    prompt.push_str(NEIGHBOR_TRIPLES);
    prompt.push('\n');
    push_lines(&mut prompt, neighbor_triples);
    prompt.push_str(REASONING_PATHS);
    prompt.push('\n');
    push_lines(&mut prompt, reasoning_paths);
    prompt.push_str(RELATION_TO_INFER);
    prompt.push('\n');
    prompt.push_str(test_triple);
    prompt.push('\n');
    prompt.push_str(
        "Please return 'Y' if there is sufficient evidence from the knowledge graph to infer the relation, \
         otherwise return 'N'. Do not say anything else except your determination.",
    );
    prompt
}

/// Whether the gathered materials already answer the query.
pub fn sufficiency_prompt(query: &str, materials: &[String]) -> String {
    let mut prompt = String::from("Context Sufficiency Check:\n");
    prompt.push_str(&format!("The question is: {}\n", query));
    prompt.push_str(MATERIALS);
    prompt.push('\n');
    push_lines(&mut prompt, materials);
    prompt.push_str(
        "Please return 'Y' if the materials are sufficient to answer the question, otherwise return 'N'. \
         Do not say anything else except your determination.",
    );
    prompt
}

/// Final answer generation over every gathered fact.
pub fn synthesis_prompt(query: &str, materials: &[String], excerpts: &[String]) -> String {
    let mut prompt = String::from("Context-aware Reasoning:\n");
    prompt.push_str(&format!("Query: {}\n\n", query));
    prompt.push_str(MATERIALS);
    prompt.push('\n');
    push_lines(&mut prompt, materials);
    prompt.push_str(EVIDENCE);
    prompt.push('\n');
    push_lines(&mut prompt, excerpts);
    prompt.push_str(
        "\nInstruction: Output all possible answers you can find IN THE MATERIALS using the format \
         '[answer1, answerN]'. Please start your response with 'The possible answers:'. \
         Do not output anything except the possible answers.",
    );
    prompt
}

/// Lines between `start` and the next blank line or any of `stops`.
pub(crate) fn section<'a>(payload: &'a str, start: &str, stops: &[&str]) -> Vec<&'a str> {
    let mut lines = payload.lines().skip_while(|l| l.trim() != start);
    if lines.next().is_none() {
        return Vec::new();
    }
    lines
        .take_while(|l| {
            let t = l.trim();
            !t.is_empty() && !stops.iter().any(|s| t.starts_with(s))
        })
        .map(str::trim)
        .filter(|l| *l != NONE_MARKER)
        .collect()
}

/// Split `(h, r, t)` into its parts, unquoting the ones [`format_triple`] quoted.
pub(crate) fn parse_triple(line: &str) -> Option<(String, String, String)> {
    let mut rest = line.trim().strip_prefix('(')?.strip_suffix(')')?;
    let mut parts: Vec<String> = Vec::with_capacity(3);
    for index in 0..3 {
        let last = index == 2;
        let (part, after) = if rest.starts_with('"') {
            let end = closing_quote(rest)?;
            (serde_json::from_str::<String>(&rest[..=end]).ok()?, &rest[end + 1..])
        } else if last {
            (rest.to_string(), "")
        } else {
            let at = rest.find(", ")?;
            (rest[..at].to_string(), &rest[at..])
        };
        parts.push(part);
        rest = if last { after } else { after.strip_prefix(", ")? };
    }
    if !rest.is_empty() {
        return None;
    }
    let mut parts = parts.into_iter();
    Some((parts.next()?, parts.next()?, parts.next()?))
}

/// Byte offset of the quote closing the JSON string `s` starts with.
fn closing_quote(s: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(i),
            _ => {}
        }
    }
    None
}
