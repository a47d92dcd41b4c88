//! Judgment oracle: the natural-language decision capability used for
//! ranking, fact checks, sufficiency and answer synthesis.
//!
//! The engine only formats payloads and interprets replies; transport is the
//! concern of each `JudgmentOracle` implementation.

mod external;
mod heuristic;
pub mod prompts;

pub use external::ExternalOracleJudge;
pub use heuristic::HeuristicJudge;

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::cache::JudgmentCache;
use crate::config::OracleConfig;
use crate::{CtxgraphError, Result};

/// What a payload asks the oracle to decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    /// Reply is an ordering: `The final order: [2, 1, 3]`
    Rank,
    /// Reply is `Y` / `N`
    TypeConsistency,
    /// Reply is `Y` / `N`
    SubgraphSupport,
    /// Reply is `Y` / `N`
    Sufficiency,
    /// Reply is free text
    Synthesize,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::Rank => "RANK",
            PromptKind::TypeConsistency => "TYPE_CONSISTENCY",
            PromptKind::SubgraphSupport => "SUBGRAPH_SUPPORT",
            PromptKind::Sufficiency => "SUFFICIENCY",
            PromptKind::Synthesize => "SYNTHESIZE",
        }
    }
}

/// Injected judgment capability.
#[async_trait]
pub trait JudgmentOracle: Send + Sync {
    async fn judge(&self, kind: PromptKind, payload: &str) -> Result<String>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Build the oracle selected by `[oracle] provider`.
pub fn from_config(
    config: &OracleConfig,
    sufficiency_min_facts: usize,
) -> Result<Arc<dyn JudgmentOracle>> {
    match config.provider.as_str() {
        "heuristic" => Ok(Arc::new(HeuristicJudge::new(sufficiency_min_facts))),
        "openai" => {
            let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                CtxgraphError::InvalidConfig(format!(
                    "Environment variable {} not set",
                    config.api_key_env
                ))
            })?;
            let cache = if config.cache_capacity > 0 {
                Some(Arc::new(JudgmentCache::new(config.cache_capacity)))
            } else {
                None
            };
            let judge = ExternalOracleJudge::new(
                api_key,
                config.endpoint.clone(),
                config.model.clone(),
                Duration::from_secs(config.timeout_secs),
            )?
            .with_max_retries(config.max_retries)
            .with_cache(cache);
            Ok(Arc::new(judge))
        }
        other => Err(CtxgraphError::InvalidConfig(format!(
            "Unknown oracle provider: {}",
            other
        ))),
    }
}

fn yes_no_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)^\s*(?:[a-z ]{1,24}:\s*)?['"\[(]*(yes|no|true|false|y|n)\b"#)
            .expect("Invalid regex pattern")
    })
}

fn order_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\s*(\d+(?:\s*,\s*\d+)*)\s*\]").expect("Invalid regex pattern"))
}

/// Interpret a `Y`/`N` style reply. `None` when the reply is neither.
pub fn parse_yes_no(response: &str) -> Option<bool> {
    let caps = yes_no_regex().captures(response)?;
    match caps[1].to_lowercase().as_str() {
        "y" | "yes" | "true" => Some(true),
        "n" | "no" | "false" => Some(false),
        _ => None,
    }
}

/// Interpret `The final order: [2, 1, 3]` as zero-based indices into a list of
/// `len` items. Out-of-range and repeated indices are dropped.
pub fn parse_order(response: &str, len: usize) -> Option<Vec<usize>> {
    let caps = order_regex().captures(response)?;
    let mut order = Vec::new();
    for part in caps[1].split(',') {
        let Ok(n) = part.trim().parse::<usize>() else {
            continue;
        };
        if n == 0 || n > len || order.contains(&(n - 1)) {
            continue;
        }
        order.push(n - 1);
    }
    if order.is_empty() {
        None
    } else {
        Some(order)
    }
}

/// Strip the answer preamble and list brackets from a synthesis reply.
pub fn parse_free_text(response: &str) -> String {
    let text = response.trim();
    let text = text
        .strip_prefix("The possible answers:")
        .map(str::trim)
        .unwrap_or(text);
    match text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        Some(inner) => inner.trim().to_string(),
        None => text.to_string(),
    }
}
