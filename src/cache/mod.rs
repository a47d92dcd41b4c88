pub mod judgment_cache;

pub use judgment_cache::JudgmentCache;
