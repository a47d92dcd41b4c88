pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod oracle;
pub mod ranker;
pub mod reasoner;
pub mod reflector;
pub mod responder;
pub mod retriever;
pub mod sample;

pub use config::Config;
pub use error::{CtxgraphError, Result};
pub use graph::{GraphStore, InMemoryGraphStore, SqliteGraphStore};
pub use reasoner::{MacerReasoner, ReasoningConfig, ReasoningOutcome};
