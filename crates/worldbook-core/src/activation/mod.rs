//! Worldbook activation: deciding which entries reach the prompt each turn.
//!
//! Pipeline for one `evaluate()` call:
//! - scan buffer built from the recent conversation (`scan`)
//! - per-entry key logic (`matcher`) behind the sticky/cooldown/delay/probability gate (`timed`)
//! - bounded recursion passes (`engine`)
//! - inclusion groups (`group`), then the shared budget (`budget`)
//! - position bucketing (`assemble`)
//!
//! Cross-turn state lives behind [`TimedStateStore`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use uuid::Uuid;
//! use worldbook_core::activation::{InMemoryStateStore, WorldbookEngine};
//! use worldbook_core::config::EngineConfig;
//! use worldbook_core::types::{EvaluationContext, Message, Worldbook, WorldbookEntry};
//!
//! let engine = WorldbookEngine::new(Arc::new(InMemoryStateStore::new()), EngineConfig::default());
//! let book = Worldbook::new("Bestiary")
//!     .with_entry(WorldbookEntry::keyed(["dragon"], "Dragons hoard gold."));
//! let ctx = EvaluationContext::new(Uuid::new_v4())
//!     .with_worldbook(book)
//!     .with_message(Message::user("the dragon appeared"));
//!
//! let result = engine.evaluate(&ctx);
//! assert_eq!(result.after.len(), 1);
//! ```

mod assemble;
mod budget;
mod engine;
mod group;
mod matcher;
mod scan;
mod store;
mod timed;

pub use assemble::assemble;
pub use budget::{apply_budget, InjectionBudget};
pub use engine::{Activation, WorldbookEngine};
pub use group::{group_score, resolve_groups};
pub use matcher::{KeyFlags, KeywordMatcher, MatchOutcome};
pub use scan::build_scan_buffer;
pub use store::{
    FileStateStore, InMemoryStateStore, SessionRecord, StateDocument, TimedStateStore,
    STATE_SCHEMA_VERSION,
};
pub use timed::{decide, GateOutcome, SkipReason, TimedEffectState, Verdict};
