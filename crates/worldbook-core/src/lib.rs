//! worldbook-core - Keyword-triggered context injection for chat sessions.
//!
//! A worldbook (lorebook) is a library of entries that are spliced into a
//! language-model prompt when their keys appear in the recent conversation.
//! This crate evaluates those entries turn by turn, tracks per-session
//! sticky/cooldown/delay state, and returns the accepted injections bucketed
//! by prompt position.
//!
//! # Example
//!
//! ```ignore
//! use worldbook_core::{EngineConfig, WorldbookEngine};
//!
//! let engine = WorldbookEngine::with_file_store(EngineConfig::from_env());
//! let result = engine.evaluate(&context);
//! for injection in &result.after {
//!     println!("{}", injection.rendered_content());
//! }
//! ```

pub mod activation;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use activation::{
    FileStateStore, InMemoryStateStore, TimedEffectState, TimedStateStore, WorldbookEngine,
};
pub use config::EngineConfig;
pub use error::{ErrorCode, WorldbookError, WorldbookResult};
pub use types::{
    DepthGroup, EvaluationContext, InjectionRole, Message, MessageRole, SelectiveLogic, Worldbook,
    WorldbookEntry, WorldbookEvaluationResult, WorldbookInjection, WorldbookPosition,
    WorldbookSettings,
};
