//! Core types for worldbook activation.

mod injection;
mod message;
mod worldbook;

pub use injection::{DepthGroup, EvaluationContext, WorldbookEvaluationResult, WorldbookInjection};
pub use message::{Message, MessageRole};
pub use worldbook::{
    InjectionRole, SelectiveLogic, Worldbook, WorldbookEntry, WorldbookPosition, WorldbookSettings,
    DEFAULT_INJECTION_DEPTH,
};
