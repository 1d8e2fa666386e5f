//! Engine inputs and outputs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::Message;
use crate::error::{WorldbookError, WorldbookResult};
use super::worldbook::{render, InjectionRole, Worldbook, WorldbookPosition};

/// Everything one `evaluate()` call looks at.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationContext {
    pub session_id: Uuid,
    /// Books assigned to the session.
    #[serde(default)]
    pub worldbooks: Vec<Worldbook>,
    /// Conversation so far, oldest first.
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced_prompt: Option<String>,
}

impl EvaluationContext {
    /// Create a context for a session with no books or messages.
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            worldbooks: Vec::new(),
            messages: Vec::new(),
            topic_prompt: None,
            enhanced_prompt: None,
        }
    }

    /// Parse a camelCase JSON context document.
    pub fn from_json(raw: &str) -> WorldbookResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| WorldbookError::parse(format!("invalid evaluation context: {}", e)))
    }

    /// Builder method to add a worldbook.
    pub fn with_worldbook(mut self, book: Worldbook) -> Self {
        self.worldbooks.push(book);
        self
    }

    /// Builder method to append a message.
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Builder method to set the topic prompt.
    pub fn with_topic_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.topic_prompt = Some(prompt.into());
        self
    }

    /// Builder method to set the enhanced prompt.
    pub fn with_enhanced_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.enhanced_prompt = Some(prompt.into());
        self
    }
}

/// One triggered entry, ready for the prompt builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldbookInjection {
    pub worldbook_id: Uuid,
    pub worldbook_name: String,
    pub entry_id: Uuid,
    pub comment: String,
    pub content: String,
    pub position: WorldbookPosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outlet_name: Option<String>,
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
    pub role: InjectionRole,
    /// Tie-breaker for group and budget decisions only.
    pub trigger_score: f64,
}

impl WorldbookInjection {
    /// `"[comment]\ncontent"`, or raw content when the comment is blank.
    pub fn rendered_content(&self) -> String {
        render(&self.comment, &self.content)
    }

    /// Length of the rendered content in characters.
    pub fn rendered_len(&self) -> usize {
        self.rendered_content().chars().count()
    }
}

/// Injections anchored at one depth from the end of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthGroup {
    pub depth: usize,
    pub entries: Vec<WorldbookInjection>,
}

/// Accepted injections bucketed by position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldbookEvaluationResult {
    pub before: Vec<WorldbookInjection>,
    pub after: Vec<WorldbookInjection>,
    pub an_top: Vec<WorldbookInjection>,
    pub an_bottom: Vec<WorldbookInjection>,
    pub em_top: Vec<WorldbookInjection>,
    pub em_bottom: Vec<WorldbookInjection>,
    pub outlet: Vec<WorldbookInjection>,
    /// Deepest first.
    pub at_depth: Vec<DepthGroup>,
    /// Every entry that fired this call, before group and budget trimming.
    pub triggered_entry_ids: Vec<Uuid>,
    /// Session turn this result was computed for.
    pub turn: u64,
    /// Activation passes actually run.
    pub passes: usize,
    /// Whether the step or time guard cut evaluation short.
    pub guard_tripped: bool,
}

impl WorldbookEvaluationResult {
    /// All accepted injections across every bucket.
    pub fn injections(&self) -> impl Iterator<Item = &WorldbookInjection> {
        self.before
            .iter()
            .chain(&self.after)
            .chain(&self.an_top)
            .chain(&self.an_bottom)
            .chain(&self.em_top)
            .chain(&self.em_bottom)
            .chain(&self.outlet)
            .chain(self.at_depth.iter().flat_map(|g| g.entries.iter()))
    }

    /// Number of accepted injections.
    pub fn len(&self) -> usize {
        self.injections().count()
    }

    /// Whether nothing was accepted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the given entry made it into the result.
    pub fn contains_entry(&self, entry_id: Uuid) -> bool {
        self.injections().any(|i| i.entry_id == entry_id)
    }

    /// Outlet injections declared under `name`.
    pub fn outlet_entries<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a WorldbookInjection> + 'a {
        self.outlet
            .iter()
            .filter(move |i| i.outlet_name.as_deref() == Some(name))
    }
}
