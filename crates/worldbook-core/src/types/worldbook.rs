//! Normalized worldbook model.
//!
//! Worldbooks arrive here already imported and validated (non-empty content,
//! one canonical field set regardless of the source dialect). The engine only
//! reads them.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Depth used for `AtDepth` entries that carry no explicit depth.
pub const DEFAULT_INJECTION_DEPTH: usize = 4;

/// A named collection of conditionally injected entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worldbook {
    pub id: Uuid,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub entries: Vec<WorldbookEntry>,
    #[serde(default)]
    pub settings: WorldbookSettings,
}

impl Worldbook {
    /// Create an enabled, empty worldbook with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            enabled: true,
            entries: Vec::new(),
            settings: WorldbookSettings::default(),
        }
    }

    /// Builder method to set the id.
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Builder method to append an entry.
    pub fn with_entry(mut self, entry: WorldbookEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Builder method to replace the settings.
    pub fn with_settings(mut self, settings: WorldbookSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Per-book activation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorldbookSettings {
    /// Exchanges (user + assistant pairs) to scan.
    pub scan_depth: usize,
    /// Extra activation passes after the first.
    pub max_recursion_depth: usize,
    /// Cap on accepted injections.
    pub max_injected_entries: usize,
    /// Cap on the summed rendered length of accepted injections.
    pub max_injected_characters: usize,
    /// Placement for outlet entries with no outlet name.
    pub fallback_position: WorldbookPosition,
}

impl Default for WorldbookSettings {
    fn default() -> Self {
        Self {
            scan_depth: 2,
            max_recursion_depth: 2,
            max_injected_entries: 64,
            max_injected_characters: 6000,
            fallback_position: WorldbookPosition::After,
        }
    }
}

impl WorldbookSettings {
    /// Clamp values imported from loosely validated sources.
    pub fn sanitized(&self) -> Self {
        Self {
            scan_depth: self.scan_depth.max(1),
            fallback_position: match self.fallback_position {
                // An outlet fallback would loop back to itself.
                WorldbookPosition::Outlet => WorldbookPosition::After,
                other => other,
            },
            ..self.clone()
        }
    }
}

/// Structural slot in the final prompt.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum WorldbookPosition {
    /// Before the conversation.
    Before,
    /// After the conversation.
    #[default]
    After,
    /// Top of the author's note.
    AnTop,
    /// Bottom of the author's note.
    AnBottom,
    /// Top of the example messages.
    EmTop,
    /// Bottom of the example messages.
    EmBottom,
    /// Interleaved `depth` messages from the end.
    AtDepth,
    /// Named slot resolved by prompt templates.
    Outlet,
}

/// How secondary keys combine with a primary match.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum SelectiveLogic {
    /// At least one secondary key must hit.
    #[default]
    AndAny,
    /// Every secondary key must hit.
    AndAll,
    /// No secondary key may hit.
    NotAny,
    /// At least one secondary key must miss.
    NotAll,
}

/// Message role the prompt builder should use for an injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectionRole {
    #[default]
    System,
    User,
    Assistant,
}

/// One unit of injectable content with its own trigger conditions and placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldbookEntry {
    pub id: Uuid,
    /// Identifier from the source file, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<i64>,
    #[serde(default)]
    pub comment: String,
    pub content: String,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub secondary_keys: Vec<String>,
    #[serde(default)]
    pub selective_logic: SelectiveLogic,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Always eligible, no keyword required.
    #[serde(default)]
    pub constant: bool,
    #[serde(default)]
    pub position: WorldbookPosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outlet_name: Option<String>,
    /// Priority; higher wins.
    #[serde(default = "default_order")]
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
    /// Overrides the book's scan depth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_depth: Option<usize>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub match_whole_words: bool,
    #[serde(default)]
    pub use_regex: bool,
    #[serde(default)]
    pub use_probability: bool,
    /// Percent chance to fire, 0 to 100.
    #[serde(default = "default_probability")]
    pub probability: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub group_override: bool,
    #[serde(default = "default_group_weight")]
    pub group_weight: f64,
    #[serde(default)]
    pub use_group_scoring: bool,
    /// Turns to stay active after firing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticky: Option<u64>,
    /// Turns to stay suppressed after firing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<u64>,
    /// Turns between first match and activation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    /// Ignore content triggered by earlier passes.
    #[serde(default)]
    pub exclude_recursion: bool,
    /// Only fire in the first pass.
    #[serde(default)]
    pub prevent_recursion: bool,
    /// Only fire from the second pass onward.
    #[serde(default)]
    pub delay_until_recursion: bool,
    #[serde(default)]
    pub role: InjectionRole,
}

impl WorldbookEntry {
    /// Create an enabled, keyless entry with default placement.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            uid: None,
            comment: String::new(),
            content: content.into(),
            keys: Vec::new(),
            secondary_keys: Vec::new(),
            selective_logic: SelectiveLogic::default(),
            enabled: true,
            constant: false,
            position: WorldbookPosition::default(),
            outlet_name: None,
            order: default_order(),
            depth: None,
            scan_depth: None,
            case_sensitive: false,
            match_whole_words: false,
            use_regex: false,
            use_probability: false,
            probability: default_probability(),
            group: None,
            group_override: false,
            group_weight: default_group_weight(),
            use_group_scoring: false,
            sticky: None,
            cooldown: None,
            delay: None,
            exclude_recursion: false,
            prevent_recursion: false,
            delay_until_recursion: false,
            role: InjectionRole::default(),
        }
    }

    /// Create an entry triggered by the given primary keys.
    pub fn keyed<I, S>(keys: I, content: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(content).with_keys(keys)
    }

    /// Builder method to set the id.
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Builder method to set the primary keys.
    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method to set secondary keys and their logic.
    pub fn with_secondary<I, S>(mut self, logic: SelectiveLogic, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selective_logic = logic;
        self.secondary_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method to set the comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Builder method to set the position.
    pub fn with_position(mut self, position: WorldbookPosition) -> Self {
        self.position = position;
        self
    }

    /// Builder method to set the order.
    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    /// Builder method to mark the entry constant.
    pub fn constant(mut self) -> Self {
        self.constant = true;
        self
    }

    /// Builder method to set the group tag.
    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Builder method to set sticky turns.
    pub fn sticky(mut self, turns: u64) -> Self {
        self.sticky = Some(turns);
        self
    }

    /// Builder method to set cooldown turns.
    pub fn cooldown(mut self, turns: u64) -> Self {
        self.cooldown = Some(turns);
        self
    }

    /// Builder method to set delay turns.
    pub fn delay(mut self, turns: u64) -> Self {
        self.delay = Some(turns);
        self
    }

    /// Primary keys that are not blank.
    pub fn active_keys(&self) -> impl Iterator<Item = &str> {
        self.keys
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
    }

    /// Secondary keys that are not blank.
    pub fn active_secondary_keys(&self) -> impl Iterator<Item = &str> {
        self.secondary_keys
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
    }

    /// Probability clamped to `[0, 100]`. NaN counts as 0.
    pub fn clamped_probability(&self) -> f64 {
        if self.probability.is_nan() {
            0.0
        } else {
            self.probability.clamp(0.0, 100.0)
        }
    }

    /// Non-blank group tag.
    pub fn group_tag(&self) -> Option<&str> {
        self.group
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
    }

    /// Non-blank outlet name.
    pub fn outlet(&self) -> Option<&str> {
        self.outlet_name
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
    }

    /// `"[comment]\ncontent"`, or raw content when the comment is blank.
    pub fn rendered_content(&self) -> String {
        render(&self.comment, &self.content)
    }
}

pub(crate) fn render(comment: &str, content: &str) -> String {
    let comment = comment.trim();
    if comment.is_empty() {
        content.to_string()
    } else {
        format!("[{}]\n{}", comment, content)
    }
}

fn default_true() -> bool {
    true
}

fn default_order() -> i64 {
    100
}

fn default_probability() -> f64 {
    100.0
}

fn default_group_weight() -> f64 {
    100.0
}
