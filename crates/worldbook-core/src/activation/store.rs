//! Timed-effect state storage trait and implementations.
//!
//! Every read and write goes through one mutex, which is both the single
//! writer and the cache of record. The file-backed store mirrors each
//! mutation to disk immediately.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use super::timed::TimedEffectState;
use crate::error::{WorldbookError, WorldbookResult};

/// Version written into new state documents.
pub const STATE_SCHEMA_VERSION: u32 = 1;

/// Trait for timed-effect state storage.
pub trait TimedStateStore: Send + Sync {
    /// Increment the session's turn counter and return the new turn.
    fn advance_turn(&self, session_id: Uuid) -> WorldbookResult<u64>;

    /// Current turn without advancing (0 for an unseen session).
    fn current_turn(&self, session_id: Uuid) -> WorldbookResult<u64>;

    /// State for an entry, created empty on first access.
    fn load_state(&self, session_id: Uuid, entry_id: Uuid) -> WorldbookResult<TimedEffectState>;

    /// Replace an entry's state.
    fn save_state(
        &self,
        session_id: Uuid,
        entry_id: Uuid,
        state: &TimedEffectState,
    ) -> WorldbookResult<()>;

    /// Snapshot of every entry state recorded for a session.
    fn session_states(&self, session_id: Uuid)
        -> WorldbookResult<BTreeMap<Uuid, TimedEffectState>>;
}

/// On-disk document: `{schemaVersion, sessions: {id: {turn, states: {id: state}}}}`.
///
/// `BTreeMap` keeps key order stable between writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDocument {
    pub schema_version: u32,
    #[serde(default)]
    pub sessions: BTreeMap<Uuid, SessionRecord>,
}

/// Turn counter and entry states for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default)]
    pub turn: u64,
    #[serde(default)]
    pub states: BTreeMap<Uuid, TimedEffectState>,
}

impl Default for StateDocument {
    fn default() -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            sessions: BTreeMap::new(),
        }
    }
}

impl StateDocument {
    fn advance_turn(&mut self, session_id: Uuid) -> u64 {
        let record = self.sessions.entry(session_id).or_default();
        record.turn = record.turn.saturating_add(1);
        record.turn
    }

    fn current_turn(&self, session_id: Uuid) -> u64 {
        self.sessions.get(&session_id).map_or(0, |r| r.turn)
    }

    fn state(&mut self, session_id: Uuid, entry_id: Uuid) -> TimedEffectState {
        self.sessions
            .entry(session_id)
            .or_default()
            .states
            .entry(entry_id)
            .or_default()
            .clone()
    }

    fn set_state(&mut self, session_id: Uuid, entry_id: Uuid, state: &TimedEffectState) {
        self.sessions
            .entry(session_id)
            .or_default()
            .states
            .insert(entry_id, state.clone());
    }

    fn session_states(&self, session_id: Uuid) -> BTreeMap<Uuid, TimedEffectState> {
        self.sessions
            .get(&session_id)
            .map(|r| r.states.clone())
            .unwrap_or_default()
    }
}

/// JSON-file-backed store.
///
/// The document is read lazily on first access and cached for the lifetime
/// of the store. A missing, unreadable or corrupt file counts as empty.
pub struct FileStateStore {
    path: PathBuf,
    cache: Mutex<Option<StateDocument>>,
}

impl FileStateStore {
    /// Create a store backed by `path`. Nothing is read until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> WorldbookResult<MutexGuard<'_, Option<StateDocument>>> {
        self.cache.lock().map_err(|_| WorldbookError::lock_poisoned())
    }

    /// Run `f` against the cached document, loading it first if needed.
    fn read<T>(&self, f: impl FnOnce(&mut StateDocument) -> T) -> WorldbookResult<T> {
        let mut guard = self.lock()?;
        let doc = guard.get_or_insert_with(|| load_document(&self.path));
        Ok(f(doc))
    }

    /// Like `read`, then write the document back to disk.
    ///
    /// The cache keeps the mutation even when the write fails.
    fn write<T>(&self, f: impl FnOnce(&mut StateDocument) -> T) -> WorldbookResult<T> {
        let mut guard = self.lock()?;
        let doc = guard.get_or_insert_with(|| load_document(&self.path));
        let value = f(doc);
        persist_document(&self.path, doc)?;
        Ok(value)
    }
}

fn load_document(path: &Path) -> StateDocument {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No timed-effect state yet, starting empty");
            return StateDocument::default();
        }
        Err(e) => {
            let err = WorldbookError::state_read("failed to read timed-effect state", e);
            warn!(path = %path.display(), error = %err, "Starting with empty timed-effect state");
            return StateDocument::default();
        }
    };

    match serde_json::from_str::<StateDocument>(&raw) {
        Ok(doc) => {
            if doc.schema_version > STATE_SCHEMA_VERSION {
                warn!(
                    path = %path.display(),
                    version = doc.schema_version,
                    "Timed-effect state written by a newer schema"
                );
            }
            doc
        }
        Err(e) => {
            let err = WorldbookError::state_read("corrupt timed-effect state", e);
            warn!(path = %path.display(), error = %err, "Starting with empty timed-effect state");
            StateDocument::default()
        }
    }
}

fn persist_document(path: &Path, doc: &StateDocument) -> WorldbookResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| WorldbookError::state_write("failed to create state directory", e))?;
    }

    let json = serde_json::to_string_pretty(doc)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .map_err(|e| WorldbookError::state_write("failed to write timed-effect state", e))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| WorldbookError::state_write("failed to replace timed-effect state", e))?;
    Ok(())
}

impl TimedStateStore for FileStateStore {
    fn advance_turn(&self, session_id: Uuid) -> WorldbookResult<u64> {
        self.write(|doc| doc.advance_turn(session_id))
    }

    fn current_turn(&self, session_id: Uuid) -> WorldbookResult<u64> {
        self.read(|doc| doc.current_turn(session_id))
    }

    fn load_state(&self, session_id: Uuid, entry_id: Uuid) -> WorldbookResult<TimedEffectState> {
        self.read(|doc| doc.state(session_id, entry_id))
    }

    fn save_state(
        &self,
        session_id: Uuid,
        entry_id: Uuid,
        state: &TimedEffectState,
    ) -> WorldbookResult<()> {
        self.write(|doc| doc.set_state(session_id, entry_id, state))
    }

    fn session_states(
        &self,
        session_id: Uuid,
    ) -> WorldbookResult<BTreeMap<Uuid, TimedEffectState>> {
        self.read(|doc| doc.session_states(session_id))
    }
}

/// Volatile store for tests and ephemeral sessions.
#[derive(Default)]
pub struct InMemoryStateStore {
    doc: Mutex<StateDocument>,
}

impl InMemoryStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> WorldbookResult<MutexGuard<'_, StateDocument>> {
        self.doc.lock().map_err(|_| WorldbookError::lock_poisoned())
    }
}

impl TimedStateStore for InMemoryStateStore {
    fn advance_turn(&self, session_id: Uuid) -> WorldbookResult<u64> {
        Ok(self.lock()?.advance_turn(session_id))
    }

    fn current_turn(&self, session_id: Uuid) -> WorldbookResult<u64> {
        Ok(self.lock()?.current_turn(session_id))
    }

    fn load_state(&self, session_id: Uuid, entry_id: Uuid) -> WorldbookResult<TimedEffectState> {
        Ok(self.lock()?.state(session_id, entry_id))
    }

    fn save_state(
        &self,
        session_id: Uuid,
        entry_id: Uuid,
        state: &TimedEffectState,
    ) -> WorldbookResult<()> {
        self.lock()?.set_state(session_id, entry_id, state);
        Ok(())
    }

    fn session_states(
        &self,
        session_id: Uuid,
    ) -> WorldbookResult<BTreeMap<Uuid, TimedEffectState>> {
        Ok(self.lock()?.session_states(session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (Uuid, Uuid) {
        (Uuid::from_u128(0xA), Uuid::from_u128(0xB))
    }

    #[test]
    fn test_turn_advances_by_one() {
        let store = InMemoryStateStore::new();
        let (session, _) = ids();
        assert_eq!(store.current_turn(session).unwrap(), 0);
        assert_eq!(store.advance_turn(session).unwrap(), 1);
        assert_eq!(store.advance_turn(session).unwrap(), 2);
        assert_eq!(store.current_turn(session).unwrap(), 2);
    }

    #[test]
    fn test_sessions_are_independent() {
        let store = InMemoryStateStore::new();
        let (a, b) = ids();
        store.advance_turn(a).unwrap();
        store.advance_turn(a).unwrap();
        assert_eq!(store.advance_turn(b).unwrap(), 1);
    }

    #[test]
    fn test_state_created_lazily() {
        let store = InMemoryStateStore::new();
        let (session, entry) = ids();
        assert_eq!(store.load_state(session, entry).unwrap(), TimedEffectState::default());
        assert!(store.session_states(session).unwrap().contains_key(&entry));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let (session, entry) = ids();

        let store = FileStateStore::new(&path);
        store.advance_turn(session).unwrap();
        let state = TimedEffectState {
            last_triggered_turn: Some(1),
            sticky_until_turn: Some(3),
            ..Default::default()
        };
        store.save_state(session, entry, &state).unwrap();

        // Written through immediately, visible to a fresh store
        let reopened = FileStateStore::new(&path);
        assert_eq!(reopened.current_turn(session).unwrap(), 1);
        assert_eq!(reopened.load_state(session, entry).unwrap(), state);
    }

    #[test]
    fn test_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let (session, entry) = ids();

        let store = FileStateStore::new(&path);
        store.advance_turn(session).unwrap();
        store
            .save_state(
                session,
                entry,
                &TimedEffectState {
                    cooldown_until_turn: Some(4),
                    ..Default::default()
                },
            )
            .unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["schemaVersion"], 1);
        let record = &json["sessions"][session.to_string()];
        assert_eq!(record["turn"], 1);
        assert_eq!(record["states"][entry.to_string()]["cooldownUntilTurn"], 4);
    }

    #[test]
    fn test_corrupt_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        let (session, _) = ids();

        let store = FileStateStore::new(&path);
        assert_eq!(store.current_turn(session).unwrap(), 0);
        assert_eq!(store.advance_turn(session).unwrap(), 1);

        // The next write replaces the corrupt file
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(serde_json::from_str::<StateDocument>(&raw).is_ok());
    }

    #[test]
    fn test_reads_uppercase_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let (session, entry) = ids();
        let doc = format!(
            r#"{{"schemaVersion":1,"sessions":{{"{}":{{"turn":7,"states":{{"{}":{{"delayUntilTurn":9}}}}}}}}}}"#,
            session.to_string().to_uppercase(),
            entry.to_string().to_uppercase()
        );
        std::fs::write(&path, doc).unwrap();

        let store = FileStateStore::new(&path);
        assert_eq!(store.current_turn(session).unwrap(), 7);
        assert_eq!(
            store.load_state(session, entry).unwrap().delay_until_turn,
            Some(9)
        );
    }

    #[test]
    fn test_unwritable_path_reports_error_but_keeps_cache() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the parent directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let store = FileStateStore::new(blocker.join("state.json"));
        let (session, _) = ids();

        assert!(store.advance_turn(session).is_err());
        assert_eq!(store.current_turn(session).unwrap(), 1);
    }
}
