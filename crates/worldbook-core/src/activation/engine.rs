//! Turn evaluation: the bounded activation loop.
//!
//! One `evaluate()` call is one session turn. The loop runs up to
//! `max_recursion_depth + 1` passes over every enabled entry; content fired
//! in earlier passes joins the scan buffer of later ones. The loop stops on a
//! pass that fires nothing, at the depth cap, or when the evaluation guard
//! trips. Survivors then go through group resolution, the budget and
//! position bucketing.

use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::assemble::assemble;
use super::budget::{apply_budget, InjectionBudget};
use super::group::resolve_groups;
use super::matcher::KeywordMatcher;
use super::scan::build_scan_buffer;
use super::store::{FileStateStore, TimedStateStore};
use super::timed::{decide, SkipReason, TimedEffectState, Verdict};
use crate::config::EngineConfig;
use crate::types::{
    EvaluationContext, Worldbook, WorldbookEntry, WorldbookEvaluationResult, WorldbookInjection,
    WorldbookPosition, WorldbookSettings, DEFAULT_INJECTION_DEPTH,
};

/// An entry that fired, paired with its injection.
#[derive(Debug, Clone)]
pub struct Activation<'a> {
    pub entry: &'a WorldbookEntry,
    pub injection: WorldbookInjection,
}

/// Worldbook activation engine.
///
/// Holds no per-session data itself; all cross-turn state lives in the store.
pub struct WorldbookEngine<S: TimedStateStore> {
    store: Arc<S>,
    matcher: KeywordMatcher,
    config: EngineConfig,
}

impl WorldbookEngine<FileStateStore> {
    /// Create an engine persisting to `config.state_path`.
    pub fn with_file_store(config: EngineConfig) -> Self {
        let store = Arc::new(FileStateStore::new(config.state_path.clone()));
        Self::new(store, config)
    }

    /// Path of the backing state document.
    pub fn state_path(&self) -> PathBuf {
        self.store.path().to_path_buf()
    }
}

impl<S: TimedStateStore> WorldbookEngine<S> {
    /// Create an engine over an existing store.
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            matcher: KeywordMatcher::new(config.regex_size_limit),
            store,
            config,
        }
    }

    /// The timed-effect state store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate one turn using the thread RNG for probability rolls.
    pub fn evaluate(&self, ctx: &EvaluationContext) -> WorldbookEvaluationResult {
        let mut rng = rand::thread_rng();
        self.evaluate_with_rng(ctx, &mut rng)
    }

    /// Evaluate one turn with a caller-supplied RNG.
    ///
    /// Never fails: store errors are logged and treated as empty state.
    pub fn evaluate_with_rng<R: Rng>(
        &self,
        ctx: &EvaluationContext,
        rng: &mut R,
    ) -> WorldbookEvaluationResult {
        let session_id = ctx.session_id;
        let turn = self.advance_turn(session_id);

        let books: Vec<(&Worldbook, WorldbookSettings)> = ctx
            .worldbooks
            .iter()
            .filter(|b| b.enabled)
            .map(|b| (b, b.settings.sanitized()))
            .collect();

        if books.is_empty() {
            debug!(session = %session_id, turn, "No enabled worldbooks");
            return WorldbookEvaluationResult {
                turn,
                ..Default::default()
            };
        }

        let max_passes = books
            .iter()
            .map(|(_, s)| s.max_recursion_depth)
            .max()
            .unwrap_or(0)
            .min(self.config.recursion_depth_cap)
            + 1;
        let budget = InjectionBudget::most_restrictive(books.iter().map(|(_, s)| s));

        let mut candidates: Vec<(&Worldbook, &WorldbookSettings, &WorldbookEntry)> = books
            .iter()
            .flat_map(|(book, settings)| book.entries.iter().map(move |e| (*book, settings, e)))
            .collect();
        candidates.sort_by(|a, b| {
            b.2.order
                .cmp(&a.2.order)
                .then_with(|| a.0.id.cmp(&b.0.id))
                .then_with(|| a.2.id.cmp(&b.2.id))
        });

        let mut buffers = ScanBuffers::new(ctx);
        let mut guard = EvaluationGuard::new(&self.config);
        let mut triggered: Vec<Activation<'_>> = Vec::new();
        let mut triggered_ids: HashSet<Uuid> = HashSet::new();
        // One probability roll per entry per turn
        let mut failed_rolls: HashSet<Uuid> = HashSet::new();
        let mut passes = 0;

        'passes: for pass in 0..max_passes {
            passes += 1;
            buffers.begin_pass(
                triggered
                    .iter()
                    .map(|a| a.entry.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n"),
            );
            let mut fired: Vec<Activation<'_>> = Vec::new();

            for &(book, settings, entry) in &candidates {
                if triggered_ids.contains(&entry.id)
                    || failed_rolls.contains(&entry.id)
                    || !entry.enabled
                    || (pass > 0 && entry.prevent_recursion)
                    || (pass == 0 && entry.delay_until_recursion)
                {
                    continue;
                }

                if !guard.step() {
                    warn!(
                        session = %session_id,
                        turn,
                        pass,
                        steps = guard.steps,
                        elapsed_ms = guard.elapsed().as_millis() as u64,
                        "Evaluation guard tripped, keeping entries fired so far"
                    );
                    triggered.append(&mut fired);
                    break 'passes;
                }

                let scan_depth = entry.scan_depth.unwrap_or(settings.scan_depth).max(1);
                let buffer = buffers.get(scan_depth, !entry.exclude_recursion);
                let state = self.load_state(session_id, entry.id);
                let outcome = decide(
                    entry,
                    turn,
                    &state,
                    || self.matcher.evaluate(entry, buffer),
                    rng,
                );

                if let Some(new_state) = &outcome.new_state {
                    self.save_state(session_id, entry.id, new_state);
                }

                match outcome.verdict {
                    Verdict::Fire {
                        trigger_score,
                        sticky_override,
                    } => {
                        debug!(entry = %entry.id, pass, trigger_score, sticky_override, "Entry fired");
                        triggered_ids.insert(entry.id);
                        fired.push(Activation {
                            entry,
                            injection: build_injection(book, settings, entry, trigger_score),
                        });
                    }
                    Verdict::Skip(reason) => {
                        if reason == SkipReason::ProbabilityRoll {
                            failed_rolls.insert(entry.id);
                        }
                        debug!(entry = %entry.id, pass, ?reason, "Entry skipped");
                    }
                }
            }

            debug!(session = %session_id, turn, pass, fired = fired.len(), "Pass complete");
            if fired.is_empty() {
                break;
            }
            triggered.append(&mut fired);
        }

        let triggered_entry_ids: Vec<Uuid> = triggered.iter().map(|a| a.entry.id).collect();
        let grouped: Vec<WorldbookInjection> = resolve_groups(triggered)
            .into_iter()
            .map(|a| a.injection)
            .collect();
        let accepted = apply_budget(grouped, &budget);

        info!(
            session = %session_id,
            turn,
            passes,
            triggered = triggered_entry_ids.len(),
            accepted = accepted.len(),
            guard_tripped = guard.tripped,
            "Worldbook evaluation complete"
        );

        WorldbookEvaluationResult {
            triggered_entry_ids,
            turn,
            passes,
            guard_tripped: guard.tripped,
            ..assemble(accepted)
        }
    }

    fn advance_turn(&self, session_id: Uuid) -> u64 {
        match self.store.advance_turn(session_id) {
            Ok(turn) => turn,
            Err(err) => {
                warn!(session = %session_id, error = %err, "Failed to persist turn counter");
                self.store.current_turn(session_id).unwrap_or_else(|err| {
                    warn!(session = %session_id, error = %err, "Turn counter unavailable");
                    0
                })
            }
        }
    }

    fn load_state(&self, session_id: Uuid, entry_id: Uuid) -> TimedEffectState {
        self.store
            .load_state(session_id, entry_id)
            .unwrap_or_else(|err| {
                warn!(session = %session_id, entry = %entry_id, error = %err, "Using empty timed-effect state");
                TimedEffectState::default()
            })
    }

    fn save_state(&self, session_id: Uuid, entry_id: Uuid, state: &TimedEffectState) {
        if let Err(err) = self.store.save_state(session_id, entry_id, state) {
            warn!(session = %session_id, entry = %entry_id, error = %err, "Failed to persist timed-effect state");
        }
    }
}

fn build_injection(
    book: &Worldbook,
    settings: &WorldbookSettings,
    entry: &WorldbookEntry,
    trigger_score: f64,
) -> WorldbookInjection {
    let (position, outlet_name) = match (entry.position, entry.outlet()) {
        (WorldbookPosition::Outlet, Some(name)) => (WorldbookPosition::Outlet, Some(name.to_string())),
        (WorldbookPosition::Outlet, None) => (settings.fallback_position, None),
        (position, _) => (position, None),
    };
    let depth = match position {
        WorldbookPosition::AtDepth => Some(entry.depth.unwrap_or(DEFAULT_INJECTION_DEPTH)),
        _ => entry.depth,
    };

    WorldbookInjection {
        worldbook_id: book.id,
        worldbook_name: book.name.clone(),
        entry_id: entry.id,
        comment: entry.comment.clone(),
        content: entry.content.clone(),
        position,
        outlet_name,
        order: entry.order,
        depth,
        role: entry.role,
        trigger_score,
    }
}

/// Scan buffers cached by scan depth, with and without recursion text.
struct ScanBuffers<'c> {
    ctx: &'c EvaluationContext,
    base: HashMap<usize, String>,
    extended: HashMap<usize, String>,
    recursion: String,
}

impl<'c> ScanBuffers<'c> {
    fn new(ctx: &'c EvaluationContext) -> Self {
        Self {
            ctx,
            base: HashMap::new(),
            extended: HashMap::new(),
            recursion: String::new(),
        }
    }

    /// Start a pass; `recursion` is the content fired by earlier passes.
    fn begin_pass(&mut self, recursion: String) {
        self.recursion = recursion;
        self.extended.clear();
    }

    fn get(&mut self, scan_depth: usize, include_recursion: bool) -> &str {
        let ctx = self.ctx;
        let base = self.base.entry(scan_depth).or_insert_with(|| {
            build_scan_buffer(
                &ctx.messages,
                scan_depth,
                ctx.topic_prompt.as_deref(),
                ctx.enhanced_prompt.as_deref(),
            )
        });

        if !include_recursion || self.recursion.is_empty() {
            return base;
        }

        let recursion = &self.recursion;
        self.extended.entry(scan_depth).or_insert_with(|| {
            if base.is_empty() {
                recursion.clone()
            } else {
                format!("{}\n{}", base, recursion)
            }
        })
    }
}

/// Step and wall-clock limit for one evaluation.
struct EvaluationGuard {
    started: Instant,
    time_budget: Option<Duration>,
    max_steps: usize,
    steps: usize,
    tripped: bool,
}

impl EvaluationGuard {
    fn new(config: &EngineConfig) -> Self {
        Self {
            started: Instant::now(),
            time_budget: config.time_budget(),
            max_steps: config.max_entry_evaluations,
            steps: 0,
            tripped: false,
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Count one entry evaluation; false once either limit is exceeded.
    fn step(&mut self) -> bool {
        let over_time = self.time_budget.is_some_and(|budget| self.elapsed() > budget);
        if self.steps >= self.max_steps || over_time {
            self.tripped = true;
            return false;
        }
        self.steps += 1;
        true
    }
}
