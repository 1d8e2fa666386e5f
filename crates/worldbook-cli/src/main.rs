//! worldbook-eval - Run worldbook activation from the command line.
//!
//! Reads an evaluation context as JSON and prints the bucketed result as
//! JSON on stdout. Each run is one turn for the context's session; timed
//! effects persist in the state file between runs.
//!
//! # Usage
//!
//! ```text
//! worldbook-eval evaluate <context.json | ->
//! worldbook-eval state <session-id>
//! ```
//!
//! # Configuration
//!
//! - `WORLDBOOK_CONFIG` - Optional TOML/JSON/YAML config file
//! - `WORLDBOOK_STATE_PATH` - Defaults to `~/.worldbook/timed_effects.json`
//! - `WORLDBOOK_MAX_ENTRY_EVALUATIONS`, `WORLDBOOK_TIME_BUDGET_MS`,
//!   `WORLDBOOK_RECURSION_DEPTH_CAP` - Evaluation guard limits
//!
//! Logs go to stderr; set `RUST_LOG=worldbook_core=debug` for per-entry decisions.

use std::io::Read;

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;
use worldbook_core::activation::TimedStateStore;
use worldbook_core::{EngineConfig, EvaluationContext, WorldbookEngine};

const USAGE: &str = "usage: worldbook-eval evaluate <context.json | ->\n       worldbook-eval state <session-id>";

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // stdout carries the JSON result
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = load_config()?;
    let engine = WorldbookEngine::with_file_store(config);
    tracing::info!(state_path = %engine.state_path().display(), "Using state file");

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["evaluate", source] => {
            let ctx = read_context(source)?;
            let result = engine.evaluate(&ctx);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        ["state", session] => {
            let session_id: Uuid = session
                .parse()
                .with_context(|| format!("invalid session id: {}", session))?;
            let store = engine.store();
            let report = serde_json::json!({
                "sessionId": session_id,
                "turn": store.current_turn(session_id)?,
                "states": store.session_states(session_id)?,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => bail!(USAGE),
    }

    Ok(())
}

/// Config file named by `WORLDBOOK_CONFIG`, else environment variables.
fn load_config() -> Result<EngineConfig> {
    match std::env::var("WORLDBOOK_CONFIG") {
        Ok(path) => EngineConfig::from_file(&path)
            .with_context(|| format!("failed to load config from {}", path)),
        Err(_) => Ok(EngineConfig::from_env()),
    }
}

fn read_context(source: &str) -> Result<EvaluationContext> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("failed to read {}", source))?
    };
    Ok(EvaluationContext::from_json(&raw)?)
}
