//! pacer - pacing engine をシミュレーション環境で動かすデモ
//!
//! - `--config` の `[simulation]` から InMemoryLeadStore と SimulatedTransport を作る
//! - `--events` の JSON lines（なければ組み込みのデモ台本）を 1 件ずつ engine に流す
//! - 各 event の後に AgentSnapshot を JSON で出力する

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use pacer_core::config::Config;
use pacer_core::impls::{InMemoryLeadStore, SimulatedTransport};
use pacer_core::ports::random_or_none;
use pacer_core::{AgentId, PacingEngine, PacingEvent, PhoneNumber};

#[derive(Debug, Parser)]
#[command(name = "pacer", about = "Replay agent/call events through a power-dialer pacing engine")]
struct Cli {
    /// Path to pacer.toml (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Agent to pace for
    #[arg(short, long, default_value = "123")]
    agent: String,

    /// JSON-lines file of events, e.g. {"event":"call_started","phone":"1..."}
    #[arg(short, long)]
    events: Option<PathBuf>,

    /// Do not wait for in-flight dials before printing each snapshot
    #[arg(long)]
    no_settle: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    init_logging(&config.general.log_level);

    let events = match &cli.events {
        Some(path) => read_events(path)?,
        None => demo_script(&config),
    };

    let store = InMemoryLeadStore::new(config.simulation.seed_leads.clone())
        .with_latency(random_or_none(config.simulation.store_latency_ms));
    let transport = SimulatedTransport::new(Arc::new(store.clone()))
        .with_failing(config.simulation.failing_leads.clone())
        .with_latency(random_or_none(config.simulation.dial_latency_ms));

    let engine = PacingEngine::builder(AgentId::new(cli.agent))
        .store(Arc::new(store.clone()))
        .transport(Arc::new(transport))
        .config(config.pacing)
        .build()
        .context("building pacing engine")?;

    tracing::info!(
        agent_id = %engine.agent_id(),
        dial_ratio = engine.config().dial_ratio,
        events = events.len(),
        "replaying events"
    );

    tokio::select! {
        result = replay(&engine, &events, !cli.no_settle) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted; logging the agent out");
            engine.on_agent_logout().await?;
        }
    }

    let counts = store.counts().await;
    println!("{}", serde_json::to_string_pretty(&counts)?);
    Ok(())
}

async fn replay(engine: &PacingEngine, events: &[PacingEvent], settle: bool) -> Result<()> {
    for event in events {
        // handler の失敗は報告して次へ進む
        if let Err(e) = engine.handle(event).await {
            tracing::error!(%event, error = %e, "event handler failed");
        }
        if settle {
            engine.wait_for_outstanding_dials().await;
        }

        let snapshot = engine.snapshot().await?;
        println!("{}", serde_json::to_string(&snapshot)?);
    }
    Ok(())
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn read_events(path: &Path) -> Result<Vec<PacingEvent>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading events from {}", path.display()))?;
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid event", path.display(), i + 1))
        })
        .collect()
}

/// login → 最初に取られる lead が出る → 切る → logout
fn demo_script(config: &Config) -> Vec<PacingEvent> {
    let mut events = vec![PacingEvent::AgentLogin];
    // store は seed の末尾から lead を渡す
    if let Some(first) = config.simulation.seed_leads.last() {
        let phone = PhoneNumber::new(first.as_str());
        events.push(PacingEvent::CallStarted {
            phone: phone.clone(),
        });
        events.push(PacingEvent::CallEnded { phone });
    }
    events.push(PacingEvent::AgentLogout);
    events
}
