//! venft-node — drives a veNFT ledger from an operation log.
//!
//! Startup sequence:
//!   1. Open (or initialise) the state database
//!   2. Apply genesis if the DB is fresh, otherwise resume from the snapshot
//!   3. Stream the JSON-lines operation file into a queue
//!   4. Run the main loop: set the clock → apply → append to the oplog
//!   5. Persist the snapshot and report

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use tokio::io::AsyncBufReadExt;
use tracing::{debug, info, warn};

use venft_core::operation::{OpRecord, Operation};
use venft_core::types::{AccountId, Timestamp};
use venft_genesis::{apply_genesis, GenesisParams};
use venft_query::{reward_runway, LockQuery};
use venft_state::{Clock, InMemoryAssetLedger, ManualClock, StateDb, StateEngine, SystemClock};

type Engine = StateEngine<InMemoryAssetLedger, ManualClock>;

/// Meta key of the asset-ledger snapshot.
const ASSETS_KEY: &str = "assets";
/// Meta key of the genesis document the database was built from.
const GENESIS_KEY: &str = "genesis";

#[derive(Parser, Debug)]
#[command(
    name = "venft-node",
    version,
    about = "veNFT ledger node: vote-escrowed locks and multi-token rewards"
)]
struct Args {
    /// Directory for the persistent state database.
    #[arg(long, default_value = "~/.venft/data")]
    data_dir: PathBuf,

    /// Path to the genesis JSON (only read on first run).
    #[arg(long)]
    genesis: Option<PathBuf>,

    /// JSON-lines file of `{"at", "caller", "op"}` entries to apply.
    #[arg(long)]
    ops: Option<PathBuf>,

    /// Open (and initialise) the database, persist, and exit without applying ops.
    #[arg(long)]
    snapshot_only: bool,

    /// Account labels to report locks for after the run (comma-separated).
    #[arg(long, value_delimiter = ',')]
    report: Vec<String>,
}

/// One line of the operation file.
#[derive(Debug, Deserialize)]
struct OpLine {
    at: Timestamp,
    /// Account label, mapped through `AccountId::from_label`.
    caller: String,
    op: Operation,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,venft=debug")),
        )
        .init();

    let args = Args::parse();
    info!("veNFT node starting");

    // ── State database ────────────────────────────────────────────────────────
    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db = StateDb::open(&data_dir).context("opening state database")?;

    // ── Genesis if fresh ──────────────────────────────────────────────────────
    let (engine, clock) = match db.get_ledger().context("reading ledger snapshot")? {
        Some(state) => {
            info!(last_now = state.last_now, "existing database found, skipping genesis");
            let assets: InMemoryAssetLedger = db
                .get_meta(ASSETS_KEY)
                .context("reading asset snapshot")?
                .context("ledger snapshot present but asset snapshot missing")?;
            let clock = ManualClock::new(state.last_now);
            (StateEngine::from_snapshot(state, assets, clock.clone()), clock)
        }
        None => {
            info!("fresh database, applying genesis");
            let path = args
                .genesis
                .as_deref()
                .context("fresh database needs --genesis")?;
            let params = load_genesis_params(path)?;
            let start = params.start_time.unwrap_or_else(|| SystemClock.now());
            let clock = ManualClock::new(start);
            let engine = apply_genesis(&params, clock.clone()).context("applying genesis")?;
            db.put_meta(GENESIS_KEY, &params).context("storing genesis document")?;
            persist(&db, &engine)?;
            (engine, clock)
        }
    };

    // ── Operation log ─────────────────────────────────────────────────────────
    if !args.snapshot_only {
        if let Some(path) = args.ops.as_deref() {
            let (applied, rejected) = replay(&db, &engine, &clock, path).await?;
            info!(applied, rejected, "operation file processed");
        }
    }

    persist(&db, &engine)?;
    report(&engine, &args.report);
    info!(now = engine.now(), "node stopped");
    Ok(())
}

/// Feed `path` through a single consumer. Accepted operations are appended to
/// the oplog; rejected ones are logged and leave the ledger unchanged.
async fn replay(db: &StateDb, engine: &Engine, clock: &ManualClock, path: &Path) -> anyhow::Result<(u64, u64)> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("opening operation file {}", path.display()))?;

    let (tx, mut rx) = tokio::sync::mpsc::channel::<OpLine>(512);

    // Reader: parse lines, skip the ones that do not decode.
    let reader = tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(file).lines();
        let mut line_no = 0u64;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<OpLine>(&line) {
                Ok(entry) => {
                    if tx.send(entry).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(line = line_no, error = %e, "skipping malformed operation"),
            }
        }
        Ok::<_, std::io::Error>(())
    });

    let mut seq = db.last_seq().context("reading oplog")?.unwrap_or(0);
    let (mut applied, mut rejected) = (0u64, 0u64);

    // ── Main loop: apply ──────────────────────────────────────────────────────
    while let Some(entry) = rx.recv().await {
        let caller = AccountId::from_label(&entry.caller);
        clock.set(entry.at);
        match engine.apply(&caller, &entry.op) {
            Ok(outcome) => {
                seq += 1;
                db.append_op(&OpRecord {
                    seq,
                    at: engine.now(),
                    caller,
                    op: entry.op.clone(),
                })
                .context("appending to oplog")?;
                applied += 1;
                debug!(seq, caller = %entry.caller, op = entry.op.name(), ?outcome, "operation applied");
            }
            Err(e) => {
                rejected += 1;
                warn!(caller = %entry.caller, op = entry.op.name(), error = %e, "operation rejected");
            }
        }
    }

    reader
        .await
        .context("operation reader panicked")?
        .with_context(|| format!("reading operation file {}", path.display()))?;
    Ok((applied, rejected))
}

fn persist(db: &StateDb, engine: &Engine) -> anyhow::Result<()> {
    db.put_ledger(&engine.snapshot()).context("writing ledger snapshot")?;
    let assets = engine.with_assets(|a| a.clone());
    db.put_meta(ASSETS_KEY, &assets).context("writing asset snapshot")?;
    db.flush().context("flushing state database")?;
    Ok(())
}

fn report(engine: &Engine, labels: &[String]) {
    let query = LockQuery::new(engine);
    for label in labels {
        let owner = AccountId::from_label(label);
        let locks = engine.get_tokens_of_owner(&owner);
        info!(
            account = %label,
            locks = locks.len(),
            ve_power = engine.get_total_ve_power_for_owner(&owner),
            staked_power = engine.calculate_current_user_ve_power(&owner),
            "account report"
        );
        for id in locks {
            if let Ok(line) = query.describe(id) {
                info!("  {line}");
            }
        }
        for token in engine.reward_tokens() {
            if let Ok(pending) = engine.pending_rewards(&owner, &token) {
                info!(account = %label, token = %token, pending, "pending rewards");
            }
        }
    }
    for token in engine.reward_tokens() {
        if let Ok(r) = reward_runway(engine, &token) {
            info!(token = %token, rate = r.rate, unallocated = r.unallocated, runway = ?r.runway, "reward runway");
        }
    }
}

fn load_genesis_params(path: &Path) -> anyhow::Result<GenesisParams> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading genesis from {}", path.display()))?;
    GenesisParams::from_json(&json).context("parsing genesis JSON")
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
