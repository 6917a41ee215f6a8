//! Daylock CLI — plan, replay, run, kill, status and backfill commands.
//!
//! Commands:
//! - `plan` — build and print the snapshot for a day from the archive
//! - `replay` — plan, lock and paper-execute a historical day
//! - `run` — start the background tasks against the live archive
//! - `kill` — latch the manual kill switch for today
//! - `status` — print the shared state document
//! - `backfill` — label archived days into the outcome table

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use daylock_core::domain::{is_weekday, PlanSnapshot};
use daylock_core::gate;
use daylock_runner::tasks::planner::build_day_snapshot;
use daylock_runner::{
    backfill, replay_day, ArchiveFollower, Clock, ControlSection, CsvArchive, DaylockConfig, DocumentStore,
    FileStore, OutcomeStore, ReplayOptions, ReplaySummary, Services, StatePatch, StopSignal, Supervisor,
    SystemClock, TaskContext, TradeJournal,
};

#[derive(Parser)]
#[command(name = "daylock", about = "Daylock — once-a-day plan lock and paper execution")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "daylock.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and print the plan snapshot for a day.
    Plan {
        /// Day to plan (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        day: Option<String>,

        /// Print the snapshot as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Replay a historical day end to end.
    Replay {
        /// Day to replay (YYYY-MM-DD).
        #[arg(long)]
        day: String,

        /// Print the full summary as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Replay as if the kill switch was pulled before the open.
        #[arg(long, default_value_t = false)]
        killed: bool,
    },
    /// Run the planner, market, simulator and settlement tasks.
    Run {
        /// Stop at this local time (HH:MM) instead of after settlement.
        #[arg(long)]
        until: Option<String>,
    },
    /// Stop new entries for the rest of today.
    Kill,
    /// Print the shared state document.
    Status {
        /// Print the raw document as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Label archived days into the outcome table.
    Backfill {
        /// First day (YYYY-MM-DD).
        #[arg(long)]
        from: String,

        /// Last day (YYYY-MM-DD). Defaults to yesterday.
        #[arg(long)]
        to: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Plan { day, json } => run_plan(&config, day.as_deref(), json),
        Commands::Replay { day, json, killed } => run_replay(&config, &day, json, killed),
        Commands::Run { until } => run_service(config, until.as_deref()),
        Commands::Kill => run_kill(&config),
        Commands::Status { json } => run_status(&config, json),
        Commands::Backfill { from, to } => run_backfill(&config, &from, to.as_deref()),
    }
}

fn load_config(path: &Path) -> Result<DaylockConfig> {
    DaylockConfig::load(path).with_context(|| format!("loading config {}", path.display()))
}

fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid day '{s}', expected YYYY-MM-DD"))
}

fn today() -> NaiveDate {
    SystemClock.now().date()
}

fn run_plan(config: &DaylockConfig, day: Option<&str>, json: bool) -> Result<()> {
    let day = day.map(parse_day).transpose()?.unwrap_or_else(today);
    let archive = CsvArchive::new(&config.runner.archive_dir);
    let history = OutcomeStore::new(&config.runner.outcomes_path).load_all()?;
    let snapshot = build_day_snapshot(config, &archive, &history, day, SystemClock.now());

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_snapshot(&snapshot);
    }
    Ok(())
}

fn run_replay(config: &DaylockConfig, day: &str, json: bool, killed: bool) -> Result<()> {
    let day = parse_day(day)?;
    let archive = CsvArchive::new(&config.runner.archive_dir);
    let history = OutcomeStore::new(&config.runner.outcomes_path).load_all()?;
    let summary = replay_day(config, &archive, &history, day, ReplayOptions { killed })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_snapshot(&summary.snapshot);
        print_replay(&summary);
    }
    Ok(())
}

fn run_service(config: DaylockConfig, until: Option<&str>) -> Result<()> {
    let until = until
        .map(|s| NaiveTime::parse_from_str(s, "%H:%M").with_context(|| format!("invalid --until '{s}', expected HH:MM")))
        .transpose()?;
    let clock = Arc::new(SystemClock);
    let day = clock.now().date();
    if !is_weekday(day) && until.is_none() {
        bail!("{day} is not a trading day; pass --until to run anyway");
    }

    let config = Arc::new(config);
    let store = Arc::new(FileStore::new(&config.runner.state_path));
    let archive = Arc::new(CsvArchive::new(&config.runner.archive_dir));
    let source = ArchiveFollower::new(archive.clone(), config.symbols.clone(), config.session.bar_minutes);
    let ctx = TaskContext {
        config: config.clone(),
        store: store.clone(),
        clock: clock.clone(),
        stop: StopSignal::new(),
    };
    let supervisor = Supervisor::start(
        ctx,
        Services {
            archive,
            outcomes: Arc::new(OutcomeStore::new(&config.runner.outcomes_path)),
            journal: Arc::new(TradeJournal::new(&config.runner.journal_path)),
            source: Box::new(source),
        },
    )?;
    info!(%day, symbols = config.symbols.len(), state = %config.runner.state_path.display(), "running");

    loop {
        if until.is_some_and(|t| clock.now().time() >= t) {
            info!("stop time reached");
            break;
        }
        match store.load() {
            Ok(doc) if doc.settlement.as_ref().is_some_and(|s| s.day == day) => {
                info!(%day, "day settled");
                break;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "state document unreadable"),
        }
        if !supervisor.is_healthy() {
            warn!("a task stopped unexpectedly, shutting down");
            break;
        }
        thread::sleep(config.poll_interval());
    }

    let mut failed = Vec::new();
    for (name, result) in supervisor.shutdown() {
        if let Err(e) = result {
            eprintln!("{name}: {e:#}");
            failed.push(name);
        }
    }
    if !failed.is_empty() {
        bail!("tasks failed: {}", failed.join(", "));
    }
    Ok(())
}

fn run_kill(config: &DaylockConfig) -> Result<()> {
    let day = today();
    let store = FileStore::new(&config.runner.state_path);
    store.apply(StatePatch::Control(ControlSection {
        manual_kill_day: Some(day),
    }))?;
    println!("Manual kill set for {day}. No new entries until the next trading day.");
    Ok(())
}

fn run_status(config: &DaylockConfig, json: bool) -> Result<()> {
    let doc = FileStore::new(&config.runner.state_path).load()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    let day = today();
    let decision = gate::check(doc.plan.as_ref(), day);
    println!("Day:        {day}");
    println!(
        "Gate:       {} ({:?}, {})",
        if decision.allowed { "OPEN" } else { "CLOSED" },
        decision.status,
        decision.reason
    );
    println!("Kill:       {}", if doc.kill_active(day) { "ACTIVE" } else { "off" });
    println!("Execution:  {:?}", doc.execution.status);
    if let Some(reason) = &doc.execution.reason {
        println!("            {reason}");
    }
    let risk = &doc.execution.risk;
    println!(
        "Risk:       realized {:.2}  open {:.2}  total {:.2}  can_open {}",
        risk.realized_total, risk.open_total, risk.day_total, risk.can_open_new_trades
    );
    for pos in &doc.execution.positions {
        println!(
            "  {:<12} {:?} {:>7} {:<7} entry {:>10}  pnl {:>10.2}",
            pos.symbol,
            pos.side,
            pos.quantity,
            pos.state.as_str(),
            pos.entry_price.map_or("-".to_string(), |p| format!("{p:.2}")),
            pos.realized_pnl + pos.open_pnl,
        );
    }
    if let Some(settled) = &doc.settlement {
        println!(
            "Settled:    {} at {} ({} outcomes, {} journal records)",
            settled.day, settled.settled_at, settled.outcomes_appended, settled.journal_records
        );
    }
    for (task, beat) in &doc.health {
        println!("  [{task}] {} {}", beat.at, beat.note);
    }
    Ok(())
}

fn run_backfill(config: &DaylockConfig, from: &str, to: Option<&str>) -> Result<()> {
    let from = parse_day(from)?;
    let to = match to {
        Some(s) => parse_day(s)?,
        None => today().pred_opt().context("no day before today")?,
    };
    if from > to {
        bail!("--from {from} is after --to {to}");
    }
    let archive = CsvArchive::new(&config.runner.archive_dir);
    let store = OutcomeStore::new(&config.runner.outcomes_path);
    let written = backfill(&archive, &store, config, from, to)?;
    println!("Appended {written} outcome rows to {}", store.path().display());
    Ok(())
}

fn print_snapshot(snapshot: &PlanSnapshot) {
    println!(
        "Plan {}  status {:?}  locked {}  risk/trade {:.2}  planned {:.2} / {:.2}",
        snapshot.day,
        snapshot.status,
        snapshot.locked,
        snapshot.risk_per_trade,
        snapshot.total_planned_risk,
        snapshot.daily_risk_budget
    );
    for plan in snapshot.plans.values() {
        if plan.direction.is_directional() {
            println!(
                "  {:<12} {:<7?} qty {:>7}  entry {:>10.2}  stop {:>10.2}  t1 {:>10.2}  t2 {:>10.2}",
                plan.symbol, plan.direction, plan.quantity, plan.entry_price, plan.stop_price, plan.target1, plan.target2
            );
        } else {
            println!("  {:<12} {:<7?}", plan.symbol, plan.direction);
        }
        println!("               {}", plan.reason);
    }
}

fn print_replay(summary: &ReplaySummary) {
    println!();
    for pos in &summary.positions {
        println!(
            "  {:<12} {:?} {:>7}  entry {:>10}  exit {:>10}  {:<10} pnl {:>10.2}",
            pos.symbol,
            pos.side,
            pos.quantity,
            pos.entry_price.map_or("-".to_string(), |p| format!("{p:.2}")),
            pos.exit_price.map_or("-".to_string(), |p| format!("{p:.2}")),
            pos.exit_reason.map_or("-".to_string(), |r| format!("{r:?}")),
            pos.realized_pnl,
        );
    }
    let risk = &summary.risk;
    println!(
        "Day total {:.2} (realized {:.2}, open {:.2}){}",
        risk.day_total,
        risk.realized_total,
        risk.open_total,
        if risk.loss_cap_breached { "  LOSS CAP BREACHED" } else { "" }
    );
}
