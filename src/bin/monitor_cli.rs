//! Command-line front end: one-off checks, the monitoring loop, scraping and
//! compliance analysis without the HTTP server.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use eu_compliance_monitor::analyze::{BusinessProfile, ComplianceAnalyzer, IMPACT_WINDOW_DAYS};
use eu_compliance_monitor::ingest::date::to_oj_date;
use eu_compliance_monitor::ingest::fetch_all;
use eu_compliance_monitor::monitor::threshold::recent_updates;
use eu_compliance_monitor::monitor::CycleOutcome;
use eu_compliance_monitor::recipients::Recipient;
use eu_compliance_monitor::store::{JsonFileStore, RecipientStore, UpdateLogStore};
use eu_compliance_monitor::{build_fetchers, build_pipeline, AppConfig, SchedulerHandle};

#[derive(Parser, Debug)]
#[command(
    name = "monitor_cli",
    about = "Monitor EU regulatory updates and analyze compliance from the command line",
    version
)]
struct Cli {
    /// Config file (TOML or JSON); otherwise config/monitor.{toml,json} or defaults
    #[arg(long, global = true, env = "MONITOR_CONFIG_PATH")]
    config: Option<PathBuf>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single monitoring cycle and print its report
    Check(DateArgs),
    /// Run the monitoring loop until Ctrl-C
    Monitor,
    /// Fetch one OJ day and print what was found, without touching state
    Scrape(DateArgs),
    /// Analyze a business profile (JSON file) and print analysis, roadmap and costs
    Analyze(AnalyzeArgs),
    /// Print the DDMMYYYY form of a date
    NormalizeDate { input: String },
    /// Register an alert recipient
    AddRecipient { email: String },
}

#[derive(Args, Debug)]
struct DateArgs {
    /// OJ date to query (YYYY-MM-DD, DD-MM-YYYY or DDMMYYYY); today when absent
    #[arg(long)]
    date: Option<String>,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// JSON file holding the profile, bare or as {"business_info": {...}}
    #[arg(long)]
    business_info: PathBuf,
    /// Also assess the impact of updates discovered in the last 30 days
    #[arg(long)]
    impact: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "eu_compliance_monitor=debug,info"
    } else {
        "eu_compliance_monitor=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // stdout is reserved for JSON output.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json(v: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}

/// Apply `--date` after checking it, so a bad date fails before any I/O.
fn with_date(mut cfg: AppConfig, args: &DateArgs) -> Result<AppConfig> {
    if let Some(raw) = &args.date {
        to_oj_date(raw.as_str())?;
        cfg.monitoring.oj_date = Some(raw.clone());
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Check(args) => check(with_date(cfg, &args)?).await,
        Command::Monitor => monitor(cfg).await,
        Command::Scrape(args) => scrape(with_date(cfg, &args)?).await,
        Command::Analyze(args) => analyze(cfg, args).await,
        Command::NormalizeDate { input } => {
            println!("{}", to_oj_date(input.as_str())?);
            Ok(())
        }
        Command::AddRecipient { email } => add_recipient(cfg, &email),
    }
}

async fn check(cfg: AppConfig) -> Result<()> {
    let scheduler = SchedulerHandle::new(Arc::new(build_pipeline(&cfg)?));
    match scheduler.run_now().await {
        CycleOutcome::Completed(report) => print_json(&json!({
            "oj_date": report.oj_date,
            "fetched": report.fetched,
            "added": report.added,
            "sources_changed": report.sources_changed,
            "fetch_failures": report.fetch_failures.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
            "decision": report.decision,
            "alert": report.alert,
            "dispatch_failures": report.dispatch_failures.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
        })),
        CycleOutcome::Failed(e) => Err(e).context("monitoring cycle failed"),
        CycleOutcome::Skipped => bail!("a cycle is already running"),
    }
}

async fn monitor(cfg: AppConfig) -> Result<()> {
    let scheduler = SchedulerHandle::new(Arc::new(build_pipeline(&cfg)?));
    let task = scheduler.spawn_loop(cfg.monitoring.interval());
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    tracing::info!("shutdown requested; finishing current cycle");
    scheduler.shutdown();
    task.await.context("monitoring loop")?;
    Ok(())
}

async fn scrape(cfg: AppConfig) -> Result<()> {
    let fetchers = build_fetchers(&cfg)?;
    let oj_date = match &cfg.monitoring.oj_date {
        Some(raw) => to_oj_date(raw.as_str())?,
        None => to_oj_date(Utc::now())?,
    };
    let out = fetch_all(&fetchers, &oj_date, cfg.monitoring.fetch_timeout(), None).await;
    for e in &out.failures {
        tracing::warn!(error = %e, "source failed");
    }
    print_json(&json!({
        "oj_date": oj_date,
        "fetched": out.fetched(),
        "updates": out.batch,
    }))
}

fn read_profile(path: &Path) -> Result<BusinessProfile> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let v: Value = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    let inner = v.get("business_info").cloned().unwrap_or(v);
    serde_json::from_value(inner).context("invalid business profile")
}

async fn analyze(cfg: AppConfig, args: AnalyzeArgs) -> Result<()> {
    let profile = read_profile(&args.business_info)?;
    let analyzer = ComplianceAnalyzer::from_config(&cfg.deepseek);

    let analysis = analyzer.analyze_compliance(&profile).await;
    let mut out = json!({ "analysis": analysis });
    if !analysis.is_fallback() {
        out["roadmap"] = analyzer.generate_roadmap(&analysis).await;
        out["cost_estimate"] = analyzer.estimate_costs(&analysis).await;
    }
    if args.impact {
        let log = JsonFileStore::new(&cfg.storage.data_dir).load()?;
        let recent = recent_updates(&log, IMPACT_WINDOW_DAYS, Utc::now());
        out["impact"] = analyzer.assess_impact(&profile, &recent).await;
    }
    print_json(&out)
}

fn add_recipient(cfg: AppConfig, email: &str) -> Result<()> {
    let store = JsonFileStore::open(&cfg.storage.data_dir)?;
    let outcome = store.register(Recipient::parse(email)?)?;
    let r = outcome.recipient();
    if outcome.is_created() {
        println!("{} registered ({})", r.email, r.id);
    } else {
        println!("{} already registered", r.email);
    }
    Ok(())
}
