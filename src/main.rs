//! PADDOCK: skill-rated pricing and staking for horse-racing win markets.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the strategy checkpoint (or starts fresh), then either replays
//! stored races (`backtest`) or trades upcoming races on the exchange
//! (`paper` / `live`) until interrupted.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use paddock::backtest::run_backtest;
use paddock::config::{self, AppConfig, RunMode};
use paddock::execution::{ExecutionService, LiveExecutionService, PaperExecutionService, Throttle};
use paddock::platforms::betfair::BetfairClient;
use paddock::platforms::ExchangeGateway;
use paddock::storage::{self, RaceStore};
use paddock::strategy::{Decision, StrategyOrchestrator};
use paddock::types::Race;

const BANNER: &str = r#"
 ____   _    ____  ____   ___   ____ _  __
|  _ \ / \  |  _ \|  _ \ / _ \ / ___| |/ /
| |_) / _ \ | | | | | | | | | | |   | ' /
|  __/ ___ \| |_| | |_| | |_| | |___| . \
|_| /_/   \_\____/|____/ \___/ \____|_|\_\

  Skill-rated pricing & risk-adjusted staking
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".into());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %config_path,
        mode = ?cfg.run.mode,
        estimator = ?cfg.strategy.estimator,
        risk_aversion = cfg.strategy.risk_aversion,
        max_exposure = format!("£{:.2}", cfg.strategy.max_exposure),
        "PADDOCK starting up"
    );

    let mut strategy = restore_strategy(&cfg)?;

    match cfg.run.mode {
        RunMode::Backtest => backtest(&cfg, &mut strategy).await,
        RunMode::Paper | RunMode::Live => trade(&cfg, &mut strategy).await,
    }
}

/// Resume from the checkpoint when there is one, else build from config.
fn restore_strategy(cfg: &AppConfig) -> Result<StrategyOrchestrator> {
    match storage::load_checkpoint(Some(&cfg.run.checkpoint_path))? {
        Some(snapshot) => {
            let strategy = StrategyOrchestrator::import(snapshot)
                .context("Checkpoint does not describe a valid strategy")?;
            info!(
                runners = strategy.model().store().len(),
                races_fit = strategy.model().races_fit(),
                "Resumed from checkpoint"
            );
            Ok(strategy)
        }
        None => {
            info!("Fresh start");
            Ok(StrategyOrchestrator::new(
                cfg.strategy.clone(),
                cfg.rating.clone(),
            )?)
        }
    }
}

/// Replay stored races and write checkpoint, ledger and scorecard.
async fn backtest(cfg: &AppConfig, strategy: &mut StrategyOrchestrator) -> Result<()> {
    let store = RaceStore::connect(&cfg.data.database_url).await?;
    let outcome = run_backtest(&store, &cfg.data.filter, strategy).await?;

    storage::save_checkpoint(&outcome.checkpoint, Some(&cfg.run.checkpoint_path))?;
    storage::save_ledger(&outcome.bets, Some(&cfg.run.ledger_path))?;
    storage::save_json(&outcome.scorecard, &cfg.run.scorecard_path)?;

    let card = &outcome.scorecard;
    info!(
        races = outcome.records.len(),
        bets = card.all.count,
        backs = card.backs.count,
        lays = card.lays.count,
        staked = format!("£{:.2}", card.all.staked),
        pnl = format!("£{:.2}", card.all.pnl),
        pnl_net = format!(
            "£{:.2}",
            card.daily_pnl.last().map_or(0.0, |d| d.net_cumulative)
        ),
        llik_model = format!("{:.2}", card.log_likelihood.model),
        llik_implied = format!("{:.2}", card.log_likelihood.implied),
        llik_uniform = format!("{:.2}", card.log_likelihood.uniform),
        "Backtest finished"
    );
    Ok(())
}

/// Trade upcoming races until Ctrl+C.
async fn trade(cfg: &AppConfig, strategy: &mut StrategyOrchestrator) -> Result<()> {
    let gateway = Arc::new(BetfairClient::from_env(
        &cfg.gateway.app_key_env,
        &cfg.gateway.username_env,
        &cfg.gateway.password_env,
        Throttle::per_minute(cfg.gateway.calls_per_minute)?,
    )?);

    let mut exec: Box<dyn ExecutionService> = match cfg.run.mode {
        RunMode::Live => {
            let funds = gateway.account_funds().await?;
            info!(
                available = format!("£{:.2}", funds.available_to_bet),
                exposure = format!("£{:.2}", funds.exposure),
                "Live trading"
            );
            Box::new(
                LiveExecutionService::new(gateway.clone())
                    .with_max_spread_ticks(cfg.gateway.max_spread_ticks),
            )
        }
        _ => Box::new(PaperExecutionService::new(gateway.clone())),
    };

    // Markets already decided, and the subset that carried bets.
    let mut seen: HashSet<String> = HashSet::new();
    let mut traded: HashSet<String> = HashSet::new();
    let mut interval = tokio::time::interval(Duration::from_secs(cfg.run.poll_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.run.poll_interval_secs,
        backend = exec.name(),
        "Entering trading loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match trading_pass(cfg, gateway.as_ref(), strategy, exec.as_mut(), &mut seen, &mut traded).await {
                    Ok(()) => {}
                    Err(e) => error!(error = %e, "Trading pass failed, will retry next tick"),
                }
                if let Err(e) = persist(cfg, strategy, exec.as_mut()).await {
                    error!(error = %e, "Failed to save state");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    for market_id in &traded {
        match exec.cancel_unmatched(market_id, None).await {
            Ok(0) => {}
            Ok(n) => info!(market_id = %market_id, cancelled = n, "Unmatched orders cancelled"),
            Err(e) => warn!(market_id = %market_id, error = %e, "Cancel failed"),
        }
    }
    persist(cfg, strategy, exec.as_mut()).await?;
    info!(markets = traded.len(), "PADDOCK shut down cleanly.");
    Ok(())
}

/// Discover races not yet decided and run them through the strategy.
async fn trading_pass(
    cfg: &AppConfig,
    gateway: &BetfairClient,
    strategy: &mut StrategyOrchestrator,
    exec: &mut dyn ExecutionService,
    seen: &mut HashSet<String>,
    traded: &mut HashSet<String>,
) -> Result<()> {
    gateway.keep_alive().await?;
    let markets = gateway
        .future_races(cfg.gateway.lookahead_hours, cfg.gateway.countries.clone())
        .await?;

    let races: Vec<Race> = markets
        .iter()
        .filter(|m| !seen.contains(&m.market_id))
        .filter_map(|m| m.to_race())
        .collect();
    if races.is_empty() {
        return Ok(());
    }

    // An exchange failure aborts the pass; unprocessed races come back next time.
    let records = strategy.run(&races, exec).await?;
    for record in records {
        if matches!(record.decision, Decision::Submitted { .. }) {
            traded.insert(record.market_id.clone());
        }
        seen.insert(record.market_id);
    }
    Ok(())
}

async fn persist(
    cfg: &AppConfig,
    strategy: &StrategyOrchestrator,
    exec: &mut dyn ExecutionService,
) -> Result<()> {
    storage::save_checkpoint(&strategy.export(), Some(&cfg.run.checkpoint_path))?;
    let (matched, unmatched) = exec.get_matched_and_unmatched_bets().await?;
    if !unmatched.is_empty() {
        info!(unmatched = unmatched.len(), "Orders still waiting to match");
    }
    storage::save_ledger(&matched, Some(&cfg.run.ledger_path))?;
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("paddock=info"));

    let json_logging = std::env::var("PADDOCK_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
