pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod providers;
pub mod store;
pub mod ui;

pub use engine::{Engine, Event, EventBus, EventSubscriber};
pub use error::{EngineError, EngineResult};

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::core::types::{PortfolioContext, TradeRequest};
use crate::engine::LoggingSubscriber;
use crate::providers::static_quotes::StaticOracle;
use crate::store::LedgerStore;
use crate::store::disk::FjallStore;
use crate::store::memory::MemoryStore;

/// Run the scripted competition from the config file: join the league,
/// play the trades, print the final leaderboard.
pub async fn run_scenario(config_path: Option<&str>) -> Result<()> {
    info!("Trade arena starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let store: Arc<dyn LedgerStore> = if config.persist {
        let data_dir = AppConfig::default_data_path()?.join("ledger");
        Arc::new(FjallStore::open(&data_dir)?)
    } else {
        Arc::new(MemoryStore::new())
    };
    let engine = Engine::new(config.engine.clone(), store);
    let _feed = engine.events().attach(LoggingSubscriber);

    let oracle = StaticOracle::new(config.quotes.clone());
    let league = &config.league;
    let context = PortfolioContext::League(league.name.clone());

    for (i, user) in league.members.iter().enumerate() {
        match engine.join_league(&league.name, user, i == 0).await {
            Ok(_) => {}
            // A persisted ledger already has the roster from an earlier run
            Err(EngineError::AlreadyExists { .. }) => {
                debug!(user = %user, "Already a member, skipping join")
            }
            Err(e) => return Err(e.into()),
        }
    }

    for trade in &league.trades {
        let portfolio_id = context.key_of(&trade.user);
        let mut request = TradeRequest::new(&trade.symbol, trade.side, trade.shares);
        if let Some(note) = &trade.note {
            request = request.with_note(note);
        }
        match engine.execute_trade(&portfolio_id, request, &oracle).await {
            Ok(transaction) => println!("{}", ui::trade_line(&trade.user, &transaction)),
            Err(e) if e.is_user_error() => {
                let label = format!("{} trade rejected:", trade.user);
                println!("{} {e}", ui::style_text(&label, ui::StyleType::Error));
            }
            Err(e) => return Err(e.into()),
        }
    }

    let entries = engine.recompute_leaderboard(&league.name, &oracle).await?;
    println!("\n{}", ui::leaderboard_table(&league.name, &entries));
    Ok(())
}
