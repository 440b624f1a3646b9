//! CLI command implementations

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Notify};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::engine::{Collaborators, SignalEngine};
use crate::feed::{spawn_health_monitor, FeedClient, SourceHealth};
use crate::market::{DexScreenerProvider, MarketDataProvider};
use crate::notify::telegram::TelegramNotifier;
use crate::notify::{LogNotifier, Notifier};
use crate::scoring::{confidence_breakdown, whale_threshold, ConfidenceInputs};
use crate::store::MemoryStore;
use crate::types::{SignalLevel, TokenType};

/// Start the signal engine and every configured feed
pub async fn run(config: &Config) -> Result<()> {
    info!("Starting smartflow signal engine...");
    info!(
        "Watching {} wallets across {} feeds",
        config.wallets.len(),
        config.feeds.len()
    );

    let store = Arc::new(MemoryStore::new());

    let market: Arc<dyn MarketDataProvider> = Arc::new(DexScreenerProvider::new(&config.market)?);

    let notifier: Arc<dyn Notifier> = if config.telegram.enabled {
        info!("Alerts go to Telegram");
        Arc::new(TelegramNotifier::new(&config.telegram)?)
    } else {
        warn!("Telegram disabled - alerts are only logged");
        Arc::new(LogNotifier)
    };

    let engine = Arc::new(SignalEngine::new(
        config.clone(),
        Collaborators {
            market,
            notifier,
            store: store.clone(),
            reputation: store,
            safety: None,
            estimator: None,
        },
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let (event_tx, event_rx) = mpsc::channel(config.intake.channel_capacity);

    let now = chrono::Utc::now().timestamp();
    let mut background = Vec::new();
    for source in &config.feeds {
        let health = SourceHealth::shared(now);
        let reconnect = Arc::new(Notify::new());

        background.push(spawn_health_monitor(
            source.name.clone(),
            health.clone(),
            reconnect.clone(),
            config.health.clone(),
            shutdown_tx.subscribe(),
        ));

        let client = FeedClient::new(
            source.clone(),
            config.wallets.clone(),
            config.reconnect.clone(),
            health,
            reconnect,
            event_tx.clone(),
        );
        let shutdown_rx = shutdown_tx.subscribe();
        background.push(tokio::spawn(async move {
            let name = client.name().to_string();
            if let Err(e) = client.run(shutdown_rx).await {
                error!(source = %name, error = %e, "Feed client stopped");
            }
        }));
    }
    // The engine sees the channel close once every client is gone
    drop(event_tx);

    let mut engine_task = tokio::spawn(engine.run(event_rx, shutdown_tx.clone()));

    let outcome = tokio::select! {
        res = &mut engine_task => res,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            let _ = shutdown_tx.send(());
            engine_task.await
        }
    };

    let _ = shutdown_tx.send(());
    for task in background {
        let _ = task.await;
    }

    match outcome {
        Ok(Ok(())) => {
            info!("Shutdown complete");
            Ok(())
        }
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(anyhow!("Engine task failed: {}", e)),
    }
}

/// Show configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Offline confidence calculator
pub fn confidence(
    config: &Config,
    scores: &[f64],
    volume_1h: f64,
    market_cap: f64,
    growth_5m: f64,
    token_type: &str,
    whale: bool,
) -> Result<()> {
    let token_type: TokenType = token_type.parse().map_err(|e: String| anyhow!(e))?;

    let inputs = ConfidenceInputs {
        scores,
        volume_1h,
        market_cap,
        volume_growth_5m: growth_5m,
        token_type,
        whale_activity: whale,
    };
    let breakdown = confidence_breakdown(&inputs, &config.scoring);

    println!("Confidence breakdown:");
    println!("  wallets:        {}", scores.len());
    println!("  token_type:     {} (x{})", token_type, token_type.multiplier());
    println!("  wallet_factor:  {:.4}", breakdown.wallet_factor);
    println!("  growth_factor:  {:.4}", breakdown.growth_factor);
    println!("  market_factor:  {:.4}", breakdown.market_factor);
    println!("  weighted:       {:.4}", breakdown.weighted);
    println!("  confidence:     {:.4}", breakdown.confidence);
    println!("  level:          {}", SignalLevel::from_confidence(breakdown.confidence));
    println!(
        "  whale_threshold: ${:.2}",
        whale_threshold(market_cap, volume_1h, config.scoring.min_whale_usd)
    );
    println!(
        "  passes_gate:    {}",
        breakdown.confidence >= config.signal.min_confidence
    );

    Ok(())
}
