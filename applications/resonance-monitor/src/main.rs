use resonance_monitor::{
    assistant::{AssistantError, GeminiClient, InsightFetcher},
    config::Config,
    monitor::{EnergyMonitor, MonitorEvent, SilentTone, TerminalBell, ToneSink},
    settings::SettingsStore,
    usage::UsageReport,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resonance_monitor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting resonance-monitor");

    // Load configuration
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.yaml".to_string());

    let config = Config::load(&config_path)?;
    info!("Configuration loaded from: {}", config_path);

    let settings = SettingsStore::from_config(&config.settings);
    let tone_sink: Arc<dyn ToneSink> = if config.alert.audible {
        Arc::new(TerminalBell)
    } else {
        Arc::new(SilentTone)
    };

    let monitor = EnergyMonitor::new(&config, settings, tone_sink);
    let initial = monitor.snapshot();
    info!(
        power_on = initial.power_on,
        threshold_kw = initial.threshold_kw,
        "Energy monitor ready"
    );

    let mut handle = monitor.spawn();

    // Headless dashboard: live reading and the alert banner
    let mut events = handle.subscribe();
    let logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(MonitorEvent::Sample { kw, .. }) => info!("Live usage: {:.1} kW", kw),
                Ok(MonitorEvent::AlertRaised {
                    device, usage_kw, ..
                }) => warn!(
                    "High Energy Usage! {} is consuming {:.1} kW",
                    device, usage_kw
                ),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event logger lagged, skipped {} events", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // One tip and a weekly summary at startup
    let client = GeminiClient::new(&config.assistant)?;
    if !client.has_credential() {
        info!("No API key configured, insights disabled");
    }
    let fetcher = InsightFetcher::new(Arc::new(client), config.assistant.clone());
    let report = UsageReport::default();
    info!(
        total_kwh = report.weekly_total_kwh(),
        change_pct = report.change_vs_last_week,
        "Weekly usage"
    );

    match fetcher.quick_tip().await {
        Ok(Some(tip)) => info!("Tip: {}", tip),
        Ok(None) => {}
        Err(AssistantError::MissingCredential) => debug!("Skipping tip, no API key"),
        Err(e) => error!("Failed to fetch tip: {}", e),
    }

    shutdown_signal().await;

    handle.shutdown().await;
    drop(handle);
    if let Err(e) = logger.await {
        warn!("Event logger ended abnormally: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
