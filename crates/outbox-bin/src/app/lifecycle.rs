//! Delivery commands: a single flush, or the long-running dispatcher.

use super::state::OutboxApp;
use outbox_config_and_utils::{Config, Paths};
use submission_outbox::NetworkMonitor;
use tracing::{info, warn};

/// Send everything currently eligible, then exit.
pub async fn flush(config: &Config, paths: &Paths) -> Result<(), Box<dyn std::error::Error>> {
    let app = OutboxApp::build(config, paths)?;

    if !app.network.probe_once().await {
        println!("Collection service is unreachable; nothing sent");
        return Ok(());
    }

    let mut attempted = 0;
    loop {
        let n = app.dispatcher.run_cycle().await;
        if n == 0 {
            break;
        }
        attempted += n;
    }

    let stats = app.outbox.stats();
    println!(
        "Attempted {attempted}: {} pending, {} succeeded, {} failed",
        stats.pending, stats.succeeded, stats.failed
    );
    Ok(())
}

/// Run the dispatcher until Ctrl-C.
pub async fn run(config: Config, paths: Paths) -> Result<(), Box<dyn std::error::Error>> {
    let app = OutboxApp::build(&config, &paths)?;

    info!(
        pid = std::process::id(),
        base_dir = %paths.base_dir().display(),
        "Starting field outbox"
    );

    match app.outbox.purge_terminal(config.retention()) {
        Ok(0) => {}
        Ok(removed) => info!(removed, "Purged settled submissions past retention"),
        Err(e) => warn!(error = %e, "Failed to purge settled submissions"),
    }

    let _stats_subscription = app.outbox.subscribe(|stats| {
        info!(
            pending = stats.pending,
            uploading = stats.uploading,
            succeeded = stats.succeeded,
            failed = stats.failed,
            degraded = stats.degraded,
            "Queue stats"
        );
    });

    app.network.probe_once().await;
    let prober = app.network.spawn();
    let dispatcher = app.dispatcher.start()?;

    info!(
        online = app.network.is_online(),
        queued = app.outbox.stats().total_queued(),
        "Dispatcher running"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, waiting for in-flight submissions");

    prober.abort();
    dispatcher.shutdown().await;

    let stats = app.outbox.stats();
    info!(
        pending = stats.pending,
        failed = stats.failed,
        "Field outbox stopped"
    );
    Ok(())
}
