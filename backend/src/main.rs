use backend::config::AppConfig;
use backend::service::build_service;
use scheduler::CompletionWatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    common::logger::init_logger("backend", is_production);

    tracing::info!("starting charging station backend");

    let cfg = AppConfig::from_env();
    let (scheduler, _store) = build_service(&cfg).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let watcher = CompletionWatcher::new(scheduler.clone(), cfg.watcher_poll_interval);
    let mut watcher_handle = tokio::spawn(async move { watcher.run(shutdown_rx).await });

    tracing::info!("backend started; waiting for shutdown signal");
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("shutdown signal received");
        }
        result = &mut watcher_handle => {
            match result {
                Ok(Ok(())) => tracing::warn!("completion watcher exited unexpectedly"),
                Ok(Err(err)) => {
                    tracing::error!(error = %err, "completion watcher failed");
                    return Err(err);
                }
                Err(join_err) => return Err(join_err.into()),
            }
        }
    }

    let _ = shutdown_tx.send(true);
    if !watcher_handle.is_finished() {
        let _ = watcher_handle.await;
    }
    Ok(())
}
