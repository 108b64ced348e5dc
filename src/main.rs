use anyhow::{Context, anyhow};
use spl::{
    cli::config_path_from_args, config::Config, logging::init_tracing,
    observability::metrics::start_prometheus_exporter, server,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = config_path_from_args()?;
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let logging_guard = init_tracing(&config.logging)?;
    if config.metrics.enabled {
        let runtime = start_prometheus_exporter(config.metrics.listen_addr)
            .map_err(|err| anyhow!("failed to start prometheus exporter: {err}"))?;
        tracing::info!(
            target: "observability",
            listen_addr = %runtime.listen_addr,
            "metrics_exporter_started"
        );
    }
    tracing::info!(
        target: "server",
        run_id = %logging_guard.run_id(),
        config = %config_path.display(),
        "spl_starting"
    );

    server::run(config).await
}
