mod cli;
mod demo;

use castscreen_config::CastScreenConfig;
use tracing_subscriber::EnvFilter;

fn load_config(args: &cli::Args) -> (CastScreenConfig, Option<String>) {
    let loaded = match &args.config {
        Some(path) => castscreen_config::toml_loader::load_from_path(path),
        None => castscreen_config::load_config(),
    };
    match loaded {
        Ok(config) => (config, None),
        Err(e) => (CastScreenConfig::default(), Some(e.to_string())),
    }
}

#[tokio::main]
async fn main() {
    let args = cli::parse();

    // Config first: it supplies the default log level.
    let (config, config_error) = load_config(&args);

    let log_directive = args
        .log_level
        .clone()
        .unwrap_or_else(|| format!("castscreen={}", config.logging.level.as_directive()));
    let directive = log_directive
        .parse()
        .or_else(|_| "castscreen=info".parse());
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = directive {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("castscreen v{} starting...", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        tracing::info!("Using config override: {}", path.display());
    }
    if let Some(e) = config_error {
        tracing::warn!("Config load failed, using defaults: {e}");
    }
    tracing::info!(
        app_id = %config.cast.app_id,
        preset = ?config.remote.preset,
        "Config loaded"
    );

    if let Some(path) = &args.write_config {
        if let Err(e) = castscreen_config::export_config(&config, path) {
            tracing::error!("Config export failed: {e}");
            std::process::exit(1);
        }
        return;
    }

    if let Err(e) = demo::run(&args, &config).await {
        tracing::error!("Loopback session failed: {e}");
        std::process::exit(1);
    }
    tracing::info!("Shutdown complete");
}
