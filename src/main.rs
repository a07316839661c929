use anyhow::Result;
use std::path::PathBuf;
use tablescribe::app::App;
use tablescribe::config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "tablescribe.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tablescribe=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!("{}", tablescribe::version_string());

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = Config::load_or_default(&config_path)?.with_env_overrides();

    let app = App::new(config)?;
    let _packets = app.start()?;
    info!("listening for audio, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;

    let snapshot = app.stop().await?;
    info!(
        packets = snapshot.packets_received,
        segments = snapshot.segments_dispatched,
        dropped = snapshot.batches_dropped,
        failed = snapshot.recognitions_failed,
        "session complete"
    );
    Ok(())
}
