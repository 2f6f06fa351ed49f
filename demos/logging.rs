//! Tracing setup shared by the demo binaries

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install a global fmt subscriber at the level named by `CONVERGE_LOG_LEVEL`
pub fn init() -> anyhow::Result<()> {
    let level = match std::env::var("CONVERGE_LOG_LEVEL")
        .unwrap_or_default()
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
}
