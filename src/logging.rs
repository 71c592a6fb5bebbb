use anyhow::Result;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Installs the global subscriber. Fails if one is already set.
pub fn init(level: Level) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
