use anyhow::Result;
use console::style;
use std::path::Path;

use crate::core::config::ServerConfig;
use crate::core::store::BuildDatabase;
use crate::core::terminal::{self, print_info, print_success};
use crate::platform::{NativePlatform, Platform};

/// Non-interactive first-run setup: data directory, database schema and
/// artifact directory.
pub async fn run_install(config_path: Option<&Path>) -> Result<()> {
    terminal::print_banner();
    println!(
        "  {}\n",
        style("Setting up the build server data directory...").bold()
    );

    let config = ServerConfig::load(config_path).await?;

    let data_dir = NativePlatform::data_dir();
    tokio::fs::create_dir_all(&data_dir).await?;
    NativePlatform::restrict_dir_permissions(&data_dir);

    let database_path = config.database_path();
    BuildDatabase::open(&database_path).await?;
    print_info(&format!("Database: {}", database_path.display()));

    let artifact_dir = config.artifact_dir();
    tokio::fs::create_dir_all(&artifact_dir).await?;
    print_info(&format!("Artifacts: {}", artifact_dir.display()));

    if !config.qmk.base_dir.exists() {
        terminal::print_warn(&format!(
            "{} does not exist yet; check out one QMK firmware tree per version there.",
            config.qmk.base_dir.display()
        ));
    }

    print_success("Installation complete!");
    println!(
        "\n  Run {} to start accepting build requests.\n",
        style("qmk-build-server serve").cyan().bold()
    );
    Ok(())
}
