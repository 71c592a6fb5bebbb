use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::auth::{ClaimPolicy, OidcTokenVerifier};
use crate::core::build::QmkCompiler;
use crate::core::config::ServerConfig;
use crate::core::lifecycle::LifecycleManager;
use crate::core::orchestrator::{BuildOrchestrator, BuildServices};
use crate::core::store::{BuildDatabase, LocalArtifactStore};
use crate::core::terminal::{self, print_info, print_link, print_status};
use crate::core::workspace::WorkspaceManager;
use crate::interfaces::web::{ApiServer, ApiServerConfig};

pub async fn run_serve(config_path: Option<&Path>) -> Result<()> {
    let config = ServerConfig::load(config_path).await?;
    crate::logging::init(config.level()?)?;
    terminal::print_banner();

    let db = BuildDatabase::open(config.database_path()).await?;
    let artifact_dir = config.artifact_dir();
    tokio::fs::create_dir_all(&artifact_dir).await?;

    let verifier = OidcTokenVerifier::new(
        config.auth.openid_configuration_url.clone(),
        ClaimPolicy {
            issuer: config.auth.issuer.clone(),
            email: config.auth.email.clone(),
            audience_prefix: config.auth.audience_prefix.clone(),
        },
    );
    let compiler = QmkCompiler::new(
        config.qmk.binary.clone(),
        config.qmk.keymap_name.clone(),
        config.build_timeout(),
    );

    let services = BuildServices {
        tasks: Arc::new(db.clone()),
        records: Arc::new(db.clone()),
        quotas: Arc::new(db),
        artifacts: Arc::new(LocalArtifactStore::new(&artifact_dir)),
        verifier: Arc::new(verifier),
        compiler: Arc::new(compiler),
        workspaces: WorkspaceManager::new(config.qmk.base_dir.clone(), config.qmk.keymap_name.clone()),
    };
    let orchestrator = Arc::new(BuildOrchestrator::new(services));

    let bind_address = config.bind_address();
    let server = ApiServer::new(ApiServerConfig {
        orchestrator,
        bind_address: bind_address.clone(),
        max_concurrent_requests: config.max_concurrent_requests,
    });

    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(Arc::new(Mutex::new(server)));
    lifecycle.start().await?;

    print_link("Build endpoint", &format!("http://{}/build", bind_address));
    print_status("QMK firmware", &config.qmk.base_dir.display().to_string());
    print_status("Artifacts", &artifact_dir.display().to_string());
    print_info("Press Ctrl+C to stop.");
    info!("Serving build requests on {}", bind_address);

    tokio::signal::ctrl_c().await?;
    lifecycle.shutdown().await?;
    terminal::print_goodbye();
    Ok(())
}
