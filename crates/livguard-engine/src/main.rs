//! livguard ops server.
//!
//! Loads `LIVGUARD_CONFIG` (default `livguard.yaml`) and serves the health,
//! metrics and policy administration endpoints. Module execution belongs to
//! the embedding host; this binary admits nothing.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing_subscriber::{fmt, EnvFilter};

use livguard_core::error::{LivGuardError, Result};
use livguard_core::request::ModuleBundle;
use livguard_engine::sandbox::{ExecutionLimits, ModuleInstance, ModuleRuntime};
use livguard_engine::{config, router, Engine};

const CONFIG_ENV: &str = "LIVGUARD_CONFIG";
const DEFAULT_CONFIG: &str = "livguard.yaml";

struct HostlessRuntime;

#[async_trait]
impl ModuleRuntime for HostlessRuntime {
    async fn instantiate(
        &self,
        module: &ModuleBundle,
        _limits: &ExecutionLimits,
    ) -> Result<Box<dyn ModuleInstance>> {
        Err(LivGuardError::Internal(format!(
            "no module runtime attached (module {})",
            module.descriptor.name
        )))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let cfg = config::load_from_file(&path)?;
    let listen: SocketAddr = cfg
        .ops
        .listen
        .parse()
        .map_err(|_| LivGuardError::BadRequest("ops.listen must be a valid SocketAddr".into()))?;

    let engine = Engine::new(cfg, Arc::new(HostlessRuntime))?;
    let app = router::build_router(engine.clone());

    tracing::info!(%listen, config = %path, "livguard starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| LivGuardError::Internal(format!("bind {listen}: {e}")))?;

    let drain = engine.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "signal handler failed");
            }
            tracing::info!("shutdown requested, draining");
            drain.shutdown("system").await;
        })
        .await
        .map_err(|e| LivGuardError::Internal(format!("server failed: {e}")))?;

    tracing::info!("livguard stopped");
    Ok(())
}
