//! Serve command - run the session demo server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;
use sweb_config::{ProviderKind, SessionSection};
use sweb_session::{MemoryProvider, ProviderRegistry, Session, SessionManager};
use tokio::net::TcpListener;
use tracing::info;

use super::Context;
use crate::server::{self, AppState};

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind to (overrides `[server] bind`)
    #[arg(short, long)]
    pub bind: Option<String>,
}

/// Build the provider registry from the `[session]` section.
///
/// Only the selected provider is constructed, so `save_path` is left alone
/// unless `provider = "file"`.
fn build_registry(config: &SessionSection) -> Result<ProviderRegistry> {
    let provider_config = match config.provider {
        ProviderKind::Memory => config.memory_provider_config(),
        ProviderKind::File => config
            .file_provider_config()
            .context("session.save_path is required by the file provider")?,
    };

    let mut registry = ProviderRegistry::new();
    registry.register(
        config.provider.as_str(),
        Arc::new(MemoryProvider::new(provider_config)?),
    )?;
    Ok(registry)
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let session_config = ctx.config.session();
    let registry = build_registry(&session_config)?;

    let manager = SessionManager::from_registry(
        &registry,
        session_config.provider.as_str(),
        ctx.config.cookie().cookie_config(session_config.timeout()),
    )?;
    let manager = Arc::new(manager);

    let restored = manager.provider().load_sessions(Session::new).await?;
    let gc = manager.spawn_gc(session_config.gc_config());

    let bind = args.bind.unwrap_or_else(|| ctx.config.server().bind);
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;

    info!(
        addr = %bind,
        provider = session_config.provider.as_str(),
        restored,
        "Starting server"
    );

    let app = server::router(AppState::new(Arc::clone(&manager)));
    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    let saved = manager.provider().persist_all().await;
    gc.shutdown().await;
    info!(saved, "Server stopped");

    served.context("Server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_registry_memory_only() {
        let registry = build_registry(&SessionSection::default()).unwrap();
        assert_eq!(registry.names(), vec!["memory"]);
    }

    #[test]
    fn test_memory_provider_ignores_save_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let save_path = dir.path().join("sessions");
        let config = SessionSection {
            save_path: Some(save_path.clone()),
            ..SessionSection::default()
        };
        let registry = build_registry(&config).unwrap();
        assert_eq!(registry.names(), vec!["memory"]);
        assert!(!registry.lookup("memory").unwrap().is_persistent());
        assert!(!save_path.exists());
    }

    #[test]
    fn test_registry_with_file_provider() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = SessionSection {
            provider: ProviderKind::File,
            save_path: Some(PathBuf::from(dir.path())),
            ..SessionSection::default()
        };
        let registry = build_registry(&config).unwrap();
        assert_eq!(registry.names(), vec!["file"]);
        assert!(registry.lookup("file").unwrap().is_persistent());
    }
}
