//! Serve command - launches the Parley server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;

use parley_config::{
    BackingStoreKind, Consistency, OnStoreError, ParleyConfig, SessionBackend,
};
use parley_ratelimit::{RateLimitPolicy, RateLimiter, StoreFailurePolicy};
use parley_server::{
    AppState, JwtVerifier, Server, ServerConfig, StaticUserDirectory, User,
};
use parley_session::{
    BackendKind, ReadConsistency, SessionService, SessionStoreConfig, open_session_store,
};
use parley_store::{MemoryStore, RedisStore, SharedClock, SharedStore, SystemClock};

use super::Context;

/// Arguments for the serve command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Backing store URL (overrides config)
    #[arg(long, env = "PARLEY_STORE_URL")]
    pub store_url: Option<String>,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let mut config = ctx.loaded.config.clone();
    apply_args(&mut config, &args);
    config.validate().context("invalid configuration")?;

    for path in ctx.loaded.loaded_from() {
        tracing::info!(path = %path.display(), "Loaded config");
    }

    let clock = SystemClock::shared();
    let kv = connect_backing_store(&config, clock.clone()).await?;

    let sessions = open_session_store(&session_store_config(&config), kv.clone(), clock.clone())
        .context("failed to open session store")?;
    let sessions = SessionService::new(sessions, clock.clone(), config.session.ttl());

    let limiter = RateLimiter::new(kv, clock, rate_limit_policy(&config));

    let secret = config
        .auth
        .jwt_secret
        .as_deref()
        .context("jwt_secret missing after validation")?;
    let users = StaticUserDirectory::new(config.users.iter().map(|u| User {
        id: u.id.clone(),
        name: u.name.clone(),
    }));
    if users.is_empty() {
        tracing::warn!("No [[users]] configured; every session issuance will be rejected");
    }

    let state = AppState::new(
        server_config(&config)?,
        sessions,
        limiter,
        Arc::new(JwtVerifier::new(secret)),
        Arc::new(users),
    );

    Server::from_state(state)
        .run_with_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn apply_args(config: &mut ParleyConfig, args: &ServeArgs) {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(url) = &args.store_url {
        config.backing_store.url = url.clone();
    }
}

async fn connect_backing_store(config: &ParleyConfig, clock: SharedClock) -> Result<SharedStore> {
    match config.backing_store.kind {
        BackingStoreKind::Redis => {
            let store =
                RedisStore::connect(&config.backing_store.url, config.backing_store.command_timeout())
                    .await
                    .context("failed to connect to backing store")?;
            Ok(Arc::new(store))
        }
        BackingStoreKind::Memory => {
            tracing::warn!("Using in-process backing store; state is lost on restart and not shared");
            Ok(Arc::new(MemoryStore::with_clock(clock)))
        }
    }
}

fn session_store_config(config: &ParleyConfig) -> SessionStoreConfig {
    let backend = match config.session.backend {
        SessionBackend::Distributed => BackendKind::Distributed,
        SessionBackend::Document => BackendKind::Document,
    };
    let consistency = match config.session.consistency {
        Consistency::Eventual => ReadConsistency::Eventual {
            retry_delay: config.session.verify_retry_delay(),
        },
        Consistency::Linearizable => ReadConsistency::Linearizable,
    };

    let mut store_config = SessionStoreConfig::new()
        .with_backend(backend)
        .with_consistency(consistency);
    if let Some(path) = &config.session.document_path {
        store_config = store_config.with_document_path(path);
    }
    store_config
}

fn rate_limit_policy(config: &ParleyConfig) -> RateLimitPolicy {
    let on_store_error = match config.rate_limit.on_store_error {
        OnStoreError::Allow => StoreFailurePolicy::Allow,
        OnStoreError::Deny => StoreFailurePolicy::Deny,
    };
    RateLimitPolicy::default()
        .with_requests_per_second(config.rate_limit.requests_per_second)
        .with_on_store_error(on_store_error)
}

fn server_config(config: &ParleyConfig) -> Result<ServerConfig> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid bind address {}:{}",
                config.server.bind, config.server.port
            )
        })?;

    let purge_interval = match config.session.backend {
        SessionBackend::Document => config.session.purge_interval(),
        SessionBackend::Distributed => None,
    };

    Ok(ServerConfig::new()
        .with_bind_address(addr)
        .with_rate_limiting(config.rate_limit.enabled)
        .with_request_logging(config.server.request_logging)
        .with_purge_interval(purge_interval))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
