//! P2P merchant automation bot — entry point.
//!
//! Wires Store, ExchangeAdapter, and the per-merchant C6/C9 tick loops
//! together with the webhook and operator HTTP surfaces.

mod auth;
mod config;
mod error;
mod exchange;
mod middleware;
mod models;
mod operator;
mod orchestrator;
mod positioning;
mod store;
mod verify;
mod webhook;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use axum::{middleware as axum_mw, routing::get, routing::post, Router};
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::auth::{api as auth_api, auth_middleware, AuthState, JwtHandler};
use crate::config::AppConfig;
use crate::exchange::{ExchangeAdapter, ExchangeCredentials, HttpExchangeAdapter, MockExchangeAdapter};
use crate::operator::OperatorState;
use crate::orchestrator::OrderOrchestrator;
use crate::positioning::MultiAdManager;
use crate::store::Store;
use crate::verify::MatcherVerifier;
use crate::webhook::{DedupSet, WebhookState};

/// Exit codes: 0 normal, 1 config error, 2 DB connectivity, 3 exchange
/// unreachable on boot.
const EXIT_CONFIG_ERROR: u8 = 1;
const EXIT_DB_ERROR: u8 = 2;
const EXIT_EXCHANGE_UNREACHABLE: u8 = 3;

#[derive(Parser, Debug)]
#[command(name = "p2p-merchant-bot", about = "P2P merchant automation bot")]
struct Cli {
    /// Path to a .env-style file to load before reading the environment.
    #[arg(long, env = "BOT_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Overrides AppConfig's bind_addr port.
    #[arg(long, env = "PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "fatal startup error");
            ExitCode::from(err.downcast_ref::<StartupError>().map(|e| e.code()).unwrap_or(1))
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("exchange unreachable: {0}")]
    Exchange(String),
}

impl StartupError {
    fn code(&self) -> u8 {
        match self {
            StartupError::Config(_) => EXIT_CONFIG_ERROR,
            StartupError::Database(_) => EXIT_DB_ERROR,
            StartupError::Exchange(_) => EXIT_EXCHANGE_UNREACHABLE,
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    load_env(cli.config.as_deref());
    init_tracing();

    info!("🚀 p2p-merchant-bot starting");

    let mut config = AppConfig::from_env().map_err(|e| StartupError::Config(e.to_string()))?;
    if let Some(port) = cli.port {
        let host = config
            .bind_addr
            .rsplit_once(':')
            .map(|(h, _)| h.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.bind_addr = format!("{host}:{port}");
    }

    let store = Store::new(&config.db_path).map_err(|e| StartupError::Database(e.to_string()))?;
    info!(db_path = %config.db_path, "📦 store initialized");

    let exchange_mode = std::env::var("EXCHANGE_MODE").unwrap_or_else(|_| "http".to_string());
    let exchange: Arc<dyn ExchangeAdapter> = if exchange_mode.eq_ignore_ascii_case("mock") {
        warn!("⚠️ running with MockExchangeAdapter — no live venue calls will be made");
        Arc::new(MockExchangeAdapter::new())
    } else {
        Arc::new(HttpExchangeAdapter::new(
            config.exchange_base_url.clone(),
            config.exchange_timeout,
        ))
    };

    let merchants = store
        .list_active_merchants()
        .await
        .map_err(|e| StartupError::Database(e.to_string()))?;
    info!(count = merchants.len(), "👥 active merchants loaded");

    if exchange_mode.eq_ignore_ascii_case("http") {
        if let Some(m) = merchants.first() {
            let creds = creds_for(m);
            if let Err(err) = exchange.list_own_ads(&creds, crate::models::Side::Sell, "USDT", "MXN").await {
                return Err(StartupError::Exchange(err.to_string()).into());
            }
        }
    }

    for merchant in &merchants {
        let creds = creds_for(merchant);
        let manager = MultiAdManager::new(merchant.clone(), creds.clone(), store.clone(), exchange.clone(), &config);
        tokio::spawn(manager.run());

        let orchestrator = OrderOrchestrator::new(merchant.clone(), creds, store.clone(), exchange.clone(), &config);
        tokio::spawn(orchestrator.run());
    }
    info!("🔁 per-merchant positioning and orchestrator loops spawned");

    let dedup = DedupSet::new(config.dedup_ttl);
    let dedup_cleanup = dedup.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            ticker.tick().await;
            dedup_cleanup.cleanup();
        }
    });

    let jwt_handler = Arc::new(JwtHandler::new(config.jwt_secret.clone()));
    let config = Arc::new(config);
    let verifier = MatcherVerifier::new(store.clone(), config.payment_match_window);

    let auth_state = AuthState::new(store.clone(), jwt_handler.clone());
    let auth_router = Router::new()
        .route("/api/auth/login", post(auth_api::login))
        .with_state(auth_state);

    let rate_limiter = crate::middleware::RateLimitLayer::new(crate::middleware::RateLimitConfig::default());
    let rate_limiter_cleanup = rate_limiter.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            ticker.tick().await;
            rate_limiter_cleanup.cleanup();
        }
    });

    let webhook_router = webhook::router(WebhookState {
        store: store.clone(),
        config: config.clone(),
        dedup,
    })
    .route_layer(axum_mw::from_fn_with_state(
        rate_limiter,
        crate::middleware::rate_limit::rate_limit_middleware,
    ));

    let operator_router = operator::router(OperatorState {
        store: store.clone(),
        verifier,
    })
    .route_layer(axum_mw::from_fn_with_state(jwt_handler.clone(), auth_middleware));

    let public_router = Router::new().route("/health", get(health_check));

    let app = Router::new()
        .merge(public_router)
        .merge(auth_router)
        .merge(webhook_router)
        .merge(operator_router)
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(crate::middleware::logging::request_logging_simple));

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .map_err(|e| StartupError::Config(format!("invalid bind_addr: {e}")))?;
    let listener = TcpListener::bind(addr).await.map_err(|e| StartupError::Config(e.to_string()))?;
    info!(%addr, "🎯 HTTP server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

fn creds_for(merchant: &crate::models::Merchant) -> ExchangeCredentials {
    ExchangeCredentials {
        api_key: merchant.exchange_api_key.clone(),
        api_secret: merchant.exchange_api_secret.clone(),
        exchange_merchant_id: merchant.exchange_merchant_id.clone(),
    }
}

/// Waits for Ctrl+C or SIGTERM, then gives in-flight webhook handlers a
/// 5s drain window before axum stops accepting new connections.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("🛑 shutdown signal received, draining in-flight requests");
    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
}

async fn health_check() -> &'static str {
    "ok"
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "p2p_merchant_bot=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env(config_file: Option<&std::path::Path>) {
    if let Some(path) = config_file {
        let _ = dotenv::from_path(path);
    } else {
        let _ = dotenv::dotenv();
    }
}
