//! HTTP server bootstrap.
//!
//! This module wires together:
//! - configuration
//! - database connection pool
//! - core services (returns engine, admin queries, points ledger)
//! - the Axum router

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::auth::{
    ApiKeyRecord, ApiKeyValidator, AuthMiddlewareState, Authenticator, Role,
};
use crate::domain::{RefundPolicy, UserId};
use crate::engine::{AdminQueries, ReturnsEngine};
use crate::infra::{
    ConflictRetry, PgOrderService, PgPointsLedger, PgReturnsStore, PgWalletService,
};
use crate::notify::{LoggingSink, QueuedDispatcher};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Server listen address.
    pub listen_addr: SocketAddr,
    /// Maximum database connections.
    pub max_connections: u32,
    /// Refund policy knobs.
    pub policy: RefundPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/keymarket_returns".to_string());

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address: {e}"))?;

        let max_connections: u32 = std::env::var("MAX_DB_CONNECTIONS")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(10);

        let mut policy = RefundPolicy::default();
        if let Some(ppp) = std::env::var("PESOS_PER_POINT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            policy.pesos_per_point = ppp;
        }
        if let Some(days) = std::env::var("RETURN_WINDOW_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            policy.return_window_days = days;
        }

        Ok(Self {
            database_url,
            listen_addr,
            max_connections,
            policy,
        })
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReturnsEngine>,
    pub admin: Arc<AdminQueries>,
    pub retry: ConflictRetry,
    /// Present in database-backed deployments; used by the readiness probe.
    pub pool: Option<PgPool>,
}

/// Start the HTTP server.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting keymarket-returns v{}", env!("CARGO_PKG_VERSION"));

    let auth_state = auth_state_from_env()?;

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Max connections: {}", config.max_connections);
    info!(
        "  Refund policy: {} pesos/point, {}-day window",
        config.policy.pesos_per_point, config.policy.return_window_days
    );

    info!("Connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    info!("Connected to PostgreSQL");

    let migrate_on_startup = std::env::var("DB_MIGRATE_ON_STARTUP")
        .ok()
        .map(|v| {
            !matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "off"
            )
        })
        .unwrap_or(true);
    if migrate_on_startup {
        info!("Running database migrations...");
        crate::migrations::run_postgres(&pool).await?;
        info!("Database migrations applied");
    } else {
        info!("DB migrations skipped (DB_MIGRATE_ON_STARTUP=0)");
    }

    let store = Arc::new(PgReturnsStore::new(pool.clone()));
    let ledger = Arc::new(PgPointsLedger::new(pool.clone()));
    let orders = Arc::new(PgOrderService::new(pool.clone()));
    let wallet = Arc::new(PgWalletService::new(pool.clone()));
    let dispatcher = QueuedDispatcher::spawn(Arc::new(LoggingSink));

    let engine = Arc::new(ReturnsEngine::new(
        store.clone(),
        ledger,
        orders,
        wallet,
        dispatcher,
        config.policy,
    ));
    let admin = Arc::new(AdminQueries::new(store));

    let state = AppState {
        engine,
        admin,
        retry: ConflictRetry::default(),
        pool: Some(pool),
    };

    let app = build_router(auth_state)?.with_state(state);

    info!("Starting HTTP server on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    info!("keymarket-returns is ready to accept connections");
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}

/// Seed the API key registry from the environment.
///
/// `BOOTSTRAP_OPERATOR_API_KEY` registers an operator key (optionally with
/// `BOOTSTRAP_OPERATOR_USER_ID`); `BOOTSTRAP_USER_API_KEY` plus
/// `BOOTSTRAP_USER_ID` register a customer key for local development. At
/// least one key must be configured.
fn auth_state_from_env() -> anyhow::Result<AuthMiddlewareState> {
    let validator = ApiKeyValidator::new();
    let mut any_key = false;

    if let Ok(key) = std::env::var("BOOTSTRAP_OPERATOR_API_KEY") {
        let user_id = std::env::var("BOOTSTRAP_OPERATOR_USER_ID")
            .ok()
            .and_then(|v| v.parse::<Uuid>().ok())
            .unwrap_or(Uuid::nil());
        validator.register_key(ApiKeyRecord {
            key_hash: ApiKeyValidator::hash_key(&key),
            user_id: UserId::from_uuid(user_id),
            role: Role::Operator,
            active: true,
        });
        any_key = true;
        info!("Bootstrap operator API key is configured");
    }

    if let (Ok(key), Ok(user_id)) = (
        std::env::var("BOOTSTRAP_USER_API_KEY"),
        std::env::var("BOOTSTRAP_USER_ID"),
    ) {
        let user_id: Uuid = user_id
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid BOOTSTRAP_USER_ID: {e}"))?;
        validator.register_key(ApiKeyRecord {
            key_hash: ApiKeyValidator::hash_key(&key),
            user_id: UserId::from_uuid(user_id),
            role: Role::User,
            active: true,
        });
        any_key = true;
        info!("Bootstrap user API key is configured");
    }

    if !any_key {
        anyhow::bail!(
            "no API keys configured; set BOOTSTRAP_OPERATOR_API_KEY (and optionally BOOTSTRAP_USER_API_KEY + BOOTSTRAP_USER_ID)"
        );
    }

    Ok(AuthMiddlewareState {
        authenticator: Arc::new(Authenticator::new(validator)),
    })
}

/// Assemble the full router: authenticated `/api` surface plus unauthenticated
/// health probes.
pub fn build_router(auth_state: AuthMiddlewareState) -> anyhow::Result<Router<AppState>> {
    let api = crate::api::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        crate::auth::auth_middleware,
    ));

    let mut router = Router::new()
        .nest("/api", api)
        .route("/health", get(crate::api::handlers::health::health_check))
        .route("/ready", get(crate::api::handlers::health::readiness_check))
        .layer(TraceLayer::new_for_http());

    if let Some(cors_layer) = cors_layer_from_env()? {
        router = router.layer(cors_layer);
    }

    Ok(router)
}

fn cors_layer_from_env() -> anyhow::Result<Option<CorsLayer>> {
    let origins = match std::env::var("CORS_ALLOW_ORIGINS") {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };

    let origins = origins.trim();
    if origins.is_empty() {
        return Ok(None);
    }

    let allow_origin = if origins == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("Invalid CORS origin {s:?}: {e}"))
            })
            .collect::<anyhow::Result<_>>()?;
        AllowOrigin::list(origins)
    };

    Ok(Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
            ]),
    ))
}
