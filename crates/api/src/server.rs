use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use fleet_core::types::NodeRecord;
use fleet_registry::{config::Config, Ingestor, QueryEngine, RegistryError, Storage, Sweeper};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

/// Shared handler state: the ingestion and query front-ends over one registry.
#[derive(Debug, Clone)]
pub struct AppState {
    ingestor: Ingestor,
    query: QueryEngine,
}

impl AppState {
    /// Build state over `storage` with an OS-seeded random pick.
    pub fn new(storage: Storage) -> Self {
        Self {
            ingestor: Ingestor::new(storage.clone()),
            query: QueryEngine::new(storage),
        }
    }

    /// Build state over `storage` with an explicit random source.
    pub fn with_rng(storage: Storage, rng: StdRng) -> Self {
        Self {
            ingestor: Ingestor::new(storage.clone()),
            query: QueryEngine::with_rng(storage, rng),
        }
    }
}

/// Runtime configuration for the fleet API server.
#[derive(Debug, Clone)]
pub struct ApiRuntimeConfig {
    database_url: String,
    max_connections: u32,
    min_connections: u32,
    host: String,
    port: u16,
    freshness_window: Duration,
    sweep_interval: Duration,
    retention: Option<Duration>,
}

impl ApiRuntimeConfig {
    /// Build runtime configuration from a loaded registry config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            database_url: config.database.url.clone(),
            max_connections: config.database.max_connections,
            min_connections: config.database.min_connections,
            host: config.server.host.clone(),
            port: config.server.port,
            freshness_window: config.registry.freshness_window(),
            sweep_interval: config.registry.sweep_interval(),
            retention: config.registry.retention(),
        }
    }

    /// Build runtime configuration from defaults plus `DATABASE_URL` / `PORT`.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Config::default().apply_env_overrides()?;
        Ok(Self::from_config(&config))
    }

    /// Build test configuration on an ephemeral port with default liveness settings.
    pub fn for_test(database_url: impl Into<String>) -> Self {
        let mut config = Self::from_config(&Config::default());
        config.database_url = database_url.into();
        config.host = "127.0.0.1".to_string();
        config.port = 0;
        config
    }
}

async fn open_storage(config: &ApiRuntimeConfig) -> anyhow::Result<Storage> {
    let storage = Storage::new(
        &config.database_url,
        Some(config.max_connections),
        Some(config.min_connections),
    )
    .await?
    .with_freshness_window(config.freshness_window);
    storage.run_migrations().await?;
    Ok(storage)
}

/// Build the API router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/heartbeat", post(post_heartbeat))
        .route("/api/nodes", get(get_nodes))
        .route("/api/nodes/country", get(get_nodes_by_country))
        .route("/api/nodes/random", get(get_random_node))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Build an in-process API router from explicit runtime config.
///
/// The sweeper is not started; queries stay correct without it.
pub async fn build_app(config: &ApiRuntimeConfig) -> anyhow::Result<Router> {
    let storage = open_storage(config).await?;
    Ok(router(AppState::new(storage)))
}

/// Run the API server and staleness sweeper until a shutdown signal arrives.
pub async fn run_with_config(config: ApiRuntimeConfig) -> anyhow::Result<()> {
    let storage = open_storage(&config).await?;

    let sweeper = Sweeper::new(storage.clone(), config.sweep_interval)
        .with_retention(config.retention)
        .spawn();

    let app = router(AppState::new(storage.clone()));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Fleet registry API listening on {}", listener.local_addr()?);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error");

    if let Err(e) = sweeper.shutdown().await {
        warn!("{:#}", e);
    }
    storage.close().await;
    info!("Fleet registry API shutdown complete");

    served
}

/// Run the API server using environment-driven configuration.
pub async fn run_from_env() -> anyhow::Result<()> {
    run_with_config(ApiRuntimeConfig::from_env()?).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {}", err);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

const ERROR_CODE_INVALID_REQUEST: &str = "invalid_request";
const ERROR_CODE_NOT_FOUND: &str = "not_found";
const ERROR_CODE_INTERNAL_ERROR: &str = "internal_error";

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorInfo,
}

#[derive(Serialize)]
struct ErrorInfo {
    code: &'static str,
    message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: ErrorInfo {
                code,
                message: message.into(),
            },
        }),
    )
}

fn bad_request(msg: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, ERROR_CODE_INVALID_REQUEST, msg)
}

fn not_found(msg: impl Into<String>) -> ApiError {
    api_error(StatusCode::NOT_FOUND, ERROR_CODE_NOT_FOUND, msg)
}

fn internal_error<E: std::fmt::Display>(err: E) -> ApiError {
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        ERROR_CODE_INTERNAL_ERROR,
        format!("Internal error: {}", err),
    )
}

/// Map a registry error onto a response. Store failures are logged with `operation`.
fn registry_error(operation: &str, err: RegistryError) -> ApiError {
    match err {
        RegistryError::NotFound => not_found(err.to_string()),
        err if err.is_client_error() => bad_request(err.to_string()),
        err => {
            error!("{} failed: {:#}", operation, err);
            internal_error(err)
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn post_heartbeat(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    state
        .ingestor
        .ingest_json(&body)
        .await
        .map_err(|e| registry_error("Heartbeat ingest", e))?;

    Ok("ok")
}

#[derive(Serialize)]
struct NodesResponse {
    nodes: Vec<NodeRecord>,
    count: usize,
}

async fn get_nodes(State(state): State<AppState>) -> Result<Json<NodesResponse>, ApiError> {
    let nodes = state
        .query
        .get_all()
        .await
        .map_err(|e| registry_error("List nodes", e))?;

    Ok(Json(NodesResponse {
        count: nodes.len(),
        nodes,
    }))
}

#[derive(Debug, Deserialize)]
struct CountryQuery {
    country: Option<String>,
}

#[derive(Serialize)]
struct CountryNodesResponse {
    nodes: Vec<NodeRecord>,
    country: String,
    count: usize,
}

async fn get_nodes_by_country(
    State(state): State<AppState>,
    Query(params): Query<CountryQuery>,
) -> Result<Json<CountryNodesResponse>, ApiError> {
    let country = params.country.unwrap_or_default();

    let nodes = state
        .query
        .get_by_country(&country)
        .await
        .map_err(|e| registry_error("List nodes by country", e))?;

    Ok(Json(CountryNodesResponse {
        count: nodes.len(),
        nodes,
        country,
    }))
}

async fn get_random_node(State(state): State<AppState>) -> Result<Json<NodeRecord>, ApiError> {
    let node = state
        .query
        .get_random()
        .await
        .map_err(|e| registry_error("Random node", e))?;

    Ok(Json(node))
}
