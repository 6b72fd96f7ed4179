use crate::aggregate::{aggregate, Filters};
use crate::config::Settings;
use crate::error::CatalogError;
use crate::loader::{Catalog, LoadCache};
use crate::models::ContentType;
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024;
const DEFAULT_PAGE_SIZE: usize = 100;
const MAX_PAGE_SIZE: usize = 1000;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub cache: Arc<Mutex<LoadCache>>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            cache: Arc::new(Mutex::new(LoadCache::new())),
        }
    }

    async fn catalog(&self) -> Result<Arc<Catalog>, CatalogError> {
        self.with_cache(|cache, path| cache.get_or_load(path)).await
    }

    async fn reload(&self) -> Result<Arc<Catalog>, CatalogError> {
        self.with_cache(|cache, path| {
            cache.invalidate();
            cache.get_or_load(path)
        })
        .await
    }

    /// Runs `f` against the locked cache on the blocking pool; stat and parse are synchronous.
    async fn with_cache<F>(&self, f: F) -> Result<Arc<Catalog>, CatalogError>
    where
        F: FnOnce(&mut LoadCache, &Path) -> Result<Arc<Catalog>, CatalogError> + Send + 'static,
    {
        let mut cache = self.cache.clone().lock_owned().await;
        let path = self.settings.catalog_path.clone();
        tokio::task::spawn_blocking(move || f(&mut cache, &path))
            .await
            .map_err(|e| CatalogError::unavailable(&self.settings.catalog_path, e))?
    }
}

pub async fn run_server(settings: Settings) -> Result<()> {
    let addr = settings.addr;
    let state = AppState::new(settings);

    let catalog = state
        .catalog()
        .await
        .with_context(|| format!("Failed to load {}", state.settings.catalog_path.display()))?;
    info!(
        "Serving {} entries from {}",
        catalog.entries.len(),
        catalog.source.display()
    );

    let app = build_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/options", get(options))
        .route("/api/tables", get(tables))
        .route("/api/entries", get(entries))
        .route("/api/refresh", post(refresh))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    Catalog(CatalogError),
    BadRequest(String),
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        ApiError::Catalog(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Catalog(err) => {
                error!("Catalog load failed: {}", err);
                let status = match err {
                    CatalogError::DataUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    CatalogError::SchemaMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                };
                (status, err.to_string())
            }
            ApiError::BadRequest(message) => {
                warn!("Rejecting request: {}", message);
                (StatusCode::BAD_REQUEST, message)
            }
        };
        (status, Json(json!({"status": "error", "message": message}))).into_response()
    }
}

/// Filter controls as query parameters; list values are comma-separated.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub types: Option<String>,
    pub ratings: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl CatalogQuery {
    pub fn to_filters(&self, catalog: &Catalog) -> Result<Filters, ApiError> {
        let bounds = catalog.year_bounds();
        let year_range = match (self.year_min, self.year_max, bounds) {
            (None, None, bounds) => bounds,
            (min, max, bounds) => {
                let min = min.or(bounds.map(|b| b.0)).unwrap_or(i32::MIN);
                let max = max.or(bounds.map(|b| b.1)).unwrap_or(i32::MAX);
                if min > max {
                    return Err(ApiError::BadRequest(format!(
                        "year_min {} is greater than year_max {}",
                        min, max
                    )));
                }
                Some((min, max))
            }
        };

        let mut content_types = BTreeSet::new();
        for name in split_param(self.types.as_deref()) {
            let ct = ContentType::parse(name)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown content type '{}'", name)))?;
            content_types.insert(ct);
        }

        let ratings = split_param(self.ratings.as_deref())
            .map(str::to_string)
            .collect();

        Ok(Filters {
            year_range,
            content_types,
            ratings,
        })
    }
}

fn split_param(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

async fn health() -> &'static str {
    "OK"
}

async fn options(State(state): State<AppState>) -> Result<Response, ApiError> {
    let catalog = state.catalog().await?;
    let bounds = catalog.year_bounds();
    Ok(Json(json!({
        "source": catalog.source.display().to_string(),
        "year_min": bounds.map(|b| b.0),
        "year_max": bounds.map(|b| b.1),
        "content_types": catalog.content_types(),
        "ratings": catalog.observed_ratings(),
        "report": catalog.report,
    }))
    .into_response())
}

async fn tables(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<Response, ApiError> {
    let catalog = state.catalog().await?;
    let filters = query.to_filters(&catalog)?;
    let tables = aggregate(&catalog, &filters, &state.settings.trend);
    if tables.is_empty() {
        info!("Filters {:?} matched no entries", filters);
    }
    Ok(Json(tables).into_response())
}

async fn entries(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<Response, ApiError> {
    let catalog = state.catalog().await?;
    let filters = query.to_filters(&catalog)?;
    let rows = filters.apply(&catalog);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .min(MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);
    let page: Vec<_> = rows.iter().skip(offset).take(limit).collect();
    Ok(Json(json!({
        "total": rows.len(),
        "offset": offset,
        "limit": limit,
        "entries": page,
    }))
    .into_response())
}

async fn refresh(State(state): State<AppState>) -> Result<Response, ApiError> {
    let catalog = state.reload().await?;
    info!("Refreshed catalog: {} entries", catalog.entries.len());
    Ok(Json(json!({"status": "success", "report": catalog.report})).into_response())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
