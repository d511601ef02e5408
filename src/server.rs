// REST API - axum router over the store
//
// Every response uses the `ApiResponse` envelope. Handlers that touch the
// store run on the blocking pool since SQLite calls are synchronous.

use crate::analytics::AnalyticsAggregator;
use crate::catalog::{Catalog, NewCategory, NewProduct, ProductUpdate};
use crate::config::{AppConfig, DeletePolicy};
use crate::db::{self, Store};
use crate::entities::EntityType;
use crate::error::{CatalogError, ImportError, ParseError, StoreError};
use crate::importer::{self, ImportSummary};
use crate::query::ProductFilter;
use axum::{
    body::{to_bytes, Bytes},
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Query, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

/// Room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;
const DEFAULT_IMPORT_LIMIT: usize = 50;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(store: Store, config: AppConfig) -> Self {
        AppState {
            store: Arc::new(store),
            config: Arc::new(config),
        }
    }

    fn catalog(&self) -> Catalog<'_> {
        Catalog::new(&self.store, self.config.product_delete_policy)
    }

    fn analytics(&self) -> AnalyticsAggregator<'_> {
        AnalyticsAggregator::new(&self.store, self.config.top_products_limit)
    }
}

// ============================================================================
// RESPONSE ENVELOPE
// ============================================================================

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

/// Run synchronous store work on the blocking pool.
async fn blocking<T, F>(state: AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppState) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<ParseError> for ApiError {
    fn from(err: ParseError) -> Self {
        let status = match err {
            ParseError::UnknownEntity(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        ApiError::new(status, err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Parse(err) => err.into(),
            ImportError::Store(err) => err.into(),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        let status = match &err {
            CatalogError::NotFound { .. } => StatusCode::NOT_FOUND,
            CatalogError::Validation { .. } => StatusCode::BAD_REQUEST,
            CatalogError::Conflict(_) => StatusCode::CONFLICT,
            CatalogError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.message, "request failed");
        } else {
            warn!(status = %self.status, error = %self.message, "request rejected");
        }
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}

// ============================================================================
// QUERY PARAMETERS
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ProductParams {
    pub search: Option<String>,
    pub category_id: Option<i64>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
}

impl ProductParams {
    fn into_filter(self) -> Result<ProductFilter, ApiError> {
        Ok(ProductFilter {
            search: self.search,
            category_id: self.category_id,
            min_price: price_param("min_price", self.min_price)?,
            max_price: price_param("max_price", self.max_price)?,
        })
    }
}

fn price_param(name: &str, raw: Option<String>) -> Result<Option<Decimal>, ApiError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<Decimal>()
            .map(Some)
            .map_err(|_| ApiError::bad_request(format!("{} must be a decimal number, got '{}'", name, value))),
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub cascade: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SalesParams {
    pub product_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ImportLogParams {
    pub limit: Option<usize>,
}

// ============================================================================
// API HANDLERS
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /upload/:entity - Import one CSV file (raw body or multipart `file` field)
async fn upload(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    request: Request,
) -> ApiResult<ImportSummary> {
    let entity: EntityType = entity.parse().map_err(ParseError::UnknownEntity)?;
    let bytes = read_upload(&state, request).await?;

    let summary = blocking(state, move |s| {
        Ok(importer::import_csv(&s.store, entity, &bytes, s.config.import)?)
    })
    .await?;

    ok(summary)
}

async fn read_upload(state: &AppState, request: Request) -> Result<Bytes, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    if !is_multipart {
        let limit = state.config.import.max_upload_bytes + MULTIPART_OVERHEAD;
        return to_bytes(request.into_body(), limit).await.map_err(|_| {
            ApiError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("upload limit is {} bytes", state.config.import.max_upload_bytes),
            )
        });
    }

    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|rejection| ApiError::new(rejection.status(), rejection.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(e.status(), e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if !filename.to_ascii_lowercase().ends_with(".csv") {
            return Err(ParseError::UnsupportedFormat(filename).into());
        }

        return field.bytes().await.map_err(|e| ApiError::new(e.status(), e.body_text()));
    }

    Err(ApiError::bad_request("multipart upload has no 'file' field"))
}

/// GET /analytics/sales
async fn sales_analytics(State(state): State<AppState>) -> ApiResult<crate::analytics::SalesSummary> {
    ok(blocking(state, |s| Ok(s.analytics().sales_summary()?)).await?)
}

/// GET /analytics/products - best sellers
async fn product_analytics(State(state): State<AppState>) -> ApiResult<Vec<crate::analytics::ProductSales>> {
    ok(blocking(state, |s| Ok(s.analytics().top_products()?)).await?)
}

/// GET /analytics/categories
async fn category_analytics(State(state): State<AppState>) -> ApiResult<Vec<crate::analytics::CategorySales>> {
    ok(blocking(state, |s| Ok(s.analytics().category_sales()?)).await?)
}

/// GET /analytics/monthly
async fn monthly_analytics(State(state): State<AppState>) -> ApiResult<Vec<crate::analytics::MonthlySales>> {
    ok(blocking(state, |s| Ok(s.analytics().monthly_sales()?)).await?)
}

/// GET /products?search=&category_id=&min_price=&max_price=
async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ProductParams>,
) -> ApiResult<Vec<crate::entities::ProductView>> {
    let filter = params.into_filter()?;
    ok(blocking(state, move |s| Ok(s.catalog().list_products(&filter)?)).await?)
}

async fn get_product(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<crate::entities::ProductView> {
    ok(blocking(state, move |s| Ok(s.catalog().get_product(id)?)).await?)
}

async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<NewProduct>,
) -> Result<impl IntoResponse, ApiError> {
    let created = blocking(state, move |s| Ok(s.catalog().create_product(request)?)).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<ProductUpdate>,
) -> ApiResult<crate::entities::ProductView> {
    ok(blocking(state, move |s| Ok(s.catalog().update_product(id, update)?)).await?)
}

/// DELETE /products/:id?cascade=true|false
async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<DeleteParams>,
) -> ApiResult<crate::catalog::DeleteOutcome> {
    let policy = params.cascade.map(|cascade| {
        if cascade {
            DeletePolicy::Cascade
        } else {
            DeletePolicy::Block
        }
    });
    ok(blocking(state, move |s| Ok(s.catalog().delete_product(id, policy)?)).await?)
}

async fn list_categories(State(state): State<AppState>) -> ApiResult<Vec<crate::entities::Category>> {
    ok(blocking(state, |s| Ok(s.catalog().list_categories()?)).await?)
}

async fn get_category(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<crate::entities::Category> {
    ok(blocking(state, move |s| Ok(s.catalog().get_category(id)?)).await?)
}

async fn create_category(
    State(state): State<AppState>,
    Json(request): Json<NewCategory>,
) -> Result<impl IntoResponse, ApiError> {
    let created = blocking(state, move |s| Ok(s.catalog().create_category(request)?)).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}

async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<NewCategory>,
) -> ApiResult<crate::entities::Category> {
    ok(blocking(state, move |s| Ok(s.catalog().update_category(id, request)?)).await?)
}

async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<crate::catalog::DeleteOutcome> {
    ok(blocking(state, move |s| Ok(s.catalog().delete_category(id)?)).await?)
}

/// GET /sales?product_id=
async fn list_sales(
    State(state): State<AppState>,
    Query(params): Query<SalesParams>,
) -> ApiResult<Vec<crate::entities::Sale>> {
    ok(blocking(state, move |s| Ok(s.catalog().list_sales(params.product_id)?)).await?)
}

async fn get_sale(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<crate::entities::Sale> {
    ok(blocking(state, move |s| Ok(s.catalog().get_sale(id)?)).await?)
}

/// GET /imports - import audit trail, newest first
async fn list_imports(
    State(state): State<AppState>,
    Query(params): Query<ImportLogParams>,
) -> ApiResult<Vec<db::ImportRecord>> {
    let limit = params.limit.unwrap_or(DEFAULT_IMPORT_LIMIT);
    ok(blocking(state, move |s| Ok(s.store.read(|conn| db::recent_imports(conn, limit))?)).await?)
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.import.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/api/health", get(health_check))
        .route("/upload/:entity", post(upload))
        .route("/analytics/sales", get(sales_analytics))
        .route("/analytics/products", get(product_analytics))
        .route("/analytics/categories", get(category_analytics))
        .route("/analytics/monthly", get(monthly_analytics))
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/:id",
            get(get_category).put(update_category).delete(delete_category),
        )
        .route("/sales", get(list_sales))
        .route("/sales/:id", get(get_sale))
        .route("/imports", get(list_imports))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_params_parse_or_reject() {
        let params = ProductParams {
            min_price: Some("10.5".into()),
            max_price: Some("".into()),
            ..Default::default()
        };

        let filter = params.into_filter().unwrap();
        assert_eq!(filter.min_price, Some("10.5".parse().unwrap()));
        assert_eq!(filter.max_price, None);

        let bad = ProductParams {
            max_price: Some("cheap".into()),
            ..Default::default()
        };
        assert_eq!(bad.into_filter().unwrap_err().status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(ApiError::from(ParseError::NoHeader).status, StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(ParseError::UnknownEntity("orders".into())).status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(CatalogError::NotFound { entity: "product", id: 1 }).status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(CatalogError::Conflict(crate::error::ConflictError::ProductHasSales {
                product_id: 1,
                sales: 2
            }))
            .status,
            StatusCode::CONFLICT
        );
    }
}
