use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Extension, Path, Query, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{SESSION_COOKIE, Session, SessionStore};
use crate::config::{self, AppConfig, ConnectionSettings};
use crate::error::{AuthError, ConfigError, FlowError, LabelError, TransactionError};
use crate::export;
use crate::inventory::{InventoryFilter, InventoryGroup};
use crate::model::{AnalystUser, Department, NotificationLog, UserRole};
use crate::recorder::{LabelScan, PullSummary, ReagentFlow, Replication, TransactionReceipt};
use crate::saving;
use crate::state::{ReagentDraft, Withdrawal};

pub struct AppState {
    pub flow: Arc<ReagentFlow>,
    pub sessions: SessionStore,
    /// Directory holding the connection file
    pub data_dir: PathBuf,
}

impl AppState {
    pub fn new(flow: Arc<ReagentFlow>, data_dir: PathBuf) -> Self {
        AppState {
            flow,
            sessions: SessionStore::new(),
            data_dir,
        }
    }
}

type Shared = State<Arc<AppState>>;

/// Error body returned by every endpoint
#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: &'static str,
    message: String,
}

/// A [`FlowError`] rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub FlowError);

impl<E: Into<FlowError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            FlowError::Transaction(TransactionError::ReagentNotFound(_)) => StatusCode::NOT_FOUND,
            FlowError::Transaction(TransactionError::InsufficientStock { .. }) => StatusCode::CONFLICT,
            FlowError::Transaction(_) => StatusCode::BAD_REQUEST,
            FlowError::Auth(AuthError::NoSession | AuthError::WrongPassword) => {
                StatusCode::UNAUTHORIZED
            }
            FlowError::Auth(AuthError::Forbidden) => StatusCode::FORBIDDEN,
            FlowError::Auth(AuthError::PasswordTooShort(_)) => StatusCode::BAD_REQUEST,
            FlowError::Auth(AuthError::HashingFailed) => StatusCode::INTERNAL_SERVER_ERROR,
            FlowError::InvalidInput(_) | FlowError::Backup(_) => StatusCode::BAD_REQUEST,
            FlowError::Config(ConfigError::Invalid { .. }) => StatusCode::BAD_REQUEST,
            FlowError::Config(_) | FlowError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
            FlowError::Label(LabelError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
            FlowError::Label(LabelError::InvalidImage(_)) => StatusCode::BAD_REQUEST,
            FlowError::Label(_) | FlowError::Store(_) | FlowError::Mail(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("request failed: {}", self.0);
        } else {
            log::debug!("request rejected: {}", self.0);
        }
        let body = ErrorResponse {
            status: "error",
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    let manager = Router::new()
        .route("/api/alerts", get(get_alerts))
        .route("/api/settings", get(get_settings).put(update_settings))
        .route("/api/analysts", post(add_analyst))
        .route("/api/analysts/:name", delete(remove_analyst))
        .route("/api/reagents/:id/ordered", post(mark_ordered))
        .route("/api/reagents/:id/min-stock", put(update_min_stock))
        .route("/api/reagents/:id", delete(delete_reagent))
        .route("/api/connection", get(get_connection).put(update_connection))
        .route("/api/push", post(push_all))
        .route("/api/export/inventory.csv", get(export_inventory_csv))
        .route("/api/export/history.csv", get(export_history_csv))
        .route("/api/export/inventory.xlsx", get(export_xlsx))
        .route("/api/backup", get(download_backup).post(restore_backup))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_manager));

    let member = Router::new()
        .route("/api/inventory", get(get_inventory))
        .route("/api/history", get(get_history))
        .route("/api/analysts", get(get_analysts))
        .route("/api/reagents", get(get_reagents))
        .route("/api/intake", post(record_intake))
        .route("/api/withdrawal", post(record_withdrawal))
        .route("/api/labels/scan", post(scan_label))
        .route("/api/sync", post(resync))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/login/analyst", post(login_analyst))
        .route("/api/login/manager", post(login_manager))
        .route("/api/logout", post(logout))
        .merge(member)
        .merge(manager)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Build the service from `config`, pull remote data and serve the API
pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let flow = Arc::new(ReagentFlow::from_config(&config)?);
    match flow.pull().await {
        Ok(Some(summary)) => log::info!("initial sync: {} reagents", summary.reagents),
        Ok(None) => log::info!("running without a remote store"),
        Err(e) => log::warn!("initial sync failed, starting with empty state: {}", e),
    }

    let state = Arc::new(AppState::new(flow, config.data_dir.clone()));
    let app = router(state);

    let listener = TcpListener::bind(config.bind_addr.as_str()).await?;
    log::info!("Listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ---- sessions ----

fn session_of(state: &AppState, jar: &CookieJar) -> Result<Session, AuthError> {
    let token = jar.get(SESSION_COOKIE).ok_or(AuthError::NoSession)?;
    state.sessions.validate(token.value())
}

async fn require_session(
    State(state): Shared,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    match session_of(&state, &jar) {
        Ok(session) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

async fn require_manager(
    State(state): Shared,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let checked = jar
        .get(SESSION_COOKIE)
        .ok_or(AuthError::NoSession)
        .and_then(|token| state.sessions.require_manager(token.value()));
    match checked {
        Ok(session) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .build()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    connected: bool,
    has_manager_password: bool,
    role: Option<UserRole>,
}

async fn get_status(State(state): Shared, jar: CookieJar) -> Json<StatusResponse> {
    Json(StatusResponse {
        connected: state.flow.is_connected(),
        has_manager_password: state.flow.has_manager_password(),
        role: session_of(&state, &jar).ok().map(|s| s.role),
    })
}

#[derive(Deserialize)]
struct AnalystLogin {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    role: UserRole,
    first_login: bool,
}

async fn login_analyst(
    State(state): Shared,
    jar: CookieJar,
    Json(body): Json<AnalystLogin>,
) -> (CookieJar, Json<LoginResponse>) {
    let name = body.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    let token = state.sessions.create(UserRole::Analyst, name);
    (
        jar.add(session_cookie(token)),
        Json(LoginResponse {
            role: UserRole::Analyst,
            first_login: false,
        }),
    )
}

#[derive(Deserialize)]
struct ManagerLogin {
    password: String,
}

async fn login_manager(
    State(state): Shared,
    jar: CookieJar,
    Json(body): Json<ManagerLogin>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let first_login = state.flow.authenticate_manager(&body.password).await?;
    let token = state.sessions.create(UserRole::Manager, None);
    Ok((
        jar.add(session_cookie(token)),
        Json(LoginResponse {
            role: UserRole::Manager,
            first_login,
        }),
    ))
}

async fn logout(State(state): Shared, jar: CookieJar) -> (CookieJar, StatusCode) {
    if let Some(token) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(token.value());
    }
    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        StatusCode::NO_CONTENT,
    )
}

// ---- views ----

#[derive(Deserialize)]
struct InventoryQuery {
    search: Option<String>,
    department: Option<Department>,
}

async fn get_inventory(
    State(state): Shared,
    Query(query): Query<InventoryQuery>,
) -> Json<Vec<InventoryGroup>> {
    let filter = InventoryFilter {
        search: query.search,
        department: query.department,
    };
    Json(state.flow.inventory(&filter))
}

#[derive(Serialize)]
struct AlertsResponse {
    groups: Vec<InventoryGroup>,
    notifications: Vec<NotificationLog>,
}

async fn get_alerts(State(state): Shared) -> Json<AlertsResponse> {
    Json(AlertsResponse {
        groups: state.flow.alerts(),
        notifications: state.flow.notifications(),
    })
}

async fn get_history(State(state): Shared) -> Json<Vec<crate::model::Transaction>> {
    Json(state.flow.transactions())
}

async fn get_analysts(State(state): Shared) -> Json<Vec<AnalystUser>> {
    Json(state.flow.analysts())
}

#[derive(Deserialize)]
struct DepartmentQuery {
    department: Option<Department>,
}

/// Reagents for the withdrawal form, scoped to the analyst's department
/// unless `?department` says otherwise
async fn get_reagents(
    State(state): Shared,
    Extension(session): Extension<Session>,
    Query(query): Query<DepartmentQuery>,
) -> Json<Vec<crate::model::Reagent>> {
    let department = query.department.or_else(|| {
        session
            .user
            .as_deref()
            .and_then(|name| state.flow.analyst_department(name))
    });
    Json(state.flow.reagents_for_department(department))
}

// ---- movements ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntakeBody {
    reagent_id: Option<String>,
    #[serde(default)]
    draft: ReagentDraft,
    containers: f64,
    analyst: String,
}

async fn record_intake(
    State(state): Shared,
    Json(body): Json<IntakeBody>,
) -> ApiResult<TransactionReceipt> {
    let receipt = state
        .flow
        .record_intake(
            body.reagent_id.as_deref(),
            body.draft,
            body.containers,
            &body.analyst,
        )
        .await?;
    Ok(Json(receipt))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawalBody {
    reagent_id: String,
    withdrawal: Withdrawal,
    analyst: String,
}

async fn record_withdrawal(
    State(state): Shared,
    Json(body): Json<WithdrawalBody>,
) -> ApiResult<TransactionReceipt> {
    let receipt = state
        .flow
        .record_withdrawal(&body.reagent_id, body.withdrawal, &body.analyst)
        .await?;
    Ok(Json(receipt))
}

#[derive(Deserialize)]
struct ScanBody {
    image: String,
}

async fn scan_label(State(state): Shared, Json(body): Json<ScanBody>) -> ApiResult<LabelScan> {
    Ok(Json(state.flow.analyze_label(&body.image).await?))
}

async fn resync(State(state): Shared) -> ApiResult<Option<PullSummary>> {
    Ok(Json(state.flow.pull().await?))
}

// ---- manager ----

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SettingsResponse {
    manager_email: String,
    analysts: Vec<AnalystUser>,
}

async fn get_settings(State(state): Shared) -> Json<SettingsResponse> {
    Json(SettingsResponse {
        manager_email: state.flow.manager_email(),
        analysts: state.flow.analysts(),
    })
}

#[derive(Deserialize)]
struct SettingsBody {
    password: Option<String>,
    email: Option<String>,
}

async fn update_settings(
    State(state): Shared,
    Json(body): Json<SettingsBody>,
) -> ApiResult<SettingsResponse> {
    state
        .flow
        .update_manager_settings(body.password.as_deref(), body.email.as_deref())
        .await?;
    Ok(get_settings(State(state)).await)
}

#[derive(Serialize)]
struct Changed {
    changed: bool,
}

async fn add_analyst(State(state): Shared, Json(body): Json<AnalystUser>) -> ApiResult<Changed> {
    let changed = state.flow.add_analyst(body).await?;
    Ok(Json(Changed { changed }))
}

async fn remove_analyst(State(state): Shared, Path(name): Path<String>) -> ApiResult<Changed> {
    let changed = state.flow.remove_analyst(&name).await?;
    Ok(Json(Changed { changed }))
}

async fn mark_ordered(
    State(state): Shared,
    Path(id): Path<String>,
) -> ApiResult<crate::model::Reagent> {
    Ok(Json(state.flow.mark_as_ordered(&id).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MinStockBody {
    min_stock: f64,
}

async fn update_min_stock(
    State(state): Shared,
    Path(id): Path<String>,
    Json(body): Json<MinStockBody>,
) -> ApiResult<crate::model::Reagent> {
    Ok(Json(state.flow.update_min_stock(&id, body.min_stock).await?))
}

#[derive(Deserialize)]
struct DeleteQuery {
    #[serde(default)]
    confirm: bool,
}

async fn delete_reagent(
    State(state): Shared,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> ApiResult<crate::model::Reagent> {
    Ok(Json(state.flow.delete_reagent(&id, query.confirm).await?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionResponse {
    supabase_url: String,
    /// Only whether a key is set; the key itself is never returned
    has_supabase_key: bool,
    webhook_url: String,
    connected: bool,
}

async fn get_connection(State(state): Shared) -> ApiResult<ConnectionResponse> {
    let file = config::read_file_config(&state.data_dir)?;
    Ok(Json(ConnectionResponse {
        supabase_url: file.connection.supabase_url,
        has_supabase_key: !file.connection.supabase_key.is_empty(),
        webhook_url: file.connection.webhook_url,
        connected: state.flow.is_connected(),
    }))
}

#[derive(Serialize)]
struct ConnectionUpdate {
    connected: bool,
    sync: Option<PullSummary>,
    /// Set when the follow-up resync failed
    error: Option<String>,
}

async fn update_connection(
    State(state): Shared,
    Json(settings): Json<ConnectionSettings>,
) -> ApiResult<ConnectionUpdate> {
    config::save_connection_settings(&state.data_dir, &settings)?;
    state.flow.set_connection(&settings);
    let (sync, error) = match state.flow.pull().await {
        Ok(summary) => (summary, None),
        Err(e) => (None, Some(e.to_string())),
    };
    Ok(Json(ConnectionUpdate {
        connected: state.flow.is_connected(),
        sync,
        error,
    }))
}

async fn push_all(State(state): Shared) -> Json<Replication> {
    Json(state.flow.push_all().await)
}

fn download(content_type: &str, file_name: &str, body: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        Body::from(body),
    )
        .into_response()
}

async fn export_inventory_csv(State(state): Shared) -> Response {
    let csv = export::inventory_csv(&state.flow.reagents());
    download("text/csv; charset=utf-8", "inventario.csv", csv.into_bytes())
}

async fn export_history_csv(State(state): Shared) -> Response {
    let csv = export::history_csv(&state.flow.transactions());
    download("text/csv; charset=utf-8", "historial.csv", csv.into_bytes())
}

async fn export_xlsx(State(state): Shared) -> Result<Response, ApiError> {
    let bytes = export::to_xlsx(&state.flow.reagents(), &state.flow.transactions())?;
    Ok(download(
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "inventario.xlsx",
        bytes,
    ))
}

async fn download_backup(State(state): Shared) -> Result<Response, ApiError> {
    let bytes = saving::snapshot_to_bytes(&state.flow.snapshot())
        .map_err(|e| FlowError::Backup(e.to_string()))?;
    Ok(download(
        "application/gzip",
        &saving::backup_file_name(Utc::now()),
        bytes,
    ))
}

#[derive(Serialize)]
struct RestoreResponse {
    reagents: usize,
    transactions: usize,
}

async fn restore_backup(State(state): Shared, body: Bytes) -> ApiResult<RestoreResponse> {
    if body.is_empty() {
        return Err(FlowError::Backup("no file data received".to_string()).into());
    }
    let snapshot =
        saving::snapshot_from_bytes(&body).map_err(|e| FlowError::Backup(e.to_string()))?;
    let response = RestoreResponse {
        reagents: snapshot.reagents.len(),
        transactions: snapshot.transactions.len(),
    };
    state.flow.restore(snapshot);
    log::info!(
        "backup restored: {} reagents, {} transactions",
        response.reagents,
        response.transactions
    );
    Ok(Json(response))
}
