use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::attendance::{
    compute_stats, standing_message, AttendanceRecord, AttendanceStatus, OverallStats,
};
use crate::auth::{build_mailer, AuthService, Mailer};
use crate::config::Config;
use crate::error::{AuthError, ExtractionError, ScheduleError, StoreError};
use crate::extraction::{extract_schedule, GeminiExtractor, ScheduleExtractor};
use crate::schedule::{
    detect_conflicts_with, ensure_fully_resolved, resolve_conflicts, Conflict, IdSource,
    Resolutions, ScheduleEntry, UuidIds,
};
use crate::store::{DataStore, JsonFileStore, PublicUser, UserData};

#[derive(Clone)]
pub struct ApiState {
    config: Arc<Config>,
    store: Arc<dyn DataStore>,
    auth: Arc<AuthService>,
    extractor: Option<Arc<dyn ScheduleExtractor>>,
    ids: Arc<dyn IdSource>,
}

impl ApiState {
    pub fn new(
        config: Config,
        store: Arc<dyn DataStore>,
        mailer: Arc<dyn Mailer>,
        extractor: Option<Arc<dyn ScheduleExtractor>>,
        ids: Arc<dyn IdSource>,
    ) -> Self {
        let auth = AuthService::new(
            store.clone(),
            mailer,
            ids.clone(),
            &config.auth,
            &config.mail,
        );
        Self {
            config: Arc::new(config),
            store,
            auth: Arc::new(auth),
            extractor,
            ids,
        }
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let store: Arc<dyn DataStore> = Arc::new(JsonFileStore::open(&config.resolved_data_dir())?);
        let mailer = build_mailer(&config.mail)?;
        let extractor: Option<Arc<dyn ScheduleExtractor>> =
            match GeminiExtractor::from_config(&config.extraction) {
                Ok(extractor) => Some(Arc::new(extractor)),
                Err(err) => {
                    warn!("schedule extraction disabled: {err}");
                    None
                }
            };
        Ok(Self::new(config, store, mailer, extractor, Arc::new(UuidIds)))
    }
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn internal(error: impl std::fmt::Display) -> Self {
        error!("request failed: {error}");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            ok: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidUserId(_) => Self::bad_request(err.to_string()),
            StoreError::UserNotFound(_) | StoreError::EntryNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, err.to_string())
            }
            StoreError::DuplicateEmail(_) => Self::new(StatusCode::CONFLICT, err.to_string()),
            other => Self::internal(other),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let status = match &err {
            AuthError::MissingEmail
            | AuthError::OtpNotSent
            | AuthError::OtpExpired
            | AuthError::OtpMismatch
            | AuthError::WeakPassword(_) => StatusCode::BAD_REQUEST,
            AuthError::AlreadyRegistered => StatusCode::CONFLICT,
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::Store(_) | AuthError::Mail(_) | AuthError::Hash(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            return Self::internal(err);
        }
        Self::new(status, err.to_string())
    }
}

impl From<ExtractionError> for ApiError {
    fn from(err: ExtractionError) -> Self {
        let status = match &err {
            ExtractionError::Empty => StatusCode::UNPROCESSABLE_ENTITY,
            ExtractionError::MissingApiKey(_) => StatusCode::SERVICE_UNAVAILABLE,
            ExtractionError::Upstream { .. }
            | ExtractionError::Malformed(_)
            | ExtractionError::Http(_) => StatusCode::BAD_GATEWAY,
        };
        warn!("extraction failed: {err}");
        Self::new(status, err.to_string())
    }
}

impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Clone, Deserialize)]
struct SendOtpRequest {
    #[serde(default)]
    email: String,
}

#[derive(Debug, Clone, Deserialize)]
struct VerifyOtpRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    otp: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    otp: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkRequest {
    schedule_item_id: String,
    date: NaiveDate,
    status: AttendanceStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractRequest {
    /// Base64 image bytes, optionally as a `data:` URL.
    image: String,
    #[serde(default = "default_mime_type")]
    mime_type: String,
}

#[derive(Debug, Clone, Deserialize)]
struct DetectRequest {
    schedule: Vec<ScheduleEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResolveRequest {
    schedule: Vec<ScheduleEntry>,
    conflicts: Vec<Conflict>,
    #[serde(default)]
    resolutions: Resolutions,
    #[serde(default)]
    strict: bool,
}

#[derive(Debug, Serialize)]
struct HealthChecks {
    extraction_enabled: bool,
    smtp_configured: bool,
    data_dir: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    checks: HealthChecks,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct UserResponse {
    user: PublicUser,
}

#[derive(Debug, Serialize)]
struct SavedResponse {
    success: bool,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    stats: OverallStats,
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct MarkResponse {
    record: AttendanceRecord,
    stats: OverallStats,
}

#[derive(Debug, Serialize)]
struct ExtractResponse {
    schedule: Vec<ScheduleEntry>,
    conflicts: Vec<Conflict>,
}

#[derive(Debug, Serialize)]
struct ConflictsResponse {
    conflicts: Vec<Conflict>,
}

#[derive(Debug, Serialize)]
struct ScheduleResponse {
    schedule: Vec<ScheduleEntry>,
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/auth/send-otp", post(send_otp))
        .route("/auth/verify-otp", post(verify_otp))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/api/data/:user_id", get(load_data).post(save_data))
        .route("/api/data/:user_id/stats", get(stats))
        .route("/api/data/:user_id/records", post(mark_attendance))
        .route("/api/schedule/extract", post(extract))
        .route("/api/schedule/conflicts", post(conflicts))
        .route("/api/schedule/resolve", post(resolve))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(config: Config, bind: SocketAddr) -> Result<()> {
    let state = ApiState::from_config(config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("REST API listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health(State(state): State<ApiState>) -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
        checks: HealthChecks {
            extraction_enabled: state.extractor.is_some(),
            smtp_configured: state.config.mail.smtp_configured(),
            data_dir: state.config.resolved_data_dir().display().to_string(),
        },
    })
}

async fn send_otp(
    State(state): State<ApiState>,
    Json(request): Json<SendOtpRequest>,
) -> ApiResult<MessageResponse> {
    state.auth.send_otp(&request.email).await?;
    Ok(ok(MessageResponse {
        message: "OTP sent successfully",
    }))
}

async fn verify_otp(
    State(state): State<ApiState>,
    Json(request): Json<VerifyOtpRequest>,
) -> ApiResult<MessageResponse> {
    state.auth.verify_otp(&request.email, &request.otp)?;
    Ok(ok(MessageResponse {
        message: "OTP verified",
    }))
}

async fn register(
    State(state): State<ApiState>,
    Json(request): Json<RegisterRequest>,
) -> std::result::Result<(StatusCode, Json<ApiResponse<UserResponse>>), ApiError> {
    let user = state
        .auth
        .register(&request.email, &request.otp, &request.password, &request.name)
        .await?;
    Ok((StatusCode::CREATED, ok(UserResponse { user })))
}

async fn login(
    State(state): State<ApiState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<UserResponse> {
    let user = state.auth.login(&request.email, &request.password).await?;
    Ok(ok(UserResponse { user }))
}

async fn load_data(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> ApiResult<UserData> {
    Ok(ok(state.store.load_data(&user_id).await?))
}

async fn save_data(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Json(data): Json<UserData>,
) -> ApiResult<SavedResponse> {
    state.store.save_data(&user_id, &data).await?;
    info!(
        "saved {} entries and {} records for {user_id}",
        data.schedule.len(),
        data.records.len()
    );
    Ok(ok(SavedResponse { success: true }))
}

async fn stats(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> ApiResult<StatsResponse> {
    let data = state.store.load_data(&user_id).await?;
    let stats = compute_stats(&data.records);
    let message = standing_message(&stats);
    Ok(ok(StatsResponse { stats, message }))
}

async fn mark_attendance(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Json(request): Json<MarkRequest>,
) -> ApiResult<MarkResponse> {
    let record = AttendanceRecord::new(
        state.ids.as_ref(),
        request.schedule_item_id,
        request.date,
        request.status,
    );
    let data = state
        .store
        .mark_attendance(&user_id, record.clone())
        .await?;
    Ok(ok(MarkResponse {
        record,
        stats: compute_stats(&data.records),
    }))
}

async fn extract(
    State(state): State<ApiState>,
    Json(request): Json<ExtractRequest>,
) -> ApiResult<ExtractResponse> {
    let Some(extractor) = state.extractor.as_ref() else {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "schedule extraction is not configured",
        ));
    };
    let image = decode_image(&request.image)?;
    let schedule =
        extract_schedule(extractor.as_ref(), &image, &request.mime_type, state.ids.as_ref())
            .await?;
    let conflicts = detect_conflicts_with(&schedule, state.ids.as_ref());
    Ok(ok(ExtractResponse {
        schedule,
        conflicts,
    }))
}

async fn conflicts(
    State(state): State<ApiState>,
    Json(request): Json<DetectRequest>,
) -> ApiResult<ConflictsResponse> {
    let conflicts = detect_conflicts_with(&request.schedule, state.ids.as_ref());
    Ok(ok(ConflictsResponse { conflicts }))
}

async fn resolve(Json(request): Json<ResolveRequest>) -> ApiResult<ScheduleResponse> {
    if request.strict {
        ensure_fully_resolved(&request.conflicts, &request.resolutions)?;
    }
    let schedule = resolve_conflicts(&request.schedule, &request.conflicts, &request.resolutions);
    Ok(ok(ScheduleResponse { schedule }))
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { ok: true, data })
}

fn default_mime_type() -> String {
    "image/png".to_string()
}

fn decode_image(raw: &str) -> std::result::Result<Vec<u8>, ApiError> {
    let payload = match raw.split_once(";base64,") {
        Some((_, data)) => data,
        None => raw,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|e| ApiError::bad_request(format!("image is not valid base64: {e}")))
}
