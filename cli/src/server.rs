use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

use shiftbank_core::migration::{GateOutcome, LogNotifier, MigrationResult};
use shiftbank_core::models::AuthEvent;
use shiftbank_core::service::ShiftbankService;

const BODY_LIMIT: usize = 64 * 1024; // 64 KiB

const FAILED_MIGRATION_MESSAGE: &str = "Migration failed, local data kept. Try again later.";

#[derive(Clone)]
struct AppState {
    service: Arc<ShiftbankService>,
    api_key: Option<String>,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct SessionRequest {
    user_id: String,
    event: String,
}

#[derive(Serialize)]
struct SessionResponse {
    event: AuthEvent,
    #[serde(flatten)]
    result: MigrationResult,
}

#[derive(Serialize)]
struct PrepareResponse {
    captured: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    BadRequest(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(err) => {
                error!(error = %format!("{err:#}"), "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            warn!(path = %request.uri().path(), "rejected request without valid API key");
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

/// Called by the auth provider before it signs the user in, so guest data
/// is captured even if the app clears it during the auth flow.
async fn prepare_session(State(state): State<AppState>) -> Json<PrepareResponse> {
    let captured = state.service.gate().capture_snapshot().await;
    Json(PrepareResponse { captured })
}

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let user_id = req.user_id.trim();
    if user_id.is_empty() {
        return Err(ApiError::BadRequest("user_id cannot be empty".to_string()));
    }
    let event: AuthEvent = req
        .event
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let outcome = state
        .service
        .gate()
        .on_auth_event(event, user_id, None, &LogNotifier)
        .await;

    match outcome {
        GateOutcome::AlreadyRunning => Err(ApiError::Conflict(
            "A migration is already in progress".to_string(),
        )),
        GateOutcome::Completed(mut result) => {
            if !result.success {
                // Cause was logged by the engine and notifier
                result.error = Some(FAILED_MIGRATION_MESSAGE.to_string());
            }
            Ok(Json(SessionResponse { event, result }))
        }
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/session", post(create_session))
        .route("/api/session/prepare", post(prepare_session))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    service: ShiftbankService,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let state = AppState {
        service: Arc::new(service),
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {}...{} (see api_key file in data directory)",
            &key[..4],
            &key[key.len() - 4..],
        );
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can trigger migrations."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    info!(%bind, port, "session endpoint listening");
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
