//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Form, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use checkout_types::{
    AppError, CheckoutRepository, ClaimRequest, CreateGameRequest, CreatePurchaseRequest,
    PaidNotificationRequest, PayoutWebhookForm, PurchaseId, UpsertPayoutProfileRequest,
};

use crate::CheckoutService;

/// Application state shared across handlers.
pub struct AppState<R: CheckoutRepository> {
    pub service: CheckoutService<R>,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, reason, message) = match &self.0 {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, None, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, None, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, None, msg.clone()),
            AppError::Conflict { reason, detail } => {
                (StatusCode::CONFLICT, Some(*reason), detail.clone())
            }
            AppError::StoreUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, None, msg.clone())
            }
            AppError::Misconfigured(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Some("misconfigured"),
                msg.clone(),
            ),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, None, msg.clone()),
        };

        let mut body = serde_json::json!({
            "error": message,
            "code": status.as_u16()
        });
        if let Some(reason) = reason {
            body["reason"] = serde_json::Value::String(reason.to_string());
        }

        (status, Json(body)).into_response()
    }
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// List a game for a developer.
#[tracing::instrument(skip(state), fields(title = %req.title))]
pub async fn create_game<R: CheckoutRepository>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<CreateGameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let game = state.service.create_game(req).await?;
    Ok((StatusCode::CREATED, Json(game)))
}

/// Set a developer's payout destination.
#[tracing::instrument(skip(state))]
pub async fn upsert_payout_profile<R: CheckoutRepository>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<UpsertPayoutProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state.service.upsert_payout_profile(req).await?;
    Ok(Json(profile))
}

/// Start a checkout.
#[tracing::instrument(skip(state), fields(game_id = %req.game_id))]
pub async fn create_purchase<R: CheckoutRepository>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<CreatePurchaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let purchase = state.service.create_purchase(req).await?;
    Ok((StatusCode::CREATED, Json(purchase)))
}

/// Get purchase by ID.
#[tracing::instrument(skip(state), fields(purchase_id = %id))]
pub async fn get_purchase<R: CheckoutRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let purchase_id: PurchaseId = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid purchase ID".into()))?;

    let purchase = state.service.get_purchase(purchase_id).await?;
    Ok(Json(purchase))
}

/// Provider notification that an invoice settled. Idempotent.
#[tracing::instrument(skip(state), fields(invoice_id = %req.invoice_id))]
pub async fn notify_paid<R: CheckoutRepository>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<PaidNotificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state.service.mark_paid(req).await?;
    Ok(Json(receipt))
}

/// Claim a guest purchase with its receipt code.
#[tracing::instrument(skip(state, req))]
pub async fn claim_purchase<R: CheckoutRepository>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<ClaimRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let claim = state.service.claim(req).await?;
    Ok(Json(claim))
}

/// List the ledger for a purchase.
#[tracing::instrument(skip(state), fields(purchase_id = %id))]
pub async fn list_ledger<R: CheckoutRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let purchase_id: PurchaseId = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid purchase ID".into()))?;

    let entries = state.service.list_ledger(purchase_id).await?;
    Ok(Json(entries))
}

/// Payout confirmation webhook. Form-encoded, MAC-authenticated.
#[tracing::instrument(skip(state, form))]
pub async fn payout_webhook<R: CheckoutRepository>(
    State(state): State<Arc<AppState<R>>>,
    Form(form): Form<PayoutWebhookForm>,
) -> Result<impl IntoResponse, ApiError> {
    let ack = state.service.process_payout_webhook(form).await?;
    Ok(Json(ack))
}
