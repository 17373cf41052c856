//! OpenAPI specification and documentation.

#![allow(dead_code)] // Path functions are only used by utoipa for documentation generation

use checkout_types::domain::{
    EntitlementId, GameId, LedgerEntryId, LedgerEntryType, PayoutId, PurchaseId, PurchaseStatus,
    UserId,
};
use checkout_types::dto::{
    ClaimRequest, ClaimResponse, CreateGameRequest, CreatePurchaseRequest, GameResponse,
    LedgerEntryResponse, MarkPaidResponse, PaidNotificationRequest, PayoutProfileResponse,
    PayoutWebhookForm, PurchaseResponse, UpsertPayoutProfileRequest, WebhookAckResponse,
};
use utoipa::OpenApi;

// Dummy functions to generate path documentation
// These are not the actual handlers, just for OpenAPI path generation

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = inline(serde_json::Value), example = json!({"status": "healthy"}))
    )
)]
async fn health() {}

/// List a game for a developer
#[utoipa::path(
    post,
    path = "/api/games",
    tag = "catalog",
    request_body = CreateGameRequest,
    responses(
        (status = 201, description = "Game listed", body = GameResponse),
        (status = 400, description = "Invalid request")
    )
)]
async fn create_game() {}

/// Set a developer's payout destination
#[utoipa::path(
    post,
    path = "/api/payout-profiles",
    tag = "catalog",
    request_body = UpsertPayoutProfileRequest,
    responses(
        (status = 200, description = "Payout profile stored", body = PayoutProfileResponse),
        (status = 400, description = "Invalid request")
    )
)]
async fn upsert_payout_profile() {}

/// Start a checkout
#[utoipa::path(
    post,
    path = "/api/purchases",
    tag = "purchases",
    request_body = CreatePurchaseRequest,
    responses(
        (status = 201, description = "Purchase created with a pending invoice", body = PurchaseResponse),
        (status = 400, description = "Malformed amount or identity"),
        (status = 404, description = "Game not found")
    )
)]
async fn create_purchase() {}

/// Get purchase by ID
#[utoipa::path(
    get,
    path = "/api/purchases/{id}",
    tag = "purchases",
    params(
        ("id" = PurchaseId, Path, description = "Purchase ID (UUID)")
    ),
    responses(
        (status = 200, description = "Purchase details", body = PurchaseResponse),
        (status = 404, description = "Purchase not found")
    )
)]
async fn get_purchase() {}

/// Provider notification that an invoice settled (idempotent)
#[utoipa::path(
    post,
    path = "/api/purchases/paid",
    tag = "purchases",
    request_body = PaidNotificationRequest,
    responses(
        (status = 200, description = "Purchase paid; artifacts complete", body = MarkPaidResponse),
        (status = 404, description = "No purchase for this invoice"),
        (status = 409, description = "Purchase is in a terminal status, or the developer has no payout profile")
    )
)]
async fn notify_paid() {}

/// Claim a guest purchase with its receipt code
#[utoipa::path(
    post,
    path = "/api/purchases/claim",
    tag = "purchases",
    request_body = ClaimRequest,
    responses(
        (status = 200, description = "Purchase linked to the user", body = ClaimResponse),
        (status = 400, description = "Malformed receipt code"),
        (status = 404, description = "No purchase for this code"),
        (status = 409, description = "Not paid yet, or claimed by another user")
    )
)]
async fn claim_purchase() {}

/// List the ledger for a purchase
#[utoipa::path(
    get,
    path = "/api/purchases/{id}/ledger",
    tag = "ledger",
    params(
        ("id" = PurchaseId, Path, description = "Purchase ID (UUID)")
    ),
    responses(
        (status = 200, description = "Ledger entries, oldest first", body = Vec<LedgerEntryResponse>),
        (status = 404, description = "Purchase not found")
    )
)]
async fn list_ledger() {}

/// Payout confirmation webhook (form-encoded, MAC-authenticated)
#[utoipa::path(
    post,
    path = "/api/payouts/webhook",
    tag = "payouts",
    request_body(content = PayoutWebhookForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Delivery handled; provider may stop retrying", body = WebhookAckResponse),
        (status = 400, description = "Missing id, MAC, or status"),
        (status = 401, description = "MAC mismatch"),
        (status = 500, description = "Webhook secret not configured")
    )
)]
async fn payout_webhook() {}

/// OpenAPI documentation for the Checkout API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Game Store Checkout API",
        version = "1.0.0",
        description = "Lightning-priced game checkout: purchases, guest receipt claims, an append-only money ledger, and payout confirmation webhooks.",
        license(name = "MIT"),
    ),
    paths(
        health,
        create_game,
        upsert_payout_profile,
        create_purchase,
        get_purchase,
        notify_paid,
        claim_purchase,
        list_ledger,
        payout_webhook,
    ),
    components(
        schemas(
            CreateGameRequest,
            GameResponse,
            UpsertPayoutProfileRequest,
            PayoutProfileResponse,
            CreatePurchaseRequest,
            PurchaseResponse,
            PaidNotificationRequest,
            MarkPaidResponse,
            ClaimRequest,
            ClaimResponse,
            LedgerEntryResponse,
            PayoutWebhookForm,
            WebhookAckResponse,
            PurchaseStatus,
            LedgerEntryType,
            GameId,
            UserId,
            PurchaseId,
            EntitlementId,
            PayoutId,
            LedgerEntryId,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "catalog", description = "Games and developer payout profiles"),
        (name = "purchases", description = "Checkout, settlement, and guest claims"),
        (name = "ledger", description = "Append-only money movement records"),
        (name = "payouts", description = "Payout confirmation webhooks"),
    )
)]
pub struct ApiDoc;
