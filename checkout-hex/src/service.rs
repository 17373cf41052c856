//! Checkout Application Service
//!
//! Orchestrates domain operations through the repository port.
//! Contains NO infrastructure logic - pure business orchestration.

use chrono::Utc;

use checkout_repo::security::verify_withdrawal_mac;
use checkout_types::domain::receipt_code;
use checkout_types::{
    AppError, CheckoutRepository, ClaimRequest, ClaimResponse, CreateGameRequest,
    CreatePurchaseRequest, GameResponse, LedgerEntryResponse, MarkPaidRequest, MarkPaidResponse,
    NewPurchase, PaidNotificationRequest, PayoutEventStatus, PayoutProfileResponse,
    PayoutWebhookEvent, PayoutWebhookForm, Purchase, PurchaseId, PurchaseResponse, PurchaseStatus,
    RepoError, UpsertPayoutProfileRequest, WebhookAckResponse,
};
use uuid::Uuid;

/// How many fresh receipt codes to try before giving up. At ~79 bits
/// of entropy a single collision is already extraordinary.
const RECEIPT_CODE_ATTEMPTS: usize = 5;

/// Runtime knobs for the checkout service.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Platform fee in basis points (default 1000 = 10%).
    pub fee_rate_bps: u32,
    /// Name of the payment/payout provider, recorded on purchases and
    /// matched against on webhook deliveries.
    pub payout_provider: String,
    /// Shared secret for payout confirmation MACs. Absence is a
    /// misconfiguration surfaced per-request, never a silent pass.
    pub payout_webhook_secret: Option<String>,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            fee_rate_bps: 1_000,
            payout_provider: "lightning".to_string(),
            payout_webhook_secret: None,
        }
    }
}

/// Application service for checkout operations.
///
/// Generic over `R: CheckoutRepository` - the adapter is injected at
/// compile time, so tests run against an in-memory mock and the app
/// wires in SQLite without code changes.
pub struct CheckoutService<R: CheckoutRepository> {
    repo: R,
    config: CheckoutConfig,
}

impl<R: CheckoutRepository> CheckoutService<R> {
    /// Creates a new checkout service with the given repository.
    pub fn new(repo: R, config: CheckoutConfig) -> Self {
        Self { repo, config }
    }

    /// Returns a reference to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Catalog
    // ─────────────────────────────────────────────────────────────────────────────

    /// Lists a game under the developer's account.
    pub async fn create_game(&self, req: CreateGameRequest) -> Result<GameResponse, AppError> {
        if req.title.trim().is_empty() {
            return Err(AppError::BadRequest("Game title cannot be empty".into()));
        }
        if req.developer_identity.trim().is_empty() {
            return Err(AppError::BadRequest(
                "Developer identity cannot be empty".into(),
            ));
        }

        let developer = self
            .repo
            .resolve_or_create_user(req.developer_identity.trim())
            .await?;
        let game = self.repo.create_game(developer.id, req.title.trim()).await?;

        Ok(GameResponse {
            id: game.id,
            developer_user_id: game.developer_user_id,
            title: game.title,
        })
    }

    /// Sets or replaces a developer's payout destination.
    pub async fn upsert_payout_profile(
        &self,
        req: UpsertPayoutProfileRequest,
    ) -> Result<PayoutProfileResponse, AppError> {
        if req.destination_address.trim().is_empty() {
            return Err(AppError::BadRequest(
                "Destination address cannot be empty".into(),
            ));
        }

        let developer = self
            .repo
            .resolve_or_create_user(req.developer_identity.trim())
            .await?;
        let profile = self
            .repo
            .upsert_payout_profile(developer.id, req.destination_address.trim())
            .await?;

        Ok(PayoutProfileResponse {
            developer_user_id: profile.developer_user_id,
            destination_address: profile.destination_address,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Purchase lifecycle
    // ─────────────────────────────────────────────────────────────────────────────

    /// Starts a checkout: creates a PENDING purchase with a provider
    /// invoice. Guest checkouts (no buyer identity) get a receipt code,
    /// regenerated on the off chance of a collision.
    pub async fn create_purchase(
        &self,
        req: CreatePurchaseRequest,
    ) -> Result<PurchaseResponse, AppError> {
        let game = self
            .repo
            .get_game(req.game_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Game {}", req.game_id)))?;

        let buyer_user_id = match req.buyer_identity.as_deref().map(str::trim) {
            Some("") => {
                return Err(AppError::BadRequest("Buyer identity cannot be empty".into()));
            }
            Some(identity) => Some(self.repo.resolve_or_create_user(identity).await?.id),
            None => None,
        };

        // Invoice issuance against the provider is out of scope here;
        // the purchase carries an opaque id the paid notification and
        // reconciliation key on.
        let invoice_id = format!("inv_{}", Uuid::new_v4().simple());

        let purchase = if buyer_user_id.is_some() {
            self.repo
                .create_purchase(NewPurchase {
                    game_id: game.id,
                    buyer_user_id,
                    guest_receipt_code: None,
                    invoice_provider: self.config.payout_provider.clone(),
                    invoice_id,
                    amount_msat: req.amount_msat,
                })
                .await?
        } else {
            self.create_guest_purchase(game.id, &invoice_id, req.amount_msat)
                .await?
        };

        tracing::info!(
            purchase_id = %purchase.id,
            game_id = %purchase.game_id,
            amount_msat = purchase.amount_msat.value(),
            guest = purchase.buyer_user_id.is_none(),
            "purchase created"
        );

        Ok(purchase_response(purchase))
    }

    async fn create_guest_purchase(
        &self,
        game_id: checkout_types::GameId,
        invoice_id: &str,
        amount_msat: checkout_types::Msat,
    ) -> Result<Purchase, AppError> {
        for _ in 0..RECEIPT_CODE_ATTEMPTS {
            let result = self
                .repo
                .create_purchase(NewPurchase {
                    game_id,
                    buyer_user_id: None,
                    guest_receipt_code: Some(receipt_code::generate()),
                    invoice_provider: self.config.payout_provider.clone(),
                    invoice_id: invoice_id.to_string(),
                    amount_msat,
                })
                .await;

            match result {
                Ok(purchase) => return Ok(purchase),
                Err(RepoError::DuplicateReceiptCode) => {
                    tracing::warn!("guest receipt code collision, regenerating");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(RepoError::DuplicateReceiptCode.into())
    }

    /// Gets a purchase by ID.
    pub async fn get_purchase(&self, id: PurchaseId) -> Result<PurchaseResponse, AppError> {
        self.repo
            .get_purchase(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| AppError::NotFound(format!("Purchase {}", id))))
            .map(purchase_response)
    }

    /// Handles a provider notification that an invoice settled. Safe
    /// to deliver any number of times: the repository brings the paid
    /// artifacts to a complete state exactly once.
    pub async fn mark_paid(
        &self,
        req: PaidNotificationRequest,
    ) -> Result<MarkPaidResponse, AppError> {
        let invoice_id = req.invoice_id.trim();
        if invoice_id.is_empty() {
            return Err(AppError::BadRequest("Invoice id cannot be empty".into()));
        }

        let receipt = self
            .repo
            .mark_paid_and_ensure_artifacts(MarkPaidRequest {
                invoice_id: invoice_id.to_string(),
                paid_at: req.paid_at.unwrap_or_else(Utc::now),
                fee_rate_bps: self.config.fee_rate_bps,
            })
            .await?;

        tracing::info!(
            purchase_id = %receipt.purchase_id,
            already = receipt.already,
            repaired = receipt.repaired,
            "invoice settled"
        );

        Ok(MarkPaidResponse {
            purchase_id: receipt.purchase_id,
            status: PurchaseStatus::Paid,
            already: receipt.already,
            repaired: receipt.repaired,
            entitlement_id: receipt.entitlement_id,
            payout_id: receipt.payout_id,
        })
    }

    /// Links a guest purchase to an identified user via its receipt
    /// code. Idempotent for the same user.
    pub async fn claim(&self, req: ClaimRequest) -> Result<ClaimResponse, AppError> {
        let code = receipt_code::normalize(&req.receipt_code);
        if !receipt_code::is_plausible(&code) {
            return Err(AppError::BadRequest("Malformed receipt code".into()));
        }
        let identity = req.buyer_identity.trim();
        if identity.is_empty() {
            return Err(AppError::BadRequest("Buyer identity cannot be empty".into()));
        }

        let buyer = self.repo.resolve_or_create_user(identity).await?;
        let claim = self.repo.claim_purchase(&code, buyer.id).await?;

        tracing::info!(
            purchase_id = %claim.purchase_id,
            buyer_user_id = %claim.buyer_user_id,
            already_claimed = claim.already_claimed,
            "guest purchase claimed"
        );

        Ok(ClaimResponse {
            purchase_id: claim.purchase_id,
            entitlement_id: claim.entitlement_id,
            game_id: claim.game_id,
            buyer_user_id: claim.buyer_user_id,
            already_claimed: claim.already_claimed,
        })
    }

    /// Lists the ledger for a purchase, oldest first.
    pub async fn list_ledger(
        &self,
        purchase_id: PurchaseId,
    ) -> Result<Vec<LedgerEntryResponse>, AppError> {
        // Verify the purchase exists so an empty ledger and an unknown
        // purchase stay distinguishable.
        let _ = self
            .repo
            .get_purchase(purchase_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Purchase {}", purchase_id)))?;

        let entries = self.repo.list_ledger(purchase_id).await?;
        Ok(entries
            .into_iter()
            .map(|e| LedgerEntryResponse {
                id: e.id,
                purchase_id: e.purchase_id,
                entry_type: e.entry_type,
                amount_msat: e.amount_msat,
                dedupe_key: e.dedupe_key,
                meta: e.meta,
                created_at: e.created_at,
            })
            .collect())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Payout confirmation webhook
    // ─────────────────────────────────────────────────────────────────────────────

    /// Processes one payout confirmation delivery.
    ///
    /// Ordering is load-bearing: the shared secret must exist before
    /// anything about the payload is interpreted, field validation
    /// happens before any storage access, and only an authenticated,
    /// matched delivery mutates anything. Every handled outcome
    /// answers acknowledgement-success so the provider stops
    /// redelivering.
    pub async fn process_payout_webhook(
        &self,
        form: PayoutWebhookForm,
    ) -> Result<WebhookAckResponse, AppError> {
        let secret = self.config.payout_webhook_secret.as_deref().ok_or_else(|| {
            AppError::Misconfigured("payout webhook secret is not configured".into())
        })?;

        let event = PayoutWebhookEvent::from_fields(
            form.id.as_deref(),
            form.status.as_deref(),
            form.hashed_order.as_deref(),
            form.processed_at.as_deref(),
            form.fee.as_deref(),
            form.error.as_deref(),
        )
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

        if !verify_withdrawal_mac(secret, &event.withdrawal_id, &event.mac_hex) {
            tracing::warn!(
                withdrawal_id = %event.withdrawal_id,
                "payout webhook MAC mismatch"
            );
            return Err(AppError::Unauthorized("Invalid webhook signature".into()));
        }

        let provider = self.config.payout_provider.as_str();
        let payout = self
            .repo
            .find_payout_by_withdrawal(provider, &event.withdrawal_id)
            .await?;
        if payout.is_none() {
            // Authenticated but unmatched: acknowledge with zero
            // mutation so the provider stops retrying.
            tracing::info!(
                withdrawal_id = %event.withdrawal_id,
                "no payout matches withdrawal id, acknowledging"
            );
            return Ok(WebhookAckResponse::ok());
        }

        let received_at = Utc::now();
        let receipt = event.receipt(received_at);

        match &event.status {
            PayoutEventStatus::Confirmed => {
                // Provider-reported settlement time wins; delivery
                // time is the fallback when the provider omits it.
                let confirmed_at = event.processed_at.unwrap_or(received_at);
                let payout = self
                    .repo
                    .confirm_payout_sent(provider, &event.withdrawal_id, receipt, confirmed_at)
                    .await?;
                tracing::info!(
                    payout_id = %payout.id,
                    withdrawal_id = %event.withdrawal_id,
                    "payout confirmed sent"
                );
            }
            PayoutEventStatus::Failed => {
                let payout = self
                    .repo
                    .record_payout_failure(
                        provider,
                        &event.withdrawal_id,
                        &event.failure_message(),
                        receipt,
                    )
                    .await?;
                tracing::warn!(
                    payout_id = %payout.id,
                    withdrawal_id = %event.withdrawal_id,
                    error = %event.failure_message(),
                    "payout failed"
                );
            }
            PayoutEventStatus::Other(raw) => {
                self.repo
                    .record_payout_receipt(provider, &event.withdrawal_id, receipt)
                    .await?;
                tracing::info!(
                    withdrawal_id = %event.withdrawal_id,
                    status = %raw,
                    "unrecognized payout status recorded"
                );
            }
        }

        Ok(WebhookAckResponse::ok())
    }
}

fn purchase_response(p: Purchase) -> PurchaseResponse {
    PurchaseResponse {
        id: p.id,
        game_id: p.game_id,
        status: p.status,
        amount_msat: p.amount_msat,
        invoice_provider: p.invoice_provider,
        invoice_id: p.invoice_id,
        buyer_user_id: p.buyer_user_id,
        guest_receipt_code: p.guest_receipt_code,
        paid_at: p.paid_at,
    }
}
