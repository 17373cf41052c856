//! Data Transfer Objects (DTOs) for requests, responses, and port
//! operation inputs/outputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{
    EntitlementId, GameId, LedgerEntryType, Msat, PayoutId, PurchaseId, PurchaseStatus, UserId,
};

// ─────────────────────────────────────────────────────────────────────────────
// Amount boundary validation
// ─────────────────────────────────────────────────────────────────────────────

/// Deserializes an msat amount from its wire representation.
///
/// Accepts a JSON integer or a digit string; rejects fractional,
/// negative, and overflowing inputs instead of coercing them. This is
/// the single place where "money is an exact integer" is enforced, so
/// nothing downstream has to hope.
pub fn deserialize_msat<'de, D>(deserializer: D) -> Result<Msat, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{Error, Visitor};

    struct MsatVisitor;

    impl Visitor<'_> for MsatVisitor {
        type Value = Msat;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("a non-negative integer msat amount (number or digit string)")
        }

        fn visit_u64<E: Error>(self, v: u64) -> Result<Msat, E> {
            let v = i64::try_from(v).map_err(|_| E::custom("amount_msat overflows"))?;
            Msat::new(v).map_err(E::custom)
        }

        fn visit_i64<E: Error>(self, v: i64) -> Result<Msat, E> {
            Msat::new(v).map_err(E::custom)
        }

        fn visit_f64<E: Error>(self, _v: f64) -> Result<Msat, E> {
            Err(E::custom("amount_msat must be an exact integer"))
        }

        fn visit_str<E: Error>(self, v: &str) -> Result<Msat, E> {
            let v = v.trim();
            let parsed: i64 = v
                .parse()
                .map_err(|_| E::custom("amount_msat must be a non-negative integer string"))?;
            Msat::new(parsed).map_err(E::custom)
        }
    }

    deserializer.deserialize_any(MsatVisitor)
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to list a game.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateGameRequest {
    /// External auth subject of the developer
    #[schema(example = "dev:alice")]
    pub developer_identity: String,
    #[schema(example = "Asteroid Miner")]
    pub title: String,
}

/// Response after listing a game.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GameResponse {
    pub id: GameId,
    pub developer_user_id: UserId,
    pub title: String,
}

/// Request to set a developer's payout destination.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpsertPayoutProfileRequest {
    /// External auth subject of the developer
    #[schema(example = "dev:alice")]
    pub developer_identity: String,
    /// Lightning address the payout worker will pay to
    #[schema(example = "alice@wallet.example")]
    pub destination_address: String,
}

/// Response after setting a payout destination.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PayoutProfileResponse {
    pub developer_user_id: UserId,
    pub destination_address: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Purchase DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to start a checkout.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePurchaseRequest {
    pub game_id: GameId,
    /// Price in millisatoshi; integer or digit string on the wire
    #[serde(deserialize_with = "deserialize_msat")]
    #[schema(value_type = i64, example = 100000)]
    pub amount_msat: Msat,
    /// External auth subject of the buyer; omitted for guest checkout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_identity: Option<String>,
}

/// Response after creating a purchase.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PurchaseResponse {
    pub id: PurchaseId,
    pub game_id: GameId,
    pub status: PurchaseStatus,
    #[schema(value_type = i64)]
    pub amount_msat: Msat,
    pub invoice_provider: String,
    pub invoice_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_user_id: Option<UserId>,
    /// Issued only for guest checkouts; proves ownership until claimed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_receipt_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

/// Inbound payment-provider notification that an invoice settled.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaidNotificationRequest {
    pub invoice_id: String,
    /// Settlement time; defaults to receipt time when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

/// Response to a paid notification, distinguishing first completion
/// from an idempotent repeat.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MarkPaidResponse {
    pub purchase_id: PurchaseId,
    pub status: PurchaseStatus,
    /// True when the purchase was already PAID before this call
    pub already: bool,
    /// True when this call ran ensure-paid-artifacts in repair mode
    pub repaired: bool,
    pub entitlement_id: EntitlementId,
    pub payout_id: PayoutId,
}

// ─────────────────────────────────────────────────────────────────────────────
// Claim DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to link a guest purchase to an identified user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClaimRequest {
    /// Case-insensitive receipt code from the guest checkout
    #[schema(example = "K7QF-2MWN-X9RA-EHT4")]
    pub receipt_code: String,
    /// External auth subject of the claiming user
    pub buyer_identity: String,
}

/// Response after a successful (or idempotently repeated) claim.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClaimResponse {
    pub purchase_id: PurchaseId,
    pub entitlement_id: EntitlementId,
    pub game_id: GameId,
    pub buyer_user_id: UserId,
    /// True when this user had already claimed the purchase
    pub already_claimed: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Payout webhook DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Raw form-encoded payout confirmation callback. All fields optional
/// at the wire level; presence rules are enforced when the fields are
/// normalized into a `PayoutWebhookEvent`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PayoutWebhookForm {
    /// External withdrawal id
    pub id: Option<String>,
    /// `confirmed`, `failed`, `error`, or provider-specific vocabulary
    pub status: Option<String>,
    /// Hex HMAC-SHA256 over the withdrawal id
    pub hashed_order: Option<String>,
    pub processed_at: Option<String>,
    pub fee: Option<String>,
    pub error: Option<String>,
}

/// Minimal acknowledgement body. Every handled outcome - including
/// unmatched ids and unknown statuses - answers with this, so the
/// provider stops redelivering.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookAckResponse {
    #[schema(example = "OK")]
    pub status: String,
}

impl WebhookAckResponse {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ledger DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// One persisted ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LedgerEntryResponse {
    pub id: crate::domain::LedgerEntryId,
    pub purchase_id: PurchaseId,
    pub entry_type: LedgerEntryType,
    #[schema(value_type = i64)]
    pub amount_msat: Msat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedupe_key: Option<String>,
    #[schema(value_type = Object)]
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Port operation inputs/outputs
// ─────────────────────────────────────────────────────────────────────────────

/// Input to `CheckoutRepository::create_purchase`.
#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub game_id: GameId,
    pub buyer_user_id: Option<UserId>,
    pub guest_receipt_code: Option<String>,
    pub invoice_provider: String,
    pub invoice_id: String,
    pub amount_msat: Msat,
}

/// Input to `CheckoutRepository::mark_paid_and_ensure_artifacts`.
#[derive(Debug, Clone)]
pub struct MarkPaidRequest {
    pub invoice_id: String,
    pub paid_at: DateTime<Utc>,
    pub fee_rate_bps: u32,
}

/// Outcome of mark-paid, first completion or idempotent repeat.
#[derive(Debug, Clone)]
pub struct MarkPaidReceipt {
    pub purchase_id: PurchaseId,
    pub already: bool,
    pub repaired: bool,
    pub entitlement_id: EntitlementId,
    pub payout_id: PayoutId,
}

/// Outcome of a guest claim.
#[derive(Debug, Clone)]
pub struct ClaimReceipt {
    pub purchase_id: PurchaseId,
    pub entitlement_id: EntitlementId,
    pub game_id: GameId,
    pub buyer_user_id: UserId,
    pub already_claimed: bool,
}

/// Input to `CheckoutRepository::append_ledger`.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub purchase_id: PurchaseId,
    pub entry_type: LedgerEntryType,
    pub amount_msat: Msat,
    pub dedupe_key: Option<String>,
    pub meta: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct AmountOnly {
        #[serde(deserialize_with = "deserialize_msat")]
        amount_msat: Msat,
    }

    fn parse(json: &str) -> Result<Msat, serde_json::Error> {
        serde_json::from_str::<AmountOnly>(json).map(|a| a.amount_msat)
    }

    #[test]
    fn test_amount_from_integer() {
        assert_eq!(parse(r#"{"amount_msat": 100000}"#).unwrap().value(), 100_000);
        assert_eq!(parse(r#"{"amount_msat": 0}"#).unwrap().value(), 0);
    }

    #[test]
    fn test_amount_from_digit_string() {
        assert_eq!(
            parse(r#"{"amount_msat": "100000"}"#).unwrap().value(),
            100_000
        );
    }

    #[test]
    fn test_fractional_amount_rejected() {
        assert!(parse(r#"{"amount_msat": 100.5}"#).is_err());
        assert!(parse(r#"{"amount_msat": "100.5"}"#).is_err());
    }

    #[test]
    fn test_negative_amount_rejected() {
        assert!(parse(r#"{"amount_msat": -1}"#).is_err());
        assert!(parse(r#"{"amount_msat": "-1"}"#).is_err());
    }

    #[test]
    fn test_overflowing_amount_rejected() {
        // Larger than i64::MAX; must not be coerced
        assert!(parse(r#"{"amount_msat": "99999999999999999999999"}"#).is_err());
        assert!(parse(r#"{"amount_msat": 18446744073709551615}"#).is_err());
    }
}
