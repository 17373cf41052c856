//! Purchase domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::game::GameId;
use super::money::Msat;
use super::user::UserId;

/// Unique identifier for a Purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct PurchaseId(Uuid);

impl PurchaseId {
    /// Creates a new random PurchaseId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a PurchaseId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PurchaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PurchaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PurchaseId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle status of a purchase.
///
/// Created PENDING at checkout, flipped to PAID exactly once by the
/// lifecycle manager; EXPIRED and FAILED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseStatus {
    Pending,
    Paid,
    Expired,
    Failed,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "PENDING",
            PurchaseStatus::Paid => "PAID",
            PurchaseStatus::Expired => "EXPIRED",
            PurchaseStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A purchase of one game, backed by one provider invoice.
///
/// Exactly one of `buyer_user_id` / `guest_receipt_code` is set at
/// creation. A guest claim may later set `buyer_user_id` while the
/// receipt code is retained for audit. Otherwise immutable except the
/// single PENDING to PAID transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    pub id: PurchaseId,
    pub buyer_user_id: Option<UserId>,
    pub guest_receipt_code: Option<String>,
    pub game_id: GameId,
    pub invoice_provider: String,
    pub invoice_id: String,
    pub status: PurchaseStatus,
    pub amount_msat: Msat,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Purchase {
    /// Creates a pending purchase for an identified buyer.
    pub fn for_buyer(
        buyer_user_id: UserId,
        game_id: GameId,
        invoice_provider: String,
        invoice_id: String,
        amount_msat: Msat,
    ) -> Self {
        Self {
            id: PurchaseId::new(),
            buyer_user_id: Some(buyer_user_id),
            guest_receipt_code: None,
            game_id,
            invoice_provider,
            invoice_id,
            status: PurchaseStatus::Pending,
            amount_msat,
            paid_at: None,
            created_at: Utc::now(),
        }
    }

    /// Creates a pending guest purchase, claimable later via the
    /// receipt code.
    pub fn for_guest(
        guest_receipt_code: String,
        game_id: GameId,
        invoice_provider: String,
        invoice_id: String,
        amount_msat: Msat,
    ) -> Self {
        Self {
            id: PurchaseId::new(),
            buyer_user_id: None,
            guest_receipt_code: Some(guest_receipt_code),
            game_id,
            invoice_provider,
            invoice_id,
            status: PurchaseStatus::Pending,
            amount_msat,
            paid_at: None,
            created_at: Utc::now(),
        }
    }
}
