//! Payout domain model and the confirmation receipt audit record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::money::Msat;
use super::purchase::PurchaseId;
use super::user::UserId;

/// Unique identifier for a Payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct PayoutId(Uuid);

impl PayoutId {
    /// Creates a new random PayoutId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a PayoutId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PayoutId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PayoutId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payout status machine.
///
/// From the webhook's perspective the machine is monotone: a
/// confirmation never moves SENT back toward SCHEDULED, and never
/// repeats its side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    Scheduled,
    Submitted,
    Sent,
    Failed,
    Retrying,
    Canceled,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Scheduled => "SCHEDULED",
            PayoutStatus::Submitted => "SUBMITTED",
            PayoutStatus::Sent => "SENT",
            PayoutStatus::Failed => "FAILED",
            PayoutStatus::Retrying => "RETRYING",
            PayoutStatus::Canceled => "CANCELED",
        }
    }
}

impl std::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The obligation (and later, attempt) to pay a developer their net
/// proceeds for one purchase. Submission to the payment rail is an
/// out-of-scope worker; this core schedules the payout and reacts to
/// the provider's confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    pub id: PayoutId,
    pub purchase_id: PurchaseId,
    pub developer_user_id: UserId,
    pub destination_address: String,
    pub amount_msat: Msat,
    pub status: PayoutStatus,
    pub provider: String,
    pub provider_withdrawal_id: Option<String>,
    /// Last webhook receipt, kept verbatim for audit.
    pub provider_meta: Option<serde_json::Value>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

impl Payout {
    /// The canonical idempotency key for a purchase's payout.
    pub fn idempotency_key_for(purchase_id: PurchaseId) -> String {
        format!("purchase:{}", purchase_id)
    }
}

/// A developer's standing payout destination. Looked up by
/// ensure-paid-artifacts; its absence aborts the whole operation so a
/// later retry can complete the missing pieces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutProfile {
    pub developer_user_id: UserId,
    pub destination_address: String,
    pub updated_at: DateTime<Utc>,
}

/// Audit projection of one inbound confirmation delivery.
///
/// Persisted into `Payout::provider_meta` on every authenticated,
/// matched delivery - confirmed, failed, or unrecognized - so anomalous
/// vocabulary is captured rather than dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutReceipt {
    pub withdrawal_id: String,
    pub reported_status: String,
    pub processed_at: Option<DateTime<Utc>>,
    pub reported_fee: Option<String>,
    pub reported_error: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl PayoutReceipt {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "withdrawal_id": self.withdrawal_id,
            "reported_status": self.reported_status,
            "processed_at": self.processed_at,
            "reported_fee": self.reported_fee,
            "reported_error": self.reported_error,
            "received_at": self.received_at,
        })
    }
}
