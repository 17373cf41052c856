//! Append-only ledger of monetary events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::money::Msat;
use super::purchase::PurchaseId;

/// Unique identifier for a LedgerEntry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct LedgerEntryId(Uuid);

impl LedgerEntryId {
    /// Creates a new random LedgerEntryId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a LedgerEntryId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for LedgerEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LedgerEntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The monetary event a ledger entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEntryType {
    InvoiceCreated,
    InvoicePaid,
    PlatformFee,
    DeveloperNet,
    PayoutSent,
    PayoutFailed,
}

impl LedgerEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryType::InvoiceCreated => "INVOICE_CREATED",
            LedgerEntryType::InvoicePaid => "INVOICE_PAID",
            LedgerEntryType::PlatformFee => "PLATFORM_FEE",
            LedgerEntryType::DeveloperNet => "DEVELOPER_NET",
            LedgerEntryType::PayoutSent => "PAYOUT_SENT",
            LedgerEntryType::PayoutFailed => "PAYOUT_FAILED",
        }
    }

    /// The dedupe key making this entry at-most-once per purchase, or
    /// None for types without a per-purchase uniqueness requirement.
    pub fn dedupe_key(&self, purchase_id: PurchaseId) -> Option<String> {
        let prefix = match self {
            LedgerEntryType::InvoicePaid => "invoice_paid",
            LedgerEntryType::PlatformFee => "platform_fee",
            LedgerEntryType::DeveloperNet => "developer_net",
            LedgerEntryType::PayoutSent => "payout_sent",
            LedgerEntryType::InvoiceCreated | LedgerEntryType::PayoutFailed => return None,
        };
        Some(format!("{}:{}", prefix, purchase_id))
    }
}

impl std::fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable accounting record of one monetary event.
///
/// Entries are append-only; a dedupe key collision means the event was
/// already recorded and the append is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub purchase_id: PurchaseId,
    pub entry_type: LedgerEntryType,
    pub amount_msat: Msat,
    pub dedupe_key: Option<String>,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Builds a new entry with the type's canonical dedupe key.
    pub fn new(
        purchase_id: PurchaseId,
        entry_type: LedgerEntryType,
        amount_msat: Msat,
        meta: serde_json::Value,
    ) -> Self {
        Self {
            id: LedgerEntryId::new(),
            purchase_id,
            entry_type,
            amount_msat,
            dedupe_key: entry_type.dedupe_key(purchase_id),
            meta,
            created_at: Utc::now(),
        }
    }
}
