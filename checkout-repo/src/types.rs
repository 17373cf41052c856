//! Database row structs and domain conversion for the SQLite adapter.

use sqlx::FromRow;

use checkout_types::{
    Entitlement, EntitlementId, Game, GameId, LedgerEntry, LedgerEntryId, LedgerEntryType, Msat,
    Payout, PayoutId, PayoutProfile, PayoutStatus, Purchase, PurchaseId, PurchaseStatus, RepoError,
    User, UserId,
};

// ─────────────────────────────────────────────────────────────────────────────
// Parsing helpers
// ─────────────────────────────────────────────────────────────────────────────

pub fn parse_uuid(s: &str) -> Result<uuid::Uuid, RepoError> {
    uuid::Uuid::parse_str(s).map_err(|e| RepoError::Database(e.to_string()))
}

pub fn parse_datetime(s: &str) -> Result<chrono::DateTime<chrono::Utc>, RepoError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| RepoError::Database(e.to_string()))
}

fn parse_opt_datetime(
    s: Option<String>,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, RepoError> {
    s.as_deref().map(parse_datetime).transpose()
}

pub fn parse_purchase_status(s: &str) -> Result<PurchaseStatus, RepoError> {
    match s {
        "PENDING" => Ok(PurchaseStatus::Pending),
        "PAID" => Ok(PurchaseStatus::Paid),
        "EXPIRED" => Ok(PurchaseStatus::Expired),
        "FAILED" => Ok(PurchaseStatus::Failed),
        _ => Err(RepoError::Database(format!("Unknown purchase status: {}", s))),
    }
}

pub fn parse_payout_status(s: &str) -> Result<PayoutStatus, RepoError> {
    match s {
        "SCHEDULED" => Ok(PayoutStatus::Scheduled),
        "SUBMITTED" => Ok(PayoutStatus::Submitted),
        "SENT" => Ok(PayoutStatus::Sent),
        "FAILED" => Ok(PayoutStatus::Failed),
        "RETRYING" => Ok(PayoutStatus::Retrying),
        "CANCELED" => Ok(PayoutStatus::Canceled),
        _ => Err(RepoError::Database(format!("Unknown payout status: {}", s))),
    }
}

pub fn parse_ledger_type(s: &str) -> Result<LedgerEntryType, RepoError> {
    match s {
        "INVOICE_CREATED" => Ok(LedgerEntryType::InvoiceCreated),
        "INVOICE_PAID" => Ok(LedgerEntryType::InvoicePaid),
        "PLATFORM_FEE" => Ok(LedgerEntryType::PlatformFee),
        "DEVELOPER_NET" => Ok(LedgerEntryType::DeveloperNet),
        "PAYOUT_SENT" => Ok(LedgerEntryType::PayoutSent),
        "PAYOUT_FAILED" => Ok(LedgerEntryType::PayoutFailed),
        _ => Err(RepoError::Database(format!("Unknown ledger type: {}", s))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row structs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(FromRow)]
pub struct DbUser {
    pub id: String,
    pub identity: String,
    pub created_at: String,
}

impl DbUser {
    pub fn into_domain(self) -> Result<User, RepoError> {
        Ok(User {
            id: UserId::from_uuid(parse_uuid(&self.id)?),
            identity: self.identity,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

#[derive(FromRow)]
pub struct DbGame {
    pub id: String,
    pub developer_user_id: String,
    pub title: String,
    pub created_at: String,
}

impl DbGame {
    pub fn into_domain(self) -> Result<Game, RepoError> {
        Ok(Game {
            id: GameId::from_uuid(parse_uuid(&self.id)?),
            developer_user_id: UserId::from_uuid(parse_uuid(&self.developer_user_id)?),
            title: self.title,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

#[derive(FromRow)]
pub struct DbPayoutProfile {
    pub developer_user_id: String,
    pub destination_address: String,
    pub updated_at: String,
}

impl DbPayoutProfile {
    pub fn into_domain(self) -> Result<PayoutProfile, RepoError> {
        Ok(PayoutProfile {
            developer_user_id: UserId::from_uuid(parse_uuid(&self.developer_user_id)?),
            destination_address: self.destination_address,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

#[derive(FromRow)]
pub struct DbPurchase {
    pub id: String,
    pub buyer_user_id: Option<String>,
    pub guest_receipt_code: Option<String>,
    pub game_id: String,
    pub invoice_provider: String,
    pub invoice_id: String,
    pub status: String,
    pub amount_msat: i64,
    pub paid_at: Option<String>,
    pub created_at: String,
}

impl DbPurchase {
    pub fn into_domain(self) -> Result<Purchase, RepoError> {
        Ok(Purchase {
            id: PurchaseId::from_uuid(parse_uuid(&self.id)?),
            buyer_user_id: self
                .buyer_user_id
                .as_deref()
                .map(parse_uuid)
                .transpose()?
                .map(UserId::from_uuid),
            guest_receipt_code: self.guest_receipt_code,
            game_id: GameId::from_uuid(parse_uuid(&self.game_id)?),
            invoice_provider: self.invoice_provider,
            invoice_id: self.invoice_id,
            status: parse_purchase_status(&self.status)?,
            amount_msat: Msat::new(self.amount_msat).map_err(RepoError::Domain)?,
            paid_at: parse_opt_datetime(self.paid_at)?,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

#[derive(FromRow)]
pub struct DbLedgerEntry {
    pub id: String,
    pub purchase_id: String,
    pub entry_type: String,
    pub amount_msat: i64,
    pub dedupe_key: Option<String>,
    pub meta: String,
    pub created_at: String,
}

impl DbLedgerEntry {
    pub fn into_domain(self) -> Result<LedgerEntry, RepoError> {
        Ok(LedgerEntry {
            id: LedgerEntryId::from_uuid(parse_uuid(&self.id)?),
            purchase_id: PurchaseId::from_uuid(parse_uuid(&self.purchase_id)?),
            entry_type: parse_ledger_type(&self.entry_type)?,
            amount_msat: Msat::new(self.amount_msat).map_err(RepoError::Domain)?,
            dedupe_key: self.dedupe_key,
            meta: serde_json::from_str(&self.meta)
                .map_err(|e| RepoError::Database(e.to_string()))?,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

#[derive(FromRow)]
pub struct DbEntitlement {
    pub id: String,
    pub purchase_id: String,
    pub buyer_user_id: Option<String>,
    pub guest_receipt_code: Option<String>,
    pub game_id: String,
    pub revoked_at: Option<String>,
    pub created_at: String,
}

impl DbEntitlement {
    pub fn into_domain(self) -> Result<Entitlement, RepoError> {
        Ok(Entitlement {
            id: EntitlementId::from_uuid(parse_uuid(&self.id)?),
            purchase_id: PurchaseId::from_uuid(parse_uuid(&self.purchase_id)?),
            buyer_user_id: self
                .buyer_user_id
                .as_deref()
                .map(parse_uuid)
                .transpose()?
                .map(UserId::from_uuid),
            guest_receipt_code: self.guest_receipt_code,
            game_id: GameId::from_uuid(parse_uuid(&self.game_id)?),
            revoked_at: parse_opt_datetime(self.revoked_at)?,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

#[derive(FromRow)]
pub struct DbPayout {
    pub id: String,
    pub purchase_id: String,
    pub developer_user_id: String,
    pub destination_address: String,
    pub amount_msat: i64,
    pub status: String,
    pub provider: String,
    pub provider_withdrawal_id: Option<String>,
    pub provider_meta: Option<String>,
    pub confirmed_at: Option<String>,
    pub last_error: Option<String>,
    pub idempotency_key: String,
    pub created_at: String,
}

impl DbPayout {
    pub fn into_domain(self) -> Result<Payout, RepoError> {
        Ok(Payout {
            id: PayoutId::from_uuid(parse_uuid(&self.id)?),
            purchase_id: PurchaseId::from_uuid(parse_uuid(&self.purchase_id)?),
            developer_user_id: UserId::from_uuid(parse_uuid(&self.developer_user_id)?),
            destination_address: self.destination_address,
            amount_msat: Msat::new(self.amount_msat).map_err(RepoError::Domain)?,
            status: parse_payout_status(&self.status)?,
            provider: self.provider,
            provider_withdrawal_id: self.provider_withdrawal_id,
            provider_meta: self
                .provider_meta
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e| RepoError::Database(e.to_string()))?,
            confirmed_at: parse_opt_datetime(self.confirmed_at)?,
            last_error: self.last_error,
            idempotency_key: self.idempotency_key,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

/// Entry-type-only row for presence queries.
#[derive(FromRow)]
pub struct DbLedgerType {
    pub entry_type: String,
}
