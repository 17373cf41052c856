//! # Checkout Repository
//!
//! Concrete repository implementations (adapters) for the checkout service.
//! This crate provides the SQLite adapter that implements the
//! `CheckoutRepository` port, plus the webhook MAC helpers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use checkout_types::{
    CheckoutRepository, ClaimReceipt, Entitlement, Game, GameId, LedgerEntry, LedgerEntryType,
    MarkPaidReceipt, MarkPaidRequest, NewLedgerEntry, NewPurchase, Payout, PayoutId, PayoutProfile,
    PayoutReceipt, Purchase, PurchaseId, RepoError, User, UserId,
};

pub mod security;
pub mod sqlite;

mod types;


pub use sqlite::SqliteRepo;

/// Repository wrapper around the storage adapter.
pub struct Repo {
    inner: sqlite::SqliteRepo,
}

/// Build and initialize a repository from a database URL.
///
/// This function:
/// 1. Connects to the database
/// 2. Runs migrations to create tables
/// 3. Returns a ready-to-use `Repo`
///
/// # Examples
///
/// ```ignore
/// let repo = build_repo("sqlite://checkout.db?mode=rwc").await?;
/// ```
pub async fn build_repo(database_url: &str) -> anyhow::Result<Repo> {
    Repo::new(database_url).await
}

impl Repo {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let inner = sqlite::SqliteRepo::new(database_url).await?;
        Ok(Self { inner })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Implement CheckoutRepository for Repo (delegation)
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl CheckoutRepository for Repo {
    async fn create_game(
        &self,
        developer_user_id: UserId,
        title: &str,
    ) -> Result<Game, RepoError> {
        self.inner.create_game(developer_user_id, title).await
    }

    async fn get_game(&self, id: GameId) -> Result<Option<Game>, RepoError> {
        self.inner.get_game(id).await
    }

    async fn resolve_or_create_user(&self, identity: &str) -> Result<User, RepoError> {
        self.inner.resolve_or_create_user(identity).await
    }

    async fn upsert_payout_profile(
        &self,
        developer_user_id: UserId,
        destination_address: &str,
    ) -> Result<PayoutProfile, RepoError> {
        self.inner
            .upsert_payout_profile(developer_user_id, destination_address)
            .await
    }

    async fn get_payout_profile(
        &self,
        developer_user_id: UserId,
    ) -> Result<Option<PayoutProfile>, RepoError> {
        self.inner.get_payout_profile(developer_user_id).await
    }

    async fn create_purchase(&self, req: NewPurchase) -> Result<Purchase, RepoError> {
        self.inner.create_purchase(req).await
    }

    async fn get_purchase(&self, id: PurchaseId) -> Result<Option<Purchase>, RepoError> {
        self.inner.get_purchase(id).await
    }

    async fn find_purchase_by_invoice(
        &self,
        invoice_id: &str,
    ) -> Result<Option<Purchase>, RepoError> {
        self.inner.find_purchase_by_invoice(invoice_id).await
    }

    async fn mark_paid_and_ensure_artifacts(
        &self,
        req: MarkPaidRequest,
    ) -> Result<MarkPaidReceipt, RepoError> {
        self.inner.mark_paid_and_ensure_artifacts(req).await
    }

    async fn claim_purchase(
        &self,
        canonical_code: &str,
        user_id: UserId,
    ) -> Result<ClaimReceipt, RepoError> {
        self.inner.claim_purchase(canonical_code, user_id).await
    }

    async fn append_ledger(&self, req: NewLedgerEntry) -> Result<LedgerEntry, RepoError> {
        self.inner.append_ledger(req).await
    }

    async fn ledger_types_present(
        &self,
        purchase_id: PurchaseId,
        types: &[LedgerEntryType],
    ) -> Result<Vec<LedgerEntryType>, RepoError> {
        self.inner.ledger_types_present(purchase_id, types).await
    }

    async fn list_ledger(&self, purchase_id: PurchaseId) -> Result<Vec<LedgerEntry>, RepoError> {
        self.inner.list_ledger(purchase_id).await
    }

    async fn get_entitlement_for_purchase(
        &self,
        purchase_id: PurchaseId,
    ) -> Result<Option<Entitlement>, RepoError> {
        self.inner.get_entitlement_for_purchase(purchase_id).await
    }

    async fn get_payout_for_purchase(
        &self,
        purchase_id: PurchaseId,
    ) -> Result<Option<Payout>, RepoError> {
        self.inner.get_payout_for_purchase(purchase_id).await
    }

    async fn find_payout_by_withdrawal(
        &self,
        provider: &str,
        withdrawal_id: &str,
    ) -> Result<Option<Payout>, RepoError> {
        self.inner
            .find_payout_by_withdrawal(provider, withdrawal_id)
            .await
    }

    async fn record_payout_submission(
        &self,
        payout_id: PayoutId,
        withdrawal_id: &str,
    ) -> Result<Payout, RepoError> {
        self.inner
            .record_payout_submission(payout_id, withdrawal_id)
            .await
    }

    async fn confirm_payout_sent(
        &self,
        provider: &str,
        withdrawal_id: &str,
        receipt: PayoutReceipt,
        confirmed_at: DateTime<Utc>,
    ) -> Result<Payout, RepoError> {
        self.inner
            .confirm_payout_sent(provider, withdrawal_id, receipt, confirmed_at)
            .await
    }

    async fn record_payout_failure(
        &self,
        provider: &str,
        withdrawal_id: &str,
        error: &str,
        receipt: PayoutReceipt,
    ) -> Result<Payout, RepoError> {
        self.inner
            .record_payout_failure(provider, withdrawal_id, error, receipt)
            .await
    }

    async fn record_payout_receipt(
        &self,
        provider: &str,
        withdrawal_id: &str,
        receipt: PayoutReceipt,
    ) -> Result<Payout, RepoError> {
        self.inner
            .record_payout_receipt(provider, withdrawal_id, receipt)
            .await
    }
}
