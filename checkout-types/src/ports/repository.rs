//! Repository port trait.
//!
//! This is the primary port in our hexagonal architecture.
//! Adapters (SQLite, InMemory) will implement this trait.

use chrono::{DateTime, Utc};

use crate::domain::{
    Entitlement, Game, GameId, LedgerEntry, LedgerEntryType, Payout, PayoutId, PayoutProfile,
    PayoutReceipt, Purchase, PurchaseId, User, UserId,
};
use crate::dto::{ClaimReceipt, MarkPaidReceipt, MarkPaidRequest, NewLedgerEntry, NewPurchase};
use crate::error::RepoError;

/// The main repository port for checkout operations.
///
/// Every read-modify-write sequence that must be atomic (mark-paid
/// plus ensure-artifacts; confirm-payout plus ledger append) executes
/// inside a single storage transaction in the implementation; no
/// status flip or ledger row is ever persisted outside one.
#[async_trait::async_trait]
pub trait CheckoutRepository: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────────
    // Catalog & identity
    // ─────────────────────────────────────────────────────────────────────────────

    /// Lists a game for a developer.
    async fn create_game(&self, developer_user_id: UserId, title: &str)
    -> Result<Game, RepoError>;

    /// Gets a game by ID.
    async fn get_game(&self, id: GameId) -> Result<Option<Game>, RepoError>;

    /// Resolves an external auth subject to a user, creating the row on
    /// first sight. Idempotent on `identity`.
    async fn resolve_or_create_user(&self, identity: &str) -> Result<User, RepoError>;

    /// Creates or replaces a developer's payout destination.
    async fn upsert_payout_profile(
        &self,
        developer_user_id: UserId,
        destination_address: &str,
    ) -> Result<PayoutProfile, RepoError>;

    /// Gets a developer's payout destination.
    async fn get_payout_profile(
        &self,
        developer_user_id: UserId,
    ) -> Result<Option<PayoutProfile>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Purchase lifecycle (MUST be atomic)
    // ─────────────────────────────────────────────────────────────────────────────

    /// Atomically creates a PENDING purchase plus its INVOICE_CREATED
    /// ledger entry. A guest receipt code collision surfaces as
    /// `RepoError::DuplicateReceiptCode` so the caller can regenerate.
    async fn create_purchase(&self, req: NewPurchase) -> Result<Purchase, RepoError>;

    /// Gets a purchase by ID.
    async fn get_purchase(&self, id: PurchaseId) -> Result<Option<Purchase>, RepoError>;

    /// Finds a purchase by its unique provider invoice id.
    async fn find_purchase_by_invoice(
        &self,
        invoice_id: &str,
    ) -> Result<Option<Purchase>, RepoError>;

    /// The core idempotent operation: flips PENDING to PAID (at most
    /// once) and brings the paid artifacts - entitlement, ledger split,
    /// scheduled payout - to a complete state, in one transaction.
    /// Safe to re-run; an already-PAID purchase gets repair mode.
    async fn mark_paid_and_ensure_artifacts(
        &self,
        req: MarkPaidRequest,
    ) -> Result<MarkPaidReceipt, RepoError>;

    /// Links a guest purchase's entitlement to a resolved user. The
    /// code must already be normalized to canonical form. Idempotent
    /// for the same user; `ClaimedByOther` for a different one.
    async fn claim_purchase(
        &self,
        canonical_code: &str,
        user_id: UserId,
    ) -> Result<ClaimReceipt, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Ledger
    // ─────────────────────────────────────────────────────────────────────────────

    /// Appends one immutable ledger entry. A dedupe-key collision is
    /// treated as already-done: the existing entry is returned and the
    /// uniqueness violation is swallowed, not raised.
    async fn append_ledger(&self, req: NewLedgerEntry) -> Result<LedgerEntry, RepoError>;

    /// Returns which of the given entry types already exist for a
    /// purchase; used to compute the missing subset before inserting.
    async fn ledger_types_present(
        &self,
        purchase_id: PurchaseId,
        types: &[LedgerEntryType],
    ) -> Result<Vec<LedgerEntryType>, RepoError>;

    /// Lists all ledger entries for a purchase, oldest first.
    async fn list_ledger(&self, purchase_id: PurchaseId) -> Result<Vec<LedgerEntry>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Entitlements & payouts
    // ─────────────────────────────────────────────────────────────────────────────

    /// Gets the entitlement for a purchase, if the purchase is paid.
    async fn get_entitlement_for_purchase(
        &self,
        purchase_id: PurchaseId,
    ) -> Result<Option<Entitlement>, RepoError>;

    /// Gets the payout for a purchase.
    async fn get_payout_for_purchase(
        &self,
        purchase_id: PurchaseId,
    ) -> Result<Option<Payout>, RepoError>;

    /// Finds a payout by the provider's withdrawal id.
    async fn find_payout_by_withdrawal(
        &self,
        provider: &str,
        withdrawal_id: &str,
    ) -> Result<Option<Payout>, RepoError>;

    /// Records that the (out-of-scope) payout worker submitted the
    /// withdrawal: attaches the provider withdrawal id and moves
    /// SCHEDULED to SUBMITTED.
    async fn record_payout_submission(
        &self,
        payout_id: PayoutId,
        withdrawal_id: &str,
    ) -> Result<Payout, RepoError>;

    /// Confirms a payout as SENT, in one transaction: re-fetches the
    /// payout fresh, transitions to SENT at most once (a duplicate
    /// confirmation only refreshes the audit receipt), and appends the
    /// PAYOUT_SENT ledger entry under its dedupe key, swallowing the
    /// duplicate-key race.
    async fn confirm_payout_sent(
        &self,
        provider: &str,
        withdrawal_id: &str,
        receipt: PayoutReceipt,
        confirmed_at: DateTime<Utc>,
    ) -> Result<Payout, RepoError>;

    /// Marks a payout FAILED with the provider's error message and
    /// persists the audit receipt. No ledger entry: a failure is not a
    /// monetary event, but the receipt is kept for investigation.
    /// A payout that has already reached SENT keeps its status; the
    /// stale failure is recorded as a receipt only.
    async fn record_payout_failure(
        &self,
        provider: &str,
        withdrawal_id: &str,
        error: &str,
        receipt: PayoutReceipt,
    ) -> Result<Payout, RepoError>;

    /// Persists the audit receipt without any status change; used for
    /// unrecognized provider vocabulary.
    async fn record_payout_receipt(
        &self,
        provider: &str,
        withdrawal_id: &str,
        receipt: PayoutReceipt,
    ) -> Result<Payout, RepoError>;
}
