//! SQLite repository adapter.
//!
//! All multi-step financial mutations run inside a single database
//! transaction; an early error return drops the transaction, which
//! rolls everything back. Unique constraints are the last line of
//! defense against concurrent duplicates, and the one tolerated race
//! (a duplicate dedupe-key ledger insert) is caught here and swallowed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use std::str::FromStr;
use uuid::Uuid;

use checkout_types::{
    CheckoutRepository, ClaimReceipt, DomainError, Entitlement, EntitlementId, Game, GameId,
    LedgerEntry, LedgerEntryType, MarkPaidReceipt, MarkPaidRequest, Msat, NewLedgerEntry,
    NewPurchase, Payout, PayoutId, PayoutProfile, PayoutReceipt, Purchase, PurchaseId,
    PurchaseStatus, RepoError, User, UserId,
};

use crate::types::{
    DbEntitlement, DbGame, DbLedgerEntry, DbLedgerType, DbPayout, DbPayoutProfile, DbPurchase,
    DbUser,
};

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Repository
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite repository implementation.
pub struct SqliteRepo {
    pool: SqlitePool,
}

fn db_err(e: sqlx::Error) -> RepoError {
    RepoError::Database(e.to_string())
}

fn tx_err(e: sqlx::Error) -> RepoError {
    RepoError::Transaction(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

impl SqliteRepo {
    /// Creates a new SQLite repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        let ddl = include_str!("../migrations/0001_create_tables.sql");
        sqlx::query(ddl).execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_purchase_by_invoice(
        conn: &mut sqlx::SqliteConnection,
        invoice_id: &str,
    ) -> Result<Option<Purchase>, RepoError> {
        let row: Option<DbPurchase> = sqlx::query_as(
            r#"SELECT id, buyer_user_id, guest_receipt_code, game_id, invoice_provider, invoice_id,
                      status, amount_msat, paid_at, created_at
               FROM purchases WHERE invoice_id = ?"#,
        )
        .bind(invoice_id)
        .fetch_optional(conn)
        .await
        .map_err(db_err)?;

        row.map(DbPurchase::into_domain).transpose()
    }

    /// Brings a PAID purchase's dependent records to a complete state.
    /// Runs inside the caller's transaction and is safe to re-run:
    /// the entitlement is an upsert, ledger inserts are limited to the
    /// missing subset (with dedupe keys as the race backstop), and the
    /// payout insert is a no-op once the row exists.
    async fn ensure_paid_artifacts(
        tx: &mut sqlx::SqliteConnection,
        purchase: &Purchase,
        fee_rate_bps: u32,
    ) -> Result<(EntitlementId, PayoutId), RepoError> {
        let purchase_id = purchase.id.to_string();
        let now = Utc::now().to_rfc3339();

        // Developer payout profile gates the whole step: without it we
        // abort and leave the purchase PAID but artifact-less, so a
        // later retry can complete the missing pieces.
        let game: Option<DbGame> = sqlx::query_as(
            r#"SELECT id, developer_user_id, title, created_at FROM games WHERE id = ?"#,
        )
        .bind(purchase.game_id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        let game = game
            .ok_or_else(|| RepoError::Domain(DomainError::GameNotFound(purchase.game_id)))?
            .into_domain()?;

        let profile: Option<DbPayoutProfile> = sqlx::query_as(
            r#"SELECT developer_user_id, destination_address, updated_at
               FROM payout_profiles WHERE developer_user_id = ?"#,
        )
        .bind(game.developer_user_id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        let profile = match profile {
            Some(p) => p.into_domain()?,
            None => {
                return Err(RepoError::Domain(DomainError::MissingPayoutProfile {
                    purchase_id: purchase.id,
                    developer_user_id: game.developer_user_id,
                }));
            }
        };

        // Entitlement: upsert keyed by purchase_id; a repeat only
        // refreshes the buyer link.
        sqlx::query(
            r#"INSERT INTO entitlements (id, purchase_id, buyer_user_id, guest_receipt_code, game_id, revoked_at, created_at)
               VALUES (?, ?, ?, ?, ?, NULL, ?)
               ON CONFLICT(purchase_id) DO UPDATE SET buyer_user_id = excluded.buyer_user_id"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&purchase_id)
        .bind(purchase.buyer_user_id.map(|u| u.to_string()))
        .bind(&purchase.guest_receipt_code)
        .bind(purchase.game_id.to_string())
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let entitlement: DbEntitlement = sqlx::query_as(
            r#"SELECT id, purchase_id, buyer_user_id, guest_receipt_code, game_id, revoked_at, created_at
               FROM entitlements WHERE purchase_id = ?"#,
        )
        .bind(&purchase_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        let entitlement_id = entitlement.into_domain()?.id;

        // Ledger split: create only the missing subset. The per-type
        // presence check is the fine-grained idempotency layer; the
        // dedupe-key unique constraint backstops concurrent repeats.
        let (fee, net) = purchase
            .amount_msat
            .split_fee(fee_rate_bps)
            .map_err(RepoError::Domain)?;

        let present: Vec<DbLedgerType> = sqlx::query_as(
            r#"SELECT entry_type FROM ledger_entries
               WHERE purchase_id = ? AND entry_type IN ('INVOICE_PAID', 'PLATFORM_FEE', 'DEVELOPER_NET')"#,
        )
        .bind(&purchase_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;
        let present: Vec<String> = present.into_iter().map(|r| r.entry_type).collect();

        let wanted: [(LedgerEntryType, Msat, serde_json::Value); 3] = [
            (
                LedgerEntryType::InvoicePaid,
                purchase.amount_msat,
                serde_json::json!({ "invoice_id": purchase.invoice_id }),
            ),
            (
                LedgerEntryType::PlatformFee,
                fee,
                serde_json::json!({ "fee_rate_bps": fee_rate_bps }),
            ),
            (
                LedgerEntryType::DeveloperNet,
                net,
                serde_json::json!({ "fee_rate_bps": fee_rate_bps }),
            ),
        ];

        for (entry_type, amount, meta) in wanted {
            if present.iter().any(|p| p == entry_type.as_str()) {
                continue;
            }
            sqlx::query(
                r#"INSERT INTO ledger_entries (id, purchase_id, entry_type, amount_msat, dedupe_key, meta, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?)
                   ON CONFLICT(dedupe_key) DO NOTHING"#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&purchase_id)
            .bind(entry_type.as_str())
            .bind(amount.value())
            .bind(entry_type.dedupe_key(purchase.id))
            .bind(meta.to_string())
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        // Payout: scheduled once per purchase; never reset a payout
        // that has already progressed past SCHEDULED.
        sqlx::query(
            r#"INSERT INTO payouts (id, purchase_id, developer_user_id, destination_address,
                                    amount_msat, status, provider, idempotency_key, created_at)
               VALUES (?, ?, ?, ?, ?, 'SCHEDULED', ?, ?, ?)
               ON CONFLICT(purchase_id) DO NOTHING"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&purchase_id)
        .bind(game.developer_user_id.to_string())
        .bind(&profile.destination_address)
        .bind(net.value())
        .bind(&purchase.invoice_provider)
        .bind(Payout::idempotency_key_for(purchase.id))
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let payout: DbPayout = Self::fetch_payout_where(
            &mut *tx,
            "purchase_id = ?",
            &[purchase_id.as_str()],
        )
        .await?
        .ok_or(RepoError::NotFound)?;
        let payout_id = payout.into_domain()?.id;

        Ok((entitlement_id, payout_id))
    }

    async fn fetch_payout_where(
        conn: &mut sqlx::SqliteConnection,
        predicate: &str,
        binds: &[&str],
    ) -> Result<Option<DbPayout>, RepoError> {
        let sql = format!(
            r#"SELECT id, purchase_id, developer_user_id, destination_address, amount_msat, status,
                      provider, provider_withdrawal_id, provider_meta, confirmed_at, last_error,
                      idempotency_key, created_at
               FROM payouts WHERE {}"#,
            predicate
        );
        let mut query = sqlx::query_as::<_, DbPayout>(&sql);
        for bind in binds {
            query = query.bind(*bind);
        }
        query.fetch_optional(conn).await.map_err(db_err)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl CheckoutRepository for SqliteRepo {
    async fn create_game(
        &self,
        developer_user_id: UserId,
        title: &str,
    ) -> Result<Game, RepoError> {
        let game = Game::new(developer_user_id, title.to_string());

        sqlx::query(
            r#"INSERT INTO games (id, developer_user_id, title, created_at) VALUES (?, ?, ?, ?)"#,
        )
        .bind(game.id.to_string())
        .bind(game.developer_user_id.to_string())
        .bind(&game.title)
        .bind(game.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(game)
    }

    async fn get_game(&self, id: GameId) -> Result<Option<Game>, RepoError> {
        let row: Option<DbGame> = sqlx::query_as(
            r#"SELECT id, developer_user_id, title, created_at FROM games WHERE id = ?"#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbGame::into_domain).transpose()
    }

    async fn resolve_or_create_user(&self, identity: &str) -> Result<User, RepoError> {
        let candidate = User::new(identity.to_string());

        // Insert-or-ignore keeps this idempotent under concurrent
        // resolution of the same identity.
        sqlx::query(
            r#"INSERT INTO users (id, identity, created_at) VALUES (?, ?, ?)
               ON CONFLICT(identity) DO NOTHING"#,
        )
        .bind(candidate.id.to_string())
        .bind(identity)
        .bind(candidate.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let row: DbUser =
            sqlx::query_as(r#"SELECT id, identity, created_at FROM users WHERE identity = ?"#)
                .bind(identity)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;

        row.into_domain()
    }

    async fn upsert_payout_profile(
        &self,
        developer_user_id: UserId,
        destination_address: &str,
    ) -> Result<PayoutProfile, RepoError> {
        let now = Utc::now();

        sqlx::query(
            r#"INSERT INTO payout_profiles (developer_user_id, destination_address, updated_at)
               VALUES (?, ?, ?)
               ON CONFLICT(developer_user_id) DO UPDATE
               SET destination_address = excluded.destination_address,
                   updated_at = excluded.updated_at"#,
        )
        .bind(developer_user_id.to_string())
        .bind(destination_address)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(PayoutProfile {
            developer_user_id,
            destination_address: destination_address.to_string(),
            updated_at: now,
        })
    }

    async fn get_payout_profile(
        &self,
        developer_user_id: UserId,
    ) -> Result<Option<PayoutProfile>, RepoError> {
        let row: Option<DbPayoutProfile> = sqlx::query_as(
            r#"SELECT developer_user_id, destination_address, updated_at
               FROM payout_profiles WHERE developer_user_id = ?"#,
        )
        .bind(developer_user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbPayoutProfile::into_domain).transpose()
    }

    async fn create_purchase(&self, req: NewPurchase) -> Result<Purchase, RepoError> {
        let purchase = match (req.buyer_user_id, req.guest_receipt_code) {
            (Some(buyer), None) => Purchase::for_buyer(
                buyer,
                req.game_id,
                req.invoice_provider,
                req.invoice_id,
                req.amount_msat,
            ),
            (None, Some(code)) => Purchase::for_guest(
                code,
                req.game_id,
                req.invoice_provider,
                req.invoice_id,
                req.amount_msat,
            ),
            _ => {
                return Err(RepoError::Domain(DomainError::ValidationError(
                    "exactly one of buyer_user_id / guest_receipt_code must be set".into(),
                )));
            }
        };

        let mut db_tx = self.pool.begin().await.map_err(tx_err)?;

        let inserted = sqlx::query(
            r#"INSERT INTO purchases (id, buyer_user_id, guest_receipt_code, game_id,
                                      invoice_provider, invoice_id, status, amount_msat, paid_at, created_at)
               VALUES (?, ?, ?, ?, ?, ?, 'PENDING', ?, NULL, ?)"#,
        )
        .bind(purchase.id.to_string())
        .bind(purchase.buyer_user_id.map(|u| u.to_string()))
        .bind(&purchase.guest_receipt_code)
        .bind(purchase.game_id.to_string())
        .bind(&purchase.invoice_provider)
        .bind(&purchase.invoice_id)
        .bind(purchase.amount_msat.value())
        .bind(purchase.created_at.to_rfc3339())
        .execute(&mut *db_tx)
        .await;

        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                let msg = e.to_string();
                if msg.contains("guest_receipt_code") {
                    return Err(RepoError::DuplicateReceiptCode);
                }
                return Err(RepoError::Conflict(msg));
            }
            return Err(db_err(e));
        }

        sqlx::query(
            r#"INSERT INTO ledger_entries (id, purchase_id, entry_type, amount_msat, dedupe_key, meta, created_at)
               VALUES (?, ?, 'INVOICE_CREATED', ?, NULL, ?, ?)"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(purchase.id.to_string())
        .bind(purchase.amount_msat.value())
        .bind(
            serde_json::json!({
                "invoice_id": purchase.invoice_id,
                "invoice_provider": purchase.invoice_provider,
            })
            .to_string(),
        )
        .bind(purchase.created_at.to_rfc3339())
        .execute(&mut *db_tx)
        .await
        .map_err(db_err)?;

        db_tx.commit().await.map_err(tx_err)?;

        Ok(purchase)
    }

    async fn get_purchase(&self, id: PurchaseId) -> Result<Option<Purchase>, RepoError> {
        let row: Option<DbPurchase> = sqlx::query_as(
            r#"SELECT id, buyer_user_id, guest_receipt_code, game_id, invoice_provider, invoice_id,
                      status, amount_msat, paid_at, created_at
               FROM purchases WHERE id = ?"#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbPurchase::into_domain).transpose()
    }

    async fn find_purchase_by_invoice(
        &self,
        invoice_id: &str,
    ) -> Result<Option<Purchase>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        Self::fetch_purchase_by_invoice(&mut conn, invoice_id).await
    }

    async fn mark_paid_and_ensure_artifacts(
        &self,
        req: MarkPaidRequest,
    ) -> Result<MarkPaidReceipt, RepoError> {
        let mut db_tx = self.pool.begin().await.map_err(tx_err)?;

        let purchase = Self::fetch_purchase_by_invoice(&mut db_tx, &req.invoice_id)
            .await?
            .ok_or(RepoError::NotFound)?;

        let already = match purchase.status {
            PurchaseStatus::Pending => {
                sqlx::query(r#"UPDATE purchases SET status = 'PAID', paid_at = ? WHERE id = ?"#)
                    .bind(req.paid_at.to_rfc3339())
                    .bind(purchase.id.to_string())
                    .execute(&mut *db_tx)
                    .await
                    .map_err(db_err)?;
                false
            }
            // Duplicate delivery: keep the original status and paid_at,
            // re-run the artifact step in repair mode.
            PurchaseStatus::Paid => true,
            status => {
                return Err(RepoError::Domain(DomainError::InvalidPurchaseStatus {
                    purchase_id: purchase.id,
                    status,
                }));
            }
        };

        let (entitlement_id, payout_id) =
            Self::ensure_paid_artifacts(&mut db_tx, &purchase, req.fee_rate_bps).await?;

        db_tx.commit().await.map_err(tx_err)?;

        Ok(MarkPaidReceipt {
            purchase_id: purchase.id,
            already,
            repaired: already,
            entitlement_id,
            payout_id,
        })
    }

    async fn claim_purchase(
        &self,
        canonical_code: &str,
        user_id: UserId,
    ) -> Result<ClaimReceipt, RepoError> {
        let mut db_tx = self.pool.begin().await.map_err(tx_err)?;

        let row: Option<DbPurchase> = sqlx::query_as(
            r#"SELECT id, buyer_user_id, guest_receipt_code, game_id, invoice_provider, invoice_id,
                      status, amount_msat, paid_at, created_at
               FROM purchases WHERE guest_receipt_code = ?"#,
        )
        .bind(canonical_code)
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(db_err)?;
        let purchase = row.ok_or(RepoError::NotFound)?.into_domain()?;

        if purchase.status != PurchaseStatus::Paid {
            return Err(RepoError::Domain(DomainError::PurchaseNotPaid {
                purchase_id: purchase.id,
                status: purchase.status,
            }));
        }

        let already_claimed = match purchase.buyer_user_id {
            None => {
                // First claim: link the purchase, keep the receipt code
                // for audit.
                sqlx::query(r#"UPDATE purchases SET buyer_user_id = ? WHERE id = ?"#)
                    .bind(user_id.to_string())
                    .bind(purchase.id.to_string())
                    .execute(&mut *db_tx)
                    .await
                    .map_err(db_err)?;
                false
            }
            Some(existing) if existing == user_id => true,
            Some(_) => {
                return Err(RepoError::Domain(DomainError::ClaimedByOther {
                    purchase_id: purchase.id,
                }));
            }
        };

        // Create-or-refresh the entitlement's buyer link. The upsert
        // also covers a PAID purchase whose artifact step has not run
        // yet (e.g. the payout profile was missing at mark-paid time).
        sqlx::query(
            r#"INSERT INTO entitlements (id, purchase_id, buyer_user_id, guest_receipt_code, game_id, revoked_at, created_at)
               VALUES (?, ?, ?, ?, ?, NULL, ?)
               ON CONFLICT(purchase_id) DO UPDATE SET buyer_user_id = excluded.buyer_user_id"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(purchase.id.to_string())
        .bind(user_id.to_string())
        .bind(&purchase.guest_receipt_code)
        .bind(purchase.game_id.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *db_tx)
        .await
        .map_err(db_err)?;

        let entitlement: DbEntitlement = sqlx::query_as(
            r#"SELECT id, purchase_id, buyer_user_id, guest_receipt_code, game_id, revoked_at, created_at
               FROM entitlements WHERE purchase_id = ?"#,
        )
        .bind(purchase.id.to_string())
        .fetch_one(&mut *db_tx)
        .await
        .map_err(db_err)?;
        let entitlement = entitlement.into_domain()?;

        db_tx.commit().await.map_err(tx_err)?;

        Ok(ClaimReceipt {
            purchase_id: purchase.id,
            entitlement_id: entitlement.id,
            game_id: purchase.game_id,
            buyer_user_id: user_id,
            already_claimed,
        })
    }

    async fn append_ledger(&self, req: NewLedgerEntry) -> Result<LedgerEntry, RepoError> {
        let entry = LedgerEntry {
            id: checkout_types::LedgerEntryId::new(),
            purchase_id: req.purchase_id,
            entry_type: req.entry_type,
            amount_msat: req.amount_msat,
            dedupe_key: req.dedupe_key,
            meta: req.meta,
            created_at: Utc::now(),
        };

        let inserted = sqlx::query(
            r#"INSERT INTO ledger_entries (id, purchase_id, entry_type, amount_msat, dedupe_key, meta, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(entry.id.to_string())
        .bind(entry.purchase_id.to_string())
        .bind(entry.entry_type.as_str())
        .bind(entry.amount_msat.value())
        .bind(&entry.dedupe_key)
        .bind(entry.meta.to_string())
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(entry),
            // Already-done: return the entry that won the race.
            Err(e) if is_unique_violation(&e) => {
                let key = entry.dedupe_key.as_deref().ok_or_else(|| db_err(e))?;
                let row: DbLedgerEntry = sqlx::query_as(
                    r#"SELECT id, purchase_id, entry_type, amount_msat, dedupe_key, meta, created_at
                       FROM ledger_entries WHERE dedupe_key = ?"#,
                )
                .bind(key)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
                row.into_domain()
            }
            Err(e) => Err(db_err(e)),
        }
    }

    async fn ledger_types_present(
        &self,
        purchase_id: PurchaseId,
        types: &[LedgerEntryType],
    ) -> Result<Vec<LedgerEntryType>, RepoError> {
        let rows: Vec<DbLedgerType> = sqlx::query_as(
            r#"SELECT DISTINCT entry_type FROM ledger_entries WHERE purchase_id = ?"#,
        )
        .bind(purchase_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let present: Vec<String> = rows.into_iter().map(|r| r.entry_type).collect();
        Ok(types
            .iter()
            .copied()
            .filter(|t| present.iter().any(|p| p == t.as_str()))
            .collect())
    }

    async fn list_ledger(&self, purchase_id: PurchaseId) -> Result<Vec<LedgerEntry>, RepoError> {
        let rows: Vec<DbLedgerEntry> = sqlx::query_as(
            r#"SELECT id, purchase_id, entry_type, amount_msat, dedupe_key, meta, created_at
               FROM ledger_entries WHERE purchase_id = ? ORDER BY created_at ASC, id ASC"#,
        )
        .bind(purchase_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DbLedgerEntry::into_domain).collect()
    }

    async fn get_entitlement_for_purchase(
        &self,
        purchase_id: PurchaseId,
    ) -> Result<Option<Entitlement>, RepoError> {
        let row: Option<DbEntitlement> = sqlx::query_as(
            r#"SELECT id, purchase_id, buyer_user_id, guest_receipt_code, game_id, revoked_at, created_at
               FROM entitlements WHERE purchase_id = ?"#,
        )
        .bind(purchase_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbEntitlement::into_domain).transpose()
    }

    async fn get_payout_for_purchase(
        &self,
        purchase_id: PurchaseId,
    ) -> Result<Option<Payout>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        let row =
            Self::fetch_payout_where(&mut conn, "purchase_id = ?", &[&purchase_id.to_string()])
                .await?;
        row.map(DbPayout::into_domain).transpose()
    }

    async fn find_payout_by_withdrawal(
        &self,
        provider: &str,
        withdrawal_id: &str,
    ) -> Result<Option<Payout>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        let row = Self::fetch_payout_where(
            &mut conn,
            "provider = ? AND provider_withdrawal_id = ?",
            &[provider, withdrawal_id],
        )
        .await?;
        row.map(DbPayout::into_domain).transpose()
    }

    async fn record_payout_submission(
        &self,
        payout_id: PayoutId,
        withdrawal_id: &str,
    ) -> Result<Payout, RepoError> {
        let result = sqlx::query(
            r#"UPDATE payouts SET status = 'SUBMITTED', provider_withdrawal_id = ?
               WHERE id = ? AND provider_withdrawal_id IS NULL"#,
        )
        .bind(withdrawal_id)
        .bind(payout_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            let mut conn = self.pool.acquire().await.map_err(db_err)?;
            return match Self::fetch_payout_where(&mut conn, "id = ?", &[&payout_id.to_string()])
                .await?
            {
                Some(row) => {
                    let payout = row.into_domain()?;
                    Err(RepoError::Conflict(format!(
                        "payout {} already has withdrawal id {:?}",
                        payout.id, payout.provider_withdrawal_id
                    )))
                }
                None => Err(RepoError::NotFound),
            };
        }

        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        Self::fetch_payout_where(&mut conn, "id = ?", &[&payout_id.to_string()])
            .await?
            .ok_or(RepoError::NotFound)?
            .into_domain()
    }

    async fn confirm_payout_sent(
        &self,
        provider: &str,
        withdrawal_id: &str,
        receipt: PayoutReceipt,
        confirmed_at: DateTime<Utc>,
    ) -> Result<Payout, RepoError> {
        let mut db_tx = self.pool.begin().await.map_err(tx_err)?;

        // Re-fetch fresh inside the transaction: the lookup the caller
        // did is stale the moment a concurrent redelivery commits.
        let row = Self::fetch_payout_where(
            &mut db_tx,
            "provider = ? AND provider_withdrawal_id = ?",
            &[provider, withdrawal_id],
        )
        .await?;
        let payout = row.ok_or(RepoError::NotFound)?.into_domain()?;

        let receipt_json = receipt.to_json().to_string();

        if payout.status != checkout_types::PayoutStatus::Sent {
            sqlx::query(
                r#"UPDATE payouts SET status = 'SENT', confirmed_at = ?, last_error = NULL, provider_meta = ?
                   WHERE id = ?"#,
            )
            .bind(confirmed_at.to_rfc3339())
            .bind(&receipt_json)
            .bind(payout.id.to_string())
            .execute(&mut *db_tx)
            .await
            .map_err(db_err)?;
        } else {
            // Duplicate confirmation: keep the first confirmed_at, but
            // still record the receipt for audit.
            sqlx::query(r#"UPDATE payouts SET provider_meta = ? WHERE id = ?"#)
                .bind(&receipt_json)
                .bind(payout.id.to_string())
                .execute(&mut *db_tx)
                .await
                .map_err(db_err)?;
        }

        // The ledger entry moves in the same transaction as the status
        // flip. The one expected, swallowed error is the duplicate
        // dedupe-key race.
        let inserted = sqlx::query(
            r#"INSERT INTO ledger_entries (id, purchase_id, entry_type, amount_msat, dedupe_key, meta, created_at)
               VALUES (?, ?, 'PAYOUT_SENT', ?, ?, ?, ?)"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(payout.purchase_id.to_string())
        .bind(payout.amount_msat.value())
        .bind(LedgerEntryType::PayoutSent.dedupe_key(payout.purchase_id))
        .bind(
            serde_json::json!({
                "payout_id": payout.id,
                "provider": provider,
                "withdrawal_id": withdrawal_id,
            })
            .to_string(),
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *db_tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!(withdrawal_id, "PAYOUT_SENT ledger entry already present");
            }
            Err(e) => return Err(db_err(e)),
        }

        db_tx.commit().await.map_err(tx_err)?;

        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        Self::fetch_payout_where(&mut conn, "id = ?", &[&payout.id.to_string()])
            .await?
            .ok_or(RepoError::NotFound)?
            .into_domain()
    }

    async fn record_payout_failure(
        &self,
        provider: &str,
        withdrawal_id: &str,
        error: &str,
        receipt: PayoutReceipt,
    ) -> Result<Payout, RepoError> {
        // SENT is terminal here: a stale failure delivered after the
        // confirmation must not regress the status or contradict the
        // PAYOUT_SENT ledger row.
        let result = sqlx::query(
            r#"UPDATE payouts SET status = 'FAILED', last_error = ?, provider_meta = ?
               WHERE provider = ? AND provider_withdrawal_id = ? AND status != 'SENT'"#,
        )
        .bind(error)
        .bind(receipt.to_json().to_string())
        .bind(provider)
        .bind(withdrawal_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            let kept = sqlx::query(
                r#"UPDATE payouts SET provider_meta = ?
                   WHERE provider = ? AND provider_withdrawal_id = ?"#,
            )
            .bind(receipt.to_json().to_string())
            .bind(provider)
            .bind(withdrawal_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            if kept.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            tracing::warn!(
                withdrawal_id,
                "failure reported for an already sent payout, keeping receipt only"
            );
        }

        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        Self::fetch_payout_where(
            &mut conn,
            "provider = ? AND provider_withdrawal_id = ?",
            &[provider, withdrawal_id],
        )
        .await?
        .ok_or(RepoError::NotFound)?
        .into_domain()
    }

    async fn record_payout_receipt(
        &self,
        provider: &str,
        withdrawal_id: &str,
        receipt: PayoutReceipt,
    ) -> Result<Payout, RepoError> {
        let result = sqlx::query(
            r#"UPDATE payouts SET provider_meta = ?
               WHERE provider = ? AND provider_withdrawal_id = ?"#,
        )
        .bind(receipt.to_json().to_string())
        .bind(provider)
        .bind(withdrawal_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        Self::fetch_payout_where(
            &mut conn,
            "provider = ? AND provider_withdrawal_id = ?",
            &[provider, withdrawal_id],
        )
        .await?
        .ok_or(RepoError::NotFound)?
        .into_domain()
    }
}
