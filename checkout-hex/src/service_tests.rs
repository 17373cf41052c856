//! CheckoutService unit tests.

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use checkout_repo::security::sign_withdrawal_id;
    use checkout_types::{
        AppError, CheckoutRepository, ClaimReceipt, ClaimRequest, CreateGameRequest,
        CreatePurchaseRequest, DomainError, Entitlement, EntitlementId, Game, GameId, LedgerEntry,
        LedgerEntryType, MarkPaidReceipt, MarkPaidRequest, Msat, NewLedgerEntry, NewPurchase,
        PaidNotificationRequest, Payout, PayoutId, PayoutProfile, PayoutReceipt, PayoutStatus,
        PayoutWebhookForm, Purchase, PurchaseId, PurchaseStatus, RepoError,
        UpsertPayoutProfileRequest, User, UserId,
    };

    use crate::{CheckoutConfig, CheckoutService};

    const SECRET: &str = "test-webhook-secret";

    /// Simple in-memory repository for testing the service layer.
    ///
    /// Mirrors the storage adapter's idempotency semantics and counts
    /// payout lookups so tests can assert that rejected webhook
    /// deliveries never touch storage.
    pub struct MockRepo {
        users: Mutex<Vec<User>>,
        games: Mutex<HashMap<GameId, Game>>,
        profiles: Mutex<HashMap<UserId, PayoutProfile>>,
        purchases: Mutex<HashMap<PurchaseId, Purchase>>,
        ledger: Mutex<Vec<LedgerEntry>>,
        entitlements: Mutex<HashMap<PurchaseId, Entitlement>>,
        payouts: Mutex<HashMap<PurchaseId, Payout>>,
        withdrawal_lookups: Mutex<u32>,
        /// Force this many receipt-code collisions before accepting.
        duplicate_code_failures: Mutex<usize>,
    }

    impl MockRepo {
        pub fn new() -> Self {
            Self {
                users: Mutex::new(Vec::new()),
                games: Mutex::new(HashMap::new()),
                profiles: Mutex::new(HashMap::new()),
                purchases: Mutex::new(HashMap::new()),
                ledger: Mutex::new(Vec::new()),
                entitlements: Mutex::new(HashMap::new()),
                payouts: Mutex::new(HashMap::new()),
                withdrawal_lookups: Mutex::new(0),
                duplicate_code_failures: Mutex::new(0),
            }
        }

        fn withdrawal_lookup_count(&self) -> u32 {
            *self.withdrawal_lookups.lock().unwrap()
        }

        fn ledger_len(&self) -> usize {
            self.ledger.lock().unwrap().len()
        }

        fn payout_by_withdrawal(&self, withdrawal_id: &str) -> Option<Payout> {
            self.payouts
                .lock()
                .unwrap()
                .values()
                .find(|p| p.provider_withdrawal_id.as_deref() == Some(withdrawal_id))
                .cloned()
        }
    }

    #[async_trait]
    impl CheckoutRepository for MockRepo {
        async fn create_game(
            &self,
            developer_user_id: UserId,
            title: &str,
        ) -> Result<Game, RepoError> {
            let game = Game::new(developer_user_id, title.to_string());
            self.games.lock().unwrap().insert(game.id, game.clone());
            Ok(game)
        }

        async fn get_game(&self, id: GameId) -> Result<Option<Game>, RepoError> {
            Ok(self.games.lock().unwrap().get(&id).cloned())
        }

        async fn resolve_or_create_user(&self, identity: &str) -> Result<User, RepoError> {
            let mut users = self.users.lock().unwrap();
            if let Some(user) = users.iter().find(|u| u.identity == identity) {
                return Ok(user.clone());
            }
            let user = User::new(identity.to_string());
            users.push(user.clone());
            Ok(user)
        }

        async fn upsert_payout_profile(
            &self,
            developer_user_id: UserId,
            destination_address: &str,
        ) -> Result<PayoutProfile, RepoError> {
            let profile = PayoutProfile {
                developer_user_id,
                destination_address: destination_address.to_string(),
                updated_at: Utc::now(),
            };
            self.profiles
                .lock()
                .unwrap()
                .insert(developer_user_id, profile.clone());
            Ok(profile)
        }

        async fn get_payout_profile(
            &self,
            developer_user_id: UserId,
        ) -> Result<Option<PayoutProfile>, RepoError> {
            Ok(self.profiles.lock().unwrap().get(&developer_user_id).cloned())
        }

        async fn create_purchase(&self, req: NewPurchase) -> Result<Purchase, RepoError> {
            {
                let mut failures = self.duplicate_code_failures.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(RepoError::DuplicateReceiptCode);
                }
            }

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

            self.ledger.lock().unwrap().push(LedgerEntry::new(
                purchase.id,
                LedgerEntryType::InvoiceCreated,
                purchase.amount_msat,
                serde_json::json!({ "invoice_id": purchase.invoice_id }),
            ));
            self.purchases
                .lock()
                .unwrap()
                .insert(purchase.id, purchase.clone());
            Ok(purchase)
        }

        async fn get_purchase(&self, id: PurchaseId) -> Result<Option<Purchase>, RepoError> {
            Ok(self.purchases.lock().unwrap().get(&id).cloned())
        }

        async fn find_purchase_by_invoice(
            &self,
            invoice_id: &str,
        ) -> Result<Option<Purchase>, RepoError> {
            Ok(self
                .purchases
                .lock()
                .unwrap()
                .values()
                .find(|p| p.invoice_id == invoice_id)
                .cloned())
        }

        async fn mark_paid_and_ensure_artifacts(
            &self,
            req: MarkPaidRequest,
        ) -> Result<MarkPaidReceipt, RepoError> {
            let purchase = self
                .find_purchase_by_invoice(&req.invoice_id)
                .await?
                .ok_or(RepoError::NotFound)?;

            let already = match purchase.status {
                PurchaseStatus::Pending => false,
                PurchaseStatus::Paid => true,
                status => {
                    return Err(RepoError::Domain(DomainError::InvalidPurchaseStatus {
                        purchase_id: purchase.id,
                        status,
                    }));
                }
            };

            let game = self
                .get_game(purchase.game_id)
                .await?
                .ok_or(RepoError::Domain(DomainError::GameNotFound(purchase.game_id)))?;
            let profile = self
                .get_payout_profile(game.developer_user_id)
                .await?
                .ok_or(RepoError::Domain(DomainError::MissingPayoutProfile {
                    purchase_id: purchase.id,
                    developer_user_id: game.developer_user_id,
                }))?;

            if !already {
                let mut purchases = self.purchases.lock().unwrap();
                let p = purchases.get_mut(&purchase.id).ok_or(RepoError::NotFound)?;
                p.status = PurchaseStatus::Paid;
                p.paid_at = Some(req.paid_at);
            }

            let entitlement_id = {
                let mut entitlements = self.entitlements.lock().unwrap();
                entitlements
                    .entry(purchase.id)
                    .or_insert_with(|| Entitlement {
                        id: EntitlementId::new(),
                        purchase_id: purchase.id,
                        buyer_user_id: purchase.buyer_user_id,
                        guest_receipt_code: purchase.guest_receipt_code.clone(),
                        game_id: purchase.game_id,
                        revoked_at: None,
                        created_at: Utc::now(),
                    })
                    .id
            };

            let (fee, net) = purchase.amount_msat.split_fee(req.fee_rate_bps)?;
            {
                let mut ledger = self.ledger.lock().unwrap();
                let wanted = [
                    (LedgerEntryType::InvoicePaid, purchase.amount_msat),
                    (LedgerEntryType::PlatformFee, fee),
                    (LedgerEntryType::DeveloperNet, net),
                ];
                for (entry_type, amount) in wanted {
                    let present = ledger
                        .iter()
                        .any(|e| e.purchase_id == purchase.id && e.entry_type == entry_type);
                    if !present {
                        ledger.push(LedgerEntry::new(
                            purchase.id,
                            entry_type,
                            amount,
                            serde_json::json!({}),
                        ));
                    }
                }
            }

            let payout_id = {
                let mut payouts = self.payouts.lock().unwrap();
                payouts
                    .entry(purchase.id)
                    .or_insert_with(|| Payout {
                        id: PayoutId::new(),
                        purchase_id: purchase.id,
                        developer_user_id: game.developer_user_id,
                        destination_address: profile.destination_address.clone(),
                        amount_msat: net,
                        status: PayoutStatus::Scheduled,
                        provider: purchase.invoice_provider.clone(),
                        provider_withdrawal_id: None,
                        provider_meta: None,
                        confirmed_at: None,
                        last_error: None,
                        idempotency_key: Payout::idempotency_key_for(purchase.id),
                        created_at: Utc::now(),
                    })
                    .id
            };

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
            let purchase = self
                .purchases
                .lock()
                .unwrap()
                .values()
                .find(|p| p.guest_receipt_code.as_deref() == Some(canonical_code))
                .cloned()
                .ok_or(RepoError::NotFound)?;

            if purchase.status != PurchaseStatus::Paid {
                return Err(RepoError::Domain(DomainError::PurchaseNotPaid {
                    purchase_id: purchase.id,
                    status: purchase.status,
                }));
            }

            let already_claimed = match purchase.buyer_user_id {
                None => {
                    let mut purchases = self.purchases.lock().unwrap();
                    if let Some(p) = purchases.get_mut(&purchase.id) {
                        p.buyer_user_id = Some(user_id);
                    }
                    false
                }
                Some(existing) if existing == user_id => true,
                Some(_) => {
                    return Err(RepoError::Domain(DomainError::ClaimedByOther {
                        purchase_id: purchase.id,
                    }));
                }
            };

            let entitlement_id = {
                let mut entitlements = self.entitlements.lock().unwrap();
                let entitlement =
                    entitlements
                        .entry(purchase.id)
                        .or_insert_with(|| Entitlement {
                            id: EntitlementId::new(),
                            purchase_id: purchase.id,
                            buyer_user_id: None,
                            guest_receipt_code: purchase.guest_receipt_code.clone(),
                            game_id: purchase.game_id,
                            revoked_at: None,
                            created_at: Utc::now(),
                        });
                entitlement.buyer_user_id = Some(user_id);
                entitlement.id
            };

            Ok(ClaimReceipt {
                purchase_id: purchase.id,
                entitlement_id,
                game_id: purchase.game_id,
                buyer_user_id: user_id,
                already_claimed,
            })
        }

        async fn append_ledger(&self, req: NewLedgerEntry) -> Result<LedgerEntry, RepoError> {
            let mut ledger = self.ledger.lock().unwrap();
            if let Some(key) = &req.dedupe_key {
                if let Some(existing) = ledger
                    .iter()
                    .find(|e| e.dedupe_key.as_deref() == Some(key.as_str()))
                {
                    return Ok(existing.clone());
                }
            }
            let entry = LedgerEntry {
                id: checkout_types::LedgerEntryId::new(),
                purchase_id: req.purchase_id,
                entry_type: req.entry_type,
                amount_msat: req.amount_msat,
                dedupe_key: req.dedupe_key,
                meta: req.meta,
                created_at: Utc::now(),
            };
            ledger.push(entry.clone());
            Ok(entry)
        }

        async fn ledger_types_present(
            &self,
            purchase_id: PurchaseId,
            types: &[LedgerEntryType],
        ) -> Result<Vec<LedgerEntryType>, RepoError> {
            let ledger = self.ledger.lock().unwrap();
            Ok(types
                .iter()
                .copied()
                .filter(|t| {
                    ledger
                        .iter()
                        .any(|e| e.purchase_id == purchase_id && e.entry_type == *t)
                })
                .collect())
        }

        async fn list_ledger(
            &self,
            purchase_id: PurchaseId,
        ) -> Result<Vec<LedgerEntry>, RepoError> {
            Ok(self
                .ledger
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.purchase_id == purchase_id)
                .cloned()
                .collect())
        }

        async fn get_entitlement_for_purchase(
            &self,
            purchase_id: PurchaseId,
        ) -> Result<Option<Entitlement>, RepoError> {
            Ok(self.entitlements.lock().unwrap().get(&purchase_id).cloned())
        }

        async fn get_payout_for_purchase(
            &self,
            purchase_id: PurchaseId,
        ) -> Result<Option<Payout>, RepoError> {
            Ok(self.payouts.lock().unwrap().get(&purchase_id).cloned())
        }

        async fn find_payout_by_withdrawal(
            &self,
            provider: &str,
            withdrawal_id: &str,
        ) -> Result<Option<Payout>, RepoError> {
            *self.withdrawal_lookups.lock().unwrap() += 1;
            Ok(self
                .payouts
                .lock()
                .unwrap()
                .values()
                .find(|p| {
                    p.provider == provider
                        && p.provider_withdrawal_id.as_deref() == Some(withdrawal_id)
                })
                .cloned())
        }

        async fn record_payout_submission(
            &self,
            payout_id: PayoutId,
            withdrawal_id: &str,
        ) -> Result<Payout, RepoError> {
            let mut payouts = self.payouts.lock().unwrap();
            let payout = payouts
                .values_mut()
                .find(|p| p.id == payout_id)
                .ok_or(RepoError::NotFound)?;
            if payout.provider_withdrawal_id.is_some() {
                return Err(RepoError::Conflict("withdrawal id already assigned".into()));
            }
            payout.provider_withdrawal_id = Some(withdrawal_id.to_string());
            payout.status = PayoutStatus::Submitted;
            Ok(payout.clone())
        }

        async fn confirm_payout_sent(
            &self,
            provider: &str,
            withdrawal_id: &str,
            receipt: PayoutReceipt,
            confirmed_at: DateTime<Utc>,
        ) -> Result<Payout, RepoError> {
            let mut payouts = self.payouts.lock().unwrap();
            let payout = payouts
                .values_mut()
                .find(|p| {
                    p.provider == provider
                        && p.provider_withdrawal_id.as_deref() == Some(withdrawal_id)
                })
                .ok_or(RepoError::NotFound)?;

            if payout.status != PayoutStatus::Sent {
                payout.status = PayoutStatus::Sent;
                payout.confirmed_at = Some(confirmed_at);
                payout.last_error = None;

                let mut ledger = self.ledger.lock().unwrap();
                let key = LedgerEntryType::PayoutSent.dedupe_key(payout.purchase_id);
                let duplicate = ledger
                    .iter()
                    .any(|e| e.dedupe_key == key && e.dedupe_key.is_some());
                if !duplicate {
                    ledger.push(LedgerEntry::new(
                        payout.purchase_id,
                        LedgerEntryType::PayoutSent,
                        payout.amount_msat,
                        serde_json::json!({ "withdrawal_id": withdrawal_id }),
                    ));
                }
            }
            payout.provider_meta = Some(receipt.to_json());
            Ok(payout.clone())
        }

        async fn record_payout_failure(
            &self,
            provider: &str,
            withdrawal_id: &str,
            error: &str,
            receipt: PayoutReceipt,
        ) -> Result<Payout, RepoError> {
            let mut payouts = self.payouts.lock().unwrap();
            let payout = payouts
                .values_mut()
                .find(|p| {
                    p.provider == provider
                        && p.provider_withdrawal_id.as_deref() == Some(withdrawal_id)
                })
                .ok_or(RepoError::NotFound)?;
            if payout.status != PayoutStatus::Sent {
                payout.status = PayoutStatus::Failed;
                payout.last_error = Some(error.to_string());
            }
            payout.provider_meta = Some(receipt.to_json());
            Ok(payout.clone())
        }

        async fn record_payout_receipt(
            &self,
            provider: &str,
            withdrawal_id: &str,
            receipt: PayoutReceipt,
        ) -> Result<Payout, RepoError> {
            let mut payouts = self.payouts.lock().unwrap();
            let payout = payouts
                .values_mut()
                .find(|p| {
                    p.provider == provider
                        && p.provider_withdrawal_id.as_deref() == Some(withdrawal_id)
                })
                .ok_or(RepoError::NotFound)?;
            payout.provider_meta = Some(receipt.to_json());
            Ok(payout.clone())
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Fixtures
    // ─────────────────────────────────────────────────────────────────────────────

    fn config() -> CheckoutConfig {
        CheckoutConfig {
            fee_rate_bps: 1_000,
            payout_provider: "lightning".to_string(),
            payout_webhook_secret: Some(SECRET.to_string()),
        }
    }

    fn service() -> CheckoutService<MockRepo> {
        CheckoutService::new(MockRepo::new(), config())
    }

    /// Game with a payout profile, ready to sell.
    async fn seed_game(service: &CheckoutService<MockRepo>) -> GameId {
        let game = service
            .create_game(CreateGameRequest {
                developer_identity: "dev:alice".to_string(),
                title: "Asteroid Miner".to_string(),
            })
            .await
            .unwrap();
        service
            .upsert_payout_profile(UpsertPayoutProfileRequest {
                developer_identity: "dev:alice".to_string(),
                destination_address: "alice@wallet.example".to_string(),
            })
            .await
            .unwrap();
        game.id
    }

    /// Paid guest purchase with a payout already submitted under
    /// `withdrawal_id`, the state the webhook tests start from.
    async fn seed_submitted_payout(
        service: &CheckoutService<MockRepo>,
        withdrawal_id: &str,
    ) -> PurchaseId {
        let game_id = seed_game(service).await;
        let purchase = service
            .create_purchase(CreatePurchaseRequest {
                game_id,
                amount_msat: Msat::new(10_000).unwrap(),
                buyer_identity: None,
            })
            .await
            .unwrap();
        service
            .mark_paid(PaidNotificationRequest {
                invoice_id: purchase.invoice_id.clone(),
                paid_at: None,
            })
            .await
            .unwrap();

        let payout = service
            .repo()
            .get_payout_for_purchase(purchase.id)
            .await
            .unwrap()
            .unwrap();
        service
            .repo()
            .record_payout_submission(payout.id, withdrawal_id)
            .await
            .unwrap();
        purchase.id
    }

    fn webhook_form(withdrawal_id: &str, status: &str, mac: &str) -> PayoutWebhookForm {
        PayoutWebhookForm {
            id: Some(withdrawal_id.to_string()),
            status: Some(status.to_string()),
            hashed_order: Some(mac.to_string()),
            processed_at: None,
            fee: None,
            error: None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Catalog & purchase creation
    // ─────────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_create_game_rejects_empty_title() {
        let service = service();
        let result = service
            .create_game(CreateGameRequest {
                developer_identity: "dev:alice".to_string(),
                title: "   ".to_string(),
            })
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_create_purchase_unknown_game() {
        let service = service();
        let result = service
            .create_purchase(CreatePurchaseRequest {
                game_id: GameId::new(),
                amount_msat: Msat::new(10_000).unwrap(),
                buyer_identity: None,
            })
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_guest_purchase_gets_receipt_code() {
        let service = service();
        let game_id = seed_game(&service).await;

        let purchase = service
            .create_purchase(CreatePurchaseRequest {
                game_id,
                amount_msat: Msat::new(10_000).unwrap(),
                buyer_identity: None,
            })
            .await
            .unwrap();

        assert_eq!(purchase.status, PurchaseStatus::Pending);
        assert!(purchase.buyer_user_id.is_none());
        let code = purchase.guest_receipt_code.unwrap();
        assert_eq!(code.len(), 19);
        assert_eq!(code.matches('-').count(), 3);
    }

    #[tokio::test]
    async fn test_buyer_purchase_has_no_receipt_code() {
        let service = service();
        let game_id = seed_game(&service).await;

        let purchase = service
            .create_purchase(CreatePurchaseRequest {
                game_id,
                amount_msat: Msat::new(10_000).unwrap(),
                buyer_identity: Some("buyer:bob".to_string()),
            })
            .await
            .unwrap();

        assert!(purchase.buyer_user_id.is_some());
        assert!(purchase.guest_receipt_code.is_none());
    }

    #[tokio::test]
    async fn test_guest_purchase_survives_receipt_code_collisions() {
        let repo = MockRepo::new();
        *repo.duplicate_code_failures.lock().unwrap() = 2;
        let service = CheckoutService::new(repo, config());
        let game_id = seed_game(&service).await;

        let purchase = service
            .create_purchase(CreatePurchaseRequest {
                game_id,
                amount_msat: Msat::new(10_000).unwrap(),
                buyer_identity: None,
            })
            .await
            .unwrap();

        assert!(purchase.guest_receipt_code.is_some());
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Settlement & claim
    // ─────────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_mark_paid_flow() {
        let service = service();
        let game_id = seed_game(&service).await;
        let purchase = service
            .create_purchase(CreatePurchaseRequest {
                game_id,
                amount_msat: Msat::new(10_000).unwrap(),
                buyer_identity: None,
            })
            .await
            .unwrap();

        let first = service
            .mark_paid(PaidNotificationRequest {
                invoice_id: purchase.invoice_id.clone(),
                paid_at: None,
            })
            .await
            .unwrap();
        assert!(!first.already);
        assert_eq!(first.status, PurchaseStatus::Paid);

        let second = service
            .mark_paid(PaidNotificationRequest {
                invoice_id: purchase.invoice_id,
                paid_at: None,
            })
            .await
            .unwrap();
        assert!(second.already);
        assert!(second.repaired);
        assert_eq!(second.payout_id, first.payout_id);
    }

    #[tokio::test]
    async fn test_claim_normalizes_receipt_code() {
        let service = service();
        let game_id = seed_game(&service).await;
        let purchase = service
            .create_purchase(CreatePurchaseRequest {
                game_id,
                amount_msat: Msat::new(10_000).unwrap(),
                buyer_identity: None,
            })
            .await
            .unwrap();
        service
            .mark_paid(PaidNotificationRequest {
                invoice_id: purchase.invoice_id.clone(),
                paid_at: None,
            })
            .await
            .unwrap();

        // Lowercase with surrounding whitespace must still resolve.
        let sloppy = format!("  {}  ", purchase.guest_receipt_code.unwrap().to_lowercase());
        let claim = service
            .claim(ClaimRequest {
                receipt_code: sloppy,
                buyer_identity: "buyer:bob".to_string(),
            })
            .await
            .unwrap();

        assert!(!claim.already_claimed);
        assert_eq!(claim.purchase_id, purchase.id);
    }

    #[tokio::test]
    async fn test_claim_rejects_malformed_code_without_lookup() {
        let service = service();

        let result = service
            .claim(ClaimRequest {
                receipt_code: "not-a-receipt-code!!".to_string(),
                buyer_identity: "buyer:bob".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Payout confirmation webhook
    // ─────────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_webhook_missing_fields_rejected_before_storage() {
        let service = service();
        seed_submitted_payout(&service, "wd-1").await;
        let baseline = service.repo().withdrawal_lookup_count();

        for form in [
            PayoutWebhookForm {
                id: None,
                ..webhook_form("wd-1", "confirmed", "ab")
            },
            PayoutWebhookForm {
                status: None,
                ..webhook_form("wd-1", "confirmed", "ab")
            },
            PayoutWebhookForm {
                hashed_order: None,
                ..webhook_form("wd-1", "confirmed", "ab")
            },
        ] {
            let result = service.process_payout_webhook(form).await;
            assert!(matches!(result, Err(AppError::BadRequest(_))));
        }

        assert_eq!(service.repo().withdrawal_lookup_count(), baseline);
    }

    #[tokio::test]
    async fn test_webhook_missing_secret_is_misconfigured() {
        let repo = MockRepo::new();
        let service = CheckoutService::new(
            repo,
            CheckoutConfig {
                payout_webhook_secret: None,
                ..config()
            },
        );

        let mac = sign_withdrawal_id(SECRET, "wd-1");
        let result = service
            .process_payout_webhook(webhook_form("wd-1", "confirmed", &mac))
            .await;

        // Never a silent success, and storage is never touched.
        assert!(matches!(result, Err(AppError::Misconfigured(_))));
        assert_eq!(service.repo().withdrawal_lookup_count(), 0);

        // The missing secret is reported before the payload is even
        // parsed, so a malformed delivery gets the same answer.
        let malformed = service
            .process_payout_webhook(PayoutWebhookForm {
                status: None,
                ..webhook_form("wd-1", "confirmed", &mac)
            })
            .await;
        assert!(matches!(malformed, Err(AppError::Misconfigured(_))));
        assert_eq!(service.repo().withdrawal_lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_webhook_bad_mac_unauthorized() {
        let service = service();
        seed_submitted_payout(&service, "wd-1").await;
        let baseline = service.repo().withdrawal_lookup_count();

        let wrong_mac = sign_withdrawal_id("wrong-secret", "wd-1");
        let result = service
            .process_payout_webhook(webhook_form("wd-1", "confirmed", &wrong_mac))
            .await;

        assert!(matches!(result, Err(AppError::Unauthorized(_))));
        assert_eq!(service.repo().withdrawal_lookup_count(), baseline);
    }

    #[tokio::test]
    async fn test_webhook_unmatched_withdrawal_acks_without_mutation() {
        let service = service();
        seed_submitted_payout(&service, "wd-1").await;
        let ledger_before = service.repo().ledger_len();

        let mac = sign_withdrawal_id(SECRET, "wd-unknown");
        let ack = service
            .process_payout_webhook(webhook_form("wd-unknown", "confirmed", &mac))
            .await
            .unwrap();

        assert_eq!(ack.status, "OK");
        assert_eq!(service.repo().ledger_len(), ledger_before);
        let untouched = service.repo().payout_by_withdrawal("wd-1").unwrap();
        assert_eq!(untouched.status, PayoutStatus::Submitted);
    }

    #[tokio::test]
    async fn test_webhook_confirmed_marks_sent_once() {
        let service = service();
        let purchase_id = seed_submitted_payout(&service, "wd-1").await;
        let mac = sign_withdrawal_id(SECRET, "wd-1");

        service
            .process_payout_webhook(webhook_form("wd-1", "confirmed", &mac))
            .await
            .unwrap();
        // Redelivery: acknowledged, no second ledger entry.
        service
            .process_payout_webhook(webhook_form("wd-1", "confirmed", &mac))
            .await
            .unwrap();

        let payout = service.repo().payout_by_withdrawal("wd-1").unwrap();
        assert_eq!(payout.status, PayoutStatus::Sent);
        assert!(payout.confirmed_at.is_some());

        let sent_count = service
            .repo()
            .list_ledger(purchase_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.entry_type == LedgerEntryType::PayoutSent)
            .count();
        assert_eq!(sent_count, 1);
    }

    #[tokio::test]
    async fn test_webhook_failed_records_error() {
        let service = service();
        let purchase_id = seed_submitted_payout(&service, "wd-1").await;
        let mac = sign_withdrawal_id(SECRET, "wd-1");

        let ack = service
            .process_payout_webhook(PayoutWebhookForm {
                error: Some("route not found".to_string()),
                ..webhook_form("wd-1", "failed", &mac)
            })
            .await
            .unwrap();

        assert_eq!(ack.status, "OK");
        let payout = service.repo().payout_by_withdrawal("wd-1").unwrap();
        assert_eq!(payout.status, PayoutStatus::Failed);
        assert_eq!(payout.last_error.as_deref(), Some("route not found"));

        let sent_count = service
            .repo()
            .list_ledger(purchase_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.entry_type == LedgerEntryType::PayoutSent)
            .count();
        assert_eq!(sent_count, 0);
    }

    #[tokio::test]
    async fn test_webhook_unknown_status_acks_and_keeps_receipt() {
        let service = service();
        seed_submitted_payout(&service, "wd-1").await;
        let mac = sign_withdrawal_id(SECRET, "wd-1");

        let ack = service
            .process_payout_webhook(webhook_form("wd-1", "settling", &mac))
            .await
            .unwrap();

        assert_eq!(ack.status, "OK");
        let payout = service.repo().payout_by_withdrawal("wd-1").unwrap();
        // Status untouched, receipt captured for audit.
        assert_eq!(payout.status, PayoutStatus::Submitted);
        let meta = payout.provider_meta.unwrap();
        assert_eq!(meta["reported_status"], "settling");
    }
}
