//! Error types for the checkout core.

use crate::domain::{GameId, PurchaseId, PurchaseStatus, UserId};

/// Domain-level errors (business rule violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Amount overflows the millisatoshi range")]
    AmountOverflow,

    #[error("Fee rate {0} bps exceeds 100%")]
    InvalidFeeRate(u32),

    #[error("Game not found: {0}")]
    GameNotFound(GameId),

    #[error("Purchase {purchase_id} has status {status}, expected PENDING or PAID")]
    InvalidPurchaseStatus {
        purchase_id: PurchaseId,
        status: PurchaseStatus,
    },

    #[error("Developer {developer_user_id} has no payout profile (purchase {purchase_id})")]
    MissingPayoutProfile {
        purchase_id: PurchaseId,
        developer_user_id: UserId,
    },

    #[error("Purchase {purchase_id} is not paid (status {status})")]
    PurchaseNotPaid {
        purchase_id: PurchaseId,
        status: PurchaseStatus,
    },

    #[error("Purchase {purchase_id} was already claimed by another user")]
    ClaimedByOther { purchase_id: PurchaseId },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    /// Guest receipt code collided with an existing purchase. The
    /// caller regenerates silently; this never reaches an API client.
    #[error("Guest receipt code already in use")]
    DuplicateReceiptCode,

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Application-level errors (for HTTP responses).
///
/// Maps cleanly to HTTP status codes. Conflicts carry a
/// machine-readable `reason` so operators and retrying clients can
/// branch without parsing prose.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict ({reason}): {detail}")]
    Conflict { reason: &'static str, detail: String },

    /// The backing store could not be reached. Distinct from NotFound
    /// so "the row is absent" and "we could not ask" never blur.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Required configuration is absent. Never degrades to success.
    #[error("Misconfigured: {0}")]
    Misconfigured(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(DomainError::ValidationError(msg)) => AppError::BadRequest(msg),
            RepoError::Domain(e @ DomainError::GameNotFound(_)) => AppError::NotFound(e.to_string()),
            RepoError::Domain(e @ DomainError::InvalidPurchaseStatus { .. }) => AppError::Conflict {
                reason: "invalid_status",
                detail: e.to_string(),
            },
            RepoError::Domain(e @ DomainError::MissingPayoutProfile { .. }) => AppError::Conflict {
                reason: "missing_payout_profile",
                detail: e.to_string(),
            },
            RepoError::Domain(e @ DomainError::PurchaseNotPaid { .. }) => AppError::Conflict {
                reason: "not_paid",
                detail: e.to_string(),
            },
            RepoError::Domain(e @ DomainError::ClaimedByOther { .. }) => AppError::Conflict {
                reason: "claimed_by_other",
                detail: e.to_string(),
            },
            RepoError::Domain(e) => AppError::BadRequest(e.to_string()),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::DuplicateReceiptCode => {
                // Regeneration is the caller's job; reaching here means
                // the retry budget ran out.
                AppError::Internal("receipt code generation exhausted".into())
            }
            RepoError::Database(e) => AppError::StoreUnavailable(e),
            RepoError::Transaction(e) => AppError::StoreUnavailable(e),
            RepoError::Conflict(e) => AppError::Conflict {
                reason: "conflict",
                detail: e,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_errors_map_to_store_unavailable() {
        let err: AppError = RepoError::Database("connection refused".into()).into();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
    }

    #[test]
    fn test_missing_profile_maps_to_conflict_reason() {
        let err: AppError = RepoError::Domain(DomainError::MissingPayoutProfile {
            purchase_id: PurchaseId::new(),
            developer_user_id: UserId::new(),
        })
        .into();
        match err {
            AppError::Conflict { reason, .. } => assert_eq!(reason, "missing_payout_profile"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
