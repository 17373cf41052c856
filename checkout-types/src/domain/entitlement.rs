//! Entitlement domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::game::GameId;
use super::purchase::PurchaseId;
use super::user::UserId;

/// Unique identifier for an Entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct EntitlementId(Uuid);

impl EntitlementId {
    /// Creates a new random EntitlementId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an EntitlementId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntitlementId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntitlementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Durable grant of download access to all releases of a game, tied to
/// exactly one PAID purchase. Upserts are keyed by `purchase_id`, so a
/// repeated payment confirmation only refreshes the buyer link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entitlement {
    pub id: EntitlementId,
    pub purchase_id: PurchaseId,
    pub buyer_user_id: Option<UserId>,
    pub guest_receipt_code: Option<String>,
    pub game_id: GameId,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Entitlement {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}
