//! Domain models for the checkout core.

pub mod entitlement;
pub mod game;
pub mod ledger;
pub mod money;
pub mod payout;
pub mod purchase;
pub mod receipt_code;
pub mod user;
pub mod webhook;

pub use entitlement::{Entitlement, EntitlementId};
pub use game::{Game, GameId};
pub use ledger::{LedgerEntry, LedgerEntryId, LedgerEntryType};
pub use money::Msat;
pub use payout::{Payout, PayoutId, PayoutProfile, PayoutReceipt, PayoutStatus};
pub use purchase::{Purchase, PurchaseId, PurchaseStatus};
pub use user::{User, UserId};
pub use webhook::{PayoutEventStatus, PayoutWebhookEvent};
