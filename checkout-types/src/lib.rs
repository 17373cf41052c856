//! # Checkout Types
//!
//! Domain types and port traits for the game-store checkout core.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (Msat, Purchase, LedgerEntry, Payout)
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Data Transfer Objects for API boundaries
//! - `error/` - Domain and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    Entitlement, EntitlementId, Game, GameId, LedgerEntry, LedgerEntryId, LedgerEntryType, Msat,
    Payout, PayoutEventStatus, PayoutId, PayoutProfile, PayoutReceipt, PayoutStatus,
    PayoutWebhookEvent, Purchase, PurchaseId, PurchaseStatus, User, UserId,
};
pub use dto::*;
pub use error::{AppError, DomainError, RepoError};
pub use ports::CheckoutRepository;
