//! Strongly-typed inbound payout confirmation event.
//!
//! The provider's raw payload sprawls; this type pins down the
//! optional-field contract once, so the processor's branches stay
//! minimal. Anything the provider sends beyond the recognized
//! vocabulary lands in `PayoutEventStatus::Other` and is persisted as
//! audit data instead of steering control flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::payout::PayoutReceipt;
use crate::error::DomainError;

/// Normalized provider status vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutEventStatus {
    /// The withdrawal settled.
    Confirmed,
    /// The withdrawal failed (`failed` or `error` on the wire).
    Failed,
    /// Unrecognized vocabulary, kept verbatim.
    Other(String),
}

impl PayoutEventStatus {
    fn parse(raw: &str) -> Self {
        match raw {
            "confirmed" => PayoutEventStatus::Confirmed,
            "failed" | "error" => PayoutEventStatus::Failed,
            other => PayoutEventStatus::Other(other.to_string()),
        }
    }
}

/// One inbound confirmation delivery, trimmed and normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutWebhookEvent {
    pub withdrawal_id: String,
    pub mac_hex: String,
    pub status: PayoutEventStatus,
    pub raw_status: String,
    pub processed_at: Option<DateTime<Utc>>,
    pub fee: Option<String>,
    pub error: Option<String>,
}

impl PayoutWebhookEvent {
    /// Builds an event from raw form fields.
    ///
    /// Missing id, MAC or status is a validation failure; the caller
    /// must not have touched storage yet. `processed_at` and `fee` are
    /// best-effort: unparseable values are dropped, not fatal.
    pub fn from_fields(
        id: Option<&str>,
        status: Option<&str>,
        hashed_order: Option<&str>,
        processed_at: Option<&str>,
        fee: Option<&str>,
        error: Option<&str>,
    ) -> Result<Self, DomainError> {
        let withdrawal_id = match id.map(str::trim) {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => return Err(DomainError::ValidationError("missing withdrawal id".into())),
        };
        let mac_hex = match hashed_order.map(str::trim) {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => return Err(DomainError::ValidationError("missing hashed_order".into())),
        };
        let raw_status = match status.map(str::trim) {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => return Err(DomainError::ValidationError("missing status".into())),
        };

        let processed_at = processed_at
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .and_then(|v| {
                DateTime::parse_from_rfc3339(v)
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok()
                    .or_else(|| {
                        v.parse::<i64>()
                            .ok()
                            .and_then(|secs| DateTime::from_timestamp(secs, 0))
                    })
            });

        Ok(Self {
            status: PayoutEventStatus::parse(&raw_status.to_ascii_lowercase()),
            withdrawal_id,
            mac_hex,
            raw_status,
            processed_at,
            fee: fee.map(str::trim).filter(|v| !v.is_empty()).map(String::from),
            error: error
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from),
        })
    }

    /// The error text recorded on a failed payout: the provider's
    /// message, or a generated `<id> status=<status>` fallback.
    pub fn failure_message(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| format!("{} status={}", self.withdrawal_id, self.raw_status))
    }

    /// The audit receipt persisted regardless of branch.
    pub fn receipt(&self, received_at: DateTime<Utc>) -> PayoutReceipt {
        PayoutReceipt {
            withdrawal_id: self.withdrawal_id.clone(),
            reported_status: self.raw_status.clone(),
            processed_at: self.processed_at,
            reported_fee: self.fee.clone(),
            reported_error: self.error.clone(),
            received_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmed_event() {
        let event = PayoutWebhookEvent::from_fields(
            Some(" wd-123 "),
            Some("confirmed"),
            Some("abcd"),
            Some("2024-06-01T00:00:00Z"),
            Some("21"),
            None,
        )
        .unwrap();
        assert_eq!(event.withdrawal_id, "wd-123");
        assert_eq!(event.status, PayoutEventStatus::Confirmed);
        assert!(event.processed_at.is_some());
        assert_eq!(event.fee.as_deref(), Some("21"));
    }

    #[test]
    fn test_error_maps_to_failed() {
        let event =
            PayoutWebhookEvent::from_fields(Some("wd"), Some("error"), Some("ab"), None, None, None)
                .unwrap();
        assert_eq!(event.status, PayoutEventStatus::Failed);
    }

    #[test]
    fn test_unknown_status_kept_verbatim() {
        let event =
            PayoutWebhookEvent::from_fields(Some("wd"), Some("settling"), Some("ab"), None, None, None)
                .unwrap();
        assert_eq!(event.status, PayoutEventStatus::Other("settling".into()));
        assert_eq!(event.raw_status, "settling");
    }

    #[test]
    fn test_missing_fields_rejected() {
        assert!(PayoutWebhookEvent::from_fields(None, Some("confirmed"), Some("ab"), None, None, None).is_err());
        assert!(PayoutWebhookEvent::from_fields(Some("wd"), None, Some("ab"), None, None, None).is_err());
        assert!(PayoutWebhookEvent::from_fields(Some("wd"), Some("confirmed"), None, None, None, None).is_err());
        assert!(PayoutWebhookEvent::from_fields(Some("  "), Some("confirmed"), Some("ab"), None, None, None).is_err());
    }

    #[test]
    fn test_unparseable_processed_at_dropped() {
        let event = PayoutWebhookEvent::from_fields(
            Some("wd"),
            Some("confirmed"),
            Some("ab"),
            Some("not-a-date"),
            None,
            None,
        )
        .unwrap();
        assert!(event.processed_at.is_none());
    }

    #[test]
    fn test_unix_timestamp_processed_at() {
        let event = PayoutWebhookEvent::from_fields(
            Some("wd"),
            Some("confirmed"),
            Some("ab"),
            Some("1717200000"),
            None,
            None,
        )
        .unwrap();
        assert_eq!(event.processed_at.unwrap().timestamp(), 1_717_200_000);
    }

    #[test]
    fn test_failure_message_fallback() {
        let with_error = PayoutWebhookEvent::from_fields(
            Some("wd"),
            Some("failed"),
            Some("ab"),
            None,
            None,
            Some("route not found"),
        )
        .unwrap();
        assert_eq!(with_error.failure_message(), "route not found");

        let without =
            PayoutWebhookEvent::from_fields(Some("wd"), Some("failed"), Some("ab"), None, None, None)
                .unwrap();
        assert_eq!(without.failure_message(), "wd status=failed");
    }
}
