//! Quote state machine.
//!
//! PENDING → SELECTED → USED, with EXPIRED and CANCELLED reachable from either
//! non-terminal state. Expiry is evaluated lazily against `now` whenever a
//! transition is attempted. Callers persist whatever status results, even when
//! the transition itself fails, so an expiry noticed here becomes durable.

use chowline_core::{DeliveryError, DeliveryResult};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Quote, QuoteStatus, Selection};

impl Quote {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// PENDING → SELECTED.
    pub fn select(&mut self, selection: Selection, now: DateTime<Utc>) -> DeliveryResult<()> {
        match self.status {
            QuoteStatus::Pending => {}
            QuoteStatus::Used => return Err(DeliveryError::QuoteAlreadyUsed(self.id)),
            QuoteStatus::Expired => return Err(DeliveryError::QuoteExpired(self.id)),
            other => {
                return Err(DeliveryError::InvalidQuoteTransition {
                    from: other.to_string(),
                    to: QuoteStatus::Selected.to_string(),
                })
            }
        }

        if self.is_expired_at(now) {
            self.expire(now);
            return Err(DeliveryError::QuoteExpired(self.id));
        }

        self.status = QuoteStatus::Selected;
        self.selected_by = Some(selection.by);
        self.selection_reason = selection.reason;
        self.selected_at = Some(now);
        if selection.confirmed {
            self.confirmed_at = Some(now);
        }
        self.updated_at = now;
        Ok(())
    }

    /// SELECTED → USED, linking the shipment that consumed the quote. Any
    /// other live state is refused as `QuoteAlreadyUsed`.
    pub fn mark_used(&mut self, shipment_id: Uuid, now: DateTime<Utc>) -> DeliveryResult<()> {
        match self.status {
            QuoteStatus::Used | QuoteStatus::Cancelled => {
                Err(DeliveryError::QuoteAlreadyUsed(self.id))
            }
            QuoteStatus::Expired => Err(DeliveryError::QuoteExpired(self.id)),
            QuoteStatus::Pending | QuoteStatus::Selected if self.is_expired_at(now) => {
                self.expire(now);
                Err(DeliveryError::QuoteExpired(self.id))
            }
            QuoteStatus::Pending => Err(DeliveryError::QuoteAlreadyUsed(self.id)),
            QuoteStatus::Selected => {
                self.status = QuoteStatus::Used;
                self.shipment_id = Some(shipment_id);
                self.used_at = Some(now);
                self.updated_at = now;
                Ok(())
            }
        }
    }

    /// Same checks as `mark_used` without changing anything.
    pub fn ensure_consumable(&self, now: DateTime<Utc>) -> DeliveryResult<()> {
        match self.status {
            QuoteStatus::Used | QuoteStatus::Cancelled => {
                Err(DeliveryError::QuoteAlreadyUsed(self.id))
            }
            QuoteStatus::Expired => Err(DeliveryError::QuoteExpired(self.id)),
            _ if self.is_expired_at(now) => Err(DeliveryError::QuoteExpired(self.id)),
            QuoteStatus::Pending => Err(DeliveryError::QuoteAlreadyUsed(self.id)),
            QuoteStatus::Selected => Ok(()),
        }
    }

    /// Any non-terminal state → EXPIRED. Returns whether anything changed.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = QuoteStatus::Expired;
        self.updated_at = now;
        true
    }

    /// Any non-terminal state → CANCELLED. Cancelling twice, or cancelling an
    /// expired quote, is a no-op; a used quote cannot be cancelled.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> DeliveryResult<bool> {
        match self.status {
            QuoteStatus::Used => Err(DeliveryError::QuoteAlreadyUsed(self.id)),
            QuoteStatus::Cancelled | QuoteStatus::Expired => Ok(false),
            QuoteStatus::Pending | QuoteStatus::Selected => {
                self.status = QuoteStatus::Cancelled;
                self.updated_at = now;
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::PackageManifest;
    use crate::models::{Party, ProviderQuote};
    use chowline_core::ProviderId;
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn party(name: &str) -> Party {
        Party {
            name: name.to_string(),
            phone: None,
            email: None,
            address_line: "1 Test Street, NG".to_string(),
            city: None,
            state: None,
            postal_code: None,
            country: "NG".to_string(),
            latitude: None,
            longitude: None,
            address_code: None,
        }
    }

    fn quote(expires_in: Option<Duration>) -> Quote {
        let now = Utc::now();
        Quote::new(
            ProviderId::Regional,
            party("vendor"),
            party("customer"),
            PackageManifest::from_items(vec![], "NGN"),
            ProviderQuote {
                provider_quote_id: None,
                request_token: Some("req-1".to_string()),
                courier_id: Some("c-1".to_string()),
                courier_name: Some("Speedy".to_string()),
                service_code: Some("standard".to_string()),
                service_type: Some("pickup".to_string()),
                fee: Decimal::new(1200, 0),
                currency: "NGN".to_string(),
                insurance_fee: None,
                expires_at: expires_in.map(|d| now + d),
                estimated_delivery_at: None,
                raw: serde_json::json!({}),
            },
            now,
        )
    }

    fn select(quote: &mut Quote, now: DateTime<Utc>) -> DeliveryResult<()> {
        quote.select(
            Selection { by: "customer".to_string(), reason: None, confirmed: false },
            now,
        )
    }

    #[test]
    fn test_happy_path() {
        let mut q = quote(None);
        assert_eq!(q.status, QuoteStatus::Pending);

        select(&mut q, Utc::now()).unwrap();
        assert_eq!(q.status, QuoteStatus::Selected);
        assert_eq!(q.selected_by.as_deref(), Some("customer"));

        let shipment_id = Uuid::new_v4();
        q.mark_used(shipment_id, Utc::now()).unwrap();
        assert_eq!(q.status, QuoteStatus::Used);
        assert_eq!(q.shipment_id, Some(shipment_id));
    }

    #[test]
    fn test_used_at_most_once() {
        let mut q = quote(None);
        select(&mut q, Utc::now()).unwrap();
        q.mark_used(Uuid::new_v4(), Utc::now()).unwrap();

        let first_shipment = q.shipment_id;
        let err = q.mark_used(Uuid::new_v4(), Utc::now()).unwrap_err();
        assert!(matches!(err, DeliveryError::QuoteAlreadyUsed(_)));
        assert_eq!(q.shipment_id, first_shipment);
        assert!(matches!(q.cancel(Utc::now()), Err(DeliveryError::QuoteAlreadyUsed(_))));
        assert!(!q.expire(Utc::now()));
        assert_eq!(q.status, QuoteStatus::Used);
    }

    #[test]
    fn test_mark_used_requires_selection() {
        let mut q = quote(None);
        let err = q.mark_used(Uuid::new_v4(), Utc::now()).unwrap_err();
        assert!(matches!(err, DeliveryError::QuoteAlreadyUsed(_)));
        assert!(matches!(q.ensure_consumable(Utc::now()), Err(DeliveryError::QuoteAlreadyUsed(_))));
        assert_eq!(q.status, QuoteStatus::Pending);
        assert!(q.shipment_id.is_none());
    }

    #[test]
    fn test_expiry_is_checked_lazily() {
        let mut q = quote(Some(Duration::minutes(10)));
        select(&mut q, Utc::now()).unwrap();

        let later = Utc::now() + Duration::minutes(11);
        assert!(q.ensure_consumable(later).is_err());
        assert_eq!(q.status, QuoteStatus::Selected);

        let err = q.mark_used(Uuid::new_v4(), later).unwrap_err();
        assert!(matches!(err, DeliveryError::QuoteExpired(_)));
        assert_eq!(q.status, QuoteStatus::Expired);
        assert!(q.shipment_id.is_none());
    }

    #[test]
    fn test_expired_before_selection() {
        let mut q = quote(Some(Duration::seconds(-1)));
        let err = select(&mut q, Utc::now()).unwrap_err();
        assert!(matches!(err, DeliveryError::QuoteExpired(_)));
        assert_eq!(q.status, QuoteStatus::Expired);
    }

    #[test]
    fn test_select_twice_is_invalid() {
        let mut q = quote(None);
        select(&mut q, Utc::now()).unwrap();
        let err = select(&mut q, Utc::now()).unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidQuoteTransition { .. }));
    }

    #[test]
    fn test_cancel_and_expire_are_idempotent() {
        let mut q = quote(None);
        assert!(q.cancel(Utc::now()).unwrap());
        assert!(!q.cancel(Utc::now()).unwrap());
        assert!(!q.expire(Utc::now()));
        assert_eq!(q.status, QuoteStatus::Cancelled);

        let mut q = quote(None);
        assert!(q.expire(Utc::now()));
        assert!(!q.expire(Utc::now()));
        assert!(!q.cancel(Utc::now()).unwrap());
        assert_eq!(q.status, QuoteStatus::Expired);
    }

    #[test]
    fn test_confirmation_recorded_on_select() {
        let mut q = quote(Some(Duration::minutes(5)));
        q.select(
            Selection { by: "checkout".to_string(), reason: Some("cheapest".to_string()), confirmed: true },
            Utc::now(),
        )
        .unwrap();
        assert!(q.confirmed_at.is_some());
        assert_eq!(q.selection_reason.as_deref(), Some("cheapest"));
    }
}
