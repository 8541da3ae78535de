//! Provider status vocabularies and the forward-only rule.

use chowline_core::{DeliveryError, DeliveryResult, ProviderId};

use crate::models::ShipmentStatus;

/// Result of translating a provider status string. Translation is total:
/// anything outside the provider's table comes back as `Unrecognized`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappedStatus {
    Known(ShipmentStatus),
    Unrecognized(String),
}

impl MappedStatus {
    /// `Unrecognized` becomes the non-fatal `UnrecognizedProviderStatus`.
    pub fn into_result(self) -> DeliveryResult<ShipmentStatus> {
        match self {
            MappedStatus::Known(status) => Ok(status),
            MappedStatus::Unrecognized(raw) => Err(DeliveryError::UnrecognizedProviderStatus(raw)),
        }
    }
}

fn normalize(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect()
}

fn regional(status: &str) -> Option<ShipmentStatus> {
    use ShipmentStatus::*;
    Some(match status {
        "pending" | "created" | "confirmed" | "awaiting_pickup" => Pending,
        "picked_up" | "pickedup" => PickedUp,
        "in_transit" | "intransit" => InTransit,
        "out_for_delivery" => OutForDelivery,
        "completed" | "delivered" => Delivered,
        "failed" | "failed_delivery" => Failed,
        "cancelled" | "canceled" => Cancelled,
        "returned" | "returned_to_sender" => Returned,
        _ => return None,
    })
}

fn international(status: &str) -> Option<ShipmentStatus> {
    use ShipmentStatus::*;
    Some(match status {
        // "pickup" means a courier is heading to the vendor; nothing has left yet.
        "pending" | "pickup" => Pending,
        "pickup_complete" => PickedUp,
        "dropoff" => OutForDelivery,
        "delivered" => Delivered,
        "canceled" | "cancelled" => Cancelled,
        "returned" => Returned,
        _ => return None,
    })
}

pub fn translate(provider: ProviderId, raw: &str) -> MappedStatus {
    let normalized = normalize(raw);
    let known = match provider {
        ProviderId::Regional => regional(&normalized),
        ProviderId::International => international(&normalized),
    };
    match known {
        Some(status) => MappedStatus::Known(status),
        None => MappedStatus::Unrecognized(raw.to_string()),
    }
}

fn progress_rank(status: ShipmentStatus) -> Option<u8> {
    match status {
        ShipmentStatus::Pending => Some(0),
        ShipmentStatus::PickedUp => Some(1),
        ShipmentStatus::InTransit => Some(2),
        ShipmentStatus::OutForDelivery => Some(3),
        _ => None,
    }
}

/// Whether `next` may replace `current`. Terminal statuses are sticky,
/// progress never moves backwards, and a failed attempt may be retried or
/// returned but not reset to PENDING.
pub fn supersedes(current: ShipmentStatus, next: ShipmentStatus) -> bool {
    if current == next || current.is_terminal() {
        return false;
    }
    if current == ShipmentStatus::Failed {
        return next != ShipmentStatus::Pending;
    }
    match (progress_rank(current), progress_rank(next)) {
        (Some(from), Some(to)) => to > from,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ShipmentStatus::*;

    #[test]
    fn test_regional_table() {
        let cases = [
            ("pending", Pending),
            ("picked_up", PickedUp),
            ("In Transit", InTransit),
            ("out-for-delivery", OutForDelivery),
            ("completed", Delivered),
            ("DELIVERED", Delivered),
            ("failed", Failed),
            ("cancelled", Cancelled),
            ("returned", Returned),
        ];
        for (raw, expected) in cases {
            assert_eq!(translate(ProviderId::Regional, raw), MappedStatus::Known(expected), "{raw}");
        }
    }

    #[test]
    fn test_international_table() {
        let cases = [
            ("pending", Pending),
            ("pickup", Pending),
            ("pickup_complete", PickedUp),
            ("dropoff", OutForDelivery),
            ("delivered", Delivered),
            ("canceled", Cancelled),
            ("returned", Returned),
        ];
        for (raw, expected) in cases {
            assert_eq!(translate(ProviderId::International, raw), MappedStatus::Known(expected), "{raw}");
        }
    }

    #[test]
    fn test_unknown_strings_map_to_sentinel() {
        for provider in ProviderId::ALL {
            for raw in ["", "teleported", "delivered!", "42"] {
                assert_eq!(
                    translate(provider, raw),
                    MappedStatus::Unrecognized(raw.to_string())
                );
            }
        }
        // vocabularies are per provider
        assert!(matches!(
            translate(ProviderId::International, "in_transit"),
            MappedStatus::Unrecognized(_)
        ));
    }

    #[test]
    fn test_progress_only_moves_forward() {
        assert!(supersedes(Pending, PickedUp));
        assert!(supersedes(PickedUp, OutForDelivery));
        assert!(!supersedes(OutForDelivery, InTransit));
        assert!(!supersedes(InTransit, Pending));
        assert!(!supersedes(PickedUp, PickedUp));
    }

    #[test]
    fn test_terminal_statuses_are_sticky() {
        for terminal in [Delivered, Cancelled, Returned] {
            for next in [Pending, PickedUp, InTransit, OutForDelivery, Delivered, Failed, Cancelled, Returned] {
                assert!(!supersedes(terminal, next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn test_failed_allows_reattempt_or_return() {
        assert!(supersedes(InTransit, Failed));
        assert!(supersedes(Failed, OutForDelivery));
        assert!(supersedes(Failed, Returned));
        assert!(supersedes(Failed, Delivered));
        assert!(!supersedes(Failed, Pending));
    }
}
