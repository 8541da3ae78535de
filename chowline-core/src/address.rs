use async_trait::async_trait;
use chowline_shared::Masked;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{DeliveryResult, ProviderId};

/// An address record owned by the address book. Delivery code only reads it,
/// apart from caching provider-issued address codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub id: Uuid,
    pub contact_name: String,
    pub phone: Option<Masked<String>>,
    pub email: Option<Masked<String>>,
    pub line1: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub provider_codes: Vec<CachedAddressCode>,
}

/// Provider-issued address code, pinned to the address fields it was issued for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAddressCode {
    pub provider: ProviderId,
    pub code: String,
    pub fingerprint: String,
    pub validated_at: DateTime<Utc>,
}

impl Address {
    /// Digest of every field a provider looks at when validating. Any edit
    /// changes it, which is what invalidates cached codes.
    pub fn fingerprint(&self) -> String {
        let lat = self.latitude.map(|v| format!("{:.6}", v)).unwrap_or_default();
        let lng = self.longitude.map(|v| format!("{:.6}", v)).unwrap_or_default();
        let parts = [
            self.contact_name.trim(),
            self.phone.as_ref().map(|p| p.expose().as_str()).unwrap_or(""),
            self.email.as_ref().map(|e| e.expose().as_str()).unwrap_or(""),
            self.line1.trim(),
            self.city.as_deref().unwrap_or(""),
            self.state.as_deref().unwrap_or(""),
            self.postal_code.as_deref().unwrap_or(""),
            self.country.trim(),
            lat.as_str(),
            lng.as_str(),
        ];

        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.to_lowercase().as_bytes());
            hasher.update([0x1f]);
        }
        format!("{:x}", hasher.finalize())
    }

    /// The cached code for `provider`, if one exists and still matches the
    /// current address fields.
    pub fn cached_code(&self, provider: ProviderId) -> Option<&CachedAddressCode> {
        let fingerprint = self.fingerprint();
        self.provider_codes
            .iter()
            .find(|c| c.provider == provider && c.fingerprint == fingerprint)
    }

    /// Replace any code previously cached for the same provider.
    pub fn remember_code(&mut self, code: CachedAddressCode) {
        self.provider_codes.retain(|c| c.provider != code.provider);
        self.provider_codes.push(code);
    }

    pub fn single_line(&self) -> String {
        let mut parts = vec![self.line1.trim().to_string()];
        for part in [&self.city, &self.state, &self.postal_code].into_iter().flatten() {
            if !part.trim().is_empty() {
                parts.push(part.trim().to_string());
            }
        }
        parts.push(self.country.trim().to_string());
        parts.join(", ")
    }
}

/// External address storage.
#[async_trait]
pub trait AddressBook: Send + Sync {
    async fn get_address(&self, id: Uuid) -> DeliveryResult<Option<Address>>;

    async fn update_provider_address_code(
        &self,
        id: Uuid,
        code: CachedAddressCode,
    ) -> DeliveryResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lagos() -> Address {
        Address {
            id: Uuid::new_v4(),
            contact_name: "Mama Put Kitchen".to_string(),
            phone: Some("+2348030000000".into()),
            email: None,
            line1: "12 Admiralty Way".to_string(),
            city: Some("Lekki".to_string()),
            state: Some("Lagos".to_string()),
            postal_code: None,
            country: "NG".to_string(),
            latitude: Some(6.4316),
            longitude: Some(3.4556),
            provider_codes: vec![],
        }
    }

    #[test]
    fn test_cached_code_survives_until_fields_change() {
        let mut address = lagos();
        let code = CachedAddressCode {
            provider: ProviderId::Regional,
            code: "ADDR-1".to_string(),
            fingerprint: address.fingerprint(),
            validated_at: Utc::now(),
        };
        address.remember_code(code);

        assert_eq!(address.cached_code(ProviderId::Regional).unwrap().code, "ADDR-1");
        assert!(address.cached_code(ProviderId::International).is_none());

        address.line1 = "14 Admiralty Way".to_string();
        assert!(address.cached_code(ProviderId::Regional).is_none());
    }

    #[test]
    fn test_remember_code_replaces_previous() {
        let mut address = lagos();
        for code in ["A", "B"] {
            address.remember_code(CachedAddressCode {
                provider: ProviderId::Regional,
                code: code.to_string(),
                fingerprint: address.fingerprint(),
                validated_at: Utc::now(),
            });
        }
        assert_eq!(address.provider_codes.len(), 1);
        assert_eq!(address.provider_codes[0].code, "B");
    }

    #[test]
    fn test_single_line_skips_missing_parts() {
        assert_eq!(lagos().single_line(), "12 Admiralty Way, Lekki, Lagos, NG");
    }
}
