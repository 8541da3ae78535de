use chowline_core::address::{Address, AddressBook, CachedAddressCode};
use chowline_core::{DeliveryError, DeliveryResult};
use chowline_providers::{DeliveryProvider, ValidatedAddress};
use chowline_quote::Party;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ResolvedAddress {
    pub address: Address,
    /// Provider address code, for providers that issue them.
    pub code: Option<String>,
    /// Components as the provider normalized them. Absent on a cache hit.
    pub validated: Option<ValidatedAddress>,
}

impl ResolvedAddress {
    /// Quote snapshot of this end, preferring provider-normalized components
    /// over what the customer typed.
    pub fn party(&self) -> Party {
        let mut party = Party::from_address(&self.address, self.code.clone());
        if let Some(v) = &self.validated {
            if let Some(formatted) = v.formatted.as_ref().filter(|f| !f.trim().is_empty()) {
                party.address_line = formatted.clone();
            }
            party.city = v.city.clone().or(party.city);
            party.state = v.state.clone().or(party.state);
            party.postal_code = v.postal_code.clone().or(party.postal_code);
            if let (Some(lat), Some(lng)) = (v.latitude, v.longitude) {
                party.latitude = Some(lat);
                party.longitude = Some(lng);
            }
        }
        party
    }
}

/// Validates addresses with the provider that will carry the delivery and
/// caches the codes it issues on the address record.
#[derive(Clone)]
pub struct AddressGateway {
    addresses: Arc<dyn AddressBook>,
}

impl AddressGateway {
    pub fn new(addresses: Arc<dyn AddressBook>) -> Self {
        Self { addresses }
    }

    pub async fn load(&self, id: Uuid) -> DeliveryResult<Address> {
        self.addresses
            .get_address(id)
            .await?
            .ok_or(DeliveryError::AddressNotFound(id))
    }

    /// Idempotent: a cached code that still matches the address fields skips
    /// the provider entirely. Rejections surface as `AddressNotServiceable`.
    pub async fn resolve(
        &self,
        provider: &dyn DeliveryProvider,
        mut address: Address,
    ) -> DeliveryResult<ResolvedAddress> {
        let provider_id = provider.id();

        if let Some(cached) = address.cached_code(provider_id) {
            debug!(address_id = %address.id, provider = %provider_id, "Address code cache hit");
            let code = Some(cached.code.clone());
            return Ok(ResolvedAddress { address, code, validated: None });
        }

        let validated = provider.validate_address(&address).await?;
        if !provider.capabilities().caches_address_codes {
            return Ok(ResolvedAddress { address, code: None, validated: Some(validated) });
        }

        let code = validated.code.clone().ok_or_else(|| {
            DeliveryError::AddressNotServiceable(format!("{provider_id} issued no address code"))
        })?;
        let cached = CachedAddressCode {
            provider: provider_id,
            code: code.clone(),
            fingerprint: address.fingerprint(),
            validated_at: Utc::now(),
        };
        self.addresses
            .update_provider_address_code(address.id, cached.clone())
            .await?;
        address.remember_code(cached);
        info!(address_id = %address.id, provider = %provider_id, "Cached provider address code");

        Ok(ResolvedAddress { address, code: Some(code), validated: Some(validated) })
    }
}
