pub mod app_config;
pub mod database;
pub mod quote_repo;
pub mod shipment_repo;
pub mod order_repo;
pub mod address_repo;
pub mod checkout_repo;
pub mod redis_repo;
pub mod events;

pub use database::DbClient;
pub use redis_repo::RedisClient;
pub use events::{EventProducer, KafkaNotifier};
pub use quote_repo::StoreQuoteRepository;
pub use shipment_repo::StoreShipmentRepository;
pub use order_repo::StoreOrderRepository;
pub use address_repo::StoreAddressBook;
pub use checkout_repo::StoreCheckoutReader;

use chowline_core::DeliveryError;

pub(crate) fn storage_error(err: impl std::fmt::Display) -> DeliveryError {
    DeliveryError::Storage(err.to_string())
}
