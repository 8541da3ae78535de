pub mod models;
pub mod status;
pub mod repository;
pub mod memory;
pub mod gateway;
pub mod creator;
pub mod bridge;
pub mod reconciler;
pub mod service;

pub use models::{Shipment, ShipmentStatus, ShipmentTrackingView, TrackingEvent};
pub use status::{supersedes, translate, MappedStatus};
pub use repository::ShipmentRepository;
pub use memory::{MemoryStore, RecordingNotifier};
pub use gateway::{AddressGateway, ResolvedAddress};
pub use creator::ShipmentCreator;
pub use bridge::OrderStatusBridge;
pub use reconciler::{ReconcileOutcome, StatusUpdate, TrackingReconciler};
pub use service::{DeliveryService, QuoteRequestInput};
