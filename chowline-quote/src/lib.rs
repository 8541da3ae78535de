pub mod models;
pub mod lifecycle;
pub mod manifest;
pub mod rates;
pub mod repository;

pub use models::{Party, ProviderQuote, Quote, QuoteStatus, Selection};
pub use manifest::{Dimensions, PackageItem, PackageManifest};
pub use rates::{select_cheapest, RateOffer, RateSheet};
pub use repository::QuoteRepository;
