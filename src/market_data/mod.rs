pub mod bar;
pub mod cache;
pub mod polygon;
pub mod provider;
pub mod universe;
pub mod yahoo;

// Re-export the core types for convenient access (e.g. `use crate::market_data::PriceSeries`).
pub use bar::{PriceBar, PriceSeries};
pub use cache::TtlCache;
pub use polygon::PolygonClient;
pub use provider::{Fundamentals, FundamentalsProvider, InstitutionalHolder, MarketDataProvider};
pub use universe::Universe;
pub use yahoo::YahooClient;
