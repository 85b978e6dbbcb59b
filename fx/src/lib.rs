//! kurs FX engine
//!
//! Exchange rate resolution and caching against a pivot currency.
//!
//! # Features
//!
//! - Cache → store → triangulation resolution with freshness-aware TTLs
//! - Stale data served with a warning rather than failing
//! - Central bank, commercial bank and aggregator providers with fallback
//! - Same-day upserts into an in-memory or Postgres rate store
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kurs_fx::{MemoryRateCache, MemoryRateStore, Resolver, ResolverConfig};
//! use kurs_common::Currency;
//!
//! let resolver = Resolver::new(
//!     Arc::new(MemoryRateCache::new()),
//!     Arc::new(MemoryRateStore::new()),
//!     ResolverConfig::default(),
//! );
//!
//! let rate = resolver.get_rate(&Currency::usd(), &Currency::uah(), false).await?;
//! let uah = resolver.convert(dec!(100), &Currency::usd(), &Currency::uah()).await?;
//! ```

pub mod cache;
pub mod config;
pub mod conversion;
pub mod error;
pub mod postgres;
pub mod provider;
pub mod refresh;
pub mod resolver;
pub mod store;
pub mod triangulation;

pub use cache::{CachedRate, MemoryRateCache, MemoryRateCacheConfig, RateCache, SharedRateCache};
pub use config::{RefreshConfig, ResolverConfig};
pub use conversion::{Conversion, Converter};
pub use error::{FxError, FxResult};
pub use postgres::PgRateStore;
pub use provider::{
    AggregatorConfig, AggregatorProvider, CentralBankConfig, CentralBankProvider,
    CommercialBankConfig, CommercialBankProvider, RateProvider,
};
pub use refresh::{RefreshJob, RefreshQueue, RefreshRequester, RefreshSummary};
pub use resolver::{Origin, Resolved, Resolver};
pub use store::{MemoryRateStore, RateStore, SharedRateStore};
pub use triangulation::Triangulator;
