//! kurs Common Types
//!
//! Shared types used across the kurs workspace: currencies and pairs,
//! monetary amounts, persisted rate records and freshness constants.

pub mod monetary;
pub mod record;
pub mod error;
pub mod time;

pub use monetary::*;
pub use record::*;
pub use error::*;
pub use time::*;
