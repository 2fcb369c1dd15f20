//! Domain Layer - Canonical market data types.
//!
//! Pure types with no I/O: symbol canonicalization, the canonical events
//! published downstream and the shared top-of-book extraction.

/// Canonical market events and top-of-book extraction.
pub mod market_data;

/// Venue spelling to canonical symbol mapping.
pub mod symbol;
