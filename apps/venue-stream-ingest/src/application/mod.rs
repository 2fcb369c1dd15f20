//! Application Layer - Port definitions.
//!
//! Contracts between the generic feed supervisor and the venue adapters.

/// Feed adapter contract and market map types.
pub mod ports;
