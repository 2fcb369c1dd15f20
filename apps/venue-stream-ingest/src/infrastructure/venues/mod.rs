//! Venue Adapters
//!
//! One [`FeedAdapter`](crate::application::ports::FeedAdapter) per venue.
//! Each module owns the venue's wire types, its pure parse functions, its
//! market discovery and its inverse symbol spelling.
//!
//! | Venue | Transport | Signal |
//! |-------|-----------|--------|
//! | DeDust | REST poll | deepest-pool price |
//! | Extended | REST discovery + WebSocket | top of book |
//! | Lighter | REST discovery + WebSocket | top of book |
//! | Variational | REST poll | quoted top of book, else mark |
//! | Vest | WebSocket + keep-alive | top of book |

use serde::{Deserialize, Deserializer};

/// DeDust AMM pools.
pub mod dedust;

/// Extended perpetual futures.
pub mod extended;

/// Shared HTTP client helpers.
pub mod http;

/// Lighter perpetual futures.
pub mod lighter;

/// Variational perpetuals.
pub mod variational;

/// Vest perpetual futures.
pub mod vest;

pub use dedust::{DedustAdapter, DedustConfig};
pub use extended::{ExtendedAdapter, ExtendedConfig};
pub use lighter::{LighterAdapter, LighterConfig};
pub use variational::{VariationalAdapter, VariationalConfig};
pub use vest::{VestAdapter, VestConfig};

/// Accept a numeric field encoded either as a JSON string or a JSON number.
///
/// Anything else (null, missing, objects) becomes `None`.
pub(crate) fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(text)) => Some(text),
        Some(serde_json::Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}
