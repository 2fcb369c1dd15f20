//! Symbol Canonicalization
//!
//! Every venue spells the tracked instrument differently (`TON-USD`,
//! `TON/USDT`, `TON-PERP`, `TONPERP`, ...). The canonicalizer folds all of
//! those spellings onto one [`CanonicalSymbol`] and rejects anything else.
//!
//! # Accepted Forms
//!
//! After upper-casing, trimming and replacing `/`, `_`, `:` with `-`:
//!
//! - the bare root token (`TON`)
//! - the canonical spelling itself (`TONUSDT`)
//! - root + quote/suffix, joined by `-` or concatenated (`TON-USDC`, `TONPERP`)
//! - the three-part form `ROOT-USD-PERP`
//!
//! The venue-specific inverse direction lives on each venue adapter.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Quote / suffix vocabulary accepted after the root token.
const QUOTE_SUFFIXES: [&str; 5] = ["USDT", "USDC", "USD", "PERP", "PERPUSDT"];

/// Root token of the instrument tracked by this deployment.
pub const DEFAULT_ROOT: &str = "TON";

/// Canonical spelling of the instrument tracked by this deployment.
pub const DEFAULT_CANONICAL: &str = "TONUSDT";

// =============================================================================
// Canonical Symbol
// =============================================================================

/// The single internal identifier of a tracked instrument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalSymbol(String);

impl CanonicalSymbol {
    /// Wrap an already-canonical spelling.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    /// Borrow the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalSymbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Canonicalizer
// =============================================================================

/// Maps venue spellings of one instrument onto its canonical symbol.
///
/// # Example
///
/// ```rust
/// use venue_stream_ingest::domain::symbol::SymbolCanonicalizer;
///
/// let canon = SymbolCanonicalizer::default();
/// assert_eq!(canon.normalize("ton/usdc").unwrap().as_str(), "TONUSDT");
/// assert!(canon.normalize("BTC-USD").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolCanonicalizer {
    root: String,
    canonical: CanonicalSymbol,
}

impl Default for SymbolCanonicalizer {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT, DEFAULT_CANONICAL)
    }
}

impl SymbolCanonicalizer {
    /// Create a canonicalizer for `root` (e.g. `TON`) folding onto `canonical`
    /// (e.g. `TONUSDT`).
    #[must_use]
    pub fn new(root: &str, canonical: &str) -> Self {
        Self {
            root: root.trim().to_uppercase(),
            canonical: CanonicalSymbol::new(canonical.trim().to_uppercase()),
        }
    }

    /// Root token of the tracked instrument.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// The canonical symbol every accepted spelling folds onto.
    #[must_use]
    pub const fn canonical(&self) -> &CanonicalSymbol {
        &self.canonical
    }

    /// Normalize a raw venue spelling.
    ///
    /// Returns `None` for empty, blank or unrecognized input.
    #[must_use]
    pub fn normalize(&self, raw: &str) -> Option<CanonicalSymbol> {
        let upper = raw.trim().to_uppercase();
        if upper.is_empty() {
            return None;
        }

        let unified: String = upper
            .chars()
            .map(|c| if matches!(c, '/' | '_' | ':') { '-' } else { c })
            .collect();

        self.is_alias(&unified).then(|| self.canonical.clone())
    }

    /// Check whether a raw spelling names the tracked instrument.
    #[must_use]
    pub fn is_recognized(&self, raw: &str) -> bool {
        self.normalize(raw).is_some()
    }

    /// Return the recognized canonical symbols among `raw`, de-duplicated
    /// in first-seen order.
    ///
    /// An empty result means "no symbol configured" for this deployment,
    /// whether the input was empty or nothing in it was recognized.
    #[must_use]
    pub fn filter_symbols<S: AsRef<str>>(&self, raw: &[S]) -> Vec<CanonicalSymbol> {
        let mut out: Vec<CanonicalSymbol> = Vec::with_capacity(1);
        for symbol in raw {
            if let Some(canon) = self.normalize(symbol.as_ref())
                && !out.contains(&canon)
            {
                out.push(canon);
            }
        }
        out
    }

    fn is_alias(&self, unified: &str) -> bool {
        if unified == self.root || unified == self.canonical.as_str() {
            return true;
        }

        if let Some(rest) = unified.strip_prefix(self.root.as_str()) {
            let suffix = rest.strip_prefix('-').unwrap_or(rest);
            if QUOTE_SUFFIXES.contains(&suffix) {
                return true;
            }
        }

        let parts: Vec<&str> = unified.split('-').collect();
        match parts.as_slice() {
            [root, quote] => *root == self.root && QUOTE_SUFFIXES.contains(quote),
            [root, "USD", "PERP"] => *root == self.root,
            _ => false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
