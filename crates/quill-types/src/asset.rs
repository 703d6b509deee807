//! Account identifiers, assets, and offer prices.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A 32-byte account identifier.
///
/// Ordering and hashing are byte-wise, which keeps every index that sorts
/// by account deterministic across runs. The `Display` form is lowercase
/// hex and is also the canonical column encoding used by the SQLite store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    /// Build an id whose first byte is `seed` and the rest zero.
    ///
    /// Intended for tests and examples; real ids come from key derivation,
    /// which is outside this layer.
    pub fn from_seed(seed: u8) -> Self {
        let mut bytes = [0u8; 32];
        bytes[0] = seed;
        AccountId(bytes)
    }

    /// Decode from the lowercase-hex form produced by `Display`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let bytes: [u8; 32] = bytes.try_into().ok()?;
        Some(AccountId(bytes))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// An asset: either the native token or a credit asset issued by an
/// account under a short code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Asset {
    /// The native token of the ledger.
    Native,
    /// An issued asset, identified by (code, issuer).
    Credit {
        /// Asset code, 1..=12 significant characters.
        code: String,
        /// The issuing account.
        issuer: AccountId,
    },
}

impl Asset {
    /// Convenience constructor for a credit asset.
    pub fn credit(code: impl Into<String>, issuer: AccountId) -> Self {
        Asset::Credit {
            code: code.into(),
            issuer,
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Native => f.write_str("native"),
            Asset::Credit { code, issuer } => write!(f, "{}:{}", code, issuer),
        }
    }
}

/// An offer price as an exact rational `n / d`.
///
/// Prices are never compared through floating point inside the engine;
/// [`Price::cmp_value`] cross-multiplies in `i128` so that `2/4` and `1/2`
/// compare equal even though they are structurally distinct values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Price {
    /// Numerator.
    pub n: i32,
    /// Denominator; must be positive.
    pub d: i32,
}

impl Price {
    /// Create a price. `d` must be positive.
    pub fn new(n: i32, d: i32) -> Self {
        debug_assert!(d > 0, "price denominator must be positive");
        Price { n, d }
    }

    /// Numeric comparison of two prices, exact over the rationals.
    pub fn cmp_value(&self, other: &Price) -> Ordering {
        let lhs = self.n as i128 * other.d as i128;
        let rhs = other.n as i128 * self.d as i128;
        lhs.cmp(&rhs)
    }

    /// Lossy floating-point value, used only as a sort column by the
    /// SQLite store (mirroring the upstream schema).
    pub fn as_f64(&self) -> f64 {
        self.n as f64 / self.d as f64
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.n, self.d)
    }
}
