//! # Addresses and Amounts
//!
//! Every participant the treasury deals with -- operators, recipients,
//! tokens, pools, price feeds -- is identified by a 20-byte [`Address`].
//! Pools share the token address space because LP shares are ordinary
//! fungible balances held under the pool's address.
//!
//! Addresses serialize as `0x`-prefixed lowercase hex strings. That keeps
//! them usable as JSON object keys, which the observable snapshot relies on.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Token quantity in the token's smallest unit.
pub type Amount = u128;

/// Length of an address in bytes.
pub const ADDRESS_LENGTH: usize = 20;

/// A 20-byte identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

/// An operator or recipient.
pub type Identity = Address;

/// A fungible token.
pub type TokenId = Address;

/// A liquidity pool (also the LP share token).
pub type PoolId = Address;

/// A price feed reference.
pub type FeedId = Address;

/// Errors produced when parsing an address from text.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AddressParseError {
    /// The input is not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// The decoded input has the wrong number of bytes.
    #[error("invalid address length: expected {expected} bytes, got {0}", expected = ADDRESS_LENGTH)]
    InvalidLength(usize),
}

impl Address {
    /// The null identity. Never a valid governor, guardian or recipient.
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    /// The chain's native coin, tracked by ledgers like any other token.
    pub const NATIVE: Address = Address([0xee; ADDRESS_LENGTH]);

    /// Creates an address from raw bytes.
    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Returns `true` for [`Address::ZERO`].
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    /// Derives a deterministic address from a human-readable label.
    ///
    /// The address is the first 20 bytes of `BLAKE3(label)`. Handy for
    /// fixtures: `Address::from_label("governor")` is stable across runs.
    pub fn from_label(label: &str) -> Self {
        let digest = blake3::hash(label.as_bytes());
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&digest.as_bytes()[..ADDRESS_LENGTH]);
        Self(bytes)
    }

    /// Returns the `0x`-prefixed hex form.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parses a hex address, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, AddressParseError> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed)?;
        if bytes.len() != ADDRESS_LENGTH {
            return Err(AddressParseError::InvalidLength(bytes.len()));
        }
        let mut arr = [0u8; ADDRESS_LENGTH];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}..)", &self.to_hex()[..10])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
