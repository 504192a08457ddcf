//! Strong identifier types for the sync protocol.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// A 32-byte transaction identifier, computed as the double SHA-256 of the
/// raw transaction bytes.
///
/// This is the content-address of a transaction. Two transactions with the
/// same bytes will have the same TxId.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxId(pub [u8; 32]);

impl TxId {
    /// Create a new TxId from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Compute the TxId of a raw transaction.
    pub fn of(raw_tx: &[u8]) -> Self {
        let first = Sha256::digest(raw_tx);
        let second = Sha256::digest(first);
        Self(second.into())
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidTxId(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(CoreError::InvalidTxId(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// The zero TxId (used as a sentinel).
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for TxId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for TxId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for TxId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TxId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TxId::from_hex(&s).map_err(de::Error::custom)
    }
}

/// A reference to one output of a transaction: `(txid, output_index)`.
///
/// Outpoints identify UTXOs and name sync graphs (a graph's id is the
/// outpoint of its tip). The canonical "36-byte form" used for wire map
/// keys is `"<64-hex-txid>.<decimal-index>"`; [`Outpoint::encode36`] and
/// [`Outpoint::decode36`] round-trip it.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Outpoint {
    /// The transaction this output belongs to.
    pub txid: TxId,
    /// The index of the output within that transaction.
    pub output_index: u32,
}

impl Outpoint {
    /// Create a new outpoint.
    pub const fn new(txid: TxId, output_index: u32) -> Self {
        Self { txid, output_index }
    }

    /// Serialize to the canonical 36-byte form.
    pub fn encode36(&self) -> String {
        format!("{}.{}", self.txid.to_hex(), self.output_index)
    }

    /// Parse from the canonical 36-byte form.
    pub fn decode36(s: &str) -> Result<Self, CoreError> {
        let (txid, index) = s
            .split_once('.')
            .ok_or_else(|| CoreError::MalformedOutpoint(s.to_string()))?;
        let txid =
            TxId::from_hex(txid).map_err(|_| CoreError::MalformedOutpoint(s.to_string()))?;
        let output_index = index
            .parse::<u32>()
            .map_err(|_| CoreError::MalformedOutpoint(s.to_string()))?;
        Ok(Self { txid, output_index })
    }
}

impl fmt::Debug for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Outpoint({}.{})",
            &self.txid.to_hex()[..16],
            self.output_index
        )
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode36())
    }
}

impl FromStr for Outpoint {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode36(s)
    }
}

impl Serialize for Outpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode36())
    }
}

impl<'de> Deserialize<'de> for Outpoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Outpoint::decode36(&s).map_err(de::Error::custom)
    }
}
