//! Error types for the GASP data model.

use thiserror::Error;

/// Errors that can occur while decoding protocol identifiers.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid txid: {0}")]
    InvalidTxId(String),

    #[error("malformed outpoint: {0}")]
    MalformedOutpoint(String),
}
