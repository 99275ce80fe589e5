//! The decoded item record relayed from the capture device to the
//! desktop.
//!
//! Only `identity_key` is ever examined by the pairing core — it is the
//! normalized product code used for the duplicate check. Everything
//! else rides along untouched.

use serde::{Deserialize, Serialize};

use crate::error::ScanlinkError;

/// One successfully decoded item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScannedItem {
    /// Normalized product code (UPC-A / UPC-E / EAN-13).
    pub identity_key: String,

    /// EAN-2 / EAN-5 add-on digits, when the decoder reports them.
    pub extension: Option<String>,

    /// Opaque metadata the decode capability attached. Passed through
    /// unexamined.
    pub extra: serde_json::Value,
}

impl ScannedItem {
    /// Build an item from a raw decoded code, normalizing the key.
    pub fn new(raw_code: &str) -> Self {
        Self {
            identity_key: normalize_key(raw_code),
            extension: None,
            extra: serde_json::Value::Null,
        }
    }

    /// Attach the add-on digits.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// Attach opaque metadata.
    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = extra;
        self
    }

    /// Serialize to bytes for relaying.
    ///
    /// Items are JSON rather than bincode: the `extra` field is
    /// free-form and only a self-describing format can carry it.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ScanlinkError> {
        serde_json::to_vec(self).map_err(|e| ScanlinkError::Encoding(e.to_string()))
    }

    /// Deserialize from relayed bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ScanlinkError> {
        serde_json::from_slice(bytes).map_err(|e| ScanlinkError::Encoding(e.to_string()))
    }
}

/// Normalize a decoded product code for identity comparison: strip
/// surrounding whitespace plus any internal spaces or hyphens the
/// decoder may have preserved.
pub fn normalize_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}
