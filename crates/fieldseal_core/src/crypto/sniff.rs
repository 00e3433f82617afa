//! Key-free classification of stored values.

use super::envelope::{Envelope, MARKER};
use super::legacy::is_legacy_shaped;
use serde::Serialize;

/// Storage format of an encrypted field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Pre-envelope hex ciphertext.
    Legacy,
    /// Current authenticated envelope.
    Current,
    /// Neither shape.
    Unrecognized,
}

impl Format {
    /// Returns true for [`Format::Current`].
    #[must_use]
    pub const fn is_current(self) -> bool {
        matches!(self, Self::Current)
    }

    /// Returns true for [`Format::Legacy`].
    #[must_use]
    pub const fn is_legacy(self) -> bool {
        matches!(self, Self::Legacy)
    }

    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Current => "current",
            Self::Unrecognized => "unrecognized",
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies `value` by shape alone. No key is needed and nothing is
/// decrypted.
#[must_use]
pub fn classify(value: &str) -> Format {
    if value.starts_with(MARKER) {
        return match Envelope::decode(value) {
            Ok(_) => Format::Current,
            Err(_) => Format::Unrecognized,
        };
    }
    if is_legacy_shaped(value) {
        Format::Legacy
    } else {
        Format::Unrecognized
    }
}
