//! Property-based test generators using proptest.
//!
//! Strategies produce plaintexts the legacy plausibility check accepts,
//! and stored values of each format paired with the key and plaintext
//! behind them.

use crate::fixtures::{current_value, legacy_value, secret};
use fieldseal_core::crypto::{classify, Format};
use proptest::prelude::*;

/// A stored value together with what it was made from.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Passphrase the value is keyed with.
    pub passphrase: String,
    /// Decrypted content.
    pub plaintext: String,
    /// Stored text.
    pub value: String,
}

/// Strategy for plaintexts: non-empty, no control characters.
pub fn plaintext_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[A-Z2-7]{16,32}").expect("Invalid regex"),
        prop::string::string_regex("[ -~]{1,96}").expect("Invalid regex"),
        prop::string::string_regex("[a-zé€𝄞 ]{1,24}").expect("Invalid regex"),
    ]
}

/// Strategy for passphrases.
pub fn passphrase_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[!-~]{1,48}").expect("Invalid regex")
}

/// Strategy for record ids the stores accept.
pub fn record_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9][a-z0-9_-]{0,23}").expect("Invalid regex")
}

/// Strategy for legacy hex values.
pub fn legacy_sample_strategy() -> impl Strategy<Value = Sample> {
    (passphrase_strategy(), plaintext_strategy()).prop_map(|(passphrase, plaintext)| {
        let value = legacy_value(&plaintext, &secret(&passphrase));
        Sample {
            passphrase,
            plaintext,
            value,
        }
    })
}

/// Strategy for current envelopes at the fast work factor.
pub fn current_sample_strategy() -> impl Strategy<Value = Sample> {
    (passphrase_strategy(), plaintext_strategy()).prop_map(|(passphrase, plaintext)| {
        let value = current_value(&plaintext, &secret(&passphrase));
        Sample {
            passphrase,
            plaintext,
            value,
        }
    })
}

/// Strategy for text neither scheme recognizes.
pub fn unrecognized_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<String>(),
        prop::string::string_regex("[0-9a-f]{1,31}").expect("Invalid regex"),
        prop::string::string_regex("fs2:[^A-Za-z0-9_-]{1,8}").expect("Invalid regex"),
    ]
    .prop_filter("must be unrecognized", |s| {
        classify(s) == Format::Unrecognized
    })
}
