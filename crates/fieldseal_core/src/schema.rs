//! Declared encrypted fields.
//!
//! Drivers never guess which fields hold secrets by walking document keys.
//! A [`Schema`] names, per collection, the fields that carry envelopes.
//! Everything else in a document is left alone.

use crate::error::{CoreError, CoreResult};
use fieldseal_storage::validate_identifier;
use serde::Serialize;

/// What an encrypted field holds. Used for reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    /// Masternode or voting-address private key.
    PrivateKey,
    /// TOTP shared secret.
    TwoFactorSecret,
    /// Operator-declared field of unspecified content.
    Opaque,
}

/// One encrypted field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    /// Top-level field name.
    pub name: String,
    /// Kind of secret stored in the field.
    pub kind: SecretKind,
}

/// The encrypted fields of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSchema {
    /// Collection name.
    pub name: String,
    /// Encrypted fields, in processing order.
    pub fields: Vec<FieldSpec>,
}

impl CollectionSchema {
    /// Creates a collection with no fields.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is not a valid store identifier.
    pub fn new(name: impl Into<String>) -> CoreResult<Self> {
        let name = name.into();
        validate_identifier(&name)
            .map_err(|_| CoreError::configuration(format!("invalid collection name {name:?}")))?;
        Ok(Self {
            name,
            fields: Vec::new(),
        })
    }

    /// Adds a field, builder style. Duplicate names are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the field name is empty.
    pub fn field(mut self, name: impl Into<String>, kind: SecretKind) -> CoreResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CoreError::configuration(format!(
                "empty field name in collection {}",
                self.name
            )));
        }
        if !self.fields.iter().any(|f| f.name == name) {
            self.fields.push(FieldSpec { name, kind });
        }
        Ok(self)
    }

    /// Returns the field names.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// The set of collections and fields a run processes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schema {
    collections: Vec<CollectionSchema>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The fields encrypted by the application today.
    #[must_use]
    pub fn builtin() -> Self {
        let entry = |collection: &str, field: &str, kind| CollectionSchema {
            name: collection.to_string(),
            fields: vec![FieldSpec {
                name: field.to_string(),
                kind,
            }],
        };
        Self {
            collections: vec![
                entry("users", "twofa_secret", SecretKind::TwoFactorSecret),
                entry("masternodes", "private_key", SecretKind::PrivateKey),
                entry("voting_addresses", "private_key", SecretKind::PrivateKey),
            ],
        }
    }

    /// Parses operator-declared tables: `collection:field,field;collection:field`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] for a missing `:`, an invalid
    /// collection name, or a table without fields.
    pub fn parse_table(text: &str) -> CoreResult<Self> {
        let mut schema = Self::new();
        for table in text.split(';').map(str::trim).filter(|t| !t.is_empty()) {
            let (collection, fields) = table.split_once(':').ok_or_else(|| {
                CoreError::configuration(format!(
                    "schema table {table:?} must look like collection:field,field"
                ))
            })?;

            let mut entry = CollectionSchema::new(collection.trim())?;
            for field in fields.split(',').map(str::trim).filter(|f| !f.is_empty()) {
                entry = entry.field(field, SecretKind::Opaque)?;
            }
            if entry.fields.is_empty() {
                return Err(CoreError::configuration(format!(
                    "schema table for {} declares no fields",
                    entry.name
                )));
            }
            schema.add(entry);
        }
        Ok(schema)
    }

    /// Adds a collection, merging fields if it is already present.
    pub fn add(&mut self, collection: CollectionSchema) {
        match self.collections.iter_mut().find(|c| c.name == collection.name) {
            Some(existing) => {
                for field in collection.fields {
                    if !existing.fields.iter().any(|f| f.name == field.name) {
                        existing.fields.push(field);
                    }
                }
            }
            None => self.collections.push(collection),
        }
    }

    /// Merges another schema into this one, builder style.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        for collection in other.collections {
            self.add(collection);
        }
        self
    }

    /// Keeps only the named collections.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] if a name is not in the schema.
    pub fn restrict<S: AsRef<str>>(mut self, names: &[S]) -> CoreResult<Self> {
        if names.is_empty() {
            return Ok(self);
        }
        for name in names {
            let name = name.as_ref();
            if !self.collections.iter().any(|c| c.name == name) {
                return Err(CoreError::configuration(format!(
                    "collection {name:?} has no declared encrypted fields"
                )));
            }
        }
        self.collections
            .retain(|c| names.iter().any(|n| n.as_ref() == c.name));
        Ok(self)
    }

    /// Returns the collections in processing order.
    #[must_use]
    pub fn collections(&self) -> &[CollectionSchema] {
        &self.collections
    }

    /// Returns true if no collection is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tables() {
        let schema = Schema::builtin();
        let names: Vec<_> = schema.collections().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["users", "masternodes", "voting_addresses"]);
        assert_eq!(schema.collections()[0].fields[0].kind, SecretKind::TwoFactorSecret);
    }

    #[test]
    fn parse_and_merge() {
        let extra = Schema::parse_table("masternodes: private_key, bls_key ; wallets:seed").unwrap();
        let schema = Schema::builtin().merge(extra);

        let mn = &schema.collections()[1];
        assert_eq!(mn.field_names().collect::<Vec<_>>(), ["private_key", "bls_key"]);
        assert_eq!(schema.collections().len(), 4);
        assert_eq!(schema.collections()[3].name, "wallets");
    }

    #[test]
    fn parse_errors() {
        assert!(Schema::parse_table("users").is_err());
        assert!(Schema::parse_table("users:").is_err());
        assert!(Schema::parse_table("../x:f").is_err());
        assert!(Schema::parse_table("").unwrap().is_empty());
    }

    #[test]
    fn restrict_to_known_collections() {
        let schema = Schema::builtin().restrict(&["users"]).unwrap();
        assert_eq!(schema.collections().len(), 1);
        assert!(Schema::builtin().restrict(&["nope"]).is_err());
        let empty: [&str; 0] = [];
        assert_eq!(Schema::builtin().restrict(&empty).unwrap(), Schema::builtin());
    }
}
