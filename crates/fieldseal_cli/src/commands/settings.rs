//! Options shared by every command, with environment fallbacks.

use clap::Args;
use fieldseal_core::crypto::{KdfParams, DEFAULT_ITERATIONS};
use fieldseal_core::{CachePolicy, Config, CoreError, CoreResult, KeyProvider, Schema, Secret};
use fieldseal_storage::{FileSecretStore, FileStore};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

/// Store locations, keys and run tuning.
///
/// Not `Debug`: holds passphrases.
#[derive(Args)]
pub struct Settings {
    /// Document store directory
    #[arg(global = true, long, env = "FIELDSEAL_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// Secrets directory holding key files
    #[arg(global = true, long, env = "FIELDSEAL_SECRETS_DIR")]
    pub secrets_dir: Option<PathBuf>,

    /// Current key passphrase (overrides --key-id)
    #[arg(global = true, long, env = "FIELDSEAL_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Id of the active key in the secrets directory
    #[arg(global = true, long, env = "FIELDSEAL_KEY_ID", default_value = "fieldseal.active")]
    pub key_id: String,

    /// Legacy key passphrases, tried in order before the current key
    #[arg(
        global = true,
        long = "legacy-key",
        env = "FIELDSEAL_LEGACY_KEYS",
        value_delimiter = ',',
        hide_env_values = true
    )]
    pub legacy_keys: Vec<String>,

    /// Staging id for the new key during rotation
    #[arg(global = true, long, env = "FIELDSEAL_NEW_KEY_ID", default_value = "fieldseal.next")]
    pub new_key_id: String,

    /// New key passphrase for rotation (generated if absent)
    #[arg(global = true, long, env = "FIELDSEAL_NEW_KEY", hide_env_values = true)]
    pub new_key: Option<String>,

    /// Restrict the run to these collections
    #[arg(
        global = true,
        long = "collection",
        env = "FIELDSEAL_COLLECTIONS",
        value_delimiter = ','
    )]
    pub collections: Vec<String>,

    /// Extra encrypted fields: `collection:field,field;collection:field`
    #[arg(global = true, long, env = "FIELDSEAL_SCHEMA")]
    pub schema: Option<String>,

    /// Documents per scan page
    #[arg(global = true, long, env = "FIELDSEAL_BATCH_SIZE", default_value_t = 100)]
    pub batch_size: usize,

    /// Worker threads per page
    #[arg(global = true, long, env = "FIELDSEAL_WORKERS", default_value_t = 1)]
    pub workers: usize,

    /// PBKDF2 iterations for new envelopes
    #[arg(global = true, long, env = "FIELDSEAL_KDF_ITERATIONS", default_value_t = DEFAULT_ITERATIONS)]
    pub kdf_iterations: u32,

    /// Directory for JSON run reports
    #[arg(global = true, long, env = "FIELDSEAL_LOG_DIR", default_value = ".")]
    pub log_dir: PathBuf,
}

impl Settings {
    /// Builds and validates the run configuration.
    pub fn config(&self, dry_run: bool) -> CoreResult<Config> {
        let kdf = KdfParams::new(self.kdf_iterations)
            .map_err(|e| CoreError::configuration(e.to_string()))?;
        let config = Config::new()
            .kdf(kdf)
            .batch_size(self.batch_size)
            .workers(self.workers)
            .dry_run(dry_run);
        config.validate()?;
        Ok(config)
    }

    /// Built-in encrypted fields plus declared tables, restricted to the
    /// selected collections.
    pub fn schema(&self) -> CoreResult<Schema> {
        let mut schema = Schema::builtin();
        if let Some(table) = &self.schema {
            schema = schema.merge(Schema::parse_table(table)?);
        }
        schema.restrict(&self.collections)
    }

    /// Opens the document store.
    pub fn open_store(&self) -> Result<FileStore, Box<dyn Error>> {
        let dir = self
            .store_dir
            .as_deref()
            .ok_or("store directory required (--store-dir or FIELDSEAL_STORE_DIR)")?;
        Ok(FileStore::open(dir, false)?)
    }

    /// Opens the secrets directory, if configured.
    pub fn key_provider(&self) -> Result<Option<KeyProvider>, Box<dyn Error>> {
        match &self.secrets_dir {
            Some(dir) => {
                let store = FileSecretStore::open(dir)?;
                Ok(Some(
                    KeyProvider::new(Arc::new(store)).with_cache(CachePolicy::default()),
                ))
            }
            None => Ok(None),
        }
    }

    /// Opens the secrets directory, which the key lifecycle commands need.
    pub fn require_key_provider(&self) -> Result<KeyProvider, Box<dyn Error>> {
        self.key_provider()?
            .ok_or_else(|| "secrets directory required (--secrets-dir or FIELDSEAL_SECRETS_DIR)".into())
    }

    /// Resolves the current key: `--key` first, then `--key-id`.
    pub fn current_key(&self, keys: Option<&KeyProvider>) -> Result<Secret, Box<dyn Error>> {
        if let Some(key) = &self.key {
            return Ok(Secret::parse(key)?);
        }
        match keys {
            Some(keys) => Ok(keys.get(&self.key_id)?),
            None => Err("no key configured (--key, or --secrets-dir with --key-id)".into()),
        }
    }

    /// Parses the legacy keys, in the order given.
    pub fn legacy_keys(&self) -> CoreResult<Vec<Secret>> {
        self.legacy_keys
            .iter()
            .filter(|k| !k.is_empty())
            .map(|k| Secret::parse(k))
            .collect()
    }

    /// Resolves the rotation target key.
    ///
    /// Order: `--new-key`, then a key already staged by an earlier run, then
    /// a freshly generated key. The flag is true for a generated key.
    pub fn new_key(&self, keys: &KeyProvider) -> Result<(Secret, bool), Box<dyn Error>> {
        if let Some(key) = &self.new_key {
            return Ok((Secret::parse(key)?, false));
        }
        if keys.contains(&self.new_key_id)? {
            return Ok((keys.get(&self.new_key_id)?, false));
        }
        Ok((Secret::generate(), true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        settings: Settings,
    }

    fn parse(args: &[&str]) -> Settings {
        let mut argv = vec!["fieldseal"];
        argv.extend_from_slice(args);
        Harness::parse_from(argv).settings
    }

    #[test]
    fn defaults_are_valid() {
        let settings = parse(&[]);
        assert_eq!(settings.batch_size, 100);
        assert_eq!(settings.workers, 1);
        assert!(settings.config(false).is_ok());
        assert_eq!(settings.schema().unwrap(), Schema::builtin());
    }

    #[test]
    fn weak_kdf_rejected() {
        let settings = parse(&["--kdf-iterations", "5000"]);
        assert!(matches!(
            settings.config(false),
            Err(CoreError::Configuration { .. })
        ));
    }

    #[test]
    fn collections_and_schema() {
        let settings = parse(&[
            "--schema",
            "wallets:seed",
            "--collection",
            "users,wallets",
        ]);
        let schema = settings.schema().unwrap();
        let names: Vec<_> = schema.collections().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["users", "wallets"]);
    }

    #[test]
    fn key_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let secrets = dir.path().to_str().unwrap();
        let settings = parse(&["--secrets-dir", secrets, "--legacy-key", "a,b"]);
        let keys = settings.require_key_provider().unwrap();

        assert!(settings.current_key(Some(&keys)).is_err());
        keys.publish("fieldseal.active", &Secret::parse("pass").unwrap()).unwrap();
        assert_eq!(settings.current_key(Some(&keys)).unwrap().expose(), b"pass");
        assert_eq!(settings.legacy_keys().unwrap().len(), 2);

        let (generated, fresh) = settings.new_key(&keys).unwrap();
        assert!(fresh);
        keys.publish("fieldseal.next", &generated).unwrap();
        let (staged, fresh) = settings.new_key(&keys).unwrap();
        assert!(!fresh);
        assert_eq!(staged, generated);
    }

    #[test]
    fn direct_key_wins() {
        let settings = parse(&["--key", "direct"]);
        assert_eq!(settings.current_key(None).unwrap().expose(), b"direct");
        assert!(settings.open_store().is_err());
    }
}
