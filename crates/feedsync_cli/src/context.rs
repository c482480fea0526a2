//! Data directory layout: the account file and the per-account stores.

use crate::error::{CliError, CliResult};
use crate::http::UreqClient;
use feedsync_core::{Store, StoreConfig};
use feedsync_engine::{AccountConfig, AccountHandle, SyncConfig, Synchronizer};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Name of the account file inside the data directory.
pub const ACCOUNT_FILE: &str = "account.json";

/// Subdirectory holding one store per account.
pub const STORES_DIR: &str = "stores";

/// The CLI's view of a data directory.
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn account_path(&self) -> PathBuf {
        self.root.join(ACCOUNT_FILE)
    }

    pub fn stores_path(&self) -> PathBuf {
        self.root.join(STORES_DIR)
    }

    /// Loads the configured account.
    pub fn load_account(&self) -> CliResult<AccountConfig> {
        let path = self.account_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(CliError::NoAccount(self.root.clone()));
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_str(&text)?)
    }

    /// Writes the account file, replacing it atomically.
    pub fn save_account(&self, account: &AccountConfig) -> CliResult<()> {
        fs::create_dir_all(&self.root)?;
        let path = self.account_path();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(account)?)?;
        fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), "account saved");
        Ok(())
    }

    /// Opens the store of the configured account.
    pub fn open_store(&self) -> CliResult<(AccountConfig, Store)> {
        let account = self.load_account()?;
        let store = Store::open(&self.stores_path(), account.account_id(), StoreConfig::default())?;
        Ok((account, store))
    }

    /// Builds a synchronizer over the configured account and its store.
    pub fn synchronizer(&self, config: SyncConfig) -> CliResult<Synchronizer<UreqClient>> {
        let (account, store) = self.open_store()?;
        let sync = Synchronizer::new(
            Arc::new(AccountHandle::new(account)),
            Arc::new(store),
            UreqClient::new(),
            config,
        )?;
        Ok(sync)
    }

    /// Persists the account as the synchronizer currently sees it.
    pub fn save_from(&self, sync: &Synchronizer<UreqClient>) -> CliResult<()> {
        let current = sync.account().snapshot();
        if self.load_account().ok().as_ref() != Some(current.as_ref()) {
            self.save_account(&current)?;
        }
        Ok(())
    }
}
