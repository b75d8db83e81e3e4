// Зашифрованный файл секретов: AES-256-GCM(bincode(AccountSecrets))
//
// Ключ выводится из секретного материала аккаунта, поэтому файл бесполезен
// без учётных данных, которые его создали.

use crate::account::BotAccount;
use crate::crypto::master_key;
use crate::storage::models::{AccountSecrets, SECRETS_FORMAT_VERSION};
use crate::storage::AccountSecretsManager;
use crate::utils::error::StorageError;
use crate::utils::serialization;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

pub const SECRETS_FILE_NAME: &str = "account.secrets";

pub struct FileAccountSecretsManager {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileAccountSecretsManager {
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            path: cache_dir.as_ref().join(SECRETS_FILE_NAME),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self, account: &BotAccount) -> Result<Option<AccountSecrets>, StorageError> {
        let blob = match fs::read(&self.path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let key = account.secrets_key()?;
        let plain = master_key::open(key, &blob)?;
        let secrets: AccountSecrets = serialization::from_bytes(&plain)?;
        if secrets.format_version != SECRETS_FORMAT_VERSION {
            return Err(StorageError::Serialization(format!(
                "unsupported secrets format version {}",
                secrets.format_version
            )));
        }
        Ok(Some(secrets))
    }

    fn store(&self, account: &BotAccount, secrets: &AccountSecrets) -> Result<(), StorageError> {
        let key = account.secrets_key()?;
        let plain = zeroize::Zeroizing::new(serialization::to_bytes(secrets)?);
        let blob = master_key::seal(key, &plain)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Пишем во временный файл и переименовываем: файл либо старый, либо новый целиком
        let tmp = self.path.with_extension("tmp");
        let written = fs::write(&tmp, &blob).and_then(|_| fs::rename(&tmp, &self.path));
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(path = %tmp.display(), error = %cleanup, "failed to remove temporary secrets file");
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn delete_file(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "deleted account secrets file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to delete account secrets file"),
        }
    }
}

impl AccountSecretsManager for FileAccountSecretsManager {
    fn get_secrets(&self, account: &BotAccount) -> Option<AccountSecrets> {
        let _guard = self.lock.lock().ok()?;
        match self.load(account) {
            Ok(secrets) => {
                debug!(account = account.id, found = secrets.is_some(), "loaded account secrets file");
                secrets
            }
            Err(e) => {
                warn!(
                    account = account.id,
                    error = %e,
                    "failed to load account secrets, falling back to slow login"
                );
                self.delete_file();
                None
            }
        }
    }

    fn save_secrets(&self, account: &BotAccount, secrets: &AccountSecrets) -> Result<(), StorageError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StorageError::Serialization("secrets lock poisoned".to_string()))?;
        self.store(account, secrets)?;
        debug!(account = account.id, path = %self.path.display(), "saved account secrets");
        Ok(())
    }

    fn invalidate(&self) {
        if let Ok(_guard) = self.lock.lock() {
            self.delete_file();
        }
    }
}
