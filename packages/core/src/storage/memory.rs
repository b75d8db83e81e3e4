// In-memory хранилище секретов (на время жизни процесса)

use crate::account::BotAccount;
use crate::storage::models::AccountSecrets;
use crate::storage::AccountSecretsManager;
use crate::utils::error::StorageError;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory хранилище
#[derive(Default)]
pub struct MemoryAccountSecretsManager {
    secrets: Mutex<HashMap<u64, AccountSecrets>>,
}

impl MemoryAccountSecretsManager {
    pub fn new() -> Self {
        Self {
            secrets: Mutex::new(HashMap::new()),
        }
    }
}

impl AccountSecretsManager for MemoryAccountSecretsManager {
    fn get_secrets(&self, account: &BotAccount) -> Option<AccountSecrets> {
        let guard = self.secrets.lock().ok()?;
        guard.get(&account.id).cloned()
    }

    fn save_secrets(&self, account: &BotAccount, secrets: &AccountSecrets) -> Result<(), StorageError> {
        let mut guard = self
            .secrets
            .lock()
            .map_err(|_| StorageError::Serialization("secrets lock poisoned".to_string()))?;
        guard.insert(account.id, secrets.clone());
        Ok(())
    }

    fn invalidate(&self) {
        if let Ok(mut guard) = self.secrets.lock() {
            guard.clear();
        }
    }
}
