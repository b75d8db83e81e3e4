// Композиция хранилищ: primary (обычно память) + secondary (обычно файл)

use crate::account::BotAccount;
use crate::storage::models::AccountSecrets;
use crate::storage::AccountSecretsManager;
use crate::utils::error::StorageError;
use tracing::warn;

/// Чтение: primary, затем secondary (с прогревом primary). Запись: в оба.
pub struct CombinedAccountSecretsManager {
    primary: Box<dyn AccountSecretsManager>,
    secondary: Box<dyn AccountSecretsManager>,
}

impl CombinedAccountSecretsManager {
    pub fn new(
        primary: Box<dyn AccountSecretsManager>,
        secondary: Box<dyn AccountSecretsManager>,
    ) -> Self {
        Self { primary, secondary }
    }
}

impl AccountSecretsManager for CombinedAccountSecretsManager {
    fn get_secrets(&self, account: &BotAccount) -> Option<AccountSecrets> {
        if let Some(secrets) = self.primary.get_secrets(account) {
            return Some(secrets);
        }
        let secrets = self.secondary.get_secrets(account)?;
        if let Err(e) = self.primary.save_secrets(account, &secrets) {
            warn!(account = account.id, error = %e, "failed to warm primary secrets store");
        }
        Some(secrets)
    }

    fn save_secrets(&self, account: &BotAccount, secrets: &AccountSecrets) -> Result<(), StorageError> {
        let primary = self.primary.save_secrets(account, secrets);
        let secondary = self.secondary.save_secrets(account, secrets);
        primary.and(secondary)
    }

    fn invalidate(&self) {
        self.primary.invalidate();
        self.secondary.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Authorization;
    use crate::device::DeviceInfo;
    use crate::storage::{FileAccountSecretsManager, MemoryAccountSecretsManager};
    use std::sync::Arc;

    #[test]
    fn test_reads_fall_back_to_secondary() {
        let account = BotAccount::new(10001, Arc::new(Authorization::by_password("pwd")));
        let secrets = AccountSecrets::new(&DeviceInfo::random());

        let secondary = MemoryAccountSecretsManager::new();
        secondary.save_secrets(&account, &secrets).unwrap();

        let combined = CombinedAccountSecretsManager::new(
            Box::new(MemoryAccountSecretsManager::new()),
            Box::new(secondary),
        );
        assert_eq!(combined.get_secrets(&account), Some(secrets.clone()));

        // Primary прогрет, secondary больше не нужен
        combined.secondary.invalidate();
        assert_eq!(combined.get_secrets(&account), Some(secrets));
    }

    #[test]
    fn test_writes_go_to_both() {
        let account = BotAccount::new(10001, Arc::new(Authorization::by_password("pwd")));
        let secrets = AccountSecrets::new(&DeviceInfo::random());
        let combined = CombinedAccountSecretsManager::new(
            Box::new(MemoryAccountSecretsManager::new()),
            Box::new(MemoryAccountSecretsManager::new()),
        );

        combined.save_secrets(&account, &secrets).unwrap();
        assert_eq!(combined.primary.get_secrets(&account), Some(secrets.clone()));
        assert_eq!(combined.secondary.get_secrets(&account), Some(secrets));

        combined.invalidate();
        assert!(combined.get_secrets(&account).is_none());
    }

    #[test]
    fn test_file_backed_secondary_survives_restart() {
        let dir = std::env::temp_dir().join(format!("sso-core-combined-{}", uuid::Uuid::new_v4()));
        let account = BotAccount::new(10001, Arc::new(Authorization::by_password("pwd")));
        let secrets = AccountSecrets::new(&DeviceInfo::random());

        let combined = CombinedAccountSecretsManager::new(
            Box::new(MemoryAccountSecretsManager::new()),
            Box::new(FileAccountSecretsManager::new(&dir)),
        );
        combined.save_secrets(&account, &secrets).unwrap();
        assert_eq!(combined.primary.get_secrets(&account), Some(secrets.clone()));

        // Новый процесс: память пуста, файл на месте
        let restarted = CombinedAccountSecretsManager::new(
            Box::new(MemoryAccountSecretsManager::new()),
            Box::new(FileAccountSecretsManager::new(&dir)),
        );
        assert_eq!(restarted.get_secrets(&account), Some(secrets.clone()));
        assert_eq!(restarted.primary.get_secrets(&account), Some(secrets));

        std::fs::remove_dir_all(dir).ok();
    }
}
