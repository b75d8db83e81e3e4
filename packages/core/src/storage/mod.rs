// Хранилище секретов аккаунта и валидация кэшей
//
// Три стратегии: память (на время процесса), зашифрованный файл (переживает
// перезапуск) и композиция (память как первичный кэш, файл как тёплый старт).

pub mod cache_validator;
pub mod combined;
pub mod file;
pub mod memory;
pub mod models;

use crate::account::BotAccount;
use crate::device::DeviceInfo;
use crate::utils::error::StorageError;
use models::AccountSecrets;

pub use cache_validator::{CacheFingerprint, CacheValidator};
pub use combined::CombinedAccountSecretsManager;
pub use file::FileAccountSecretsManager;
pub use memory::MemoryAccountSecretsManager;

/// Хранилище секретов.
///
/// Ошибки чтения деградируют в `None`: вход всегда может пройти через slow login.
pub trait AccountSecretsManager: Send + Sync {
    fn get_secrets(&self, account: &BotAccount) -> Option<AccountSecrets>;

    fn save_secrets(&self, account: &BotAccount, secrets: &AccountSecrets) -> Result<(), StorageError>;

    fn invalidate(&self);

    /// Сохранённые секреты или свежие для `device`. Новые секреты не сохраняются,
    /// запись происходит только после успешного входа.
    fn get_secrets_or_create(&self, account: &BotAccount, device: &DeviceInfo) -> AccountSecrets {
        match self.get_secrets(account) {
            Some(secrets) if secrets.device_guid == device.guid() => secrets,
            Some(_) => {
                tracing::warn!(account = account.id, "stored secrets belong to another device, ignoring");
                AccountSecrets::new(device)
            }
            None => AccountSecrets::new(device),
        }
    }
}
