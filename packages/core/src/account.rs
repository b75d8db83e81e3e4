// Аккаунт: номер + способ авторизации + кэшированный ключ секретов

use crate::auth::BotAuthorization;
use crate::crypto::master_key::{self, KEY_LENGTH};
use crate::error::CryptoError;
use std::fmt;
use std::sync::{Arc, OnceLock};
use zeroize::Zeroizing;

pub struct BotAccount {
    pub id: u64,
    authorization: Arc<dyn BotAuthorization>,
    secrets_key: OnceLock<Zeroizing<[u8; KEY_LENGTH]>>,
}

impl BotAccount {
    pub fn new(id: u64, authorization: Arc<dyn BotAuthorization>) -> Self {
        Self {
            id,
            authorization,
            secrets_key: OnceLock::new(),
        }
    }

    pub fn authorization(&self) -> &Arc<dyn BotAuthorization> {
        &self.authorization
    }

    pub fn is_secrets_key_initialized(&self) -> bool {
        self.secrets_key.get().is_some()
    }

    /// Ключ файла секретов. Выводится один раз за жизнь аккаунта.
    pub fn secrets_key(&self) -> Result<&[u8; KEY_LENGTH], CryptoError> {
        if let Some(key) = self.secrets_key.get() {
            return Ok(key);
        }
        let material = self.authorization.secrets_key_material(self.id);
        let key = master_key::derive_secrets_key(&material, self.id)?;
        // Гонка двух потоков даст одинаковый ключ, проигравший просто отбрасывается
        let _ = self.secrets_key.set(key);
        self.secrets_key
            .get()
            .map(|k| &**k)
            .ok_or_else(|| CryptoError::KeyDerivationError("secrets key unavailable".to_string()))
    }
}

impl fmt::Debug for BotAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotAccount")
            .field("id", &self.id)
            .field("secrets_key_initialized", &self.is_secrets_key_initialized())
            .finish()
    }
}
