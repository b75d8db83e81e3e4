// Ключ файла секретов аккаунта
// PBKDF2 для деривации ключа из секретного материала аккаунта + AES-256-GCM для шифрования

use crate::config::Config;
use crate::error::CryptoError;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

pub const KEY_LENGTH: usize = 32;

const SALT_DOMAIN: &[u8] = b"sso-account-secrets";

/// Соль детерминирована: один и тот же аккаунт всегда получает один и тот же ключ
fn account_salt(account_id: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(SALT_DOMAIN);
    hasher.update(account_id.to_be_bytes());
    hasher.finalize().into()
}

/// Деривировать ключ файла секретов
///
/// # Arguments
/// * `material` - Секретный материал аккаунта (дайджест пароля и т.п.)
/// * `account_id` - Номер аккаунта
///
/// # Returns
/// 256-битный ключ для AES-256-GCM
pub fn derive_secrets_key(
    material: &[u8],
    account_id: u64,
) -> Result<Zeroizing<[u8; KEY_LENGTH]>, CryptoError> {
    if material.is_empty() {
        return Err(CryptoError::KeyDerivationError(
            "Key material cannot be empty".to_string(),
        ));
    }

    let mut key = Zeroizing::new([0u8; KEY_LENGTH]);
    pbkdf2_hmac::<Sha256>(
        material,
        &account_salt(account_id),
        Config::global().pbkdf2_iterations,
        &mut *key,
    );

    Ok(key)
}

/// Зашифровать данные, результат: nonce || ciphertext || tag
pub fn seal(key: &[u8; KEY_LENGTH], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(key.into());
    let nonce_length = Config::global().nonce_length;

    let mut nonce_bytes = vec![0u8; nonce_length];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, data)
        .map_err(|e| CryptoError::AeadEncryptionError(e.to_string()))?;

    let mut result = Vec::with_capacity(nonce_length + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Расшифровать данные, зашифрованные [`seal`]
pub fn open(key: &[u8; KEY_LENGTH], data: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = Aes256Gcm::new(key.into());
    let nonce_length = Config::global().nonce_length;

    if data.len() < nonce_length {
        return Err(CryptoError::AeadDecryptionError(
            "Invalid ciphertext: too short".to_string(),
        ));
    }

    let (nonce_bytes, ciphertext) = data.split_at(nonce_length);
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher.decrypt(nonce, ciphertext)?;
    Ok(Zeroizing::new(plaintext))
}
