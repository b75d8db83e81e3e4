// ECDH (X25519) для шифрования login-пакетов
//
// Начальный ключ сервера используется только для первого сообщения slow login,
// дальше сервер присылает свой публичный ключ в ответе (encrypt method 4).

use crate::error::CryptoError;
use crate::storage::models::InitialPublicKey;
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};

const SHARE_KEY_INFO: &[u8] = b"sso-ecdh-share-key";

/// Пара ключей клиента
pub struct EcdhKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl EcdhKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// 16-байтный TEA ключ из общего секрета с `peer_public`
    pub fn share_key(&self, peer_public: &[u8]) -> Result<[u8; 16], CryptoError> {
        let peer: [u8; 32] = peer_public.try_into().map_err(|_| {
            CryptoError::InvalidInputError(format!(
                "peer public key must be 32 bytes, got {}",
                peer_public.len()
            ))
        })?;
        let shared = self.secret.diffie_hellman(&PublicKey::from(peer));
        if !shared.was_contributory() {
            return Err(CryptoError::KeyGenerationError(
                "non-contributory peer public key".to_string(),
            ));
        }

        let hk = Hkdf::<Sha256>::new(None, shared.as_bytes());
        let mut okm = [0u8; 16];
        hk.expand(SHARE_KEY_INFO, &mut okm)?;
        Ok(okm)
    }
}

/// ECDH состояние одной сессии
pub struct Ecdh {
    pub key_pair: EcdhKeyPair,
    initial_share_key: Option<[u8; 16]>,
    initial_key_version: u16,
}

impl Ecdh {
    pub fn new() -> Self {
        Self {
            key_pair: EcdhKeyPair::generate(),
            initial_share_key: None,
            initial_key_version: 0,
        }
    }

    /// Пересчитать начальный share key из нового публичного ключа сервера
    pub fn apply_initial_public_key(&mut self, key: &InitialPublicKey) -> Result<(), CryptoError> {
        let share = self.key_pair.share_key(&key.key)?;
        self.initial_share_key = Some(share);
        self.initial_key_version = key.version;
        Ok(())
    }

    pub fn initial_share_key(&self) -> Result<[u8; 16], CryptoError> {
        self.initial_share_key.ok_or_else(|| {
            CryptoError::InvalidInputError("initial public key is not applied".to_string())
        })
    }

    pub fn initial_key_version(&self) -> u16 {
        self.initial_key_version
    }
}

impl Default for Ecdh {
    fn default() -> Self {
        Self::new()
    }
}
