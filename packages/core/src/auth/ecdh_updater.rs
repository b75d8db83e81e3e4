// Обновление начального ECDH-ключа сервера
//
// Ключ берётся из кэша, пока не истёк. Иначе запрашивается по HTTP и
// проверяется подпись ed25519. При любой ошибке используется встроенный
// ключ: вход с ним упадёт ниже по течению и будет повторён, но не
// заблокируется здесь.

use crate::config::Config;
use crate::error::CryptoError;
use crate::session::SharedSession;
use crate::storage::models::InitialPublicKey;
use crate::utils::time::current_timestamp;
use async_trait::async_trait;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_INITIAL_KEY_VERSION: u16 = 1;

/// Встроенный ключ на случай недоступности сервера ключей
pub const DEFAULT_INITIAL_PUBLIC_KEY: [u8; 32] = [
    0x4c, 0x9f, 0x2d, 0x6e, 0x13, 0xa8, 0x57, 0xc0, 0x3b, 0x81, 0xe4, 0x1a, 0x76, 0xd2, 0x09, 0xf5,
    0x68, 0x2c, 0xb7, 0x94, 0x1e, 0x5d, 0xa3, 0x70, 0xc6, 0x0f, 0x8b, 0x39, 0xe2, 0x47, 0xd9, 0x25,
];

/// Ответ сервера ключей
#[derive(Debug, Clone, Deserialize)]
pub struct SignedInitialKey {
    #[serde(rename = "KeyVer")]
    pub key_version: u16,
    /// hex
    #[serde(rename = "PubKey")]
    pub public_key: String,
    /// hex подписи ed25519 над `"{key_version}{public_key}"`
    #[serde(rename = "PubKeySign")]
    pub signature: String,
}

#[async_trait]
pub trait InitialKeySource: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<SignedInitialKey>;
}

/// Источник ключа по HTTP (JSON)
#[cfg(feature = "http-key-source")]
pub struct HttpInitialKeySource {
    client: reqwest::Client,
    url: String,
}

#[cfg(feature = "http-key-source")]
impl HttpInitialKeySource {
    pub fn new(url: impl Into<String>, timeout: std::time::Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[cfg(feature = "http-key-source")]
#[async_trait]
impl InitialKeySource for HttpInitialKeySource {
    async fn fetch(&self) -> anyhow::Result<SignedInitialKey> {
        let response = self.client.get(&self.url).send().await?.error_for_status()?;
        Ok(response.json::<SignedInitialKey>().await?)
    }
}

pub struct EcdhInitialPublicKeyUpdater {
    source: Option<Arc<dyn InitialKeySource>>,
    verifying_key: Option<[u8; 32]>,
    ttl_secs: i64,
    current: Option<InitialPublicKey>,
}

impl EcdhInitialPublicKeyUpdater {
    pub fn new(source: Option<Arc<dyn InitialKeySource>>, verifying_key: Option<[u8; 32]>) -> Self {
        Self {
            source,
            verifying_key,
            ttl_secs: Config::global().ecdh_initial_key_ttl_secs,
            current: None,
        }
    }

    pub fn with_ttl_secs(mut self, ttl_secs: i64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Ключ после последнего `refresh`
    pub fn current_key(&self) -> Result<&InitialPublicKey, CryptoError> {
        self.current
            .as_ref()
            .ok_or_else(|| CryptoError::InvalidInputError("initial public key is not refreshed yet".to_string()))
    }

    pub async fn refresh(&mut self, cached: Option<&InitialPublicKey>) {
        let now = current_timestamp();
        if let Some(key) = cached.filter(|k| !k.is_expired(now)) {
            debug!(version = key.version, "Reusing cached initial public key");
            self.current = Some(key.clone());
            return;
        }

        let key = match self.fetch_verified(now).await {
            Ok(key) => {
                info!(version = key.version, "Initial public key updated");
                key
            }
            Err(e) => {
                warn!(error = %e, "Failed to update initial public key, using built-in default");
                InitialPublicKey {
                    version: DEFAULT_INITIAL_KEY_VERSION,
                    key: DEFAULT_INITIAL_PUBLIC_KEY.to_vec(),
                    expiry: now + self.ttl_secs,
                }
            }
        };
        self.current = Some(key);
    }

    async fn fetch_verified(&self, now: i64) -> anyhow::Result<InitialPublicKey> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no initial key source configured"))?;
        let verifying_key = self
            .verifying_key
            .ok_or_else(|| anyhow::anyhow!("no verifying key configured"))?;

        let signed = source.fetch().await?;
        verify_signed_key(&verifying_key, &signed)?;

        Ok(InitialPublicKey {
            version: signed.key_version,
            key: hex::decode(&signed.public_key)?,
            expiry: now + self.ttl_secs,
        })
    }

    /// `refresh` по ключу из сессии и применение результата к ней же.
    /// Блокировка сессии не держится во время запроса.
    pub async fn refresh_and_apply(&mut self, session: &SharedSession) -> Result<(), CryptoError> {
        let cached = session
            .read()
            .map_err(|_| CryptoError::InvalidInputError("session lock poisoned".to_string()))?
            .ecdh_initial_public_key
            .clone();
        self.refresh(cached.as_ref()).await;
        let key = self.current_key()?.clone();
        session
            .write()
            .map_err(|_| CryptoError::InvalidInputError("session lock poisoned".to_string()))?
            .apply_initial_public_key(key)
    }
}

fn verify_signed_key(verifying_key: &[u8; 32], signed: &SignedInitialKey) -> anyhow::Result<()> {
    let verifying_key = VerifyingKey::from_bytes(verifying_key)?;
    let signature = Signature::from_slice(&hex::decode(&signed.signature)?)?;
    let message = format!("{}{}", signed.key_version, signed.public_key);
    verifying_key.verify(message.as_bytes(), &signature)?;
    Ok(())
}
