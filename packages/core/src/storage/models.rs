// Модели данных для хранилища секретов

use crate::device::DeviceInfo;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Версия формата. Несовпадение при загрузке = "секретов нет" + удаление файла
pub const SECRETS_FORMAT_VERSION: u32 = 1;

/// Начальный публичный ключ сервера для ECDH
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialPublicKey {
    pub version: u16,
    #[serde(with = "serde_bytes")]
    pub key: Vec<u8>,
    /// Unix timestamp (секунды), после которого ключ надо перезапросить
    pub expiry: i64,
}

impl InitialPublicKey {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expiry
    }
}

/// Подписи/тикеты, выданные сервером после входа (нужны для fast login)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSigInfo {
    #[serde(with = "serde_bytes")]
    pub tgt: Vec<u8>,
    pub tgt_key: [u8; 16],
    #[serde(with = "serde_bytes")]
    pub d2: Vec<u8>,
    pub d2_key: [u8; 16],
    #[serde(with = "serde_bytes")]
    pub wt_session_ticket: Vec<u8>,
    pub wt_session_ticket_key: [u8; 16],
    #[serde(with = "serde_bytes")]
    pub encrypt_a1: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub no_pic_sig: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub s_key: Vec<u8>,
    pub creation_time: i64,
}

/// Одноразовые данные о предыдущих входах
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoginExtraData {
    pub uin: u64,
    #[serde(with = "serde_bytes")]
    pub ip: Vec<u8>,
    pub time: i32,
    pub version: i32,
}

/// Секреты аккаунта (ЗАШИФРОВАНЫ на диске!)
///
/// Сравнение структурное и побайтовое: используется для проверки свежести кэша.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSecrets {
    pub format_version: u32,
    pub sig_info: Option<SessionSigInfo>,
    pub login_extra_data: BTreeSet<LoginExtraData>,
    pub device_guid: [u8; 16],
    #[serde(with = "serde_bytes")]
    pub dpwd: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub random_seed: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub ksid: Vec<u8>,
    pub tgtgt_key: [u8; 16],
    pub random_key: [u8; 16],
    pub ecdh_initial_public_key: Option<InitialPublicKey>,
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut out);
    out
}

impl AccountSecrets {
    /// Свежие секреты для устройства, которое ещё не входило
    pub fn new(device: &DeviceInfo) -> Self {
        let guid = device.guid();

        let mut hasher = Sha256::new();
        hasher.update(random_bytes::<16>());
        hasher.update(guid);
        let digest = hasher.finalize();
        let mut tgtgt_key = [0u8; 16];
        tgtgt_key.copy_from_slice(&digest[..16]);

        Self {
            format_version: SECRETS_FORMAT_VERSION,
            sig_info: None,
            login_extra_data: BTreeSet::new(),
            device_guid: guid,
            dpwd: random_bytes::<16>().to_vec(),
            random_seed: random_bytes::<8>().to_vec(),
            ksid: Vec::new(),
            tgtgt_key,
            random_key: random_bytes::<16>(),
            ecdh_initial_public_key: None,
        }
    }

    pub fn has_sig_info(&self) -> bool {
        self.sig_info.is_some()
    }
}
