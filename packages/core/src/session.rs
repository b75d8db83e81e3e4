// Состояние одного соединения (SsoSession)
//
// Строится из AccountSecrets при подключении, живёт до закрытия соединения.
// Разделяется между SsoProcessor и кодеком как `Arc<RwLock<SsoSession>>`;
// блокировка никогда не держится через await.

use crate::crypto::Ecdh;
use crate::device::DeviceInfo;
use crate::error::CryptoError;
use crate::protocol::login::LoginResult;
use crate::protocol::Protocol;
use crate::storage::models::{AccountSecrets, InitialPublicKey, LoginExtraData, SessionSigInfo, SECRETS_FORMAT_VERSION};
use rand::Rng;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, RwLock};

pub type SharedSession = Arc<RwLock<SsoSession>>;

/// До входа пакеты шифруются login-ключами, после — D2
pub const LOGIN_STATE_PRE: u8 = 0;
pub const LOGIN_STATE_ONLINE: u8 = 1;

/// Данные, которые сервер выдаёт посреди цикла проверок
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChallengeContext {
    pub t104: Option<Vec<u8>>,
    pub t174: Option<Vec<u8>>,
    pub t402: Option<Vec<u8>>,
    pub t403: Option<Vec<u8>>,
}

pub struct SsoSession {
    pub uin: u64,
    pub protocol: Protocol,
    pub device: DeviceInfo,

    pub outgoing_session_id: Vec<u8>,
    pub login_state: u8,

    pub sig_info: Option<SessionSigInfo>,
    pub random_key: [u8; 16],
    pub tgtgt_key: [u8; 16],
    pub device_guid: [u8; 16],
    pub dpwd: Vec<u8>,
    pub random_seed: Vec<u8>,
    pub ksid: Vec<u8>,
    pub login_extra_data: BTreeSet<LoginExtraData>,
    pub ecdh_initial_public_key: Option<InitialPublicKey>,

    pub ecdh: Ecdh,
    pub challenge: ChallengeContext,

    sequence_id: AtomicI32,
}

impl SsoSession {
    pub fn from_secrets(uin: u64, protocol: Protocol, device: DeviceInfo, secrets: AccountSecrets) -> Self {
        let mut rng = rand::thread_rng();
        let mut outgoing_session_id = vec![0x02, 0xB0, 0x5B, 0x8B];
        outgoing_session_id[3] = rng.gen();

        Self {
            uin,
            protocol,
            device,
            outgoing_session_id,
            login_state: LOGIN_STATE_PRE,
            sig_info: secrets.sig_info,
            random_key: secrets.random_key,
            tgtgt_key: secrets.tgtgt_key,
            device_guid: secrets.device_guid,
            dpwd: secrets.dpwd,
            random_seed: secrets.random_seed,
            ksid: secrets.ksid,
            login_extra_data: secrets.login_extra_data,
            ecdh_initial_public_key: secrets.ecdh_initial_public_key,
            ecdh: Ecdh::new(),
            challenge: ChallengeContext::default(),
            sequence_id: AtomicI32::new(rng.gen_range(10_000..80_000)),
        }
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(RwLock::new(self))
    }

    /// Секреты для сохранения. Только выведенные ключи и токены сервера.
    pub fn to_secrets(&self) -> AccountSecrets {
        AccountSecrets {
            format_version: SECRETS_FORMAT_VERSION,
            sig_info: self.sig_info.clone(),
            login_extra_data: self.login_extra_data.clone(),
            device_guid: self.device_guid,
            dpwd: self.dpwd.clone(),
            random_seed: self.random_seed.clone(),
            ksid: self.ksid.clone(),
            tgtgt_key: self.tgtgt_key,
            random_key: self.random_key,
            ecdh_initial_public_key: self.ecdh_initial_public_key.clone(),
        }
    }

    pub fn is_sig_info_initialized(&self) -> bool {
        self.sig_info.is_some()
    }

    pub fn d2_key(&self) -> Option<&[u8; 16]> {
        self.sig_info.as_ref().map(|s| &s.d2_key)
    }

    pub fn next_sequence_id(&self) -> i32 {
        self.sequence_id.fetch_add(2, Ordering::SeqCst) + 2
    }

    pub fn uin_string(&self) -> String {
        self.uin.to_string()
    }

    /// Применить новый начальный ключ сервера к ECDH этой сессии
    pub fn apply_initial_public_key(&mut self, key: InitialPublicKey) -> Result<(), CryptoError> {
        self.ecdh.apply_initial_public_key(&key)?;
        self.ecdh_initial_public_key = Some(key);
        Ok(())
    }

    /// Успешный ответ на вход: новые подписи и одноразовые данные
    pub fn apply_login_result(&mut self, result: LoginResult) {
        self.sig_info = Some(result.sig_info);
        if let Some(ksid) = result.ksid {
            self.ksid = ksid;
        }
        // Сервер выдаёт набор заново при каждом входе
        self.login_extra_data = result.login_extra_data.into_iter().collect();
        self.challenge = ChallengeContext::default();
    }
}
