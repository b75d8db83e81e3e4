//! Аутентификация сессии
//!
//! - `control` — выбор следующего способа входа (`AuthControl`)
//! - `solver` — внешние решатели капчи / верификации и слушатель QR
//! - `ecdh_updater` — начальный ECDH ключ сервера
//! - `qrcode` — цикл входа по QR-коду
//! - `sso` — `SsoProcessor`: fast/slow login и цикл разрешения проверок

pub mod control;
pub mod ecdh_updater;
pub mod qrcode;
pub mod solver;
pub mod sso;

use crate::protocol::Protocol;
use crate::session::{SharedSession, SsoSession};
use crate::utils::error::{LoginFailed, NetworkError};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::{RwLockReadGuard, RwLockWriteGuard};
use zeroize::Zeroizing;

pub use control::AuthControl;
pub use sso::{FirstLoginResult, SsoProcessor};

fn poisoned() -> LoginFailed {
    LoginFailed::Network(NetworkError::Transport("session lock poisoned".to_string()))
}

pub(crate) fn read_session(session: &SharedSession) -> Result<RwLockReadGuard<'_, SsoSession>, LoginFailed> {
    session.read().map_err(|_| poisoned())
}

pub(crate) fn write_session(session: &SharedSession) -> Result<RwLockWriteGuard<'_, SsoSession>, LoginFailed> {
    session.write().map_err(|_| poisoned())
}

/// Дайджест пароля: единственное, что клиент хранит вместо пароля
pub type PasswordDigest = Zeroizing<[u8; 16]>;

/// Вычислить дайджест пароля
pub fn password_digest(password: &str) -> PasswordDigest {
    let digest = Sha256::digest(password.as_bytes());
    let mut out = Zeroizing::new([0u8; 16]);
    out.copy_from_slice(&digest[..16]);
    out
}

/// Способ входа для одной попытки
pub enum AuthMethod {
    Password(PasswordDigest),
    QrCode,
    /// Авторизация не может продолжаться
    Error(LoginFailed),
    /// Способы исчерпаны
    NotAvailable,
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Password(_) => f.write_str("Password(<redacted>)"),
            AuthMethod::QrCode => f.write_str("QrCode"),
            AuthMethod::Error(e) => write!(f, "Error({})", e),
            AuthMethod::NotAvailable => f.write_str("NotAvailable"),
        }
    }
}

/// Что известно о текущей попытке
#[derive(Debug, Clone, Copy)]
pub struct AuthAttempt<'a> {
    /// Номер попытки, начиная с 0
    pub index: usize,
    pub protocol: Protocol,
    pub last_failure: Option<&'a LoginFailed>,
}

/// Конфигурация авторизации аккаунта
pub trait BotAuthorization: Send + Sync {
    /// Материал для ключа файла секретов
    fn secrets_key_material(&self, account_id: u64) -> Zeroizing<Vec<u8>>;

    /// Следующий способ входа
    fn next_method(&self, attempt: &AuthAttempt<'_>) -> AuthMethod;
}

/// Стандартные сценарии авторизации
pub enum Authorization {
    Password(PasswordDigest),
    QrCode,
    /// Сначала пароль, при неудаче QR-код
    PasswordThenQrCode(PasswordDigest),
}

impl Authorization {
    pub fn by_password(password: &str) -> Self {
        Authorization::Password(password_digest(password))
    }

    pub fn by_password_digest(digest: [u8; 16]) -> Self {
        Authorization::Password(Zeroizing::new(digest))
    }

    pub fn by_qrcode() -> Self {
        Authorization::QrCode
    }

    pub fn password_then_qrcode(password: &str) -> Self {
        Authorization::PasswordThenQrCode(password_digest(password))
    }
}

impl BotAuthorization for Authorization {
    fn secrets_key_material(&self, account_id: u64) -> Zeroizing<Vec<u8>> {
        match self {
            Authorization::Password(digest) | Authorization::PasswordThenQrCode(digest) => {
                Zeroizing::new(digest.to_vec())
            }
            // Для QR учётных данных нет: ключ привязан только к номеру аккаунта
            Authorization::QrCode => {
                let mut hasher = Sha256::new();
                hasher.update(b"qrcode");
                hasher.update(account_id.to_be_bytes());
                Zeroizing::new(hasher.finalize().to_vec())
            }
        }
    }

    fn next_method(&self, attempt: &AuthAttempt<'_>) -> AuthMethod {
        match (self, attempt.index) {
            (Authorization::Password(digest), 0) => AuthMethod::Password(digest.clone()),
            (Authorization::QrCode, 0) => AuthMethod::QrCode,
            (Authorization::PasswordThenQrCode(digest), 0) => AuthMethod::Password(digest.clone()),
            (Authorization::PasswordThenQrCode(_), 1) => {
                // Неверный пароль QR-кодом не исправить, а вот капчу/слайдер можно обойти
                match attempt.last_failure {
                    Some(LoginFailed::WrongPassword(_)) => AuthMethod::NotAvailable,
                    _ if !attempt.protocol.supports_qrcode_login() => AuthMethod::Error(
                        LoginFailed::UnsupportedQrCodeLogin(attempt.protocol.to_string()),
                    ),
                    _ => AuthMethod::QrCode,
                }
            }
            _ => AuthMethod::NotAvailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(index: usize, last_failure: Option<&LoginFailed>) -> AuthAttempt<'_> {
        AuthAttempt {
            index,
            protocol: Protocol::AndroidWatch,
            last_failure,
        }
    }

    #[test]
    fn test_password_single_attempt() {
        let auth = Authorization::by_password("pwd");
        assert!(matches!(auth.next_method(&attempt(0, None)), AuthMethod::Password(_)));
        assert!(matches!(auth.next_method(&attempt(1, None)), AuthMethod::NotAvailable));
    }

    #[test]
    fn test_password_then_qrcode() {
        let auth = Authorization::password_then_qrcode("pwd");
        let slider = LoginFailed::UnsupportedSliderCaptcha("x".into());
        assert!(matches!(auth.next_method(&attempt(1, Some(&slider))), AuthMethod::QrCode));

        let wrong = LoginFailed::WrongPassword("x".into());
        assert!(matches!(
            auth.next_method(&attempt(1, Some(&wrong))),
            AuthMethod::NotAvailable
        ));
    }

    #[test]
    fn test_password_digest_is_not_password() {
        let digest = password_digest("hunter2");
        assert_ne!(&digest[..7], b"hunter2");
        assert_eq!(*digest, *password_digest("hunter2"));
    }
}
