// Выбор способа входа и учёт исчерпания

use crate::auth::{AuthAttempt, AuthMethod, BotAuthorization};
use crate::protocol::Protocol;
use crate::utils::error::LoginFailed;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlState {
    Running,
    Completed,
    Exhausted,
}

/// Выдаёт способы входа по одному, пока авторизация не завершится или не исчерпается
pub struct AuthControl {
    authorization: Arc<dyn BotAuthorization>,
    protocol: Protocol,
    attempts: usize,
    last_failure: Option<LoginFailed>,
    state: ControlState,
}

impl AuthControl {
    pub fn new(authorization: Arc<dyn BotAuthorization>, protocol: Protocol) -> Self {
        Self {
            authorization,
            protocol,
            attempts: 0,
            last_failure: None,
            state: ControlState::Running,
        }
    }

    /// Следующий способ входа. После `NotAvailable`/`Error` всегда `NotAvailable`.
    pub fn acquire_auth(&mut self) -> AuthMethod {
        if self.state != ControlState::Running {
            return AuthMethod::NotAvailable;
        }

        let attempt = AuthAttempt {
            index: self.attempts,
            protocol: self.protocol,
            last_failure: self.last_failure.as_ref(),
        };
        let method = self.authorization.next_method(&attempt);
        debug!(attempt = self.attempts, method = ?method, "acquired auth method");

        match method {
            AuthMethod::Error(_) | AuthMethod::NotAvailable => {
                self.state = ControlState::Exhausted;
            }
            _ => self.attempts += 1,
        }
        method
    }

    pub fn act_method_failed(&mut self, error: LoginFailed) {
        info!(attempt = self.attempts, error = %error, "auth method failed");
        self.last_failure = Some(error);
    }

    pub fn act_complete(&mut self) {
        self.state = ControlState::Completed;
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == ControlState::Exhausted
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Authorization;

    #[test]
    fn test_exhaustion_is_sticky() {
        let mut control = AuthControl::new(
            Arc::new(Authorization::by_password("pwd")),
            Protocol::AndroidPhone,
        );
        assert!(matches!(control.acquire_auth(), AuthMethod::Password(_)));
        control.act_method_failed(LoginFailed::RetryLater("0x9a".into()));
        assert!(matches!(control.acquire_auth(), AuthMethod::NotAvailable));
        assert!(control.is_exhausted());
        assert!(matches!(control.acquire_auth(), AuthMethod::NotAvailable));
        assert_eq!(control.attempts(), 1);
    }

    #[test]
    fn test_complete_stops_selection() {
        let mut control = AuthControl::new(Arc::new(Authorization::by_qrcode()), Protocol::Macos);
        assert!(matches!(control.acquire_auth(), AuthMethod::QrCode));
        control.act_complete();
        assert!(matches!(control.acquire_auth(), AuthMethod::NotAvailable));
        assert!(!control.is_exhausted());
    }

    #[test]
    fn test_qrcode_fallback_on_unsupported_protocol() {
        let mut control = AuthControl::new(
            Arc::new(Authorization::password_then_qrcode("pwd")),
            Protocol::AndroidPhone,
        );
        assert!(matches!(control.acquire_auth(), AuthMethod::Password(_)));
        control.act_method_failed(LoginFailed::UnsupportedSliderCaptcha("x".into()));
        match control.acquire_auth() {
            AuthMethod::Error(LoginFailed::UnsupportedQrCodeLogin(p)) => assert_eq!(p, "ANDROID_PHONE"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
