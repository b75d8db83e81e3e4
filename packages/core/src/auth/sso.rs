// SsoProcessor: вход в аккаунт
//
// fast login по сохранённым подписям, иначе slow login через AuthControl
// с циклом разрешения проверок (капча, device lock, верификация устройства).
// Секреты сохраняются только после полного успеха.

use crate::account::BotAccount;
use crate::auth::control::AuthControl;
use crate::auth::ecdh_updater::{EcdhInitialPublicKeyUpdater, InitialKeySource};
use crate::auth::qrcode::QRCodeLoginProcessor;
use crate::auth::solver::{LoginSolver, SolverError, VerificationResult};
use crate::auth::{read_session, write_session, AuthMethod, PasswordDigest};
use crate::config::BotConfiguration;
use crate::device::DeviceInfo;
use crate::error::CryptoError;
use crate::network::NetworkHandler;
use crate::protocol::login::{self, Captcha, LoginPacketResponse};
use crate::protocol::packet::{OutgoingPacket, Packet};
use crate::protocol::qrcode::QrCodeLoginData;
use crate::protocol::stat_svc::{self, OnlineStatus, RegisterResponse};
use crate::session::{SharedSession, SsoSession, LOGIN_STATE_ONLINE, LOGIN_STATE_PRE};
use crate::storage::models::AccountSecrets;
use crate::storage::{AccountSecretsManager, CacheFingerprint, CacheValidator};
use crate::utils::collector::ErrorCollector;
use crate::utils::error::{LoginError, LoginFailed, NetworkError};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Ответ на неверную капчу: сервер пришлёт новую
const REFRESH_CAPTCHA_ANSWER: &str = "ABCD";

const UNUSUAL_NETWORK_MARKER: &str = "当前上网环境异常";

/// Итог самого первого входа этого процессора
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstLoginResult {
    Passed,
    /// Сервер попросил переключиться на другой адрес
    ChangeServer,
    OtherFailure,
}

/// Повторная отправка основного запроса входа (после URL-проверки или слайдера)
type ResendLogin<'a> = &'a (dyn Fn(&SsoSession, bool) -> Result<OutgoingPacket, CryptoError> + Sync);

pub struct SsoProcessor {
    config: BotConfiguration,
    account: Arc<BotAccount>,
    device: DeviceInfo,
    secrets_manager: Arc<dyn AccountSecretsManager>,
    session: SharedSession,
    key_updater: EcdhInitialPublicKeyUpdater,
    auth_control: Option<AuthControl>,
    force_slow_login: bool,
    first_login_result: Option<FirstLoginResult>,
    register_response: Option<RegisterResponse>,
}

impl SsoProcessor {
    pub fn new(
        config: BotConfiguration,
        account: Arc<BotAccount>,
        device: DeviceInfo,
        secrets_manager: Arc<dyn AccountSecretsManager>,
    ) -> Self {
        let session =
            SsoSession::from_secrets(account.id, config.protocol, device.clone(), AccountSecrets::new(&device))
                .into_shared();
        let key_updater = EcdhInitialPublicKeyUpdater::new(default_key_source(&config), config.initial_key_verifying_key);
        Self {
            config,
            account,
            device,
            secrets_manager,
            session,
            key_updater,
            auth_control: None,
            force_slow_login: false,
            first_login_result: None,
            register_response: None,
        }
    }

    /// Заменить источник начального ECDH ключа
    pub fn with_key_updater(mut self, key_updater: EcdhInitialPublicKeyUpdater) -> Self {
        self.key_updater = key_updater;
        self
    }

    /// Сессия, общая с сетевым обработчиком
    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn first_login_result(&self) -> Option<FirstLoginResult> {
        self.first_login_result
    }

    pub fn register_response(&self) -> Option<&RegisterResponse> {
        self.register_response.as_ref()
    }

    /// Следующий `login` пойдёт сразу через slow login
    pub fn is_slow_login_forced(&self) -> bool {
        self.force_slow_login
    }

    /// Вход. `&mut self` гарантирует единственного писателя секретов.
    ///
    /// При отмене ожидающий решатель отбрасывается, секреты не пишутся.
    pub async fn login(&mut self, handler: &dyn NetworkHandler, cancel: &CancellationToken) -> Result<(), LoginError> {
        let account_id = self.account.id;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(account = account_id, "Login cancelled");
                Err(LoginError::Cancelled)
            }
            result = self.login_inner(handler) => result,
        };

        if self.first_login_result.is_none() {
            match &result {
                Ok(()) => self.first_login_result = Some(FirstLoginResult::Passed),
                Err(LoginError::Network {
                    error: NetworkError::ChangeServer,
                    ..
                }) => self.first_login_result = Some(FirstLoginResult::ChangeServer),
                Err(LoginError::Cancelled) => {}
                Err(e) if e.is_reconnect_required() => {}
                Err(_) => self.first_login_result = Some(FirstLoginResult::OtherFailure),
            }
        }
        result
    }

    async fn login_inner(&mut self, handler: &dyn NetworkHandler) -> Result<(), LoginError> {
        self.prepare_session()?;

        let has_sig_info = read_session(&self.session).map_err(failed)?.is_sig_info_initialized();
        if has_sig_info && !self.force_slow_login {
            info!(account = self.account.id, "Fast login");
            return match self.fast_login(handler).await {
                Ok(()) => self.complete(handler).await.map_err(failed),
                Err(e) => {
                    warn!(account = self.account.id, error = %e, "Fast login failed, reconnect and use slow login");
                    self.force_slow_login = true;
                    let error = match e {
                        LoginFailed::Network(NetworkError::ChangeServer) => NetworkError::ChangeServer,
                        ref e => NetworkError::ReconnectRequired(format!("fast login failed: {}", e)),
                    };
                    Err(LoginError::Network {
                        error,
                        suppressed: vec![e],
                    })
                }
            };
        }

        info!(account = self.account.id, protocol = %self.config.protocol, "Slow login");
        self.slow_login(handler).await?;
        self.force_slow_login = false;
        self.complete(handler).await.map_err(failed)
    }

    /// Ключ секретов, проверка кэша и сессия из сохранённых секретов
    fn prepare_session(&mut self) -> Result<(), LoginError> {
        self.account.secrets_key().map_err(|e| failed(e.into()))?;

        if self.config.login_cache_enabled {
            let validator = CacheValidator::new(
                self.config.cache_path(),
                CacheFingerprint::new(self.config.protocol, &self.device),
            );
            match validator.validate() {
                Ok(false) => {}
                Ok(true) => {
                    warn!(account = self.account.id, "Cache fingerprint changed, secrets invalidated");
                    self.secrets_manager.invalidate();
                }
                Err(e) => {
                    warn!(account = self.account.id, error = %e, "Cache validation failed, secrets invalidated");
                    self.secrets_manager.invalidate();
                }
            }
        }

        let secrets = self.secrets_manager.get_secrets_or_create(&self.account, &self.device);
        debug!(account = self.account.id, has_sig_info = secrets.has_sig_info(), "Session secrets loaded");
        *write_session(&self.session).map_err(failed)? =
            SsoSession::from_secrets(self.account.id, self.config.protocol, self.device.clone(), secrets);
        Ok(())
    }

    async fn fast_login(&mut self, handler: &dyn NetworkHandler) -> Result<(), LoginFailed> {
        self.key_updater.refresh_and_apply(&self.session).await?;
        let packet = login::fast_login(&*read_session(&self.session)?)?;
        match self.send_login(handler, packet).await? {
            LoginPacketResponse::Success(result) => self.apply_success(result),
            other => Err(LoginFailed::UnexpectedResponse(format!("fast login: {}", other))),
        }
    }

    async fn slow_login(&mut self, handler: &dyn NetworkHandler) -> Result<(), LoginError> {
        if let Err(e) = self.key_updater.refresh_and_apply(&self.session).await {
            return Err(failed(e.into()));
        }

        let mut control = self
            .auth_control
            .take()
            .unwrap_or_else(|| AuthControl::new(self.account.authorization().clone(), self.config.protocol));
        let mut collector = ErrorCollector::new();

        loop {
            let result = match control.acquire_auth() {
                AuthMethod::Password(digest) => self.password_login(handler, &digest, &mut collector).await,
                AuthMethod::QrCode => self.qrcode_login(handler, &mut collector).await,
                AuthMethod::Error(e) => return Err(collector.collect_throw(e)),
                AuthMethod::NotAvailable => {
                    return Err(collector.throw_first().unwrap_or(LoginError::Failed {
                        cause: LoginFailed::AuthMethodsExhausted,
                        suppressed: Vec::new(),
                    }));
                }
            };

            match result {
                Ok(()) => {
                    control.act_complete();
                    return Ok(());
                }
                Err(LoginFailed::Network(error)) => {
                    // Соединение в неизвестном состоянии: способы входа продолжатся после reconnect
                    warn!(account = self.account.id, error = %error, "Network failure during slow login");
                    self.auth_control = Some(control);
                    return Err(LoginError::Network {
                        error,
                        suppressed: collector.drain(),
                    });
                }
                Err(e) => {
                    collector.collect(e.clone());
                    control.act_method_failed(e);
                }
            }
        }
    }

    async fn password_login(
        &self,
        handler: &dyn NetworkHandler,
        digest: &PasswordDigest,
        collector: &mut ErrorCollector,
    ) -> Result<(), LoginFailed> {
        let resend = |session: &SsoSession, allow_slider: bool| login::password_login(session, digest, allow_slider);
        self.resolve_challenges(handler, &resend, collector).await
    }

    async fn qrcode_login(&self, handler: &dyn NetworkHandler, collector: &mut ErrorCollector) -> Result<(), LoginFailed> {
        let listener = self.config.qrcode_listener.clone().ok_or_else(|| {
            LoginFailed::Authorization("QR code login requires BotConfiguration::qrcode_listener".to_string())
        })?;
        let data: QrCodeLoginData = QRCodeLoginProcessor::new(
            handler,
            &self.session,
            listener.as_ref(),
            self.config.effective_qrcode_poll_interval(),
            self.config.request_timeout,
        )
        .process()
        .await?;

        if data.tgtgt_key != [0u8; 16] {
            write_session(&self.session)?.tgtgt_key = data.tgtgt_key;
        }
        let resend = move |session: &SsoSession, _allow_slider: bool| login::qrcode_login(session, &data);
        self.resolve_challenges(handler, &resend, collector).await
    }

    fn solver(&self) -> Result<Arc<dyn LoginSolver>, LoginFailed> {
        self.config.login_solver.clone().ok_or(LoginFailed::NoLoginSolver)
    }

    /// Цикл проверок: по одному ответу сервера до Success или ошибки
    async fn resolve_challenges(
        &self,
        handler: &dyn NetworkHandler,
        resend: ResendLogin<'_>,
        collector: &mut ErrorCollector,
    ) -> Result<(), LoginFailed> {
        let protocol = self.config.protocol;
        let mut allow_slider = self.config.is_slider_captcha_supported() || protocol.forces_slider_captcha();

        let packet = resend(&*read_session(&self.session)?, allow_slider)?;
        let mut response = self.send_login(handler, packet).await?;

        loop {
            info!(account = self.account.id, response = %response, "Login response");
            let packet = match response {
                LoginPacketResponse::Success(result) => return self.apply_success(result),

                LoginPacketResponse::DeviceLockLogin { t104, t402, t403 } => {
                    let mut guard = write_session(&self.session)?;
                    let session = &mut *guard;
                    session.challenge.t104 = t104.or(session.challenge.t104.take());
                    session.challenge.t402 = t402;
                    session.challenge.t403 = t403;
                    login::device_lock_login(session)?
                }

                LoginPacketResponse::VerificationNeeded { requests, t104, t174 } => {
                    {
                        let mut guard = write_session(&self.session)?;
                        let session = &mut *guard;
                        session.challenge.t104 = t104.or(session.challenge.t104.take());
                        session.challenge.t174 = t174.or(session.challenge.t174.take());
                    }
                    let solver = self.solver()?;
                    let result = solver
                        .solve_device_verification(&requests)
                        .await
                        .map_err(solver_failed)?;
                    debug!(result = ?result, "Device verification resolved");
                    let session = read_session(&self.session)?;
                    match result {
                        VerificationResult::Url => resend(&session, allow_slider)?,
                        VerificationResult::RequestSms => {
                            if requests.sms.is_none() {
                                return Err(LoginFailed::UnsupportedSmsLogin(
                                    "server did not offer SMS verification".to_string(),
                                ));
                            }
                            login::request_sms(&session)?
                        }
                        VerificationResult::Sms(code) => {
                            if requests.sms.is_none() {
                                return Err(LoginFailed::UnsupportedSmsLogin(
                                    "server did not offer SMS verification".to_string(),
                                ));
                            }
                            login::submit_sms(&session, &code)?
                        }
                    }
                }

                LoginPacketResponse::Captcha(Captcha::Picture { image, sign, t104 }) => {
                    if t104.is_some() {
                        write_session(&self.session)?.challenge.t104 = t104;
                    }
                    let solver = self.solver()?;
                    let answer = solver.solve_picture_captcha(&image).await.map_err(solver_failed)?;
                    let answer = match answer {
                        Some(answer) if answer.chars().count() == 4 => answer,
                        _ => {
                            debug!("Picture captcha answer missing or malformed, refreshing captcha");
                            REFRESH_CAPTCHA_ANSWER.to_string()
                        }
                    };
                    login::submit_picture_captcha(&*read_session(&self.session)?, &sign, &answer)?
                }

                LoginPacketResponse::Captcha(Captcha::Slider { url, t104 }) => {
                    if t104.is_some() {
                        write_session(&self.session)?.challenge.t104 = t104;
                    }
                    if self.config.is_slider_captcha_supported() {
                        let solver = self.solver()?;
                        match solver.solve_slider_captcha(&url).await {
                            Ok(Some(ticket)) => login::submit_slider_captcha(&*read_session(&self.session)?, &ticket)?,
                            Ok(None) => resend(&*read_session(&self.session)?, allow_slider)?,
                            Err(e) if allow_slider => {
                                warn!(error = %e, "Slider solver failed, retrying without slider");
                                collector.collect(solver_failed(e));
                                allow_slider = false;
                                resend(&*read_session(&self.session)?, allow_slider)?
                            }
                            Err(e) => return Err(solver_failed(e)),
                        }
                    } else if allow_slider {
                        debug!("Slider captcha is not supported, retrying with slider disabled");
                        allow_slider = false;
                        resend(&*read_session(&self.session)?, allow_slider)?
                    } else {
                        return Err(LoginFailed::UnsupportedSliderCaptcha(format!(
                            "Protocol {} requires slider captcha, but the LoginSolver does not support it \
                             (is_slider_captcha_supported() = false). Use a solver with slider support or switch protocol.",
                            protocol
                        )));
                    }
                }

                error @ LoginPacketResponse::Error { .. } => return Err(classify_error_response(&error)),
            };

            response = self.send_login(handler, packet).await?;
        }
    }

    async fn send_login(
        &self,
        handler: &dyn NetworkHandler,
        packet: OutgoingPacket,
    ) -> Result<LoginPacketResponse, LoginFailed> {
        debug!(command = %packet.command_name, sub_command = ?packet.sub_command, "Sending login packet");
        match handler.send_and_expect(packet, self.config.request_timeout).await? {
            Packet::Login(response) => Ok(response),
            other => Err(LoginFailed::UnexpectedResponse(format!("{} for wtlogin", other.name()))),
        }
    }

    fn apply_success(&self, result: login::LoginResult) -> Result<(), LoginFailed> {
        if let Some(nickname) = &result.nickname {
            info!(account = self.account.id, nickname = %nickname, "Login succeeded");
        }
        let mut session = write_session(&self.session)?;
        session.apply_login_result(result);
        session.login_state = LOGIN_STATE_ONLINE;
        Ok(())
    }

    /// Сохранить секреты, зарегистрироваться онлайн
    async fn complete(&mut self, handler: &dyn NetworkHandler) -> Result<(), LoginFailed> {
        let secrets = read_session(&self.session)?.to_secrets();
        match self.secrets_manager.save_secrets(&self.account, &secrets) {
            Ok(()) => info!(account = self.account.id, "Account secrets saved"),
            Err(e) => warn!(account = self.account.id, error = %e, "Failed to save account secrets"),
        }

        let packet = stat_svc::register(&*read_session(&self.session)?, OnlineStatus::Online);
        let response = match handler.send_and_expect(packet, self.config.request_timeout).await? {
            Packet::Register(response) => response,
            other => return Err(LoginFailed::UnexpectedResponse(format!("{} for StatSvc.register", other.name()))),
        };
        if !response.success {
            return Err(LoginFailed::RegisterFailed(response.message));
        }
        info!(account = self.account.id, "Registered online");
        self.register_response = Some(response);
        self.auth_control = None;
        Ok(())
    }

    /// Зарегистрироваться офлайн. Ошибки сети не критичны для закрытия.
    pub async fn logout(&mut self, handler: &dyn NetworkHandler) -> Result<(), LoginFailed> {
        let packet = {
            let session = read_session(&self.session)?;
            if session.login_state != LOGIN_STATE_ONLINE {
                return Ok(());
            }
            stat_svc::register(&session, OnlineStatus::Offline)
        };
        let result = handler.send_and_expect(packet, self.config.request_timeout).await;
        write_session(&self.session)?.login_state = LOGIN_STATE_PRE;
        self.register_response = None;
        match result {
            Ok(_) => {
                info!(account = self.account.id, "Logged out");
                Ok(())
            }
            Err(e) => {
                warn!(account = self.account.id, error = %e, "Logout request failed");
                Err(e.into())
            }
        }
    }
}

#[cfg(feature = "http-key-source")]
fn default_key_source(config: &BotConfiguration) -> Option<Arc<dyn InitialKeySource>> {
    let url = config.initial_key_url.as_ref()?;
    match crate::auth::ecdh_updater::HttpInitialKeySource::new(url.clone(), config.request_timeout) {
        Ok(source) => Some(Arc::new(source)),
        Err(e) => {
            warn!(error = %e, "Failed to create HTTP initial key source");
            None
        }
    }
}

#[cfg(not(feature = "http-key-source"))]
fn default_key_source(_config: &BotConfiguration) -> Option<Arc<dyn InitialKeySource>> {
    None
}

fn failed(cause: LoginFailed) -> LoginError {
    LoginError::from_collected(cause, Vec::new())
}

fn solver_failed(e: SolverError) -> LoginFailed {
    LoginFailed::Solver(e.to_string())
}

/// "0x9a" = сервер просит подождать; всё остальное считается отказом в доступе
pub fn classify_error_response(response: &LoginPacketResponse) -> LoginFailed {
    let LoginPacketResponse::Error { message, .. } = response else {
        return LoginFailed::UnexpectedResponse(response.to_string());
    };
    let description = response.to_string();
    if message.contains("0x9a") {
        return LoginFailed::RetryLater(description);
    }
    if message.contains(UNUSUAL_NETWORK_MARKER) {
        return LoginFailed::WrongPassword(format!(
            "{}. The server reports an unusual network environment; \
             enable device lock for this account and try again.",
            description
        ));
    }
    LoginFailed::WrongPassword(description)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(message: &str) -> LoginPacketResponse {
        LoginPacketResponse::Error {
            code: 1,
            title: "登录失败".to_string(),
            message: message.to_string(),
            info: String::new(),
        }
    }

    #[test]
    fn test_classify_error_response() {
        assert!(matches!(
            classify_error_response(&error("请稍后再试 (0x9a)")),
            LoginFailed::RetryLater(_)
        ));

        match classify_error_response(&error("当前上网环境异常，请更换网络环境")) {
            LoginFailed::WrongPassword(m) => assert!(m.contains("device lock")),
            other => panic!("unexpected {:?}", other),
        }

        match classify_error_response(&error("账号或密码错误")) {
            LoginFailed::WrongPassword(m) => assert!(m.contains("errorInfo=")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
