//! Login flow tests
//!
//! The server side is scripted at the `NetworkHandler` seam:
//! - fast / slow login selection and reconnect on fast login failure
//! - challenge loop (captcha, slider, device lock, SMS verification)
//! - error classification and first-cause reporting
//! - cancellation and all-or-nothing secrets persistence
//! - initial key refresh before fast login
//! - QR code login

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use sso_core::auth::ecdh_updater::{EcdhInitialPublicKeyUpdater, InitialKeySource, SignedInitialKey};
use sso_core::auth::solver::{
    DeviceVerificationRequests, LoginSolver, QRCodeLoginListener, QrCodeState, SmsRequest, SolverError,
    VerificationResult,
};
use sso_core::protocol::login::{Captcha, LoginPacketResponse, LoginResult};
use sso_core::protocol::packet::{OutgoingPacket, Packet};
use sso_core::protocol::qrcode::{QrCodeLoginData, QrCodeResponse};
use sso_core::protocol::stat_svc::RegisterResponse;
use sso_core::storage::models::{AccountSecrets, InitialPublicKey, SessionSigInfo};
use sso_core::storage::{AccountSecretsManager, MemoryAccountSecretsManager};
use sso_core::{
    Authorization, BotAccount, BotConfiguration, DeviceInfo, FirstLoginResult, LoginError, LoginFailed,
    NetworkError, NetworkHandler, Protocol, SsoProcessor,
};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================
// Scripted server
// ============================================

type Sent = (String, Option<u16>);

#[derive(Default)]
struct ScriptedHandler {
    script: Mutex<VecDeque<Result<Packet, NetworkError>>>,
    sent: Mutex<Vec<Sent>>,
}

impl ScriptedHandler {
    fn new(script: Vec<Result<Packet, NetworkError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, packet: &OutgoingPacket) {
        self.sent
            .lock()
            .unwrap()
            .push((packet.command_name.clone(), packet.sub_command));
    }
}

#[async_trait]
impl NetworkHandler for ScriptedHandler {
    async fn send_and_expect(&self, packet: OutgoingPacket, _timeout: Duration) -> Result<Packet, NetworkError> {
        self.record(&packet);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(NetworkError::Timeout(format!("no scripted reply for {}", packet.command_name))))
    }

    async fn send_without_expect(&self, packet: OutgoingPacket) -> Result<(), NetworkError> {
        self.record(&packet);
        Ok(())
    }
}

fn login(sub: u16) -> Sent {
    ("wtlogin.login".to_string(), Some(sub))
}

fn register() -> Sent {
    ("StatSvc.register".to_string(), None)
}

fn success() -> Result<Packet, NetworkError> {
    Ok(Packet::Login(LoginPacketResponse::Success(LoginResult {
        sig_info: SessionSigInfo {
            tgt: b"tgt".to_vec(),
            tgt_key: [1; 16],
            d2: b"d2".to_vec(),
            d2_key: [2; 16],
            wt_session_ticket: b"ticket".to_vec(),
            wt_session_ticket_key: [3; 16],
            encrypt_a1: Vec::new(),
            no_pic_sig: Vec::new(),
            s_key: Vec::new(),
            creation_time: 1_700_000_000,
        },
        ksid: Some(b"ksid".to_vec()),
        login_extra_data: Vec::new(),
        nickname: Some("bot".to_string()),
    })))
}

fn registered() -> Result<Packet, NetworkError> {
    Ok(Packet::Register(RegisterResponse {
        success: true,
        message: String::new(),
    }))
}

fn response(r: LoginPacketResponse) -> Result<Packet, NetworkError> {
    Ok(Packet::Login(r))
}

fn slider() -> Result<Packet, NetworkError> {
    response(LoginPacketResponse::Captcha(Captcha::Slider {
        url: "https://captcha.example/slider".to_string(),
        t104: Some(b"t104".to_vec()),
    }))
}

fn picture() -> Result<Packet, NetworkError> {
    response(LoginPacketResponse::Captcha(Captcha::Picture {
        image: vec![0x89, 0x50, 0x4E, 0x47],
        sign: b"sign".to_vec(),
        t104: None,
    }))
}

fn server_error(message: &str) -> Result<Packet, NetworkError> {
    response(LoginPacketResponse::Error {
        code: 1,
        title: "登录失败".to_string(),
        message: message.to_string(),
        info: String::new(),
    })
}

// ============================================
// Solver / listener
// ============================================

#[derive(Default)]
struct TestSolver {
    slider_supported: bool,
    hang: bool,
    pictures: Mutex<VecDeque<Option<String>>>,
    sliders: Mutex<VecDeque<Result<Option<String>, SolverError>>>,
    verifications: Mutex<VecDeque<VerificationResult>>,
    picture_calls: AtomicUsize,
}

#[async_trait]
impl LoginSolver for TestSolver {
    async fn solve_picture_captcha(&self, _image: &[u8]) -> Result<Option<String>, SolverError> {
        self.picture_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok(self.pictures.lock().unwrap().pop_front().flatten())
    }

    async fn solve_slider_captcha(&self, _url: &str) -> Result<Option<String>, SolverError> {
        self.sliders
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(SolverError::Failed("no slider answer".to_string())))
    }

    async fn solve_device_verification(
        &self,
        _requests: &DeviceVerificationRequests,
    ) -> Result<VerificationResult, SolverError> {
        self.verifications
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SolverError::Failed("no verification answer".to_string()))
    }

    fn is_slider_captcha_supported(&self) -> bool {
        self.slider_supported
    }
}

#[derive(Default)]
struct RecordingListener {
    images: Mutex<Vec<Vec<u8>>>,
    states: Mutex<Vec<QrCodeState>>,
}

#[async_trait]
impl QRCodeLoginListener for RecordingListener {
    async fn on_fetch_qrcode(&self, image: &[u8]) {
        self.images.lock().unwrap().push(image.to_vec());
    }

    async fn on_state_changed(&self, state: QrCodeState) {
        self.states.lock().unwrap().push(state);
    }
}

/// Ключ сервера: запоминает, сколько пакетов уже ушло к моменту запроса
struct CountingKeySource {
    key: SignedInitialKey,
    handler: Arc<ScriptedHandler>,
    sent_at_fetch: Mutex<Vec<usize>>,
}

impl CountingKeySource {
    fn new(signing: &SigningKey, version: u16, key: [u8; 32], handler: Arc<ScriptedHandler>) -> Self {
        let public_key = hex::encode(key);
        let signature = signing.sign(format!("{}{}", version, public_key).as_bytes());
        Self {
            key: SignedInitialKey {
                key_version: version,
                public_key,
                signature: hex::encode(signature.to_bytes()),
            },
            handler,
            sent_at_fetch: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl InitialKeySource for CountingKeySource {
    async fn fetch(&self) -> anyhow::Result<SignedInitialKey> {
        self.sent_at_fetch.lock().unwrap().push(self.handler.sent().len());
        Ok(self.key.clone())
    }
}

// ============================================
// Setup
// ============================================

const UIN: u64 = 10001;

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("sso-core-login-{}", uuid::Uuid::new_v4()))
}

struct Fixture {
    account: Arc<BotAccount>,
    device: DeviceInfo,
    secrets: Arc<MemoryAccountSecretsManager>,
    config: BotConfiguration,
}

impl Fixture {
    fn new(protocol: Protocol, authorization: Authorization) -> Self {
        Self {
            account: Arc::new(BotAccount::new(UIN, Arc::new(authorization))),
            device: DeviceInfo::random(),
            secrets: Arc::new(MemoryAccountSecretsManager::new()),
            config: BotConfiguration::new(protocol).with_working_dir(temp_dir()),
        }
    }

    fn with_solver(mut self, solver: Arc<TestSolver>) -> Self {
        self.config = self.config.with_login_solver(solver);
        self
    }

    fn processor(&self) -> SsoProcessor {
        SsoProcessor::new(
            self.config.clone(),
            self.account.clone(),
            self.device.clone(),
            self.secrets.clone(),
        )
    }

    fn stored_sig_info(&self) -> Option<SessionSigInfo> {
        self.secrets.get_secrets(&self.account).and_then(|s| s.sig_info)
    }
}

fn cause(err: LoginError) -> LoginFailed {
    match err {
        LoginError::Failed { cause, .. } => cause,
        other => panic!("expected login failure, got {:?}", other),
    }
}

// ============================================
// Fast / slow login
// ============================================

#[tokio::test]
async fn test_slow_login_then_fast_login() {
    let fixture = Fixture::new(Protocol::AndroidPad, Authorization::by_password("pwd"));

    let handler = ScriptedHandler::new(vec![success(), registered()]);
    let mut processor = fixture.processor();
    processor.login(&handler, &CancellationToken::new()).await.unwrap();

    assert_eq!(handler.sent(), vec![login(9), register()]);
    assert_eq!(processor.first_login_result(), Some(FirstLoginResult::Passed));
    assert!(processor.register_response().unwrap().success);
    assert_eq!(fixture.stored_sig_info().unwrap().d2_key, [2; 16]);

    // Новый процессор с теми же секретами идёт по fast login
    let handler = ScriptedHandler::new(vec![success(), registered()]);
    let mut processor = fixture.processor();
    processor.login(&handler, &CancellationToken::new()).await.unwrap();
    assert_eq!(
        handler.sent(),
        vec![("wtlogin.exchange_emp".to_string(), Some(11)), register()]
    );
}

#[tokio::test]
async fn test_fast_login_failure_requires_reconnect_then_slow_login() {
    let fixture = Fixture::new(Protocol::AndroidPad, Authorization::by_password("pwd"));
    let mut processor = fixture.processor();
    processor
        .login(&ScriptedHandler::new(vec![success(), registered()]), &CancellationToken::new())
        .await
        .unwrap();

    let handler = ScriptedHandler::new(vec![Err(NetworkError::Timeout("wtlogin.exchange_emp".to_string()))]);
    let err = processor.login(&handler, &CancellationToken::new()).await.unwrap_err();
    assert!(err.is_reconnect_required());
    assert!(matches!(
        err.suppressed(),
        [LoginFailed::Network(NetworkError::Timeout(_))]
    ));
    assert!(processor.is_slow_login_forced());

    let handler = ScriptedHandler::new(vec![success(), registered()]);
    processor.login(&handler, &CancellationToken::new()).await.unwrap();
    assert_eq!(handler.sent(), vec![login(9), register()]);
    assert!(!processor.is_slow_login_forced());
    assert_eq!(processor.first_login_result(), Some(FirstLoginResult::Passed));
}

#[tokio::test]
async fn test_expired_initial_key_refreshed_before_fast_login() {
    let fixture = Fixture::new(Protocol::AndroidPad, Authorization::by_password("pwd"));
    fixture
        .processor()
        .login(&ScriptedHandler::new(vec![success(), registered()]), &CancellationToken::new())
        .await
        .unwrap();

    let mut cached = fixture.secrets.get_secrets(&fixture.account).unwrap();
    cached.ecdh_initial_public_key = Some(InitialPublicKey {
        version: 3,
        key: vec![1; 32],
        expiry: 1,
    });
    fixture.secrets.save_secrets(&fixture.account, &cached).unwrap();

    let signing = SigningKey::from_bytes(&[42u8; 32]);
    let handler = Arc::new(ScriptedHandler::new(vec![Err(NetworkError::Timeout(
        "wtlogin.exchange_emp".to_string(),
    ))]));
    let source = Arc::new(CountingKeySource::new(&signing, 9, [5; 32], handler.clone()));
    let mut processor = fixture.processor().with_key_updater(EcdhInitialPublicKeyUpdater::new(
        Some(source.clone()),
        Some(signing.verifying_key().to_bytes()),
    ));

    let err = processor.login(&*handler, &CancellationToken::new()).await.unwrap_err();
    assert!(err.is_reconnect_required());
    // Ключ получен один раз и до единственного запроса fast login
    assert_eq!(*source.sent_at_fetch.lock().unwrap(), vec![0]);
    assert_eq!(handler.sent(), vec![("wtlogin.exchange_emp".to_string(), Some(11))]);
    assert_eq!(
        processor
            .session()
            .read()
            .unwrap()
            .ecdh_initial_public_key
            .as_ref()
            .map(|k| k.version),
        Some(9)
    );
    assert_eq!(fixture.secrets.get_secrets(&fixture.account), Some(cached));
}

#[tokio::test]
async fn test_register_failure_is_reported() {
    let fixture = Fixture::new(Protocol::AndroidPad, Authorization::by_password("pwd"));
    let handler = ScriptedHandler::new(vec![
        success(),
        Ok(Packet::Register(RegisterResponse {
            success: false,
            message: "kicked".to_string(),
        })),
    ]);
    let err = fixture
        .processor()
        .login(&handler, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(cause(err), LoginFailed::RegisterFailed("kicked".to_string()));
}

#[tokio::test]
async fn test_logout_registers_offline() {
    let fixture = Fixture::new(Protocol::AndroidPad, Authorization::by_password("pwd"));
    let mut processor = fixture.processor();
    processor
        .login(&ScriptedHandler::new(vec![success(), registered()]), &CancellationToken::new())
        .await
        .unwrap();

    let handler = ScriptedHandler::new(vec![registered()]);
    processor.logout(&handler).await.unwrap();
    assert_eq!(handler.sent(), vec![register()]);
    assert!(processor.register_response().is_none());

    // Второй logout ничего не отправляет
    let handler = ScriptedHandler::new(Vec::new());
    processor.logout(&handler).await.unwrap();
    assert!(handler.sent().is_empty());
}

// ============================================
// Challenge loop
// ============================================

#[tokio::test]
async fn test_picture_captcha_bad_answer_refreshes() {
    let solver = Arc::new(TestSolver::default());
    solver.pictures.lock().unwrap().extend([None, Some("abcd".to_string())]);
    let fixture = Fixture::new(Protocol::AndroidPad, Authorization::by_password("pwd")).with_solver(solver.clone());

    let handler = ScriptedHandler::new(vec![picture(), picture(), success(), registered()]);
    fixture
        .processor()
        .login(&handler, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(solver.picture_calls.load(Ordering::SeqCst), 2);
    assert_eq!(handler.sent(), vec![login(9), login(2), login(2), register()]);
}

#[tokio::test]
async fn test_forced_slider_retries_once_then_fails() {
    let fixture = Fixture::new(Protocol::AndroidPhone, Authorization::by_password("pwd"))
        .with_solver(Arc::new(TestSolver::default()));

    let handler = ScriptedHandler::new(vec![slider(), slider()]);
    let mut processor = fixture.processor();
    let err = processor.login(&handler, &CancellationToken::new()).await.unwrap_err();

    match cause(err) {
        LoginFailed::UnsupportedSliderCaptcha(message) => {
            assert!(message.contains("ANDROID_PHONE"));
            assert!(message.contains("is_slider_captcha_supported"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(handler.sent(), vec![login(9), login(9)]);
    assert_eq!(processor.first_login_result(), Some(FirstLoginResult::OtherFailure));
    assert!(fixture.stored_sig_info().is_none());
}

#[tokio::test]
async fn test_unforced_slider_fails_immediately() {
    let fixture = Fixture::new(Protocol::AndroidPad, Authorization::by_password("pwd"));
    let handler = ScriptedHandler::new(vec![slider()]);
    let err = fixture
        .processor()
        .login(&handler, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(cause(err), LoginFailed::UnsupportedSliderCaptcha(_)));
    assert_eq!(handler.sent(), vec![login(9)]);
}

#[tokio::test]
async fn test_slider_solver_error_retries_without_slider() {
    let solver = Arc::new(TestSolver {
        slider_supported: true,
        ..Default::default()
    });
    solver
        .sliders
        .lock()
        .unwrap()
        .push_back(Err(SolverError::Failed("browser closed".to_string())));
    let fixture = Fixture::new(Protocol::AndroidPad, Authorization::by_password("pwd")).with_solver(solver);

    let handler = ScriptedHandler::new(vec![slider(), success(), registered()]);
    fixture
        .processor()
        .login(&handler, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(handler.sent(), vec![login(9), login(9), register()]);
}

#[tokio::test]
async fn test_slider_ticket_is_submitted() {
    let solver = Arc::new(TestSolver {
        slider_supported: true,
        ..Default::default()
    });
    solver.sliders.lock().unwrap().push_back(Ok(Some("ticket".to_string())));
    let fixture = Fixture::new(Protocol::AndroidPhone, Authorization::by_password("pwd")).with_solver(solver);

    let handler = ScriptedHandler::new(vec![slider(), success(), registered()]);
    fixture
        .processor()
        .login(&handler, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(handler.sent(), vec![login(9), login(2), register()]);
}

#[tokio::test]
async fn test_device_lock_unlock() {
    let fixture = Fixture::new(Protocol::AndroidPad, Authorization::by_password("pwd"));
    let handler = ScriptedHandler::new(vec![
        response(LoginPacketResponse::DeviceLockLogin {
            t104: Some(b"t104".to_vec()),
            t402: Some(b"t402".to_vec()),
            t403: None,
        }),
        success(),
        registered(),
    ]);
    fixture
        .processor()
        .login(&handler, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(handler.sent(), vec![login(9), login(20), register()]);
}

fn verification_needed() -> Result<Packet, NetworkError> {
    response(LoginPacketResponse::VerificationNeeded {
        requests: DeviceVerificationRequests {
            fallback_url: Some("https://verify.example".to_string()),
            sms: Some(SmsRequest {
                country_code: "86".to_string(),
                phone_number: "138****0000".to_string(),
            }),
        },
        t104: Some(b"t104".to_vec()),
        t174: Some(b"t174".to_vec()),
    })
}

#[tokio::test]
async fn test_sms_verification_two_steps() {
    let solver = Arc::new(TestSolver::default());
    solver
        .verifications
        .lock()
        .unwrap()
        .extend([VerificationResult::RequestSms, VerificationResult::Sms("123456".to_string())]);
    let fixture = Fixture::new(Protocol::AndroidPad, Authorization::by_password("pwd")).with_solver(solver);

    let handler = ScriptedHandler::new(vec![
        verification_needed(),
        verification_needed(),
        success(),
        registered(),
    ]);
    fixture
        .processor()
        .login(&handler, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(handler.sent(), vec![login(9), login(8), login(7), register()]);
}

#[tokio::test]
async fn test_url_verification_resends_login() {
    let solver = Arc::new(TestSolver::default());
    solver.verifications.lock().unwrap().push_back(VerificationResult::Url);
    let fixture = Fixture::new(Protocol::AndroidPad, Authorization::by_password("pwd")).with_solver(solver);

    let handler = ScriptedHandler::new(vec![verification_needed(), success(), registered()]);
    fixture
        .processor()
        .login(&handler, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(handler.sent(), vec![login(9), login(9), register()]);
}

#[tokio::test]
async fn test_verification_without_solver() {
    let fixture = Fixture::new(Protocol::AndroidPad, Authorization::by_password("pwd"));
    let handler = ScriptedHandler::new(vec![verification_needed()]);
    let err = fixture
        .processor()
        .login(&handler, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(cause(err), LoginFailed::NoLoginSolver);
}

// ============================================
// Errors
// ============================================

#[tokio::test]
async fn test_0x9a_is_retry_later() {
    let fixture = Fixture::new(Protocol::AndroidPad, Authorization::by_password("pwd"));
    let handler = ScriptedHandler::new(vec![server_error("请稍后再试。(0x9a)")]);
    let err = fixture
        .processor()
        .login(&handler, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_recoverable());
    assert!(matches!(cause(err), LoginFailed::RetryLater(_)));
    assert!(fixture.secrets.get_secrets(&fixture.account).is_none());
}

#[tokio::test]
async fn test_wrong_password_with_network_hint() {
    let fixture = Fixture::new(Protocol::AndroidPad, Authorization::by_password("pwd"));
    let handler = ScriptedHandler::new(vec![server_error("当前上网环境异常，请更换网络环境或在常用设备上登录或稍后再试。")]);
    let err = fixture
        .processor()
        .login(&handler, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(!err.is_recoverable());
    match cause(err) {
        LoginFailed::WrongPassword(message) => assert!(message.contains("device lock")),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_first_cause_reported_when_methods_exhausted() {
    // Пароль упирается в слайдер, QR на ANDROID_PHONE недоступен
    let fixture = Fixture::new(Protocol::AndroidPhone, Authorization::password_then_qrcode("pwd"));
    let handler = ScriptedHandler::new(vec![slider(), slider()]);
    let err = fixture
        .processor()
        .login(&handler, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        LoginError::Failed { cause, suppressed } => {
            assert!(matches!(cause, LoginFailed::UnsupportedSliderCaptcha(_)));
            assert_eq!(
                suppressed,
                vec![LoginFailed::UnsupportedQrCodeLogin("ANDROID_PHONE".to_string())]
            );
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(fixture.secrets.get_secrets(&fixture.account).is_none());
}

#[tokio::test]
async fn test_exhaustion_keeps_stored_secrets() {
    let fixture = Fixture::new(Protocol::AndroidPhone, Authorization::password_then_qrcode("pwd"));
    let mut seeded = AccountSecrets::new(&fixture.device);
    seeded.ksid = b"seeded-ksid".to_vec();
    fixture.secrets.save_secrets(&fixture.account, &seeded).unwrap();

    let handler = ScriptedHandler::new(vec![slider(), slider()]);
    let err = fixture
        .processor()
        .login(&handler, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(cause(err), LoginFailed::UnsupportedSliderCaptcha(_)));
    assert_eq!(fixture.secrets.get_secrets(&fixture.account), Some(seeded));
}

#[tokio::test]
async fn test_change_server_on_first_login() {
    let fixture = Fixture::new(Protocol::AndroidPad, Authorization::by_password("pwd"));
    let handler = ScriptedHandler::new(vec![Err(NetworkError::ChangeServer)]);
    let mut processor = fixture.processor();
    let err = processor.login(&handler, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(
        err,
        LoginError::Network {
            error: NetworkError::ChangeServer,
            ..
        }
    ));
    assert_eq!(processor.first_login_result(), Some(FirstLoginResult::ChangeServer));
}

// ============================================
// Cancellation
// ============================================

#[tokio::test]
async fn test_cancel_while_solver_pending() {
    let solver = Arc::new(TestSolver {
        hang: true,
        ..Default::default()
    });
    let fixture = Fixture::new(Protocol::AndroidPad, Authorization::by_password("pwd")).with_solver(solver.clone());
    let handler = ScriptedHandler::new(vec![picture()]);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let mut processor = fixture.processor();
    let err = processor.login(&handler, &cancel).await.unwrap_err();
    assert_eq!(err, LoginError::Cancelled);
    assert_eq!(solver.picture_calls.load(Ordering::SeqCst), 1);
    assert!(fixture.secrets.get_secrets(&fixture.account).is_none());
    assert_eq!(processor.first_login_result(), None);
}

// ============================================
// QR code
// ============================================

fn qrcode(r: QrCodeResponse) -> Result<Packet, NetworkError> {
    Ok(Packet::QrCode(r))
}

fn fetched(image: &[u8]) -> Result<Packet, NetworkError> {
    qrcode(QrCodeResponse::Fetched {
        image: image.to_vec(),
        sig: b"sig".to_vec(),
    })
}

fn confirmed(uin: u64) -> Result<Packet, NetworkError> {
    qrcode(QrCodeResponse::Confirmed(QrCodeLoginData {
        uin,
        tmp_pwd: b"tmp".to_vec(),
        no_pic_sig: b"no-pic".to_vec(),
        tgt_qr: b"tgt-qr".to_vec(),
        tgtgt_key: [8; 16],
    }))
}

#[tokio::test(start_paused = true)]
async fn test_qrcode_login_refetches_after_timeout() {
    let listener = Arc::new(RecordingListener::default());
    let mut fixture = Fixture::new(Protocol::AndroidWatch, Authorization::by_qrcode());
    fixture.config = fixture.config.clone().with_qrcode_listener(listener.clone());

    let handler = ScriptedHandler::new(vec![
        fetched(b"first"),
        qrcode(QrCodeResponse::WaitingForScan),
        qrcode(QrCodeResponse::Timeout),
        fetched(b"second"),
        qrcode(QrCodeResponse::WaitingForConfirm),
        confirmed(UIN),
        success(),
        registered(),
    ]);
    fixture
        .processor()
        .login(&handler, &CancellationToken::new())
        .await
        .unwrap();

    let trans_emp = |sub| ("wtlogin.trans_emp".to_string(), Some(sub));
    assert_eq!(
        handler.sent(),
        vec![
            trans_emp(0x31),
            trans_emp(0x12),
            trans_emp(0x12),
            trans_emp(0x31),
            trans_emp(0x12),
            trans_emp(0x12),
            login(9),
            register(),
        ]
    );
    assert_eq!(
        *listener.images.lock().unwrap(),
        vec![b"first".to_vec(), b"second".to_vec()]
    );
    assert_eq!(
        *listener.states.lock().unwrap(),
        vec![
            QrCodeState::WaitingForScan,
            QrCodeState::Timeout,
            QrCodeState::WaitingForConfirm,
            QrCodeState::Confirmed,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_qrcode_confirmed_by_other_account() {
    let mut fixture = Fixture::new(Protocol::Macos, Authorization::by_qrcode());
    fixture.config = fixture
        .config
        .clone()
        .with_qrcode_listener(Arc::new(RecordingListener::default()));

    let handler = ScriptedHandler::new(vec![fetched(b"qr"), confirmed(UIN + 1)]);
    let err = fixture
        .processor()
        .login(&handler, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(cause(err), LoginFailed::Authorization(_)));
}

#[tokio::test]
async fn test_qrcode_unsupported_protocol() {
    let mut fixture = Fixture::new(Protocol::AndroidPhone, Authorization::by_qrcode());
    fixture.config = fixture
        .config
        .clone()
        .with_qrcode_listener(Arc::new(RecordingListener::default()));

    let handler = ScriptedHandler::new(Vec::new());
    let err = fixture
        .processor()
        .login(&handler, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(
        cause(err),
        LoginFailed::UnsupportedQrCodeLogin("ANDROID_PHONE".to_string())
    );
    assert!(handler.sent().is_empty());
}
