// Внешние решатели: капча, слайдер, верификация устройства, QR-слушатель
//
// Методы могут ждать человека сколь угодно долго. Отмена входа просто
// отбрасывает future решателя.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    #[error("Solver does not support this challenge: {0}")]
    Unsupported(String),

    #[error("Solver failed: {0}")]
    Failed(String),
}

/// Способы верификации нового устройства, предложенные сервером
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceVerificationRequests {
    /// Проверка через страницу в браузере
    pub fallback_url: Option<String>,
    /// Проверка SMS-кодом
    pub sms: Option<SmsRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsRequest {
    pub country_code: String,
    pub phone_number: String,
}

/// Решение по верификации устройства
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    /// Пользователь прошёл проверку по ссылке
    Url,
    /// Попросить сервер отправить SMS-код
    RequestSms,
    /// Введённый SMS-код
    Sms(String),
}

#[async_trait]
pub trait LoginSolver: Send + Sync {
    /// Ответ на картинку-капчу. `None` или не 4 символа = обновить капчу.
    async fn solve_picture_captcha(&self, image: &[u8]) -> Result<Option<String>, SolverError>;

    /// Тикет слайдера. `None` = запросить новую проверку.
    async fn solve_slider_captcha(&self, url: &str) -> Result<Option<String>, SolverError>;

    async fn solve_device_verification(
        &self,
        requests: &DeviceVerificationRequests,
    ) -> Result<VerificationResult, SolverError>;

    fn is_slider_captcha_supported(&self) -> bool {
        false
    }
}

/// Состояние QR-кода на стороне сервера
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrCodeState {
    WaitingForScan,
    WaitingForConfirm,
    Cancelled,
    Timeout,
    Confirmed,
    Default,
}

/// Слушатель событий входа по QR-коду. Только уведомления.
#[async_trait]
pub trait QRCodeLoginListener: Send + Sync {
    async fn on_fetch_qrcode(&self, image: &[u8]);

    async fn on_state_changed(&self, _state: QrCodeState) {}

    async fn on_interval_loop(&self) {}

    async fn on_completed(&self) {}
}
