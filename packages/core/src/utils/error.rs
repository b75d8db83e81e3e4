// Типы ошибок

use crate::error::CryptoError;
use thiserror::Error;

/// Причина отказа кодека: от неё зависит политика восстановления
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecErrorKind {
    /// Ключи сессии устарели, нужен reconnect + fast login
    SessionExpired,
    /// Сервер прислал то, чего мы не понимаем (новая версия протокола)
    ProtocolUpdated,
    Other,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Packet codec error ({kind:?}): {message}")]
pub struct PacketCodecError {
    pub kind: CodecErrorKind,
    pub message: String,
}

impl PacketCodecError {
    pub fn new(kind: CodecErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn session_expired(message: impl Into<String>) -> Self {
        Self::new(CodecErrorKind::SessionExpired, message)
    }

    pub fn protocol_updated(message: impl Into<String>) -> Self {
        Self::new(CodecErrorKind::ProtocolUpdated, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(CodecErrorKind::Other, message)
    }

    /// Только SessionExpired приводит к автоматическому переподключению
    pub fn requires_reconnect(&self) -> bool {
        self.kind == CodecErrorKind::SessionExpired
    }
}

impl From<CryptoError> for PacketCodecError {
    fn from(err: CryptoError) -> Self {
        PacketCodecError::other(err.to_string())
    }
}

/// Сетевые ошибки. Восстановление (reconnect) выполняет владелец соединения.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection closed")]
    Closed,

    #[error(transparent)]
    Codec(#[from] PacketCodecError),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Reconnect required: {0}")]
    ReconnectRequired(String),

    #[error("Server requested to change server")]
    ChangeServer,
}

impl NetworkError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            NetworkError::Codec(e) => e.requires_reconnect(),
            NetworkError::Decode(_) => false,
            _ => true,
        }
    }
}

/// Ошибки входа в аккаунт
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoginFailed {
    #[error("Wrong password: {0}")]
    WrongPassword(String),

    #[error("Login rejected, retry later: {0}")]
    RetryLater(String),

    #[error("Unable to complete slider captcha. {0}")]
    UnsupportedSliderCaptcha(String),

    #[error("SMS verification is not supported: {0}")]
    UnsupportedSmsLogin(String),

    #[error("Protocol {0} does not support QR code login")]
    UnsupportedQrCodeLogin(String),

    #[error("No LoginSolver configured, set BotConfiguration::login_solver")]
    NoLoginSolver,

    #[error("All authorization methods exhausted")]
    AuthMethodsExhausted,

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Login solver failed: {0}")]
    Solver(String),

    #[error("Unexpected login response: {0}")]
    UnexpectedResponse(String),

    #[error("Failed to register client online: {0}")]
    RegisterFailed(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl LoginFailed {
    /// Имеет ли смысл повторять попытку входа автоматически
    pub fn is_recoverable(&self) -> bool {
        match self {
            LoginFailed::RetryLater(_) => true,
            LoginFailed::Network(e) => e.is_recoverable(),
            _ => false,
        }
    }
}

/// Итог неудачного `SsoProcessor::login`
///
/// `suppressed` содержит ошибки, собранные после первой (первопричины).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    #[error("{cause}")]
    Failed {
        cause: LoginFailed,
        suppressed: Vec<LoginFailed>,
    },

    #[error("{error}")]
    Network {
        error: NetworkError,
        suppressed: Vec<LoginFailed>,
    },

    #[error("Login cancelled")]
    Cancelled,
}

impl LoginError {
    /// Разложить первую собранную ошибку на сетевую/логическую
    pub fn from_collected(cause: LoginFailed, suppressed: Vec<LoginFailed>) -> Self {
        match cause {
            LoginFailed::Network(error) => LoginError::Network { error, suppressed },
            cause => LoginError::Failed { cause, suppressed },
        }
    }

    pub fn suppressed(&self) -> &[LoginFailed] {
        match self {
            LoginError::Failed { suppressed, .. } | LoginError::Network { suppressed, .. } => {
                suppressed
            }
            LoginError::Cancelled => &[],
        }
    }

    pub fn is_reconnect_required(&self) -> bool {
        matches!(
            self,
            LoginError::Network {
                error: NetworkError::ReconnectRequired(_),
                ..
            }
        )
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            LoginError::Failed { cause, .. } => cause.is_recoverable(),
            LoginError::Network { error, .. } => error.is_recoverable(),
            LoginError::Cancelled => false,
        }
    }
}

/// Ошибки хранилища секретов
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Secrets key material is not initialized")]
    MissingKeyMaterial,
}

pub type Result<T> = std::result::Result<T, LoginFailed>;
