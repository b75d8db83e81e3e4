//! Централизованная конфигурация SSO Core
//!
//! `Config` — процессные константы и тюнинг (OnceLock синглтон, только чтение).
//! `BotConfiguration` — настройки конкретного аккаунта, передаются явно.

use crate::auth::solver::{LoginSolver, QRCodeLoginListener};
use crate::protocol::Protocol;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Глобальная конфигурация (синглтон, неизменяемая после инициализации)
static GLOBAL_CONFIG: OnceLock<Config> = OnceLock::new();

/// Основная структура конфигурации
#[derive(Debug, Clone)]
pub struct Config {
    // ============================================
    // КРИПТОГРАФИЧЕСКИЕ ПАРАМЕТРЫ
    // ============================================

    /// PBKDF2: количество итераций для деривации ключа файла секретов
    pub pbkdf2_iterations: u32,

    /// Длина nonce для AES-GCM (в байтах)
    pub nonce_length: usize,

    /// Время жизни начального ECDH ключа, если сервер не указал срок (в секундах)
    pub ecdh_initial_key_ttl_secs: i64,

    // ============================================
    // СЕТЕВЫЕ ПАРАМЕТРЫ
    // ============================================

    /// Таймаут одной пары запрос/ответ (в миллисекундах)
    pub request_timeout_ms: u64,

    /// Минимальный интервал опроса статуса QR-кода (в миллисекундах)
    pub qrcode_min_poll_interval_ms: u64,

    /// Интервал опроса статуса QR-кода по умолчанию (в миллисекундах)
    pub qrcode_default_poll_interval_ms: u64,

    /// Максимальный размер одного фрейма (в байтах)
    pub max_frame_length: u32,

    /// Префиксы команд, которым разрешён ненулевой reserved flag
    pub reserved_flag_allow_list: Vec<String>,

    // ============================================
    // ОТЛАДКА
    // ============================================

    /// Подробное логирование содержимого пакетов
    pub packet_debug: bool,
}

impl Config {
    /// Создать конфигурацию с дефолтными значениями
    pub fn default() -> Self {
        Self {
            // Криптография
            pbkdf2_iterations: 100_000,
            nonce_length: 12,
            ecdh_initial_key_ttl_secs: 24 * 60 * 60, // 1 day

            // Сеть
            request_timeout_ms: 5_000,
            qrcode_min_poll_interval_ms: 1_000,
            qrcode_default_poll_interval_ms: 5_000,
            max_frame_length: 16 * 1024 * 1024,
            reserved_flag_allow_list: vec!["trpc.".to_string()],

            packet_debug: false,
        }
    }

    /// Создать конфигурацию из переменных окружения
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Переопределяем значения из env, если они заданы
        if let Ok(val) = std::env::var("SSO_REQUEST_TIMEOUT_MS") {
            if let Ok(parsed) = val.parse() {
                config.request_timeout_ms = parsed;
            }
        }

        if let Ok(val) = std::env::var("SSO_QRCODE_MIN_POLL_MS") {
            if let Ok(parsed) = val.parse() {
                config.qrcode_min_poll_interval_ms = parsed;
            }
        }

        if let Ok(val) = std::env::var("SSO_ECDH_KEY_TTL_SECS") {
            if let Ok(parsed) = val.parse() {
                config.ecdh_initial_key_ttl_secs = parsed;
            }
        }

        if let Ok(val) = std::env::var("SSO_PBKDF2_ITERATIONS") {
            if let Ok(parsed) = val.parse() {
                config.pbkdf2_iterations = parsed;
            }
        }

        if let Ok(val) = std::env::var("SSO_MAX_FRAME_LEN") {
            if let Ok(parsed) = val.parse() {
                config.max_frame_length = parsed;
            }
        }

        if let Ok(val) = std::env::var("SSO_PACKET_DEBUG") {
            config.packet_debug = matches!(val.as_str(), "1" | "true" | "yes");
        }

        config
    }

    /// Получить глобальный экземпляр конфигурации
    ///
    /// Автоматически инициализирует конфигурацию со значениями по умолчанию при первом вызове
    pub fn global() -> &'static Config {
        GLOBAL_CONFIG.get_or_init(Config::default)
    }

    /// Инициализировать глобальную конфигурацию из переменных окружения
    ///
    /// # Errors
    ///
    /// Возвращает ошибку, если конфигурация уже была инициализирована
    pub fn init_from_env() -> Result<(), &'static str> {
        GLOBAL_CONFIG
            .set(Self::from_env())
            .map_err(|_| "Config already initialized")
    }

    /// Инициализировать глобальную конфигурацию с кастомным экземпляром
    ///
    /// # Errors
    ///
    /// Возвращает ошибку, если конфигурация уже была инициализирована
    pub fn init_with(config: Config) -> Result<(), &'static str> {
        GLOBAL_CONFIG
            .set(config)
            .map_err(|_| "Config already initialized")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn qrcode_min_poll_interval(&self) -> Duration {
        Duration::from_millis(self.qrcode_min_poll_interval_ms)
    }
}

/// Настройки одного аккаунта
#[derive(Clone)]
pub struct BotConfiguration {
    /// Протокол (тип клиента), от которого зависят версии и доступные способы входа
    pub protocol: Protocol,

    /// Рабочая директория аккаунта
    pub working_dir: PathBuf,

    /// Директория кэша относительно `working_dir`
    pub cache_dir: PathBuf,

    /// Сохранять секреты сессии на диск для fast login
    pub login_cache_enabled: bool,

    /// Решатель капчи/верификации устройства
    pub login_solver: Option<Arc<dyn LoginSolver>>,

    /// Получает изображение QR-кода и изменения его состояния
    pub qrcode_listener: Option<Arc<dyn QRCodeLoginListener>>,

    /// Интервал опроса статуса QR-кода (не меньше `Config::qrcode_min_poll_interval_ms`)
    pub qrcode_poll_interval: Duration,

    /// Таймаут одной пары запрос/ответ
    pub request_timeout: Duration,

    /// Префиксы команд, которым разрешён ненулевой reserved flag
    pub reserved_flag_allow_list: Vec<String>,

    /// Ed25519 ключ для проверки подписи начального ECDH ключа
    pub initial_key_verifying_key: Option<[u8; 32]>,

    /// Адрес, с которого загружается начальный ECDH ключ
    pub initial_key_url: Option<String>,
}

impl BotConfiguration {
    pub fn new(protocol: Protocol) -> Self {
        let global = Config::global();
        Self {
            protocol,
            working_dir: PathBuf::from("."),
            cache_dir: PathBuf::from("cache"),
            login_cache_enabled: true,
            login_solver: None,
            qrcode_listener: None,
            qrcode_poll_interval: Duration::from_millis(global.qrcode_default_poll_interval_ms),
            request_timeout: global.request_timeout(),
            reserved_flag_allow_list: global.reserved_flag_allow_list.clone(),
            initial_key_verifying_key: None,
            initial_key_url: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_login_solver(mut self, solver: Arc<dyn LoginSolver>) -> Self {
        self.login_solver = Some(solver);
        self
    }

    pub fn with_qrcode_listener(mut self, listener: Arc<dyn QRCodeLoginListener>) -> Self {
        self.qrcode_listener = Some(listener);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_qrcode_poll_interval(mut self, interval: Duration) -> Self {
        self.qrcode_poll_interval = interval;
        self
    }

    /// Абсолютный путь к директории кэша
    pub fn cache_path(&self) -> PathBuf {
        self.working_dir.join(&self.cache_dir)
    }

    /// Интервал опроса с учётом минимального порога
    pub fn effective_qrcode_poll_interval(&self) -> Duration {
        self.qrcode_poll_interval
            .max(Config::global().qrcode_min_poll_interval())
    }

    pub fn is_slider_captcha_supported(&self) -> bool {
        self.login_solver
            .as_ref()
            .map(|s| s.is_slider_captcha_supported())
            .unwrap_or(false)
    }
}

impl Default for BotConfiguration {
    fn default() -> Self {
        Self::new(Protocol::AndroidPhone)
    }
}

impl fmt::Debug for BotConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfiguration")
            .field("protocol", &self.protocol)
            .field("working_dir", &self.working_dir)
            .field("cache_dir", &self.cache_dir)
            .field("login_cache_enabled", &self.login_cache_enabled)
            .field("login_solver", &self.login_solver.is_some())
            .field("qrcode_listener", &self.qrcode_listener.is_some())
            .field("qrcode_poll_interval", &self.qrcode_poll_interval)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
