// Типы клиентов (протоколы) и их параметры

use serde::{Deserialize, Serialize};
use std::fmt;

/// Протокол, под видом которого работает клиент
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// Android телефон, поддерживаются все функции
    AndroidPhone,
    AndroidPad,
    AndroidWatch,
    Ipad,
    Macos,
}

/// Параметры версии клиента
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub app_id: u32,
    pub sub_app_id: u32,
    pub sort_version: &'static str,
    pub build_version: &'static str,
    pub apk_id: &'static str,
    pub sso_version: u32,
    pub main_sig_map: u32,
}

impl Protocol {
    pub fn version(&self) -> ProtocolVersion {
        match self {
            Protocol::AndroidPhone => ProtocolVersion {
                app_id: 16,
                sub_app_id: 537_066_738,
                sort_version: "8.8.88",
                build_version: "8.8.88.7083",
                apk_id: "com.tencent.mobileqq",
                sso_version: 18,
                main_sig_map: 34_869_472,
            },
            Protocol::AndroidPad => ProtocolVersion {
                app_id: 16,
                sub_app_id: 537_065_739,
                sort_version: "8.8.88",
                build_version: "8.8.88.7083",
                apk_id: "com.tencent.mobileqq",
                sso_version: 18,
                main_sig_map: 34_869_472,
            },
            Protocol::AndroidWatch => ProtocolVersion {
                app_id: 16,
                sub_app_id: 537_061_176,
                sort_version: "2.0.8",
                build_version: "2.0.8",
                apk_id: "com.tencent.qqlite",
                sso_version: 5,
                main_sig_map: 16_724_722,
            },
            Protocol::Ipad => ProtocolVersion {
                app_id: 16,
                sub_app_id: 537_118_044,
                sort_version: "8.8.38",
                build_version: "8.8.38.2266",
                apk_id: "com.tencent.minihd.qq",
                sso_version: 12,
                main_sig_map: 34_869_472,
            },
            Protocol::Macos => ProtocolVersion {
                app_id: 16,
                sub_app_id: 537_128_930,
                sort_version: "5.8.9",
                build_version: "5.8.9.3460",
                apk_id: "com.tencent.minihd.qq",
                sso_version: 12,
                main_sig_map: 1_970_400,
            },
        }
    }

    /// Вход по QR-коду доступен только для часов и macOS
    pub fn supports_qrcode_login(&self) -> bool {
        matches!(self, Protocol::AndroidWatch | Protocol::Macos)
    }

    /// Сервер всегда требует слайдер для этого протокола
    pub fn forces_slider_captcha(&self) -> bool {
        matches!(self, Protocol::AndroidPhone)
    }

    /// Строка версии для валидации кэшей
    pub fn fingerprint(&self) -> String {
        let v = self.version();
        format!("{}:{}:{}", self, v.sub_app_id, v.build_version)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Protocol::AndroidPhone => "ANDROID_PHONE",
            Protocol::AndroidPad => "ANDROID_PAD",
            Protocol::AndroidWatch => "ANDROID_WATCH",
            Protocol::Ipad => "IPAD",
            Protocol::Macos => "MACOS",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qrcode_support() {
        assert!(Protocol::AndroidWatch.supports_qrcode_login());
        assert!(Protocol::Macos.supports_qrcode_login());
        assert!(!Protocol::AndroidPhone.supports_qrcode_login());
    }

    #[test]
    fn test_fingerprints_differ() {
        assert_ne!(
            Protocol::AndroidPhone.fingerprint(),
            Protocol::AndroidPad.fingerprint()
        );
    }
}
