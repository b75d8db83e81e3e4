// Валидация кэшей: при смене протокола/устройства старые ключи бесполезны
// и опасны для нового handshake, поэтому кэш сносится целиком.

use crate::device::DeviceInfo;
use crate::protocol::Protocol;
use crate::storage::models::SECRETS_FORMAT_VERSION;
use crate::utils::error::StorageError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const VALIDATION_FILE_NAME: &str = "cache-validation.json";

/// То, что должно совпасть, чтобы кэш считался пригодным
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheFingerprint {
    pub format_version: u32,
    pub protocol: String,
    pub device: String,
}

impl CacheFingerprint {
    pub fn new(protocol: Protocol, device: &DeviceInfo) -> Self {
        Self {
            format_version: SECRETS_FORMAT_VERSION,
            protocol: protocol.fingerprint(),
            device: device.fingerprint(),
        }
    }
}

pub struct CacheValidator {
    cache_dir: PathBuf,
    fingerprint: CacheFingerprint,
}

impl CacheValidator {
    pub fn new(cache_dir: impl Into<PathBuf>, fingerprint: CacheFingerprint) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            fingerprint,
        }
    }

    fn validation_file(&self) -> PathBuf {
        self.cache_dir.join(VALIDATION_FILE_NAME)
    }

    /// Проверить кэш. Возвращает `true`, если кэш был сброшен.
    ///
    /// Нечитаемый файл отпечатка = несовпадение: сброс идёт в любом случае.
    pub fn validate(&self) -> Result<bool, StorageError> {
        let stored = match fs::read(self.validation_file()) {
            Ok(bytes) => serde_json::from_slice::<CacheFingerprint>(&bytes).ok(),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(error = %e, "failed to read cache fingerprint");
                None
            }
        };

        let invalidated = match stored {
            Some(stored) if stored == self.fingerprint => false,
            Some(stored) => {
                info!(
                    old_protocol = %stored.protocol,
                    new_protocol = %self.fingerprint.protocol,
                    "cache fingerprint changed, invalidating caches"
                );
                clear_dir(&self.cache_dir);
                true
            }
            None => {
                // Кэш без отпечатка (старая версия или повреждение) не доверяем
                let has_files = fs::read_dir(&self.cache_dir)
                    .map(|mut it| it.next().is_some())
                    .unwrap_or(false);
                if has_files {
                    info!("cache fingerprint missing or corrupted, invalidating caches");
                    clear_dir(&self.cache_dir);
                }
                has_files
            }
        };

        fs::create_dir_all(&self.cache_dir)?;
        let json = serde_json::to_vec_pretty(&self.fingerprint)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        fs::write(self.validation_file(), json)?;
        Ok(invalidated)
    }
}

/// Удалить всё содержимое директории, продолжая при частичных ошибках
fn clear_dir(dir: &Path) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to delete cache entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("sso-core-cache-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_first_run_writes_fingerprint() {
        let dir = temp_dir();
        let device = DeviceInfo::random();
        let validator = CacheValidator::new(&dir, CacheFingerprint::new(Protocol::AndroidPad, &device));

        assert!(!validator.validate().unwrap());
        assert!(dir.join(VALIDATION_FILE_NAME).exists());
        assert!(!validator.validate().unwrap());

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_protocol_change_wipes_cache() {
        let dir = temp_dir();
        let device = DeviceInfo::random();
        CacheValidator::new(&dir, CacheFingerprint::new(Protocol::AndroidPad, &device))
            .validate()
            .unwrap();
        fs::write(dir.join("account.secrets"), b"old").unwrap();

        let validator = CacheValidator::new(&dir, CacheFingerprint::new(Protocol::Macos, &device));
        assert!(validator.validate().unwrap());
        assert!(!dir.join("account.secrets").exists());

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_corrupted_fingerprint_wipes_cache() {
        let dir = temp_dir();
        fs::create_dir_all(dir.join("contacts")).unwrap();
        fs::write(dir.join(VALIDATION_FILE_NAME), b"{not json").unwrap();
        fs::write(dir.join("contacts").join("friends.bin"), b"x").unwrap();

        let validator = CacheValidator::new(
            &dir,
            CacheFingerprint::new(Protocol::AndroidPhone, &DeviceInfo::random()),
        );
        assert!(validator.validate().unwrap());
        assert!(!dir.join("contacts").exists());
        assert!(dir.join(VALIDATION_FILE_NAME).exists());

        fs::remove_dir_all(dir).ok();
    }
}
