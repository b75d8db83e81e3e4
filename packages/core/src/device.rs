// Описание виртуального устройства

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Виртуальное устройство, от имени которого выполняется вход
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub display: String,
    pub product: String,
    pub device: String,
    pub brand: String,
    pub model: String,
    pub os_version: String,
    pub android_id: String,
    pub imei: String,
    pub mac_address: String,
    pub wifi_ssid: String,
    #[serde(with = "serde_bytes")]
    pub boot_id: Vec<u8>,
}

impl DeviceInfo {
    /// Сгенерировать случайное устройство
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let mut boot_id = vec![0u8; 16];
        rng.fill_bytes(&mut boot_id);

        let suffix: u32 = rng.gen_range(100_000..999_999);
        let imei: String = (0..15).map(|_| char::from(b'0' + rng.gen_range(0..10u8))).collect();
        let mac: Vec<String> = (0..6).map(|_| format!("{:02X}", rng.gen::<u8>())).collect();

        Self {
            display: format!("SSO.{}.001", suffix),
            product: "sso".to_string(),
            device: "sso".to_string(),
            brand: "sso".to_string(),
            model: "sso".to_string(),
            os_version: "10".to_string(),
            android_id: format!("SSO.{}.001", suffix),
            imei,
            mac_address: mac.join(":"),
            wifi_ssid: "<unknown ssid>".to_string(),
            boot_id,
        }
    }

    /// Guid устройства: детерминированно выводится из android_id и mac
    pub fn guid(&self) -> [u8; 16] {
        let mut hasher = Sha256::new();
        hasher.update(self.android_id.as_bytes());
        hasher.update(self.mac_address.as_bytes());
        let digest = hasher.finalize();
        let mut guid = [0u8; 16];
        guid.copy_from_slice(&digest[..16]);
        guid
    }

    /// Отпечаток устройства для валидации кэшей
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.guid());
        hasher.update(self.imei.as_bytes());
        hasher.update(self.model.as_bytes());
        hasher.update(self.os_version.as_bytes());
        hex::encode(hasher.finalize())
    }
}
