// SSO Core
// Аутентификация сессии и кодек пакетов SSO-протокола

#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)]

// Модули
pub mod account;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod device;
pub mod error;
pub mod network;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod utils;

// Re-exports для удобства
pub use account::BotAccount;
pub use auth::{AuthControl, Authorization, BotAuthorization, FirstLoginResult, SsoProcessor};
pub use config::{BotConfiguration, Config};
pub use device::DeviceInfo;
pub use error::CryptoError;
pub use network::{FramedNetworkHandler, NetworkHandler};
pub use protocol::{PacketCodec, Protocol};
pub use session::{SharedSession, SsoSession};
pub use storage::AccountSecretsManager;
pub use utils::error::{CodecErrorKind, LoginError, LoginFailed, NetworkError, PacketCodecError};
