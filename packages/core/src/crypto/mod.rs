//! Криптографический модуль
//!
//! - `tea` — блочный шифр протокола (пакеты и login-конверты)
//! - `ecdh` — X25519 для ключей login-конвертов
//! - `master_key` — ключ и AEAD для файла секретов аккаунта

pub mod ecdh;
pub mod master_key;
pub mod tea;

pub use ecdh::{Ecdh, EcdhKeyPair};
