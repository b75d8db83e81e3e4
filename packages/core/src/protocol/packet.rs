// Пакеты: исходящие, сырые входящие, декодированные

use crate::protocol::login::LoginPacketResponse;
use crate::protocol::qrcode::QrCodeResponse;
use crate::protocol::stat_svc::RegisterResponse;
use crate::protocol::wire::{CompressionMode, PacketType};
use thiserror::Error;

/// Исходящий пакет: тело уже сериализовано (для login — в OICQ-конверте),
/// шифрование и фрейм добавляет кодек.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingPacket {
    pub command_name: String,
    pub sequence_id: i32,
    pub packet_type: PacketType,
    /// Подкоманда wtlogin, для журналов и сопоставления ответов
    pub sub_command: Option<u16>,
    pub compression: CompressionMode,
    pub body: Vec<u8>,
}

impl OutgoingPacket {
    pub fn login(command_name: &str, sequence_id: i32, sub_command: u16, body: Vec<u8>) -> Self {
        Self {
            command_name: command_name.to_string(),
            sequence_id,
            packet_type: PacketType::Login,
            sub_command: Some(sub_command),
            compression: CompressionMode::Raw,
            body,
        }
    }

    pub fn simple(command_name: &str, sequence_id: i32, body: Vec<u8>) -> Self {
        Self {
            command_name: command_name.to_string(),
            sequence_id,
            packet_type: PacketType::Simple,
            sub_command: None,
            compression: CompressionMode::Raw,
            body,
        }
    }

    /// Команды wtlogin всегда идут под нулевым ключом
    pub fn is_wtlogin(&self) -> bool {
        self.command_name.starts_with("wtlogin.")
    }
}

/// Фрейм после расшифровки и распаковки, тело ещё не разобрано
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawIncomingPacket {
    pub command_name: String,
    pub sequence_id: i32,
    /// outgoing session id, выданный сервером в заголовке фрейма
    pub session_id: Vec<u8>,
    pub body: Vec<u8>,
}

/// Ошибка разбора тела одного пакета. Это данные, а не исключение.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to decode {command_name}: {message}")]
pub struct PacketDecodeError {
    pub command_name: String,
    pub message: String,
}

impl PacketDecodeError {
    pub fn new(command_name: &str, message: impl Into<String>) -> Self {
        Self {
            command_name: command_name.to_string(),
            message: message.into(),
        }
    }
}

/// Типизированное тело пакета
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Login(LoginPacketResponse),
    QrCode(QrCodeResponse),
    Register(RegisterResponse),
    Heartbeat,
}

impl Packet {
    pub fn name(&self) -> &'static str {
        match self {
            Packet::Login(_) => "Login",
            Packet::QrCode(_) => "QrCode",
            Packet::Register(_) => "Register",
            Packet::Heartbeat => "Heartbeat",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingPacket {
    pub command_name: String,
    pub sequence_id: i32,
    pub result: Result<Packet, PacketDecodeError>,
}
