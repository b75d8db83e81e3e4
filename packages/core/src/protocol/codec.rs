// Кодек SSO-пакетов: фрейм <-> RawIncomingPacket <-> Packet

use crate::config::{BotConfiguration, Config};
use crate::protocol::factories::find_packet_factory;
use crate::protocol::oicq;
use crate::protocol::packet::{IncomingPacket, OutgoingPacket, RawIncomingPacket};
use crate::protocol::wire::{self, EncryptMethod, SsoFrame};
use crate::session::{SsoSession, LOGIN_STATE_PRE};
use crate::utils::error::PacketCodecError;
use tracing::{debug, trace, warn};

/// Кодек без собственного состояния, кроме allow-list.
/// Один кадр кодируется/декодируется под одной блокировкой сессии.
#[derive(Debug, Clone)]
pub struct PacketCodec {
    reserved_flag_allow_list: Vec<String>,
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new(Config::global().reserved_flag_allow_list.clone())
    }
}

impl PacketCodec {
    pub fn new(reserved_flag_allow_list: Vec<String>) -> Self {
        Self {
            reserved_flag_allow_list,
        }
    }

    /// Кодек с allow-list из настроек аккаунта
    pub fn for_configuration(config: &BotConfiguration) -> Self {
        Self::new(config.reserved_flag_allow_list.clone())
    }

    fn is_reserved_flag_allowed(&self, command_name: &str) -> bool {
        self.reserved_flag_allow_list
            .iter()
            .any(|prefix| command_name.starts_with(prefix.as_str()))
    }

    /// Расшифровать фрейм, проверить return code и reserved flag,
    /// снять OICQ-конверт с login-пакетов.
    pub fn decode_frame(&self, session: &SsoSession, bytes: &[u8]) -> Result<RawIncomingPacket, PacketCodecError> {
        let frame = wire::decode_frame(bytes, session.d2_key())?;

        if frame.reserved_flag != 0 && !self.is_reserved_flag_allowed(&frame.command_name) {
            return Err(PacketCodecError::protocol_updated(format!(
                "unexpected reserved flag {} for {}",
                frame.reserved_flag, frame.command_name
            )));
        }

        wire::classify_return_code(frame.return_code)
            .map_err(|e| PacketCodecError::new(e.kind, format!("{} ({})", e.message, frame.command_name)))?;

        if Config::global().packet_debug {
            debug!(
                command = %frame.command_name,
                sequence_id = frame.sequence_id,
                len = frame.body.len(),
                "Packet received"
            );
        }

        let body = match frame.encrypt_method {
            EncryptMethod::ZeroKey if frame.command_name.starts_with("wtlogin.") => {
                oicq::decode_response(session, &frame.body)?
            }
            _ => frame.body,
        };

        Ok(RawIncomingPacket {
            command_name: frame.command_name,
            sequence_id: frame.sequence_id,
            session_id: frame.session_id,
            body,
        })
    }

    /// Разобрать тело зарегистрированным разборщиком.
    /// Неизвестная команда = `None`; ошибка разбора попадает в `result`.
    pub fn process_body(&self, session: &SsoSession, raw: RawIncomingPacket) -> Option<IncomingPacket> {
        let Some(factory) = find_packet_factory(&raw.command_name) else {
            trace!(command = %raw.command_name, "No factory for command, packet ignored");
            return None;
        };

        let result = factory(session, &raw.body);
        if let Err(e) = &result {
            warn!(command = %raw.command_name, error = %e, "Failed to decode packet body");
        }
        Some(IncomingPacket {
            command_name: raw.command_name,
            sequence_id: raw.sequence_id,
            result,
        })
    }

    /// Выбор ключа: wtlogin и всё до входа идёт под нулевым ключом, дальше D2
    pub fn encode_packet(&self, session: &SsoSession, packet: &OutgoingPacket) -> Result<Vec<u8>, PacketCodecError> {
        let d2_key = session.d2_key();
        let encrypt_method = if packet.is_wtlogin() || session.login_state == LOGIN_STATE_PRE || d2_key.is_none() {
            EncryptMethod::ZeroKey
        } else {
            EncryptMethod::D2Key
        };

        if Config::global().packet_debug {
            debug!(
                command = %packet.command_name,
                sequence_id = packet.sequence_id,
                sub_command = ?packet.sub_command,
                encrypt_method = ?encrypt_method,
                "Packet sent"
            );
        }

        let frame = SsoFrame {
            packet_type: packet.packet_type,
            encrypt_method,
            reserved_flag: 0,
            uin: session.uin_string(),
            sequence_id: packet.sequence_id,
            return_code: 0,
            extra: Vec::new(),
            command_name: packet.command_name.clone(),
            session_id: session.outgoing_session_id.clone(),
            compression: packet.compression,
            body: packet.body.clone(),
        };
        wire::encode_frame(&frame, d2_key)
    }
}
