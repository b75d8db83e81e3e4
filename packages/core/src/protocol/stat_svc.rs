// StatSvc: регистрация клиента онлайн/офлайн после входа

use crate::protocol::packet::OutgoingPacket;
use crate::session::SsoSession;
use crate::utils::io::{ByteReader, ByteWriter, ReadError};

pub const CMD_REGISTER: &str = "StatSvc.register";
pub const CMD_HEARTBEAT: &str = "Heartbeat.Alive";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnlineStatus {
    Online,
    Offline,
}

impl OnlineStatus {
    pub fn code(self) -> u8 {
        match self {
            OnlineStatus::Online => 11,
            OnlineStatus::Offline => 21,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
}

/// Зарегистрировать клиент с заданным статусом
pub fn register(session: &SsoSession, status: OnlineStatus) -> OutgoingPacket {
    let device = &session.device;
    let mut body = ByteWriter::new();
    body.write_u64(session.uin)
        .write_u8(status.code())
        .write_u8(0)
        .write_bytes(&session.device_guid)
        .write_u16_lv(device.model.as_bytes())
        .write_u16_lv(device.os_version.as_bytes())
        .write_u16_lv(session.protocol.version().build_version.as_bytes());
    OutgoingPacket::simple(CMD_REGISTER, session.next_sequence_id(), body.into_bytes())
}

pub fn heartbeat(session: &SsoSession) -> OutgoingPacket {
    OutgoingPacket::simple(CMD_HEARTBEAT, session.next_sequence_id(), Vec::new())
}

pub fn decode_register_response(_session: &SsoSession, body: &[u8]) -> Result<RegisterResponse, String> {
    decode(body).map_err(|e| e.to_string())
}

fn decode(body: &[u8]) -> Result<RegisterResponse, ReadError> {
    let mut r = ByteReader::new(body);
    let result = r.read_u8()?;
    let message = if r.is_empty() {
        String::new()
    } else {
        r.read_u16_lv_string()?
    };
    Ok(RegisterResponse {
        success: result == 0,
        message,
    })
}

#[cfg(test)]
pub(crate) fn encode_register_response(success: bool, message: &str) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.write_u8(if success { 0 } else { 1 }).write_u16_lv(message.as_bytes());
    w.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceInfo;
    use crate::protocol::wire::PacketType;
    use crate::protocol::Protocol;
    use crate::storage::models::AccountSecrets;

    #[test]
    fn test_register_packet_is_simple() {
        let device = DeviceInfo::random();
        let secrets = AccountSecrets::new(&device);
        let session = SsoSession::from_secrets(10001, Protocol::AndroidPad, device, secrets);
        let packet = register(&session, OnlineStatus::Online);
        assert_eq!(packet.packet_type, PacketType::Simple);
        assert_eq!(packet.command_name, CMD_REGISTER);
        assert_eq!(packet.body[8], 11);
    }

    #[test]
    fn test_decode_register_response() {
        let device = DeviceInfo::random();
        let secrets = AccountSecrets::new(&device);
        let session = SsoSession::from_secrets(10001, Protocol::AndroidPad, device, secrets);
        let ok = decode_register_response(&session, &encode_register_response(true, "")).unwrap();
        assert!(ok.success);
        let failed = decode_register_response(&session, &encode_register_response(false, "kicked")).unwrap();
        assert!(!failed.success);
        assert_eq!(failed.message, "kicked");
        assert!(decode_register_response(&session, &[]).is_err());
    }
}
