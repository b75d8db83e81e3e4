// Реестр разборщиков тел пакетов по имени команды

use crate::protocol::login::{self, CMD_EXCHANGE_EMP, CMD_LOGIN};
use crate::protocol::packet::{Packet, PacketDecodeError};
use crate::protocol::qrcode::{self, CMD_TRANS_EMP};
use crate::protocol::stat_svc::{self, CMD_HEARTBEAT, CMD_REGISTER};
use crate::session::SsoSession;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Разбор тела. Ошибка разбора — данные, а не паника.
pub type PacketFactory = fn(&SsoSession, &[u8]) -> Result<Packet, PacketDecodeError>;

static FACTORIES: Lazy<HashMap<&'static str, PacketFactory>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, PacketFactory> = HashMap::new();
    map.insert(CMD_LOGIN, |s, b| {
        login::decode_login_response(s, b)
            .map(Packet::Login)
            .map_err(|e| PacketDecodeError::new(CMD_LOGIN, e))
    });
    map.insert(CMD_EXCHANGE_EMP, |s, b| {
        login::decode_exchange_emp_response(s, b)
            .map(Packet::Login)
            .map_err(|e| PacketDecodeError::new(CMD_EXCHANGE_EMP, e))
    });
    map.insert(CMD_TRANS_EMP, |s, b| {
        qrcode::decode_trans_emp_response(s, b)
            .map(Packet::QrCode)
            .map_err(|e| PacketDecodeError::new(CMD_TRANS_EMP, e))
    });
    map.insert(CMD_REGISTER, |s, b| {
        stat_svc::decode_register_response(s, b)
            .map(Packet::Register)
            .map_err(|e| PacketDecodeError::new(CMD_REGISTER, e))
    });
    map.insert(CMD_HEARTBEAT, |_, _| Ok(Packet::Heartbeat));
    map
});

/// `None` для неизвестных команд
pub fn find_packet_factory(command_name: &str) -> Option<PacketFactory> {
    FACTORIES.get(command_name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_commands() {
        assert!(find_packet_factory("wtlogin.login").is_some());
        assert!(find_packet_factory("StatSvc.register").is_some());
        assert!(find_packet_factory("MessageSvc.PushNotify").is_none());
    }
}
