// OICQ-конверт login-пакетов
//
//   [1] 0x02  [2] длина всего конверта  [2] версия  [2] команда  [2] 1  [4] uin
//   [2] метод шифрования  [1] 0  [..] тело  [1] 0x03

use crate::crypto::tea;
use crate::error::CryptoError;
use crate::session::{SsoSession, LOGIN_STATE_PRE};
use crate::utils::error::PacketCodecError;
use crate::utils::io::{ByteReader, ByteWriter};
use tracing::trace;

pub const OICQ_VERSION: u16 = 8001;
pub const CMD_LOGIN: u16 = 0x0810;
pub const CMD_TRANS_EMP: u16 = 0x0812;

/// Методы шифрования в ответах сервера
pub const RESPONSE_METHOD_DEFAULT: u16 = 0;
pub const RESPONSE_METHOD_SESSION: u16 = 3;
pub const RESPONSE_METHOD_ECDH: u16 = 4;

/// Шифрование клиентского запроса
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestEncryption {
    /// Начальный ECDH ключ сервера (slow login, QR)
    Ecdh,
    /// wtSessionTicket из предыдущего входа (fast login)
    SessionTicket,
}

impl RequestEncryption {
    fn code(self) -> u16 {
        match self {
            RequestEncryption::Ecdh => 0x87,
            RequestEncryption::SessionTicket => 0x45,
        }
    }
}

fn wrap(uin: u64, command: u16, method: u16, body: &[u8]) -> Vec<u8> {
    let total = 1 + 2 + 2 + 2 + 2 + 4 + 2 + 1 + body.len() + 1;
    let mut w = ByteWriter::with_capacity(total);
    w.write_u8(0x02)
        .write_u16(total as u16)
        .write_u16(OICQ_VERSION)
        .write_u16(command)
        .write_u16(1)
        .write_u32(uin as u32)
        .write_u16(method)
        .write_u8(0)
        .write_bytes(body)
        .write_u8(0x03);
    w.into_bytes()
}

/// Завернуть `payload` в конверт запроса
pub fn encode_request(
    session: &SsoSession,
    command: u16,
    encryption: RequestEncryption,
    payload: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let mut body = ByteWriter::new();
    match encryption {
        RequestEncryption::Ecdh => {
            let share_key = session.ecdh.initial_share_key()?;
            body.write_u8(0x02)
                .write_u8(0x01)
                .write_bytes(&session.random_key)
                .write_u16(0x0131)
                .write_u16(session.ecdh.initial_key_version())
                .write_u16_lv(&session.ecdh.key_pair.public_key())
                .write_bytes(&tea::encrypt(payload, &share_key));
        }
        RequestEncryption::SessionTicket => {
            let sig = session.sig_info.as_ref().ok_or_else(|| {
                CryptoError::InvalidInputError("session ticket is not available".to_string())
            })?;
            body.write_u16_lv(&sig.wt_session_ticket)
                .write_bytes(&tea::encrypt(payload, &sig.wt_session_ticket_key));
        }
    }
    Ok(wrap(session.uin, command, encryption.code(), &body.into_bytes()))
}

fn malformed(e: impl std::fmt::Display) -> PacketCodecError {
    PacketCodecError::other(format!("malformed oicq response: {}", e))
}

/// Снять конверт ответа сервера
pub fn decode_response(session: &SsoSession, data: &[u8]) -> Result<Vec<u8>, PacketCodecError> {
    let mut r = ByteReader::new(data);
    let head = r.read_u8().map_err(malformed)?;
    if head != 0x02 {
        return Err(malformed(format!("expected 0x02, got 0x{:02X}", head)));
    }
    r.skip(2 + 2).map_err(malformed)?; // длина + версия
    let command = r.read_u16().map_err(malformed)?;
    r.skip(2).map_err(malformed)?;
    let _uin = r.read_u32().map_err(malformed)?;
    let method = r.read_u16().map_err(malformed)?;
    r.skip(1).map_err(malformed)?;

    let rest = r.read_rest();
    let (body, tail) = match rest.split_last() {
        Some((tail, body)) => (body, *tail),
        None => return Err(malformed("empty body")),
    };
    if tail != 0x03 {
        return Err(malformed(format!("expected trailing 0x03, got 0x{:02X}", tail)));
    }

    trace!(command = format!("0x{:04X}", command), method, len = body.len(), "decoding oicq response");

    match method {
        RESPONSE_METHOD_ECDH => {
            let mut r = ByteReader::new(body);
            let peer = r.read_u16_lv().map_err(malformed)?;
            let share_key = session.ecdh.key_pair.share_key(peer)?;
            Ok(tea::decrypt(r.read_rest(), &share_key)?)
        }
        RESPONSE_METHOD_SESSION => {
            let sig = session
                .sig_info
                .as_ref()
                .ok_or_else(|| PacketCodecError::other("session ticket key is not available"))?;
            Ok(tea::decrypt(body, &sig.wt_session_ticket_key)?)
        }
        RESPONSE_METHOD_DEFAULT => {
            if session.login_state == LOGIN_STATE_PRE {
                // До входа сервер отвечает либо initial share key, либо random key
                let by_share_key = session
                    .ecdh
                    .initial_share_key()
                    .and_then(|key| tea::decrypt(body, &key));
                match by_share_key {
                    Ok(plain) => Ok(plain),
                    Err(_) => Ok(tea::decrypt(body, &session.random_key)?),
                }
            } else {
                Ok(tea::decrypt(body, &session.random_key)?)
            }
        }
        other => Err(PacketCodecError::other(format!(
            "illegal oicq encryption method {}",
            other
        ))),
    }
}

/// Серверная сторона конверта для тестов
#[cfg(test)]
pub(crate) fn encode_response(
    uin: u64,
    command: u16,
    method: u16,
    key: &[u8; 16],
    peer_public_key: Option<&[u8]>,
    payload: &[u8],
) -> Vec<u8> {
    let mut body = ByteWriter::new();
    if let Some(peer) = peer_public_key {
        body.write_u16_lv(peer);
    }
    body.write_bytes(&tea::encrypt(payload, key));
    wrap(uin, command, method, &body.into_bytes())
}

/// Разобрать клиентский запрос (ECDH) так, как это сделал бы сервер
#[cfg(test)]
pub(crate) fn decode_ecdh_request(share_key: &[u8; 16], data: &[u8]) -> (u16, Vec<u8>) {
    let mut r = ByteReader::new(data);
    r.skip(5).unwrap();
    let command = r.read_u16().unwrap();
    r.skip(2 + 4).unwrap();
    assert_eq!(r.read_u16().unwrap(), 0x87);
    r.skip(1 + 2 + 16 + 2 + 2).unwrap();
    r.read_u16_lv().unwrap();
    let rest = r.read_rest();
    let payload = tea::decrypt(&rest[..rest.len() - 1], share_key).unwrap();
    (command, payload)
}
