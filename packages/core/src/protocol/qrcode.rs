// wtlogin.trans_emp: получение QR-кода и опрос его состояния

use crate::error::CryptoError;
use crate::protocol::oicq::{self, RequestEncryption};
use crate::protocol::packet::OutgoingPacket;
use crate::protocol::tlv::{read_tlv_map, TlvWriter};
use crate::session::SsoSession;
use crate::utils::io::{ByteReader, ByteWriter, ReadError};
use zeroize::Zeroize;

pub const CMD_TRANS_EMP: &str = "wtlogin.trans_emp";

pub const SUB_FETCH: u16 = 0x31;
pub const SUB_QUERY: u16 = 0x12;

/// Коды состояния QR-кода в ответе на опрос
pub const STATE_CONFIRMED: u8 = 0;
pub const STATE_TIMEOUT: u8 = 17;
pub const STATE_WAITING_FOR_SCAN: u8 = 48;
pub const STATE_WAITING_FOR_CONFIRM: u8 = 53;
pub const STATE_CANCELLED: u8 = 54;

/// Данные подтверждённого QR-кода, из них строится запрос входа
#[derive(Clone, PartialEq, Eq)]
pub struct QrCodeLoginData {
    pub uin: u64,
    pub tmp_pwd: Vec<u8>,
    pub no_pic_sig: Vec<u8>,
    pub tgt_qr: Vec<u8>,
    pub tgtgt_key: [u8; 16],
}

impl std::fmt::Debug for QrCodeLoginData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QrCodeLoginData")
            .field("uin", &self.uin)
            .field("tmp_pwd", &"<redacted>")
            .finish()
    }
}

impl Drop for QrCodeLoginData {
    fn drop(&mut self) {
        self.tmp_pwd.zeroize();
        self.tgtgt_key.zeroize();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrCodeResponse {
    Fetched { image: Vec<u8>, sig: Vec<u8> },
    WaitingForScan,
    WaitingForConfirm,
    Cancelled,
    Timeout,
    Confirmed(QrCodeLoginData),
}

fn build(session: &SsoSession, sub_command: u16, body: ByteWriter) -> Result<OutgoingPacket, CryptoError> {
    let mut payload = ByteWriter::new();
    payload.write_u16(sub_command).write_bytes(&body.into_bytes());
    let envelope = oicq::encode_request(session, oicq::CMD_TRANS_EMP, RequestEncryption::Ecdh, &payload.into_bytes())?;
    Ok(OutgoingPacket::login(CMD_TRANS_EMP, session.next_sequence_id(), sub_command, envelope))
}

/// Запросить новый QR-код
pub fn fetch_qrcode(session: &SsoSession) -> Result<OutgoingPacket, CryptoError> {
    let v = session.protocol.version();
    let mut tlvs = TlvWriter::new();
    tlvs.tlv_with(0x16, |b| {
        b.write_u32(0).write_u32(v.app_id).write_u32(v.sub_app_id);
        b.write_bytes(&session.device_guid)
            .write_u16_lv(v.apk_id.as_bytes())
            .write_u16_lv(v.sort_version.as_bytes());
    })
    .tlv_with(0x1b, |b| {
        b.write_u32(0).write_u32(0).write_u32(3).write_u32(4).write_u32(72);
        b.write_u32(2).write_u32(2).write_u16(0);
    })
    .tlv_with(0x1d, |b| {
        b.write_u8(1).write_u32(v.main_sig_map).write_u32(0).write_u8(0);
    })
    .tlv(0x33, &session.device_guid)
    .tlv_with(0x35, |b| {
        b.write_u32(8);
    });

    let mut body = ByteWriter::new();
    body.write_u32(v.app_id).write_u32(v.sub_app_id).write_bytes(&tlvs.into_bytes());
    build(session, SUB_FETCH, body)
}

/// Опросить состояние QR-кода по подписи из `Fetched`
pub fn query_qrcode(session: &SsoSession, sig: &[u8]) -> Result<OutgoingPacket, CryptoError> {
    let mut body = ByteWriter::new();
    body.write_u16_lv(sig).write_u64(0).write_u8(0).write_u16(0);
    build(session, SUB_QUERY, body)
}

pub fn decode_trans_emp_response(_session: &SsoSession, body: &[u8]) -> Result<QrCodeResponse, String> {
    decode(body).map_err(|e| e.to_string())
}

fn decode(body: &[u8]) -> Result<QrCodeResponse, ReadError> {
    let mut r = ByteReader::new(body);
    let sub_command = r.read_u16()?;
    match sub_command {
        SUB_FETCH => {
            let sig = r.read_u16_lv()?.to_vec();
            let tlv = read_tlv_map(&mut r)?;
            let image = tlv.get(&0x17).cloned().unwrap_or_default();
            Ok(QrCodeResponse::Fetched { image, sig })
        }
        SUB_QUERY => match r.read_u8()? {
            STATE_CONFIRMED => {
                let uin = r.read_u64()?;
                let tlv = read_tlv_map(&mut r)?;
                let mut tgtgt_key = [0u8; 16];
                if let Some(t1e) = tlv.get(&0x1e).filter(|t| t.len() == 16) {
                    tgtgt_key.copy_from_slice(t1e);
                }
                Ok(QrCodeResponse::Confirmed(QrCodeLoginData {
                    uin,
                    tmp_pwd: tlv.get(&0x18).cloned().unwrap_or_default(),
                    no_pic_sig: tlv.get(&0x19).cloned().unwrap_or_default(),
                    tgt_qr: tlv.get(&0x65).cloned().unwrap_or_default(),
                    tgtgt_key,
                }))
            }
            STATE_TIMEOUT => Ok(QrCodeResponse::Timeout),
            STATE_WAITING_FOR_SCAN => Ok(QrCodeResponse::WaitingForScan),
            STATE_WAITING_FOR_CONFIRM => Ok(QrCodeResponse::WaitingForConfirm),
            STATE_CANCELLED => Ok(QrCodeResponse::Cancelled),
            other => Err(ReadError::InvalidLength(other as i64)),
        },
        other => Err(ReadError::InvalidLength(other as i64)),
    }
}
