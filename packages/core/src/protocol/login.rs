// wtlogin: запросы входа и разбор ответов

use crate::auth::solver::{DeviceVerificationRequests, SmsRequest};
use crate::crypto::tea;
use crate::error::CryptoError;
use crate::protocol::oicq::{self, RequestEncryption};
use crate::protocol::packet::OutgoingPacket;
use crate::protocol::qrcode::QrCodeLoginData;
use crate::protocol::tlv::{read_tlv_map, TlvWriter};
use crate::session::SsoSession;
use crate::storage::models::{LoginExtraData, SessionSigInfo};
use crate::utils::io::{ByteReader, ByteWriter, ReadError};
use crate::utils::time::current_timestamp;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

pub const CMD_LOGIN: &str = "wtlogin.login";
pub const CMD_EXCHANGE_EMP: &str = "wtlogin.exchange_emp";

pub const SUB_PASSWORD: u16 = 9;
pub const SUB_FAST: u16 = 11;
pub const SUB_DEVICE_LOCK: u16 = 20;
pub const SUB_CAPTCHA: u16 = 2;
pub const SUB_REQUEST_SMS: u16 = 8;
pub const SUB_SUBMIT_SMS: u16 = 7;

const LOCALE_ID: u32 = 2052;

/// Результат успешного входа
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResult {
    pub sig_info: SessionSigInfo,
    pub ksid: Option<Vec<u8>>,
    pub login_extra_data: Vec<LoginExtraData>,
    pub nickname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captcha {
    Picture {
        image: Vec<u8>,
        sign: Vec<u8>,
        t104: Option<Vec<u8>>,
    },
    Slider {
        url: String,
        t104: Option<Vec<u8>>,
    },
}

/// Ответ сервера на любой wtlogin запрос
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginPacketResponse {
    Success(LoginResult),
    DeviceLockLogin {
        t104: Option<Vec<u8>>,
        t402: Option<Vec<u8>>,
        t403: Option<Vec<u8>>,
    },
    VerificationNeeded {
        requests: DeviceVerificationRequests,
        t104: Option<Vec<u8>>,
        t174: Option<Vec<u8>>,
    },
    Captcha(Captcha),
    Error {
        code: u8,
        title: String,
        message: String,
        info: String,
    },
}

impl fmt::Display for LoginPacketResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginPacketResponse::Success(_) => f.write_str("Success"),
            LoginPacketResponse::DeviceLockLogin { .. } => f.write_str("DeviceLockLogin"),
            LoginPacketResponse::VerificationNeeded { requests, .. } => {
                write!(f, "VerificationNeeded(url={:?}, sms={:?})", requests.fallback_url, requests.sms)
            }
            LoginPacketResponse::Captcha(Captcha::Picture { .. }) => f.write_str("Captcha.Picture"),
            LoginPacketResponse::Captcha(Captcha::Slider { url, .. }) => write!(f, "Captcha.Slider(url={})", url),
            LoginPacketResponse::Error {
                code,
                title,
                message,
                info,
            } => write!(
                f,
                "Error(code={}, title={}, message={}, errorInfo={})",
                code, title, message, info
            ),
        }
    }
}

// ============================================
// Разбор ответов
// ============================================

/// Ответ на wtlogin.login: t119 зашифрован tgtgt key
pub fn decode_login_response(session: &SsoSession, body: &[u8]) -> Result<LoginPacketResponse, String> {
    decode_response(body, &session.tgtgt_key)
}

/// Ответ на wtlogin.exchange_emp: t119 зашифрован ключом tgt прошлого входа
pub fn decode_exchange_emp_response(session: &SsoSession, body: &[u8]) -> Result<LoginPacketResponse, String> {
    let key = session
        .sig_info
        .as_ref()
        .map(|s| s.tgt_key)
        .unwrap_or(session.tgtgt_key);
    decode_response(body, &key)
}

fn decode_response(body: &[u8], t119_key: &[u8; 16]) -> Result<LoginPacketResponse, String> {
    let mut r = ByteReader::new(body);
    let _sub_command = r.read_u16().map_err(|e| e.to_string())?;
    let kind = r.read_u8().map_err(|e| e.to_string())?;
    r.skip(2).map_err(|e| e.to_string())?;
    let tlv = read_tlv_map(&mut r).map_err(|e| e.to_string())?;

    match kind {
        0 => {
            let t119 = tlv.get(&0x119).ok_or("missing t119")?;
            let plain = tea::decrypt(t119, t119_key).map_err(|e| e.to_string())?;
            parse_t119(&plain).map(LoginPacketResponse::Success)
        }
        2 => {
            let t104 = tlv.get(&0x104).cloned();
            if let Some(url) = tlv.get(&0x192) {
                return Ok(LoginPacketResponse::Captcha(Captcha::Slider {
                    url: String::from_utf8_lossy(url).into_owned(),
                    t104,
                }));
            }
            let question = tlv.get(&0x105).ok_or("captcha without t105/t192")?;
            let mut q = ByteReader::new(question);
            let sign_len = q.read_u16().map_err(|e| e.to_string())? as usize;
            q.skip(2).map_err(|e| e.to_string())?;
            let sign = q.read_bytes(sign_len).map_err(|e| e.to_string())?.to_vec();
            let image = q.read_rest().to_vec();
            Ok(LoginPacketResponse::Captcha(Captcha::Picture { image, sign, t104 }))
        }
        160 | 239 => {
            let mut requests = DeviceVerificationRequests::default();
            if let Some(url) = tlv.get(&0x204) {
                requests.fallback_url = Some(String::from_utf8_lossy(url).into_owned());
            }
            if let Some(phone) = tlv.get(&0x178) {
                let mut p = ByteReader::new(phone);
                let country_code = p.read_u16_lv_string().map_err(|e| e.to_string())?;
                let phone_number = p.read_u16_lv_string().map_err(|e| e.to_string())?;
                requests.sms = Some(SmsRequest {
                    country_code,
                    phone_number,
                });
            }
            Ok(LoginPacketResponse::VerificationNeeded {
                requests,
                t104: tlv.get(&0x104).cloned(),
                t174: tlv.get(&0x174).cloned(),
            })
        }
        204 => Ok(LoginPacketResponse::DeviceLockLogin {
            t104: tlv.get(&0x104).cloned(),
            t402: tlv.get(&0x402).cloned(),
            t403: tlv.get(&0x403).cloned(),
        }),
        code => parse_error(code, &tlv).map_err(|e| e.to_string()),
    }
}

fn parse_error(code: u8, tlv: &HashMap<u16, Vec<u8>>) -> Result<LoginPacketResponse, ReadError> {
    if let Some(t146) = tlv.get(&0x146) {
        let mut r = ByteReader::new(t146);
        r.skip(4)?; // ver + code
        let title = r.read_u16_lv_string()?;
        let message = r.read_u16_lv_string()?;
        let info = r.read_u16_lv_string()?;
        return Ok(LoginPacketResponse::Error {
            code,
            title,
            message,
            info,
        });
    }
    if let Some(t149) = tlv.get(&0x149) {
        let mut r = ByteReader::new(t149);
        r.skip(2)?;
        let title = r.read_u16_lv_string()?;
        let message = r.read_u16_lv_string()?;
        let info = r.read_u16_lv_string().unwrap_or_default();
        return Ok(LoginPacketResponse::Error {
            code,
            title,
            message,
            info,
        });
    }
    Ok(LoginPacketResponse::Error {
        code,
        title: String::new(),
        message: format!("unknown login result {}", code),
        info: String::new(),
    })
}

fn key16(map: &HashMap<u16, Vec<u8>>, tag: u16) -> Result<[u8; 16], String> {
    map.get(&tag)
        .and_then(|v| <[u8; 16]>::try_from(v.as_slice()).ok())
        .ok_or_else(|| format!("missing or invalid t{:x}", tag))
}

fn parse_t119(plain: &[u8]) -> Result<LoginResult, String> {
    let tlv = read_tlv_map(&mut ByteReader::new(plain)).map_err(|e| e.to_string())?;
    let bytes = |tag: u16| tlv.get(&tag).cloned().unwrap_or_default();

    let tgt = tlv.get(&0x10a).cloned().ok_or("missing t10a")?;
    let d2 = tlv.get(&0x143).cloned().ok_or("missing t143")?;
    let sig_info = SessionSigInfo {
        tgt,
        tgt_key: key16(&tlv, 0x10d)?,
        d2,
        d2_key: key16(&tlv, 0x305)?,
        wt_session_ticket: bytes(0x133),
        wt_session_ticket_key: key16(&tlv, 0x134).unwrap_or([0; 16]),
        encrypt_a1: bytes(0x106),
        no_pic_sig: bytes(0x16a),
        s_key: bytes(0x120),
        creation_time: current_timestamp(),
    };

    let mut login_extra_data = Vec::new();
    if let Some(t537) = tlv.get(&0x537) {
        let mut r = ByteReader::new(t537);
        let count = r.read_u8().map_err(|e| e.to_string())?;
        for _ in 0..count {
            let uin = r.read_u64().map_err(|e| e.to_string())?;
            let ip_len = r.read_u8().map_err(|e| e.to_string())? as usize;
            let ip = r.read_bytes(ip_len).map_err(|e| e.to_string())?.to_vec();
            let time = r.read_i32().map_err(|e| e.to_string())?;
            let version = r.read_i32().map_err(|e| e.to_string())?;
            login_extra_data.push(LoginExtraData {
                uin,
                ip,
                time,
                version,
            });
        }
    }

    let nickname = tlv.get(&0x11a).and_then(|t| {
        let mut r = ByteReader::new(t);
        r.skip(4).ok()?; // face + age + gender
        let len = r.read_u8().ok()? as usize;
        r.read_bytes(len)
            .ok()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    });

    Ok(LoginResult {
        sig_info,
        ksid: tlv.get(&0x108).cloned(),
        login_extra_data,
        nickname,
    })
}

// ============================================
// Запросы
// ============================================

fn md16(parts: &[&[u8]]) -> [u8; 16] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

fn build(
    session: &SsoSession,
    command: &str,
    sub_command: u16,
    encryption: RequestEncryption,
    tlvs: TlvWriter,
) -> Result<OutgoingPacket, CryptoError> {
    let mut body = ByteWriter::new();
    body.write_u16(sub_command).write_bytes(&tlvs.into_bytes());
    let envelope = oicq::encode_request(session, oicq::CMD_LOGIN, encryption, &body.into_bytes())?;
    Ok(OutgoingPacket::login(command, session.next_sequence_id(), sub_command, envelope))
}

fn t18(w: &mut TlvWriter, uin: u64) {
    w.tlv_with(0x18, |b| {
        b.write_u16(1).write_u32(0x600).write_u32(16).write_u32(0);
        b.write_u32(uin as u32).write_u16(0).write_u16(0);
    });
}

fn t1(w: &mut TlvWriter, uin: u64) {
    let nonce: u32 = rand::thread_rng().gen();
    w.tlv_with(0x1, |b| {
        b.write_u16(1).write_u32(nonce).write_u32(uin as u32);
        b.write_u32(current_timestamp() as u32).write_u32(0).write_u16(0);
    });
}

fn t106(w: &mut TlvWriter, session: &SsoSession, digest: &[u8; 16]) {
    let v = session.protocol.version();
    let mut inner = ByteWriter::new();
    inner
        .write_u16(4)
        .write_u32(rand::thread_rng().gen())
        .write_u32(v.sso_version)
        .write_u32(v.app_id)
        .write_u32(0)
        .write_u64(session.uin)
        .write_u32(current_timestamp() as u32)
        .write_u32(0)
        .write_u8(1)
        .write_bytes(digest)
        .write_bytes(&session.tgtgt_key)
        .write_u32(0)
        .write_u8(1)
        .write_bytes(&session.device_guid)
        .write_u32(v.sub_app_id)
        .write_u32(1)
        .write_u16_lv(session.uin.to_string().as_bytes())
        .write_u16(0);
    let key = md16(&[digest, &[0, 0, 0, 0], &(session.uin as u32).to_be_bytes()]);
    w.tlv(0x106, &tea::encrypt(&inner.into_bytes(), &key));
}

fn t116(w: &mut TlvWriter, session: &SsoSession) {
    let v = session.protocol.version();
    w.tlv_with(0x116, |b| {
        b.write_u8(0).write_u32(v.main_sig_map).write_u32(0x10400);
        b.write_u8(1).write_u32(0x5F5E_10E2);
    });
}

fn t100(w: &mut TlvWriter, session: &SsoSession) {
    let v = session.protocol.version();
    w.tlv_with(0x100, |b| {
        b.write_u16(1).write_u32(v.sso_version).write_u32(v.app_id);
        b.write_u32(v.sub_app_id).write_u32(0).write_u32(v.main_sig_map);
    });
}

fn t144(w: &mut TlvWriter, session: &SsoSession) {
    let device = &session.device;
    let mut inner = TlvWriter::new();
    inner.tlv(0x109, &md16(&[device.android_id.as_bytes()]));
    inner.tlv_with(0x124, |b| {
        b.write_u16_lv(b"android").write_u16_lv(device.os_version.as_bytes());
        b.write_u16(2).write_u16_lv(b"").write_u16_lv(b"").write_u16_lv(b"wifi");
    });
    inner.tlv_with(0x128, |b| {
        b.write_u16(0).write_u8(0).write_u8(1).write_u8(0).write_u32(0x1000000);
        b.write_u16_lv(device.model.as_bytes())
            .write_u16_lv(&session.device_guid)
            .write_u16_lv(device.brand.as_bytes());
    });
    inner.tlv(0x16e, device.model.as_bytes());
    w.tlv(0x144, &tea::encrypt(&inner.into_bytes(), &session.tgtgt_key));
}

fn t142_147(w: &mut TlvWriter, session: &SsoSession) {
    let v = session.protocol.version();
    w.tlv_with(0x142, |b| {
        b.write_u16(0).write_u16_lv(v.apk_id.as_bytes());
    });
    w.tlv_with(0x147, |b| {
        b.write_u32(v.app_id)
            .write_u16_lv(v.sort_version.as_bytes())
            .write_u16_lv(&md16(&[v.apk_id.as_bytes()]));
    });
}

fn t8(w: &mut TlvWriter) {
    w.tlv_with(0x8, |b| {
        b.write_u16(0).write_u32(LOCALE_ID).write_u16(0);
    });
}

fn t104(w: &mut TlvWriter, session: &SsoSession) {
    w.tlv(0x104, session.challenge.t104.as_deref().unwrap_or_default());
}

fn device_tlvs(w: &mut TlvWriter, session: &SsoSession, sequence_hint: u32) {
    w.tlv(0x145, &session.device_guid);
    w.tlv_with(0x154, |b| {
        b.write_u32(sequence_hint);
    });
    w.tlv_with(0x141, |b| {
        b.write_u16(1).write_u16_lv(b"").write_u16(2).write_u16_lv(b"wifi");
    });
    let v = session.protocol.version();
    w.tlv_with(0x177, |b| {
        b.write_u8(1).write_u32(0).write_u16_lv(v.build_version.as_bytes());
    });
    w.tlv(0x187, &md16(&[session.device.mac_address.as_bytes()]));
    w.tlv(0x188, &md16(&[session.device.android_id.as_bytes()]));
    w.tlv_with(0x202, |b| {
        b.write_u16_lv(&md16(&[session.device.wifi_ssid.as_bytes()]))
            .write_u16_lv(session.device.wifi_ssid.as_bytes());
    });
}

/// wtlogin.login / 9: вход по паролю
pub fn password_login(
    session: &SsoSession,
    password_digest: &[u8; 16],
    allow_slider: bool,
) -> Result<OutgoingPacket, CryptoError> {
    let mut w = TlvWriter::new();
    t18(&mut w, session.uin);
    t1(&mut w, session.uin);
    t106(&mut w, session, password_digest);
    t116(&mut w, session);
    t100(&mut w, session);
    w.tlv_with(0x107, |b| {
        b.write_u16(0).write_u8(0).write_u16(0).write_u8(1);
    });
    t142_147(&mut w, session);
    t144(&mut w, session);
    device_tlvs(&mut w, session, 0);
    t8(&mut w);
    w.tlv_with(0x191, |b| {
        b.write_u8(if allow_slider { 0x82 } else { 0x00 });
    });
    build(session, CMD_LOGIN, SUB_PASSWORD, RequestEncryption::Ecdh, w)
}

/// wtlogin.login / 9 с данными подтверждённого QR-кода
pub fn qrcode_login(session: &SsoSession, data: &QrCodeLoginData) -> Result<OutgoingPacket, CryptoError> {
    let mut w = TlvWriter::new();
    t18(&mut w, session.uin);
    t1(&mut w, session.uin);
    w.tlv(0x106, &data.tmp_pwd);
    t116(&mut w, session);
    t100(&mut w, session);
    t142_147(&mut w, session);
    t144(&mut w, session);
    device_tlvs(&mut w, session, 0);
    t8(&mut w);
    w.tlv(0x16a, &data.no_pic_sig);
    w.tlv(0x318, &data.tgt_qr);
    build(session, CMD_LOGIN, SUB_PASSWORD, RequestEncryption::Ecdh, w)
}

/// wtlogin.exchange_emp / 11: fast login по подписям прошлого входа
pub fn fast_login(session: &SsoSession) -> Result<OutgoingPacket, CryptoError> {
    let sig = session
        .sig_info
        .as_ref()
        .ok_or_else(|| CryptoError::InvalidInputError("session signatures are not initialized".to_string()))?;
    let mut w = TlvWriter::new();
    t100(&mut w, session);
    w.tlv(0x10a, &sig.tgt);
    t116(&mut w, session);
    w.tlv(0x108, &session.ksid);
    t144(&mut w, session);
    w.tlv(0x143, &sig.d2);
    t142_147(&mut w, session);
    t18(&mut w, session.uin);
    device_tlvs(&mut w, session, 0);
    t8(&mut w);
    build(session, CMD_EXCHANGE_EMP, SUB_FAST, RequestEncryption::SessionTicket, w)
}

/// wtlogin.login / 20: разблокировка device lock
pub fn device_lock_login(session: &SsoSession) -> Result<OutgoingPacket, CryptoError> {
    let mut w = TlvWriter::new();
    t8(&mut w);
    t104(&mut w, session);
    t116(&mut w, session);
    let t402 = session.challenge.t402.as_deref().unwrap_or_default();
    w.tlv(0x401, &md16(&[&session.device_guid, &session.dpwd, t402]));
    build(session, CMD_LOGIN, SUB_DEVICE_LOCK, RequestEncryption::Ecdh, w)
}

/// wtlogin.login / 2: ответ на картинку
pub fn submit_picture_captcha(session: &SsoSession, sign: &[u8], answer: &str) -> Result<OutgoingPacket, CryptoError> {
    let mut w = TlvWriter::new();
    w.tlv_with(0x2, |b| {
        b.write_u16(0).write_u16_lv(answer.as_bytes()).write_u16_lv(sign);
    });
    t8(&mut w);
    t104(&mut w, session);
    t116(&mut w, session);
    build(session, CMD_LOGIN, SUB_CAPTCHA, RequestEncryption::Ecdh, w)
}

/// wtlogin.login / 2: тикет слайдера
pub fn submit_slider_captcha(session: &SsoSession, ticket: &str) -> Result<OutgoingPacket, CryptoError> {
    let mut w = TlvWriter::new();
    w.tlv(0x193, ticket.as_bytes());
    t8(&mut w);
    t104(&mut w, session);
    t116(&mut w, session);
    build(session, CMD_LOGIN, SUB_CAPTCHA, RequestEncryption::Ecdh, w)
}

/// wtlogin.login / 8: попросить сервер отправить SMS-код
pub fn request_sms(session: &SsoSession) -> Result<OutgoingPacket, CryptoError> {
    let mut w = TlvWriter::new();
    t8(&mut w);
    t104(&mut w, session);
    t116(&mut w, session);
    w.tlv(0x174, session.challenge.t174.as_deref().unwrap_or_default());
    w.tlv_with(0x17a, |b| {
        b.write_u32(9);
    });
    w.tlv(0x197, &[0]);
    build(session, CMD_LOGIN, SUB_REQUEST_SMS, RequestEncryption::Ecdh, w)
}

/// wtlogin.login / 7: введённый SMS-код
pub fn submit_sms(session: &SsoSession, code: &str) -> Result<OutgoingPacket, CryptoError> {
    let mut w = TlvWriter::new();
    t8(&mut w);
    t104(&mut w, session);
    t116(&mut w, session);
    w.tlv(0x174, session.challenge.t174.as_deref().unwrap_or_default());
    w.tlv_with(0x17c, |b| {
        b.write_u16_lv(code.as_bytes());
    });
    let t402 = session.challenge.t402.as_deref().unwrap_or_default();
    w.tlv(0x401, &md16(&[&session.device_guid, &session.dpwd, t402]));
    w.tlv(0x198, &[0]);
    build(session, CMD_LOGIN, SUB_SUBMIT_SMS, RequestEncryption::Ecdh, w)
}

/// Серверная сторона wtlogin для тестов
#[cfg(test)]
pub(crate) mod server {
    use super::*;

    pub fn response(kind: u8, tlvs: TlvWriter) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_u16(SUB_PASSWORD).write_u8(kind).write_u16(0).write_bytes(&tlvs.into_bytes());
        w.into_bytes()
    }

    pub fn success(t119_key: &[u8; 16], d2_key: [u8; 16]) -> Vec<u8> {
        let mut inner = TlvWriter::new();
        inner
            .tlv(0x10a, b"tgt")
            .tlv(0x10d, &[1; 16])
            .tlv(0x143, b"d2")
            .tlv(0x305, &d2_key)
            .tlv(0x133, b"ticket")
            .tlv(0x134, &[3; 16])
            .tlv(0x108, b"ksid")
            .tlv_with(0x11a, |b| {
                b.write_u16(0).write_u8(20).write_u8(1).write_u8(4).write_bytes(b"mira");
            })
            .tlv_with(0x537, |b| {
                b.write_u8(1).write_u64(10001).write_u8(4).write_bytes(&[127, 0, 0, 1]);
                b.write_i32(1_700_000_000).write_i32(1);
            });
        let mut outer = TlvWriter::new();
        outer.tlv(0x119, &tea::encrypt(&inner.into_bytes(), t119_key));
        response(0, outer)
    }
}
