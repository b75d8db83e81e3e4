// Формат фрейма (network byte order)
//
//   [4] тип пакета            0x0A Login / 0x0B Simple
//   [1] метод шифрования      0 нет / 1 нулевой ключ / 2 ключ D2
//   [1] reserved flag         должен быть 0
//   [4] длина uin (включая эти 4 байта) + uin строкой
//   [..] зашифрованное тело (SSO sub-frame):
//        [4] длина заголовка (включая эти 4 байта)
//            [4] sequence id  [4] return code
//            [4+N] extra      [4+N] command name   [4+N] session id
//            [4] режим сжатия 0 raw / 1 zlib / 8 как есть
//        [..] тело: raw = [4] размер + данные, zlib = [4] + zlib([4] размер + данные)
//
// Внешняя длина фрейма читается транспортом и сюда не попадает.

use crate::crypto::tea;
use crate::utils::error::PacketCodecError;
use crate::utils::io::{ByteReader, ByteWriter, ReadError};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use tracing::trace;

pub const ZERO_KEY: [u8; 16] = [0u8; 16];

/// Коды возврата не больше этого означают протухшую сессию
pub const SESSION_EXPIRED_THRESHOLD: i32 = -10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Login,
    Simple,
}

impl PacketType {
    pub fn code(self) -> i32 {
        match self {
            PacketType::Login => 0x0A,
            PacketType::Simple => 0x0B,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0x0A => Some(PacketType::Login),
            0x0B => Some(PacketType::Simple),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptMethod {
    None,
    /// Фиксированный нулевой ключ, внутри OICQ-конверт (только login)
    ZeroKey,
    /// Ключ D2 из подписей сессии
    D2Key,
}

impl EncryptMethod {
    pub fn code(self) -> u8 {
        match self {
            EncryptMethod::None => 0,
            EncryptMethod::ZeroKey => 1,
            EncryptMethod::D2Key => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(EncryptMethod::None),
            1 => Some(EncryptMethod::ZeroKey),
            2 => Some(EncryptMethod::D2Key),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMode {
    /// Тело с 4-байтным размером перед ним
    Raw,
    /// 4-байтный размер распакованного тела + zlib
    Zlib,
    PassThrough,
}

impl CompressionMode {
    pub fn code(self) -> i32 {
        match self {
            CompressionMode::Raw => 0,
            CompressionMode::Zlib => 1,
            CompressionMode::PassThrough => 8,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(CompressionMode::Raw),
            1 => Some(CompressionMode::Zlib),
            8 => Some(CompressionMode::PassThrough),
            _ => None,
        }
    }
}

/// Разобранный фрейм целиком
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoFrame {
    pub packet_type: PacketType,
    pub encrypt_method: EncryptMethod,
    pub reserved_flag: u8,
    pub uin: String,
    pub sequence_id: i32,
    pub return_code: i32,
    pub extra: Vec<u8>,
    pub command_name: String,
    pub session_id: Vec<u8>,
    pub compression: CompressionMode,
    pub body: Vec<u8>,
}

/// 0 — успех, не больше -10000 — протухшая сессия, остальное — прочие ошибки
pub fn classify_return_code(code: i32) -> Result<(), PacketCodecError> {
    match code {
        0 => Ok(()),
        c if c <= SESSION_EXPIRED_THRESHOLD => Err(PacketCodecError::session_expired(format!(
            "returnCode = {}",
            c
        ))),
        c => Err(PacketCodecError::other(format!("returnCode = {}", c))),
    }
}

fn malformed(e: ReadError) -> PacketCodecError {
    PacketCodecError::other(format!("malformed frame: {}", e))
}

/// Собрать фрейм. `d2_key` обязателен для `EncryptMethod::D2Key`.
pub fn encode_frame(frame: &SsoFrame, d2_key: Option<&[u8; 16]>) -> Result<Vec<u8>, PacketCodecError> {
    let mut head = ByteWriter::new();
    head.write_i32(frame.sequence_id)
        .write_i32(frame.return_code)
        .write_i32_lv_inclusive(&frame.extra)
        .write_i32_lv_inclusive(frame.command_name.as_bytes())
        .write_i32_lv_inclusive(&frame.session_id)
        .write_i32(frame.compression.code());

    let mut sso = ByteWriter::new();
    sso.write_i32_lv_inclusive(&head.into_bytes());
    match frame.compression {
        CompressionMode::Raw => {
            sso.write_i32_lv_inclusive(&frame.body);
        }
        CompressionMode::Zlib => {
            // Размер лежит внутри сжатых данных, снаружи только длина потока
            let mut plain = ByteWriter::with_capacity(frame.body.len() + 4);
            plain.write_i32_lv_inclusive(&frame.body);
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            let compressed = encoder
                .write_all(&plain.into_bytes())
                .and_then(|_| encoder.finish())
                .map_err(|e| PacketCodecError::other(format!("zlib compression failed: {}", e)))?;
            sso.write_i32_lv_inclusive(&compressed);
        }
        CompressionMode::PassThrough => {
            sso.write_bytes(&frame.body);
        }
    }
    let sso = sso.into_bytes();

    let encrypted = match frame.encrypt_method {
        EncryptMethod::None => sso,
        EncryptMethod::ZeroKey => tea::encrypt(&sso, &ZERO_KEY),
        EncryptMethod::D2Key => {
            let key = d2_key.ok_or_else(|| PacketCodecError::other("D2 key is not available"))?;
            tea::encrypt(&sso, key)
        }
    };

    let mut out = ByteWriter::with_capacity(encrypted.len() + frame.uin.len() + 14);
    out.write_i32(frame.packet_type.code())
        .write_u8(frame.encrypt_method.code())
        .write_u8(frame.reserved_flag)
        .write_i32_lv_inclusive(frame.uin.as_bytes())
        .write_bytes(&encrypted);
    Ok(out.into_bytes())
}

/// Разобрать фрейм. Return code здесь не проверяется.
///
/// Если reserved flag не ноль, а тело не расшифровалось или не разобралось,
/// ошибка всегда `ProtocolUpdated`.
pub fn decode_frame(bytes: &[u8], d2_key: Option<&[u8; 16]>) -> Result<SsoFrame, PacketCodecError> {
    let mut reader = ByteReader::new(bytes);

    let type_code = reader.read_i32().map_err(malformed)?;
    let packet_type = PacketType::from_code(type_code)
        .ok_or_else(|| PacketCodecError::other(format!("unknown packet type 0x{:02X}", type_code)))?;

    let method_code = reader.read_u8().map_err(malformed)?;
    let encrypt_method = EncryptMethod::from_code(method_code)
        .ok_or_else(|| PacketCodecError::other(format!("unknown encrypt method {}", method_code)))?;

    let reserved_flag = reader.read_u8().map_err(malformed)?;
    let uin = reader.read_i32_lv_inclusive_string().map_err(malformed)?;
    let encrypted = reader.read_rest();

    trace!(
        packet_type = ?packet_type,
        encrypt_method = ?encrypt_method,
        reserved_flag,
        len = encrypted.len(),
        "decoding frame"
    );

    let sub = decrypt_body(encrypt_method, encrypted, d2_key).and_then(|sso| decode_sso_frame(&sso));
    let sub = match sub {
        Ok(sub) => sub,
        Err(e) if reserved_flag != 0 => {
            return Err(PacketCodecError::protocol_updated(format!(
                "reserved flag {} on undecodable frame: {}",
                reserved_flag, e.message
            )));
        }
        Err(e) => return Err(e),
    };

    Ok(SsoFrame {
        packet_type,
        encrypt_method,
        reserved_flag,
        uin,
        sequence_id: sub.sequence_id,
        return_code: sub.return_code,
        extra: sub.extra,
        command_name: sub.command_name,
        session_id: sub.session_id,
        compression: sub.compression,
        body: sub.body,
    })
}

fn decrypt_body(
    encrypt_method: EncryptMethod,
    encrypted: &[u8],
    d2_key: Option<&[u8; 16]>,
) -> Result<Vec<u8>, PacketCodecError> {
    match encrypt_method {
        EncryptMethod::None => Ok(encrypted.to_vec()),
        EncryptMethod::ZeroKey => Ok(tea::decrypt(encrypted, &ZERO_KEY)?),
        EncryptMethod::D2Key => {
            let key = d2_key.ok_or_else(|| PacketCodecError::session_expired("D2 key is not available"))?;
            // Не расшифровалось D2 — сервер уже выдал новые ключи
            tea::decrypt(encrypted, key)
                .map_err(|e| PacketCodecError::session_expired(format!("D2 decryption failed: {}", e)))
        }
    }
}

struct SsoSubFrame {
    sequence_id: i32,
    return_code: i32,
    extra: Vec<u8>,
    command_name: String,
    session_id: Vec<u8>,
    compression: CompressionMode,
    body: Vec<u8>,
}

fn decode_sso_frame(sso: &[u8]) -> Result<SsoSubFrame, PacketCodecError> {
    let mut reader = ByteReader::new(sso);
    let mut head = ByteReader::new(reader.read_i32_lv_inclusive().map_err(malformed)?);
    let sequence_id = head.read_i32().map_err(malformed)?;
    let return_code = head.read_i32().map_err(malformed)?;
    let extra = head.read_i32_lv_inclusive().map_err(malformed)?.to_vec();
    let command_name = head.read_i32_lv_inclusive_string().map_err(malformed)?;
    let session_id = head.read_i32_lv_inclusive().map_err(malformed)?.to_vec();
    let mode_code = head.read_i32().map_err(malformed)?;
    let compression = CompressionMode::from_code(mode_code)
        .ok_or_else(|| PacketCodecError::other(format!("unknown dataCompressed flag {}", mode_code)))?;

    let body = match compression {
        CompressionMode::Raw => {
            let declared = reader.read_bytes(4).map_err(malformed)?;
            let rest = reader.read_rest();
            strip_size_prefix(declared, rest)
        }
        CompressionMode::Zlib => {
            reader.skip(4).map_err(malformed)?;
            let mut inflated = Vec::new();
            ZlibDecoder::new(reader.read_rest())
                .read_to_end(&mut inflated)
                .map_err(|e| PacketCodecError::other(format!("zlib inflate failed: {}", e)))?;
            if inflated.len() >= 4 {
                let (declared, rest) = inflated.split_at(4);
                strip_size_prefix(declared, rest)
            } else {
                inflated
            }
        }
        CompressionMode::PassThrough => reader.read_rest().to_vec(),
    };

    Ok(SsoSubFrame {
        sequence_id,
        return_code,
        extra,
        command_name,
        session_id,
        compression,
        body,
    })
}

/// Размер совпал с остатком (с учётом или без своих 4 байт) — отрезать его,
/// иначе эти 4 байта считаются частью тела.
fn strip_size_prefix(declared: &[u8], rest: &[u8]) -> Vec<u8> {
    let size = u32::from_be_bytes([declared[0], declared[1], declared[2], declared[3]]) as usize;
    if size == rest.len() || size == rest.len() + 4 {
        rest.to_vec()
    } else {
        trace!(declared = size, actual = rest.len(), "body size mismatch, keeping prefix");
        let mut body = Vec::with_capacity(rest.len() + 4);
        body.extend_from_slice(declared);
        body.extend_from_slice(rest);
        body
    }
}
