// TLV (tag: u16, length: u16, value) списки внутри login-пакетов

use crate::utils::io::{ByteReader, ByteWriter, ReadError};
use std::collections::HashMap;

/// Построитель списка TLV с u16 счётчиком в начале
#[derive(Debug, Default)]
pub struct TlvWriter {
    count: u16,
    body: ByteWriter,
}

impl TlvWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tlv(&mut self, tag: u16, value: &[u8]) -> &mut Self {
        self.body.write_u16(tag).write_u16_lv(value);
        self.count += 1;
        self
    }

    /// TLV, значение которого собирается замыканием
    pub fn tlv_with(&mut self, tag: u16, build: impl FnOnce(&mut ByteWriter)) -> &mut Self {
        let mut value = ByteWriter::new();
        build(&mut value);
        self.tlv(tag, &value.into_bytes())
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    /// u16 count + TLV
    pub fn into_bytes(self) -> Vec<u8> {
        let mut out = ByteWriter::with_capacity(self.body.len() + 2);
        out.write_u16(self.count);
        out.write_bytes(&self.body.into_bytes());
        out.into_bytes()
    }
}

/// Прочитать u16 count + TLV. Повторяющиеся теги: побеждает последний.
pub fn read_tlv_map(reader: &mut ByteReader<'_>) -> Result<HashMap<u16, Vec<u8>>, ReadError> {
    let count = reader.read_u16()?;
    let mut map = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        let tag = reader.read_u16()?;
        let value = reader.read_u16_lv()?;
        map.insert(tag, value.to_vec());
    }
    Ok(map)
}
