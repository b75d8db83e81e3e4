// TEA (16 раундов) в режиме сцепления блоков, используемом протоколом
//
// Формат открытого текста перед шифрованием:
//   [1] (fill - 3) | 0xF8   [fill - 1] случайные байты   [N] данные   [7] нули
// где fill выбирается так, чтобы общая длина была кратна 8.

use crate::error::CryptoError;
use rand::RngCore;

const DELTA: u32 = 0x9e37_79b9;
const ROUNDS: u32 = 16;
const DECRYPT_SUM: u32 = 0xe377_9b90; // DELTA * ROUNDS (mod 2^32)

/// Ключ TEA: четыре u32 в big-endian
#[derive(Clone, Copy)]
struct TeaKey([u32; 4]);

impl TeaKey {
    fn new(key: &[u8; 16]) -> Self {
        let mut k = [0u32; 4];
        for (i, chunk) in key.chunks_exact(4).enumerate() {
            k[i] = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self(k)
    }

    fn encode(&self, n: u64) -> u64 {
        let [k0, k1, k2, k3] = self.0;
        let mut v0 = (n >> 32) as u32;
        let mut v1 = n as u32;
        let mut sum = 0u32;
        for _ in 0..ROUNDS {
            sum = sum.wrapping_add(DELTA);
            v0 = v0.wrapping_add(
                (v1 << 4).wrapping_add(k0) ^ v1.wrapping_add(sum) ^ (v1 >> 5).wrapping_add(k1),
            );
            v1 = v1.wrapping_add(
                (v0 << 4).wrapping_add(k2) ^ v0.wrapping_add(sum) ^ (v0 >> 5).wrapping_add(k3),
            );
        }
        ((v0 as u64) << 32) | v1 as u64
    }

    fn decode(&self, n: u64) -> u64 {
        let [k0, k1, k2, k3] = self.0;
        let mut v0 = (n >> 32) as u32;
        let mut v1 = n as u32;
        let mut sum = DECRYPT_SUM;
        for _ in 0..ROUNDS {
            v1 = v1.wrapping_sub(
                (v0 << 4).wrapping_add(k2) ^ v0.wrapping_add(sum) ^ (v0 >> 5).wrapping_add(k3),
            );
            v0 = v0.wrapping_sub(
                (v1 << 4).wrapping_add(k0) ^ v1.wrapping_add(sum) ^ (v1 >> 5).wrapping_add(k1),
            );
            sum = sum.wrapping_sub(DELTA);
        }
        ((v0 as u64) << 32) | v1 as u64
    }
}

fn read_block(buf: &[u8], offset: usize) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_be_bytes(arr)
}

/// Зашифровать данные ключом `key`
pub fn encrypt(plain: &[u8], key: &[u8; 16]) -> Vec<u8> {
    let key = TeaKey::new(key);
    let fill = 10 - (plain.len() + 1) % 8;
    let mut dst = vec![0u8; fill + plain.len() + 7];

    rand::thread_rng().fill_bytes(&mut dst[..fill]);
    dst[0] = ((fill - 3) as u8) | 0xF8;
    dst[fill..fill + plain.len()].copy_from_slice(plain);

    let mut iv1 = 0u64;
    let mut iv2 = 0u64;
    for offset in (0..dst.len()).step_by(8) {
        let block = read_block(&dst, offset);
        let holder = block ^ iv1;
        iv1 = key.encode(holder) ^ iv2;
        iv2 = holder;
        dst[offset..offset + 8].copy_from_slice(&iv1.to_be_bytes());
    }
    dst
}

/// Расшифровать данные ключом `key`
///
/// Ошибка, если длина не кратна 8, меньше 16, или хвост из 7 нулей не совпал
/// (почти всегда означает неверный ключ).
pub fn decrypt(cipher: &[u8], key: &[u8; 16]) -> Result<Vec<u8>, CryptoError> {
    if cipher.len() < 16 || cipher.len() % 8 != 0 {
        return Err(CryptoError::TeaDecryptionError(format!(
            "invalid ciphertext length {}",
            cipher.len()
        )));
    }

    let key = TeaKey::new(key);
    let mut dst = vec![0u8; cipher.len()];
    let mut iv1: u64;
    let mut iv2 = 0u64;
    let mut holder = 0u64;
    for offset in (0..cipher.len()).step_by(8) {
        iv1 = read_block(cipher, offset);
        iv2 ^= iv1;
        iv2 = key.decode(iv2);
        dst[offset..offset + 8].copy_from_slice(&(iv2 ^ holder).to_be_bytes());
        holder = iv1;
    }

    let start = (dst[0] & 7) as usize + 3;
    let end = dst.len() - 7;
    if start > end || dst[end..].iter().any(|b| *b != 0) {
        return Err(CryptoError::TeaDecryptionError(
            "padding check failed, wrong key?".to_string(),
        ));
    }
    Ok(dst[start..end].to_vec())
}
