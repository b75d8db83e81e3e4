// Сериализация

use crate::utils::error::StorageError;
use serde::{Deserialize, Serialize};

pub fn to_bytes<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(data)
        .map_err(|e| StorageError::Serialization(format!("Serialization failed: {}", e)))
}

pub fn from_bytes<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, StorageError> {
    bincode::deserialize(bytes)
        .map_err(|e| StorageError::Serialization(format!("Deserialization failed: {}", e)))
}
