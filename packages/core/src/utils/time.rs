// Время

use chrono::Utc;

/// Текущее время в секундах (unix timestamp)
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

