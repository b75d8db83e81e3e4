// Вспомогательные модули

pub mod collector;
pub mod error;
pub mod io;
pub mod serialization;
pub mod time;
