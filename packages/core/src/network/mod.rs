// Сеть: отправка пакетов и ожидание ответов поверх транспорта

pub mod handler;

pub use handler::{FramedNetworkHandler, NetworkHandler};
