// Протокол: фреймы, OICQ-конверт, TLV, пакеты и транспорт

pub mod codec;
pub mod factories;
pub mod login;
pub mod oicq;
pub mod packet;
pub mod qrcode;
pub mod stat_svc;
pub mod tlv;
pub mod transport;
pub mod version;
pub mod wire;

pub use codec::PacketCodec;
pub use packet::{IncomingPacket, OutgoingPacket, Packet};
pub use version::Protocol;
