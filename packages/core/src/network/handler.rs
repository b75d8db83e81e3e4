// NetworkHandler: запрос/ответ по sequence id с таймаутом на каждую пару

use crate::protocol::codec::PacketCodec;
use crate::protocol::packet::{IncomingPacket, OutgoingPacket, Packet, RawIncomingPacket};
use crate::protocol::transport::Transport;
use crate::session::SharedSession;
use crate::utils::error::NetworkError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Сервер просит переподключиться к другому адресу
pub const CMD_CHANGE_SERVER: &str = "ConfigPushSvc.PushReq";

#[async_trait]
pub trait NetworkHandler: Send + Sync {
    /// Отправить пакет и дождаться ответа с тем же sequence id
    async fn send_and_expect(&self, packet: OutgoingPacket, timeout: Duration) -> Result<Packet, NetworkError>;

    async fn send_without_expect(&self, packet: OutgoingPacket) -> Result<(), NetworkError>;
}

fn poisoned() -> NetworkError {
    NetworkError::Transport("session lock poisoned".to_string())
}

pub struct FramedNetworkHandler<T> {
    transport: Mutex<T>,
    session: SharedSession,
    codec: PacketCodec,
    unsolicited: Option<mpsc::UnboundedSender<IncomingPacket>>,
}

impl<T: Transport> FramedNetworkHandler<T> {
    pub fn new(transport: T, session: SharedSession, codec: PacketCodec) -> Self {
        Self {
            transport: Mutex::new(transport),
            session,
            codec,
            unsolicited: None,
        }
    }

    /// Пакеты, на которые никто не ждёт ответа, уходят в этот канал
    pub fn with_unsolicited_sink(mut self, sink: mpsc::UnboundedSender<IncomingPacket>) -> Self {
        self.unsolicited = Some(sink);
        self
    }

    fn encode(&self, packet: &OutgoingPacket) -> Result<Vec<u8>, NetworkError> {
        let session = self.session.read().map_err(|_| poisoned())?;
        Ok(self.codec.encode_packet(&session, packet)?)
    }

    /// Один фрейм -> пакет. `Ok(None)` — фрейм отброшен.
    fn decode(&self, bytes: &[u8]) -> Result<Option<IncomingPacket>, NetworkError> {
        let raw: RawIncomingPacket = {
            let session = self.session.read().map_err(|_| poisoned())?;
            match self.codec.decode_frame(&session, bytes) {
                Ok(raw) => raw,
                Err(e) if e.requires_reconnect() => {
                    return Err(NetworkError::ReconnectRequired(e.to_string()));
                }
                Err(e) => {
                    warn!(error = %e, "Dropping undecodable frame");
                    return Ok(None);
                }
            }
        };

        if raw.command_name == CMD_CHANGE_SERVER {
            return Err(NetworkError::ChangeServer);
        }

        let mut session = self.session.write().map_err(|_| poisoned())?;
        if !raw.session_id.is_empty() && session.outgoing_session_id != raw.session_id {
            debug!("Outgoing session id updated by server");
            session.outgoing_session_id = raw.session_id.clone();
        }
        Ok(self.codec.process_body(&session, raw))
    }

    async fn exchange(&self, packet: &OutgoingPacket) -> Result<Packet, NetworkError> {
        let frame = self.encode(packet)?;
        let mut transport = self.transport.lock().await;
        transport.send(&frame).await?;

        loop {
            let bytes = transport.receive().await?;
            let Some(incoming) = self.decode(&bytes)? else {
                continue;
            };
            if incoming.sequence_id == packet.sequence_id {
                return incoming.result.map_err(|e| NetworkError::Decode(e.to_string()));
            }
            self.forward(incoming);
        }
    }

    fn forward(&self, incoming: IncomingPacket) {
        match &self.unsolicited {
            Some(sink) => {
                if sink.send(incoming).is_err() {
                    debug!("Unsolicited packet receiver dropped");
                }
            }
            None => debug!(command = %incoming.command_name, "Unsolicited packet ignored"),
        }
    }
}

#[async_trait]
impl<T: Transport> NetworkHandler for FramedNetworkHandler<T> {
    async fn send_and_expect(&self, packet: OutgoingPacket, timeout: Duration) -> Result<Packet, NetworkError> {
        debug!(
            command = %packet.command_name,
            sequence_id = packet.sequence_id,
            sub_command = ?packet.sub_command,
            "Sending request"
        );
        match tokio::time::timeout(timeout, self.exchange(&packet)).await {
            Ok(result) => result,
            Err(_) => Err(NetworkError::Timeout(format!(
                "{} (seq {}) after {:?}",
                packet.command_name, packet.sequence_id, timeout
            ))),
        }
    }

    async fn send_without_expect(&self, packet: OutgoingPacket) -> Result<(), NetworkError> {
        let frame = self.encode(&packet)?;
        self.transport.lock().await.send(&frame).await
    }
}
