// Потоковый транспорт: фреймы с 4-байтной длиной (включая саму длину)

use crate::config::Config;
use crate::utils::error::NetworkError;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Состояние соединения
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

/// Отправка и получение целых фреймов
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: &[u8]) -> Result<(), NetworkError>;

    async fn receive(&mut self) -> Result<Vec<u8>, NetworkError>;

    fn state(&self) -> ConnectionState;
}

/// Транспорт поверх любого tokio-потока (обычно `TcpStream`)
pub struct StreamTransport<S> {
    io: S,
    max_frame_length: u32,
    state: ConnectionState,
}

impl<S> StreamTransport<S> {
    pub fn new(io: S) -> Self {
        Self::with_max_frame_length(io, Config::global().max_frame_length)
    }

    pub fn with_max_frame_length(io: S, max_frame_length: u32) -> Self {
        Self {
            io,
            max_frame_length,
            state: ConnectionState::Connected,
        }
    }

    pub fn into_inner(self) -> S {
        self.io
    }
}

fn map_io_err(e: std::io::Error) -> NetworkError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        NetworkError::Closed
    } else {
        NetworkError::Transport(e.to_string())
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, frame: &[u8]) -> Result<(), NetworkError> {
        if self.state != ConnectionState::Connected {
            return Err(NetworkError::Closed);
        }
        let total = u32::try_from(frame.len() + 4)
            .ok()
            .filter(|len| *len <= self.max_frame_length)
            .ok_or_else(|| {
                NetworkError::Transport(format!(
                    "frame of {} bytes exceeds limit {}",
                    frame.len(),
                    self.max_frame_length
                ))
            })?;

        let result = async {
            self.io.write_all(&total.to_be_bytes()).await?;
            self.io.write_all(frame).await?;
            self.io.flush().await
        }
        .await;
        if let Err(e) = result {
            self.state = ConnectionState::Disconnected;
            return Err(map_io_err(e));
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<u8>, NetworkError> {
        if self.state != ConnectionState::Connected {
            return Err(NetworkError::Closed);
        }
        let mut len_buf = [0u8; 4];
        if let Err(e) = self.io.read_exact(&mut len_buf).await {
            self.state = ConnectionState::Disconnected;
            return Err(map_io_err(e));
        }

        let total = u32::from_be_bytes(len_buf);
        if total < 4 || total > self.max_frame_length {
            self.state = ConnectionState::Disconnected;
            return Err(NetworkError::Transport(format!("invalid frame length {}", total)));
        }

        let mut frame = vec![0u8; total as usize - 4];
        if let Err(e) = self.io.read_exact(&mut frame).await {
            self.state = ConnectionState::Disconnected;
            return Err(map_io_err(e));
        }
        Ok(frame)
    }

    fn state(&self) -> ConnectionState {
        self.state
    }
}
