// Вход по QR-коду: получить код, опрашивать состояние, вернуть данные входа

use crate::auth::read_session;
use crate::auth::solver::{QRCodeLoginListener, QrCodeState};
use crate::config::Config;
use crate::network::NetworkHandler;
use crate::protocol::packet::Packet;
use crate::protocol::qrcode::{self, QrCodeLoginData, QrCodeResponse};
use crate::session::SharedSession;
use crate::utils::error::LoginFailed;
use std::time::Duration;
use tracing::{debug, info};

pub struct QRCodeLoginProcessor<'a> {
    handler: &'a dyn NetworkHandler,
    session: &'a SharedSession,
    listener: &'a dyn QRCodeLoginListener,
    poll_interval: Duration,
    request_timeout: Duration,
}

impl<'a> QRCodeLoginProcessor<'a> {
    pub fn new(
        handler: &'a dyn NetworkHandler,
        session: &'a SharedSession,
        listener: &'a dyn QRCodeLoginListener,
        poll_interval: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            handler,
            session,
            listener,
            poll_interval: poll_interval.max(Config::global().qrcode_min_poll_interval()),
            request_timeout,
        }
    }

    async fn request(&self, packet: crate::protocol::OutgoingPacket) -> Result<QrCodeResponse, LoginFailed> {
        match self.handler.send_and_expect(packet, self.request_timeout).await? {
            Packet::QrCode(response) => Ok(response),
            other => Err(LoginFailed::UnexpectedResponse(format!("{} for trans_emp", other.name()))),
        }
    }

    async fn fetch(&self) -> Result<Vec<u8>, LoginFailed> {
        let packet = qrcode::fetch_qrcode(&*read_session(self.session)?)?;
        match self.request(packet).await? {
            QrCodeResponse::Fetched { image, sig } => {
                debug!(image_len = image.len(), "QR code fetched");
                self.listener.on_fetch_qrcode(&image).await;
                Ok(sig)
            }
            other => Err(LoginFailed::UnexpectedResponse(format!("{:?} while fetching QR code", other))),
        }
    }

    pub async fn process(&self) -> Result<QrCodeLoginData, LoginFailed> {
        let (protocol, uin) = {
            let session = read_session(self.session)?;
            (session.protocol, session.uin)
        };
        if !protocol.supports_qrcode_login() {
            return Err(LoginFailed::UnsupportedQrCodeLogin(protocol.to_string()));
        }

        info!("Starting QR code login");
        loop {
            let sig = self.fetch().await?;
            let mut state = QrCodeState::Default;

            loop {
                tokio::time::sleep(self.poll_interval).await;
                self.listener.on_interval_loop().await;

                let packet = qrcode::query_qrcode(&*read_session(self.session)?, &sig)?;
                let (new_state, confirmed) = match self.request(packet).await? {
                    QrCodeResponse::WaitingForScan => (QrCodeState::WaitingForScan, None),
                    QrCodeResponse::WaitingForConfirm => (QrCodeState::WaitingForConfirm, None),
                    QrCodeResponse::Cancelled => (QrCodeState::Cancelled, None),
                    QrCodeResponse::Timeout => (QrCodeState::Timeout, None),
                    QrCodeResponse::Confirmed(data) => (QrCodeState::Confirmed, Some(data)),
                    QrCodeResponse::Fetched { .. } => {
                        return Err(LoginFailed::UnexpectedResponse("QR code fetched while polling".to_string()));
                    }
                };

                if new_state != state {
                    debug!(state = ?new_state, "QR code state changed");
                    state = new_state;
                    self.listener.on_state_changed(state).await;
                }

                if let Some(data) = confirmed {
                    if data.uin != uin {
                        return Err(LoginFailed::Authorization(format!(
                            "QR code confirmed by account {}, expected {}",
                            data.uin, uin
                        )));
                    }
                    self.listener.on_completed().await;
                    info!("QR code confirmed");
                    return Ok(data);
                }

                if matches!(state, QrCodeState::Cancelled | QrCodeState::Timeout) {
                    debug!("QR code expired, fetching a new one");
                    break;
                }
            }
        }
    }
}
