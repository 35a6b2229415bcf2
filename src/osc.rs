//! OSC output over UDP
//!
//! Messages are encoded with `rosc` and sent fire-and-forget to a single target.

use rosc::{OscMessage, OscPacket};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::info;

/// OSC client errors
#[derive(Debug, Error)]
pub enum OscError {
    /// Host/port did not resolve to any address
    #[error("could not resolve OSC target {0}")]
    Resolve(String),

    /// Message could not be encoded
    #[error("OSC encoding failed: {0}")]
    Encode(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// UDP OSC client bound to an ephemeral local port
pub struct OscClient {
    socket: UdpSocket,
    target: SocketAddr,
}

impl OscClient {
    /// Resolve `host:port` and bind a local socket of the same address family
    pub async fn new(host: &str, port: u16) -> Result<Self, OscError> {
        let target = tokio::net::lookup_host((host, port))
            .await?
            .next()
            .ok_or_else(|| OscError::Resolve(format!("{}:{}", host, port)))?;

        let local: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local).await?;

        info!("🎛️  OSC output to {}", target);
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Encode and send one message
    pub async fn send_message(&self, message: &OscMessage) -> Result<(), OscError> {
        let packet = OscPacket::Message(message.clone());
        let bytes = rosc::encoder::encode(&packet).map_err(|e| OscError::Encode(format!("{:?}", e)))?;
        self.socket.send_to(&bytes, self.target).await?;
        Ok(())
    }
}
