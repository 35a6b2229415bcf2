//! UDP discovery: announcing ourselves and listening for devices
//!
//! Every StagelinQ participant broadcasts an `airD` datagram on port 51337.
//! Devices only accept connections from peers they have heard announce
//! themselves, so the listener keeps announcing for as long as it lives.

use bytes::{BufMut, BytesMut};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use super::codec;
use super::error::{Error, Result};
use super::types::{Device, DeviceState, Token};

/// UDP port used for discovery announcements
pub const DISCOVERY_PORT: u16 = 51337;

const DISCOVERY_MAGIC: &[u8; 4] = b"airD";
const ACTION_HOWDY: &str = "DISCOVERER_HOWDY_";
const ACTION_EXIT: &str = "DISCOVERER_EXIT_";

/// Largest datagram we expect
const MAX_DATAGRAM: usize = 2048;

/// How we introduce ourselves on the network
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Name shown on devices
    pub name: String,
    pub software_name: String,
    pub software_version: String,
}

/// A decoded `airD` datagram
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Announcement {
    pub token: Token,
    pub source: String,
    pub state: DeviceState,
    pub software_name: String,
    pub software_version: String,
    pub port: u16,
}

impl Announcement {
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(128);
        buf.put_slice(DISCOVERY_MAGIC);
        codec::put_token(&mut buf, &self.token);
        codec::put_string(&mut buf, &self.source);
        codec::put_string(
            &mut buf,
            match self.state {
                DeviceState::Present => ACTION_HOWDY,
                DeviceState::Leaving => ACTION_EXIT,
            },
        );
        codec::put_string(&mut buf, &self.software_name);
        codec::put_string(&mut buf, &self.software_version);
        buf.put_u16(self.port);
        buf
    }

    /// Decode a datagram; `Ok(None)` for traffic that is not an announcement
    pub fn decode(mut datagram: &[u8]) -> Result<Option<Self>> {
        if !datagram.starts_with(DISCOVERY_MAGIC) {
            return Ok(None);
        }
        datagram = &datagram[DISCOVERY_MAGIC.len()..];

        let token = codec::get_token(&mut datagram)?;
        let source = codec::get_string(&mut datagram)?;
        let action = codec::get_string(&mut datagram)?;
        let state = match action.as_str() {
            ACTION_HOWDY => DeviceState::Present,
            ACTION_EXIT => DeviceState::Leaving,
            other => {
                return Err(Error::InvalidMessage(format!(
                    "unknown discovery action {:?}",
                    other
                )))
            },
        };
        let software_name = codec::get_string(&mut datagram)?;
        let software_version = codec::get_string(&mut datagram)?;
        let port = codec::get_u16(&mut datagram)?;

        Ok(Some(Self {
            token,
            source,
            state,
            software_name,
            software_version,
            port,
        }))
    }
}

/// Discovery listener bound to the StagelinQ broadcast port
pub struct Listener {
    socket: Arc<UdpSocket>,
    token: Token,
    config: ListenerConfig,
    announcer: Option<JoinHandle<()>>,
}

impl Listener {
    /// Bind the discovery socket and generate our identity token
    pub async fn start(config: ListenerConfig) -> Result<Self> {
        let socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, DISCOVERY_PORT))?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(socket)?;

        let listener = Self::from_socket(socket, config);
        info!(
            "📡 Discovery listener on UDP {} as '{}' (token {})",
            DISCOVERY_PORT, listener.config.name, listener.token
        );
        Ok(listener)
    }

    /// Wrap an already bound socket with a fresh identity token
    pub(crate) fn from_socket(socket: UdpSocket, config: ListenerConfig) -> Self {
        Self {
            socket: Arc::new(socket),
            token: Token::random(),
            config,
            announcer: None,
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    fn announcement(&self, state: DeviceState) -> Announcement {
        Announcement {
            token: self.token,
            source: self.config.name.clone(),
            state,
            software_name: self.config.software_name.clone(),
            software_version: self.config.software_version.clone(),
            port: 0,
        }
    }

    fn broadcast_addr() -> SocketAddr {
        SocketAddr::from((Ipv4Addr::BROADCAST, DISCOVERY_PORT))
    }

    /// Broadcast our presence every `interval` from a background task
    ///
    /// Calling this again replaces the previous announcer.
    pub fn announce_every(&mut self, interval: Duration) {
        if let Some(previous) = self.announcer.take() {
            previous.abort();
        }

        let socket = Arc::clone(&self.socket);
        let datagram = self.announcement(DeviceState::Present).encode().freeze();
        let target = Self::broadcast_addr();

        self.announcer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match socket.send_to(&datagram, target).await {
                    Ok(_) => trace!("announced presence to {}", target),
                    Err(e) => debug!("presence announcement failed: {}", e),
                }
            }
        }));
    }

    /// Wait up to `timeout` for the next device announcement
    ///
    /// Our own announcements and non-StagelinQ datagrams are skipped without
    /// resetting the deadline.
    pub async fn discover(&mut self, timeout: Duration) -> Result<(Device, DeviceState)> {
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            let (len, from) = tokio::time::timeout_at(deadline, self.socket.recv_from(&mut buf))
                .await
                .map_err(|_| Error::Timeout(timeout))??;

            let Some(announcement) = Announcement::decode(&buf[..len])? else {
                trace!("ignoring non-StagelinQ datagram from {}", from);
                continue;
            };
            if announcement.token == self.token {
                continue;
            }

            let device = Device {
                ip: from.ip(),
                port: announcement.port,
                token: announcement.token,
                name: announcement.source,
                software_name: announcement.software_name,
                software_version: announcement.software_version,
            };
            return Ok((device, announcement.state));
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(announcer) = self.announcer.take() {
            announcer.abort();
        }
        let datagram = self.announcement(DeviceState::Leaving).encode();
        if let Err(e) = self.socket.try_send_to(&datagram, Self::broadcast_addr()) {
            debug!("could not announce departure: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stagelinq::TOKEN_LEN;

    fn sample() -> Announcement {
        Announcement {
            token: Token::from_bytes([0x42; TOKEN_LEN]),
            source: "SC6000-1".to_string(),
            state: DeviceState::Present,
            software_name: "JP11".to_string(),
            software_version: "3.1.0".to_string(),
            port: 50010,
        }
    }

    #[test]
    fn test_announcement_layout() {
        let bytes = sample().encode();
        assert_eq!(&bytes[..4], b"airD");
        assert_eq!(&bytes[4..20], &[0x42; TOKEN_LEN]);
        assert_eq!(&bytes[bytes.len() - 2..], &50010u16.to_be_bytes());
        assert_eq!(Announcement::decode(&bytes).unwrap(), Some(sample()));
    }

    #[test]
    fn test_exit_announcement() {
        let mut leaving = sample();
        leaving.state = DeviceState::Leaving;
        let decoded = Announcement::decode(&leaving.encode()).unwrap().unwrap();
        assert_eq!(decoded.state, DeviceState::Leaving);
    }

    #[test]
    fn test_foreign_datagram_is_skipped() {
        assert_eq!(Announcement::decode(b"M-SEARCH * HTTP/1.1").unwrap(), None);
        assert_eq!(Announcement::decode(b"").unwrap(), None);
    }

    #[test]
    fn test_truncated_announcement_is_an_error() {
        let bytes = sample().encode();
        assert!(Announcement::decode(&bytes[..bytes.len() - 1]).is_err());
    }

    #[tokio::test]
    async fn test_discover_skips_own_and_foreign_datagrams() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = socket.local_addr().unwrap();
        let mut listener = Listener::from_socket(
            socket,
            ListenerConfig {
                name: "stageosc".to_string(),
                software_name: "stageosc".to_string(),
                software_version: "0.1.0".to_string(),
            },
        );

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut own = sample();
        own.token = listener.token();
        sender.send_to(&own.encode(), target).await.unwrap();
        sender.send_to(b"M-SEARCH * HTTP/1.1", target).await.unwrap();
        sender.send_to(&sample().encode(), target).await.unwrap();

        let (device, state) = listener.discover(Duration::from_secs(2)).await.unwrap();
        assert_eq!(state, DeviceState::Present);
        assert_eq!(device.name, "SC6000-1");
        assert_eq!(device.port, 50010);
        assert_eq!(device.token, Token::from_bytes([0x42; TOKEN_LEN]));
        assert_eq!(device.ip, target.ip());

        let err = listener
            .discover(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_unknown_action_is_an_error() {
        let mut buf = BytesMut::new();
        buf.put_slice(DISCOVERY_MAGIC);
        codec::put_token(&mut buf, &Token::default());
        codec::put_string(&mut buf, "x");
        codec::put_string(&mut buf, "DISCOVERER_WAVE_");
        assert!(matches!(
            Announcement::decode(&buf),
            Err(Error::InvalidMessage(_))
        ));
    }
}
