//! Main (control) connection to a device
//!
//! The main connection carries three message kinds, each prefixed by a u32 id:
//! service announcements, reference (keep-alive) messages and service requests.
//! A reader task decodes them into a channel for as long as the connection lives.

use bytes::{BufMut, BytesMut};
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::codec;
use super::error::{Error, Result};
use super::types::{Device, Service, Token};

/// Deadline for TCP connects to a device
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for the device to list its services
const SERVICES_TIMEOUT: Duration = Duration::from_secs(5);

const MSG_SERVICE_ANNOUNCEMENT: u32 = 0x0000_0000;
const MSG_REFERENCE: u32 = 0x0000_0001;
const MSG_SERVICES_REQUEST: u32 = 0x0000_0002;

/// Messages exchanged on the main connection
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MainMessage {
    ServiceAnnouncement {
        token: Token,
        service: String,
        port: u16,
    },
    Reference {
        token: Token,
        token2: Token,
        reference: i64,
    },
    ServicesRequest {
        token: Token,
    },
}

impl MainMessage {
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(64);
        match self {
            MainMessage::ServiceAnnouncement {
                token,
                service,
                port,
            } => {
                buf.put_u32(MSG_SERVICE_ANNOUNCEMENT);
                codec::put_token(&mut buf, token);
                codec::put_string(&mut buf, service);
                buf.put_u16(*port);
            },
            MainMessage::Reference {
                token,
                token2,
                reference,
            } => {
                buf.put_u32(MSG_REFERENCE);
                codec::put_token(&mut buf, token);
                codec::put_token(&mut buf, token2);
                buf.put_i64(*reference);
            },
            MainMessage::ServicesRequest { token } => {
                buf.put_u32(MSG_SERVICES_REQUEST);
                codec::put_token(&mut buf, token);
            },
        }
        buf
    }

    pub async fn read<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        match codec::read_u32(reader).await? {
            MSG_SERVICE_ANNOUNCEMENT => Ok(MainMessage::ServiceAnnouncement {
                token: codec::read_token(reader).await?,
                service: codec::read_string(reader).await?,
                port: codec::read_u16(reader).await?,
            }),
            MSG_REFERENCE => Ok(MainMessage::Reference {
                token: codec::read_token(reader).await?,
                token2: codec::read_token(reader).await?,
                reference: codec::read_i64(reader).await?,
            }),
            MSG_SERVICES_REQUEST => Ok(MainMessage::ServicesRequest {
                token: codec::read_token(reader).await?,
            }),
            other => Err(Error::InvalidMessage(format!(
                "unknown main message id {:#010x}",
                other
            ))),
        }
    }
}

/// Announce a data connection in-protocol, as devices expect before anything else
pub(crate) async fn announce_service(
    writer: &mut OwnedWriteHalf,
    token: Token,
    service: &str,
) -> Result<()> {
    let port = writer.local_addr()?.port();
    let message = MainMessage::ServiceAnnouncement {
        token,
        service: service.to_string(),
        port,
    };
    codec::write_all(writer, &message.encode()).await
}

impl Device {
    /// Open a raw TCP connection to one of this device's service ports
    pub async fn dial(&self, port: u16) -> Result<TcpStream> {
        let addr = self.service_addr(port);
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Timeout(CONNECT_TIMEOUT))??;
        stream.set_nodelay(true)?;
        debug!("connected to {} ({})", addr, self.name);
        Ok(stream)
    }
}

/// Open main connection to a device
pub struct DeviceConnection {
    writer: OwnedWriteHalf,
    token: Token,
    messages: mpsc::Receiver<MainMessage>,
    reader: JoinHandle<()>,
}

impl DeviceConnection {
    /// Connect to the device's main port and start decoding its messages
    pub async fn connect(device: &Device, token: Token) -> Result<Self> {
        let stream = device.dial(device.port).await?;
        let (mut read_half, writer) = stream.into_split();
        let (tx, messages) = mpsc::channel(64);
        let name = device.name.clone();

        let reader = tokio::spawn(async move {
            loop {
                match MainMessage::read(&mut read_half).await {
                    Ok(message) => match tx.try_send(message) {
                        Ok(()) => {},
                        Err(mpsc::error::TrySendError::Full(message)) => {
                            trace!("dropping main message from {}: {:?}", name, message);
                        },
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    },
                    Err(e) => {
                        debug!("main connection to {} ended: {}", name, e);
                        break;
                    },
                }
            }
        });

        Ok(Self {
            writer,
            token,
            messages,
            reader,
        })
    }

    /// Ask the device which data services it offers
    ///
    /// The device answers with one service announcement per service and
    /// closes the list with a reference message. A device offering no
    /// services answers with the reference alone.
    pub async fn request_services(&mut self) -> Result<Vec<Service>> {
        // Discard keep-alives queued before the request
        while self.messages.try_recv().is_ok() {}

        let request = MainMessage::ServicesRequest { token: self.token };
        codec::write_all(&mut self.writer, &request.encode()).await?;

        let deadline = tokio::time::Instant::now() + SERVICES_TIMEOUT;
        let mut services = Vec::new();
        loop {
            let message = match tokio::time::timeout_at(deadline, self.messages.recv()).await {
                Ok(Some(message)) => message,
                Ok(None) => return Err(Error::ConnectionClosed),
                Err(_) if !services.is_empty() => return Ok(services),
                Err(_) => return Err(Error::Timeout(SERVICES_TIMEOUT)),
            };

            match message {
                MainMessage::ServiceAnnouncement { service, port, .. } => {
                    services.push(Service::new(service, port));
                },
                MainMessage::Reference { .. } => return Ok(services),
                other => trace!("ignoring {:?} while waiting for services", other),
            }
        }
    }
}

impl Drop for DeviceConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
