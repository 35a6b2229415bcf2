//! StateMap data session
//!
//! After the in-protocol service announcement, every message is a u32
//! length-prefixed frame starting with the `smaa` magic and a u32 kind.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde_json::{Map, Value};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use super::codec;
use super::device::announce_service;
use super::error::{Error, Result};
use super::types::{State, Token};

const SMAA_MAGIC: &[u8; 4] = b"smaa";

const KIND_STATE_EMIT: u32 = 0x0000_0000;
const KIND_SUBSCRIBE_ACK: u32 = 0x0000_07d1;
const KIND_SUBSCRIBE: u32 = 0x0000_07d2;

/// Buffered state events per session
const STATE_BUFFER: usize = 256;

/// Decoded StateMap frame
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StateMapMessage {
    Emit { name: String, json: String },
    SubscribeAck { name: String, interval: u32 },
    Subscribe { name: String, interval: u32 },
}

impl StateMapMessage {
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_slice(SMAA_MAGIC);
        match self {
            StateMapMessage::Emit { name, json } => {
                buf.put_u32(KIND_STATE_EMIT);
                codec::put_string(&mut buf, name);
                codec::put_string(&mut buf, json);
            },
            StateMapMessage::SubscribeAck { name, interval } => {
                buf.put_u32(KIND_SUBSCRIBE_ACK);
                codec::put_string(&mut buf, name);
                buf.put_u32(*interval);
            },
            StateMapMessage::Subscribe { name, interval } => {
                buf.put_u32(KIND_SUBSCRIBE);
                codec::put_string(&mut buf, name);
                buf.put_u32(*interval);
            },
        }
        buf
    }

    pub fn decode(mut frame: Bytes) -> Result<Self> {
        if !frame.starts_with(SMAA_MAGIC) {
            return Err(Error::InvalidMessage(
                "StateMap frame without smaa magic".to_string(),
            ));
        }
        frame.advance(SMAA_MAGIC.len());

        let message = match codec::get_u32(&mut frame)? {
            KIND_STATE_EMIT => StateMapMessage::Emit {
                name: codec::get_string(&mut frame)?,
                json: codec::get_string(&mut frame)?,
            },
            KIND_SUBSCRIBE_ACK => StateMapMessage::SubscribeAck {
                name: codec::get_string(&mut frame)?,
                interval: codec::get_u32(&mut frame)?,
            },
            KIND_SUBSCRIBE => StateMapMessage::Subscribe {
                name: codec::get_string(&mut frame)?,
                interval: codec::get_u32(&mut frame)?,
            },
            other => {
                return Err(Error::InvalidMessage(format!(
                    "unknown StateMap kind {:#010x}",
                    other
                )))
            },
        };
        Ok(message)
    }
}

/// Parse an emitted JSON value into a [`State`]
pub(crate) fn parse_state(name: String, json: &str) -> Result<State> {
    match serde_json::from_str::<Value>(json)? {
        Value::Object(value) => Ok(State { name, value }),
        other => {
            let mut value = Map::new();
            value.insert("value".to_string(), other);
            Ok(State { name, value })
        },
    }
}

/// Receiving side of a StateMap session
///
/// `errors` yields at most one error, after which both channels close.
pub struct StateMapStreams {
    pub states: mpsc::Receiver<State>,
    pub errors: mpsc::Receiver<Error>,
}

/// Sending side of a StateMap session
pub struct StateMapConnection {
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
}

impl StateMapConnection {
    /// Take over a dialled StateMap port
    pub async fn open(stream: TcpStream, token: Token) -> Result<(Self, StateMapStreams)> {
        let (read_half, mut writer) = stream.into_split();
        announce_service(&mut writer, token, "StateMap").await?;

        let (state_tx, states) = mpsc::channel(STATE_BUFFER);
        let (error_tx, errors) = mpsc::channel(1);
        let reader = tokio::spawn(async move {
            if let Err(e) = read_states(read_half, &state_tx).await {
                let _ = error_tx.send(e).await;
            }
        });

        Ok((Self { writer, reader }, StateMapStreams { states, errors }))
    }

    /// Ask the device to push changes of `name`
    pub async fn subscribe(&mut self, name: &str) -> Result<()> {
        let message = StateMapMessage::Subscribe {
            name: name.to_string(),
            interval: 0,
        };
        codec::write_frame(&mut self.writer, &message.encode()).await
    }
}

impl Drop for StateMapConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Decode frames until the connection fails or every receiver is gone
async fn read_states(mut reader: OwnedReadHalf, states: &mpsc::Sender<State>) -> Result<()> {
    loop {
        let frame = codec::read_frame(&mut reader).await?;
        match StateMapMessage::decode(frame)? {
            StateMapMessage::Emit { name, json } => {
                let state = parse_state(name, &json)?;
                if states.send(state).await.is_err() {
                    return Ok(());
                }
            },
            StateMapMessage::SubscribeAck { name, .. } => {
                trace!("subscription to {} acknowledged", name);
            },
            StateMapMessage::Subscribe { name, .. } => {
                trace!("ignoring subscription request for {} from device", name);
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stagelinq::TOKEN_LEN;
    use tokio::net::TcpListener;

    #[test]
    fn test_subscribe_layout() {
        let bytes = StateMapMessage::Subscribe {
            name: "/A".to_string(),
            interval: 0,
        }
        .encode();
        assert_eq!(&bytes[..4], b"smaa");
        assert_eq!(&bytes[4..8], &[0, 0, 0x07, 0xd2]);
        assert_eq!(&bytes[8..12], &[0, 0, 0, 4]);
        assert_eq!(&bytes[bytes.len() - 4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_emit_decodes() {
        let emitted = StateMapMessage::Emit {
            name: "/Engine/Deck1/Track/SongName".to_string(),
            json: r#"{"string":"Teardrop","type":8}"#.to_string(),
        };
        let decoded = StateMapMessage::decode(emitted.encode().freeze()).unwrap();
        assert_eq!(decoded, emitted);
    }

    #[test]
    fn test_missing_magic_is_rejected() {
        let frame = Bytes::from_static(&[0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            StateMapMessage::decode(frame),
            Err(Error::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_parse_state_object_and_scalar() {
        let state = parse_state("/A".to_string(), r#"{"string":"x","type":8}"#).unwrap();
        assert_eq!(state.string_value(), Some("x"));

        let state = parse_state("/B".to_string(), "true").unwrap();
        assert_eq!(state.string_value(), None);
        assert_eq!(state.value.get("value"), Some(&Value::Bool(true)));

        assert!(parse_state("/C".to_string(), "{not json").is_err());
    }

    #[tokio::test]
    async fn test_session_over_tcp() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let device = tokio::spawn(async move {
            let (mut stream, _) = server.accept().await.unwrap();
            // In-protocol service announcement comes first
            let announcement = crate::stagelinq::device::MainMessage::read(&mut stream)
                .await
                .unwrap();
            let subscribe = StateMapMessage::decode(codec::read_frame(&mut stream).await.unwrap())
                .unwrap();

            let emit = StateMapMessage::Emit {
                name: "/Engine/Deck2/Track/ArtistName".to_string(),
                json: r#"{"string":"Massive Attack","type":8}"#.to_string(),
            };
            codec::write_frame(&mut stream, &emit.encode()).await.unwrap();
            (announcement, subscribe)
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let token = Token::from_bytes([5; TOKEN_LEN]);
        let (mut connection, mut streams) = StateMapConnection::open(stream, token).await.unwrap();
        connection
            .subscribe("/Engine/Deck2/Track/ArtistName")
            .await
            .unwrap();

        let state = streams.states.recv().await.unwrap();
        assert_eq!(state.name, "/Engine/Deck2/Track/ArtistName");
        assert_eq!(state.string_value(), Some("Massive Attack"));

        let (announcement, subscribe) = device.await.unwrap();
        assert!(matches!(
            announcement,
            crate::stagelinq::device::MainMessage::ServiceAnnouncement { ref service, token: t, .. }
                if service == "StateMap" && t == token
        ));
        assert_eq!(
            subscribe,
            StateMapMessage::Subscribe {
                name: "/Engine/Deck2/Track/ArtistName".to_string(),
                interval: 0
            }
        );

        // Device hung up: the session reports exactly one error
        let error = streams.errors.recv().await.unwrap();
        assert!(matches!(error, Error::ConnectionClosed));
    }
}
