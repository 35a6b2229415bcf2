//! BeatInfo data session
//!
//! Frames are u32 length-prefixed with a u32 kind. The client asks the device
//! to start streaming; the device then emits beat frames for all decks at once.
//! A beat emit carries one record count followed by that many players and then
//! that many timeline positions.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::codec;
use super::device::announce_service;
use super::error::{Error, Result};
use super::types::{BeatFrame, PlayerInfo, Token};

const KIND_START_STREAM: u32 = 0x0000_0000;
const KIND_STOP_STREAM: u32 = 0x0000_0001;
const KIND_BEAT_EMIT: u32 = 0x0000_0002;

/// Sanity cap on decks per frame
const MAX_PLAYERS: usize = 16;

/// Buffered beat frames per session
const FRAME_BUFFER: usize = 64;

pub(crate) fn encode_request(kind: u32) -> BytesMut {
    let mut buf = BytesMut::with_capacity(4);
    buf.put_u32(kind);
    buf
}

/// Device side of a beat emit; timelines are padded or cut to the player count
#[cfg(test)]
pub(crate) fn encode_frame(frame: &BeatFrame) -> BytesMut {
    let records = frame.players.len();
    let mut buf = BytesMut::with_capacity(16 + records * 32);
    buf.put_u32(KIND_BEAT_EMIT);
    buf.put_u64(frame.clock);
    buf.put_u32(records as u32);
    for player in &frame.players {
        buf.put_f64(player.beat);
        buf.put_f64(player.total_beats);
        buf.put_f64(player.bpm);
    }
    for i in 0..records {
        buf.put_f64(frame.timelines.get(i).copied().unwrap_or_default());
    }
    buf
}

/// Decode a beat emit; `Ok(None)` for other (ignored) kinds
pub(crate) fn decode_frame(mut frame: Bytes) -> Result<Option<BeatFrame>> {
    match codec::get_u32(&mut frame)? {
        KIND_BEAT_EMIT => {},
        KIND_START_STREAM | KIND_STOP_STREAM => return Ok(None),
        other => {
            return Err(Error::InvalidMessage(format!(
                "unknown BeatInfo kind {:#010x}",
                other
            )))
        },
    }

    let clock = codec::get_u64(&mut frame)?;
    let records = codec::get_u32(&mut frame)? as usize;
    if records > MAX_PLAYERS {
        return Err(Error::InvalidMessage(format!(
            "beat emit claims {} players",
            records
        )));
    }

    let mut players = Vec::with_capacity(records);
    for _ in 0..records {
        players.push(PlayerInfo {
            beat: codec::get_f64(&mut frame)?,
            total_beats: codec::get_f64(&mut frame)?,
            bpm: codec::get_f64(&mut frame)?,
        });
    }
    let mut timelines = Vec::with_capacity(records);
    for _ in 0..records {
        timelines.push(codec::get_f64(&mut frame)?);
    }
    codec::expect_end(&frame, "beat emit")?;

    Ok(Some(BeatFrame {
        clock,
        players,
        timelines,
    }))
}

/// Receiving side of a BeatInfo session
///
/// `errors` yields at most one error, after which both channels close.
pub struct BeatInfoStreams {
    pub frames: mpsc::Receiver<BeatFrame>,
    pub errors: mpsc::Receiver<Error>,
}

/// Sending side of a BeatInfo session
pub struct BeatInfoConnection {
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
}

impl BeatInfoConnection {
    /// Take over a dialled BeatInfo port
    pub async fn open(stream: TcpStream, token: Token) -> Result<(Self, BeatInfoStreams)> {
        let (read_half, mut writer) = stream.into_split();
        announce_service(&mut writer, token, "BeatInfo").await?;

        let (frame_tx, frames) = mpsc::channel(FRAME_BUFFER);
        let (error_tx, errors) = mpsc::channel(1);
        let reader = tokio::spawn(async move {
            if let Err(e) = read_frames(read_half, &frame_tx).await {
                let _ = error_tx.send(e).await;
            }
        });

        Ok((Self { writer, reader }, BeatInfoStreams { frames, errors }))
    }

    pub async fn start_stream(&mut self) -> Result<()> {
        codec::write_frame(&mut self.writer, &encode_request(KIND_START_STREAM)).await
    }
}

impl Drop for BeatInfoConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_frames(mut reader: OwnedReadHalf, frames: &mpsc::Sender<BeatFrame>) -> Result<()> {
    loop {
        let raw = codec::read_frame(&mut reader).await?;
        if let Some(frame) = decode_frame(raw)? {
            if frames.send(frame).await.is_err() {
                return Ok(());
            }
        }
    }
}
