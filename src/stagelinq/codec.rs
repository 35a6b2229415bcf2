//! Wire primitives shared by every StagelinQ message
//!
//! Integers are big-endian. Strings are a u32 byte length followed by
//! UTF-16BE code units. Tokens are 16 raw bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::{Error, Result};
use super::types::{Token, TOKEN_LEN};

/// Largest length-prefixed frame we buffer
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Largest string we accept on a stream (bytes)
const MAX_STRING_LEN: usize = 64 * 1024;

pub fn put_string(buf: &mut BytesMut, value: &str) {
    let units: Vec<u16> = value.encode_utf16().collect();
    buf.put_u32((units.len() * 2) as u32);
    for unit in units {
        buf.put_u16(unit);
    }
}

pub fn put_token(buf: &mut BytesMut, token: &Token) {
    buf.put_slice(token.as_bytes());
}

fn ensure<B: Buf>(buf: &B, needed: usize, what: &'static str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(Error::Truncated {
            what,
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

pub fn get_u16<B: Buf>(buf: &mut B) -> Result<u16> {
    ensure(&*buf, 2, "u16")?;
    Ok(buf.get_u16())
}

pub fn get_u32<B: Buf>(buf: &mut B) -> Result<u32> {
    ensure(&*buf, 4, "u32")?;
    Ok(buf.get_u32())
}

pub fn get_u64<B: Buf>(buf: &mut B) -> Result<u64> {
    ensure(&*buf, 8, "u64")?;
    Ok(buf.get_u64())
}

pub fn get_f64<B: Buf>(buf: &mut B) -> Result<f64> {
    ensure(&*buf, 8, "f64")?;
    Ok(buf.get_f64())
}

pub fn get_token<B: Buf>(buf: &mut B) -> Result<Token> {
    ensure(&*buf, TOKEN_LEN, "token")?;
    let mut bytes = [0u8; TOKEN_LEN];
    buf.copy_to_slice(&mut bytes);
    Ok(Token::from_bytes(bytes))
}

pub fn get_string<B: Buf>(buf: &mut B) -> Result<String> {
    let len = get_u32(buf)? as usize;
    ensure(&*buf, len, "string")?;
    decode_utf16(&buf.copy_to_bytes(len))
}

fn decode_utf16(raw: &[u8]) -> Result<String> {
    if raw.len() % 2 != 0 {
        return Err(Error::InvalidMessage(format!(
            "odd UTF-16 string length {}",
            raw.len()
        )));
    }
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units)
        .map_err(|_| Error::InvalidMessage("string is not valid UTF-16".to_string()))
}

/// Make sure a decoded frame has no trailing garbage
pub fn expect_end<B: Buf>(buf: &B, what: &str) -> Result<()> {
    if buf.has_remaining() {
        return Err(Error::InvalidMessage(format!(
            "{} has {} trailing bytes",
            what,
            buf.remaining()
        )));
    }
    Ok(())
}

pub async fn read_u16<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u16> {
    reader.read_u16().await.map_err(Error::from_read)
}

pub async fn read_u32<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u32> {
    reader.read_u32().await.map_err(Error::from_read)
}

pub async fn read_i64<R: AsyncRead + Unpin>(reader: &mut R) -> Result<i64> {
    reader.read_i64().await.map_err(Error::from_read)
}

pub async fn read_token<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Token> {
    let mut bytes = [0u8; TOKEN_LEN];
    reader
        .read_exact(&mut bytes)
        .await
        .map_err(Error::from_read)?;
    Ok(Token::from_bytes(bytes))
}

pub async fn read_string<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String> {
    let len = read_u32(reader).await? as usize;
    if len > MAX_STRING_LEN {
        return Err(Error::FrameTooLarge(len));
    }
    let mut raw = vec![0u8; len];
    reader.read_exact(&mut raw).await.map_err(Error::from_read)?;
    decode_utf16(&raw)
}

/// Read one u32 length-prefixed frame
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Bytes> {
    let len = read_u32(reader).await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(Error::from_read)?;
    Ok(Bytes::from(payload))
}

/// Write `payload` behind a u32 length prefix
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    write_all(writer, &buf).await
}

pub async fn write_all<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}
