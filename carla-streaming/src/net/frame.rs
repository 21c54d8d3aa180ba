//! Wire framing: every message on the wire is a little-endian `u32` payload
//! size followed by that many bytes of payload. The byte order is an
//! explicit choice (the original implementation left it to host order,
//! which is not safe across heterogeneous render nodes) rather than a
//! carried-over ambiguity.

use std::io;

use byteorder::{ByteOrder, LittleEndian};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::buffer::{BufferPool, BufferView};

pub const HEADER_SIZE: usize = 4;

/// The maximum payload size accepted on read, guarding against a corrupt or
/// hostile peer claiming an unbounded frame.
pub const MAX_PAYLOAD_SIZE: u32 = 256 * 1024 * 1024;

#[inline]
pub fn encode_header(payload_size: u32) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    LittleEndian::write_u32(&mut header, payload_size);
    header
}

#[inline]
pub fn decode_header(header: &[u8]) -> u32 {
    LittleEndian::read_u32(header)
}

/// A small, fixed-capacity gather list: a precomputed size header followed
/// by up to two [`BufferView`] parts. Sensor frames use one part for a
/// single payload buffer; multi-GPU control messages use two, one for the
/// command header and one for the body.
pub struct Message {
    header: [u8; HEADER_SIZE],
    parts: Vec<BufferView>,
}

impl Message {
    pub const MAX_PARTS: usize = 2;

    pub fn single(part: BufferView) -> Message {
        Message::new(vec![part])
    }

    pub fn pair(head: BufferView, tail: BufferView) -> Message {
        Message::new(vec![head, tail])
    }

    pub fn new(parts: Vec<BufferView>) -> Message {
        assert!(
            !parts.is_empty() && parts.len() <= Self::MAX_PARTS,
            "Message supports 1..={} parts, got {}",
            Self::MAX_PARTS,
            parts.len()
        );
        let total: usize = parts.iter().map(BufferView::len).sum();
        Message {
            header: encode_header(total as u32),
            parts,
        }
    }

    #[inline]
    pub fn total_payload_size(&self) -> u32 {
        decode_header(&self.header)
    }

    #[inline]
    pub fn parts(&self) -> &[BufferView] {
        &self.parts
    }
}

/// Writes a message as a sequence of gathered slices, retrying until every
/// byte of the header and every part has been written. `tokio`'s
/// `write_vectored` is not guaranteed to drain the whole list in one
/// syscall, so this loops over whatever it could not place.
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, msg: &Message) -> io::Result<()> {
    writer.write_all(&msg.header).await?;
    for part in msg.parts() {
        writer.write_all(part.as_slice()).await?;
    }
    Ok(())
}

/// Reads one length-prefixed frame, allocating its storage from `pool`.
///
/// Returns `Ok(None)` if the peer closed the connection cleanly before any
/// header bytes arrived (a normal shutdown, not a protocol error).
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
    pool: &BufferPool,
) -> io::Result<Option<BufferView>> {
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let size = decode_header(&header);
    if size > MAX_PAYLOAD_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame size {} exceeds maximum {}", size, MAX_PAYLOAD_SIZE),
        ));
    }

    let mut buffer = pool.pop();
    buffer.resize(size as usize);
    reader.read_exact(buffer.as_mut_slice()).await?;
    Ok(Some(buffer.freeze()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn roundtrip_single_part() {
        let pool = BufferPool::new(4096);
        let payload = BufferView::from(b"hello carla".to_vec());
        let msg = Message::single(payload.clone());

        let mut wire = Vec::new();
        write_message(&mut wire, &msg).await.unwrap();

        let mut cursor = Cursor::new(wire);
        let received = read_message(&mut cursor, &pool).await.unwrap().unwrap();
        assert_eq!(received.as_slice(), payload.as_slice());
    }

    #[tokio::test]
    async fn roundtrip_two_parts_sums_sizes_in_header() {
        let pool = BufferPool::new(4096);
        let head = BufferView::from(vec![1, 2, 3, 4]);
        let tail = BufferView::from(vec![5, 6]);
        let msg = Message::pair(head, tail);
        assert_eq!(msg.total_payload_size(), 6);

        let mut wire = Vec::new();
        write_message(&mut wire, &msg).await.unwrap();

        let mut cursor = Cursor::new(wire);
        let received = read_message(&mut cursor, &pool).await.unwrap().unwrap();
        assert_eq!(received.as_slice(), &[1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn eof_before_header_is_a_clean_close() {
        let pool = BufferPool::new(4096);
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(read_message(&mut cursor, &pool).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let pool = BufferPool::new(4096);
        let header = encode_header(MAX_PAYLOAD_SIZE + 1);
        let mut cursor = Cursor::new(header.to_vec());
        let err = read_message(&mut cursor, &pool).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
