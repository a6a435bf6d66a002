//! Frame encoding and incremental decoding.

use std::io::{self, Read, Write};

use crate::errors::FrameError;
use crate::kind::MessageKind;
use crate::mac::{MAC_BYTES, MacChain};

/// Bytes in a frame header: kind plus big-endian payload length.
pub const FRAME_HEADER_BYTES: usize = 5;

/// Payload ceiling in force until the peer has been authenticated.
pub const INITIAL_FRAME_LIMIT: usize = 256;

/// Payload ceiling once the peer is trusted.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

const READ_CHUNK: usize = 16 * 1024;

/// A decoded, verified frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message kind.
    pub kind: MessageKind,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

#[expect(
    clippy::big_endian_bytes,
    reason = "frame lengths are big-endian on the wire"
)]
fn encode_header(kind: MessageKind, length: usize) -> Result<[u8; FRAME_HEADER_BYTES], FrameError> {
    let announced = u32::try_from(length).map_err(|_| FrameError::Oversized {
        length,
        limit: MAX_FRAME_BYTES,
    })?;
    let [a, b, c, d] = announced.to_be_bytes();
    Ok([kind.as_byte(), a, b, c, d])
}

/// Outbound half of a connection: frames payloads and signs them when keyed.
#[derive(Debug)]
pub struct FrameWriter {
    mac: Option<MacChain>,
}

impl FrameWriter {
    /// Writer for connections without a shared secret.
    #[must_use]
    pub const fn unkeyed() -> Self {
        Self { mac: None }
    }

    /// Writer signing every non-error frame under `key`, seeded with `label`.
    pub fn keyed(key: &[u8], label: &[u8]) -> Result<Self, FrameError> {
        Ok(Self {
            mac: Some(MacChain::new(key, label)?),
        })
    }

    /// Encodes one frame, advancing the MAC chain when it is signed.
    pub fn encode(&mut self, kind: MessageKind, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
        if payload.len() > MAX_FRAME_BYTES {
            return Err(FrameError::Oversized {
                length: payload.len(),
                limit: MAX_FRAME_BYTES,
            });
        }
        let header = encode_header(kind, payload.len())?;
        let mut frame = Vec::with_capacity(FRAME_HEADER_BYTES + payload.len() + MAC_BYTES);
        frame.extend_from_slice(&header);
        frame.extend_from_slice(payload);
        if kind.is_signed()
            && let Some(mac) = self.mac.as_mut()
        {
            frame.extend_from_slice(&mac.sign(&header, payload));
        }
        Ok(frame)
    }

    /// Encodes a frame and writes it in full.
    pub fn write_frame<W: Write>(
        &mut self,
        writer: &mut W,
        kind: MessageKind,
        payload: &[u8],
    ) -> Result<(), FrameError> {
        let frame = self.encode(kind, payload)?;
        writer.write_all(&frame)?;
        writer.flush()?;
        Ok(())
    }
}

/// Inbound half of a connection.
///
/// Bytes accumulate in an internal buffer until a whole frame is present, so
/// a read that times out part-way through a frame loses nothing.
#[derive(Debug)]
pub struct FrameReader {
    buffer: Vec<u8>,
    mac: Option<MacChain>,
    limit: usize,
}

impl FrameReader {
    /// Reader for connections without a shared secret.
    #[must_use]
    pub const fn unkeyed() -> Self {
        Self {
            buffer: Vec::new(),
            mac: None,
            limit: INITIAL_FRAME_LIMIT,
        }
    }

    /// Reader verifying every non-error frame under `key`, seeded with
    /// `label`.
    pub fn keyed(key: &[u8], label: &[u8]) -> Result<Self, FrameError> {
        Ok(Self {
            buffer: Vec::new(),
            mac: Some(MacChain::new(key, label)?),
            limit: INITIAL_FRAME_LIMIT,
        })
    }

    /// Raises the payload ceiling once the peer has been authenticated.
    pub const fn lift_limit(&mut self) {
        self.limit = MAX_FRAME_BYTES;
    }

    /// Payload ceiling currently enforced.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Appends raw bytes received out of band.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Decodes the next complete frame already buffered, if any.
    #[expect(
        clippy::big_endian_bytes,
        reason = "frame lengths are big-endian on the wire"
    )]
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        let Some(&[kind_byte, a, b, c, d]) = self.buffer.get(..FRAME_HEADER_BYTES) else {
            return Ok(None);
        };
        let kind = MessageKind::try_from(kind_byte)?;
        let length = usize::try_from(u32::from_be_bytes([a, b, c, d])).unwrap_or(usize::MAX);
        if length > self.limit {
            return Err(FrameError::Oversized {
                length,
                limit: self.limit,
            });
        }
        let tag_len = if kind.is_signed() && self.mac.is_some() {
            MAC_BYTES
        } else {
            0
        };
        let payload_end = FRAME_HEADER_BYTES + length;
        let total = payload_end + tag_len;
        if self.buffer.len() < total {
            return Ok(None);
        }

        let mut frame: Vec<u8> = self.buffer.drain(..total).collect();
        let tag = frame.split_off(payload_end);
        let payload = frame.split_off(FRAME_HEADER_BYTES);
        if let Some(mac) = self.mac.as_mut()
            && tag_len > 0
        {
            mac.verify(&frame, &payload, &tag)?;
        }
        Ok(Some(Frame { kind, payload }))
    }

    /// Returns the next frame, reading from `reader` as needed.
    ///
    /// `Ok(None)` means the read timed out or would block before a whole
    /// frame arrived; buffered bytes are kept for the next call. End of
    /// stream is reported as [`FrameError::Closed`].
    pub fn poll<R: Read>(&mut self, reader: &mut R) -> Result<Option<Frame>, FrameError> {
        let mut chunk = [0_u8; READ_CHUNK];
        loop {
            if let Some(frame) = self.next_frame()? {
                return Ok(Some(frame));
            }
            match reader.read(&mut chunk) {
                Ok(0) => return Err(FrameError::Closed),
                Ok(read) => self.push(chunk.get(..read).unwrap_or_default()),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error)
                    if matches!(
                        error.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    return Ok(None);
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::{CLIENT_LABEL, SERVER_LABEL};
    use rstest::rstest;

    #[rstest]
    fn unkeyed_frames_decode_in_order() {
        let mut writer = FrameWriter::unkeyed();
        let mut reader = FrameReader::unkeyed();
        let first = writer.encode(MessageKind::Init, b"{}").expect("encode");
        let second = writer.encode(MessageKind::Keepalive, b"").expect("encode");
        reader.push(&first);
        reader.push(&second);

        let frame = reader.next_frame().expect("decode").expect("frame");
        assert_eq!(frame.kind, MessageKind::Init);
        assert_eq!(frame.payload, b"{}");
        let frame = reader.next_frame().expect("decode").expect("frame");
        assert_eq!(frame.kind, MessageKind::Keepalive);
        assert!(reader.next_frame().expect("decode").is_none());
    }

    #[rstest]
    fn partial_frames_wait_for_more_bytes() {
        let mut writer = FrameWriter::unkeyed();
        let mut reader = FrameReader::unkeyed();
        let bytes = writer.encode(MessageKind::Request, b"abcdef").expect("encode");
        let (head, tail) = bytes.split_at(7);
        reader.push(head);
        assert!(reader.next_frame().expect("decode").is_none());
        reader.push(tail);
        let frame = reader.next_frame().expect("decode").expect("frame");
        assert_eq!(frame.payload, b"abcdef");
    }

    #[rstest]
    fn keyed_frames_verify_across_the_chain() {
        let mut writer = FrameWriter::keyed(b"key", CLIENT_LABEL).expect("writer");
        let mut reader = FrameReader::keyed(b"key", CLIENT_LABEL).expect("reader");
        for payload in [&b"a"[..], b"bb", b"ccc"] {
            reader.push(&writer.encode(MessageKind::Request, payload).expect("encode"));
            let frame = reader.next_frame().expect("verify").expect("frame");
            assert_eq!(frame.payload, payload);
        }
    }

    #[rstest]
    fn tampered_payload_is_rejected() {
        let mut writer = FrameWriter::keyed(b"key", SERVER_LABEL).expect("writer");
        let mut reader = FrameReader::keyed(b"key", SERVER_LABEL).expect("reader");
        let mut bytes = writer.encode(MessageKind::Response, b"value").expect("encode");
        if let Some(byte) = bytes.get_mut(FRAME_HEADER_BYTES) {
            *byte ^= 0xff;
        }
        reader.push(&bytes);
        let error = reader.next_frame().expect_err("tamper detected");
        assert!(matches!(error, FrameError::BadSignature));
    }

    #[rstest]
    fn error_frames_are_unsigned_and_leave_the_chain_untouched() {
        let mut writer = FrameWriter::keyed(b"key", SERVER_LABEL).expect("writer");
        let mut reader = FrameReader::keyed(b"key", SERVER_LABEL).expect("reader");
        let error = writer.encode(MessageKind::Error, b"oops").expect("encode");
        assert_eq!(error.len(), FRAME_HEADER_BYTES + 4);
        let next = writer.encode(MessageKind::Init, b"{}").expect("encode");
        reader.push(&error);
        reader.push(&next);
        assert_eq!(
            reader.next_frame().expect("decode").expect("frame").kind,
            MessageKind::Error
        );
        assert_eq!(
            reader.next_frame().expect("decode").expect("frame").kind,
            MessageKind::Init
        );
    }

    #[rstest]
    fn initial_limit_rejects_large_frames_until_lifted() {
        let mut writer = FrameWriter::unkeyed();
        let payload = vec![b'x'; INITIAL_FRAME_LIMIT + 1];
        let bytes = writer.encode(MessageKind::Request, &payload).expect("encode");

        let mut reader = FrameReader::unkeyed();
        reader.push(&bytes);
        let error = reader.next_frame().expect_err("too long before auth");
        assert!(matches!(error, FrameError::Oversized { limit, .. } if limit == INITIAL_FRAME_LIMIT));

        let mut trusted = FrameReader::unkeyed();
        trusted.lift_limit();
        trusted.push(&bytes);
        assert!(trusted.next_frame().expect("decode").is_some());
    }

    #[rstest]
    fn unknown_kind_is_rejected() {
        let mut reader = FrameReader::unkeyed();
        reader.push(&[42, 0, 0, 0, 0]);
        let error = reader.next_frame().expect_err("unknown kind");
        assert!(matches!(error, FrameError::UnknownKind { byte: 42 }));
    }

    #[rstest]
    fn poll_reports_end_of_stream() {
        let mut reader = FrameReader::unkeyed();
        let mut source: &[u8] = &[];
        let error = reader.poll(&mut source).expect_err("eof");
        assert!(error.is_disconnect());
    }

    #[rstest]
    fn poll_reads_whole_frames_from_a_stream() {
        let mut writer = FrameWriter::unkeyed();
        let bytes = writer.encode(MessageKind::Goodbye, b"{}").expect("encode");
        let mut reader = FrameReader::unkeyed();
        let mut source: &[u8] = &bytes;
        let frame = reader.poll(&mut source).expect("poll").expect("frame");
        assert_eq!(frame.kind, MessageKind::Goodbye);
    }
}
