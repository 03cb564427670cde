//! Packet source (spec.md section 6 "Input packet format"): a byte buffer
//! starting at an Ethernet header, delivered with a capture timestamp.
//!
//! The core engine doesn't care where packets come from — a pcap reader, an
//! AF_PACKET socket, a replay file — only that each one arrives framed with
//! its timestamp. [`FramedStdinSource`] is the one concrete source this
//! crate ships: a simple length-prefixed record stream suitable for piping
//! a capture into the CLI.

use crate::error::{EngineError, Result};
use crate::processor::Timestamp;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;

pub trait PacketSource {
    /// Returns the next packet and its capture timestamp, or `None` at
    /// end of stream.
    fn next_packet(&mut self) -> Result<Option<(Timestamp, Vec<u8>)>>;
}

/// Frame format: `secs: u64 BE`, `micros: u32 BE`, `len: u32 BE`, then `len`
/// bytes of packet data, repeated until EOF.
pub struct FramedStdinSource<R: Read> {
    inner: R,
}

impl<R: Read> FramedStdinSource<R> {
    pub fn new(inner: R) -> Self {
        FramedStdinSource { inner }
    }
}

impl<R: Read> PacketSource for FramedStdinSource<R> {
    fn next_packet(&mut self) -> Result<Option<(Timestamp, Vec<u8>)>> {
        let secs = match self.inner.read_u64::<BigEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(EngineError::Io(e)),
        };
        let micros = self.inner.read_u32::<BigEndian>().map_err(EngineError::Io)?;
        let len = self.inner.read_u32::<BigEndian>().map_err(EngineError::Io)? as usize;
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf).map_err(EngineError::Io)?;
        Ok(Some((Timestamp { secs, micros }, buf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Cursor;

    fn frame(secs: u64, micros: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u64::<BigEndian>(secs).unwrap();
        buf.write_u32::<BigEndian>(micros).unwrap();
        buf.write_u32::<BigEndian>(payload.len() as u32).unwrap();
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn reads_consecutive_frames_then_none() {
        let mut bytes = frame(10, 500, b"abc");
        bytes.extend(frame(11, 0, b"xyz"));
        let mut source = FramedStdinSource::new(Cursor::new(bytes));

        let (ts, packet) = source.next_packet().unwrap().unwrap();
        assert_eq!(ts, Timestamp { secs: 10, micros: 500 });
        assert_eq!(packet, b"abc");

        let (ts, packet) = source.next_packet().unwrap().unwrap();
        assert_eq!(ts, Timestamp { secs: 11, micros: 0 });
        assert_eq!(packet, b"xyz");

        assert!(source.next_packet().unwrap().is_none());
    }

    #[test]
    fn empty_stream_yields_none_immediately() {
        let mut source = FramedStdinSource::new(Cursor::new(Vec::new()));
        assert!(source.next_packet().unwrap().is_none());
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let mut bytes = frame(10, 0, b"abc");
        bytes.truncate(bytes.len() - 1);
        let mut source = FramedStdinSource::new(Cursor::new(bytes));
        assert!(source.next_packet().is_err());
    }
}
