//! In-memory byte buffer with optional gzip compression
//!
//! `size()` always reports bytes physically held in the buffer, i.e. the
//! compressed length when compression is enabled. Upload decisions are
//! based on that number.

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::error::Result;

/// Underlying byte sink
enum Sink {
    Plain(Vec<u8>),
    Gzip(GzEncoder<Vec<u8>>),
}

impl Sink {
    fn new(compression: Option<Compression>) -> Self {
        match compression {
            Some(level) => Sink::Gzip(GzEncoder::new(Vec::new(), level)),
            None => Sink::Plain(Vec::new()),
        }
    }

    fn finish(self) -> Result<Vec<u8>> {
        match self {
            Sink::Plain(bytes) => Ok(bytes),
            Sink::Gzip(encoder) => Ok(encoder.finish()?),
        }
    }
}

/// Accumulates serialized document bytes for upload
pub struct StreamingBuffer {
    sink: Sink,
    compression: Option<Compression>,
    total_written: u64,
}

impl StreamingBuffer {
    /// Create a new buffer
    ///
    /// # Arguments
    /// * `compression` - Whether to gzip the stream
    pub fn new(compression: bool) -> Self {
        let compression = compression.then(Compression::default);
        Self {
            sink: Sink::new(compression),
            compression,
            total_written: 0,
        }
    }

    /// Append bytes to the current frame
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.sink {
            Sink::Plain(bytes) => bytes.extend_from_slice(data),
            Sink::Gzip(encoder) => encoder.write_all(data)?,
        }
        self.total_written += data.len() as u64;
        Ok(())
    }

    /// Bytes currently buffered (post-compression)
    pub fn size(&self) -> usize {
        match &self.sink {
            Sink::Plain(bytes) => bytes.len(),
            Sink::Gzip(encoder) => encoder.get_ref().len(),
        }
    }

    /// Uncompressed bytes written over the buffer's lifetime
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    pub fn is_compressed(&self) -> bool {
        self.compression.is_some()
    }

    /// Finish the current frame, return its bytes and start an empty one
    ///
    /// With compression each extracted segment is a complete gzip member.
    pub fn extract_and_reset(&mut self) -> Result<Vec<u8>> {
        let sink = std::mem::replace(&mut self.sink, Sink::new(self.compression));
        sink.finish()
    }

    /// Finish the final frame and release the sink
    pub fn extract_and_close(self) -> Result<Vec<u8>> {
        self.sink.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::{GzDecoder, MultiGzDecoder};
    use std::io::Read;

    fn gunzip_all(bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        MultiGzDecoder::new(bytes).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_plain_buffer() {
        let mut buffer = StreamingBuffer::new(false);
        buffer.write(b"hello ").unwrap();
        buffer.write(b"world").unwrap();
        assert_eq!(buffer.size(), 11);
        assert_eq!(buffer.extract_and_close().unwrap(), b"hello world");
    }

    #[test]
    fn test_reset_starts_empty() {
        let mut buffer = StreamingBuffer::new(false);
        buffer.write(b"part one").unwrap();
        assert_eq!(buffer.extract_and_reset().unwrap(), b"part one");
        assert_eq!(buffer.size(), 0);
        buffer.write(b"part two").unwrap();
        assert_eq!(buffer.extract_and_close().unwrap(), b"part two");
    }

    #[test]
    fn test_gzip_buffer_round_trip() {
        let mut buffer = StreamingBuffer::new(true);
        assert!(buffer.is_compressed());
        buffer.write(br#"{"x":["#).unwrap();
        buffer.write(br#"{"a":1}"#).unwrap();
        buffer.write(b"]}").unwrap();
        assert_eq!(buffer.total_written(), 15);

        let compressed = buffer.extract_and_close().unwrap();
        let mut decoded = String::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, r#"{"x":[{"a":1}]}"#);
    }

    #[test]
    fn test_gzip_reset_produces_independent_members() {
        let mut buffer = StreamingBuffer::new(true);
        buffer.write(b"first,").unwrap();
        let first = buffer.extract_and_reset().unwrap();
        assert_eq!(buffer.size(), 0);
        buffer.write(b"second").unwrap();
        let second = buffer.extract_and_close().unwrap();

        assert_eq!(gunzip_all(&first), b"first,");
        assert_eq!(gunzip_all(&second), b"second");

        let mut joined = first.clone();
        joined.extend_from_slice(&second);
        assert_eq!(gunzip_all(&joined), b"first,second");
    }

    #[test]
    fn test_gzip_size_tracks_compressed_bytes() {
        let mut buffer = StreamingBuffer::new(true);
        let payload = vec![b'a'; 1024 * 1024];
        buffer.write(&payload).unwrap();
        let compressed = buffer.extract_and_close().unwrap();
        assert!(compressed.len() < payload.len() / 100);
    }
}
