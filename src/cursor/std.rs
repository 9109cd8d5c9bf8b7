// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

use std::io;

use super::ChunkSource;

/// [`ChunkSource`] implementation for `std::io` readers, handing out whatever
/// each `read()` call produces, up to a fixed chunk size.
pub struct ReadChunks<R: io::Read> {
    reader: R,
    chunk_size: usize,
}

impl<R: io::Read> ReadChunks<R> {
    /// The chunk size used by [`ReadChunks::new`].
    pub const DEFAULT_CHUNK_SIZE: usize = 0x2000; // 8 KiB

    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, Self::DEFAULT_CHUNK_SIZE)
    }

    /// A zero `chunk_size` is treated as one.
    pub fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: io::Read> ChunkSource for ReadChunks<R> {
    type Chunk = Vec<u8>;
    type Error = io::Error;

    fn next_chunk(&mut self) -> Result<Option<Self::Chunk>, Self::Error> {
        let mut chunk = vec![0u8; self.chunk_size];
        loop {
            match self.reader.read(&mut chunk) {
                Ok(0) => return Ok(None),
                Ok(len) => {
                    chunk.truncate(len);
                    return Ok(Some(chunk));
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::cursor::{Cursor, StreamCursor};
    use crate::decode::Error;

    #[test]
    fn test_read_chunks() {
        let bytes: &[u8] = &[0x01, 0x02, 0x03, 0x04, 0x05];
        let mut stream = StreamCursor::new(ReadChunks::with_chunk_size(bytes, 2));
        let mut buf = [0u8; 3];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0x01, 0x02, 0x03]);
        stream.skip(2).unwrap();
        assert!(matches!(stream.read_byte_or_end(), Ok(None)));
        assert!(matches!(stream.read_byte(), Err(Error::UnexpectedEndOfInput)));
    }

    struct Broken;

    impl io::Read for Broken {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("connection reset"))
        }
    }

    #[test]
    fn test_read_chunks_transport_error() {
        let mut stream = StreamCursor::new(ReadChunks::new(Broken));
        assert!(matches!(stream.read_byte(), Err(Error::Source(_))));
    }
}
