// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A seekable byte stream backed either by a file or by memory.

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

/// A readable, seekable source with a known size.
///
/// Texture uploads read texel rows from it one at a time, so a file-backed
/// stream never needs the whole image in memory.
#[derive(Debug)]
pub enum FileStream {
    /// Buffered reads from an open file.
    File {
        /// The buffered file handle.
        reader: BufReader<File>,
        /// Size of the file when it was opened.
        size: u64,
    },
    /// Reads from an owned byte buffer.
    Memory(Cursor<Vec<u8>>),
}

impl FileStream {
    /// Opens `path` for reading.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path.as_ref())?;
        let size = file.metadata()?.len();
        Ok(FileStream::File {
            reader: BufReader::new(file),
            size,
        })
    }

    /// Wraps an in-memory buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        FileStream::Memory(Cursor::new(bytes))
    }

    /// Total size of the stream in bytes.
    pub fn size(&self) -> u64 {
        match self {
            FileStream::File { size, .. } => *size,
            FileStream::Memory(cursor) => cursor.get_ref().len() as u64,
        }
    }

    /// Current read position.
    pub fn position(&mut self) -> io::Result<u64> {
        self.stream_position()
    }

    /// Bytes left between the read position and the end.
    pub fn remaining(&mut self) -> io::Result<u64> {
        let pos = self.position()?;
        Ok(self.size().saturating_sub(pos))
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32_le(&mut self) -> io::Result<u32> {
        let mut bytes = [0u8; 4];
        self.read_exact(&mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Advances the read position by `count` bytes.
    pub fn skip(&mut self, count: u64) -> io::Result<()> {
        let offset = i64::try_from(count)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "skip too large"))?;
        self.seek(SeekFrom::Current(offset))?;
        Ok(())
    }
}

impl Read for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileStream::File { reader, .. } => reader.read(buf),
            FileStream::Memory(cursor) => cursor.read(buf),
        }
    }
}

impl Seek for FileStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            FileStream::File { reader, .. } => reader.seek(pos),
            FileStream::Memory(cursor) => cursor.seek(pos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_stream_tracks_position() {
        let mut stream = FileStream::from_bytes(vec![1, 0, 0, 0, 9, 9, 7]);
        assert_eq!(stream.size(), 7);
        assert_eq!(stream.read_u32_le().unwrap(), 1);
        stream.skip(2).unwrap();
        assert_eq!(stream.remaining().unwrap(), 1);
        let mut last = [0u8; 1];
        stream.read_exact(&mut last).unwrap();
        assert_eq!(last[0], 7);
        assert!(stream.read_u32_le().is_err());
    }

    #[test]
    fn test_file_stream_reports_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, [5u8; 32]).unwrap();
        let mut stream = FileStream::open(&path).unwrap();
        assert_eq!(stream.size(), 32);
        stream.skip(30).unwrap();
        assert_eq!(stream.remaining().unwrap(), 2);
    }
}
