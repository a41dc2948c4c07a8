// Copyright 2022 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! I/O capabilities consumed by the codec.
//!
//! The decoder reads through an [`Input`] and the encoder writes through an
//! [`Output`]. Both traits report outcomes as plain status values so that
//! the codec can map them into its own state machines. Seeking is optional;
//! the default implementations report [`IoFault::Unsupported`].

use std::fmt;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;

/// Outcome of an [`Input::read`] call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReadStatus {
    /// The given number of bytes were stored to the head of the buffer.
    Continue(usize),
    /// No more bytes will come.
    EndOfStream,
    /// The client requested to stop decoding.
    Abort,
}

/// Failure of an optional capability.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum IoFault {
    /// The backend does not support the operation.
    Unsupported,
    /// The backend supports the operation but it failed.
    Error,
}

impl fmt::Display for IoFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported => write!(f, "operation is not supported by the backend"),
            Self::Error => write!(f, "backend I/O error"),
        }
    }
}

impl std::error::Error for IoFault {}

/// Byte source consumed by [`StreamDecoder`].
///
/// [`StreamDecoder`]: crate::decoder::StreamDecoder
pub trait Input {
    /// Reads up to `buf.len()` bytes.
    fn read(&mut self, buf: &mut [u8]) -> ReadStatus;

    /// Moves the read head to an absolute byte offset.
    ///
    /// # Errors
    ///
    /// Returns [`IoFault::Unsupported`] if the source is not seekable.
    fn seek(&mut self, _offset: u64) -> Result<(), IoFault> {
        Err(IoFault::Unsupported)
    }

    /// Returns the absolute byte offset of the read head.
    ///
    /// # Errors
    ///
    /// Returns [`IoFault::Unsupported`] if the source is not seekable.
    fn tell(&mut self) -> Result<u64, IoFault> {
        Err(IoFault::Unsupported)
    }

    /// Returns the total length of the source in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`IoFault::Unsupported`] if the length is unknown.
    fn length(&mut self) -> Result<u64, IoFault> {
        Err(IoFault::Unsupported)
    }

    /// Returns `true` if the read head is at the end of the source.
    fn eof(&mut self) -> bool {
        false
    }
}

/// Byte sink consumed by [`StreamEncoder`].
///
/// [`StreamEncoder`]: crate::encoder::StreamEncoder
pub trait Output {
    /// Writes all bytes in `buf`.
    ///
    /// # Errors
    ///
    /// Any error is fatal for the encoder.
    fn write(&mut self, buf: &[u8]) -> Result<(), IoFault>;

    /// Moves the write head to an absolute byte offset.
    ///
    /// # Errors
    ///
    /// Returns [`IoFault::Unsupported`] if the sink is not seekable.
    fn seek(&mut self, _offset: u64) -> Result<(), IoFault> {
        Err(IoFault::Unsupported)
    }

    /// Returns the absolute byte offset of the write head.
    ///
    /// # Errors
    ///
    /// Returns [`IoFault::Unsupported`] if the sink is not seekable.
    fn tell(&mut self) -> Result<u64, IoFault> {
        Err(IoFault::Unsupported)
    }
}

/// Seekable adapter over [`std::io`] handles such as [`std::fs::File`] or
/// [`std::io::Cursor`].
#[derive(Debug)]
pub struct SeekableIo<T> {
    inner: T,
    at_eof: bool,
}

impl<T> SeekableIo<T> {
    /// Wraps a handle.
    pub const fn new(inner: T) -> Self {
        Self {
            inner,
            at_eof: false,
        }
    }

    /// Returns a reference to the wrapped handle.
    pub const fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Unwraps the handle.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl SeekableIo<std::fs::File> {
    /// Opens a file for decoding.
    ///
    /// # Errors
    ///
    /// Propagates the error from [`std::fs::File::open`].
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> std::io::Result<Self> {
        Ok(Self::new(std::fs::File::open(path)?))
    }

    /// Creates (or truncates) a file for encoding.
    ///
    /// # Errors
    ///
    /// Propagates the error from [`std::fs::File::create`].
    pub fn create<P: AsRef<std::path::Path>>(path: P) -> std::io::Result<Self> {
        Ok(Self::new(std::fs::File::create(path)?))
    }
}

fn read_into<R: Read>(reader: &mut R, buf: &mut [u8], at_eof: &mut bool) -> ReadStatus {
    loop {
        match reader.read(buf) {
            Ok(0) if !buf.is_empty() => {
                *at_eof = true;
                return ReadStatus::EndOfStream;
            }
            Ok(n) => return ReadStatus::Continue(n),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!(target: "flacodec::io", "read failed: {e}");
                return ReadStatus::Abort;
            }
        }
    }
}

impl<T: Read + Seek> Input for SeekableIo<T> {
    fn read(&mut self, buf: &mut [u8]) -> ReadStatus {
        read_into(&mut self.inner, buf, &mut self.at_eof)
    }

    fn seek(&mut self, offset: u64) -> Result<(), IoFault> {
        self.at_eof = false;
        self.inner
            .seek(SeekFrom::Start(offset))
            .map(|_| ())
            .map_err(|_| IoFault::Error)
    }

    fn tell(&mut self) -> Result<u64, IoFault> {
        self.inner.stream_position().map_err(|_| IoFault::Error)
    }

    fn length(&mut self) -> Result<u64, IoFault> {
        let pos = Input::tell(self)?;
        let len = self
            .inner
            .seek(SeekFrom::End(0))
            .map_err(|_| IoFault::Error)?;
        self.inner
            .seek(SeekFrom::Start(pos))
            .map_err(|_| IoFault::Error)?;
        Ok(len)
    }

    fn eof(&mut self) -> bool {
        self.at_eof
    }
}

impl<T: Write + Seek> Output for SeekableIo<T> {
    fn write(&mut self, buf: &[u8]) -> Result<(), IoFault> {
        self.inner.write_all(buf).map_err(|_| IoFault::Error)
    }

    fn seek(&mut self, offset: u64) -> Result<(), IoFault> {
        self.inner
            .seek(SeekFrom::Start(offset))
            .map(|_| ())
            .map_err(|_| IoFault::Error)
    }

    fn tell(&mut self) -> Result<u64, IoFault> {
        self.inner.stream_position().map_err(|_| IoFault::Error)
    }
}

/// Non-seekable adapter over [`std::io::Read`] or [`std::io::Write`]
/// handles such as pipes or sockets.
#[derive(Debug)]
pub struct StreamIo<T> {
    inner: T,
    at_eof: bool,
}

impl<T> StreamIo<T> {
    /// Wraps a handle.
    pub const fn new(inner: T) -> Self {
        Self {
            inner,
            at_eof: false,
        }
    }

    /// Unwraps the handle.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read> Input for StreamIo<T> {
    fn read(&mut self, buf: &mut [u8]) -> ReadStatus {
        read_into(&mut self.inner, buf, &mut self.at_eof)
    }

    fn eof(&mut self) -> bool {
        self.at_eof
    }
}

impl<T: Write> Output for StreamIo<T> {
    fn write(&mut self, buf: &[u8]) -> Result<(), IoFault> {
        self.inner.write_all(buf).map_err(|_| IoFault::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn cursor_input_reports_eof() {
        let mut input = SeekableIo::new(Cursor::new(vec![1u8, 2, 3]));
        let mut buf = [0u8; 2];
        assert_eq!(input.read(&mut buf), ReadStatus::Continue(2));
        assert_eq!(input.read(&mut buf), ReadStatus::Continue(1));
        assert!(!input.eof());
        assert_eq!(input.read(&mut buf), ReadStatus::EndOfStream);
        assert!(input.eof());
        assert_eq!(input.length(), Ok(3));
        Input::seek(&mut input, 1).unwrap();
        assert!(!input.eof());
        assert_eq!(Input::tell(&mut input), Ok(1));
    }

    #[test]
    fn stream_output_cannot_seek() {
        let mut out = StreamIo::new(Vec::<u8>::new());
        out.write(&[0xAB]).unwrap();
        assert_eq!(Output::seek(&mut out, 0), Err(IoFault::Unsupported));
        assert_eq!(Output::tell(&mut out), Err(IoFault::Unsupported));
        assert_eq!(out.into_inner(), vec![0xAB]);
    }

    #[test]
    fn file_roundtrip_through_adapters() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        {
            let mut out = SeekableIo::create(tmp.path()).unwrap();
            out.write(b"0123456789").unwrap();
            Output::seek(&mut out, 2).unwrap();
            out.write(b"ab").unwrap();
        }
        let mut input = SeekableIo::open(tmp.path()).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(input.read(&mut buf), ReadStatus::Continue(10));
        assert_eq!(&buf[..10], b"01ab456789");
    }
}
