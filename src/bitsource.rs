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

//! Bit-granular reader over an [`Input`].

use std::fmt;

use crate::bitsink::FRAME_CRC;
use crate::constant::decoder::READ_CHUNK_SIZE;
use crate::io::Input;
use crate::io::ReadStatus;

/// Reasons why a read from [`BitSource`] could not be completed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ReadFault {
    /// The input ended before the requested bits were available.
    EndOfStream,
    /// The input requested to abort.
    Aborted,
}

impl fmt::Display for ReadFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfStream => write!(f, "unexpected end of stream"),
            Self::Aborted => write!(f, "input aborted"),
        }
    }
}

impl std::error::Error for ReadFault {}

/// Sentinel returned by the UTF-8-like decoders on an invalid byte sequence.
pub const UTF8_INVALID_U32: u32 = u32::MAX;

/// Sentinel returned by the UTF-8-like decoders on an invalid byte sequence.
pub const UTF8_INVALID_U64: u64 = u64::MAX;

/// Bit reader that pulls bytes from an [`Input`] on demand.
///
/// Bits are consumed MSB-first. A running CRC-16 can be armed at a byte
/// boundary with [`BitSource::reset_crc16`]; every byte consumed after that
/// point is fed to the checksum.
pub struct BitSource<I> {
    input: I,
    buf: Vec<u8>,
    head: usize,
    bit: usize,
    crc16: Option<crc::Digest<'static, u16>>,
    crc_from: usize,
}

impl<I: Input> BitSource<I> {
    /// Creates a reader with an empty buffer.
    pub fn new(input: I) -> Self {
        Self {
            input,
            buf: Vec::with_capacity(READ_CHUNK_SIZE),
            head: 0,
            bit: 0,
            crc16: None,
            crc_from: 0,
        }
    }

    /// Returns a mutable reference to the underlying input.
    pub fn input_mut(&mut self) -> &mut I {
        &mut self.input
    }

    /// Unwraps the underlying input.
    pub fn into_inner(self) -> I {
        self.input
    }

    /// Drops all buffered bytes, e.g. after the input was repositioned.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.head = 0;
        self.bit = 0;
        self.crc16 = None;
        self.crc_from = 0;
    }

    /// Number of whole bytes buffered but not yet consumed.
    pub fn unconsumed_bytes(&self) -> usize {
        self.buf.len() - self.head
    }

    /// Returns `true` if the read head is on a byte boundary.
    pub const fn is_byte_aligned(&self) -> bool {
        self.bit == 0
    }

    /// Returns the number of unread bits in the current byte.
    pub const fn bits_left_for_byte_alignment(&self) -> usize {
        if self.bit == 0 {
            0
        } else {
            8 - self.bit
        }
    }

    /// Starts a fresh CRC-16 at the current (byte-aligned) position.
    pub fn reset_crc16(&mut self) {
        debug_assert!(self.is_byte_aligned());
        self.crc16 = Some(FRAME_CRC.digest());
        self.crc_from = self.head;
    }

    /// Feeds bytes that were consumed before the CRC was armed.
    pub fn update_crc16(&mut self, bytes: &[u8]) {
        if let Some(digest) = self.crc16.as_mut() {
            digest.update(bytes);
        }
    }

    /// Finalizes and disarms the running CRC-16.
    ///
    /// Returns zero if the CRC was not armed.
    pub fn take_crc16(&mut self) -> u16 {
        debug_assert!(self.is_byte_aligned());
        self.feed_crc();
        self.crc16.take().map_or(0, |d| d.finalize())
    }

    fn feed_crc(&mut self) {
        if let Some(digest) = self.crc16.as_mut() {
            digest.update(&self.buf[self.crc_from..self.head]);
        }
        self.crc_from = self.head;
    }

    /// Refills the buffer when all buffered bytes are consumed.
    fn fill(&mut self) -> Result<(), ReadFault> {
        debug_assert!(self.head >= self.buf.len());
        self.feed_crc();
        self.buf.clear();
        self.head = 0;
        self.crc_from = 0;
        if self.input.eof() {
            return Err(ReadFault::EndOfStream);
        }
        self.buf.resize(READ_CHUNK_SIZE, 0u8);
        match self.input.read(&mut self.buf) {
            ReadStatus::Continue(n) if n > 0 => {
                self.buf.truncate(n);
                Ok(())
            }
            ReadStatus::Continue(_) | ReadStatus::EndOfStream => {
                self.buf.clear();
                Err(ReadFault::EndOfStream)
            }
            ReadStatus::Abort => {
                self.buf.clear();
                Err(ReadFault::Aborted)
            }
        }
    }

    /// Reads an unsigned integer from the next `bits` bits (at most 64).
    ///
    /// # Errors
    ///
    /// Returns an error if the input ended or aborted.
    pub fn read_bits(&mut self, bits: usize) -> Result<u64, ReadFault> {
        debug_assert!(bits <= 64);
        let mut ret = 0u64;
        let mut remaining = bits;
        while remaining > 0 {
            if self.head >= self.buf.len() {
                self.fill()?;
            }
            let avail = 8 - self.bit;
            let take = std::cmp::min(avail, remaining);
            let byte = u32::from(self.buf[self.head]);
            let chunk = (byte >> (avail - take)) & ((1u32 << take) - 1);
            ret = (ret << take) | u64::from(chunk);
            self.bit += take;
            remaining -= take;
            if self.bit == 8 {
                self.bit = 0;
                self.head += 1;
            }
        }
        Ok(ret)
    }

    /// Reads an unsigned integer of at most 32 bits.
    ///
    /// # Errors
    ///
    /// Returns an error if the input ended or aborted.
    #[inline]
    pub fn read_u32(&mut self, bits: usize) -> Result<u32, ReadFault> {
        debug_assert!(bits <= 32);
        Ok(self.read_bits(bits)? as u32)
    }

    /// Reads a two's complement integer of at most 32 bits.
    ///
    /// # Errors
    ///
    /// Returns an error if the input ended or aborted.
    #[inline]
    pub fn read_signed(&mut self, bits: usize) -> Result<i32, ReadFault> {
        debug_assert!(bits <= 32);
        if bits == 0 {
            return Ok(0);
        }
        let v = self.read_bits(bits)?;
        Ok((((v << (64 - bits)) as i64) >> (64 - bits)) as i32)
    }

    /// Counts zeros up to (and consumes) the next one bit.
    ///
    /// # Errors
    ///
    /// Returns an error if the input ended or aborted.
    pub fn read_unary(&mut self) -> Result<u32, ReadFault> {
        let mut count = 0u32;
        loop {
            if self.head >= self.buf.len() {
                self.fill()?;
            }
            let byte = self.buf[self.head] << self.bit;
            if byte == 0 {
                count += (8 - self.bit) as u32;
                self.bit = 0;
                self.head += 1;
                continue;
            }
            let lz = byte.leading_zeros() as usize;
            count += lz as u32;
            self.bit += lz + 1;
            if self.bit == 8 {
                self.bit = 0;
                self.head += 1;
            }
            return Ok(count);
        }
    }

    /// Reads a single zig-zag folded Rice code with parameter `k`.
    ///
    /// # Errors
    ///
    /// Returns an error if the input ended or aborted.
    #[inline]
    pub fn read_rice_signed(&mut self, k: usize) -> Result<i32, ReadFault> {
        let q = self.read_unary()?;
        let r = self.read_u32(k)?;
        let folded = q.wrapping_shl(k as u32) | r;
        Ok(crate::rice::decode_signbit(folded))
    }

    /// Fills `dest` with Rice codes sharing the parameter `k`.
    ///
    /// # Errors
    ///
    /// Returns an error if the input ended or aborted.
    pub fn read_rice_signed_block(&mut self, dest: &mut [i32], k: usize) -> Result<(), ReadFault> {
        for v in dest {
            *v = self.read_rice_signed(k)?;
        }
        Ok(())
    }

    /// Skips the remaining bits of the current byte.
    pub fn align_to_byte(&mut self) {
        if self.bit != 0 {
            self.bit = 0;
            self.head += 1;
        }
    }

    /// Copies whole bytes into `dest`, starting from a byte boundary.
    ///
    /// # Errors
    ///
    /// Returns an error if the input ended or aborted.
    pub fn read_bytes_aligned(&mut self, dest: &mut [u8]) -> Result<(), ReadFault> {
        debug_assert!(self.is_byte_aligned());
        let mut written = 0;
        while written < dest.len() {
            if self.head >= self.buf.len() {
                self.fill()?;
            }
            let n = std::cmp::min(dest.len() - written, self.buf.len() - self.head);
            dest[written..written + n].copy_from_slice(&self.buf[self.head..self.head + n]);
            written += n;
            self.head += n;
        }
        Ok(())
    }

    /// Utility function that calls `read_bytes_aligned` and returns results in `Vec`.
    ///
    /// # Errors
    ///
    /// Returns an error if the input ended or aborted.
    pub fn read_bytevec_aligned(&mut self, bytes: usize) -> Result<Vec<u8>, ReadFault> {
        let mut ret = vec![0u8; bytes];
        self.read_bytes_aligned(&mut ret)?;
        Ok(ret)
    }

    /// Skips `bytes` whole bytes from a byte boundary.
    ///
    /// # Errors
    ///
    /// Returns an error if the input ended or aborted.
    pub fn skip_bytes_aligned(&mut self, bytes: usize) -> Result<(), ReadFault> {
        debug_assert!(self.is_byte_aligned());
        let mut remaining = bytes;
        while remaining > 0 {
            if self.head >= self.buf.len() {
                self.fill()?;
            }
            let n = std::cmp::min(remaining, self.buf.len() - self.head);
            self.head += n;
            remaining -= n;
        }
        Ok(())
    }

    /// Reads a UTF-8-like coded number of at most 31 bits.
    ///
    /// Every consumed byte is appended to `raw`. An invalid sequence yields
    /// [`UTF8_INVALID_U32`].
    ///
    /// # Errors
    ///
    /// Returns an error if the input ended or aborted.
    pub fn read_utf8_u32(&mut self, raw: &mut Vec<u8>) -> Result<u32, ReadFault> {
        let v = self.read_utf8_impl(raw, 5)?;
        Ok(if v == UTF8_INVALID_U64 {
            UTF8_INVALID_U32
        } else {
            v as u32
        })
    }

    /// Reads a UTF-8-like coded number of at most 36 bits.
    ///
    /// Every consumed byte is appended to `raw`. An invalid sequence yields
    /// [`UTF8_INVALID_U64`].
    ///
    /// # Errors
    ///
    /// Returns an error if the input ended or aborted.
    pub fn read_utf8_u64(&mut self, raw: &mut Vec<u8>) -> Result<u64, ReadFault> {
        self.read_utf8_impl(raw, 6)
    }

    fn read_utf8_impl(&mut self, raw: &mut Vec<u8>, max_tails: usize) -> Result<u64, ReadFault> {
        let x = self.read_bits(8)? as u8;
        raw.push(x);
        let (mut acc, tails) = if x & 0x80 == 0 {
            (u64::from(x), 0)
        } else if x & 0xE0 == 0xC0 {
            (u64::from(x & 0x1F), 1)
        } else if x & 0xF0 == 0xE0 {
            (u64::from(x & 0x0F), 2)
        } else if x & 0xF8 == 0xF0 {
            (u64::from(x & 0x07), 3)
        } else if x & 0xFC == 0xF8 {
            (u64::from(x & 0x03), 4)
        } else if x & 0xFE == 0xFC {
            (u64::from(x & 0x01), 5)
        } else if x == 0xFE {
            (0, 6)
        } else {
            return Ok(UTF8_INVALID_U64);
        };
        if tails > max_tails {
            return Ok(UTF8_INVALID_U64);
        }
        for _i in 0..tails {
            let b = self.read_bits(8)? as u8;
            raw.push(b);
            if b & 0xC0 != 0x80 {
                return Ok(UTF8_INVALID_U64);
            }
            acc = (acc << 6) | u64::from(b & 0x3F);
        }
        Ok(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitsink::BitSink;
    use crate::bitsink::ByteSink;
    use crate::component::encode_to_utf8like;
    use crate::io::SeekableIo;

    use std::io::Cursor;

    fn source(bytes: Vec<u8>) -> BitSource<SeekableIo<Cursor<Vec<u8>>>> {
        BitSource::new(SeekableIo::new(Cursor::new(bytes)))
    }

    #[test]
    fn read_fields_across_bytes() -> Result<(), ReadFault> {
        let mut src = source(vec![0b1011_0011, 0b0101_1111, 0xFF]);
        assert_eq!(src.read_bits(3)?, 0b101);
        assert_eq!(src.read_signed(7)?, -51); // 1_001101 => -64 + 13
        assert_eq!(src.read_bits(6)?, 0b01_1111);
        assert!(src.is_byte_aligned());
        assert_eq!(src.read_bits(8)?, 0xFF);
        assert_eq!(src.read_bits(1), Err(ReadFault::EndOfStream));
        Ok(())
    }

    #[test]
    fn unary_spanning_zero_bytes() -> Result<(), ReadFault> {
        let mut src = source(vec![0b0000_0000, 0b0000_0000, 0b0010_0000]);
        assert_eq!(src.read_unary()?, 18);
        assert_eq!(src.bits_left_for_byte_alignment(), 5);
        Ok(())
    }

    #[test]
    fn rice_codes_match_writer() -> Result<(), ReadFault> {
        let values = [0, -1, 1, 17, -300, 5, 0, i32::from(i16::MIN)];
        let mut sink = ByteSink::new();
        for v in &values {
            sink.write_rice(*v, 3).unwrap();
        }
        sink.align_to_byte().unwrap();
        let mut src = source(sink.into_inner());
        let mut decoded = [0i32; 8];
        src.read_rice_signed_block(&mut decoded, 3)?;
        assert_eq!(decoded, values);
        Ok(())
    }

    #[test]
    fn utf8_numbers_and_sentinel() -> Result<(), ReadFault> {
        let mut bytes = vec![];
        for v in [0x56u64, 0x1234, 0xF_FFFF_FFFF] {
            bytes.extend_from_slice(&encode_to_utf8like(v).unwrap());
        }
        bytes.push(0xFF);
        let mut src = source(bytes);
        let mut raw = vec![];
        assert_eq!(src.read_utf8_u32(&mut raw)?, 0x56);
        assert_eq!(src.read_utf8_u32(&mut raw)?, 0x1234);
        assert_eq!(raw.len(), 1 + 3);
        assert_eq!(src.read_utf8_u64(&mut raw)?, 0xF_FFFF_FFFF);
        assert_eq!(src.read_utf8_u64(&mut raw)?, UTF8_INVALID_U64);
        Ok(())
    }

    #[test]
    fn crc16_over_consumed_bytes() -> Result<(), ReadFault> {
        let mut src = source(b"X3456789".to_vec());
        src.read_bits(8)?;
        src.reset_crc16();
        src.update_crc16(b"12");
        src.read_bits(4)?;
        src.read_bits(4)?;
        src.skip_bytes_aligned(6)?;
        assert_eq!(src.unconsumed_bytes(), 0);
        assert_eq!(src.take_crc16(), 0xFEE8);
        Ok(())
    }
}
