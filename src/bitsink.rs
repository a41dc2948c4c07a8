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

//! Abstract interface for bit-based output.

use std::convert::Infallible;

/// CRC-8 used in FLAC frame headers (polynomial 0x07, zero init).
pub static HEADER_CRC: crc::Crc<u8> = crc::Crc::<u8>::new(&crc::CRC_8_SMBUS);

/// CRC-16 used in FLAC frame footers (polynomial 0x8005, zero init).
pub static FRAME_CRC: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_UMTS);

/// Trait for the bit-addressible unsigned integers.
///
/// This trait is sealed so a user cannot implement it. Currently, this trait
/// covers: [`u8`], [`u16`], [`u32`], and [`u64`].
pub trait Bits: seal_bits::Sealed + Copy + Into<u64> {
    /// The number of bits in the type.
    const BITS: usize;
}

impl Bits for u8 {
    const BITS: usize = 8;
}
impl Bits for u16 {
    const BITS: usize = 16;
}
impl Bits for u32 {
    const BITS: usize = 32;
}
impl Bits for u64 {
    const BITS: usize = 64;
}

/// Trait for the signed integers that can be provided to bitsink.
///
/// This trait is sealed so a user cannot implement it. Currently, this trait
/// covers: [`i8`], [`i16`], [`i32`], and [`i64`].
pub trait SignedBits: seal_signed_bits::Sealed + Copy + Into<i64> {}

impl<T: seal_signed_bits::Sealed + Copy + Into<i64>> SignedBits for T {}

/// Storage-agnostic interface trait for bit-based output.
///
/// The encoder repeatedly generates arrays of code bits that are typically
/// smaller than a byte (8 bits).  Type implementing `BitSink` is used to
/// arrange those bits typically in bytes, and transfer them to the backend
/// storage. [`ByteSink`] is a standard implementation of `BitSink` that stores
/// code bits to a `Vec` of [`u8`]s.
pub trait BitSink: Sized {
    /// Error type that may happen while writing bits to `BitSink`.
    type Error: std::error::Error;

    /// Puts zeros to `BitSink` until the length aligns to the byte boundaries.
    ///
    /// # Returns
    ///
    /// The number of zeros put.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use flacodec::bitsink::{ByteSink, BitSink};
    /// let mut sink = ByteSink::new();
    ///
    /// sink.write_lsbs(0xFFu8, 3)?;
    /// assert_eq!(sink.len(), 3);
    ///
    /// let pads = sink.align_to_byte()?;
    /// assert_eq!(pads, 5);
    /// assert_eq!(sink.len(), 8);
    /// # Ok(())}
    /// ```
    fn align_to_byte(&mut self) -> Result<usize, Self::Error>;

    /// Writes bytes after alignment, and returns padded bits.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// # use flacodec::bitsink::{ByteSink, BitSink};
    /// let mut sink = ByteSink::new();
    ///
    /// sink.write_lsbs(0xFFu8, 3)?;
    /// sink.write_bytes_aligned(&[0xB7, 0x7D])?;
    ///
    /// assert_eq!(sink.to_bitstring(), "11100000_10110111_01111101");
    /// # Ok(())}
    /// ```
    #[inline]
    fn write_bytes_aligned(&mut self, bytes: &[u8]) -> Result<usize, Self::Error> {
        let ret = self.align_to_byte()?;
        for b in bytes {
            self.write(*b)?;
        }
        Ok(ret)
    }

    /// Writes `n` LSBs to the sink.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use flacodec::bitsink::{ByteSink, BitSink};
    ///
    /// let mut sink = ByteSink::new();
    /// sink.write_lsbs(0x0Fu8, 3)?;
    ///
    /// assert_eq!(sink.len(), 3);
    /// assert_eq!(sink.to_bitstring(), "111*****");
    /// # Ok(())}
    /// ```
    fn write_lsbs<T: Bits>(&mut self, val: T, n: usize) -> Result<(), Self::Error>;

    /// Writes `n` MSBs to the sink.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use flacodec::bitsink::{ByteSink, BitSink};
    ///
    /// let mut sink = ByteSink::new();
    /// sink.write_msbs(0xF0u8, 3)?;
    ///
    /// assert_eq!(sink.to_bitstring(), "111*****");
    /// # Ok(())}
    /// ```
    fn write_msbs<T: Bits>(&mut self, val: T, n: usize) -> Result<(), Self::Error>;

    /// Writes all bits in `val: Bits`.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    #[inline]
    fn write<T: Bits>(&mut self, val: T) -> Result<(), Self::Error> {
        self.write_msbs(val, T::BITS)
    }

    /// Writes `val` in two's coplement format.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use flacodec::bitsink::{ByteSink, BitSink};
    ///
    /// let mut sink = ByteSink::new();
    /// sink.write_msbs(0xF0u8, 3)?;
    ///
    /// // two's complement of 00011 in 11101
    /// sink.write_twoc(-3i32, 5)?;
    /// assert_eq!(sink.to_bitstring(), "11111101");
    /// # Ok(())}
    /// ```
    #[inline]
    fn write_twoc<T: SignedBits>(
        &mut self,
        val: T,
        bits_per_sample: usize,
    ) -> Result<(), Self::Error> {
        if bits_per_sample == 0 {
            return Ok(());
        }
        let val: i64 = val.into();
        let shifted = (val << (64 - bits_per_sample)) as u64;
        self.write_msbs(shifted, bits_per_sample)
    }

    /// Writes `n`-bits of zeros.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    #[inline]
    fn write_zeros(&mut self, n: usize) -> Result<(), Self::Error> {
        let mut n = n;
        while n > 64 {
            self.write(0u64)?;
            n -= 64;
        }
        self.write_msbs(0u64, n)?;
        Ok(())
    }

    /// Writes a zig-zag folded Rice code of `val` with parameter `k`.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use flacodec::bitsink::{ByteSink, BitSink};
    ///
    /// let mut sink = ByteSink::new();
    /// // -3 folds into 5 = 0b101; quotient 1 (one zero then the stop bit),
    /// // and two remainder bits "01".
    /// sink.write_rice(-3, 2)?;
    /// assert_eq!(sink.to_bitstring(), "0101****");
    /// # Ok(())}
    /// ```
    #[inline]
    fn write_rice(&mut self, val: i32, k: usize) -> Result<(), Self::Error> {
        let folded = u64::from(crate::rice::encode_signbit(val));
        self.write_zeros((folded >> k) as usize)?;
        let low_mask = (1u64 << k) - 1;
        self.write_lsbs((1u64 << k) | (folded & low_mask), k + 1)
    }
}

/// `BitSink` implementation based on [`Vec`] of [`u8`]s.
///
/// Since this type store code bits in [`u8`]s, the internal buffer can directly
/// be handed to an [`Output`].
///
/// [`Output`]: crate::io::Output
#[derive(Clone, Debug, Default)]
pub struct ByteSink {
    bytes: Vec<u8>,
    bitlength: usize,
}

impl ByteSink {
    /// Creates new `ByteSink` instance with the default capacity.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::bitsink::*;
    /// let sink = ByteSink::new();
    /// let empty: [u8; 0] = [];
    /// assert_eq!(&empty, sink.as_slice());
    /// ```
    pub const fn new() -> Self {
        Self {
            bytes: vec![],
            bitlength: 0usize,
        }
    }

    /// Creates new `ByteSink` instance with the specified capacity (in bits).
    pub fn with_capacity(capacity_in_bits: usize) -> Self {
        Self {
            bytes: Vec::with_capacity((capacity_in_bits >> 3) + 1),
            bitlength: 0usize,
        }
    }

    /// Clears the vector, removing all values.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::bitsink::*;
    /// let mut sink = ByteSink::new();
    /// sink.write_lsbs(0xAAAAAAAAu32, 14);
    /// assert_eq!(sink.to_bitstring(), "10101010_101010**");
    /// sink.clear();
    /// assert_eq!(sink.to_bitstring(), "");
    /// ```
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.bitlength = 0;
    }

    /// Returns the number of bits stored in the buffer.
    pub const fn len(&self) -> usize {
        self.bitlength
    }

    /// Checks if the buffer is empty.
    pub const fn is_empty(&self) -> bool {
        self.bitlength == 0
    }

    /// Returns the number of started bytes in the buffer.
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the next bit starts a new byte.
    pub const fn is_byte_aligned(&self) -> bool {
        self.bitlength & 7 == 0
    }

    /// Reserves capacity for at least `additional_in_bits` more bits.
    pub fn reserve(&mut self, additional_in_bits: usize) {
        self.bytes.reserve((additional_in_bits >> 3) + 1);
    }

    /// Returns the remaining number of bits in the last byte.
    #[inline]
    const fn paddings(&self) -> usize {
        ((!self.bitlength).wrapping_add(1)) & 7
    }

    /// Returns bits in a string.
    ///
    /// Each byte is shown in eight characters joined by `'_'`, and the
    /// last bits of the last byte that are not yet filled are shown as `'*'`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::bitsink::*;
    /// let mut sink = ByteSink::new();
    /// sink.write_msbs(0x3456u16, 13);
    /// assert_eq!(sink.to_bitstring(), "00110100_01010***");
    /// ```
    pub fn to_bitstring(&self) -> String {
        let mut ret = String::new();
        for b in &self.bytes {
            ret.push_str(&format!("{b:08b}"));
            ret.push('_');
        }
        ret.pop();
        for _t in 0..self.paddings() {
            ret.pop();
        }
        for _t in 0..self.paddings() {
            ret.push('*');
        }
        ret
    }

    /// Consumes `ByteSink` and returns the internal buffer.
    #[inline]
    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }

    /// Returns a reference to the internal bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Computes CRC-8 over the bytes buffered so far.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::bitsink::*;
    /// let mut sink = ByteSink::new();
    /// sink.write_bytes_aligned(b"123456789");
    /// assert_eq!(sink.crc8(), 0xF4);
    /// ```
    pub fn crc8(&self) -> u8 {
        HEADER_CRC.checksum(&self.bytes)
    }

    /// Computes CRC-16 over the bytes buffered so far.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::bitsink::*;
    /// let mut sink = ByteSink::new();
    /// sink.write_bytes_aligned(b"123456789");
    /// assert_eq!(sink.crc16(), 0xFEE8);
    /// ```
    pub fn crc16(&self) -> u16 {
        FRAME_CRC.checksum(&self.bytes)
    }

    /// Pushes the `n` MSBs of a left-aligned word.
    #[inline]
    fn push_msbs(&mut self, mut val: u64, mut n: usize) {
        while n > 0 {
            let r = self.paddings();
            if r == 0 {
                if n >= 8 {
                    self.bytes.push((val >> 56) as u8);
                    val <<= 8;
                    n -= 8;
                    self.bitlength += 8;
                    continue;
                }
                self.bytes.push(0u8);
                let b = ((val >> (64 - n)) << (8 - n)) as u8;
                if let Some(last) = self.bytes.last_mut() {
                    *last |= b;
                }
                self.bitlength += n;
                return;
            }
            let k = std::cmp::min(r, n);
            let b = ((val >> (64 - k)) << (r - k)) as u8;
            if let Some(last) = self.bytes.last_mut() {
                *last |= b;
            }
            val <<= k;
            n -= k;
            self.bitlength += k;
        }
    }
}

impl BitSink for ByteSink {
    type Error = Infallible;

    #[inline]
    fn align_to_byte(&mut self) -> Result<usize, Self::Error> {
        let r = self.paddings();
        self.bitlength += r;
        Ok(r)
    }

    #[inline]
    fn write_bytes_aligned(&mut self, bytes: &[u8]) -> Result<usize, Self::Error> {
        let ret = self.align_to_byte()?;
        self.bytes.extend_from_slice(bytes);
        self.bitlength += 8 * bytes.len();
        Ok(ret)
    }

    #[inline]
    fn write_lsbs<T: Bits>(&mut self, val: T, n: usize) -> Result<(), Self::Error> {
        if n == 0 {
            return Ok(());
        }
        let val: u64 = val.into();
        self.push_msbs(val << (64 - n), n);
        Ok(())
    }

    #[inline]
    fn write_msbs<T: Bits>(&mut self, val: T, n: usize) -> Result<(), Self::Error> {
        if n == 0 {
            return Ok(());
        }
        let val: u64 = val.into();
        self.push_msbs(val << (64 - T::BITS), n);
        Ok(())
    }
}

mod seal_bits {
    pub trait Sealed {}
    impl Sealed for u8 {}
    impl Sealed for u16 {}
    impl Sealed for u32 {}
    impl Sealed for u64 {}
}

mod seal_signed_bits {
    pub trait Sealed {}
    impl Sealed for i8 {}
    impl Sealed for i16 {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_msb_across_bytes() -> Result<(), Infallible> {
        let mut sink = ByteSink::new();
        sink.write_msbs(0xFFu8, 3)?;
        sink.write_msbs(0x0u64, 12)?;
        sink.write_msbs(0xFFFF_FFFFu32, 9)?;
        sink.write_msbs(0x0u16, 8)?;
        assert_eq!(
            sink.to_bitstring(),
            "11100000_00000001_11111111_00000000"
        );
        assert_eq!(sink.byte_len(), 4);
        Ok(())
    }

    #[test]
    fn write_lsb_wide_values() -> Result<(), Infallible> {
        let mut sink = ByteSink::new();
        sink.write_lsbs(0x1u8, 1)?;
        sink.write_lsbs(0xFFFF_FFFF_FFFF_FFFEu64, 64)?;
        assert_eq!(sink.len(), 65);
        assert_eq!(
            sink.as_slice(),
            &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00]
        );
        Ok(())
    }

    #[test]
    fn write_twoc_negative() -> Result<(), Infallible> {
        let mut sink = ByteSink::new();
        sink.write_twoc(-1i32, 12)?;
        sink.write_twoc(5i32, 4)?;
        assert_eq!(sink.to_bitstring(), "11111111_11110101");
        Ok(())
    }

    #[test]
    fn zeros_and_alignment() -> Result<(), Infallible> {
        let mut sink = ByteSink::new();
        sink.write_lsbs(1u8, 1)?;
        sink.write_zeros(70)?;
        sink.write_lsbs(1u8, 1)?;
        assert_eq!(sink.len(), 72);
        assert!(sink.is_byte_aligned());
        assert_eq!(sink.as_slice()[0], 0x80);
        assert_eq!(sink.as_slice()[8], 0x01);
        Ok(())
    }

    #[test]
    fn rice_code_sequence() -> Result<(), Infallible> {
        let mut sink = ByteSink::new();
        sink.write_rice(0, 0)?;
        sink.write_rice(1, 1)?;
        sink.write_rice(-1, 0)?;
        // 0 -> "1", 1 -> folded 2 -> "01" + "0", -1 -> folded 1 -> "01"
        assert_eq!(sink.to_bitstring(), "101001**");
        Ok(())
    }
}
