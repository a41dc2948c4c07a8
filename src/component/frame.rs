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

//! Frame and frame header components.

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use crate::bitsink::BitSink;
use crate::constant::MAX_BLOCK_SIZE;
use crate::constant::MAX_CHANNELS;
use crate::error::verify_range;
use crate::error::VerifyError;

use super::subframe::SubFrame;

/// Stereo decorrelation mode and channel count in a frame header.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", content = "data"))]
pub enum ChannelAssignment {
    /// Indicates that the frame contains multiple channels independently.
    ///
    /// The `u8` field indicates the number of channels. This is the only
    /// option if the number of channels is not two.
    Independent(u8),
    /// Indicates that the frame contains left and side channels.
    LeftSide,
    /// Indicates that the frame contains right and side channels.
    RightSide,
    /// Indicates that the frame contains mid and side channels.
    MidSide,
}

impl ChannelAssignment {
    /// Constructs `ChannelAssignment` from the tag.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::component::*;
    /// assert_eq!(
    ///     ChannelAssignment::from_tag(5),
    ///     Some(ChannelAssignment::Independent(6)),
    /// );
    /// assert_eq!(
    ///     ChannelAssignment::from_tag(10),
    ///     Some(ChannelAssignment::MidSide),
    /// );
    /// assert_eq!(ChannelAssignment::from_tag(11), None);
    /// ```
    #[inline]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0..=7 => Some(Self::Independent(tag + 1)),
            8 => Some(Self::LeftSide),
            9 => Some(Self::RightSide),
            10 => Some(Self::MidSide),
            _ => None,
        }
    }

    /// Returns the 4-bit tag.
    #[inline]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Independent(n) => n.saturating_sub(1),
            Self::LeftSide => 8,
            Self::RightSide => 9,
            Self::MidSide => 10,
        }
    }

    /// Returns the number of extra bit required to store the channel samples.
    ///
    /// "Side" signal (as used in mid-side coding) requires an extra bit for
    /// storing large values such as `i32::MAX - i32::MIN`. This function maps
    /// `ChannelAssignment` and channel id `ch` to the number of extra bits
    /// required (0 or 1).
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::component::*;
    /// let rs = ChannelAssignment::RightSide;
    /// // Right-side coding stores the side signal in channel-0.
    /// assert_eq!(rs.bits_per_sample_offset(0), 1);
    /// assert_eq!(rs.bits_per_sample_offset(1), 0);
    /// ```
    #[inline]
    pub const fn bits_per_sample_offset(&self, ch: usize) -> usize {
        #[allow(clippy::match_same_arms, clippy::bool_to_int_with_if)]
        match *self {
            Self::Independent(_) => 0,
            Self::LeftSide | Self::MidSide => {
                if ch == 1 {
                    1 // side
                } else {
                    0 // left or mid
                }
            }
            Self::RightSide => {
                if ch == 0 {
                    1 // side
                } else {
                    0 // right
                }
            }
        }
    }

    /// Picks the pair of channels stored for this assignment.
    #[inline]
    pub(crate) fn select<T>(&self, l: T, r: T, m: T, s: T) -> (T, T) {
        match *self {
            Self::Independent(_) => (l, r),
            Self::LeftSide => (l, s),
            Self::RightSide => (s, r),
            Self::MidSide => (m, s),
        }
    }

    /// Returns the number of channels.
    #[inline]
    pub const fn channels(&self) -> usize {
        if let Self::Independent(n) = self {
            *n as usize
        } else {
            2
        }
    }
}

/// Position of a frame either by a frame count or a starting-sample number.
///
/// The use of `Self::Frame` implies fixed-blocking mode, and `Self::StartSample` implies variable
/// blocking mode.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FrameOffset {
    /// Frame offset specifier based on the number of frames preceding.
    Frame(u32),
    /// Frame offset specifier based on the number of samples preceding.
    StartSample(u64),
}

#[inline]
const fn ilog2(x: u32) -> u32 {
    31 - x.leading_zeros()
}

/// Enum for block size specifier in [`FrameHeader`].
///
/// Refer [`FRAME_HEADER`](https://xiph.org/flac/format.html#frame_header)
/// specification for details.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
pub enum BlockSizeSpec {
    /// Special case when `size = 192`.
    S192,
    /// Size that can be represented as `size = 576 * 2^n` where `n` in `0..=3`.
    Pow2Mul576(u8),
    /// Size that is stored in a byte at the end of [`FrameHeader`].
    ExtraByte(u8),
    /// Size that is stored in two bytes at the end of [`FrameHeader`].
    ExtraTwoBytes(u16),
    /// Size that can be represented as `size = 256 * 2^n` where `n` in `0..=7`.
    Pow2Mul256(u8),
}

impl BlockSizeSpec {
    /// Constructs `BlockSizeSpec` from the block size.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::component::*;
    /// assert_eq!(BlockSizeSpec::from_size(4608), BlockSizeSpec::Pow2Mul576(3));
    /// assert_eq!(BlockSizeSpec::from_size(4096), BlockSizeSpec::Pow2Mul256(4));
    /// assert_eq!(BlockSizeSpec::from_size(200), BlockSizeSpec::ExtraByte(199));
    /// assert_eq!(BlockSizeSpec::from_size(1000).block_size(), 1000);
    /// ```
    #[inline]
    pub fn from_size(size: u16) -> Self {
        match size {
            192 => Self::S192,
            576 | 1152 | 2304 | 4608 => Self::Pow2Mul576(ilog2(u32::from(size / 576)) as u8),
            256 | 512 | 1024 | 2048 | 4096 | 8192 | 16384 | 32768 => {
                Self::Pow2Mul256(ilog2(u32::from(size / 256)) as u8)
            }
            x if x <= 256 => Self::ExtraByte(x.saturating_sub(1) as u8),
            x => Self::ExtraTwoBytes(x - 1),
        }
    }

    /// Constructs `BlockSizeSpec` from the 4-bit tag and the trailing hint.
    ///
    /// Returns `None` for the reserved tag `0`.
    #[inline]
    pub(crate) fn from_tag_and_data(tag: u8, hint: u16) -> Option<Self> {
        match tag {
            1 => Some(Self::S192),
            2..=5 => Some(Self::Pow2Mul576(tag - 2)),
            6 => Some(Self::ExtraByte(hint as u8)),
            7 => Some(Self::ExtraTwoBytes(hint)),
            8..=15 => Some(Self::Pow2Mul256(tag - 8)),
            _ => None,
        }
    }

    /// Returns the number of extra bits required to store the specification.
    #[inline]
    pub const fn count_extra_bits(self) -> usize {
        match self {
            Self::ExtraByte(_) => 8,
            Self::ExtraTwoBytes(_) => 16,
            Self::S192 | Self::Pow2Mul576(_) | Self::Pow2Mul256(_) => 0,
        }
    }

    /// Returns the block size in samples.
    #[inline]
    pub const fn block_size(self) -> usize {
        match self {
            Self::S192 => 192,
            Self::Pow2Mul576(x) => 576usize << x as usize,
            Self::ExtraByte(x) => x as usize + 1,
            Self::ExtraTwoBytes(x) => x as usize + 1,
            Self::Pow2Mul256(x) => 256usize << x as usize,
        }
    }

    /// Returns 4-bit indicator for the block-size specifier.
    #[inline]
    pub const fn tag(self) -> u8 {
        match self {
            Self::S192 => 1,
            Self::Pow2Mul576(x) => 2 + x,
            Self::ExtraByte(_) => 6,
            Self::ExtraTwoBytes(_) => 7,
            Self::Pow2Mul256(x) => 8 + x,
        }
    }

    /// Writes extra data field to `dest`.
    #[inline]
    pub(crate) fn write_extra_bits<S: BitSink>(self, dest: &mut S) -> Result<(), S::Error> {
        match self {
            Self::ExtraByte(v) => dest.write_lsbs(v, 8),
            Self::ExtraTwoBytes(v) => dest.write_lsbs(v, 16),
            Self::S192 | Self::Pow2Mul576(_) | Self::Pow2Mul256(_) => Ok(()),
        }
    }
}

/// Enum for sample sizes representable in a frame header.
///
/// Refer [`FRAME_HEADER`](https://xiph.org/flac/format.html#frame_header)
/// specification for details.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
pub enum SampleSizeSpec {
    /// `Unspecified` instructs decoders to get sample size information from
    /// `StreamInfo`.
    Unspecified = 0,
    /// 8 bits-per-sample
    B8 = 1,
    /// 12 bits-per-sample
    B12 = 2,
    /// 16 bits-per-sample
    B16 = 4,
    /// 20 bits-per-sample
    B20 = 5,
    /// 24 bits-per-sample
    B24 = 6,
}

impl SampleSizeSpec {
    /// Constructs `SampleSizeSpec` from the tag (an integer in the bitstream).
    ///
    /// Returns `None` for the reserved tags `3` and `7`.
    #[inline]
    pub const fn from_tag(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unspecified),
            1 => Some(Self::B8),
            2 => Some(Self::B12),
            4 => Some(Self::B16),
            5 => Some(Self::B20),
            6 => Some(Self::B24),
            _ => None,
        }
    }

    /// Returns the tag (an integer in the bitstream) corresponding to `self`.
    #[inline]
    pub const fn into_tag(self) -> u8 {
        self as u8
    }

    /// Constructs `SampleSizeSpec` from the bits-per-sample value.
    ///
    /// Depths without a dedicated code map to `Unspecified`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::component::*;
    /// assert_eq!(SampleSizeSpec::from_bits(16), SampleSizeSpec::B16);
    /// assert_eq!(SampleSizeSpec::from_bits(17), SampleSizeSpec::Unspecified);
    /// ```
    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        match bits {
            8 => Self::B8,
            12 => Self::B12,
            16 => Self::B16,
            20 => Self::B20,
            24 => Self::B24,
            _ => Self::Unspecified,
        }
    }

    /// Returns the bits-per-sample value corresponding to `self`.
    #[inline]
    pub const fn into_bits(self) -> Option<u8> {
        match self {
            Self::Unspecified => None,
            Self::B8 => Some(8),
            Self::B12 => Some(12),
            Self::B16 => Some(16),
            Self::B20 => Some(20),
            Self::B24 => Some(24),
        }
    }
}

/// Enum for sampling rates representable in a frame header.
///
/// Refer [`FRAME_HEADER`](https://xiph.org/flac/format.html#frame_header)
/// specification for details.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
pub enum SampleRateSpec {
    /// `Unspecified` instructs decoders to get sample rate information from
    /// `StreamInfo`.
    Unspecified,
    /// 88.2kHz.
    R88_2kHz,
    /// 176.4kHz.
    R176_4kHz,
    /// 192kHz.
    R192kHz,
    /// 8kHz.
    R8kHz,
    /// 16kHZ.
    R16kHz,
    /// 22.05kHz.
    R22_05kHz,
    /// 24kHz.
    R24kHz,
    /// 32kHz.
    R32kHz,
    /// 44.1kHz.
    R44_1kHz,
    /// 48kHz.
    R48kHz,
    /// 96kHz.
    R96kHz,
    /// An immediate value specifying kHz up to 255kHz.
    KHz(u8),
    /// An immediate value specifying Hz up to 65535Hz.
    Hz(u16),
    /// An immediate value specifying deca-Hz up to 655.35kHz.
    DaHz(u16),
}

impl SampleRateSpec {
    /// Constructs `SampleRateSpec` from frequency in Hz.
    ///
    /// Frequencies without a dedicated code try `KHz`, `DaHz`, and `Hz` in
    /// this order, then fall back to `Unspecified`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::component::*;
    /// assert_eq!(SampleRateSpec::from_freq(44100), SampleRateSpec::R44_1kHz);
    /// assert_eq!(SampleRateSpec::from_freq(11000), SampleRateSpec::KHz(11));
    /// assert_eq!(SampleRateSpec::from_freq(11025), SampleRateSpec::Hz(11025));
    /// assert_eq!(SampleRateSpec::from_freq(300_010), SampleRateSpec::DaHz(30001));
    /// assert_eq!(SampleRateSpec::from_freq(700_001), SampleRateSpec::Unspecified);
    /// ```
    #[inline]
    pub fn from_freq(freq: u32) -> Self {
        match freq {
            88_200 => Some(Self::R88_2kHz),
            176_400 => Some(Self::R176_4kHz),
            192_000 => Some(Self::R192kHz),
            8_000 => Some(Self::R8kHz),
            16_000 => Some(Self::R16kHz),
            22_050 => Some(Self::R22_05kHz),
            24_000 => Some(Self::R24kHz),
            32_000 => Some(Self::R32kHz),
            44_100 => Some(Self::R44_1kHz),
            48_000 => Some(Self::R48kHz),
            96_000 => Some(Self::R96kHz),
            _ => None,
        }
        .or_else(|| {
            (0 == freq % 1000)
                .then(|| (freq / 1000).try_into().ok().map(Self::KHz))
                .flatten()
        })
        .or_else(|| {
            (0 == freq % 10)
                .then(|| (freq / 10).try_into().ok().map(Self::DaHz))
                .flatten()
        })
        .or_else(|| freq.try_into().ok().map(Self::Hz))
        .unwrap_or(Self::Unspecified)
    }

    /// Constructs `SampleRateSpec` from the 4-bit tag and the trailing hint.
    ///
    /// Returns `None` for the invalid tag `15`.
    #[inline]
    pub(crate) fn from_tag_and_data(tag: u8, hint: u16) -> Option<Self> {
        Some(match tag {
            0 => Self::Unspecified,
            1 => Self::R88_2kHz,
            2 => Self::R176_4kHz,
            3 => Self::R192kHz,
            4 => Self::R8kHz,
            5 => Self::R16kHz,
            6 => Self::R22_05kHz,
            7 => Self::R24kHz,
            8 => Self::R32kHz,
            9 => Self::R44_1kHz,
            10 => Self::R48kHz,
            11 => Self::R96kHz,
            12 => Self::KHz(hint as u8),
            13 => Self::Hz(hint),
            14 => Self::DaHz(hint),
            _ => return None,
        })
    }

    /// Returns the sample rate in Hz, or `None` if `Unspecified`.
    #[inline]
    pub const fn freq(self) -> Option<u32> {
        Some(match self {
            Self::Unspecified => return None,
            Self::R88_2kHz => 88_200,
            Self::R176_4kHz => 176_400,
            Self::R192kHz => 192_000,
            Self::R8kHz => 8_000,
            Self::R16kHz => 16_000,
            Self::R22_05kHz => 22_050,
            Self::R24kHz => 24_000,
            Self::R32kHz => 32_000,
            Self::R44_1kHz => 44_100,
            Self::R48kHz => 48_000,
            Self::R96kHz => 96_000,
            Self::KHz(v) => v as u32 * 1000,
            Self::Hz(v) => v as u32,
            Self::DaHz(v) => v as u32 * 10,
        })
    }

    /// Returns the number of extra bits required to store the specification.
    #[inline]
    pub const fn count_extra_bits(self) -> usize {
        match self {
            Self::KHz(_) => 8,
            Self::DaHz(_) | Self::Hz(_) => 16,
            Self::Unspecified
            | Self::R88_2kHz
            | Self::R176_4kHz
            | Self::R192kHz
            | Self::R8kHz
            | Self::R16kHz
            | Self::R22_05kHz
            | Self::R24kHz
            | Self::R32kHz
            | Self::R44_1kHz
            | Self::R48kHz
            | Self::R96kHz => 0,
        }
    }

    /// Returns 4-bit indicator for the sample-rate specifier.
    #[inline]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Unspecified => 0,
            Self::R88_2kHz => 1,
            Self::R176_4kHz => 2,
            Self::R192kHz => 3,
            Self::R8kHz => 4,
            Self::R16kHz => 5,
            Self::R22_05kHz => 6,
            Self::R24kHz => 7,
            Self::R32kHz => 8,
            Self::R44_1kHz => 9,
            Self::R48kHz => 10,
            Self::R96kHz => 11,
            Self::KHz(_) => 12,
            Self::Hz(_) => 13,
            Self::DaHz(_) => 14,
        }
    }

    /// Writes extra data field to `dest`.
    #[inline]
    pub(crate) fn write_extra_bits<S: BitSink>(self, dest: &mut S) -> Result<(), S::Error> {
        match self {
            Self::KHz(v) => dest.write_lsbs(v, 8),
            Self::DaHz(v) | Self::Hz(v) => dest.write_lsbs(v, 16),
            Self::Unspecified
            | Self::R88_2kHz
            | Self::R176_4kHz
            | Self::R192kHz
            | Self::R8kHz
            | Self::R16kHz
            | Self::R22_05kHz
            | Self::R24kHz
            | Self::R32kHz
            | Self::R44_1kHz
            | Self::R48kHz
            | Self::R96kHz => Ok(()),
        }
    }
}

/// [`FRAME_HEADER`](https://xiph.org/flac/format.html#frame_header) component.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrameHeader {
    variable_block_size: bool, // must be same in all frames
    block_size_spec: BlockSizeSpec,
    channel_assignment: ChannelAssignment,
    sample_size_spec: SampleSizeSpec,
    sample_rate_spec: SampleRateSpec,
    frame_number: u32,        // written when variable_block_size == false
    start_sample_number: u64, // written when variable_block_size == true
}

impl FrameHeader {
    #[inline]
    pub(crate) const fn from_specs(
        block_size_spec: BlockSizeSpec,
        channel_assignment: ChannelAssignment,
        sample_size_spec: SampleSizeSpec,
        sample_rate_spec: SampleRateSpec,
        offset: FrameOffset,
    ) -> Self {
        let (variable_block_size, frame_number, start_sample_number) = match offset {
            FrameOffset::Frame(n) => (false, n, 0),
            FrameOffset::StartSample(n) => (true, 0, n),
        };
        Self {
            variable_block_size,
            block_size_spec,
            channel_assignment,
            sample_size_spec,
            sample_rate_spec,
            frame_number,
            start_sample_number,
        }
    }

    /// Constructs `FrameHeader` from the given frame parameters.
    ///
    /// Sample rates and depths without a dedicated code are written as
    /// "get from STREAMINFO".
    ///
    /// # Errors
    ///
    /// Returns error when `block_size` or the channel count is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::component::*;
    /// # use flacodec::bitsink::*;
    /// let header = FrameHeader::new(
    ///     192, ChannelAssignment::Independent(1), 8, 44100, FrameOffset::StartSample(123456)
    /// ).unwrap();
    /// let mut sink = ByteSink::new();
    /// header.write(&mut sink).unwrap();
    /// assert_eq!(&sink.as_slice()[..8], &[
    ///     0xFF, 0xF9, // sync-code + fixed/var
    ///     0x19, 0x02, // block size + rate + channel + sample size + reserved
    ///     0xF0, 0x9E, 0x89, 0x80 // start sample number encoded in utf-8
    /// ]);
    /// ```
    #[inline]
    pub fn new(
        block_size: usize,
        channel_assignment: ChannelAssignment,
        bits_per_sample: usize,
        sample_rate: usize,
        offset: FrameOffset,
    ) -> Result<Self, VerifyError> {
        verify_range!("block_size", block_size, 1..=MAX_BLOCK_SIZE)?;
        verify_range!(
            "channel_assignment",
            channel_assignment.channels(),
            1..=MAX_CHANNELS
        )?;
        Ok(Self::from_specs(
            BlockSizeSpec::from_size(block_size as u16),
            channel_assignment,
            SampleSizeSpec::from_bits(bits_per_sample.try_into().unwrap_or(0)),
            SampleRateSpec::from_freq(sample_rate.try_into().unwrap_or(u32::MAX)),
            offset,
        ))
    }

    /// Returns `true` if the header carries a starting-sample number.
    #[inline]
    pub const fn is_variable_blocking(&self) -> bool {
        self.variable_block_size
    }

    /// Sets the location of frame.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::component::*;
    /// let chs = ChannelAssignment::Independent(2);
    /// let mut header = FrameHeader::new(4096, chs, 16, 44100, FrameOffset::Frame(0)).unwrap();
    /// header.set_frame_offset(FrameOffset::StartSample(480));
    /// assert_eq!(header.frame_offset(), FrameOffset::StartSample(480));
    /// assert!(header.is_variable_blocking());
    /// ```
    #[inline]
    pub fn set_frame_offset(&mut self, offset: FrameOffset) {
        match offset {
            FrameOffset::Frame(n) => {
                self.variable_block_size = false;
                self.frame_number = n;
            }
            FrameOffset::StartSample(n) => {
                self.variable_block_size = true;
                self.start_sample_number = n;
            }
        }
    }

    /// Returns the location of frame.
    #[inline]
    pub const fn frame_offset(&self) -> FrameOffset {
        if self.variable_block_size {
            FrameOffset::StartSample(self.start_sample_number)
        } else {
            FrameOffset::Frame(self.frame_number)
        }
    }

    #[inline]
    pub(crate) const fn frame_number(&self) -> u32 {
        self.frame_number
    }

    #[inline]
    pub(crate) const fn start_sample_number(&self) -> u64 {
        self.start_sample_number
    }

    /// Returns the sample rate specifier.
    #[inline]
    pub const fn sample_rate_spec(&self) -> SampleRateSpec {
        self.sample_rate_spec
    }

    /// Returns the sample size specifier.
    #[inline]
    pub const fn sample_size_spec(&self) -> SampleSizeSpec {
        self.sample_size_spec
    }

    /// Overwrites channel assignment information of the frame.
    #[inline]
    pub(crate) fn reset_channel_assignment(&mut self, channel_assignment: ChannelAssignment) {
        self.channel_assignment = channel_assignment;
    }

    /// Returns block size.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::component::*;
    /// let chs = ChannelAssignment::Independent(1);
    /// let header = FrameHeader::new(160, chs, 16, 16000, FrameOffset::Frame(0)).unwrap();
    /// assert_eq!(header.block_size(), 160);
    /// ```
    #[inline]
    pub const fn block_size(&self) -> usize {
        self.block_size_spec.block_size()
    }

    /// Returns block size spec.
    #[inline]
    pub const fn block_size_spec(&self) -> BlockSizeSpec {
        self.block_size_spec
    }

    /// Returns bits-per-sample, or `None` if it is taken from STREAMINFO.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::component::*;
    /// let chs = ChannelAssignment::Independent(1);
    /// let header = FrameHeader::new(192, chs, 12, 44100, FrameOffset::Frame(0)).unwrap();
    /// assert_eq!(header.bits_per_sample(), Some(12));
    /// let header = FrameHeader::new(192, chs, 17, 44100, FrameOffset::Frame(0)).unwrap();
    /// assert_eq!(header.bits_per_sample(), None);
    /// ```
    #[inline]
    pub fn bits_per_sample(&self) -> Option<usize> {
        self.sample_size_spec.into_bits().map(|x| x as usize)
    }

    /// Returns [`ChannelAssignment`] of this frame.
    #[inline]
    pub const fn channel_assignment(&self) -> &ChannelAssignment {
        &self.channel_assignment
    }
}

/// [`FRAME`](https://xiph.org/flac/format.html#frame) component.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Frame {
    header: FrameHeader,
    subframes: Vec<SubFrame>,
}

impl Frame {
    /// Constructs a frame from a header and per-channel subframes.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of subframes or their lengths don't
    /// match to the header.
    pub fn new<I>(header: FrameHeader, subframes: I) -> Result<Self, VerifyError>
    where
        I: IntoIterator<Item = SubFrame>,
    {
        let ret = Self::from_parts(header, subframes.into_iter().collect());
        crate::error::Verify::verify(&ret.header)?;
        crate::error::verify_true!(
            "subframes",
            ret.subframes.len() == ret.header.channel_assignment().channels(),
            "must have one subframe per channel"
        )?;
        for (ch, sub) in ret.subframes.iter().enumerate() {
            crate::error::verify_true!(
                "subframes[{}]",
                sub.block_size() == ret.header.block_size(),
                "block size of channel {} must match the header",
                ch
            )?;
        }
        Ok(ret)
    }

    pub(crate) fn from_parts(header: FrameHeader, subframes: Vec<SubFrame>) -> Self {
        Self { header, subframes }
    }

    /// Returns [`FrameHeader`] of this frame.
    #[inline]
    pub const fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// Returns a mutable reference to [`FrameHeader`] of this frame.
    #[inline]
    pub(crate) fn header_mut(&mut self) -> &mut FrameHeader {
        &mut self.header
    }

    /// Returns [`SubFrame`] for the given channel.
    #[inline]
    pub fn subframe(&self, ch: usize) -> Option<&SubFrame> {
        self.subframes.get(ch)
    }

    /// Returns the number of [`SubFrame`]s in this frame.
    #[inline]
    pub fn subframe_count(&self) -> usize {
        self.subframes.len()
    }

    #[inline]
    pub(crate) fn subframes(&self) -> &[SubFrame] {
        &self.subframes
    }

    /// Returns block size of this frame.
    #[inline]
    pub const fn block_size(&self) -> usize {
        self.header.block_size()
    }
}
