// Copyright 2022-2024 Google LLC
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

use std::cell::RefCell;

use crate::bitsink::BitSink;
use crate::bitsink::ByteSink;
use crate::bitsink::FRAME_CRC;
use crate::bitsink::HEADER_CRC;
use crate::constant::metadata::MAX_BLOCK_LEN;
use crate::error::OutputError;
use crate::error::RangeError;

use super::frame::ChannelAssignment;
use super::frame::Frame;
use super::frame::FrameHeader;
use super::metadata::Application;
use super::metadata::CueSheet;
use super::metadata::CueSheetTrack;
use super::metadata::MetadataBlock;
use super::metadata::MetadataBlockData;
use super::metadata::Picture;
use super::metadata::SeekTable;
use super::metadata::StreamInfo;
use super::metadata::VorbisComment;
use super::subframe::Constant;
use super::subframe::FixedLpc;
use super::subframe::Lpc;
use super::subframe::PartitionParameter;
use super::subframe::Residual;
use super::subframe::SubFrame;
use super::subframe::Verbatim;

/// Length of the media catalog number field of CUESHEET in bytes.
const CUESHEET_CATALOG_LEN: usize = 128;
/// Fixed part of CUESHEET: catalog, lead-in, flags + reserved, and #tracks.
const CUESHEET_FIXED_LEN: usize = CUESHEET_CATALOG_LEN + 8 + 259 + 1;
/// Fixed part of a CUESHEET track: offset, number, ISRC, flags + reserved, and #indices.
const CUESHEET_TRACK_FIXED_LEN: usize = 8 + 1 + 12 + 14 + 1;
/// A CUESHEET index point: offset, number, and reserved.
const CUESHEET_INDEX_LEN: usize = 8 + 1 + 3;

pub mod seal_bit_repr {
    pub trait Sealed {}
    impl Sealed for super::MetadataBlock {}
    impl Sealed for super::MetadataBlockData {}
    impl Sealed for super::StreamInfo {}
    impl Sealed for super::Frame {}
    impl Sealed for super::FrameHeader {}
    impl Sealed for super::ChannelAssignment {}
    impl Sealed for super::SubFrame {}
    impl Sealed for super::Constant {}
    impl Sealed for super::FixedLpc {}
    impl Sealed for super::Verbatim {}
    impl Sealed for super::Lpc {}
    impl Sealed for super::Residual {}
}

/// FLAC components that can be represented in a bit sequence.
pub trait BitRepr: seal_bit_repr::Sealed {
    /// Counts the number of bits required to store the component.
    fn count_bits(&self) -> usize;

    /// Writes the bit sequence to `BitSink`.
    ///
    /// # Errors
    ///
    /// This function returns error if `self` contains an invalid value that
    /// does not fit to FLAC's bitstream format, or if a `BitSink` method
    /// returned an error.
    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>>;

    /// Test utility for obtaining bits as a [`Vec`] of [`u8`].
    #[cfg(test)]
    fn to_bytes(&self) -> Vec<u8> {
        let mut sink = ByteSink::new();
        self.write(&mut sink).expect("No error expected");
        sink.into_inner()
    }

    /// Test utility for obtaining bits as eight-bit separated `String`.
    #[cfg(test)]
    fn to_bitstring(&self) -> String {
        let mut sink = ByteSink::new();
        self.write(&mut sink).expect("No error expected");
        sink.to_bitstring()
    }

    /// Checks if the number of bits actually written equals to the expected number of bits.
    ///
    /// # Errors
    ///
    /// If the check passed i.e. the number of bits actually written is as same as the expected
    /// number, it returns `Ok(bits)`. Otherwise, it returns `Err((expected_bits, actual_bits))`.
    #[cfg(test)]
    fn verify_bit_counter(&self) -> Result<usize, (usize, usize)> {
        let expected = self.count_bits();
        let mut sink = ByteSink::new();
        self.write(&mut sink).expect("No error expected");
        if expected == sink.len() {
            Ok(expected)
        } else {
            Err((expected, sink.len()))
        }
    }
}

/// Lookup table for `encode_to_utf8like`.
const UTF8_HEADS: [u8; 7] = [0x80, 0xC0, 0xE0, 0xF0, 0xF8, 0xFC, 0xFE];

/// Encodes the given integer into UTF-8-like byte sequence.
///
/// # Errors
///
/// It returns an error if `val` exceeds 36-bit value.
///
/// # Examples
///
/// ```
/// # use flacodec::component::encode_to_utf8like;
/// assert_eq!(encode_to_utf8like(0x7F).unwrap().as_slice(), &[0x7F]);
/// assert_eq!(encode_to_utf8like(0x80).unwrap().as_slice(), &[0xC2, 0x80]);
/// assert_eq!(encode_to_utf8like(1 << 36).is_err(), true);
/// ```
#[inline]
pub fn encode_to_utf8like(val: u64) -> Result<heapless::Vec<u8, 7>, RangeError> {
    let val_size = u64::BITS as usize;
    let code_bits: usize = val_size - val.leading_zeros() as usize;
    let mut ret = heapless::Vec::new();
    if code_bits <= 7 {
        // capacity is 7 so the pushes below never fail.
        let _ = ret.push(val as u8);
    } else if code_bits > 36 {
        return Err(RangeError::from_display(
            "input",
            "cannot exceed 36 bits.",
            &val,
        ));
    } else {
        // capacity = n * 6 + 6 - n = n * 5 + 6
        let trailing_bytes: usize = (code_bits - 2) / 5;
        let capacity = trailing_bytes * 6 + 6 - trailing_bytes;
        debug_assert!((1..=6).contains(&trailing_bytes));
        debug_assert!(capacity >= code_bits);

        let first_bits = 6 - trailing_bytes;
        let mut val = val << (val_size - capacity);
        let head_byte: u8 = if trailing_bytes == 6 {
            0xFEu8
        } else {
            UTF8_HEADS[trailing_bytes] | ((val >> (64 - first_bits)) & 0xFF) as u8
        };
        let _ = ret.push(head_byte);
        val <<= first_bits;

        for _i in 0..trailing_bytes {
            let _ = ret.push(0x80u8 | (val >> 58) as u8);
            val <<= 6;
        }
    }
    Ok(ret)
}

/// Computes the number of bytes required for UTF-8-like encoding of `val`.
pub(crate) const fn utf8like_bytesize(val: u64) -> usize {
    let code_bits: usize = (u64::BITS - val.leading_zeros()) as usize;
    if code_bits <= 7 {
        1
    } else {
        1 + (code_bits - 2) / 5
    }
}

fn length_field(var: &str, len: usize) -> Result<u32, RangeError> {
    u32::try_from(len).map_err(|_| RangeError::from_display(var, "must fit in 32 bits", &len))
}

fn write_le_u32<S: BitSink>(dest: &mut S, val: u32) -> Result<(), OutputError<S>> {
    dest.write_bytes_aligned(&val.to_le_bytes())
        .map_err(OutputError::<S>::from_sink)?;
    Ok(())
}

fn write_be_bytes<S: BitSink>(dest: &mut S, bytes: &[u8]) -> Result<(), OutputError<S>> {
    dest.write_bytes_aligned(bytes)
        .map_err(OutputError::<S>::from_sink)?;
    Ok(())
}

impl BitRepr for MetadataBlock {
    #[inline]
    fn count_bits(&self) -> usize {
        // `self.data.count_bits` doesn't include the block header.
        32 + self.data.count_bits()
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        let data_size = self.data.count_bits() / 8;
        if data_size > MAX_BLOCK_LEN {
            return Err(RangeError::from_display(
                "metadata_block.length",
                "must fit in 24 bits",
                &data_size,
            )
            .into());
        }
        let block_type: u8 = self.data.typetag() | if self.is_last { 0x80 } else { 0x00 };
        dest.write(block_type)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write_lsbs(data_size as u32, 24)
            .map_err(OutputError::<S>::from_sink)?;
        self.data.write(dest)
    }
}

impl BitRepr for MetadataBlockData {
    fn count_bits(&self) -> usize {
        let bytes = match self {
            Self::StreamInfo(info) => return info.count_bits(),
            Self::Padding(n) => *n,
            Self::Application(app) => 4 + app.data.len(),
            Self::SeekTable(table) => table.byte_len(),
            Self::VorbisComment(vc) => vc.byte_len(),
            Self::CueSheet(sheet) => sheet.byte_len(),
            Self::Picture(pic) => pic.byte_len(),
            Self::Unknown { data, .. } => data.len(),
        };
        bytes * 8
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        match self {
            Self::StreamInfo(info) => info.write(dest),
            Self::Padding(n) => {
                dest.align_to_byte()
                    .map_err(OutputError::<S>::from_sink)?;
                dest.write_zeros(n * 8)
                    .map_err(OutputError::<S>::from_sink)
            }
            Self::Application(app) => write_application(app, dest),
            Self::SeekTable(table) => write_seek_table(table, dest),
            Self::VorbisComment(vc) => write_vorbis_comment(vc, dest),
            Self::CueSheet(sheet) => write_cue_sheet(sheet, dest),
            Self::Picture(pic) => write_picture(pic, dest),
            Self::Unknown { data, .. } => write_be_bytes(dest, data),
        }
    }
}

impl BitRepr for StreamInfo {
    #[inline]
    fn count_bits(&self) -> usize {
        272
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        if self.channels == 0 || self.bits_per_sample == 0 {
            return Err(RangeError::from_display(
                "stream_info",
                "channels and bits_per_sample must be positive",
                &self.channels,
            )
            .into());
        }
        dest.write(self.min_block_size)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write(self.max_block_size)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write_lsbs(self.min_frame_size, 24)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write_lsbs(self.max_frame_size, 24)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write_lsbs(self.sample_rate, 20)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write_lsbs(self.channels - 1, 3)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write_lsbs(self.bits_per_sample - 1, 5)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write_lsbs(self.total_samples, 36)
            .map_err(OutputError::<S>::from_sink)?;
        write_be_bytes(dest, &self.md5)
    }
}

impl SeekTable {
    fn byte_len(&self) -> usize {
        self.points.len() * crate::constant::metadata::SEEKPOINT_LEN
    }
}

fn write_seek_table<S: BitSink>(table: &SeekTable, dest: &mut S) -> Result<(), OutputError<S>> {
    for p in &table.points {
        dest.write(p.sample_number)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write(p.stream_offset)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write(p.frame_samples)
            .map_err(OutputError::<S>::from_sink)?;
    }
    Ok(())
}

impl VorbisComment {
    fn byte_len(&self) -> usize {
        8 + self.vendor.len() + self.comments.iter().map(|c| 4 + c.len()).sum::<usize>()
    }
}

fn write_vorbis_comment<S: BitSink>(
    vc: &VorbisComment,
    dest: &mut S,
) -> Result<(), OutputError<S>> {
    write_le_u32(dest, length_field("vendor", vc.vendor.len())?)?;
    write_be_bytes(dest, &vc.vendor)?;
    write_le_u32(dest, length_field("comments", vc.comments.len())?)?;
    for entry in &vc.comments {
        write_le_u32(dest, length_field("comment", entry.len())?)?;
        write_be_bytes(dest, entry)?;
    }
    Ok(())
}

impl CueSheet {
    fn byte_len(&self) -> usize {
        CUESHEET_FIXED_LEN
            + self
                .tracks
                .iter()
                .map(|t| CUESHEET_TRACK_FIXED_LEN + t.indices.len() * CUESHEET_INDEX_LEN)
                .sum::<usize>()
    }
}

fn write_cue_sheet<S: BitSink>(sheet: &CueSheet, dest: &mut S) -> Result<(), OutputError<S>> {
    let catalog_len = sheet.media_catalog_number.len();
    if catalog_len > CUESHEET_CATALOG_LEN {
        return Err(RangeError::from_display(
            "media_catalog_number",
            "cannot exceed 128 bytes",
            &catalog_len,
        )
        .into());
    }
    let tracks = u8::try_from(sheet.tracks.len()).map_err(|_| {
        RangeError::from_display("tracks", "cannot exceed 255", &sheet.tracks.len())
    })?;
    write_be_bytes(dest, &sheet.media_catalog_number)?;
    dest.write_zeros((CUESHEET_CATALOG_LEN - catalog_len) * 8)
        .map_err(OutputError::<S>::from_sink)?;
    dest.write(sheet.lead_in)
        .map_err(OutputError::<S>::from_sink)?;
    dest.write_lsbs(u8::from(sheet.is_cd), 1)
        .map_err(OutputError::<S>::from_sink)?;
    dest.write_zeros(7 + 258 * 8)
        .map_err(OutputError::<S>::from_sink)?;
    dest.write(tracks).map_err(OutputError::<S>::from_sink)?;
    for track in &sheet.tracks {
        write_cue_sheet_track(track, dest)?;
    }
    Ok(())
}

fn write_cue_sheet_track<S: BitSink>(
    track: &CueSheetTrack,
    dest: &mut S,
) -> Result<(), OutputError<S>> {
    let indices = u8::try_from(track.indices.len()).map_err(|_| {
        RangeError::from_display("indices", "cannot exceed 255", &track.indices.len())
    })?;
    dest.write(track.offset)
        .map_err(OutputError::<S>::from_sink)?;
    dest.write(track.number)
        .map_err(OutputError::<S>::from_sink)?;
    write_be_bytes(dest, &track.isrc)?;
    // the type bit is set for non-audio tracks.
    dest.write_lsbs(u8::from(!track.is_audio), 1)
        .map_err(OutputError::<S>::from_sink)?;
    dest.write_lsbs(u8::from(track.pre_emphasis), 1)
        .map_err(OutputError::<S>::from_sink)?;
    dest.write_zeros(6 + 13 * 8)
        .map_err(OutputError::<S>::from_sink)?;
    dest.write(indices).map_err(OutputError::<S>::from_sink)?;
    for index in &track.indices {
        dest.write(index.offset)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write(index.number)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write_zeros(24)
            .map_err(OutputError::<S>::from_sink)?;
    }
    Ok(())
}

impl Picture {
    fn byte_len(&self) -> usize {
        32 + self.mime_type.len() + self.description.len() + self.data.len()
    }
}

fn write_picture<S: BitSink>(pic: &Picture, dest: &mut S) -> Result<(), OutputError<S>> {
    dest.write(pic.picture_type)
        .map_err(OutputError::<S>::from_sink)?;
    dest.write(length_field("mime_type", pic.mime_type.len())?)
        .map_err(OutputError::<S>::from_sink)?;
    write_be_bytes(dest, &pic.mime_type)?;
    dest.write(length_field("description", pic.description.len())?)
        .map_err(OutputError::<S>::from_sink)?;
    write_be_bytes(dest, &pic.description)?;
    for v in [pic.width, pic.height, pic.depth, pic.colors] {
        dest.write(v).map_err(OutputError::<S>::from_sink)?;
    }
    dest.write(length_field("data", pic.data.len())?)
        .map_err(OutputError::<S>::from_sink)?;
    write_be_bytes(dest, &pic.data)
}

fn write_application<S: BitSink>(app: &Application, dest: &mut S) -> Result<(), OutputError<S>> {
    write_be_bytes(dest, &app.id)?;
    write_be_bytes(dest, &app.data)
}

thread_local! {
    static FRAME_BUFFER: RefCell<ByteSink> = const { RefCell::new(ByteSink::new()) };
    static HEADER_BUFFER: RefCell<ByteSink> = const { RefCell::new(ByteSink::new()) };
}

impl BitRepr for Frame {
    #[inline]
    fn count_bits(&self) -> usize {
        let header = self.header().count_bits();
        let body: usize = self.subframes().iter().map(BitRepr::count_bits).sum();

        let aligned = ((header + body + 7) >> 3) << 3;
        let footer = 16;
        aligned + footer
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        FRAME_BUFFER.with(|cell| {
            let frame_sink = &mut *cell.borrow_mut();
            frame_sink.clear();
            frame_sink.reserve(self.count_bits());

            self.header()
                .write(frame_sink)
                .map_err(OutputError::<S>::ignore_sink_error)?;
            for sub in self.subframes() {
                sub.write(frame_sink)
                    .map_err(OutputError::<S>::ignore_sink_error)?;
            }
            let _ = frame_sink.align_to_byte();

            write_be_bytes(dest, frame_sink.as_slice())?;
            dest.write(frame_sink.crc16())
                .map_err(OutputError::<S>::from_sink)
        })
    }
}

impl BitRepr for ChannelAssignment {
    #[inline]
    fn count_bits(&self) -> usize {
        4
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        if let Self::Independent(ch) = *self {
            if ch == 0 || ch > 8 {
                return Err(RangeError::from_display("#channel", "must be in 1..=8", &ch).into());
            }
        }
        dest.write_lsbs(self.tag(), 4)
            .map_err(OutputError::<S>::from_sink)
    }
}

impl BitRepr for FrameHeader {
    #[inline]
    fn count_bits(&self) -> usize {
        let mut ret = 40;
        if self.is_variable_blocking() {
            ret += 8 * utf8like_bytesize(self.start_sample_number());
        } else {
            ret += 8 * utf8like_bytesize(u64::from(self.frame_number()));
        }
        ret += self.block_size_spec().count_extra_bits();
        ret += self.sample_rate_spec().count_extra_bits();
        ret
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        HEADER_BUFFER.with(|cell| {
            let header_buffer = &mut *cell.borrow_mut();
            header_buffer.clear();
            header_buffer.reserve(self.count_bits());

            // sync-code + reserved 1-bit + variable-block indicator
            let header_word = 0xFFF8u16 + u16::from(self.is_variable_blocking());
            let _ = header_buffer.write_lsbs(header_word, 16);
            let _ = header_buffer.write_lsbs(
                self.block_size_spec().tag() << 4 | self.sample_rate_spec().tag(),
                8,
            );
            self.channel_assignment()
                .write(header_buffer)
                .map_err(OutputError::<S>::ignore_sink_error)?;
            // sample size specifier + 1-bit reserved (zero)
            let _ = header_buffer.write_lsbs(self.sample_size_spec().into_tag() << 1, 4);

            let number = if self.is_variable_blocking() {
                encode_to_utf8like(self.start_sample_number())?
            } else {
                if self.frame_number() >= (1 << 31) {
                    return Err(RangeError::from_display(
                        "frame_number",
                        "cannot exceed 31 bits",
                        &self.frame_number(),
                    )
                    .into());
                }
                encode_to_utf8like(self.frame_number().into())?
            };
            let _ = header_buffer.write_bytes_aligned(&number);
            let _ = self.block_size_spec().write_extra_bits(header_buffer);
            let _ = self.sample_rate_spec().write_extra_bits(header_buffer);

            write_be_bytes(dest, header_buffer.as_slice())?;
            dest.write(HEADER_CRC.checksum(header_buffer.as_slice()))
                .map_err(OutputError::<S>::from_sink)
        })
    }
}

/// Writes the 8-bit subframe type field followed by the unary wasted-bits count.
fn write_subframe_header<S: BitSink>(
    dest: &mut S,
    type_bits: u8,
    wasted_bits: usize,
) -> Result<(), OutputError<S>> {
    let flag = u8::from(wasted_bits > 0);
    dest.write((type_bits << 1) | flag)
        .map_err(OutputError::<S>::from_sink)?;
    if wasted_bits > 0 {
        dest.write_zeros(wasted_bits - 1)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write_lsbs(1u8, 1)
            .map_err(OutputError::<S>::from_sink)?;
    }
    Ok(())
}

impl BitRepr for SubFrame {
    #[inline]
    fn count_bits(&self) -> usize {
        match self {
            Self::Verbatim(c) => c.count_bits(),
            Self::Constant(c) => c.count_bits(),
            Self::FixedLpc(c) => c.count_bits(),
            Self::Lpc(c) => c.count_bits(),
        }
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        match self {
            Self::Verbatim(c) => c.write(dest),
            Self::Constant(c) => c.write(dest),
            Self::FixedLpc(c) => c.write(dest),
            Self::Lpc(c) => c.write(dest),
        }
    }
}

impl BitRepr for Constant {
    #[inline]
    fn count_bits(&self) -> usize {
        8 + self.wasted_bits() + self.bits_per_sample()
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        write_subframe_header(dest, 0x00, self.wasted_bits())?;
        dest.write_twoc(self.dc_offset(), self.bits_per_sample())
            .map_err(OutputError::<S>::from_sink)
    }
}

impl BitRepr for Verbatim {
    #[inline]
    fn count_bits(&self) -> usize {
        Self::count_bits_from_metadata(
            self.samples().len(),
            self.bits_per_sample(),
            self.wasted_bits(),
        )
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        write_subframe_header(dest, 0x01, self.wasted_bits())?;
        for v in self.samples() {
            dest.write_twoc(*v, self.bits_per_sample())
                .map_err(OutputError::<S>::from_sink)?;
        }
        Ok(())
    }
}

impl BitRepr for FixedLpc {
    #[inline]
    fn count_bits(&self) -> usize {
        8 + self.wasted_bits() + self.bits_per_sample() * self.order() + self.residual().bits()
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        write_subframe_header(dest, 0x08 | self.order() as u8, self.wasted_bits())?;
        for v in self.warm_up() {
            dest.write_twoc(*v, self.bits_per_sample())
                .map_err(OutputError::<S>::from_sink)?;
        }
        self.residual().write(dest)
    }
}

impl BitRepr for Lpc {
    #[inline]
    fn count_bits(&self) -> usize {
        let warm_up_bits = self.bits_per_sample() * self.order();
        8 + self.wasted_bits()
            + warm_up_bits
            + 4
            + 5
            + self.parameters().precision() * self.order()
            + self.residual().bits()
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        let params = self.parameters();
        if params.precision() == 0 || params.precision() > 15 {
            return Err(RangeError::from_display(
                "precision",
                "must be in 1..=15",
                &params.precision(),
            )
            .into());
        }
        write_subframe_header(dest, 0x20 | (self.order() - 1) as u8, self.wasted_bits())?;
        for v in self.warm_up() {
            dest.write_twoc(*v, self.bits_per_sample())
                .map_err(OutputError::<S>::from_sink)?;
        }
        dest.write_lsbs((params.precision() - 1) as u8, 4)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write_twoc(params.shift(), 5)
            .map_err(OutputError::<S>::from_sink)?;
        for coef in params.coefs() {
            dest.write_twoc(*coef, params.precision())
                .map_err(OutputError::<S>::from_sink)?;
        }
        self.residual().write(dest)
    }
}

impl BitRepr for Residual {
    #[inline]
    fn count_bits(&self) -> usize {
        self.bits()
    }

    /// Writes `Residual` to the [`BitSink`].
    ///
    /// This is the most inner-loop of the output part of the encoder.
    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        let method = self.method();
        dest.write_lsbs(method.tag(), 2)
            .map_err(OutputError::<S>::from_sink)?;
        dest.write_lsbs(self.partition_order() as u8, 4)
            .map_err(OutputError::<S>::from_sink)?;
        let param_bits = method.parameter_bits();
        let values = self.residuals();
        for (p, param) in method.contents().parameters().iter().enumerate() {
            let part = &values[self.partition_range(p)];
            match *param {
                PartitionParameter::Rice(k) => {
                    dest.write_lsbs(k, param_bits)
                        .map_err(OutputError::<S>::from_sink)?;
                    let k = k as usize;
                    for v in part {
                        dest.write_rice(*v, k)
                            .map_err(OutputError::<S>::from_sink)?;
                    }
                }
                PartitionParameter::Escaped(w) => {
                    dest.write_lsbs(method.escape_code(), param_bits)
                        .map_err(OutputError::<S>::from_sink)?;
                    dest.write_lsbs(w, 5)
                        .map_err(OutputError::<S>::from_sink)?;
                    for v in part {
                        dest.write_twoc(*v, w as usize)
                            .map_err(OutputError::<S>::from_sink)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::BlockSizeSpec;
    use crate::component::CueSheetIndex;
    use crate::component::EntropyCodingMethod;
    use crate::component::FrameOffset;
    use crate::component::SampleRateSpec;
    use crate::component::SampleSizeSpec;
    use crate::component::SeekPoint;

    #[test]
    fn write_stream_info() {
        let mut stream_info = StreamInfo::new(44100, 2, 16).unwrap();
        stream_info.total_samples = 0xA_0000_0001;
        let bytes = stream_info.to_bytes();
        assert_eq!(bytes.len() * 8, 16 + 16 + 24 + 24 + 20 + 3 + 5 + 36 + 128);
        assert_eq!(stream_info.count_bits(), bytes.len() * 8);
        // 44100 = 0x0AC44 in 20 bits, then (2 - 1) in 3 bits, (16 - 1) in 5 bits.
        assert_eq!(&bytes[10..14], &[0x0A, 0xC4, 0x42, 0xFA]);
        assert_eq!(&bytes[14..18], &[0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn write_metadata_block_header() {
        let block = MetadataBlock::new(true, MetadataBlockData::Padding(3));
        assert_eq!(block.to_bytes(), vec![0x81, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00]);
        block.verify_bit_counter().unwrap();
    }

    #[test]
    fn write_frame_header() {
        let header = FrameHeader::from_specs(
            BlockSizeSpec::from_size(192),
            ChannelAssignment::Independent(2),
            SampleSizeSpec::Unspecified,
            SampleRateSpec::Unspecified,
            FrameOffset::Frame(0),
        );
        header
            .verify_bit_counter()
            .expect("`FrameHeader::count_bits` should be accurate.");
        let bytes = header.to_bytes();
        assert_eq!(&bytes[..5], &[0xFF, 0xF8, 0x10, 0x10, 0x00]);
        assert_eq!(bytes[5], HEADER_CRC.checksum(&bytes[..5]));
        assert_eq!(header.count_bits(), 48);

        let header = FrameHeader::from_specs(
            BlockSizeSpec::from_size(1000),
            ChannelAssignment::MidSide,
            SampleSizeSpec::B24,
            SampleRateSpec::from_freq(22_000),
            FrameOffset::StartSample(0xF_FFFF_FFFF),
        );
        header
            .verify_bit_counter()
            .expect("`FrameHeader::count_bits` should be accurate.");
        assert_eq!(header.count_bits(), 40 + 7 * 8 + 16 + 8);
    }

    #[test]
    fn channel_assignment_encoding() {
        let ch = ChannelAssignment::Independent(8);
        assert_eq!(ch.to_bitstring(), "0111****");
        let ch = ChannelAssignment::RightSide;
        assert_eq!(ch.to_bitstring(), "1001****");
        ch.verify_bit_counter()
            .expect("`ChanneAssignment::count_bits` should be accurate.");
        let mut sink = ByteSink::new();
        assert!(ChannelAssignment::Independent(9).write(&mut sink).is_err());
    }

    #[test]
    fn wasted_bits_are_unary_coded() {
        let sub = Constant::new(16, -1, 13, 3).unwrap();
        assert_eq!(sub.to_bitstring(), "00000001_00111111_11111111");
        sub.verify_bit_counter().unwrap();
    }

    #[test]
    fn escaped_partition_layout() {
        let method = EntropyCodingMethod::rice(0, vec![PartitionParameter::Escaped(3)]);
        let residual = Residual::new(method, 3, 1, &[-4, 3]).unwrap();
        // method, order, escape code, width 3, then -4 and 3 in three bits.
        assert_eq!(residual.to_bitstring(), "00000011_11000111_00011***");
        residual.verify_bit_counter().unwrap();
    }

    #[test]
    fn rice2_parameters_take_five_bits() {
        let method = EntropyCodingMethod::rice2(0, vec![PartitionParameter::Rice(17)]);
        let residual = Residual::new(method, 2, 1, &[1]).unwrap();
        residual.verify_bit_counter().unwrap();
        assert_eq!(residual.count_bits(), 2 + 4 + 5 + 18);
        assert_eq!(residual.to_bitstring().get(..11), Some("01000010_00"));
    }

    #[test]
    fn write_verbatim_frame() {
        let header =
            FrameHeader::new(17, ChannelAssignment::Independent(3), 16, 16000, FrameOffset::Frame(3))
                .unwrap();
        let subframes = (0..3).map(|ch| {
            SubFrame::from(Verbatim::from_samples(&[-(ch as i32); 17], 16, 0))
        });
        let frame = Frame::new(header, subframes).unwrap();
        for ch in 0..3 {
            frame
                .subframe(ch)
                .unwrap()
                .verify_bit_counter()
                .expect("`SubFrame::count_bits` should be accurate.");
        }
        frame
            .verify_bit_counter()
            .expect("`Frame::count_bits` should be accurate.");
        let bytes = frame.to_bytes();
        let n = bytes.len();
        assert_eq!(
            u16::from_be_bytes([bytes[n - 2], bytes[n - 1]]),
            FRAME_CRC.checksum(&bytes[..n - 2])
        );
    }

    #[test]
    fn metadata_body_lengths() {
        let blocks: Vec<MetadataBlockData> = vec![
            SeekTable {
                points: vec![SeekPoint::new(0, 0, 4096), SeekPoint::placeholder()],
            }
            .into(),
            VorbisComment {
                vendor: b"ref".to_vec(),
                comments: vec![b"A=b".to_vec()],
            }
            .into(),
            CueSheet {
                media_catalog_number: b"1234567890123".to_vec(),
                lead_in: 88200,
                is_cd: true,
                tracks: vec![CueSheetTrack {
                    offset: 0,
                    number: 1,
                    isrc: [0; 12],
                    is_audio: true,
                    pre_emphasis: false,
                    indices: vec![CueSheetIndex {
                        offset: 0,
                        number: 1,
                    }],
                }],
            }
            .into(),
            Picture {
                picture_type: 3,
                mime_type: b"image/png".to_vec(),
                description: vec![],
                width: 1,
                height: 1,
                depth: 24,
                colors: 0,
                data: vec![1, 2, 3],
            }
            .into(),
            Application {
                id: *b"test",
                data: vec![9; 5],
            }
            .into(),
        ];
        let expected_lengths = [36, 4 + 3 + 4 + 4 + 3, 396 + 36 + 12, 32 + 9 + 3, 9];
        for (block, len) in blocks.iter().zip(expected_lengths) {
            let block = MetadataBlock::new(false, block.clone());
            let bytes = block.to_bytes();
            assert_eq!(bytes.len(), 4 + len);
            assert_eq!(u32::from_be_bytes([0, bytes[1], bytes[2], bytes[3]]) as usize, len);
        }
        // little-endian vorbis lengths.
        let bytes = MetadataBlock::new(true, blocks[1].clone()).to_bytes();
        assert_eq!(&bytes[4..11], &[3, 0, 0, 0, b'r', b'e', b'f']);
    }
}
