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

//! Streaming FLAC encoder.
//!
//! [`StreamEncoder`] validates its settings and the user metadata at
//! [`StreamEncoder::init`], writes the stream header right away, and emits a
//! frame whenever a block of samples is complete. STREAMINFO fields that are
//! only known at the end (MD5, frame size range, total samples) and the
//! SEEKTABLE offsets are rewritten by [`StreamEncoder::finish`] if the output
//! can seek.
//!
//! # Examples
//!
//! ```
//! # use flacodec::*;
//! # use flacodec::encoder::StreamEncoder;
//! let config = config::Encoder {
//!     channels: 1,
//!     ..config::Encoder::default()
//! };
//! let sink = io::SeekableIo::new(std::io::Cursor::new(vec![]));
//! let mut encoder = StreamEncoder::init(config, vec![], sink).expect("init failed");
//! let signal: Vec<i32> = (0..10000).map(|t| (t % 100) * 20 - 1000).collect();
//! encoder.process(&[&signal]).expect("encoding failed");
//! let (summary, sink) = encoder.finish().expect("finish failed");
//! assert_eq!(summary.stream_info.total_samples, 10000);
//! assert!(summary.stream_info.has_md5());
//! assert_eq!(&sink.into_inner().into_inner()[..4], b"fLaC");
//! ```

use std::path::Path;

use crate::bitsink::BitSink;
use crate::bitsink::ByteSink;
use crate::coding;
use crate::coding::CodingParams;
use crate::coding::StereoSearch;
use crate::component::BitRepr;
use crate::component::ChannelAssignment;
use crate::component::FrameHeader;
use crate::component::FrameOffset;
use crate::component::MetadataBlock;
use crate::component::MetadataBlockData;
use crate::component::SeekTable;
use crate::component::StreamInfo;
use crate::component::VorbisComment;
use crate::config;
use crate::constant::encoder::LOOSE_MID_SIDE_PERIOD_SECS;
use crate::constant::qlpc::MAX_ORDER as MAX_LPC_ORDER;
use crate::constant::qlpc::MAX_PRECISION as MAX_QLP_COEFF_PRECISION;
use crate::constant::qlpc::MIN_PRECISION as MIN_QLP_COEFF_PRECISION;
use crate::constant::subset;
use crate::constant::MAX_BLOCK_SIZE;
use crate::constant::MAX_CHANNELS;
use crate::constant::MIN_BITS_PER_SAMPLE;
use crate::constant::MIN_BLOCK_SIZE;
use crate::constant::REFERENCE_MAX_BITS_PER_SAMPLE;
use crate::constant::STREAM_SYNC;
use crate::error::EncodeError;
use crate::error::EncoderInitError;
use crate::error::EncoderState;
use crate::error::OutputError;
use crate::error::RangeError;
use crate::error::Verify;
use crate::error::VerifyError;
use crate::format;
use crate::io::IoFault;
use crate::io::Output;
use crate::io::SeekableIo;
use crate::source::FrameBuf;
use crate::source::PcmDigest;

/// Vendor string written to every VORBIS_COMMENT block.
pub const VENDOR_STRING: &str = concat!("flacodec ", env!("CARGO_PKG_VERSION"));

/// Picture type of the 32x32 PNG file icon.
const PICTURE_TYPE_FILE_ICON: u32 = 1;
/// Picture type of other file icons.
const PICTURE_TYPE_OTHER_FILE_ICON: u32 = 2;

/// Stream properties reported by [`StreamEncoder::finish`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodeSummary {
    /// Final STREAMINFO.
    pub stream_info: StreamInfo,
    /// The user SEEKTABLE with offsets filled in, if one was given.
    pub seek_table: Option<SeekTable>,
    /// Number of frames written.
    pub frames: u64,
    /// Number of bytes written including the stream header.
    pub bytes: u64,
    /// `true` if STREAMINFO and SEEKTABLE were rewritten in the output.
    pub metadata_rewritten: bool,
}

fn range_error(e: OutputError<ByteSink>) -> RangeError {
    match e {
        OutputError::Range(e) => e,
        OutputError::Sink(e) => match e {},
    }
}

fn invalid_metadata(index: usize, reason: &str) -> EncoderInitError {
    EncoderInitError::InvalidMetadata(VerifyError::new(&format!("metadata[{index}]"), reason))
}

/// Checks the user metadata blocks.
fn check_metadata(metadata: &[MetadataBlockData]) -> Result<(), EncoderInitError> {
    let mut seek_tables = 0usize;
    let mut vorbis_comments = 0usize;
    let mut file_icons = 0usize;
    let mut other_file_icons = 0usize;
    for (i, block) in metadata.iter().enumerate() {
        block
            .verify()
            .map_err(|e| EncoderInitError::InvalidMetadata(e.within(&format!("metadata[{i}]"))))?;
        match block {
            MetadataBlockData::StreamInfo(_) => {
                return Err(invalid_metadata(i, "STREAMINFO is written by the encoder"));
            }
            MetadataBlockData::SeekTable(_) => {
                seek_tables += 1;
                if seek_tables > 1 {
                    return Err(invalid_metadata(i, "only one SEEKTABLE is allowed"));
                }
            }
            MetadataBlockData::VorbisComment(_) => {
                vorbis_comments += 1;
                if vorbis_comments > 1 {
                    return Err(invalid_metadata(i, "only one VORBIS_COMMENT is allowed"));
                }
            }
            MetadataBlockData::Picture(pic) => {
                if pic.picture_type == PICTURE_TYPE_FILE_ICON {
                    file_icons += 1;
                    let is_link = pic.mime_type == b"-->";
                    let is_png_icon =
                        pic.mime_type == b"image/png" && pic.width == 32 && pic.height == 32;
                    if file_icons > 1 || !(is_link || is_png_icon) {
                        return Err(invalid_metadata(
                            i,
                            "file icon must be a single 32x32 PNG or a link",
                        ));
                    }
                } else if pic.picture_type == PICTURE_TYPE_OTHER_FILE_ICON {
                    other_file_icons += 1;
                    if other_file_icons > 1 {
                        return Err(invalid_metadata(i, "only one other file icon is allowed"));
                    }
                }
            }
            MetadataBlockData::Padding(_)
            | MetadataBlockData::Application(_)
            | MetadataBlockData::CueSheet(_)
            | MetadataBlockData::Unknown { .. } => {}
        }
    }
    Ok(())
}

/// Checks the encoder settings and returns the block size.
fn check_config(config: &config::Encoder) -> Result<usize, EncoderInitError> {
    if !(1..=MAX_CHANNELS).contains(&config.channels) {
        return Err(EncoderInitError::InvalidNumberOfChannels);
    }
    if !(MIN_BITS_PER_SAMPLE..=REFERENCE_MAX_BITS_PER_SAMPLE).contains(&config.bits_per_sample) {
        return Err(EncoderInitError::InvalidBitsPerSample);
    }
    let sample_rate = u32::try_from(config.sample_rate).unwrap_or(u32::MAX);
    if sample_rate == 0 || !format::sample_rate_is_valid(sample_rate) {
        return Err(EncoderInitError::InvalidSampleRate);
    }
    let block_size = config.effective_block_size();
    if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size) {
        return Err(EncoderInitError::InvalidBlockSize);
    }
    if config.max_lpc_order > MAX_LPC_ORDER {
        return Err(EncoderInitError::InvalidMaxLpcOrder);
    }
    if block_size < config.max_lpc_order {
        return Err(EncoderInitError::BlockSizeTooSmallForLpcOrder);
    }
    if config.qlp_coeff_precision != 0
        && !(MIN_QLP_COEFF_PRECISION..=MAX_QLP_COEFF_PRECISION).contains(&config.qlp_coeff_precision)
    {
        return Err(EncoderInitError::InvalidQlpCoeffPrecision);
    }
    if config.streamable_subset {
        let (_, max_partition_order) = config.effective_partition_orders();
        let low_rate = sample_rate <= 48000;
        if !format::sample_rate_is_subset(sample_rate)
            || ![8, 12, 16, 20, 24].contains(&config.bits_per_sample)
            || !format::blocksize_is_subset(block_size, sample_rate)
            || (low_rate
                && (block_size > subset::MAX_BLOCK_SIZE_48000HZ
                    || config.max_lpc_order > subset::MAX_LPC_ORDER_48000HZ))
            || max_partition_order > subset::MAX_RICE_PARTITION_ORDER
        {
            return Err(EncoderInitError::NotStreamable);
        }
    }
    config.verify().map_err(EncoderInitError::InvalidSettings)?;
    Ok(block_size)
}

/// Block-buffering FLAC stream encoder.
pub struct StreamEncoder<O> {
    output: O,
    config: config::Encoder,
    params: CodingParams,
    state: EncoderState,
    block_size: usize,
    stream_info: StreamInfo,
    seek_table: Option<SeekTable>,
    next_seek_point: usize,
    /// Output position of `fLaC`; `None` if the output can't tell.
    stream_start: Option<u64>,
    /// Offset of the SEEKTABLE block header from `fLaC`.
    seek_table_offset: Option<u64>,
    first_frame_offset: u64,
    bytes_written: u64,
    framebuf: FrameBuf,
    digest: PcmDigest,
    sink: ByteSink,
    frame_number: u32,
    samples_written: u64,
    loose_mid_side_period: usize,
    frames_since_stereo_search: usize,
    last_assignment: Option<ChannelAssignment>,
}

/// Creates a file and starts an encoder writing to it.
///
/// # Errors
///
/// Returns [`EncoderInitError::ErrorOpeningFile`] if the file cannot be
/// created, otherwise the same errors as [`StreamEncoder::init`].
pub fn create_file<P: AsRef<Path>>(
    path: P,
    config: config::Encoder,
    metadata: Vec<MetadataBlockData>,
) -> Result<StreamEncoder<SeekableIo<std::fs::File>>, EncoderInitError> {
    let output = SeekableIo::create(path.as_ref())
        .map_err(|e| EncoderInitError::ErrorOpeningFile(e.to_string()))?;
    StreamEncoder::init(config, metadata, output)
}

impl<O: Output> StreamEncoder<O> {
    /// Validates the settings and writes the stream header to `output`.
    ///
    /// Every VORBIS_COMMENT gets [`VENDOR_STRING`] as its vendor, and an empty
    /// one is inserted first if `metadata` has none.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first violated rule, or
    /// [`EncoderInitError::Io`] if writing the header failed.
    pub fn init(
        config: config::Encoder,
        metadata: Vec<MetadataBlockData>,
        mut output: O,
    ) -> Result<Self, EncoderInitError> {
        let block_size = check_config(&config)?;
        check_metadata(&metadata)?;

        let mut metadata = metadata;
        if !metadata
            .iter()
            .any(|b| matches!(b, MetadataBlockData::VorbisComment(_)))
        {
            metadata.insert(0, VorbisComment::default().into());
        }
        let mut seek_table = None;
        for block in &mut metadata {
            match block {
                MetadataBlockData::VorbisComment(vc) => {
                    vc.vendor = VENDOR_STRING.as_bytes().to_vec();
                }
                MetadataBlockData::SeekTable(table) => {
                    seek_table = Some(table.clone());
                }
                MetadataBlockData::StreamInfo(_)
                | MetadataBlockData::Padding(_)
                | MetadataBlockData::Application(_)
                | MetadataBlockData::CueSheet(_)
                | MetadataBlockData::Picture(_)
                | MetadataBlockData::Unknown { .. } => {}
            }
        }

        let mut stream_info =
            StreamInfo::new(config.sample_rate, config.channels, config.bits_per_sample)
                .map_err(EncoderInitError::InvalidSettings)?;
        stream_info.min_block_size = block_size as u16;
        stream_info.max_block_size = block_size as u16;
        stream_info.total_samples = config.total_samples_estimate;

        let stream_start = output.tell().ok();
        let mut sink = ByteSink::new();
        sink.write_bytes_aligned(&STREAM_SYNC)
            .unwrap_or_else(|e| match e {});
        MetadataBlock::new(false, stream_info.clone().into())
            .write(&mut sink)
            .map_err(|e| {
                EncoderInitError::InvalidSettings(VerifyError::new(
                    "stream_info",
                    &range_error(e).to_string(),
                ))
            })?;
        let mut seek_table_offset = None;
        let count = metadata.len();
        for (i, data) in metadata.into_iter().enumerate() {
            if matches!(data, MetadataBlockData::SeekTable(_)) {
                seek_table_offset = Some(sink.byte_len() as u64);
            }
            MetadataBlock::new(i + 1 == count, data)
                .write(&mut sink)
                .map_err(|e| {
                    EncoderInitError::InvalidMetadata(VerifyError::new(
                        &format!("metadata[{i}]"),
                        &range_error(e).to_string(),
                    ))
                })?;
        }
        output.write(sink.as_slice()).map_err(EncoderInitError::Io)?;
        let first_frame_offset = sink.byte_len() as u64;

        let sample_rate = config.sample_rate as f64;
        let loose_mid_side_period =
            ((LOOSE_MID_SIDE_PERIOD_SECS * sample_rate / block_size as f64) + 0.5) as usize;

        log::info!(
            target: "flacodec::encoder",
            "encoding {}ch {}bit {}Hz, block size {}",
            config.channels,
            config.bits_per_sample,
            config.sample_rate,
            block_size
        );

        Ok(Self {
            output,
            params: CodingParams::from_config(&config),
            framebuf: FrameBuf::with_size(config.channels, block_size + 1),
            digest: PcmDigest::new(config.bits_per_sample),
            config,
            state: EncoderState::Ok,
            block_size,
            stream_info,
            seek_table,
            next_seek_point: 0,
            stream_start,
            seek_table_offset,
            first_frame_offset,
            bytes_written: first_frame_offset,
            sink,
            frame_number: 0,
            samples_written: 0,
            loose_mid_side_period: loose_mid_side_period.max(1),
            frames_since_stereo_search: 0,
            last_assignment: None,
        })
    }

    /// Returns the current state.
    pub const fn state(&self) -> EncoderState {
        self.state
    }

    /// Returns STREAMINFO as known so far.
    pub const fn stream_info(&self) -> &StreamInfo {
        &self.stream_info
    }

    /// Returns the settings.
    pub const fn config(&self) -> &config::Encoder {
        &self.config
    }

    /// Returns a reference to the output.
    pub const fn output(&self) -> &O {
        &self.output
    }

    /// Returns the block size in use.
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    fn check_state(&self) -> Result<(), EncodeError> {
        if self.state == EncoderState::Ok {
            Ok(())
        } else {
            Err(EncodeError::Terminated(self.state))
        }
    }

    fn check_range<'a, T: IntoIterator<Item = &'a i32>>(&self, samples: T) -> Result<(), EncodeError> {
        let bits = self.config.bits_per_sample;
        let max = (1i32 << (bits - 1)) - 1;
        let min = -(1i32 << (bits - 1));
        for &v in samples {
            if v < min || v > max {
                return Err(EncodeError::InvalidInput(RangeError::from_display(
                    "sample",
                    &format!("must be in {min}..={max}"),
                    &v,
                )));
            }
        }
        Ok(())
    }

    /// Feeds per-channel samples.
    ///
    /// All slices must have the same length.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::InvalidInput`] if the channel layout or a
    /// sample value doesn't match the settings, and an I/O or framing error
    /// if writing a frame failed.
    pub fn process(&mut self, channels: &[&[i32]]) -> Result<(), EncodeError> {
        self.check_state()?;
        if channels.len() != self.config.channels {
            return Err(EncodeError::InvalidInput(RangeError::from_display(
                "channels",
                &format!("must have {} channels", self.config.channels),
                &channels.len(),
            )));
        }
        let len = channels.first().map_or(0, |c| c.len());
        if channels.iter().any(|c| c.len() != len) {
            return Err(EncodeError::InvalidInput(RangeError::from_display(
                "channels",
                "must have the same length",
                &len,
            )));
        }
        for ch in channels {
            self.check_range(ch.iter())?;
        }
        self.digest.update_channels(channels, len);

        let mut offset = 0;
        while offset < len {
            offset += self.framebuf.push_channels(channels, offset);
            self.drain_full_block()?;
        }
        Ok(())
    }

    /// Feeds interleaved samples.
    ///
    /// # Errors
    ///
    /// Same as [`Self::process`]; the length must be a multiple of the
    /// number of channels.
    pub fn process_interleaved(&mut self, interleaved: &[i32]) -> Result<(), EncodeError> {
        self.check_state()?;
        let channels = self.config.channels;
        if interleaved.len() % channels != 0 {
            return Err(EncodeError::InvalidInput(RangeError::from_display(
                "interleaved",
                &format!("length must be a multiple of {channels}"),
                &interleaved.len(),
            )));
        }
        self.check_range(interleaved)?;
        self.digest.update_interleaved(interleaved);

        let mut offset = 0;
        while offset < interleaved.len() {
            offset += self.framebuf.push_interleaved(&interleaved[offset..]) * channels;
            self.drain_full_block()?;
        }
        Ok(())
    }

    /// Encodes a block once one sample past it has arrived.
    fn drain_full_block(&mut self) -> Result<(), EncodeError> {
        if self.framebuf.is_full() {
            self.encode_block(self.block_size)?;
            self.framebuf.consume(self.block_size);
        }
        Ok(())
    }

    fn stereo_search(&self) -> StereoSearch {
        if self.config.channels != 2 || !self.config.mid_side {
            return StereoSearch::Independent;
        }
        match self.last_assignment {
            Some(ca)
                if self.config.loose_mid_side
                    && self.frames_since_stereo_search < self.loose_mid_side_period =>
            {
                StereoSearch::Fixed(ca)
            }
            Some(_) | None => StereoSearch::Exhaustive,
        }
    }

    fn fail(&mut self, err: EncodeError) -> EncodeError {
        self.state = match err {
            EncodeError::Io(_) => EncoderState::IoError,
            EncodeError::InvalidInput(_) | EncodeError::Framing(_) | EncodeError::Terminated(_) => {
                EncoderState::FramingError
            }
        };
        log::warn!(target: "flacodec::encoder", "encoder failed: {err}");
        err
    }

    fn encode_block(&mut self, block_size: usize) -> Result<(), EncodeError> {
        let header = FrameHeader::new(
            block_size,
            ChannelAssignment::Independent(self.config.channels as u8),
            self.config.bits_per_sample,
            self.config.sample_rate,
            FrameOffset::Frame(self.frame_number),
        )
        .map_err(|e| {
            EncodeError::Framing(RangeError::from_display("frame_header", e.reason(), &block_size))
        })
        .map_err(|e| self.fail(e))?;
        let search = self.stereo_search();

        let frame = {
            let channels: heapless::Vec<&[i32], MAX_CHANNELS> = (0..self.config.channels)
                .map(|ch| &self.framebuf.channel_slice(ch)[..block_size])
                .collect();
            coding::encode_frame(
                &self.params,
                header,
                &channels,
                self.config.bits_per_sample,
                search,
            )
        };
        match search {
            StereoSearch::Exhaustive => {
                self.last_assignment = Some(*frame.header().channel_assignment());
                self.frames_since_stereo_search = 1;
            }
            StereoSearch::Fixed(_) => self.frames_since_stereo_search += 1,
            StereoSearch::Independent => {}
        }

        self.sink.clear();
        frame
            .write(&mut self.sink)
            .map_err(|e| EncodeError::Framing(range_error(e)))
            .map_err(|e| self.fail(e))?;

        self.record_seek_points(block_size as u64);
        let frame_bytes = self.sink.byte_len();
        self.output
            .write(self.sink.as_slice())
            .map_err(|e| self.fail(e.into()))?;

        log::debug!(
            target: "flacodec::encoder",
            "frame {} with {} samples in {} bytes",
            self.frame_number,
            block_size,
            frame_bytes
        );
        self.stream_info.update_frame_size(frame_bytes);
        self.bytes_written += frame_bytes as u64;
        self.samples_written += block_size as u64;
        self.frame_number += 1;
        Ok(())
    }

    /// Fills the seek points that fall into the frame about to be written.
    fn record_seek_points(&mut self, block_size: u64) {
        let Some(table) = self.seek_table.as_mut() else {
            return;
        };
        let first = self.samples_written;
        let last = first + block_size - 1;
        let offset = self.bytes_written - self.first_frame_offset;
        while let Some(point) = table.points.get_mut(self.next_seek_point) {
            if point.sample_number > last {
                break;
            }
            if point.sample_number >= first {
                point.sample_number = first;
                point.stream_offset = offset;
                point.frame_samples = block_size as u16;
            }
            self.next_seek_point += 1;
        }
    }

    /// Rewrites STREAMINFO and SEEKTABLE in place.
    ///
    /// Returns `false` if the output can't seek.
    fn rewrite_metadata(&mut self) -> Result<bool, EncodeError> {
        let Some(stream_start) = self.stream_start else {
            return Ok(false);
        };
        let end = match self.output.tell() {
            Ok(pos) => pos,
            Err(IoFault::Unsupported) => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let header_len = (STREAM_SYNC.len() + crate::constant::metadata::BLOCK_HEADER_LEN) as u64;
        let mut sink = ByteSink::new();
        self.stream_info
            .write(&mut sink)
            .map_err(|e| EncodeError::Framing(range_error(e)))?;
        match self.output.seek(stream_start + header_len) {
            Ok(()) => {}
            Err(IoFault::Unsupported) => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        self.output.write(sink.as_slice())?;

        if let (Some(table), Some(offset)) = (self.seek_table.as_mut(), self.seek_table_offset) {
            format::seektable_sort(table);
            let body = MetadataBlockData::SeekTable(table.clone());
            sink.clear();
            body.write(&mut sink)
                .map_err(|e| EncodeError::Framing(range_error(e)))?;
            self.output.seek(
                stream_start + offset + crate::constant::metadata::BLOCK_HEADER_LEN as u64,
            )?;
            self.output.write(sink.as_slice())?;
        }
        self.output.seek(end)?;
        Ok(true)
    }

    /// Encodes the buffered samples, finalizes STREAMINFO, and returns the
    /// summary with the output.
    ///
    /// Metadata blocks are taken by value in [`StreamEncoder::init`], so a
    /// SEEKTABLE given there is never updated in place. The table with its
    /// sample numbers and offsets filled in is returned as
    /// [`EncodeSummary::seek_table`], and is also what the output holds when
    /// `metadata_rewritten` is `true`.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::Terminated`] if the encoder already failed, or
    /// the error from writing the last frame or the metadata.
    pub fn finish(mut self) -> Result<(EncodeSummary, O), EncodeError> {
        self.check_state()?;
        let remaining = self.framebuf.filled();
        if remaining > 0 {
            self.encode_block(remaining)?;
            self.framebuf.clear();
        }
        self.stream_info.total_samples = self.samples_written;
        self.stream_info.md5 = self.digest.clone().finalize();

        let metadata_rewritten = self.rewrite_metadata().map_err(|e| self.fail(e))?;
        if !metadata_rewritten {
            log::debug!(target: "flacodec::encoder", "output is not seekable, STREAMINFO kept");
        }
        log::info!(
            target: "flacodec::encoder",
            "encoded {} samples in {} frames, {} bytes",
            self.samples_written,
            self.frame_number,
            self.bytes_written
        );
        let summary = EncodeSummary {
            stream_info: self.stream_info,
            seek_table: self.seek_table,
            frames: u64::from(self.frame_number),
            bytes: self.bytes_written,
            metadata_rewritten,
        };
        Ok((summary, self.output))
    }
}
