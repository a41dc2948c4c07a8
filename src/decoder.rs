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

//! Streaming FLAC decoder.
//!
//! [`StreamDecoder`] pulls bytes from an [`Input`] and pushes decoded
//! metadata, frames, and recoverable faults to a [`Handler`]. Processing is
//! driven by the caller, one metadata block or frame at a time, or up to the
//! end of the metadata or the stream.
//!
//! # Examples
//!
//! ```
//! # use flacodec::*;
//! # use flacodec::decoder::{Collector, StreamDecoder};
//! # let sink = io::SeekableIo::new(std::io::Cursor::new(vec![]));
//! # let mut encoder = encoder::StreamEncoder::init(config::Encoder::default(), vec![], sink).unwrap();
//! # encoder.process_interleaved(&[0i32; 512]).unwrap();
//! # let bytes = encoder.finish().unwrap().1.into_inner().into_inner();
//! let input = io::SeekableIo::new(std::io::Cursor::new(bytes));
//! let mut decoder =
//!     StreamDecoder::init(config::Decoder::default(), input, Collector::default())
//!         .expect("decoder init failed");
//! decoder.process_until_end_of_stream().expect("decoding failed");
//! assert_eq!(decoder.state(), error::DecoderState::EndOfStream);
//! let finished = decoder.finish();
//! assert!(finished.md5_matched);
//! assert!(!finished.handler.samples.is_empty());
//! ```

pub mod frame;
pub mod seek;

use std::path::Path;

use nom::IResult;

use crate::bitsource::BitSource;
use crate::bitsource::ReadFault;
use crate::component::parser;
use crate::component::Application;
use crate::component::BlockType;
use crate::component::ChannelAssignment;
use crate::component::FrameOffset;
use crate::component::MetadataBlock;
use crate::component::MetadataBlockData;
use crate::component::SeekTable;
use crate::component::StreamInfo;
use crate::config;
use crate::constant::decoder::MAX_UNPARSEABLE_WHILE_SEEKING;
use crate::constant::MAX_CHANNELS;
use crate::constant::STREAM_SYNC;
use crate::error::DecodeErrorStatus;
use crate::error::DecoderError;
use crate::error::DecoderInitError;
use crate::error::DecoderState;
use crate::error::Verify;
use crate::io::Input;
use crate::io::IoFault;
use crate::io::SeekableIo;
use crate::source::PcmDigest;

use frame::FrameFault;
use seek::Bisection;
use seek::FrameSpan;

const ID3V2_TAG: [u8; 3] = *b"ID3";

type ParseResult<'a, T> = IResult<&'a [u8], T, nom::error::Error<&'a [u8]>>;

/// Verdict of [`Handler::on_frame`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum WriteStatus {
    /// Keep decoding.
    Continue,
    /// Stop decoding; the decoder moves to [`DecoderState::Aborted`].
    Abort,
}

/// Properties of a decoded frame.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct FrameInfo {
    /// Number of samples per channel delivered with this frame.
    pub block_size: usize,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels.
    pub channels: usize,
    /// Stereo decorrelation used in the frame.
    pub channel_assignment: ChannelAssignment,
    /// Sample width of the output in bits.
    pub bits_per_sample: usize,
    /// Sample number of the first delivered sample.
    pub first_sample: u64,
}

impl FrameInfo {
    const fn span(&self) -> FrameSpan {
        FrameSpan {
            first_sample: self.first_sample,
            block_size: self.block_size as u64,
        }
    }
}

/// Receiver of decoder outputs.
pub trait Handler {
    /// Called for each metadata block selected by [`config::MetadataFilter`].
    fn on_metadata(&mut self, _block: &MetadataBlock) {}

    /// Called for each decoded frame with one slice per channel.
    fn on_frame(&mut self, info: &FrameInfo, channels: &[&[i32]]) -> WriteStatus;

    /// Called for each recoverable fault.
    fn on_error(&mut self, _status: DecodeErrorStatus) {}
}

impl<H: Handler + ?Sized> Handler for &mut H {
    fn on_metadata(&mut self, block: &MetadataBlock) {
        (**self).on_metadata(block);
    }

    fn on_frame(&mut self, info: &FrameInfo, channels: &[&[i32]]) -> WriteStatus {
        (**self).on_frame(info, channels)
    }

    fn on_error(&mut self, status: DecodeErrorStatus) {
        (**self).on_error(status);
    }
}

/// [`Handler`] that keeps everything in memory.
#[derive(Clone, Debug, Default)]
pub struct Collector {
    /// Reported metadata blocks.
    pub metadata: Vec<MetadataBlock>,
    /// Properties of the delivered frames.
    pub frames: Vec<FrameInfo>,
    /// Decoded samples per channel.
    pub samples: Vec<Vec<i32>>,
    /// Reported faults.
    pub errors: Vec<DecodeErrorStatus>,
}

impl Collector {
    /// Returns the decoded samples in interleaved order.
    pub fn interleaved(&self) -> Vec<i32> {
        let len = self.samples.first().map_or(0, Vec::len);
        let mut ret = Vec::with_capacity(len * self.samples.len());
        for t in 0..len {
            for ch in &self.samples {
                ret.push(ch[t]);
            }
        }
        ret
    }
}

impl Handler for Collector {
    fn on_metadata(&mut self, block: &MetadataBlock) {
        self.metadata.push(block.clone());
    }

    fn on_frame(&mut self, info: &FrameInfo, channels: &[&[i32]]) -> WriteStatus {
        if self.samples.len() < channels.len() {
            self.samples.resize_with(channels.len(), Vec::new);
        }
        for (dest, src) in self.samples.iter_mut().zip(channels) {
            dest.extend_from_slice(src);
        }
        self.frames.push(*info);
        WriteStatus::Continue
    }

    fn on_error(&mut self, status: DecodeErrorStatus) {
        self.errors.push(status);
    }
}

/// Result of [`StreamDecoder::finish`].
#[derive(Debug)]
pub struct Finished<I, H> {
    /// `false` only if MD5 checking was active and the digest didn't match.
    pub md5_matched: bool,
    /// The input.
    pub input: I,
    /// The handler.
    pub handler: H,
}

/// Pull-based FLAC stream decoder.
pub struct StreamDecoder<I, H> {
    src: BitSource<I>,
    handler: H,
    config: config::Decoder,
    state: DecoderState,
    lookahead: Option<u8>,
    header_warmup: [u8; 2],
    stream_info: Option<StreamInfo>,
    seek_table: Option<SeekTable>,
    md5_checking: bool,
    digest: Option<PcmDigest>,
    fixed_block_size: usize,
    next_fixed_block_size: usize,
    samples_decoded: u64,
    first_frame_offset: u64,
    frame_start: Option<u64>,
    last_frame: Option<FrameInfo>,
    last_frame_end: Option<u64>,
    samples: Vec<Vec<i64>>,
    output: Vec<Vec<i32>>,
    seek_target: Option<u64>,
    seek_hit: bool,
    trim_until: Option<u64>,
    unparseable_while_seeking: u32,
}

/// Opens a file and starts a decoder reading from it.
///
/// # Errors
///
/// Returns [`DecoderInitError::ErrorOpeningFile`] if the file cannot be
/// opened, and [`DecoderInitError::InvalidSettings`] for bad settings.
pub fn open_file<P: AsRef<Path>, H: Handler>(
    path: P,
    config: config::Decoder,
    handler: H,
) -> Result<StreamDecoder<SeekableIo<std::fs::File>, H>, DecoderInitError> {
    let input = SeekableIo::open(path.as_ref())
        .map_err(|e| DecoderInitError::ErrorOpeningFile(e.to_string()))?;
    StreamDecoder::init(config, input, handler)
}

impl<I: Input, H: Handler> StreamDecoder<I, H> {
    /// Constructs a decoder positioned at the start of `input`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails to verify.
    pub fn init(config: config::Decoder, input: I, handler: H) -> Result<Self, DecoderInitError> {
        config.verify()?;
        Ok(Self {
            src: BitSource::new(input),
            handler,
            md5_checking: config.md5_checking,
            config,
            state: DecoderState::SearchForMetadata,
            lookahead: None,
            header_warmup: [0u8; 2],
            stream_info: None,
            seek_table: None,
            digest: None,
            fixed_block_size: 0,
            next_fixed_block_size: 0,
            samples_decoded: 0,
            first_frame_offset: 0,
            frame_start: None,
            last_frame: None,
            last_frame_end: None,
            samples: vec![],
            output: vec![],
            seek_target: None,
            seek_hit: false,
            trim_until: None,
            unparseable_while_seeking: 0,
        })
    }

    /// Returns the current state.
    pub const fn state(&self) -> DecoderState {
        self.state
    }

    /// Returns STREAMINFO once it has been read.
    pub const fn stream_info(&self) -> Option<&StreamInfo> {
        self.stream_info.as_ref()
    }

    /// Returns SEEKTABLE if the stream has one and it has been read.
    pub const fn seek_table(&self) -> Option<&SeekTable> {
        self.seek_table.as_ref()
    }

    /// Returns `true` if decoded samples are still being checked against MD5.
    pub const fn md5_checking(&self) -> bool {
        self.md5_checking
    }

    /// Returns the total number of samples from STREAMINFO; zero if unknown.
    pub fn total_samples(&self) -> u64 {
        self.stream_info.as_ref().map_or(0, |i| i.total_samples)
    }

    /// Returns the properties of the most recently decoded frame.
    pub const fn frame_info(&self) -> Option<&FrameInfo> {
        self.last_frame.as_ref()
    }

    /// Number of channels of the most recently decoded frame.
    pub fn channels(&self) -> usize {
        self.last_frame.map_or(0, |f| f.channels)
    }

    /// Channel assignment of the most recently decoded frame.
    pub fn channel_assignment(&self) -> Option<ChannelAssignment> {
        self.last_frame.map(|f| f.channel_assignment)
    }

    /// Sample width of the most recently decoded frame.
    pub fn bits_per_sample(&self) -> usize {
        self.last_frame.map_or(0, |f| f.bits_per_sample)
    }

    /// Sample rate of the most recently decoded frame.
    pub fn sample_rate(&self) -> u32 {
        self.last_frame.map_or(0, |f| f.sample_rate)
    }

    /// Block size of the most recently decoded frame.
    pub fn block_size(&self) -> usize {
        self.last_frame.map_or(0, |f| f.block_size)
    }

    /// Returns a reference to the handler.
    pub const fn handler(&self) -> &H {
        &self.handler
    }

    /// Returns a mutable reference to the handler.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Returns the byte offset of the next unread byte in the input.
    ///
    /// # Errors
    ///
    /// Returns an error if the input can't report its position.
    pub fn decode_position(&mut self) -> Result<u64, IoFault> {
        let pos = self.src.input_mut().tell()?;
        Ok(pos.saturating_sub(self.src.unconsumed_bytes() as u64))
    }

    /// Ends decoding and returns the MD5 verdict with the input and handler.
    pub fn finish(mut self) -> Finished<I, H> {
        let md5_matched = match (self.md5_checking, self.digest.take(), &self.stream_info) {
            (true, Some(digest), Some(info)) => {
                let matched = digest.finalize() == info.md5;
                if !matched {
                    log::warn!(target: "flacodec::decoder", "MD5 mismatch");
                }
                matched
            }
            _ => true,
        };
        Finished {
            md5_matched,
            input: self.src.into_inner(),
            handler: self.handler,
        }
    }

    /// Drops buffered input and expects a frame next.
    ///
    /// The sample counter is cleared and MD5 checking is disabled since the
    /// decoded signal is no longer contiguous.
    pub fn flush(&mut self) {
        self.samples_decoded = 0;
        self.md5_checking = false;
        self.src.clear();
        self.lookahead = None;
        self.last_frame_end = None;
        self.state = DecoderState::SearchForFrameSync;
    }

    /// Rewinds to the start of the stream.
    ///
    /// Inputs that can't seek are assumed to be repositioned by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`DecoderError::SeekFailed`] if rewinding the input failed.
    pub fn reset(&mut self) -> Result<(), DecoderError> {
        self.flush();
        match self.src.input_mut().seek(0) {
            Ok(()) | Err(IoFault::Unsupported) => {}
            Err(IoFault::Error) => return Err(DecoderError::SeekFailed),
        }
        self.state = DecoderState::SearchForMetadata;
        self.stream_info = None;
        self.seek_table = None;
        self.md5_checking = self.config.md5_checking;
        self.digest = None;
        self.fixed_block_size = 0;
        self.next_fixed_block_size = 0;
        self.first_frame_offset = 0;
        self.frame_start = None;
        self.last_frame = None;
        self.seek_target = None;
        self.seek_hit = false;
        self.trim_until = None;
        self.unparseable_while_seeking = 0;
        log::debug!(target: "flacodec::decoder", "reset");
        Ok(())
    }

    fn terminal_result(&self) -> Result<(), DecoderError> {
        match self.state {
            DecoderState::Aborted => Err(DecoderError::Aborted),
            DecoderState::SeekError => Err(DecoderError::SeekFailed),
            DecoderState::MemoryAllocationError => Err(DecoderError::MemoryAllocation),
            DecoderState::SearchForMetadata
            | DecoderState::ReadMetadata
            | DecoderState::SearchForFrameSync
            | DecoderState::ReadFrame
            | DecoderState::EndOfStream => Ok(()),
        }
    }

    /// Decodes one metadata block or one frame.
    ///
    /// Returns without progress at the end of the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding is aborted or the decoder is in a failed
    /// state.
    pub fn process_single(&mut self) -> Result<(), DecoderError> {
        loop {
            match self.state {
                DecoderState::SearchForMetadata => self.find_metadata()?,
                DecoderState::ReadMetadata => return self.read_metadata(),
                DecoderState::SearchForFrameSync => self.frame_sync()?,
                DecoderState::ReadFrame => {
                    if self.read_frame(true)? {
                        return Ok(());
                    }
                }
                DecoderState::EndOfStream
                | DecoderState::SeekError
                | DecoderState::Aborted
                | DecoderState::MemoryAllocationError => return self.terminal_result(),
            }
        }
    }

    /// Reads every metadata block and stops before the first frame.
    ///
    /// # Errors
    ///
    /// Same as [`Self::process_single`].
    pub fn process_until_end_of_metadata(&mut self) -> Result<(), DecoderError> {
        loop {
            match self.state {
                DecoderState::SearchForMetadata => self.find_metadata()?,
                DecoderState::ReadMetadata => self.read_metadata()?,
                DecoderState::SearchForFrameSync
                | DecoderState::ReadFrame
                | DecoderState::EndOfStream
                | DecoderState::SeekError
                | DecoderState::Aborted
                | DecoderState::MemoryAllocationError => return self.terminal_result(),
            }
        }
    }

    /// Decodes everything up to the end of the stream.
    ///
    /// # Errors
    ///
    /// Same as [`Self::process_single`].
    pub fn process_until_end_of_stream(&mut self) -> Result<(), DecoderError> {
        loop {
            match self.state {
                DecoderState::SearchForMetadata => self.find_metadata()?,
                DecoderState::ReadMetadata => self.read_metadata()?,
                DecoderState::SearchForFrameSync => self.frame_sync()?,
                DecoderState::ReadFrame => {
                    self.read_frame(true)?;
                }
                DecoderState::EndOfStream
                | DecoderState::SeekError
                | DecoderState::Aborted
                | DecoderState::MemoryAllocationError => return self.terminal_result(),
            }
        }
    }

    /// Reads the next frame without delivering it.
    ///
    /// Remaining metadata is processed first. MD5 checking is disabled since
    /// the skipped samples never reach the digest.
    ///
    /// # Errors
    ///
    /// Same as [`Self::process_single`].
    pub fn skip_single_frame(&mut self) -> Result<(), DecoderError> {
        self.process_until_end_of_metadata()?;
        self.md5_checking = false;
        loop {
            match self.state {
                DecoderState::SearchForFrameSync => self.frame_sync()?,
                DecoderState::ReadFrame => {
                    if self.read_frame(false)? {
                        return Ok(());
                    }
                }
                DecoderState::SearchForMetadata
                | DecoderState::ReadMetadata
                | DecoderState::EndOfStream
                | DecoderState::SeekError
                | DecoderState::Aborted
                | DecoderState::MemoryAllocationError => return self.terminal_result(),
            }
        }
    }

    /// Moves to the frame containing `sample` so that the next delivered
    /// frame starts exactly at `sample`.
    ///
    /// MD5 checking is disabled by seeking.
    ///
    /// # Errors
    ///
    /// Returns [`DecoderError::SeekUnsupported`] if the input can't report
    /// its length or position, [`DecoderError::SeekTargetOutOfRange`] if
    /// `sample` is past the end, and [`DecoderError::SeekFailed`] if the
    /// frame was not found. In the last case the decoder is left in
    /// [`DecoderState::SeekError`].
    pub fn seek_absolute(&mut self, sample: u64) -> Result<(), DecoderError> {
        self.terminal_result()?;
        let total = self.total_samples();
        if total > 0 && sample >= total {
            return Err(DecoderError::SeekTargetOutOfRange(sample));
        }
        let length = self
            .src
            .input_mut()
            .length()
            .map_err(DecoderError::SeekUnsupported)?;
        self.decode_position()
            .map_err(DecoderError::SeekUnsupported)?;
        self.md5_checking = false;

        if matches!(
            self.state,
            DecoderState::SearchForMetadata | DecoderState::ReadMetadata
        ) {
            self.process_until_end_of_metadata()?;
            let total = self.total_samples();
            if total > 0 && sample >= total {
                return Err(DecoderError::SeekTargetOutOfRange(sample));
            }
        }

        let mut bisection = Bisection::new(
            sample,
            self.stream_info.as_ref(),
            self.first_frame_offset,
            length,
        );
        if let Some(table) = &self.seek_table {
            bisection.refine_with_seek_table(table, self.first_frame_offset, self.total_samples());
        }
        if let (Some(frame), Some(end)) = (self.last_frame, self.last_frame_end) {
            if self.decode_position() == Ok(end) {
                bisection.tighten_with_last_frame(frame.span(), end);
            }
        }
        bisection.prepare();

        self.seek_target = Some(sample);
        let found = self.bisect(&mut bisection);
        self.seek_target = None;
        self.seek_hit = false;

        let repositioned = found.and_then(|frame_start| {
            self.src.input_mut().seek(frame_start).ok()?;
            Some(frame_start)
        });
        if let Some(frame_start) = repositioned {
            self.flush();
            self.trim_until = Some(sample);
            log::debug!(
                target: "flacodec::decoder::seek",
                "sample {sample} is in the frame at byte {frame_start}"
            );
            Ok(())
        } else {
            log::warn!(target: "flacodec::decoder::seek", "seek to sample {sample} failed");
            self.state = DecoderState::SeekError;
            Err(DecoderError::SeekFailed)
        }
    }

    /// Probes until a frame containing the target is decoded and returns
    /// its byte offset.
    fn bisect(&mut self, bisection: &mut Bisection) -> Option<u64> {
        loop {
            let position = bisection.next_position().ok()?;
            self.src.input_mut().seek(position).ok()?;
            self.flush();
            self.unparseable_while_seeking = 0;
            self.seek_hit = false;
            self.process_single().ok()?;
            if self.seek_hit {
                return self.frame_start;
            }
            let frame = if self.samples_decoded > 0 {
                self.last_frame.map(|f| f.span())
            } else {
                None
            };
            let end_position = self.decode_position().ok()?;
            if let Err(e) = bisection.observe(position, frame, end_position) {
                log::debug!(target: "flacodec::decoder::seek", "bisection stopped: {e:?}");
                return None;
            }
        }
    }

    fn report(&mut self, status: DecodeErrorStatus) {
        if self.seek_target.is_some() {
            if status == DecodeErrorStatus::UnparseableStream {
                self.unparseable_while_seeking += 1;
            }
            return;
        }
        log::warn!(target: "flacodec::decoder", "{status}");
        self.handler.on_error(status);
    }

    fn on_read_fault(&mut self, fault: ReadFault) -> Result<(), DecoderError> {
        match fault {
            ReadFault::EndOfStream => {
                log::debug!(target: "flacodec::decoder", "input ended in state {}", self.state);
                self.state = DecoderState::EndOfStream;
                Ok(())
            }
            ReadFault::Aborted => {
                self.state = DecoderState::Aborted;
                Err(DecoderError::Aborted)
            }
        }
    }

    fn next_byte(&mut self) -> Result<u8, ReadFault> {
        match self.lookahead.take() {
            Some(b) => Ok(b),
            None => self.src.read_u32(8).map(|v| v as u8),
        }
    }

    /// Marks a sync code just read into `header_warmup`.
    fn enter_frame(&mut self) {
        self.frame_start = self.decode_position().ok().map(|p| p.saturating_sub(2));
        self.state = DecoderState::ReadFrame;
    }

    fn find_metadata(&mut self) -> Result<(), DecoderError> {
        let mut matched = 0usize;
        let mut id3_matched = 0usize;
        let mut first = true;
        while matched < STREAM_SYNC.len() {
            let x = match self.next_byte() {
                Ok(x) => x,
                Err(e) => return self.on_read_fault(e),
            };
            if x == STREAM_SYNC[matched] {
                first = true;
                matched += 1;
                id3_matched = 0;
                continue;
            }
            matched = 0;
            if x == ID3V2_TAG[id3_matched] {
                id3_matched += 1;
                if id3_matched == ID3V2_TAG.len() {
                    if let Err(e) = self.skip_id3v2_tag() {
                        return self.on_read_fault(e);
                    }
                    id3_matched = 0;
                }
                continue;
            }
            id3_matched = 0;
            if x == 0xFF {
                self.header_warmup[0] = x;
                let y = match self.next_byte() {
                    Ok(y) => y,
                    Err(e) => return self.on_read_fault(e),
                };
                if y == 0xFF {
                    self.lookahead = Some(y);
                } else if y >> 1 == 0x7C {
                    self.header_warmup[1] = y;
                    self.enter_frame();
                    return Ok(());
                }
            }
            if first {
                self.report(DecodeErrorStatus::LostSync);
                first = false;
            }
        }
        log::debug!(target: "flacodec::decoder", "stream marker found");
        self.state = DecoderState::ReadMetadata;
        Ok(())
    }

    fn skip_id3v2_tag(&mut self) -> Result<(), ReadFault> {
        // version (2 bytes) and flags
        self.src.skip_bytes_aligned(3)?;
        let mut size = 0usize;
        for _ in 0..4 {
            size = (size << 7) | (self.src.read_u32(8)? as usize & 0x7F);
        }
        self.src.skip_bytes_aligned(size)?;
        log::debug!(target: "flacodec::decoder", "skipped ID3v2 tag of {size} bytes");
        Ok(())
    }

    fn read_metadata(&mut self) -> Result<(), DecoderError> {
        match self.read_metadata_block() {
            Ok(()) => Ok(()),
            Err(FrameFault::Read(e)) => self.on_read_fault(e),
            Err(FrameFault::Format(status)) => {
                self.report(status);
                self.state = DecoderState::Aborted;
                Err(DecoderError::Aborted)
            }
        }
    }

    fn deliver_metadata(&mut self, tag: u8, application_id: Option<[u8; 4]>, block: MetadataBlock) {
        if self.seek_target.is_none() && self.config.metadata.responds_to(tag, application_id) {
            self.handler.on_metadata(&block);
        }
    }

    /// Reads a metadata block.
    ///
    /// A malformed STREAMINFO is returned as a format fault. Other malformed
    /// blocks are reported and skipped.
    fn read_metadata_block(&mut self) -> Result<(), FrameFault> {
        let is_last = self.src.read_u32(1)? != 0;
        let tag = self.src.read_u32(7)? as u8;
        let length = self.src.read_u32(24)? as usize;

        match BlockType::from_tag(tag) {
            BlockType::StreamInfo => {
                let body = self.src.read_bytevec_aligned(length)?;
                let parsed: ParseResult<StreamInfo> = parser::stream_info(&body);
                let Ok((_, info)) = parsed else {
                    return Err(FrameFault::Format(DecodeErrorStatus::UnparseableStream));
                };
                if !info.has_md5() {
                    self.md5_checking = false;
                }
                self.digest = Some(PcmDigest::new(usize::from(info.bits_per_sample)));
                self.deliver_metadata(tag, None, MetadataBlock::new(is_last, info.clone().into()));
                self.stream_info = Some(info);
            }
            BlockType::SeekTable => {
                let body = self.src.read_bytevec_aligned(length)?;
                let parsed: ParseResult<SeekTable> = parser::seek_table(&body);
                match parsed {
                    Ok((_, table)) => {
                        self.deliver_metadata(tag, None, MetadataBlock::new(is_last, table.clone().into()));
                        self.seek_table = Some(table);
                    }
                    Err(_) => self.report(DecodeErrorStatus::UnparseableStream),
                }
            }
            BlockType::Application => {
                let wanted = self.seek_target.is_none()
                    && (self.config.metadata.responds_to(tag, None)
                        || self.config.metadata.has_application_exceptions());
                if wanted && length >= 4 {
                    let mut id = [0u8; 4];
                    self.src.read_bytes_aligned(&mut id)?;
                    if self.config.metadata.responds_to(tag, Some(id)) {
                        let data = self.src.read_bytevec_aligned(length - 4)?;
                        let block = MetadataBlock::new(is_last, Application { id, data }.into());
                        self.deliver_metadata(tag, Some(id), block);
                    } else {
                        self.src.skip_bytes_aligned(length - 4)?;
                    }
                } else {
                    self.src.skip_bytes_aligned(length)?;
                }
            }
            BlockType::Padding
            | BlockType::VorbisComment
            | BlockType::CueSheet
            | BlockType::Picture
            | BlockType::Unknown(_) => {
                if self.seek_target.is_none() && self.config.metadata.responds_to(tag, None) {
                    let body = self.src.read_bytevec_aligned(length)?;
                    let parsed: ParseResult<MetadataBlockData> =
                        parser::metadata_block_data(tag, &body);
                    match parsed {
                        Ok((_, data)) => {
                            self.deliver_metadata(tag, None, MetadataBlock::new(is_last, data));
                        }
                        Err(_) => self.report(DecodeErrorStatus::UnparseableStream),
                    }
                } else {
                    self.src.skip_bytes_aligned(length)?;
                }
            }
        }
        log::debug!(target: "flacodec::decoder", "metadata block {tag} of {length} bytes");

        if is_last {
            self.first_frame_offset = self.decode_position().unwrap_or(0);
            self.state = DecoderState::SearchForFrameSync;
            log::debug!(
                target: "flacodec::decoder",
                "first frame at byte {}",
                self.first_frame_offset
            );
        }
        Ok(())
    }

    fn frame_sync(&mut self) -> Result<(), DecoderError> {
        if self.seek_target.is_some()
            && self.unparseable_while_seeking > MAX_UNPARSEABLE_WHILE_SEEKING
        {
            self.state = DecoderState::Aborted;
            return Err(DecoderError::Aborted);
        }
        if let Some(info) = &self.stream_info {
            if info.total_samples > 0 && self.samples_decoded >= info.total_samples {
                self.state = DecoderState::EndOfStream;
                return Ok(());
            }
        }
        self.src.align_to_byte();

        let mut first = true;
        loop {
            let x = match self.next_byte() {
                Ok(x) => x,
                Err(e) => return self.on_read_fault(e),
            };
            if x == 0xFF {
                self.header_warmup[0] = x;
                let y = match self.next_byte() {
                    Ok(y) => y,
                    Err(e) => return self.on_read_fault(e),
                };
                if y == 0xFF {
                    self.lookahead = Some(y);
                } else if y >> 1 == 0x7C {
                    self.header_warmup[1] = y;
                    self.enter_frame();
                    if !first {
                        log::debug!(
                            target: "flacodec::decoder",
                            "frame sync acquired at byte {:?}",
                            self.frame_start
                        );
                    }
                    return Ok(());
                }
            }
            if first {
                self.report(DecodeErrorStatus::LostSync);
                first = false;
            }
        }
    }

    fn recover(&mut self, fault: FrameFault) -> Result<bool, DecoderError> {
        match fault {
            FrameFault::Format(status) => {
                self.report(status);
                self.state = DecoderState::SearchForFrameSync;
                Ok(false)
            }
            FrameFault::Read(e) => self.on_read_fault(e).map(|()| false),
        }
    }

    /// Reads a frame and delivers it if `deliver` is set.
    ///
    /// Returns `true` if a frame was read.
    fn read_frame(&mut self, deliver: bool) -> Result<bool, DecoderError> {
        let info = match self.read_frame_header() {
            Ok(info) => info,
            Err(fault) => return self.recover(fault),
        };
        if self.prepare_buffers(info.channels, info.block_size).is_err() {
            self.state = DecoderState::MemoryAllocationError;
            return Err(DecoderError::MemoryAllocation);
        }
        if let Err(fault) = self.read_frame_body(&info) {
            return self.recover(fault);
        }

        if self.next_fixed_block_size > 0 {
            self.fixed_block_size = self.next_fixed_block_size;
        }
        let span = info.span();
        self.samples_decoded = span.end();
        self.last_frame = Some(info);
        self.last_frame_end = self.decode_position().ok();
        self.state = DecoderState::SearchForFrameSync;

        if let Some(target) = self.seek_target {
            self.seek_hit = span.contains(target);
            return Ok(true);
        }
        if !deliver {
            return Ok(true);
        }
        let skip = match self.trim_until.take() {
            Some(target) if span.contains(target) => (target - span.first_sample) as usize,
            Some(target) if target >= span.end() => {
                self.trim_until = Some(target);
                return Ok(true);
            }
            Some(_) | None => 0,
        };
        self.write_frame(info, skip)?;
        Ok(true)
    }

    fn prepare_buffers(
        &mut self,
        channels: usize,
        block_size: usize,
    ) -> Result<(), std::collections::TryReserveError> {
        if self.samples.len() < channels {
            self.samples.resize_with(channels, Vec::new);
            self.output.resize_with(channels, Vec::new);
        }
        for (samples, output) in self.samples.iter_mut().zip(self.output.iter_mut()) {
            if samples.len() < block_size {
                samples.try_reserve(block_size - samples.len())?;
                samples.resize(block_size, 0);
            }
            if output.len() < block_size {
                output.try_reserve(block_size - output.len())?;
                output.resize(block_size, 0);
            }
        }
        Ok(())
    }

    fn read_frame_header(&mut self) -> Result<FrameInfo, FrameFault> {
        let unparseable = FrameFault::Format(DecodeErrorStatus::UnparseableStream);
        self.src.reset_crc16();
        self.src.update_crc16(&self.header_warmup);
        let force_sample_number = self
            .stream_info
            .as_ref()
            .is_some_and(|i| i.min_block_size != i.max_block_size);
        let header = frame::read_frame_header(
            &mut self.src,
            self.header_warmup,
            force_sample_number,
            &mut self.lookahead,
        )?;

        let block_size = header.block_size();
        let channel_assignment = *header.channel_assignment();
        let bits_per_sample = header
            .bits_per_sample()
            .or_else(|| {
                self.stream_info
                    .as_ref()
                    .map(|i| usize::from(i.bits_per_sample))
            })
            .ok_or(unparseable)?;
        let sample_rate = header
            .sample_rate_spec()
            .freq()
            .or_else(|| self.stream_info.as_ref().map(|i| i.sample_rate))
            .ok_or(unparseable)?;
        let first_sample = self.resolve_first_sample(header.frame_offset(), block_size)?;

        Ok(FrameInfo {
            block_size,
            sample_rate,
            channels: channel_assignment.channels(),
            channel_assignment,
            bits_per_sample,
            first_sample,
        })
    }

    /// Converts the coded frame position into a sample number.
    fn resolve_first_sample(
        &mut self,
        offset: FrameOffset,
        block_size: usize,
    ) -> Result<u64, FrameFault> {
        let n = match offset {
            FrameOffset::StartSample(n) => return Ok(n),
            FrameOffset::Frame(n) => u64::from(n),
        };
        if self.fixed_block_size > 0 {
            return Ok(n * self.fixed_block_size as u64);
        }
        if let Some(info) = &self.stream_info {
            if info.min_block_size == info.max_block_size {
                self.next_fixed_block_size = usize::from(info.max_block_size);
                return Ok(n * u64::from(info.max_block_size));
            }
            return Err(FrameFault::Format(DecodeErrorStatus::UnparseableStream));
        }
        if n == 0 {
            self.next_fixed_block_size = block_size;
        }
        Ok(n * block_size as u64)
    }

    fn read_frame_body(&mut self, info: &FrameInfo) -> Result<(), FrameFault> {
        let block_size = info.block_size;
        let channels = info.channels;
        for ch in 0..channels {
            let bits = info.bits_per_sample + info.channel_assignment.bits_per_sample_offset(ch);
            frame::decode_subframe(&mut self.src, bits, &mut self.samples[ch][..block_size])?;
        }

        let padding = self.src.bits_left_for_byte_alignment();
        if padding > 0 && self.src.read_u32(padding)? != 0 {
            return Err(FrameFault::Format(DecodeErrorStatus::LostSync));
        }
        let computed = self.src.take_crc16();
        let footer = self.src.read_u32(16)? as u16;
        if computed == footer {
            frame::decorrelate(
                info.channel_assignment,
                &mut self.samples[..channels],
                block_size,
            );
        } else {
            self.report(DecodeErrorStatus::FrameCrcMismatch);
            for samples in &mut self.samples[..channels] {
                samples[..block_size].fill(0);
            }
        }
        for (output, samples) in self.output.iter_mut().zip(&self.samples[..channels]) {
            for (y, &x) in output[..block_size].iter_mut().zip(&samples[..block_size]) {
                *y = x as i32;
            }
        }
        Ok(())
    }

    fn write_frame(&mut self, info: FrameInfo, skip: usize) -> Result<(), DecoderError> {
        let block_size = info.block_size;
        if self.md5_checking {
            if let Some(digest) = self.digest.as_mut() {
                digest.update_channels(&self.output[..info.channels], block_size);
            }
        }
        let mut channels: heapless::Vec<&[i32], MAX_CHANNELS> = heapless::Vec::new();
        for output in &self.output[..info.channels] {
            // at most `MAX_CHANNELS` channels
            let _ = channels.push(&output[skip..block_size]);
        }
        let delivered = FrameInfo {
            block_size: block_size - skip,
            first_sample: info.first_sample + skip as u64,
            ..info
        };
        match self.handler.on_frame(&delivered, &channels) {
            WriteStatus::Continue => Ok(()),
            WriteStatus::Abort => {
                log::debug!(target: "flacodec::decoder", "handler aborted decoding");
                self.state = DecoderState::Aborted;
                Err(DecoderError::Aborted)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::pedantic, clippy::nursery, clippy::needless_range_loop)]
mod tests {
    use super::*;
    use crate::component::SeekPoint;
    use crate::component::VorbisComment;
    use crate::encoder::StreamEncoder;
    use crate::io::StreamIo;
    use crate::test_helper::*;

    use std::io::Cursor;

    use rstest::rstest;

    fn decoder_for(
        bytes: Vec<u8>,
        config: config::Decoder,
    ) -> StreamDecoder<SeekableIo<Cursor<Vec<u8>>>, Collector> {
        StreamDecoder::init(config, SeekableIo::new(Cursor::new(bytes)), Collector::default())
            .expect("init failed")
    }

    fn mono_config(bits_per_sample: usize) -> config::Encoder {
        config::Encoder {
            channels: 1,
            bits_per_sample,
            ..config::Encoder::default()
        }
    }

    #[test]
    fn constant_signal_round_trip() {
        let signal = vec![vec![42i32; 1000]];
        let bytes = encode_to_vec(&mono_config(8), &signal);
        let mut decoder = decoder_for(bytes, config::Decoder::default());
        decoder.process_until_end_of_stream().unwrap();
        assert_eq!(decoder.state(), DecoderState::EndOfStream);

        let info = decoder.stream_info().unwrap().clone();
        assert_eq!(info.total_samples, 1000);
        // header, one-byte subframe header, one-byte constant, and CRC-16
        assert!(info.max_frame_size < 16);
        let collector = decoder.finish().handler;
        assert_eq!(collector.samples, signal);
        assert!(collector.errors.is_empty());
    }

    #[test]
    fn corrupted_frame_crc_delivers_silence() {
        let mut rng = seeded_rng(3);
        let signal = vec![uniform_noise(&mut rng, 1000, 3000)];
        let mut bytes = encode_to_vec(&mono_config(16), &signal);
        let last = bytes.len() - 1;
        bytes[last] ^= 0x5A;

        let mut decoder = decoder_for(bytes, config::Decoder::default());
        decoder.process_until_end_of_stream().unwrap();
        let collector = decoder.finish().handler;
        assert_eq!(collector.errors, vec![DecodeErrorStatus::FrameCrcMismatch]);
        assert_eq!(collector.frames.len(), 1);
        assert_eq!(collector.samples, vec![vec![0i32; 1000]]);
    }

    #[test]
    fn seek_to_start_with_placeholder_table() {
        let mut rng = seeded_rng(5);
        let signal = vec![uniform_noise(&mut rng, 10000, 1000)];
        let mut config = mono_config(16);
        config.block_size = 1024;
        let table = SeekTable {
            points: vec![SeekPoint::new(0, 0, 0), SeekPoint::placeholder()],
        };
        let output = SeekableIo::new(Cursor::new(vec![]));
        let mut encoder = StreamEncoder::init(config, vec![table.into()], output).unwrap();
        encoder.process(&[&signal[0]]).unwrap();
        let (_, output) = encoder.finish().unwrap();
        let bytes = output.into_inner().into_inner();

        let mut decoder = decoder_for(bytes, config::Decoder::default());
        decoder.process_until_end_of_metadata().unwrap();
        let first_frame_offset = decoder.decode_position().unwrap();
        let points = &decoder.seek_table().unwrap().points;
        assert_eq!(points[0], SeekPoint::new(0, 0, 1024));
        assert!(points[1].is_placeholder());

        decoder.seek_absolute(0).unwrap();
        assert_eq!(decoder.decode_position().unwrap(), first_frame_offset);
        decoder.process_single().unwrap();
        let collector = decoder.handler();
        assert_eq!(collector.frames[0].first_sample, 0);
        assert_eq!(collector.samples[0], signal[0][..1024]);
    }

    #[rstest]
    fn seek_is_sample_accurate(#[values(1, 1023, 1024, 5000, 19999)] target: usize) {
        let mut rng = seeded_rng(target as u64);
        let signal = vec![
            sinusoid_plus_noise(20000, 50, 8000.0, 100),
            uniform_noise(&mut rng, 20000, 4000),
        ];
        let mut config = config::Encoder::default();
        config.block_size = 1024;
        let bytes = encode_to_vec(&config, &signal);

        let mut decoder = decoder_for(bytes, config::Decoder::default());
        decoder.seek_absolute(target as u64).unwrap();
        decoder.process_single().unwrap();
        let collector = decoder.handler();
        let frame = collector.frames[0];
        assert_eq!(frame.first_sample, target as u64);
        let expected_len = 1024 - target % 1024;
        assert_eq!(frame.block_size, expected_len.min(20000 - target));
        for ch in 0..2 {
            assert_eq!(
                collector.samples[ch][..],
                signal[ch][target..target + frame.block_size]
            );
        }
        assert!(!decoder.md5_checking());
    }

    #[test]
    fn seek_after_decoding_uses_previous_frame() {
        let signal = vec![sinusoid_plus_noise(30000, 40, 3000.0, 30)];
        let mut config = mono_config(16);
        config.block_size = 2048;
        let bytes = encode_to_vec(&config, &signal);

        let mut decoder = decoder_for(bytes, config::Decoder::default());
        for _ in 0..4 {
            decoder.process_single().unwrap();
        }
        decoder.seek_absolute(25000).unwrap();
        decoder.handler_mut().samples.clear();
        decoder.process_until_end_of_stream().unwrap();
        assert_eq!(decoder.handler().samples[0][..], signal[0][25000..]);
    }

    #[test]
    fn seek_beyond_end_is_rejected() {
        let bytes = encode_to_vec(&mono_config(16), &[vec![0i32; 500]]);
        let mut decoder = decoder_for(bytes, config::Decoder::default());
        decoder.process_until_end_of_metadata().unwrap();
        assert_eq!(
            decoder.seek_absolute(500),
            Err(DecoderError::SeekTargetOutOfRange(500))
        );
        assert_eq!(decoder.state(), DecoderState::SearchForFrameSync);
    }

    #[test]
    fn seek_needs_seekable_input() {
        let bytes = encode_to_vec(&mono_config(16), &[vec![0i32; 500]]);
        let mut decoder = StreamDecoder::init(
            config::Decoder::default(),
            StreamIo::new(Cursor::new(bytes)),
            Collector::default(),
        )
        .unwrap();
        assert_eq!(
            decoder.seek_absolute(10),
            Err(DecoderError::SeekUnsupported(IoFault::Unsupported))
        );
        decoder.process_until_end_of_stream().unwrap();
        assert_eq!(decoder.handler().samples[0].len(), 500);
    }

    #[test]
    fn md5_verdict() {
        let signal = vec![sinusoid_plus_noise(5000, 64, 1000.0, 10)];
        let bytes = encode_to_vec(&mono_config(16), &signal);
        let checking = config::Decoder {
            md5_checking: true,
            ..config::Decoder::default()
        };

        let (collector, md5_matched) = decode_all(&bytes);
        assert!(md5_matched);
        assert_eq!(collector.samples, signal);

        // Flip one byte of the stored digest.
        let md5_offset = STREAM_SYNC.len()
            + crate::constant::metadata::BLOCK_HEADER_LEN
            + crate::constant::metadata::STREAMINFO_MD5_OFFSET;
        let mut tampered = bytes.clone();
        tampered[md5_offset] ^= 1;
        let mut decoder = decoder_for(tampered, checking.clone());
        decoder.process_until_end_of_stream().unwrap();
        assert!(!decoder.finish().md5_matched);

        let mut decoder = decoder_for(bytes, checking);
        decoder.skip_single_frame().unwrap();
        decoder.process_until_end_of_stream().unwrap();
        assert!(!decoder.md5_checking());
        assert!(decoder.finish().md5_matched);
    }

    #[test]
    fn id3v2_tag_is_skipped() {
        let signal = vec![vec![7i32; 300], vec![-7i32; 300]];
        let bytes = encode_to_vec(&config::Encoder::default(), &signal);
        // ID3v2.4 header with a syncsafe size of 130 bytes.
        let mut tagged = b"ID3\x04\x00\x00\x00\x00\x01\x02".to_vec();
        tagged.extend(std::iter::repeat(0x66u8).take(130));
        tagged.extend_from_slice(&bytes);

        let mut decoder = decoder_for(tagged, config::Decoder::default());
        decoder.process_until_end_of_stream().unwrap();
        let collector = decoder.finish().handler;
        assert!(collector.errors.is_empty());
        assert_eq!(collector.samples, signal);
    }

    #[test]
    fn garbage_before_marker_is_reported_once() {
        let signal = vec![vec![1i32; 100]];
        let bytes = encode_to_vec(&mono_config(16), &signal);
        let mut garbage = vec![0x00u8, 0x12, 0x34, 0x56, 0x78];
        garbage.extend_from_slice(&bytes);

        let mut decoder = decoder_for(garbage, config::Decoder::default());
        decoder.process_until_end_of_stream().unwrap();
        let collector = decoder.finish().handler;
        assert_eq!(collector.errors, vec![DecodeErrorStatus::LostSync]);
        assert_eq!(collector.samples, signal);
    }

    #[test]
    fn metadata_filter_selects_blocks() {
        let signal = vec![vec![0i32; 64]];
        let comment = VorbisComment {
            vendor: crate::encoder::VENDOR_STRING.as_bytes().to_vec(),
            comments: vec![b"TITLE=x".to_vec()],
        };
        let app = Application {
            id: *b"abcd",
            data: vec![1, 2, 3],
        };
        let output = SeekableIo::new(Cursor::new(vec![]));
        let mut encoder = StreamEncoder::init(
            mono_config(16),
            vec![comment.clone().into(), app.clone().into()],
            output,
        )
        .unwrap();
        encoder.process(&[&signal[0]]).unwrap();
        let bytes = encoder.finish().unwrap().1.into_inner().into_inner();

        let decoder = decoder_for(bytes.clone(), config::Decoder::default());
        let blocks = drain_metadata(decoder);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].data.as_stream_info().is_some());

        let mut config = config::Decoder::default();
        config.metadata.respond_all();
        config.metadata.ignore(BlockType::StreamInfo);
        let blocks = drain_metadata(decoder_for(bytes.clone(), config));
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].data, MetadataBlockData::VorbisComment(comment));
        assert_eq!(blocks[1].data, MetadataBlockData::Application(app.clone()));
        assert!(blocks[1].is_last);

        let mut config = config::Decoder::default();
        config.metadata.ignore_all();
        config.metadata.respond_application(*b"abcd");
        let blocks = drain_metadata(decoder_for(bytes.clone(), config));
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].data, MetadataBlockData::Application(app));

        let mut config = config::Decoder::default();
        config.metadata.respond_all();
        config.metadata.ignore_application(*b"abcd");
        let blocks = drain_metadata(decoder_for(bytes, config));
        assert_eq!(blocks.len(), 2);
    }

    fn drain_metadata(
        mut decoder: StreamDecoder<SeekableIo<Cursor<Vec<u8>>>, Collector>,
    ) -> Vec<MetadataBlock> {
        decoder.process_until_end_of_metadata().unwrap();
        assert_eq!(decoder.state(), DecoderState::SearchForFrameSync);
        decoder.finish().handler.metadata
    }

    #[test]
    fn process_single_steps() {
        let signal = vec![vec![3i32; 2500], vec![5i32; 2500]];
        let mut config = config::Encoder::default();
        config.block_size = 1000;
        let bytes = encode_to_vec(&config, &signal);

        let mut decoder = decoder_for(bytes, config::Decoder::default());
        // STREAMINFO, VORBIS_COMMENT
        decoder.process_single().unwrap();
        assert!(decoder.stream_info().is_some());
        assert_eq!(decoder.state(), DecoderState::ReadMetadata);
        decoder.process_single().unwrap();
        assert_eq!(decoder.state(), DecoderState::SearchForFrameSync);

        decoder.process_single().unwrap();
        assert_eq!(decoder.handler().frames.len(), 1);
        assert_eq!(decoder.block_size(), 1000);
        assert_eq!(decoder.channels(), 2);
        assert_eq!(decoder.bits_per_sample(), 16);
        assert_eq!(decoder.sample_rate(), 44100);
        assert_eq!(decoder.total_samples(), 2500);

        decoder.skip_single_frame().unwrap();
        decoder.process_single().unwrap();
        let frames = &decoder.handler().frames;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].first_sample, 2000);
        assert_eq!(frames[1].block_size, 500);

        decoder.process_single().unwrap();
        assert_eq!(decoder.state(), DecoderState::EndOfStream);
    }

    struct Aborting(usize);

    impl Handler for Aborting {
        fn on_frame(&mut self, _info: &FrameInfo, _channels: &[&[i32]]) -> WriteStatus {
            self.0 += 1;
            WriteStatus::Abort
        }
    }

    #[test]
    fn handler_can_abort() {
        let mut config = mono_config(16);
        config.block_size = 256;
        let bytes = encode_to_vec(&config, &[vec![9i32; 2048]]);
        let mut decoder = StreamDecoder::init(
            config::Decoder::default(),
            SeekableIo::new(Cursor::new(bytes)),
            Aborting(0),
        )
        .unwrap();
        assert_eq!(decoder.process_until_end_of_stream(), Err(DecoderError::Aborted));
        assert_eq!(decoder.state(), DecoderState::Aborted);
        assert_eq!(decoder.process_single(), Err(DecoderError::Aborted));
        assert_eq!(decoder.handler().0, 1);

        decoder.reset().unwrap();
        assert_eq!(decoder.state(), DecoderState::SearchForMetadata);
        decoder.process_until_end_of_metadata().unwrap();
        assert!(decoder.stream_info().is_some());
    }

    #[test]
    fn resync_after_damaged_frame() {
        let mut rng = seeded_rng(11);
        let signal = vec![uniform_noise(&mut rng, 4096, 20000)];
        let mut config = mono_config(16);
        config.block_size = 1024;
        let mut bytes = encode_to_vec(&config, &signal);

        let (clean, _) = decode_all(&bytes);
        assert_eq!(clean.samples, signal);
        let second_frame = find_frame_offsets(&bytes)[1];
        // Break the sample number of the second frame header.
        bytes[second_frame + 4] = 0xFF;

        let mut decoder = decoder_for(bytes, config::Decoder::default());
        decoder.process_until_end_of_stream().unwrap();
        let collector = decoder.finish().handler;
        assert_eq!(collector.errors[0], DecodeErrorStatus::BadHeader);
        let first_samples: Vec<u64> = collector.frames.iter().map(|f| f.first_sample).collect();
        assert_eq!(first_samples, vec![0, 2048, 3072]);
    }

    #[test]
    fn decodes_claxon_compatible_stream() {
        let signal = vec![
            sinusoid_plus_noise(9000, 90, 6000.0, 300),
            sinusoid_plus_noise(9000, 31, 2000.0, 300),
        ];
        let bytes = encode_to_vec(&config::Encoder::from_preset(8), &signal);
        let reference = claxon_decode(&bytes);

        let (collector, md5_matched) = decode_all(&bytes);
        assert!(md5_matched);
        assert_eq!(collector.interleaved(), reference);
    }
}
