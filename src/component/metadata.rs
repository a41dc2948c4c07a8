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

//! Metadata block value types.
//!
//! These are plain data. The codec reads and writes them but leaves their
//! construction and editing to the caller.

use std::cmp::max;
use std::cmp::min;

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use crate::constant::metadata::SEEKPOINT_PLACEHOLDER;
use crate::error::Verify;
use crate::error::VerifyError;

/// Type of a metadata block.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BlockType {
    /// `STREAMINFO` (0).
    StreamInfo,
    /// `PADDING` (1).
    Padding,
    /// `APPLICATION` (2).
    Application,
    /// `SEEKTABLE` (3).
    SeekTable,
    /// `VORBIS_COMMENT` (4).
    VorbisComment,
    /// `CUESHEET` (5).
    CueSheet,
    /// `PICTURE` (6).
    Picture,
    /// Any other 7-bit tag except 127.
    Unknown(u8),
}

impl BlockType {
    /// Constructs `BlockType` from the 7-bit tag.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::component::*;
    /// assert_eq!(BlockType::from_tag(3), BlockType::SeekTable);
    /// assert_eq!(BlockType::from_tag(9), BlockType::Unknown(9));
    /// assert_eq!(BlockType::from_tag(9).tag(), 9);
    /// ```
    pub const fn from_tag(tag: u8) -> Self {
        match tag {
            0 => Self::StreamInfo,
            1 => Self::Padding,
            2 => Self::Application,
            3 => Self::SeekTable,
            4 => Self::VorbisComment,
            5 => Self::CueSheet,
            6 => Self::Picture,
            x => Self::Unknown(x),
        }
    }

    /// Returns the 7-bit tag.
    pub const fn tag(self) -> u8 {
        match self {
            Self::StreamInfo => 0,
            Self::Padding => 1,
            Self::Application => 2,
            Self::SeekTable => 3,
            Self::VorbisComment => 4,
            Self::CueSheet => 5,
            Self::Picture => 6,
            Self::Unknown(x) => x,
        }
    }
}

/// A metadata block with its last-block flag.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetadataBlock {
    /// `true` if no metadata block follows.
    pub is_last: bool,
    /// Block body.
    pub data: MetadataBlockData,
}

impl MetadataBlock {
    /// Constructs a block.
    pub const fn new(is_last: bool, data: MetadataBlockData) -> Self {
        Self { is_last, data }
    }
}

/// Enum that covers variants of `METADATA_BLOCK`.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", content = "data"))]
#[non_exhaustive]
pub enum MetadataBlockData {
    /// `STREAMINFO`.
    StreamInfo(StreamInfo),
    /// `PADDING` of the given length in bytes.
    Padding(usize),
    /// `APPLICATION`.
    Application(Application),
    /// `SEEKTABLE`.
    SeekTable(SeekTable),
    /// `VORBIS_COMMENT`.
    VorbisComment(VorbisComment),
    /// `CUESHEET`.
    CueSheet(CueSheet),
    /// `PICTURE`.
    Picture(Picture),
    /// Block of a type this crate doesn't interpret.
    Unknown {
        /// 7-bit metadata type tag.
        typetag: u8,
        /// Raw block body.
        data: Vec<u8>,
    },
}

impl MetadataBlockData {
    /// Constructs new `MetadataBlockData::Unknown` from the content.
    ///
    /// # Errors
    ///
    /// Emits errors when `tag` is out of range or is a known type.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::component::*;
    /// assert!(MetadataBlockData::new_unknown(0x12, &[0x34, 0x56]).is_ok());
    /// assert!(MetadataBlockData::new_unknown(0x04, &[]).is_err());
    /// assert!(MetadataBlockData::new_unknown(0x7F, &[]).is_err());
    /// ```
    pub fn new_unknown(tag: u8, data: &[u8]) -> Result<Self, VerifyError> {
        let ret = Self::Unknown {
            typetag: tag,
            data: data.to_owned(),
        };
        ret.verify()?;
        Ok(ret)
    }

    /// Returns the type of the block.
    pub const fn block_type(&self) -> BlockType {
        match self {
            Self::StreamInfo(_) => BlockType::StreamInfo,
            Self::Padding(_) => BlockType::Padding,
            Self::Application(_) => BlockType::Application,
            Self::SeekTable(_) => BlockType::SeekTable,
            Self::VorbisComment(_) => BlockType::VorbisComment,
            Self::CueSheet(_) => BlockType::CueSheet,
            Self::Picture(_) => BlockType::Picture,
            Self::Unknown { typetag, .. } => BlockType::Unknown(*typetag),
        }
    }

    /// Returns the 7-bit type tag of the block.
    pub const fn typetag(&self) -> u8 {
        self.block_type().tag()
    }

    /// Obtains inner [`StreamInfo`] if `self` contains `StreamInfo`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::component::*;
    /// let stream_info = StreamInfo::new(16000, 1, 8).unwrap();
    /// let metadata: MetadataBlockData = stream_info.clone().into();
    /// assert_eq!(metadata.as_stream_info(), Some(&stream_info));
    /// ```
    pub const fn as_stream_info(&self) -> Option<&StreamInfo> {
        if let Self::StreamInfo(ref info) = self {
            Some(info)
        } else {
            None
        }
    }

    /// Obtains inner [`SeekTable`] if `self` contains `SeekTable`.
    pub const fn as_seek_table(&self) -> Option<&SeekTable> {
        if let Self::SeekTable(ref table) = self {
            Some(table)
        } else {
            None
        }
    }
}

impl From<StreamInfo> for MetadataBlockData {
    fn from(value: StreamInfo) -> Self {
        Self::StreamInfo(value)
    }
}

impl From<SeekTable> for MetadataBlockData {
    fn from(value: SeekTable) -> Self {
        Self::SeekTable(value)
    }
}

impl From<VorbisComment> for MetadataBlockData {
    fn from(value: VorbisComment) -> Self {
        Self::VorbisComment(value)
    }
}

impl From<CueSheet> for MetadataBlockData {
    fn from(value: CueSheet) -> Self {
        Self::CueSheet(value)
    }
}

impl From<Picture> for MetadataBlockData {
    fn from(value: Picture) -> Self {
        Self::Picture(value)
    }
}

impl From<Application> for MetadataBlockData {
    fn from(value: Application) -> Self {
        Self::Application(value)
    }
}

/// [`METADATA_BLOCK_STREAM_INFO`](https://xiph.org/flac/format.html#metadata_block_streaminfo) component.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StreamInfo {
    /// Minimum block size in samples (16 bits).
    pub min_block_size: u16,
    /// Maximum block size in samples (16 bits).
    pub max_block_size: u16,
    /// Minimum frame size in bytes (24 bits); zero if unknown.
    pub min_frame_size: u32,
    /// Maximum frame size in bytes (24 bits); zero if unknown.
    pub max_frame_size: u32,
    /// Sample rate in Hz (20 bits).
    pub sample_rate: u32,
    /// Number of channels; written with a bias (-1) in 3 bits.
    pub channels: u8,
    /// Bits per sample; written with a bias (-1) in 5 bits.
    pub bits_per_sample: u8,
    /// Total number of inter-channel samples (36 bits); zero if unknown.
    pub total_samples: u64,
    /// MD5 digest of the unencoded signal; all zeros if unknown.
    pub md5: [u8; 16],
}

impl StreamInfo {
    /// Constructs new `StreamInfo`.
    ///
    /// Block sizes, frame sizes, the total sample count, and the digest are
    /// zero-initialized which means "unknown".
    ///
    /// # Errors
    ///
    /// Returns an error if an input argument is out of range.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::component::*;
    /// let info = StreamInfo::new(16000, 2, 16).unwrap();
    /// assert_eq!(info.max_frame_size, 0);
    /// assert!(StreamInfo::new(16000, 9, 16).is_err());
    /// ```
    pub fn new(
        sample_rate: usize,
        channels: usize,
        bits_per_sample: usize,
    ) -> Result<Self, VerifyError> {
        let ret = Self {
            min_block_size: 0,
            max_block_size: 0,
            min_frame_size: 0,
            max_frame_size: 0,
            sample_rate: sample_rate.try_into().unwrap_or(u32::MAX),
            channels: channels.try_into().unwrap_or(u8::MAX),
            bits_per_sample: bits_per_sample.try_into().unwrap_or(u8::MAX),
            total_samples: 0,
            md5: [0; 16],
        };
        ret.verify()?;
        Ok(ret)
    }

    /// Updates the frame-size bounds with a frame of `frame_bytes` bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::component::*;
    /// let mut info = StreamInfo::new(16000, 2, 16).unwrap();
    /// info.update_frame_size(120);
    /// info.update_frame_size(80);
    /// info.update_frame_size(100);
    /// assert_eq!((info.min_frame_size, info.max_frame_size), (80, 120));
    /// ```
    pub fn update_frame_size(&mut self, frame_bytes: usize) {
        let size = u32::try_from(frame_bytes).unwrap_or(u32::MAX);
        self.min_frame_size = if self.min_frame_size == 0 {
            size
        } else {
            min(self.min_frame_size, size)
        };
        self.max_frame_size = max(self.max_frame_size, size);
    }

    /// Returns `true` if the digest is set.
    pub fn has_md5(&self) -> bool {
        self.md5.iter().any(|&b| b != 0)
    }
}

/// An entry of [`SeekTable`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SeekPoint {
    /// Sample number of the first sample in the target frame.
    pub sample_number: u64,
    /// Byte offset of the target frame from the first frame.
    pub stream_offset: u64,
    /// Number of samples in the target frame.
    pub frame_samples: u16,
}

impl SeekPoint {
    /// Constructs a seek point.
    pub const fn new(sample_number: u64, stream_offset: u64, frame_samples: u16) -> Self {
        Self {
            sample_number,
            stream_offset,
            frame_samples,
        }
    }

    /// Constructs a placeholder point.
    pub const fn placeholder() -> Self {
        Self::new(SEEKPOINT_PLACEHOLDER, 0, 0)
    }

    /// Returns `true` if this is a placeholder point.
    pub const fn is_placeholder(&self) -> bool {
        self.sample_number == SEEKPOINT_PLACEHOLDER
    }
}

/// [`METADATA_BLOCK_SEEKTABLE`](https://xiph.org/flac/format.html#metadata_block_seektable) component.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SeekTable {
    /// Seek points.
    pub points: Vec<SeekPoint>,
}

impl SeekTable {
    /// Constructs a table only with `n` placeholders.
    pub fn with_placeholders(n: usize) -> Self {
        Self {
            points: vec![SeekPoint::placeholder(); n],
        }
    }

    /// Constructs a table targeting every `interval` samples up to `total_samples`.
    ///
    /// The offsets are filled by [`StreamEncoder`] while encoding.
    ///
    /// [`StreamEncoder`]: crate::encoder::StreamEncoder
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::component::*;
    /// let table = SeekTable::spaced_points(10000, 4096);
    /// let targets: Vec<u64> = table.points.iter().map(|p| p.sample_number).collect();
    /// assert_eq!(targets, vec![0, 4096, 8192]);
    /// assert!(SeekTable::spaced_points(0, 4096).points.is_empty());
    /// ```
    pub fn spaced_points(total_samples: u64, interval: u64) -> Self {
        if interval == 0 || total_samples == 0 {
            return Self::default();
        }
        let points = (0..total_samples)
            .step_by(usize::try_from(interval).unwrap_or(usize::MAX))
            .map(|s| SeekPoint::new(s, 0, 0))
            .collect();
        Self { points }
    }
}

/// [`METADATA_BLOCK_VORBIS_COMMENT`](https://xiph.org/flac/format.html#metadata_block_vorbis_comment) component.
///
/// Entries are kept as raw bytes. `Verify` checks them against the
/// `NAME=value` grammar.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VorbisComment {
    /// Vendor string.
    pub vendor: Vec<u8>,
    /// `NAME=value` entries.
    pub comments: Vec<Vec<u8>>,
}

impl VorbisComment {
    /// Returns the values of the entries with the field name `name` (ASCII case-insensitive).
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::component::*;
    /// let vc = VorbisComment {
    ///     vendor: b"me".to_vec(),
    ///     comments: vec![b"TITLE=a".to_vec(), b"title=b".to_vec(), b"ARTIST=c".to_vec()],
    /// };
    /// let titles: Vec<&[u8]> = vc.values_of("Title").collect();
    /// assert_eq!(titles, vec![&b"a"[..], &b"b"[..]]);
    /// ```
    pub fn values_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.comments.iter().filter_map(move |entry| {
            let eq = entry.iter().position(|&c| c == b'=')?;
            entry[..eq]
                .eq_ignore_ascii_case(name.as_bytes())
                .then_some(&entry[eq + 1..])
        })
    }
}

/// An index point in [`CueSheetTrack`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CueSheetIndex {
    /// Offset in samples relative to the track offset.
    pub offset: u64,
    /// Index point number.
    pub number: u8,
}

/// A track in [`CueSheet`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CueSheetTrack {
    /// Track offset in samples relative to the beginning of the stream.
    pub offset: u64,
    /// Track number; 170 (or 255 for non-CD) is the lead-out.
    pub number: u8,
    /// ISRC, 12 ASCII characters or all zeros.
    pub isrc: [u8; 12],
    /// `true` for audio tracks.
    pub is_audio: bool,
    /// Pre-emphasis flag.
    pub pre_emphasis: bool,
    /// Index points.
    pub indices: Vec<CueSheetIndex>,
}

/// [`METADATA_BLOCK_CUESHEET`](https://xiph.org/flac/format.html#metadata_block_cuesheet) component.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CueSheet {
    /// Media catalog number in ASCII, zero-padded to 128 bytes when written.
    pub media_catalog_number: Vec<u8>,
    /// Number of lead-in samples.
    pub lead_in: u64,
    /// `true` if the cue sheet corresponds to a compact disc.
    pub is_cd: bool,
    /// Tracks, lead-out last.
    pub tracks: Vec<CueSheetTrack>,
}

/// [`METADATA_BLOCK_PICTURE`](https://xiph.org/flac/format.html#metadata_block_picture) component.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Picture {
    /// ID3v2 APIC picture type.
    pub picture_type: u32,
    /// MIME type string in printable ASCII, or `-->` for a URL.
    pub mime_type: Vec<u8>,
    /// UTF-8 description.
    pub description: Vec<u8>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Color depth in bits-per-pixel.
    pub depth: u32,
    /// Number of colors for indexed pictures, otherwise 0.
    pub colors: u32,
    /// Picture data.
    pub data: Vec<u8>,
}

/// [`METADATA_BLOCK_APPLICATION`](https://xiph.org/flac/format.html#metadata_block_application) component.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Application {
    /// Registered application ID.
    pub id: [u8; 4],
    /// Application data.
    pub data: Vec<u8>,
}
