// Copyright 2024 Google LLC
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

//! Parsers for metadata block bodies.
//!
//! The decoder reads a whole block body into memory and hands it to
//! [`metadata_block_data`]. Every parser here is a complete (not streaming)
//! nom parser over that body.

use nom::bits::bits;
use nom::bits::complete::take as bit_take;
use nom::bytes::complete::take as byte_take;
use nom::combinator::rest;
use nom::error::ErrorKind;
use nom::error::ParseError;
use nom::error_position;
use nom::multi::count;
use nom::number::complete::be_u16;
use nom::number::complete::be_u24;
use nom::number::complete::be_u32;
use nom::number::complete::be_u64;
use nom::number::complete::be_u8;
use nom::number::complete::le_u32;
use nom::IResult;

use crate::component::Application;
use crate::component::CueSheet;
use crate::component::CueSheetIndex;
use crate::component::CueSheetTrack;
use crate::component::MetadataBlock;
use crate::component::MetadataBlockData;
use crate::component::Picture;
use crate::component::SeekPoint;
use crate::component::SeekTable;
use crate::component::StreamInfo;
use crate::component::VorbisComment;
use crate::constant::metadata::MAX_VORBIS_COMMENTS;
use crate::constant::metadata::SEEKPOINT_LEN;

type BitInput<'a> = (&'a [u8], usize);

const CUESHEET_CATALOG_LEN: usize = 128;
const CUESHEET_RESERVED_LEN: usize = 258;
const CUESHEET_TRACK_RESERVED_LEN: usize = 13;
const CUESHEET_INDEX_RESERVED_LEN: usize = 3;

fn convert_bits_err<'a, E>(e: nom::Err<(&'a [u8], ErrorKind)>) -> nom::Err<E>
where
    E: ParseError<&'a [u8]>,
{
    e.map(|(inp, kind)| E::from_error_kind(inp, kind))
}

/// Recognizes a whole [`MetadataBlock`] including its 4-byte header.
///
/// # Errors
///
/// Same as other nom parsers, this returns [`nom::Err`] if `input` doesn't conforms the format.
pub fn metadata_block<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], MetadataBlock, E>
where
    E: ParseError<&'a [u8]>,
{
    let remaining_input = input;
    let (remaining_input, first_byte) = be_u8(remaining_input)?;
    let is_last = (first_byte >> 7) != 0;
    let block_type = first_byte & 0x7F;
    let (remaining_input, length) = be_u24(remaining_input)?;
    let (remaining_input, body) = byte_take(length)(remaining_input)?;
    let (_, data) = metadata_block_data(block_type, body)?;
    Ok((remaining_input, MetadataBlock::new(is_last, data)))
}

/// Recognizes the body of a metadata block of type `block_type`.
///
/// `input` must be exactly the block body. Unknown types are kept as raw
/// bytes; the reserved type 127 is rejected.
///
/// # Errors
///
/// Same as other nom parsers, this returns [`nom::Err`] if `input` doesn't conforms the format.
pub fn metadata_block_data<'a, E>(
    block_type: u8,
    input: &'a [u8],
) -> IResult<&'a [u8], MetadataBlockData, E>
where
    E: ParseError<&'a [u8]>,
{
    match block_type {
        0 => stream_info(input).map(|(i, x)| (i, x.into())),
        1 => padding(input),
        2 => application(input).map(|(i, x)| (i, x.into())),
        3 => seek_table(input).map(|(i, x)| (i, x.into())),
        4 => vorbis_comment(input).map(|(i, x)| (i, x.into())),
        5 => cue_sheet(input).map(|(i, x)| (i, x.into())),
        6 => picture(input).map(|(i, x)| (i, x.into())),
        tag => {
            let (remaining_input, blob) = rest(input)?;
            let data = MetadataBlockData::new_unknown(tag, blob)
                .map_err(|_e| nom::Err::Error(error_position!(input, ErrorKind::TagBits)))?;
            Ok((remaining_input, data))
        }
    }
}

/// Recognizes [`StreamInfo`].
///
/// Field ranges are not checked here; the fixed-width fields already bound
/// the channel count and the sample width.
///
/// # Errors
///
/// Same as other nom parsers, this returns [`nom::Err`] if `input` doesn't conforms the format.
pub fn stream_info<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], StreamInfo, E>
where
    E: ParseError<&'a [u8]>,
{
    let remaining_input = input;
    let (remaining_input, min_block_size) = be_u16(remaining_input)?;
    let (remaining_input, max_block_size) = be_u16(remaining_input)?;
    let (remaining_input, min_frame_size) = be_u24(remaining_input)?;
    let (remaining_input, max_frame_size) = be_u24(remaining_input)?;
    let (remaining_input, (sample_rate, channels, bits_per_sample, total_samples)) =
        bits(|input| {
            let remaining_input = input;
            let (remaining_input, sr): (_, u32) = bit_take(20usize)(remaining_input)?;
            let (remaining_input, ch): (_, u8) = bit_take(3usize)(remaining_input)?;
            let (remaining_input, bps): (_, u8) = bit_take(5usize)(remaining_input)?;
            let (remaining_input, total): (_, u64) = bit_take(36usize)(remaining_input)?;
            let ret: IResult<_, _, (BitInput<'a>, ErrorKind)> =
                Ok((remaining_input, (sr, ch + 1, bps + 1, total)));
            ret
        })(remaining_input)
        .map_err(convert_bits_err)?;
    let (remaining_input, digest) = byte_take(16usize)(remaining_input)?;
    let mut md5 = [0u8; 16];
    md5.copy_from_slice(digest);
    Ok((
        remaining_input,
        StreamInfo {
            min_block_size,
            max_block_size,
            min_frame_size,
            max_frame_size,
            sample_rate,
            channels,
            bits_per_sample,
            total_samples,
            md5,
        },
    ))
}

/// Recognizes a `PADDING` body. Its content is not inspected.
///
/// # Errors
///
/// Never fails.
pub fn padding<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], MetadataBlockData, E>
where
    E: ParseError<&'a [u8]>,
{
    let (remaining_input, body) = rest(input)?;
    Ok((remaining_input, MetadataBlockData::Padding(body.len())))
}

/// Recognizes [`Application`].
///
/// # Errors
///
/// Same as other nom parsers, this returns [`nom::Err`] if `input` doesn't conforms the format.
pub fn application<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], Application, E>
where
    E: ParseError<&'a [u8]>,
{
    let (remaining_input, id) = byte_take(4usize)(input)?;
    let (remaining_input, data) = rest(remaining_input)?;
    let mut app = Application {
        id: [0u8; 4],
        data: data.to_owned(),
    };
    app.id.copy_from_slice(id);
    Ok((remaining_input, app))
}

/// Recognizes [`SeekPoint`].
///
/// # Errors
///
/// Same as other nom parsers, this returns [`nom::Err`] if `input` doesn't conforms the format.
pub fn seek_point<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], SeekPoint, E>
where
    E: ParseError<&'a [u8]>,
{
    let (remaining_input, sample_number) = be_u64(input)?;
    let (remaining_input, stream_offset) = be_u64(remaining_input)?;
    let (remaining_input, frame_samples) = be_u16(remaining_input)?;
    Ok((
        remaining_input,
        SeekPoint::new(sample_number, stream_offset, frame_samples),
    ))
}

/// Recognizes [`SeekTable`].
///
/// The number of points is the body length divided by the point size.
/// Trailing bytes that do not form a full point are left unconsumed.
///
/// # Errors
///
/// Same as other nom parsers, this returns [`nom::Err`] if `input` doesn't conforms the format.
pub fn seek_table<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], SeekTable, E>
where
    E: ParseError<&'a [u8]>,
{
    let n = input.len() / SEEKPOINT_LEN;
    let (remaining_input, points) = count(seek_point, n)(input)?;
    Ok((remaining_input, SeekTable { points }))
}

fn le_length_prefixed<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], &'a [u8], E>
where
    E: ParseError<&'a [u8]>,
{
    let (remaining_input, len) = le_u32(input)?;
    byte_take(len)(remaining_input)
}

/// Recognizes [`VorbisComment`].
///
/// Lengths in this block are little-endian. A vendor string longer than the
/// body is cut at the end of the body. Entries are read until the declared
/// count, [`MAX_VORBIS_COMMENTS`], or the first entry that does not fit,
/// whichever comes first; the entries read so far are kept.
///
/// # Errors
///
/// Same as other nom parsers, this returns [`nom::Err`] if `input` doesn't conforms the format.
pub fn vorbis_comment<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], VorbisComment, E>
where
    E: ParseError<&'a [u8]>,
{
    let (remaining_input, vendor_len) = le_u32(input)?;
    let vendor_len = (vendor_len as usize).min(remaining_input.len());
    let (remaining_input, vendor) = byte_take(vendor_len)(remaining_input)?;
    let mut ret = VorbisComment {
        vendor: vendor.to_owned(),
        comments: vec![],
    };
    let Ok((mut remaining_input, declared)) = le_u32::<_, E>(remaining_input) else {
        return Ok((remaining_input, ret));
    };
    let n = (declared as usize).min(MAX_VORBIS_COMMENTS);
    for _ in 0..n {
        match le_length_prefixed::<E>(remaining_input) {
            Ok((i, entry)) => {
                remaining_input = i;
                ret.comments.push(entry.to_owned());
            }
            Err(_) => break,
        }
    }
    Ok((remaining_input, ret))
}

fn cue_sheet_index<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], CueSheetIndex, E>
where
    E: ParseError<&'a [u8]>,
{
    let (remaining_input, offset) = be_u64(input)?;
    let (remaining_input, number) = be_u8(remaining_input)?;
    let (remaining_input, _) = byte_take(CUESHEET_INDEX_RESERVED_LEN)(remaining_input)?;
    Ok((remaining_input, CueSheetIndex { offset, number }))
}

fn cue_sheet_track<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], CueSheetTrack, E>
where
    E: ParseError<&'a [u8]>,
{
    let (remaining_input, offset) = be_u64(input)?;
    let (remaining_input, number) = be_u8(remaining_input)?;
    let (remaining_input, isrc_bytes) = byte_take(12usize)(remaining_input)?;
    let (remaining_input, flags) = be_u8(remaining_input)?;
    let (remaining_input, _) = byte_take(CUESHEET_TRACK_RESERVED_LEN)(remaining_input)?;
    let (remaining_input, nindices) = be_u8(remaining_input)?;
    let (remaining_input, indices) = count(cue_sheet_index, nindices as usize)(remaining_input)?;
    let mut isrc = [0u8; 12];
    isrc.copy_from_slice(isrc_bytes);
    Ok((
        remaining_input,
        CueSheetTrack {
            offset,
            number,
            isrc,
            is_audio: flags & 0x80 == 0,
            pre_emphasis: flags & 0x40 != 0,
            indices,
        },
    ))
}

/// Recognizes [`CueSheet`].
///
/// Trailing NUL bytes of the 128-byte media catalog field are stripped.
///
/// # Errors
///
/// Same as other nom parsers, this returns [`nom::Err`] if `input` doesn't conforms the format.
pub fn cue_sheet<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], CueSheet, E>
where
    E: ParseError<&'a [u8]>,
{
    let (remaining_input, catalog) = byte_take(CUESHEET_CATALOG_LEN)(input)?;
    let (remaining_input, lead_in) = be_u64(remaining_input)?;
    let (remaining_input, flags) = be_u8(remaining_input)?;
    let (remaining_input, _) = byte_take(CUESHEET_RESERVED_LEN)(remaining_input)?;
    let (remaining_input, ntracks) = be_u8(remaining_input)?;
    let (remaining_input, tracks) = count(cue_sheet_track, ntracks as usize)(remaining_input)?;
    let catalog_len = catalog.iter().rposition(|&c| c != 0).map_or(0, |p| p + 1);
    Ok((
        remaining_input,
        CueSheet {
            media_catalog_number: catalog[..catalog_len].to_owned(),
            lead_in,
            is_cd: flags & 0x80 != 0,
            tracks,
        },
    ))
}

fn be_length_prefixed<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], &'a [u8], E>
where
    E: ParseError<&'a [u8]>,
{
    let (remaining_input, len) = be_u32(input)?;
    byte_take(len)(remaining_input)
}

/// Recognizes [`Picture`].
///
/// # Errors
///
/// Same as other nom parsers, this returns [`nom::Err`] if `input` doesn't conforms the format.
pub fn picture<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], Picture, E>
where
    E: ParseError<&'a [u8]>,
{
    let (remaining_input, picture_type) = be_u32(input)?;
    let (remaining_input, mime_type) = be_length_prefixed(remaining_input)?;
    let (remaining_input, description) = be_length_prefixed(remaining_input)?;
    let (remaining_input, width) = be_u32(remaining_input)?;
    let (remaining_input, height) = be_u32(remaining_input)?;
    let (remaining_input, depth) = be_u32(remaining_input)?;
    let (remaining_input, colors) = be_u32(remaining_input)?;
    let (remaining_input, data) = be_length_prefixed(remaining_input)?;
    Ok((
        remaining_input,
        Picture {
            picture_type,
            mime_type: mime_type.to_owned(),
            description: description.to_owned(),
            width,
            height,
            depth,
            colors,
            data: data.to_owned(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::BitRepr;

    use nom::error::VerboseError;

    fn round_trip(data: MetadataBlockData) {
        let block = MetadataBlock::new(true, data);
        let bytes = block.to_bytes();
        let (remaining_input, decoded) =
            metadata_block::<VerboseError<&[u8]>>(&bytes).expect("Unexpected parse error");
        assert!(remaining_input.is_empty());
        assert_eq!(decoded, block);
    }

    #[test]
    fn decoding_stream_info() {
        let mut info = StreamInfo::new(96000, 6, 24).unwrap();
        info.min_block_size = 16;
        info.max_block_size = 65535;
        info.min_frame_size = 11;
        info.max_frame_size = 0xFF_FFFF;
        info.total_samples = 0xF_FFFF_FFFF;
        info.md5 = [0xA5; 16];
        round_trip(info.into());
    }

    #[test]
    fn decoding_padding_and_application() {
        round_trip(MetadataBlockData::Padding(0));
        round_trip(MetadataBlockData::Padding(1027));
        round_trip(
            Application {
                id: *b"ATCH",
                data: vec![0, 1, 2, 3, 4],
            }
            .into(),
        );
        assert!(application::<VerboseError<&[u8]>>(b"AB").is_err());
    }

    #[test]
    fn decoding_seek_table() {
        let table = SeekTable {
            points: vec![
                SeekPoint::new(0, 0, 4096),
                SeekPoint::new(4096, 1234, 4096),
                SeekPoint::placeholder(),
            ],
        };
        round_trip(table.into());

        let mut body = MetadataBlockData::from(SeekTable {
            points: vec![SeekPoint::new(7, 8, 9)],
        })
        .to_bytes();
        body.extend_from_slice(&[1, 2, 3]);
        let (remaining_input, parsed) =
            metadata_block_data::<VerboseError<&[u8]>>(3, &body).unwrap();
        assert_eq!(remaining_input, &[1, 2, 3]);
        assert_eq!(
            parsed.as_seek_table().unwrap().points,
            vec![SeekPoint::new(7, 8, 9)]
        );
    }

    #[test]
    fn decoding_vorbis_comment() {
        round_trip(
            VorbisComment {
                vendor: b"flacodec".to_vec(),
                comments: vec![b"TITLE=x".to_vec(), b"ARTIST=".to_vec()],
            }
            .into(),
        );
    }

    #[test]
    fn truncated_vorbis_comment_keeps_complete_entries() {
        let mut body = vec![];
        body.extend_from_slice(&3u32.to_le_bytes());
        body.extend_from_slice(b"abc");
        body.extend_from_slice(&3u32.to_le_bytes());
        body.extend_from_slice(&3u32.to_le_bytes());
        body.extend_from_slice(b"A=1");
        body.extend_from_slice(&100u32.to_le_bytes());
        body.extend_from_slice(b"B=2");

        let (_, vc) = vorbis_comment::<VerboseError<&[u8]>>(&body).unwrap();
        assert_eq!(vc.vendor, b"abc");
        assert_eq!(vc.comments, vec![b"A=1".to_vec()]);

        let mut body = vec![];
        body.extend_from_slice(&10u32.to_le_bytes());
        body.extend_from_slice(b"abc");
        let (_, vc) = vorbis_comment::<VerboseError<&[u8]>>(&body).unwrap();
        assert_eq!(vc.vendor, b"abc");
        assert!(vc.comments.is_empty());
    }

    #[test]
    fn decoding_cue_sheet() {
        let sheet = CueSheet {
            media_catalog_number: b"1234567890123".to_vec(),
            lead_in: 88200,
            is_cd: true,
            tracks: vec![
                CueSheetTrack {
                    offset: 0,
                    number: 1,
                    isrc: *b"USRC17607839",
                    is_audio: true,
                    pre_emphasis: true,
                    indices: vec![
                        CueSheetIndex {
                            offset: 0,
                            number: 0,
                        },
                        CueSheetIndex {
                            offset: 588,
                            number: 1,
                        },
                    ],
                },
                CueSheetTrack {
                    offset: 588 * 100,
                    number: 170,
                    isrc: [0; 12],
                    is_audio: false,
                    pre_emphasis: false,
                    indices: vec![],
                },
            ],
        };
        round_trip(sheet.into());
    }

    #[test]
    fn decoding_picture() {
        round_trip(
            Picture {
                picture_type: 3,
                mime_type: b"image/png".to_vec(),
                description: "cover".as_bytes().to_vec(),
                width: 32,
                height: 32,
                depth: 24,
                colors: 0,
                data: vec![0x89, b'P', b'N', b'G'],
            }
            .into(),
        );
        let truncated = &[0u8, 0, 0, 3, 0, 0, 0, 9, b'i'];
        assert!(picture::<VerboseError<&[u8]>>(truncated).is_err());
    }

    #[test]
    fn decoding_unknown_block() {
        round_trip(MetadataBlockData::new_unknown(0x33, &[9, 8, 7]).unwrap());
        assert!(metadata_block_data::<VerboseError<&[u8]>>(127, &[]).is_err());
    }
}
