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

//! Pure predicates over format values.
//!
//! The functions in this module have no side effects except
//! [`seektable_sort`], which reorders a table in place. The `Verify` impls of
//! the metadata components delegate to these predicates.

use super::component::CueSheet;
use super::component::Picture;
use super::component::SeekPoint;
use super::component::SeekTable;
use super::constant::subset;
use super::constant::MAX_SAMPLE_RATE;

/// Returns `true` if `rate` is representable in STREAMINFO.
///
/// # Examples
///
/// ```
/// # use flacodec::format::*;
/// assert!(sample_rate_is_valid(44100));
/// assert!(sample_rate_is_valid(1_048_575));
/// assert!(!sample_rate_is_valid(1_100_000));
/// ```
pub const fn sample_rate_is_valid(rate: u32) -> bool {
    rate as usize <= MAX_SAMPLE_RATE
}

/// Returns `true` if `rate` can be stored in a frame header of a subset stream.
///
/// Rates of 65536Hz or above must be multiples of 10 and below 655360Hz.
///
/// # Examples
///
/// ```
/// # use flacodec::format::*;
/// assert!(sample_rate_is_subset(65535));
/// assert!(!sample_rate_is_subset(65536));
/// assert!(sample_rate_is_subset(655_350));
/// ```
pub const fn sample_rate_is_subset(rate: u32) -> bool {
    sample_rate_is_valid(rate) && rate < (1 << 16) * 10 && (rate < (1 << 16) || rate % 10 == 0)
}

/// Returns `true` if `block_size` satisfies the subset ceiling for `sample_rate`.
///
/// # Examples
///
/// ```
/// # use flacodec::format::*;
/// assert!(blocksize_is_subset(4608, 48000));
/// assert!(!blocksize_is_subset(8192, 44100));
/// assert!(blocksize_is_subset(8192, 96000));
/// assert!(!blocksize_is_subset(32768, 96000));
/// ```
pub const fn blocksize_is_subset(block_size: usize, sample_rate: u32) -> bool {
    block_size <= subset::MAX_BLOCK_SIZE
        && (sample_rate > 48000 || block_size <= subset::MAX_BLOCK_SIZE_48000HZ)
}

/// Returns `true` if `points` are ascending with placeholders only at the end.
pub fn seektable_is_legal(table: &SeekTable) -> bool {
    let mut prev: Option<u64> = None;
    for p in &table.points {
        if let Some(prev) = prev {
            if !p.is_placeholder() && p.sample_number <= prev {
                return false;
            }
        }
        prev = Some(p.sample_number);
    }
    true
}

/// Sorts seek points by sample number and collapses duplicates.
///
/// Ties keep their original order and the first one wins. Collapsed points
/// become placeholders appended after the unique points, so the table length
/// never changes. Returns the number of unique non-placeholder points.
///
/// # Examples
///
/// ```
/// # use flacodec::format::*;
/// # use flacodec::component::*;
/// let mut table = SeekTable {
///     points: vec![
///         SeekPoint::new(4096, 200, 4096),
///         SeekPoint::placeholder(),
///         SeekPoint::new(0, 0, 4096),
///         SeekPoint::new(4096, 300, 4096),
///     ],
/// };
/// assert_eq!(seektable_sort(&mut table), 2);
/// assert_eq!(table.points[0].sample_number, 0);
/// assert_eq!(table.points[1].stream_offset, 200);
/// assert!(table.points[2].is_placeholder());
/// assert!(table.points[3].is_placeholder());
/// assert!(seektable_is_legal(&table));
/// ```
pub fn seektable_sort(table: &mut SeekTable) -> usize {
    let points = &mut table.points;
    points.sort_by_key(|p| p.sample_number);

    let mut unique = 0usize;
    for i in 0..points.len() {
        if points[i].is_placeholder() {
            continue;
        }
        if unique > 0 && points[i].sample_number == points[unique - 1].sample_number {
            continue;
        }
        points[unique] = points[i];
        unique += 1;
    }
    for p in &mut points[unique..] {
        *p = SeekPoint::placeholder();
    }
    unique
}

/// Returns `true` if `name` is a legal Vorbis comment field name.
///
/// # Examples
///
/// ```
/// # use flacodec::format::*;
/// assert!(vorbiscomment_entry_name_is_legal(b"TITLE"));
/// assert!(vorbiscomment_entry_name_is_legal(b""));
/// assert!(!vorbiscomment_entry_name_is_legal(b"A=B"));
/// assert!(!vorbiscomment_entry_name_is_legal(b"\x7e"));
/// ```
pub fn vorbiscomment_entry_name_is_legal(name: &[u8]) -> bool {
    name.iter().all(|&c| (0x20..=0x7D).contains(&c) && c != b'=')
}

/// Returns `true` if `value` is legal UTF-8.
///
/// Overlong forms, surrogates (U+D800 to U+DFFF), and the non-characters
/// U+FFFE and U+FFFF are rejected.
///
/// # Examples
///
/// ```
/// # use flacodec::format::*;
/// assert!(vorbiscomment_entry_value_is_legal(&[0xC2, 0x85]));
/// assert!(!vorbiscomment_entry_value_is_legal(&[0xC1, 0x85]));
/// assert!(!vorbiscomment_entry_value_is_legal(&[0xED, 0xA0, 0x80]));
/// assert!(!vorbiscomment_entry_value_is_legal(&[0xEF, 0xBF, 0xBE]));
/// ```
pub fn vorbiscomment_entry_value_is_legal(value: &[u8]) -> bool {
    let mut rest = value;
    while !rest.is_empty() {
        let n = utf8_sequence_len(rest);
        if n == 0 {
            return false;
        }
        rest = &rest[n..];
    }
    true
}

/// Returns `true` if `entry` is a legal `NAME=value` Vorbis comment.
///
/// # Examples
///
/// ```
/// # use flacodec::format::*;
/// assert!(vorbiscomment_entry_is_legal(b"ARTIST=someone"));
/// assert!(vorbiscomment_entry_is_legal(b"="));
/// assert!(!vorbiscomment_entry_is_legal(b"ARTIST"));
/// ```
pub fn vorbiscomment_entry_is_legal(entry: &[u8]) -> bool {
    entry.iter().position(|&c| c == b'=').map_or(false, |eq| {
        vorbiscomment_entry_name_is_legal(&entry[..eq])
            && vorbiscomment_entry_value_is_legal(&entry[eq + 1..])
    })
}

#[inline]
const fn is_continuation(b: u8) -> bool {
    b & 0xC0 == 0x80
}

/// Returns the length of the UTF-8 sequence at the head of `s`, or 0 if the
/// head is not a legal sequence.
fn utf8_sequence_len(s: &[u8]) -> usize {
    let b0 = s[0];
    let at = |i: usize| s.get(i).copied().unwrap_or(0);
    if b0 & 0x80 == 0 {
        1
    } else if b0 & 0xE0 == 0xC0 && is_continuation(at(1)) {
        if b0 & 0xFE == 0xC0 {
            return 0;
        }
        2
    } else if b0 & 0xF0 == 0xE0 && is_continuation(at(1)) && is_continuation(at(2)) {
        let b1 = at(1);
        if b0 == 0xE0 && b1 & 0xE0 == 0x80 {
            return 0;
        }
        if b0 == 0xED && b1 & 0xE0 == 0xA0 {
            return 0;
        }
        if b0 == 0xEF && b1 == 0xBF && at(2) & 0xFE == 0xBE {
            return 0;
        }
        3
    } else if b0 & 0xF8 == 0xF0
        && is_continuation(at(1))
        && is_continuation(at(2))
        && is_continuation(at(3))
    {
        if b0 == 0xF0 && at(1) & 0xF0 == 0x80 {
            return 0;
        }
        4
    } else {
        0
    }
}

/// Checks a cue sheet, returning the first violation found.
///
/// With `check_cd_da_subset`, the stricter CD-DA rules apply.
///
/// # Errors
///
/// Returns a static explanation of the violation.
///
/// # Examples
///
/// ```
/// # use flacodec::format::*;
/// # use flacodec::component::*;
/// let sheet = CueSheet {
///     media_catalog_number: vec![],
///     lead_in: 88200,
///     is_cd: true,
///     tracks: vec![
///         CueSheetTrack {
///             offset: 0,
///             number: 1,
///             isrc: [0u8; 12],
///             is_audio: true,
///             pre_emphasis: false,
///             indices: vec![CueSheetIndex { offset: 0, number: 1 }],
///         },
///         CueSheetTrack {
///             offset: 588 * 100,
///             number: 170,
///             isrc: [0u8; 12],
///             is_audio: true,
///             pre_emphasis: false,
///             indices: vec![],
///         },
///     ],
/// };
/// assert!(cuesheet_is_legal(&sheet, true).is_ok());
/// ```
pub fn cuesheet_is_legal(sheet: &CueSheet, check_cd_da_subset: bool) -> Result<(), &'static str> {
    if check_cd_da_subset {
        if sheet.lead_in < 2 * 44100 {
            return Err("CD-DA cue sheet must have a lead-in length of at least 2 seconds");
        }
        if sheet.lead_in % 588 != 0 {
            return Err("CD-DA cue sheet lead-in length must be evenly divisible by 588 samples");
        }
    }
    let Some(last) = sheet.tracks.last() else {
        return Err("cue sheet must have at least one track (the lead-out)");
    };
    if check_cd_da_subset {
        if last.number != 170 {
            return Err("CD-DA cue sheet must have a lead-out track number 170 (0xAA)");
        }
        if sheet.tracks.len() > 100 {
            return Err("CD-DA cue sheet must have at most 100 tracks");
        }
    }
    let ntracks = sheet.tracks.len();
    for (i, track) in sheet.tracks.iter().enumerate() {
        if track.number == 0 {
            return Err("cue sheet may not have a track number 0");
        }
        if check_cd_da_subset {
            if i + 1 < ntracks && !(1..=99).contains(&track.number) {
                return Err("CD-DA cue sheet track number must be 1-99 or 170 for the lead-out");
            }
            if track.offset % 588 != 0 {
                return Err(if i + 1 == ntracks {
                    "CD-DA cue sheet lead-out offset must be evenly divisible by 588 samples"
                } else {
                    "CD-DA cue sheet track offset must be evenly divisible by 588 samples"
                });
            }
        }
        if i + 1 < ntracks {
            match track.indices.first() {
                None => return Err("cue sheet track must have at least one index point"),
                Some(first) if first.number > 1 => {
                    return Err("cue sheet track's first index number must be 0 or 1")
                }
                Some(_) => {}
            }
        }
        for (j, index) in track.indices.iter().enumerate() {
            if check_cd_da_subset && index.offset % 588 != 0 {
                return Err(
                    "CD-DA cue sheet track index offset must be evenly divisible by 588 samples",
                );
            }
            if j > 0 && u16::from(index.number) != u16::from(track.indices[j - 1].number) + 1 {
                return Err("cue sheet track index numbers must increase by 1");
            }
        }
    }
    Ok(())
}

/// Checks a picture block, returning the first violation found.
///
/// # Errors
///
/// Returns a static explanation of the violation.
///
/// # Examples
///
/// ```
/// # use flacodec::format::*;
/// # use flacodec::component::*;
/// let mut pic = Picture::default();
/// pic.mime_type = b"image/png".to_vec();
/// pic.description = "\u{30b5}".as_bytes().to_vec();
/// assert!(picture_is_legal(&pic).is_ok());
/// pic.mime_type = b"image/\x7f".to_vec();
/// assert!(picture_is_legal(&pic).is_err());
/// ```
pub fn picture_is_legal(picture: &Picture) -> Result<(), &'static str> {
    if !picture.mime_type.iter().all(|c| (0x20..=0x7E).contains(c)) {
        return Err("MIME type string must contain only printable ASCII characters (0x20-0x7e)");
    }
    if !vorbiscomment_entry_value_is_legal(&picture.description) {
        return Err("description string must be valid UTF-8");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::CueSheetIndex;
    use crate::component::CueSheetTrack;

    use rand::rngs::StdRng;
    use rand::Rng;
    use rand::SeedableRng;
    use rstest::rstest;

    #[rstest]
    #[case(0, true, true)]
    #[case(9, true, true)]
    #[case(32768, true, true)]
    #[case(65535, true, true)]
    #[case(65536, true, false)]
    #[case(65540, true, true)]
    #[case(65555, true, false)]
    #[case(66001, true, false)]
    #[case(100_001, true, false)]
    #[case(500_010, true, true)]
    #[case(655_349, true, false)]
    #[case(655_350, true, true)]
    #[case(655_360, true, false)]
    #[case(768_000, true, false)]
    #[case(1_048_575, true, false)]
    #[case(1_100_000, false, false)]
    fn sample_rate_table(#[case] rate: u32, #[case] valid: bool, #[case] subset: bool) {
        assert_eq!(sample_rate_is_valid(rate), valid);
        assert_eq!(sample_rate_is_subset(rate), subset);
    }

    #[rstest]
    #[case(&[], true)]
    #[case(&[0x7f], true)]
    #[case(&[0x80], false)]
    #[case(&[0xc0], false)]
    #[case(&[0xc0, 0x85], false)]
    #[case(&[0xc2, 0x85], true)]
    #[case(&[0xe0, 0x85, 0x80], false)]
    #[case(&[0xe0, 0x95, 0x80], false)]
    #[case(&[0xe0, 0xa5, 0x80], true)]
    #[case(&[0xe1, 0x85, 0x41], false)]
    #[case(&[0xe1, 0xa5, 0x80], true)]
    #[case(&[0xed, 0x9f, 0xbf], true)]
    #[case(&[0xed, 0xbf, 0xbf], false)]
    #[case(&[0xef, 0xbf, 0xbd], true)]
    #[case(&[0xef, 0xbf, 0xbf], false)]
    #[case(&[0xf0, 0x8f, 0x80, 0x80], false)]
    #[case(&[0xf0, 0x9f, 0x8e, 0xb5], true)]
    fn utf8_values(#[case] bytes: &[u8], #[case] valid: bool) {
        assert_eq!(vorbiscomment_entry_value_is_legal(bytes), valid);
    }

    #[test]
    fn utf8_accepts_std_encoded_chars() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        for _ in 0..2000 {
            let Some(c) = char::from_u32(rng.gen_range(0..=0x10FFFF)) else {
                continue;
            };
            if c == '\u{FFFE}' || c == '\u{FFFF}' {
                continue;
            }
            let mut buf = [0u8; 4];
            assert!(
                vorbiscomment_entry_value_is_legal(c.encode_utf8(&mut buf).as_bytes()),
                "{c:?}"
            );
        }
    }

    #[rstest]
    #[case(b"", false)]
    #[case(b"a", false)]
    #[case(b"=", true)]
    #[case(b"a=", true)]
    #[case(b"\x01=", false)]
    #[case(b"\x7d=", true)]
    #[case(b"\x7e=", false)]
    #[case(b"a=\xc2\x85", true)]
    #[case(b"a=\xe0\x85\x80", false)]
    fn comment_entries(#[case] entry: &[u8], #[case] valid: bool) {
        assert_eq!(vorbiscomment_entry_is_legal(entry), valid);
    }

    fn table_from_samples(samples: &[u64]) -> SeekTable {
        SeekTable {
            points: samples
                .iter()
                .enumerate()
                .map(|(i, &s)| SeekPoint::new(s, i as u64, 1024))
                .collect(),
        }
    }

    #[test]
    fn sort_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let samples: Vec<u64> = (0..rng.gen_range(0..40))
                .map(|_| {
                    if rng.gen_bool(0.1) {
                        u64::MAX
                    } else {
                        rng.gen_range(0..20)
                    }
                })
                .collect();
            let mut table = table_from_samples(&samples);
            let unique = seektable_sort(&mut table);
            assert!(seektable_is_legal(&table));
            assert_eq!(table.points.len(), samples.len());

            let mut expected: Vec<u64> = samples.iter().copied().filter(|&s| s != u64::MAX).collect();
            expected.sort_unstable();
            expected.dedup();
            assert_eq!(unique, expected.len());
            let got: Vec<u64> = table.points[..unique].iter().map(|p| p.sample_number).collect();
            assert_eq!(got, expected);

            let once = table.clone();
            assert_eq!(seektable_sort(&mut table), unique);
            assert_eq!(table, once);
        }
    }

    #[test]
    fn sort_keeps_first_of_duplicates() {
        let mut table = table_from_samples(&[5, 3, 5, 3]);
        assert_eq!(seektable_sort(&mut table), 2);
        assert_eq!(table.points[0].stream_offset, 1);
        assert_eq!(table.points[1].stream_offset, 0);
    }

    #[test]
    fn legality_of_unsorted_tables() {
        assert!(seektable_is_legal(&table_from_samples(&[0, 10, u64::MAX, u64::MAX])));
        assert!(!seektable_is_legal(&table_from_samples(&[0, 10, 10])));
        assert!(!seektable_is_legal(&table_from_samples(&[u64::MAX, 10])));
    }

    fn cd_track(number: u8, offset: u64, indices: &[(u8, u64)]) -> CueSheetTrack {
        CueSheetTrack {
            offset,
            number,
            isrc: [0u8; 12],
            is_audio: true,
            pre_emphasis: false,
            indices: indices
                .iter()
                .map(|&(number, offset)| CueSheetIndex { offset, number })
                .collect(),
        }
    }

    #[test]
    fn cuesheet_rules() {
        let mut sheet = CueSheet {
            media_catalog_number: vec![],
            lead_in: 88200,
            is_cd: true,
            tracks: vec![
                cd_track(1, 0, &[(0, 0), (1, 588)]),
                cd_track(2, 588 * 10, &[(1, 0)]),
                cd_track(170, 588 * 20, &[]),
            ],
        };
        assert_eq!(cuesheet_is_legal(&sheet, true), Ok(()));

        sheet.lead_in = 88201;
        assert!(cuesheet_is_legal(&sheet, true).is_err());
        assert_eq!(cuesheet_is_legal(&sheet, false), Ok(()));
        sheet.lead_in = 88200;

        sheet.tracks[1].indices[0].number = 2;
        assert_eq!(
            cuesheet_is_legal(&sheet, false),
            Err("cue sheet track's first index number must be 0 or 1")
        );
        sheet.tracks[1].indices[0].number = 1;

        sheet.tracks[0].indices[1].number = 2;
        assert_eq!(
            cuesheet_is_legal(&sheet, false),
            Err("cue sheet track index numbers must increase by 1")
        );
        sheet.tracks[0].indices[1].number = 1;

        sheet.tracks[1].number = 170;
        assert_eq!(
            cuesheet_is_legal(&sheet, true),
            Err("CD-DA cue sheet track number must be 1-99 or 170 for the lead-out")
        );
        assert_eq!(cuesheet_is_legal(&sheet, false), Ok(()));
        sheet.tracks[1].number = 2;

        sheet.tracks[2].number = 100;
        assert!(cuesheet_is_legal(&sheet, true).is_err());
        assert_eq!(cuesheet_is_legal(&sheet, false), Ok(()));

        sheet.tracks.clear();
        assert!(cuesheet_is_legal(&sheet, false).is_err());
    }
}
