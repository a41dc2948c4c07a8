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

//! Frame header, subframe, and residual readers.

use std::cell::RefCell;

use crate::bitsink::HEADER_CRC;
use crate::bitsource::BitSource;
use crate::bitsource::ReadFault;
use crate::bitsource::UTF8_INVALID_U32;
use crate::bitsource::UTF8_INVALID_U64;
use crate::component::BlockSizeSpec;
use crate::component::ChannelAssignment;
use crate::component::FrameHeader;
use crate::component::FrameOffset;
use crate::component::QuantizedParameters;
use crate::component::SampleRateSpec;
use crate::component::SampleSizeSpec;
use crate::constant::qlpc::MAX_ORDER as MAX_LPC_ORDER;
use crate::constant::qlpc::PRECISION_BITS;
use crate::constant::qlpc::SHIFT_BITS;
use crate::constant::rice::ESCAPE_PARAMETER;
use crate::constant::rice::METHOD_BITS;
use crate::constant::rice::PARAMETER_BITS;
use crate::constant::rice::PARTITION_ORDER_BITS;
use crate::constant::rice::RAW_BITS_LEN;
use crate::constant::rice::RICE2_ESCAPE_PARAMETER;
use crate::constant::rice::RICE2_PARAMETER_BITS;
use crate::error::DecodeErrorStatus;
use crate::fixed;
use crate::io::Input;
use crate::lpc;

/// Reason why a frame could not be read.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameFault {
    /// The underlying reader failed.
    Read(ReadFault),
    /// The bitstream is malformed; the decoder resynchronizes.
    Format(DecodeErrorStatus),
}

impl From<ReadFault> for FrameFault {
    fn from(e: ReadFault) -> Self {
        Self::Read(e)
    }
}

const fn format_fault<T>(status: DecodeErrorStatus) -> Result<T, FrameFault> {
    Err(FrameFault::Format(status))
}

/// Reads a two's complement integer of up to 33 bits.
fn read_wide_signed<I: Input>(src: &mut BitSource<I>, bits: usize) -> Result<i64, ReadFault> {
    if bits == 0 {
        return Ok(0);
    }
    let v = src.read_bits(bits)?;
    Ok(((v << (64 - bits)) as i64) >> (64 - bits))
}

/// Reads a frame header following the two sync bytes in `warmup`.
///
/// `force_sample_number` selects the 36-bit sample number coding even if the
/// blocking-strategy bit is cleared. When a byte that may start the next sync
/// code is consumed, it is stored to `lookahead`.
///
/// # Errors
///
/// Returns [`DecodeErrorStatus::BadHeader`] on a corrupted field or a CRC-8
/// mismatch, and [`DecodeErrorStatus::UnparseableStream`] on a reserved code
/// in an otherwise intact header.
pub fn read_frame_header<I: Input>(
    src: &mut BitSource<I>,
    warmup: [u8; 2],
    force_sample_number: bool,
    lookahead: &mut Option<u8>,
) -> Result<FrameHeader, FrameFault> {
    let mut raw: Vec<u8> = Vec::with_capacity(16);
    raw.extend_from_slice(&warmup);
    let is_variable_blocking = warmup[1] & 0x01 != 0;

    let mut fields = [0u8; 2];
    for field in &mut fields {
        let x = src.read_u32(8)? as u8;
        if x == 0xFF {
            *lookahead = Some(x);
            return format_fault(DecodeErrorStatus::BadHeader);
        }
        raw.push(x);
        *field = x;
    }
    let block_size_tag = fields[0] >> 4;
    let sample_rate_tag = fields[0] & 0x0F;
    let channel_tag = fields[1] >> 4;
    let sample_size_tag = (fields[1] >> 1) & 0x07;
    let channel_assignment = ChannelAssignment::from_tag(channel_tag);
    let sample_size_spec = SampleSizeSpec::from_tag(sample_size_tag);
    let reserved_bit = fields[1] & 0x01 != 0;

    let offset = if is_variable_blocking || force_sample_number {
        let n = src.read_utf8_u64(&mut raw)?;
        if n == UTF8_INVALID_U64 {
            *lookahead = raw.last().copied();
            return format_fault(DecodeErrorStatus::BadHeader);
        }
        FrameOffset::StartSample(n)
    } else {
        let n = src.read_utf8_u32(&mut raw)?;
        if n == UTF8_INVALID_U32 {
            *lookahead = raw.last().copied();
            return format_fault(DecodeErrorStatus::BadHeader);
        }
        FrameOffset::Frame(n)
    };

    let block_size_hint = match block_size_tag {
        6 => read_hint(src, &mut raw, 1)?,
        7 => read_hint(src, &mut raw, 2)?,
        _ => 0,
    };
    let sample_rate_hint = match sample_rate_tag {
        12 => read_hint(src, &mut raw, 1)?,
        13 | 14 => read_hint(src, &mut raw, 2)?,
        _ => 0,
    };

    let crc8 = src.read_u32(8)? as u8;
    if HEADER_CRC.checksum(&raw) != crc8 {
        return format_fault(DecodeErrorStatus::BadHeader);
    }
    let Some(sample_rate_spec) = SampleRateSpec::from_tag_and_data(sample_rate_tag, sample_rate_hint)
    else {
        return format_fault(DecodeErrorStatus::BadHeader);
    };
    let (Some(block_size_spec), Some(channel_assignment), Some(sample_size_spec), false) = (
        BlockSizeSpec::from_tag_and_data(block_size_tag, block_size_hint),
        channel_assignment,
        sample_size_spec,
        reserved_bit,
    ) else {
        return format_fault(DecodeErrorStatus::UnparseableStream);
    };
    Ok(FrameHeader::from_specs(
        block_size_spec,
        channel_assignment,
        sample_size_spec,
        sample_rate_spec,
        offset,
    ))
}

fn read_hint<I: Input>(
    src: &mut BitSource<I>,
    raw: &mut Vec<u8>,
    bytes: usize,
) -> Result<u16, ReadFault> {
    let mut v = 0u16;
    for _ in 0..bytes {
        let x = src.read_u32(8)? as u8;
        raw.push(x);
        v = (v << 8) | u16::from(x);
    }
    Ok(v)
}

/// Reads a partitioned Rice coded residual into `dest`.
///
/// `dest.len()` is `block_size - predictor_order`.
fn read_residual<I: Input>(
    src: &mut BitSource<I>,
    block_size: usize,
    predictor_order: usize,
    dest: &mut [i32],
) -> Result<(), FrameFault> {
    let (parameter_bits, escape) = match src.read_u32(METHOD_BITS)? {
        0 => (PARAMETER_BITS, ESCAPE_PARAMETER),
        1 => (RICE2_PARAMETER_BITS, RICE2_ESCAPE_PARAMETER),
        _ => return format_fault(DecodeErrorStatus::UnparseableStream),
    };
    let partition_order = src.read_u32(PARTITION_ORDER_BITS)? as usize;
    let partition_len = block_size >> partition_order;
    if partition_len < predictor_order || block_size % (1 << partition_order) != 0 {
        return format_fault(DecodeErrorStatus::LostSync);
    }

    let mut head = 0;
    for p in 0..(1usize << partition_order) {
        let len = if p == 0 {
            partition_len - predictor_order
        } else {
            partition_len
        };
        let part = &mut dest[head..head + len];
        let parameter = src.read_u32(parameter_bits)?;
        if parameter == escape {
            let raw_bits = src.read_u32(RAW_BITS_LEN)? as usize;
            for v in part.iter_mut() {
                *v = src.read_signed(raw_bits)?;
            }
        } else {
            src.read_rice_signed_block(part, parameter as usize)?;
        }
        head += len;
    }
    Ok(())
}

thread_local! {
    /// Working buffer for residual signals.
    static RESIDUAL_BUFFER: RefCell<Vec<i32>> = const { RefCell::new(Vec::new()) };
}

/// Reads a subframe of `dest.len()` samples into `dest`.
///
/// `bits_per_sample` is the sample width of the channel including wasted
/// bits, i.e. one more than the stream width for side channels.
///
/// # Errors
///
/// Returns [`FrameFault::Format`] for a malformed subframe and
/// [`FrameFault::Read`] if the input ended.
pub fn decode_subframe<I: Input>(
    src: &mut BitSource<I>,
    bits_per_sample: usize,
    dest: &mut [i64],
) -> Result<(), FrameFault> {
    let block_size = dest.len();
    let x = src.read_u32(8)?;
    if x & 0x80 != 0 {
        return format_fault(DecodeErrorStatus::LostSync);
    }
    let wasted_bits = if x & 0x01 == 0 {
        0
    } else {
        src.read_unary()? as usize + 1
    };
    if wasted_bits >= bits_per_sample {
        return format_fault(DecodeErrorStatus::LostSync);
    }
    let bps = bits_per_sample - wasted_bits;

    match (x >> 1) & 0x3F {
        0 => {
            let v = read_wide_signed(src, bps)?;
            dest.fill(v);
        }
        1 => {
            for p in dest.iter_mut() {
                *p = read_wide_signed(src, bps)?;
            }
        }
        kind @ 8..=12 => {
            let order = kind as usize - 8;
            decode_fixed(src, order, bps, dest)?;
        }
        kind @ 32..=63 => {
            let order = (kind as usize & 0x1F) + 1;
            decode_lpc(src, order, bps, dest)?;
        }
        _ => return format_fault(DecodeErrorStatus::UnparseableStream),
    }

    if wasted_bits > 0 {
        for p in dest.iter_mut() {
            *p <<= wasted_bits;
        }
    }
    debug_assert_eq!(dest.len(), block_size);
    Ok(())
}

fn read_warm_up<I: Input>(
    src: &mut BitSource<I>,
    order: usize,
    bps: usize,
    dest: &mut [i64],
) -> Result<(), FrameFault> {
    if dest.len() <= order {
        return format_fault(DecodeErrorStatus::LostSync);
    }
    for p in &mut dest[..order] {
        *p = read_wide_signed(src, bps)?;
    }
    Ok(())
}

fn decode_fixed<I: Input>(
    src: &mut BitSource<I>,
    order: usize,
    bps: usize,
    dest: &mut [i64],
) -> Result<(), FrameFault> {
    read_warm_up(src, order, bps, dest)?;
    RESIDUAL_BUFFER.with(|buf| {
        let residual = &mut buf.borrow_mut();
        residual.resize(dest.len() - order, 0);
        read_residual(src, dest.len(), order, residual)?;
        fixed::restore_signal(order, residual, dest);
        Ok(())
    })
}

fn decode_lpc<I: Input>(
    src: &mut BitSource<I>,
    order: usize,
    bps: usize,
    dest: &mut [i64],
) -> Result<(), FrameFault> {
    read_warm_up(src, order, bps, dest)?;
    let precision = src.read_u32(PRECISION_BITS)? as usize + 1;
    if precision == 1 << PRECISION_BITS {
        return format_fault(DecodeErrorStatus::LostSync);
    }
    let shift = src.read_signed(SHIFT_BITS)?;
    if shift < 0 {
        return format_fault(DecodeErrorStatus::LostSync);
    }
    let mut coefs = heapless::Vec::<i32, MAX_LPC_ORDER>::new();
    for _ in 0..order {
        // `order` is at most 32 so this never overflows.
        let _ = coefs.push(src.read_signed(precision)?);
    }
    let params = QuantizedParameters::from_parts(coefs, precision as u8, shift as i8);

    RESIDUAL_BUFFER.with(|buf| {
        let residual = &mut buf.borrow_mut();
        residual.resize(dest.len() - order, 0);
        read_residual(src, dest.len(), order, residual)?;
        lpc::restore_signal(&params, bps, residual, dest);
        Ok(())
    })
}

/// Undoes inter-channel decorrelation of a stereo frame in place.
pub fn decorrelate(assignment: ChannelAssignment, channels: &mut [Vec<i64>], block_size: usize) {
    let [first, second] = channels else {
        return;
    };
    let (first, second) = (&mut first[..block_size], &mut second[..block_size]);
    match assignment {
        ChannelAssignment::Independent(_) => {}
        ChannelAssignment::LeftSide => {
            for (l, s) in first.iter().zip(second.iter_mut()) {
                *s = *l - *s;
            }
        }
        ChannelAssignment::RightSide => {
            for (s, r) in first.iter_mut().zip(second.iter()) {
                *s += *r;
            }
        }
        ChannelAssignment::MidSide => {
            for (m, s) in first.iter_mut().zip(second.iter_mut()) {
                let mid = (*m << 1) | (*s & 1);
                let side = *s;
                *m = (mid + side) >> 1;
                *s = (mid - side) >> 1;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::pedantic, clippy::nursery, clippy::needless_range_loop)]
mod tests {
    use super::*;
    use crate::bitsink::BitSink;
    use crate::bitsink::ByteSink;
    use crate::component::BitRepr;
    use crate::component::SubFrame;
    use crate::component::Verbatim;
    use crate::io::StreamIo;

    fn source(bytes: &[u8]) -> BitSource<StreamIo<&[u8]>> {
        BitSource::new(StreamIo::new(bytes))
    }

    fn header_bytes(header: &FrameHeader) -> Vec<u8> {
        let mut sink = ByteSink::new();
        header.write(&mut sink).unwrap();
        sink.into_inner()
    }

    #[test]
    fn header_round_trip() {
        let header = FrameHeader::new(
            4000,
            ChannelAssignment::MidSide,
            24,
            22050,
            FrameOffset::Frame(77),
        )
        .unwrap();
        let bytes = header_bytes(&header);
        let mut src = source(&bytes[2..]);
        let mut lookahead = None;
        let decoded =
            read_frame_header(&mut src, [bytes[0], bytes[1]], false, &mut lookahead).unwrap();
        assert_eq!(decoded, header);
        assert!(lookahead.is_none());
    }

    #[test]
    fn sample_number_is_read_when_forced() {
        let header = FrameHeader::new(
            192,
            ChannelAssignment::Independent(1),
            16,
            44100,
            FrameOffset::StartSample(987_654),
        )
        .unwrap();
        let mut bytes = header_bytes(&header);
        // Clear the blocking-strategy bit and fix up the header CRC.
        bytes[1] &= 0xFE;
        let last = bytes.len() - 1;
        bytes[last] = HEADER_CRC.checksum(&bytes[..last]);

        let mut lookahead = None;
        let decoded =
            read_frame_header(&mut source(&bytes[2..]), [bytes[0], bytes[1]], true, &mut lookahead)
                .unwrap();
        assert_eq!(decoded.frame_offset(), FrameOffset::StartSample(987_654));
    }

    #[test]
    fn header_crc_mismatch_is_bad_header() {
        let header = FrameHeader::new(
            1152,
            ChannelAssignment::Independent(2),
            16,
            44100,
            FrameOffset::Frame(0),
        )
        .unwrap();
        let mut bytes = header_bytes(&header);
        let last = bytes.len() - 1;
        bytes[last] ^= 0x5A;
        let mut lookahead = None;
        let ret = read_frame_header(&mut source(&bytes[2..]), [0xFF, 0xF8], false, &mut lookahead);
        assert_eq!(ret, Err(FrameFault::Format(DecodeErrorStatus::BadHeader)));
    }

    #[test]
    fn sync_byte_inside_header_is_cached() {
        let mut lookahead = None;
        let ret = read_frame_header(&mut source(&[0xFF, 0xF8]), [0xFF, 0xF8], false, &mut lookahead);
        assert_eq!(ret, Err(FrameFault::Format(DecodeErrorStatus::BadHeader)));
        assert_eq!(lookahead, Some(0xFF));
    }

    #[test]
    fn reserved_codes_are_unparseable() {
        // block size code 0, sample rate code 9, 2 channels, 16 bits (code 4).
        let mut bytes = vec![0xFF, 0xF8, 0x09, 0x18, 0x00];
        bytes.push(HEADER_CRC.checksum(&bytes));
        let mut lookahead = None;
        let ret = read_frame_header(&mut source(&bytes[2..]), [0xFF, 0xF8], false, &mut lookahead);
        assert_eq!(
            ret,
            Err(FrameFault::Format(DecodeErrorStatus::UnparseableStream))
        );

        // sample size code 3.
        let mut bytes = vec![0xFF, 0xF8, 0xC9, 0x16, 0x00];
        bytes.push(HEADER_CRC.checksum(&bytes));
        let ret = read_frame_header(&mut source(&bytes[2..]), [0xFF, 0xF8], false, &mut lookahead);
        assert_eq!(
            ret,
            Err(FrameFault::Format(DecodeErrorStatus::UnparseableStream))
        );
    }

    #[test]
    fn verbatim_subframe_with_33_bits() {
        let samples: Vec<i32> = vec![i32::MIN, i32::MAX, -1, 0, 1];
        let subframe: SubFrame = Verbatim::new(&samples, 32, 0).unwrap().into();
        let mut sink = ByteSink::new();
        subframe.write(&mut sink).unwrap();
        sink.align_to_byte().unwrap();
        let bytes = sink.into_inner();
        let mut dest = vec![0i64; samples.len()];
        decode_subframe(&mut source(&bytes), 32, &mut dest).unwrap();
        for t in 0..samples.len() {
            assert_eq!(dest[t], i64::from(samples[t]));
        }

        // 33-bit raw samples (e.g. a side channel of a 32-bit stream).
        let mut sink = ByteSink::new();
        sink.write_lsbs(0x02u8, 8).unwrap();
        sink.write_lsbs(1u64 << 32, 33).unwrap();
        sink.write_lsbs((1u64 << 32) - 1, 33).unwrap();
        sink.align_to_byte().unwrap();
        let bytes = sink.into_inner();
        let mut dest = vec![0i64; 2];
        decode_subframe(&mut source(&bytes), 33, &mut dest).unwrap();
        assert_eq!(dest, vec![-(1i64 << 32), (1i64 << 32) - 1]);
    }

    #[test]
    fn reserved_subframe_types() {
        let mut dest = vec![0i64; 16];
        for byte in [0x80u8, 0x04, 0x1A, 0x3E] {
            let expected = if byte & 0x80 != 0 {
                DecodeErrorStatus::LostSync
            } else {
                DecodeErrorStatus::UnparseableStream
            };
            let ret = decode_subframe(&mut source(&[byte, 0, 0, 0]), 16, &mut dest);
            assert_eq!(ret, Err(FrameFault::Format(expected)), "type byte {byte:#x}");
        }
    }

    #[test]
    fn wasted_bits_overflowing_sample_width_loses_sync() {
        // Constant subframe, wasted flag set, 8 wasted bits for an 8-bit stream.
        let mut dest = vec![0i64; 16];
        let ret = decode_subframe(&mut source(&[0x01, 0x01, 0x00]), 8, &mut dest);
        assert_eq!(ret, Err(FrameFault::Format(DecodeErrorStatus::LostSync)));
    }

    #[test]
    fn escaped_partition() {
        // Fixed order 0, Rice method 0, partition order 0, escape with 5-bit samples.
        let mut sink = ByteSink::new();
        sink.write_lsbs(0x10u8, 8).unwrap();
        sink.write_lsbs(0u8, 2).unwrap();
        sink.write_lsbs(0u8, 4).unwrap();
        sink.write_lsbs(15u8, 4).unwrap();
        sink.write_lsbs(5u8, 5).unwrap();
        for v in [-16i32, 15, 3, -1] {
            sink.write_twoc(v, 5).unwrap();
        }
        sink.align_to_byte().unwrap();
        let bytes = sink.into_inner();
        let mut dest = vec![0i64; 4];
        decode_subframe(&mut source(&bytes), 16, &mut dest).unwrap();
        assert_eq!(dest, vec![-16, 15, 3, -1]);
    }

    #[test]
    fn inverse_decorrelation() {
        let left = [100i64, -3, 7, 0];
        let right = [-50i64, 8, 7, 1];
        let side: Vec<i64> = left.iter().zip(right.iter()).map(|(l, r)| l - r).collect();
        let mid: Vec<i64> = left.iter().zip(right.iter()).map(|(l, r)| (l + r) >> 1).collect();

        let mut chs = vec![left.to_vec(), side.clone()];
        decorrelate(ChannelAssignment::LeftSide, &mut chs, 4);
        assert_eq!(chs, vec![left.to_vec(), right.to_vec()]);

        let mut chs = vec![side.clone(), right.to_vec()];
        decorrelate(ChannelAssignment::RightSide, &mut chs, 4);
        assert_eq!(chs, vec![left.to_vec(), right.to_vec()]);

        let mut chs = vec![mid, side];
        decorrelate(ChannelAssignment::MidSide, &mut chs, 4);
        assert_eq!(chs, vec![left.to_vec(), right.to_vec()]);
    }
}
