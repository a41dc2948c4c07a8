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

use crate::constant::fixed::MAX_ORDER as MAX_FIXED_ORDER;
use crate::constant::qlpc::MAX_ORDER as MAX_LPC_ORDER;
use crate::constant::qlpc::MAX_PRECISION as MAX_LPC_PRECISION;
use crate::constant::rice::MAX_PARTITION_ORDER;
use crate::constant::MAX_CHANNELS;
use crate::constant::MAX_SAMPLE_RATE;
use crate::error::verify_range;
use crate::error::verify_true;
use crate::error::Verify;
use crate::error::VerifyError;
use crate::format;

use super::frame::ChannelAssignment;
use super::frame::FrameHeader;
use super::metadata::Application;
use super::metadata::BlockType;
use super::metadata::CueSheet;
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
use super::subframe::QuantizedParameters;
use super::subframe::Residual;
use super::subframe::SubFrame;
use super::subframe::Verbatim;

/// Largest LPC shift the reference decoder accepts.
const MAX_LPC_SHIFT: i8 = 15;

// Some (internal) utility macros for value verification.
macro_rules! verify_block_size {
    ($varname:literal, $size:expr) => {
        verify_range!($varname, $size, 1..=(crate::constant::MAX_BLOCK_SIZE))
    };
}
pub(crate) use verify_block_size;

/// Checks the sample width of a subframe body (a side channel takes one extra bit).
macro_rules! verify_bps {
    ($varname:literal, $bps:expr) => {
        verify_range!(
            $varname,
            $bps,
            1..=(crate::constant::MAX_BITS_PER_SAMPLE + 1)
        )
    };
}
pub(crate) use verify_bps;

macro_rules! verify_sample_range {
    ($varname:literal, $sample:expr, $bps:expr) => {{
        let half = 1i64 << ($bps as usize - 1);
        let min_sample = -half;
        let max_sample = half - 1;
        verify_range!($varname, i64::from($sample), min_sample..=max_sample)
    }};
}
pub(crate) use verify_sample_range;

impl Verify for MetadataBlock {
    fn verify(&self) -> Result<(), VerifyError> {
        self.data.verify().map_err(|e| e.within("data"))
    }
}

impl Verify for MetadataBlockData {
    fn verify(&self) -> Result<(), VerifyError> {
        match self {
            Self::StreamInfo(info) => info.verify(),
            Self::Padding(_) => Ok(()),
            Self::Application(app) => app.verify(),
            Self::SeekTable(table) => table.verify(),
            Self::VorbisComment(vc) => vc.verify(),
            Self::CueSheet(sheet) => sheet.verify(),
            Self::Picture(pic) => pic.verify(),
            Self::Unknown { typetag, .. } => {
                verify_range!("typetag", *typetag, ..127u8)?;
                verify_true!(
                    "typetag",
                    matches!(BlockType::from_tag(*typetag), BlockType::Unknown(_)),
                    "must not be a tag of a known block type"
                )
            }
        }
    }
}

impl Verify for StreamInfo {
    fn verify(&self) -> Result<(), VerifyError> {
        if self.max_block_size != 0 {
            verify_true!(
                "min_block_size",
                self.min_block_size <= self.max_block_size,
                "must be smaller than `max_block_size`"
            )?;
        }
        if self.min_frame_size != 0 && self.max_frame_size != 0 {
            verify_true!(
                "min_frame_size",
                self.min_frame_size <= self.max_frame_size,
                "must be smaller than `max_frame_size`"
            )?;
        }
        verify_range!("max_frame_size", self.max_frame_size, ..(1u32 << 24))?;
        verify_range!("sample_rate", self.sample_rate as usize, 1..=MAX_SAMPLE_RATE)?;
        verify_range!("channels", self.channels as usize, 1..=MAX_CHANNELS)?;
        verify_range!(
            "bits_per_sample",
            self.bits_per_sample as usize,
            (crate::constant::MIN_BITS_PER_SAMPLE)..=(crate::constant::MAX_BITS_PER_SAMPLE)
        )?;
        verify_range!("total_samples", self.total_samples, ..(1u64 << 36))
    }
}

impl Verify for SeekTable {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_true!(
            "points",
            format::seektable_is_legal(self),
            "must be sorted and unique, with placeholders at the end"
        )
    }
}

impl Verify for VorbisComment {
    fn verify(&self) -> Result<(), VerifyError> {
        for (i, entry) in self.comments.iter().enumerate() {
            verify_true!(
                "comments[{i}]",
                format::vorbiscomment_entry_is_legal(entry),
                "must be a legal NAME=value entry"
            )?;
        }
        Ok(())
    }
}

impl Verify for CueSheet {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_range!("media_catalog_number.len", self.media_catalog_number.len(), ..=128)?;
        format::cuesheet_is_legal(self, self.is_cd).map_err(|msg| VerifyError::new("tracks", msg))
    }
}

impl Verify for Picture {
    fn verify(&self) -> Result<(), VerifyError> {
        format::picture_is_legal(self).map_err(|msg| VerifyError::new("picture", msg))
    }
}

impl Verify for Application {
    fn verify(&self) -> Result<(), VerifyError> {
        Ok(())
    }
}

impl Verify for ChannelAssignment {
    fn verify(&self) -> Result<(), VerifyError> {
        match *self {
            Self::Independent(ch) => {
                verify_range!("Independent(ch)", ch as usize, 1..=MAX_CHANNELS)
            }
            Self::LeftSide | Self::RightSide | Self::MidSide => Ok(()),
        }
    }
}

impl Verify for FrameHeader {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_block_size!("block_size", self.block_size())?;
        if self.is_variable_blocking() {
            verify_range!("start_sample_number", self.start_sample_number(), ..(1u64 << 36))?;
        } else {
            verify_range!("frame_number", self.frame_number(), ..(1u32 << 31))?;
        }
        self.channel_assignment()
            .verify()
            .map_err(|e| e.within("channel_assignment"))
    }
}

impl Verify for SubFrame {
    fn verify(&self) -> Result<(), VerifyError> {
        match self {
            Self::Verbatim(c) => c.verify(),
            Self::Constant(c) => c.verify(),
            Self::FixedLpc(c) => c.verify(),
            Self::Lpc(c) => c.verify(),
        }
    }
}

impl Verify for Constant {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_block_size!("block_size", self.block_size())?;
        verify_bps!("bits_per_sample", self.bits_per_sample())?;
        verify_sample_range!("dc_offset", self.dc_offset(), self.bits_per_sample())
    }
}

impl Verify for Verbatim {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_block_size!("data.len", self.samples().len())?;
        verify_bps!("bits_per_sample", self.bits_per_sample())?;
        for (t, v) in self.samples().iter().enumerate() {
            verify_sample_range!("data[{t}]", *v, self.bits_per_sample())?;
        }
        Ok(())
    }
}

impl Verify for FixedLpc {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_range!("order", self.order(), ..=MAX_FIXED_ORDER)?;
        verify_bps!("bits_per_sample", self.bits_per_sample())?;
        for (t, v) in self.warm_up().iter().enumerate() {
            verify_sample_range!("warm_up[{t}]", *v, self.bits_per_sample())?;
        }
        verify_true!(
            "residual.warmup_length",
            self.residual().warmup_length() == self.order(),
            "must be equal to the predictor order"
        )?;
        self.residual()
            .verify()
            .map_err(|err| err.within("residual"))
    }
}

impl Verify for Lpc {
    fn verify(&self) -> Result<(), VerifyError> {
        self.parameters()
            .verify()
            .map_err(|err| err.within("parameters"))?;
        verify_bps!("bits_per_sample", self.bits_per_sample())?;
        verify_true!(
            "warm_up.len",
            self.warm_up().len() == self.order(),
            "must be equal to the predictor order"
        )?;
        for (t, v) in self.warm_up().iter().enumerate() {
            verify_sample_range!("warm_up[{t}]", *v, self.bits_per_sample())?;
        }
        verify_true!(
            "residual.warmup_length",
            self.residual().warmup_length() == self.order(),
            "must be equal to the predictor order"
        )?;
        self.residual()
            .verify()
            .map_err(|err| err.within("residual"))
    }
}

impl Verify for QuantizedParameters {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_range!("order", self.order(), 1..=MAX_LPC_ORDER)?;
        verify_range!("shift", self.shift(), 0..=MAX_LPC_SHIFT)?;
        verify_range!("precision", self.precision(), 1..=MAX_LPC_PRECISION)?;
        for (i, c) in self.coefs().iter().enumerate() {
            verify_sample_range!("coefs[{i}]", *c, self.precision())?;
        }
        Ok(())
    }
}

impl Verify for Residual {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_block_size!("block_size", self.block_size())?;
        verify_range!("partition_order", self.partition_order(), ..=MAX_PARTITION_ORDER)?;
        let order = self.partition_order();
        let nparts = 1usize << order;
        verify_true!(
            "block_size",
            self.block_size() % nparts == 0,
            "must be divisible by the number of partitions"
        )?;
        verify_true!(
            "warmup_length",
            (self.block_size() >> order) >= self.warmup_length(),
            "must fit in the first partition"
        )?;
        verify_true!(
            "residuals.len",
            self.residuals().len() + self.warmup_length() == self.block_size(),
            "must be equal to `block_size - warmup_length`"
        )?;
        let params = self.method().contents().parameters();
        verify_true!(
            "parameters.len",
            params.len() == nparts,
            "must be equal to the number of partitions"
        )?;

        let escape_code = self.method().escape_code();
        for (p, param) in params.iter().enumerate() {
            match *param {
                PartitionParameter::Rice(k) => {
                    verify_range!("parameters[{p}]", u32::from(k), ..escape_code)?;
                }
                PartitionParameter::Escaped(w) => {
                    verify_range!("parameters[{p}]", w, ..=31u8)?;
                    let range = self.partition_range(p);
                    for (t, v) in self.residuals()[range.clone()].iter().enumerate() {
                        let idx = range.start + t;
                        if w == 0 {
                            verify_true!(
                                "residuals[{idx}]",
                                *v == 0,
                                "must be zero in a zero-width partition"
                            )?;
                        } else {
                            let half = 1i64 << (w - 1);
                            verify_true!(
                                "residuals[{idx}]",
                                (-half..half).contains(&i64::from(*v)),
                                "must fit in the escaped width"
                            )?;
                        }
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
    use crate::component::EntropyCodingMethod;
    use crate::component::FrameOffset;
    use crate::component::SeekPoint;

    #[test]
    fn residual_partitioning_checks() {
        let rice = |order, n| EntropyCodingMethod::rice(order, vec![PartitionParameter::Rice(1); n]);
        assert!(Residual::new(rice(2, 4), 16, 4, &[0; 12]).is_ok());
        // first partition shorter than the warm-up.
        assert!(Residual::new(rice(2, 4), 16, 5, &[0; 11]).is_err());
        // block size not divisible.
        assert!(Residual::new(rice(2, 4), 18, 2, &[0; 16]).is_err());
        // parameter count mismatch.
        assert!(Residual::new(rice(1, 4), 16, 0, &[0; 16]).is_err());
        // residual length mismatch.
        assert!(Residual::new(rice(0, 1), 16, 0, &[0; 15]).is_err());
    }

    #[test]
    fn rice_parameter_must_not_be_escape_code() {
        let method = EntropyCodingMethod::rice(0, vec![PartitionParameter::Rice(15)]);
        let err = Residual::new(method, 4, 0, &[0; 4]).unwrap_err();
        assert_eq!(err.path(), "parameters[0]");
        let method = EntropyCodingMethod::rice2(0, vec![PartitionParameter::Rice(15)]);
        assert!(Residual::new(method, 4, 0, &[0; 4]).is_ok());
    }

    #[test]
    fn zero_width_escape_requires_zeros() {
        let method = EntropyCodingMethod::rice(0, vec![PartitionParameter::Escaped(0)]);
        assert!(Residual::new(method.clone(), 4, 0, &[0; 4]).is_ok());
        assert!(Residual::new(method, 4, 0, &[0, 0, 1, 0]).is_err());
    }

    #[test]
    fn quantized_parameter_ranges() {
        assert!(QuantizedParameters::new(&[], 12, 3).is_err());
        assert!(QuantizedParameters::new(&[-2048, 2047], 12, 15).is_ok());
        assert!(QuantizedParameters::new(&[2048], 12, 15).is_err());
        assert!(QuantizedParameters::new(&[1], 12, -1).is_err());
        assert!(QuantizedParameters::new(&[1], 16, 0).is_err());
    }

    #[test]
    fn subframe_sample_ranges() {
        assert!(Constant::new(16, -128, 8, 0).is_ok());
        assert!(Constant::new(16, 128, 8, 0).is_err());
        // side channel of a 32-bit stream.
        assert!(Verbatim::new(&[i32::MIN, i32::MAX], 33, 0).is_ok());
        let err = Verbatim::new(&[0, 9], 4, 0).unwrap_err();
        assert_eq!(err.path(), "data[1]");
    }

    #[test]
    fn frame_header_numbers() {
        let chs = ChannelAssignment::Independent(2);
        let mut header = FrameHeader::new(1024, chs, 16, 44100, FrameOffset::Frame(0)).unwrap();
        assert!(header.verify().is_ok());
        header.set_frame_offset(FrameOffset::Frame(1 << 31));
        assert!(header.verify().is_err());
        header.set_frame_offset(FrameOffset::StartSample((1 << 36) - 1));
        assert!(header.verify().is_ok());
    }

    #[test]
    fn metadata_blocks() {
        let table = SeekTable {
            points: vec![SeekPoint::new(0, 0, 16), SeekPoint::new(0, 10, 16)],
        };
        let block = MetadataBlock::new(false, table.into());
        assert_eq!(block.verify().unwrap_err().path(), "data.points");

        let vc = VorbisComment {
            vendor: vec![],
            comments: vec![b"TITLE=x".to_vec(), b"no separator".to_vec()],
        };
        assert_eq!(vc.verify().unwrap_err().path(), "comments[1]");

        let mut info = StreamInfo::new(44100, 2, 16).unwrap();
        info.min_block_size = 4096;
        info.max_block_size = 1024;
        assert!(info.verify().is_err());
    }
}
