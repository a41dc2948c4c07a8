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

//! Format constants

#![allow(dead_code)] // it's okay if some FLAC-spec constants are not used.

// Constance sorted in an alphabetical-order.  Top-level constants first, and
// then sub-modules. Constants that are used only in a specific sub-module or
// its caller should be placed in the corresponding submodule.

/// Maximum bits-per-sample expressible in the format.
pub const MAX_BITS_PER_SAMPLE: usize = 32;

/// Maximum length of a block (65535 in the format.)
pub const MAX_BLOCK_SIZE: usize = 65535;

/// Maximum number of channels.
pub const MAX_CHANNELS: usize = 8;

/// Maximum sample rate expressible in STREAMINFO (20 bits).
pub const MAX_SAMPLE_RATE: usize = (1 << 20) - 1;

/// Minimum bits-per-sample expressible in the format.
pub const MIN_BITS_PER_SAMPLE: usize = 4;

/// Minimum length of a block accepted by the encoder.
pub const MIN_BLOCK_SIZE: usize = 16;

/// Maximum bits-per-sample the encoder accepts.
pub const REFERENCE_MAX_BITS_PER_SAMPLE: usize = 24;

/// Stream marker at the head of every FLAC stream.
pub const STREAM_SYNC: [u8; 4] = *b"fLaC";

/// Constants related to decoder behavior.
pub mod decoder {
    /// Number of unparseable frames tolerated while seeking.
    pub const MAX_UNPARSEABLE_WHILE_SEEKING: u32 = 20;

    /// Size of the read buffer of `BitSource` in bytes.
    pub const READ_CHUNK_SIZE: usize = 4096;
}

/// Constants related to encoder behavior.
pub mod encoder {
    /// Default block size for encoders without LPC.
    pub const DEFAULT_BLOCK_SIZE_FIXED: usize = 1152;

    /// Default block size for encoders with LPC.
    pub const DEFAULT_BLOCK_SIZE_LPC: usize = 4096;

    /// Length (in seconds) of a loose mid-side evaluation period.
    pub const LOOSE_MID_SIDE_PERIOD_SECS: f64 = 0.4;

    /// Highest compression preset.
    pub const MAX_COMPRESSION_LEVEL: usize = 8;
}

/// Constants related to fixed-parameter LPC encoding.
pub mod fixed {
    /// Maximum order of fixed LPC.
    pub const MAX_ORDER: usize = 4;
}

/// Constants related to metadata blocks.
pub mod metadata {
    /// Length of the metadata block header in bytes.
    pub const BLOCK_HEADER_LEN: usize = 4;

    /// Block type tag that is invalid in every stream.
    pub const INVALID_BLOCK_TYPE: u8 = 127;

    /// Maximum number of entries accepted while parsing VORBIS_COMMENT.
    pub const MAX_VORBIS_COMMENTS: usize = 100_000;

    /// Maximum value stored in the 24-bit block length field.
    pub const MAX_BLOCK_LEN: usize = (1 << 24) - 1;

    /// Length of a single seek point in bytes.
    pub const SEEKPOINT_LEN: usize = 18;

    /// Sample number of a placeholder seek point.
    pub const SEEKPOINT_PLACEHOLDER: u64 = u64::MAX;

    /// Byte offset of the MD5 digest in STREAMINFO.
    pub const STREAMINFO_MD5_OFFSET: usize = 18;
}

/// Constants related to quantized linear predictive coding (QLPC).
pub mod qlpc {
    /// Maximum order of LPC.
    pub const MAX_ORDER: usize = 32;

    /// Max number of bits (precision) for storing QLPC coefficients.
    pub const MAX_PRECISION: usize = 15;

    /// Maximum shift parameter of QLPC.
    pub const MAX_SHIFT: i32 = (1i32 << (SHIFT_BITS - 1)) - 1;

    /// Minimum bits (precision) for storing QLPC coefficients.
    pub const MIN_PRECISION: usize = 5;

    /// Minimum shift parameter representable in the bitstream.
    pub const MIN_SHIFT: i32 = -(1i32 << (SHIFT_BITS - 1));

    /// The number of bits used for storing the coefficient precision.
    pub const PRECISION_BITS: usize = 4;

    /// The number of bits used for encoding shift bits of QLPC.
    pub const SHIFT_BITS: usize = 5;

    /// Maximum number of apodization windows evaluated per subframe.
    pub const MAX_APODIZATIONS: usize = 32;
}

/// Constants related to partitioned rice coding (PRC).
pub mod rice {
    /// Escape code of the 4-bit parameter method.
    pub const ESCAPE_PARAMETER: u32 = 15;

    /// Maximum order of Rice parameter partitioning.
    pub const MAX_PARTITION_ORDER: usize = 15;

    /// Bits used for the coding method field.
    pub const METHOD_BITS: usize = 2;

    /// Bits used for the parameter of the 4-bit parameter method.
    pub const PARAMETER_BITS: usize = 4;

    /// Bits used for the partition order field.
    pub const PARTITION_ORDER_BITS: usize = 4;

    /// Bits used for the raw sample width of an escaped partition.
    pub const RAW_BITS_LEN: usize = 5;

    /// Escape code of the 5-bit parameter method.
    pub const RICE2_ESCAPE_PARAMETER: u32 = 31;

    /// Bits used for the parameter of the 5-bit parameter method.
    pub const RICE2_PARAMETER_BITS: usize = 5;
}

/// Constants related to the streamable subset.
pub mod subset {
    /// Maximum block size of subset streams.
    pub const MAX_BLOCK_SIZE: usize = 16384;

    /// Maximum block size of subset streams sampled at 48kHz or lower.
    pub const MAX_BLOCK_SIZE_48000HZ: usize = 4608;

    /// Maximum LPC order of subset streams sampled at 48kHz or lower.
    pub const MAX_LPC_ORDER_48000HZ: usize = 12;

    /// Maximum Rice partition order of subset streams.
    pub const MAX_RICE_PARTITION_ORDER: usize = 8;
}
