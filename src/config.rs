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

//! Encoder and decoder configuration structs.

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use super::component::BlockType;
use super::constant::encoder::DEFAULT_BLOCK_SIZE_FIXED;
use super::constant::encoder::DEFAULT_BLOCK_SIZE_LPC;
use super::constant::encoder::MAX_COMPRESSION_LEVEL;
use super::constant::metadata::INVALID_BLOCK_TYPE;
use super::constant::qlpc::MAX_ORDER as MAX_LPC_ORDER;
use super::constant::qlpc::MAX_PRECISION;
use super::constant::qlpc::MIN_PRECISION;
use super::constant::rice::MAX_PARTITION_ORDER;
use super::constant::MAX_BLOCK_SIZE;
use super::constant::MAX_CHANNELS;
use super::constant::MIN_BITS_PER_SAMPLE;
use super::constant::MIN_BLOCK_SIZE;
use super::constant::REFERENCE_MAX_BITS_PER_SAMPLE;
use super::error::verify_range;
use super::error::verify_true;
use super::error::Verify;
use super::error::VerifyError;
use super::format;

/// Configuration for encoder.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Encoder {
    /// Number of channels.
    pub channels: usize,
    /// Bits per sample of the input.
    pub bits_per_sample: usize,
    /// Sampling rate in Hz.
    pub sample_rate: usize,
    /// Samples per frame. Zero selects a default depending on `max_lpc_order`.
    pub block_size: usize,
    /// If set, settings outside of the streamable subset are rejected.
    pub streamable_subset: bool,
    /// If set, stereo inputs also try mid-side decorrelation.
    pub mid_side: bool,
    /// If set, the stereo assignment is only re-evaluated periodically.
    pub loose_mid_side: bool,
    /// Apodization windows, e.g. `"tukey(5e-1);partial_tukey(2)"`.
    pub apodization: String,
    /// Maximum LPC order. Zero disables LPC.
    pub max_lpc_order: usize,
    /// Precision of quantized coefficients. Zero selects it automatically.
    pub qlp_coeff_precision: usize,
    /// If set, every coefficient precision is tried.
    pub qlp_coeff_prec_search: bool,
    /// If set, every predictor order is tried instead of the estimated best.
    pub exhaustive_model_search: bool,
    /// Lower limit of the Rice partition order.
    pub min_residual_partition_order: usize,
    /// Upper limit of the Rice partition order.
    pub max_residual_partition_order: usize,
    /// Expected number of inter-channel samples. Zero if unknown.
    pub total_samples_estimate: u64,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::from_preset(5)
    }
}

/// Settings that differ between compression presets.
struct Preset {
    mid_side: bool,
    loose_mid_side: bool,
    max_lpc_order: usize,
    max_residual_partition_order: usize,
    apodization: &'static str,
}

#[rustfmt::skip]
const PRESETS: [Preset; MAX_COMPRESSION_LEVEL + 1] = [
    Preset { mid_side: false, loose_mid_side: false, max_lpc_order: 0, max_residual_partition_order: 3, apodization: "tukey(5e-1)" },
    Preset { mid_side: true, loose_mid_side: true, max_lpc_order: 0, max_residual_partition_order: 3, apodization: "tukey(5e-1)" },
    Preset { mid_side: true, loose_mid_side: false, max_lpc_order: 0, max_residual_partition_order: 3, apodization: "tukey(5e-1)" },
    Preset { mid_side: false, loose_mid_side: false, max_lpc_order: 6, max_residual_partition_order: 4, apodization: "tukey(5e-1)" },
    Preset { mid_side: true, loose_mid_side: true, max_lpc_order: 8, max_residual_partition_order: 4, apodization: "tukey(5e-1)" },
    Preset { mid_side: true, loose_mid_side: false, max_lpc_order: 8, max_residual_partition_order: 5, apodization: "tukey(5e-1)" },
    Preset { mid_side: true, loose_mid_side: false, max_lpc_order: 8, max_residual_partition_order: 6, apodization: "tukey(5e-1);partial_tukey(2)" },
    Preset { mid_side: true, loose_mid_side: false, max_lpc_order: 12, max_residual_partition_order: 6, apodization: "tukey(5e-1);partial_tukey(2)" },
    Preset { mid_side: true, loose_mid_side: false, max_lpc_order: 12, max_residual_partition_order: 6, apodization: "tukey(5e-1);partial_tukey(2);punchout_tukey(3)" },
];

impl Encoder {
    /// Constructs a configuration for a compression level.
    ///
    /// Levels above 8 are treated as 8. The stream shape defaults to 16-bit
    /// stereo at 44.1kHz.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::config;
    /// let fast = config::Encoder::from_preset(0);
    /// assert_eq!(fast.max_lpc_order, 0);
    /// assert!(!fast.mid_side);
    ///
    /// let best = config::Encoder::from_preset(100);
    /// assert_eq!(best, config::Encoder::from_preset(8));
    /// assert_eq!(best.max_lpc_order, 12);
    /// ```
    pub fn from_preset(level: usize) -> Self {
        let preset = &PRESETS[level.min(MAX_COMPRESSION_LEVEL)];
        Self {
            channels: 2,
            bits_per_sample: 16,
            sample_rate: 44100,
            block_size: 0,
            streamable_subset: true,
            mid_side: preset.mid_side,
            loose_mid_side: preset.loose_mid_side,
            apodization: preset.apodization.to_owned(),
            max_lpc_order: preset.max_lpc_order,
            qlp_coeff_precision: 0,
            qlp_coeff_prec_search: false,
            exhaustive_model_search: false,
            min_residual_partition_order: 0,
            max_residual_partition_order: preset.max_residual_partition_order,
            total_samples_estimate: 0,
        }
    }

    /// Returns the block size used for encoding.
    pub const fn effective_block_size(&self) -> usize {
        if self.block_size != 0 {
            self.block_size
        } else if self.max_lpc_order == 0 {
            DEFAULT_BLOCK_SIZE_FIXED
        } else {
            DEFAULT_BLOCK_SIZE_LPC
        }
    }

    /// Returns `(min, max)` partition orders after clamping.
    pub fn effective_partition_orders(&self) -> (usize, usize) {
        let max = self.max_residual_partition_order.min(MAX_PARTITION_ORDER);
        (self.min_residual_partition_order.min(max), max)
    }
}

impl Verify for Encoder {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_range!("channels", self.channels, 1..=MAX_CHANNELS)?;
        verify_range!(
            "bits_per_sample",
            self.bits_per_sample,
            MIN_BITS_PER_SAMPLE..=REFERENCE_MAX_BITS_PER_SAMPLE
        )?;
        verify_true!(
            "sample_rate",
            self.sample_rate > 0 && format::sample_rate_is_valid(self.sample_rate as u32),
            "must be representable in STREAMINFO"
        )?;
        if self.block_size != 0 {
            verify_range!("block_size", self.block_size, MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE)?;
        }
        verify_range!("max_lpc_order", self.max_lpc_order, ..=MAX_LPC_ORDER)?;
        if self.qlp_coeff_precision != 0 {
            verify_range!(
                "qlp_coeff_precision",
                self.qlp_coeff_precision,
                MIN_PRECISION..=MAX_PRECISION
            )?;
        }
        verify_true!(
            "block_size",
            self.effective_block_size() >= self.max_lpc_order,
            "must not be smaller than max_lpc_order"
        )?;
        Ok(())
    }
}

/// Selects which metadata blocks are reported to the caller.
///
/// STREAMINFO and SEEKTABLE are parsed regardless of this filter; it only
/// decides whether they are returned. APPLICATION blocks can additionally be
/// selected by their id.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MetadataFilter {
    /// Block type tags that are reported.
    responded_types: Vec<u8>,
    /// APPLICATION ids whose treatment is inverted from the type rule.
    application_exceptions: Vec<[u8; 4]>,
}

impl Default for MetadataFilter {
    fn default() -> Self {
        Self {
            responded_types: vec![BlockType::StreamInfo.tag()],
            application_exceptions: vec![],
        }
    }
}

impl MetadataFilter {
    fn set_type(&mut self, tag: u8, respond: bool) {
        self.responded_types.retain(|&t| t != tag);
        if respond {
            self.responded_types.push(tag);
            self.responded_types.sort_unstable();
        }
        if tag == BlockType::Application.tag() {
            self.application_exceptions.clear();
        }
    }

    /// Reports blocks of `block_type`.
    pub fn respond(&mut self, block_type: BlockType) {
        self.set_type(block_type.tag(), true);
    }

    /// Stops reporting blocks of `block_type`.
    pub fn ignore(&mut self, block_type: BlockType) {
        self.set_type(block_type.tag(), false);
    }

    /// Reports APPLICATION blocks with `id` even if APPLICATION is ignored.
    pub fn respond_application(&mut self, id: [u8; 4]) {
        if !self.type_is_responded(BlockType::Application.tag())
            && !self.application_exceptions.contains(&id)
        {
            self.application_exceptions.push(id);
        }
    }

    /// Ignores APPLICATION blocks with `id` even if APPLICATION is reported.
    pub fn ignore_application(&mut self, id: [u8; 4]) {
        if self.type_is_responded(BlockType::Application.tag())
            && !self.application_exceptions.contains(&id)
        {
            self.application_exceptions.push(id);
        }
    }

    /// Reports every block.
    pub fn respond_all(&mut self) {
        self.responded_types = (0..INVALID_BLOCK_TYPE).collect();
        self.application_exceptions.clear();
    }

    /// Ignores every block.
    pub fn ignore_all(&mut self) {
        self.responded_types.clear();
        self.application_exceptions.clear();
    }

    fn type_is_responded(&self, tag: u8) -> bool {
        self.responded_types.binary_search(&tag).is_ok()
    }

    /// Returns `true` if a block with `tag` (and APPLICATION `id`) is reported.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::config::MetadataFilter;
    /// # use flacodec::component::BlockType;
    /// let mut filter = MetadataFilter::default();
    /// assert!(filter.responds_to(0, None));
    /// assert!(!filter.responds_to(4, None));
    ///
    /// filter.respond_application(*b"riff");
    /// assert!(filter.responds_to(2, Some(*b"riff")));
    /// assert!(!filter.responds_to(2, Some(*b"xmcd")));
    ///
    /// filter.respond(BlockType::Application);
    /// assert!(filter.responds_to(2, Some(*b"xmcd")));
    /// ```
    pub fn responds_to(&self, tag: u8, application_id: Option<[u8; 4]>) -> bool {
        let by_type = self.type_is_responded(tag);
        if tag == BlockType::Application.tag() {
            if let Some(id) = application_id {
                return by_type != self.application_exceptions.contains(&id);
            }
        }
        by_type
    }

    /// Returns `true` if APPLICATION `id` decisions need the block id.
    pub(crate) fn has_application_exceptions(&self) -> bool {
        !self.application_exceptions.is_empty()
    }
}

/// Configuration for decoder.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Decoder {
    /// If set, decoded samples are checked against the STREAMINFO MD5.
    pub md5_checking: bool,
    /// Metadata blocks reported to the caller.
    pub metadata: MetadataFilter,
}

impl Verify for Decoder {
    fn verify(&self) -> Result<(), VerifyError> {
        for (i, &t) in self.metadata.responded_types.iter().enumerate() {
            verify_true!(
                "metadata.responded_types[{i}]",
                t < INVALID_BLOCK_TYPE,
                "must be a valid block type"
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::pedantic, clippy::nursery, clippy::needless_range_loop)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[test]
    fn serialization() {
        let config = Encoder::default();
        assert!(toml::to_string(&config).is_ok());
        assert!(toml::to_string(&Decoder::default()).is_ok());
    }

    #[test]
    fn deserialization() {
        let src = "
max_lpc_order = 7
apodization = \"welch\"
";
        let config: Encoder = toml::from_str(src).expect("Parse error.");
        assert_eq!(config.max_lpc_order, 7);
        assert_eq!(config.apodization, "welch");

        // Check the rest is default.
        assert_eq!(config.qlp_coeff_precision, 0);
        assert_eq!(config.block_size, 0);
        assert_eq!(config.effective_block_size(), DEFAULT_BLOCK_SIZE_LPC);
        assert!(config.mid_side);
    }

    #[test]
    fn if_empty_source_yields_default_config() {
        let empty_src = "";
        let config: Encoder = toml::from_str(empty_src).expect("Parse error.");
        let default_config: Encoder = Encoder::default();
        eprintln!(
            "## Current default config\n\n{}",
            toml::to_string(&config).unwrap()
        );
        assert_eq!(config, default_config);

        let config: Decoder = toml::from_str(empty_src).expect("Parse error.");
        assert_eq!(config, Decoder::default());
    }

    #[rstest]
    #[case(0, false, false, 0, 3)]
    #[case(1, true, true, 0, 3)]
    #[case(2, true, false, 0, 3)]
    #[case(3, false, false, 6, 4)]
    #[case(4, true, true, 8, 4)]
    #[case(5, true, false, 8, 5)]
    #[case(6, true, false, 8, 6)]
    #[case(7, true, false, 12, 6)]
    #[case(8, true, false, 12, 6)]
    fn presets(
        #[case] level: usize,
        #[case] mid_side: bool,
        #[case] loose_mid_side: bool,
        #[case] max_lpc_order: usize,
        #[case] max_partition_order: usize,
    ) {
        let config = Encoder::from_preset(level);
        assert_eq!(config.mid_side, mid_side);
        assert_eq!(config.loose_mid_side, loose_mid_side);
        assert_eq!(config.max_lpc_order, max_lpc_order);
        assert_eq!(config.max_residual_partition_order, max_partition_order);
        assert_eq!(config.min_residual_partition_order, 0);
        assert_eq!(config.qlp_coeff_precision, 0);
        assert!(!config.qlp_coeff_prec_search);
        assert!(!config.exhaustive_model_search);
        assert!(config.verify().is_ok());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut config = Encoder::default();
        config.channels = 9;
        assert_eq!(config.verify().unwrap_err().path(), "channels");

        let mut config = Encoder::default();
        config.bits_per_sample = 32;
        assert!(config.verify().is_err());

        let mut config = Encoder::default();
        config.qlp_coeff_precision = 4;
        assert!(config.verify().is_err());
        config.qlp_coeff_precision = 0;
        config.block_size = 16;
        config.max_lpc_order = 24;
        assert!(config.verify().is_err());
    }

    #[test]
    fn partition_orders_are_clamped() {
        let mut config = Encoder::default();
        config.min_residual_partition_order = 20;
        config.max_residual_partition_order = 18;
        assert_eq!(config.effective_partition_orders(), (15, 15));
        config.max_residual_partition_order = 4;
        assert_eq!(config.effective_partition_orders(), (4, 4));
    }

    #[test]
    fn metadata_filter_rules() {
        let mut filter = MetadataFilter::default();
        filter.respond(BlockType::VorbisComment);
        assert!(filter.responds_to(4, None));
        filter.ignore(BlockType::StreamInfo);
        assert!(!filter.responds_to(0, None));

        filter.respond_all();
        for t in 0..127 {
            assert!(filter.responds_to(t, None));
        }
        filter.ignore_application(*b"abcd");
        assert!(!filter.responds_to(2, Some(*b"abcd")));
        assert!(filter.responds_to(2, Some(*b"efgh")));

        filter.ignore_all();
        assert!(!filter.responds_to(0, None));
        assert!(!filter.has_application_exceptions());
        assert!(Decoder::default().verify().is_ok());
    }
}
