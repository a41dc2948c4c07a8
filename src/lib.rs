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

#![doc = include_str!("../README.md")]
#![warn(clippy::all, clippy::nursery, clippy::pedantic, clippy::cargo)]
// Some of clippy::pedantic rules are actually useful, so use it with a lot of
// ad-hoc exceptions.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::missing_const_for_fn,
    clippy::multiple_crate_versions,
    clippy::must_use_candidate,
    clippy::wildcard_dependencies
)]
// Some from restriction lint-group
#![warn(
    clippy::clone_on_ref_ptr,
    clippy::create_dir,
    clippy::dbg_macro,
    clippy::empty_structs_with_brackets,
    clippy::exit,
    clippy::if_then_some_else_none,
    clippy::impl_trait_in_params,
    clippy::let_underscore_must_use,
    clippy::lossy_float_literal,
    clippy::multiple_inherent_impl,
    clippy::print_stdout,
    clippy::rc_buffer,
    clippy::rc_mutex,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::separated_literal_suffix,
    clippy::str_to_string,
    clippy::string_add,
    clippy::string_to_string,
    clippy::try_err,
    clippy::unnecessary_self_imports,
    clippy::wildcard_enum_match_arm
)]

pub mod apodization;
pub mod bitsink;
pub mod bitsource;
pub mod coding;
pub mod component;
pub mod config;
pub mod constant;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod fixed;
pub mod format;
pub mod io;
pub mod lpc;
pub mod rice;
pub mod source;

#[cfg(test)]
mod test_helper;

pub use decoder::StreamDecoder;
pub use encoder::StreamEncoder;

#[cfg(test)]
mod test {
    // end-to-end, but transparent test.
    use super::*;
    use rstest::rstest;

    const CONFIGS: [&str; 5] = [
        "",
        r"
block_size = 512
        ",
        r"
block_size = 123
streamable_subset = false
        ",
        r"
block_size = 1024
max_lpc_order = 32
streamable_subset = false
qlp_coeff_prec_search = true
exhaustive_model_search = true
        ",
        r"
mid_side = true
loose_mid_side = true
apodization = 'welch;partial_tukey(3)'
max_residual_partition_order = 8
        ",
    ];

    #[rstest]
    fn e2e_with_generated_sinusoids(
        #[values(1, 2, 3, 5, 8)] channels: usize,
        #[values(CONFIGS[0], CONFIGS[1], CONFIGS[2], CONFIGS[3], CONFIGS[4])] config: &str,
    ) {
        let signal_len = 16123;
        let mut config: config::Encoder = toml::from_str(config).expect("config parsing error");
        config.channels = channels;
        config.sample_rate = 16000;

        let signal: Vec<Vec<i32>> = (0..channels)
            .map(|ch| test_helper::sinusoid_plus_noise(signal_len, 36 + ch, 10000.0, 123))
            .collect();

        let bytes = test_helper::encode_to_vec(&config, &signal);
        assert_eq!(
            test_helper::claxon_decode(&bytes),
            test_helper::interleave(&signal)
        );
        let (collector, md5_matched) = test_helper::decode_all(&bytes);
        assert!(md5_matched);
        assert!(collector.errors.is_empty());
        assert_eq!(collector.samples, signal);
    }

    #[rstest]
    fn odd_block_sizes_decode_with_claxon(
        #[values(16, 123, 4608)] block_size: usize,
        #[values(1, 2)] channels: usize,
    ) {
        let config = config::Encoder {
            channels,
            block_size,
            streamable_subset: false,
            ..config::Encoder::from_preset(8)
        };
        // partitions with a few loud samples among silence.
        let signal: Vec<Vec<i32>> = (0..channels)
            .map(|ch| {
                let mut s = test_helper::sinusoid_plus_noise(9001, 20 + ch, 200.0, 3);
                for t in (0..s.len()).step_by(97) {
                    s[t] = 30000;
                }
                s
            })
            .collect();

        let bytes = test_helper::encode_to_vec(&config, &signal);
        assert_eq!(
            test_helper::claxon_decode(&bytes),
            test_helper::interleave(&signal)
        );
        let (collector, md5_matched) = test_helper::decode_all(&bytes);
        assert!(md5_matched);
        assert!(collector.errors.is_empty());
        assert_eq!(collector.samples, signal);
    }

    #[test]
    fn constant_and_silent_channels() {
        let signal = vec![vec![42i32; 1000], vec![0i32; 1000]];
        let config = config::Encoder {
            bits_per_sample: 8,
            ..config::Encoder::default()
        };
        let bytes = test_helper::encode_to_vec(&config, &signal);
        // header, VORBIS_COMMENT, and one small frame
        assert!(bytes.len() < 100);
        assert_eq!(
            test_helper::claxon_decode(&bytes),
            test_helper::interleave(&signal)
        );
    }
}
