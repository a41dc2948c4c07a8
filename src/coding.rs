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

//! Subframe model selection and frame assembly.

use std::cell::RefCell;

use super::apodization::parse_apodization;
use super::apodization::Window;
use super::component::BitRepr;
use super::component::ChannelAssignment;
use super::component::Constant;
use super::component::EntropyCodingMethod;
use super::component::FixedLpc;
use super::component::Frame;
use super::component::FrameHeader;
use super::component::Lpc;
use super::component::QuantizedParameters;
use super::component::Residual;
use super::component::SubFrame;
use super::component::Verbatim;
use super::config;
use super::constant::fixed::MAX_ORDER as MAX_FIXED_ORDER;
use super::constant::qlpc::MAX_APODIZATIONS;
use super::constant::qlpc::MAX_PRECISION as MAX_QLPC_PRECISION;
use super::constant::qlpc::MIN_PRECISION as MIN_QLPC_PRECISION;
use super::constant::qlpc::PRECISION_BITS as QLPC_PRECISION_BITS;
use super::constant::qlpc::SHIFT_BITS as QLPC_SHIFT_BITS;
use super::fixed;
use super::lpc;
use super::rice;
use super::rice::PrcParameter;

/// Model-search parameters resolved from [`config::Encoder`].
#[derive(Clone, Debug)]
pub struct CodingParams {
    pub(crate) windows: Vec<Window>,
    pub(crate) max_lpc_order: usize,
    /// Zero selects the precision from [`lpc::default_precision`].
    pub(crate) qlp_coeff_precision: usize,
    pub(crate) qlp_coeff_prec_search: bool,
    pub(crate) exhaustive_model_search: bool,
    pub(crate) min_partition_order: usize,
    pub(crate) max_partition_order: usize,
}

impl CodingParams {
    /// Resolves coding parameters from the encoder config.
    pub fn from_config(config: &config::Encoder) -> Self {
        let mut windows = parse_apodization(&config.apodization);
        windows.truncate(MAX_APODIZATIONS);
        if windows.is_empty() {
            windows.push(Window::default());
        }
        let (min_partition_order, max_partition_order) = config.effective_partition_orders();
        Self {
            windows,
            max_lpc_order: config.max_lpc_order,
            qlp_coeff_precision: config.qlp_coeff_precision,
            qlp_coeff_prec_search: config.qlp_coeff_prec_search,
            exhaustive_model_search: config.exhaustive_model_search,
            min_partition_order,
            max_partition_order,
        }
    }
}

/// How the stereo channel assignment of a frame is chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StereoSearch {
    /// Channels are always coded independently.
    Independent,
    /// All four assignments are evaluated.
    Exhaustive,
    /// Only the given assignment is coded.
    Fixed(ChannelAssignment),
}

/// Returns the number of trailing zero bits shared by every sample.
///
/// Returns `None` for an all-zero signal.
pub fn wasted_bits(signal: &[i32]) -> Option<u32> {
    let acc = signal.iter().fold(0i32, |acc, &v| acc | v);
    (acc != 0).then(|| acc.trailing_zeros())
}

/// Returns true if all samples are the same.
#[inline]
pub fn is_constant(signal: &[i32]) -> bool {
    signal.first().map_or(true, |&v0| signal.iter().all(|&v| v == v0))
}

/// Prediction model of a candidate subframe.
#[derive(Clone, Debug)]
enum Model {
    Fixed(usize),
    Lpc(QuantizedParameters),
}

impl Model {
    fn order(&self) -> usize {
        match self {
            Self::Fixed(order) => *order,
            Self::Lpc(params) => params.order(),
        }
    }
}

/// Working buffers for the subframe search.
struct SubFrameEncoder {
    shifted: Vec<i32>,
    residual: Vec<i32>,
    best_residual: Vec<i32>,
}

/// Best candidate found so far.
struct Best {
    model: Option<(Model, PrcParameter)>,
    bits: usize,
}

impl SubFrameEncoder {
    const fn new() -> Self {
        Self {
            shifted: vec![],
            residual: vec![],
            best_residual: vec![],
        }
    }

    /// Evaluates `model` with the residual in `self.residual`.
    fn try_candidate(
        &mut self,
        params: &CodingParams,
        model: Model,
        bits_per_sample: usize,
        wasted_bits: usize,
        best: &mut Best,
    ) {
        let order = model.order();
        let prc = rice::find_partitioned_rice_parameter(
            &self.residual,
            order,
            bits_per_sample,
            params.min_partition_order,
            params.max_partition_order,
        );
        let mut bits = 8 + wasted_bits + bits_per_sample * order + prc.code_bits;
        if let Model::Lpc(ref qp) = model {
            bits += QLPC_PRECISION_BITS + QLPC_SHIFT_BITS + qp.precision() * order;
        }
        if bits < best.bits {
            best.bits = bits;
            best.model = Some((model, prc));
            std::mem::swap(&mut self.residual, &mut self.best_residual);
        }
    }

    fn search_fixed(
        &mut self,
        params: &CodingParams,
        bits_per_sample: usize,
        wasted_bits: usize,
        best: &mut Best,
    ) {
        let block_size = self.shifted.len();
        let guess = fixed::guess_order(&self.shifted);
        let orders = if params.exhaustive_model_search {
            0..=MAX_FIXED_ORDER
        } else {
            guess.order..=guess.order
        };
        for order in orders {
            if order >= block_size
                || guess.residual_bits_per_sample[order] >= bits_per_sample as f32
            {
                continue;
            }
            if !fixed::compute_residual(&self.shifted, order, &mut self.residual) {
                continue;
            }
            self.try_candidate(params, Model::Fixed(order), bits_per_sample, wasted_bits, best);
        }
    }

    fn search_lpc(
        &mut self,
        params: &CodingParams,
        stream_bits_per_sample: usize,
        bits_per_sample: usize,
        wasted_bits: usize,
        best: &mut Best,
    ) {
        let block_size = self.shifted.len();
        let max_order = params.max_lpc_order.min(block_size.saturating_sub(1));
        if max_order == 0 {
            return;
        }
        let configured_precision = if params.qlp_coeff_precision == 0 {
            lpc::default_precision(stream_bits_per_sample, block_size)
        } else {
            params.qlp_coeff_precision
        };
        let overhead = bits_per_sample
            + if params.qlp_coeff_prec_search {
                MAX_QLPC_PRECISION
            } else {
                configured_precision
            };

        for window in &params.windows {
            let Some(analysis) = lpc::lpc_analysis(&self.shifted, window, max_order) else {
                continue;
            };
            let analyzed_max = analysis.max_order();
            let orders = if params.exhaustive_model_search {
                1..=analyzed_max
            } else {
                let order = analysis.best_order(block_size, overhead);
                order..=order
            };
            for order in orders {
                let expected = lpc::expected_bits_per_residual_sample(
                    analysis.errors()[order - 1],
                    block_size - order,
                );
                if expected >= bits_per_sample as f64 {
                    continue;
                }
                let precision_cap = if bits_per_sample <= 17 {
                    (32 - bits_per_sample - order.ilog2() as usize).min(MAX_QLPC_PRECISION)
                } else {
                    MAX_QLPC_PRECISION
                };
                let precisions = if params.qlp_coeff_prec_search {
                    MIN_QLPC_PRECISION..=precision_cap.max(MIN_QLPC_PRECISION)
                } else {
                    let p = configured_precision.min(precision_cap);
                    p..=p
                };
                for precision in precisions {
                    let Some(qp) = lpc::quantize_coefficients(analysis.coefs(order), precision)
                    else {
                        continue;
                    };
                    if !lpc::compute_residual(&self.shifted, &qp, bits_per_sample, &mut self.residual)
                    {
                        continue;
                    }
                    self.try_candidate(params, Model::Lpc(qp), bits_per_sample, wasted_bits, best);
                }
            }
        }
    }

    fn encode(
        &mut self,
        params: &CodingParams,
        signal: &[i32],
        stream_bits_per_sample: usize,
        bits_per_sample: usize,
    ) -> SubFrame {
        let block_size = signal.len();
        let Some(wasted) = wasted_bits(signal) else {
            return Constant::from_parts(block_size, 0, bits_per_sample as u8, 0).into();
        };
        // An all-nonzero signal of width `bits_per_sample` can't have all of its bits wasted.
        let wasted = (wasted as usize).min(bits_per_sample - 1);
        let coded_bits = bits_per_sample - wasted;

        self.shifted.clear();
        self.shifted.extend(signal.iter().map(|&v| v >> wasted));
        if is_constant(&self.shifted) {
            return Constant::from_parts(block_size, self.shifted[0], coded_bits as u8, wasted as u8)
                .into();
        }

        let mut best = Best {
            model: None,
            bits: Verbatim::count_bits_from_metadata(block_size, coded_bits, wasted),
        };
        if block_size > MAX_FIXED_ORDER {
            self.search_fixed(params, coded_bits, wasted, &mut best);
            if params.max_lpc_order > 0 {
                self.search_lpc(params, stream_bits_per_sample, coded_bits, wasted, &mut best);
            }
        }

        match best.model {
            None => Verbatim::from_samples(&self.shifted, coded_bits as u8, wasted as u8).into(),
            Some((model, prc)) => {
                let order = model.order();
                let use_rice2 = prc.requires_rice2();
                let residual = Residual::from_parts(
                    EntropyCodingMethod::with_width(use_rice2, prc.order, prc.params),
                    block_size,
                    order,
                    self.best_residual.clone(),
                );
                let warm_up = &self.shifted[..order];
                match model {
                    Model::Fixed(_) => FixedLpc::from_parts(
                        heapless::Vec::from_slice(warm_up).unwrap_or_default(),
                        residual,
                        coded_bits as u8,
                        wasted as u8,
                    )
                    .into(),
                    Model::Lpc(qp) => Lpc::from_parts(
                        heapless::Vec::from_slice(warm_up).unwrap_or_default(),
                        qp,
                        residual,
                        coded_bits as u8,
                        wasted as u8,
                    )
                    .into(),
                }
            }
        }
    }
}

thread_local! {
    static SUBFRAME_ENCODER: RefCell<SubFrameEncoder> = const { RefCell::new(SubFrameEncoder::new()) };
}

/// Encodes a channel signal into the cheapest subframe found.
///
/// `bits_per_sample` is the width of `signal` (one more than the stream's
/// for a side channel). `stream_bits_per_sample` drives the automatic QLP
/// coefficient precision.
///
/// # Examples
///
/// ```
/// # use flacodec::coding::*;
/// # use flacodec::component::*;
/// # use flacodec::config;
/// let params = CodingParams::from_config(&config::Encoder::default());
/// let subframe = encode_subframe(&params, &[42; 1000], 8, 8);
/// assert_eq!(subframe.subframe_type(), SubFrameType::Constant);
/// ```
pub fn encode_subframe(
    params: &CodingParams,
    signal: &[i32],
    stream_bits_per_sample: usize,
    bits_per_sample: usize,
) -> SubFrame {
    SUBFRAME_ENCODER.with(|encoder| {
        encoder
            .borrow_mut()
            .encode(params, signal, stream_bits_per_sample, bits_per_sample)
    })
}

/// Buffers for the mid and side signals.
struct StereoCodingHelper {
    mid: Vec<i32>,
    side: Vec<i32>,
}

impl StereoCodingHelper {
    const fn new() -> Self {
        Self {
            mid: vec![],
            side: vec![],
        }
    }

    fn fill(&mut self, left: &[i32], right: &[i32]) {
        self.mid.clear();
        self.side.clear();
        for (&l, &r) in left.iter().zip(right) {
            self.mid.push((l + r) >> 1);
            self.side.push(l - r);
        }
    }

    fn encode(
        &mut self,
        params: &CodingParams,
        left: &[i32],
        right: &[i32],
        bits_per_sample: usize,
        search: StereoSearch,
    ) -> (ChannelAssignment, SubFrame, SubFrame) {
        let side_bits = bits_per_sample + 1;
        match search {
            StereoSearch::Independent | StereoSearch::Fixed(ChannelAssignment::Independent(_)) => (
                ChannelAssignment::Independent(2),
                encode_subframe(params, left, bits_per_sample, bits_per_sample),
                encode_subframe(params, right, bits_per_sample, bits_per_sample),
            ),
            StereoSearch::Fixed(ca) => {
                self.fill(left, right);
                let (ch0, ch1) = ca.select(left, right, &self.mid[..], &self.side[..]);
                (
                    ca,
                    encode_subframe(params, ch0, bits_per_sample, bits_per_sample + ca.bits_per_sample_offset(0)),
                    encode_subframe(params, ch1, bits_per_sample, bits_per_sample + ca.bits_per_sample_offset(1)),
                )
            }
            StereoSearch::Exhaustive => {
                self.fill(left, right);
                let l = encode_subframe(params, left, bits_per_sample, bits_per_sample);
                let r = encode_subframe(params, right, bits_per_sample, bits_per_sample);
                let m = encode_subframe(params, &self.mid, bits_per_sample, bits_per_sample);
                let s = encode_subframe(params, &self.side, bits_per_sample, side_bits);
                let (lb, rb, mb, sb) =
                    (l.count_bits(), r.count_bits(), m.count_bits(), s.count_bits());

                let mut best = ChannelAssignment::Independent(2);
                let mut best_bits = lb + rb;
                for (ca, bits) in [
                    (ChannelAssignment::LeftSide, lb + sb),
                    (ChannelAssignment::RightSide, sb + rb),
                    (ChannelAssignment::MidSide, mb + sb),
                ] {
                    if bits < best_bits {
                        best = ca;
                        best_bits = bits;
                    }
                }
                let (ch0, ch1) = best.select(l, r, m, s);
                (best, ch0, ch1)
            }
        }
    }
}

thread_local! {
    static STEREO_CODING_HELPER: RefCell<StereoCodingHelper> = const { RefCell::new(StereoCodingHelper::new()) };
}

/// Encodes one block of per-channel samples into a frame.
///
/// `header` supplies the block size, rate, and numbering; its channel
/// assignment is overwritten with the one chosen here. `search` only matters
/// for two-channel input.
pub fn encode_frame<T: AsRef<[i32]>>(
    params: &CodingParams,
    mut header: FrameHeader,
    channels: &[T],
    bits_per_sample: usize,
    search: StereoSearch,
) -> Frame {
    if channels.len() == 2 {
        let (ca, ch0, ch1) = STEREO_CODING_HELPER.with(|helper| {
            helper.borrow_mut().encode(
                params,
                channels[0].as_ref(),
                channels[1].as_ref(),
                bits_per_sample,
                search,
            )
        });
        header.reset_channel_assignment(ca);
        return Frame::from_parts(header, vec![ch0, ch1]);
    }
    header.reset_channel_assignment(ChannelAssignment::Independent(channels.len() as u8));
    let subframes = channels
        .iter()
        .map(|ch| encode_subframe(params, ch.as_ref(), bits_per_sample, bits_per_sample))
        .collect();
    Frame::from_parts(header, subframes)
}

#[cfg(test)]
#[allow(clippy::pedantic, clippy::nursery, clippy::needless_range_loop)]
mod tests {
    use super::*;
    use crate::bitsink::BitSink;
    use crate::bitsink::ByteSink;
    use crate::bitsource::BitSource;
    use crate::component::FrameOffset;
    use crate::component::SubFrameType;
    use crate::decoder::frame::decode_subframe;
    use crate::io::StreamIo;
    use crate::test_helper;

    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rstest::rstest;

    fn default_params() -> CodingParams {
        CodingParams::from_config(&config::Encoder::default())
    }

    fn decode_back(subframe: &SubFrame, bits_per_sample: usize) -> Vec<i64> {
        let mut sink = ByteSink::new();
        subframe.write(&mut sink).unwrap();
        sink.align_to_byte().unwrap();
        let bytes = sink.into_inner();
        let mut src = BitSource::new(StreamIo::new(&bytes[..]));
        let mut dest = vec![0i64; subframe.block_size()];
        decode_subframe(&mut src, bits_per_sample, &mut dest).unwrap();
        dest
    }

    #[test]
    fn wasted_bits_detection() {
        assert_eq!(wasted_bits(&[0, 0, 0]), None);
        assert_eq!(wasted_bits(&[4, 8, -12]), Some(2));
        assert_eq!(wasted_bits(&[3, 8]), Some(0));
        assert!(is_constant(&[5; 64]));
        assert!(is_constant(&[-3; 192]));
        assert!(!is_constant(&[1, 1, 2]));
    }

    #[test]
    fn constant_signal_becomes_constant_subframe() {
        let subframe = encode_subframe(&default_params(), &[42; 1000], 8, 8);
        assert_eq!(subframe.subframe_type(), SubFrameType::Constant);
        assert_eq!(decode_back(&subframe, 8), vec![42i64; 1000]);

        let zeros = encode_subframe(&default_params(), &[0; 64], 16, 16);
        assert_eq!(zeros.subframe_type(), SubFrameType::Constant);
        assert_eq!(zeros.count_bits(), 8 + 16);
    }

    #[test]
    fn wasted_bits_are_stripped() {
        let signal: Vec<i32> = test_helper::sinusoid_plus_noise(256, 20, 3000.0, 10)
            .into_iter()
            .map(|v| v << 3)
            .collect();
        let subframe = encode_subframe(&default_params(), &signal, 16, 16);
        assert_eq!(subframe.wasted_bits(), 3);
        assert_eq!(subframe.bits_per_sample(), 13);
        let decoded = decode_back(&subframe, 16);
        for t in 0..signal.len() {
            assert_eq!(decoded[t], i64::from(signal[t]));
        }
    }

    #[test]
    fn noise_falls_back_to_verbatim() {
        let mut rng = StdRng::seed_from_u64(11);
        let signal = test_helper::uniform_noise(&mut rng, 32, 1 << 15);
        let signal: Vec<i32> = signal.into_iter().map(|v| v | 1).collect();
        let subframe = encode_subframe(&default_params(), &signal, 16, 16);
        assert!(
            subframe.count_bits()
                <= Verbatim::count_bits_from_metadata(signal.len(), 16, 0)
        );
    }

    #[test]
    fn short_block_is_verbatim() {
        let subframe = encode_subframe(&default_params(), &[1, 5, -3, 9], 16, 16);
        assert_eq!(subframe.subframe_type(), SubFrameType::Verbatim);
    }

    #[rstest]
    fn subframe_round_trip(
        #[values(0, 1, 5, 8)] preset: usize,
        #[values((8, 64), (16, 1152), (24, 4096))] shape: (usize, usize),
    ) {
        let (bits_per_sample, block_size) = shape;
        let params = CodingParams::from_config(&config::Encoder::from_preset(preset));
        let amplitude = (1 << (bits_per_sample - 2)) as f32;
        let signal = test_helper::sinusoid_plus_noise(block_size, 37, amplitude, 3);
        let subframe = encode_subframe(&params, &signal, bits_per_sample, bits_per_sample);
        assert!(
            subframe.count_bits()
                < Verbatim::count_bits_from_metadata(block_size, bits_per_sample, 0)
        );
        let decoded = decode_back(&subframe, bits_per_sample);
        for t in 0..block_size {
            assert_eq!(decoded[t], i64::from(signal[t]), "mismatch at t={t}");
        }
    }

    #[test]
    fn exhaustive_search_is_not_worse() {
        let signal = test_helper::sinusoid_plus_noise(4096, 91, 12000.0, 40);
        let mut config = config::Encoder::from_preset(5);
        let normal = encode_subframe(&CodingParams::from_config(&config), &signal, 16, 16);
        config.exhaustive_model_search = true;
        config.qlp_coeff_prec_search = true;
        let exhaustive = encode_subframe(&CodingParams::from_config(&config), &signal, 16, 16);
        assert!(exhaustive.count_bits() <= normal.count_bits());
    }

    #[test]
    fn correlated_stereo_prefers_side_channel() {
        let left = test_helper::sinusoid_plus_noise(4096, 50, 10000.0, 20);
        let right: Vec<i32> = left.iter().map(|&v| v + 3).collect();
        let header = FrameHeader::new(
            4096,
            ChannelAssignment::Independent(2),
            16,
            44100,
            FrameOffset::Frame(0),
        )
        .unwrap();
        let frame = encode_frame(
            &default_params(),
            header.clone(),
            &[&left[..], &right[..]],
            16,
            StereoSearch::Exhaustive,
        );
        assert_ne!(
            *frame.header().channel_assignment(),
            ChannelAssignment::Independent(2)
        );
        let independent = encode_frame(
            &default_params(),
            header,
            &[&left[..], &right[..]],
            16,
            StereoSearch::Independent,
        );
        assert!(frame.count_bits() < independent.count_bits());
    }

    #[rstest]
    fn fixed_assignment_is_honored(
        #[values(
            ChannelAssignment::LeftSide,
            ChannelAssignment::RightSide,
            ChannelAssignment::MidSide
        )]
        ca: ChannelAssignment,
    ) {
        let mut rng = StdRng::seed_from_u64(3);
        let left = test_helper::uniform_noise(&mut rng, 512, 1 << 14);
        let right = test_helper::uniform_noise(&mut rng, 512, 1 << 14);
        let header =
            FrameHeader::new(512, ChannelAssignment::Independent(2), 16, 44100, FrameOffset::Frame(1))
                .unwrap();
        let frame = encode_frame(
            &default_params(),
            header,
            &[&left[..], &right[..]],
            16,
            StereoSearch::Fixed(ca),
        );
        assert_eq!(*frame.header().channel_assignment(), ca);
        for ch in 0..2 {
            assert_eq!(
                frame.subframe(ch).unwrap().bits_per_sample()
                    + frame.subframe(ch).unwrap().wasted_bits(),
                16 + ca.bits_per_sample_offset(ch)
            );
        }
    }
}
