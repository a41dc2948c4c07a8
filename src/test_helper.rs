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

#![allow(clippy::missing_panics_doc, dead_code)]

use std::io::Cursor;

use rand::distributions::Distribution;
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use super::config;
use super::decoder::Collector;
use super::decoder::StreamDecoder;
use super::encoder::StreamEncoder;
use super::io::SeekableIo;

#[macro_export]
macro_rules! assert_close {
    ($actual:expr, $expected:expr, rtol = $rtol:expr, atol = $atol:expr) => {{
        let err = ($actual - $expected).abs();
        #[allow(clippy::suboptimal_flops)]
        let tol = $rtol * ($expected).abs() + $atol;
        assert!(
            err <= tol,
            "{} is not close to {} (tolerance {})",
            $actual,
            $expected,
            tol
        );
    }};
    ($actual:expr, $expected:expr) => {{
        $crate::assert_close!($actual, $expected, rtol = 0.00001, atol = 0.00001);
    }};
    ($actual:expr, $expected:expr, $tol:expr) => {{
        $crate::assert_close!($actual, $expected, rtol = 0.0, atol = $tol);
    }};
}

/// Returns a deterministic RNG.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Draws `n` samples uniformly from `-amplitude..=amplitude`.
pub fn uniform_noise<R: Rng>(rng: &mut R, n: usize, amplitude: i32) -> Vec<i32> {
    let dist = Uniform::from(-amplitude..=amplitude);
    (0..n).map(|_| dist.sample(rng)).collect()
}

/// Generates a sinusoid with additive uniform noise.
///
/// The noise is seeded from the arguments so the same call always returns
/// the same signal.
pub fn sinusoid_plus_noise(n: usize, period: usize, amplitude: f32, noise: i32) -> Vec<i32> {
    let mut rng = seeded_rng(((n as u64) << 32) | period as u64);
    let dist = Uniform::from(-noise..=noise);
    (0..n)
        .map(|t| {
            let phase = 2.0 * std::f32::consts::PI * t as f32 / period as f32;
            (amplitude * phase.sin()).round() as i32 + dist.sample(&mut rng)
        })
        .collect()
}

/// Encodes per-channel `signal` with `config` into an in-memory stream.
pub fn encode_to_vec(config: &config::Encoder, signal: &[Vec<i32>]) -> Vec<u8> {
    let sink = SeekableIo::new(Cursor::new(vec![]));
    let mut encoder =
        StreamEncoder::init(config.clone(), vec![], sink).expect("encoder init failed");
    let channels: Vec<&[i32]> = signal.iter().map(Vec::as_slice).collect();
    encoder.process(&channels).expect("encoding failed");
    let (_summary, sink) = encoder.finish().expect("encoder finish failed");
    sink.into_inner().into_inner()
}

/// Decodes a whole stream with MD5 checking and returns the collected
/// outputs with the MD5 verdict.
pub fn decode_all(bytes: &[u8]) -> (Collector, bool) {
    let config = config::Decoder {
        md5_checking: true,
        ..config::Decoder::default()
    };
    let input = SeekableIo::new(Cursor::new(bytes.to_vec()));
    let mut decoder =
        StreamDecoder::init(config, input, Collector::default()).expect("decoder init failed");
    decoder
        .process_until_end_of_stream()
        .expect("decoding failed");
    let finished = decoder.finish();
    (finished.handler, finished.md5_matched)
}

/// Returns the byte offsets of every frame in a well-formed stream.
pub fn find_frame_offsets(bytes: &[u8]) -> Vec<usize> {
    let input = SeekableIo::new(Cursor::new(bytes.to_vec()));
    let mut decoder = StreamDecoder::init(config::Decoder::default(), input, Collector::default())
        .expect("decoder init failed");
    decoder
        .process_until_end_of_metadata()
        .expect("decoding failed");
    let mut offsets = vec![];
    loop {
        let pos = decoder.decode_position().expect("tell failed") as usize;
        let before = decoder.handler().frames.len();
        decoder.process_single().expect("decoding failed");
        if decoder.handler().frames.len() == before {
            break;
        }
        offsets.push(pos);
    }
    offsets
}

/// Decodes `bytes` with claxon and returns interleaved samples.
pub fn claxon_decode(bytes: &[u8]) -> Vec<i32> {
    let mut reader =
        claxon::FlacReader::new(Cursor::new(bytes.to_vec())).expect("claxon rejected the stream");
    reader
        .samples()
        .map(|s| s.expect("claxon decoding failed"))
        .collect()
}

/// Interleaves per-channel signals.
pub fn interleave(signal: &[Vec<i32>]) -> Vec<i32> {
    let len = signal.first().map_or(0, Vec::len);
    let mut ret = Vec::with_capacity(len * signal.len());
    for t in 0..len {
        for ch in signal {
            ret.push(ch[t]);
        }
    }
    ret
}
