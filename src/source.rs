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

//! Per-channel sample buffers and PCM checksums.

use md5::Digest;
use md5::Md5;

/// Reusable buffer for multi-channel framed signals.
///
/// Samples are stored channel by channel. The buffer holds up to `size`
/// samples per channel; `filled` of them are valid.
#[derive(Clone, Debug)]
pub struct FrameBuf {
    samples: Vec<i32>,
    channels: usize,
    size: usize,
    filled: usize,
}

impl FrameBuf {
    /// Constructs `FrameBuf` of the specified size.
    pub fn with_size(channels: usize, size: usize) -> Self {
        Self {
            samples: vec![0i32; size * channels],
            channels,
            size,
            filled: 0,
        }
    }

    /// Returns the capacity in the number of inter-channel samples.
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Returns the number of valid inter-channel samples.
    pub const fn filled(&self) -> usize {
        self.filled
    }

    /// Returns `true` if no more samples can be pushed.
    pub const fn is_full(&self) -> bool {
        self.filled == self.size
    }

    /// Returns the number of channels
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Grows the capacity. The buffer never shrinks.
    pub fn grow(&mut self, new_size: usize) {
        if new_size <= self.size {
            return;
        }
        let mut samples = vec![0i32; new_size * self.channels];
        for ch in 0..self.channels {
            samples[ch * new_size..ch * new_size + self.filled]
                .copy_from_slice(&self.channel_slice(ch)[..self.filled]);
        }
        self.samples = samples;
        self.size = new_size;
    }

    /// Discards every sample.
    pub fn clear(&mut self) {
        self.filled = 0;
    }

    /// Appends interleaved samples and returns how many inter-channel samples
    /// were taken.
    pub fn push_interleaved(&mut self, interleaved: &[i32]) -> usize {
        let available = interleaved.len() / self.channels;
        let n = available.min(self.size - self.filled);
        for t in 0..n {
            for ch in 0..self.channels {
                self.samples[ch * self.size + self.filled + t] = interleaved[t * self.channels + ch];
            }
        }
        self.filled += n;
        n
    }

    /// Appends samples from per-channel slices starting at `offset`.
    ///
    /// Returns how many samples were taken from each channel.
    pub fn push_channels(&mut self, channels: &[&[i32]], offset: usize) -> usize {
        debug_assert_eq!(channels.len(), self.channels);
        let available = channels
            .iter()
            .map(|c| c.len().saturating_sub(offset))
            .min()
            .unwrap_or(0);
        let n = available.min(self.size - self.filled);
        for (ch, src) in channels.iter().enumerate() {
            let dest_begin = ch * self.size + self.filled;
            self.samples[dest_begin..dest_begin + n].copy_from_slice(&src[offset..offset + n]);
        }
        self.filled += n;
        n
    }

    /// Drops the first `n` samples and moves the rest to the front.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.filled);
        for ch in 0..self.channels {
            let begin = ch * self.size;
            self.samples
                .copy_within(begin + n..begin + self.filled, begin);
        }
        self.filled -= n;
    }

    /// Returns the valid samples of the given channel.
    pub fn channel_slice(&self, ch: usize) -> &[i32] {
        &self.samples[ch * self.size..ch * self.size + self.filled]
    }

    /// Returns mutable valid samples of the given channel.
    pub fn channel_slice_mut(&mut self, ch: usize) -> &mut [i32] {
        &mut self.samples[ch * self.size..ch * self.size + self.filled]
    }
}

/// Streaming MD5 over interleaved little-endian PCM.
///
/// Every sample contributes `(bits_per_sample + 7) / 8` bytes.
#[derive(Clone, Debug)]
pub struct PcmDigest {
    context: Md5,
    bytes_per_sample: usize,
    scratch: Vec<u8>,
}

impl PcmDigest {
    /// Constructs a digest for samples of `bits_per_sample` bits.
    pub fn new(bits_per_sample: usize) -> Self {
        Self {
            context: Md5::new(),
            bytes_per_sample: ((bits_per_sample + 7) / 8).clamp(1, 4),
            scratch: vec![],
        }
    }

    #[inline]
    fn push_sample(&mut self, sample: i32) {
        let bytes = sample.to_le_bytes();
        self.scratch.extend_from_slice(&bytes[..self.bytes_per_sample]);
    }

    fn flush_scratch(&mut self) {
        self.context.update(&self.scratch);
        self.scratch.clear();
    }

    /// Feeds the first `len` samples of each channel, interleaving them.
    pub fn update_channels<T: AsRef<[i32]>>(&mut self, channels: &[T], len: usize) {
        self.scratch.reserve(len * channels.len() * self.bytes_per_sample);
        for t in 0..len {
            for ch in channels {
                self.push_sample(ch.as_ref()[t]);
            }
        }
        self.flush_scratch();
    }

    /// Feeds already interleaved samples.
    pub fn update_interleaved(&mut self, interleaved: &[i32]) {
        self.scratch.reserve(interleaved.len() * self.bytes_per_sample);
        for &v in interleaved {
            self.push_sample(v);
        }
        self.flush_scratch();
    }

    /// Finalizes the digest.
    pub fn finalize(self) -> [u8; 16] {
        self.context.finalize().into()
    }
}
