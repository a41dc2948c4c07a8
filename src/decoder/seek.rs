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

//! Byte-offset search for sample-accurate seeking.
//!
//! [`Bisection`] keeps a bracket of byte offsets and the sample numbers at
//! those offsets. Each probe interpolates a byte position inside the bracket,
//! backed off by an estimate of a frame length so that the frame containing
//! the target is not skipped. The decoder then decodes one frame from there
//! and reports it back, which either narrows the bracket or doubles the
//! backoff.

use crate::component::SeekPoint;
use crate::component::SeekTable;
use crate::component::StreamInfo;

/// Location of a decoded frame in samples.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameSpan {
    /// Sample number of the first sample.
    pub first_sample: u64,
    /// Number of samples in the frame.
    pub block_size: u64,
}

impl FrameSpan {
    /// Returns the sample number just after the frame.
    pub const fn end(&self) -> u64 {
        self.first_sample + self.block_size
    }

    /// Returns `true` if `sample` is in this frame.
    pub const fn contains(&self, sample: u64) -> bool {
        self.first_sample <= sample && sample < self.end()
    }
}

/// Reason why the search gave up.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SeekFailure {
    /// The bracket collapsed or inverted.
    EmptyBracket,
    /// No frame could be found even from the lower bound.
    NoFrameAtLowerBound,
    /// A frame before the lower bound was returned; the stream is corrupted.
    FrameBeforeBracket,
}

/// Initial guess of the average frame length in bytes.
pub fn approx_bytes_per_frame(info: Option<&StreamInfo>) -> u64 {
    let Some(info) = info else {
        return 64;
    };
    let bytes_per_sample = u64::from(info.channels) * u64::from(info.bits_per_sample) / 8;
    if info.max_frame_size > 0 {
        u64::from(info.max_frame_size + info.min_frame_size) / 2 + 1
    } else if info.min_block_size == info.max_block_size && info.min_block_size > 0 {
        u64::from(info.min_block_size) * bytes_per_sample + 64
    } else {
        4096 * bytes_per_sample + 64
    }
}

/// Search state for one seek request.
#[derive(Clone, Debug)]
pub struct Bisection {
    target: u64,
    lower: u64,
    upper: u64,
    lower_sample: u64,
    upper_sample: u64,
    approx_frame_bytes: u64,
    first_probe: bool,
}

impl Bisection {
    /// Starts a search for `target` over frames in `first_frame_offset..stream_length`.
    ///
    /// `total_samples` is zero if unknown, in which case the target itself is
    /// used as the sample number at the end of the stream.
    pub fn new(
        target: u64,
        info: Option<&StreamInfo>,
        first_frame_offset: u64,
        stream_length: u64,
    ) -> Self {
        let total_samples = info.map_or(0, |i| i.total_samples);
        Self {
            target,
            lower: first_frame_offset,
            upper: stream_length,
            lower_sample: 0,
            upper_sample: if total_samples > 0 {
                total_samples
            } else {
                target
            },
            approx_frame_bytes: approx_bytes_per_frame(info),
            first_probe: true,
        }
    }

    /// Narrows the initial bracket with the usable points of `table`.
    ///
    /// Placeholders, points without samples, and points beyond
    /// `total_samples` (if known) are ignored. The refinement is discarded if
    /// the table is not sorted.
    pub fn refine_with_seek_table(
        &mut self,
        table: &SeekTable,
        first_frame_offset: u64,
        total_samples: u64,
    ) {
        let usable = |p: &&SeekPoint| {
            !p.is_placeholder()
                && p.frame_samples > 0
                && (total_samples == 0 || p.sample_number < total_samples)
        };
        let (mut lower, mut lower_sample) = (self.lower, self.lower_sample);
        let (mut upper, mut upper_sample) = (self.upper, self.upper_sample);
        if let Some(p) = table
            .points
            .iter()
            .rev()
            .filter(usable)
            .find(|p| p.sample_number <= self.target)
        {
            lower = first_frame_offset.saturating_add(p.stream_offset);
            lower_sample = p.sample_number;
        }
        if let Some(p) = table
            .points
            .iter()
            .filter(usable)
            .find(|p| p.sample_number > self.target)
        {
            upper = first_frame_offset.saturating_add(p.stream_offset);
            upper_sample = p.sample_number;
        }
        if upper >= lower {
            self.lower = lower;
            self.lower_sample = lower_sample;
            self.upper = upper;
            self.upper_sample = upper_sample;
        }
    }

    /// Uses the frame decoded just before seeking as a bound if it is tighter.
    ///
    /// `end_position` is the byte offset right after `frame`.
    pub fn tighten_with_last_frame(&mut self, frame: FrameSpan, end_position: u64) {
        if frame.end() <= self.target {
            if frame.end() >= self.lower_sample && end_position >= self.lower {
                self.lower = end_position;
                self.lower_sample = frame.end();
            }
        } else if frame.first_sample > self.target
            && frame.end() <= self.upper_sample
            && end_position <= self.upper
        {
            self.upper = end_position;
            self.upper_sample = frame.end();
        }
    }

    /// Finishes the setup; call once after all refinements.
    pub fn prepare(&mut self) {
        if self.upper_sample == self.lower_sample {
            self.upper_sample += 1;
        }
        log::debug!(
            target: "flacodec::decoder::seek",
            "seek to sample {}: bytes {}..{}, samples {}..{}",
            self.target,
            self.lower,
            self.upper,
            self.lower_sample,
            self.upper_sample
        );
    }

    /// Returns the current bracket as `(lower, upper)` byte offsets.
    pub const fn bounds(&self) -> (u64, u64) {
        (self.lower, self.upper)
    }

    /// Returns the next byte position to probe.
    ///
    /// # Errors
    ///
    /// Returns [`SeekFailure::EmptyBracket`] if the bracket is inverted.
    pub fn next_position(&self) -> Result<u64, SeekFailure> {
        if self.lower > self.upper || self.upper_sample <= self.lower_sample {
            return Err(SeekFailure::EmptyBracket);
        }
        let ratio = (self.target.saturating_sub(self.lower_sample)) as f64
            / (self.upper_sample - self.lower_sample) as f64;
        let span = (self.upper - self.lower) as f64;
        let guess = self.lower as i128 + (ratio * span) as i128 - i128::from(self.approx_frame_bytes);
        let guess = guess.min(i128::from(self.upper) - 1);
        let guess = guess.max(i128::from(self.lower));
        Ok(guess as u64)
    }

    /// Updates the bracket with the result of a probe at `position`.
    ///
    /// `frame` is the frame decoded from `position` (`None` if decoding hit
    /// the end of the stream), and `end_position` is the byte offset right
    /// after it. The frame must not contain the target; that case ends the
    /// search before calling this.
    ///
    /// # Errors
    ///
    /// Returns an error if the search cannot continue.
    pub fn observe(
        &mut self,
        position: u64,
        frame: Option<FrameSpan>,
        end_position: u64,
    ) -> Result<(), SeekFailure> {
        let overshoot = frame.map_or(true, |f| f.end() >= self.upper_sample && !self.first_probe);
        let Some(frame) = frame.filter(|_| !overshoot) else {
            if position == self.lower {
                return Err(SeekFailure::NoFrameAtLowerBound);
            }
            self.approx_frame_bytes = if self.approx_frame_bytes == 0 {
                16
            } else {
                self.approx_frame_bytes.saturating_mul(2)
            };
            log::debug!(
                target: "flacodec::decoder::seek",
                "probe at {position} overshot, backoff {}",
                self.approx_frame_bytes
            );
            return Ok(());
        };
        self.first_probe = false;

        if frame.first_sample < self.lower_sample {
            return Err(SeekFailure::FrameBeforeBracket);
        }
        if self.target < frame.first_sample {
            self.upper_sample = frame.end();
            self.upper = end_position;
            self.approx_frame_bytes = 2 * self.upper.saturating_sub(position) / 3 + 16;
        } else {
            self.lower_sample = frame.end();
            self.lower = end_position;
            self.approx_frame_bytes = 2 * self.lower.saturating_sub(position) / 3 + 16;
        }
        log::debug!(
            target: "flacodec::decoder::seek",
            "narrowed to bytes {}..{}, samples {}..{}",
            self.lower,
            self.upper,
            self.lower_sample,
            self.upper_sample
        );
        Ok(())
    }
}
