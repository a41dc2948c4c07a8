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

//! Functions for partitioned rice coding (PRC).

use std::cell::RefCell;

use super::component::EntropyCodingMethod;
use super::component::PartitionParameter;
use super::component::Residual;
use super::constant::rice::ESCAPE_PARAMETER;
use super::constant::rice::MAX_PARTITION_ORDER;
use super::constant::rice::METHOD_BITS;
use super::constant::rice::PARAMETER_BITS;
use super::constant::rice::PARTITION_ORDER_BITS;
use super::constant::rice::RICE2_ESCAPE_PARAMETER;

/// Encodes the sign bit into its LSB (for Rice coding).
///
/// # Examples
///
/// ```
/// # use flacodec::rice::*;
/// assert_eq!(encode_signbit(0), 0);
/// assert_eq!(encode_signbit(-1), 1);
/// assert_eq!(encode_signbit(1), 2);
/// assert_eq!(encode_signbit(i32::MIN), u32::MAX);
/// ```
#[inline]
pub const fn encode_signbit(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

/// Recovers a sign bit from its LSB.
///
/// # Examples
///
/// ```
/// # use flacodec::rice::*;
/// assert_eq!(decode_signbit(3), -2);
/// assert_eq!(decode_signbit(u32::MAX), i32::MIN);
/// ```
#[inline]
pub const fn decode_signbit(v: u32) -> i32 {
    ((v >> 1) as i32) ^ -((v & 1) as i32)
}

/// Computes the maximum partition order usable for the block.
///
/// The order is limited by `limit`, by the number of trailing zeros of
/// `block_size`, and so that every partition is longer than `predictor_order`.
///
/// # Examples
///
/// ```
/// # use flacodec::rice::*;
/// assert_eq!(max_partition_order(4096, 0, 6), 6);
/// assert_eq!(max_partition_order(4095, 0, 6), 0);
/// assert_eq!(max_partition_order(192, 32, 8), 2);
/// ```
pub fn max_partition_order(block_size: usize, predictor_order: usize, limit: usize) -> usize {
    let mut order = std::cmp::min(
        std::cmp::min(limit, MAX_PARTITION_ORDER),
        block_size.trailing_zeros() as usize,
    );
    while order > 0 && (block_size >> order) <= predictor_order {
        order -= 1;
    }
    order
}

/// Estimates the bits of a Rice-coded partition from the sum of magnitudes.
#[inline]
fn count_rice_bits_in_partition(param: u32, len: usize, abs_sum: u64) -> u64 {
    let len = len as u64;
    let quotients = if param == 0 {
        abs_sum << 1
    } else {
        abs_sum >> (param - 1)
    };
    (PARAMETER_BITS as u64 + (1 + u64::from(param)) * len + quotients).saturating_sub(len >> 1)
}

/// Chooses a Rice parameter from the mean magnitude of a partition.
#[inline]
fn estimate_rice_parameter(len: usize, abs_sum: u64, limit: u32) -> u32 {
    let mut param = 0u32;
    let mut k = len as u64;
    if k == 0 {
        return 0;
    }
    while k < abs_sum && param + 1 < limit {
        param += 1;
        k <<= 1;
    }
    param
}

/// Statistics of a partition used for parameter selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct PartitionStats {
    abs_sum: u64,
}

impl PartitionStats {
    fn from_signal(signal: &[i32]) -> Self {
        let abs_sum = signal.iter().map(|v| u64::from(v.unsigned_abs())).sum();
        Self { abs_sum }
    }

    #[inline]
    fn merge(&self, other: &Self) -> Self {
        Self {
            abs_sum: self.abs_sum + other.abs_sum,
        }
    }
}

/// Parameter for PRC (partitioned Rice-coding).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrcParameter {
    /// Partition order.
    pub order: usize,
    /// Parameters for each partition.
    pub params: Vec<PartitionParameter>,
    /// Estimated number of bits for the residual (including the method
    /// header).
    pub code_bits: usize,
}

impl PrcParameter {
    /// Returns `true` if the parameters require the 5-bit parameter method.
    pub fn requires_rice2(&self) -> bool {
        self.params
            .iter()
            .any(|p| matches!(p, PartitionParameter::Rice(k) if u32::from(*k) >= ESCAPE_PARAMETER))
    }
}

/// Helper object that holds pre-allocated buffer for PRC optimization.
struct PrcParameterFinder {
    // Stats for all orders from `max_order` down to `min_order`, finest first.
    stats: Vec<PartitionStats>,
    params: Vec<PartitionParameter>,
    best_params: Vec<PartitionParameter>,
}

impl PrcParameterFinder {
    pub const fn new() -> Self {
        Self {
            stats: Vec::new(),
            params: Vec::new(),
            best_params: Vec::new(),
        }
    }

    /// Fills `self.stats` for the finest order and merges them bottom-up.
    fn precompute(
        &mut self,
        residual: &[i32],
        warmup_length: usize,
        min_order: usize,
        max_order: usize,
    ) {
        let block_size = residual.len() + warmup_length;
        let nparts = 1usize << max_order;
        let part_len = block_size >> max_order;
        self.stats.clear();
        for p in 0..nparts {
            let start = (p * part_len).saturating_sub(warmup_length);
            let end = ((p + 1) * part_len).saturating_sub(warmup_length);
            self.stats
                .push(PartitionStats::from_signal(&residual[start..end]));
        }

        let mut from = 0;
        let mut nparts = nparts;
        for _order in (min_order..max_order).rev() {
            nparts >>= 1;
            for _i in 0..nparts {
                let merged = self.stats[from].merge(&self.stats[from + 1]);
                self.stats.push(merged);
                from += 2;
            }
        }
    }

    /// Chooses parameters for `order` using stats starting at `offset`.
    ///
    /// Partitions are always Rice-coded; escaped partitions are only read.
    fn set_partitioned_rice(
        &mut self,
        offset: usize,
        block_size: usize,
        warmup_length: usize,
        order: usize,
        limit: u32,
    ) -> u64 {
        let mut bits = (METHOD_BITS + PARTITION_ORDER_BITS) as u64;
        self.params.clear();
        let nparts = 1usize << order;
        for p in 0..nparts {
            let mut len = block_size >> order;
            if p == 0 {
                len -= warmup_length;
            }
            let stats = self.stats[offset + p];
            let param = estimate_rice_parameter(len, stats.abs_sum, limit);
            self.params.push(PartitionParameter::Rice(param as u8));
            bits += count_rice_bits_in_partition(param, len, stats.abs_sum);
        }
        bits
    }

    pub fn find(
        &mut self,
        residual: &[i32],
        warmup_length: usize,
        bits_per_sample: usize,
        min_order: usize,
        max_order: usize,
    ) -> PrcParameter {
        let block_size = residual.len() + warmup_length;
        let max_order = max_partition_order(block_size, warmup_length, max_order);
        let min_order = std::cmp::min(min_order, max_order);
        let limit = if bits_per_sample > 16 {
            RICE2_ESCAPE_PARAMETER
        } else {
            ESCAPE_PARAMETER
        };

        self.precompute(residual, warmup_length, min_order, max_order);

        let mut best_bits = u64::MAX;
        let mut best_order = max_order;
        let mut offset = 0;
        for order in (min_order..=max_order).rev() {
            let bits =
                self.set_partitioned_rice(offset, block_size, warmup_length, order, limit);
            offset += 1 << order;
            if bits < best_bits {
                best_bits = bits;
                best_order = order;
                std::mem::swap(&mut self.best_params, &mut self.params);
            }
        }
        PrcParameter {
            order: best_order,
            params: self.best_params.clone(),
            code_bits: best_bits.try_into().unwrap_or(usize::MAX),
        }
    }
}

thread_local! {
    static RICE_PARAMETER_FINDER: RefCell<PrcParameterFinder> =
        const { RefCell::new(PrcParameterFinder::new()) };
}

/// Finds the partitioned Rice parameters minimizing the estimated bit count.
///
/// Partition orders from `max_order` down to `min_order` are compared by
/// their estimated bit counts. `residual` doesn't include warm-up samples.
pub fn find_partitioned_rice_parameter(
    residual: &[i32],
    warmup_length: usize,
    bits_per_sample: usize,
    min_order: usize,
    max_order: usize,
) -> PrcParameter {
    RICE_PARAMETER_FINDER.with(|finder| {
        finder.borrow_mut().find(
            residual,
            warmup_length,
            bits_per_sample,
            min_order,
            max_order,
        )
    })
}

/// Builds a [`Residual`] component with the best partitioned Rice parameters.
pub fn encode_residual(
    residual: Vec<i32>,
    warmup_length: usize,
    bits_per_sample: usize,
    min_order: usize,
    max_order: usize,
) -> Residual {
    let prc =
        find_partitioned_rice_parameter(&residual, warmup_length, bits_per_sample, min_order, max_order);
    let use_rice2 = prc.requires_rice2();
    let block_size = residual.len() + warmup_length;
    Residual::from_parts(
        EntropyCodingMethod::with_width(use_rice2, prc.order, prc.params),
        block_size,
        warmup_length,
        residual,
    )
}
