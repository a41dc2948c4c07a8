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

//! Subframe and residual components.

use std::ops::Range;

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use crate::constant::fixed::MAX_ORDER as MAX_FIXED_ORDER;
use crate::constant::qlpc::MAX_ORDER as MAX_LPC_ORDER;
use crate::constant::rice::ESCAPE_PARAMETER;
use crate::constant::rice::PARAMETER_BITS;
use crate::constant::rice::RICE2_ESCAPE_PARAMETER;
use crate::constant::rice::RICE2_PARAMETER_BITS;
use crate::constant::rice::RAW_BITS_LEN;
use crate::error::Verify;
use crate::error::VerifyError;
use crate::rice;

/// Kind of a subframe, as reported to decoder clients.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SubFrameType {
    /// All samples have the same value.
    Constant,
    /// Samples are stored without prediction.
    Verbatim,
    /// Fixed polynomial predictor of the given order.
    Fixed(u8),
    /// Quantized LPC of the given order.
    Lpc(u8),
}

/// [`SUBFRAME`](https://xiph.org/flac/format.html#subframe) component.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
pub enum SubFrame {
    /// This variant contains [`Constant`] sub-frame.
    Constant(Constant),
    /// This variant contains [`Verbatim`] sub-frame.
    Verbatim(Verbatim),
    /// This variant contains [`FixedLpc`] sub-frame.
    FixedLpc(FixedLpc),
    /// This variant contains [`Lpc`] sub-frame.
    Lpc(Lpc),
}

impl SubFrame {
    /// Returns the number of samples in this subframe.
    pub fn block_size(&self) -> usize {
        match self {
            Self::Constant(c) => c.block_size(),
            Self::Verbatim(c) => c.samples().len(),
            Self::FixedLpc(c) => c.residual().block_size(),
            Self::Lpc(c) => c.residual().block_size(),
        }
    }

    /// Returns the sample width used for coding the subframe body.
    pub fn bits_per_sample(&self) -> usize {
        match self {
            Self::Constant(c) => c.bits_per_sample(),
            Self::Verbatim(c) => c.bits_per_sample(),
            Self::FixedLpc(c) => c.bits_per_sample(),
            Self::Lpc(c) => c.bits_per_sample(),
        }
    }

    /// Returns the number of wasted bits signalled in the subframe header.
    pub fn wasted_bits(&self) -> usize {
        match self {
            Self::Constant(c) => c.wasted_bits(),
            Self::Verbatim(c) => c.wasted_bits(),
            Self::FixedLpc(c) => c.wasted_bits(),
            Self::Lpc(c) => c.wasted_bits(),
        }
    }

    /// Returns the kind of this subframe.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::component::*;
    /// let sub: SubFrame = Constant::new(64, -5, 16, 0).unwrap().into();
    /// assert_eq!(sub.subframe_type(), SubFrameType::Constant);
    /// ```
    pub fn subframe_type(&self) -> SubFrameType {
        match self {
            Self::Constant(_) => SubFrameType::Constant,
            Self::Verbatim(_) => SubFrameType::Verbatim,
            Self::FixedLpc(c) => SubFrameType::Fixed(c.order() as u8),
            Self::Lpc(c) => SubFrameType::Lpc(c.order() as u8),
        }
    }
}

impl From<Constant> for SubFrame {
    fn from(c: Constant) -> Self {
        Self::Constant(c)
    }
}

impl From<Verbatim> for SubFrame {
    fn from(c: Verbatim) -> Self {
        Self::Verbatim(c)
    }
}

impl From<FixedLpc> for SubFrame {
    fn from(c: FixedLpc) -> Self {
        Self::FixedLpc(c)
    }
}

impl From<Lpc> for SubFrame {
    fn from(c: Lpc) -> Self {
        Self::Lpc(c)
    }
}

/// [`SUBFRAME_CONSTANT`](https://xiph.org/flac/format.html#subframe_constant) component.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Constant {
    block_size: usize,
    dc_offset: i32,
    bits_per_sample: u8,
    wasted_bits: u8,
}

impl Constant {
    /// Constructs new `Constant`.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if an argument is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::bitsink::*;
    /// # use flacodec::component::*;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let subframe = Constant::new(1024, 3, 16, 0)?;
    /// let mut sink = ByteSink::new();
    /// subframe.write(&mut sink)?;
    /// assert_eq!(sink.as_slice(), [
    ///     0x00, /* tag */
    ///     0x00, 0x03,  /* 16bits written from MSB to LSB */
    /// ]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        block_size: usize,
        dc_offset: i32,
        bits_per_sample: usize,
        wasted_bits: usize,
    ) -> Result<Self, VerifyError> {
        let ret = Self::from_parts(
            block_size,
            dc_offset,
            bits_per_sample as u8,
            wasted_bits as u8,
        );
        ret.verify()?;
        Ok(ret)
    }

    /// Constructs new `Constant`. (unverified version)
    #[inline]
    pub(crate) fn from_parts(
        block_size: usize,
        dc_offset: i32,
        bits_per_sample: u8,
        wasted_bits: u8,
    ) -> Self {
        Self {
            block_size,
            dc_offset,
            bits_per_sample,
            wasted_bits,
        }
    }

    /// Returns block size.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns offset value.
    #[inline]
    pub fn dc_offset(&self) -> i32 {
        self.dc_offset
    }

    /// Returns bits-per-sample.
    #[inline]
    pub fn bits_per_sample(&self) -> usize {
        self.bits_per_sample as usize
    }

    /// Returns the number of wasted bits.
    #[inline]
    pub fn wasted_bits(&self) -> usize {
        self.wasted_bits as usize
    }
}

/// [`SUBFRAME_VERBATIM`](https://xiph.org/flac/format.html#subframe_verbatim) component.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Verbatim {
    data: Vec<i32>,
    bits_per_sample: u8,
    wasted_bits: u8,
}

impl Verbatim {
    /// Constructs new `Verbatim`.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if an argument is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::bitsink::*;
    /// # use flacodec::component::*;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let subframe = Verbatim::new(&[0xAB; 64], 16, 0)?;
    /// let mut sink = ByteSink::new();
    /// subframe.write(&mut sink)?;
    /// assert_eq!(sink.as_slice()[0], 0x02); /* tag */
    /// for t in 0..64 {
    ///     assert_eq!(
    ///         sink.as_slice()[(1 + t * 2)..][..2],
    ///         [0x00, 0xAB]
    ///     );
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        samples: &[i32],
        bits_per_sample: usize,
        wasted_bits: usize,
    ) -> Result<Self, VerifyError> {
        let ret = Self::from_samples(samples, bits_per_sample as u8, wasted_bits as u8);
        ret.verify()?;
        Ok(ret)
    }

    /// Constructs new `Verbatim`. (unverified version)
    pub(crate) fn from_samples(samples: &[i32], bits_per_sample: u8, wasted_bits: u8) -> Self {
        Self {
            data: Vec::from(samples),
            bits_per_sample,
            wasted_bits,
        }
    }

    /// Constructs new `Verbatim` with taking the ownership of samples.
    pub(crate) fn from_vec(data: Vec<i32>, bits_per_sample: u8, wasted_bits: u8) -> Self {
        Self {
            data,
            bits_per_sample,
            wasted_bits,
        }
    }

    #[inline]
    pub(crate) const fn count_bits_from_metadata(
        block_size: usize,
        bits_per_sample: usize,
        wasted_bits: usize,
    ) -> usize {
        8 + wasted_bits + block_size * bits_per_sample
    }

    /// Returns a slice for the verbatim samples.
    #[inline]
    pub fn samples(&self) -> &[i32] {
        &self.data
    }

    /// Returns bits-per-sample.
    #[inline]
    pub fn bits_per_sample(&self) -> usize {
        self.bits_per_sample as usize
    }

    /// Returns the number of wasted bits.
    #[inline]
    pub fn wasted_bits(&self) -> usize {
        self.wasted_bits as usize
    }
}

/// [`SUBFRAME_FIXED`](https://xiph.org/flac/format.html#subframe_fixed) component.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FixedLpc {
    warm_up: heapless::Vec<i32, MAX_FIXED_ORDER>,
    residual: Residual,
    bits_per_sample: u8,
    wasted_bits: u8,
}

impl FixedLpc {
    /// Constructs new `FixedLpc`.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if an argument is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::bitsink::*;
    /// # use flacodec::component::*;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let method = EntropyCodingMethod::rice(0, vec![PartitionParameter::Rice(0)]);
    /// let residual = Residual::new(method, 64, 1, &[0; 63])?;
    /// let subframe = FixedLpc::new(&[0xCDi32], residual, 16, 0)?;
    /// let mut sink = ByteSink::new();
    /// subframe.write(&mut sink)?;
    /// assert_eq!(sink.as_slice()[0], 0x12); /* tag */
    /// assert_eq!(sink.as_slice()[1..3], [0x00, 0xCD]); /* warmup */
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        warm_up: &[i32],
        residual: Residual,
        bits_per_sample: usize,
        wasted_bits: usize,
    ) -> Result<Self, VerifyError> {
        let warm_up = heapless::Vec::from_slice(warm_up)
            .map_err(|()| VerifyError::new("warm_up", "must be shorter than (or equal to) 4"))?;
        let ret = Self::from_parts(warm_up, residual, bits_per_sample as u8, wasted_bits as u8);
        ret.verify()?;
        Ok(ret)
    }

    /// Creates `FixedLpc`. (unverified version)
    #[inline]
    pub(crate) fn from_parts(
        warm_up: heapless::Vec<i32, MAX_FIXED_ORDER>,
        residual: Residual,
        bits_per_sample: u8,
        wasted_bits: u8,
    ) -> Self {
        Self {
            warm_up,
            residual,
            bits_per_sample,
            wasted_bits,
        }
    }

    /// Returns the order of LPC (of fixed LPC).
    #[inline]
    pub fn order(&self) -> usize {
        self.warm_up.len()
    }

    /// Returns warm-up samples as a slice.
    #[inline]
    pub fn warm_up(&self) -> &[i32] {
        &self.warm_up
    }

    /// Returns a reference to the internal [`Residual`] component.
    #[inline]
    pub fn residual(&self) -> &Residual {
        &self.residual
    }

    /// Returns bits-per-sample.
    #[inline]
    pub fn bits_per_sample(&self) -> usize {
        self.bits_per_sample as usize
    }

    /// Returns the number of wasted bits.
    #[inline]
    pub fn wasted_bits(&self) -> usize {
        self.wasted_bits as usize
    }
}

/// [`SUBFRAME_LPC`](https://xiph.org/flac/format.html#subframe_lpc) component.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Lpc {
    parameters: QuantizedParameters,
    warm_up: heapless::Vec<i32, MAX_LPC_ORDER>,
    residual: Residual,
    bits_per_sample: u8,
    wasted_bits: u8,
}

impl Lpc {
    /// Constructs new `Lpc`.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if an argument is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::bitsink::*;
    /// # use flacodec::component::*;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let method = EntropyCodingMethod::rice(0, vec![PartitionParameter::Rice(0)]);
    /// let residual = Residual::new(method, 64, 1, &[0; 63])?;
    /// let p = QuantizedParameters::new(&[1], 7, 0)?;
    /// let subframe = Lpc::new(&[0xEFi32], p, residual, 16, 0)?;
    /// let mut sink = ByteSink::new();
    /// subframe.write(&mut sink)?;
    /// assert_eq!(sink.as_slice()[0], 0x40); // tag
    /// assert_eq!(sink.as_slice()[1..3], [0x00, 0xEF]); // warm-up
    /// assert_eq!(sink.as_slice()[3..5], [0x60, 0x01]); // precision, shift and coef
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        warm_up: &[i32],
        parameters: QuantizedParameters,
        residual: Residual,
        bits_per_sample: usize,
        wasted_bits: usize,
    ) -> Result<Self, VerifyError> {
        let warm_up = heapless::Vec::from_slice(warm_up).map_err(|()| {
            VerifyError::new(
                "warm_up",
                "must be shorter than (or equal to) `qlpc::MAX_ORDER`",
            )
        })?;
        let ret = Self::from_parts(
            warm_up,
            parameters,
            residual,
            bits_per_sample as u8,
            wasted_bits as u8,
        );
        ret.verify()?;
        Ok(ret)
    }

    /// Constructs `Lpc`. (unverified version)
    #[inline]
    pub(crate) fn from_parts(
        warm_up: heapless::Vec<i32, MAX_LPC_ORDER>,
        parameters: QuantizedParameters,
        residual: Residual,
        bits_per_sample: u8,
        wasted_bits: u8,
    ) -> Self {
        Self {
            parameters,
            warm_up,
            residual,
            bits_per_sample,
            wasted_bits,
        }
    }

    /// Returns the order of LPC.
    #[inline]
    pub fn order(&self) -> usize {
        self.parameters.order()
    }

    /// Returns warm-up samples as a slice.
    #[inline]
    pub fn warm_up(&self) -> &[i32] {
        &self.warm_up
    }

    /// Returns a reference to parameter struct.
    #[inline]
    pub fn parameters(&self) -> &QuantizedParameters {
        &self.parameters
    }

    /// Returns a reference to the internal [`Residual`] component.
    #[inline]
    pub fn residual(&self) -> &Residual {
        &self.residual
    }

    /// Returns bits-per-sample.
    #[inline]
    pub fn bits_per_sample(&self) -> usize {
        self.bits_per_sample as usize
    }

    /// Returns the number of wasted bits.
    #[inline]
    pub fn wasted_bits(&self) -> usize {
        self.wasted_bits as usize
    }
}

/// Quantized LPC coefficients.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QuantizedParameters {
    coefs: heapless::Vec<i32, MAX_LPC_ORDER>,
    precision: u8,
    shift: i8,
}

impl QuantizedParameters {
    /// Constructs new `QuantizedParameters`.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if an argument is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::component::*;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let p = QuantizedParameters::new(&[1], 7, 0)?;
    /// assert_eq!(p.coefficient(0), Some(1));
    /// assert_eq!(p.coefficient(1), None);
    /// assert!(QuantizedParameters::new(&[64], 7, 0).is_err());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(coefs: &[i32], precision: usize, shift: i8) -> Result<Self, VerifyError> {
        let coefs = heapless::Vec::from_slice(coefs).map_err(|()| {
            VerifyError::new("coefs", "must be shorter than (or equal to) 32")
        })?;
        let ret = Self::from_parts(coefs, precision as u8, shift);
        // `QuantizedParameter` doesn't have a child component, so calling
        // `verify` here is not redundant.
        ret.verify()?;
        Ok(ret)
    }

    /// Constructs new `QuantizedParameters` from parts without data verification.
    #[inline]
    pub(crate) fn from_parts(
        coefs: heapless::Vec<i32, MAX_LPC_ORDER>,
        precision: u8,
        shift: i8,
    ) -> Self {
        Self {
            coefs,
            precision,
            shift,
        }
    }

    /// Returns the order of LPC specified by this parameter.
    #[inline]
    pub fn order(&self) -> usize {
        self.coefs.len()
    }

    /// Returns precision.
    #[inline]
    pub const fn precision(&self) -> usize {
        self.precision as usize
    }

    /// Returns the shift parameter.
    #[inline]
    pub const fn shift(&self) -> i8 {
        self.shift
    }

    /// Returns an individual coefficient in quantized form.
    pub fn coefficient(&self, idx: usize) -> Option<i32> {
        self.coefs.get(idx).copied()
    }

    /// Returns a slice of the quantized coefficients.
    #[inline]
    pub fn coefs(&self) -> &[i32] {
        &self.coefs
    }
}

/// Rice parameter of a single partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PartitionParameter {
    /// Samples are Rice-coded with the given parameter.
    Rice(u8),
    /// Samples are stored in two's complement with the given width.
    Escaped(u8),
}

/// Partition order and per-partition parameters of a residual.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RiceContents {
    order: u8,
    parameters: Vec<PartitionParameter>,
}

impl RiceContents {
    /// Returns the partition order.
    #[inline]
    pub fn order(&self) -> usize {
        self.order as usize
    }

    /// Returns the parameters for each partition.
    #[inline]
    pub fn parameters(&self) -> &[PartitionParameter] {
        &self.parameters
    }
}

/// Entropy coding method of a residual.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", content = "data"))]
pub enum EntropyCodingMethod {
    /// Partitioned Rice coding with 4-bit parameters.
    PartitionedRice(RiceContents),
    /// Partitioned Rice coding with 5-bit parameters.
    PartitionedRice2(RiceContents),
}

impl EntropyCodingMethod {
    /// Constructs the 4-bit parameter method.
    pub fn rice(order: usize, parameters: Vec<PartitionParameter>) -> Self {
        Self::PartitionedRice(RiceContents {
            order: order as u8,
            parameters,
        })
    }

    /// Constructs the 5-bit parameter method.
    pub fn rice2(order: usize, parameters: Vec<PartitionParameter>) -> Self {
        Self::PartitionedRice2(RiceContents {
            order: order as u8,
            parameters,
        })
    }

    /// Constructs a method of the given width.
    pub(crate) fn with_width(
        use_rice2: bool,
        order: usize,
        parameters: Vec<PartitionParameter>,
    ) -> Self {
        if use_rice2 {
            Self::rice2(order, parameters)
        } else {
            Self::rice(order, parameters)
        }
    }

    /// Returns the partition order and the parameters.
    #[inline]
    pub fn contents(&self) -> &RiceContents {
        match self {
            Self::PartitionedRice(c) | Self::PartitionedRice2(c) => c,
        }
    }

    /// Returns the 2-bit method tag.
    #[inline]
    pub const fn tag(&self) -> u8 {
        match self {
            Self::PartitionedRice(_) => 0,
            Self::PartitionedRice2(_) => 1,
        }
    }

    /// Returns the number of bits for a partition parameter.
    #[inline]
    pub const fn parameter_bits(&self) -> usize {
        match self {
            Self::PartitionedRice(_) => PARAMETER_BITS,
            Self::PartitionedRice2(_) => RICE2_PARAMETER_BITS,
        }
    }

    /// Returns the escape code for a partition parameter.
    #[inline]
    pub const fn escape_code(&self) -> u32 {
        match self {
            Self::PartitionedRice(_) => ESCAPE_PARAMETER,
            Self::PartitionedRice2(_) => RICE2_ESCAPE_PARAMETER,
        }
    }
}

/// [`RESIDUAL`](https://xiph.org/flac/format.html#residual) component.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Residual {
    method: EntropyCodingMethod,
    block_size: usize,
    warmup_length: usize,
    // does not contain the warm-up part.
    residual: Vec<i32>,
    bits: usize,
}

impl Residual {
    /// Constructs `Residual` from the coding method and residual values.
    ///
    /// `residual` must not contain values for warm-up samples, i.e. its
    /// length must be `block_size - warmup_length`.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if an argument is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::component::*;
    /// let method = EntropyCodingMethod::rice(1, vec![
    ///     PartitionParameter::Rice(1), PartitionParameter::Escaped(3),
    /// ]);
    /// let residual = Residual::new(method, 8, 2, &[1, -1, 0, 2, -4, 3]).unwrap();
    /// assert_eq!(residual.partition_range(0), 0..2);
    /// assert_eq!(residual.partition_range(1), 2..6);
    /// // escaped partition values must fit in the width.
    /// let method = EntropyCodingMethod::rice(0, vec![PartitionParameter::Escaped(2)]);
    /// assert!(Residual::new(method, 4, 0, &[0, 1, 2, 3]).is_err());
    /// ```
    pub fn new(
        method: EntropyCodingMethod,
        block_size: usize,
        warmup_length: usize,
        residual: &[i32],
    ) -> Result<Self, VerifyError> {
        let ret = Self::from_parts(method, block_size, warmup_length, residual.to_owned());
        ret.verify()?;
        Ok(ret)
    }

    /// Constructs `Residual` with consuming parts.
    pub(crate) fn from_parts(
        method: EntropyCodingMethod,
        block_size: usize,
        warmup_length: usize,
        residual: Vec<i32>,
    ) -> Self {
        let mut ret = Self {
            method,
            block_size,
            warmup_length,
            residual,
            bits: 0,
        };
        ret.bits = ret.compute_bits();
        ret
    }

    fn compute_bits(&self) -> usize {
        let param_bits = self.method.parameter_bits();
        let mut ret = 2 + 4;
        for (p, param) in self.method.contents().parameters().iter().enumerate() {
            let range = self.partition_range(p);
            let len = range.len();
            ret += param_bits;
            ret += match *param {
                PartitionParameter::Rice(k) => {
                    let k = u32::from(k);
                    let quotients: usize = self
                        .residual
                        .get(range)
                        .unwrap_or_default()
                        .iter()
                        .map(|v| (rice::encode_signbit(*v) >> k) as usize)
                        .sum();
                    quotients + len * (k as usize + 1)
                }
                PartitionParameter::Escaped(w) => RAW_BITS_LEN + len * w as usize,
            };
        }
        ret
    }

    /// Returns the entropy coding method.
    #[inline]
    pub fn method(&self) -> &EntropyCodingMethod {
        &self.method
    }

    /// Returns the partition order for the PRC.
    #[inline]
    pub fn partition_order(&self) -> usize {
        self.method.contents().order()
    }

    /// Returns the parameter for the `p`-th partition.
    #[inline]
    pub fn partition_parameter(&self, p: usize) -> Option<PartitionParameter> {
        self.method.contents().parameters().get(p).copied()
    }

    /// Returns the residual value for the `t`-th sample after warm-up.
    #[inline]
    pub fn residual(&self, t: usize) -> Option<i32> {
        self.residual.get(t).copied()
    }

    /// Returns the residual values (excluding warm-up samples).
    #[inline]
    pub fn residuals(&self) -> &[i32] {
        &self.residual
    }

    /// Returns the range of `self.residuals()` covered by the `p`-th partition.
    pub fn partition_range(&self, p: usize) -> Range<usize> {
        let part_len = self.block_size >> self.partition_order();
        let start = (p * part_len).saturating_sub(self.warmup_length);
        let end = ((p + 1) * part_len).saturating_sub(self.warmup_length);
        start..end
    }

    /// Returns the block size of this `Residual`.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the warmup length of this `Residual`.
    #[inline]
    pub fn warmup_length(&self) -> usize {
        self.warmup_length
    }

    /// Returns the exact number of bits of this component.
    #[inline]
    pub(crate) fn bits(&self) -> usize {
        self.bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn residual_bit_count_covers_empty_first_partition() {
        let method = EntropyCodingMethod::rice(
            2,
            vec![
                PartitionParameter::Rice(0),
                PartitionParameter::Rice(2),
                PartitionParameter::Escaped(0),
                PartitionParameter::Rice(0),
            ],
        );
        // block of 16, order 4: the first partition holds no residual.
        let values = [0, 1, -1, 2, 0, 0, 0, 0, 3, 0, 0, 0];
        let residual = Residual::from_parts(method, 16, 4, values.to_vec());
        assert_eq!(residual.partition_range(0), 0..0);
        assert_eq!(residual.partition_range(3), 8..12);
        let expected = 6
            + 4 * 4
            + (1 + 4 * 3) // rice(2): only 2 (folded 4) has a quotient
            + 5           // escaped: width field only
            + (6 + 4);    // rice(0): folded 3 -> 6 zeros and 4 stop bits
        assert_eq!(residual.bits(), expected);
    }

    #[test]
    fn subframe_types() {
        let method = EntropyCodingMethod::rice(0, vec![PartitionParameter::Rice(0)]);
        let residual = Residual::new(method, 8, 2, &[0; 6]).unwrap();
        let sub: SubFrame = FixedLpc::new(&[1, 2], residual.clone(), 16, 0)
            .unwrap()
            .into();
        assert_eq!(sub.subframe_type(), SubFrameType::Fixed(2));
        assert_eq!(sub.block_size(), 8);

        let params = QuantizedParameters::new(&[3, -2], 4, 1).unwrap();
        let sub: SubFrame = Lpc::new(&[1, 2], params, residual, 15, 1)
            .unwrap()
            .into();
        assert_eq!(sub.subframe_type(), SubFrameType::Lpc(2));
        assert_eq!(sub.wasted_bits(), 1);
    }
}
