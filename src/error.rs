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

//! Error, status, and verification types.

use std::convert::Infallible;
use std::error::Error;
use std::fmt;

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use super::bitsink::BitSink;
use super::io::IoFault;

/// Enum of errors that can be returned while making an output bitstream.
#[derive(Clone, Eq, Hash, PartialEq)]
#[allow(clippy::module_name_repetitions)]
#[non_exhaustive]
pub enum OutputError<S>
where
    S: BitSink,
    S::Error: std::error::Error,
{
    /// A parameter in a component doesn't fit in a format.
    Range(RangeError),
    /// I/O error propagated from [`BitSink`].
    Sink(S::Error),
}

impl<S> OutputError<S>
where
    S: BitSink,
    S::Error: std::error::Error,
{
    #[inline]
    pub(crate) const fn from_sink(e: S::Error) -> Self {
        Self::Sink(e)
    }

    pub(crate) fn ignore_sink_error<U>(err: OutputError<U>) -> Self
    where
        U: BitSink<Error = Infallible>,
    {
        match err {
            OutputError::Range(e) => Self::Range(e),
            #[allow(unreachable_patterns)]
            OutputError::Sink(e) => match e {},
        }
    }
}

impl<S> Error for OutputError<S>
where
    S: BitSink,
    S::Error: Error,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

impl<S> fmt::Display for OutputError<S>
where
    S: BitSink,
    S::Error: std::error::Error,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range(err) => err.fmt(f),
            Self::Sink(err) => err.fmt(f),
        }
    }
}

impl<S> fmt::Debug for OutputError<S>
where
    S: BitSink,
    S::Error: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range(err) => f
                .debug_tuple("OutputError::InvalidRange")
                .field(&err)
                .finish(),
            Self::Sink(err) => f.debug_tuple("OutputError::Sink").field(&err).finish(),
        }
    }
}

impl<S> From<RangeError> for OutputError<S>
where
    S: BitSink,
    S::Error: fmt::Debug,
{
    fn from(e: RangeError) -> Self {
        Self::Range(e)
    }
}

/// Error emitted when a parameter is out of the expected range.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub struct RangeError {
    var: String,
    reason: String,
    actual: String,
}

impl RangeError {
    /// Makes range error from `actual: impl Display` that is out of range.
    pub(crate) fn from_display<T>(var: &str, reason: &str, actual: &T) -> Self
    where
        T: fmt::Display,
    {
        Self {
            var: var.to_owned(),
            reason: reason.to_owned(),
            actual: format!("{actual}"),
        }
    }
}

impl Error for RangeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "`{}` is out of range: {} (actual={})",
            self.var, self.reason, self.actual
        )
    }
}

/// Error object returned when a component or a config failed to verify.
///
/// This error maintains a path to the component that is actually erroneous
/// in the nested components.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub struct VerifyError {
    components: Vec<String>,
    reason: String,
}

impl VerifyError {
    /// Makes verification error for an invalid variable `component`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::error::*;
    /// let err = VerifyError::new("order", "must be non-negative");
    /// assert_eq!(
    ///     format!("{}", err),
    ///     "verification error: `order` is not valid. reason: must be non-negative"
    /// );
    /// ```
    pub fn new(component: &str, reason: &str) -> Self {
        Self {
            components: vec![component.to_owned()],
            reason: reason.to_owned(),
        }
    }

    /// Prepends the name of an enclosing component to the error location.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::error::*;
    /// let err = VerifyError::new("lead_in", "must be a multiple of 588");
    /// let err = err.within("cuesheet");
    /// assert_eq!(
    ///     format!("{}", err),
    ///     "verification error: `cuesheet.lead_in` is not valid. reason: must be a multiple of 588"
    /// );
    /// ```
    #[must_use]
    pub fn within(self, component: &str) -> Self {
        let mut components = self.components;
        let reason = self.reason;
        components.push(component.to_owned());
        Self { components, reason }
    }

    /// Gets dot-separated path string for the error location.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::error::*;
    /// let err = VerifyError::new("order", "must be non-negative");
    /// let err = err.within("encoder");
    /// assert_eq!(err.path(), "encoder.order");
    /// ```
    pub fn path(&self) -> String {
        let mut path = String::new();
        for (i, name) in self.components.iter().rev().enumerate() {
            if i != 0 {
                path.push('.');
            }
            path.push_str(name);
        }
        path
    }

    /// Gets the human-readable reason of the failure.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Error for VerifyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "verification error: `{}` is not valid. reason: {}",
            self.path(),
            self.reason
        )
    }
}

/// A wrapper that ensures that the inner `T` is verified and unchanged.
///
/// `Verified<T>` can be obtained via [`Verify::into_verified`] or
/// [`Verify::assume_verified`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct Verified<T>(T);

impl<T> std::ops::Deref for Verified<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> Verified<T> {
    /// Unwraps the verified value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Trait for verifiable structs.
pub trait Verify: Sized + seal_verify::Sealed {
    /// Verifies there's no internal data inconsistency.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if there's an invalid variable.
    ///
    /// # Examples
    ///
    /// [`config::Encoder`] implements `Verify`.
    ///
    /// [`config::Encoder`]: crate::config::Encoder
    ///
    /// ```
    /// # use flacodec::error::*;
    /// # use flacodec::config;
    /// let mut config = config::Encoder::default();
    /// config.max_lpc_order = 33;  // invalid setting
    /// assert!(config.verify().is_err());
    ///
    /// config.max_lpc_order = 12; // valid setting
    /// assert!(config.verify().is_ok());
    /// ```
    fn verify(&self) -> Result<(), VerifyError>;

    /// Wraps into `Verified` to indicate that the data is already verified.
    ///
    /// # Errors
    ///
    /// Returns the original input and `VerifyError` if `verify` failed.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacodec::error::*;
    /// # use flacodec::component::SeekPoint;
    /// # use flacodec::component::SeekTable;
    /// let table = SeekTable {
    ///     points: vec![SeekPoint::new(4096, 100, 4096), SeekPoint::new(0, 0, 4096)],
    /// };
    /// // unsorted tables are rejected.
    /// let (table, _err) = table.into_verified().unwrap_err();
    ///
    /// let table = SeekTable {
    ///     points: table.points.into_iter().rev().collect(),
    /// };
    /// assert_eq!(table.into_verified().unwrap().points.len(), 2);
    /// ```
    fn into_verified(self) -> Result<Verified<Self>, (Self, VerifyError)> {
        let result = self.verify();
        if let Err(e) = result {
            Err((self, e))
        } else {
            Ok(Verified(self))
        }
    }

    /// Wraps into `Verified` without actual verification.
    ///
    /// # Safety
    ///
    /// The use of `Verified` data obtained this way may cause an unexpected
    /// behavior. It should be okay if the data are previously verified with
    /// `verify` function and have not been changed after that.
    unsafe fn assume_verified(self) -> Verified<Self> {
        Verified(self)
    }
}

/// A wrapping function to make it compatible with "?" operator.
pub(crate) fn verify_macro_impl(cond: bool, varname: &str, msg: &str) -> Result<(), VerifyError> {
    if !cond {
        return Err(VerifyError::new(varname, msg));
    }
    Ok(())
}

/// Checks if `$cond` is true and do `return Err(...)` if so.
///
/// An error object `VerifyErr` is constructed using `$varname` and
/// `$msg` that are formatted using the extra args (`$args`).
macro_rules! verify_true {
    ($varname:literal, $cond:expr, $msg:literal, $($args: expr),*) => {
        $crate::error::verify_macro_impl(
            $cond,
            &format!($varname, $($args),*),
            &format!($msg, $($args),*),
        )
    };
    ($varname:literal, $cond:expr, $msg:literal) => {
        $crate::error::verify_true!($varname, $cond, $msg,)
    }
}
pub(crate) use verify_true;

/// Checks if `$actual` is in the range, and emits err with default msgs if not.
///
/// An error is constructed using the same way as [`verify_true`].
macro_rules! verify_range {
    ($varname: literal, $actual:expr, $lowlimit:tt .. $highlimit:tt) => {
        $crate::error::verify_range!($varname, $actual, ($lowlimit)..)
            .and_then(|()| $crate::error::verify_range!($varname, $actual, ..($highlimit)))
    };
    ($varname: literal, $actual:expr, $lowlimit:tt ..= $highlimit:tt) => {
        $crate::error::verify_range!($varname, $actual, ($lowlimit)..)
            .and_then(|()| $crate::error::verify_range!($varname, $actual, ..=($highlimit)))
    };
    ($varname: literal, $actual:expr, $lowlimit:tt ..) => {{
        #[allow(unused_parens)]
        let limit = $lowlimit;
        $crate::error::verify_true!(
            $varname,
            $actual >= limit,
            "must be greater than or equal to {limit}"
        )
    }};
    ($varname: literal, $actual:expr, ..= $highlimit:tt) => {{
        #[allow(unused_parens)]
        let limit = $highlimit;
        $crate::error::verify_true!(
            $varname,
            $actual <= limit,
            "must be less than or equal to {limit}"
        )
    }};
    ($varname: literal, $actual:expr, .. $highlimit:tt) => {{
        #[allow(unused_parens)]
        let limit = $highlimit;
        $crate::error::verify_true!($varname, $actual < limit, "must be less than {limit}")
    }};
}
pub(crate) use verify_range;

/// Recoverable format faults reported while decoding.
///
/// The decoder resynchronizes after each of these and continues.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum DecodeErrorStatus {
    /// A byte sequence that looked like a sync code turned out not to be one.
    LostSync,
    /// A frame header was found but it contained an invalid field.
    BadHeader,
    /// The CRC-16 of the frame footer didn't match the frame content.
    FrameCrcMismatch,
    /// The frame uses a reserved code or a feature this decoder doesn't know.
    UnparseableStream,
}

impl fmt::Display for DecodeErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LostSync => write!(f, "lost synchronization"),
            Self::BadHeader => write!(f, "corrupted frame header"),
            Self::FrameCrcMismatch => write!(f, "frame CRC mismatch"),
            Self::UnparseableStream => write!(f, "unparseable stream"),
        }
    }
}

impl Error for DecodeErrorStatus {}

/// State of [`StreamDecoder`].
///
/// [`StreamDecoder`]: crate::decoder::StreamDecoder
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum DecoderState {
    /// Looking for the `fLaC` marker (optionally after an ID3v2 tag).
    SearchForMetadata,
    /// Reading metadata blocks.
    ReadMetadata,
    /// Scanning for the next frame sync code.
    SearchForFrameSync,
    /// Reading a frame.
    ReadFrame,
    /// The input ended.
    EndOfStream,
    /// A seek failed. [`flush`] or [`reset`] recovers from this state.
    ///
    /// [`flush`]: crate::decoder::StreamDecoder::flush
    /// [`reset`]: crate::decoder::StreamDecoder::reset
    SeekError,
    /// The input or a handler requested to abort.
    Aborted,
    /// A working buffer could not be allocated.
    MemoryAllocationError,
}

impl DecoderState {
    /// Returns `true` if the decoder can't make progress without `reset`.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::EndOfStream | Self::SeekError | Self::Aborted | Self::MemoryAllocationError
        )
    }
}

impl fmt::Display for DecoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SearchForMetadata => "searching for metadata",
            Self::ReadMetadata => "reading metadata",
            Self::SearchForFrameSync => "searching for frame sync",
            Self::ReadFrame => "reading frame",
            Self::EndOfStream => "end of stream",
            Self::SeekError => "seek error",
            Self::Aborted => "aborted",
            Self::MemoryAllocationError => "memory allocation error",
        };
        f.write_str(name)
    }
}

/// Fatal decoder failures returned from the processing calls.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
#[allow(clippy::module_name_repetitions)]
pub enum DecoderError {
    /// The input or a handler aborted decoding.
    Aborted,
    /// A working buffer could not be allocated.
    MemoryAllocation,
    /// Seeking failed; the decoder is in [`DecoderState::SeekError`].
    SeekFailed,
    /// The input doesn't support the capability required for seeking.
    SeekUnsupported(IoFault),
    /// The seek target is beyond the end of the stream.
    SeekTargetOutOfRange(u64),
}

impl fmt::Display for DecoderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aborted => write!(f, "decoding aborted"),
            Self::MemoryAllocation => write!(f, "memory allocation failed"),
            Self::SeekFailed => write!(f, "seek failed"),
            Self::SeekUnsupported(e) => write!(f, "cannot seek: {e}"),
            Self::SeekTargetOutOfRange(n) => write!(f, "sample {n} is out of the stream"),
        }
    }
}

impl Error for DecoderError {}

/// Errors returned from [`StreamDecoder::init`].
///
/// [`StreamDecoder::init`]: crate::decoder::StreamDecoder::init
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum DecoderInitError {
    /// The settings failed to verify.
    InvalidSettings(VerifyError),
    /// The file given to a file-based initializer could not be opened.
    ErrorOpeningFile(String),
}

impl fmt::Display for DecoderInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSettings(e) => e.fmt(f),
            Self::ErrorOpeningFile(msg) => write!(f, "cannot open file: {msg}"),
        }
    }
}

impl Error for DecoderInitError {}

impl From<VerifyError> for DecoderInitError {
    fn from(e: VerifyError) -> Self {
        Self::InvalidSettings(e)
    }
}

/// State of [`StreamEncoder`].
///
/// [`StreamEncoder`]: crate::encoder::StreamEncoder
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum EncoderState {
    /// The encoder is working.
    Ok,
    /// A component could not be represented in the bitstream.
    FramingError,
    /// The output failed.
    IoError,
}

impl fmt::Display for EncoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::FramingError => write!(f, "framing error"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

/// Errors returned from [`StreamEncoder::init`].
///
/// [`StreamEncoder::init`]: crate::encoder::StreamEncoder::init
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum EncoderInitError {
    /// The number of channels is not in `1..=8`.
    InvalidNumberOfChannels,
    /// The bits-per-sample is not in `4..=24`.
    InvalidBitsPerSample,
    /// The sample rate is not representable.
    InvalidSampleRate,
    /// The block size is not in `16..=65535`.
    InvalidBlockSize,
    /// The maximum LPC order is larger than 32.
    InvalidMaxLpcOrder,
    /// The QLP coefficient precision is not representable.
    InvalidQlpCoeffPrecision,
    /// The block size is smaller than the maximum LPC order.
    BlockSizeTooSmallForLpcOrder,
    /// The settings violate the streamable subset.
    NotStreamable,
    /// A user-supplied metadata block is illegal.
    InvalidMetadata(VerifyError),
    /// The settings failed to verify.
    InvalidSettings(VerifyError),
    /// The file given to a file-based initializer could not be opened.
    ErrorOpeningFile(String),
    /// Writing the stream header failed.
    Io(IoFault),
}

impl fmt::Display for EncoderInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNumberOfChannels => write!(f, "invalid number of channels"),
            Self::InvalidBitsPerSample => write!(f, "invalid bits per sample"),
            Self::InvalidSampleRate => write!(f, "invalid sample rate"),
            Self::InvalidBlockSize => write!(f, "invalid block size"),
            Self::InvalidMaxLpcOrder => write!(f, "invalid max LPC order"),
            Self::InvalidQlpCoeffPrecision => write!(f, "invalid QLP coefficient precision"),
            Self::BlockSizeTooSmallForLpcOrder => {
                write!(f, "block size is too small for the LPC order")
            }
            Self::NotStreamable => write!(f, "settings are not in the streamable subset"),
            Self::InvalidMetadata(e) => write!(f, "invalid metadata: {e}"),
            Self::InvalidSettings(e) => e.fmt(f),
            Self::ErrorOpeningFile(msg) => write!(f, "cannot open file: {msg}"),
            Self::Io(e) => e.fmt(f),
        }
    }
}

impl Error for EncoderInitError {}

/// Enum for possible encoder errors after initialization.
#[non_exhaustive]
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EncodeError {
    /// The input samples don't match the stream parameters.
    InvalidInput(RangeError),
    /// A frame could not be represented in the bitstream.
    Framing(RangeError),
    /// The output failed.
    Io(IoFault),
    /// The encoder already failed and stays in the given state.
    Terminated(EncoderState),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(e) => write!(f, "invalid input: {e}"),
            Self::Framing(e) => write!(f, "framing error: {e}"),
            Self::Io(e) => e.fmt(f),
            Self::Terminated(state) => write!(f, "encoder is in a terminal state ({state})"),
        }
    }
}

impl Error for EncodeError {}

impl From<IoFault> for EncodeError {
    fn from(e: IoFault) -> Self {
        Self::Io(e)
    }
}

mod seal_verify {
    pub trait Sealed {}

    impl Sealed for crate::component::Application {}
    impl Sealed for crate::component::ChannelAssignment {}
    impl Sealed for crate::component::Constant {}
    impl Sealed for crate::component::CueSheet {}
    impl Sealed for crate::component::FixedLpc {}
    impl Sealed for crate::component::FrameHeader {}
    impl Sealed for crate::component::Lpc {}
    impl Sealed for crate::component::MetadataBlock {}
    impl Sealed for crate::component::MetadataBlockData {}
    impl Sealed for crate::component::Picture {}
    impl Sealed for crate::component::QuantizedParameters {}
    impl Sealed for crate::component::Residual {}
    impl Sealed for crate::component::SeekTable {}
    impl Sealed for crate::component::StreamInfo {}
    impl Sealed for crate::component::SubFrame {}
    impl Sealed for crate::component::Verbatim {}
    impl Sealed for crate::component::VorbisComment {}
    impl Sealed for crate::config::Decoder {}
    impl Sealed for crate::config::Encoder {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_range_messages() {
        let err = verify_range!("order", 40usize, 0..=32).unwrap_err();
        assert_eq!(err.path(), "order");
        assert_eq!(err.reason(), "must be less than or equal to 32");

        let err = verify_range!("precision", 3usize, 5..16).unwrap_err();
        assert_eq!(err.reason(), "must be greater than or equal to 5");
        assert!(verify_range!("precision", 15usize, 5..16).is_ok());
    }

    #[test]
    fn terminal_states() {
        assert!(DecoderState::EndOfStream.is_terminal());
        assert!(DecoderState::SeekError.is_terminal());
        assert!(!DecoderState::ReadFrame.is_terminal());
        assert!(!DecoderState::SearchForMetadata.is_terminal());
    }
}
