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

//! Components of a FLAC bitstream.
//!
//! Metadata blocks, frames, and subframes are plain values here. Their
//! encoding lives in [`BitRepr`], their consistency checks in
//! [`Verify`](crate::error::Verify) impls, and metadata body parsing in
//! [`parser`].

mod bitrepr;
mod frame;
mod metadata;
pub mod parser;
mod subframe;
mod verify;

pub use bitrepr::*;
pub use frame::*;
pub use metadata::*;
pub use subframe::*;
