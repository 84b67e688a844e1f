// Copyright 2023 Google LLC
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

//! Protocol checker for I2S frame based slaves running on the port
//! simulator: bus timing, frame decoding, the test pattern both ends agree
//! on, and comparison of the simulation output against expectations.

mod binding;
mod checker;
mod config;
mod error;
mod expect;
mod frame;
mod pattern;
mod setup;

pub use crate::binding::{PortBinding, SETUP_DATA_BITS};
pub use crate::checker::{CheckerStats, I2SSlaveChecker, STARTED_MESSAGE};
pub use crate::config::{
    BitDepth, LineCount, TestConfig, TestLevel, BINARY_PREFIX, ENV_BITDEPTHS, ENV_NUMS_IN_OUT,
    ENV_SMOKE, NUMS_IN_OUT,
};
pub use crate::error::Error;
pub use crate::expect::{
    ComparisonOptions, ComparisonTester, Discrepancy, ExpectedSequence, Verdict,
};
pub use crate::frame::{
    BitPosition, BitSample, BusTiming, CheckerState, Frame, FrameDecoder, FrameError,
    Justification, Sample, WordEdge, WordSelect,
};
pub use crate::pattern::{Direction, TestPattern};
pub use crate::setup::{Round, RoundSetup};
