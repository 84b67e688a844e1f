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

//! The configuration rounds a test binary runs, and how long that takes.

use crate::slave::{RESPONSE_DELAY_HALF_PERIODS, STROBE_HOLD};
use i2s_checker::{BusTiming, Justification, RoundSetup, TestConfig, TestLevel};
use itertools::iproduct;
use platform::SimTime;

/// Bit clock half periods, in master clock periods, of smoke runs.
pub const SMOKE_HALF_PERIODS: [u32; 1] = [1];
/// Bit clock half periods of full runs: mclk/bclk ratios 2, 4 and 8.
pub const NIGHTLY_HALF_PERIODS: [u32; 3] = [1, 2, 4];

pub const SMOKE_FRAMES: u32 = 4;
pub const NIGHTLY_FRAMES: u32 = 8;

/// One round per bit clock ratio and justification mode.
pub fn rounds(config: &TestConfig) -> Vec<RoundSetup> {
    let (half_periods, num_frames): (&[u32], u32) = match config.level {
        TestLevel::Smoke => (&SMOKE_HALF_PERIODS, SMOKE_FRAMES),
        TestLevel::Nightly => (&NIGHTLY_HALF_PERIODS, NIGHTLY_FRAMES),
    };
    iproduct!(half_periods.iter(), Justification::ALL.iter())
        .map(|(half_period_mclk, mode)| RoundSetup {
            half_period_mclk: *half_period_mclk,
            num_in: config.num_in.into(),
            num_out: config.num_out.into(),
            mode: mode.code(),
            data_bits: if config.frame_based {
                config.bit_depth.bits()
            } else {
                32
            },
            num_frames,
        })
        .collect()
}

/// An upper bound on the simulated time all rounds of a configuration
/// take, with a master clock of period `mclk_period`.
pub fn run_length(config: &TestConfig, mclk_period: SimTime) -> SimTime {
    let setup_time =
        2 * RoundSetup::word_count(config.frame_based) as SimTime * STROBE_HOLD + mclk_period;
    let bus_time: SimTime = rounds(config)
        .iter()
        .map(|setup| {
            let half_period = setup.half_period_mclk as SimTime * mclk_period;
            let timing = BusTiming::new(Justification::I2S, config.word_bits());
            let slots = timing.slots(setup.num_frames as usize + 1) as SimTime;
            setup_time + (2 * slots + RESPONSE_DELAY_HALF_PERIODS) * half_period
        })
        .sum();
    2 * bus_time
}
