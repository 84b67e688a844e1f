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

use crate::config::BitDepth;
use crate::frame::{Frame, Sample};
use rand::RngCore;
use rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Checker to device, on the device's `din` lines.
    DeviceIn,
    /// Device to checker, on the device's `dout` lines.
    DeviceOut,
}

impl Direction {
    fn seed_tag(self) -> u64 {
        match self {
            Self::DeviceIn => 0x1,
            Self::DeviceOut => 0x2,
        }
    }
}

/// The samples both sides of the bus expect.
///
/// Every frame is generated from its own seed, so either side can produce
/// any frame of any round without keeping state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPattern {
    pub seed: u64,
}

impl Default for TestPattern {
    fn default() -> Self {
        Self {
            seed: 0x12C5_0F1A_2E5D_0B7E,
        }
    }
}

impl TestPattern {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn rng(&self, direction: Direction, round: usize, frame: usize) -> Xoshiro256StarStar {
        let seed = self.seed
            ^ (direction.seed_tag() << 60)
            ^ ((round as u64) << 32)
            ^ frame as u64;
        Xoshiro256StarStar::seed_from_u64(seed)
    }

    pub fn frame(
        &self,
        direction: Direction,
        round: usize,
        frame: usize,
        channels: usize,
        depth: BitDepth,
    ) -> Frame {
        let mut rng = self.rng(direction, round, frame);
        let samples = (0..channels)
            .map(|_| Sample::from_raw(rng.next_u32(), depth))
            .collect();
        Frame::new(depth, samples)
    }
}
