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

use i2s_checker::Sample;
use rand::{Rng, RngCore};
use rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;

const DEFAULT_FAULT_SEED: u64 = 0x2B99_5A1E_C0FF_EE15;

/// Characteristics of the faults the device injects into its output.
pub struct FaultInjection {
    /// Probability a transmitted frame has one bit of one sample flipped.
    pub frame_corruption_rate: f64,

    /// Random number generator used to pick frames, samples and bits.
    /// Note: the RNG provided by the Default implementation is deterministic.
    pub rng: Box<dyn RngCore>,
}

impl Default for FaultInjection {
    /// No faults.
    fn default() -> Self {
        Self {
            frame_corruption_rate: 0.0,
            rng: Box::new(Xoshiro256StarStar::seed_from_u64(DEFAULT_FAULT_SEED)),
        }
    }
}

impl FaultInjection {
    pub fn new(frame_corruption_rate: f64, seed: Option<u64>) -> Self {
        Self {
            frame_corruption_rate,
            rng: Box::new(Xoshiro256StarStar::seed_from_u64(
                seed.unwrap_or(DEFAULT_FAULT_SEED),
            )),
        }
    }

    /// Possibly corrupts one sample of a frame. Returns whether it did.
    pub fn corrupt_frame(&mut self, samples: &mut [Sample]) -> bool {
        if samples.is_empty() || self.frame_corruption_rate <= 0.0 {
            return false;
        }
        if !self.rng.gen_bool(self.frame_corruption_rate.min(1.0)) {
            return false;
        }
        let idx = self.rng.gen_range(0..samples.len());
        let bit = self.rng.gen_range(0..samples[idx].depth().bits() as usize);
        log::info!("Injecting frame corruption; sample {} bit {}", idx, bit);
        samples[idx].flip_bit(bit);
        true
    }
}
