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

use crate::callback::{I2SFrameCallback, Restart};
use crate::faults::FaultInjection;
use crate::plan;
use i2s_checker::{BitDepth, Direction, RoundSetup, Sample, TestConfig, TestPattern};
use platform::SimContext;

/// The frame slave test application.
///
/// It runs the rounds of its configuration one after the other, checks
/// every received frame against the checker-to-device pattern and sends the
/// device-to-checker pattern. After the last round it prints `Pass` when
/// neither side saw an error, `Fail` otherwise.
pub struct SlaveTestApp {
    config: TestConfig,
    rounds: Vec<RoundSetup>,
    round: usize,
    frames_sent: usize,
    frames_received: usize,
    frames_done: usize,
    pattern: TestPattern,
    faults: FaultInjection,
    errors: usize,
    failed_rounds: usize,
}

impl SlaveTestApp {
    pub fn new(config: TestConfig, pattern: TestPattern, faults: FaultInjection) -> Self {
        Self {
            rounds: plan::rounds(&config),
            config,
            round: 0,
            frames_sent: 0,
            frames_received: 0,
            frames_done: 0,
            pattern,
            faults,
            errors: 0,
            failed_rounds: 0,
        }
    }

    pub fn rounds(&self) -> &[RoundSetup] {
        &self.rounds
    }

    /// Receive errors seen by the device.
    pub fn errors(&self) -> usize {
        self.errors
    }

    /// Rounds the checker flagged as failed.
    pub fn failed_rounds(&self) -> usize {
        self.failed_rounds
    }

    pub fn passed(&self) -> bool {
        self.errors == 0 && self.failed_rounds == 0
    }

    fn current(&self) -> RoundSetup {
        self.rounds[self.round.min(self.rounds.len() - 1)]
    }

    /// Sample depth on the bus: 32 bits unless the slave is frame based.
    fn depth(&self) -> BitDepth {
        BitDepth::new(self.current().data_bits).unwrap_or(self.config.bit_depth)
    }
}

impl I2SFrameCallback for SlaveTestApp {
    fn init(&mut self) -> RoundSetup {
        self.frames_sent = 0;
        self.frames_received = 0;
        self.frames_done = 0;
        self.current()
    }

    fn receive(&mut self, ctx: &mut SimContext, samples: &[Sample]) {
        self.frames_received += 1;
        let expected = self.pattern.frame(
            Direction::DeviceIn,
            self.round,
            self.frames_received,
            self.config.num_in.channels(),
            self.depth(),
        );
        for (channel, (expected, found)) in expected.samples().iter().zip(samples).enumerate() {
            if expected != found {
                self.errors += 1;
                ctx.print(format!(
                    "ERROR: device round {} frame {} channel {}: expected {}, got {}",
                    self.round, self.frames_received, channel, expected, found
                ));
            }
        }
    }

    fn send(&mut self) -> Vec<Sample> {
        self.frames_sent += 1;
        let frame = self.pattern.frame(
            Direction::DeviceOut,
            self.round,
            self.frames_sent,
            self.config.num_out.channels(),
            self.depth(),
        );
        let mut samples = frame.samples().to_vec();
        if self.faults.corrupt_frame(&mut samples) {
            log::info!(
                "Corrupted frame {} of round {}",
                self.frames_sent,
                self.round
            );
        }
        samples
    }

    fn restart_check(&mut self) -> Restart {
        self.frames_done += 1;
        if self.frames_done < self.current().num_frames as usize {
            return Restart::NoRestart;
        }
        if self.round + 1 < self.rounds.len() {
            self.round += 1;
            Restart::Restart
        } else {
            Restart::Shutdown
        }
    }

    fn response(&mut self, failed: bool) {
        if failed {
            self.failed_rounds += 1;
        }
    }

    fn shutdown(&mut self, ctx: &mut SimContext) {
        log::info!(
            "Test app done: {} receive errors, {} failed rounds",
            self.errors,
            self.failed_rounds
        );
        ctx.print(if self.passed() { "Pass" } else { "Fail" });
    }
}
