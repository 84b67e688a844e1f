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

use i2s_checker::{RoundSetup, Sample};
use platform::SimContext;

/// What the slave does after a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Restart {
    NoRestart,
    /// Stop the bus and start a new round with a fresh `init`.
    Restart,
    /// Stop the bus and exit.
    Shutdown,
}

/// The application side of a frame based I2S slave.
pub trait I2SFrameCallback {
    /// Called before each round; the returned setup is announced to the
    /// bus master.
    fn init(&mut self) -> RoundSetup;

    /// All samples of a received frame, interleaved per line.
    fn receive(&mut self, ctx: &mut SimContext, samples: &[Sample]);

    /// The samples for the next transmitted frame, interleaved per line.
    fn send(&mut self) -> Vec<Sample>;

    /// Called after every frame.
    fn restart_check(&mut self) -> Restart;

    /// The bus master's verdict on the round that just ended.
    fn response(&mut self, failed: bool);

    /// Called once after the last round.
    fn shutdown(&mut self, ctx: &mut SimContext);
}
