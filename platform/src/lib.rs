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

//! A port level simulator: simthreads sample and drive the pins of named
//! ports, and are scheduled cooperatively on simulated time and pin changes.

mod clock;
mod error;
mod ports;
mod sim;
mod vcd;

// Public types
// type to use for simulated time, in picoseconds
pub type SimTime = u64;

pub const PS_PER_SECOND: u64 = 1_000_000_000_000;

pub use crate::clock::{Clock, ClockHandle, DEFAULT_CLOCK_HZ};
pub use crate::error::Error;
pub use crate::ports::{DriveResult, PortId, PortMap, PortState, ThreadId};
pub use crate::sim::{
    EndReason, SimArgs, SimContext, SimOutcome, SimOutput, SimThread, Simulation,
    SimulationCallbacks, Wait,
};
pub use crate::vcd::{VcdWriter, DEFAULT_VCD_FILE};
