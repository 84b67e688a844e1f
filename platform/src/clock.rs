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

use crate::ports::PortId;
use crate::sim::{SimContext, SimThread, Wait};
use crate::{Error, SimTime, PS_PER_SECOND};

/// The frequency of a clock created with `Clock::new`, 25MHz.
pub const DEFAULT_CLOCK_HZ: u64 = 25_000_000;

/// What other simthreads need to know about a clock: where it is and how
/// fast it runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClockHandle {
    port: PortId,
    period: SimTime,
}

impl ClockHandle {
    pub fn port(&self) -> &PortId {
        &self.port
    }

    /// Period in picoseconds.
    pub fn period(&self) -> SimTime {
        self.period
    }

    pub fn half_period(&self) -> SimTime {
        self.period / 2
    }

    pub fn frequency(&self) -> u64 {
        PS_PER_SECOND / self.period
    }
}

/// Drives a square wave on a 1-bit port.
///
/// The clock starts low at time 0 and toggles every half period until the
/// simulation ends.
#[derive(Debug)]
pub struct Clock {
    handle: ClockHandle,
    name: String,
    value: u32,
    rising_edges: u64,
}

impl Clock {
    pub fn new(port: &str) -> Result<Self, Error> {
        Self::with_frequency(port, DEFAULT_CLOCK_HZ)
    }

    pub fn with_frequency(port: &str, frequency: u64) -> Result<Self, Error> {
        let port = PortId::new(port)?;
        if port.width() != 1 {
            return Err(Error::InvalidPortWidth(port.to_string(), port.width()));
        }
        if frequency == 0 || PS_PER_SECOND % frequency != 0 || (PS_PER_SECOND / frequency) % 2 != 0
        {
            return Err(Error::InvalidFrequency(frequency));
        }
        Ok(Self {
            name: format!("clock({})", port),
            handle: ClockHandle {
                port,
                period: PS_PER_SECOND / frequency,
            },
            value: 0,
            rising_edges: 0,
        })
    }

    pub fn handle(&self) -> ClockHandle {
        self.handle.clone()
    }

    pub fn rising_edges(&self) -> u64 {
        self.rising_edges
    }
}

impl SimThread for Clock {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> Vec<PortId> {
        vec![self.handle.port.clone()]
    }

    fn step(&mut self, ctx: &mut SimContext) -> Wait {
        ctx.drive_port_pins(&self.handle.port, self.value);
        if self.value == 1 {
            self.rising_edges += 1;
        }
        self.value ^= 1;
        Wait::For(self.handle.half_period())
    }

    fn terminate(&mut self, ctx: &mut SimContext) {
        log::debug!(
            "{} stopped @{} after {} rising edges",
            self.name,
            ctx.time(),
            self.rising_edges
        );
    }
}
