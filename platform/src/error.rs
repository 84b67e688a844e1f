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

use std::fmt;

use crate::SimTime;

#[derive(Debug, Eq, PartialEq)]
pub enum Error {
    /// The port name does not follow the `tile[N]:XS1_PORT_<width><letter>` form.
    InvalidPort(String),
    /// The port name parses, but its width is not a supported port width.
    InvalidPortWidth(String, u32),
    /// A clock frequency that does not give an even period in simulator ticks.
    InvalidFrequency(u64),
    /// A simulation was started without any simthreads.
    NoThreads,
    /// A simulation was started twice.
    AlreadyRun,
    /// Only daemon threads and no run length; the simulation would never end.
    Unbounded,
    /// A simulator argument that is unknown or misses its value.
    InvalidSimArg(String),
    /// VCD tracing could not be set up.
    Vcd(String),
    /// The simulation hit its run length before all device threads finished.
    Timeout(SimTime),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidPort(name) => write!(f, "ERROR: Invalid port name {}", name),
            Self::InvalidPortWidth(name, width) => {
                write!(f, "ERROR: Unsupported width {} for port {}", width, name)
            }
            Self::InvalidFrequency(hz) => {
                write!(f, "ERROR: Clock frequency {}Hz has no even period", hz)
            }
            Self::InvalidSimArg(arg) => write!(f, "ERROR: Invalid simulator argument {}", arg),
            Self::Vcd(msg) => write!(f, "ERROR: VCD tracing failed: {}", msg),
            Self::Timeout(time) => write!(f, "ERROR: Simulation timed out at {}ps", time),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl std::error::Error for Error {}
