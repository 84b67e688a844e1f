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

//! Model of a frame based I2S slave test binary: the slave, the test
//! application driving it, and the registry of binaries built from the
//! test matrix.

mod app;
mod callback;
mod faults;
pub mod plan;
mod registry;
mod slave;

pub use crate::app::SlaveTestApp;
pub use crate::callback::{I2SFrameCallback, Restart};
pub use crate::faults::FaultInjection;
pub use crate::registry::{DeviceOptions, DeviceRegistry, FrameSlaveDevice};
pub use crate::slave::{FrameSlave, RESPONSE_DELAY_HALF_PERIODS, STROBE_HOLD};
