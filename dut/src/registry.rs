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

//! Test binaries by id, the way the build lays them out:
//! `i2s_frame_slave_test_<bits>_<in>_<out>[_smoke]`.

use crate::app::SlaveTestApp;
use crate::faults::FaultInjection;
use crate::slave::FrameSlave;
use i2s_checker::{Error, PortBinding, TestConfig, TestLevel, TestPattern};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Build time knobs of a test binary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceOptions {
    pub pattern: TestPattern,
    pub frame_corruption_rate: f64,
    pub fault_seed: Option<u64>,
    /// Word width follows the bit depth; 32-bit words otherwise.
    pub frame_based: bool,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            pattern: TestPattern::default(),
            frame_corruption_rate: 0.0,
            fault_seed: None,
            frame_based: true,
        }
    }
}

pub type FrameSlaveDevice = FrameSlave<SlaveTestApp>;

pub struct DeviceRegistry {
    binaries: BTreeMap<String, TestConfig>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    /// Every combination of the test matrix, smoke and nightly.
    pub fn new() -> Self {
        let binaries = [TestLevel::Smoke, TestLevel::Nightly]
            .iter()
            .flat_map(|level| TestConfig::matrix(*level))
            .map(|config| (config.binary_id(), config))
            .collect();
        Self { binaries }
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.binaries.keys().map(String::as_str)
    }

    pub fn lookup(&self, id: &str) -> Result<TestConfig, Error> {
        self.binaries
            .get(id)
            .copied()
            .ok_or_else(|| Error::BinaryNotFound(id.to_owned()))
    }

    /// The binary a build environment produces.
    pub fn build(&self, build_env: &BTreeMap<String, String>) -> Result<String, Error> {
        let config = TestConfig::from_build_env(build_env)?;
        let id = config.binary_id();
        self.lookup(&id)?;
        log::debug!("Build environment {:?} produces {}", build_env, id);
        Ok(id)
    }

    pub fn instantiate(
        &self,
        id: &str,
        binding: PortBinding,
        options: &DeviceOptions,
    ) -> Result<FrameSlaveDevice, Error> {
        let config = TestConfig {
            frame_based: options.frame_based,
            ..self.lookup(id)?
        };
        let faults = FaultInjection::new(options.frame_corruption_rate, options.fault_seed);
        let app = SlaveTestApp::new(config, options.pattern, faults);
        FrameSlave::new(id, binding, config, app)
    }
}
