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

//! Runs the frame slave test binaries against the I2S slave checker on the
//! port simulator and compares their output with the expectation file.

use anyhow::{bail, Context, Result};
use frame_slave::{plan, DeviceOptions, DeviceRegistry};
use i2s_checker::{
    ComparisonOptions, ComparisonTester, Error, I2SSlaveChecker, PortBinding, TestConfig,
    TestLevel, Verdict,
};
use platform::{
    Clock, EndReason, SimArgs, SimOutcome, SimThread, SimTime, Simulation, PS_PER_SECOND,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const EXPECT_FILE: &str = "expected/slave_test.expect";
pub const MCLK_PORT: &str = "tile[0]:XS1_PORT_1A";

pub fn expect_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join(EXPECT_FILE)
}

/// The tester of the frame slave tests: ordered regular expressions,
/// multidrive warnings and `CONFIG:` lines dropped.
pub fn slave_tester() -> Result<ComparisonTester> {
    let path = expect_path();
    let tester = ComparisonTester::from_file(&path, ComparisonOptions::default())
        .with_context(|| format!("Failed to load expectations from {}", path.display()))?;
    Ok(tester)
}

pub struct RunResult {
    pub binary: String,
    pub output: Vec<String>,
    pub outcome: SimOutcome,
    pub verdict: Verdict,
}

impl RunResult {
    /// The run hit its length limit before the device finished.
    pub fn timed_out(&self) -> bool {
        self.outcome.reason == EndReason::Timeout
    }

    pub fn passed(&self) -> bool {
        self.verdict.passed() && !self.timed_out()
    }
}

/// One line of the JSON report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub binary: String,
    pub passed: bool,
    pub timed_out: bool,
    pub end_time: SimTime,
    pub discrepancies: Vec<String>,
}

impl From<&RunResult> for ReportEntry {
    fn from(result: &RunResult) -> Self {
        Self {
            binary: result.binary.clone(),
            passed: result.passed(),
            timed_out: result.timed_out(),
            end_time: result.outcome.end_time,
            discrepancies: result
                .verdict
                .discrepancies
                .iter()
                .map(|discrepancy| discrepancy.to_string())
                .collect(),
        }
    }
}

/// Builds test binaries and runs them on the simulator.
pub struct Harness {
    registry: DeviceRegistry,
    pub options: DeviceOptions,
    /// Master clock period used to bound runs without an explicit length.
    pub mclk_period: SimTime,
}

impl Default for Harness {
    fn default() -> Self {
        Self {
            registry: DeviceRegistry::new(),
            options: DeviceOptions::default(),
            mclk_period: PS_PER_SECOND / platform::DEFAULT_CLOCK_HZ,
        }
    }
}

impl Harness {
    pub fn with_options(options: DeviceOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    /// Builds `binary` from `build_env`, runs it together with `simthreads`
    /// and checks the output with `tester`.
    pub fn run_on_simulator(
        &self,
        binary: &str,
        tester: &ComparisonTester,
        simthreads: Vec<Box<dyn SimThread>>,
        build_env: &BTreeMap<String, String>,
        sim_args: &SimArgs,
    ) -> Result<RunResult> {
        self.run_device(&self.options, binary, tester, simthreads, build_env, sim_args)
    }

    fn run_device(
        &self,
        options: &DeviceOptions,
        binary: &str,
        tester: &ComparisonTester,
        simthreads: Vec<Box<dyn SimThread>>,
        build_env: &BTreeMap<String, String>,
        sim_args: &SimArgs,
    ) -> Result<RunResult> {
        let built = self
            .registry
            .build(build_env)
            .context("Failed to build the test binary")?;
        if built != binary {
            bail!(Error::BinaryNotFound(binary.to_owned()));
        }
        let config = TestConfig {
            frame_based: options.frame_based,
            ..self.registry.lookup(binary)?
        };
        let device = self
            .registry
            .instantiate(binary, PortBinding::frame_slave()?, options)?;

        let mut sim_args = sim_args.clone();
        if sim_args.max_time.is_none() {
            sim_args.max_time = Some(plan::run_length(&config, self.mclk_period));
        }
        log::info!("Running {} with {:?}", binary, sim_args);
        let mut sim = Simulation::new(sim_args);
        for simthread in simthreads {
            sim.add_thread(simthread);
        }
        sim.add_thread(Box::new(device));
        let outcome = sim
            .run()
            .with_context(|| format!("Simulation of {} failed", binary))?;
        if let Err(err) = outcome.ensure_finished() {
            log::warn!("{}: {}", binary, err);
        }

        let output = sim.output().lines().to_vec();
        let verdict = tester.run(&output);
        log::info!(
            "{}: {} @{}ps",
            binary,
            if verdict.passed() && outcome.ensure_finished().is_ok() {
                "PASS"
            } else {
                "FAIL"
            },
            outcome.end_time
        );
        Ok(RunResult {
            binary: binary.to_owned(),
            output,
            outcome,
            verdict,
        })
    }

    /// Runs one configuration of the test matrix with the standard bench:
    /// the master clock, the slave checker and `observers`.
    pub fn run_config(
        &self,
        config: &TestConfig,
        observers: Vec<Box<dyn SimThread>>,
        sim_args: &SimArgs,
    ) -> Result<RunResult> {
        let clock = Clock::new(MCLK_PORT)?;
        let checker =
            I2SSlaveChecker::new(PortBinding::frame_slave()?, clock.handle(), config.frame_based)
                .with_pattern(self.options.pattern);
        let mut simthreads: Vec<Box<dyn SimThread>> = vec![Box::new(clock), Box::new(checker)];
        simthreads.extend(observers);
        // The device is built for the same word width the checker expects.
        let options = DeviceOptions {
            frame_based: config.frame_based,
            ..self.options.clone()
        };
        self.run_device(
            &options,
            &config.binary_id(),
            &slave_tester()?,
            simthreads,
            &config.to_build_env(),
            sim_args,
        )
    }

    pub fn run_matrix(&self, level: TestLevel, sim_args: &SimArgs) -> Result<Vec<RunResult>> {
        TestConfig::matrix(level)
            .iter()
            .map(|config| self.run_config(config, Vec::new(), sim_args))
            .collect()
    }
}

/// `Harness::run_on_simulator` with default device options.
pub fn run_on_simulator(
    binary: &str,
    tester: &ComparisonTester,
    simthreads: Vec<Box<dyn SimThread>>,
    build_env: &BTreeMap<String, String>,
    sim_args: &SimArgs,
) -> Result<RunResult> {
    Harness::default().run_on_simulator(binary, tester, simthreads, build_env, sim_args)
}
