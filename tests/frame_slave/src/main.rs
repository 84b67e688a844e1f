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

use anyhow::{bail, Context, Result};
use env_logger::Target;
use frame_slave::DeviceOptions;
use frame_slave_test::{Harness, ReportEntry, RunResult};
use i2s_checker::{BitDepth, LineCount, TestConfig, TestLevel, TestPattern};
use platform::SimArgs;
use std::path::PathBuf;
use std::str::FromStr;
use structopt::StructOpt;

// Matrix runs every selected combination of the test matrix.
// Env runs the single binary selected by BITDEPTHS, NUMS_IN_OUT and SMOKE.
#[derive(StructOpt, Debug)]
enum Source {
    Matrix,
    Env,
}

impl FromStr for Source {
    type Err = std::io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Matrix" => Ok(Source::Matrix),
            "Env" => Ok(Source::Env),
            _ => Err(Self::Err::new(
                std::io::ErrorKind::Other,
                format!("Invalid configuration source: {}", s),
            )),
        }
    }
}

#[derive(StructOpt)]
#[structopt(
    name = "frame-slave-test",
    about = "Checks the I2S frame slave test binaries on the port simulator"
)]
struct Arguments {
    /// supported sources: Matrix, Env
    #[structopt(short, long, default_value = "Matrix")]
    source: Source,
    /// Only run this bit depth
    #[structopt(short, long)]
    bitdepth: Option<u32>,
    /// Only run this many input lines
    #[structopt(long)]
    num_in: Option<u32>,
    /// Only run this many output lines
    #[structopt(long)]
    num_out: Option<u32>,
    #[structopt(long)]
    nightly: bool,
    /// A single YAML test configuration; overrides the source
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,
    #[structopt(long, parse(from_os_str))]
    vcd_tracing: Option<PathBuf>,
    #[structopt(long)]
    max_time: Option<u64>,
    #[structopt(long, default_value = "0")]
    frame_corruption_rate: f64,
    #[structopt(long)]
    fault_seed: Option<u64>,
    #[structopt(long)]
    pattern_seed: Option<u64>,
    /// Write a JSON report of all runs
    #[structopt(long, parse(from_os_str))]
    report: Option<PathBuf>,
}

impl Arguments {
    fn configs(&self) -> Result<Vec<TestConfig>> {
        if let Some(path) = &self.config {
            return Ok(vec![TestConfig::from_file(path)?]);
        }
        let configs = match self.source {
            Source::Env => vec![TestConfig::from_env()?],
            Source::Matrix => TestConfig::matrix(TestLevel::from_nightly(self.nightly)),
        };
        let bit_depth = self.bitdepth.map(BitDepth::new).transpose()?;
        let num_in = self.num_in.map(LineCount::new).transpose()?;
        let num_out = self.num_out.map(LineCount::new).transpose()?;
        Ok(configs
            .into_iter()
            .filter(|config| bit_depth.map_or(true, |depth| config.bit_depth == depth))
            .filter(|config| num_in.map_or(true, |lines| config.num_in == lines))
            .filter(|config| num_out.map_or(true, |lines| config.num_out == lines))
            .collect())
    }

    fn sim_args(&self, config: &TestConfig, runs: usize) -> SimArgs {
        // One trace per binary when several run.
        let vcd_tracing = self.vcd_tracing.as_ref().map(|path| {
            if runs > 1 {
                let file_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| platform::DEFAULT_VCD_FILE.to_owned());
                path.with_file_name(format!("{}_{}", config.binary_id(), file_name))
            } else {
                path.clone()
            }
        });
        SimArgs {
            max_time: self.max_time,
            vcd_tracing,
        }
    }
}

fn print_result(result: &RunResult) {
    let status = if result.timed_out() {
        "TIMEOUT"
    } else if result.passed() {
        "PASS"
    } else {
        "FAIL"
    };
    println!("{}: {}", result.binary, status);
    if !result.passed() {
        for line in &result.output {
            println!("  | {}", line);
        }
        for discrepancy in &result.verdict.discrepancies {
            println!("  {}", discrepancy);
        }
    }
}

fn main() -> Result<()> {
    let args = Arguments::from_args();

    let _logger = env_logger::builder()
        .filter(Some("frame_slave_test"), log::LevelFilter::Info)
        .target(Target::Stderr)
        .init();

    let configs = args.configs()?;
    if configs.is_empty() {
        bail!("No test configuration matches the selection");
    }
    let mut options = DeviceOptions {
        frame_corruption_rate: args.frame_corruption_rate,
        fault_seed: args.fault_seed,
        ..Default::default()
    };
    if let Some(seed) = args.pattern_seed {
        options.pattern = TestPattern::new(seed);
    }
    let harness = Harness::with_options(options);

    let mut report = Vec::new();
    for config in &configs {
        let result = harness
            .run_config(config, Vec::new(), &args.sim_args(config, configs.len()))
            .with_context(|| format!("Failed to run {}", config.binary_id()))?;
        print_result(&result);
        report.push(ReportEntry::from(&result));
    }

    if let Some(path) = &args.report {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create report {}", path.display()))?;
        serde_json::to_writer_pretty(file, &report)?;
    }

    let failed = report.iter().filter(|entry| !entry.passed).count();
    if failed > 0 {
        bail!("{} of {} test binaries failed", failed, report.len());
    }
    println!("All {} test binaries passed", report.len());
    Ok(())
}
