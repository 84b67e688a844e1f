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

use env_logger::Target;
use frame_slave::DeviceOptions;
use frame_slave_test::{run_on_simulator, slave_tester, Harness, ReportEntry, RunResult};
use i2s_checker::{
    BitDepth, BitSample, Direction, Error, Frame, FrameDecoder, I2SSlaveChecker, Justification,
    LineCount, PortBinding, TestConfig, TestLevel, TestPattern,
};
use platform::{Clock, PortId, SimArgs, SimContext, SimThread, Wait};
use std::cell::RefCell;
use std::rc::Rc;

fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter(Some("frame_slave_test"), log::LevelFilter::Info)
        .target(Target::Stderr)
        .try_init();
}

fn config(bits: u32, num_in: u32, num_out: u32) -> TestConfig {
    TestConfig::new(
        BitDepth::new(bits).unwrap(),
        LineCount::new(num_in).unwrap(),
        LineCount::new(num_out).unwrap(),
        TestLevel::Smoke,
    )
    .unwrap()
}

fn assert_passed(result: &RunResult) {
    assert!(
        result.passed(),
        "{} failed:\n{}\n{:?}",
        result.binary,
        result.output.join("\n"),
        result.verdict.discrepancies
    );
}

/// Decodes the frames on the bus lines of the first round.
struct BusObserver {
    bclk: PortId,
    lrclk: PortId,
    lines: Vec<PortId>,
    last_bclk: u32,
    decoder: FrameDecoder,
    frames: Rc<RefCell<Vec<Frame>>>,
    limit: usize,
}

impl BusObserver {
    fn new(
        lines: &[PortId],
        depth: BitDepth,
        limit: usize,
        frames: Rc<RefCell<Vec<Frame>>>,
    ) -> Self {
        let binding = PortBinding::frame_slave().unwrap();
        let line_count = LineCount::new(lines.len() as u32).unwrap();
        Self {
            bclk: binding.bclk,
            lrclk: binding.lrclk,
            lines: lines.to_vec(),
            last_bclk: 1,
            decoder: FrameDecoder::new(depth, line_count, depth.bits(), Justification::I2S),
            frames,
            limit,
        }
    }
}

impl SimThread for BusObserver {
    fn name(&self) -> &str {
        "bus_observer"
    }

    fn step(&mut self, ctx: &mut SimContext) -> Wait {
        let bclk = ctx.sample_port_pins(&self.bclk);
        if self.last_bclk == 0 && bclk == 1 {
            let sample = BitSample {
                frame_clock: ctx.sample_port_pins(&self.lrclk),
                data: self
                    .lines
                    .iter()
                    .map(|line| ctx.sample_port_pins(line))
                    .collect(),
            };
            if let Ok(Some(frame)) = self.decoder.push(&sample) {
                let mut frames = self.frames.borrow_mut();
                frames.push(frame);
                if frames.len() == self.limit {
                    return Wait::Done;
                }
            }
        }
        self.last_bclk = bclk;
        Wait::PinsChange(vec![self.bclk.clone()])
    }
}

/// Counts the pin changes on a set of ports.
struct PinWatch {
    ports: Vec<PortId>,
    started: bool,
    changes: Rc<RefCell<usize>>,
}

impl SimThread for PinWatch {
    fn name(&self) -> &str {
        "pin_watch"
    }

    fn step(&mut self, _ctx: &mut SimContext) -> Wait {
        if self.started {
            *self.changes.borrow_mut() += 1;
        }
        self.started = true;
        Wait::PinsChange(self.ports.clone())
    }
}

#[test]
fn test_i2s_basic_frame_slave() {
    init_logging();
    let results = Harness::default()
        .run_matrix(TestLevel::Smoke, &SimArgs::default())
        .unwrap();
    assert_eq!(results.len(), 15);
    for result in &results {
        assert_passed(result);
    }
}

#[test]
#[ignore]
fn test_i2s_basic_frame_slave_nightly() {
    init_logging();
    let results = Harness::default()
        .run_matrix(TestLevel::Nightly, &SimArgs::default())
        .unwrap();
    assert_eq!(results.len(), 15);
    for result in &results {
        assert_passed(result);
    }
}

#[test]
fn test_summary_counts_frames_and_rounds() {
    init_logging();
    let result = Harness::default()
        .run_config(&config(8, 1, 1), Vec::new(), &SimArgs::default())
        .unwrap();
    assert_passed(&result);
    assert!(result
        .output
        .iter()
        .any(|line| line == "Checked 8 frames across 2 configurations, 0 errors"));
    assert_eq!(
        result
            .output
            .iter()
            .filter(|line| line.starts_with("CONFIG:"))
            .count(),
        2
    );
}

#[test]
fn test_corrupted_frames_fail() {
    init_logging();
    let harness = Harness::with_options(DeviceOptions {
        frame_corruption_rate: 1.0,
        fault_seed: Some(7),
        ..Default::default()
    });
    let result = harness
        .run_config(&config(16, 2, 2), Vec::new(), &SimArgs::default())
        .unwrap();
    assert!(!result.passed());
    assert!(result.output.iter().any(|line| line.starts_with("ERROR:")));
    assert!(result.output.iter().any(|line| line == "Fail"));
}

#[test]
fn test_single_direction_lines() {
    init_logging();
    let binding = PortBinding::frame_slave().unwrap();
    let harness = Harness::default();
    for (config, idle_lines) in [
        (config(8, 4, 0), &binding.dout),
        (config(32, 0, 4), &binding.din),
    ] {
        let changes = Rc::new(RefCell::new(0));
        let watch = PinWatch {
            ports: idle_lines.clone(),
            started: false,
            changes: Rc::clone(&changes),
        };
        let result = harness
            .run_config(&config, vec![Box::new(watch)], &SimArgs::default())
            .unwrap();
        assert_passed(&result);
        assert_eq!(*changes.borrow(), 0, "{}", result.binary);
    }
}

#[test]
fn test_16_bit_two_by_two_bus_frames() {
    init_logging();
    let binding = PortBinding::frame_slave().unwrap();
    let config = config(16, 2, 2);
    let num_frames = frame_slave::plan::SMOKE_FRAMES as usize;
    let frames = Rc::new(RefCell::new(Vec::new()));
    // The leading sync frame, then the frames of the first round.
    let observer = BusObserver::new(
        &binding.dout[..2],
        BitDepth::Sixteen,
        num_frames + 1,
        Rc::clone(&frames),
    );

    let result = Harness::default()
        .run_config(&config, vec![Box::new(observer)], &SimArgs::default())
        .unwrap();
    assert_passed(&result);

    let frames = frames.borrow();
    assert_eq!(frames.len(), num_frames + 1);
    assert!(frames[0].samples().iter().all(|sample| sample.raw() == 0));
    let pattern = TestPattern::default();
    for (index, frame) in frames.iter().enumerate().skip(1) {
        assert_eq!(frame.channel_count(), 4);
        assert_eq!(frame.bit_len(), 64);
        assert_eq!(
            *frame,
            pattern.frame(Direction::DeviceOut, 0, index, 4, BitDepth::Sixteen)
        );
    }
}

#[test]
fn test_reruns_are_identical() {
    init_logging();
    let harness = Harness::default();
    let config = config(32, 1, 1);
    let first = harness
        .run_config(&config, Vec::new(), &SimArgs::default())
        .unwrap();
    let second = harness
        .run_config(&config, Vec::new(), &SimArgs::default())
        .unwrap();
    assert_passed(&first);
    assert_eq!(first.output, second.output);
    assert_eq!(first.outcome.end_time, second.outcome.end_time);
}

#[test]
fn test_binary_must_match_build() {
    init_logging();
    let config = config(8, 2, 2);
    let err = run_on_simulator(
        "i2s_frame_slave_test_8_4_4_smoke",
        &slave_tester().unwrap(),
        Vec::new(),
        &config.to_build_env(),
        &SimArgs::default(),
    )
    .err()
    .unwrap();
    assert_eq!(
        err.downcast_ref::<Error>(),
        Some(&Error::BinaryNotFound(
            "i2s_frame_slave_test_8_4_4_smoke".to_owned()
        ))
    );

    let mut build_env = config.to_build_env();
    build_env.insert("BITDEPTHS".to_owned(), "24".to_owned());
    assert!(run_on_simulator(
        &config.binary_id(),
        &slave_tester().unwrap(),
        Vec::new(),
        &build_env,
        &SimArgs::default(),
    )
    .is_err());
}

#[test]
fn test_vcd_tracing() {
    init_logging();
    let mut vcd_path = std::env::temp_dir();
    vcd_path.push("frame_slave_test_trace.vcd");
    let sim_args = SimArgs::parse(&["--vcd-tracing", vcd_path.to_str().unwrap()]).unwrap();
    let result = Harness::default()
        .run_config(&config(8, 1, 1), Vec::new(), &sim_args)
        .unwrap();
    assert_passed(&result);

    let text = std::fs::read_to_string(&vcd_path).unwrap();
    assert!(text.contains("$timescale"));
    assert!(text.contains("XS1_PORT_1B"));
    assert!(text.contains("XS1_PORT_16A"));
}

#[test]
fn test_word_based_slave() {
    init_logging();
    let harness = Harness::default();
    for bits in [8, 16] {
        let config = TestConfig {
            frame_based: false,
            ..config(bits, 1, 1)
        };
        let result = harness
            .run_config(&config, Vec::new(), &SimArgs::default())
            .unwrap();
        assert_passed(&result);
        let configs = result
            .output
            .iter()
            .filter(|line| line.starts_with("CONFIG:"))
            .collect::<Vec<_>>();
        assert_eq!(configs.len(), 2);
        assert!(configs
            .iter()
            .all(|line| line.ends_with("bits=32 frames=4")));
    }
}

#[test]
fn test_device_detects_wrong_input() {
    init_logging();
    let config = config(16, 2, 2);
    let clock = Clock::new(frame_slave_test::MCLK_PORT).unwrap();
    let checker = I2SSlaveChecker::new(PortBinding::frame_slave().unwrap(), clock.handle(), true)
        .with_pattern(TestPattern::new(0x5eed));
    let result = run_on_simulator(
        &config.binary_id(),
        &slave_tester().unwrap(),
        vec![Box::new(clock), Box::new(checker)],
        &config.to_build_env(),
        &SimArgs::default(),
    )
    .unwrap();
    assert!(!result.passed());
    assert!(!result.timed_out());
    assert!(result
        .output
        .iter()
        .any(|line| line.starts_with("ERROR: device round 0 frame ")));
    assert!(result.output.iter().any(|line| line == "Fail"));
    assert!(!result.output.iter().any(|line| line == "Pass"));
}

#[test]
fn test_timeout_is_reported() {
    init_logging();
    let sim_args = SimArgs {
        max_time: Some(1_000_000),
        vcd_tracing: None,
    };
    let result = Harness::default()
        .run_config(&config(8, 1, 1), Vec::new(), &sim_args)
        .unwrap();
    assert!(result.timed_out());
    assert!(!result.passed());
    let entry = ReportEntry::from(&result);
    assert!(entry.timed_out);
    assert!(!entry.passed);
    assert_eq!(entry.end_time, 1_000_000);
}
