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

use crate::binding::PortBinding;
use crate::frame::{BitSample, BusTiming, CheckerState, Frame, FrameDecoder};
use crate::pattern::{Direction, TestPattern};
use crate::setup::{Round, RoundSetup};
use platform::{ClockHandle, PortId, SimContext, SimThread, SimTime, Wait};
use serde::{Deserialize, Serialize};

pub const STARTED_MESSAGE: &str = "I2S frame slave checker started";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckerStats {
    /// Frames clocked through the bus, not counting synchronisation frames.
    pub frames: usize,
    /// Configuration rounds announced by the device.
    pub rounds: usize,
    pub errors: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Start,
    StrobeHigh,
    StrobeLow,
    AlignLow,
    AlignHigh,
    Falling,
    Rising,
    EndRound,
}

/// A round being clocked through the bus.
struct ActiveRound {
    index: usize,
    round: Round,
    timing: BusTiming,
    bclk_half: SimTime,
    slot: usize,
    total_slots: usize,
    din: Vec<PortId>,
    dout: Vec<PortId>,
    decoder: FrameDecoder,
    errors: usize,
}

fn report(ctx: &mut SimContext, line: String, round_errors: &mut usize, stats: &mut CheckerStats) {
    log::warn!("{}", line);
    ctx.print(line);
    *round_errors += 1;
    stats.errors += 1;
}

/// Bus master and protocol checker for an I2S slave.
///
/// The device announces each round over the setup bus. The checker then
/// clocks the announced number of frames, plus one leading synchronisation
/// frame, through the bus: it drives bit clock, frame clock and the
/// device's input lines on the falling bit clock edge, and samples the
/// device's output lines on the rising edge. Decoded frames are compared
/// against the device-to-checker pattern and every discrepancy is printed as
/// an `ERROR:` line. After a round the response pin carries the error flag.
pub struct I2SSlaveChecker {
    name: String,
    binding: PortBinding,
    mclk: ClockHandle,
    frame_based: bool,
    print_start: bool,
    pattern: TestPattern,
    phase: Phase,
    state: CheckerState,
    setup_words: Vec<u32>,
    round: Option<ActiveRound>,
    stats: CheckerStats,
}

impl I2SSlaveChecker {
    pub fn new(binding: PortBinding, mclk: ClockHandle, frame_based: bool) -> Self {
        Self {
            name: "i2s_slave_checker".to_owned(),
            binding,
            mclk,
            frame_based,
            print_start: true,
            pattern: TestPattern::default(),
            phase: Phase::Start,
            state: CheckerState::Idle,
            setup_words: Vec::new(),
            round: None,
            stats: CheckerStats::default(),
        }
    }

    pub fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn suppress_start_message(mut self) -> Self {
        self.print_start = false;
        self
    }

    pub fn state(&self) -> CheckerState {
        self.state
    }

    pub fn stats(&self) -> CheckerStats {
        self.stats
    }

    fn await_setup(&mut self) -> Wait {
        self.phase = Phase::StrobeHigh;
        Wait::PinsEq(self.binding.setup_strobe.clone(), 1)
    }

    fn begin_round(&mut self, ctx: &mut SimContext, setup: RoundSetup) -> Wait {
        let index = self.stats.rounds;
        self.stats.rounds += 1;
        ctx.print(format!("CONFIG: {}", setup));
        log::info!("Round {}: {}", index, setup);

        let mut errors = 0;
        let round = match setup.validate() {
            Ok(round) => Some(round),
            Err(problems) => {
                for problem in problems {
                    report(ctx, problem.to_string(), &mut errors, &mut self.stats);
                }
                None
            }
        };
        let lines = round.and_then(|round| {
            match (
                self.binding.din_lines(round.num_in),
                self.binding.dout_lines(round.num_out),
            ) {
                (Ok(din), Ok(dout)) => Some((round, din.to_vec(), dout.to_vec())),
                (Err(err), _) | (_, Err(err)) => {
                    report(ctx, err.to_string(), &mut errors, &mut self.stats);
                    None
                }
            }
        });
        let (round, din, dout) = match lines {
            Some(lines) => lines,
            None => {
                ctx.drive_port_pins(&self.binding.setup_resp, 1);
                return self.await_setup();
            }
        };

        let word_bits = if self.frame_based {
            round.bit_depth.bits()
        } else {
            32
        };
        let timing = BusTiming::new(round.justification, word_bits);
        self.round = Some(ActiveRound {
            index,
            round,
            timing,
            bclk_half: round.half_period_mclk as SimTime * self.mclk.period(),
            slot: 0,
            total_slots: timing.slots(round.num_frames + 1),
            din,
            dout,
            decoder: FrameDecoder::new(
                round.bit_depth,
                round.num_out,
                word_bits,
                round.justification,
            ),
            errors,
        });
        self.state = CheckerState::AwaitingFrameEdge;
        self.phase = Phase::AlignLow;
        Wait::PinsEq(self.mclk.port().clone(), 0)
    }

    /// Drives the frame clock and the device inputs for the current slot,
    /// then the falling bit clock edge.
    fn falling_edge(&mut self, ctx: &mut SimContext) -> Wait {
        let active = match self.round.as_ref() {
            Some(active) => active,
            None => return self.await_setup(),
        };
        let slot = active.slot;
        let timing = active.timing;
        let round = active.round;
        ctx.drive_port_pins(&self.binding.lrclk, timing.frame_clock(slot));

        let position = timing
            .position(slot)
            .filter(|pos| pos.frame >= 1 && pos.frame <= round.num_frames);
        let frame = position.map(|pos| {
            self.pattern.frame(
                Direction::DeviceIn,
                active.index,
                pos.frame,
                round.num_in.channels(),
                round.bit_depth,
            )
        });
        for (line, port) in active.din.iter().enumerate() {
            let bit = match (&frame, position) {
                (Some(frame), Some(pos)) => {
                    frame.bit(2 * line + pos.channel, pos.bit, timing.word_bits)
                }
                _ => 0,
            };
            ctx.drive_port_pins(port, bit);
        }
        ctx.drive_port_pins(&self.binding.bclk, 0);

        self.phase = Phase::Rising;
        Wait::For(active.bclk_half)
    }

    /// Raises the bit clock and samples the device outputs.
    fn rising_edge(&mut self, ctx: &mut SimContext) -> Wait {
        let active = match self.round.as_mut() {
            Some(active) => active,
            None => return self.await_setup(),
        };
        ctx.drive_port_pins(&self.binding.bclk, 1);
        let sample = BitSample {
            frame_clock: ctx.sample_port_pins(&self.binding.lrclk),
            data: active
                .dout
                .iter()
                .map(|port| ctx.sample_port_pins(port))
                .collect(),
        };
        log::trace!("slot {}: {:?}", active.slot, sample);
        match active.decoder.push(&sample) {
            Ok(Some(frame)) => Self::check_frame(ctx, active, &self.pattern, &mut self.stats, frame),
            Ok(None) => {}
            Err(err) => {
                let line = format!("ERROR: round {} slot {}: {}", active.index, active.slot, err);
                report(ctx, line, &mut active.errors, &mut self.stats);
            }
        }
        if !active.round.num_out.is_empty() {
            self.state = active.decoder.state();
        }

        active.slot += 1;
        self.phase = if active.slot == active.total_slots {
            Phase::EndRound
        } else {
            Phase::Falling
        };
        Wait::For(active.bclk_half)
    }

    fn check_frame(
        ctx: &mut SimContext,
        active: &mut ActiveRound,
        pattern: &TestPattern,
        stats: &mut CheckerStats,
        frame: Frame,
    ) {
        let index = active.decoder.frames_decoded() - 1;
        // Frame 0 only synchronises the slave.
        if index == 0 {
            return;
        }
        let round = active.round;
        if index > round.num_frames {
            let line = format!("ERROR: round {} unexpected frame {}", active.index, index);
            report(ctx, line, &mut active.errors, stats);
            return;
        }
        let expected = pattern.frame(
            Direction::DeviceOut,
            active.index,
            index,
            round.num_out.channels(),
            round.bit_depth,
        );
        for (channel, (expected, found)) in expected.samples().iter().zip(frame.samples()).enumerate()
        {
            if expected != found {
                let line = format!(
                    "ERROR: round {} frame {} channel {}: expected {}, got {}",
                    active.index, index, channel, expected, found
                );
                report(ctx, line, &mut active.errors, stats);
            }
        }
    }

    fn end_round(&mut self, ctx: &mut SimContext) -> Wait {
        if let Some(mut active) = self.round.take() {
            let round = active.round;
            if !round.num_out.is_empty() && active.decoder.frames_decoded() != round.num_frames + 1
            {
                let line = format!(
                    "ERROR: round {} decoded {} frames, expected {}",
                    active.index,
                    active.decoder.frames_decoded(),
                    round.num_frames + 1
                );
                report(ctx, line, &mut active.errors, &mut self.stats);
            }
            self.stats.frames += round.num_frames;
            ctx.drive_port_pins(&self.binding.lrclk, 1);
            ctx.drive_port_pins(&self.binding.setup_resp, (active.errors > 0) as u32);
            log::info!(
                "Round {} done: {} frames, {} errors",
                active.index,
                round.num_frames,
                active.errors
            );
        }
        self.state = CheckerState::Idle;
        self.await_setup()
    }
}

impl SimThread for I2SSlaveChecker {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> Vec<PortId> {
        let mut ports = self.binding.ports();
        ports.push(self.mclk.port().clone());
        ports
    }

    fn step(&mut self, ctx: &mut SimContext) -> Wait {
        match self.phase {
            Phase::Start => {
                if self.print_start {
                    ctx.print(STARTED_MESSAGE);
                }
                log::info!("{} started @{}", self.name, ctx.time());
                ctx.drive_port_pins(&self.binding.bclk, 1);
                ctx.drive_port_pins(&self.binding.lrclk, 1);
                ctx.drive_port_pins(&self.binding.setup_resp, 0);
                for port in &self.binding.din {
                    ctx.drive_port_pins(port, 0);
                }
                self.await_setup()
            }
            Phase::StrobeHigh => {
                let word = ctx.sample_port_pins(&self.binding.setup_data);
                log::debug!("Setup word {}: {}", self.setup_words.len(), word);
                self.setup_words.push(word);
                self.phase = Phase::StrobeLow;
                Wait::PinsEq(self.binding.setup_strobe.clone(), 0)
            }
            Phase::StrobeLow => {
                match RoundSetup::from_words(&self.setup_words, self.frame_based) {
                    Some(setup) => {
                        self.setup_words.clear();
                        self.begin_round(ctx, setup)
                    }
                    None => self.await_setup(),
                }
            }
            Phase::AlignLow => {
                self.phase = Phase::AlignHigh;
                Wait::PinsEq(self.mclk.port().clone(), 1)
            }
            Phase::AlignHigh | Phase::Falling => self.falling_edge(ctx),
            Phase::Rising => self.rising_edge(ctx),
            Phase::EndRound => self.end_round(ctx),
        }
    }

    fn terminate(&mut self, ctx: &mut SimContext) {
        if let Some(active) = self.round.as_mut() {
            log::warn!(
                "Simulation ended in round {} at slot {} of {}",
                active.index,
                active.slot,
                active.total_slots
            );
            active.decoder.terminate();
        }
        self.state = CheckerState::Terminated;
        ctx.print(format!(
            "Checked {} frames across {} configurations, {} errors",
            self.stats.frames, self.stats.rounds, self.stats.errors
        ));
    }
}
