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

use crate::callback::{I2SFrameCallback, Restart};
use i2s_checker::{
    BitSample, BusTiming, Error, Frame, FrameDecoder, PortBinding, Round, Sample, TestConfig,
    WordEdge, WordSelect,
};
use platform::{PortId, SimContext, SimThread, SimTime, Wait};

/// How long the device holds each level of the setup strobe.
pub const STROBE_HOLD: SimTime = 100_000;

/// Bit clock half periods between the last bit of a round and sampling the
/// checker's response.
pub const RESPONSE_DELAY_HALF_PERIODS: u64 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Init,
    Announce,
    Bus,
    Response,
    Finished,
}

/// Bus state of the current round.
struct BusRound {
    round: Round,
    word_bits: u32,
    din: Vec<PortId>,
    dout: Vec<PortId>,
    word_select: WordSelect,
    decoder: FrameDecoder,
    /// Data bits since the first frame start; none until synchronised.
    position: Option<usize>,
    out_frame: Option<Frame>,
}

/// A frame based I2S slave.
///
/// The slave announces each round its callback asks for on the setup bus,
/// then follows the bus master: it synchronises on the first falling word
/// select, drives the next bit of every output line on falling bit clock
/// edges and samples the input lines on rising ones. Frame 0 of a round only
/// synchronises and carries no samples.
pub struct FrameSlave<C: I2SFrameCallback> {
    name: String,
    binding: PortBinding,
    config: TestConfig,
    callback: C,
    phase: Phase,
    words: Vec<u32>,
    strobes: usize,
    bus: Option<BusRound>,
    last_bclk: u32,
    last_edge: Option<SimTime>,
    half_period: Option<SimTime>,
    restart: Restart,
}

impl<C: I2SFrameCallback> FrameSlave<C> {
    pub fn new(
        name: &str,
        binding: PortBinding,
        config: TestConfig,
        callback: C,
    ) -> Result<Self, Error> {
        binding.din_lines(config.num_in)?;
        binding.dout_lines(config.num_out)?;
        Ok(Self {
            name: name.to_owned(),
            binding,
            config,
            callback,
            phase: Phase::Init,
            words: Vec::new(),
            strobes: 0,
            bus: None,
            last_bclk: 1,
            last_edge: None,
            half_period: None,
            restart: Restart::NoRestart,
        })
    }

    pub fn callback(&self) -> &C {
        &self.callback
    }

    fn init(&mut self, ctx: &mut SimContext) -> Wait {
        let setup = self.callback.init();
        let round = match setup.validate() {
            Ok(round) => round,
            Err(errors) => {
                for err in errors {
                    ctx.print(err.to_string());
                }
                self.phase = Phase::Finished;
                return Wait::Done;
            }
        };
        let (din, dout) = match (
            self.binding.din_lines(round.num_in),
            self.binding.dout_lines(round.num_out),
        ) {
            (Ok(din), Ok(dout)) => (din.to_vec(), dout.to_vec()),
            (Err(err), _) | (_, Err(err)) => {
                ctx.print(err.to_string());
                self.phase = Phase::Finished;
                return Wait::Done;
            }
        };
        let word_bits = if self.config.frame_based {
            round.bit_depth.bits()
        } else {
            32
        };
        log::info!("{} announces {} @{}", self.name, setup, ctx.time());
        self.bus = Some(BusRound {
            round,
            word_bits,
            din,
            dout,
            word_select: WordSelect::new(round.justification),
            decoder: FrameDecoder::new(
                round.bit_depth,
                round.num_in,
                word_bits,
                round.justification,
            ),
            position: None,
            out_frame: None,
        });
        self.words = setup.to_words(self.config.frame_based);
        self.strobes = 0;
        self.phase = Phase::Announce;
        self.announce(ctx)
    }

    /// One level change of the setup strobe; data is set up with the rising
    /// level.
    fn announce(&mut self, ctx: &mut SimContext) -> Wait {
        let word = self.strobes / 2;
        if self.strobes % 2 == 0 {
            ctx.drive_port_pins(&self.binding.setup_data, self.words[word]);
            ctx.drive_port_pins(&self.binding.setup_strobe, 1);
        } else {
            ctx.drive_port_pins(&self.binding.setup_strobe, 0);
        }
        self.strobes += 1;
        if self.strobes < 2 * self.words.len() {
            return Wait::For(STROBE_HOLD);
        }
        self.last_bclk = ctx.sample_port_pins(&self.binding.bclk);
        self.last_edge = None;
        self.phase = Phase::Bus;
        Wait::PinsChange(vec![self.binding.bclk.clone()])
    }

    fn bus_edge(&mut self, ctx: &mut SimContext) -> Wait {
        let bclk = ctx.sample_port_pins(&self.binding.bclk);
        if bclk != self.last_bclk {
            self.last_bclk = bclk;
            if let Some(last) = self.last_edge {
                self.half_period = Some(ctx.time() - last);
            }
            self.last_edge = Some(ctx.time());
            if bclk == 0 {
                self.falling_edge(ctx);
            } else if let Some(wait) = self.rising_edge(ctx) {
                return wait;
            }
        }
        Wait::PinsChange(vec![self.binding.bclk.clone()])
    }

    fn falling_edge(&mut self, ctx: &mut SimContext) {
        let bus = match self.bus.as_mut() {
            Some(bus) => bus,
            None => return,
        };
        let position = bus
            .position
            .map(|bit| BusTiming::bit_position(bit + 1, bus.word_bits))
            .filter(|pos| pos.frame >= 1 && pos.frame <= bus.round.num_frames);
        if let Some(pos) = position {
            if pos.channel == 0 && pos.bit == 0 && !bus.dout.is_empty() {
                let channels = bus.round.num_out.channels();
                let depth = bus.round.bit_depth;
                let frame = Frame::new(depth, self.callback.send());
                // Frames that do not fit the announced round go out as silence.
                let frame = match frame.check(depth, channels) {
                    Ok(()) => frame,
                    Err(err) => {
                        log::error!("{} cannot send frame {}: {}", self.name, pos.frame, err);
                        ctx.print(format!(
                            "ERROR: {} cannot send frame {}: {}",
                            self.name, pos.frame, err
                        ));
                        Frame::new(depth, vec![Sample::new(0, depth); channels])
                    }
                };
                bus.out_frame = Some(frame);
            }
        }
        for (line, port) in bus.dout.iter().enumerate() {
            let bit = match (position, &bus.out_frame) {
                (Some(pos), Some(frame)) => frame.bit(2 * line + pos.channel, pos.bit, bus.word_bits),
                _ => 0,
            };
            ctx.drive_port_pins(port, bit);
        }
    }

    /// Samples the inputs. Returns what to wait for when the round ended.
    fn rising_edge(&mut self, ctx: &mut SimContext) -> Option<Wait> {
        let bus = self.bus.as_mut()?;
        let frame_clock = ctx.sample_port_pins(&self.binding.lrclk);
        let edge = bus.word_select.update(frame_clock);
        bus.position = match (bus.position, edge) {
            (None, Some(WordEdge::FrameStart)) => {
                log::debug!("{} synchronised @{}", self.name, ctx.time());
                Some(0)
            }
            (None, _) => None,
            (Some(bit), _) => Some(bit + 1),
        };

        let sample = BitSample {
            frame_clock,
            data: bus
                .din
                .iter()
                .map(|port| ctx.sample_port_pins(port))
                .collect(),
        };
        match bus.decoder.push(&sample) {
            Ok(Some(frame)) => {
                if bus.decoder.frames_decoded() > 1 {
                    self.callback.receive(ctx, frame.samples());
                }
            }
            Ok(None) => {}
            Err(err) => ctx.print(format!("ERROR: {} input: {}", self.name, err)),
        }

        let bit = bus.position?;
        let frame_bits = 2 * bus.word_bits as usize;
        if bit % frame_bits != frame_bits - 1 || bit / frame_bits == 0 {
            return None;
        }
        self.restart = self.callback.restart_check();
        if self.restart == Restart::NoRestart {
            return None;
        }
        for port in &bus.dout {
            ctx.drive_port_pins(port, 0);
        }
        log::info!(
            "{} ends round after {} frames @{}",
            self.name,
            bit / frame_bits,
            ctx.time()
        );
        self.bus = None;
        self.phase = Phase::Response;
        let half_period = self.half_period.unwrap_or(STROBE_HOLD);
        Some(Wait::For(RESPONSE_DELAY_HALF_PERIODS * half_period))
    }

    fn response(&mut self, ctx: &mut SimContext) -> Wait {
        let failed = ctx.sample_port_pins(&self.binding.setup_resp) != 0;
        log::info!("{} round response: failed={}", self.name, failed);
        self.callback.response(failed);
        if self.restart == Restart::Shutdown {
            self.callback.shutdown(ctx);
            self.phase = Phase::Finished;
            return Wait::Done;
        }
        self.init(ctx)
    }
}

impl<C: I2SFrameCallback> SimThread for FrameSlave<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> Vec<PortId> {
        self.binding.ports()
    }

    fn is_daemon(&self) -> bool {
        false
    }

    fn step(&mut self, ctx: &mut SimContext) -> Wait {
        match self.phase {
            Phase::Init => self.init(ctx),
            Phase::Announce => self.announce(ctx),
            Phase::Bus => self.bus_edge(ctx),
            Phase::Response => self.response(ctx),
            Phase::Finished => Wait::Done,
        }
    }

    fn terminate(&mut self, ctx: &mut SimContext) {
        if self.phase != Phase::Finished {
            log::warn!(
                "{} stopped before finishing, in {:?} @{}",
                self.name,
                self.phase,
                ctx.time()
            );
        }
    }
}
