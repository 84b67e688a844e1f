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

//! Samples, frames and the bit level view of an I2S bus.

use crate::config::{BitDepth, LineCount, TestConfig};
use crate::Error;
use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the first bit of a word sits relative to the word select edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Justification {
    /// Data lags word select by one bit clock.
    I2S,
    /// Data is aligned with word select.
    LeftJustified,
}

impl Justification {
    pub const ALL: [Justification; 2] = [Justification::I2S, Justification::LeftJustified];

    /// Bit clocks between a word select edge and the first bit of the word.
    pub fn data_delay(self) -> u32 {
        match self {
            Self::I2S => 1,
            Self::LeftJustified => 0,
        }
    }

    /// Code used on the setup bus.
    pub fn code(self) -> u32 {
        match self {
            Self::I2S => 0,
            Self::LeftJustified => 1,
        }
    }

    pub fn from_code(code: u32) -> Result<Self, Error> {
        match code {
            0 => Ok(Self::I2S),
            1 => Ok(Self::LeftJustified),
            _ => Err(Error::InvalidMode(code)),
        }
    }
}

impl fmt::Display for Justification {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::I2S => write!(f, "I2S"),
            Self::LeftJustified => write!(f, "LEFT_JUSTIFIED"),
        }
    }
}

/// A signed audio sample of a given bit depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Sample {
    value: i32,
    depth: BitDepth,
}

impl Sample {
    /// Keeps the low `depth` bits of `value`.
    pub fn new(value: i32, depth: BitDepth) -> Self {
        Self::from_raw(value as u32, depth)
    }

    /// Sign extends the low `depth` bits of `raw`.
    pub fn from_raw(raw: u32, depth: BitDepth) -> Self {
        let shift = 32 - depth.bits();
        Self {
            value: ((raw << shift) as i32) >> shift,
            depth,
        }
    }

    /// The sample in the top bits of a `word_bits` wide bus word.
    pub fn from_word(word: u32, word_bits: u32, depth: BitDepth) -> Self {
        Self::from_raw(word >> (word_bits - depth.bits()), depth)
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn depth(&self) -> BitDepth {
        self.depth
    }

    /// The two's complement bits of the sample.
    pub fn raw(&self) -> u32 {
        self.value as u32 & self.depth.mask()
    }

    /// The bus word carrying this sample, left aligned in `word_bits`.
    pub fn to_word(&self, word_bits: u32) -> u32 {
        self.raw() << (word_bits - self.depth.bits())
    }

    /// Inverts one bit, counted from the LSB.
    pub fn flip_bit(&mut self, bit: usize) {
        let mut raw = self.raw();
        let bits = raw.view_bits_mut::<Lsb0>();
        let value = bits[bit];
        bits.set(bit, !value);
        *self = Self::from_raw(raw, self.depth);
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let digits = (self.depth.bits() / 4) as usize;
        write!(f, "0x{:0width$x}", self.raw(), width = digits)
    }
}

/// Samples of one frame clock period. Channels are interleaved per data
/// line: channel `2 * line` is the left word, `2 * line + 1` the right word.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    depth: BitDepth,
    samples: Vec<Sample>,
}

impl Frame {
    pub fn new(depth: BitDepth, samples: Vec<Sample>) -> Self {
        Self { depth, samples }
    }

    /// Builds a frame from the left and right words of every line.
    pub fn from_words(left: &[u32], right: &[u32], word_bits: u32, depth: BitDepth) -> Self {
        let samples = left
            .iter()
            .zip(right)
            .flat_map(|(left, right)| {
                [
                    Sample::from_word(*left, word_bits, depth),
                    Sample::from_word(*right, word_bits, depth),
                ]
            })
            .collect();
        Self { depth, samples }
    }

    pub fn depth(&self) -> BitDepth {
        self.depth
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn channel_count(&self) -> usize {
        self.samples.len()
    }

    /// Bits on the bus for a frame based slave.
    pub fn bit_len(&self) -> usize {
        self.channel_count() * self.depth.bits() as usize
    }

    /// Bit `bit` (MSB first) of the bus word of `channel`.
    pub fn bit(&self, channel: usize, bit: u32, word_bits: u32) -> u32 {
        let word = self.samples[channel].to_word(word_bits);
        (word >> (word_bits - 1 - bit)) & 1
    }

    /// Checks that the frame holds `channels` samples, every one of them at
    /// `depth`.
    pub fn check(&self, depth: BitDepth, channels: usize) -> Result<(), FrameError> {
        if self.channel_count() != channels {
            return Err(FrameError::ChannelCount {
                found: self.channel_count(),
                expected: channels,
            });
        }
        match self.samples.iter().find(|sample| sample.depth() != depth) {
            Some(sample) => Err(FrameError::BitDepth {
                found: sample.depth().bits(),
                expected: depth.bits(),
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[")?;
        for (i, sample) in self.samples.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", sample)?;
        }
        write!(f, "]")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// Word select changed before a word had all its bits.
    ShortWord { bits: u32, expected: u32 },
    /// A word got more bits than it holds before word select changed.
    LongWord { expected: u32 },
    ChannelCount { found: usize, expected: usize },
    BitDepth { found: u32, expected: u32 },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ShortWord { bits, expected } => {
                write!(f, "word of {} bits, expected {}", bits, expected)
            }
            Self::LongWord { expected } => write!(f, "word longer than {} bits", expected),
            Self::ChannelCount { found, expected } => {
                write!(f, "{} channels, expected {}", found, expected)
            }
            Self::BitDepth { found, expected } => {
                write!(f, "{} bit samples, expected {}", found, expected)
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// What the pins of the bus look like at one rising bit clock edge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitSample {
    pub frame_clock: u32,
    /// One bit per data line.
    pub data: Vec<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WordEdge {
    /// Word select fell: the left word and a new frame start.
    FrameStart,
    /// Word select rose: the right word starts.
    RightWord,
}

/// Tracks the effective word select of a bus. The frame clock idles high.
#[derive(Clone, Debug)]
pub struct WordSelect {
    justification: Justification,
    last_frame_clock: u32,
    ws: u32,
}

impl WordSelect {
    pub fn new(justification: Justification) -> Self {
        Self {
            justification,
            last_frame_clock: 1,
            ws: 1,
        }
    }

    /// Feeds the frame clock sampled at a rising bit clock edge.
    pub fn update(&mut self, frame_clock: u32) -> Option<WordEdge> {
        let frame_clock = frame_clock & 1;
        let ws = match self.justification {
            Justification::I2S => self.last_frame_clock,
            Justification::LeftJustified => frame_clock,
        };
        self.last_frame_clock = frame_clock;
        let edge = match (self.ws, ws) {
            (1, 0) => Some(WordEdge::FrameStart),
            (0, 1) => Some(WordEdge::RightWord),
            _ => None,
        };
        self.ws = ws;
        edge
    }

    pub fn ws(&self) -> u32 {
        self.ws
    }
}

/// Position of a data bit on the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitPosition {
    pub frame: usize,
    /// 0 for the left word, 1 for the right word.
    pub channel: usize,
    /// MSB first.
    pub bit: u32,
}

/// The master's view of the bus: what the frame clock is, and which data
/// bit is on the lines, for every bit clock slot of a run of frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusTiming {
    pub justification: Justification,
    pub word_bits: u32,
}

impl BusTiming {
    pub fn new(justification: Justification, word_bits: u32) -> Self {
        Self {
            justification,
            word_bits,
        }
    }

    pub fn frame_bits(&self) -> usize {
        2 * self.word_bits as usize
    }

    /// Frame clock in bit clock slot `slot`.
    pub fn frame_clock(&self, slot: usize) -> u32 {
        ((slot / self.word_bits as usize) % 2) as u32
    }

    /// Bit clock slots that carry `frames` frames.
    pub fn slots(&self, frames: usize) -> usize {
        frames * self.frame_bits() + self.justification.data_delay() as usize
    }

    /// The data bit in `slot`; none before the first word.
    pub fn position(&self, slot: usize) -> Option<BitPosition> {
        let delay = self.justification.data_delay() as usize;
        slot.checked_sub(delay).map(|bit| Self::bit_position(bit, self.word_bits))
    }

    /// Position of the `bit`th data bit after the first frame start.
    pub fn bit_position(bit: usize, word_bits: u32) -> BitPosition {
        let word_bits = word_bits as usize;
        let word = bit / word_bits;
        BitPosition {
            frame: word / 2,
            channel: word % 2,
            bit: (bit % word_bits) as u32,
        }
    }
}

/// The protocol state of a bus observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CheckerState {
    Idle,
    AwaitingFrameEdge,
    SamplingBits,
    FrameComplete,
    Terminated,
}

impl fmt::Display for CheckerState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::AwaitingFrameEdge => "AWAITING_FRAME_EDGE",
            Self::SamplingBits => "SAMPLING_BITS",
            Self::FrameComplete => "FRAME_COMPLETE",
            Self::Terminated => "TERMINATED",
        };
        write!(f, "{}", name)
    }
}

/// Rebuilds frames from the data lines of one direction of the bus.
///
/// Feed it one `BitSample` per rising bit clock edge, in time order. Bits
/// are shifted in MSB first; a frame is emitted once the right word of
/// every line is complete. Cadence errors are reported and the decoder
/// waits for the next frame start.
#[derive(Clone, Debug)]
pub struct FrameDecoder {
    depth: BitDepth,
    word_bits: u32,
    lines: usize,
    word_select: WordSelect,
    state: CheckerState,
    right: bool,
    bit_count: u32,
    shift: Vec<u32>,
    left: Vec<u32>,
    frames: usize,
}

impl FrameDecoder {
    /// `word_bits` below the bit depth are raised to the bit depth.
    pub fn new(
        depth: BitDepth,
        lines: LineCount,
        word_bits: u32,
        justification: Justification,
    ) -> Self {
        Self {
            depth,
            word_bits: word_bits.clamp(depth.bits(), 32),
            lines: lines.lines(),
            word_select: WordSelect::new(justification),
            state: CheckerState::Idle,
            right: false,
            bit_count: 0,
            shift: vec![0; lines.lines()],
            left: vec![0; lines.lines()],
            frames: 0,
        }
    }

    pub fn for_config(config: &TestConfig, lines: LineCount, justification: Justification) -> Self {
        Self::new(config.bit_depth, lines, config.word_bits(), justification)
    }

    pub fn state(&self) -> CheckerState {
        self.state
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn word_bits(&self) -> u32 {
        self.word_bits
    }

    pub fn frames_decoded(&self) -> usize {
        self.frames
    }

    fn start_word(&mut self, right: bool) {
        self.right = right;
        self.bit_count = 0;
        self.shift.iter_mut().for_each(|word| *word = 0);
        self.state = CheckerState::SamplingBits;
    }

    pub fn push(&mut self, sample: &BitSample) -> Result<Option<Frame>, FrameError> {
        if self.lines == 0 || self.state == CheckerState::Terminated {
            return Ok(None);
        }
        let after_frame = self.state == CheckerState::FrameComplete;
        if matches!(self.state, CheckerState::Idle | CheckerState::FrameComplete) {
            self.state = CheckerState::AwaitingFrameEdge;
        }

        let edge = self.word_select.update(sample.frame_clock);
        // The bit after a complete frame starts the next one.
        if after_frame && edge != Some(WordEdge::FrameStart) {
            return Err(FrameError::LongWord {
                expected: self.word_bits,
            });
        }
        let mut error = None;
        match edge {
            Some(WordEdge::FrameStart) => {
                if self.state == CheckerState::SamplingBits {
                    error = Some(FrameError::ShortWord {
                        bits: self.bit_count,
                        expected: self.word_bits,
                    });
                }
                self.start_word(false);
            }
            Some(WordEdge::RightWord) => {
                if self.state == CheckerState::SamplingBits && !self.right {
                    if self.bit_count < self.word_bits {
                        error = Some(FrameError::ShortWord {
                            bits: self.bit_count,
                            expected: self.word_bits,
                        });
                        self.state = CheckerState::AwaitingFrameEdge;
                    } else {
                        self.left.copy_from_slice(&self.shift);
                        self.start_word(true);
                    }
                }
            }
            None => {}
        }

        if self.state == CheckerState::SamplingBits {
            if self.bit_count == self.word_bits {
                self.state = CheckerState::AwaitingFrameEdge;
                return Err(FrameError::LongWord {
                    expected: self.word_bits,
                });
            }
            for (line, word) in self.shift.iter_mut().enumerate() {
                let bit = sample.data.get(line).copied().unwrap_or(0) & 1;
                *word = (*word << 1) | bit;
            }
            self.bit_count += 1;
            if self.right && self.bit_count == self.word_bits {
                let frame = Frame::from_words(&self.left, &self.shift, self.word_bits, self.depth);
                log::debug!("Decoded frame {}: {}", self.frames, frame);
                self.frames += 1;
                self.state = CheckerState::FrameComplete;
                return Ok(Some(frame));
            }
        }
        match error {
            Some(error) => Err(error),
            None => Ok(None),
        }
    }

    pub fn terminate(&mut self) {
        self.state = CheckerState::Terminated;
    }
}
