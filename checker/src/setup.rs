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

//! The setup bus: before each round the device announces the bus
//! configuration to the checker, one 16-bit word per strobe pulse, and the
//! checker answers on the response pin after the round.

use crate::config::{BitDepth, LineCount};
use crate::frame::Justification;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One configuration round as announced on the setup bus.
///
/// Fields hold the raw announced values; `validate` checks them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSetup {
    /// Bit clock half period in master clock periods.
    pub half_period_mclk: u32,
    pub num_in: u32,
    pub num_out: u32,
    pub mode: u32,
    /// Only announced to frame based checkers; 32 otherwise.
    pub data_bits: u32,
    pub num_frames: u32,
}

/// A validated round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Round {
    pub half_period_mclk: u32,
    pub num_in: LineCount,
    pub num_out: LineCount,
    pub justification: Justification,
    pub bit_depth: BitDepth,
    pub num_frames: usize,
}

impl RoundSetup {
    /// Words on the setup bus.
    pub fn word_count(frame_based: bool) -> usize {
        if frame_based {
            6
        } else {
            5
        }
    }

    pub fn to_words(&self, frame_based: bool) -> Vec<u32> {
        let mut words = vec![self.half_period_mclk, self.num_in, self.num_out, self.mode];
        if frame_based {
            words.push(self.data_bits);
        }
        words.push(self.num_frames);
        words
    }

    /// Returns `None` until all words of a setup arrived.
    pub fn from_words(words: &[u32], frame_based: bool) -> Option<Self> {
        if words.len() != Self::word_count(frame_based) {
            return None;
        }
        let (data_bits, num_frames) = if frame_based {
            (words[4], words[5])
        } else {
            (32, words[4])
        };
        Some(Self {
            half_period_mclk: words[0],
            num_in: words[1],
            num_out: words[2],
            mode: words[3],
            data_bits,
            num_frames,
        })
    }

    /// Every problem with the announced values.
    pub fn validate(&self) -> Result<Round, Vec<Error>> {
        let mut errors = Vec::new();
        let bit_depth = BitDepth::new(self.data_bits).map_err(|err| errors.push(err));
        let num_in = LineCount::new(self.num_in).map_err(|err| errors.push(err));
        let num_out = LineCount::new(self.num_out).map_err(|err| errors.push(err));
        let justification = Justification::from_code(self.mode).map_err(|err| errors.push(err));
        if self.half_period_mclk == 0 {
            errors.push(Error::InvalidConfig("zero bit clock half period".to_owned()));
        }
        match (bit_depth, num_in, num_out, justification) {
            (Ok(bit_depth), Ok(num_in), Ok(num_out), Ok(justification)) if errors.is_empty() => {
                Ok(Round {
                    half_period_mclk: self.half_period_mclk,
                    num_in,
                    num_out,
                    justification,
                    bit_depth,
                    num_frames: self.num_frames as usize,
                })
            }
            _ => Err(errors),
        }
    }
}

impl fmt::Display for RoundSetup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mode = match Justification::from_code(self.mode) {
            Ok(mode) => mode.to_string(),
            Err(_) => format!("UNKNOWN({})", self.mode),
        };
        write!(
            f,
            "bclk_half_period={} in={} out={} mode={} bits={} frames={}",
            self.half_period_mclk, self.num_in, self.num_out, mode, self.data_bits, self.num_frames
        )
    }
}

impl From<Round> for RoundSetup {
    fn from(round: Round) -> Self {
        Self {
            half_period_mclk: round.half_period_mclk,
            num_in: round.num_in.into(),
            num_out: round.num_out.into(),
            mode: round.justification.code(),
            data_bits: round.bit_depth.bits(),
            num_frames: round.num_frames as u32,
        }
    }
}
