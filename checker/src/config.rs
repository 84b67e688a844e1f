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

//! Test configuration, parsed once from the build environment.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

pub const ENV_BITDEPTHS: &str = "BITDEPTHS";
pub const ENV_NUMS_IN_OUT: &str = "NUMS_IN_OUT";
pub const ENV_SMOKE: &str = "SMOKE";

/// Prefix of the binary ids devices are registered under.
pub const BINARY_PREFIX: &str = "i2s_frame_slave_test";

/// (data lines in, data lines out) combinations of the test matrix.
pub const NUMS_IN_OUT: [(u32, u32); 5] = [(4, 4), (2, 2), (1, 1), (4, 0), (0, 4)];

/// Bits per sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BitDepth {
    Eight,
    Sixteen,
    ThirtyTwo,
}

impl BitDepth {
    pub const ALL: [BitDepth; 3] = [BitDepth::Eight, BitDepth::Sixteen, BitDepth::ThirtyTwo];

    pub fn new(bits: u32) -> Result<Self, Error> {
        match bits {
            8 => Ok(Self::Eight),
            16 => Ok(Self::Sixteen),
            32 => Ok(Self::ThirtyTwo),
            _ => Err(Error::InvalidBitDepth(bits)),
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Self::Eight => 8,
            Self::Sixteen => 16,
            Self::ThirtyTwo => 32,
        }
    }

    /// All-ones value of this width.
    pub fn mask(self) -> u32 {
        u32::MAX >> (32 - self.bits())
    }
}

impl TryFrom<u32> for BitDepth {
    type Error = Error;
    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        Self::new(bits)
    }
}

impl From<BitDepth> for u32 {
    fn from(depth: BitDepth) -> Self {
        depth.bits()
    }
}

impl FromStr for BitDepth {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bits = s
            .trim()
            .parse::<u32>()
            .map_err(|_| Error::InvalidBuildEnv(ENV_BITDEPTHS.to_owned(), s.to_owned()))?;
        Self::new(bits)
    }
}

impl fmt::Display for BitDepth {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// Number of serial data lines in one direction. Each line carries a left
/// and a right channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct LineCount(u32);

impl LineCount {
    pub const SUPPORTED: [u32; 4] = [0, 1, 2, 4];
    pub const MAX: usize = 4;

    pub fn new(lines: u32) -> Result<Self, Error> {
        if Self::SUPPORTED.contains(&lines) {
            Ok(Self(lines))
        } else {
            Err(Error::InvalidChannelCount(format!("{} data lines", lines)))
        }
    }

    pub fn lines(self) -> usize {
        self.0 as usize
    }

    /// Left and right channel for every line.
    pub fn channels(self) -> usize {
        2 * self.lines()
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<u32> for LineCount {
    type Error = Error;
    fn try_from(lines: u32) -> Result<Self, Self::Error> {
        Self::new(lines)
    }
}

impl From<LineCount> for u32 {
    fn from(lines: LineCount) -> Self {
        lines.0
    }
}

impl fmt::Display for LineCount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestLevel {
    /// Reduced scope for fast validation, `SMOKE=1`.
    Smoke,
    /// Full scope, `SMOKE=0`.
    Nightly,
}

impl TestLevel {
    pub fn from_nightly(nightly: bool) -> Self {
        if nightly {
            Self::Nightly
        } else {
            Self::Smoke
        }
    }

    /// The `SMOKE` build flag.
    pub fn smoke_flag(self) -> &'static str {
        match self {
            Self::Smoke => "1",
            Self::Nightly => "0",
        }
    }
}

impl FromStr for TestLevel {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(Self::Smoke),
            "0" => Ok(Self::Nightly),
            _ => Err(Error::InvalidBuildEnv(ENV_SMOKE.to_owned(), s.to_owned())),
        }
    }
}

/// Everything that selects a device build and the way it is checked.
/// Fixed for a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestConfig {
    pub bit_depth: BitDepth,
    pub num_in: LineCount,
    pub num_out: LineCount,
    #[serde(default = "default_frame_based")]
    pub frame_based: bool,
    pub level: TestLevel,
}

fn default_frame_based() -> bool {
    true
}

impl TestConfig {
    /// A frame based configuration; at least one direction must have lines.
    pub fn new(
        bit_depth: BitDepth,
        num_in: LineCount,
        num_out: LineCount,
        level: TestLevel,
    ) -> Result<Self, Error> {
        let config = Self {
            bit_depth,
            num_in,
            num_out,
            frame_based: true,
            level,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.num_in.is_empty() && self.num_out.is_empty() {
            return Err(Error::InvalidChannelCount(
                "no data lines in either direction".to_owned(),
            ));
        }
        Ok(())
    }

    /// Parses `BITDEPTHS`, `NUMS_IN_OUT` (`"in;out"`) and `SMOKE`.
    pub fn from_build_env(env: &BTreeMap<String, String>) -> Result<Self, Error> {
        let get = |name: &str| {
            env.get(name)
                .ok_or_else(|| Error::InvalidBuildEnv(name.to_owned(), String::new()))
        };
        let bit_depth = get(ENV_BITDEPTHS)?.parse::<BitDepth>()?;

        let nums = get(ENV_NUMS_IN_OUT)?;
        let bad_nums = || Error::InvalidBuildEnv(ENV_NUMS_IN_OUT.to_owned(), nums.to_owned());
        let (num_in, num_out) = nums.split_once(';').ok_or_else(bad_nums)?;
        let num_in = num_in.trim().parse::<u32>().map_err(|_| bad_nums())?;
        let num_out = num_out.trim().parse::<u32>().map_err(|_| bad_nums())?;

        let level = get(ENV_SMOKE)?.parse::<TestLevel>()?;
        let config = Self::new(
            bit_depth,
            LineCount::new(num_in)?,
            LineCount::new(num_out)?,
            level,
        )?;
        log::debug!("Build environment {:?} selects {:?}", env, config);
        Ok(config)
    }

    /// Reads the build environment from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        let env = [ENV_BITDEPTHS, ENV_NUMS_IN_OUT, ENV_SMOKE]
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|value| (name.to_string(), value)))
            .collect();
        Self::from_build_env(&env)
    }

    pub fn to_build_env(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (ENV_BITDEPTHS.to_owned(), self.bit_depth.to_string()),
            (
                ENV_NUMS_IN_OUT.to_owned(),
                format!("{};{}", self.num_in, self.num_out),
            ),
            (ENV_SMOKE.to_owned(), self.level.smoke_flag().to_owned()),
        ])
    }

    /// `<bits>_<in>_<out>`, with a `_smoke` suffix for smoke runs.
    pub fn id_string(&self) -> String {
        let mut id = format!("{}_{}_{}", self.bit_depth, self.num_in, self.num_out);
        if self.level == TestLevel::Smoke {
            id += "_smoke";
        }
        id
    }

    pub fn binary_id(&self) -> String {
        format!("{}_{}", BINARY_PREFIX, self.id_string())
    }

    /// Word width on the bus: the bit depth for frame based slaves, 32
    /// otherwise.
    pub fn word_bits(&self) -> u32 {
        if self.frame_based {
            self.bit_depth.bits()
        } else {
            32
        }
    }

    /// Every combination of the test matrix for a test level, bit depth major.
    pub fn matrix(level: TestLevel) -> Vec<Self> {
        let mut configs = Vec::new();
        for bit_depth in BitDepth::ALL {
            for (num_in, num_out) in NUMS_IN_OUT {
                configs.push(Self {
                    bit_depth,
                    num_in: LineCount(num_in),
                    num_out: LineCount(num_out),
                    frame_based: true,
                    level,
                });
            }
        }
        configs
    }

    pub fn from_file(file_name: &Path) -> Result<Self, Error> {
        let file = File::open(file_name)
            .map_err(|err| Error::Io(format!("{}: {}", file_name.display(), err)))?;
        let config: Self = serde_yaml::from_reader(BufReader::new(file))
            .map_err(|err| Error::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

impl FromStr for TestConfig {
    type Err = Error;
    fn from_str(config: &str) -> Result<Self, Self::Err> {
        let config: Self =
            serde_yaml::from_str(config).map_err(|err| Error::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
