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

use std::fmt;

#[derive(Debug, Eq, PartialEq)]
pub enum Error {
    /// Bits per sample other than 8, 16 or 32.
    InvalidBitDepth(u32),
    /// An unsupported number of data lines, or no data lines at all.
    InvalidChannelCount(String),
    /// A justification mode code that is neither I2S nor left justified.
    InvalidMode(u32),
    /// A build environment variable that is missing or malformed: (name, value).
    InvalidBuildEnv(String, String),
    /// No device is registered under the binary id.
    BinaryNotFound(String),
    /// A port name that does not parse.
    InvalidPort(String),
    /// A role bound to a port that cannot carry it.
    InvalidBinding(String),
    /// Reading an expectation or configuration file failed.
    Io(String),
    /// An expectation or ignore line that is not a valid regular expression.
    InvalidPattern(String),
    /// A configuration that does not deserialize.
    InvalidConfig(String),
    Sim(platform::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidBitDepth(bits) => write!(f, "ERROR: Unsupported bit depth {}", bits),
            Self::InvalidChannelCount(msg) => write!(f, "ERROR: Invalid channel count: {}", msg),
            Self::InvalidMode(mode) => write!(f, "ERROR: Unknown I2S mode {}", mode),
            Self::InvalidBuildEnv(name, value) => {
                write!(f, "ERROR: Invalid build environment {}={:?}", name, value)
            }
            Self::BinaryNotFound(id) => write!(f, "ERROR: No binary {}", id),
            Self::InvalidPort(name) => write!(f, "ERROR: Invalid port {}", name),
            Self::InvalidBinding(msg) => write!(f, "ERROR: Invalid port binding: {}", msg),
            Self::Io(msg) => write!(f, "ERROR: {}", msg),
            Self::InvalidPattern(msg) => write!(f, "ERROR: Invalid pattern: {}", msg),
            Self::InvalidConfig(msg) => write!(f, "ERROR: Invalid configuration: {}", msg),
            Self::Sim(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {}

impl From<platform::Error> for Error {
    fn from(err: platform::Error) -> Self {
        Self::Sim(err)
    }
}
