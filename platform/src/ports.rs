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

use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::str::FromStr;

/// Port widths that exist on the simulated tiles.
const PORT_WIDTHS: [u32; 5] = [1, 4, 8, 16, 32];

const PORT_PREFIX: &str = "XS1_PORT_";

/// A simulated hardware port.
///
/// Ports are named the way the tools name them, `tile[0]:XS1_PORT_1A`: the
/// tile the port lives on, and a port name whose digits give the width of
/// the port in pins. Ports without a tile prefix live on `tile[0]`.
#[derive(Ord, PartialOrd, Eq, PartialEq, Hash, Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortId {
    tile: String,
    name: String,
    width: u32,
}

impl PortId {
    pub fn new(port: &str) -> Result<Self, Error> {
        let (tile, name) = match port.split_once(':') {
            Some((tile, name)) => (tile, name),
            None => ("tile[0]", port),
        };
        if tile.is_empty() || name.is_empty() {
            return Err(Error::InvalidPort(port.to_owned()));
        }
        let suffix = name
            .strip_prefix(PORT_PREFIX)
            .ok_or_else(|| Error::InvalidPort(port.to_owned()))?;
        let digits = suffix
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect::<String>();
        let letter = &suffix[digits.len()..];
        if digits.is_empty() || letter.is_empty() || !letter.chars().all(|c| c.is_ascii_uppercase())
        {
            return Err(Error::InvalidPort(port.to_owned()));
        }
        let width = digits
            .parse::<u32>()
            .map_err(|_| Error::InvalidPort(port.to_owned()))?;
        if !PORT_WIDTHS.contains(&width) {
            return Err(Error::InvalidPortWidth(port.to_owned(), width));
        }
        Ok(Self {
            tile: tile.to_owned(),
            name: name.to_owned(),
            width,
        })
    }

    pub fn tile(&self) -> &str {
        &self.tile
    }

    /// The port name without the tile, e.g. `XS1_PORT_16A`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of pins.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// All-ones value for the pins of this port.
    pub fn mask(&self) -> u32 {
        if self.width >= 32 {
            u32::MAX
        } else {
            (1u32 << self.width) - 1
        }
    }
}

impl FromStr for PortId {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PortId {
    type Error = Error;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<PortId> for String {
    fn from(port: PortId) -> Self {
        port.to_string()
    }
}

impl std::fmt::Display for PortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}:{}", self.tile, self.name)
    }
}

/// Index of a simthread in registration order.
pub type ThreadId = usize;

/// The current state of the pins of a port.
#[derive(Clone, Debug, Default)]
pub struct PortState {
    value: u32,
    /// The last thread that drove the port.
    driver: Option<ThreadId>,
    /// Whether a multidrive warning was already issued for this port.
    multidrive_reported: bool,
}

impl PortState {
    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn driver(&self) -> Option<ThreadId> {
        self.driver
    }
}

/// The outcome of driving a port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriveResult {
    /// The pin values changed.
    pub changed: bool,
    /// A second thread started driving the port; holds the previous driver.
    pub multidrive: Option<ThreadId>,
}

/// All ports in the simulation, in a stable (sorted) order.
///
/// Ports come into existence the first time a thread samples or drives
/// them; undriven ports read as zero.
#[derive(Clone, Debug, Default)]
pub struct PortMap {
    ports: BTreeMap<PortId, PortState>,
}

impl PortMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, port: &PortId) {
        self.ports.entry(port.clone()).or_default();
    }

    pub fn sample(&self, port: &PortId) -> u32 {
        self.ports.get(port).map(|state| state.value).unwrap_or(0)
    }

    pub fn drive(&mut self, port: &PortId, value: u32, thread: ThreadId) -> DriveResult {
        let state = self.ports.entry(port.clone()).or_default();
        let value = value & port.mask();
        let mut multidrive = None;
        if let Some(previous) = state.driver {
            if previous != thread && !state.multidrive_reported {
                state.multidrive_reported = true;
                multidrive = Some(previous);
            }
        }
        state.driver = Some(thread);
        let changed = state.value != value;
        state.value = value;
        DriveResult {
            changed,
            multidrive,
        }
    }

    pub fn get(&self, port: &PortId) -> Option<&PortState> {
        self.ports.get(port)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PortId, &PortState)> {
        self.ports.iter()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
