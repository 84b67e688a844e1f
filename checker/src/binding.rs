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

use crate::config::LineCount;
use crate::Error;
use platform::PortId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Minimum width of the setup data port; setup words are 16 bits.
pub const SETUP_DATA_BITS: u32 = 16;

/// Which simulated port carries each signal of the bench.
///
/// Data lines are named from the point of view of the device: `din` lines
/// are driven by the checker and read by the device, `dout` lines are
/// driven by the device and sampled by the checker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    pub bclk: PortId,
    pub lrclk: PortId,
    pub din: Vec<PortId>,
    pub dout: Vec<PortId>,
    pub setup_strobe: PortId,
    pub setup_data: PortId,
    pub setup_resp: PortId,
}

fn port(name: &str) -> Result<PortId, Error> {
    PortId::new(name).map_err(|err| {
        log::debug!("{}", err);
        Error::InvalidPort(name.to_owned())
    })
}

impl PortBinding {
    pub fn new(
        bclk: &str,
        lrclk: &str,
        din: &[&str],
        dout: &[&str],
        setup_strobe: &str,
        setup_data: &str,
        setup_resp: &str,
    ) -> Result<Self, Error> {
        let binding = Self {
            bclk: port(bclk)?,
            lrclk: port(lrclk)?,
            din: din.iter().map(|name| port(name)).collect::<Result<_, _>>()?,
            dout: dout.iter().map(|name| port(name)).collect::<Result<_, _>>()?,
            setup_strobe: port(setup_strobe)?,
            setup_data: port(setup_data)?,
            setup_resp: port(setup_resp)?,
        };
        binding.validate()?;
        Ok(binding)
    }

    /// The ports of the frame slave test application.
    pub fn frame_slave() -> Result<Self, Error> {
        Self::new(
            "tile[0]:XS1_PORT_1B",
            "tile[0]:XS1_PORT_1C",
            &[
                "tile[0]:XS1_PORT_1H",
                "tile[0]:XS1_PORT_1I",
                "tile[0]:XS1_PORT_1J",
                "tile[0]:XS1_PORT_1K",
            ],
            &[
                "tile[0]:XS1_PORT_1D",
                "tile[0]:XS1_PORT_1E",
                "tile[0]:XS1_PORT_1F",
                "tile[0]:XS1_PORT_1G",
            ],
            "tile[0]:XS1_PORT_1L",
            "tile[0]:XS1_PORT_16A",
            "tile[0]:XS1_PORT_1M",
        )
    }

    pub fn validate(&self) -> Result<(), Error> {
        let one_bit_roles = [
            ("bclk", &self.bclk),
            ("lrclk", &self.lrclk),
            ("setup_strobe", &self.setup_strobe),
            ("setup_resp", &self.setup_resp),
        ];
        let data_roles = self
            .din
            .iter()
            .map(|port| ("din", port))
            .chain(self.dout.iter().map(|port| ("dout", port)));
        for (role, port) in one_bit_roles.into_iter().chain(data_roles) {
            if port.width() != 1 {
                return Err(Error::InvalidBinding(format!(
                    "{} needs a 1-bit port, {} has {} bits",
                    role,
                    port,
                    port.width()
                )));
            }
        }
        if self.setup_data.width() < SETUP_DATA_BITS {
            return Err(Error::InvalidBinding(format!(
                "setup_data needs {} bits, {} has {}",
                SETUP_DATA_BITS,
                self.setup_data,
                self.setup_data.width()
            )));
        }
        if self.din.len() > LineCount::MAX || self.dout.len() > LineCount::MAX {
            return Err(Error::InvalidBinding(format!(
                "at most {} data lines per direction",
                LineCount::MAX
            )));
        }
        let mut seen = BTreeSet::new();
        for port in self.ports() {
            if !seen.insert(port.clone()) {
                return Err(Error::InvalidBinding(format!("{} is bound twice", port)));
            }
        }
        Ok(())
    }

    /// The first `lines` device input lines.
    pub fn din_lines(&self, lines: LineCount) -> Result<&[PortId], Error> {
        Self::first_lines("din", &self.din, lines)
    }

    /// The first `lines` device output lines.
    pub fn dout_lines(&self, lines: LineCount) -> Result<&[PortId], Error> {
        Self::first_lines("dout", &self.dout, lines)
    }

    fn first_lines<'a>(
        role: &str,
        ports: &'a [PortId],
        lines: LineCount,
    ) -> Result<&'a [PortId], Error> {
        ports.get(..lines.lines()).ok_or_else(|| {
            Error::InvalidBinding(format!(
                "{} {} lines requested, {} bound",
                lines,
                role,
                ports.len()
            ))
        })
    }

    /// Every bound port.
    pub fn ports(&self) -> Vec<PortId> {
        let mut ports = vec![self.bclk.clone(), self.lrclk.clone()];
        ports.extend(self.din.iter().cloned());
        ports.extend(self.dout.iter().cloned());
        ports.extend([
            self.setup_strobe.clone(),
            self.setup_data.clone(),
            self.setup_resp.clone(),
        ]);
        ports
    }
}
