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

use crate::ports::{PortId, PortMap};
use crate::SimTime;
use bitvec::prelude::*;
use itertools::Itertools;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::io;
use std::path;
use std::rc::Rc;

pub const DEFAULT_VCD_FILE: &str = "portsim.vcd";
pub const DEFAULT_TOP_MODULE: &str = "ports";
const DEFAULT_VCD_HEADER: &str = "portsim VCD";

pub struct VcdWriter {
    writer: vcd::Writer<fs::File>,
    is_error_state: bool,
    scope_stack: Vec<String>,
    id_map: HashMap<PortId, vcd::IdCode>,
    last_value_map: HashMap<vcd::IdCode, u32>,
    timestamp: Option<SimTime>,
}

pub struct VcdDeclScope {
    writer: Rc<RefCell<VcdWriter>>,
    scope: String,
}

impl Drop for VcdDeclScope {
    fn drop(&mut self) {
        self.writer.borrow_mut().upscope(self.scope.as_str());
    }
}

impl VcdWriter {
    pub fn new(dst: path::PathBuf) -> io::Result<Self> {
        let dst_file = fs::File::create(&dst)?;
        log::debug!("VCD file: {}", dst.display());
        Ok(Self {
            writer: vcd::Writer::new(dst_file),
            is_error_state: false,
            scope_stack: vec![],
            id_map: HashMap::new(),
            last_value_map: HashMap::new(),
            timestamp: None,
        })
    }

    /// A writer for `DEFAULT_VCD_FILE` in the temporary directory.
    pub fn in_temp_dir() -> io::Result<Self> {
        let mut vcd_path = std::env::temp_dir();
        vcd_path.push(DEFAULT_VCD_FILE);
        Self::new(vcd_path)
    }

    fn vcd_error_handler(&mut self, err: io::Error) {
        if !self.is_error_state {
            self.is_error_state = true;
            log::error!("VCD writing failed with error {:?}", err)
        }
    }

    pub fn is_error_state(&self) -> bool {
        self.is_error_state
    }

    pub fn managed_decl_scope<T>(writer: Rc<RefCell<VcdWriter>>, scope: &T) -> VcdDeclScope
    where
        T: Display + ?Sized,
    {
        writer.borrow_mut().add_module(scope);
        VcdDeclScope {
            writer: Rc::clone(&writer),
            scope: scope.to_string(),
        }
    }

    /// Declares one wire per port, grouped in a module per tile, and records
    /// the initial pin values at time 0.
    pub fn write_header(writer: Rc<RefCell<Self>>, ports: &PortMap) {
        {
            let mut w = writer.borrow_mut();
            if let Err(err) = w._write_preamble() {
                w.vcd_error_handler(err);
            }
        }
        {
            let _top_scope = VcdWriter::managed_decl_scope(Rc::clone(&writer), DEFAULT_TOP_MODULE);
            for (tile, tile_ports) in &ports.iter().group_by(|(port, _)| port.tile().to_owned()) {
                let _tile_scope = VcdWriter::managed_decl_scope(Rc::clone(&writer), &tile);
                for (port, _) in tile_ports {
                    writer.borrow_mut().add_port(port);
                }
            }
        }
        let mut w = writer.borrow_mut();
        if let Err(err) = w.writer.enddefinitions() {
            w.vcd_error_handler(err);
        }
        for (port, state) in ports.iter() {
            w.change_port(0, port, state.value());
        }
    }

    fn _write_preamble(&mut self) -> io::Result<()> {
        self.writer.comment(DEFAULT_VCD_HEADER)?;
        self.writer
            .date(chrono::Utc::now().to_string().as_str())?;
        self.writer.timescale(1, vcd::TimescaleUnit::PS)
    }

    /// Records a new value for `port` at `time`. Times must not go backwards.
    pub fn change_port(&mut self, time: SimTime, port: &PortId, value: u32) {
        if self.is_error_state {
            return;
        }
        let id_code = match self.id_map.get(port) {
            Some(id_code) => *id_code,
            None => {
                log::warn!("No such port {} was declared for VCD dumps.", port);
                return;
            }
        };
        if cfg!(feature = "trace-echo-vcd-signal-changes") {
            log::trace!("VCD changing {} to {:#x} @{}", port, value, time);
        }
        self._change_port(time, id_code, port.width(), value)
            .unwrap_or_else(|err| self.vcd_error_handler(err));
    }

    fn _change_port(
        &mut self,
        time: SimTime,
        id_code: vcd::IdCode,
        width: u32,
        value: u32,
    ) -> io::Result<()> {
        if self.last_value_map.get(&id_code) == Some(&value) {
            return Ok(());
        }
        if self.timestamp != Some(time) {
            self.writer.timestamp(time)?;
            self.timestamp = Some(time);
        }
        if width == 1 {
            self.writer.change_scalar(id_code, value & 1 == 1)?;
        } else {
            // VCD vectors are written MSB first.
            let values = value.view_bits::<Lsb0>()[..width as usize]
                .iter()
                .rev()
                .map(|b| (*b).into())
                .collect::<Vec<vcd::Value>>();
            self.writer.change_vector(id_code, values.as_slice())?;
        }
        self.last_value_map.insert(id_code, value);
        Ok(())
    }

    fn add_port(&mut self, port: &PortId) {
        if self.is_error_state {
            return;
        }
        match self
            .writer
            .add_var(vcd::VarType::Wire, port.width(), port.name(), None)
        {
            Ok(id_code) => {
                if self.id_map.insert(port.clone(), id_code).is_some() {
                    log::warn!("Port {} was redefined for VCD dumps.", port);
                }
            }
            Err(err) => self.vcd_error_handler(err),
        }
    }

    fn add_module<T: Display + ?Sized>(&mut self, name: &T) {
        if self.is_error_state {
            return;
        }
        match self.writer.add_module(&name.to_string()) {
            Ok(()) => self.scope_stack.push(name.to_string()),
            Err(err) => self.vcd_error_handler(err),
        }
    }

    fn upscope<T: Display + ?Sized>(&mut self, scope: &T) {
        if self.is_error_state {
            return;
        }
        match self.scope_stack.pop() {
            Some(popped_scope) => assert_eq!(popped_scope, scope.to_string()),
            None => {
                log::warn!("Attempted to leave scope {} without entering it.", scope);
                return;
            }
        }
        self.writer
            .upscope()
            .unwrap_or_else(|err| self.vcd_error_handler(err));
    }
}
