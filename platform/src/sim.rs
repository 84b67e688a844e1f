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

use crate::ports::{PortId, PortMap, ThreadId};
use crate::vcd::VcdWriter;
use crate::{Error, SimTime};

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::rc::Rc;

/// What a simthread waits for before it is stepped again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Wait {
    /// Wait a number of picoseconds.
    For(SimTime),
    /// Wait until an absolute time; times in the past resume immediately.
    Until(SimTime),
    /// Wait until any of the pins differ from their value at the time of the wait.
    PinsChange(Vec<PortId>),
    /// Wait until the port holds the value.
    PinsEq(PortId, u32),
    /// The thread has finished; it is never stepped again.
    Done,
}

/// A participant of the simulation.
///
/// Simthreads are cooperative state machines: the simulator calls `step`
/// whenever the condition the thread last returned is met, and the thread
/// does its work for that instant (sampling and driving pins) before
/// returning what it wants to wait for next.
pub trait SimThread {
    fn name(&self) -> &str;

    /// Ports the thread samples or drives, declared up front for tracing.
    fn ports(&self) -> Vec<PortId> {
        Vec::new()
    }

    /// Daemon threads (clocks, checkers) do not keep the simulation alive;
    /// the run ends once every non-daemon thread is done.
    fn is_daemon(&self) -> bool {
        true
    }

    fn step(&mut self, ctx: &mut SimContext) -> Wait;

    /// Called once for every thread when the simulation ends, in
    /// registration order.
    fn terminate(&mut self, _ctx: &mut SimContext) {}
}

/// Everything the simthreads printed, in simulated time order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimOutput {
    lines: Vec<String>,
}

impl SimOutput {
    pub fn print(&mut self, line: String) {
        log::debug!("sim output: {}", line);
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    pub fn to_text(&self) -> String {
        self.lines.iter().map(|line| format!("{}\n", line)).collect()
    }
}

/// Options for a simulation run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimArgs {
    /// Run length in picoseconds; the run stops at this time even if device
    /// threads are still running.
    pub max_time: Option<SimTime>,
    /// Trace all declared ports to this VCD file.
    pub vcd_tracing: Option<PathBuf>,
}

impl SimArgs {
    /// Parses command line style arguments: `--vcd-tracing <file>` and
    /// `--max-time <ps>`.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self, Error> {
        let mut sim_args = Self::default();
        let mut args = args.iter().map(|arg| arg.as_ref());
        while let Some(arg) = args.next() {
            match arg {
                "--vcd-tracing" => {
                    let path = args
                        .next()
                        .ok_or_else(|| Error::InvalidSimArg(arg.to_owned()))?;
                    sim_args.vcd_tracing = Some(PathBuf::from(path));
                }
                "--max-time" => {
                    let time = args
                        .next()
                        .and_then(|time| time.parse::<SimTime>().ok())
                        .ok_or_else(|| Error::InvalidSimArg(arg.to_owned()))?;
                    sim_args.max_time = Some(time);
                }
                _ => return Err(Error::InvalidSimArg(arg.to_owned())),
            }
        }
        Ok(sim_args)
    }
}

#[derive(Default)]
pub struct SimulationCallbacks {
    vcd_writer: Option<Rc<RefCell<VcdWriter>>>,
}

impl SimulationCallbacks {
    pub fn get_vcd_writer(&self) -> Option<Rc<RefCell<VcdWriter>>> {
        self.vcd_writer.as_ref().map(Rc::clone)
    }

    pub fn create_vcd_callbacks(path: Option<PathBuf>) -> Result<Self, Error> {
        let writer = match path {
            Some(path) => VcdWriter::new(path),
            None => VcdWriter::in_temp_dir(),
        }
        .map_err(|err| Error::Vcd(err.to_string()))?;
        Ok(Self {
            vcd_writer: Some(Rc::new(RefCell::new(writer))),
        })
    }

    pub fn vcd<F>(&mut self, f: F)
    where
        F: FnOnce(Rc<RefCell<VcdWriter>>),
    {
        if let Some(writer) = self.get_vcd_writer() {
            f(writer)
        }
    }
}

/// The view of the simulation a simthread gets while it is stepped.
pub struct SimContext<'a> {
    time: SimTime,
    thread: ThreadId,
    names: &'a [String],
    ports: &'a mut PortMap,
    output: &'a mut SimOutput,
    changed: &'a mut Vec<PortId>,
    callbacks: &'a mut SimulationCallbacks,
}

impl<'a> SimContext<'a> {
    pub fn time(&self) -> SimTime {
        self.time
    }

    pub fn thread_name(&self) -> &str {
        &self.names[self.thread]
    }

    pub fn sample_port_pins(&self, port: &PortId) -> u32 {
        self.ports.sample(port)
    }

    /// Drives the pins of `port`. The new value is visible to every thread
    /// stepped after this one, and wakes threads waiting on the port at the
    /// current time.
    pub fn drive_port_pins(&mut self, port: &PortId, value: u32) {
        let result = self.ports.drive(port, value, self.thread);
        if let Some(previous) = result.multidrive {
            let line = format!(
                "WARNING: multidrive on port {} (driven by {} and {})",
                port, self.names[previous], self.names[self.thread]
            );
            log::warn!("{}", line);
            self.output.print(line);
        }
        if result.changed {
            let value = self.ports.sample(port);
            let time = self.time;
            log::trace!(
                "{} drives {} = {:#x} @{}",
                self.names[self.thread],
                port,
                value,
                time
            );
            self.changed.push(port.clone());
            self.callbacks
                .vcd(|writer| writer.borrow_mut().change_port(time, port, value));
        }
    }

    /// Appends a line to the simulation output.
    pub fn print<S: Into<String>>(&mut self, line: S) {
        self.output.print(line.into());
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// Every device thread finished.
    AllDone,
    /// The run reached `SimArgs::max_time`.
    Timeout,
    /// No thread could be woken any more.
    Idle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimOutcome {
    pub end_time: SimTime,
    pub reason: EndReason,
    /// Number of times a simthread was stepped.
    pub steps: u64,
}

impl SimOutcome {
    pub fn ensure_finished(&self) -> Result<(), Error> {
        match self.reason {
            EndReason::Timeout => Err(Error::Timeout(self.end_time)),
            _ => Ok(()),
        }
    }
}

struct ThreadSlot {
    thread: Box<dyn SimThread>,
    daemon: bool,
    done: bool,
}

enum PinCondition {
    /// Pins and their values when the wait started.
    Change(Vec<(PortId, u32)>),
    Eq(PortId, u32),
}

impl PinCondition {
    fn involves(&self, changed: &[PortId]) -> bool {
        match self {
            Self::Change(pins) => pins.iter().any(|(port, _)| changed.contains(port)),
            Self::Eq(port, _) => changed.contains(port),
        }
    }

    fn satisfied(&self, ports: &PortMap) -> bool {
        match self {
            Self::Change(pins) => pins.iter().any(|(port, value)| ports.sample(port) != *value),
            Self::Eq(port, value) => ports.sample(port) == *value,
        }
    }
}

struct PinWaiter {
    thread: ThreadId,
    condition: PinCondition,
}

/// An event driven simulation of the pins of a set of ports.
///
/// Time is counted in picoseconds. Threads woken for the same instant run in
/// the order they were woken (registration order for the initial step at
/// time 0), and a thread runs to its next wait without being interrupted;
/// pin changes are therefore observed in exactly the order they were driven.
pub struct Simulation {
    args: SimArgs,
    threads: Vec<ThreadSlot>,
    names: Vec<String>,
    ports: PortMap,
    output: SimOutput,
    /// Runnable threads, ordered by wake time and then by wake order.
    queue: BinaryHeap<Reverse<(SimTime, u64, ThreadId)>>,
    sequence: u64,
    waiters: Vec<PinWaiter>,
    time: SimTime,
    callbacks: SimulationCallbacks,
    has_run: bool,
}

impl Simulation {
    pub fn new(args: SimArgs) -> Self {
        Self::with_callbacks(args, SimulationCallbacks::default())
    }

    pub fn with_callbacks(args: SimArgs, callbacks: SimulationCallbacks) -> Self {
        Self {
            args,
            threads: Vec::new(),
            names: Vec::new(),
            ports: PortMap::new(),
            output: SimOutput::default(),
            queue: BinaryHeap::new(),
            sequence: 0,
            waiters: Vec::new(),
            time: 0,
            callbacks,
            has_run: false,
        }
    }

    pub fn add_thread(&mut self, thread: Box<dyn SimThread>) -> ThreadId {
        for port in thread.ports() {
            self.ports.declare(&port);
        }
        let id = self.threads.len();
        log::debug!("Adding simthread {} as {}", thread.name(), id);
        self.names.push(thread.name().to_owned());
        self.threads.push(ThreadSlot {
            daemon: thread.is_daemon(),
            thread,
            done: false,
        });
        id
    }

    pub fn output(&self) -> &SimOutput {
        &self.output
    }

    pub fn ports(&self) -> &PortMap {
        &self.ports
    }

    pub fn time(&self) -> SimTime {
        self.time
    }

    fn schedule(&mut self, time: SimTime, thread: ThreadId) {
        self.sequence += 1;
        self.queue.push(Reverse((time, self.sequence, thread)));
    }

    fn all_devices_done(&self) -> bool {
        self.threads
            .iter()
            .filter(|slot| !slot.daemon)
            .all(|slot| slot.done)
    }

    fn apply_wait(&mut self, thread: ThreadId, wait: Wait) {
        log::trace!("{} waits for {:?} @{}", self.names[thread], wait, self.time);
        match wait {
            Wait::For(duration) => self.schedule(self.time + duration, thread),
            Wait::Until(time) => self.schedule(time.max(self.time), thread),
            Wait::PinsChange(ports) => {
                let pins = ports
                    .into_iter()
                    .map(|port| {
                        let value = self.ports.sample(&port);
                        (port, value)
                    })
                    .collect();
                self.waiters.push(PinWaiter {
                    thread,
                    condition: PinCondition::Change(pins),
                });
            }
            Wait::PinsEq(port, value) => {
                let value = value & port.mask();
                if self.ports.sample(&port) == value {
                    self.schedule(self.time, thread);
                } else {
                    self.waiters.push(PinWaiter {
                        thread,
                        condition: PinCondition::Eq(port, value),
                    });
                }
            }
            Wait::Done => {
                log::debug!("Simthread {} done @{}", self.names[thread], self.time);
                self.threads[thread].done = true;
            }
        }
    }

    fn wake_waiters(&mut self, changed: &[PortId]) {
        let ports = &self.ports;
        let (ready, waiting): (Vec<PinWaiter>, Vec<PinWaiter>) = self
            .waiters
            .drain(..)
            .partition(|waiter| {
                waiter.condition.involves(changed) && waiter.condition.satisfied(ports)
            });
        self.waiters = waiting;
        for waiter in ready {
            self.schedule(self.time, waiter.thread);
        }
    }

    /// Runs the simulation until every device thread is done, the run
    /// length is reached, or no thread can make progress.
    pub fn run(&mut self) -> Result<SimOutcome, Error> {
        if self.has_run {
            return Err(Error::AlreadyRun);
        }
        if self.threads.is_empty() {
            return Err(Error::NoThreads);
        }
        let has_devices = self.threads.iter().any(|slot| !slot.daemon);
        if !has_devices && self.args.max_time.is_none() {
            return Err(Error::Unbounded);
        }
        self.has_run = true;

        if self.callbacks.get_vcd_writer().is_none() {
            if let Some(path) = &self.args.vcd_tracing {
                self.callbacks = SimulationCallbacks::create_vcd_callbacks(Some(path.clone()))?;
            }
        }
        let ports = &self.ports;
        self.callbacks
            .vcd(|writer| VcdWriter::write_header(writer, ports));

        for thread in 0..self.threads.len() {
            self.schedule(0, thread);
        }

        let mut steps = 0u64;
        let reason = loop {
            if has_devices && self.all_devices_done() {
                break EndReason::AllDone;
            }
            let Reverse((time, _, thread)) = match self.queue.pop() {
                Some(entry) => entry,
                None => break EndReason::Idle,
            };
            if let Some(max_time) = self.args.max_time {
                if time > max_time {
                    self.time = max_time;
                    break EndReason::Timeout;
                }
            }
            self.time = time;
            if self.threads[thread].done {
                continue;
            }

            let mut changed = Vec::new();
            let wait = {
                let mut ctx = SimContext {
                    time: self.time,
                    thread,
                    names: &self.names,
                    ports: &mut self.ports,
                    output: &mut self.output,
                    changed: &mut changed,
                    callbacks: &mut self.callbacks,
                };
                self.threads[thread].thread.step(&mut ctx)
            };
            steps += 1;
            self.apply_wait(thread, wait);
            if !changed.is_empty() {
                self.wake_waiters(&changed);
            }
        };
        match reason {
            EndReason::AllDone => log::info!("Simulation finished @{}ps", self.time),
            EndReason::Timeout => log::warn!("Simulation timed out @{}ps", self.time),
            EndReason::Idle => log::warn!(
                "Simulation idle @{}ps, {} simthreads still waiting on pins",
                self.time,
                self.waiters.len()
            ),
        }

        let mut changed = Vec::new();
        for (thread, slot) in self.threads.iter_mut().enumerate() {
            let mut ctx = SimContext {
                time: self.time,
                thread,
                names: &self.names,
                ports: &mut self.ports,
                output: &mut self.output,
                changed: &mut changed,
                callbacks: &mut self.callbacks,
            };
            slot.thread.terminate(&mut ctx);
        }
        Ok(SimOutcome {
            end_time: self.time,
            reason,
            steps,
        })
    }
}
