use crate::{
    address,
    config::{self, Arch},
    csr, decode, instruction, memory, trace,
};
use console::style;
use smallvec::SmallVec;
use std::sync::Arc;
use trace_model::{ActiveMask, LaneWrite, TraceRecord};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    #[error("instruction fetch failed")]
    Fetch(#[source] memory::Error),
    #[error("decode failed")]
    Decode(#[from] decode::Error),
    #[error("execution failed")]
    Execute(#[from] instruction::Error),
}

/// A warp could not complete a step.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("core {core_id} warp {warp_id} faulted at pc {pc:#010x}")]
pub struct Error {
    pub core_id: usize,
    pub warp_id: usize,
    pub pc: address,
    #[source]
    pub fault: Fault,
}

/// General purpose registers of all lanes of a warp, indexed `[lane][register]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    lanes: Vec<Vec<u64>>,
    word_mask: u64,
}

impl RegisterFile {
    #[must_use]
    pub fn new(num_threads: usize, num_registers: usize, word_mask: u64) -> Self {
        Self {
            lanes: vec![vec![0; num_registers]; num_threads],
            word_mask,
        }
    }

    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.lanes.len()
    }

    #[must_use]
    pub fn num_registers(&self) -> usize {
        self.lanes.first().map_or(0, Vec::len)
    }

    /// Raw content of a register cell.
    ///
    /// Unlike [`RegisterFile::read`], cell 0 is not hard-wired to zero.
    #[must_use]
    pub fn get(&self, lane: usize, index: usize) -> u64 {
        self.lanes[lane][index]
    }

    pub fn set(&mut self, lane: usize, index: usize, value: u64) {
        self.lanes[lane][index] = value & self.word_mask;
    }

    /// Read a register operand, `x0` reads as zero.
    #[must_use]
    pub fn read(&self, lane: usize, reg: instruction::Register) -> u64 {
        match reg {
            0 => 0,
            reg => self.get(lane, usize::from(reg)),
        }
    }

    /// Write a destination register, writes to `x0` are discarded.
    pub fn write(&mut self, lane: usize, reg: instruction::Register, value: u64) {
        if reg != 0 {
            self.set(lane, usize::from(reg), value);
        }
    }

    #[must_use]
    pub fn row(&self, lane: usize) -> &[u64] {
        &self.lanes[lane]
    }

    pub fn set_row(&mut self, lane: usize, row: &[u64]) {
        self.lanes[lane].copy_from_slice(row);
    }
}

/// Architectural state of a warp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    pub pc: address,
    pub mask: ActiveMask,
    pub registers: RegisterFile,
    /// Control/status bank shared by all lanes.
    pub csrs: Vec<u16>,
    pub interrupt_enabled: bool,
    pub supervisor: bool,
    /// Whether the warp has been dispatched.
    pub spawned: bool,
}

impl State {
    #[must_use]
    pub fn active_threads(&self) -> usize {
        self.mask.count()
    }
}

/// Snapshot taken when an interrupt is taken.
///
/// Only meaningful while the warp is inside its handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shadow {
    pub pc: address,
    pub active_threads: usize,
    pub mask: ActiveMask,
    /// Register row of lane 0.
    pub registers: Vec<u64>,
    pub interrupt_enabled: bool,
    pub supervisor: bool,
}

/// Entry of the reconvergence stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconvergence {
    /// Restore `mask` and continue after the join.
    Fallthrough { mask: ActiveMask },
    /// Run the not-taken lanes from `pc` before reconverging.
    Else { mask: ActiveMask, pc: address },
}

/// Request to activate other warps of the same core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spawn {
    /// Warps `1..count` are spawned.
    pub count: u64,
    pub pc: address,
}

#[derive(Debug, Clone)]
pub struct Warp {
    id: usize,
    core_id: usize,
    arch: Arc<Arch>,
    state: State,
    shadow: Shadow,
    ipdom: SmallVec<[Reconvergence; 8]>,
    stats: stats::Warp,
}

impl Warp {
    /// Create warp `id` of core `core_id` in its reset state.
    ///
    /// Lane 0 is active at the reset pc in supervisor mode. Register cell 0 of lane 0 holds
    /// `(num_threads << (word_bits / 2)) | id`.
    #[must_use]
    pub fn new(core_id: usize, id: usize, arch: Arc<Arch>) -> Self {
        let num_threads = arch.num_threads;
        let mut registers = RegisterFile::new(num_threads, arch.num_registers, arch.word_mask());
        let self_id = ((num_threads as u64) << (arch.word_bits() / 2)) | id as u64;
        registers.set(0, 0, self_id);

        let state = State {
            pc: arch.reset_pc,
            mask: ActiveMask::first(num_threads, 1),
            registers,
            csrs: vec![0; config::NUM_CSRS],
            interrupt_enabled: true,
            supervisor: true,
            spawned: true,
        };
        let shadow = Shadow {
            pc: 0,
            active_threads: 0,
            mask: ActiveMask::new(num_threads),
            registers: vec![0; arch.num_registers],
            interrupt_enabled: false,
            supervisor: false,
        };
        Self {
            id,
            core_id,
            arch,
            state,
            shadow,
            ipdom: SmallVec::new(),
            stats: stats::Warp::new(core_id, id),
        }
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn core_id(&self) -> usize {
        self.core_id
    }

    #[must_use]
    pub fn arch(&self) -> &Arch {
        &self.arch
    }

    #[must_use]
    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    #[must_use]
    pub fn shadow(&self) -> &Shadow {
        &self.shadow
    }

    #[must_use]
    pub fn stats(&self) -> &stats::Warp {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut stats::Warp {
        &mut self.stats
    }

    #[must_use]
    pub fn active(&self) -> bool {
        self.state.active_threads() > 0
    }

    #[must_use]
    pub fn reconvergence_depth(&self) -> usize {
        self.ipdom.len()
    }

    pub fn push_reconvergence(&mut self, entry: Reconvergence) {
        self.ipdom.push(entry);
    }

    pub fn pop_reconvergence(&mut self) -> Option<Reconvergence> {
        self.ipdom.pop()
    }

    /// Deactivate all lanes and mark the warp as not yet dispatched.
    pub fn park(&mut self) {
        self.state.mask.fill(false);
        self.state.spawned = false;
    }

    /// Dispatch a parked warp at `pc` with lane 0 active in user mode.
    ///
    /// Returns `false` if the warp was already dispatched.
    pub fn spawn(&mut self, pc: address) -> bool {
        if self.state.spawned {
            return false;
        }
        self.state.pc = pc & self.arch.word_mask();
        self.state.mask.set_first(1);
        self.state.supervisor = false;
        self.state.spawned = true;
        self.ipdom.clear();
        log::debug!(
            "core {} warp {} spawned at pc {:#x}",
            self.core_id,
            self.id,
            self.state.pc
        );
        true
    }

    /// Value of control/status register `csr` as seen by `lane`.
    #[must_use]
    pub fn read_csr(&self, lane: usize, csr: u16) -> u64 {
        match csr {
            csr::THREAD_ID => lane as u64,
            csr::WARP_ID => self.id as u64,
            csr::CORE_ID => self.core_id as u64,
            csr::WARP_ARGUMENT => self.state.registers.get(0, 0),
            csr::NUM_THREADS => self.arch.num_threads as u64,
            csr::NUM_WARPS => self.arch.num_warps as u64,
            csr::NUM_CORES => self.arch.num_cores as u64,
            csr::CYCLE => self.stats.steps,
            csr::INSTRET => self.stats.instructions,
            csr => self
                .state
                .csrs
                .get(usize::from(csr))
                .copied()
                .map_or(0, u64::from),
        }
    }

    /// Store the low 16 bits of `value` in the control/status bank.
    pub fn write_csr(&mut self, csr: u16, value: u64) {
        if let Some(cell) = self.state.csrs.get_mut(usize::from(csr)) {
            *cell = value as u16;
        }
    }

    fn fault(&self, pc: address, fault: impl Into<Fault>) -> Error {
        Error {
            core_id: self.core_id,
            warp_id: self.id,
            pc,
            fault: fault.into(),
        }
    }

    /// Fetch, decode and execute one instruction on the active lanes.
    ///
    /// Does nothing when no lane is active.
    pub fn step(
        &mut self,
        memory: &mut dyn memory::Port,
        decoder: &dyn decode::Decode,
        trace: &mut dyn trace::Sink,
    ) -> Result<Option<Spawn>, Error> {
        if !self.active() {
            return Ok(None);
        }
        let word_mask = self.arch.word_mask();
        self.state.pc &= word_mask;
        let pc = self.state.pc;

        let word = memory
            .fetch(pc, self.state.supervisor)
            .map_err(|err| self.fault(pc, Fault::Fetch(err)))?;
        let (instr, size) = decoder
            .decode(&word.to_le_bytes(), 0)
            .map_err(|err| self.fault(pc, err))?;

        self.state.pc = pc.wrapping_add(size as u64) & word_mask;
        let mask = self.state.mask;
        let spawn = instr
            .apply(pc, self, memory)
            .map_err(|err| self.fault(pc, err))?;
        self.stats.steps += 1;

        if trace.enabled() {
            trace.record(&self.trace_record(pc, &instr, mask));
        }
        Ok(spawn)
    }

    fn trace_record(
        &self,
        pc: address,
        instr: &instruction::Instruction,
        mask: ActiveMask,
    ) -> TraceRecord {
        let writes = instr
            .rd()
            .map(|rd| {
                mask.iter_active()
                    .map(|lane| LaneWrite {
                        lane,
                        register: usize::from(rd),
                        value: self.state.registers.read(lane, rd),
                    })
                    .collect()
            })
            .unwrap_or_default();
        TraceRecord {
            core_id: self.core_id,
            warp_id: self.id,
            step: self.stats.steps,
            pc,
            instruction: instr.to_string(),
            active_mask: mask,
            writes,
        }
    }

    /// Enter the interrupt handler with `cause`.
    ///
    /// Interrupts do not nest: while a handler runs the call has no effect and returns `false`.
    pub fn interrupt(&mut self, cause: u64) -> bool {
        if !self.state.interrupt_enabled {
            return false;
        }
        self.shadow = Shadow {
            pc: self.state.pc,
            active_threads: self.state.active_threads(),
            mask: self.state.mask,
            registers: self.state.registers.row(0).to_vec(),
            interrupt_enabled: self.state.interrupt_enabled,
            supervisor: self.state.supervisor,
        };

        self.state.mask.fill(true);
        self.state.interrupt_enabled = false;
        self.state.supervisor = true;
        self.state.registers.set(0, 0, cause);
        self.state.pc = self.arch.interrupt_entry;
        log::debug!(
            "core {} warp {} interrupt {:#x} at pc {:#x}",
            self.core_id,
            self.id,
            cause,
            self.shadow.pc
        );
        true
    }

    /// Leave the interrupt handler, restoring the state saved by [`Warp::interrupt`].
    ///
    /// Returns `false` if the warp is not inside a handler.
    #[must_use]
    pub fn mode_return(&mut self) -> bool {
        if self.state.interrupt_enabled {
            return false;
        }
        let Shadow {
            pc,
            mask,
            ref registers,
            supervisor,
            ..
        } = self.shadow;
        self.state.pc = pc;
        self.state.mask = mask;
        self.state.registers.set_row(0, registers);
        self.state.supervisor = supervisor;
        self.state.interrupt_enabled = true;
        log::debug!(
            "core {} warp {} returned from interrupt to pc {:#x}",
            self.core_id,
            self.id,
            pc
        );
        true
    }

    pub fn print_stats(&self) {
        println!(
            "{}",
            style(format!("core {} warp {}", self.core_id, self.id)).bold()
        );
        println!("{}", self.stats);
    }
}
