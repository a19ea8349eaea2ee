use crate::ActiveMask;
use serde::{Deserialize, Serialize};

/// Value written to a destination register by one lane.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneWrite {
    pub lane: usize,
    pub register: usize,
    pub value: u64,
}

/// One executed warp instruction.
///
/// Records are purely observational: they are emitted after an instruction has been
/// applied to the warp and are never read back by the simulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub core_id: usize,
    pub warp_id: usize,
    /// Number of steps the warp had taken, including this one.
    pub step: u64,
    pub pc: u64,
    /// Disassembled instruction.
    pub instruction: String,
    /// Lanes that executed the instruction.
    pub active_mask: ActiveMask,
    pub writes: Vec<LaneWrite>,
}

impl std::fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "core {} warp {} step {:>6} pc={:#010x} [{}] {}",
            self.core_id, self.warp_id, self.step, self.pc, self.active_mask, self.instruction
        )?;
        for write in &self.writes {
            write!(
                f,
                " t{}:x{}={:#x}",
                write.lane, write.register, write.value
            )?;
        }
        Ok(())
    }
}
