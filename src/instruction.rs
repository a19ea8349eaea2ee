use super::{
    address, csr, memory,
    warp::{Reconvergence, Spawn, Warp},
};
use trace_model::ActiveMask;

/// Index of a general purpose register.
pub type Register = u8;

/// Trap cause of a breakpoint.
pub const CAUSE_BREAKPOINT: u64 = 3;
/// Trap cause of an environment call from user mode.
pub const CAUSE_USER_ECALL: u64 = 8;
/// Trap cause of an environment call from supervisor mode.
pub const CAUSE_SUPERVISOR_ECALL: u64 = 11;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Memory(#[from] memory::Error),
    #[error("{0} requires supervisor mode")]
    Privileged(&'static str),
    #[error("mode return outside of an interrupt handler")]
    NotInHandler,
    #[error("write to read-only csr {csr:#05x}")]
    ReadOnlyCsr { csr: u16 },
    #[error("join with empty reconvergence stack")]
    EmptyReconvergenceStack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum AluOp {
    Add,
    Sub,
    Sll,
    Slt,
    Sltu,
    Xor,
    Srl,
    Sra,
    Or,
    And,
    Mul,
    Mulh,
    Mulhsu,
    Mulhu,
    Div,
    Divu,
    Rem,
    Remu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum BranchOp {
    Eq,
    Ne,
    Lt,
    Ge,
    Ltu,
    Geu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    Byte,
    Half,
    Word,
    Double,
}

impl Width {
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Half => 2,
            Self::Word => 4,
            Self::Double => 8,
        }
    }

    fn suffix(self) -> char {
        match self {
            Self::Byte => 'b',
            Self::Half => 'h',
            Self::Word => 'w',
            Self::Double => 'd',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CsrOp {
    Write,
    Set,
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CsrSource {
    Register(Register),
    Immediate(u8),
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    Lui {
        rd: Register,
        imm: i64,
    },
    Auipc {
        rd: Register,
        imm: i64,
    },
    Jal {
        rd: Register,
        offset: i64,
    },
    Jalr {
        rd: Register,
        rs1: Register,
        offset: i64,
    },
    Branch {
        op: BranchOp,
        rs1: Register,
        rs2: Register,
        offset: i64,
    },
    Load {
        width: Width,
        signed: bool,
        rd: Register,
        rs1: Register,
        offset: i64,
    },
    Store {
        width: Width,
        rs1: Register,
        rs2: Register,
        offset: i64,
    },
    /// Register-immediate operation. `word` selects the 32-bit forms of rv64.
    OpImm {
        op: AluOp,
        rd: Register,
        rs1: Register,
        imm: i64,
        word: bool,
    },
    /// Register-register operation. `word` selects the 32-bit forms of rv64.
    Op {
        op: AluOp,
        rd: Register,
        rs1: Register,
        rs2: Register,
        word: bool,
    },
    Fence,
    Ecall,
    Ebreak,
    /// Return from an interrupt handler.
    Mret,
    Csr {
        op: CsrOp,
        rd: Register,
        csr: u16,
        src: CsrSource,
    },
    /// Thread mask control: activate the first `rs1` lanes.
    Tmc {
        rs1: Register,
    },
    /// Spawn warps `1..rs1` of the core at pc `rs2`.
    Wspawn {
        rs1: Register,
        rs2: Register,
    },
    /// Diverge on the predicate `rs1 != 0`.
    Split {
        rs1: Register,
    },
    /// Reconverge the innermost split.
    Join,
}

#[inline]
#[must_use]
pub fn sign_extend(value: u64, bits: u32) -> i64 {
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

#[inline]
fn low_bits(value: u64, bits: u32) -> u64 {
    if bits >= 64 {
        value
    } else {
        value & ((1u64 << bits) - 1)
    }
}

/// Integer operation on `bits` wide operands.
///
/// The result is not truncated; register writes truncate to the word size.
#[must_use]
pub fn alu(op: AluOp, a: u64, b: u64, bits: u32) -> u64 {
    let (sa, sb) = (sign_extend(a, bits), sign_extend(b, bits));
    let (ua, ub) = (low_bits(a, bits), low_bits(b, bits));
    let shamt = (b & u64::from(bits - 1)) as u32;
    match op {
        AluOp::Add => a.wrapping_add(b),
        AluOp::Sub => a.wrapping_sub(b),
        AluOp::Sll => a << shamt,
        AluOp::Slt => u64::from(sa < sb),
        AluOp::Sltu => u64::from(ua < ub),
        AluOp::Xor => a ^ b,
        AluOp::Srl => ua >> shamt,
        AluOp::Sra => (sa >> shamt) as u64,
        AluOp::Or => a | b,
        AluOp::And => a & b,
        AluOp::Mul => a.wrapping_mul(b),
        AluOp::Mulh => ((i128::from(sa) * i128::from(sb)) >> bits) as u64,
        AluOp::Mulhsu => ((i128::from(sa) * i128::from(ub)) >> bits) as u64,
        AluOp::Mulhu => ((u128::from(ua) * u128::from(ub)) >> bits) as u64,
        AluOp::Div if sb == 0 => u64::MAX,
        AluOp::Div => sa.wrapping_div(sb) as u64,
        AluOp::Divu if ub == 0 => u64::MAX,
        AluOp::Divu => ua / ub,
        AluOp::Rem if sb == 0 => a,
        AluOp::Rem => sa.wrapping_rem(sb) as u64,
        AluOp::Remu if ub == 0 => a,
        AluOp::Remu => ua % ub,
    }
}

impl BranchOp {
    #[must_use]
    pub fn taken(self, a: u64, b: u64, bits: u32) -> bool {
        match self {
            Self::Eq => a == b,
            Self::Ne => a != b,
            Self::Lt => sign_extend(a, bits) < sign_extend(b, bits),
            Self::Ge => sign_extend(a, bits) >= sign_extend(b, bits),
            Self::Ltu => a < b,
            Self::Geu => a >= b,
        }
    }
}

/// Resolve a warp-wide value computed per lane.
///
/// The lowest active lane decides; lanes that disagree are reported once.
fn uniform<T, F>(mask: &ActiveMask, pc: address, what: &str, mut f: F) -> Option<T>
where
    T: PartialEq + std::fmt::Debug,
    F: FnMut(usize) -> T,
{
    let mut lanes = mask.iter_active();
    let leader = lanes.next()?;
    let value = f(leader);
    if let Some(lane) = lanes.find(|&lane| f(lane) != value) {
        log::warn!(
            "divergent {what} at pc {pc:#x}: lane {leader} resolved {value:?}, lane {lane} differs"
        );
    }
    Some(value)
}

impl Instruction {
    /// Destination register, if the instruction writes one.
    #[must_use]
    pub fn rd(&self) -> Option<Register> {
        match *self {
            Self::Lui { rd, .. }
            | Self::Auipc { rd, .. }
            | Self::Jal { rd, .. }
            | Self::Jalr { rd, .. }
            | Self::Load { rd, .. }
            | Self::OpImm { rd, .. }
            | Self::Op { rd, .. }
            | Self::Csr { rd, .. } => Some(rd).filter(|rd| *rd != 0),
            _ => None,
        }
    }

    /// Apply the instruction to `warp`.
    ///
    /// `pc` is the address the instruction was fetched from. The warp's program counter
    /// already points to the next instruction; control transfers overwrite it.
    /// Returns a spawn request when the instruction activates other warps of the core.
    pub fn apply(
        &self,
        pc: address,
        warp: &mut Warp,
        memory: &mut dyn memory::Port,
    ) -> Result<Option<Spawn>, Error> {
        let bits = warp.arch().word_bits();
        let word_mask = warp.arch().word_mask();
        let num_threads = warp.arch().num_threads;
        let mask = warp.state().mask;
        let supervisor = warp.state().supervisor;
        let next_pc = warp.state().pc;
        let mut spawn = None;

        match *self {
            Self::Lui { rd, imm } => {
                let registers = &mut warp.state_mut().registers;
                for lane in mask.iter_active() {
                    registers.write(lane, rd, imm as u64);
                }
            }
            Self::Auipc { rd, imm } => {
                let registers = &mut warp.state_mut().registers;
                for lane in mask.iter_active() {
                    registers.write(lane, rd, pc.wrapping_add(imm as u64));
                }
            }
            Self::Jal { rd, offset } => {
                let state = warp.state_mut();
                for lane in mask.iter_active() {
                    state.registers.write(lane, rd, next_pc);
                }
                state.pc = pc.wrapping_add(offset as u64) & word_mask;
            }
            Self::Jalr { rd, rs1, offset } => {
                let state = warp.state_mut();
                let target = uniform(&mask, pc, "jump target", |lane| {
                    state.registers.read(lane, rs1).wrapping_add(offset as u64) & !1 & word_mask
                });
                for lane in mask.iter_active() {
                    state.registers.write(lane, rd, next_pc);
                }
                if let Some(target) = target {
                    state.pc = target;
                }
            }
            Self::Branch {
                op,
                rs1,
                rs2,
                offset,
            } => {
                let state = warp.state_mut();
                let taken = uniform(&mask, pc, "branch", |lane| {
                    let a = state.registers.read(lane, rs1);
                    let b = state.registers.read(lane, rs2);
                    op.taken(a, b, bits)
                });
                if taken == Some(true) {
                    state.pc = pc.wrapping_add(offset as u64) & word_mask;
                }
            }
            Self::Load {
                width,
                signed,
                rd,
                rs1,
                offset,
            } => {
                let size = width.size();
                let registers = &mut warp.state_mut().registers;
                for lane in mask.iter_active() {
                    let addr = registers.read(lane, rs1).wrapping_add(offset as u64) & word_mask;
                    let mut value = memory.load_value(addr, size, supervisor)?;
                    if signed {
                        value = sign_extend(value, (size * 8) as u32) as u64;
                    }
                    registers.write(lane, rd, value);
                }
                warp.stats_mut().loads += 1;
            }
            Self::Store {
                width,
                rs1,
                rs2,
                offset,
            } => {
                let size = width.size();
                let registers = &warp.state().registers;
                for lane in mask.iter_active() {
                    let addr = registers.read(lane, rs1).wrapping_add(offset as u64) & word_mask;
                    memory.store_value(addr, size, registers.read(lane, rs2), supervisor)?;
                }
                warp.stats_mut().stores += 1;
            }
            Self::OpImm {
                op,
                rd,
                rs1,
                imm,
                word,
            } => {
                let registers = &mut warp.state_mut().registers;
                for lane in mask.iter_active() {
                    let a = registers.read(lane, rs1);
                    let value = if word {
                        sign_extend(alu(op, a, imm as u64, 32), 32) as u64
                    } else {
                        alu(op, a, imm as u64, bits)
                    };
                    registers.write(lane, rd, value);
                }
            }
            Self::Op {
                op,
                rd,
                rs1,
                rs2,
                word,
            } => {
                let registers = &mut warp.state_mut().registers;
                for lane in mask.iter_active() {
                    let a = registers.read(lane, rs1);
                    let b = registers.read(lane, rs2);
                    let value = if word {
                        sign_extend(alu(op, a, b, 32), 32) as u64
                    } else {
                        alu(op, a, b, bits)
                    };
                    registers.write(lane, rd, value);
                }
            }
            Self::Fence => {}
            Self::Ecall | Self::Ebreak => {
                let cause = match (self, supervisor) {
                    (Self::Ebreak, _) => CAUSE_BREAKPOINT,
                    (_, true) => CAUSE_SUPERVISOR_ECALL,
                    (_, false) => CAUSE_USER_ECALL,
                };
                if !warp.interrupt(cause) {
                    log::debug!(
                        "core {} warp {} dropped trap {cause} at pc {pc:#x}",
                        warp.core_id(),
                        warp.id()
                    );
                }
            }
            Self::Mret => {
                if !supervisor {
                    return Err(Error::Privileged("mret"));
                }
                if !warp.mode_return() {
                    return Err(Error::NotInHandler);
                }
            }
            Self::Csr { op, rd, csr, src } => {
                let writes = match (op, src) {
                    (CsrOp::Write, _) => true,
                    (_, CsrSource::Register(rs1)) => rs1 != 0,
                    (_, CsrSource::Immediate(imm)) => imm != 0,
                };
                if writes && csr::is_read_only(csr) {
                    return Err(Error::ReadOnlyCsr { csr });
                }
                for lane in mask.iter_active() {
                    let old = warp.read_csr(lane, csr);
                    if writes {
                        let operand = match src {
                            CsrSource::Register(rs1) => warp.state().registers.read(lane, rs1),
                            CsrSource::Immediate(imm) => u64::from(imm),
                        };
                        let new = match op {
                            CsrOp::Write => operand,
                            CsrOp::Set => old | operand,
                            CsrOp::Clear => old & !operand,
                        };
                        warp.write_csr(csr, new);
                    }
                    warp.state_mut().registers.write(lane, rd, old);
                }
            }
            Self::Tmc { rs1 } => {
                let state = warp.state_mut();
                if let Some(leader) = mask.lowest_active() {
                    let n = state.registers.read(leader, rs1).min(num_threads as u64);
                    state.mask.set_first(n as usize);
                }
            }
            Self::Wspawn { rs1, rs2 } => {
                let registers = &warp.state().registers;
                if let Some(leader) = mask.lowest_active() {
                    spawn = Some(Spawn {
                        count: registers.read(leader, rs1),
                        pc: registers.read(leader, rs2),
                    });
                }
            }
            Self::Split { rs1 } => {
                let registers = &warp.state().registers;
                let mut predicate = ActiveMask::new(mask.len());
                for lane in mask.iter_active() {
                    predicate.set(lane, registers.read(lane, rs1) != 0);
                }
                let taken = mask.intersection(&predicate);
                let not_taken = mask.difference(&predicate);
                warp.push_reconvergence(Reconvergence::Fallthrough { mask });
                if taken.any() && not_taken.any() {
                    warp.push_reconvergence(Reconvergence::Else {
                        mask: not_taken,
                        pc: next_pc,
                    });
                    warp.state_mut().mask = taken;
                }
            }
            Self::Join => {
                let entry = warp
                    .pop_reconvergence()
                    .ok_or(Error::EmptyReconvergenceStack)?;
                let state = warp.state_mut();
                match entry {
                    Reconvergence::Fallthrough { mask } => {
                        state.mask = mask;
                    }
                    Reconvergence::Else { mask, pc } => {
                        state.mask = mask;
                        state.pc = pc;
                    }
                }
            }
        }

        warp.stats_mut().instructions += 1;
        Ok(spawn)
    }
}

fn register_name(reg: Register) -> String {
    format!("x{reg}")
}

fn csr_name(csr: u16) -> String {
    csr::name(csr).map_or_else(|| format!("{csr:#05x}"), str::to_string)
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let r = register_name;
        match *self {
            Self::Lui { rd, imm } => {
                write!(f, "lui {}, {:#x}", r(rd), (imm as u64 >> 12) & 0xFFFFF)
            }
            Self::Auipc { rd, imm } => {
                write!(f, "auipc {}, {:#x}", r(rd), (imm as u64 >> 12) & 0xFFFFF)
            }
            Self::Jal { rd, offset } => write!(f, "jal {}, {offset}", r(rd)),
            Self::Jalr { rd, rs1, offset } => write!(f, "jalr {}, {offset}({})", r(rd), r(rs1)),
            Self::Branch {
                op,
                rs1,
                rs2,
                offset,
            } => {
                let op: &'static str = op.into();
                write!(f, "b{op} {}, {}, {offset}", r(rs1), r(rs2))
            }
            Self::Load {
                width,
                signed,
                rd,
                rs1,
                offset,
            } => {
                let unsigned = if signed { "" } else { "u" };
                write!(
                    f,
                    "l{}{unsigned} {}, {offset}({})",
                    width.suffix(),
                    r(rd),
                    r(rs1)
                )
            }
            Self::Store {
                width,
                rs1,
                rs2,
                offset,
            } => write!(f, "s{} {}, {offset}({})", width.suffix(), r(rs2), r(rs1)),
            Self::OpImm {
                op,
                rd,
                rs1,
                imm,
                word,
            } => {
                let mnemonic = match op {
                    AluOp::Sltu => "sltiu".to_string(),
                    op => format!("{}i", <&'static str>::from(op)),
                };
                let word = if word { "w" } else { "" };
                write!(f, "{mnemonic}{word} {}, {}, {imm}", r(rd), r(rs1))
            }
            Self::Op {
                op,
                rd,
                rs1,
                rs2,
                word,
            } => {
                let op: &'static str = op.into();
                let word = if word { "w" } else { "" };
                write!(f, "{op}{word} {}, {}, {}", r(rd), r(rs1), r(rs2))
            }
            Self::Fence => write!(f, "fence"),
            Self::Ecall => write!(f, "ecall"),
            Self::Ebreak => write!(f, "ebreak"),
            Self::Mret => write!(f, "mret"),
            Self::Csr { op, rd, csr, src } => {
                let op = match op {
                    CsrOp::Write => "csrrw",
                    CsrOp::Set => "csrrs",
                    CsrOp::Clear => "csrrc",
                };
                match src {
                    CsrSource::Register(rs1) => {
                        write!(f, "{op} {}, {}, {}", r(rd), csr_name(csr), r(rs1))
                    }
                    CsrSource::Immediate(imm) => {
                        write!(f, "{op}i {}, {}, {imm}", r(rd), csr_name(csr))
                    }
                }
            }
            Self::Tmc { rs1 } => write!(f, "tmc {}", r(rs1)),
            Self::Wspawn { rs1, rs2 } => write!(f, "wspawn {}, {}", r(rs1), r(rs2)),
            Self::Split { rs1 } => write!(f, "split {}", r(rs1)),
            Self::Join => write!(f, "join"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{alu, sign_extend, AluOp, BranchOp, CsrOp, CsrSource, Instruction, Width};

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0xFFF, 12), -1);
        assert_eq!(sign_extend(0x7FF, 12), 0x7FF);
        assert_eq!(sign_extend(0x8000_0000, 32), -0x8000_0000);
        assert_eq!(sign_extend(u64::MAX, 64), -1);
    }

    #[test]
    fn test_alu_rv32() {
        let m = |v: u64| v & 0xFFFF_FFFF;
        assert_eq!(m(alu(AluOp::Sub, 1, 2, 32)), 0xFFFF_FFFF);
        assert_eq!(alu(AluOp::Slt, 0xFFFF_FFFF, 0, 32), 1);
        assert_eq!(alu(AluOp::Sltu, 0xFFFF_FFFF, 0, 32), 0);
        assert_eq!(m(alu(AluOp::Sra, 0x8000_0000, 4, 32)), 0xF800_0000);
        assert_eq!(alu(AluOp::Srl, 0x8000_0000, 4, 32), 0x0800_0000);
        // shift amounts only use the low five bits
        assert_eq!(m(alu(AluOp::Sll, 1, 33, 32)), 2);
    }

    #[test]
    fn test_alu_multiply_divide() {
        let m = |v: u64| v & 0xFFFF_FFFF;
        assert_eq!(m(alu(AluOp::Mulh, 0xFFFF_FFFF, 0xFFFF_FFFF, 32)), 0);
        assert_eq!(m(alu(AluOp::Mulhu, 0xFFFF_FFFF, 0xFFFF_FFFF, 32)), 0xFFFF_FFFE);
        assert_eq!(m(alu(AluOp::Mulhsu, 0xFFFF_FFFF, 2, 32)), 0xFFFF_FFFF);
        assert_eq!(m(alu(AluOp::Div, 7, 0, 32)), 0xFFFF_FFFF);
        assert_eq!(alu(AluOp::Rem, 7, 0, 32), 7);
        assert_eq!(m(alu(AluOp::Div, 0x8000_0000, 0xFFFF_FFFF, 32)), 0x8000_0000);
        assert_eq!(alu(AluOp::Rem, 0x8000_0000, 0xFFFF_FFFF, 32) & 0xFFFF_FFFF, 0);
        assert_eq!(alu(AluOp::Div, i64::MIN as u64, u64::MAX, 64), i64::MIN as u64);
        assert_eq!(m(alu(AluOp::Div, (-7i64) as u64, 2, 32)), (-3i32) as u32 as u64);
        assert_eq!(alu(AluOp::Divu, 7, 2, 32), 3);
        assert_eq!(alu(AluOp::Remu, 7, 2, 32), 1);
    }

    #[test]
    fn test_branch_conditions() {
        assert!(BranchOp::Lt.taken(0xFFFF_FFFF, 0, 32));
        assert!(!BranchOp::Ltu.taken(0xFFFF_FFFF, 0, 32));
        assert!(BranchOp::Geu.taken(0xFFFF_FFFF, 0, 32));
        assert!(BranchOp::Ge.taken(5, 5, 32));
    }

    #[test]
    fn test_display() {
        let cases = [
            (
                Instruction::OpImm {
                    op: AluOp::Add,
                    rd: 1,
                    rs1: 0,
                    imm: -5,
                    word: false,
                },
                "addi x1, x0, -5",
            ),
            (
                Instruction::OpImm {
                    op: AluOp::Sltu,
                    rd: 2,
                    rs1: 3,
                    imm: 1,
                    word: false,
                },
                "sltiu x2, x3, 1",
            ),
            (
                Instruction::Load {
                    width: Width::Half,
                    signed: false,
                    rd: 5,
                    rs1: 2,
                    offset: 8,
                },
                "lhu x5, 8(x2)",
            ),
            (
                Instruction::Branch {
                    op: BranchOp::Ne,
                    rs1: 1,
                    rs2: 0,
                    offset: -8,
                },
                "bne x1, x0, -8",
            ),
            (
                Instruction::Csr {
                    op: CsrOp::Set,
                    rd: 10,
                    csr: 0xCC0,
                    src: CsrSource::Register(0),
                },
                "csrrs x10, thread_id, x0",
            ),
            (Instruction::Tmc { rs1: 4 }, "tmc x4"),
            (
                Instruction::Lui {
                    rd: 1,
                    imm: -0x8000_0000,
                },
                "lui x1, 0x80000",
            ),
        ];
        for (instr, expected) in cases {
            assert_eq!(instr.to_string(), expected);
        }
    }
}
