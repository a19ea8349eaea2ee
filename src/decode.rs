use super::{
    config,
    instruction::{AluOp, BranchOp, CsrOp, CsrSource, Instruction, Width},
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("need 4 bytes at offset {offset}, have {available}")]
    Truncated { offset: usize, available: usize },
    #[error("illegal instruction {word:#010x}")]
    Illegal { word: u32 },
    #[error("instruction {word:#010x} requires the {extension} extension")]
    Unsupported { word: u32, extension: &'static str },
}

/// Turns instruction bytes into an [`Instruction`].
pub trait Decode {
    /// Decode the instruction at `offset` into `bytes`.
    ///
    /// Returns the instruction and the number of bytes it occupies.
    fn decode(&self, bytes: &[u8], offset: usize) -> Result<(Instruction, usize), Error>;
}

#[derive(strum::FromRepr, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
enum Opcode {
    LOAD = 0x03,
    CUSTOM_0 = 0x0b,
    MISC_MEM = 0x0f,
    OP_IMM = 0x13,
    AUIPC = 0x17,
    OP_IMM_32 = 0x1b,
    STORE = 0x23,
    OP = 0x33,
    LUI = 0x37,
    OP_32 = 0x3b,
    BRANCH = 0x63,
    JALR = 0x67,
    JAL = 0x6f,
    SYSTEM = 0x73,
}

const INSTRUCTION_SIZE: usize = 4;

const MRET: u32 = 0x302;

/// Decoder for the base integer ISA, the M extension and the SIMT control instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoder {
    xlen64: bool,
    m: bool,
}

impl Decoder {
    #[must_use]
    pub fn new(arch: &config::Arch) -> Self {
        Self {
            xlen64: arch.is_64bit(),
            m: arch.extensions.m,
        }
    }

    /// Decode one 32-bit instruction word.
    pub fn decode_word(&self, w: u32) -> Result<Instruction, Error> {
        let illegal = Error::Illegal { word: w };
        let rv64 = || -> Result<(), Error> {
            if self.xlen64 {
                Ok(())
            } else {
                Err(Error::Unsupported {
                    word: w,
                    extension: "rv64",
                })
            }
        };

        let opcode = Opcode::from_repr(w & 0x7f).ok_or(illegal.clone())?;
        let rd = ((w >> 7) & 0x1f) as u8;
        let rs1 = ((w >> 15) & 0x1f) as u8;
        let rs2 = ((w >> 20) & 0x1f) as u8;
        let funct3 = (w >> 12) & 0x7;
        let funct7 = w >> 25;

        let instr = match opcode {
            Opcode::LUI => Instruction::Lui { rd, imm: imm_u(w) },
            Opcode::AUIPC => Instruction::Auipc { rd, imm: imm_u(w) },
            Opcode::JAL => Instruction::Jal {
                rd,
                offset: imm_j(w),
            },
            Opcode::JALR if funct3 == 0 => Instruction::Jalr {
                rd,
                rs1,
                offset: imm_i(w),
            },
            Opcode::BRANCH => {
                let op = match funct3 {
                    0 => BranchOp::Eq,
                    1 => BranchOp::Ne,
                    4 => BranchOp::Lt,
                    5 => BranchOp::Ge,
                    6 => BranchOp::Ltu,
                    7 => BranchOp::Geu,
                    _ => return Err(illegal),
                };
                Instruction::Branch {
                    op,
                    rs1,
                    rs2,
                    offset: imm_b(w),
                }
            }
            Opcode::LOAD => {
                let (width, signed) = match funct3 {
                    0 => (Width::Byte, true),
                    1 => (Width::Half, true),
                    2 => (Width::Word, true),
                    3 => (Width::Double, true),
                    4 => (Width::Byte, false),
                    5 => (Width::Half, false),
                    6 => (Width::Word, false),
                    _ => return Err(illegal),
                };
                if matches!(funct3, 3 | 6) {
                    rv64()?;
                }
                Instruction::Load {
                    width,
                    signed,
                    rd,
                    rs1,
                    offset: imm_i(w),
                }
            }
            Opcode::STORE => {
                let width = match funct3 {
                    0 => Width::Byte,
                    1 => Width::Half,
                    2 => Width::Word,
                    3 => {
                        rv64()?;
                        Width::Double
                    }
                    _ => return Err(illegal),
                };
                Instruction::Store {
                    width,
                    rs1,
                    rs2,
                    offset: imm_s(w),
                }
            }
            Opcode::OP_IMM => {
                let imm = imm_i(w);
                let op = match funct3 {
                    0 => AluOp::Add,
                    1 | 5 => {
                        let (shamt, high) = if self.xlen64 {
                            ((w >> 20) & 0x3f, w >> 26)
                        } else {
                            ((w >> 20) & 0x1f, funct7)
                        };
                        let arith = if self.xlen64 { 0x10 } else { 0x20 };
                        let op = match (funct3, high) {
                            (1, 0) => AluOp::Sll,
                            (5, 0) => AluOp::Srl,
                            (5, h) if h == arith => AluOp::Sra,
                            _ => return Err(illegal),
                        };
                        return Ok(Instruction::OpImm {
                            op,
                            rd,
                            rs1,
                            imm: i64::from(shamt),
                            word: false,
                        });
                    }
                    2 => AluOp::Slt,
                    3 => AluOp::Sltu,
                    4 => AluOp::Xor,
                    6 => AluOp::Or,
                    7 => AluOp::And,
                    _ => return Err(illegal),
                };
                Instruction::OpImm {
                    op,
                    rd,
                    rs1,
                    imm,
                    word: false,
                }
            }
            Opcode::OP_IMM_32 => {
                rv64()?;
                let shamt = i64::from((w >> 20) & 0x1f);
                let (op, imm) = match (funct3, funct7) {
                    (0, _) => (AluOp::Add, imm_i(w)),
                    (1, 0) => (AluOp::Sll, shamt),
                    (5, 0) => (AluOp::Srl, shamt),
                    (5, 0x20) => (AluOp::Sra, shamt),
                    _ => return Err(illegal),
                };
                Instruction::OpImm {
                    op,
                    rd,
                    rs1,
                    imm,
                    word: true,
                }
            }
            Opcode::OP | Opcode::OP_32 => {
                let word = opcode == Opcode::OP_32;
                if word {
                    rv64()?;
                }
                let op = match (funct7, funct3) {
                    (0, 0) => AluOp::Add,
                    (0x20, 0) => AluOp::Sub,
                    (0, 1) => AluOp::Sll,
                    (0, 2) if !word => AluOp::Slt,
                    (0, 3) if !word => AluOp::Sltu,
                    (0, 4) if !word => AluOp::Xor,
                    (0, 5) => AluOp::Srl,
                    (0x20, 5) => AluOp::Sra,
                    (0, 6) if !word => AluOp::Or,
                    (0, 7) if !word => AluOp::And,
                    (1, funct3) => {
                        if !self.m {
                            return Err(Error::Unsupported {
                                word: w,
                                extension: "M",
                            });
                        }
                        match funct3 {
                            0 => AluOp::Mul,
                            1 if !word => AluOp::Mulh,
                            2 if !word => AluOp::Mulhsu,
                            3 if !word => AluOp::Mulhu,
                            4 => AluOp::Div,
                            5 => AluOp::Divu,
                            6 => AluOp::Rem,
                            7 => AluOp::Remu,
                            _ => return Err(illegal),
                        }
                    }
                    _ => return Err(illegal),
                };
                Instruction::Op {
                    op,
                    rd,
                    rs1,
                    rs2,
                    word,
                }
            }
            Opcode::MISC_MEM => Instruction::Fence,
            Opcode::SYSTEM => {
                let csr = (w >> 20) as u16;
                let op = match funct3 & 0b11 {
                    0 if funct3 == 0 => {
                        return match w >> 20 {
                            0 => Ok(Instruction::Ecall),
                            1 => Ok(Instruction::Ebreak),
                            MRET => Ok(Instruction::Mret),
                            _ => Err(illegal),
                        };
                    }
                    1 => CsrOp::Write,
                    2 => CsrOp::Set,
                    3 => CsrOp::Clear,
                    _ => return Err(illegal),
                };
                let src = if funct3 & 0b100 == 0 {
                    CsrSource::Register(rs1)
                } else {
                    CsrSource::Immediate(rs1)
                };
                Instruction::Csr { op, rd, csr, src }
            }
            Opcode::CUSTOM_0 => match funct3 {
                0 => Instruction::Tmc { rs1 },
                1 => Instruction::Wspawn { rs1, rs2 },
                2 => Instruction::Split { rs1 },
                3 => Instruction::Join,
                _ => return Err(illegal),
            },
            Opcode::JALR => return Err(illegal),
        };
        Ok(instr)
    }
}

impl Decode for Decoder {
    fn decode(&self, bytes: &[u8], offset: usize) -> Result<(Instruction, usize), Error> {
        let word = bytes
            .get(offset..)
            .and_then(|rest| rest.get(..INSTRUCTION_SIZE))
            .ok_or(Error::Truncated {
                offset,
                available: bytes.len().saturating_sub(offset),
            })?;
        let word = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
        Ok((self.decode_word(word)?, INSTRUCTION_SIZE))
    }
}

fn imm_i(w: u32) -> i64 {
    i64::from((w as i32) >> 20)
}

fn imm_s(w: u32) -> i64 {
    i64::from((((w as i32) >> 25) << 5) | ((w >> 7) & 0x1f) as i32)
}

fn imm_b(w: u32) -> i64 {
    let imm = (((w as i32) >> 31) << 12)
        | (((w >> 7) & 0x1) << 11) as i32
        | (((w >> 25) & 0x3f) << 5) as i32
        | (((w >> 8) & 0xf) << 1) as i32;
    i64::from(imm)
}

fn imm_u(w: u32) -> i64 {
    i64::from((w & 0xffff_f000) as i32)
}

fn imm_j(w: u32) -> i64 {
    let imm = (((w as i32) >> 31) << 20)
        | (w & 0x000f_f000) as i32
        | (((w >> 20) & 0x1) << 11) as i32
        | (((w >> 21) & 0x3ff) << 1) as i32;
    i64::from(imm)
}
