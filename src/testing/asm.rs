//! Instruction encoders for building test programs.

use crate::instruction::{AluOp, BranchOp, CsrOp, Register, Width};

const OP_IMM: u32 = 0x13;
const OP_IMM_32: u32 = 0x1b;
const OP: u32 = 0x33;
const OP_32: u32 = 0x3b;
const LOAD: u32 = 0x03;
const STORE: u32 = 0x23;
const BRANCH: u32 = 0x63;
const SYSTEM: u32 = 0x73;
const CUSTOM_0: u32 = 0x0b;

fn reg(r: Register) -> u32 {
    u32::from(r & 0x1f)
}

#[must_use]
pub fn r_type(
    funct7: u32,
    rs2: Register,
    rs1: Register,
    funct3: u32,
    rd: Register,
    opcode: u32,
) -> u32 {
    (funct7 << 25)
        | (reg(rs2) << 20)
        | (reg(rs1) << 15)
        | (funct3 << 12)
        | (reg(rd) << 7)
        | opcode
}

#[must_use]
pub fn i_type(imm: i32, rs1: Register, funct3: u32, rd: Register, opcode: u32) -> u32 {
    (((imm as u32) & 0xfff) << 20) | (reg(rs1) << 15) | (funct3 << 12) | (reg(rd) << 7) | opcode
}

#[must_use]
pub fn s_type(imm: i32, rs2: Register, rs1: Register, funct3: u32, opcode: u32) -> u32 {
    let imm = imm as u32;
    (((imm >> 5) & 0x7f) << 25)
        | (reg(rs2) << 20)
        | (reg(rs1) << 15)
        | (funct3 << 12)
        | ((imm & 0x1f) << 7)
        | opcode
}

#[must_use]
pub fn b_type(offset: i32, rs2: Register, rs1: Register, funct3: u32) -> u32 {
    let imm = offset as u32;
    (((imm >> 12) & 0x1) << 31)
        | (((imm >> 5) & 0x3f) << 25)
        | (reg(rs2) << 20)
        | (reg(rs1) << 15)
        | (funct3 << 12)
        | (((imm >> 1) & 0xf) << 8)
        | (((imm >> 11) & 0x1) << 7)
        | BRANCH
}

#[must_use]
pub fn lui(rd: Register, imm20: u32) -> u32 {
    ((imm20 & 0xfffff) << 12) | (reg(rd) << 7) | 0x37
}

#[must_use]
pub fn auipc(rd: Register, imm20: u32) -> u32 {
    ((imm20 & 0xfffff) << 12) | (reg(rd) << 7) | 0x17
}

#[must_use]
pub fn jal(rd: Register, offset: i32) -> u32 {
    let imm = offset as u32;
    (((imm >> 20) & 0x1) << 31)
        | (((imm >> 1) & 0x3ff) << 21)
        | (((imm >> 11) & 0x1) << 20)
        | (((imm >> 12) & 0xff) << 12)
        | (reg(rd) << 7)
        | 0x6f
}

#[must_use]
pub fn jalr(rd: Register, rs1: Register, offset: i32) -> u32 {
    i_type(offset, rs1, 0, rd, 0x67)
}

#[must_use]
pub fn branch(op: BranchOp, rs1: Register, rs2: Register, offset: i32) -> u32 {
    let funct3 = match op {
        BranchOp::Eq => 0,
        BranchOp::Ne => 1,
        BranchOp::Lt => 4,
        BranchOp::Ge => 5,
        BranchOp::Ltu => 6,
        BranchOp::Geu => 7,
    };
    b_type(offset, rs2, rs1, funct3)
}

#[must_use]
pub fn beq(rs1: Register, rs2: Register, offset: i32) -> u32 {
    branch(BranchOp::Eq, rs1, rs2, offset)
}

#[must_use]
pub fn bne(rs1: Register, rs2: Register, offset: i32) -> u32 {
    branch(BranchOp::Ne, rs1, rs2, offset)
}

#[must_use]
pub fn load(width: Width, signed: bool, rd: Register, rs1: Register, offset: i32) -> u32 {
    let funct3 = match (width, signed) {
        (Width::Byte, true) => 0,
        (Width::Half, true) => 1,
        (Width::Word, true) => 2,
        (Width::Double, _) => 3,
        (Width::Byte, false) => 4,
        (Width::Half, false) => 5,
        (Width::Word, false) => 6,
    };
    i_type(offset, rs1, funct3, rd, LOAD)
}

#[must_use]
pub fn store(width: Width, rs1: Register, rs2: Register, offset: i32) -> u32 {
    let funct3 = match width {
        Width::Byte => 0,
        Width::Half => 1,
        Width::Word => 2,
        Width::Double => 3,
    };
    s_type(offset, rs2, rs1, funct3, STORE)
}

#[must_use]
pub fn addi(rd: Register, rs1: Register, imm: i32) -> u32 {
    i_type(imm, rs1, 0, rd, OP_IMM)
}

#[must_use]
pub fn andi(rd: Register, rs1: Register, imm: i32) -> u32 {
    i_type(imm, rs1, 7, rd, OP_IMM)
}

#[must_use]
pub fn slli(rd: Register, rs1: Register, shamt: u32) -> u32 {
    i_type((shamt & 0x3f) as i32, rs1, 1, rd, OP_IMM)
}

#[must_use]
pub fn srai(rd: Register, rs1: Register, shamt: u32) -> u32 {
    i_type((0x400 | (shamt & 0x3f)) as i32, rs1, 5, rd, OP_IMM)
}

/// `addiw rd, rs1, imm` (rv64)
#[must_use]
pub fn addiw(rd: Register, rs1: Register, imm: i32) -> u32 {
    i_type(imm, rs1, 0, rd, OP_IMM_32)
}

#[must_use]
pub fn op(op: AluOp, rd: Register, rs1: Register, rs2: Register) -> u32 {
    let (funct7, funct3) = funct(op);
    r_type(funct7, rs2, rs1, funct3, rd, OP)
}

/// 32-bit register operation such as `addw` (rv64)
#[must_use]
pub fn op_word(op: AluOp, rd: Register, rs1: Register, rs2: Register) -> u32 {
    let (funct7, funct3) = funct(op);
    r_type(funct7, rs2, rs1, funct3, rd, OP_32)
}

fn funct(op: AluOp) -> (u32, u32) {
    match op {
        AluOp::Add => (0x00, 0),
        AluOp::Sub => (0x20, 0),
        AluOp::Sll => (0x00, 1),
        AluOp::Slt => (0x00, 2),
        AluOp::Sltu => (0x00, 3),
        AluOp::Xor => (0x00, 4),
        AluOp::Srl => (0x00, 5),
        AluOp::Sra => (0x20, 5),
        AluOp::Or => (0x00, 6),
        AluOp::And => (0x00, 7),
        AluOp::Mul => (0x01, 0),
        AluOp::Mulh => (0x01, 1),
        AluOp::Mulhsu => (0x01, 2),
        AluOp::Mulhu => (0x01, 3),
        AluOp::Div => (0x01, 4),
        AluOp::Divu => (0x01, 5),
        AluOp::Rem => (0x01, 6),
        AluOp::Remu => (0x01, 7),
    }
}

#[must_use]
pub fn csr(op: CsrOp, rd: Register, csr: u16, rs1: Register) -> u32 {
    let funct3 = match op {
        CsrOp::Write => 1,
        CsrOp::Set => 2,
        CsrOp::Clear => 3,
    };
    (u32::from(csr & 0xfff) << 20) | (reg(rs1) << 15) | (funct3 << 12) | (reg(rd) << 7) | SYSTEM
}

/// `csrrs rd, csr, x0`
#[must_use]
pub fn csrr(rd: Register, csr: u16) -> u32 {
    self::csr(CsrOp::Set, rd, csr, 0)
}

#[must_use]
pub fn ecall() -> u32 {
    SYSTEM
}

#[must_use]
pub fn ebreak() -> u32 {
    (1 << 20) | SYSTEM
}

#[must_use]
pub fn mret() -> u32 {
    (0x302 << 20) | SYSTEM
}

#[must_use]
pub fn nop() -> u32 {
    addi(0, 0, 0)
}

#[must_use]
pub fn tmc(rs1: Register) -> u32 {
    (reg(rs1) << 15) | CUSTOM_0
}

#[must_use]
pub fn wspawn(rs1: Register, rs2: Register) -> u32 {
    (reg(rs2) << 20) | (reg(rs1) << 15) | (1 << 12) | CUSTOM_0
}

#[must_use]
pub fn split(rs1: Register) -> u32 {
    (reg(rs1) << 15) | (2 << 12) | CUSTOM_0
}

#[must_use]
pub fn join() -> u32 {
    (3 << 12) | CUSTOM_0
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_known_encodings() {
        assert_eq!(super::addi(10, 0, -1), 0xfff0_0513);
        assert_eq!(super::lui(5, 0x80000), 0x8000_02b7);
        assert_eq!(super::store(crate::instruction::Width::Word, 2, 11, -4), 0xfeb1_2e23);
        assert_eq!(super::bne(10, 0, -8), 0xfe05_1ce3);
        assert_eq!(super::jal(1, 2048), 0x0010_00ef);
        assert_eq!(super::csrr(10, 0xcc0), 0xcc00_2573);
        assert_eq!(super::nop(), 0x0000_0013);
        assert_eq!(super::addiw(4, 1, -1), 0xfff0_821b);
        assert_eq!(
            super::op_word(crate::instruction::AluOp::Add, 5, 1, 2),
            0x0020_82bb
        );
    }
}
