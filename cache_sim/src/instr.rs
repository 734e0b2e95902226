use std::fmt::{self, Display};

use num_enum::TryFromPrimitive;
use thiserror::Error;

use crate::{
    bin::{extract, offset16},
    common::Word,
    register::RegId,
};

/// operation field of an instruction word (bits 24..22).
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    Add = 0,
    Nand = 1,
    Lw = 2,
    Sw = 3,
    Beq = 4,
    Jalr = 5,
    Halt = 6,
    Noop = 7,
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid opcode in instruction word `{0:#010x}`")]
    Invalid(u32),
}

/// decoded instruction. offsets are sign-extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    Add { rs1: RegId, rs2: RegId, rd: RegId },
    Nand { rs1: RegId, rs2: RegId, rd: RegId },
    Lw { base: RegId, dst: RegId, offset: i32 },
    Sw { base: RegId, src: RegId, offset: i32 },
    Beq { rs1: RegId, rs2: RegId, offset: i32 },
    Jalr { rs: RegId, rd: RegId },
    Halt,
    Noop,
}

impl Instr {
    /// returns which instr is encoded. register fields a and b sit in bits
    /// 21..19 and 18..16; the R-format destination in bits 2..0.
    pub fn decode_from(word: Word) -> anyhow::Result<Self> {
        use Instr::*;
        let bin = word as u32;
        let opcode = Opcode::try_from(extract(bin, 22..24) as u8)
            .map_err(|_| DecodeError::Invalid(bin))?;
        let ra = RegId::try_from(extract(bin, 19..21))?;
        let rb = RegId::try_from(extract(bin, 16..18))?;
        Ok(match opcode {
            Opcode::Add => Add {
                rs1: ra,
                rs2: rb,
                rd: RegId::try_from(extract(bin, 0..2))?,
            },
            Opcode::Nand => Nand {
                rs1: ra,
                rs2: rb,
                rd: RegId::try_from(extract(bin, 0..2))?,
            },
            Opcode::Lw => Lw {
                base: ra,
                dst: rb,
                offset: offset16(bin),
            },
            Opcode::Sw => Sw {
                base: ra,
                src: rb,
                offset: offset16(bin),
            },
            Opcode::Beq => Beq {
                rs1: ra,
                rs2: rb,
                offset: offset16(bin),
            },
            Opcode::Jalr => Jalr { rs: ra, rd: rb },
            Opcode::Halt => Halt,
            Opcode::Noop => Noop,
        })
    }
}

impl Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Add { rs1, rs2, rd } => write!(f, "add {rs1} {rs2} {rd}"),
            Instr::Nand { rs1, rs2, rd } => write!(f, "nand {rs1} {rs2} {rd}"),
            Instr::Lw { base, dst, offset } => write!(f, "lw {base} {dst} {offset}"),
            Instr::Sw { base, src, offset } => write!(f, "sw {base} {src} {offset}"),
            Instr::Beq { rs1, rs2, offset } => write!(f, "beq {rs1} {rs2} {offset}"),
            Instr::Jalr { rs, rd } => write!(f, "jalr {rs} {rd}"),
            Instr::Halt => write!(f, "halt"),
            Instr::Noop => write!(f, "noop"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(r: u32) -> RegId {
        RegId::try_from(r).unwrap()
    }

    const fn enc_r(op: u32, ra: u32, rb: u32, rd: u32) -> Word {
        ((op << 22) | (ra << 19) | (rb << 16) | rd) as Word
    }

    const fn enc_i(op: u32, ra: u32, rb: u32, offset: i32) -> Word {
        ((op << 22) | (ra << 19) | (rb << 16) | (offset as u32 & 0xffff)) as Word
    }

    #[test]
    fn decodes_r_format() {
        assert_eq!(
            Instr::Add {
                rs1: reg(1),
                rs2: reg(2),
                rd: reg(3)
            },
            Instr::decode_from(enc_r(0, 1, 2, 3)).unwrap()
        );
        assert_eq!(
            Instr::Nand {
                rs1: reg(7),
                rs2: reg(0),
                rd: reg(7)
            },
            Instr::decode_from(enc_r(1, 7, 0, 7)).unwrap()
        );
    }

    #[test]
    fn decodes_negative_offsets() {
        let instr = Instr::decode_from(enc_i(2, 0, 1, -5)).unwrap();
        assert_eq!(
            Instr::Lw {
                base: reg(0),
                dst: reg(1),
                offset: -5
            },
            instr
        );
        let instr = Instr::decode_from(enc_i(4, 1, 1, -2)).unwrap();
        assert_eq!(
            Instr::Beq {
                rs1: reg(1),
                rs2: reg(1),
                offset: -2
            },
            instr
        );
    }

    #[test]
    fn decodes_argless_ops() {
        assert_eq!(Instr::Halt, Instr::decode_from(enc_r(6, 0, 0, 0)).unwrap());
        assert_eq!(Instr::Noop, Instr::decode_from(enc_r(7, 0, 0, 0)).unwrap());
    }

    #[test]
    fn displays_assembly_like_form() {
        assert_eq!("sw r1 r2 -3", Instr::decode_from(enc_i(3, 1, 2, -3)).unwrap().to_string());
        assert_eq!("halt", Instr::Halt.to_string());
    }
}
