//! Instruction decoder for the LC-3.
//!
//! Every instruction is one 16-bit word. Bits 15-12 select the opcode; the
//! remaining twelve bits are register fields, an immediate/mode flag and a
//! sign-extended offset of 5, 6, 9 or 11 bits depending on the format.

use crate::cpu::registers::Register;
use serde::{Serialize, Deserialize};
use std::fmt;
use thiserror::Error;

/// Sign-extend the low `bit_count` bits of `value` to 16 bits.
///
/// Bits above `bit_count` in `value` are expected to be clear.
pub const fn sign_extend(value: u16, bit_count: u32) -> u16 {
    if (value >> (bit_count - 1)) & 1 == 1 {
        value | (0xFFFF << bit_count)
    } else {
        value
    }
}

/// The sixteen opcodes, numbered as they appear in bits 15-12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum Opcode {
    Br = 0,
    Add,
    Ld,
    St,
    Jsr,
    And,
    Ldr,
    Str,
    Rti,
    Not,
    Ldi,
    Sti,
    Jmp,
    Reserved,
    Lea,
    Trap,
}

impl TryFrom<u16> for Opcode {
    type Error = DecodeError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        let op = match value {
            0 => Opcode::Br,
            1 => Opcode::Add,
            2 => Opcode::Ld,
            3 => Opcode::St,
            4 => Opcode::Jsr,
            5 => Opcode::And,
            6 => Opcode::Ldr,
            7 => Opcode::Str,
            8 => Opcode::Rti,
            9 => Opcode::Not,
            10 => Opcode::Ldi,
            11 => Opcode::Sti,
            12 => Opcode::Jmp,
            13 => Opcode::Reserved,
            14 => Opcode::Lea,
            15 => Opcode::Trap,
            other => return Err(DecodeError::BadOpcode(other)),
        };
        Ok(op)
    }
}

/// Second source operand of ADD/AND.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    /// SR2 register mode (bit 5 clear).
    Reg(Register),
    /// imm5, already sign-extended (bit 5 set).
    Imm(u16),
}

/// Target of JSR/JSRR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JsrTarget {
    /// JSR: PC-relative, 11-bit offset already sign-extended.
    Offset(u16),
    /// JSRR: absolute address held in a base register.
    Reg(Register),
}

/// Decoded LC-3 instruction.
///
/// Offsets are stored sign-extended to 16 bits, ready to be added to PC or a
/// base register with wrapping arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    // ==================== Operate ====================

    /// DR := SR1 + SR2/imm5
    Add { dr: Register, sr1: Register, src2: Operand },

    /// DR := SR1 & SR2/imm5
    And { dr: Register, sr1: Register, src2: Operand },

    /// DR := !SR
    Not { dr: Register, sr: Register },

    // ==================== Data Movement ====================

    /// DR := mem[PC + offset9]
    Ld { dr: Register, offset: u16 },

    /// DR := mem[mem[PC + offset9]]
    Ldi { dr: Register, offset: u16 },

    /// DR := mem[BaseR + offset6]
    Ldr { dr: Register, base: Register, offset: u16 },

    /// DR := PC + offset9
    Lea { dr: Register, offset: u16 },

    /// mem[PC + offset9] := SR
    St { sr: Register, offset: u16 },

    /// mem[mem[PC + offset9]] := SR
    Sti { sr: Register, offset: u16 },

    /// mem[BaseR + offset6] := SR
    Str { sr: Register, base: Register, offset: u16 },

    // ==================== Control ====================

    /// Conditional branch; `nzp` is the 3-bit mask in COND bit order.
    Br { nzp: u16, offset: u16 },

    /// PC := BaseR (RET when BaseR is R7)
    Jmp { base: Register },

    /// R7 := PC, then jump
    Jsr { target: JsrTarget },

    /// Software trap through an 8-bit vector
    Trap { vector: u8 },

    /// Return from interrupt (accepted as a no-op)
    Rti,

    /// Reserved opcode (accepted as a no-op)
    Reserved,
}

/// Destination/source register in bits 11-9.
#[inline]
fn reg_11_9(word: u16) -> Register {
    Register::gpr(word >> 9)
}

/// Source/base register in bits 8-6.
#[inline]
fn reg_8_6(word: u16) -> Register {
    Register::gpr(word >> 6)
}

#[inline]
fn offset9(word: u16) -> u16 {
    sign_extend(word & 0x1FF, 9)
}

#[inline]
fn offset6(word: u16) -> u16 {
    sign_extend(word & 0x3F, 6)
}

fn operand(word: u16) -> Operand {
    if (word >> 5) & 1 == 1 {
        Operand::Imm(sign_extend(word & 0x1F, 5))
    } else {
        Operand::Reg(Register::gpr(word))
    }
}

/// Decode a 16-bit instruction word.
pub fn decode(word: u16) -> Result<Instruction, DecodeError> {
    let instruction = match Opcode::try_from(word >> 12)? {
        Opcode::Br => Instruction::Br { nzp: (word >> 9) & 0x7, offset: offset9(word) },
        Opcode::Add => Instruction::Add { dr: reg_11_9(word), sr1: reg_8_6(word), src2: operand(word) },
        Opcode::Ld => Instruction::Ld { dr: reg_11_9(word), offset: offset9(word) },
        Opcode::St => Instruction::St { sr: reg_11_9(word), offset: offset9(word) },
        Opcode::Jsr => {
            let target = if (word >> 11) & 1 == 1 {
                JsrTarget::Offset(sign_extend(word & 0x7FF, 11))
            } else {
                JsrTarget::Reg(reg_8_6(word))
            };
            Instruction::Jsr { target }
        }
        Opcode::And => Instruction::And { dr: reg_11_9(word), sr1: reg_8_6(word), src2: operand(word) },
        Opcode::Ldr => Instruction::Ldr { dr: reg_11_9(word), base: reg_8_6(word), offset: offset6(word) },
        Opcode::Str => Instruction::Str { sr: reg_11_9(word), base: reg_8_6(word), offset: offset6(word) },
        Opcode::Rti => Instruction::Rti,
        Opcode::Not => Instruction::Not { dr: reg_11_9(word), sr: reg_8_6(word) },
        Opcode::Ldi => Instruction::Ldi { dr: reg_11_9(word), offset: offset9(word) },
        Opcode::Sti => Instruction::Sti { sr: reg_11_9(word), offset: offset9(word) },
        Opcode::Jmp => Instruction::Jmp { base: reg_8_6(word) },
        Opcode::Reserved => Instruction::Reserved,
        Opcode::Lea => Instruction::Lea { dr: reg_11_9(word), offset: offset9(word) },
        Opcode::Trap => Instruction::Trap { vector: (word & 0xFF) as u8 },
    };

    Ok(instruction)
}

/// Encode an instruction back into its 16-bit word.
///
/// Offsets are truncated to their field width.
pub fn encode(instr: &Instruction) -> u16 {
    fn op(opcode: Opcode) -> u16 {
        (opcode as u16) << 12
    }
    fn hi(reg: Register) -> u16 {
        (reg as u16 & 0x7) << 9
    }
    fn mid(reg: Register) -> u16 {
        (reg as u16 & 0x7) << 6
    }
    fn src2(operand: Operand) -> u16 {
        match operand {
            Operand::Reg(reg) => reg as u16 & 0x7,
            Operand::Imm(imm) => (1 << 5) | (imm & 0x1F),
        }
    }

    match *instr {
        Instruction::Add { dr, sr1, src2: s } => op(Opcode::Add) | hi(dr) | mid(sr1) | src2(s),
        Instruction::And { dr, sr1, src2: s } => op(Opcode::And) | hi(dr) | mid(sr1) | src2(s),
        Instruction::Not { dr, sr } => op(Opcode::Not) | hi(dr) | mid(sr) | 0x3F,
        Instruction::Ld { dr, offset } => op(Opcode::Ld) | hi(dr) | (offset & 0x1FF),
        Instruction::Ldi { dr, offset } => op(Opcode::Ldi) | hi(dr) | (offset & 0x1FF),
        Instruction::Ldr { dr, base, offset } => op(Opcode::Ldr) | hi(dr) | mid(base) | (offset & 0x3F),
        Instruction::Lea { dr, offset } => op(Opcode::Lea) | hi(dr) | (offset & 0x1FF),
        Instruction::St { sr, offset } => op(Opcode::St) | hi(sr) | (offset & 0x1FF),
        Instruction::Sti { sr, offset } => op(Opcode::Sti) | hi(sr) | (offset & 0x1FF),
        Instruction::Str { sr, base, offset } => op(Opcode::Str) | hi(sr) | mid(base) | (offset & 0x3F),
        Instruction::Br { nzp, offset } => op(Opcode::Br) | ((nzp & 0x7) << 9) | (offset & 0x1FF),
        Instruction::Jmp { base } => op(Opcode::Jmp) | mid(base),
        Instruction::Jsr { target: JsrTarget::Offset(offset) } => op(Opcode::Jsr) | (1 << 11) | (offset & 0x7FF),
        Instruction::Jsr { target: JsrTarget::Reg(base) } => op(Opcode::Jsr) | mid(base),
        Instruction::Trap { vector } => op(Opcode::Trap) | u16::from(vector),
        Instruction::Rti => op(Opcode::Rti),
        Instruction::Reserved => op(Opcode::Reserved),
    }
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Add { .. } => Opcode::Add,
            Instruction::And { .. } => Opcode::And,
            Instruction::Not { .. } => Opcode::Not,
            Instruction::Ld { .. } => Opcode::Ld,
            Instruction::Ldi { .. } => Opcode::Ldi,
            Instruction::Ldr { .. } => Opcode::Ldr,
            Instruction::Lea { .. } => Opcode::Lea,
            Instruction::St { .. } => Opcode::St,
            Instruction::Sti { .. } => Opcode::Sti,
            Instruction::Str { .. } => Opcode::Str,
            Instruction::Br { .. } => Opcode::Br,
            Instruction::Jmp { .. } => Opcode::Jmp,
            Instruction::Jsr { .. } => Opcode::Jsr,
            Instruction::Trap { .. } => Opcode::Trap,
            Instruction::Rti => Opcode::Rti,
            Instruction::Reserved => Opcode::Reserved,
        }
    }
}

/// Short mnemonic form, used in trace logs and the debugger.
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = |reg: Register| reg.name().trim_end().to_string();
        let s = |v: u16| v as i16;
        let src = |o: Operand| match o {
            Operand::Reg(reg) => r(reg),
            Operand::Imm(imm) => format!("#{}", imm as i16),
        };

        match *self {
            Instruction::Add { dr, sr1, src2 } => write!(f, "ADD {}, {}, {}", r(dr), r(sr1), src(src2)),
            Instruction::And { dr, sr1, src2 } => write!(f, "AND {}, {}, {}", r(dr), r(sr1), src(src2)),
            Instruction::Not { dr, sr } => write!(f, "NOT {}, {}", r(dr), r(sr)),
            Instruction::Ld { dr, offset } => write!(f, "LD {}, #{}", r(dr), s(offset)),
            Instruction::Ldi { dr, offset } => write!(f, "LDI {}, #{}", r(dr), s(offset)),
            Instruction::Ldr { dr, base, offset } => write!(f, "LDR {}, {}, #{}", r(dr), r(base), s(offset)),
            Instruction::Lea { dr, offset } => write!(f, "LEA {}, #{}", r(dr), s(offset)),
            Instruction::St { sr, offset } => write!(f, "ST {}, #{}", r(sr), s(offset)),
            Instruction::Sti { sr, offset } => write!(f, "STI {}, #{}", r(sr), s(offset)),
            Instruction::Str { sr, base, offset } => write!(f, "STR {}, {}, #{}", r(sr), r(base), s(offset)),
            Instruction::Br { nzp, offset } => {
                let mut cc = String::new();
                if nzp & 0b100 != 0 { cc.push('n'); }
                if nzp & 0b010 != 0 { cc.push('z'); }
                if nzp & 0b001 != 0 { cc.push('p'); }
                write!(f, "BR{} #{}", cc, s(offset))
            }
            Instruction::Jmp { base: Register::R7 } => write!(f, "RET"),
            Instruction::Jmp { base } => write!(f, "JMP {}", r(base)),
            Instruction::Jsr { target: JsrTarget::Offset(offset) } => write!(f, "JSR #{}", s(offset)),
            Instruction::Jsr { target: JsrTarget::Reg(base) } => write!(f, "JSRR {}", r(base)),
            Instruction::Trap { vector } => write!(f, "TRAP x{:02X}", vector),
            Instruction::Rti => write!(f, "RTI"),
            Instruction::Reserved => write!(f, "RESERVED"),
        }
    }
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("bad opcode: {0:#x}")]
    BadOpcode(u16),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0b00001, 5), 1);
        assert_eq!(sign_extend(0b10001, 5), 0xFFF1);
        assert_eq!(sign_extend(0x1FF, 9), 0xFFFF);
        assert_eq!(sign_extend(0x0FF, 9), 0x00FF);
        assert_eq!(sign_extend(0x400, 11), 0xFC00);
    }

    #[test]
    fn test_decode_add_register_mode() {
        // ADD R0, R1, R2
        let instr = decode(0b0001_000_001_0_00_010).unwrap();
        assert_eq!(instr, Instruction::Add {
            dr: Register::R0,
            sr1: Register::R1,
            src2: Operand::Reg(Register::R2),
        });
    }

    #[test]
    fn test_decode_add_immediate_mode() {
        // ADD R0, R1, #-3
        let instr = decode(0b0001_000_001_1_11101).unwrap();
        assert_eq!(instr, Instruction::Add {
            dr: Register::R0,
            sr1: Register::R1,
            src2: Operand::Imm(0xFFFD),
        });
    }

    #[test]
    fn test_decode_jsr_forms() {
        assert_eq!(
            decode(0x4FFF).unwrap(),
            Instruction::Jsr { target: JsrTarget::Offset(0xFFFF) }
        );
        assert_eq!(
            decode(0x4080).unwrap(),
            Instruction::Jsr { target: JsrTarget::Reg(Register::R2) }
        );
    }

    #[test]
    fn test_decode_trap_and_no_ops() {
        assert_eq!(decode(0xF025).unwrap(), Instruction::Trap { vector: 0x25 });
        assert_eq!(decode(0x8000).unwrap(), Instruction::Rti);
        assert_eq!(decode(0xD123).unwrap(), Instruction::Reserved);
    }

    #[test]
    fn test_every_opcode_decodes() {
        for op in 0..16u16 {
            let instr = decode(op << 12).unwrap();
            assert_eq!(instr.opcode() as u16, op);
        }
    }

    #[test]
    fn test_opcode_outside_table() {
        assert_eq!(Opcode::try_from(16), Err(DecodeError::BadOpcode(16)));
    }

    #[test]
    fn test_encode_matches_reference_words() {
        let halt = Instruction::Trap { vector: 0x25 };
        assert_eq!(encode(&halt), 0xF025);

        let ret = Instruction::Jmp { base: Register::R7 };
        assert_eq!(encode(&ret), 0xC1C0);
        assert_eq!(ret.to_string(), "RET");

        let lea = Instruction::Lea { dr: Register::R0, offset: 0xFFFE };
        assert_eq!(encode(&lea), 0xE1FE);
        assert_eq!(lea.to_string(), "LEA R0, #-2");
    }

    proptest! {
        #[test]
        fn prop_sign_extend_matches_signed_cast(value in 0u16..32) {
            let expected = ((value << 11) as i16 >> 11) as u16;
            prop_assert_eq!(sign_extend(value, 5), expected);
        }

        #[test]
        fn prop_decode_is_total(word: u16) {
            prop_assert!(decode(word).is_ok());
        }
    }
}
