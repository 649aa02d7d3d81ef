//! LC-3 register file.
//!
//! The machine has 10 registers, each 16 bits wide:
//! - R0-R7: general purpose (R7 doubles as the subroutine link register)
//! - PC: program counter
//! - COND: condition codes, exactly one of N/Z/P

use serde::{Serialize, Serializer, Deserialize};
use serde::ser::SerializeMap;
use std::fmt;

/// Number of register slots.
pub const REGISTER_COUNT: usize = 10;

/// Symbolic register names, in dump order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Register {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    Pc,
    Cond,
}

impl Register {
    /// All registers in dump order.
    pub const ALL: [Register; REGISTER_COUNT] = [
        Register::R0,
        Register::R1,
        Register::R2,
        Register::R3,
        Register::R4,
        Register::R5,
        Register::R6,
        Register::R7,
        Register::Pc,
        Register::Cond,
    ];

    /// General purpose register from a 3-bit instruction field.
    ///
    /// Only the low three bits are used, so every input maps to R0-R7.
    pub const fn gpr(index: u16) -> Self {
        match index & 0x7 {
            0 => Register::R0,
            1 => Register::R1,
            2 => Register::R2,
            3 => Register::R3,
            4 => Register::R4,
            5 => Register::R5,
            6 => Register::R6,
            _ => Register::R7,
        }
    }

    /// Dump name, padded to four characters.
    pub const fn name(self) -> &'static str {
        match self {
            Register::R0 => "R0  ",
            Register::R1 => "R1  ",
            Register::R2 => "R2  ",
            Register::R3 => "R3  ",
            Register::R4 => "R4  ",
            Register::R5 => "R5  ",
            Register::R6 => "R6  ",
            Register::R7 => "R7  ",
            Register::Pc => "PC  ",
            Register::Cond => "COND",
        }
    }
}

/// Condition flags held in COND.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum CondFlag {
    Positive = 1 << 0,
    Zero = 1 << 1,
    Negative = 1 << 2,
}

impl CondFlag {
    /// Classify a word by its two's-complement sign (bit 15).
    pub const fn from_word(value: u16) -> Self {
        if value == 0 {
            CondFlag::Zero
        } else if value >> 15 == 1 {
            CondFlag::Negative
        } else {
            CondFlag::Positive
        }
    }

    /// Decode the raw COND bits. Anything other than a single flag is rejected.
    pub const fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            1 => Some(CondFlag::Positive),
            2 => Some(CondFlag::Zero),
            4 => Some(CondFlag::Negative),
            _ => None,
        }
    }

    pub const fn bits(self) -> u16 {
        self as u16
    }
}

/// The LC-3 register file.
#[derive(Clone, PartialEq, Eq)]
pub struct Registers {
    slots: [u16; REGISTER_COUNT],
}

impl Registers {
    /// Create a register file with every register cleared and COND = Z.
    pub fn new() -> Self {
        let mut regs = Self { slots: [0; REGISTER_COUNT] };
        regs.set_cond(CondFlag::Zero);
        regs
    }

    /// Reset to the power-on state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    #[inline]
    pub fn get(&self, reg: Register) -> u16 {
        self.slots[reg as usize]
    }

    #[inline]
    pub fn set(&mut self, reg: Register, value: u16) {
        self.slots[reg as usize] = value;
    }

    #[inline]
    pub fn pc(&self) -> u16 {
        self.get(Register::Pc)
    }

    #[inline]
    pub fn set_pc(&mut self, value: u16) {
        self.set(Register::Pc, value);
    }

    /// Current condition flag, or `None` if COND was overwritten with a
    /// value that is not a single flag.
    pub fn cond(&self) -> Option<CondFlag> {
        CondFlag::from_bits(self.get(Register::Cond))
    }

    pub fn set_cond(&mut self, flag: CondFlag) {
        self.set(Register::Cond, flag.bits());
    }

    /// Recompute COND from the value just written to `reg`.
    pub fn update_flags(&mut self, reg: Register) {
        let flag = CondFlag::from_word(self.get(reg));
        self.set_cond(flag);
    }

    /// Iterate over `(register, value)` pairs in dump order.
    pub fn iter(&self) -> impl Iterator<Item = (Register, u16)> + '_ {
        Register::ALL.iter().map(move |&r| (r, self.get(r)))
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

/// Register dump: one `NAME: 0xHEX` line per register.
impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (reg, value) in self.iter() {
            writeln!(f, "{}: 0x{:04X}", reg.name(), value)?;
        }
        Ok(())
    }
}

/// Serialized as a `{"R0": 0, ..., "COND": 2}` map in dump order.
impl Serialize for Registers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(REGISTER_COUNT))?;
        for (reg, value) in self.iter() {
            map.serialize_entry(reg.name().trim_end(), &value)?;
        }
        map.end()
    }
}

impl fmt::Debug for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (reg, value) in self.iter() {
            map.entry(&reg, &format_args!("{:#06x}", value));
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_is_cleared() {
        let regs = Registers::new();
        for reg in &Register::ALL[..9] {
            assert_eq!(regs.get(*reg), 0);
        }
        assert_eq!(regs.cond(), Some(CondFlag::Zero));
    }

    #[test]
    fn test_gpr_masks_index() {
        assert_eq!(Register::gpr(0), Register::R0);
        assert_eq!(Register::gpr(7), Register::R7);
        assert_eq!(Register::gpr(0b1010), Register::R2);
    }

    #[test]
    fn test_update_flags() {
        let mut regs = Registers::new();

        regs.set(Register::R3, 42);
        regs.update_flags(Register::R3);
        assert_eq!(regs.cond(), Some(CondFlag::Positive));

        regs.set(Register::R3, 0x8000);
        regs.update_flags(Register::R3);
        assert_eq!(regs.cond(), Some(CondFlag::Negative));

        regs.set(Register::R3, 0);
        regs.update_flags(Register::R3);
        assert_eq!(regs.cond(), Some(CondFlag::Zero));
    }

    #[test]
    fn test_dump_format() {
        let mut regs = Registers::new();
        regs.set(Register::R1, 0x5);
        regs.set_pc(0x3000);

        let dump = regs.to_string();
        let lines: Vec<&str> = dump.lines().collect();

        assert_eq!(lines.len(), REGISTER_COUNT);
        assert_eq!(lines[0], "R0  : 0x0000");
        assert_eq!(lines[1], "R1  : 0x0005");
        assert_eq!(lines[8], "PC  : 0x3000");
        assert_eq!(lines[9], "COND: 0x0002");
    }

    #[test]
    fn test_json_dump() {
        let mut regs = Registers::new();
        regs.set(Register::R7, 0x3001);

        let json: serde_json::Value = serde_json::to_value(&regs).unwrap();

        assert_eq!(json["R7"], 0x3001);
        assert_eq!(json["COND"], 2);
        assert_eq!(json.as_object().unwrap().len(), REGISTER_COUNT);
    }

    proptest! {
        #[test]
        fn prop_flag_matches_sign(value: u16) {
            let mut regs = Registers::new();
            regs.set(Register::R0, value);
            regs.update_flags(Register::R0);

            let expected = match value as i16 {
                0 => CondFlag::Zero,
                v if v < 0 => CondFlag::Negative,
                _ => CondFlag::Positive,
            };
            prop_assert_eq!(regs.cond(), Some(expected));
            prop_assert_eq!(regs.get(Register::Cond).count_ones(), 1);
        }
    }
}
