use util::bits::BitOps;

use crate::{CpsrFlag, Registers};

use super::rotate_right_extended;

pub struct AdcOp;
pub struct AddOp;
pub struct AndOp;
pub struct BicOp;
pub struct CmnOp;
pub struct CmpOp;
pub struct EorOp;
pub struct MovOp;
pub struct MvnOp;
pub struct OrrOp;
pub struct RsbOp;
pub struct RscOp;
pub struct SbcOp;
pub struct SubOp;
pub struct TeqOp;
pub struct TstOp;
pub struct MulOp;
pub struct NegOp;

pub struct LslOp;
pub struct LsrOp;
pub struct AsrOp;
pub struct RorOp;
pub struct RrxOp;

/// A two-operand ALU operation together with its flag behavior. The shifter
/// operations also implement this so THUMB register shifts and the ARM
/// operand-2 path share one set of carry rules.
pub trait BinaryOp {
    /// False for the compare/test operations, which only set flags.
    const HAS_RESULT: bool;

    #[must_use]
    fn execute(registers: &Registers, lhs: u32, rhs: u32) -> u32;

    /// The carry the barrel shifter would emit, or `None` when the carry
    /// flag is left untouched (shift by zero, plain logical ops).
    #[inline(always)]
    fn carry_out(_lhs: u32, _rhs: u32) -> Option<bool> {
        None
    }

    fn set_flags(registers: &mut Registers, lhs: u32, rhs: u32, result: u32) {
        if let Some(carry) = Self::carry_out(lhs, rhs) {
            registers.put_flag(CpsrFlag::C, carry);
        }
        registers.put_flag(CpsrFlag::N, result.bit(31));
        registers.put_flag(CpsrFlag::Z, result == 0);
    }

    /// Some immediate shift encodings use #0 to mean #32. Called when the
    /// shift amount comes from an instruction immediate rather than a
    /// register.
    #[inline]
    fn decode_imm_amount(amount: u32) -> u32 {
        amount
    }
}

impl BinaryOp for AddOp {
    const HAS_RESULT: bool = true;

    fn execute(_registers: &Registers, lhs: u32, rhs: u32) -> u32 {
        lhs.wrapping_add(rhs)
    }

    fn set_flags(registers: &mut Registers, lhs: u32, rhs: u32, result: u32) {
        registers.put_flag(CpsrFlag::N, result.bit(31));
        registers.put_flag(CpsrFlag::Z, result == 0);

        let (_, carry) = lhs.overflowing_add(rhs);
        let (_, overflow) = (lhs as i32).overflowing_add(rhs as i32);

        registers.put_flag(CpsrFlag::C, carry);
        registers.put_flag(CpsrFlag::V, overflow);
    }
}

impl BinaryOp for AdcOp {
    const HAS_RESULT: bool = true;

    fn execute(registers: &Registers, lhs: u32, rhs: u32) -> u32 {
        let carry = registers.get_flag(CpsrFlag::C);
        lhs.wrapping_add(rhs).wrapping_add(carry as u32)
    }

    fn set_flags(registers: &mut Registers, lhs: u32, rhs: u32, result: u32) {
        registers.put_flag(CpsrFlag::N, result.bit(31));
        registers.put_flag(CpsrFlag::Z, result == 0);

        // Carry/overflow can come out of either the first addition or the
        // carry-in addition, so both steps contribute.
        let carry_in = registers.get_flag(CpsrFlag::C);

        let (partial, carry_0) = lhs.overflowing_add(rhs);
        let (_, overflow_0) = (lhs as i32).overflowing_add(rhs as i32);

        let (_, carry_1) = partial.overflowing_add(carry_in as u32);
        let (_, overflow_1) = (partial as i32).overflowing_add(carry_in as i32);

        registers.put_flag(CpsrFlag::C, carry_0 | carry_1);
        registers.put_flag(CpsrFlag::V, overflow_0 | overflow_1);
    }
}

impl BinaryOp for SubOp {
    const HAS_RESULT: bool = true;

    fn execute(_registers: &Registers, lhs: u32, rhs: u32) -> u32 {
        lhs.wrapping_sub(rhs)
    }

    fn set_flags(registers: &mut Registers, lhs: u32, rhs: u32, result: u32) {
        registers.put_flag(CpsrFlag::N, result.bit(31));
        registers.put_flag(CpsrFlag::Z, result == 0);

        let (_, overflow) = (lhs as i32).overflowing_sub(rhs as i32);

        // ARM carry after subtraction is NOT-borrow: set when lhs >= rhs.
        registers.put_flag(CpsrFlag::C, lhs >= rhs);
        registers.put_flag(CpsrFlag::V, overflow);
    }
}

impl BinaryOp for SbcOp {
    const HAS_RESULT: bool = true;

    fn execute(registers: &Registers, lhs: u32, rhs: u32) -> u32 {
        let carry = registers.get_flag(CpsrFlag::C);
        lhs.wrapping_sub(rhs).wrapping_sub(!carry as u32)
    }

    fn set_flags(registers: &mut Registers, lhs: u32, rhs: u32, result: u32) {
        registers.put_flag(CpsrFlag::N, result.bit(31));
        registers.put_flag(CpsrFlag::Z, result == 0);

        let carry_in = registers.get_flag(CpsrFlag::C);

        registers.put_flag(
            CpsrFlag::C,
            (lhs as u64) >= (rhs as u64 + !carry_in as u64),
        );
        registers.put_flag(
            CpsrFlag::V,
            ((lhs ^ rhs) & (lhs ^ result)).bit(31),
        );
    }
}

impl BinaryOp for RsbOp {
    const HAS_RESULT: bool = true;

    fn execute(registers: &Registers, lhs: u32, rhs: u32) -> u32 {
        SubOp::execute(registers, rhs, lhs)
    }

    fn set_flags(registers: &mut Registers, lhs: u32, rhs: u32, result: u32) {
        SubOp::set_flags(registers, rhs, lhs, result)
    }
}

impl BinaryOp for RscOp {
    const HAS_RESULT: bool = true;

    fn execute(registers: &Registers, lhs: u32, rhs: u32) -> u32 {
        SbcOp::execute(registers, rhs, lhs)
    }

    fn set_flags(registers: &mut Registers, lhs: u32, rhs: u32, result: u32) {
        SbcOp::set_flags(registers, rhs, lhs, result)
    }
}

impl BinaryOp for AndOp {
    const HAS_RESULT: bool = true;

    fn execute(_registers: &Registers, lhs: u32, rhs: u32) -> u32 {
        lhs & rhs
    }
}

impl BinaryOp for BicOp {
    const HAS_RESULT: bool = true;

    fn execute(_registers: &Registers, lhs: u32, rhs: u32) -> u32 {
        lhs & !rhs
    }
}

impl BinaryOp for EorOp {
    const HAS_RESULT: bool = true;

    fn execute(_registers: &Registers, lhs: u32, rhs: u32) -> u32 {
        lhs ^ rhs
    }
}

impl BinaryOp for OrrOp {
    const HAS_RESULT: bool = true;

    fn execute(_registers: &Registers, lhs: u32, rhs: u32) -> u32 {
        lhs | rhs
    }
}

impl BinaryOp for MovOp {
    const HAS_RESULT: bool = true;

    fn execute(_registers: &Registers, _lhs: u32, rhs: u32) -> u32 {
        rhs
    }
}

impl BinaryOp for MvnOp {
    const HAS_RESULT: bool = true;

    fn execute(_registers: &Registers, _lhs: u32, rhs: u32) -> u32 {
        !rhs
    }
}

impl BinaryOp for CmnOp {
    const HAS_RESULT: bool = false;

    fn execute(registers: &Registers, lhs: u32, rhs: u32) -> u32 {
        AddOp::execute(registers, lhs, rhs)
    }

    fn set_flags(registers: &mut Registers, lhs: u32, rhs: u32, result: u32) {
        AddOp::set_flags(registers, lhs, rhs, result)
    }
}

impl BinaryOp for CmpOp {
    const HAS_RESULT: bool = false;

    fn execute(registers: &Registers, lhs: u32, rhs: u32) -> u32 {
        SubOp::execute(registers, lhs, rhs)
    }

    fn set_flags(registers: &mut Registers, lhs: u32, rhs: u32, result: u32) {
        SubOp::set_flags(registers, lhs, rhs, result)
    }
}

impl BinaryOp for TeqOp {
    const HAS_RESULT: bool = false;

    fn execute(registers: &Registers, lhs: u32, rhs: u32) -> u32 {
        EorOp::execute(registers, lhs, rhs)
    }
}

impl BinaryOp for TstOp {
    const HAS_RESULT: bool = false;

    fn execute(registers: &Registers, lhs: u32, rhs: u32) -> u32 {
        AndOp::execute(registers, lhs, rhs)
    }
}

impl BinaryOp for MulOp {
    const HAS_RESULT: bool = true;

    fn execute(_registers: &Registers, lhs: u32, rhs: u32) -> u32 {
        lhs.wrapping_mul(rhs)
    }
}

impl BinaryOp for NegOp {
    const HAS_RESULT: bool = true;

    fn execute(registers: &Registers, _lhs: u32, rhs: u32) -> u32 {
        SubOp::execute(registers, 0, rhs)
    }

    fn set_flags(registers: &mut Registers, _lhs: u32, rhs: u32, result: u32) {
        SubOp::set_flags(registers, 0, rhs, result)
    }
}

impl BinaryOp for LslOp {
    const HAS_RESULT: bool = true;

    fn execute(_registers: &Registers, lhs: u32, rhs: u32) -> u32 {
        if rhs < 32 {
            lhs << rhs
        } else {
            0
        }
    }

    fn carry_out(lhs: u32, rhs: u32) -> Option<bool> {
        match rhs {
            // LSL #0 passes the operand and the old carry through unchanged.
            0 => None,
            1..=31 => Some(lhs.bit(32 - rhs)),
            // LSL #32: result 0, carry = bit 0. Beyond that everything,
            // including the carry, has been shifted out.
            32 => Some(lhs.bit(0)),
            _ => Some(false),
        }
    }
}

impl BinaryOp for LsrOp {
    const HAS_RESULT: bool = true;

    fn execute(_registers: &Registers, lhs: u32, rhs: u32) -> u32 {
        if rhs < 32 {
            lhs >> rhs
        } else {
            0
        }
    }

    fn carry_out(lhs: u32, rhs: u32) -> Option<bool> {
        match rhs {
            0 => None,
            1..=31 => Some(lhs.bit(rhs - 1)),
            // LSR #32: result 0, carry = bit 31.
            32 => Some(lhs.bit(31)),
            _ => Some(false),
        }
    }

    #[inline]
    fn decode_imm_amount(amount: u32) -> u32 {
        // The LSR #0 encoding means LSR #32.
        if amount == 0 {
            32
        } else {
            amount
        }
    }
}

impl BinaryOp for AsrOp {
    const HAS_RESULT: bool = true;

    fn execute(_registers: &Registers, lhs: u32, rhs: u32) -> u32 {
        // ASR by 32 or more fills the result with the sign bit.
        let amount = rhs.min(31);
        ((lhs as i32) >> amount) as u32
    }

    fn carry_out(lhs: u32, rhs: u32) -> Option<bool> {
        match rhs {
            0 => None,
            1..=31 => Some(lhs.bit(rhs - 1)),
            _ => Some(lhs.bit(31)),
        }
    }

    #[inline]
    fn decode_imm_amount(amount: u32) -> u32 {
        // The ASR #0 encoding means ASR #32.
        if amount == 0 {
            32
        } else {
            amount
        }
    }
}

impl BinaryOp for RorOp {
    const HAS_RESULT: bool = true;

    fn execute(_registers: &Registers, lhs: u32, rhs: u32) -> u32 {
        if rhs == 0 {
            lhs
        } else {
            // ROR by n >= 32 behaves as ROR by n mod 32, with ROR #32
            // returning the operand unchanged.
            lhs.rotate_right(rhs % 32)
        }
    }

    fn carry_out(lhs: u32, rhs: u32) -> Option<bool> {
        if rhs == 0 {
            return None;
        }

        let amount = rhs % 32;
        if amount == 0 {
            // ROR by an exact multiple of 32: carry = bit 31.
            Some(lhs.bit(31))
        } else {
            Some(lhs.bit(amount - 1))
        }
    }
}

impl BinaryOp for RrxOp {
    const HAS_RESULT: bool = true;

    fn execute(registers: &Registers, lhs: u32, _rhs: u32) -> u32 {
        // Read the carry before the flag update pass can clobber it.
        let carry = registers.get_flag(CpsrFlag::C);
        rotate_right_extended(lhs, carry)
    }

    fn carry_out(lhs: u32, _rhs: u32) -> Option<bool> {
        Some(lhs.bit(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CpuMode;

    fn regs() -> Registers {
        Registers::new(CpuMode::System)
    }

    #[test]
    fn lsr_zero_imm_encodes_lsr_32() {
        let registers = regs();
        let amount = LsrOp::decode_imm_amount(0);
        assert_eq!(amount, 32);
        assert_eq!(LsrOp::execute(&registers, 0x8000_0001, amount), 0);
        assert_eq!(LsrOp::carry_out(0x8000_0001, amount), Some(true));
    }

    #[test]
    fn ror_of_multiple_of_32_keeps_value() {
        let registers = regs();
        assert_eq!(RorOp::execute(&registers, 0xA5A5_0000, 32), 0xA5A5_0000);
        assert_eq!(RorOp::carry_out(0xA5A5_0000, 32), Some(true));
        assert_eq!(RorOp::execute(&registers, 0xA5A5_0000, 0), 0xA5A5_0000);
        assert_eq!(RorOp::carry_out(0xA5A5_0000, 0), None);
    }

    #[test]
    fn add_carry_and_overflow() {
        let mut registers = regs();
        let result = AddOp::execute(&registers, 0x8000_0000, 0x8000_0000);
        AddOp::set_flags(&mut registers, 0x8000_0000, 0x8000_0000, result);
        assert_eq!(result, 0);
        assert!(!registers.get_flag(CpsrFlag::N));
        assert!(registers.get_flag(CpsrFlag::Z));
        assert!(registers.get_flag(CpsrFlag::C));
        assert!(registers.get_flag(CpsrFlag::V));
    }

    #[test]
    fn sub_carry_is_not_borrow() {
        let mut registers = regs();
        let result = SubOp::execute(&registers, 5, 3);
        SubOp::set_flags(&mut registers, 5, 3, result);
        assert!(registers.get_flag(CpsrFlag::C));

        let result = SubOp::execute(&registers, 3, 5);
        SubOp::set_flags(&mut registers, 3, 5, result);
        assert!(!registers.get_flag(CpsrFlag::C));
    }

    #[test]
    fn sbc_includes_borrow() {
        let mut registers = regs();
        registers.clear_flag(CpsrFlag::C);
        assert_eq!(SbcOp::execute(&registers, 10, 4), 5);
        registers.set_flag(CpsrFlag::C);
        assert_eq!(SbcOp::execute(&registers, 10, 4), 6);
    }
}
