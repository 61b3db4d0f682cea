mod binary_operations;
pub mod multiply;

pub use binary_operations::*;

use util::bits::BitOps;

use crate::{CpsrFlag, Cycles, Registers};

/// Rotate right through carry by one bit (the ROR #0 encoding).
#[inline]
pub fn rotate_right_extended(value: u32, carry: bool) -> u32 {
    (value >> 1) | ((carry as u32) << 31)
}

#[inline]
fn apply_shift<O: BinaryOp>(lhs: u32, rhs: u32, set_carry: bool, registers: &mut Registers) -> u32 {
    // Execute before touching the flags so RRX sees the carry it rotates in.
    let result = O::execute(registers, lhs, rhs);
    if set_carry {
        if let Some(carry) = O::carry_out(lhs, rhs) {
            registers.put_flag(CpsrFlag::C, carry);
        }
    }
    result
}

/// The rotated-immediate form of a data processing second operand.
/// A nonzero rotation updates the carry flag when `set_flags` is true.
pub fn immediate_operand(instr: u32, set_flags: bool, registers: &mut Registers) -> u32 {
    let imm = instr.bits(0, 7);
    let rot = instr.bits(8, 11) * 2;
    let value = imm.rotate_right(rot);

    if set_flags && rot != 0 {
        registers.put_flag(CpsrFlag::C, value.bit(31));
    }

    value
}

/// The shifted-register form of a data processing second operand, including
/// the immediate encodings of LSR #32, ASR #32 and RRX. Returns the operand
/// and the internal cycle charged for a register-specified shift amount.
pub fn shifted_register_operand(
    instr: u32,
    set_flags: bool,
    registers: &mut Registers,
) -> (u32, Cycles) {
    let rm = instr.bits(0, 3);
    let shift_type = instr.bits(5, 6);

    if instr.bit(4) {
        // Register-specified amount: only the low byte of Rs is used, R15
        // reads as PC+12, and the extra register read costs one cycle.
        let rs = instr.bits(8, 11);
        let amount = registers.read(rs) & 0xFF;
        let mut value = registers.read(rm);
        if rm == 15 {
            value = value.wrapping_add(4);
        }

        let result = match shift_type {
            0b00 => apply_shift::<LslOp>(value, amount, set_flags, registers),
            0b01 => apply_shift::<LsrOp>(value, amount, set_flags, registers),
            0b10 => apply_shift::<AsrOp>(value, amount, set_flags, registers),
            _ => apply_shift::<RorOp>(value, amount, set_flags, registers),
        };

        (result, Cycles::one())
    } else {
        let amount = instr.bits(7, 11);
        let value = registers.read(rm);

        let result = match shift_type {
            0b00 => apply_shift::<LslOp>(value, amount, set_flags, registers),
            0b01 => apply_shift::<LsrOp>(value, LsrOp::decode_imm_amount(amount), set_flags, registers),
            0b10 => apply_shift::<AsrOp>(value, AsrOp::decode_imm_amount(amount), set_flags, registers),
            _ if amount == 0 => apply_shift::<RrxOp>(value, amount, set_flags, registers),
            _ => apply_shift::<RorOp>(value, amount, set_flags, registers),
        };

        (result, Cycles::zero())
    }
}
