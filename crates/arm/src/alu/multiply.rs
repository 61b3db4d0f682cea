use util::bits::BitOps;

use crate::{CpsrFlag, Cycles, Registers};

/// Internal cycles for a multiply, determined by how many significant byte
/// groups the multiplier operand has:
///
/// - m = 1 if bits [31:8] of the multiplier are all zero or all one
/// - m = 2 if bits [31:16] of the multiplier are all zero or all one
/// - m = 3 if bits [31:24] of the multiplier are all zero or all one
/// - m = 4 otherwise
#[inline]
pub fn internal_multiply_cycles(multiplier: u32) -> Cycles {
    let significant = multiplier ^ (((multiplier as i32) >> 31) as u32);

    if significant & 0xFFFF_FF00 == 0 {
        Cycles::from(1)
    } else if significant & 0xFFFF_0000 == 0 {
        Cycles::from(2)
    } else if significant & 0xFF00_0000 == 0 {
        Cycles::from(3)
    } else {
        Cycles::from(4)
    }
}

/// Unsigned long multiplies treat all-zero upper byte groups as significant
/// anyway, so only zero prefixes shorten them.
#[inline]
pub fn internal_multiply_long_cycles(multiplier: u32) -> Cycles {
    if multiplier & 0xFFFF_FF00 == 0 {
        Cycles::from(1)
    } else if multiplier & 0xFFFF_0000 == 0 {
        Cycles::from(2)
    } else if multiplier & 0xFF00_0000 == 0 {
        Cycles::from(3)
    } else {
        Cycles::from(4)
    }
}

#[inline]
pub fn set_multiply_flags(result: u32, registers: &mut Registers) {
    registers.put_flag(CpsrFlag::N, result.bit(31));
    registers.put_flag(CpsrFlag::Z, result == 0);
}

#[inline]
pub fn set_multiply_long_flags(result: u64, registers: &mut Registers) {
    registers.put_flag(CpsrFlag::N, result >> 63 != 0);
    registers.put_flag(CpsrFlag::Z, result == 0);
}
