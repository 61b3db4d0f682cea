use util::bits::BitOps;

use crate::{
    alu::{self, multiply, BinaryOp},
    cpu::Cpu,
    memory::{AccessType, Memory},
    CpsrFlag, CpuException, CpuMode, Cycles,
};

/// Branch
///
/// `B{cond} <offset>`
pub fn arm_b(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    let offset = instr.bits(0, 23).sign_extend(24).wrapping_shl(2);
    let dest = cpu.registers.read(15).wrapping_add(offset);
    cpu.branch_arm(dest, memory)
}

/// Branch and Link
///
/// `BL{cond} <offset>`
pub fn arm_bl(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    let offset = instr.bits(0, 23).sign_extend(24).wrapping_shl(2);
    let pc = cpu.registers.read(15);
    cpu.registers.write(14, pc.wrapping_sub(4));
    cpu.branch_arm(pc.wrapping_add(offset), memory)
}

/// Branch and Exchange
///
/// `BX{cond} Rn` -- bit 0 of Rn selects the instruction set at the target.
pub fn arm_bx(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    let dest = cpu.registers.read(instr.bits(0, 3));

    if dest.bit(0) {
        cpu.registers.set_flag(CpsrFlag::T);
        cpu.branch_thumb(dest, memory)
    } else {
        cpu.branch_arm(dest, memory)
    }
}

/// Data Processing
///
/// `<opcode>{cond}{S} Rd,Rn,<Op2>` and the MOV/MVN and TST/TEQ/CMP/CMN forms.
pub fn arm_dataproc(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    match instr.bits(21, 24) {
        0x0 => dataproc::<alu::AndOp>(instr, cpu, memory),
        0x1 => dataproc::<alu::EorOp>(instr, cpu, memory),
        0x2 => dataproc::<alu::SubOp>(instr, cpu, memory),
        0x3 => dataproc::<alu::RsbOp>(instr, cpu, memory),
        0x4 => dataproc::<alu::AddOp>(instr, cpu, memory),
        0x5 => dataproc::<alu::AdcOp>(instr, cpu, memory),
        0x6 => dataproc::<alu::SbcOp>(instr, cpu, memory),
        0x7 => dataproc::<alu::RscOp>(instr, cpu, memory),
        0x8 => dataproc::<alu::TstOp>(instr, cpu, memory),
        0x9 => dataproc::<alu::TeqOp>(instr, cpu, memory),
        0xA => dataproc::<alu::CmpOp>(instr, cpu, memory),
        0xB => dataproc::<alu::CmnOp>(instr, cpu, memory),
        0xC => dataproc::<alu::OrrOp>(instr, cpu, memory),
        0xD => dataproc::<alu::MovOp>(instr, cpu, memory),
        0xE => dataproc::<alu::BicOp>(instr, cpu, memory),
        _ => dataproc::<alu::MvnOp>(instr, cpu, memory),
    }
}

fn dataproc<O: BinaryOp>(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    let set_flags = instr.bit(20);
    let rd = instr.bits(12, 15);
    let rn = instr.bits(16, 19);
    let imm_form = instr.bit(25);

    let mut lhs = cpu.registers.read(rn);

    // With a register-specified shift amount, R15 as an operand reads as
    // PC+12 instead of PC+8: the extra internal cycle lands between the
    // fetch and the register read.
    if rn == 15 && !imm_form && instr.bit(4) {
        lhs = lhs.wrapping_add(4);
    }

    let (rhs, mut cycles) = if imm_form {
        (
            alu::immediate_operand(instr, set_flags, &mut cpu.registers),
            Cycles::zero(),
        )
    } else {
        alu::shifted_register_operand(instr, set_flags, &mut cpu.registers)
    };

    let result = O::execute(&cpu.registers, lhs, rhs);

    if set_flags && rd == 15 {
        // S with Rd = R15 is the exception return idiom: CPSR = SPSR, then
        // jump. For example MOVS PC,R14 (PC = R14_svc, CPSR = SPSR_svc).
        cpu.registers.write_cpsr(cpu.registers.read_spsr());
        if O::HAS_RESULT {
            cycles += cpu.branch(result, memory);
        }
    } else {
        if set_flags {
            O::set_flags(&mut cpu.registers, lhs, rhs, result);
        }
        if O::HAS_RESULT {
            if rd == 15 {
                cycles += cpu.branch(result, memory);
            } else {
                cpu.registers.write(rd, result);
            }
        }
    }

    cycles
}

/// Move status word to register
///
/// `MRS{cond} Rd,<psr>`
pub fn arm_mrs(instr: u32, cpu: &mut Cpu, _memory: &mut dyn Memory) -> Cycles {
    let value = if instr.bit(22) {
        cpu.registers.read_spsr()
    } else {
        cpu.registers.read_cpsr()
    };
    cpu.registers.write(instr.bits(12, 15), value);
    Cycles::zero()
}

/// Move register or immediate to status word
///
/// `MSR{cond} <psr>{_fields},Rm` / `MSR{cond} <psr>_f,<#expression>`
///
/// The field mask in bits 16-19 selects which bytes of the PSR are written
/// (c, x, s, f from low to high). Unprivileged code cannot touch the control
/// byte, and writing an SPSR from a mode without one does nothing.
pub fn arm_msr(instr: u32, cpu: &mut Cpu, _memory: &mut dyn Memory) -> Cycles {
    let value = if instr.bit(25) {
        alu::immediate_operand(instr, false, &mut cpu.registers)
    } else {
        cpu.registers.read(instr.bits(0, 3))
    };

    let mut mask = 0u32;
    for field in 0..4 {
        if instr.bit(16 + field) {
            mask |= 0xFF << (field * 8);
        }
    }

    let mode = cpu.registers.read_mode();
    if !mode.is_privileged() {
        mask &= 0xF000_0000;
    }

    if instr.bit(22) {
        if mode.has_spsr() {
            let spsr = cpu.registers.read_spsr();
            cpu.registers.write_spsr((spsr & !mask) | (value & mask));
        }
    } else {
        let cpsr = cpu.registers.read_cpsr();
        cpu.registers.write_cpsr((cpsr & !mask) | (value & mask));
    }

    Cycles::zero()
}

/// Multiply and Multiply-Accumulate
///
/// `MUL{cond}{S} Rd,Rm,Rs` / `MLA{cond}{S} Rd,Rm,Rs,Rn`
pub fn arm_multiply(instr: u32, cpu: &mut Cpu, _memory: &mut dyn Memory) -> Cycles {
    let rd = instr.bits(16, 19);
    let rn = instr.bits(12, 15);
    let rs = instr.bits(8, 11);
    let rm = instr.bits(0, 3);
    let accumulate = instr.bit(21);

    let multiplier = cpu.registers.read(rs);
    let mut result = cpu
        .registers
        .read(rm)
        .wrapping_mul(multiplier);

    let mut cycles = multiply::internal_multiply_cycles(multiplier);
    if accumulate {
        result = result.wrapping_add(cpu.registers.read(rn));
        cycles += Cycles::one();
    }

    cpu.registers.write(rd, result);

    if instr.bit(20) {
        multiply::set_multiply_flags(result, &mut cpu.registers);
    }

    cycles
}

/// Multiply Long
///
/// `UMULL/UMLAL/SMULL/SMLAL{cond}{S} RdLo,RdHi,Rm,Rs`
pub fn arm_multiply_long(instr: u32, cpu: &mut Cpu, _memory: &mut dyn Memory) -> Cycles {
    let rd_hi = instr.bits(16, 19);
    let rd_lo = instr.bits(12, 15);
    let rs = instr.bits(8, 11);
    let rm = instr.bits(0, 3);
    let signed = instr.bit(22);
    let accumulate = instr.bit(21);

    let multiplier = cpu.registers.read(rs);
    let multiplicand = cpu.registers.read(rm);

    let mut result = if signed {
        (multiplicand as i32 as i64).wrapping_mul(multiplier as i32 as i64) as u64
    } else {
        u64::from(multiplicand).wrapping_mul(u64::from(multiplier))
    };

    // Long multiplies take one more cycle than the short forms; signed
    // variants can terminate early on sign-extension byte groups.
    let mut cycles = Cycles::one()
        + if signed {
            multiply::internal_multiply_cycles(multiplier)
        } else {
            multiply::internal_multiply_long_cycles(multiplier)
        };

    if accumulate {
        let acc = (u64::from(cpu.registers.read(rd_hi)) << 32) | u64::from(cpu.registers.read(rd_lo));
        result = result.wrapping_add(acc);
        cycles += Cycles::one();
    }

    cpu.registers.write(rd_lo, result as u32);
    cpu.registers.write(rd_hi, (result >> 32) as u32);

    if instr.bit(20) {
        multiply::set_multiply_long_flags(result, &mut cpu.registers);
    }

    cycles
}

/// Single Data Transfer
///
/// `<LDR|STR>{cond}{B}{T} Rd,<Address>`
pub fn arm_single_data_transfer(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    let shifted_register_offset = instr.bit(25);
    let pre_index = instr.bit(24);
    let up = instr.bit(23);
    let byte = instr.bit(22);
    let writeback_bit = instr.bit(21);
    let load = instr.bit(20);
    let rn = instr.bits(16, 19);
    let rd = instr.bits(12, 15);

    let offset = if shifted_register_offset {
        // Register offsets only ever shift by an immediate amount; the
        // shifter carry is not committed.
        let (offset, _) = alu::shifted_register_operand(instr, false, &mut cpu.registers);
        offset
    } else {
        instr.bits(0, 11)
    };

    let base = cpu.registers.read(rn);
    let offset_base = if up {
        base.wrapping_add(offset)
    } else {
        base.wrapping_sub(offset)
    };
    let address = if pre_index { offset_base } else { base };

    // Post-indexed transfers with the W bit force an unprivileged (user
    // mode) access: the LDRT/STRT forms.
    let force_user = !pre_index && writeback_bit;
    let writeback = !pre_index || writeback_bit;

    let mut cycles = Cycles::zero();

    if load {
        if writeback {
            cpu.registers.write(rn, offset_base);
        }

        let value = if byte {
            let (value, wait) = load8_as(cpu, memory, address, force_user);
            cycles += Cycles::one() + wait;
            value as u32
        } else {
            let (value, wait) = load32_as(cpu, memory, address & !0x3, force_user);
            cycles += Cycles::one() + wait;
            // A word load from an unaligned address rotates the addressed
            // byte down into bits 0-7.
            value.rotate_right(8 * (address % 4))
        };

        // The transfer overwrites the writeback value when Rd == Rn.
        cpu.registers.write(rd, value);
        cycles += Cycles::one();

        if rd == 15 || (writeback && rn == 15) {
            let dest = cpu.registers.read(15);
            cycles += cpu.branch(dest, memory);
        }
    } else {
        let mut value = cpu.registers.read(rd);
        // R15 as the store source reads 12 bytes ahead rather than 8.
        if rd == 15 {
            value = value.wrapping_add(4);
        }

        let wait = if byte {
            memory.store8(address, value as u8, AccessType::NonSequential)
        } else {
            memory.store32(address & !0x3, value, AccessType::NonSequential)
        };
        cycles += Cycles::one() + wait;

        if writeback {
            cpu.registers.write(rn, offset_base);
            if rn == 15 {
                let dest = cpu.registers.read(15);
                cycles += cpu.branch(dest, memory);
            }
        }

        cpu.interrupt_prefetch();
    }

    cycles
}

fn load8_as(
    cpu: &mut Cpu,
    memory: &mut dyn Memory,
    address: u32,
    force_user: bool,
) -> (u8, crate::Waitstates) {
    if force_user {
        let old_mode = cpu.registers.write_mode(CpuMode::User);
        let result = memory.load8(address, AccessType::NonSequential);
        cpu.registers.write_mode(old_mode);
        result
    } else {
        memory.load8(address, AccessType::NonSequential)
    }
}

fn load32_as(
    cpu: &mut Cpu,
    memory: &mut dyn Memory,
    address: u32,
    force_user: bool,
) -> (u32, crate::Waitstates) {
    if force_user {
        let old_mode = cpu.registers.write_mode(CpuMode::User);
        let result = memory.load32(address, AccessType::NonSequential);
        cpu.registers.write_mode(old_mode);
        result
    } else {
        memory.load32(address, AccessType::NonSequential)
    }
}

/// Halfword and signed byte transfers
///
/// `LDRH/STRH/LDRSB/LDRSH{cond} Rd,<Address>`
pub fn arm_halfword_transfer(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    let pre_index = instr.bit(24);
    let up = instr.bit(23);
    let imm_offset = instr.bit(22);
    let writeback_bit = instr.bit(21);
    let load = instr.bit(20);
    let rn = instr.bits(16, 19);
    let rd = instr.bits(12, 15);
    let sh = instr.bits(5, 6);

    let offset = if imm_offset {
        (instr.bits(8, 11) << 4) | instr.bits(0, 3)
    } else {
        cpu.registers.read(instr.bits(0, 3))
    };

    let base = cpu.registers.read(rn);
    let offset_base = if up {
        base.wrapping_add(offset)
    } else {
        base.wrapping_sub(offset)
    };
    let address = if pre_index { offset_base } else { base };
    let writeback = !pre_index || writeback_bit;

    let mut cycles = Cycles::zero();

    if load {
        if writeback {
            cpu.registers.write(rn, offset_base);
        }

        let value = match sh {
            // LDRH: an unaligned address rotates the halfword by 8 bits.
            0b01 => {
                let (value, wait) = memory.load16(address, AccessType::NonSequential);
                cycles += Cycles::one() + wait;
                (value as u32).rotate_right(8 * (address & 1))
            }
            // LDRSB
            0b10 => {
                let (value, wait) = memory.load8(address, AccessType::NonSequential);
                cycles += Cycles::one() + wait;
                value as i8 as i32 as u32
            }
            // LDRSH: unaligned addresses degrade to LDRSB.
            _ => {
                if address.bit(0) {
                    let (value, wait) = memory.load8(address, AccessType::NonSequential);
                    cycles += Cycles::one() + wait;
                    value as i8 as i32 as u32
                } else {
                    let (value, wait) = memory.load16(address, AccessType::NonSequential);
                    cycles += Cycles::one() + wait;
                    value as i16 as i32 as u32
                }
            }
        };

        cpu.registers.write(rd, value);
        cycles += Cycles::one();

        if rd == 15 || (writeback && rn == 15) {
            let dest = cpu.registers.read(15);
            cycles += cpu.branch(dest, memory);
        }
    } else {
        let mut value = cpu.registers.read(rd);
        if rd == 15 {
            value = value.wrapping_add(4);
        }

        let wait = memory.store16(address, value as u16, AccessType::NonSequential);
        cycles += Cycles::one() + wait;

        if writeback {
            cpu.registers.write(rn, offset_base);
        }

        cpu.interrupt_prefetch();
    }

    cycles
}

/// Block Data Transfer
///
/// `LDM/STM{cond}<FD|ED|FA|EA|IA|IB|DA|DB> Rn{!},<Rlist>{^}`
pub fn arm_block_transfer(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    let pre_index = instr.bit(24);
    let up = instr.bit(23);
    let s_bit = instr.bit(22);
    let writeback = instr.bit(21);
    let load = instr.bit(20);
    let rn = instr.bits(16, 19);

    // An empty register list transfers R15 only, while the base moves as if
    // all sixteen registers had been transferred.
    let (list, count) = match instr.bits(0, 15) {
        0 => (0x8000u32, 16u32),
        list => (list, list.count_ones()),
    };

    let base = cpu.registers.read(rn);
    let (mut address, writeback_address) = if up {
        (
            if pre_index { base.wrapping_add(4) } else { base },
            base.wrapping_add(4 * count),
        )
    } else {
        (
            base.wrapping_sub(4 * count)
                .wrapping_add(if pre_index { 0 } else { 4 }),
            base.wrapping_sub(4 * count),
        )
    };

    // S without R15 in a load list (or on any store list) transfers the
    // user-mode bank; S on a load with R15 restores CPSR from SPSR instead.
    let user_bank = s_bit && !(load && list.bit(15));

    let mut cycles = Cycles::zero();
    let mut access = AccessType::NonSequential;

    for register in 0..16 {
        if !list.bit(register) {
            continue;
        }

        if load {
            let (value, wait) = memory.load32(address, access);
            cycles += Cycles::one() + wait;
            if user_bank {
                cpu.registers.write_with_mode(CpuMode::User, register, value);
            } else {
                cpu.registers.write(register, value);
            }
        } else {
            let mut value = if user_bank {
                cpu.registers.read_with_mode(CpuMode::User, register)
            } else {
                cpu.registers.read(register)
            };
            // A stored R15 reads 12 bytes ahead of the instruction.
            if register == 15 {
                value = value.wrapping_add(4);
            }
            let wait = memory.store32(address, value, access);
            cycles += Cycles::one() + wait;

            // Base writeback lands after the first store, so a base that is
            // first in the list stores its original value and any later
            // position stores the written-back one.
            if writeback && access == AccessType::NonSequential {
                cpu.registers.write(rn, writeback_address);
            }
        }

        access = AccessType::Sequential;
        address = address.wrapping_add(4);
    }

    if load {
        cycles += Cycles::one();

        // A loaded base wins over writeback.
        if writeback && !list.bit(rn) {
            cpu.registers.write(rn, writeback_address);
        }

        if list.bit(15) {
            if s_bit {
                cpu.registers.write_cpsr(cpu.registers.read_spsr());
            }
            let dest = cpu.registers.read(15);
            cycles += cpu.branch(dest, memory);
        }
    } else {
        cpu.interrupt_prefetch();
    }

    cycles
}

/// Single Data Swap
///
/// `SWP{cond}{B} Rd,Rm,[Rn]`
pub fn arm_swap(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    let byte = instr.bit(22);
    let rn = instr.bits(16, 19);
    let rd = instr.bits(12, 15);
    let rm = instr.bits(0, 3);

    let address = cpu.registers.read(rn);
    let source = cpu.registers.read(rm);

    let mut cycles = Cycles::one();

    let value = if byte {
        let (value, wait) = memory.load8(address, AccessType::NonSequential);
        cycles += Cycles::one() + wait;
        let wait = memory.store8(address, source as u8, AccessType::NonSequential);
        cycles += Cycles::one() + wait;
        value as u32
    } else {
        let (value, wait) = memory.load32(address & !0x3, AccessType::NonSequential);
        cycles += Cycles::one() + wait;
        let wait = memory.store32(address & !0x3, source, AccessType::NonSequential);
        cycles += Cycles::one() + wait;
        value.rotate_right(8 * (address % 4))
    };

    cpu.registers.write(rd, value);
    cpu.interrupt_prefetch();

    cycles
}

/// Software Interrupt
///
/// `SWI{cond} <expression>`
pub fn arm_swi(_instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    cpu.exception_internal(CpuException::Swi, memory)
}

pub fn arm_undefined(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    tracing::debug!(
        opcode = format_args!("0x{instr:08X}"),
        address = format_args!("0x{:08X}", cpu.exception_address()),
        "undefined ARM instruction"
    );
    cpu.exception_internal(CpuException::Undefined, memory)
}
