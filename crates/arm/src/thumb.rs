use util::bits::BitOps;

use crate::{
    alu::{self, multiply, BinaryOp},
    cpu::{check_condition, Cpu},
    memory::{AccessType, Memory},
    CpsrFlag, CpuException, Cycles,
};

/// move shifted register
///
/// `LSL/LSR/ASR Rd, Rs, #Offset5`
pub fn thumb_move_shifted(instr: u32, cpu: &mut Cpu, _memory: &mut dyn Memory) -> Cycles {
    let rd = instr.bits(0, 2);
    let rs = instr.bits(3, 5);
    let amount = instr.bits(6, 10);
    let value = cpu.registers.read(rs);

    let result = match instr.bits(11, 12) {
        0b00 => shift_and_flag::<alu::LslOp>(value, amount, cpu),
        0b01 => shift_and_flag::<alu::LsrOp>(value, alu::LsrOp::decode_imm_amount(amount), cpu),
        _ => shift_and_flag::<alu::AsrOp>(value, alu::AsrOp::decode_imm_amount(amount), cpu),
    };

    cpu.registers.write(rd, result);
    Cycles::zero()
}

fn shift_and_flag<O: BinaryOp>(value: u32, amount: u32, cpu: &mut Cpu) -> u32 {
    let result = O::execute(&cpu.registers, value, amount);
    O::set_flags(&mut cpu.registers, value, amount, result);
    result
}

/// add/subtract
///
/// `ADD/SUB Rd, Rs, Rn` / `ADD/SUB Rd, Rs, #Offset3`
pub fn thumb_add_subtract(instr: u32, cpu: &mut Cpu, _memory: &mut dyn Memory) -> Cycles {
    let rd = instr.bits(0, 2);
    let rs = instr.bits(3, 5);
    let lhs = cpu.registers.read(rs);
    let rhs = if instr.bit(10) {
        instr.bits(6, 8)
    } else {
        cpu.registers.read(instr.bits(6, 8))
    };

    let result = if instr.bit(9) {
        let result = alu::SubOp::execute(&cpu.registers, lhs, rhs);
        alu::SubOp::set_flags(&mut cpu.registers, lhs, rhs, result);
        result
    } else {
        let result = alu::AddOp::execute(&cpu.registers, lhs, rhs);
        alu::AddOp::set_flags(&mut cpu.registers, lhs, rhs, result);
        result
    };

    cpu.registers.write(rd, result);
    Cycles::zero()
}

/// move/compare/add/subtract immediate
///
/// `MOV/CMP/ADD/SUB Rd, #Offset8`
pub fn thumb_mov_cmp_add_sub_imm(instr: u32, cpu: &mut Cpu, _memory: &mut dyn Memory) -> Cycles {
    let rd = instr.bits(8, 10);
    let lhs = cpu.registers.read(rd);
    let rhs = instr.bits(0, 7);

    match instr.bits(11, 12) {
        0b00 => alu_op::<alu::MovOp>(lhs, rhs, rd, cpu),
        0b01 => alu_op::<alu::CmpOp>(lhs, rhs, rd, cpu),
        0b10 => alu_op::<alu::AddOp>(lhs, rhs, rd, cpu),
        _ => alu_op::<alu::SubOp>(lhs, rhs, rd, cpu),
    }

    Cycles::zero()
}

fn alu_op<O: BinaryOp>(lhs: u32, rhs: u32, rd: u32, cpu: &mut Cpu) {
    let result = O::execute(&cpu.registers, lhs, rhs);
    O::set_flags(&mut cpu.registers, lhs, rhs, result);
    if O::HAS_RESULT {
        cpu.registers.write(rd, result);
    }
}

/// ALU operations
///
/// `AND/EOR/LSL/LSR/ASR/ADC/SBC/ROR/TST/NEG/CMP/CMN/ORR/MUL/BIC/MVN Rd, Rs`
pub fn thumb_alu_operation(instr: u32, cpu: &mut Cpu, _memory: &mut dyn Memory) -> Cycles {
    let rd = instr.bits(0, 2);
    let rs = instr.bits(3, 5);
    let lhs = cpu.registers.read(rd);
    let rhs = cpu.registers.read(rs);

    let op = instr.bits(6, 9);
    match op {
        0x0 => alu_op::<alu::AndOp>(lhs, rhs, rd, cpu),
        0x1 => alu_op::<alu::EorOp>(lhs, rhs, rd, cpu),
        // Register-specified shifts use the low byte of Rs.
        0x2 => alu_op::<alu::LslOp>(lhs, rhs & 0xFF, rd, cpu),
        0x3 => alu_op::<alu::LsrOp>(lhs, rhs & 0xFF, rd, cpu),
        0x4 => alu_op::<alu::AsrOp>(lhs, rhs & 0xFF, rd, cpu),
        0x5 => alu_op::<alu::AdcOp>(lhs, rhs, rd, cpu),
        0x6 => alu_op::<alu::SbcOp>(lhs, rhs, rd, cpu),
        0x7 => alu_op::<alu::RorOp>(lhs, rhs & 0xFF, rd, cpu),
        0x8 => alu_op::<alu::TstOp>(lhs, rhs, rd, cpu),
        0x9 => alu_op::<alu::NegOp>(lhs, rhs, rd, cpu),
        0xA => alu_op::<alu::CmpOp>(lhs, rhs, rd, cpu),
        0xB => alu_op::<alu::CmnOp>(lhs, rhs, rd, cpu),
        0xC => alu_op::<alu::OrrOp>(lhs, rhs, rd, cpu),
        0xD => {
            let result = lhs.wrapping_mul(rhs);
            multiply::set_multiply_flags(result, &mut cpu.registers);
            cpu.registers.write(rd, result);
        }
        0xE => alu_op::<alu::BicOp>(lhs, rhs, rd, cpu),
        _ => alu_op::<alu::MvnOp>(lhs, rhs, rd, cpu),
    }

    match op {
        // Register shifts add one internal cycle for the Rs read.
        0x2 | 0x3 | 0x4 | 0x7 => Cycles::one(),
        0xD => multiply::internal_multiply_cycles(rhs),
        _ => Cycles::zero(),
    }
}

/// Hi register operations / branch exchange
///
/// `ADD/CMP/MOV Rd, Hs` and friends, `BX Rs`
pub fn thumb_hi_register_op(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    let rd = instr.bits(0, 2) | (instr.bit_int(7) << 3);
    let rs = instr.bits(3, 5) | (instr.bit_int(6) << 3);

    match instr.bits(8, 9) {
        // ADD: no flags
        0b00 => {
            let result = cpu.registers.read(rd).wrapping_add(cpu.registers.read(rs));
            if rd == 15 {
                return cpu.branch_thumb(result, memory);
            }
            cpu.registers.write(rd, result);
            Cycles::zero()
        }
        // CMP: the only hi-register op that sets flags
        0b01 => {
            let lhs = cpu.registers.read(rd);
            let rhs = cpu.registers.read(rs);
            let result = alu::CmpOp::execute(&cpu.registers, lhs, rhs);
            alu::CmpOp::set_flags(&mut cpu.registers, lhs, rhs, result);
            Cycles::zero()
        }
        // MOV: no flags
        0b10 => {
            let result = cpu.registers.read(rs);
            if rd == 15 {
                return cpu.branch_thumb(result, memory);
            }
            cpu.registers.write(rd, result);
            Cycles::zero()
        }
        // BX
        _ => {
            let dest = cpu.registers.read(rs);
            if dest.bit(0) {
                cpu.branch_thumb(dest, memory)
            } else {
                cpu.registers.clear_flag(CpsrFlag::T);
                cpu.branch_arm(dest, memory)
            }
        }
    }
}

/// PC-relative load
///
/// `LDR Rd, [PC, #Imm]` -- the pipeline PC is used with bit 1 forced low.
pub fn thumb_pc_relative_load(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    let rd = instr.bits(8, 10);
    let address = (cpu.registers.read(15) & !0x2).wrapping_add(instr.bits(0, 7) << 2);

    let (value, wait) = memory.load32(address, AccessType::NonSequential);
    cpu.registers.write(rd, value);

    Cycles::from(2) + wait
}

/// load/store with register offset
///
/// `LDR/STR{B} Rd, [Rb, Ro]`
pub fn thumb_load_store_reg_offset(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    let rd = instr.bits(0, 2);
    let address = cpu
        .registers
        .read(instr.bits(3, 5))
        .wrapping_add(cpu.registers.read(instr.bits(6, 8)));
    let load = instr.bit(11);
    let byte = instr.bit(10);

    load_store(rd, address, load, byte, cpu, memory)
}

/// load/store sign-extended byte/halfword + halfword with register offset
///
/// `STRH/LDRH/LDSB/LDSH Rd, [Rb, Ro]`
pub fn thumb_load_store_sign_extended(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    let rd = instr.bits(0, 2);
    let address = cpu
        .registers
        .read(instr.bits(3, 5))
        .wrapping_add(cpu.registers.read(instr.bits(6, 8)));

    match (instr.bit(11), instr.bit(10)) {
        // STRH
        (false, false) => {
            let value = cpu.registers.read(rd);
            let wait = memory.store16(address, value as u16, AccessType::NonSequential);
            cpu.interrupt_prefetch();
            Cycles::one() + wait
        }
        // LDSB
        (false, true) => {
            let (value, wait) = memory.load8(address, AccessType::NonSequential);
            cpu.registers.write(rd, value as i8 as i32 as u32);
            Cycles::from(2) + wait
        }
        // LDRH: unaligned rotates by 8
        (true, false) => {
            let (value, wait) = memory.load16(address, AccessType::NonSequential);
            cpu.registers
                .write(rd, (value as u32).rotate_right(8 * (address & 1)));
            Cycles::from(2) + wait
        }
        // LDSH: unaligned degrades to LDSB
        (true, true) => {
            if address.bit(0) {
                let (value, wait) = memory.load8(address, AccessType::NonSequential);
                cpu.registers.write(rd, value as i8 as i32 as u32);
                Cycles::from(2) + wait
            } else {
                let (value, wait) = memory.load16(address, AccessType::NonSequential);
                cpu.registers.write(rd, value as i16 as i32 as u32);
                Cycles::from(2) + wait
            }
        }
    }
}

/// load/store with immediate offset
///
/// `LDR/STR{B} Rd, [Rb, #Imm]`
pub fn thumb_load_store_imm_offset(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    let rd = instr.bits(0, 2);
    let byte = instr.bit(12);
    let load = instr.bit(11);
    let offset = if byte {
        instr.bits(6, 10)
    } else {
        instr.bits(6, 10) << 2
    };
    let address = cpu.registers.read(instr.bits(3, 5)).wrapping_add(offset);

    load_store(rd, address, load, byte, cpu, memory)
}

fn load_store(
    rd: u32,
    address: u32,
    load: bool,
    byte: bool,
    cpu: &mut Cpu,
    memory: &mut dyn Memory,
) -> Cycles {
    if load {
        if byte {
            let (value, wait) = memory.load8(address, AccessType::NonSequential);
            cpu.registers.write(rd, value as u32);
            Cycles::from(2) + wait
        } else {
            let (value, wait) = memory.load32(address & !0x3, AccessType::NonSequential);
            cpu.registers
                .write(rd, value.rotate_right(8 * (address % 4)));
            Cycles::from(2) + wait
        }
    } else {
        let value = cpu.registers.read(rd);
        let wait = if byte {
            memory.store8(address, value as u8, AccessType::NonSequential)
        } else {
            memory.store32(address & !0x3, value, AccessType::NonSequential)
        };
        cpu.interrupt_prefetch();
        Cycles::one() + wait
    }
}

/// load/store halfword with immediate offset
///
/// `LDRH/STRH Rd, [Rb, #Imm]`
pub fn thumb_load_store_halfword(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    let rd = instr.bits(0, 2);
    let address = cpu
        .registers
        .read(instr.bits(3, 5))
        .wrapping_add(instr.bits(6, 10) << 1);

    if instr.bit(11) {
        let (value, wait) = memory.load16(address, AccessType::NonSequential);
        cpu.registers
            .write(rd, (value as u32).rotate_right(8 * (address & 1)));
        Cycles::from(2) + wait
    } else {
        let value = cpu.registers.read(rd);
        let wait = memory.store16(address, value as u16, AccessType::NonSequential);
        cpu.interrupt_prefetch();
        Cycles::one() + wait
    }
}

/// SP-relative load/store
///
/// `LDR/STR Rd, [SP, #Imm]`
pub fn thumb_load_store_sp_relative(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    let rd = instr.bits(8, 10);
    let address = cpu.registers.read(13).wrapping_add(instr.bits(0, 7) << 2);

    load_store(rd, address, instr.bit(11), false, cpu, memory)
}

/// load address
///
/// `ADD Rd, PC, #Imm` / `ADD Rd, SP, #Imm`
pub fn thumb_load_address(instr: u32, cpu: &mut Cpu, _memory: &mut dyn Memory) -> Cycles {
    let rd = instr.bits(8, 10);
    let offset = instr.bits(0, 7) << 2;

    let base = if instr.bit(11) {
        cpu.registers.read(13)
    } else {
        cpu.registers.read(15) & !0x2
    };

    cpu.registers.write(rd, base.wrapping_add(offset));
    Cycles::zero()
}

/// add offset to stack pointer
///
/// `ADD SP, #{-}Imm`
pub fn thumb_add_sp(instr: u32, cpu: &mut Cpu, _memory: &mut dyn Memory) -> Cycles {
    let offset = instr.bits(0, 6) << 2;
    let sp = cpu.registers.read(13);

    if instr.bit(7) {
        cpu.registers.write(13, sp.wrapping_sub(offset));
    } else {
        cpu.registers.write(13, sp.wrapping_add(offset));
    }

    Cycles::zero()
}

/// push/pop registers
///
/// `PUSH {Rlist}{LR}` / `POP {Rlist}{PC}`
pub fn thumb_push_pop(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    let pop = instr.bit(11);
    let pclr = instr.bit(8);
    let mut list = instr.bits(0, 7);
    if pclr {
        list |= if pop { 1 << 15 } else { 1 << 14 };
    }
    let count = list.count_ones();

    let sp = cpu.registers.read(13);
    let mut cycles = Cycles::zero();
    let mut access = AccessType::NonSequential;

    if pop {
        let mut address = sp;
        for register in 0..16 {
            if !list.bit(register) {
                continue;
            }
            let (value, wait) = memory.load32(address, access);
            cycles += Cycles::one() + wait;
            cpu.registers.write(register, value);
            access = AccessType::Sequential;
            address = address.wrapping_add(4);
        }

        cpu.registers.write(13, sp.wrapping_add(4 * count));
        cycles += Cycles::one();

        if list.bit(15) {
            let dest = cpu.registers.read(15);
            cycles += cpu.branch_thumb(dest, memory);
        }
    } else {
        let mut address = sp.wrapping_sub(4 * count);
        cpu.registers.write(13, address);

        for register in 0..16 {
            if !list.bit(register) {
                continue;
            }
            let value = cpu.registers.read(register);
            let wait = memory.store32(address, value, access);
            cycles += Cycles::one() + wait;
            access = AccessType::Sequential;
            address = address.wrapping_add(4);
        }

        cpu.interrupt_prefetch();
    }

    cycles
}

/// multiple load/store
///
/// `LDMIA/STMIA Rb!, {Rlist}`
pub fn thumb_block_transfer(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    let load = instr.bit(11);
    let rb = instr.bits(8, 10);

    // An empty list transfers R15 and moves the base by 0x40.
    let (list, count) = match instr.bits(0, 7) {
        0 => (0x8000u32, 16u32),
        list => (list, list.count_ones()),
    };

    let base = cpu.registers.read(rb);
    let mut address = base;
    let mut cycles = Cycles::zero();
    let mut access = AccessType::NonSequential;

    for register in 0..16 {
        if !list.bit(register) {
            continue;
        }

        if load {
            let (value, wait) = memory.load32(address, access);
            cycles += Cycles::one() + wait;
            cpu.registers.write(register, value);
        } else {
            // THUMB stores R15+2 for an (invalid) R15 entry; nothing relies
            // on it, so store the pipeline value as-is.
            let value = cpu.registers.read(register);
            let wait = memory.store32(address, value, access);
            cycles += Cycles::one() + wait;

            if access == AccessType::NonSequential {
                cpu.registers.write(rb, base.wrapping_add(4 * count));
            }
        }

        access = AccessType::Sequential;
        address = address.wrapping_add(4);
    }

    if load {
        cycles += Cycles::one();
        if !list.bit(rb) {
            cpu.registers.write(rb, base.wrapping_add(4 * count));
        }
        if list.bit(15) {
            let dest = cpu.registers.read(15);
            cycles += cpu.branch_thumb(dest, memory);
        }
    } else {
        cpu.interrupt_prefetch();
    }

    cycles
}

/// conditional branch
///
/// `B<cond> label`
pub fn thumb_conditional_branch(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    if check_condition(instr.bits(8, 11), &cpu.registers) {
        let offset = (instr.bits(0, 7) << 1).sign_extend(9);
        let dest = cpu.registers.read(15).wrapping_add(offset);
        cpu.branch_thumb(dest, memory)
    } else {
        Cycles::zero()
    }
}

/// unconditional branch
///
/// `B label`
pub fn thumb_unconditional_branch(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    let offset = (instr.bits(0, 10) << 1).sign_extend(12);
    let dest = cpu.registers.read(15).wrapping_add(offset);
    cpu.branch_thumb(dest, memory)
}

/// long branch with link, first half
///
/// `BL label` -- stashes the high part of the target in LR.
pub fn thumb_bl_setup(instr: u32, cpu: &mut Cpu, _memory: &mut dyn Memory) -> Cycles {
    let offset = (instr.bits(0, 10) << 12).sign_extend(23);
    let pc = cpu.registers.read(15);
    cpu.registers.write(14, pc.wrapping_add(offset));
    Cycles::zero()
}

/// long branch with link, second half
///
/// `BL label` -- jumps and leaves the return address (with the THUMB bit
/// set) in LR.
pub fn thumb_bl_complete(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    let pc = cpu.registers.read(15);
    let lr = cpu.registers.read(14);
    let dest = lr.wrapping_add(instr.bits(0, 10) << 1) & !0x1;

    cpu.registers.write(14, pc.wrapping_sub(2) | 1);
    cpu.branch_thumb(dest, memory)
}

/// Software Interrupt
///
/// `SWI <expression>`
pub fn thumb_swi(_instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    cpu.exception_internal(CpuException::Swi, memory)
}

pub fn thumb_undefined(instr: u32, cpu: &mut Cpu, memory: &mut dyn Memory) -> Cycles {
    tracing::debug!(
        opcode = format_args!("0x{instr:04X}"),
        address = format_args!("0x{:08X}", cpu.exception_address()),
        "undefined THUMB instruction"
    );
    cpu.exception_internal(CpuException::Undefined, memory)
}
