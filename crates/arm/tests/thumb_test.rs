use arm::CpsrFlag;

mod common;

use common::{execute_thumb, Executor};

#[test]
fn unaligned_word_load_rotates_into_low_bits() {
    // mov r0, #0x11 / ldr r1, [r0, #0]
    let mut executor = Executor::from_thumb(&[0x2011, 0x6801, 0xDFCE]);
    executor.memory.set_word(0x10, 0x11223344);
    executor.run();

    assert_eq!(executor.cpu.registers.read(1), 0x44112233);
}

#[test]
fn add_and_subtract_set_flags() {
    // mov r0, #5 / mov r1, #3 / add r2, r0, r1 / sub r3, r0, r1
    let executor = execute_thumb(&[0x2005, 0x2103, 0x1842, 0x1A43, 0xDFCE]);

    assert_eq!(executor.cpu.registers.read(2), 8);
    assert_eq!(executor.cpu.registers.read(3), 2);
    assert!(executor.cpu.registers.get_flag(CpsrFlag::C), "5 - 3 does not borrow");
    assert!(!executor.cpu.registers.get_flag(CpsrFlag::Z));
}

#[test]
fn push_pop_round_trip() {
    // mov r0, #1 / mov r1, #2 / push {r0,r1} / pop {r2,r3}
    let mut executor = Executor::from_thumb(&[0x2001, 0x2102, 0xB403, 0xBC0C, 0xDFCE]);
    executor.cpu.registers.write(13, 0x1000);
    executor.run();

    assert_eq!(executor.cpu.registers.read(2), 1);
    assert_eq!(executor.cpu.registers.read(3), 2);
    assert_eq!(executor.cpu.registers.read(13), 0x1000);
}

#[test]
fn long_branch_with_link_and_return() {
    // 0x0: bl 0x8
    // 0x4: swi 0xCE
    // 0x6: nop
    // 0x8: mov r0, #9 / bx lr
    let executor = execute_thumb(&[0xF000, 0xF802, 0xDFCE, 0x46C0, 0x2009, 0x4770]);

    assert_eq!(executor.cpu.registers.read(0), 9);
}

#[test]
fn register_shift_by_register_amount() {
    // mov r0, #1 / mov r1, #4 / lsl r0, r1
    let executor = execute_thumb(&[0x2001, 0x2104, 0x4088, 0xDFCE]);

    assert_eq!(executor.cpu.registers.read(0), 0x10);
}

#[test]
fn pc_relative_load_masks_pipeline_bit() {
    // 0x0: ldr r0, [pc, #4]  (pc reads 0x4, bit 1 cleared -> word at 0x8)
    // 0x2: swi 0xCE
    let mut executor = Executor::from_thumb(&[0x4801, 0xDFCE]);
    executor.memory.set_word(0x08, 0xCAFEBABE);
    executor.run();

    assert_eq!(executor.cpu.registers.read(0), 0xCAFEBABE);
}
