use arm::{CpsrFlag, CpuMode};

mod common;

use common::{execute_arm, Executor};

#[test]
fn adds_sets_all_four_flags() {
    // mov r0, #0x80000000 / mov r1, #0x80000000 / adds r2, r0, r1
    let executor = execute_arm(&[0xE3A00480, 0xE3A01480, 0xE0902001, 0xEF0000CE]);

    assert_eq!(executor.cpu.registers.read(2), 0);
    assert!(!executor.cpu.registers.get_flag(CpsrFlag::N));
    assert!(executor.cpu.registers.get_flag(CpsrFlag::Z));
    assert!(executor.cpu.registers.get_flag(CpsrFlag::C));
    assert!(executor.cpu.registers.get_flag(CpsrFlag::V));
}

#[test]
fn lsr_immediate_zero_encodes_a_32_bit_shift() {
    // mov r0, #0x80000000 / movs r1, r0, lsr #0
    let executor = execute_arm(&[0xE3A00480, 0xE1B01020, 0xEF0000CE]);

    assert_eq!(executor.cpu.registers.read(1), 0);
    assert!(executor.cpu.registers.get_flag(CpsrFlag::C));
    assert!(executor.cpu.registers.get_flag(CpsrFlag::Z));
}

#[test]
fn unaligned_word_load_rotates_into_low_bits() {
    // mov r0, #0x11 / ldr r1, [r0]
    let mut executor = Executor::from_arm(&[0xE3A00011, 0xE5901000, 0xEF0000CE]);
    executor.memory.set_word(0x10, 0x11223344);
    executor.run();

    assert_eq!(executor.cpu.registers.read(1), 0x44112233);
}

#[test]
fn branch_with_link_sets_return_address() {
    // 0x00: bl 0x10
    // 0x04: swi 0xCE
    // 0x10: mov r0, #42 / bx lr
    let executor = execute_arm(&[
        0xEB000002, 0xEF0000CE, 0xE1A00000, 0xE1A00000, 0xE3A0002A, 0xE12FFF1E,
    ]);

    assert_eq!(executor.cpu.registers.read(0), 42);
    assert_eq!(executor.cpu.registers.read(14), 0x04);
}

#[test]
fn push_then_pop_round_trips_registers() {
    // mov sp, #0x100 / mov r0, #1 / mov r1, #2 / stmdb sp!, {r0,r1}
    // mov r0, #0 / mov r1, #0 / ldmia sp!, {r0,r1}
    let executor = execute_arm(&[
        0xE3A0DC01, 0xE3A00001, 0xE3A01002, 0xE92D0003, 0xE3A00000, 0xE3A01000, 0xE8BD0003,
        0xEF0000CE,
    ]);

    assert_eq!(executor.cpu.registers.read(0), 1);
    assert_eq!(executor.cpu.registers.read(1), 2);
    assert_eq!(executor.cpu.registers.read(13), 0x100);
}

#[test]
fn msr_mrs_round_trip_preserves_cpsr() {
    // mrs r0, cpsr / orr r1, r0, #0xF0000000 / msr cpsr_f, r1 / mrs r2, cpsr
    // msr cpsr_f, r0 / mrs r3, cpsr
    let executor = execute_arm(&[
        0xE10F0000, 0xE380120F, 0xE128F001, 0xE10F2000, 0xE128F000, 0xE10F3000, 0xEF0000CE,
    ]);

    assert_eq!(
        executor.cpu.registers.read(2) & 0xF000_0000,
        0xF000_0000,
        "flag-field MSR should set all four condition flags"
    );
    assert_eq!(
        executor.cpu.registers.read(3),
        executor.cpu.registers.read(0),
        "restoring the saved CPSR should be lossless"
    );
}

#[test]
fn multiply_and_multiply_long() {
    // mov r0, #7 / mov r1, #6 / mul r2, r0, r1 / umull r4, r5, r0, r1
    let executor = execute_arm(&[
        0xE3A00007, 0xE3A01006, 0xE0020190, 0xE0854190, 0xEF0000CE,
    ]);

    assert_eq!(executor.cpu.registers.read(2), 42);
    assert_eq!(executor.cpu.registers.read(4), 42);
    assert_eq!(executor.cpu.registers.read(5), 0);
}

#[test]
fn failed_condition_is_a_no_op() {
    // mov r0, #5 / movs r1, #0 (Z=1) / addne r0, r0, #1
    let executor = execute_arm(&[0xE3A00005, 0xE3B01000, 0x12800001, 0xEF0000CE]);

    assert_eq!(executor.cpu.registers.read(0), 5);
}

#[test]
fn swi_enters_supervisor_mode_through_the_vector() {
    // 0x00: swi #0x01 -> vector 0x08 holds the halting swi
    let mut executor = Executor::from_arm(&[0xEF000001]);
    executor.memory.set_word(0x08, 0xEF0000CE);
    executor.run();

    assert_eq!(executor.cpu.registers.read_mode(), CpuMode::Supervisor);
    assert_eq!(executor.cpu.registers.read(14), 0x04, "LR_svc is the SWI return address");
    assert_eq!(
        executor.cpu.registers.read_spsr() & 0x1F,
        CpuMode::System.bits(),
        "SPSR_svc holds the interrupted mode"
    );
    assert!(executor.cpu.registers.get_flag(CpsrFlag::I));
}

#[test]
fn store_word_uses_aligned_address() {
    // mov r0, #0x21 / mov r1, #0xAB / str r1, [r0]
    let mut executor = Executor::from_arm(&[0xE3A00021, 0xE3A010AB, 0xE5801000, 0xEF0000CE]);
    executor.run();

    assert_eq!(executor.memory.word(0x20), 0xAB);
}
