use arm::{AccessType, CpsrFlag, CpuMode, Memory};
use pretty_assertions::assert_eq;

mod common;

use common::{gba_with_program, step_until, FrameCollector, SPIN};

const NONSEQ: AccessType = AccessType::NonSequential;

#[test]
fn biosless_boot_starts_at_the_cartridge_entry() {
    // Cartridge entry: b 0x08000010
    let mut gba = gba_with_program(&[0xEA000002, SPIN, SPIN, SPIN, SPIN]);

    assert_eq!(gba.cpu.next_execution_address(), 0x0800_0000);
    assert_eq!(gba.cpu.registers.read_mode(), CpuMode::System);

    gba.step(&mut gba::NoopGbaVideoOutput);

    assert_eq!(gba.cpu.next_execution_address(), 0x0800_0010);
    assert_eq!(gba.cpu.registers.read_mode(), CpuMode::System);
    assert!(!gba.cpu.registers.get_flag(CpsrFlag::T));
    assert_eq!(gba.cpu.registers.read(13), 0x0300_7F00);
}

#[test]
fn word_loads_through_the_bus_rotate_unaligned_bytes() {
    // mov r0, #0x02000000 / add r0, r0, #1 / ldr r1, [r0]
    let mut gba = gba_with_program(&[0xE3A00402, 0xE2800001, 0xE5901000, SPIN]);
    gba.mapped.store32(0x0200_0000, 0x1122_3344, NONSEQ);

    step_until(&mut gba, |gba| gba.cpu.registers.read(1) != 0);
    assert_eq!(gba.cpu.registers.read(1), 0x4411_2233);
}

#[test]
fn immediate_dma_copies_and_clears_enable() {
    // Program DMA0: 0x02000000 -> 0x02001000, 0x40 halfwords, immediate,
    // IRQ on completion.
    let mut gba = gba_with_program(&[
        0xE3A00404, // mov r0, #0x04000000
        0xE28000B0, // add r0, r0, #0xB0
        0xE3A01402, // mov r1, #0x02000000
        0xE5801000, // str r1, [r0]        (SAD)
        0xE2812A01, // add r2, r1, #0x1000
        0xE5802004, // str r2, [r0, #4]    (DAD)
        0xE3A03040, // mov r3, #0x40
        0xE1C030B8, // strh r3, [r0, #8]   (count)
        0xE3A04CC0, // mov r4, #0xC000     (enable | irq)
        0xE1C040BA, // strh r4, [r0, #10]
        SPIN,
    ]);

    for i in 0..0x40u32 {
        gba.mapped
            .store16(0x0200_0000 + i * 2, 0x1000 + i as u16, NONSEQ);
    }

    // The completion IRQ doubles as the "transfer ran" signal.
    step_until(&mut gba, |gba| {
        gba.mapped.load16(0x0400_0202, NONSEQ).0 & 0x0100 != 0
    });

    assert_eq!(
        gba.mapped.load16(0x0400_00BA, NONSEQ).0 & 0x8000,
        0,
        "a non-repeating immediate DMA clears its enable bit"
    );

    for i in 0..0x40u32 {
        assert_eq!(
            gba.mapped.load16(0x0200_1000 + i * 2, NONSEQ).0,
            0x1000 + i as u16,
            "halfword {i} should have been copied"
        );
    }

    let (interrupt_flags, _) = gba.mapped.load16(0x0400_0202, NONSEQ);
    assert_ne!(interrupt_flags & 0x0100, 0, "DMA0 IRQ should be pending");
}

#[test]
fn timer_cascade_counts_overflows_of_the_lower_timer() {
    let mut gba = gba_with_program(&[
        0xE3A00404, // mov r0, #0x04000000
        0xE2802C01, // add r2, r0, #0x100
        0xE3A01084, // mov r1, #0x84       (cascade | enable)
        0xE1C210B6, // strh r1, [r2, #6]   (TM1CNT_H)
        0xE3E01000, // mvn r1, #0          (0xFFFFFFFF)
        0xE1C210B0, // strh r1, [r2, #0]   (TM0CNT_L = 0xFFFF)
        0xE3A01080, // mov r1, #0x80       (enable)
        0xE1C210B2, // strh r1, [r2, #2]   (TM0CNT_H)
        SPIN,
    ]);

    // With a reload of 0xFFFF, timer 0 overflows every prescaler tick and
    // timer 1 counts each one.
    step_until(&mut gba, |gba| gba.mapped.timers.counter(1) >= 4);

    let (timer1, _) = gba.mapped.load16(0x0400_0104, NONSEQ);
    assert!(timer1 >= 4);
}

#[test]
fn halt_sleeps_until_a_pending_interrupt() {
    let mut gba = gba_with_program(&[
        0xE3A00404, // mov r0, #0x04000000
        0xE3A01008, // mov r1, #8          (timer 0 interrupt)
        0xE5801200, // str r1, [r0, #0x200] (IE)
        0xE2802C01, // add r2, r0, #0x100
        0xE3A010C0, // mov r1, #0xC0       (enable | irq)
        0xE1C210B2, // strh r1, [r2, #2]   (TM0CNT_H)
        0xE3A03000, // mov r3, #0
        0xE5C03301, // strb r3, [r0, #0x301] (HALTCNT: halt)
        0xE3A05001, // mov r5, #1          (runs only after wakeup)
        SPIN,
    ]);

    // IME is left off, so the halt ends without IRQ entry: the CPU simply
    // resumes at the next instruction once IE & IF goes nonzero.
    step_until(&mut gba, |gba| gba.cpu.registers.read(5) == 1);

    assert!(
        gba.cycles() > 0x10000,
        "the halt should have slept through a full timer period"
    );

    let (interrupt_flags, _) = gba.mapped.load16(0x0400_0202, NONSEQ);
    assert_ne!(interrupt_flags & 0x0008, 0, "timer 0 IRQ should be latched");
}

#[test]
fn mode3_draws_the_first_vram_halfword_at_the_origin() {
    let mut gba = gba_with_program(&[SPIN]);

    // Mode 3 with BG2 enabled; pixel (0,0) = white.
    gba.mapped.store16(0x0400_0000, 0x0403, NONSEQ);
    gba.mapped.store16(0x0600_0000, 0x7FFF, NONSEQ);
    gba.mapped.store16(0x0600_0002, 0x001F, NONSEQ);

    let mut frame = FrameCollector::new();
    gba.run_frame(&mut frame);

    assert_eq!(frame.lines[0][0], 0x7FFF);
    assert_eq!(frame.lines[0][1], 0x001F);
    assert_eq!(gba.frame()[0], 0x7FFF);
    assert_eq!(gba.frame()[1], 0x001F);
}

#[test]
fn frames_advance_once_per_vblank() {
    let mut gba = gba_with_program(&[SPIN]);
    assert_eq!(gba.frame_count(), 0);

    gba.run_frame(&mut gba::NoopGbaVideoOutput);
    assert_eq!(gba.frame_count(), 1);
    assert_eq!(gba.mapped.video.scanline(), 160);

    let cycles_at_first_vblank = gba.cycles();
    gba.run_frame(&mut gba::NoopGbaVideoOutput);
    assert_eq!(gba.frame_count(), 2);

    // One full frame is 228 lines of 1232 cycles.
    let frame_cycles = gba.cycles() - cycles_at_first_vblank;
    assert!((frame_cycles as i64 - 228 * 1232).abs() < 64);
}

#[test]
fn vcount_match_raises_its_interrupt() {
    let mut gba = gba_with_program(&[SPIN]);

    // Match on line 3 with the V-counter IRQ enabled.
    gba.mapped.store16(0x0400_0004, 0x0320, NONSEQ);

    step_until(&mut gba, |gba| {
        gba.mapped.load16(0x0400_0202, NONSEQ).0 & 0x0004 != 0
    });
    assert_eq!(gba.mapped.video.scanline(), 3);
}
