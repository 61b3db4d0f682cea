use arm::{AccessType, Memory};
use pretty_assertions::assert_eq;

mod common;

use common::{gba_with_program, SPIN};

const NONSEQ: AccessType = AccessType::NonSequential;

#[test]
fn ewram_mirrors_every_256k() {
    let mut gba = gba_with_program(&[SPIN]);

    gba.mapped.store32(0x0200_0000, 0xDEAD_BEEF, NONSEQ);
    assert_eq!(gba.mapped.load32(0x0204_0000, NONSEQ).0, 0xDEAD_BEEF);
    assert_eq!(gba.mapped.load32(0x02FC_0000, NONSEQ).0, 0xDEAD_BEEF);
}

#[test]
fn iwram_mirrors_every_32k() {
    let mut gba = gba_with_program(&[SPIN]);

    gba.mapped.store16(0x0300_0100, 0x1234, NONSEQ);
    assert_eq!(gba.mapped.load16(0x0300_8100, NONSEQ).0, 0x1234);
}

#[test]
fn palette_byte_writes_smear_across_the_halfword() {
    let mut gba = gba_with_program(&[SPIN]);

    gba.mapped.store8(0x0500_0001, 0x5A, NONSEQ);
    assert_eq!(gba.mapped.load16(0x0500_0000, NONSEQ).0, 0x5A5A);
}

#[test]
fn oam_ignores_byte_writes() {
    let mut gba = gba_with_program(&[SPIN]);

    gba.mapped.store16(0x0700_0000, 0xBEEF, NONSEQ);
    gba.mapped.store8(0x0700_0000, 0x11, NONSEQ);
    assert_eq!(gba.mapped.load16(0x0700_0000, NONSEQ).0, 0xBEEF);
}

#[test]
fn vram_byte_writes_to_obj_tiles_are_dropped() {
    let mut gba = gba_with_program(&[SPIN]);

    // Tile modes drop byte writes at and above 0x06010000.
    gba.mapped.store8(0x0601_0000, 0x42, NONSEQ);
    assert_eq!(gba.mapped.load16(0x0601_0000, NONSEQ).0, 0);

    // Below the threshold they smear like palette RAM.
    gba.mapped.store8(0x0600_0000, 0x42, NONSEQ);
    assert_eq!(gba.mapped.load16(0x0600_0000, NONSEQ).0, 0x4242);
}

#[test]
fn vram_mirrors_with_the_32k_fold() {
    let mut gba = gba_with_program(&[SPIN]);

    gba.mapped.store16(0x0601_0000, 0xABCD, NONSEQ);
    // The upper 32 KiB appears twice within each 128 KiB mirror...
    assert_eq!(gba.mapped.load16(0x0601_8000, NONSEQ).0, 0xABCD);
    // ...and the whole thing repeats every 128 KiB.
    assert_eq!(gba.mapped.load16(0x0603_0000, NONSEQ).0, 0xABCD);
}

#[test]
fn unmapped_reads_return_the_last_bus_value() {
    let mut gba = gba_with_program(&[SPIN]);

    let (seed, _) = gba.mapped.load32(0x0800_0000, NONSEQ);
    let (open, _) = gba.mapped.load32(0x0100_0000, NONSEQ);
    assert_eq!(open, seed);

    let (byte, _) = gba.mapped.load8(0x0100_0000, NONSEQ);
    assert_eq!(u32::from(byte), open & 0xFF);
}

#[test]
fn rom_mirrors_appear_in_all_three_waitstate_regions() {
    let mut gba = gba_with_program(&[0x1122_3344, SPIN]);

    assert_eq!(gba.mapped.load32(0x0800_0000, NONSEQ).0, 0x1122_3344);
    assert_eq!(gba.mapped.load32(0x0A00_0000, NONSEQ).0, 0x1122_3344);
    assert_eq!(gba.mapped.load32(0x0C00_0000, NONSEQ).0, 0x1122_3344);
}

#[test]
fn interrupt_flag_is_write_one_to_clear() {
    let mut gba = gba_with_program(&[SPIN]);

    gba.mapped
        .system_control
        .request_interrupt(gba::system_control::InterruptSource::Timer0);
    gba.mapped
        .system_control
        .request_interrupt(gba::system_control::InterruptSource::VBlank);

    let (flags, _) = gba.mapped.load16(0x0400_0202, NONSEQ);
    assert_eq!(flags, 0x0009);

    // Acknowledge just the timer bit.
    gba.mapped.store16(0x0400_0202, 0x0008, NONSEQ);
    let (flags, _) = gba.mapped.load16(0x0400_0202, NONSEQ);
    assert_eq!(flags, 0x0001);
}

#[test]
fn io_byte_writes_preserve_the_other_lane() {
    let mut gba = gba_with_program(&[SPIN]);

    gba.mapped.store16(0x0400_0200, 0x3F01, NONSEQ);
    gba.mapped.store8(0x0400_0200, 0x02, NONSEQ);

    let (ie, _) = gba.mapped.load16(0x0400_0200, NONSEQ);
    assert_eq!(ie, 0x3F02);
}
