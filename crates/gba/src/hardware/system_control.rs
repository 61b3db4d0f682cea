use arm::Waitstates;
use gba_derive::IoRegister;

use crate::{
    memory::IoRegister,
    scheduler::{EventKind, SharedGbaScheduler},
};

/// The fourteen interrupt sources, by IE/IF bit position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum InterruptSource {
    VBlank = 0,
    HBlank = 1,
    VCountMatch = 2,
    Timer0 = 3,
    Timer1 = 4,
    Timer2 = 5,
    Timer3 = 6,
    Serial = 7,
    Dma0 = 8,
    Dma1 = 9,
    Dma2 = 10,
    Dma3 = 11,
    Keypad = 12,
    GamePak = 13,
}

impl InterruptSource {
    #[inline]
    pub fn mask(self) -> u16 {
        1 << (self as u16)
    }

    pub const fn timer(index: usize) -> InterruptSource {
        match index {
            0 => InterruptSource::Timer0,
            1 => InterruptSource::Timer1,
            2 => InterruptSource::Timer2,
            _ => InterruptSource::Timer3,
        }
    }

    pub const fn dma(index: usize) -> InterruptSource {
        match index {
            0 => InterruptSource::Dma0,
            1 => InterruptSource::Dma1,
            2 => InterruptSource::Dma2,
            _ => InterruptSource::Dma3,
        }
    }
}

/// 4000204h - WAITCNT - Waitstate Control (R/W)
///   Bit   Expl.
///   0-1   SRAM Wait Control          (0..3 = 4,3,2,8 cycles)
///   2-3   Wait State 0 First Access  (0..3 = 4,3,2,8 cycles)
///   4     Wait State 0 Second Access (0..1 = 2,1 cycles)
///   5-6   Wait State 1 First Access  (0..3 = 4,3,2,8 cycles)
///   7     Wait State 1 Second Access (0..1 = 4,1 cycles)
///   8-9   Wait State 2 First Access  (0..3 = 4,3,2,8 cycles)
///   10    Wait State 2 Second Access (0..1 = 8,1 cycles)
///   11-12 PHI Terminal Output
///   14    Game Pak Prefetch Buffer Enable
///   15    Game Pak Type Flag (Read Only)
#[derive(IoRegister, Copy, Clone)]
#[field(sram_wait_control: u16 = 0..=1)]
#[field(waitstate_0_first_access: u16 = 2..=3)]
#[field(waitstate_0_second_access: u16 = 4)]
#[field(waitstate_1_first_access: u16 = 5..=6)]
#[field(waitstate_1_second_access: u16 = 7)]
#[field(waitstate_2_first_access: u16 = 8..=9)]
#[field(waitstate_2_second_access: u16 = 10)]
#[field(phi_terminal_output: u16 = 11..=12)]
#[field(gamepak_prefetch_buffer: bool = 14)]
#[field(gamepak_type: readonly<bool> = 15)]
pub struct RegWaitcnt {
    value: u16,
}

const NONSEQUENTIAL_WAITS: [u32; 4] = [4, 3, 2, 8];
const SEQUENTIAL_WAITS: [[u32; 2]; 3] = [[2, 1], [4, 1], [8, 1]];

/// Cartridge-bus timings derived from WAITCNT, kept unpacked so the bus can
/// read them without re-decoding the register.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemWaitstates {
    pub sram: Waitstates,
    /// (first access, second access) for wait states 0-2.
    pub gamepak: [(Waitstates, Waitstates); 3],
}

/// IE/IF/IME, WAITCNT, POSTFLG/HALTCNT and the undocumented internal memory
/// control register.
pub struct SystemControl {
    interrupt_enable: u16,
    interrupt_flags: u16,
    master_enable: u16,
    pub waitcnt: RegWaitcnt,
    post_boot_flag: u8,
    internal_memory_control: u32,
    halted: bool,
    pub waitstates: SystemWaitstates,
    scheduler: SharedGbaScheduler,
}

impl SystemControl {
    const INTERRUPT_MASK: u16 = 0x3FFF;

    pub(crate) fn new(scheduler: SharedGbaScheduler) -> Self {
        let mut this = SystemControl {
            interrupt_enable: 0,
            interrupt_flags: 0,
            master_enable: 0,
            waitcnt: RegWaitcnt::default(),
            post_boot_flag: 0,
            internal_memory_control: 0x0D00_0020,
            halted: false,
            waitstates: SystemWaitstates::default(),
            scheduler,
        };
        this.update_waitstates();
        this
    }

    pub(crate) fn reset(&mut self) {
        self.interrupt_enable = 0;
        self.interrupt_flags = 0;
        self.master_enable = 0;
        self.waitcnt = RegWaitcnt::default();
        self.post_boot_flag = 0;
        self.internal_memory_control = 0x0D00_0020;
        self.halted = false;
        self.update_waitstates();
    }

    #[inline]
    pub fn halted(&self) -> bool {
        self.halted
    }

    #[inline]
    pub fn interrupt_enable(&self) -> u16 {
        self.interrupt_enable
    }

    #[inline]
    pub fn interrupt_flags(&self) -> u16 {
        self.interrupt_flags
    }

    #[inline]
    pub fn master_enabled(&self) -> bool {
        self.master_enable & 1 != 0
    }

    /// Latches a pending interrupt, waking a halted CPU and arming the IRQ
    /// event when the master enable allows it.
    pub fn request_interrupt(&mut self, source: InterruptSource) {
        self.interrupt_flags |= source.mask();
        self.check_for_interrupt();
    }

    /// Any (IE & IF) match wakes the CPU from halt regardless of IME; the
    /// actual IRQ is taken three cycles later, and only if IME and the
    /// CPSR I flag still allow it then.
    fn check_for_interrupt(&mut self) {
        if self.interrupt_enable & self.interrupt_flags == 0 {
            return;
        }

        self.halted = false;

        if self.master_enabled() && !self.scheduler.scheduled(EventKind::Irq) {
            self.scheduler.schedule(EventKind::Irq, 3);
        }
    }

    pub(crate) fn reg_read16(&self, offset: u32) -> Option<u16> {
        match offset {
            0x200 => Some(self.interrupt_enable),
            0x202 => Some(self.interrupt_flags),
            0x204 => Some(self.waitcnt.read()),
            0x206 | 0x20A => Some(0),
            0x208 => Some(self.master_enable),
            // HALTCNT is write-only; POSTFLG reads in the low byte.
            0x300 => Some(u16::from(self.post_boot_flag)),
            0x800 => Some(self.internal_memory_control as u16),
            0x802 => Some((self.internal_memory_control >> 16) as u16),
            _ => None,
        }
    }

    pub(crate) fn reg_write16(&mut self, offset: u32, value: u16, mask: u16) {
        match offset {
            0x200 => {
                self.interrupt_enable = ((self.interrupt_enable & !mask) | (value & mask))
                    & Self::INTERRUPT_MASK;
                self.check_for_interrupt();
            }
            // IF is write-1-to-clear: the written value acknowledges.
            0x202 => {
                self.interrupt_flags &= !(value & mask);
                self.check_for_interrupt();
            }
            0x204 => {
                let merged = (self.waitcnt.read() & !mask) | (value & mask);
                self.waitcnt.write(merged);
                self.update_waitstates();
            }
            0x208 => {
                self.master_enable = ((self.master_enable & !mask) | (value & mask)) & 1;
                self.check_for_interrupt();
            }
            0x300 => {
                if mask & 0x00FF != 0 {
                    self.post_boot_flag = value as u8 & 1;
                }
                if mask & 0xFF00 != 0 {
                    // HALTCNT: bit 15 clear = halt, set = stop. Stop mode
                    // behaves as a halt here; both wake on (IE & IF).
                    let haltcnt = (value >> 8) as u8;
                    if haltcnt & 0x80 == 0 {
                        self.halted = true;
                    }
                }
            }
            0x800 => {
                self.internal_memory_control = (self.internal_memory_control & !u32::from(mask))
                    | u32::from(value & mask);
            }
            0x802 => {
                self.internal_memory_control = (self.internal_memory_control
                    & !(u32::from(mask) << 16))
                    | (u32::from(value & mask) << 16);
            }
            _ => {}
        }
    }

    fn update_waitstates(&mut self) {
        self.waitstates.sram =
            Waitstates::from(NONSEQUENTIAL_WAITS[self.waitcnt.sram_wait_control() as usize]);

        let first = [
            self.waitcnt.waitstate_0_first_access(),
            self.waitcnt.waitstate_1_first_access(),
            self.waitcnt.waitstate_2_first_access(),
        ];
        let second = [
            self.waitcnt.waitstate_0_second_access(),
            self.waitcnt.waitstate_1_second_access(),
            self.waitcnt.waitstate_2_second_access(),
        ];

        for region in 0..3 {
            self.waitstates.gamepak[region] = (
                Waitstates::from(NONSEQUENTIAL_WAITS[first[region] as usize]),
                Waitstates::from(SEQUENTIAL_WAITS[region][second[region] as usize]),
            );
        }

        tracing::debug!(waitstates = ?self.waitstates, "waitstates updated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system_control() -> SystemControl {
        SystemControl::new(SharedGbaScheduler::default())
    }

    #[test]
    fn interrupt_flag_writes_acknowledge() {
        let mut control = system_control();
        control.request_interrupt(InterruptSource::VBlank);
        control.request_interrupt(InterruptSource::Timer0);
        assert_eq!(
            control.interrupt_flags(),
            InterruptSource::VBlank.mask() | InterruptSource::Timer0.mask()
        );

        control.reg_write16(0x202, InterruptSource::VBlank.mask(), 0xFFFF);
        assert_eq!(control.interrupt_flags(), InterruptSource::Timer0.mask());
    }

    #[test]
    fn pending_interrupt_arms_the_irq_event() {
        let mut control = system_control();
        let scheduler = control.scheduler.clone();

        control.reg_write16(0x208, 1, 0xFFFF);
        control.reg_write16(0x200, InterruptSource::HBlank.mask(), 0xFFFF);
        assert!(!scheduler.scheduled(EventKind::Irq));

        control.request_interrupt(InterruptSource::HBlank);
        assert!(scheduler.scheduled(EventKind::Irq));
        assert_eq!(scheduler.remaining(EventKind::Irq), Some(3));
    }

    #[test]
    fn masked_interrupt_does_not_arm_but_does_wake() {
        let mut control = system_control();
        let scheduler = control.scheduler.clone();

        control.reg_write16(0x200, InterruptSource::VBlank.mask(), 0xFFFF);
        control.reg_write16(0x300, 0 << 8, 0xFF00);
        assert!(control.halted());

        // IME off: no IRQ event, but the halt still ends.
        control.request_interrupt(InterruptSource::VBlank);
        assert!(!control.halted());
        assert!(!scheduler.scheduled(EventKind::Irq));
    }

    #[test]
    fn waitcnt_reconfigures_cartridge_timing() {
        let mut control = system_control();
        // WS0 3/1, SRAM 8 cycles
        control.reg_write16(0x204, 0x0017, 0xFFFF);

        assert_eq!(u32::from(control.waitstates.sram), 8);
        assert_eq!(u32::from(control.waitstates.gamepak[0].0), 3);
        assert_eq!(u32::from(control.waitstates.gamepak[0].1), 1);
    }
}
