use std::fmt::Display;

use util::bits::BitOps;

#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash)]
#[repr(u32)]
pub enum CpuMode {
    /// User mode is the usual program execution state.
    User = 0b10000,

    /// System mode is a privileged variant of User mode sharing its register
    /// bank; it can only be entered by writing the CPSR mode bits from
    /// another privileged mode.
    System = 0b11111,

    /// Fast interrupt mode, with its own R8-R14.
    Fiq = 0b10001,

    /// General purpose interrupt handling mode.
    Irq = 0b10010,

    /// Protected mode for the operating system; SWI entry mode.
    Supervisor = 0b10011,

    /// Entered after a data abort or prefetch abort.
    Abort = 0b10111,

    /// Entered when an undefined instruction is executed.
    Undefined = 0b11011,

    /// Any mode pattern the ARMv4T architecture does not define.
    Invalid = 0b00000,
}

impl CpuMode {
    pub fn name(self) -> &'static str {
        match self {
            CpuMode::User => "User",
            CpuMode::System => "System",
            CpuMode::Fiq => "FIQ",
            CpuMode::Irq => "IRQ",
            CpuMode::Supervisor => "Supervisor",
            CpuMode::Abort => "Abort",
            CpuMode::Undefined => "Undefined",
            CpuMode::Invalid => "Invalid",
        }
    }

    pub fn is_privileged(self) -> bool {
        self != CpuMode::User && self != CpuMode::Invalid
    }

    /// Whether this mode has a banked SPSR.
    pub fn has_spsr(self) -> bool {
        !matches!(self, CpuMode::User | CpuMode::System | CpuMode::Invalid)
    }

    pub fn from_bits(mode_bits: u32) -> CpuMode {
        match mode_bits {
            0b10000 => CpuMode::User,
            0b11111 => CpuMode::System,
            0b10001 => CpuMode::Fiq,
            0b10010 => CpuMode::Irq,
            0b10011 => CpuMode::Supervisor,
            0b10111 => CpuMode::Abort,
            0b11011 => CpuMode::Undefined,
            _ => CpuMode::Invalid,
        }
    }

    #[inline(always)]
    pub fn bits(self) -> u32 {
        self as u32
    }
}

impl Display for CpuMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone, Copy)]
#[repr(u8)]
pub enum CpsrFlag {
    /// Negative / less than
    N = 31,
    /// Zero
    Z = 30,
    /// Carry / borrow / extend
    C = 29,
    /// Overflow
    V = 28,
    /// IRQ disable
    I = 7,
    /// FIQ disable
    F = 6,
    /// State bit (0 = ARM, 1 = THUMB)
    T = 5,
}

/// The ARM7TDMI register file.
///
/// `current` always holds the registers as seen from the active mode.
/// Switching modes swaps the banked subset (see the banking table in the
/// architecture manual) out to `banked` storage:
///
/// - FIQ banks R8-R14 (`banked[0..=6]`)
/// - Supervisor, Abort, IRQ and Undefined bank R13-R14
///   (`banked[7..=8]`, `banked[9..=10]`, `banked[11..=12]`, `banked[13..=14]`)
///
/// R15 is never banked. The SPSR of each exception mode lives in
/// `banked_spsr` in the same mode order.
pub struct Registers {
    current: [u32; 16],
    banked: [u32; 15],
    banked_spsr: [u32; 5],
    cpsr: u32,
    spsr: u32,
}

impl Registers {
    pub fn new(mode: CpuMode) -> Registers {
        Registers {
            current: [0; 16],
            banked: [0; 15],
            banked_spsr: [0; 5],
            cpsr: mode.bits(),
            spsr: 0,
        }
    }

    /// Reads a general purpose register as seen from the current mode.
    #[inline(always)]
    #[must_use]
    pub fn read(&self, register: u32) -> u32 {
        self.current[register as usize]
    }

    /// Writes a general purpose register as seen from the current mode.
    #[inline(always)]
    pub fn write(&mut self, register: u32, value: u32) {
        self.current[register as usize] = value;
    }

    /// Reads a register as another mode would see it, without leaving the
    /// current mode observably. Used by LDM/STM with the S bit set.
    pub fn read_with_mode(&mut self, tmp_mode: CpuMode, register: u32) -> u32 {
        let old_mode = self.write_mode(tmp_mode);
        let value = self.read(register);
        self.write_mode(old_mode);
        value
    }

    /// Writes a register as another mode would see it.
    pub fn write_with_mode(&mut self, tmp_mode: CpuMode, register: u32, value: u32) {
        let old_mode = self.write_mode(tmp_mode);
        self.write(register, value);
        self.write_mode(old_mode);
    }

    #[inline]
    #[must_use]
    pub fn get_flag(&self, flag: CpsrFlag) -> bool {
        self.cpsr.bit(flag as u32)
    }

    #[inline]
    pub fn set_flag(&mut self, flag: CpsrFlag) {
        self.cpsr = self.cpsr.set_bit(flag as u32);
    }

    #[inline]
    pub fn clear_flag(&mut self, flag: CpsrFlag) {
        self.cpsr = self.cpsr.clear_bit(flag as u32);
    }

    #[inline]
    pub fn put_flag(&mut self, flag: CpsrFlag, value: bool) {
        self.cpsr = self.cpsr.with_bit(flag as u32, value);
    }

    #[inline(always)]
    #[must_use]
    pub fn read_mode(&self) -> CpuMode {
        CpuMode::from_bits(self.cpsr & 0x1F)
    }

    /// Switches the CPU mode, updating the CPSR mode bits and swapping in the
    /// banked registers of the new mode. Returns the previous mode.
    pub fn write_mode(&mut self, new_mode: CpuMode) -> CpuMode {
        let old_mode = self.read_mode();
        self.bank_switch(old_mode, new_mode);
        self.cpsr = (self.cpsr & !0x1F) | new_mode.bits();
        old_mode
    }

    #[inline(always)]
    #[must_use]
    pub fn read_cpsr(&self) -> u32 {
        self.cpsr
    }

    /// Replaces the whole CPSR. A change of the mode bits performs a full
    /// bank switch, exactly as `MSR CPSR` and `SUBS PC, LR` do.
    pub fn write_cpsr(&mut self, value: u32) {
        let old_mode = self.read_mode();
        let new_mode = CpuMode::from_bits(value & 0x1F);

        if new_mode == CpuMode::Invalid {
            tracing::warn!(mode_bits = value & 0x1F, "wrote invalid CPU mode bits");
        }

        if old_mode != new_mode {
            self.bank_switch(old_mode, new_mode);
        }

        self.cpsr = value;
    }

    /// Reads the SPSR of the current mode. User and System have no SPSR;
    /// reading it there returns the scratch value, which callers avoid by
    /// checking [`CpuMode::has_spsr`] where the distinction matters.
    #[inline(always)]
    #[must_use]
    pub fn read_spsr(&self) -> u32 {
        self.spsr
    }

    /// Writes the SPSR of the current mode. A no-op in User/System, which
    /// have no SPSR to write.
    #[inline]
    pub fn write_spsr(&mut self, value: u32) {
        if self.read_mode().has_spsr() {
            self.spsr = value;
        }
    }

    /// Swaps the banked registers when moving between modes. Always passes
    /// through the common User/System bank: first the old mode's registers
    /// are swapped out, then the new mode's are swapped in.
    fn bank_switch(&mut self, old_mode: CpuMode, new_mode: CpuMode) {
        if old_mode == new_mode {
            return;
        }

        fn swap_range(current: &mut [u32; 16], banked: &mut [u32; 15], lo: usize, bank: usize) {
            for (offset, register) in (lo..=14).enumerate() {
                std::mem::swap(&mut current[register], &mut banked[bank + offset]);
            }
        }

        // Swap the old mode's bank out, landing on the User/System view.
        match old_mode {
            CpuMode::Fiq => {
                swap_range(&mut self.current, &mut self.banked, 8, 0);
                self.banked_spsr[0] = self.spsr;
            }
            CpuMode::Supervisor => {
                swap_range(&mut self.current, &mut self.banked, 13, 7);
                self.banked_spsr[1] = self.spsr;
            }
            CpuMode::Abort => {
                swap_range(&mut self.current, &mut self.banked, 13, 9);
                self.banked_spsr[2] = self.spsr;
            }
            CpuMode::Irq => {
                swap_range(&mut self.current, &mut self.banked, 13, 11);
                self.banked_spsr[3] = self.spsr;
            }
            CpuMode::Undefined => {
                swap_range(&mut self.current, &mut self.banked, 13, 13);
                self.banked_spsr[4] = self.spsr;
            }
            CpuMode::User | CpuMode::System | CpuMode::Invalid => {}
        }

        // Swap the new mode's bank in.
        match new_mode {
            CpuMode::Fiq => {
                swap_range(&mut self.current, &mut self.banked, 8, 0);
                self.spsr = self.banked_spsr[0];
            }
            CpuMode::Supervisor => {
                swap_range(&mut self.current, &mut self.banked, 13, 7);
                self.spsr = self.banked_spsr[1];
            }
            CpuMode::Abort => {
                swap_range(&mut self.current, &mut self.banked, 13, 9);
                self.spsr = self.banked_spsr[2];
            }
            CpuMode::Irq => {
                swap_range(&mut self.current, &mut self.banked, 13, 11);
                self.spsr = self.banked_spsr[3];
            }
            CpuMode::Undefined => {
                swap_range(&mut self.current, &mut self.banked, 13, 13);
                self.spsr = self.banked_spsr[4];
            }
            CpuMode::User | CpuMode::System | CpuMode::Invalid => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, ops::Range};

    use rand::Rng;

    use super::*;

    #[test]
    fn register_read_write() {
        let mut rng = rand::thread_rng();
        let values: [u32; 16] = std::array::from_fn(|_| rng.gen());
        let mut registers = Registers::new(CpuMode::System);

        for register in 0..16 {
            registers.write(register, values[register as usize]);
            assert_eq!(registers.read(register), values[register as usize]);
        }
    }

    #[test]
    fn banked_registers_survive_mode_round_trips() {
        let mut rng = rand::thread_rng();
        let unbanked: [u32; 16] = std::array::from_fn(|_| rng.gen());
        let mut expected = HashMap::<(u32, CpuMode), u32>::new();
        let mut registers = Registers::new(CpuMode::System);

        let mut init = |mode: CpuMode, banked: Range<u32>| {
            for register in 0..16 {
                let value = if banked.contains(&register) {
                    rng.gen()
                } else {
                    unbanked[register as usize]
                };
                registers.write_with_mode(mode, register, value);
                expected.insert((register, mode), value);
            }
        };

        init(CpuMode::User, 0..0);
        init(CpuMode::System, 0..0);
        init(CpuMode::Fiq, 8..15);
        init(CpuMode::Supervisor, 13..15);
        init(CpuMode::Abort, 13..15);
        init(CpuMode::Irq, 13..15);
        init(CpuMode::Undefined, 13..15);

        for &mode in &[
            CpuMode::User,
            CpuMode::System,
            CpuMode::Fiq,
            CpuMode::Supervisor,
            CpuMode::Abort,
            CpuMode::Irq,
            CpuMode::Undefined,
        ] {
            for register in 0..16 {
                let &value = expected.get(&(register, mode)).unwrap();
                assert_eq!(
                    value,
                    registers.read_with_mode(mode, register),
                    "wrong value for r{register} in {mode} mode"
                );
            }
        }
    }

    #[test]
    fn spsr_is_banked_per_mode() {
        let mut registers = Registers::new(CpuMode::Supervisor);
        registers.write_spsr(0x1111_1111);

        registers.write_mode(CpuMode::Irq);
        registers.write_spsr(0x2222_2222);

        registers.write_mode(CpuMode::Supervisor);
        assert_eq!(registers.read_spsr(), 0x1111_1111);

        registers.write_mode(CpuMode::Irq);
        assert_eq!(registers.read_spsr(), 0x2222_2222);
    }

    #[test]
    fn spsr_write_is_noop_in_user_and_system() {
        let mut registers = Registers::new(CpuMode::Irq);
        registers.write_spsr(0xAAAA_5555);

        registers.write_mode(CpuMode::System);
        registers.write_spsr(0xDEAD_BEEF);

        registers.write_mode(CpuMode::Irq);
        assert_eq!(registers.read_spsr(), 0xAAAA_5555);
    }
}
