use arm::{AccessType, Memory};
use gba_derive::IoRegister;

use crate::{
    hardware::GbaMemoryMappedHardware,
    memory::IoRegister,
    scheduler::{EventKind, SharedGbaScheduler},
};

use super::system_control::{InterruptSource, SystemWaitstates};

pub const FIFO_A_ADDR: u32 = 0x0400_00A0;
pub const FIFO_B_ADDR: u32 = 0x0400_00A4;

/// 40000BAh (+0Ch per channel) - DMAxCNT_H - DMA Control (R/W)
///   Bit   Expl.
///   5-6   Dest Addr Control  (0=Increment, 1=Decrement, 2=Fixed, 3=Increment/Reload)
///   7-8   Source Addr Control (0=Increment, 1=Decrement, 2=Fixed, 3=Prohibited)
///   9     Repeat
///   10    Transfer Type (0=16bit, 1=32bit)
///   11    Game Pak DRQ (DMA3 only)
///   12-13 Start Timing (0=Immediately, 1=VBlank, 2=HBlank, 3=Special)
///   14    IRQ on Word Count Drained
///   15    Enable
#[derive(IoRegister, Copy, Clone)]
#[field(dest_control: u16 = 5..=6)]
#[field(source_control: u16 = 7..=8)]
#[field(repeat: bool = 9)]
#[field(word_transfer: bool = 10)]
#[field(gamepak_drq: bool = 11)]
#[field(start_timing: u16 = 12..=13)]
#[field(irq_enable: bool = 14)]
#[field(enable: bool = 15)]
pub struct RegDmaControl {
    value: u16,
}

/// What causes a pending channel to claim the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaTrigger {
    Immediate,
    VBlank,
    HBlank,
    FifoA,
    FifoB,
    VideoCapture,
}

#[derive(Default)]
pub struct DmaChannel {
    source: u32,
    destination: u32,
    count: u16,
    pub(crate) control: RegDmaControl,

    /// Latched at the 0 -> 1 enable transition and advanced as units move.
    internal_source: u32,
    internal_destination: u32,
    internal_count: u32,

    /// Amortized cost of one unit of the scheduled transfer; lets a
    /// preempted channel work out how many units already happened.
    cycles_per_unit: u32,
    eeprom_read: bool,
    eeprom_write: bool,
}

impl DmaChannel {
    fn unit_bytes(&self) -> u32 {
        if self.control.word_transfer() {
            4
        } else {
            2
        }
    }

    fn count_mask(index: usize) -> u32 {
        if index == 3 {
            0xFFFF
        } else {
            0x3FFF
        }
    }

    fn latch(&mut self, index: usize) {
        self.internal_source = self.source & if index == 0 { 0x07FF_FFFF } else { 0x0FFF_FFFF };
        self.internal_destination =
            self.destination & if index == 3 { 0x0FFF_FFFF } else { 0x07FF_FFFF };

        let align = !(self.unit_bytes() - 1);
        self.internal_source &= align;
        self.internal_destination &= align;

        self.reload_count(index);
    }

    /// A latched count of zero means the channel maximum.
    fn reload_count(&mut self, index: usize) {
        self.internal_count = u32::from(self.count) & Self::count_mask(index);
        if self.internal_count == 0 {
            self.internal_count = Self::count_mask(index) + 1;
        }
    }

    fn step_addresses(&mut self) {
        let step = self.unit_bytes();

        match self.control.dest_control() {
            // Increment and Increment/Reload both walk forward.
            0 | 3 => self.internal_destination = self.internal_destination.wrapping_add(step),
            1 => self.internal_destination = self.internal_destination.wrapping_sub(step),
            _ => {}
        }

        match self.control.source_control() {
            0 => self.internal_source = self.internal_source.wrapping_add(step),
            1 => self.internal_source = self.internal_source.wrapping_sub(step),
            _ => {}
        }
    }
}

pub struct Dmas {
    pub(crate) channels: [DmaChannel; 4],
    /// Channel currently holding the bus, if any. While set, the CPU stalls
    /// and the main loop fast-forwards to the next event.
    active: Option<usize>,

    immediate: [bool; 4],
    vblank: [bool; 4],
    hblank: [bool; 4],
    fifo_a: [bool; 4],
    fifo_b: [bool; 4],
    video_capture: [bool; 4],

    scheduler: SharedGbaScheduler,
}

impl Dmas {
    pub(crate) fn new(scheduler: SharedGbaScheduler) -> Self {
        Dmas {
            channels: Default::default(),
            active: None,
            immediate: [false; 4],
            vblank: [false; 4],
            hblank: [false; 4],
            fifo_a: [false; 4],
            fifo_b: [false; 4],
            video_capture: [false; 4],
            scheduler,
        }
    }

    pub(crate) fn reset(&mut self) {
        for index in 0..4 {
            self.scheduler.unschedule(EventKind::dma_complete(index));
        }
        self.channels = Default::default();
        self.active = None;
        self.immediate = [false; 4];
        self.vblank = [false; 4];
        self.hblank = [false; 4];
        self.fifo_a = [false; 4];
        self.fifo_b = [false; 4];
        self.video_capture = [false; 4];
    }

    #[inline]
    pub fn active(&self) -> bool {
        self.active.is_some()
    }

    fn clear_triggers(&mut self, index: usize) {
        self.immediate[index] = false;
        self.vblank[index] = false;
        self.hblank[index] = false;
        self.fifo_a[index] = false;
        self.fifo_b[index] = false;
        self.video_capture[index] = false;
    }

    /// Registers a channel on the trigger list its start timing selects.
    /// Channels 1/2 aimed at a FIFO register take the FIFO lists; only
    /// channel 3 can do video capture.
    fn register_trigger(&mut self, index: usize) {
        match self.channels[index].control.start_timing() {
            0 => self.immediate[index] = true,
            1 => self.vblank[index] = true,
            2 => self.hblank[index] = true,
            _ => {
                let destination = self.channels[index].destination;
                if index == 1 || index == 2 {
                    if destination == FIFO_A_ADDR {
                        self.fifo_a[index] = true;
                    } else if destination == FIFO_B_ADDR {
                        self.fifo_b[index] = true;
                    }
                } else if index == 3 {
                    self.video_capture[index] = true;
                }
            }
        }
    }

    fn triggered(&self, trigger: DmaTrigger) -> [bool; 4] {
        match trigger {
            DmaTrigger::Immediate => self.immediate,
            DmaTrigger::VBlank => self.vblank,
            DmaTrigger::HBlank => self.hblank,
            DmaTrigger::FifoA => self.fifo_a,
            DmaTrigger::FifoB => self.fifo_b,
            DmaTrigger::VideoCapture => self.video_capture,
        }
    }

    fn is_fifo_transfer(&self, index: usize) -> bool {
        let channel = &self.channels[index];
        (index == 1 || index == 2)
            && channel.control.repeat()
            && (channel.internal_destination == FIFO_A_ADDR
                || channel.internal_destination == FIFO_B_ADDR)
    }
}

/// Per-unit bus cost for internal memory, mirroring the bus timings the
/// regions charge.
fn internal_unit_cycles(address: u32, word: bool) -> u32 {
    match address >> 24 {
        0x02 => {
            if word {
                6
            } else {
                3
            }
        }
        0x05 | 0x06 => {
            if word {
                2
            } else {
                1
            }
        }
        _ => 1,
    }
}

fn rom_unit_cycles(address: u32, word: bool, sequential: bool, waits: &SystemWaitstates) -> u32 {
    let region = ((address >> 25) as usize).saturating_sub(4).min(2);
    let (first, second) = waits.gamepak[region];
    let (first, second) = (u32::from(first), u32::from(second));

    let leading = if sequential { second } else { first };
    if word {
        2 + leading + second
    } else {
        1 + leading
    }
}

fn in_gamepak(address: u32) -> bool {
    (0x0800_0000..0x1000_0000).contains(&address)
}

impl GbaMemoryMappedHardware {
    pub(crate) fn dma_reg_read16(&mut self, offset: u32) -> Option<u16> {
        let index = ((offset - 0xB0) / 0xC) as usize;
        match (offset - 0xB0) % 0xC {
            // SAD, DAD and the word count are write-only.
            0xA => Some(self.dma.channels[index].control.read()),
            _ => None,
        }
    }

    pub(crate) fn dma_reg_write16(&mut self, offset: u32, value: u16, mask: u16) {
        let index = ((offset - 0xB0) / 0xC) as usize;

        // A running channel cannot reprogram itself mid-transfer.
        if self.dma.active == Some(index) {
            return;
        }

        let channel = &mut self.dma.channels[index];

        match (offset - 0xB0) % 0xC {
            0x0 => channel.source = merge32_low(channel.source, value, mask),
            0x2 => channel.source = merge32_high(channel.source, value, mask),
            0x4 => channel.destination = merge32_low(channel.destination, value, mask),
            0x6 => channel.destination = merge32_high(channel.destination, value, mask),
            0x8 => channel.count = (channel.count & !mask) | (value & mask),
            0xA => {
                let was_enabled = channel.control.enable();
                let previous_timing = channel.control.start_timing();

                let writable: u16 = if index == 3 { 0xFFE0 } else { 0xF7E0 };
                let merged = (channel.control.read() & !(mask & writable))
                    | (value & mask & writable);
                channel.control.write(merged);

                let now_enabled = channel.control.enable();

                if !was_enabled && now_enabled {
                    channel.latch(index);
                    self.dma.register_trigger(index);
                    if self.dma.channels[index].control.start_timing() == 0 {
                        self.dma_schedule_pending(DmaTrigger::Immediate);
                    }
                } else if was_enabled && !now_enabled {
                    self.dma.clear_triggers(index);
                } else if now_enabled && previous_timing != channel.control.start_timing() {
                    self.dma.clear_triggers(index);
                    self.dma.register_trigger(index);
                }
            }
            _ => {}
        }
    }

    /// Starts every channel waiting on `trigger`, observing channel priority:
    /// channel 0 wins the bus, lower-priority channels queue behind whatever
    /// is running, and a higher-priority arrival preempts the current one.
    pub(crate) fn dma_schedule_pending(&mut self, trigger: DmaTrigger) {
        let pending = self.dma.triggered(trigger);

        for index in 0..4 {
            let event = EventKind::dma_complete(index);

            if !pending[index] || self.scheduler.scheduled(event) {
                continue;
            }

            let budget = self.dma_transfer_cycles(index);

            match self.dma.active {
                None => {
                    self.dma.active = Some(index);
                    self.scheduler.schedule(event, budget);
                }
                Some(running) if running < index => {
                    // Queue behind the nearest higher-priority channel that
                    // has bus time booked.
                    let mut delta = budget;
                    for higher in (0..index).rev() {
                        if let Some(remaining) =
                            self.scheduler.remaining(EventKind::dma_complete(higher))
                        {
                            delta += remaining;
                            break;
                        }
                    }
                    self.scheduler.schedule(event, delta);
                }
                Some(running) => {
                    // Preempt: let the running channel catch up on the units
                    // it already moved, push it (and anything queued behind
                    // it) back by the new arrival's budget, then take over.
                    let running_event = EventKind::dma_complete(running);
                    let caught_up = self.scheduler.elapsed(running_event).unwrap_or(0);
                    let remaining = self.scheduler.remaining(running_event).unwrap_or(0);

                    self.dma_partially_execute(running, caught_up);
                    self.scheduler.unschedule(running_event);
                    self.scheduler.schedule(running_event, budget + remaining);

                    let mut pushed_back = budget + remaining;
                    for lower in running + 1..4 {
                        let lower_event = EventKind::dma_complete(lower);
                        if let Some(length) = self.scheduler.total_length(lower_event) {
                            self.scheduler.unschedule(lower_event);
                            self.scheduler.schedule(lower_event, pushed_back + length);
                            pushed_back += length;
                        }
                    }

                    self.dma.active = Some(index);
                    self.scheduler.schedule(event, budget);
                }
            }
        }
    }

    /// This channel's completion event fired: move the data, then hand the
    /// bus to the next queued channel.
    pub(crate) fn dma_complete(&mut self, index: usize) {
        self.dma_execute(index);

        self.dma.active = None;
        for next in index + 1..4 {
            if self.scheduler.scheduled(EventKind::dma_complete(next)) {
                self.dma.active = Some(next);
                break;
            }
        }
    }

    /// Total bus cycles the transfer will hold the bus for, and the per-unit
    /// amortization used when the channel is preempted. ROM-to-ROM transfers
    /// pay two extra internal cycles on top of the usual two.
    fn dma_transfer_cycles(&mut self, index: usize) -> u32 {
        let waits = self.system_control.waitstates;
        let word = self.dma.channels[index].control.word_transfer();
        let count = if self.dma.is_fifo_transfer(index) {
            4
        } else {
            self.dma.channels[index].internal_count
        };
        let source = self.dma.channels[index].internal_source;
        let destination = self.dma.channels[index].internal_destination;

        let mut rom_to_rom = false;

        let read_cycles = if in_gamepak(source) {
            rom_to_rom = true;
            rom_unit_cycles(source, word, false, &waits)
                + rom_unit_cycles(source, word, true, &waits) * (count - 1)
        } else {
            internal_unit_cycles(source, word) * count
        };

        let write_cycles = if in_gamepak(destination) {
            rom_unit_cycles(destination, word, false, &waits)
                + rom_unit_cycles(destination, word, true, &waits) * (count - 1)
        } else {
            rom_to_rom = false;
            internal_unit_cycles(destination, word) * count
        };

        let processing = if rom_to_rom { 4 } else { 2 };
        let total = read_cycles + write_cycles + processing;

        let eeprom_read = self.cart.eeprom_access(source);
        let eeprom_write = self.cart.eeprom_access(destination);

        let channel = &mut self.dma.channels[index];
        channel.eeprom_read = eeprom_read;
        channel.eeprom_write = eeprom_write;
        channel.cycles_per_unit = (total / count).max(1);

        total
    }

    fn dma_execute(&mut self, index: usize) {
        let channel = &self.dma.channels[index];
        let eeprom_read = channel.eeprom_read;
        let eeprom_write = channel.eeprom_write;

        if eeprom_read && eeprom_write {
            // Simultaneously reading and writing the EEPROM is nonsense;
            // drop the transfer.
        } else if eeprom_read {
            self.dma_execute_eeprom_read(index);
        } else if eeprom_write {
            self.dma_execute_eeprom_write(index);
        } else if self.dma.is_fifo_transfer(index) {
            self.dma_execute_fifo(index);
        } else {
            self.dma_execute_normal(index);
        }

        let channel = &mut self.dma.channels[index];
        let repeating = channel.control.repeat() && channel.control.start_timing() != 0;

        if repeating {
            channel.reload_count(index);
            if channel.control.dest_control() == 3 {
                channel.internal_destination =
                    channel.destination & if index == 3 { 0x0FFF_FFFF } else { 0x07FF_FFFF };
            }
        } else {
            let mut control = channel.control.read();
            control &= !0x8000;
            channel.control.write(control);
            self.dma.clear_triggers(index);
        }

        if self.dma.channels[index].control.irq_enable() {
            self.system_control
                .request_interrupt(InterruptSource::dma(index));
        }
    }

    fn dma_execute_normal(&mut self, index: usize) {
        let word = self.dma.channels[index].control.word_transfer();
        let mut access = AccessType::NonSequential;

        while self.dma.channels[index].internal_count > 0 {
            let source = self.dma.channels[index].internal_source;
            let destination = self.dma.channels[index].internal_destination;

            if word {
                let (value, _) = self.load32(source, access);
                self.store32(destination, value, access);
            } else {
                let (value, _) = self.load16(source, access);
                self.store16(destination, value, access);
            }

            let channel = &mut self.dma.channels[index];
            channel.internal_count -= 1;
            channel.step_addresses();
            access = AccessType::Sequential;
        }
    }

    /// A preempted channel advances by however many whole units fit in the
    /// bus time it already consumed.
    fn dma_partially_execute(&mut self, index: usize, elapsed: u32) {
        let channel = &self.dma.channels[index];
        if channel.eeprom_read || channel.eeprom_write || self.dma.is_fifo_transfer(index) {
            return;
        }

        let word = channel.control.word_transfer();
        let mut units = elapsed / channel.cycles_per_unit;

        while units > 0 && self.dma.channels[index].internal_count > 0 {
            let source = self.dma.channels[index].internal_source;
            let destination = self.dma.channels[index].internal_destination;

            if word {
                let (value, _) = self.load32(source, AccessType::NonSequential);
                self.store32(destination, value, AccessType::NonSequential);
            } else {
                let (value, _) = self.load16(source, AccessType::NonSequential);
                self.store16(destination, value, AccessType::NonSequential);
            }

            let channel = &mut self.dma.channels[index];
            channel.internal_count -= 1;
            channel.step_addresses();
            units -= 1;
        }
    }

    /// Four words into the selected sound FIFO. The destination is fixed;
    /// the source walks per its control bits.
    fn dma_execute_fifo(&mut self, index: usize) {
        let step = match self.dma.channels[index].control.source_control() {
            0 => 4i32,
            1 => -4i32,
            _ => 0,
        };

        for _ in 0..4 {
            let source = self.dma.channels[index].internal_source;
            let (value, _) = self.load32(source, AccessType::NonSequential);
            let destination = self.dma.channels[index].internal_destination;
            self.apu.fifo_write_word(destination, value);
            let channel = &mut self.dma.channels[index];
            channel.internal_source = channel.internal_source.wrapping_add_signed(step);
        }
    }

    /// EEPROM reads are 68 halfword transfers on channel 3: four junk bits
    /// then the 64 data bits, MSB first.
    fn dma_execute_eeprom_read(&mut self, index: usize) {
        let channel = &self.dma.channels[index];
        if index != 3
            || channel.control.dest_control() != 0
            || channel.control.source_control() != 0
            || channel.control.word_transfer()
            || channel.internal_count != 68
        {
            return;
        }

        let mut block = match self.cart.eeprom() {
            Some(eeprom) => eeprom.read_block(),
            None => return,
        };

        for _ in 0..4 {
            let destination = self.dma.channels[index].internal_destination;
            self.store16(destination, 0, AccessType::NonSequential);
            self.dma_eeprom_advance(index);
        }

        while self.dma.channels[index].internal_count > 0 {
            let bit = (block >> 63) as u16;
            block <<= 1;
            let destination = self.dma.channels[index].internal_destination;
            self.store16(destination, bit, AccessType::NonSequential);
            self.dma_eeprom_advance(index);
        }
    }

    /// EEPROM writes are 9/17 halfwords (read setup: 2 request bits, the
    /// block address, a stop bit) or 73/81 halfwords (the same followed by
    /// 64 data bits) on channel 3.
    fn dma_execute_eeprom_write(&mut self, index: usize) {
        let channel = &self.dma.channels[index];
        let count = channel.internal_count;

        if index != 3
            || channel.control.dest_control() != 0
            || channel.control.source_control() != 0
            || channel.control.word_transfer()
            || !matches!(count, 9 | 17 | 73 | 81)
        {
            return;
        }

        let reading = count == 9 || count == 17;
        let index_length = if reading { count - 3 } else { count - 67 };

        // Request bits (0b11 = read, 0b10 = write); the serial stream has
        // already committed us, so their values are not checked.
        self.dma_eeprom_read_bit(index);
        self.dma_eeprom_read_bit(index);

        let mut block_index = 0usize;
        for _ in 0..index_length {
            block_index = (block_index << 1) | usize::from(self.dma_eeprom_read_bit(index));
        }

        if reading {
            // Trailing stop bit.
            self.dma_eeprom_read_bit(index);
            if let Some(eeprom) = self.cart.eeprom() {
                eeprom.set_read_index(block_index, index_length);
            }
        } else {
            let mut block = 0u64;
            for _ in 0..64 {
                block = (block << 1) | u64::from(self.dma_eeprom_read_bit(index));
            }
            self.dma_eeprom_read_bit(index);
            if let Some(eeprom) = self.cart.eeprom() {
                eeprom.write_block(block_index, index_length, block);
            }
        }
    }

    fn dma_eeprom_read_bit(&mut self, index: usize) -> u8 {
        let source = self.dma.channels[index].internal_source;
        let (value, _) = self.load16(source, AccessType::NonSequential);
        self.dma_eeprom_advance(index);
        value as u8 & 1
    }

    fn dma_eeprom_advance(&mut self, index: usize) {
        let channel = &mut self.dma.channels[index];
        channel.internal_source = channel.internal_source.wrapping_add(2);
        channel.internal_destination = channel.internal_destination.wrapping_add(2);
        channel.internal_count -= 1;
    }
}

fn merge32_low(current: u32, value: u16, mask: u16) -> u32 {
    (current & !u32::from(mask)) | u32::from(value & mask)
}

fn merge32_high(current: u32, value: u16, mask: u16) -> u32 {
    (current & !(u32::from(mask) << 16)) | (u32::from(value & mask) << 16)
}
