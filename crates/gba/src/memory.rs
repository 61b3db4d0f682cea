use arm::{AccessType, Memory, Waitstates};
use byteorder::{ByteOrder, LittleEndian};

use crate::hardware::GbaMemoryMappedHardware;

pub const BIOS_SIZE: usize = 0x4000;
pub const EWRAM_SIZE: usize = 0x40000;
pub const IWRAM_SIZE: usize = 0x8000;
pub const PAL_SIZE: usize = 0x400;
pub const VRAM_SIZE: usize = 0x18000;
pub const OAM_SIZE: usize = 0x400;

/// Register view used by the bus: `read` masks out write-only bits, `write`
/// touches only the writable ones. Implemented by `#[derive(IoRegister)]`.
pub trait IoRegister<T> {
    fn read(self) -> T;
    fn write(&mut self, value: T);
}

/// On-board (256 KiB) work RAM waitstates per access width.
fn ewram_wait(width: u32) -> Waitstates {
    if width == 4 {
        Waitstates::from(5)
    } else {
        Waitstates::from(2)
    }
}

/// Palette RAM and VRAM sit on a 16-bit bus; 32-bit accesses pay one extra
/// cycle.
fn vram_wait(width: u32) -> Waitstates {
    if width == 4 {
        Waitstates::one()
    } else {
        Waitstates::zero()
    }
}

impl GbaMemoryMappedHardware {
    #[inline]
    fn ewram_index(address: u32) -> usize {
        address as usize % EWRAM_SIZE
    }

    #[inline]
    fn iwram_index(address: u32) -> usize {
        address as usize % IWRAM_SIZE
    }

    #[inline]
    fn palram_index(address: u32) -> usize {
        address as usize % PAL_SIZE
    }

    #[inline]
    fn oam_index(address: u32) -> usize {
        address as usize % OAM_SIZE
    }

    /// VRAM mirrors at 128 KiB granularity with the upper 32 KiB of each
    /// mirror folding back onto the OBJ region, leaving 64K + 32K + 32K.
    #[inline]
    fn vram_index(address: u32) -> usize {
        let mut index = address as usize % 0x20000;
        if index >= VRAM_SIZE {
            index -= 0x8000;
        }
        index
    }

    fn open_bus(&self, width: u32) -> u32 {
        match width {
            1 => self.last_read_value & 0xFF,
            2 => self.last_read_value & 0xFFFF,
            _ => self.last_read_value,
        }
    }

    /// BIOS is readable only while the CPU executes inside it; otherwise the
    /// most recent successful BIOS fetch is returned.
    fn bios_read(&mut self, address: u32, width: u32) -> u32 {
        if address as usize >= BIOS_SIZE {
            return self.open_bus(width);
        }

        if self.executing_bios() {
            let address = address as usize;
            let value = match width {
                1 => u32::from(self.bios[address]),
                2 => u32::from(LittleEndian::read_u16(&self.bios[address..])),
                _ => LittleEndian::read_u32(&self.bios[address..]),
            };
            self.last_bios_fetch = value;
            value
        } else {
            match width {
                1 => self.last_bios_fetch & 0xFF,
                2 => self.last_bios_fetch & 0xFFFF,
                _ => self.last_bios_fetch,
            }
        }
    }

    /// Byte writes to VRAM above the mode-dependent OBJ threshold are
    /// dropped; below it they smear across the containing halfword.
    fn vram_store8(&mut self, address: u32, value: u8) {
        let index = Self::vram_index(address & !0x1);
        let threshold = if self.video.registers.dispcnt.bg_mode() <= 2 {
            0x10000
        } else {
            0x14000
        };

        if index >= threshold {
            return;
        }

        self.vram[index] = value;
        self.vram[index + 1] = value;
    }

    /// One halfword of the I/O map. `None` reads as open bus.
    fn io_read16(&mut self, offset: u32) -> Option<u16> {
        match offset {
            0x000..=0x056 => self.video.reg_read16(offset),
            0x060..=0x0A6 => self.apu.reg_read16(offset),
            0x0B0..=0x0DE => self.dma_reg_read16(offset),
            0x100..=0x10E => self.timers.reg_read16(offset),
            0x130..=0x132 => self.keypad.reg_read16(offset),
            0x200..=0x20A | 0x300 | 0x800..=0x802 => self.system_control.reg_read16(offset),
            _ => None,
        }
    }

    /// One halfword of the I/O map. `mask` selects the byte lanes actually
    /// driven, so byte stores preserve the other half of the register.
    fn io_write16(&mut self, offset: u32, value: u16, mask: u16) {
        match offset {
            0x000..=0x056 => self.video.reg_write16(offset, value, mask),
            0x060..=0x0A6 => self.apu.reg_write16(offset, value, mask),
            0x0B0..=0x0DE => self.dma_reg_write16(offset, value, mask),
            0x100..=0x10E => self.timers.reg_write16(offset, value, mask),
            0x130..=0x132 => self.keypad.reg_write16(offset, value, mask),
            0x200..=0x20A | 0x300 | 0x800..=0x802 => {
                self.system_control.reg_write16(offset, value, mask)
            }
            _ => {}
        }
    }

    /// Maps a bus address in the 0x04 page onto an I/O register offset.
    /// The internal memory control register mirrors through the whole page
    /// at 64 KiB strides (4000800h, 4010800h, ...); nothing else above
    /// 0x3FE exists.
    fn io_offset(address: u32) -> Option<u32> {
        let offset = address & 0x00FF_FFFF;
        if offset < 0x400 {
            Some(offset)
        } else if (0x800..0x804).contains(&(offset % 0x10000)) {
            Some(offset % 0x10000)
        } else {
            None
        }
    }
}

impl Memory for GbaMemoryMappedHardware {
    fn load8(&mut self, address: u32, access: AccessType) -> (u8, Waitstates) {
        let (value, wait) = match address >> 24 {
            0x00 => (self.bios_read(address, 1), Waitstates::zero()),
            0x02 => (
                u32::from(self.ewram[Self::ewram_index(address)]),
                ewram_wait(1),
            ),
            0x03 => (
                u32::from(self.iwram[Self::iwram_index(address)]),
                Waitstates::zero(),
            ),
            0x04 => {
                let value = Self::io_offset(address)
                    .and_then(|offset| self.io_read16(offset & !0x1))
                    .map(|halfword| u32::from((halfword >> (8 * (address & 1))) as u8));
                (value.unwrap_or_else(|| self.open_bus(1)), Waitstates::zero())
            }
            0x05 => (
                u32::from(self.palram[Self::palram_index(address)]),
                Waitstates::zero(),
            ),
            0x06 => (
                u32::from(self.vram[Self::vram_index(address)]),
                Waitstates::zero(),
            ),
            0x07 => (
                u32::from(self.oam[Self::oam_index(address)]),
                Waitstates::zero(),
            ),
            0x08..=0x0D => {
                let (value, wait, open) =
                    self.cart
                        .read(address, 1, access, &self.system_control.waitstates);
                (
                    if open { self.open_bus(1) } else { value },
                    wait,
                )
            }
            0x0E | 0x0F => self.cart.backup_read8(address, &self.system_control.waitstates),
            _ => (self.open_bus(1), Waitstates::zero()),
        };

        self.last_read_value = value;
        (value as u8, wait)
    }

    fn load16(&mut self, address: u32, access: AccessType) -> (u16, Waitstates) {
        let address = address & !0x1;

        let (value, wait) = match address >> 24 {
            0x00 => (self.bios_read(address, 2), Waitstates::zero()),
            0x02 => (
                u32::from(LittleEndian::read_u16(
                    &self.ewram[Self::ewram_index(address)..],
                )),
                ewram_wait(2),
            ),
            0x03 => (
                u32::from(LittleEndian::read_u16(
                    &self.iwram[Self::iwram_index(address)..],
                )),
                Waitstates::zero(),
            ),
            0x04 => {
                let value = Self::io_offset(address)
                    .and_then(|offset| self.io_read16(offset))
                    .map(u32::from);
                (value.unwrap_or_else(|| self.open_bus(2)), Waitstates::zero())
            }
            0x05 => (
                u32::from(LittleEndian::read_u16(
                    &self.palram[Self::palram_index(address)..],
                )),
                Waitstates::zero(),
            ),
            0x06 => (
                u32::from(LittleEndian::read_u16(
                    &self.vram[Self::vram_index(address)..],
                )),
                Waitstates::zero(),
            ),
            0x07 => (
                u32::from(LittleEndian::read_u16(
                    &self.oam[Self::oam_index(address)..],
                )),
                Waitstates::zero(),
            ),
            0x08..=0x0D => {
                let (value, wait, open) =
                    self.cart
                        .read(address, 2, access, &self.system_control.waitstates);
                (if open { self.open_bus(2) } else { value }, wait)
            }
            0x0E | 0x0F => {
                // The backup bus is 8 bits wide; the byte smears across the
                // halfword.
                let (byte, wait) = self.cart.backup_read8(address, &self.system_control.waitstates);
                (byte * 0x0101, wait)
            }
            _ => (self.open_bus(2), Waitstates::zero()),
        };

        self.last_read_value = value;
        (value as u16, wait)
    }

    fn load32(&mut self, address: u32, access: AccessType) -> (u32, Waitstates) {
        let address = address & !0x3;

        let (value, wait) = match address >> 24 {
            0x00 => (self.bios_read(address, 4), Waitstates::zero()),
            0x02 => (
                LittleEndian::read_u32(&self.ewram[Self::ewram_index(address)..]),
                ewram_wait(4),
            ),
            0x03 => (
                LittleEndian::read_u32(&self.iwram[Self::iwram_index(address)..]),
                Waitstates::zero(),
            ),
            0x04 => {
                let lo = Self::io_offset(address).and_then(|offset| self.io_read16(offset));
                let hi = Self::io_offset(address + 2).and_then(|offset| self.io_read16(offset));
                let value = match (lo, hi) {
                    (None, None) => self.open_bus(4),
                    _ => u32::from(lo.unwrap_or(0)) | (u32::from(hi.unwrap_or(0)) << 16),
                };
                (value, Waitstates::zero())
            }
            0x05 => (
                LittleEndian::read_u32(&self.palram[Self::palram_index(address)..]),
                vram_wait(4),
            ),
            0x06 => (
                LittleEndian::read_u32(&self.vram[Self::vram_index(address)..]),
                vram_wait(4),
            ),
            0x07 => (
                LittleEndian::read_u32(&self.oam[Self::oam_index(address)..]),
                Waitstates::zero(),
            ),
            0x08..=0x0D => {
                let (value, wait, open) =
                    self.cart
                        .read(address, 4, access, &self.system_control.waitstates);
                (if open { self.open_bus(4) } else { value }, wait)
            }
            0x0E | 0x0F => {
                let (byte, wait) = self.cart.backup_read8(address, &self.system_control.waitstates);
                (byte * 0x0101_0101, wait)
            }
            _ => (self.open_bus(4), Waitstates::zero()),
        };

        self.last_read_value = value;
        (value, wait)
    }

    fn store8(&mut self, address: u32, value: u8, _access: AccessType) -> Waitstates {
        match address >> 24 {
            0x02 => {
                self.ewram[Self::ewram_index(address)] = value;
                ewram_wait(1)
            }
            0x03 => {
                self.iwram[Self::iwram_index(address)] = value;
                Waitstates::zero()
            }
            0x04 => {
                if let Some(offset) = Self::io_offset(address) {
                    let lane = 8 * (address & 1);
                    self.io_write16(offset & !0x1, u16::from(value) << lane, 0xFF << lane);
                }
                Waitstates::zero()
            }
            0x05 => {
                // Byte writes broadcast to both halves of the halfword.
                let index = Self::palram_index(address & !0x1);
                self.palram[index] = value;
                self.palram[index + 1] = value;
                Waitstates::zero()
            }
            0x06 => {
                self.vram_store8(address, value);
                Waitstates::zero()
            }
            // Byte writes to OAM are ignored.
            0x07 => Waitstates::zero(),
            0x08..=0x0D => self.cart.rom_write(address),
            0x0E | 0x0F => self
                .cart
                .backup_write8(address, value, &self.system_control.waitstates),
            _ => Waitstates::zero(),
        }
    }

    fn store16(&mut self, address: u32, value: u16, _access: AccessType) -> Waitstates {
        let address = address & !0x1;

        match address >> 24 {
            0x02 => {
                LittleEndian::write_u16(&mut self.ewram[Self::ewram_index(address)..], value);
                ewram_wait(2)
            }
            0x03 => {
                LittleEndian::write_u16(&mut self.iwram[Self::iwram_index(address)..], value);
                Waitstates::zero()
            }
            0x04 => {
                if let Some(offset) = Self::io_offset(address) {
                    self.io_write16(offset, value, 0xFFFF);
                }
                Waitstates::zero()
            }
            0x05 => {
                LittleEndian::write_u16(&mut self.palram[Self::palram_index(address)..], value);
                Waitstates::zero()
            }
            0x06 => {
                LittleEndian::write_u16(&mut self.vram[Self::vram_index(address)..], value);
                Waitstates::zero()
            }
            0x07 => {
                LittleEndian::write_u16(&mut self.oam[Self::oam_index(address)..], value);
                Waitstates::zero()
            }
            0x08..=0x0D => self.cart.rom_write(address),
            0x0E | 0x0F => {
                // A wide store to the 8-bit backup bus writes the lane byte
                // the address selects.
                let byte = (value >> (8 * (address & 1))) as u8;
                self.cart
                    .backup_write8(address, byte, &self.system_control.waitstates)
            }
            _ => Waitstates::zero(),
        }
    }

    fn store32(&mut self, address: u32, value: u32, _access: AccessType) -> Waitstates {
        let address = address & !0x3;

        match address >> 24 {
            0x02 => {
                LittleEndian::write_u32(&mut self.ewram[Self::ewram_index(address)..], value);
                ewram_wait(4)
            }
            0x03 => {
                LittleEndian::write_u32(&mut self.iwram[Self::iwram_index(address)..], value);
                Waitstates::zero()
            }
            0x04 => {
                if let Some(offset) = Self::io_offset(address) {
                    self.io_write16(offset, value as u16, 0xFFFF);
                }
                if let Some(offset) = Self::io_offset(address + 2) {
                    self.io_write16(offset, (value >> 16) as u16, 0xFFFF);
                }
                Waitstates::zero()
            }
            0x05 => {
                LittleEndian::write_u32(&mut self.palram[Self::palram_index(address)..], value);
                vram_wait(4)
            }
            0x06 => {
                LittleEndian::write_u32(&mut self.vram[Self::vram_index(address)..], value);
                vram_wait(4)
            }
            0x07 => {
                LittleEndian::write_u32(&mut self.oam[Self::oam_index(address)..], value);
                Waitstates::zero()
            }
            0x08..=0x0D => self.cart.rom_write(address),
            0x0E | 0x0F => {
                let byte = (value >> (8 * (address & 3))) as u8;
                self.cart
                    .backup_write8(address, byte, &self.system_control.waitstates)
            }
            _ => Waitstates::zero(),
        }
    }

    fn code16(&mut self, address: u32, access: AccessType) -> (u16, Waitstates) {
        self.last_fetch_address = address;
        self.load16(address, access)
    }

    fn code32(&mut self, address: u32, access: AccessType) -> (u32, Waitstates) {
        self.last_fetch_address = address;
        self.load32(address, access)
    }
}

/// Read-only views for tests and debugging; no side effects, no waitstates.
impl GbaMemoryMappedHardware {
    pub fn view8(&self, address: u32) -> u8 {
        match address >> 24 {
            0x00 if (address as usize) < BIOS_SIZE => self.bios[address as usize],
            0x02 => self.ewram[Self::ewram_index(address)],
            0x03 => self.iwram[Self::iwram_index(address)],
            0x05 => self.palram[Self::palram_index(address)],
            0x06 => self.vram[Self::vram_index(address)],
            0x07 => self.oam[Self::oam_index(address)],
            0x08..=0x0D => self.cart.view8(address),
            _ => 0,
        }
    }

    pub fn view16(&self, address: u32) -> u16 {
        let address = address & !0x1;
        u16::from(self.view8(address)) | (u16::from(self.view8(address + 1)) << 8)
    }

    pub fn view32(&self, address: u32) -> u32 {
        let address = address & !0x3;
        u32::from(self.view16(address)) | (u32::from(self.view16(address + 2)) << 16)
    }
}
