mod eeprom;
mod flash;

pub use eeprom::Eeprom;
pub use flash::Flash;

use arm::{AccessType, Waitstates};
use byteorder::{ByteOrder, LittleEndian};

use super::system_control::SystemWaitstates;

pub const MAX_ROM_SIZE: usize = 0x0200_0000;
const SRAM_SIZE: usize = 0x8000;

/// Backup media autodetected from ID strings the library build tools embed
/// in every commercial ROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    None,
    Sram,
    Flash64K,
    Flash128K,
    Eeprom,
}

pub enum Backup {
    None,
    Sram(Box<[u8; SRAM_SIZE]>),
    Flash(Flash),
    Eeprom(Eeprom),
}

/// Cartridge ROM plus its backup chip and the bus-history state used to
/// price sequential against non-sequential accesses.
pub struct Cartridge {
    rom: Vec<u8>,
    backup: Backup,
    backup_kind: BackupKind,
    /// Address a sequential access would continue at.
    next_sequential: u32,
}

impl Default for Cartridge {
    fn default() -> Self {
        Cartridge {
            rom: Vec::new(),
            backup: Backup::None,
            backup_kind: BackupKind::None,
            next_sequential: 0,
        }
    }
}

impl Cartridge {
    pub fn load(&mut self, rom: Vec<u8>) {
        self.backup_kind = detect_backup_kind(&rom);
        self.backup = match self.backup_kind {
            BackupKind::None => Backup::None,
            BackupKind::Sram => Backup::Sram(Box::new([0xFF; SRAM_SIZE])),
            BackupKind::Flash64K => Backup::Flash(Flash::new(1)),
            BackupKind::Flash128K => Backup::Flash(Flash::new(2)),
            BackupKind::Eeprom => Backup::Eeprom(Eeprom::default()),
        };
        self.rom = rom;

        tracing::info!(kind = ?self.backup_kind, size = self.rom.len(), "cartridge loaded");
    }

    pub fn loaded(&self) -> bool {
        !self.rom.is_empty()
    }

    pub(crate) fn reset(&mut self) {
        self.next_sequential = 0;
        match &mut self.backup {
            Backup::Flash(flash) => flash.reset(),
            Backup::Eeprom(eeprom) => eeprom.reset(),
            _ => {}
        }
    }

    pub fn backup_kind(&self) -> BackupKind {
        self.backup_kind
    }

    /// The raw backup bytes, for the host to persist.
    pub fn backup_data(&self) -> Option<&[u8]> {
        match &self.backup {
            Backup::None => None,
            Backup::Sram(data) => Some(&data[..]),
            Backup::Flash(flash) => Some(flash.data()),
            Backup::Eeprom(eeprom) => Some(eeprom.data()),
        }
    }

    /// Restores backup bytes from a previously persisted save. Ignored when
    /// the size does not match the detected medium.
    pub fn load_backup_data(&mut self, bytes: &[u8]) -> bool {
        match &mut self.backup {
            Backup::None => false,
            Backup::Sram(data) => {
                if bytes.len() == data.len() {
                    data.copy_from_slice(bytes);
                    true
                } else {
                    false
                }
            }
            Backup::Flash(flash) => flash.load(bytes),
            Backup::Eeprom(eeprom) => eeprom.load(bytes),
        }
    }

    /// Whether an address belongs to the EEPROM rather than ROM. Small
    /// cartridges expose the EEPROM across the whole 0x0D page; 32 MiB ones
    /// only in its top 256 bytes.
    pub fn eeprom_access(&self, address: u32) -> bool {
        if self.backup_kind != BackupKind::Eeprom {
            return false;
        }

        if self.rom.len() > 0x0100_0000 {
            (0x0DFF_FF00..=0x0DFF_FFFF).contains(&address)
        } else {
            (0x0D00_0000..=0x0DFF_FFFF).contains(&address)
        }
    }

    pub(crate) fn eeprom(&mut self) -> Option<&mut Eeprom> {
        match &mut self.backup {
            Backup::Eeprom(eeprom) => Some(eeprom),
            _ => None,
        }
    }

    /// ROM read with WAITCNT timing. Returns (value, waitstates, open bus).
    pub(crate) fn read(
        &mut self,
        address: u32,
        width: u32,
        access: AccessType,
        waits: &SystemWaitstates,
    ) -> (u32, Waitstates, bool) {
        if self.eeprom_access(address) {
            // The EEPROM presents a ready bit until a DMA drives a real
            // serial transaction.
            return (1, Waitstates::zero(), false);
        }

        let wait = self.access_time(address, width, access, waits);
        let index = (address & 0x01FF_FFFF) as usize;

        if index + width as usize > self.rom.len() {
            self.next_sequential = 0;
            return (0, Waitstates::zero(), true);
        }

        let value = match width {
            1 => u32::from(self.rom[index]),
            2 => u32::from(LittleEndian::read_u16(&self.rom[index..])),
            _ => LittleEndian::read_u32(&self.rom[index..]),
        };

        (value, wait, false)
    }

    /// Writes to the ROM address space do nothing, but they still break the
    /// sequential access chain.
    pub(crate) fn rom_write(&mut self, _address: u32) -> Waitstates {
        self.next_sequential = 0;
        Waitstates::zero()
    }

    /// Waitstates for one ROM access, per the WAITCNT tables. The 16-bit
    /// cartridge bus turns a word access into a first access plus one
    /// sequential second access.
    pub(crate) fn access_time(
        &mut self,
        address: u32,
        width: u32,
        access: AccessType,
        waits: &SystemWaitstates,
    ) -> Waitstates {
        let region = (((address >> 24) - 8) / 2) as usize;
        let (first, second) = waits.gamepak[region.min(2)];

        let sequential = access == AccessType::Sequential || address == self.next_sequential;
        self.next_sequential = address + width.max(2);

        let mut wait = if sequential { second } else { first };
        if width == 4 {
            wait += second;
        }
        wait
    }

    pub(crate) fn backup_read8(
        &mut self,
        address: u32,
        waits: &SystemWaitstates,
    ) -> (u32, Waitstates) {
        let value = match &mut self.backup {
            Backup::Sram(data) => data[address as usize % SRAM_SIZE],
            Backup::Flash(flash) => flash.read8(address),
            _ => 0xFF,
        };
        (u32::from(value), waits.sram)
    }

    pub(crate) fn backup_write8(
        &mut self,
        address: u32,
        value: u8,
        waits: &SystemWaitstates,
    ) -> Waitstates {
        match &mut self.backup {
            Backup::Sram(data) => data[address as usize % SRAM_SIZE] = value,
            Backup::Flash(flash) => flash.write8(address, value),
            _ => {}
        }
        waits.sram
    }

    pub(crate) fn view8(&self, address: u32) -> u8 {
        let index = (address & 0x01FF_FFFF) as usize;
        self.rom.get(index).copied().unwrap_or(0)
    }
}

/// Scans the ROM for a backup ID string on a word boundary.
fn detect_backup_kind(rom: &[u8]) -> BackupKind {
    for offset in (0..rom.len().saturating_sub(11)).step_by(4) {
        let rest = &rom[offset..];

        if rest.starts_with(b"EEPROM_V") {
            return BackupKind::Eeprom;
        } else if rest.starts_with(b"SRAM_V") {
            return BackupKind::Sram;
        } else if rest.starts_with(b"FLASH") {
            if rest.starts_with(b"FLASH_V") || rest.starts_with(b"FLASH512_V") {
                return BackupKind::Flash64K;
            } else if rest.starts_with(b"FLASH1M_V") {
                return BackupKind::Flash128K;
            }
        }
    }

    BackupKind::None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with_marker(marker: &[u8]) -> Vec<u8> {
        let mut rom = vec![0u8; 0x100];
        rom.extend_from_slice(marker);
        rom.resize(0x200, 0);
        rom
    }

    #[test]
    fn backup_markers_are_detected_on_word_boundaries() {
        assert_eq!(
            detect_backup_kind(&rom_with_marker(b"EEPROM_V111")),
            BackupKind::Eeprom
        );
        assert_eq!(
            detect_backup_kind(&rom_with_marker(b"SRAM_V110")),
            BackupKind::Sram
        );
        assert_eq!(
            detect_backup_kind(&rom_with_marker(b"FLASH512_V10")),
            BackupKind::Flash64K
        );
        assert_eq!(
            detect_backup_kind(&rom_with_marker(b"FLASH1M_V102")),
            BackupKind::Flash128K
        );
        assert_eq!(detect_backup_kind(&rom_with_marker(b"NOTHING_")), BackupKind::None);
    }

    #[test]
    fn sequential_reads_use_second_access_timing() {
        let mut cart = Cartridge::default();
        cart.load(vec![0xAA; 0x1000]);

        let mut waits = SystemWaitstates::default();
        waits.gamepak[0] = (Waitstates::from(4), Waitstates::from(2));

        let (_, wait, _) = cart.read(0x0800_0000, 2, AccessType::NonSequential, &waits);
        assert_eq!(u32::from(wait), 4);

        let (_, wait, _) = cart.read(0x0800_0002, 2, AccessType::NonSequential, &waits);
        assert_eq!(u32::from(wait), 2, "contiguous address continues the burst");

        let (_, wait, _) = cart.read(0x0800_0100, 2, AccessType::NonSequential, &waits);
        assert_eq!(u32::from(wait), 4, "a jump restarts with a first access");
    }

    #[test]
    fn word_reads_pay_first_plus_second_access() {
        let mut cart = Cartridge::default();
        cart.load(vec![0xAA; 0x1000]);

        let mut waits = SystemWaitstates::default();
        waits.gamepak[0] = (Waitstates::from(4), Waitstates::from(2));

        let (_, wait, _) = cart.read(0x0800_0010, 4, AccessType::NonSequential, &waits);
        assert_eq!(u32::from(wait), 6);
    }

    #[test]
    fn reads_past_the_rom_end_are_open_bus() {
        let mut cart = Cartridge::default();
        cart.load(vec![0xAA; 0x100]);

        let waits = SystemWaitstates::default();
        let (_, _, open) = cart.read(0x0800_1000, 2, AccessType::NonSequential, &waits);
        assert!(open);
    }

    #[test]
    fn eeprom_window_depends_on_rom_size() {
        let mut cart = Cartridge::default();
        cart.load(rom_with_marker(b"EEPROM_V111"));
        assert!(cart.eeprom_access(0x0D00_0000));
        assert!(cart.eeprom_access(0x0DFF_FF80));
        assert!(!cart.eeprom_access(0x0C00_0000));
    }
}
