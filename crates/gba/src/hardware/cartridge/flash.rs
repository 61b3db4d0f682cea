const BANK_SIZE: usize = 0x10000;

/// Command bytes recognized at the magic addresses of the flash protocol.
mod command {
    pub const START_SEQUENCE: u8 = 0xAA;
    pub const CONTINUE_SEQUENCE: u8 = 0x55;
    pub const ENTER_CHIP_ID: u8 = 0x90;
    pub const EXIT_CHIP_ID: u8 = 0xF0;
    pub const PREPARE_ERASE: u8 = 0x80;
    pub const ERASE_CHIP: u8 = 0x10;
    pub const ERASE_SECTOR: u8 = 0x30;
    pub const PREPARE_WRITE: u8 = 0xA0;
    pub const SET_BANK: u8 = 0xB0;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlashState {
    Ready,
    SequenceStarted,
    AwaitingCommand,
    EraseSequenceReady,
    EraseSequenceStarted,
    AwaitingEraseCommand,
    AwaitingWriteByte,
    AwaitingBankNumber,
}

/// Flash backup (64 KiB single bank, or 128 KiB as two banked halves).
/// The guest talks to it with the Atmel-style command sequences written to
/// 0x0E005555 / 0x0E002AAA.
pub struct Flash {
    data: Vec<u8>,
    state: FlashState,
    chip_id_mode: bool,
    bank: usize,
}

impl Flash {
    pub fn new(bank_count: usize) -> Self {
        Flash {
            data: vec![0xFF; bank_count * BANK_SIZE],
            state: FlashState::Ready,
            chip_id_mode: false,
            bank: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.state = FlashState::Ready;
        self.chip_id_mode = false;
        self.bank = 0;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn load(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() != self.data.len() {
            return false;
        }

        self.data.copy_from_slice(bytes);
        true
    }

    fn banked(&self) -> bool {
        self.data.len() > BANK_SIZE
    }

    #[inline]
    fn index(&self, address: u32) -> usize {
        self.bank * BANK_SIZE + address as usize % BANK_SIZE
    }

    pub(crate) fn read8(&self, address: u32) -> u8 {
        let offset = address as usize % BANK_SIZE;

        if self.chip_id_mode && offset <= 1 {
            // Sanyo 128K parts identify as 62h/13h, Panasonic 64K as 32h/1Bh.
            return match (offset, self.banked()) {
                (0, true) => 0x62,
                (1, true) => 0x13,
                (0, false) => 0x32,
                _ => 0x1B,
            };
        }

        self.data[self.index(address)]
    }

    pub(crate) fn write8(&mut self, address: u32, value: u8) {
        let offset = address as usize % BANK_SIZE;

        match self.state {
            FlashState::Ready => {
                if offset == 0x5555 && value == command::START_SEQUENCE {
                    self.state = FlashState::SequenceStarted;
                }
            }
            FlashState::SequenceStarted => {
                if offset == 0x2AAA && value == command::CONTINUE_SEQUENCE {
                    self.state = FlashState::AwaitingCommand;
                }
            }
            FlashState::AwaitingCommand => {
                if offset != 0x5555 {
                    return;
                }

                self.state = match value {
                    command::ENTER_CHIP_ID => {
                        self.chip_id_mode = true;
                        FlashState::Ready
                    }
                    command::EXIT_CHIP_ID => {
                        self.chip_id_mode = false;
                        FlashState::Ready
                    }
                    command::PREPARE_ERASE => FlashState::EraseSequenceReady,
                    command::PREPARE_WRITE => FlashState::AwaitingWriteByte,
                    command::SET_BANK => FlashState::AwaitingBankNumber,
                    _ => FlashState::AwaitingCommand,
                };
            }
            FlashState::EraseSequenceReady => {
                if offset == 0x5555 && value == command::START_SEQUENCE {
                    self.state = FlashState::EraseSequenceStarted;
                }
            }
            FlashState::EraseSequenceStarted => {
                if offset == 0x2AAA && value == command::CONTINUE_SEQUENCE {
                    self.state = FlashState::AwaitingEraseCommand;
                }
            }
            FlashState::AwaitingEraseCommand => match value {
                command::ERASE_CHIP if offset == 0x5555 => {
                    self.data.fill(0xFF);
                    self.state = FlashState::Ready;
                }
                command::ERASE_SECTOR => {
                    let sector = self.bank * BANK_SIZE + (offset & 0xF000);
                    self.data[sector..sector + 0x1000].fill(0xFF);
                    self.state = FlashState::Ready;
                }
                _ => {}
            },
            FlashState::AwaitingWriteByte => {
                let index = self.index(address);
                self.data[index] = value;
                self.state = FlashState::Ready;
            }
            FlashState::AwaitingBankNumber => {
                if offset == 0 {
                    if self.banked() {
                        self.bank = usize::from(value & 1);
                    }
                    self.state = FlashState::Ready;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send_command(flash: &mut Flash, value: u8) {
        flash.write8(0x0E00_5555, 0xAA);
        flash.write8(0x0E00_2AAA, 0x55);
        flash.write8(0x0E00_5555, value);
    }

    #[test]
    fn chip_id_mode_reports_device_ids() {
        let mut flash = Flash::new(2);
        send_command(&mut flash, 0x90);
        assert_eq!(flash.read8(0x0E00_0000), 0x62);
        assert_eq!(flash.read8(0x0E00_0001), 0x13);

        send_command(&mut flash, 0xF0);
        assert_eq!(flash.read8(0x0E00_0000), 0xFF);
    }

    #[test]
    fn byte_program_and_sector_erase() {
        let mut flash = Flash::new(1);

        send_command(&mut flash, 0xA0);
        flash.write8(0x0E00_1234, 0x5A);
        assert_eq!(flash.read8(0x0E00_1234), 0x5A);

        // Erase the 4K sector containing the byte.
        send_command(&mut flash, 0x80);
        flash.write8(0x0E00_5555, 0xAA);
        flash.write8(0x0E00_2AAA, 0x55);
        flash.write8(0x0E00_1000, 0x30);
        assert_eq!(flash.read8(0x0E00_1234), 0xFF);
    }

    #[test]
    fn bank_switch_selects_the_upper_half() {
        let mut flash = Flash::new(2);

        send_command(&mut flash, 0xA0);
        flash.write8(0x0E00_0010, 0x11);

        send_command(&mut flash, 0xB0);
        flash.write8(0x0E00_0000, 1);
        assert_eq!(flash.read8(0x0E00_0010), 0xFF);

        send_command(&mut flash, 0xB0);
        flash.write8(0x0E00_0000, 0);
        assert_eq!(flash.read8(0x0E00_0010), 0x11);
    }
}
