use byteorder::{BigEndian, ByteOrder};

const SMALL_SIZE: usize = 0x200;
const LARGE_SIZE: usize = 0x2000;

/// Serial EEPROM backup, 512 bytes (6-bit block addresses) or 8 KiB (14-bit
/// block addresses). The part size is unknowable from the ROM alone, so it
/// is fixed by the address width of the first DMA 3 transaction.
pub struct Eeprom {
    data: Vec<u8>,
    sized: bool,
    /// Block index latched by the most recent read-setup transaction.
    read_index: usize,
}

impl Default for Eeprom {
    fn default() -> Self {
        Eeprom {
            data: vec![0xFF; LARGE_SIZE],
            sized: false,
            read_index: 0,
        }
    }
}

impl Eeprom {
    pub(crate) fn reset(&mut self) {
        self.read_index = 0;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn load(&mut self, bytes: &[u8]) -> bool {
        match bytes.len() {
            SMALL_SIZE | LARGE_SIZE => {
                self.data = bytes.to_vec();
                self.sized = true;
                true
            }
            _ => false,
        }
    }

    /// A 6-bit bus address means a 512 byte part, 14 bits an 8 KiB part.
    fn size_from_index_length(&mut self, index_length: u32) {
        if self.sized {
            return;
        }

        self.data = vec![0xFF; if index_length <= 6 { SMALL_SIZE } else { LARGE_SIZE }];
        self.sized = true;
    }

    #[inline]
    fn block_offset(&self, index: usize) -> usize {
        (index * 8) % self.data.len().max(8)
    }

    /// Latches the block index a subsequent read will stream out.
    pub(crate) fn set_read_index(&mut self, index: usize, index_length: u32) {
        self.size_from_index_length(index_length);
        self.read_index = index;
    }

    /// The 64 data bits of the latched block, MSB first on the wire.
    pub(crate) fn read_block(&self) -> u64 {
        let offset = self.block_offset(self.read_index);
        BigEndian::read_u64(&self.data[offset..offset + 8])
    }

    pub(crate) fn write_block(&mut self, index: usize, index_length: u32, value: u64) {
        self.size_from_index_length(index_length);
        let offset = self.block_offset(index);
        BigEndian::write_u64(&mut self.data[offset..offset + 8], value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_transaction_fixes_the_part_size() {
        let mut eeprom = Eeprom::default();
        eeprom.set_read_index(0, 6);
        assert_eq!(eeprom.data().len(), SMALL_SIZE);

        // Once sized, later transactions keep it.
        eeprom.write_block(1, 14, 0x1122_3344_5566_7788);
        assert_eq!(eeprom.data().len(), SMALL_SIZE);
    }

    #[test]
    fn block_write_read_round_trip() {
        let mut eeprom = Eeprom::default();
        eeprom.write_block(3, 14, 0xA1B2_C3D4_E5F6_0718);
        eeprom.set_read_index(3, 14);
        assert_eq!(eeprom.read_block(), 0xA1B2_C3D4_E5F6_0718);
    }
}
