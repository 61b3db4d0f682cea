use crate::clock::Waitstates;

/// Whether a bus access follows on directly from the previous access to the
/// same region. Cartridge ROM charges different waitstates for the two.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AccessType {
    Sequential,
    NonSequential,
}

/// The bus the CPU executes against. Loads return the value together with
/// the waitstates the access incurred; stores return just the waitstates.
///
/// Addresses arrive as the CPU computed them. Implementations are expected
/// to apply their own alignment and mirroring rules; the CPU applies the
/// architectural rotations for unaligned loads on top of what the bus
/// returns.
pub trait Memory {
    fn load8(&mut self, address: u32, access: AccessType) -> (u8, Waitstates);

    fn load16(&mut self, address: u32, access: AccessType) -> (u16, Waitstates);

    fn load32(&mut self, address: u32, access: AccessType) -> (u32, Waitstates);

    fn store8(&mut self, address: u32, value: u8, access: AccessType) -> Waitstates;

    fn store16(&mut self, address: u32, value: u16, access: AccessType) -> Waitstates;

    fn store32(&mut self, address: u32, value: u32, access: AccessType) -> Waitstates;

    /// THUMB opcode fetch. Distinct from [`Memory::load16`] so implementations
    /// can track the prefetch bus for open-bus reads.
    fn code16(&mut self, address: u32, access: AccessType) -> (u16, Waitstates) {
        self.load16(address, access)
    }

    /// ARM opcode fetch.
    fn code32(&mut self, address: u32, access: AccessType) -> (u32, Waitstates) {
        self.load32(address, access)
    }
}
